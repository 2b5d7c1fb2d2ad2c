use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 课程目录：公选课/体育课列表，定时任务会刷新已选人数
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub course_id: String, // kch_id
    pub course_name: String,
    pub course_type: String, // 开课类型代码，公选课 10，体育课 05，主修课程 01
    pub selected_count: i32,
    pub capacity: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
