use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 已提交选课记录：每次尝试开始时创建，结果出来后修改状态
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "selected_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub username: String,
    pub email: String,
    pub course_name: String,
    pub log_key: String,
    pub status: String, // unused/selected/canceled
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
