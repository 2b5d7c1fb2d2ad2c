use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 选课失败记录：只在失败路径上创建
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "failed_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub username: String,
    pub course_name: String,
    pub log_key: String,
    pub failed_reason: String,
    pub port: String,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
