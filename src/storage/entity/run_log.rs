use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 运行日志：按 log_key（`{username}-{course_name}`）归档的步骤记录
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "run_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub log_key: String,
    pub step: String,
    pub message: String,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
