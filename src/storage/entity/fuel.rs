use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 燃料（能量/验证码）记录
///
/// status 记录生命周期（unused/used/canceled），
/// in_use 单独标记"正被某个任务占用"，同一份燃料不允许两个任务并发持有。
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "fuels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub username: String,
    pub status: String, // unused/used/canceled
    pub in_use: bool,
    pub used_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
