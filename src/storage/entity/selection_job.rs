use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 任务队列表
///
/// 选课任务的 job_id 形如 `{username}-{fuel_id}`，用于取消时重建；
/// 同一 job_id 允许多条历史行，但活跃行最多一条（入队时去重）。
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "selection_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub job_id: String,
    pub task_name: String, // select_course / query_selected_number
    pub payload: String,   // JSON 编码的任务参数
    pub status: String,    // QUEUED/CLAIMED/RUNNING/DONE/RETRY_WAIT/FAILED_PERMANENT/ABORTED
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_run_at: i64,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<i64>,
    pub last_error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
