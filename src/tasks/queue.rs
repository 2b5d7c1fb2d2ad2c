use log::info;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;

use crate::error::SelectionError;
use crate::storage::repository::JobRepository;

/// 本进程内正在运行的任务句柄表
///
/// 取消的权威判定在数据库的条件状态转移上；
/// 句柄只用来立即打断本进程持有的 tokio 任务。
#[derive(Default)]
pub struct AbortRegistry {
    inner: Mutex<HashMap<String, AbortHandle>>,
}

impl AbortRegistry {
    pub fn register(&self, job_id: &str, handle: AbortHandle) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(job_id.to_string(), handle);
        }
    }

    pub fn remove(&self, job_id: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(job_id);
        }
    }

    /// 打断本进程内名为 job_id 的任务（如果有）
    pub fn abort(&self, job_id: &str) -> bool {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(handle) = map.remove(job_id) {
                handle.abort();
                return true;
            }
        }
        false
    }
}

/// 任务队列门面：入队 + 取消
///
/// 底层是所有 worker 进程共享的 selection_jobs 表。
#[derive(Clone)]
pub struct JobQueue {
    db: Arc<DatabaseConnection>,
    registry: Arc<AbortRegistry>,
}

impl JobQueue {
    pub fn new(db: Arc<DatabaseConnection>, registry: Arc<AbortRegistry>) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> Arc<AbortRegistry> {
        self.registry.clone()
    }

    /// 入队；同一 job_id 已有活跃任务时返回 None
    pub async fn enqueue_job<P: Serialize>(
        &self,
        task_name: &str,
        job_id: &str,
        payload: &P,
        max_retries: i32,
    ) -> Result<Option<i32>, SelectionError> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| SelectionError::Submission(format!("任务参数编码失败: {}", e)))?;
        let id = JobRepository::enqueue(&self.db, task_name, job_id, payload_json, max_retries)
            .await?;
        if let Some(id) = id {
            info!("▶ 任务已入队: {} [{}#{}]", job_id, task_name, id);
        }
        Ok(id)
    }

    /// 硬取消：活跃任务被转入 ABORTED 时返回 true，且恰好返回一次 true
    ///
    /// 已完成或不存在的任务返回 false，并发于任务自然完成时也安全——
    /// 二者在数据库里争同一次条件更新，只有一方生效。
    pub async fn abort(&self, job_id: &str) -> Result<bool, sea_orm::DbErr> {
        let aborted = JobRepository::abort(&self.db, job_id).await?;
        if aborted {
            // 任务在本进程跑着就立即打断，在别的进程则由其 worker 观察状态
            let interrupted = self.registry.abort(job_id);
            info!(
                "🛑 任务已取消: {} (本进程打断: {})",
                job_id, interrupted
            );
        }
        Ok(aborted)
    }
}
