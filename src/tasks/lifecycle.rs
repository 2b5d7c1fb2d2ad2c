use log::{info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use super::payload::{
    QuerySelectedPayload, SelectCoursePayload, TASK_QUERY_SELECTED, TASK_SELECT_COURSE,
};
use super::queue::JobQueue;
use crate::conf::Settings;
use crate::error::SelectionError;
use crate::security;
use crate::storage::repository::{
    FuelRepository, JobRepository, SelectedRepository, StopFlagRepository, FUEL_STATUS_UNUSED,
    SELECTED_STATUS_CANCELED, SELECTED_STATUS_UNUSED,
};

/// 周期任务不做自动重试，失败就终止，等下一次手动发起
const MONITOR_MAX_RETRIES: i32 = 0;

/// 发起一次选课所需的全部信息
#[derive(Clone, Debug)]
pub struct SelectionRequest {
    pub course_type: String,
    pub username: String,
    pub email: String,
    pub cookie: String,
    pub port: String,
    /// 加密的燃料令牌
    pub fuel: String,
    /// 目标课程列表 (course_name, course_id)，按提交顺序尝试
    pub goals: Vec<(String, String)>,
}

/// 任务生命周期管理：发起、停止、取消
///
/// 任务身份 job_id = `{username}-{fuel_id}`，保证同一份燃料
/// 同时最多驱动一个活跃任务。
pub struct TaskManager {
    db: Arc<DatabaseConnection>,
    queue: JobQueue,
    settings: Settings,
}

impl TaskManager {
    pub fn new(db: Arc<DatabaseConnection>, queue: JobQueue, settings: Settings) -> Self {
        Self {
            db,
            queue,
            settings,
        }
    }

    /// 校验并占用燃料，解密出燃料记录 id
    async fn acquire_fuel(&self, fuel: &str) -> Result<i32, SelectionError> {
        if !security::is_fuel_shaped(fuel) {
            return Err(SelectionError::TokenInvalid);
        }
        let plain = security::decrypt_fuel(fuel, &self.settings.fuel_key)?;
        let fuel_id: i32 = plain.parse().map_err(|_| SelectionError::TokenInvalid)?;

        let record = FuelRepository::find(&self.db, fuel_id).await?;
        if record.is_none() {
            return Err(SelectionError::TokenInvalid);
        }
        if !FuelRepository::mark_in_use(&self.db, fuel_id).await? {
            return Err(SelectionError::FuelUnavailable);
        }
        Ok(fuel_id)
    }

    /// 发起选课任务；返回 job_id
    ///
    /// 燃料占用发生在入队之前：入队被去重拒绝时立刻释放占用，
    /// 保证"发起失败不消耗可用性"。
    pub async fn enqueue_selection(
        &self,
        request: SelectionRequest,
    ) -> Result<String, SelectionError> {
        if request.goals.is_empty() {
            return Err(SelectionError::Submission("目标课程列表为空".to_string()));
        }
        let fuel_id = self.acquire_fuel(&request.fuel).await?;
        let job_id = format!("{}-{}", request.username, fuel_id);

        let payload = SelectCoursePayload {
            course_type: request.course_type.clone(),
            username: request.username.clone(),
            email: request.email,
            cookie: request.cookie,
            port: request.port,
            fuel_id,
            goals: request.goals,
        };
        let enqueued = self
            .queue
            .enqueue_job(
                TASK_SELECT_COURSE,
                &job_id,
                &payload,
                self.settings.max_tries as i32,
            )
            .await;

        match enqueued {
            Ok(Some(_)) => {
                info!(
                    "▶ 选课任务已发起: {} [{}]",
                    job_id, request.course_type
                );
                Ok(job_id)
            }
            Ok(None) => {
                // 同一份燃料已有活跃任务在跑
                FuelRepository::release(&self.db, fuel_id).await?;
                Err(SelectionError::FuelUnavailable)
            }
            Err(e) => {
                if let Err(re) = FuelRepository::release(&self.db, fuel_id).await {
                    warn!("⚠ 燃料释放失败 [{}]: {}", fuel_id, re);
                }
                Err(e)
            }
        }
    }

    /// 发起周期性已选人数查询；重复发起会被 job_id 去重
    pub async fn enqueue_periodic(
        &self,
        course_type: &str,
        username: &str,
        cookie: &str,
        port: &str,
        frequency: u64,
    ) -> Result<Option<String>, SelectionError> {
        // 先清掉上一轮残留的停止标记，否则新任务会立刻退出
        StopFlagRepository::clear(&self.db, course_type).await?;

        let job_id = format!("monitor-{}", course_type);
        let payload = QuerySelectedPayload {
            course_type: course_type.to_string(),
            username: username.to_string(),
            cookie: cookie.to_string(),
            port: port.to_string(),
            frequency,
        };
        let enqueued = self
            .queue
            .enqueue_job(TASK_QUERY_SELECTED, &job_id, &payload, MONITOR_MAX_RETRIES)
            .await?;
        Ok(enqueued.map(|_| job_id))
    }

    /// 软停止：置停止标记，任务在下一个轮询周期自行退出
    pub async fn stop(&self, course_type: &str) -> Result<(), SelectionError> {
        StopFlagRepository::set(&self.db, course_type).await?;
        info!("🛑 已下发停止标记: {}", course_type);
        Ok(())
    }

    /// 硬取消选课任务；活跃任务被终止时返回 true，且恰好返回一次
    ///
    /// 取消成功后把燃料改回可用，并把尚未成功的提交记录标记为 canceled。
    pub async fn abort_selection(
        &self,
        username: &str,
        fuel: &str,
    ) -> Result<bool, SelectionError> {
        let plain = security::decrypt_fuel(fuel, &self.settings.fuel_key)?;
        let fuel_id: i32 = plain.parse().map_err(|_| SelectionError::TokenInvalid)?;
        let job_id = format!("{}-{}", username, fuel_id);

        let aborted = self.queue.abort(&job_id).await?;
        if !aborted {
            return Ok(false);
        }

        FuelRepository::set_status(&self.db, fuel_id, FUEL_STATUS_UNUSED).await?;
        FuelRepository::release(&self.db, fuel_id).await?;
        self.cancel_pending_records(&job_id, username).await;
        Ok(true)
    }

    /// 把被取消任务的未成功提交记录标记为 canceled；已成功的保持不动
    async fn cancel_pending_records(&self, job_id: &str, username: &str) {
        let job = match JobRepository::find_by_job_id(&self.db, job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                warn!("⚠ 取消后查任务失败 [{}]: {}", job_id, e);
                return;
            }
        };
        let payload: SelectCoursePayload = match serde_json::from_str(&job.payload) {
            Ok(p) => p,
            Err(e) => {
                warn!("⚠ 取消后任务参数解码失败 [{}]: {}", job_id, e);
                return;
            }
        };

        for (course_name, _) in &payload.goals {
            let log_key = format!("{}-{}", username, course_name);
            match SelectedRepository::find_by_log_key(&self.db, &log_key).await {
                Ok(Some(record)) if record.status == SELECTED_STATUS_UNUSED => {
                    if let Err(e) =
                        SelectedRepository::set_status(&self.db, record.id, SELECTED_STATUS_CANCELED)
                            .await
                    {
                        warn!("⚠ 提交记录取消失败 [{}]: {}", log_key, e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("⚠ 取消后查提交记录失败 [{}]: {}", log_key, e),
            }
        }
    }
}
