use chrono::Utc;
use log::{info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::monitor::run_query_selected;
use super::payload::{
    QuerySelectedPayload, SelectCoursePayload, TASK_QUERY_SELECTED, TASK_SELECT_COURSE,
};
use super::queue::AbortRegistry;
use crate::conf::Settings;
use crate::error::SelectionError;
use crate::logs::LogHub;
use crate::notify::Notifier;
use crate::selector::performer::perform_selection;
use crate::selector::{AnyResolver, CourseSelector};
use crate::session::PortalSession;
use crate::storage::entity::selection_job;
use crate::storage::repository::JobRepository;

/// 常驻任务 worker：从共享队列 claim 任务并执行
pub struct TaskWorkerService {
    db: Arc<DatabaseConnection>,
    settings: Settings,
    notifier: Arc<dyn Notifier>,
    hub: Arc<LogHub>,
    registry: Arc<AbortRegistry>,
    worker_count: usize,
}

impl TaskWorkerService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        settings: Settings,
        notifier: Arc<dyn Notifier>,
        hub: Arc<LogHub>,
        registry: Arc<AbortRegistry>,
    ) -> Self {
        let worker_count = settings.worker_count;
        Self {
            db,
            settings,
            notifier,
            hub,
            registry,
            worker_count,
        }
    }

    /// 系统启动时的恢复逻辑：把中间态任务重置回队列
    pub async fn recover(&self) {
        info!("正在执行任务恢复程序...");
        match JobRepository::reset_stale_jobs(&self.db).await {
            Ok(count) if count > 0 => info!("✓ 成功恢复 {} 个中断的任务", count),
            Ok(_) => info!("未发现需要恢复的任务"),
            Err(e) => warn!("⚠ 恢复任务时出错: {}", e),
        }
    }

    /// 启动常驻 workers（并发=worker_count），队列有任务就立刻领走
    pub fn start_workers(&self) {
        for idx in 0..self.worker_count {
            let worker_id = format!("w{}", idx + 1);
            let db = self.db.clone();
            let settings = self.settings.clone();
            let notifier = self.notifier.clone();
            let hub = self.hub.clone();
            let registry = self.registry.clone();

            tokio::spawn(async move {
                loop {
                    let now = Utc::now().timestamp();
                    let job = match JobRepository::claim_next(&db, &worker_id, now).await {
                        Ok(j) => j,
                        Err(e) => {
                            warn!("⚠ claim_next 失败: {}", e);
                            sleep(Duration::from_millis(300)).await;
                            continue;
                        }
                    };

                    let Some(job) = job else {
                        // 没任务就短睡眠，避免空转
                        sleep(Duration::from_millis(300)).await;
                        continue;
                    };

                    info!(
                        "🚀 [{}] 开始任务 [{}]: {}",
                        worker_id, job.job_id, job.task_name
                    );

                    // 任务体单独 spawn，但要等 gate 放行才真正开工；
                    // 句柄先登记，取消方随时能打断
                    let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();
                    let handle = tokio::spawn({
                        let db = db.clone();
                        let settings = settings.clone();
                        let notifier = notifier.clone();
                        let hub = hub.clone();
                        let job = job.clone();
                        async move {
                            if go_rx.await.is_err() {
                                return Ok(());
                            }
                            run_task(db, settings, notifier, hub, job).await
                        }
                    });
                    registry.register(&job.job_id, handle.abort_handle());

                    // CLAIMED -> RUNNING 是条件转移：claim 之后、开工之前
                    // 被取消的任务在这里现形，不会被复活
                    let running = match JobRepository::mark_running(&db, job.id).await {
                        Ok(flag) => flag,
                        Err(e) => {
                            warn!("⚠ RUNNING 标记失败 [{}]: {}", job.job_id, e);
                            false
                        }
                    };
                    if running {
                        let _ = go_tx.send(());
                    } else {
                        handle.abort();
                    }

                    let outcome = handle.await;
                    registry.remove(&job.job_id);

                    match outcome {
                        Err(join_err) if join_err.is_cancelled() => {
                            // 状态已由取消方转入 ABORTED
                            info!("🛑 [{}] 任务已被取消 [{}]", worker_id, job.job_id);
                        }
                        Err(join_err) => {
                            let _ = JobRepository::mark_failed_permanent(
                                &db,
                                job.id,
                                &format!("任务崩溃: {}", join_err),
                            )
                            .await;
                        }
                        Ok(Ok(())) => match JobRepository::mark_done(&db, job.id).await {
                            Ok(true) => info!("✓ [{}] 任务完成 [{}]", worker_id, job.job_id),
                            Ok(false) => {
                                info!("🛑 [{}] 任务结束前已被取消 [{}]", worker_id, job.job_id)
                            }
                            Err(e) => warn!("⚠ 完成标记失败 [{}]: {}", job.job_id, e),
                        },
                        Ok(Err(err)) => {
                            Self::handle_error(&db, &job, err).await;
                        }
                    }
                }
            });
        }
    }

    /// 处理失败结果：可重试的基础设施错误按退避重新排队
    async fn handle_error(db: &Arc<DatabaseConnection>, job: &selection_job::Model, err: SelectionError) {
        warn!("✗ 任务执行失败 [{}]: {}", job.job_id, err);

        let can_retry = err.retryable() && job.retry_count < job.max_retries;
        if can_retry {
            // 指数退避（base=5s，cap=600s，带少量 jitter）
            let base = 5u64;
            let cap = 600u64;
            let exp = (1u64 << (job.retry_count as u32).min(10)).saturating_mul(base);
            let mut delay = exp.min(cap);
            delay = delay + (delay / 5) * (rand::random::<u8>() as u64 % 5) / 5;
            let next_run_at = Utc::now().timestamp() + delay as i64;

            let _ = JobRepository::mark_failed_retryable(db, job.id, &err.to_string(), next_run_at)
                .await;
            info!(
                "⚠ 任务重试 [{}/{}]: {}",
                job.retry_count + 1,
                job.max_retries,
                job.job_id
            );
        } else {
            let _ = JobRepository::mark_failed_permanent(db, job.id, &err.to_string()).await;
        }
    }
}

/// 按任务类型分派执行
async fn run_task(
    db: Arc<DatabaseConnection>,
    settings: Settings,
    notifier: Arc<dyn Notifier>,
    hub: Arc<LogHub>,
    job: selection_job::Model,
) -> Result<(), SelectionError> {
    match job.task_name.as_str() {
        TASK_SELECT_COURSE => {
            let payload: SelectCoursePayload = serde_json::from_str(&job.payload)
                .map_err(|e| SelectionError::Submission(format!("任务参数解码失败: {}", e)))?;
            let session = PortalSession::new(&payload.cookie, &payload.port, &settings)?;
            let resolver = AnyResolver::from_course_type(&payload.course_type, &settings)?;
            let mut selector = CourseSelector::new(
                &payload.username,
                session,
                resolver,
                db.clone(),
                notifier.clone(),
                hub.clone(),
                &settings,
            );
            perform_selection(
                &db,
                &notifier,
                &mut selector,
                &payload.email,
                payload.fuel_id,
                &payload.goals,
            )
            .await
        }
        TASK_QUERY_SELECTED => {
            let payload: QuerySelectedPayload = serde_json::from_str(&job.payload)
                .map_err(|e| SelectionError::Submission(format!("任务参数解码失败: {}", e)))?;
            run_query_selected(db, &settings, &payload).await
        }
        other => Err(SelectionError::Submission(format!(
            "未知任务类型: {}",
            other
        ))),
    }
}
