use crate::storage::entity::selection_job::{
    self, ActiveModel as JobActiveModel, Entity as SelectionJob,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

/// 任务状态
pub const JOB_STATUS_QUEUED: &str = "QUEUED";
pub const JOB_STATUS_CLAIMED: &str = "CLAIMED";
pub const JOB_STATUS_RUNNING: &str = "RUNNING";
pub const JOB_STATUS_DONE: &str = "DONE";
pub const JOB_STATUS_RETRY_WAIT: &str = "RETRY_WAIT";
pub const JOB_STATUS_FAILED_PERMANENT: &str = "FAILED_PERMANENT";
pub const JOB_STATUS_ABORTED: &str = "ABORTED";

/// 仍然"活着"的状态：去重与取消都以此为准
const LIVE_STATUSES: [&str; 4] = [
    JOB_STATUS_QUEUED,
    JOB_STATUS_CLAIMED,
    JOB_STATUS_RUNNING,
    JOB_STATUS_RETRY_WAIT,
];

pub struct JobRepository;

impl JobRepository {
    /// 入队；同一 job_id 已有活跃任务时返回 None，避免重复提交
    pub async fn enqueue(
        db: &DatabaseConnection,
        task_name: &str,
        job_id: &str,
        payload: String,
        max_retries: i32,
    ) -> Result<Option<i32>, sea_orm::DbErr> {
        let exists = SelectionJob::find()
            .filter(selection_job::Column::JobId.eq(job_id))
            .filter(selection_job::Column::Status.is_in(LIVE_STATUSES))
            .one(db)
            .await?;
        if exists.is_some() {
            return Ok(None);
        }

        let now = Utc::now().timestamp();
        let active_model = JobActiveModel {
            job_id: Set(job_id.to_string()),
            task_name: Set(task_name.to_string()),
            payload: Set(payload),
            status: Set(JOB_STATUS_QUEUED.to_string()),
            retry_count: Set(0),
            max_retries: Set(max_retries),
            next_run_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let result = active_model.insert(db).await?;
        Ok(Some(result.id))
    }

    /// 原子性 claim 下一条可执行任务
    /// 规则：
    /// - status in (QUEUED, RETRY_WAIT)
    /// - next_run_at <= now
    /// - created_at ASC
    pub async fn claim_next(
        db: &DatabaseConnection,
        worker_id: &str,
        now: i64,
    ) -> Result<Option<selection_job::Model>, sea_orm::DbErr> {
        // 使用 SeaORM 事务，确保 select+update 在同一连接上完成
        let txn = db.begin().await?;

        let picked = SelectionJob::find()
            .filter(
                selection_job::Column::Status
                    .eq(JOB_STATUS_QUEUED)
                    .or(selection_job::Column::Status.eq(JOB_STATUS_RETRY_WAIT)),
            )
            .filter(selection_job::Column::NextRunAt.lte(now))
            .order_by_asc(selection_job::Column::CreatedAt)
            .one(&txn)
            .await?;

        if let Some(job) = picked {
            let id = job.id;
            let now2 = Utc::now().timestamp();
            SelectionJob::update_many()
                .col_expr(selection_job::Column::Status, Expr::value(JOB_STATUS_CLAIMED))
                .col_expr(
                    selection_job::Column::ClaimedBy,
                    Expr::value(worker_id.to_string()),
                )
                .col_expr(selection_job::Column::ClaimedAt, Expr::value(now2))
                .col_expr(selection_job::Column::UpdatedAt, Expr::value(now2))
                .filter(selection_job::Column::Id.eq(id))
                .exec(&txn)
                .await?;

            txn.commit().await?;
            return SelectionJob::find_by_id(id).one(db).await;
        }

        txn.commit().await?;
        Ok(None)
    }

    /// CLAIMED → RUNNING 的条件转移
    ///
    /// claim 之后、开工之前被取消的任务在这里现形：
    /// rows_affected == 0 说明任务已不处于 CLAIMED，不能开工。
    pub async fn mark_running(db: &DatabaseConnection, id: i32) -> Result<bool, sea_orm::DbErr> {
        let res = SelectionJob::update_many()
            .col_expr(selection_job::Column::Status, Expr::value(JOB_STATUS_RUNNING))
            .col_expr(
                selection_job::Column::UpdatedAt,
                Expr::value(Utc::now().timestamp()),
            )
            .filter(selection_job::Column::Id.eq(id))
            .filter(selection_job::Column::Status.eq(JOB_STATUS_CLAIMED))
            .exec(db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// 只有仍处于 RUNNING 的任务才能标记完成，被取消的任务保持 ABORTED
    pub async fn mark_done(db: &DatabaseConnection, id: i32) -> Result<bool, sea_orm::DbErr> {
        let res = SelectionJob::update_many()
            .col_expr(selection_job::Column::Status, Expr::value(JOB_STATUS_DONE))
            .col_expr(
                selection_job::Column::UpdatedAt,
                Expr::value(Utc::now().timestamp()),
            )
            .filter(selection_job::Column::Id.eq(id))
            .filter(selection_job::Column::Status.eq(JOB_STATUS_RUNNING))
            .exec(db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    pub async fn mark_failed_retryable(
        db: &DatabaseConnection,
        id: i32,
        message: &str,
        next_run_at: i64,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        SelectionJob::update_many()
            .col_expr(
                selection_job::Column::Status,
                Expr::value(JOB_STATUS_RETRY_WAIT),
            )
            .col_expr(
                selection_job::Column::RetryCount,
                Expr::col(selection_job::Column::RetryCount).add(1),
            )
            .col_expr(selection_job::Column::NextRunAt, Expr::value(next_run_at))
            .col_expr(
                selection_job::Column::LastErrorMessage,
                Expr::value(message.to_string()),
            )
            .col_expr(selection_job::Column::UpdatedAt, Expr::value(now))
            .filter(selection_job::Column::Id.eq(id))
            .filter(selection_job::Column::Status.eq(JOB_STATUS_RUNNING))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn mark_failed_permanent(
        db: &DatabaseConnection,
        id: i32,
        message: &str,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        SelectionJob::update_many()
            .col_expr(
                selection_job::Column::Status,
                Expr::value(JOB_STATUS_FAILED_PERMANENT),
            )
            .col_expr(
                selection_job::Column::LastErrorMessage,
                Expr::value(message.to_string()),
            )
            .col_expr(selection_job::Column::UpdatedAt, Expr::value(now))
            .filter(selection_job::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// 条件取消：只有仍然活跃的任务才会被转入 ABORTED
    ///
    /// rows_affected == 1 意味着"确实终止了一个活跃任务"，
    /// 已完成或不存在的任务返回 false，不会破坏既有记录。
    pub async fn abort(db: &DatabaseConnection, job_id: &str) -> Result<bool, sea_orm::DbErr> {
        let res = SelectionJob::update_many()
            .col_expr(selection_job::Column::Status, Expr::value(JOB_STATUS_ABORTED))
            .col_expr(
                selection_job::Column::UpdatedAt,
                Expr::value(Utc::now().timestamp()),
            )
            .filter(selection_job::Column::JobId.eq(job_id))
            .filter(selection_job::Column::Status.is_in(LIVE_STATUSES))
            .exec(db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// 同一 job_id 有多条历史行时取最新的一条
    pub async fn find_by_job_id(
        db: &DatabaseConnection,
        job_id: &str,
    ) -> Result<Option<selection_job::Model>, sea_orm::DbErr> {
        SelectionJob::find()
            .filter(selection_job::Column::JobId.eq(job_id))
            .order_by_desc(selection_job::Column::CreatedAt)
            .one(db)
            .await
    }

    /// 系统启动时把中间态任务重置回 QUEUED
    pub async fn reset_stale_jobs(db: &DatabaseConnection) -> Result<u64, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let res = SelectionJob::update_many()
            .col_expr(selection_job::Column::Status, Expr::value(JOB_STATUS_QUEUED))
            .col_expr(selection_job::Column::NextRunAt, Expr::value(now))
            .col_expr(selection_job::Column::UpdatedAt, Expr::value(now))
            .filter(
                selection_job::Column::Status
                    .eq(JOB_STATUS_RUNNING)
                    .or(selection_job::Column::Status.eq(JOB_STATUS_CLAIMED)),
            )
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}
