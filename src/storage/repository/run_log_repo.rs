use crate::storage::entity::run_log::{self, ActiveModel as RunLogActiveModel, Entity as RunLog};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

pub struct RunLogRepository;

impl RunLogRepository {
    pub async fn append(
        db: &DatabaseConnection,
        log_key: &str,
        step: &str,
        message: &str,
    ) -> Result<(), sea_orm::DbErr> {
        let active_model = RunLogActiveModel {
            log_key: Set(log_key.to_string()),
            step: Set(step.to_string()),
            message: Set(message.to_string()),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };
        active_model.insert(db).await?;
        Ok(())
    }

    pub async fn list_by_key(
        db: &DatabaseConnection,
        log_key: &str,
    ) -> Result<Vec<run_log::Model>, sea_orm::DbErr> {
        RunLog::find()
            .filter(run_log::Column::LogKey.eq(log_key))
            .order_by_asc(run_log::Column::Id)
            .all(db)
            .await
    }

    /// 历史日志分页（页码从 1 开始），供监控端先批量回放再订阅增量
    pub async fn query(
        db: &DatabaseConnection,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<run_log::Model>, u64), sea_orm::DbErr> {
        let paginator = RunLog::find()
            .order_by_asc(run_log::Column::Id)
            .paginate(db, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }
}
