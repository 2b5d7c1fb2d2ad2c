use crate::storage::entity::failed_record::{
    self, ActiveModel as FailedActiveModel, Entity as FailedRecord,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set,
};

pub struct FailedRepository;

impl FailedRepository {
    pub async fn create(
        db: &DatabaseConnection,
        username: &str,
        course_name: &str,
        log_key: &str,
        failed_reason: &str,
        port: &str,
    ) -> Result<i32, sea_orm::DbErr> {
        let active_model = FailedActiveModel {
            username: Set(username.to_string()),
            course_name: Set(course_name.to_string()),
            log_key: Set(log_key.to_string()),
            failed_reason: Set(failed_reason.to_string()),
            port: Set(port.to_string()),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };
        let result = active_model.insert(db).await?;
        Ok(result.id)
    }

    /// 分页查询（页码从 1 开始），按创建时间倒序
    pub async fn query(
        db: &DatabaseConnection,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<failed_record::Model>, u64), sea_orm::DbErr> {
        let paginator = FailedRecord::find()
            .order_by_desc(failed_record::Column::CreatedAt)
            .paginate(db, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }
}
