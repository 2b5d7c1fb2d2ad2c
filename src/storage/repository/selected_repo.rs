use crate::storage::entity::selected_record::{
    self, ActiveModel as SelectedActiveModel, Entity as SelectedRecord,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

/// 已提交记录状态
pub const SELECTED_STATUS_UNUSED: &str = "unused";
pub const SELECTED_STATUS_SELECTED: &str = "selected";
pub const SELECTED_STATUS_CANCELED: &str = "canceled";

pub struct SelectedRepository;

impl SelectedRepository {
    /// 选课尝试开始时创建一条记录，初始状态 unused
    pub async fn create(
        db: &DatabaseConnection,
        username: &str,
        email: &str,
        course_name: &str,
        log_key: &str,
    ) -> Result<i32, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let active_model = SelectedActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            course_name: Set(course_name.to_string()),
            log_key: Set(log_key.to_string()),
            status: Set(SELECTED_STATUS_UNUSED.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let result = active_model.insert(db).await?;
        Ok(result.id)
    }

    /// 选课成功后标记为 selected
    pub async fn mark_success(db: &DatabaseConnection, id: i32) -> Result<(), sea_orm::DbErr> {
        Self::set_status(db, id, SELECTED_STATUS_SELECTED).await
    }

    pub async fn set_status(
        db: &DatabaseConnection,
        id: i32,
        status: &str,
    ) -> Result<(), sea_orm::DbErr> {
        let update = SelectedActiveModel {
            id: Set(id),
            status: Set(status.to_string()),
            updated_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };
        update.update(db).await?;
        Ok(())
    }

    pub async fn find(
        db: &DatabaseConnection,
        id: i32,
    ) -> Result<Option<selected_record::Model>, sea_orm::DbErr> {
        SelectedRecord::find_by_id(id).one(db).await
    }

    pub async fn find_by_log_key(
        db: &DatabaseConnection,
        log_key: &str,
    ) -> Result<Option<selected_record::Model>, sea_orm::DbErr> {
        SelectedRecord::find()
            .filter(selected_record::Column::LogKey.eq(log_key))
            .order_by_desc(selected_record::Column::CreatedAt)
            .one(db)
            .await
    }

    /// 分页查询（页码从 1 开始），按更新时间倒序
    pub async fn query(
        db: &DatabaseConnection,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<selected_record::Model>, u64), sea_orm::DbErr> {
        let paginator = SelectedRecord::find()
            .order_by_desc(selected_record::Column::UpdatedAt)
            .paginate(db, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }
}
