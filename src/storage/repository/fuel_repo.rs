use crate::error::SelectionError;
use crate::security;
use crate::storage::entity::fuel::{self, ActiveModel as FuelActiveModel, Entity as Fuel};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

/// 燃料状态
pub const FUEL_STATUS_UNUSED: &str = "unused";
pub const FUEL_STATUS_USED: &str = "used";

pub struct FuelRepository;

impl FuelRepository {
    /// 生成一份燃料：落库后用记录 id 加密出一次性令牌
    pub async fn create(
        db: &DatabaseConnection,
        username: &str,
        key: &str,
    ) -> Result<(i32, String), SelectionError> {
        let now = Utc::now().timestamp();
        let active_model = FuelActiveModel {
            username: Set(username.to_string()),
            status: Set(FUEL_STATUS_UNUSED.to_string()),
            in_use: Set(false),
            used_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let result = active_model.insert(db).await?;
        let token = security::encrypt_fuel(&result.id.to_string(), key)?;
        Ok((result.id, token))
    }

    /// 占用燃料：只有 unused 且未被占用的记录才能占用成功
    ///
    /// 条件更新保证同一份燃料最多只有一个任务并发持有。
    pub async fn mark_in_use(db: &DatabaseConnection, id: i32) -> Result<bool, sea_orm::DbErr> {
        let res = Fuel::update_many()
            .col_expr(fuel::Column::InUse, Expr::value(true))
            .col_expr(fuel::Column::UpdatedAt, Expr::value(Utc::now().timestamp()))
            .filter(fuel::Column::Id.eq(id))
            .filter(fuel::Column::Status.eq(FUEL_STATUS_UNUSED))
            .filter(fuel::Column::InUse.eq(false))
            .exec(db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// 释放占用（成功或用尽目标后都要调用，且只调用一次）
    pub async fn release(db: &DatabaseConnection, id: i32) -> Result<(), sea_orm::DbErr> {
        Fuel::update_many()
            .col_expr(fuel::Column::InUse, Expr::value(false))
            .col_expr(fuel::Column::UpdatedAt, Expr::value(Utc::now().timestamp()))
            .filter(fuel::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// 选课成功后消耗燃料，绑定最后一次使用的用户
    pub async fn mark_used(
        db: &DatabaseConnection,
        id: i32,
        username: &str,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let update = FuelActiveModel {
            id: Set(id),
            username: Set(username.to_string()),
            status: Set(FUEL_STATUS_USED.to_string()),
            used_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        update.update(db).await?;
        Ok(())
    }

    /// 取消任务后把燃料改回 unused，使其可被再次使用
    pub async fn set_status(
        db: &DatabaseConnection,
        id: i32,
        status: &str,
    ) -> Result<(), sea_orm::DbErr> {
        let update = FuelActiveModel {
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
    ) -> Result<Option<fuel::Model>, sea_orm::DbErr> {
        Fuel::find_by_id(id).one(db).await
    }

    /// 分页查询（页码从 1 开始），按创建时间倒序
    pub async fn query(
        db: &DatabaseConnection,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<fuel::Model>, u64), sea_orm::DbErr> {
        let paginator = Fuel::find()
            .order_by_desc(fuel::Column::CreatedAt)
            .paginate(db, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }
}
