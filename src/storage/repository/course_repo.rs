use crate::storage::entity::course::{self, ActiveModel as CourseActiveModel, Entity as Course};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

pub struct CourseRepository;

impl CourseRepository {
    pub async fn upsert(
        db: &DatabaseConnection,
        course_id: &str,
        course_name: &str,
        course_type: &str,
        capacity: i32,
    ) -> Result<i32, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let exists = Course::find()
            .filter(course::Column::CourseId.eq(course_id))
            .filter(course::Column::CourseType.eq(course_type))
            .one(db)
            .await?;

        if let Some(model) = exists {
            let id = model.id;
            let mut am: CourseActiveModel = model.into();
            am.course_name = Set(course_name.to_string());
            am.capacity = Set(capacity);
            am.updated_at = Set(now);
            am.update(db).await?;
            return Ok(id);
        }

        let active_model = CourseActiveModel {
            course_id: Set(course_id.to_string()),
            course_name: Set(course_name.to_string()),
            course_type: Set(course_type.to_string()),
            selected_count: Set(0),
            capacity: Set(capacity),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let result = active_model.insert(db).await?;
        Ok(result.id)
    }

    /// 定时任务刷新某门课的已选人数
    pub async fn update_selected_count(
        db: &DatabaseConnection,
        course_id: &str,
        course_type: &str,
        selected_count: i32,
    ) -> Result<u64, sea_orm::DbErr> {
        let res = Course::update_many()
            .col_expr(course::Column::SelectedCount, Expr::value(selected_count))
            .col_expr(course::Column::UpdatedAt, Expr::value(Utc::now().timestamp()))
            .filter(course::Column::CourseId.eq(course_id))
            .filter(course::Column::CourseType.eq(course_type))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn list_by_type(
        db: &DatabaseConnection,
        course_type: &str,
    ) -> Result<Vec<course::Model>, sea_orm::DbErr> {
        Course::find()
            .filter(course::Column::CourseType.eq(course_type))
            .order_by_asc(course::Column::Id)
            .all(db)
            .await
    }

    /// 分页查询某类课程（页码从 1 开始）
    pub async fn query(
        db: &DatabaseConnection,
        course_type: &str,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<course::Model>, u64), sea_orm::DbErr> {
        let paginator = Course::find()
            .filter(course::Column::CourseType.eq(course_type))
            .order_by_asc(course::Column::Id)
            .paginate(db, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }
}
