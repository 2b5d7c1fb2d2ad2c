use crate::storage::entity::stop_flag::{
    self, ActiveModel as StopFlagActiveModel, Entity as StopFlag,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

pub struct StopFlagRepository;

impl StopFlagRepository {
    /// 置位停止标记；运行中的任务会在下一个轮询周期观察到
    pub async fn set(db: &DatabaseConnection, course_type: &str) -> Result<(), sea_orm::DbErr> {
        Self::write(db, course_type, true).await
    }

    /// 清除标记（发起新的定时任务之前调用）
    pub async fn clear(db: &DatabaseConnection, course_type: &str) -> Result<(), sea_orm::DbErr> {
        Self::write(db, course_type, false).await
    }

    pub async fn is_set(
        db: &DatabaseConnection,
        course_type: &str,
    ) -> Result<bool, sea_orm::DbErr> {
        let flag = StopFlag::find()
            .filter(stop_flag::Column::CourseType.eq(course_type))
            .one(db)
            .await?;
        Ok(flag.map(|f| f.stopped).unwrap_or(false))
    }

    async fn write(
        db: &DatabaseConnection,
        course_type: &str,
        stopped: bool,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let res = StopFlag::update_many()
            .col_expr(stop_flag::Column::Stopped, Expr::value(stopped))
            .col_expr(stop_flag::Column::UpdatedAt, Expr::value(now))
            .filter(stop_flag::Column::CourseType.eq(course_type))
            .exec(db)
            .await?;
        if res.rows_affected == 0 {
            let active_model = StopFlagActiveModel {
                course_type: Set(course_type.to_string()),
                stopped: Set(stopped),
                updated_at: Set(now),
                ..Default::default()
            };
            active_model.insert(db).await?;
        }
        Ok(())
    }
}
