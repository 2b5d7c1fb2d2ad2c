use log::info;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(10)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Info);

    let db = Database::connect(opt).await?;

    // 启用 WAL 模式（内存库会忽略该 PRAGMA）
    if db.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
        let _ = db
            .execute(sea_orm::Statement::from_string(
                sea_orm::DatabaseBackend::Sqlite,
                "PRAGMA journal_mode=WAL;".to_string(),
            ))
            .await?;
    }

    // 创建表（如果不存在）
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let stmt = builder.build(
        schema
            .create_table_from_entity(crate::storage::entity::selected_record::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(crate::storage::entity::failed_record::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(crate::storage::entity::fuel::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(crate::storage::entity::course::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(crate::storage::entity::selection_job::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(crate::storage::entity::stop_flag::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(crate::storage::entity::run_log::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    // 唯一索引：同一门课在目录里只保留一行
    let _ = db
        .execute(sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_courses_unique ON courses(course_id, course_type);"
                .to_string(),
        ))
        .await?;

    info!("Database connection established with WAL mode and table initialized.");

    Ok(db)
}
