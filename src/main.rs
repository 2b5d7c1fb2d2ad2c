use chrono::Local;
use log::info;
use std::sync::Arc;

use snatcher::conf::Settings;
use snatcher::logs::LogHub;
use snatcher::notify::SmtpMailer;
use snatcher::storage::connection::establish_connection;
use snatcher::tasks::{AbortRegistry, TaskWorkerService};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = std::path::PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("worker-{}.log", ts));
    let log_file = std::fs::File::create(log_path)?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file))) // 核心：重定向输出到文件
        .filter_level(log::LevelFilter::Warn)
        .filter_module("snatcher", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    let settings = Settings::from_env();
    let db = Arc::new(establish_connection(&settings.database_url).await?);
    let notifier = Arc::new(SmtpMailer::from_settings(&settings));
    let hub = Arc::new(LogHub::new(256));
    let registry = Arc::new(AbortRegistry::default());

    let workers = TaskWorkerService::new(
        db.clone(),
        settings.clone(),
        notifier,
        hub,
        registry,
    );
    // 上次异常退出留下的中间态任务先回收再开工
    workers.recover().await;
    workers.start_workers();
    info!("🚀 worker 已启动，等待任务...");

    tokio::signal::ctrl_c().await?;
    info!("🛑 收到退出信号，worker 进程关闭");
    Ok(())
}
