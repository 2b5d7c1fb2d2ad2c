use log::{info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::payload::QuerySelectedPayload;
use crate::conf::Settings;
use crate::error::SelectionError;
use crate::selector::{fetch_sections, fetch_window_id, ResolveContext, SelectorConfig};
use crate::session::PortalSession;
use crate::storage::repository::{CourseRepository, StopFlagRepository};

/// 连续失败多少个周期后放弃本轮定时任务
const MAX_CONSECUTIVE_FAILURES: usize = 5;

/// 协作式取消令牌：每个轮询周期查一次共享的停止标记
pub struct StopToken {
    db: Arc<DatabaseConnection>,
    course_type: String,
}

impl StopToken {
    pub fn new(db: Arc<DatabaseConnection>, course_type: &str) -> Self {
        Self {
            db,
            course_type: course_type.to_string(),
        }
    }

    pub async fn is_set(&self) -> bool {
        match StopFlagRepository::is_set(&self.db, &self.course_type).await {
            Ok(stopped) => stopped,
            Err(e) => {
                warn!("⚠ 停止标记查询失败 [{}]: {}", self.course_type, e);
                false
            }
        }
    }
}

/// 周期性查询已选人数任务
///
/// 每个周期刷新目录里该类型所有课程的已选人数；
/// 观察到停止标记时无错误退出（最多滞后一个轮询间隔）。
pub async fn run_query_selected(
    db: Arc<DatabaseConnection>,
    settings: &Settings,
    payload: &QuerySelectedPayload,
) -> Result<(), SelectionError> {
    let session = PortalSession::new(&payload.cookie, &payload.port, settings)?;
    let config = SelectorConfig::new(&payload.username, settings);
    let stop = StopToken::new(db.clone(), &payload.course_type);
    let interval = Duration::from_secs(payload.frequency.max(1));

    let mut consecutive_failures = 0usize;
    loop {
        if stop.is_set().await {
            info!("🛑 观察到停止标记，已选人数任务退出: {}", payload.course_type);
            return Ok(());
        }

        match poll_once(&db, &session, &config, &payload.course_type).await {
            Ok(0) => {
                info!("课程目录为空，已选人数任务退出: {}", payload.course_type);
                return Ok(());
            }
            Ok(updated) => {
                consecutive_failures = 0;
                info!(
                    "✓ 已选人数刷新完成 [{}]: {} 门课程",
                    payload.course_type, updated
                );
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    "⚠ 已选人数查询失败 [{}] ({}/{}): {}",
                    payload.course_type, consecutive_failures, MAX_CONSECUTIVE_FAILURES, e
                );
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(e);
                }
            }
        }

        sleep(interval).await;
    }
}

/// 刷新一轮：解析 xkkz_id，逐门课程统计各教学班的已选人数
async fn poll_once(
    db: &Arc<DatabaseConnection>,
    session: &PortalSession,
    config: &SelectorConfig,
    course_type: &str,
) -> Result<usize, SelectionError> {
    let courses = CourseRepository::list_by_type(db, course_type).await?;
    if courses.is_empty() {
        return Ok(0);
    }

    let ctx = ResolveContext {
        session,
        config,
        kch_id: "",
    };
    let xkkz_id = fetch_window_id(&ctx, course_type).await?;

    let mut updated = 0usize;
    for course in &courses {
        let ctx = ResolveContext {
            session,
            config,
            kch_id: &course.course_id,
        };
        let sections = fetch_sections(&ctx, course_type, &xkkz_id).await?;
        let selected: i32 = sections.iter().map(|s| s.selected_count).sum();
        CourseRepository::update_selected_count(db, &course.course_id, course_type, selected)
            .await?;
        updated += 1;
    }
    Ok(updated)
}
