use log::{info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use super::{CourseSelect, SELECT_SUCCESS};
use crate::error::SelectionError;
use crate::notify::Notifier;
use crate::storage::repository::{FuelRepository, SelectedRepository};

/// 选课执行器：代理调用选课器，按提交顺序逐个尝试目标课程
///
/// 第一门抢到即停，一份燃料一轮只换一门课；
/// 不论成功、目标用尽还是存储错误上抛，燃料占用都恰好释放一次。
pub async fn perform_selection<S: CourseSelect>(
    db: &Arc<DatabaseConnection>,
    notifier: &Arc<dyn Notifier>,
    selector: &mut S,
    email: &str,
    fuel_id: i32,
    goals: &[(String, String)],
) -> Result<(), SelectionError> {
    let result = run_goals(db, notifier, selector, email, fuel_id, goals).await;

    match FuelRepository::release(db, fuel_id).await {
        Ok(()) => result,
        Err(release_err) => match result {
            // 正常跑完但释放失败：这是本轮唯一的错误，需要上抛重试
            Ok(()) => Err(SelectionError::Db(release_err)),
            Err(run_err) => {
                warn!("⚠ 燃料释放失败 [fuel={}]: {}", fuel_id, release_err);
                Err(run_err)
            }
        },
    }
}

async fn run_goals<S: CourseSelect>(
    db: &Arc<DatabaseConnection>,
    notifier: &Arc<dyn Notifier>,
    selector: &mut S,
    email: &str,
    fuel_id: i32,
    goals: &[(String, String)],
) -> Result<(), SelectionError> {
    for (course_name, course_id) in goals {
        selector
            .update_selector_info(course_name, course_id, email)
            .await?;

        if selector.select().await != SELECT_SUCCESS {
            continue;
        }

        // 选上了：消耗燃料、落成功记录、发成功邮件，然后立即收手
        FuelRepository::mark_used(db, fuel_id, selector.username()).await?;
        if let Some(record_id) = selector.latest_record_id() {
            SelectedRepository::mark_success(db, record_id).await?;
        }
        if let Err(e) = notifier
            .send(email, selector.username(), course_name, true, None)
            .await
        {
            // 通知只是尽力而为，持久化记录才是事实
            warn!(
                "⚠ 成功邮件发送失败: {}-{}: {}",
                selector.username(),
                course_name,
                e
            );
        }
        info!("🚀 本轮选课结束: {} 抢到《{}》", selector.username(), course_name);
        return Ok(());
    }

    info!("✗ 目标用尽，本轮未抢到课程: {}", selector.username());
    Ok(())
}
