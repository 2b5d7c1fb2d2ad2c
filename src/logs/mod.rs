use chrono::Utc;
use log::warn;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::storage::repository::RunLogRepository;

/// 一条运行日志事件，按 log_key（`{username}-{course_name}`）归属
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEvent {
    pub log_key: String,
    pub step: String,
    pub message: String,
    pub timestamp: i64,
}

/// 运行日志集线器：单写多读的广播通道
///
/// 订阅者拿到的是一个句柄，句柄随任务结束或出错被 drop 时
/// 订阅自动释放，不会泄漏。
pub struct LogHub {
    tx: broadcast::Sender<LogEvent>,
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> LogSubscription {
        LogSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn publish(&self, event: LogEvent) {
        // 没有任何订阅者时发送会失败，属于正常情况
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct LogSubscription {
    rx: broadcast::Receiver<LogEvent>,
}

impl LogSubscription {
    pub async fn recv(&mut self) -> Option<LogEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                // 消费太慢被挤掉若干条时继续读后面的
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// 绑定到单次选课运行的日志写入器：落库 + 广播
pub struct RunningLog {
    db: Arc<DatabaseConnection>,
    hub: Arc<LogHub>,
    key: String,
}

impl RunningLog {
    pub fn new(db: Arc<DatabaseConnection>, hub: Arc<LogHub>, key: &str) -> Self {
        Self {
            db,
            hub,
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 记录一个步骤；日志写入失败只告警，不影响选课流程
    pub async fn record(&self, step: &str, message: &str) {
        if let Err(e) = RunLogRepository::append(&self.db, &self.key, step, message).await {
            warn!("⚠ 运行日志写入失败 [{}]: {}", self.key, e);
        }
        self.hub.publish(LogEvent {
            log_key: self.key.clone(),
            step: step.to_string(),
            message: message.to_string(),
            timestamp: Utc::now().timestamp(),
        });
    }
}
