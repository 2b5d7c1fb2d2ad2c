use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::info;

use crate::conf::Settings;
use crate::error::SelectionError;

/// 选课结果通知
///
/// 通知只是尽力而为：发送失败记录日志即可，选课结果以持久化记录为准。
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        to: &str,
        username: &str,
        course_name: &str,
        success: bool,
        reason: Option<&str>,
    ) -> Result<(), SelectionError>;
}

/// SMTP 邮件通知
pub struct SmtpMailer {
    host: String,
    username: String,
    password: String,
    from: String,
}

impl SmtpMailer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.smtp_host.clone(),
            username: settings.smtp_username.clone(),
            password: settings.smtp_password.clone(),
            from: settings.mail_from.clone(),
        }
    }
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send(
        &self,
        to: &str,
        username: &str,
        course_name: &str,
        success: bool,
        reason: Option<&str>,
    ) -> Result<(), SelectionError> {
        let (subject, body) = if success {
            (
                "选课成功通知".to_string(),
                format!("{} 的课程《{}》已抢到，请登录教务系统确认。", username, course_name),
            )
        } else {
            (
                "选课失败通知".to_string(),
                format!(
                    "{} 的课程《{}》未能选上，原因：{}",
                    username,
                    course_name,
                    reason.unwrap_or("未知")
                ),
            )
        };

        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| SelectionError::Notification(format!("发件人地址无效: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| SelectionError::Notification(format!("收件人地址无效: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| SelectionError::Notification(e.to_string()))?;

        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
                .map_err(|e| SelectionError::Notification(e.to_string()))?
                .credentials(Credentials::new(
                    self.username.clone(),
                    self.password.clone(),
                ))
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| SelectionError::Notification(e.to_string()))?;

        info!("✓ 结果邮件已发送: {}-{}", username, course_name);
        Ok(())
    }
}
