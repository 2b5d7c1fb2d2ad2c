use std::time::Duration;

/// 全局配置
///
/// 所有字段都来自环境变量（`.env` 文件在 main 中加载），
/// 缺省值与教务系统当前学期保持一致。
#[derive(Clone, Debug)]
pub struct Settings {
    /// 选课学期码（上学期 3，下学期 12）
    pub term: i32,
    /// 选课学年码
    pub select_course_year: i32,
    /// 单次请求超时（秒）
    pub timeout: Duration,
    /// 请求失败时的最大尝试次数
    pub max_tries: usize,
    /// 尝试之间的延迟（秒）
    pub retry_delay: Duration,
    /// 教务系统所在网段前缀，端口号拼接在其后
    pub host_prefix: String,
    /// 体育课分组关键字（按校区/年级过滤教学班）
    pub pe_group_keyword: String,
    /// 燃料加密密钥（32 字节，base64 编码）
    pub fuel_key: String,
    /// 数据库连接串
    pub database_url: String,
    /// 选课结果通知邮箱配置
    pub smtp_host: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub mail_from: String,
    /// 常驻 worker 数量
    pub worker_count: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            term: std::env::var("SNATCHER_TERM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            select_course_year: std::env::var("SNATCHER_SELECT_COURSE_YEAR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2024),
            timeout: Duration::from_secs(
                std::env::var("SNATCHER_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            max_tries: std::env::var("SNATCHER_MAX_TRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            retry_delay: Duration::from_secs(
                std::env::var("SNATCHER_RETRY_DELAY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            ),
            host_prefix: std::env::var("SNATCHER_HOST_PREFIX")
                .unwrap_or_else(|_| "10.3.132.".to_string()),
            pe_group_keyword: std::env::var("SNATCHER_PE_GROUP").unwrap_or_default(),
            fuel_key: std::env::var("SNATCHER_FUEL_KEY").unwrap_or_default(),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://snatcher.db?mode=rwc".to_string()),
            smtp_host: std::env::var("SNATCHER_SMTP_HOST")
                .unwrap_or_else(|_| "smtp.qq.com".to_string()),
            smtp_username: std::env::var("SNATCHER_SMTP_USERNAME").unwrap_or_default(),
            smtp_password: std::env::var("SNATCHER_SMTP_PASSWORD").unwrap_or_default(),
            mail_from: std::env::var("SNATCHER_MAIL_FROM").unwrap_or_default(),
            worker_count: std::env::var("SNATCHER_WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}
