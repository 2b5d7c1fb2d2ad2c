/// 选课过程中的错误分型
///
/// 选课器内部的失败（凭证缺失、响应形状异常、提交被拒、超时）
/// 一律在 `select()` 内部记录后转换为结果码，不会越过选课器边界；
/// 存储层错误允许上抛到 worker，由任务队列按重试策略处理。
#[derive(thiserror::Error, Debug)]
pub enum SelectionError {
    #[error("凭证缺失或无效: {0}")]
    Credential(String),
    #[error("教务系统响应形状异常: {0}")]
    UpstreamShape(String),
    #[error("选课提交失败: {0}")]
    Submission(String),
    #[error("请求超时: {0}")]
    Timeout(String),
    #[error("通知发送失败: {0}")]
    Notification(String),
    #[error("燃料无效")]
    TokenInvalid,
    #[error("燃料不可用（已消耗或正被占用）")]
    FuelUnavailable,
    #[error("http error: {0}")]
    Http(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl SelectionError {
    /// 是否属于可由任务队列重试的基础设施错误
    pub fn retryable(&self) -> bool {
        matches!(self, SelectionError::Db(_) | SelectionError::Http(_))
    }
}

impl From<reqwest::Error> for SelectionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SelectionError::Timeout(err.to_string())
        } else {
            SelectionError::Http(err.to_string())
        }
    }
}
