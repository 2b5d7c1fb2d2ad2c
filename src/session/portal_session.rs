use log::{info, warn};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

use super::urls;
use crate::conf::Settings;
use crate::error::SelectionError;

/// 教务系统会话
///
/// 持有某个用户的 cookie 与端口号，所有接口地址都只由这两者推导；
/// 两者有任一缺失时拒绝创建，保证任何网络调用之前凭证已就绪。
pub struct PortalSession {
    client: Client,
    cookie: String,
    port: String,
    pub base_url: String,
    pub index_url: String,
    pub select_course_api: String,
    pub jxb_ids_api: String,
    max_tries: usize,
    retry_delay: Duration,
}

impl PortalSession {
    pub fn new(cookie: &str, port: &str, settings: &Settings) -> Result<Self, SelectionError> {
        if cookie.trim().is_empty() {
            return Err(SelectionError::Credential("cookie 为空".to_string()));
        }
        if port.trim().is_empty() {
            return Err(SelectionError::Credential("端口号为空".to_string()));
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
            .build()
            .map_err(|e| SelectionError::Http(e.to_string()))?;

        let base_url = urls::base_url(&settings.host_prefix, port);
        Ok(Self {
            client,
            cookie: cookie.to_string(),
            port: port.to_string(),
            index_url: urls::index_url(&base_url),
            select_course_api: urls::select_course_api(&base_url),
            jxb_ids_api: urls::jxb_ids_api(&base_url),
            base_url,
            max_tries: settings.max_tries,
            retry_delay: settings.retry_delay,
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// 拉取选课首页 HTML
    pub async fn get_index(&self) -> Result<String, SelectionError> {
        let resp = self
            .request(|client| client.get(&self.index_url))
            .await?;
        info!("{} get_index(...) [{}]", self, self.index_url);
        Ok(resp.text().await.map_err(SelectionError::from)?)
    }

    /// 以浏览器一致的表单编码发送 POST
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<Response, SelectionError> {
        let resp = self
            .request(|client| client.post(url).form(form))
            .await?;
        info!("{} post_form(...) [{}]", self, url);
        Ok(resp)
    }

    /// 执行 HTTP 请求（带重试）
    ///
    /// 教务系统在选课高峰会随机抽风，非预期状态码时等待后重试，
    /// 超时视为本次尝试的最终失败而不是崩溃。
    async fn request<F>(&self, builder: F) -> Result<Response, SelectionError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut last_err: Option<SelectionError> = None;

        for try_num in 1..=self.max_tries.max(1) {
            let request = builder(&self.client)
                .header("Cookie", format!("JSESSIONID={}", self.cookie));

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    if try_num > 1 {
                        info!("{} request(...) [{} tries]", self, try_num);
                    }
                    return Ok(resp);
                }
                Ok(resp) => {
                    last_err = Some(SelectionError::Http(format!(
                        "unexpected status {}",
                        resp.status()
                    )));
                }
                Err(e) => {
                    let err = SelectionError::from(e);
                    // 超时不再重试：每次尝试各自终结，重试策略交给任务队列
                    if matches!(err, SelectionError::Timeout(_)) {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
            }

            if try_num < self.max_tries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        warn!("{} request(...) [max {} tries ran out]", self, self.max_tries);
        Err(last_err.unwrap_or_else(|| SelectionError::Http("no response".to_string())))
    }
}

impl std::fmt::Display for PortalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<PortalSession [{}]>", self.port)
    }
}

impl std::fmt::Debug for PortalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<PortalSession [{}]>", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_missing_credentials() {
        let settings = Settings::from_env();
        assert!(PortalSession::new("", "16", &settings).is_err());
        assert!(PortalSession::new("ABCDEF123456", " ", &settings).is_err());
    }

    #[test]
    fn test_urls_derived_from_port() {
        let settings = Settings::from_env();
        let session = PortalSession::new("ABCDEF123456", "16", &settings).expect("创建会话失败");
        assert!(session.base_url.ends_with("16/jwglxt"));
        assert!(session
            .select_course_api
            .contains("zzxkyzbjk_xkBcZyZzxkYzb.html"));
        assert!(session.jxb_ids_api.contains("zzxkyzbjk_cxJxbWithKchZzxkYzb"));
        assert!(session.index_url.contains("layout=default"));
    }
}
