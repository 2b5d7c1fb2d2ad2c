pub mod performer;
pub mod variants;

use async_trait::async_trait;
use log::{info, warn};
use regex::Regex;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::sync::Arc;

use crate::conf::Settings;
use crate::error::SelectionError;
use crate::logs::{LogHub, RunningLog};
use crate::notify::Notifier;
use crate::session::PortalSession;
use crate::storage::repository::{FailedRepository, SelectedRepository};

pub use variants::{AnyResolver, CategoryResolver};

/// 选课结果码：1 成功，其余一律视为失败
pub const SELECT_SUCCESS: i32 = 1;
pub const SELECT_FAILURE: i32 = 0;

/// 选课器的不可变配置，构造时确定
#[derive(Clone, Debug)]
pub struct SelectorConfig {
    pub username: String,
    /// 选课学期码（上学期 3，下学期 12）
    pub term: i32,
    /// 选课学年码
    pub select_course_year: i32,
}

impl SelectorConfig {
    pub fn new(username: &str, settings: &Settings) -> Self {
        Self {
            username: username.to_string(),
            term: settings.term,
            select_course_year: settings.select_course_year,
        }
    }

    /// 年级 ID：学号前两位补上世纪前缀
    pub fn grade_id(&self) -> String {
        format!("20{}", self.username.get(..2).unwrap_or_default())
    }
}

/// 协议推进过程中逐步填充的运行状态
///
/// xkkz_id、jxb_ids 按固定顺序解析；提交步骤是私有的，
/// 外部只能通过 `select()` 走完整个流程。
#[derive(Default)]
struct RunState {
    kch_id: String,
    real_course_name: String,
    log_key: String,
    xkkz_id: Option<String>,
    jxb_ids: Option<String>,
    latest_record_id: Option<i32>,
}

/// 解析步骤可见的上下文
pub struct ResolveContext<'a> {
    pub session: &'a PortalSession,
    pub config: &'a SelectorConfig,
    pub kch_id: &'a str,
}

/// 一个教学班条目（从 jxb 接口解析出来）
#[derive(Clone, Debug)]
pub struct SectionInfo {
    pub do_jxb_id: String,
    pub name: String,
    pub selected_count: i32,
    pub capacity: i32,
}

/// 供执行器（performer）代理调用的选课能力
#[async_trait]
pub trait CourseSelect: Send {
    /// 切换到新的选课目标：设置课程名/课程号并写入初始提交记录
    async fn update_selector_info(
        &mut self,
        course_name: &str,
        course_id: &str,
        email: &str,
    ) -> Result<(), SelectionError>;

    /// 走完整个选课协议，返回结果码；任何失败都先记录再转换，不上抛
    async fn select(&mut self) -> i32;

    /// 最近一次 update_selector_info 写入的提交记录 id
    fn latest_record_id(&self) -> Option<i32>;

    fn username(&self) -> &str;
}

/// 课程选课器（模板方法骨架）
///
/// 固定流程 select = prepare_for_selecting(set_xkkz_id -> set_jxb_ids)
/// -> simulate_request；可变步骤由 `CategoryResolver` 提供。
pub struct CourseSelector<R: CategoryResolver> {
    config: SelectorConfig,
    session: PortalSession,
    resolver: R,
    db: Arc<DatabaseConnection>,
    notifier: Arc<dyn Notifier>,
    hub: Arc<LogHub>,
    email: String,
    state: RunState,
    log: Option<RunningLog>,
}

impl<R: CategoryResolver> CourseSelector<R> {
    pub fn new(
        username: &str,
        session: PortalSession,
        resolver: R,
        db: Arc<DatabaseConnection>,
        notifier: Arc<dyn Notifier>,
        hub: Arc<LogHub>,
        settings: &Settings,
    ) -> Self {
        Self {
            config: SelectorConfig::new(username, settings),
            session,
            resolver,
            db,
            notifier,
            hub,
            email: String::new(),
            state: RunState::default(),
            log: None,
        }
    }

    /// 依次解析 xkkz_id 与 jxb_ids，各自失败都按"课程不可选"处理
    async fn prepare_for_selecting(&mut self) -> Result<(), SelectionError> {
        let xkkz_id = {
            let ctx = ResolveContext {
                session: &self.session,
                config: &self.config,
                kch_id: &self.state.kch_id,
            };
            self.resolver.resolve_window_id(&ctx).await?
        };
        if let Some(log) = &self.log {
            log.record("set_xkkz_id", &format!("xkkz_id={}", xkkz_id)).await;
        }
        self.state.xkkz_id = Some(xkkz_id.clone());

        let jxb_ids = {
            let ctx = ResolveContext {
                session: &self.session,
                config: &self.config,
                kch_id: &self.state.kch_id,
            };
            self.resolver.resolve_section_ids(&ctx, &xkkz_id).await?
        };
        if let Some(log) = &self.log {
            log.record("set_jxb_ids", &format!("jxb_ids={}", jxb_ids)).await;
        }
        self.state.jxb_ids = Some(jxb_ids);
        Ok(())
    }

    /// 模拟浏览器提交选课表单，解析 flag 结果码
    async fn simulate_request(&mut self) -> Result<i32, SelectionError> {
        let jxb_ids = self
            .state
            .jxb_ids
            .clone()
            .ok_or_else(|| SelectionError::UpstreamShape("教学班 id 未解析".to_string()))?;

        let form = build_select_form(&jxb_ids, &self.state.kch_id);
        let url = self.session.select_course_api.clone();
        let resp = self.session.post_form(&url, &form).await?;
        let body: Value = resp.json().await.map_err(SelectionError::from)?;
        parse_select_flag(&body)
    }

    async fn try_select(&mut self) -> Result<i32, SelectionError> {
        self.prepare_for_selecting().await?;
        self.simulate_request().await
    }

    /// 失败路径：先发失败邮件（尽力而为），再写失败记录，最后才返回结果码
    async fn mark_failed(&self, failed_reason: &str) {
        if let Some(log) = &self.log {
            log.record("failed", failed_reason).await;
        }
        if let Err(e) = self
            .notifier
            .send(
                &self.email,
                &self.config.username,
                &self.state.real_course_name,
                false,
                Some(failed_reason),
            )
            .await
        {
            warn!(
                "⚠ 失败邮件发送失败: {}-{}: {}",
                self.config.username, self.state.real_course_name, e
            );
        }
        if let Err(e) = FailedRepository::create(
            &self.db,
            &self.config.username,
            &self.state.real_course_name,
            &self.state.log_key,
            failed_reason,
            self.session.port(),
        )
        .await
        {
            warn!("⚠ 失败记录写入失败 [{}]: {}", self.state.log_key, e);
        }
    }
}

#[async_trait]
impl<R: CategoryResolver> CourseSelect for CourseSelector<R> {
    async fn update_selector_info(
        &mut self,
        course_name: &str,
        course_id: &str,
        email: &str,
    ) -> Result<(), SelectionError> {
        let log_key = format!("{}-{}", self.config.username, course_name);
        let record_id = SelectedRepository::create(
            &self.db,
            &self.config.username,
            email,
            course_name,
            &log_key,
        )
        .await?;

        self.email = email.to_string();
        self.state = RunState {
            kch_id: course_id.to_string(),
            real_course_name: course_name.to_string(),
            log_key: log_key.clone(),
            xkkz_id: None,
            jxb_ids: None,
            latest_record_id: Some(record_id),
        };
        self.log = Some(RunningLog::new(self.db.clone(), self.hub.clone(), &log_key));
        Ok(())
    }

    async fn select(&mut self) -> i32 {
        match self.try_select().await {
            Ok(code) => {
                if code == SELECT_SUCCESS {
                    info!("✓ 选课成功: {}", self.state.log_key);
                    if let Some(log) = &self.log {
                        log.record("selected", "抢到啦").await;
                    }
                } else {
                    self.mark_failed("教务系统返回非成功结果").await;
                }
                code
            }
            Err(err) => {
                warn!("✗ 选课失败 [{}]: {}", self.state.log_key, err);
                self.mark_failed(&err.to_string()).await;
                SELECT_FAILURE
            }
        }
    }

    fn latest_record_id(&self) -> Option<i32> {
        self.state.latest_record_id
    }

    fn username(&self) -> &str {
        &self.config.username
    }
}

/// 从选课首页 HTML 里解析指定开课类型的 xkkz_id
///
/// 页面上每个类型的选课 tab 形如
/// `queryCourse(this,'10','B1B2C3...','...')`，第二个参数是 kklxdm。
pub fn extract_window_id(html: &str, course_type: &str) -> Result<String, SelectionError> {
    let pattern = format!(
        r"queryCourse\(this,'{}','([0-9A-Za-z]+)'",
        regex::escape(course_type)
    );
    let re = Regex::new(&pattern).unwrap();
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            SelectionError::UpstreamShape(format!("首页上找不到类型 {} 的选课入口", course_type))
        })
}

/// 获取教学班 ids 所需的表单数据（字段名必须与浏览器逐字节一致）
pub fn build_jxb_query_form(
    config: &SelectorConfig,
    course_type: &str,
    kch_id: &str,
    xkkz_id: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("bklx_id", "0".to_string()),               // 补考类型 id
        ("njdm_id", config.grade_id()),             // 年级 ID
        ("xkxnm", config.select_course_year.to_string()), // 选课学年码
        ("xkxqm", config.term.to_string()),         // 选课学期码
        ("kklxdm", course_type.to_string()),        // 开课类型代码
        ("kch_id", kch_id.to_string()),
        ("xkkz_id", xkkz_id.to_string()),
    ]
}

/// 选课提交表单
pub fn build_select_form(jxb_ids: &str, kch_id: &str) -> Vec<(&'static str, String)> {
    vec![
        ("jxb_ids", jxb_ids.to_string()),
        ("kch_id", kch_id.to_string()),
        ("qz", "0".to_string()), // 权重
    ]
}

/// 解析 jxb 接口返回的教学班数组
///
/// 响应形状异常（不是数组、缺 do_jxb_id）按"课程不可选"处理。
pub fn parse_sections(body: &Value) -> Result<Vec<SectionInfo>, SelectionError> {
    let items = body
        .as_array()
        .ok_or_else(|| SelectionError::UpstreamShape("教学班响应不是数组".to_string()))?;

    let mut sections = Vec::with_capacity(items.len());
    for item in items {
        let do_jxb_id = item
            .get("do_jxb_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SelectionError::UpstreamShape("教学班条目缺少 do_jxb_id".to_string()))?;
        let name = item
            .get("jxbmc")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        sections.push(SectionInfo {
            do_jxb_id: do_jxb_id.to_string(),
            name: name.to_string(),
            selected_count: read_count(item, "yxzrs"),
            capacity: read_count(item, "jxbrl"),
        });
    }
    Ok(sections)
}

/// 已选人数/容量字段有时是数字有时是字符串
fn read_count(item: &Value, field: &str) -> i32 {
    match item.get(field) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) as i32,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// 解析选课提交接口的结果码
pub fn parse_select_flag(body: &Value) -> Result<i32, SelectionError> {
    let flag = match body.get("flag") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(SelectionError::UpstreamShape(
                "选课响应缺少 flag 字段".to_string(),
            ))
        }
    };

    if flag == "1" {
        return Ok(SELECT_SUCCESS);
    }
    let msg = body
        .get("msg")
        .and_then(|v| v.as_str())
        .unwrap_or("课程已满或会话过期");
    Err(SelectionError::Submission(format!(
        "flag={} msg={}",
        flag, msg
    )))
}

/// 通过会话拉取教学班列表（解析步骤与定时查询共用）
pub async fn fetch_sections(
    ctx: &ResolveContext<'_>,
    course_type: &str,
    xkkz_id: &str,
) -> Result<Vec<SectionInfo>, SelectionError> {
    let form = build_jxb_query_form(ctx.config, course_type, ctx.kch_id, xkkz_id);
    let resp = ctx.session.post_form(&ctx.session.jxb_ids_api, &form).await?;
    let body: Value = resp.json().await.map_err(SelectionError::from)?;
    parse_sections(&body)
}

/// 通过会话解析某类课程的 xkkz_id
pub async fn fetch_window_id(
    ctx: &ResolveContext<'_>,
    course_type: &str,
) -> Result<String, SelectionError> {
    let html = ctx.session.get_index().await?;
    extract_window_id(&html, course_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> SelectorConfig {
        SelectorConfig {
            username: "0425220101".to_string(),
            term: 3,
            select_course_year: 2024,
        }
    }

    #[test]
    fn test_extract_window_id() {
        let html = r#"
            <a onclick="queryCourse(this,'01','F1A2B3C4D5E6','2024','3')">主修课程</a>
            <a onclick="queryCourse(this,'10','A9B8C7D6E5F4','2024','3')">通识选修课</a>
        "#;
        let id = extract_window_id(html, "10").expect("解析失败");
        assert_eq!(id, "A9B8C7D6E5F4");
        let id = extract_window_id(html, "01").expect("解析失败");
        assert_eq!(id, "F1A2B3C4D5E6");
    }

    #[test]
    fn test_extract_window_id_missing_tab() {
        let html = "<html><body>本学期无选课安排</body></html>";
        let err = extract_window_id(html, "05").unwrap_err();
        assert!(matches!(err, SelectionError::UpstreamShape(_)));
    }

    #[test]
    fn test_jxb_query_form_fields() {
        let form = build_jxb_query_form(&test_config(), "10", "1001", "A9B8");
        let get = |k: &str| {
            form.iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        assert_eq!(get("bklx_id"), "0");
        assert_eq!(get("njdm_id"), "2004"); // 学号前两位 04 -> 2004 级
        assert_eq!(get("xkxnm"), "2024");
        assert_eq!(get("xkxqm"), "3");
        assert_eq!(get("kklxdm"), "10");
        assert_eq!(get("kch_id"), "1001");
        assert_eq!(get("xkkz_id"), "A9B8");
    }

    #[test]
    fn test_select_form_fields() {
        let form = build_select_form("jxb-1,jxb-2", "1001");
        assert_eq!(form[0], ("jxb_ids", "jxb-1,jxb-2".to_string()));
        assert_eq!(form[1], ("kch_id", "1001".to_string()));
        assert_eq!(form[2], ("qz", "0".to_string()));
    }

    #[test]
    fn test_parse_sections() {
        let body = json!([
            {"do_jxb_id": "jxb-1", "jxbmc": "大学体育(1)-01班", "yxzrs": "30", "jxbrl": 40},
            {"do_jxb_id": "jxb-2", "jxbmc": "大学体育(1)-02班", "yxzrs": 40, "jxbrl": "40"}
        ]);
        let sections = parse_sections(&body).expect("解析失败");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].do_jxb_id, "jxb-1");
        assert_eq!(sections[0].selected_count, 30);
        assert_eq!(sections[1].capacity, 40);
    }

    #[test]
    fn test_parse_sections_bad_shape() {
        let body = json!({"error": "not logged in"});
        assert!(matches!(
            parse_sections(&body),
            Err(SelectionError::UpstreamShape(_))
        ));
        let body = json!([{"jxbmc": "缺 id"}]);
        assert!(matches!(
            parse_sections(&body),
            Err(SelectionError::UpstreamShape(_))
        ));
    }

    #[test]
    fn test_parse_select_flag() {
        assert_eq!(parse_select_flag(&json!({"flag": "1"})).unwrap(), 1);
        assert_eq!(parse_select_flag(&json!({"flag": 1})).unwrap(), 1);
        assert!(matches!(
            parse_select_flag(&json!({"flag": "0", "msg": "课堂容量已满"})),
            Err(SelectionError::Submission(_))
        ));
        assert!(matches!(
            parse_select_flag(&json!({"unexpected": true})),
            Err(SelectionError::UpstreamShape(_))
        ));
    }
}
