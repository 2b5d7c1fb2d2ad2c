use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use snatcher::conf::Settings;
use snatcher::error::SelectionError;
use snatcher::logs::{LogHub, RunningLog};
use snatcher::notify::Notifier;
use snatcher::security;
use snatcher::selector::performer::perform_selection;
use snatcher::selector::{CourseSelect, SELECT_FAILURE, SELECT_SUCCESS};
use snatcher::storage::connection::establish_connection;
use snatcher::storage::repository::{
    FailedRepository, FuelRepository, JobRepository, RunLogRepository, SelectedRepository,
    StopFlagRepository, FUEL_STATUS_UNUSED, FUEL_STATUS_USED, JOB_STATUS_ABORTED,
    JOB_STATUS_DONE, SELECTED_STATUS_CANCELED, SELECTED_STATUS_SELECTED,
};
use snatcher::tasks::monitor::run_query_selected;
use snatcher::tasks::{
    AbortRegistry, JobQueue, QuerySelectedPayload, SelectionRequest, TaskManager,
};

async fn test_db() -> Arc<DatabaseConnection> {
    let db = establish_connection("sqlite::memory:")
        .await
        .expect("内存数据库初始化失败");
    Arc::new(db)
}

fn test_settings() -> Settings {
    Settings {
        term: 3,
        select_course_year: 2024,
        timeout: std::time::Duration::from_secs(5),
        max_tries: 3,
        retry_delay: std::time::Duration::from_millis(10),
        host_prefix: "10.3.132.".to_string(),
        pe_group_keyword: String::new(),
        fuel_key: security::generate_key(),
        database_url: "sqlite::memory:".to_string(),
        smtp_host: "smtp.example.com".to_string(),
        smtp_username: String::new(),
        smtp_password: String::new(),
        mail_from: "snatcher@example.com".to_string(),
        worker_count: 1,
    }
}

/// 记录型通知器：不真正发邮件，只记下每次调用
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, bool)>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, bool)> {
        self.sent.lock().expect("锁中毒").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        _to: &str,
        _username: &str,
        course_name: &str,
        success: bool,
        _reason: Option<&str>,
    ) -> Result<(), SelectionError> {
        self.sent
            .lock()
            .expect("锁中毒")
            .push((course_name.to_string(), success));
        Ok(())
    }
}

/// 按脚本返回结果码的选课器，记录真实的提交/失败记录
struct ScriptedSelector {
    db: Arc<DatabaseConnection>,
    username: String,
    script: Mutex<VecDeque<i32>>,
    current_course: String,
    latest_record_id: Option<i32>,
    attempts: usize,
}

impl ScriptedSelector {
    fn new(db: Arc<DatabaseConnection>, username: &str, script: Vec<i32>) -> Self {
        Self {
            db,
            username: username.to_string(),
            script: Mutex::new(script.into()),
            current_course: String::new(),
            latest_record_id: None,
            attempts: 0,
        }
    }
}

#[async_trait]
impl CourseSelect for ScriptedSelector {
    async fn update_selector_info(
        &mut self,
        course_name: &str,
        course_id: &str,
        email: &str,
    ) -> Result<(), SelectionError> {
        let log_key = format!("{}-{}", self.username, course_name);
        let record_id =
            SelectedRepository::create(&self.db, &self.username, email, course_name, &log_key)
                .await?;
        self.current_course = course_name.to_string();
        self.latest_record_id = Some(record_id);
        let _ = course_id;
        Ok(())
    }

    async fn select(&mut self) -> i32 {
        self.attempts += 1;
        let code = self
            .script
            .lock()
            .expect("锁中毒")
            .pop_front()
            .unwrap_or(SELECT_FAILURE);
        if code != SELECT_SUCCESS {
            let log_key = format!("{}-{}", self.username, self.current_course);
            FailedRepository::create(
                &self.db,
                &self.username,
                &self.current_course,
                &log_key,
                "课堂容量已满",
                "12",
            )
            .await
            .expect("失败记录写入失败");
        }
        code
    }

    fn latest_record_id(&self) -> Option<i32> {
        self.latest_record_id
    }

    fn username(&self) -> &str {
        &self.username
    }
}

#[tokio::test]
async fn test_performer_stops_at_first_success() {
    let db = test_db().await;
    let settings = test_settings();
    let (fuel_id, _token) = FuelRepository::create(&db, "0425220101", &settings.fuel_key)
        .await
        .expect("燃料创建失败");
    assert!(
        FuelRepository::mark_in_use(&db, fuel_id).await.expect("占用失败"),
        "新燃料应能占用成功"
    );

    let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::default());
    // 第一门失败、第二门成功、第三门不应被尝试
    let mut selector = ScriptedSelector::new(db.clone(), "0425220101", vec![0, 1, 1]);
    let goals = vec![
        ("高等数学".to_string(), "1001".to_string()),
        ("大学物理".to_string(), "1002".to_string()),
        ("线性代数".to_string(), "1003".to_string()),
    ];

    perform_selection(&db, &notifier, &mut selector, "a@b.edu", fuel_id, &goals)
        .await
        .expect("执行器不应报错");

    assert_eq!(selector.attempts, 2, "第一门成功后应立即收手");

    // 成功记录：大学物理 selected
    let record = SelectedRepository::find_by_log_key(&db, "0425220101-大学物理")
        .await
        .expect("查询失败")
        .expect("应有提交记录");
    assert_eq!(record.status, SELECTED_STATUS_SELECTED);

    // 失败记录：高等数学 1 条
    let (failed, total) = FailedRepository::query(&db, 1, 10).await.expect("查询失败");
    assert_eq!(total, 1);
    assert_eq!(failed[0].course_name, "高等数学");

    // 燃料已消耗且占用已释放
    let fuel = FuelRepository::find(&db, fuel_id)
        .await
        .expect("查询失败")
        .expect("燃料应存在");
    assert_eq!(fuel.status, FUEL_STATUS_USED);
    assert!(!fuel.in_use, "执行结束后燃料占用必须释放");
}

#[tokio::test]
async fn test_performer_exhausted_goals_keeps_fuel_unused() {
    let db = test_db().await;
    let settings = test_settings();
    let (fuel_id, _token) = FuelRepository::create(&db, "0425220101", &settings.fuel_key)
        .await
        .expect("燃料创建失败");
    FuelRepository::mark_in_use(&db, fuel_id).await.expect("占用失败");

    let recording = Arc::new(RecordingNotifier::default());
    let notifier: Arc<dyn Notifier> = recording.clone();
    let mut selector = ScriptedSelector::new(db.clone(), "0425220101", vec![0, 0]);
    let goals = vec![
        ("高等数学".to_string(), "1001".to_string()),
        ("大学物理".to_string(), "1002".to_string()),
    ];

    perform_selection(&db, &notifier, &mut selector, "a@b.edu", fuel_id, &goals)
        .await
        .expect("目标用尽不是错误");

    let fuel = FuelRepository::find(&db, fuel_id)
        .await
        .expect("查询失败")
        .expect("燃料应存在");
    assert_eq!(fuel.status, FUEL_STATUS_UNUSED, "没抢到课不消耗燃料");
    assert!(!fuel.in_use);

    // 没有成功邮件
    assert!(recording.sent().iter().all(|(_, success)| !success));
}

#[tokio::test]
async fn test_success_notification_sent_once() {
    let db = test_db().await;
    let settings = test_settings();
    let (fuel_id, _token) = FuelRepository::create(&db, "0425220101", &settings.fuel_key)
        .await
        .expect("燃料创建失败");
    FuelRepository::mark_in_use(&db, fuel_id).await.expect("占用失败");

    let recording = Arc::new(RecordingNotifier::default());
    let notifier: Arc<dyn Notifier> = recording.clone();
    let mut selector = ScriptedSelector::new(db.clone(), "0425220101", vec![1]);
    let goals = vec![("高等数学".to_string(), "1001".to_string())];

    perform_selection(&db, &notifier, &mut selector, "a@b.edu", fuel_id, &goals)
        .await
        .expect("执行器不应报错");

    let sent = recording.sent();
    let success_count = sent.iter().filter(|(_, s)| *s).count();
    assert_eq!(success_count, 1, "成功邮件应恰好发送一次");
    assert_eq!(sent[0].0, "高等数学");
}

#[tokio::test]
async fn test_job_enqueue_dedup_and_abort_once() {
    let db = test_db().await;
    let registry = Arc::new(AbortRegistry::default());
    let queue = JobQueue::new(db.clone(), registry);

    let payload = serde_json::json!({"k": "v"});
    let first = queue
        .enqueue_job("select_course", "0425220101-1", &payload, 3)
        .await
        .expect("入队失败");
    assert!(first.is_some(), "首次入队应成功");

    let second = queue
        .enqueue_job("select_course", "0425220101-1", &payload, 3)
        .await
        .expect("入队失败");
    assert!(second.is_none(), "同一 job_id 的活跃任务应被去重");

    // 取消恰好返回一次 true
    assert!(queue.abort("0425220101-1").await.expect("取消失败"));
    assert!(!queue.abort("0425220101-1").await.expect("取消失败"));
    assert!(!queue.abort("不存在的任务").await.expect("取消失败"));

    let job = JobRepository::find_by_job_id(&db, "0425220101-1")
        .await
        .expect("查询失败")
        .expect("任务应存在");
    assert_eq!(job.status, JOB_STATUS_ABORTED);

    // 取消后同一 job_id 可以重新入队
    let third = queue
        .enqueue_job("select_course", "0425220101-1", &payload, 3)
        .await
        .expect("入队失败");
    assert!(third.is_some(), "终态任务不阻止重新入队");
}

#[tokio::test]
async fn test_abort_completed_job_is_noop() {
    let db = test_db().await;
    let registry = Arc::new(AbortRegistry::default());
    let queue = JobQueue::new(db.clone(), registry);

    let payload = serde_json::json!({});
    let id = queue
        .enqueue_job("select_course", "0425220101-2", &payload, 3)
        .await
        .expect("入队失败")
        .expect("首次入队应成功");

    let now = chrono::Utc::now().timestamp();
    JobRepository::claim_next(&db, "w1", now)
        .await
        .expect("claim 失败")
        .expect("应领到任务");
    assert!(JobRepository::mark_running(&db, id).await.expect("状态更新失败"));
    assert!(JobRepository::mark_done(&db, id).await.expect("完成失败"));

    assert!(
        !queue.abort("0425220101-2").await.expect("取消失败"),
        "已完成的任务取消应返回 false"
    );
    let job = JobRepository::find_by_job_id(&db, "0425220101-2")
        .await
        .expect("查询失败")
        .expect("任务应存在");
    assert_eq!(job.status, JOB_STATUS_DONE, "终态记录不被取消破坏");
}

#[tokio::test]
async fn test_abort_between_claim_and_running_sticks() {
    let db = test_db().await;
    let registry = Arc::new(AbortRegistry::default());
    let queue = JobQueue::new(db.clone(), registry);

    let payload = serde_json::json!({});
    let id = queue
        .enqueue_job("select_course", "0425220101-9", &payload, 3)
        .await
        .expect("入队失败")
        .expect("首次入队应成功");

    let now = chrono::Utc::now().timestamp();
    JobRepository::claim_next(&db, "w1", now)
        .await
        .expect("claim 失败")
        .expect("应领到任务");

    // 取消落在 claim 之后、RUNNING 转移之前
    assert!(queue.abort("0425220101-9").await.expect("取消失败"));

    // worker 侧既不能转入 RUNNING，也不能把任务标记完成
    assert!(
        !JobRepository::mark_running(&db, id).await.expect("状态更新失败"),
        "被取消的任务不能转入 RUNNING"
    );
    assert!(!JobRepository::mark_done(&db, id).await.expect("完成失败"));

    let job = JobRepository::find_by_job_id(&db, "0425220101-9")
        .await
        .expect("查询失败")
        .expect("任务应存在");
    assert_eq!(job.status, JOB_STATUS_ABORTED, "取消结果不被后续状态标记覆盖");
}

#[tokio::test]
async fn test_monitor_exits_on_stop_flag() {
    let db = test_db().await;
    let settings = test_settings();
    StopFlagRepository::set(&db, "10").await.expect("置位失败");

    let payload = QuerySelectedPayload {
        course_type: "10".to_string(),
        username: "0425220101".to_string(),
        cookie: "ABCDEF0123456789".to_string(),
        port: "12".to_string(),
        frequency: 1,
    };
    // 停止标记在每轮开头检查，置位后的下一个周期无错误退出
    run_query_selected(db, &settings, &payload)
        .await
        .expect("观察到停止标记应无错误退出");
}

#[tokio::test]
async fn test_log_hub_fan_out_and_release() {
    let db = test_db().await;
    let hub = Arc::new(LogHub::new(16));
    let mut sub = hub.subscribe();
    assert_eq!(hub.subscriber_count(), 1);

    let log = RunningLog::new(db.clone(), hub.clone(), "0425220101-高等数学");
    log.record("set_xkkz_id", "xkkz_id=A9B8").await;

    let event = sub.recv().await.expect("应收到日志事件");
    assert_eq!(event.log_key, "0425220101-高等数学");
    assert_eq!(event.step, "set_xkkz_id");

    // 历史记录已落库，可供回放
    let rows = RunLogRepository::list_by_key(&db, "0425220101-高等数学")
        .await
        .expect("查询失败");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].message, "xkkz_id=A9B8");

    // 句柄 drop 即释放订阅
    drop(sub);
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn test_claim_next_marks_job_claimed() {
    let db = test_db().await;
    let id = JobRepository::enqueue(&db, "select_course", "0425220101-3", "{}".to_string(), 3)
        .await
        .expect("入队失败")
        .expect("首次入队应成功");

    let now = chrono::Utc::now().timestamp();
    let claimed = JobRepository::claim_next(&db, "w1", now)
        .await
        .expect("claim 失败")
        .expect("应领到任务");
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.claimed_by.as_deref(), Some("w1"));

    // 已被领走，再 claim 应为空
    let none = JobRepository::claim_next(&db, "w2", now).await.expect("claim 失败");
    assert!(none.is_none());
}

#[tokio::test]
async fn test_fuel_single_holder() {
    let db = test_db().await;
    let key = security::generate_key();
    let (fuel_id, token) = FuelRepository::create(&db, "0425220101", &key)
        .await
        .expect("燃料创建失败");

    // 令牌解密出的就是燃料记录 id
    let plain = security::decrypt_fuel(&token, &key).expect("解密失败");
    assert_eq!(plain, fuel_id.to_string());

    assert!(FuelRepository::mark_in_use(&db, fuel_id).await.expect("占用失败"));
    assert!(
        !FuelRepository::mark_in_use(&db, fuel_id).await.expect("占用失败"),
        "已被占用的燃料不能再次占用"
    );

    FuelRepository::release(&db, fuel_id).await.expect("释放失败");
    assert!(
        FuelRepository::mark_in_use(&db, fuel_id).await.expect("占用失败"),
        "释放后应能重新占用"
    );

    FuelRepository::mark_used(&db, fuel_id, "0425220101")
        .await
        .expect("消耗失败");
    FuelRepository::release(&db, fuel_id).await.expect("释放失败");
    assert!(
        !FuelRepository::mark_in_use(&db, fuel_id).await.expect("占用失败"),
        "已消耗的燃料不能再占用"
    );
}

#[tokio::test]
async fn test_selected_pagination_bounds() {
    let db = test_db().await;
    for i in 0..25 {
        SelectedRepository::create(
            &db,
            "0425220101",
            "a@b.edu",
            &format!("课程-{}", i),
            &format!("0425220101-课程-{}", i),
        )
        .await
        .expect("记录创建失败");
    }

    let (page1, total) = SelectedRepository::query(&db, 1, 10).await.expect("查询失败");
    assert_eq!(total, 25);
    assert_eq!(page1.len(), 10);
    let (page3, _) = SelectedRepository::query(&db, 3, 10).await.expect("查询失败");
    assert_eq!(page3.len(), 5, "末页只剩余数");
    let (page4, _) = SelectedRepository::query(&db, 4, 10).await.expect("查询失败");
    assert!(page4.is_empty(), "越界页返回空集");
}

#[tokio::test]
async fn test_stop_flag_roundtrip() {
    let db = test_db().await;
    assert!(
        !StopFlagRepository::is_set(&db, "10").await.expect("查询失败"),
        "未置位时默认不停止"
    );
    StopFlagRepository::set(&db, "10").await.expect("置位失败");
    assert!(StopFlagRepository::is_set(&db, "10").await.expect("查询失败"));
    // 不同类型互不影响
    assert!(!StopFlagRepository::is_set(&db, "05").await.expect("查询失败"));
    StopFlagRepository::clear(&db, "10").await.expect("清除失败");
    assert!(!StopFlagRepository::is_set(&db, "10").await.expect("查询失败"));
}

fn selection_request(fuel: &str) -> SelectionRequest {
    SelectionRequest {
        course_type: "10".to_string(),
        username: "0425220101".to_string(),
        email: "a@b.edu".to_string(),
        cookie: "ABCDEF0123456789".to_string(),
        port: "12".to_string(),
        fuel: fuel.to_string(),
        goals: vec![("高等数学".to_string(), "1001".to_string())],
    }
}

#[tokio::test]
async fn test_task_manager_same_fuel_single_active_job() {
    let db = test_db().await;
    let settings = test_settings();
    let queue = JobQueue::new(db.clone(), Arc::new(AbortRegistry::default()));
    let manager = TaskManager::new(db.clone(), queue, settings.clone());

    let (fuel_id, token) = FuelRepository::create(&db, "0425220101", &settings.fuel_key)
        .await
        .expect("燃料创建失败");

    let job_id = manager
        .enqueue_selection(selection_request(&token))
        .await
        .expect("发起失败");
    assert_eq!(job_id, format!("0425220101-{}", fuel_id));

    // 同一份燃料在任务结束前不能再次发起
    let dup = manager.enqueue_selection(selection_request(&token)).await;
    assert!(matches!(dup, Err(SelectionError::FuelUnavailable)));
}

#[tokio::test]
async fn test_task_manager_rejects_bad_fuel() {
    let db = test_db().await;
    let settings = test_settings();
    let queue = JobQueue::new(db.clone(), Arc::new(AbortRegistry::default()));
    let manager = TaskManager::new(db.clone(), queue, settings.clone());

    // 形状不对
    let bad = manager.enqueue_selection(selection_request("不是令牌")).await;
    assert!(matches!(bad, Err(SelectionError::TokenInvalid)));

    // 形状对但用错密钥
    let other_key = security::generate_key();
    let forged = security::encrypt_fuel("1", &other_key).expect("加密失败");
    let forged_result = manager.enqueue_selection(selection_request(&forged)).await;
    assert!(matches!(forged_result, Err(SelectionError::TokenInvalid)));
}

#[tokio::test]
async fn test_task_manager_abort_restores_fuel_and_records() {
    let db = test_db().await;
    let settings = test_settings();
    let queue = JobQueue::new(db.clone(), Arc::new(AbortRegistry::default()));
    let manager = TaskManager::new(db.clone(), queue, settings.clone());

    let (fuel_id, token) = FuelRepository::create(&db, "0425220101", &settings.fuel_key)
        .await
        .expect("燃料创建失败");
    let job_id = manager
        .enqueue_selection(selection_request(&token))
        .await
        .expect("发起失败");

    // 模拟任务已开始尝试第一门课
    SelectedRepository::create(
        &db,
        "0425220101",
        "a@b.edu",
        "高等数学",
        "0425220101-高等数学",
    )
    .await
    .expect("记录创建失败");

    assert!(
        manager
            .abort_selection("0425220101", &token)
            .await
            .expect("取消失败"),
        "活跃任务取消应返回 true"
    );
    // 取消幂等：第二次返回 false
    assert!(!manager
        .abort_selection("0425220101", &token)
        .await
        .expect("取消失败"));

    let job = JobRepository::find_by_job_id(&db, &job_id)
        .await
        .expect("查询失败")
        .expect("任务应存在");
    assert_eq!(job.status, JOB_STATUS_ABORTED);

    // 燃料回到可用状态
    let fuel = FuelRepository::find(&db, fuel_id)
        .await
        .expect("查询失败")
        .expect("燃料应存在");
    assert_eq!(fuel.status, FUEL_STATUS_UNUSED);
    assert!(!fuel.in_use);

    // 未成功的提交记录被标记取消
    let record = SelectedRepository::find_by_log_key(&db, "0425220101-高等数学")
        .await
        .expect("查询失败")
        .expect("应有提交记录");
    assert_eq!(record.status, SELECTED_STATUS_CANCELED);
}
