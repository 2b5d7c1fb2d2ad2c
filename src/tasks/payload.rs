use serde::{Deserialize, Serialize};

pub const TASK_SELECT_COURSE: &str = "select_course";
pub const TASK_QUERY_SELECTED: &str = "query_selected_number";

/// 一次性选课任务的参数
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectCoursePayload {
    pub course_type: String,
    pub username: String,
    pub email: String,
    pub cookie: String,
    pub port: String,
    pub fuel_id: i32,
    /// 目标课程列表 (course_name, course_id)，按提交顺序尝试
    pub goals: Vec<(String, String)>,
}

/// 周期性查询已选人数任务的参数
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuerySelectedPayload {
    pub course_type: String,
    pub username: String,
    pub cookie: String,
    pub port: String,
    /// 轮询间隔（秒）
    pub frequency: u64,
}
