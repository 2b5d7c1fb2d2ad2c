pub mod lifecycle;
pub mod monitor;
pub mod payload;
pub mod queue;
pub mod worker;

pub use lifecycle::{SelectionRequest, TaskManager};
pub use payload::{
    QuerySelectedPayload, SelectCoursePayload, TASK_QUERY_SELECTED, TASK_SELECT_COURSE,
};
pub use queue::{AbortRegistry, JobQueue};
pub use worker::TaskWorkerService;
