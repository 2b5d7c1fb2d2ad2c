pub mod course_repo;
pub mod failed_repo;
pub mod fuel_repo;
pub mod job_repo;
pub mod run_log_repo;
pub mod selected_repo;
pub mod stop_flag_repo;

pub use course_repo::CourseRepository;
pub use failed_repo::FailedRepository;
pub use fuel_repo::{FuelRepository, FUEL_STATUS_UNUSED, FUEL_STATUS_USED};
pub use job_repo::{
    JobRepository, JOB_STATUS_ABORTED, JOB_STATUS_CLAIMED, JOB_STATUS_DONE,
    JOB_STATUS_FAILED_PERMANENT, JOB_STATUS_QUEUED, JOB_STATUS_RETRY_WAIT, JOB_STATUS_RUNNING,
};
pub use run_log_repo::RunLogRepository;
pub use selected_repo::{
    SelectedRepository, SELECTED_STATUS_CANCELED, SELECTED_STATUS_SELECTED,
    SELECTED_STATUS_UNUSED,
};
pub use stop_flag_repo::StopFlagRepository;
