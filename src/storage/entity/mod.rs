pub mod course;
pub mod failed_record;
pub mod fuel;
pub mod run_log;
pub mod selected_record;
pub mod selection_job;
pub mod stop_flag;

pub use course::Entity as Course;
pub use failed_record::Entity as FailedRecord;
pub use fuel::Entity as Fuel;
pub use run_log::Entity as RunLog;
pub use selected_record::Entity as SelectedRecord;
pub use selection_job::Entity as SelectionJob;
pub use stop_flag::Entity as StopFlag;
