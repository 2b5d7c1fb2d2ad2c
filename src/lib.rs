pub mod conf;
pub mod error;
pub mod logs;
pub mod notify;
pub mod security;
pub mod selector;
pub mod session;
pub mod storage;
pub mod tasks;
