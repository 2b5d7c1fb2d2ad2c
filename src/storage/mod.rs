pub mod connection;
pub mod entity;
pub mod repository;

pub use connection::establish_connection;
