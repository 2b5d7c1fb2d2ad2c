pub mod portal_session;
pub mod urls;

pub use portal_session::PortalSession;
