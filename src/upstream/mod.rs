pub mod manager;
pub mod session;
pub mod state;

pub use manager::{ConnectionManager, UpstreamSettings, UpstreamSnapshot};
pub use state::{ConnectionState, UpstreamStatus};
