pub mod clock;
pub mod error;
pub mod tasks;
pub mod throttle;
pub mod types;
pub mod websocket;
pub use error::{ConnectorError, Result};
pub use tasks::run_tasks_with_concurrency;
