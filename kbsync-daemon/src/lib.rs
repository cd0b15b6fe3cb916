//! Long-running service: HTTP trigger endpoint plus optional interval watch.

mod error;
pub mod logging;
pub mod protocol;
mod runtime;
pub mod server;

pub use error::DaemonError;
pub use logging::init_tracing;
pub use protocol::{BusyResponse, HealthResponse};
pub use runtime::{run_until, runtime, serve, start_blocking, watch_task, ServeOptions};
pub use server::router;
