//! Daemon side of the keeper wire: socket protocol, proxy, process registry
//! and the daemon host runtime.

mod error;
pub mod paths;
pub mod process;
pub mod protocol;
pub mod proxy;
mod runtime;
pub mod update;

pub use error::ProxyError;
pub use process::{PidFileRegistry, ProcessRegistry, DAEMON_BINARY_ENV};
pub use protocol::{send_request, DaemonRequest, DaemonResponse};
pub use proxy::{report_error, request_shutdown, DaemonProxy, SocketProxy};
pub use runtime::{init_tracing, run, spawn_in_thread, start_blocking, HostState, InProcessDaemon};
