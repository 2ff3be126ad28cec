use std::time::Duration;

#[cfg(unix)]
use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::socket::SocketEndpoint;

/// Default TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9780;

/// Default log filter expression used by the worker.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default worker name used in log records.
pub const DEFAULT_WORKER_NAME: &str = "hostwire";

/// Default bounded wait on the inbound queue, in milliseconds.
///
/// The same window paces staleness checks of the driver.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default log filter expression used by the worker.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the worker.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default bounded wait on the inbound queue.
#[must_use]
pub const fn default_poll_interval() -> Duration {
    Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
}

/// Default listening endpoint for a named worker.
///
/// On unix this is `<runtime dir>/hostwire/<name>.sock`. Without a runtime
/// directory the socket lives under the temp dir in a per-user `uid-<n>`
/// subdirectory. Other platforms listen on loopback TCP.
#[must_use]
pub fn default_socket_endpoint(worker_name: &str) -> SocketEndpoint {
    #[cfg(unix)]
    {
        SocketEndpoint::unix(socket_root().join(format!("{worker_name}.sock")))
    }
    #[cfg(not(unix))]
    {
        let _ = worker_name;
        SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
    }
}

#[cfg(unix)]
fn socket_root() -> Utf8PathBuf {
    if let Some(runtime) = runtime_dir().and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok()) {
        return runtime.join("hostwire");
    }
    let temp = Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    // SAFETY: geteuid has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    temp.join("hostwire").join(format!("uid-{uid}"))
}
