//! Shutdown signals: waiting for TERM, INT, QUIT or HUP and turning the
//! first one into a shutdown request on the controller queue.

use std::io;
use std::thread::{self, JoinHandle};

use flume::Sender;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;
use crate::controller::WorkItem;

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + 'static {
    /// Blocks until shutdown should proceed.
    fn wait(&mut self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The forwarding thread could not be started.
    #[error("failed to spawn shutdown forwarder: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for termination signals.
///
/// Handlers are installed on construction, so a signal that arrives before
/// [`ShutdownSignal::wait`] is still observed.
pub struct SystemShutdownSignal {
    signals: Signals,
}

impl SystemShutdownSignal {
    /// Installs handlers for SIGTERM, SIGINT, SIGQUIT and SIGHUP.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] when registration fails.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        Ok(Self { signals })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&mut self) -> Result<(), ShutdownError> {
        if let Some(signal) = self.signals.forever().next() {
            info!(
                target: PROCESS_TARGET,
                signal,
                "shutdown signal received"
            );
        }
        Ok(())
    }
}

/// Waits for `signal` on a background thread, then enqueues the shutdown
/// sentinel.
pub(crate) fn forward_shutdown<S>(
    mut signal: S,
    queue: Sender<WorkItem>,
) -> Result<JoinHandle<()>, ShutdownError>
where
    S: ShutdownSignal,
{
    thread::Builder::new()
        .name("hostwired-shutdown".to_owned())
        .spawn(move || match signal.wait() {
            Ok(()) => {
                if queue.send(WorkItem::Shutdown).is_err() {
                    debug!(target: PROCESS_TARGET, "controller already stopped");
                }
            }
            Err(error) => warn!(
                target: PROCESS_TARGET,
                %error,
                "shutdown listener failed; signals will not stop the worker"
            ),
        })
        .map_err(|source| ShutdownError::Spawn { source })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flume::Receiver;

    use super::*;

    struct Trigger(Receiver<()>);

    impl ShutdownSignal for Trigger {
        fn wait(&mut self) -> Result<(), ShutdownError> {
            let _ = self.0.recv();
            Ok(())
        }
    }

    #[test]
    fn forwards_the_sentinel_once_triggered() {
        let (fire, armed) = flume::bounded(1);
        let (queue, inbox) = flume::unbounded();
        let handle = forward_shutdown(Trigger(armed), queue).expect("spawn forwarder");
        assert!(inbox.recv_timeout(Duration::from_millis(50)).is_err());

        fire.send(()).expect("trigger");
        assert!(matches!(
            inbox.recv_timeout(Duration::from_secs(2)),
            Ok(WorkItem::Shutdown)
        ));
        handle.join().expect("forwarder exits");
    }
}
