//! Accepting clients on the worker endpoint.
//!
//! The accept thread never serves anyone. Each accepted stream goes straight
//! to the [`ConnectionHandler`], which queues it for the controller.

use std::io;
#[cfg(test)]
use std::net::SocketAddr;
use std::net::{TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixListener;

use tracing::{debug, info, warn};

use hostwire_config::SocketEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

/// Pause between polls while no client is waiting.
const IDLE_PAUSE: Duration = Duration::from_millis(25);
/// Pause after a failed accept.
const FAULT_PAUSE: Duration = Duration::from_millis(150);

#[derive(Debug)]
enum Acceptor {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Acceptor {
    fn open(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => open_tcp(host, *port).map(Self::Tcp),
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => unix::open(path.as_str()).map(Self::Unix),
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => Err(ListenerError::Unsupported {
                endpoint: endpoint.to_string(),
            }),
        }
    }

    fn poll_mode(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    /// Takes the next waiting client, if there is one, with its peer name:
    /// the host address for TCP and the socket path for unix. Accepted
    /// streams are switched back to blocking mode for the session.
    fn next_client(&self) -> io::Result<Option<(ConnectionStream, String)>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, addr)| {
                stream.set_nonblocking(false)?;
                Ok((ConnectionStream::Tcp(stream), addr.ip().to_string()))
            }),
            #[cfg(unix)]
            Self::Unix(listener) => listener.accept().and_then(|(stream, addr)| {
                stream.set_nonblocking(false)?;
                Ok((ConnectionStream::Unix(stream), unix::peer_name(&addr)))
            }),
        };
        match accepted {
            Ok(client) => Ok(Some(client)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Listener bound to the worker's endpoint.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    acceptor: Acceptor,
}

impl SocketListener {
    /// Binds `endpoint`. A unix socket file left behind by a worker that is
    /// no longer running is removed first.
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let acceptor = Acceptor::open(endpoint)?;
        Ok(Self {
            endpoint: endpoint.clone(),
            acceptor,
        })
    }

    #[cfg(test)]
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match &self.acceptor {
            Acceptor::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Acceptor::Unix(_) => None,
        }
    }

    /// Starts accepting on a background thread.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.acceptor.poll_mode() {
            self.release();
            return Err(ListenerError::Configure {
                endpoint: self.endpoint.to_string(),
                source,
            });
        }
        let stop = Arc::new(AtomicBool::new(false));
        let accept_loop = AcceptLoop {
            listener: self,
            stop: Arc::clone(&stop),
            handler,
        };
        let thread = thread::Builder::new()
            .name("hostwired-listener".to_owned())
            .spawn(move || accept_loop.run())
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn release(&self) {
        #[cfg(unix)]
        if let SocketEndpoint::Unix { path } = &self.endpoint {
            unix::remove(path.as_str());
        }
    }
}

/// Owns the listener on the accept thread and releases the endpoint when
/// dropped.
struct AcceptLoop {
    listener: SocketListener,
    stop: Arc<AtomicBool>,
    handler: Arc<dyn ConnectionHandler>,
}

impl AcceptLoop {
    fn run(&self) {
        info!(
            target: LISTENER_TARGET,
            endpoint = %self.listener.endpoint,
            "accepting clients"
        );
        let mut failing = None::<io::ErrorKind>;
        while !self.stop.load(Ordering::SeqCst) {
            match self.listener.acceptor.next_client() {
                Ok(Some((stream, peer))) => {
                    failing = None;
                    debug!(target: LISTENER_TARGET, peer = %peer, "client accepted");
                    self.handler.handle(stream, peer);
                }
                Ok(None) => thread::sleep(IDLE_PAUSE),
                Err(error) => {
                    // Log a failure once until accepting recovers or fails differently.
                    if failing.replace(error.kind()) != Some(error.kind()) {
                        warn!(target: LISTENER_TARGET, %error, "accept failed");
                    }
                    thread::sleep(FAULT_PAUSE);
                }
            }
        }
        debug!(target: LISTENER_TARGET, "accept loop stopped");
    }
}

impl Drop for AcceptLoop {
    fn drop(&mut self) {
        self.listener.release();
    }
}

/// Control over a running accept thread.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop after its current poll.
    pub(crate) fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept thread. A unix socket file is gone afterwards.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        self.thread.take().map_or(Ok(()), |thread| {
            thread.join().map_err(|_| ListenerError::Panicked)
        })
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| ListenerError::NoAddress {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::Bind {
        endpoint: addr.to_string(),
        source,
    })
}

#[cfg(unix)]
mod unix {
    use std::fs;
    use std::io;
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::net::{SocketAddr, UnixListener, UnixStream};

    use tracing::{debug, warn};

    use super::{LISTENER_TARGET, ListenerError};

    const UNNAMED_PEER: &str = "unix";

    pub(super) fn open(path: &str) -> Result<UnixListener, ListenerError> {
        reclaim(path)?;
        UnixListener::bind(path).map_err(|source| ListenerError::Bind {
            endpoint: path.to_owned(),
            source,
        })
    }

    /// Removes a stale socket file. A live socket or a file that is not a
    /// socket is left in place and reported.
    fn reclaim(path: &str) -> Result<(), ListenerError> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(ListenerError::Reclaim {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::NotASocket {
                path: path.to_owned(),
            });
        }
        match UnixStream::connect(path) {
            Ok(_) => Err(ListenerError::InUse {
                path: path.to_owned(),
            }),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                ) =>
            {
                debug!(target: LISTENER_TARGET, path, "removing stale socket file");
                fs::remove_file(path).map_err(|source| ListenerError::Reclaim {
                    path: path.to_owned(),
                    source,
                })
            }
            Err(source) => Err(ListenerError::Reclaim {
                path: path.to_owned(),
                source,
            }),
        }
    }

    pub(super) fn peer_name(addr: &SocketAddr) -> String {
        addr.as_pathname()
            .map_or_else(|| UNNAMED_PEER.to_owned(), |path| path.display().to_string())
    }

    pub(super) fn remove(path: &str) {
        match fs::remove_file(path) {
            Ok(()) => debug!(target: LISTENER_TARGET, path, "socket file removed"),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                target: LISTENER_TARGET,
                path,
                %error,
                "failed to remove socket file"
            ),
        }
    }
}
