//! Tests for the socket listener.

use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use hostwire_config::SocketEndpoint;

use super::listener::SocketListener;
use super::{ConnectionHandler, ConnectionStream, ListenerError};

/// Collects the peer names handed over by the accept loop.
#[derive(Default)]
struct Handoffs(Mutex<Vec<String>>);

impl Handoffs {
    fn peers(&self) -> Vec<String> {
        self.0.lock().map(|peers| peers.clone()).unwrap_or_default()
    }

    /// Polls until `expected` handoffs arrived or two seconds passed.
    fn await_count(&self, expected: usize) -> Vec<String> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let peers = self.peers();
            if peers.len() >= expected || Instant::now() >= deadline {
                return peers;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl ConnectionHandler for Handoffs {
    fn handle(&self, _stream: ConnectionStream, peer: String) {
        if let Ok(mut peers) = self.0.lock() {
            peers.push(peer);
        }
    }
}

#[fixture]
fn handoffs() -> Arc<Handoffs> {
    Arc::new(Handoffs::default())
}

#[rstest]
fn tcp_clients_are_handed_over_with_their_host_address(handoffs: Arc<Handoffs>) {
    let listener =
        SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind tcp listener");
    let addr = listener.local_addr().expect("bound tcp address");
    let handle = listener
        .start(Arc::clone(&handoffs) as Arc<dyn ConnectionHandler>)
        .expect("start listener");

    let clients: Vec<TcpStream> = (0..2)
        .map(|_| TcpStream::connect(addr).expect("connect client"))
        .collect();
    let peers = handoffs.await_count(2);

    handle.shutdown();
    handle.join().expect("join listener");
    assert_eq!(peers.len(), 2, "handoffs: {peers:?}");
    for client in &clients {
        let host = client.local_addr().expect("client address").ip().to_string();
        assert!(peers.contains(&host), "{host} missing from {peers:?}");
    }
    assert!(
        peers.iter().all(|peer| peer == "127.0.0.1"),
        "peers carry only the host: {peers:?}"
    );
}

#[cfg(unix)]
mod unix {
    use std::fs;
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::{Path, PathBuf};

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn workdir() -> TempDir {
        tempfile::tempdir().expect("temp dir")
    }

    fn endpoint_at(path: &Path) -> SocketEndpoint {
        SocketEndpoint::unix(path.to_str().expect("utf8 path").to_owned())
    }

    fn socket_path(dir: &TempDir) -> PathBuf {
        dir.path().join("worker.sock")
    }

    #[rstest]
    fn stale_socket_is_reclaimed_and_removed_on_stop(workdir: TempDir, handoffs: Arc<Handoffs>) {
        let path = socket_path(&workdir);
        drop(UnixListener::bind(&path).expect("bind stale listener"));
        assert!(path.exists(), "stale socket file left behind");

        let handle = SocketListener::bind(&endpoint_at(&path))
            .expect("reclaim stale socket")
            .start(Arc::clone(&handoffs) as Arc<dyn ConnectionHandler>)
            .expect("start listener");
        let _client = UnixStream::connect(&path).expect("connect unix client");
        let peers = handoffs.await_count(1);

        handle.shutdown();
        handle.join().expect("join listener");
        assert_eq!(peers.len(), 1, "handoffs: {peers:?}");
        assert!(!path.exists(), "socket file survived shutdown");
    }

    #[rstest]
    fn live_socket_is_left_alone(workdir: TempDir) {
        let path = socket_path(&workdir);
        let _owner = UnixListener::bind(&path).expect("bind live listener");

        let error = SocketListener::bind(&endpoint_at(&path)).expect_err("socket is in use");

        assert!(matches!(error, ListenerError::InUse { .. }), "{error:?}");
        assert!(path.exists());
    }

    #[rstest]
    fn plain_file_blocks_the_socket_path(workdir: TempDir) {
        let path = socket_path(&workdir);
        fs::write(&path, b"not a socket").expect("write plain file");

        let error = SocketListener::bind(&endpoint_at(&path)).expect_err("path is a file");

        assert!(matches!(error, ListenerError::NotASocket { .. }), "{error:?}");
        assert_eq!(fs::read(&path).expect("file kept"), b"not a socket");
    }
}
