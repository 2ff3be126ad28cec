//! Accepted client streams.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::session::Connection;

/// A client stream handed over by the listener.
#[derive(Debug)]
pub enum ConnectionStream {
    /// Accepted over TCP.
    Tcp(TcpStream),
    /// Accepted over a unix domain socket.
    #[cfg(unix)]
    Unix(UnixStream),
}

trait Duplex: Read + Write {}

impl<T: Read + Write> Duplex for T {}

impl ConnectionStream {
    fn duplex(&mut self) -> &mut dyn Duplex {
        match self {
            Self::Tcp(stream) => stream,
            #[cfg(unix)]
            Self::Unix(stream) => stream,
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.duplex().read(buf)
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.duplex().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.duplex().flush()
    }
}

impl Connection for ConnectionStream {
    /// Shuts both directions down. A stream the peer already dropped counts
    /// as closed.
    fn close(&mut self) -> io::Result<()> {
        let shut = match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        shut.or_else(|error| match error.kind() {
            io::ErrorKind::NotConnected => Ok(()),
            _ => Err(error),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufRead;
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn close_ends_the_peer_stream() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let addr = listener.local_addr().expect("listener address");
        let mut client = TcpStream::connect(addr).expect("connect client");
        let (accepted, _) = listener.accept().expect("accept connection");

        let mut stream = ConnectionStream::Tcp(accepted);
        stream.write_all(b"{\"result\":1}\n").expect("write");
        stream.close().expect("close");
        stream.close().expect("second close is harmless");

        let mut lines = Vec::new();
        let mut reader = io::BufReader::new(&mut client);
        let mut line = String::new();
        while reader.read_line(&mut line).expect("read") > 0 {
            lines.push(line.clone());
            line.clear();
        }
        assert_eq!(lines, ["{\"result\":1}\n"]);
    }
}
