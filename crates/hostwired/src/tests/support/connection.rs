//! In-memory client connection.

use std::io::{self, Cursor, Read, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::session::Connection;

/// Observes what the worker wrote to a [`MemoryConnection`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionProbe {
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl ConnectionProbe {
    /// Decodes every reply line written so far.
    pub fn replies(&self) -> Vec<Value> {
        let written = self.written.lock().expect("probe mutex poisoned").clone();
        String::from_utf8(written)
            .expect("replies are UTF-8")
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).expect("reply is JSON"))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Failure injected into a [`MemoryConnection`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkFault {
    #[default]
    Healthy,
    /// Every read fails with `ConnectionReset`.
    ReadError,
    /// Every write fails with `BrokenPipe`.
    WriteError,
    /// Reading panics.
    ReadPanic,
    /// Closing marks the connection closed, then panics.
    ClosePanic,
}

impl FromStr for LinkFault {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "healthy" => Ok(Self::Healthy),
            "unreadable" => Ok(Self::ReadError),
            "unwritable" => Ok(Self::WriteError),
            "panicking on read" => Ok(Self::ReadPanic),
            "panicking on close" => Ok(Self::ClosePanic),
            other => Err(format!("unknown connection fault '{other}'")),
        }
    }
}

/// A connection fed from a fixed request script.
#[derive(Debug)]
pub struct MemoryConnection {
    input: Cursor<Vec<u8>>,
    probe: ConnectionProbe,
    fault: LinkFault,
}

impl MemoryConnection {
    /// Builds a connection that delivers `lines`, each newline-terminated,
    /// followed by end of stream.
    pub fn new(lines: &[&str]) -> (Self, ConnectionProbe) {
        Self::with_fault(lines, LinkFault::Healthy)
    }

    /// Like [`Self::new`], misbehaving as `fault` describes.
    pub fn with_fault(lines: &[&str], fault: LinkFault) -> (Self, ConnectionProbe) {
        let mut input = Vec::new();
        for line in lines {
            input.extend_from_slice(line.as_bytes());
            input.push(b'\n');
        }
        let probe = ConnectionProbe::default();
        let connection = Self {
            input: Cursor::new(input),
            probe: probe.clone(),
            fault,
        };
        (connection, probe)
    }
}

impl Read for MemoryConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.probe.is_closed() {
            return Ok(0);
        }
        match self.fault {
            LinkFault::ReadError => Err(io::Error::from(io::ErrorKind::ConnectionReset)),
            LinkFault::ReadPanic => panic!("connection read blew up"),
            _ => self.input.read(buf),
        }
    }
}

impl Write for MemoryConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.probe.is_closed() || self.fault == LinkFault::WriteError {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.probe
            .written
            .lock()
            .expect("probe mutex poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn close(&mut self) -> io::Result<()> {
        self.probe.closed.store(true, Ordering::SeqCst);
        if self.fault == LinkFault::ClosePanic {
            panic!("connection close blew up");
        }
        Ok(())
    }
}
