//! Scenario state driving a [`WorkerController`] one cycle at a time.

use std::sync::Arc;
use std::time::Duration;

use flume::Sender;
use hostwire_config::{DriverConfig, WorkerConfig};
use hostwire_driver::DriverSource;
use hostwire_driver_loopback::BUILTIN_LOCATOR;
use serde_json::Value;

use crate::context::WorkerContext;
use crate::controller::{ClientHandoff, Cycle, WorkItem, WorkerController};
use crate::health::LifecycleReporter;
use crate::registry::DriverState;
use crate::sources::builtin_catalogue;

use super::bench::{BENCH_ENTRY_POINT, BENCH_LOCATOR, Bench};
use super::connection::{ConnectionProbe, LinkFault, MemoryConnection};
use super::reporter::RecordingReporter;

/// Peer address reported for every scripted client.
pub const PEER: &str = "10.1.4.2";

const IDLE_WAIT: Duration = Duration::from_millis(5);

enum Hosted {
    Bench,
    Loopback,
    Missing,
}

/// A controller under test plus the doubles around it.
pub struct WorkerWorld {
    pub bench: Bench,
    pub reporter: Arc<RecordingReporter>,
    hosted: Hosted,
    dispatch_method: Option<String>,
    controller: Option<WorkerController>,
    queue: Option<Sender<WorkItem>>,
    clients: Vec<ConnectionProbe>,
    next_fault: LinkFault,
    cycles: Vec<Cycle>,
    loaded: Option<bool>,
}

impl WorkerWorld {
    pub fn new() -> Self {
        Self {
            bench: Bench::new(),
            reporter: Arc::new(RecordingReporter::default()),
            hosted: Hosted::Bench,
            dispatch_method: None,
            controller: None,
            queue: None,
            clients: Vec::new(),
            next_fault: LinkFault::Healthy,
            cycles: Vec::new(),
            loaded: None,
        }
    }

    pub fn host_loopback(&mut self) {
        self.hosted = Hosted::Loopback;
    }

    pub fn host_missing_driver(&mut self) {
        self.hosted = Hosted::Missing;
    }

    pub fn route_through(&mut self, method: impl Into<String>) {
        self.dispatch_method = Some(method.into());
    }

    /// Makes the next connected client misbehave as `fault` describes.
    pub fn break_next_connection(&mut self, fault: LinkFault) {
        self.next_fault = fault;
    }

    /// Builds the controller and performs the initial load.
    pub fn start(&mut self) {
        let (locator, entry_point) = match self.hosted {
            Hosted::Bench => (BENCH_LOCATOR, BENCH_ENTRY_POINT),
            Hosted::Loopback => (BUILTIN_LOCATOR, "open_loopback"),
            Hosted::Missing => ("builtin:absent", BENCH_ENTRY_POINT),
        };
        let mut driver = DriverConfig::new(locator, entry_point);
        if let Some(method) = &self.dispatch_method {
            driver = driver.with_dispatch_method(method.clone());
        }
        let config = WorkerConfig::new(driver).with_poll_interval(IDLE_WAIT);
        let reporter: Arc<dyn LifecycleReporter> = self.reporter.clone();
        let source: Box<dyn DriverSource> = match self.hosted {
            Hosted::Loopback => Box::new(builtin_catalogue()),
            Hosted::Bench | Hosted::Missing => self.bench.source(),
        };

        let (queue, inbox) = flume::unbounded();
        let mut controller = WorkerController::new(WorkerContext::new(config, reporter), source, inbox);
        self.loaded = Some(controller.load());
        self.controller = Some(controller);
        self.queue = Some(queue);
    }

    /// Runs one cycle against an empty queue.
    pub fn idle(&mut self) -> Cycle {
        self.cycle()
    }

    /// Queues a scripted client and runs the cycle that takes it.
    pub fn connect(&mut self, lines: &[&str]) -> Cycle {
        let fault = std::mem::take(&mut self.next_fault);
        let (connection, probe) = MemoryConnection::with_fault(lines, fault);
        self.clients.push(probe);
        self.send(WorkItem::Client(ClientHandoff::new(Box::new(connection), PEER)));
        self.cycle()
    }

    /// Requests shutdown with a scripted client queued behind it, runs the
    /// cycle that observes the request and finishes the shutdown sequence.
    pub fn shut_down_with_pending(&mut self, lines: &[&str]) -> Cycle {
        self.send(WorkItem::Shutdown);
        let (connection, probe) = MemoryConnection::new(lines);
        self.clients.push(probe);
        self.send(WorkItem::Client(ClientHandoff::new(Box::new(connection), PEER)));
        let cycle = self.cycle();
        self.controller_mut().shutdown();
        cycle
    }

    pub fn loaded(&self) -> Option<bool> {
        self.loaded
    }

    pub fn state(&self) -> DriverState {
        self.controller
            .as_ref()
            .expect("controller started")
            .registry()
            .state()
    }

    pub fn last_cycle(&self) -> Option<Cycle> {
        self.cycles.last().copied()
    }

    pub fn last_client(&self) -> &ConnectionProbe {
        self.clients.last().expect("a client connected")
    }

    pub fn last_replies(&self) -> Vec<Value> {
        self.last_client().replies()
    }

    fn send(&self, item: WorkItem) {
        self.queue
            .as_ref()
            .expect("controller started")
            .send(item)
            .expect("controller inbox open");
    }

    fn cycle(&mut self) -> Cycle {
        let cycle = self.controller_mut().run_cycle();
        self.cycles.push(cycle);
        cycle
    }

    fn controller_mut(&mut self) -> &mut WorkerController {
        self.controller.as_mut().expect("controller started")
    }
}
