//! A bench meter driver whose construction and code changes tests control.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use hostwire_driver::{
    Catalogue, CatalogueUnit, Driver, DriverError, DriverSource, MethodDescriptor, MethodTable,
    reply,
};
use serde_json::json;

pub const BENCH_LOCATOR: &str = "builtin:bench";
pub const BENCH_ENTRY_POINT: &str = "open_meter";

struct Meter {
    level: i64,
    torn_down: Arc<AtomicUsize>,
}

impl Driver for Meter {
    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .method(
                MethodDescriptor::new("level", "level(&self)").with_doc("Current level."),
                |meter, args| {
                    args.require_arity(0)?;
                    reply(meter.level)
                },
            )
            .method(
                MethodDescriptor::new("raise", "raise(&mut self, step)"),
                |meter, args| {
                    meter.level += args.get::<i64>(0)?;
                    reply(meter.level)
                },
            )
            .method(MethodDescriptor::new("stall", "stall(&self)"), |_, _| {
                Err(DriverError::failed("meter stalled"))
            })
            .method(
                MethodDescriptor::new("_route", "_route(&mut self, peer, function, *args)"),
                |_, args| reply(json!({ "routed": args.into_inner() })),
            )
    }

    fn teardown(&mut self) -> Option<Result<(), DriverError>> {
        self.torn_down.fetch_add(1, Ordering::SeqCst);
        Some(Ok(()))
    }
}

/// Publishes the meter driver and counts what the worker does with it.
#[derive(Debug, Clone)]
pub struct Bench {
    catalogue: Catalogue,
    builds: Arc<AtomicUsize>,
    torn_down: Arc<AtomicUsize>,
    broken: Arc<AtomicBool>,
}

impl Bench {
    pub fn new() -> Self {
        let bench = Self {
            catalogue: Catalogue::new(),
            builds: Arc::new(AtomicUsize::new(0)),
            torn_down: Arc::new(AtomicUsize::new(0)),
            broken: Arc::new(AtomicBool::new(false)),
        };
        bench.publish();
        bench
    }

    fn publish(&self) {
        let builds = Arc::clone(&self.builds);
        let torn_down = Arc::clone(&self.torn_down);
        let broken = Arc::clone(&self.broken);
        let unit = CatalogueUnit::new().entry_point(BENCH_ENTRY_POINT, move || {
            builds.fetch_add(1, Ordering::SeqCst);
            if broken.load(Ordering::SeqCst) {
                return Err(DriverError::failed("meter offline"));
            }
            Ok(Meter {
                level: 0,
                torn_down: Arc::clone(&torn_down),
            })
        });
        self.catalogue
            .publish(BENCH_LOCATOR, unit)
            .expect("publish bench driver");
    }

    pub fn source(&self) -> Box<dyn DriverSource> {
        Box::new(self.catalogue.clone())
    }

    /// Marks the published code as changed.
    pub fn modify(&self) {
        self.catalogue.touch(BENCH_LOCATOR).expect("touch bench driver");
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.torn_down.load(Ordering::SeqCst)
    }
}
