//! Routing of validated requests onto the live driver.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::debug;

use hostwire_driver::{CallArgs, DriverError, DriverInstance, DriverModule};

use super::DISPATCH_TARGET;
use super::errors::{DispatchFault, DriverFault, ProtocolFault};
use crate::context::WorkerContext;
use crate::registry::LiveDriver;

/// Reserved function name answered with help text.
pub const HELP_FUNCTION: &str = "_help";

const POSITIONAL_NOTE: &str =
    "Note, you can only supply positional arguments (not keyword arguments)";
const DISPATCH_NOTE: &str = "This driver routes calls through a dispatch method, so help cannot be \
     generated automatically (the driver should supply its own help)";

/// Successful dispatch result.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Send this value back as `{"result": ...}`.
    Reply(Value),
    /// The client asked to close the session; send nothing.
    Disconnect,
}

/// Routes requests to help, the configured dispatch method, or a named
/// public method.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'a> {
    ctx: &'a WorkerContext,
}

impl<'a> Dispatcher<'a> {
    /// Builds a dispatcher for the worker described by `ctx`.
    #[must_use]
    pub const fn new(ctx: &'a WorkerContext) -> Self {
        Self { ctx }
    }

    /// Dispatches one call against `driver`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchFault::Protocol`] when the function is not a public
    /// driver method and [`DispatchFault::Driver`] when driver code fails or
    /// panics.
    pub fn dispatch(
        &self,
        driver: LiveDriver<'_>,
        peer: &str,
        function: Option<&str>,
        args: CallArgs,
    ) -> Result<Outcome, DispatchFault> {
        let Some(function) = function else {
            return Ok(Outcome::Disconnect);
        };
        let dispatch_method = self.ctx.driver().dispatch_method();

        if function == HELP_FUNCTION {
            debug!(target: DISPATCH_TARGET, peer, "serving help");
            let text = guarded(|| help(driver.module, Some(&*driver.instance), dispatch_method))
                .map_err(|cause| DriverFault::new(function, cause))?;
            return Ok(Outcome::Reply(Value::String(text)));
        }

        if let Some(method) = dispatch_method {
            debug!(
                target: DISPATCH_TARGET,
                peer,
                function,
                method,
                "routing through dispatch method"
            );
            let routed = args.prepend([
                Value::String(peer.to_owned()),
                Value::String(function.to_owned()),
            ]);
            let instance = driver.instance;
            return guarded(|| instance.invoke(method, routed))
                .map(Outcome::Reply)
                .map_err(|cause| DriverFault::new(function, cause).into());
        }

        let callable = driver
            .instance
            .descriptor(function)
            .is_some_and(|descriptor| !descriptor.is_private());
        if !callable {
            return Err(ProtocolFault::function_not_found(function).into());
        }
        debug!(
            target: DISPATCH_TARGET,
            peer,
            function,
            args = args.len(),
            "calling driver method"
        );
        let instance = driver.instance;
        guarded(|| instance.invoke(function, args))
            .map(Outcome::Reply)
            .map_err(|cause| DriverFault::new(function, cause).into())
    }
}

/// Produces the help text a client gets for `_help`.
///
/// Module-supplied help is returned verbatim. Otherwise the text is
/// synthesised from the public descriptors of `instance`.
///
/// # Errors
///
/// Returns the [`DriverError`] raised by the module's own help entry.
pub fn help(
    module: &dyn DriverModule,
    instance: Option<&DriverInstance>,
    dispatch_method: Option<&str>,
) -> Result<String, DriverError> {
    module
        .help()
        .unwrap_or_else(|| Ok(synthesized_help(instance, dispatch_method)))
}

/// Help built from the public descriptors of `instance`, one signature per
/// line after the positional-arguments note. A driver that routes through a
/// dispatch method gets a note saying so instead of signatures.
#[must_use]
pub fn synthesized_help(
    instance: Option<&DriverInstance>,
    dispatch_method: Option<&str>,
) -> String {
    let mut lines = vec![POSITIONAL_NOTE.to_owned()];
    if dispatch_method.is_some() {
        lines.push(DISPATCH_NOTE.to_owned());
    } else if let Some(instance) = instance {
        lines.extend(
            instance
                .public_descriptors()
                .into_iter()
                .filter_map(|descriptor| descriptor.help_line()),
        );
    }
    lines.join("\n")
}

fn guarded<T>(call: impl FnOnce() -> Result<T, DriverError>) -> Result<T, DriverError> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(DriverError::from_panic(payload)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hostwire_config::{DriverConfig, WorkerConfig};
    use hostwire_driver::{
        Catalogue, CatalogueUnit, Driver, DriverSource, MethodDescriptor, MethodTable,
    };
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::health::StructuredReporter;

    const PEER: &str = "10.0.0.7";

    struct Relay {
        calls: usize,
    }

    impl Driver for Relay {
        fn methods() -> MethodTable<Self> {
            MethodTable::<Self>::new()
                .method(
                    MethodDescriptor::new("count", "count(&mut self)").with_doc("Counts calls."),
                    |relay, _| {
                        relay.calls += 1;
                        Ok(json!(relay.calls))
                    },
                )
                .method(MethodDescriptor::new("add", "add(&self, a, b)"), |_, args| {
                    args.require_arity(2)?;
                    Ok(json!(args.get::<i64>(0)? + args.get::<i64>(1)?))
                })
                .method(MethodDescriptor::new("trip", "trip(&self)"), |_, _| {
                    Err(DriverError::failed("relay tripped"))
                })
                .method(MethodDescriptor::new("jam", "jam(&self)"), |_, _| {
                    panic!("relay jammed")
                })
                .method(MethodDescriptor::new("opaque", ""), |_, _| Ok(Value::Null))
                .method(
                    MethodDescriptor::new("_route", "_route(&mut self, peer, function)"),
                    |_, args| Ok(json!({"routed": args.into_inner()})),
                )
        }
    }

    struct Fixture {
        module: Box<dyn DriverModule>,
        instance: DriverInstance,
        ctx: WorkerContext,
    }

    impl Fixture {
        fn new(unit: CatalogueUnit, dispatch_method: Option<&str>) -> Self {
            let catalogue = Catalogue::new();
            catalogue.publish("builtin:relay", unit).expect("publish");
            let module = catalogue.load("builtin:relay").expect("load");
            let instance = module.instantiate("open_relay").expect("instantiate");
            let mut driver = DriverConfig::new("builtin:relay", "open_relay");
            if let Some(method) = dispatch_method {
                driver = driver.with_dispatch_method(method);
            }
            Self {
                module,
                instance,
                ctx: WorkerContext::new(
                    WorkerConfig::new(driver),
                    Arc::new(StructuredReporter::new()),
                ),
            }
        }

        fn plain() -> Self {
            Self::new(relay_unit(), None)
        }

        fn call(&mut self, function: Option<&str>, args: Value) -> Result<Outcome, DispatchFault> {
            let Value::Array(values) = args else {
                panic!("args must be an array");
            };
            let driver = LiveDriver {
                instance: &mut self.instance,
                module: self.module.as_ref(),
            };
            Dispatcher::new(&self.ctx).dispatch(driver, PEER, function, CallArgs::new(values))
        }
    }

    fn relay_unit() -> CatalogueUnit {
        CatalogueUnit::new().entry_point("open_relay", || Ok(Relay { calls: 0 }))
    }

    #[test]
    fn null_function_disconnects() {
        let mut fixture = Fixture::plain();
        assert_eq!(
            fixture.call(None, json!([])).expect("dispatch"),
            Outcome::Disconnect
        );
    }

    #[test]
    fn named_methods_receive_positional_arguments() {
        let mut fixture = Fixture::plain();
        assert_eq!(
            fixture.call(Some("add"), json!([2, 3])).expect("dispatch"),
            Outcome::Reply(json!(5))
        );
        fixture.call(Some("count"), json!([])).expect("dispatch");
        assert_eq!(
            fixture.call(Some("count"), json!([])).expect("dispatch"),
            Outcome::Reply(json!(2))
        );
    }

    #[rstest]
    #[case("missing")]
    #[case("Count")]
    #[case("_route")]
    fn unknown_or_private_functions_are_protocol_faults(#[case] function: &str) {
        let mut fixture = Fixture::plain();
        let fault = fixture
            .call(Some(function), json!([]))
            .expect_err("not callable");
        assert!(matches!(
            fault,
            DispatchFault::Protocol(ProtocolFault::FunctionNotFound { .. })
        ));
    }

    #[rstest]
    #[case("trip", json!([]))]
    #[case("jam", json!([]))]
    #[case("add", json!([1]))]
    fn driver_failures_become_driver_faults(#[case] function: &str, #[case] args: Value) {
        let mut fixture = Fixture::plain();
        let fault = fixture.call(Some(function), args).expect_err("driver fails");
        let DispatchFault::Driver(fault) = fault else {
            panic!("expected a driver fault, got {fault:?}");
        };
        assert_eq!(fault.function(), function);
    }

    #[test]
    fn synthesised_help_lists_public_methods_only() {
        let mut fixture = Fixture::plain();
        let Outcome::Reply(Value::String(text)) =
            fixture.call(Some(HELP_FUNCTION), json!([])).expect("help")
        else {
            panic!("help must be text");
        };
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                POSITIONAL_NOTE,
                "add(a, b)",
                "count() - Counts calls.",
                "jam()",
                "trip()",
            ]
        );
    }

    #[test]
    fn module_help_is_returned_verbatim() {
        let unit = relay_unit().help(|| Ok("relay board v2".to_owned()));
        let mut fixture = Fixture::new(unit, None);
        assert_eq!(
            fixture.call(Some(HELP_FUNCTION), json!([])).expect("help"),
            Outcome::Reply(json!("relay board v2"))
        );
    }

    #[test]
    fn dispatch_method_receives_peer_and_function() {
        let mut fixture = Fixture::new(relay_unit(), Some("_route"));
        assert_eq!(
            fixture.call(Some("ping"), json!([4])).expect("dispatch"),
            Outcome::Reply(json!({"routed": [PEER, "ping", 4]}))
        );
    }

    #[test]
    fn help_with_dispatch_method_explains_itself() {
        let mut fixture = Fixture::new(relay_unit(), Some("_route"));
        let Outcome::Reply(Value::String(text)) =
            fixture.call(Some(HELP_FUNCTION), json!([])).expect("help")
        else {
            panic!("help must be text");
        };
        assert_eq!(text, format!("{POSITIONAL_NOTE}\n{DISPATCH_NOTE}"));
    }

    #[test]
    fn missing_dispatch_method_is_a_driver_fault() {
        let mut fixture = Fixture::new(relay_unit(), Some("route"));
        assert!(matches!(
            fixture.call(Some("ping"), json!([])),
            Err(DispatchFault::Driver(_))
        ));
    }
}
