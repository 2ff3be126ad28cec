//! Capability tables mapping method names to callable thunks.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::args::CallArgs;
use crate::descriptor::MethodDescriptor;
use crate::error::DriverError;

/// Function invoked for one method of driver `D`.
pub type Thunk<D> = fn(&mut D, CallArgs) -> Result<Value, DriverError>;

struct Method<D> {
    descriptor: MethodDescriptor,
    thunk: Thunk<D>,
}

/// Named, introspectable methods exposed by a driver type.
///
/// Entries are kept in name order so help output is stable. Registering a
/// name twice replaces the earlier entry.
pub struct MethodTable<D> {
    methods: BTreeMap<String, Method<D>>,
}

impl<D> MethodTable<D> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            methods: BTreeMap::new(),
        }
    }

    /// Registers a method.
    #[must_use]
    pub fn method(mut self, descriptor: MethodDescriptor, thunk: Thunk<D>) -> Self {
        self.methods.insert(
            descriptor.name().to_owned(),
            Method { descriptor, thunk },
        );
        self
    }

    /// Looks up the descriptor for `name`.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name).map(|method| &method.descriptor)
    }

    /// Iterates every descriptor, private ones included, in name order.
    pub fn descriptors(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.values().map(|method| &method.descriptor)
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub(crate) fn thunk(&self, name: &str) -> Option<Thunk<D>> {
        self.methods.get(name).map(|method| method.thunk)
    }
}

impl<D> Default for MethodTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for MethodTable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.methods.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Counter(u64);

    fn table() -> MethodTable<Counter> {
        MethodTable::<Counter>::new()
            .method(MethodDescriptor::new("bump", "bump(&mut self)"), |counter, _| {
                counter.0 += 1;
                Ok(json!(counter.0))
            })
            .method(MethodDescriptor::new("_reset", "_reset(&mut self)"), |counter, _| {
                counter.0 = 0;
                Ok(Value::Null)
            })
    }

    #[test]
    fn orders_descriptors_by_name() {
        let table = table();
        let names: Vec<_> = table.descriptors().map(MethodDescriptor::name).collect();
        assert_eq!(names, ["_reset", "bump"]);
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let table = table().method(MethodDescriptor::new("bump", "bump(&mut self, by)"), |_, _| {
            Ok(Value::Null)
        });
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.descriptor("bump").map(MethodDescriptor::signature),
            Some("bump(&mut self, by)")
        );
    }

    #[test]
    fn thunks_mutate_driver_state() {
        let table = table();
        let mut counter = Counter(0);
        let bump = table.thunk("bump").expect("bump registered");
        bump(&mut counter, CallArgs::default()).expect("bump succeeds");
        let result = bump(&mut counter, CallArgs::default()).expect("bump succeeds");
        assert_eq!(result, json!(2));
    }
}
