//! Behavioural suites for the worker.

pub(crate) mod support;
