//! Foundation utilities: diagnostics sinks, timing and resource accounting

pub mod logging;
pub mod tracking;
