//! Ambient stack: configuration loading and structured logging, carried
//! regardless of which domain features are in or out of scope.

pub mod config;
pub mod logging;
