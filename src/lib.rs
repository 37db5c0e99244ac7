// Library entry point for apex-log-graph.

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod ports;

pub use domain::{build_call_tree, parse_apex_log, parse_apex_log_with, CallTreeModel, LogGraph, ParseOptions};
pub use error::{Error, Result};
