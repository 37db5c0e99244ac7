pub mod calltree;
pub mod error_signals;
pub mod frame_filter;
pub mod frames;
pub mod graph;
pub mod issues;
pub mod levels;
pub mod line;
pub mod metrics;
pub mod parser;
pub mod views;

pub use calltree::{build_call_tree, signature_from_label, CallTreeModel, CallTreeNode};
pub use graph::LogGraph;
pub use parser::{parse_apex_log, parse_apex_log_with, ParseOptions};
pub use views::{invert_for_signature, merge_occurrences, scope_to_occurrence};
