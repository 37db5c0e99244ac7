//! Apex debug log -> `LogGraph`.
//!
//! One forward pass over the lines: classify, track frames, attribute
//! metrics, count diagnostics. Malformed or truncated input never fails; every
//! structure still open at the end (or at the line cap) is closed.

use crate::domain::error_signals::line_has_error_signal;
use crate::domain::frames::{ExitOutcome, FrameTracker};
use crate::domain::graph::LogGraph;
use crate::domain::issues::{Diagnostics, ParseStats};
use crate::domain::levels::parse_default_log_levels;
use crate::domain::line::{classify_line, LineKind};
use crate::domain::metrics::MetricsAttribution;
use serde::{Deserialize, Serialize};

/// Lines inspected for the level header by default.
pub const DEFAULT_HEAD_LINES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Stop scanning after this many lines (minimum 1).
    pub max_lines: Option<usize>,
    /// How many leading lines may hold the level header.
    pub head_lines: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { max_lines: None, head_lines: DEFAULT_HEAD_LINES }
    }
}

impl ParseOptions {
    pub fn with_max_lines(max_lines: usize) -> Self {
        Self { max_lines: Some(max_lines), ..Self::default() }
    }
}

/// Split on LF, dropping a CR before it. A trailing newline yields a final empty line.
fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect()
}

/// Parse with default options.
pub fn parse_apex_log(text: &str) -> LogGraph {
    parse_apex_log_with(text, &ParseOptions::default())
}

pub fn parse_apex_log_with(text: &str, options: &ParseOptions) -> LogGraph {
    let lines = split_lines(text);
    let head_end = options.head_lines.min(lines.len());
    let levels = parse_default_log_levels(&lines[..head_end]);
    let diagnostics = Diagnostics::from_levels(levels.as_ref());

    let mut tracker = FrameTracker::new(levels);
    let mut metrics = MetricsAttribution::new();
    let mut stats = ParseStats::default();
    let mut last_ns: Option<u64> = None;

    let limit = options.max_lines.map_or(lines.len(), |max| max.max(1)).min(lines.len());
    for (idx, line) in lines[..limit].iter().enumerate() {
        stats.lines_scanned += 1;
        let classified = classify_line(line);
        match &classified.stamp {
            Some(stamp) => {
                if last_ns.is_some_and(|prev| stamp.nanos < prev) {
                    stats.non_monotonic += 1;
                }
                last_ns = Some(stamp.nanos);
            }
            None => stats.missing_prefix += 1,
        }
        if line_has_error_signal(line) {
            stats.error_signals += 1;
            stats.first_error_line.get_or_insert(idx + 1);
        }

        match classified.kind {
            LineKind::OperationBegin(op) => metrics.operation_begin(&mut tracker, op, last_ns),
            LineKind::QueryMore => metrics.query_more(&mut tracker),
            LineKind::OperationEnd(op) => metrics.operation_end(&mut tracker, op, last_ns),
            LineKind::CumulativeStart => {
                metrics.cumulative_start();
                continue;
            }
            _ => {}
        }

        if metrics.in_cumulative_block() {
            metrics.observe_block_line(line);
            if classified.kind == LineKind::CumulativeEnd {
                metrics.cumulative_end(&mut tracker);
                continue;
            }
        }

        let stamp = classified.stamp.as_ref();
        match classified.kind {
            LineKind::UnitStarted(payload) => {
                stats.unit_starts += 1;
                tracker.unit_started(payload, stamp, last_ns);
            }
            LineKind::UnitFinished(payload) => {
                stats.unit_finishes += 1;
                tracker.unit_finished(payload, last_ns);
            }
            LineKind::MethodEntry(payload) => {
                stats.method_entries += 1;
                tracker.method_entry(payload, stamp, last_ns);
            }
            LineKind::MethodExit(payload) => {
                stats.method_exits += 1;
                if tracker.method_exit(payload, last_ns) == ExitOutcome::FallbackClosed {
                    stats.fallback_exit_closes += 1;
                }
            }
            _ => {}
        }
    }

    let out = tracker.finish(last_ns);
    stats.open_units = out.open_units;
    stats.open_methods = out.open_methods;
    stats.open_operations = metrics.open_operations();
    let issues = diagnostics.finish(&stats);

    log::debug!(
        "parsed {} of {} line(s): {} node(s), {} edge(s), {} frame(s), {} issue(s)",
        stats.lines_scanned,
        lines.len(),
        out.nodes.len(),
        out.edges.len(),
        out.nested.len(),
        issues.len()
    );

    LogGraph {
        nodes: out.nodes,
        edges: out.edges,
        sequence: out.sequence,
        flow: out.flow,
        nested: out.nested,
        issues,
    }
}
