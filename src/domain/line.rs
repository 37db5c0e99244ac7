//! Line Classifier
//!
//! Recognizes the handful of event kinds the graph builder cares about and
//! extracts the `HH:MM:SS.fff (nanos)|` prefix of a debug log line.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TIME_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s*\((\d+)\)\|").expect("valid prefix regex")
});
static CUMULATIVE_CPU: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Maximum CPU time:\s*(\d+)\s+out of").expect("valid cpu regex")
});
static CUMULATIVE_HEAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Maximum heap size:\s*(\d+)\s+out of").expect("valid heap regex")
});

/// Wall-clock text and the raw nanosecond counter of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub time: String,
    pub nanos: u64,
}

/// Timed work with a begin/end marker pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Soql,
    Dml,
    Callout,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [OperationKind::Soql, OperationKind::Dml, OperationKind::Callout];

    pub fn begin_marker(&self) -> &'static str {
        match self {
            OperationKind::Soql => "SOQL_EXECUTE_BEGIN",
            OperationKind::Dml => "DML_BEGIN",
            OperationKind::Callout => "CALLOUT_REQUEST",
        }
    }

    pub fn end_marker(&self) -> &'static str {
        match self {
            OperationKind::Soql => "SOQL_EXECUTE_END",
            OperationKind::Dml => "DML_END",
            OperationKind::Callout => "CALLOUT_RESPONSE",
        }
    }

    /// Diagnostic code prefix (`soql.open`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            OperationKind::Soql => "soql",
            OperationKind::Dml => "dml",
            OperationKind::Callout => "callout",
        }
    }
}

/// What a single line means to the frame tracker and metrics attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    OperationBegin(OperationKind),
    /// Counts as a query but starts no timer.
    QueryMore,
    OperationEnd(OperationKind),
    CumulativeStart,
    CumulativeEnd,
    UnitStarted(&'a str),
    UnitFinished(&'a str),
    MethodEntry(&'a str),
    MethodExit(&'a str),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine<'a> {
    pub stamp: Option<Timestamp>,
    pub kind: LineKind<'a>,
}

/// Parse the optional time prefix.
pub fn parse_timestamp(line: &str) -> Option<Timestamp> {
    let caps = TIME_PREFIX.captures(line)?;
    let nanos = caps[2].parse().ok()?;
    Some(Timestamp { time: caps[1].to_string(), nanos })
}

/// True when one whole pipe-delimited field equals `marker` (case-insensitive).
fn has_marker(line: &str, marker: &str) -> bool {
    line.split('|').any(|field| field.eq_ignore_ascii_case(marker))
}

/// The text after `|EVENT|`, when present and non-empty.
fn event_payload<'a>(line: &'a str, event: &str) -> Option<&'a str> {
    let needle = format!("|{event}|");
    let at = line.find(&needle)?;
    let payload = &line[at + needle.len()..];
    (!payload.is_empty()).then_some(payload)
}

/// Classify one raw line.
pub fn classify_line(line: &str) -> ClassifiedLine<'_> {
    ClassifiedLine { stamp: parse_timestamp(line), kind: classify_kind(line) }
}

fn classify_kind(line: &str) -> LineKind<'_> {
    for op in OperationKind::ALL {
        if has_marker(line, op.begin_marker()) {
            return LineKind::OperationBegin(op);
        }
    }
    if has_marker(line, "QUERY_MORE") {
        return LineKind::QueryMore;
    }
    for op in OperationKind::ALL {
        if has_marker(line, op.end_marker()) {
            return LineKind::OperationEnd(op);
        }
    }
    if has_marker(line, "CUMULATIVE_LIMIT_USAGE") || has_marker(line, "CUMULATIVE_PROFILING") {
        return LineKind::CumulativeStart;
    }
    if has_marker(line, "CUMULATIVE_LIMIT_USAGE_END") || has_marker(line, "CUMULATIVE_PROFILING_END") {
        return LineKind::CumulativeEnd;
    }
    if let Some(payload) = event_payload(line, "CODE_UNIT_STARTED") {
        return LineKind::UnitStarted(payload);
    }
    if let Some(payload) = event_payload(line, "CODE_UNIT_FINISHED") {
        return LineKind::UnitFinished(payload);
    }
    if let Some(payload) = event_payload(line, "METHOD_ENTRY") {
        return LineKind::MethodEntry(payload);
    }
    if let Some(payload) = event_payload(line, "METHOD_EXIT") {
        return LineKind::MethodExit(payload);
    }
    LineKind::Other
}

/// `Maximum CPU time: N out of ...` inside a cumulative block.
pub fn cumulative_cpu_ms(line: &str) -> Option<u64> {
    CUMULATIVE_CPU.captures(line)?[1].parse().ok()
}

/// `Maximum heap size: N out of ...` inside a cumulative block.
pub fn cumulative_heap_bytes(line: &str) -> Option<u64> {
    CUMULATIVE_HEAP.captures(line)?[1].parse().ok()
}

/// The last pipe-delimited segment of an event payload.
pub fn last_segment(payload: &str) -> &str {
    payload.rsplit('|').next().unwrap_or(payload)
}
