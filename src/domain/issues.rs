//! Diagnostics Engine
//!
//! Advisory findings about a parsed log. Counters are accumulated during the
//! pass and flushed into `LogIssue`s once, at the end. Issues never change the
//! shape of the graph.

use crate::domain::levels::{LogLevel, LogLevels, APEX_CODE, CALLOUT, DB};
use crate::domain::line::OperationKind;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// 1-based line number, when the finding points at one line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl LogIssue {
    fn new(severity: Severity, code: &str, message: String) -> Self {
        Self { severity, code: code.to_string(), message, details: None, line: None }
    }

    fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

/// Counters gathered during a single parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_scanned: usize,
    pub missing_prefix: usize,
    pub non_monotonic: usize,
    pub unit_starts: usize,
    pub unit_finishes: usize,
    pub method_entries: usize,
    pub method_exits: usize,
    pub fallback_exit_closes: usize,
    pub open_units: usize,
    pub open_methods: usize,
    pub open_operations: Vec<(OperationKind, usize)>,
    pub error_signals: usize,
    pub first_error_line: Option<usize>,
}

/// Collects issues; static level checks run up front, dynamic ones on `finish`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    issues: Vec<LogIssue>,
}

impl Diagnostics {
    /// Start a report with the checks that only need the declared levels.
    pub fn from_levels(levels: Option<&LogLevels>) -> Self {
        let mut diag = Diagnostics::default();
        let Some(levels) = levels else {
            diag.push(
                LogIssue::new(Severity::Info, "levels.missing", "Default log levels not detected in header.".into())
                    .with_details(
                        "Some features may be incomplete. Ensure the first lines include categories (e.g., APEX_CODE,FINEST;DB,INFO;CALLOUT,INFO;).",
                    ),
            );
            return diag;
        };

        let below = |category: &str, wanted: LogLevel| levels.get(category).map_or(true, |lvl| *lvl < wanted);
        if below(APEX_CODE, LogLevel::Finest) {
            diag.push(
                LogIssue::new(Severity::Warning, "levels.apex_code.low", "APEX_CODE level below FINEST.".into())
                    .with_details("Method entries may be missing. Set APEX_CODE to FINEST for best results."),
            );
        }
        if below(DB, LogLevel::Info) {
            diag.push(
                LogIssue::new(Severity::Warning, "levels.db.low", "DB level below INFO.".into())
                    .with_details("SOQL/DML counters and timings may be incomplete. Set DB to INFO or higher."),
            );
        }
        if below(CALLOUT, LogLevel::Info) {
            diag.push(
                LogIssue::new(Severity::Warning, "levels.callout.low", "CALLOUT level below INFO.".into())
                    .with_details("Callout counters and timings may be incomplete. Set CALLOUT to INFO or higher."),
            );
        }
        diag
    }

    fn push(&mut self, issue: LogIssue) {
        self.issues.push(issue);
    }

    /// Flush the dynamic checks and return every issue.
    pub fn finish(mut self, stats: &ParseStats) -> Vec<LogIssue> {
        if stats.missing_prefix > 0 {
            self.push(
                LogIssue::new(
                    Severity::Warning,
                    "timestamps.missing",
                    format!("{} line(s) without time prefix.", stats.missing_prefix),
                )
                .with_details("Timeline metrics rely on the (nanos) prefix. Some durations may be inaccurate."),
            );
        }
        if stats.non_monotonic > 0 {
            self.push(
                LogIssue::new(
                    Severity::Info,
                    "timestamps.non_monotonic",
                    format!("Detected {} non-monotonic timestamp(s).", stats.non_monotonic),
                )
                .with_details("Out-of-order timestamps can occur; timeline durations are clamped to non-negative."),
            );
        }
        if stats.unit_starts == 0 {
            self.push(
                LogIssue::new(Severity::Warning, "events.code_unit.missing", "No CODE_UNIT_* events found.".into())
                    .with_details("Diagram may be empty. Ensure APEX_CODE is set to FINEST."),
            );
        }
        if stats.method_entries == 0 {
            self.push(
                LogIssue::new(Severity::Info, "events.methods.missing", "No METHOD_ENTRY events found.".into())
                    .with_details("Method timeline will be empty. Set APEX_CODE to FINEST."),
            );
        }
        if stats.method_entries != stats.method_exits {
            self.push(
                LogIssue::new(
                    Severity::Info,
                    "events.methods.unbalanced",
                    format!("METHOD_ENTRY ({}) != METHOD_EXIT ({}).", stats.method_entries, stats.method_exits),
                )
                .with_details("This can happen with system frames. Parser compensates, but durations may be rough."),
            );
        }
        if stats.open_units > 0 {
            self.push(
                LogIssue::new(
                    Severity::Warning,
                    "frames.unit.unclosed",
                    format!("{} code unit(s) left open at end of log.", stats.open_units),
                )
                .with_details("Unclosed units reduce accuracy of durations and nesting."),
            );
        }
        if stats.open_methods > 0 {
            self.push(LogIssue::new(
                Severity::Info,
                "frames.method.unclosed",
                format!("{} method frame(s) left open at end of log.", stats.open_methods),
            ));
        }
        if stats.fallback_exit_closes > 0 {
            self.push(LogIssue::new(
                Severity::Info,
                "methods.exit.fallback",
                format!(
                    "Closed {} method(s) by fallback due to ambiguous METHOD_EXIT entries.",
                    stats.fallback_exit_closes
                ),
            ));
        }
        for &(op, open) in &stats.open_operations {
            if open > 0 {
                self.push(LogIssue::new(
                    Severity::Info,
                    &format!("{}.open", op.code()),
                    format!("{} {} without {}.", open, op.begin_marker(), op.end_marker()),
                ));
            }
        }
        if stats.error_signals > 0 {
            let mut issue = LogIssue::new(
                Severity::Warning,
                "events.error_signal",
                format!("{} line(s) report an exception or fatal error.", stats.error_signals),
            )
            .with_details("Execution may have been interrupted; frames after the failure can be truncated.");
            issue.line = stats.first_error_line;
            self.push(issue);
        }
        self.issues
    }
}
