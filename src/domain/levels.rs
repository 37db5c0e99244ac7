//! Level Header Reader
//!
//! Extracts the declared category/verbosity map from the head of an Apex log,
//! e.g. `64.0 APEX_CODE,FINEST;APEX_PROFILING,INFO;DB,INFO;SYSTEM,DEBUG;`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Verbosity scale, ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    None,
    Error,
    Warn,
    Info,
    Debug,
    Fine,
    Finer,
    Finest,
}

impl LogLevel {
    /// Case-insensitive lookup; unknown tokens yield `None`.
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.trim().to_uppercase().as_str() {
            "NONE" => Some(LogLevel::None),
            "ERROR" => Some(LogLevel::Error),
            "WARN" => Some(LogLevel::Warn),
            "INFO" => Some(LogLevel::Info),
            "DEBUG" => Some(LogLevel::Debug),
            "FINE" => Some(LogLevel::Fine),
            "FINER" => Some(LogLevel::Finer),
            "FINEST" => Some(LogLevel::Finest),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::None => "NONE",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Fine => "FINE",
            LogLevel::Finer => "FINER",
            LogLevel::Finest => "FINEST",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Category name -> declared verbosity.
pub type LogLevels = BTreeMap<String, LogLevel>;

/// Execution-tracing category; its presence identifies the header line.
pub const APEX_CODE: &str = "APEX_CODE";
pub const DB: &str = "DB";
pub const CALLOUT: &str = "CALLOUT";

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bAPEX_CODE\b.*[,;]").expect("valid header regex"));
static CATEGORY_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z_]+)\s*,\s*([A-Z]+)").expect("valid pair regex"));

/// Parse the default log levels from the first lines of a log.
///
/// Returns `None` when no header line is found or when it yields no
/// recognizable `CATEGORY,LEVEL` pair.
pub fn parse_default_log_levels<S: AsRef<str>>(head: &[S]) -> Option<LogLevels> {
    let line = head.iter().map(AsRef::as_ref).find(|l| HEADER_LINE.is_match(l))?;
    // Skip the leading API version
    let payload = line.find("APEX_").map_or(line, |i| &line[i..]);

    let mut levels = LogLevels::new();
    for part in payload.split(';') {
        if let Some(caps) = CATEGORY_PAIR.captures(part) {
            if let Some(level) = LogLevel::parse(&caps[2]) {
                levels.insert(caps[1].to_string(), level);
            }
        }
    }

    if levels.is_empty() {
        None
    } else {
        Some(levels)
    }
}
