use crate::application::AnalysisReport;
use crate::error::Result;

pub mod dot_exporter;

pub use dot_exporter::DotExporter;

/// Turns a finished report into text (JSON, DOT, plain summary).
pub trait OutputExporter: Send + Sync {
    fn render(&self, report: &AnalysisReport) -> Result<String>;

    /// Extension used when writing one file per input.
    fn extension(&self) -> &'static str;
}
