// Exporters, file loading and thread-pool setup.

pub mod concurrency;
pub mod log_loader;

use crate::api::dto::ReportDto;
use crate::application::AnalysisReport;
use crate::config::OutputFormat;
use crate::domain::calltree::CallTreeModel;
use crate::error::Result;
use crate::ports::{DotExporter, OutputExporter};
use std::collections::HashSet;
use std::fmt::Write as _;

pub use log_loader::LogLoader;

/// Methods listed in the text summary.
const TOP_OWN_TIME: usize = 10;

pub struct JsonExporter {
    pub pretty: bool,
}

impl OutputExporter for JsonExporter {
    fn render(&self, report: &AnalysisReport) -> Result<String> {
        let dto = ReportDto::from(report);
        let text = if self.pretty { serde_json::to_string_pretty(&dto)? } else { serde_json::to_string(&dto)? };
        Ok(text)
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

/// Human-readable summary.
pub struct TextExporter;

impl TextExporter {
    fn write_tree(out: &mut String, tree: &CallTreeModel) {
        // Backtraces of recursive code link a node to itself.
        let mut seen = HashSet::new();
        let mut stack: Vec<(usize, usize)> = tree.roots.iter().rev().map(|&r| (r, 0)).collect();
        while let Some((idx, depth)) = stack.pop() {
            let node = &tree.nodes[idx];
            let count = node.metrics.count.map(|c| format!(" x{c}")).unwrap_or_default();
            let _ = writeln!(
                out,
                "{}{}{} [{} ms, own {} ms]",
                "  ".repeat(depth + 1),
                node.call.label,
                count,
                node.metrics.total_time_ms,
                node.metrics.own_time_ms
            );
            if !seen.insert(idx) {
                continue;
            }
            for &child in node.children.iter().rev() {
                if !seen.contains(&child) {
                    stack.push((child, depth + 1));
                }
            }
        }
    }

    fn write_top_own_time(out: &mut String, tree: &CallTreeModel) {
        let mut nodes: Vec<_> = tree.nodes.iter().filter(|n| n.metrics.own_time_ms > 0).collect();
        if nodes.is_empty() {
            return;
        }
        nodes.sort_by(|a, b| b.metrics.own_time_ms.cmp(&a.metrics.own_time_ms).then_with(|| a.id.cmp(&b.id)));
        let _ = writeln!(out, "top own time:");
        for node in nodes.into_iter().take(TOP_OWN_TIME) {
            let _ = writeln!(out, "  {:>6} ms  {}", node.metrics.own_time_ms, node.call.label);
        }
    }
}

impl OutputExporter for TextExporter {
    fn render(&self, report: &AnalysisReport) -> Result<String> {
        let graph = &report.graph;
        let mut out = String::new();
        let _ = writeln!(out, "{} ({})", report.source, report.view);
        let _ = writeln!(
            out,
            "  {} node(s), {} edge(s), {} event(s), {} frame(s)",
            graph.nodes.len(),
            graph.edges.len(),
            graph.sequence.len(),
            graph.nested.len()
        );
        for edge in &graph.edges {
            let _ = writeln!(out, "  {} -> {} x{}", edge.from, edge.to, edge.count);
        }
        if !graph.issues.is_empty() {
            let _ = writeln!(out, "issues:");
            for issue in &graph.issues {
                let at = issue.line.map(|l| format!(" (line {l})")).unwrap_or_default();
                let _ = writeln!(out, "  {} {}: {}{}", issue.severity, issue.code, issue.message, at);
            }
        }
        if let Some(tree) = &report.tree {
            let _ = writeln!(out, "call tree ({} ms):", tree.totals.total_time_ms);
            Self::write_tree(&mut out, tree);
            Self::write_top_own_time(&mut out, tree);
        }
        Ok(out)
    }

    fn extension(&self) -> &'static str {
        "txt"
    }
}

/// Exporter for a configured output format.
pub fn exporter_for(format: OutputFormat, pretty: bool) -> Box<dyn OutputExporter> {
    match format {
        OutputFormat::Json => Box::new(JsonExporter { pretty }),
        OutputFormat::Dot => Box::new(DotExporter),
        OutputFormat::Text => Box::new(TextExporter),
    }
}
