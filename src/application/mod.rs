// Use cases: parse a log, pick a view, render it.

use crate::config::AppConfig;
use crate::domain::calltree::{build_call_tree, CallTreeModel};
use crate::domain::frame_filter::{filter_and_collapse, DiagramFrame};
use crate::domain::graph::LogGraph;
use crate::domain::issues::{LogIssue, Severity};
use crate::domain::parser::{parse_apex_log_with, ParseOptions};
use crate::domain::views::{invert_for_signature, merge_occurrences, scope_to_occurrence};
use crate::error::{Error, Result};
use crate::ports::OutputExporter;
use rayon::prelude::*;
use std::fmt;

/// Which projection of the log to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Actor graph, sequence and frames.
    Graph,
    /// Full call tree.
    Tree,
    /// All occurrences of a signature folded together.
    Merge(String),
    /// Callers of a signature.
    Backtrace(String),
    /// Subtree under one node id.
    Scope(String),
}

impl View {
    pub fn from_parts(name: &str, target: Option<&str>) -> Result<View> {
        let need = |view: &str| {
            target
                .map(str::to_string)
                .ok_or_else(|| Error::MissingTarget { view: view.to_string() })
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "graph" => Ok(View::Graph),
            "tree" => Ok(View::Tree),
            "merge" => Ok(View::Merge(need("merge")?)),
            "backtrace" | "back" => Ok(View::Backtrace(need("backtrace")?)),
            "scope" => Ok(View::Scope(need("scope")?)),
            other => Err(Error::UnknownView(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            View::Graph => "graph",
            View::Tree => "tree",
            View::Merge(_) => "merge",
            View::Backtrace(_) => "backtrace",
            View::Scope(_) => "scope",
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            View::Graph | View::Tree => None,
            View::Merge(t) | View::Backtrace(t) | View::Scope(t) => Some(t),
        }
    }

    /// Project `tree` for this view. `Graph` has no tree.
    pub fn apply(&self, tree: CallTreeModel) -> Option<CallTreeModel> {
        match self {
            View::Graph => None,
            View::Tree => Some(tree),
            View::Merge(sig) => Some(merge_occurrences(&tree, sig)),
            View::Backtrace(sig) => Some(invert_for_signature(&tree, sig)),
            View::Scope(id) => Some(scope_to_occurrence(&tree, id)),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(target) => write!(f, "{} {}", self.name(), target),
            None => f.write_str(self.name()),
        }
    }
}

/// Everything an exporter needs for one log.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// File name or other label of the input.
    pub source: String,
    pub view: View,
    pub graph: LogGraph,
    /// Nested frames after the diagram filter.
    pub frames: Vec<DiagramFrame>,
    pub tree: Option<CallTreeModel>,
}

/// Forward parser diagnostics to the log.
pub fn report_issues(source: &str, issues: &[LogIssue]) {
    for issue in issues {
        let at = issue.line.map(|l| format!(" (line {l})")).unwrap_or_default();
        match issue.severity {
            Severity::Error => log::error!("{source}: [{}] {}{at}", issue.code, issue.message),
            Severity::Warning => log::warn!("{source}: [{}] {}{at}", issue.code, issue.message),
            Severity::Info => log::info!("{source}: [{}] {}{at}", issue.code, issue.message),
        }
    }
}

pub struct AnalyzeUsecase<'a> {
    pub config: &'a AppConfig,
    pub exporter: &'a dyn OutputExporter,
}

impl<'a> AnalyzeUsecase<'a> {
    pub fn analyze(&self, source: &str, text: &str, view: &View) -> AnalysisReport {
        let graph = parse_apex_log_with(text, &self.config.parse);
        report_issues(source, &graph.issues);
        let frames = filter_and_collapse(&graph.nested, &self.config.filter);
        let tree = match view {
            View::Graph => None,
            _ => view.apply(build_call_tree(&graph.nested)),
        };
        AnalysisReport { source: source.to_string(), view: view.clone(), graph, frames, tree }
    }

    pub fn run(&self, source: &str, text: &str, view: &View) -> Result<String> {
        let report = self.analyze(source, text, view);
        self.exporter.render(&report)
    }

    /// Analyze and render many logs in parallel. Results keep input order.
    pub fn run_batch(&self, inputs: &[(String, String)], view: &View) -> Vec<(String, Result<String>)> {
        inputs
            .par_iter()
            .map(|(source, text)| (source.clone(), self.run(source, text, view)))
            .collect()
    }
}

/// Parse many logs in parallel. Each parse is independent.
pub fn analyze_batch(inputs: &[(String, String)], options: &ParseOptions) -> Vec<(String, LogGraph)> {
    inputs
        .par_iter()
        .map(|(source, text)| (source.clone(), parse_apex_log_with(text, options)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("graph", None, View::Graph)]
    #[case("Tree", None, View::Tree)]
    #[case("merge", Some("A#run()"), View::Merge("A#run()".into()))]
    #[case("back", Some("A#run()"), View::Backtrace("A#run()".into()))]
    #[case("scope", Some("Class:A:0"), View::Scope("Class:A:0".into()))]
    fn test_view_from_parts(#[case] name: &str, #[case] target: Option<&str>, #[case] expected: View) {
        assert_eq!(View::from_parts(name, target).unwrap(), expected);
    }

    #[test]
    fn test_view_errors() {
        assert!(matches!(View::from_parts("merge", None), Err(Error::MissingTarget { .. })));
        assert!(matches!(View::from_parts("flame", None), Err(Error::UnknownView(_))));
    }

    #[test]
    fn test_batch_keeps_order() {
        let inputs = vec![
            ("a.log".to_string(), "12:00:00.000 (0)|CODE_UNIT_STARTED|[EXTERNAL]|a".to_string()),
            ("b.log".to_string(), String::new()),
        ];
        let out = analyze_batch(&inputs, &ParseOptions::default());
        assert_eq!(out[0].0, "a.log");
        assert_eq!(out[0].1.nodes.len(), 1);
        assert!(out[1].1.nodes.is_empty());
    }
}
