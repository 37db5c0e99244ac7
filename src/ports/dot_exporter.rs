//! Graphviz DOT Exporter
//!
//! The `graph` view draws actors with edges labelled by call counts. Tree
//! views draw one box per call tree node with its total and own time.

use crate::application::AnalysisReport;
use crate::domain::calltree::CallTreeModel;
use crate::domain::graph::{LogGraph, NodeKind};
use crate::error::Result;
use crate::ports::OutputExporter;

pub struct DotExporter;

impl OutputExporter for DotExporter {
    fn render(&self, report: &AnalysisReport) -> Result<String> {
        Ok(match &report.tree {
            Some(tree) => Self::tree_to_dot(tree),
            None => Self::graph_to_dot(&report.graph),
        })
    }

    fn extension(&self) -> &'static str {
        "dot"
    }
}

impl DotExporter {
    fn header(name: &str, lines: &mut Vec<String>) {
        lines.push(format!("digraph {name} {{"));
        lines.push("    rankdir=LR;".to_string());
        lines.push("    nodesep=0.6;".to_string());
        lines.push("    node [fontname=\"Helvetica\", fontsize=12];".to_string());
        lines.push("    edge [fontname=\"Helvetica\", fontsize=10];".to_string());
        lines.push(String::new());
    }

    /// Actor graph: one node per trigger/class/flow, edge label = call count.
    pub fn graph_to_dot(graph: &LogGraph) -> String {
        let mut lines = Vec::new();
        Self::header("ApexLog", &mut lines);

        for node in &graph.nodes {
            let (shape, color, style) = Self::node_style(node.kind);
            lines.push(format!(
                "    \"{}\" [label=\"{}\", shape={}, style=\"{}\", fillcolor=\"{}\", color=\"{}\"];",
                Self::escape_label(&node.id),
                Self::escape_label(&node.label),
                shape,
                style,
                color,
                Self::border_color(node.kind)
            ));
        }

        lines.push(String::new());

        for edge in &graph.edges {
            lines.push(format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];",
                Self::escape_label(&edge.from),
                Self::escape_label(&edge.to),
                edge.count
            ));
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    /// Call tree (or merged/backtrace/scoped view of it).
    pub fn tree_to_dot(tree: &CallTreeModel) -> String {
        let mut lines = Vec::new();
        Self::header("CallTree", &mut lines);

        for node in &tree.nodes {
            let m = &node.metrics;
            let count = m.count.map(|c| format!(" x{c}")).unwrap_or_default();
            let label = format!("{}{}\n{} ms total / {} ms own", node.call.label, count, m.total_time_ms, m.own_time_ms);
            let (shape, color, style) = Self::node_style(NodeKind::Class);
            lines.push(format!(
                "    \"{}\" [label=\"{}\", shape={}, style=\"{}\", fillcolor=\"{}\"];",
                Self::escape_label(&node.id),
                Self::escape_label(&label),
                shape,
                style,
                color
            ));
        }

        lines.push(String::new());

        for (idx, node) in tree.nodes.iter().enumerate() {
            for child in tree.children(idx) {
                lines.push(format!(
                    "    \"{}\" -> \"{}\";",
                    Self::escape_label(&node.id),
                    Self::escape_label(&child.id)
                ));
            }
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    fn node_style(kind: NodeKind) -> (&'static str, &'static str, &'static str) {
        match kind {
            NodeKind::Trigger => ("box", "#f9e2af", "filled,rounded"), // Yellow
            NodeKind::Class => ("box", "#89b4fa", "filled"),           // Blue
            NodeKind::Flow => ("hexagon", "#a6e3a1", "filled"),        // Green
            NodeKind::Other => ("box", "#6c7086", "filled,dashed"),    // Gray
        }
    }

    fn border_color(kind: NodeKind) -> &'static str {
        match kind {
            NodeKind::Trigger => "#df8e1d",
            NodeKind::Class => "#1e66f5",
            NodeKind::Flow => "#40a02b",
            NodeKind::Other => "#5c5f77",
        }
    }

    fn escape_label(label: &str) -> String {
        label
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calltree::build_call_tree;
    use crate::domain::graph::{FrameKind, GraphEdge, GraphNode, NestedFrame};

    #[test]
    fn test_graph_to_dot() {
        let graph = LogGraph {
            nodes: vec![
                GraphNode { id: "Trigger:AccTrg".into(), label: "AccTrg".into(), kind: NodeKind::Trigger, levels: None },
                GraphNode { id: "Class:Svc".into(), label: "Svc".into(), kind: NodeKind::Class, levels: None },
            ],
            edges: vec![GraphEdge { from: "Trigger:AccTrg".into(), to: "Class:Svc".into(), count: 3 }],
            ..Default::default()
        };

        let dot = DotExporter::graph_to_dot(&graph);
        assert!(dot.starts_with("digraph ApexLog {"));
        assert!(dot.contains("\"Trigger:AccTrg\" [label=\"AccTrg\", shape=box"));
        assert!(dot.contains("\"Trigger:AccTrg\" -> \"Class:Svc\" [label=\"3\"];"));
        assert!(dot.ends_with('}'));
    }

    #[test]
    fn test_tree_to_dot_escapes_labels() {
        let frames = vec![
            NestedFrame {
                actor: "Class:Svc".into(),
                label: "Svc.run(\"x\")".into(),
                start: 0,
                end: Some(4),
                depth: 0,
                kind: FrameKind::Method,
                profile: None,
                start_ns: None,
                end_ns: None,
            },
            NestedFrame {
                actor: "Class:Repo".into(),
                label: "Repo.load()".into(),
                start: 1,
                end: Some(2),
                depth: 1,
                kind: FrameKind::Method,
                profile: None,
                start_ns: None,
                end_ns: None,
            },
        ];
        let dot = DotExporter::tree_to_dot(&build_call_tree(&frames));
        assert!(dot.contains("Svc.run(\\\"x\\\")\\n4 ms total / 3 ms own"));
        assert!(dot.contains("\"Class:Svc:0\" -> \"Class:Repo:1\";"));
    }
}
