// Call graph structures for Apex debug logs.
// Nodes are triggers, classes and flows; edges count observed invocations.

use crate::domain::issues::LogIssue;
use crate::domain::levels::LogLevels;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of actor a graph node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Trigger,
    Class,
    Flow,
    Other,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "Trigger",
            NodeKind::Class => "Class",
            NodeKind::Flow => "Flow",
            NodeKind::Other => "Other",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Stable node id: `Kind:Name`.
pub fn node_id(kind: NodeKind, name: &str) -> String {
    format!("{}:{}", kind.name(), name)
}

/// A node in the call graph. Created on first reference and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<LogLevels>,
}

/// Directed call edge with an observation counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub count: u64,
}

/// One unit start or method entry, in log order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nanos: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Unit,
    Method,
}

/// Interval on a single actor's swim lane. `depth` counts only that lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSpan {
    pub actor: String,
    pub label: String,
    pub start: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    pub depth: usize,
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ns: Option<u64>,
}

/// Counters captured while a nested frame was active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameProfile {
    pub soql: u64,
    pub dml: u64,
    pub callout: u64,
    pub soql_time_ms: u64,
    pub dml_time_ms: u64,
    pub callout_time_ms: u64,
    pub cpu_ms: u64,
    pub heap_bytes: u64,
    /// Wall-clock duration from the frame's own start/end nanoseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
}

impl FrameProfile {
    /// Sum every counter of `other` into `self`.
    pub fn absorb(&mut self, other: &FrameProfile) {
        self.soql += other.soql;
        self.dml += other.dml;
        self.callout += other.callout;
        self.soql_time_ms += other.soql_time_ms;
        self.dml_time_ms += other.dml_time_ms;
        self.callout_time_ms += other.callout_time_ms;
        self.cpu_ms += other.cpu_ms;
        self.heap_bytes += other.heap_bytes;
        if let Some(ms) = other.time_ms {
            self.time_ms = Some(self.time_ms.unwrap_or(0) + ms);
        }
    }
}

/// Interval on the single global stack shared by unit and method frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedFrame {
    pub actor: String,
    pub label: String,
    pub start: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    pub depth: usize,
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<FrameProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ns: Option<u64>,
}

impl NestedFrame {
    pub fn profile_mut(&mut self) -> &mut FrameProfile {
        self.profile.get_or_insert_with(FrameProfile::default)
    }
}

/// Everything derived from one log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub sequence: Vec<SequenceEvent>,
    pub flow: Vec<FlowSpan>,
    pub nested: Vec<NestedFrame>,
    pub issues: Vec<LogIssue>,
}

impl LogGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    pub fn has_issue(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Node dedup and edge counting, in first-seen order.
#[derive(Debug, Default)]
pub struct GraphAssembler {
    nodes: Vec<GraphNode>,
    node_index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    edge_index: HashMap<(String, String), usize>,
    sequence: Vec<SequenceEvent>,
}

impl GraphAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the node for `(kind, name)`, creating it on first reference.
    pub fn upsert_node(&mut self, kind: NodeKind, name: &str, levels: Option<&LogLevels>) -> &GraphNode {
        let id = node_id(kind, name);
        let idx = match self.node_index.get(&id) {
            Some(&idx) => idx,
            None => {
                let idx = self.nodes.len();
                self.nodes.push(GraphNode {
                    id: id.clone(),
                    label: name.to_string(),
                    kind,
                    levels: levels.cloned(),
                });
                self.node_index.insert(id, idx);
                idx
            }
        };
        &self.nodes[idx]
    }

    /// Count one `from -> to` observation. Self loops are ignored.
    pub fn inc_edge(&mut self, from: &str, to: &str) -> Option<&GraphEdge> {
        if from == to {
            return None;
        }
        let key = (from.to_string(), to.to_string());
        let idx = match self.edge_index.get(&key) {
            Some(&idx) => {
                self.edges[idx].count += 1;
                idx
            }
            None => {
                let idx = self.edges.len();
                self.edges.push(GraphEdge { from: key.0.clone(), to: key.1.clone(), count: 1 });
                self.edge_index.insert(key, idx);
                idx
            }
        };
        Some(&self.edges[idx])
    }

    pub fn add_sequence_event(&mut self, event: SequenceEvent) {
        self.sequence.push(event);
    }

    /// Number of sequence events so far; frames use it as their position.
    pub fn sequence_len(&self) -> usize {
        self.sequence.len()
    }

    pub fn into_parts(self) -> (Vec<GraphNode>, Vec<GraphEdge>, Vec<SequenceEvent>) {
        (self.nodes, self.edges, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::levels::LogLevel;

    #[test]
    fn test_node_id() {
        assert_eq!(node_id(NodeKind::Class, "MyClass"), "Class:MyClass");
        assert_eq!(node_id(NodeKind::Trigger, "T"), "Trigger:T");
    }

    #[test]
    fn test_upsert_memoizes() {
        let mut graph = GraphAssembler::new();
        let finest: LogLevels = [("APEX_CODE".to_string(), LogLevel::Finest)].into_iter().collect();
        let debug: LogLevels = [("APEX_CODE".to_string(), LogLevel::Debug)].into_iter().collect();
        graph.upsert_node(NodeKind::Class, "Svc", Some(&finest));
        let node = graph.upsert_node(NodeKind::Class, "Svc", Some(&debug)).clone();
        assert_eq!(node.id, "Class:Svc");
        assert_eq!(node.label, "Svc");
        assert_eq!(node.levels, Some(finest));
        let (nodes, _, _) = graph.into_parts();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_inc_edge_counts_and_skips_self_loops() {
        let mut graph = GraphAssembler::new();
        assert!(graph.inc_edge("Class:A", "Class:A").is_none());
        assert_eq!(graph.inc_edge("Class:A", "Class:B").map(|e| e.count), Some(1));
        assert_eq!(graph.inc_edge("Class:A", "Class:B").map(|e| e.count), Some(2));
        assert_eq!(graph.inc_edge("Class:B", "Class:A").map(|e| e.count), Some(1));
        let (_, edges, _) = graph.into_parts();
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn test_sequence_without_owner() {
        let mut graph = GraphAssembler::new();
        graph.add_sequence_event(SequenceEvent {
            from: None,
            to: "Class:Target".to_string(),
            label: "METHOD_ENTRY".to_string(),
            time: None,
            nanos: None,
        });
        assert_eq!(graph.sequence_len(), 1);
        let (_, _, sequence) = graph.into_parts();
        assert!(sequence[0].from.is_none());
    }

    #[test]
    fn test_profile_absorb() {
        let mut a = FrameProfile { soql: 1, time_ms: Some(3), ..Default::default() };
        let b = FrameProfile { soql: 2, dml: 1, time_ms: Some(4), ..Default::default() };
        a.absorb(&b);
        assert_eq!(a.soql, 3);
        assert_eq!(a.dml, 1);
        assert_eq!(a.time_ms, Some(7));
    }
}
