//! Call Tree Builder
//!
//! Turns the method frames of a `LogGraph` into a tree by interval
//! containment. Nodes live in one arena; parent and child links are indices.

use crate::domain::frames::duration_ms;
use crate::domain::graph::{FrameKind, NestedFrame};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Arena index of a call tree node.
pub type NodeIdx = usize;

/// `className#method` grouping key. The method part keeps its argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub class_name: String,
    pub method: String,
}

impl Signature {
    pub fn key(&self) -> String {
        format!("{}#{}", self.class_name, self.method)
    }
}

/// Derive the grouping signature of a method frame.
///
/// The class is everything before the last dot of the argument-free label;
/// the method is the raw label after that dot. Labels without a dot borrow
/// the class from a `Class:` actor.
pub fn signature_from_label(actor: &str, label: &str) -> Signature {
    let raw = label.trim();
    let no_args = raw.split('|').next().unwrap_or(raw);
    let before_paren = no_args.split('(').next().unwrap_or(no_args);
    match before_paren.rfind('.') {
        Some(dot) if dot > 0 => Signature {
            class_name: before_paren[..dot].to_string(),
            method: raw[dot + 1..].to_string(),
        },
        _ => Signature {
            class_name: actor.strip_prefix("Class:").unwrap_or("").to_string(),
            method: before_paren.to_string(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRef {
    pub class_name: String,
    pub method: String,
    pub label: String,
}

/// Timing and resource counters of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeMetrics {
    pub total_time_ms: u64,
    pub own_time_ms: u64,
    pub soql: u64,
    pub dml: u64,
    pub callout: u64,
    pub soql_time_ms: u64,
    pub dml_time_ms: u64,
    pub callout_time_ms: u64,
    pub cpu_ms: u64,
    pub heap_bytes: u64,
    /// Occurrences folded into an aggregated node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl TreeMetrics {
    /// Fold one more occurrence into an aggregate.
    pub fn accumulate(&mut self, other: &TreeMetrics) {
        self.total_time_ms += other.total_time_ms;
        self.own_time_ms += other.own_time_ms;
        self.soql += other.soql;
        self.dml += other.dml;
        self.callout += other.callout;
        self.soql_time_ms += other.soql_time_ms;
        self.dml_time_ms += other.dml_time_ms;
        self.callout_time_ms += other.callout_time_ms;
        self.cpu_ms += other.cpu_ms;
        self.heap_bytes += other.heap_bytes;
        self.count = Some(self.count.unwrap_or(0) + 1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTreeNode {
    pub id: String,
    #[serde(rename = "ref")]
    pub call: CallRef,
    pub children: Vec<NodeIdx>,
    pub parents: Vec<NodeIdx>,
    pub metrics: TreeMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl CallTreeNode {
    /// A node with no position in the log, used by the aggregating views.
    pub fn detached(id: String, class_name: &str, method: &str) -> Self {
        Self {
            id,
            call: CallRef {
                class_name: class_name.to_string(),
                method: method.to_string(),
                label: format!("{class_name}.{method}"),
            },
            children: Vec::new(),
            parents: Vec::new(),
            metrics: TreeMetrics::default(),
            start: None,
            end: None,
            depth: None,
            actor: None,
        }
    }

    pub fn signature(&self) -> String {
        format!("{}#{}", self.call.class_name, self.call.method)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTreeModel {
    pub nodes: Vec<CallTreeNode>,
    pub roots: Vec<NodeIdx>,
    /// Node id -> arena index.
    pub all: HashMap<String, NodeIdx>,
    /// Signature -> occurrences, in arena order.
    pub by_signature: HashMap<String, Vec<NodeIdx>>,
    /// Signature -> distinct caller signatures.
    pub parents_by_signature: HashMap<String, BTreeSet<String>>,
    pub totals: Totals,
}

impl CallTreeModel {
    /// Index a finished arena. `totals` sums the root totals.
    pub fn from_nodes(
        nodes: Vec<CallTreeNode>,
        roots: Vec<NodeIdx>,
        parents_by_signature: HashMap<String, BTreeSet<String>>,
    ) -> Self {
        let mut all = HashMap::with_capacity(nodes.len());
        let mut by_signature: HashMap<String, Vec<NodeIdx>> = HashMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            all.insert(node.id.clone(), idx);
            by_signature.entry(node.signature()).or_default().push(idx);
        }
        let total_time_ms = roots.iter().map(|&r| nodes[r].metrics.total_time_ms).sum();
        Self { nodes, roots, all, by_signature, parents_by_signature, totals: Totals { total_time_ms } }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CallTreeNode> {
        self.all.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn children(&self, idx: NodeIdx) -> impl Iterator<Item = &CallTreeNode> + '_ {
        self.nodes[idx].children.iter().map(move |&c| &self.nodes[c])
    }

    pub fn occurrences(&self, signature: &str) -> &[NodeIdx] {
        self.by_signature.get(signature).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn root_nodes(&self) -> impl Iterator<Item = &CallTreeNode> + '_ {
        self.roots.iter().map(move |&r| &self.nodes[r])
    }
}

/// Total time of a frame: measured milliseconds, else the rounded
/// nanosecond span, else the sequence-index span.
fn frame_total_ms(frame: &NestedFrame) -> u64 {
    if let Some(ms) = frame.profile.as_ref().and_then(|p| p.time_ms) {
        return ms;
    }
    if let (Some(start), Some(end)) = (frame.start_ns, frame.end_ns) {
        return duration_ms(start, end);
    }
    let end = frame.end.unwrap_or(frame.start + 1);
    end.saturating_sub(frame.start) as u64
}

fn metrics_of(frame: &NestedFrame) -> TreeMetrics {
    let p = frame.profile.clone().unwrap_or_default();
    TreeMetrics {
        total_time_ms: frame_total_ms(frame),
        own_time_ms: 0,
        soql: p.soql,
        dml: p.dml,
        callout: p.callout,
        soql_time_ms: p.soql_time_ms,
        dml_time_ms: p.dml_time_ms,
        callout_time_ms: p.callout_time_ms,
        cpu_ms: p.cpu_ms,
        heap_bytes: p.heap_bytes,
        count: None,
    }
}

/// Build the call tree from the method frames of `nested`.
///
/// A frame is a child of the innermost preceding frame whose interval still
/// contains its start. Unit frames are ignored.
pub fn build_call_tree(nested: &[NestedFrame]) -> CallTreeModel {
    let mut frames: Vec<&NestedFrame> = nested.iter().filter(|f| f.kind == FrameKind::Method).collect();
    frames.sort_by_key(|f| (f.start, f.depth));

    let mut nodes: Vec<CallTreeNode> = Vec::with_capacity(frames.len());
    let mut roots = Vec::new();
    let mut parents_by_signature: HashMap<String, BTreeSet<String>> = HashMap::new();
    // (arena index, interval end); an open end never closes.
    let mut stack: Vec<(NodeIdx, Option<usize>)> = Vec::new();

    for frame in frames {
        while stack
            .last()
            .is_some_and(|&(_, end)| end.is_some_and(|end| end <= frame.start))
        {
            stack.pop();
        }

        let sig = signature_from_label(&frame.actor, &frame.label);
        let idx = nodes.len();
        let parent = stack.last().map(|&(p, _)| p);
        nodes.push(CallTreeNode {
            id: format!("{}:{}", frame.actor, frame.start),
            call: CallRef {
                class_name: sig.class_name.clone(),
                method: sig.method.clone(),
                label: frame.label.clone(),
            },
            children: Vec::new(),
            parents: parent.into_iter().collect(),
            metrics: metrics_of(frame),
            start: Some(frame.start),
            end: frame.end,
            depth: Some(frame.depth),
            actor: Some(frame.actor.clone()),
        });

        match parent {
            Some(p) => {
                nodes[p].children.push(idx);
                let parent_sig = nodes[p].signature();
                parents_by_signature.entry(sig.key()).or_default().insert(parent_sig);
            }
            None => roots.push(idx),
        }
        stack.push((idx, frame.end));
    }

    // Children totals never change, so any visiting order works.
    for idx in 0..nodes.len() {
        let children_ms: u64 = nodes[idx].children.iter().map(|&c| nodes[c].metrics.total_time_ms).sum();
        let node = &mut nodes[idx];
        node.metrics.own_time_ms = node.metrics.total_time_ms.saturating_sub(children_ms);
    }

    let model = CallTreeModel::from_nodes(nodes, roots, parents_by_signature);
    log::debug!(
        "call tree: {} node(s), {} root(s), {} signature(s)",
        model.nodes.len(),
        model.roots.len(),
        model.by_signature.len()
    );
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::FrameProfile;
    use rstest::rstest;

    fn method(actor: &str, label: &str, start: usize, end: Option<usize>, depth: usize) -> NestedFrame {
        NestedFrame {
            actor: actor.to_string(),
            label: label.to_string(),
            start,
            end,
            depth,
            kind: FrameKind::Method,
            profile: None,
            start_ns: None,
            end_ns: None,
        }
    }

    #[rstest]
    #[case("Class:Svc", "Svc.run(Integer)", "Svc", "run(Integer)")]
    #[case("Class:Svc", "ns.Svc.run()", "ns.Svc", "run()")]
    #[case("Class:Svc", "run()", "Svc", "run()")]
    #[case("Trigger:T", "doIt", "", "doIt")]
    #[case("Class:Svc", "  Svc.go(a.b)  ", "Svc", "go(a.b)")]
    fn test_signature_from_label(
        #[case] actor: &str,
        #[case] label: &str,
        #[case] class_name: &str,
        #[case] method_part: &str,
    ) {
        let sig = signature_from_label(actor, label);
        assert_eq!(sig.class_name, class_name);
        assert_eq!(sig.method, method_part);
    }

    #[test]
    fn test_containment_builds_parent_links() {
        let frames = vec![
            method("Class:A", "A.outer()", 0, Some(10), 1),
            method("Class:B", "B.inner()", 2, Some(5), 2),
            method("Class:B", "B.inner()", 5, Some(8), 2),
            method("Class:C", "C.next()", 10, Some(12), 1),
        ];
        let model = build_call_tree(&frames);
        assert_eq!(model.roots, vec![0, 3]);
        assert_eq!(model.nodes[0].children, vec![1, 2]);
        assert_eq!(model.nodes[1].parents, vec![0]);
        assert_eq!(model.occurrences("B#inner()"), &[1, 2]);
        assert!(model.parents_by_signature["B#inner()"].contains("A#outer()"));
        assert_eq!(model.get("Class:B:5").map(|n| n.metrics.total_time_ms), Some(3));
    }

    #[test]
    fn test_units_are_skipped() {
        let mut unit = method("Other:execute_anonymous_apex", "execute_anonymous_apex", 0, Some(4), 0);
        unit.kind = FrameKind::Unit;
        let frames = vec![unit, method("Class:A", "A.run()", 1, Some(3), 1)];
        let model = build_call_tree(&frames);
        assert_eq!(model.nodes.len(), 1);
        assert_eq!(model.roots, vec![0]);
    }

    #[test]
    fn test_own_time_never_negative() {
        let mut outer = method("Class:A", "A.run()", 0, Some(10), 0);
        outer.profile = Some(FrameProfile { time_ms: Some(3), ..Default::default() });
        let mut inner = method("Class:B", "B.work()", 1, Some(5), 1);
        inner.profile = Some(FrameProfile { time_ms: Some(5), soql: 2, ..Default::default() });
        let model = build_call_tree(&[outer, inner]);
        assert_eq!(model.nodes[0].metrics.own_time_ms, 0);
        assert_eq!(model.nodes[1].metrics.own_time_ms, 5);
        assert_eq!(model.nodes[1].metrics.soql, 2);
        assert_eq!(model.totals.total_time_ms, 3);
    }

    #[test]
    fn test_nanosecond_span_is_rounded() {
        let mut frame = method("Class:A", "A.run()", 0, Some(1), 0);
        frame.start_ns = Some(1_000_000);
        frame.end_ns = Some(3_600_000);
        assert_eq!(build_call_tree(&[frame]).nodes[0].metrics.total_time_ms, 3);
    }

    #[test]
    fn test_open_frame_contains_everything_after_it() {
        let frames = vec![method("Class:A", "A.run()", 0, None, 0), method("Class:B", "B.go()", 7, Some(8), 1)];
        let model = build_call_tree(&frames);
        assert_eq!(model.roots, vec![0]);
        assert_eq!(model.nodes[0].children, vec![1]);
        assert_eq!(model.nodes[0].metrics.total_time_ms, 1);
    }

    #[test]
    fn test_empty_input() {
        let model = build_call_tree(&[]);
        assert!(model.is_empty());
        assert_eq!(model.totals.total_time_ms, 0);
    }
}
