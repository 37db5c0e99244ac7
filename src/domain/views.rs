//! View operators over a `CallTreeModel`: merge, backtrace and scope.
//!
//! Each operator reads its input and returns a fresh model. An unknown
//! signature or id yields a copy of the input.

use crate::domain::calltree::{CallTreeModel, CallTreeNode, NodeIdx};
use std::collections::{HashMap, HashSet, VecDeque};

fn link(nodes: &mut [CallTreeNode], parent: NodeIdx, child: NodeIdx) {
    if !nodes[parent].children.contains(&child) {
        nodes[parent].children.push(child);
        nodes[child].parents.push(parent);
    }
}

/// Aggregated nodes keyed by signature.
#[derive(Default)]
struct SignatureArena {
    nodes: Vec<CallTreeNode>,
    index: HashMap<String, NodeIdx>,
}

impl SignatureArena {
    fn get_or_insert(&mut self, prefix: &str, sample: &CallTreeNode) -> NodeIdx {
        let sig = sample.signature();
        if let Some(&idx) = self.index.get(&sig) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(CallTreeNode::detached(
            format!("{prefix}:{sig}"),
            &sample.call.class_name,
            &sample.call.method,
        ));
        self.index.insert(sig, idx);
        idx
    }
}

/// Fold every occurrence of `signature` and each of their subtrees into one
/// tree keyed by signature. Metrics are summed and `count` tracks how many
/// occurrences landed in each node. Recursive occurrences are folded once,
/// through the subtree of the outermost occurrence above them.
pub fn merge_occurrences(model: &CallTreeModel, signature: &str) -> CallTreeModel {
    let occurrences = model.occurrences(signature);
    let Some(&first) = occurrences.first() else {
        log::debug!("merge: no occurrence of {signature}");
        return model.clone();
    };

    let mut arena = SignatureArena::default();
    let root = arena.get_or_insert("merged", &model.nodes[first]);
    // Occurrences are in start order, so an outer occurrence folds the
    // recursive ones below it before they come up here.
    let mut folded: HashSet<NodeIdx> = HashSet::new();
    for &occ in occurrences {
        if !folded.insert(occ) {
            continue;
        }
        arena.nodes[root].metrics.accumulate(&model.nodes[occ].metrics);
        let mut stack = vec![(occ, root)];
        while let Some((src, merged)) = stack.pop() {
            for &child in &model.nodes[src].children {
                let target = arena.get_or_insert("merged", &model.nodes[child]);
                link(&mut arena.nodes, merged, target);
                if folded.insert(child) {
                    arena.nodes[target].metrics.accumulate(&model.nodes[child].metrics);
                    stack.push((child, target));
                }
            }
        }
    }

    CallTreeModel::from_nodes(arena.nodes, vec![root], model.parents_by_signature.clone())
}

/// Backtrace tree for `signature`: the root is the callee and each node's
/// children are the distinct signatures that call it, walked breadth-first.
/// Every node aggregates all occurrences of its signature.
pub fn invert_for_signature(model: &CallTreeModel, signature: &str) -> CallTreeModel {
    if model.occurrences(signature).is_empty() {
        log::debug!("backtrace: no occurrence of {signature}");
        return model.clone();
    }

    let mut arena = SignatureArena::default();
    let make = |arena: &mut SignatureArena, sig: &str| -> Option<NodeIdx> {
        let occurrences = model.occurrences(sig);
        let sample = &model.nodes[*occurrences.first()?];
        let fresh = !arena.index.contains_key(sig);
        let idx = arena.get_or_insert("back", sample);
        if fresh {
            for &occ in occurrences {
                arena.nodes[idx].metrics.accumulate(&model.nodes[occ].metrics);
            }
        }
        Some(idx)
    };

    let Some(root) = make(&mut arena, signature) else {
        return model.clone();
    };
    let mut seen: HashSet<String> = HashSet::from([signature.to_string()]);
    let mut queue = VecDeque::from([(signature.to_string(), root)]);
    while let Some((sig, idx)) = queue.pop_front() {
        let Some(callers) = model.parents_by_signature.get(&sig) else {
            continue;
        };
        for caller in callers {
            let Some(caller_idx) = make(&mut arena, caller) else {
                continue;
            };
            link(&mut arena.nodes, idx, caller_idx);
            if seen.insert(caller.clone()) {
                queue.push_back((caller.clone(), caller_idx));
            }
        }
    }

    CallTreeModel::from_nodes(arena.nodes, vec![root], model.parents_by_signature.clone())
}

/// Copy the subtree rooted at node `id`, keeping ids and metrics. Depths are
/// re-based so the new root sits at depth 0.
pub fn scope_to_occurrence(model: &CallTreeModel, id: &str) -> CallTreeModel {
    let Some(&origin) = model.all.get(id) else {
        log::debug!("scope: no node {id}");
        return model.clone();
    };
    let base_depth = model.nodes[origin].depth.unwrap_or(0);

    let mut nodes: Vec<CallTreeNode> = Vec::new();
    let mut stack: Vec<(NodeIdx, Option<NodeIdx>)> = vec![(origin, None)];
    while let Some((src, parent)) = stack.pop() {
        let idx = nodes.len();
        let mut node = model.nodes[src].clone();
        node.children.clear();
        node.parents = parent.into_iter().collect();
        node.depth = if src == origin { Some(0) } else { node.depth.map(|d| d.saturating_sub(base_depth)) };
        nodes.push(node);
        if let Some(p) = parent {
            nodes[p].children.push(idx);
        }
        // Reversed so children are visited, and appended, in source order.
        for &child in model.nodes[src].children.iter().rev() {
            stack.push((child, Some(idx)));
        }
    }

    CallTreeModel::from_nodes(nodes, vec![0], model.parents_by_signature.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calltree::build_call_tree;
    use crate::domain::graph::{FrameKind, FrameProfile, NestedFrame};

    fn timed(actor: &str, label: &str, start: usize, end: usize, depth: usize, ms: u64) -> NestedFrame {
        NestedFrame {
            actor: actor.to_string(),
            label: label.to_string(),
            start,
            end: Some(end),
            depth,
            kind: FrameKind::Method,
            profile: Some(FrameProfile { time_ms: Some(ms), soql: 1, ..Default::default() }),
            start_ns: None,
            end_ns: None,
        }
    }

    /// A.run calls B.work twice; C.go calls B.work once; B.work calls D.leaf.
    fn sample() -> CallTreeModel {
        build_call_tree(&[
            timed("Class:A", "A.run()", 0, 10, 0, 10),
            timed("Class:B", "B.work()", 1, 4, 1, 3),
            timed("Class:D", "D.leaf()", 2, 3, 2, 1),
            timed("Class:B", "B.work()", 4, 6, 1, 2),
            timed("Class:C", "C.go()", 10, 14, 0, 4),
            timed("Class:B", "B.work()", 11, 13, 1, 2),
        ])
    }

    #[test]
    fn test_merge_folds_recursive_occurrence_once() {
        let model = build_call_tree(&[
            timed("Class:R", "R.walk()", 0, 4, 0, 4),
            timed("Class:R", "R.walk()", 1, 3, 1, 2),
        ]);
        assert_eq!(model.occurrences("R#walk()").len(), 2);

        let merged = merge_occurrences(&model, "R#walk()");
        assert_eq!(merged.nodes.len(), 1);
        let root = &merged.nodes[0];
        assert_eq!(root.metrics.count, Some(2));
        assert_eq!(root.metrics.total_time_ms, 6);
        assert_eq!(root.metrics.soql, 2);
        assert_eq!(root.children, vec![0]);
    }

    #[test]
    fn test_merge_of_merged_recursive_model_terminates() {
        let model = build_call_tree(&[
            timed("Class:R", "R.walk()", 0, 4, 0, 4),
            timed("Class:R", "R.walk()", 1, 3, 1, 2),
        ]);
        let merged = merge_occurrences(&model, "R#walk()");
        let again = merge_occurrences(&merged, "R#walk()");
        assert_eq!(again.nodes.len(), 1);
        assert_eq!(again.nodes[0].metrics.count, Some(1));
        assert_eq!(again.nodes[0].metrics.total_time_ms, 6);
    }

    #[test]
    fn test_merge_sums_occurrences() {
        let model = sample();
        let merged = merge_occurrences(&model, "B#work()");
        assert_eq!(merged.roots, vec![0]);
        let root = &merged.nodes[0];
        assert_eq!(root.id, "merged:B#work()");
        assert_eq!(root.metrics.count, Some(3));
        assert_eq!(root.metrics.total_time_ms, 7);
        assert_eq!(root.metrics.soql, 3);
        assert_eq!(merged.totals.total_time_ms, 7);

        let leaf = merged.get("merged:D#leaf()").unwrap();
        assert_eq!(leaf.metrics.count, Some(1));
        assert_eq!(root.children.len(), 1);
        assert_eq!(model.nodes.len(), 6);
    }

    #[test]
    fn test_merge_single_occurrence_matches_source() {
        let model = sample();
        let merged = merge_occurrences(&model, "D#leaf()");
        let source = &model.nodes[model.occurrences("D#leaf()")[0]].metrics;
        let root = &merged.nodes[0].metrics;
        assert_eq!(root.total_time_ms, source.total_time_ms);
        assert_eq!(root.own_time_ms, source.own_time_ms);
        assert_eq!(root.soql, source.soql);
        assert_eq!(root.count, Some(1));
    }

    #[test]
    fn test_backtrace_children_are_callers() {
        let model = sample();
        let back = invert_for_signature(&model, "B#work()");
        let root = &back.nodes[back.roots[0]];
        assert_eq!(root.id, "back:B#work()");
        assert_eq!(root.metrics.count, Some(3));
        let callers: Vec<&str> = back.children(back.roots[0]).map(|n| n.id.as_str()).collect();
        assert_eq!(callers, vec!["back:A#run()", "back:C#go()"]);
        assert!(back.get("back:A#run()").unwrap().children.is_empty());
    }

    #[test]
    fn test_backtrace_without_callers_is_single_node() {
        let back = invert_for_signature(&sample(), "A#run()");
        assert_eq!(back.nodes.len(), 1);
        assert!(back.nodes[0].children.is_empty());
    }

    #[test]
    fn test_backtrace_survives_recursion() {
        let model = build_call_tree(&[
            timed("Class:R", "R.walk()", 0, 10, 0, 5),
            timed("Class:R", "R.walk()", 1, 5, 1, 2),
        ]);
        let back = invert_for_signature(&model, "R#walk()");
        assert_eq!(back.nodes.len(), 1);
        assert_eq!(back.nodes[0].children, vec![0]);
    }

    #[test]
    fn test_scope_copies_subtree() {
        let model = sample();
        let scoped = scope_to_occurrence(&model, "Class:B:1");
        assert_eq!(scoped.nodes.len(), 2);
        assert_eq!(scoped.roots, vec![0]);
        assert_eq!(scoped.nodes[0].depth, Some(0));
        assert_eq!(scoped.nodes[1].id, "Class:D:2");
        assert_eq!(scoped.nodes[1].depth, Some(1));
        assert_eq!(scoped.totals.total_time_ms, 3);
    }

    #[test]
    fn test_unknown_targets_return_input() {
        let model = sample();
        assert_eq!(merge_occurrences(&model, "Nope#x()"), model);
        assert_eq!(invert_for_signature(&model, "Nope#x()"), model);
        assert_eq!(scope_to_occurrence(&model, "Class:Z:0"), model);
    }
}
