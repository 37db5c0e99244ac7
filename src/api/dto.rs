use crate::application::AnalysisReport;
use crate::domain::calltree::{CallRef, CallTreeModel, Totals, TreeMetrics};
use crate::domain::frame_filter::DiagramFrame;
use crate::domain::graph::LogGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A call tree node with its links spelled out as node ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTreeNodeDto {
    pub id: String,
    #[serde(rename = "ref")]
    pub call: CallRef,
    pub children: Vec<String>,
    pub parents: Vec<String>,
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTreeDto {
    pub roots: Vec<String>,
    pub nodes: BTreeMap<String, CallTreeNodeDto>,
    pub by_signature: BTreeMap<String, Vec<String>>,
    pub parents_by_signature: BTreeMap<String, Vec<String>>,
    pub totals: Totals,
}

impl From<&CallTreeModel> for CallTreeDto {
    fn from(model: &CallTreeModel) -> Self {
        let id_of = |idx: &usize| model.nodes[*idx].id.clone();
        let nodes = model
            .nodes
            .iter()
            .map(|n| {
                let dto = CallTreeNodeDto {
                    id: n.id.clone(),
                    call: n.call.clone(),
                    children: n.children.iter().map(id_of).collect(),
                    parents: n.parents.iter().map(id_of).collect(),
                    metrics: n.metrics.clone(),
                    start: n.start,
                    end: n.end,
                    depth: n.depth,
                    actor: n.actor.clone(),
                };
                (n.id.clone(), dto)
            })
            .collect();
        let by_signature = model
            .by_signature
            .iter()
            .map(|(sig, occ)| (sig.clone(), occ.iter().map(id_of).collect()))
            .collect();
        let parents_by_signature = model
            .parents_by_signature
            .iter()
            .map(|(sig, callers)| (sig.clone(), callers.iter().cloned().collect()))
            .collect();

        CallTreeDto {
            roots: model.roots.iter().map(id_of).collect(),
            nodes,
            by_signature,
            parents_by_signature,
            totals: model.totals.clone(),
        }
    }
}

/// JSON shape of a full report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDto<'a> {
    pub source: &'a str,
    pub view: String,
    pub graph: &'a LogGraph,
    pub frames: &'a [DiagramFrame],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_tree: Option<CallTreeDto>,
}

impl<'a> From<&'a AnalysisReport> for ReportDto<'a> {
    fn from(report: &'a AnalysisReport) -> Self {
        ReportDto {
            source: &report.source,
            view: report.view.to_string(),
            graph: &report.graph,
            frames: &report.frames,
            call_tree: report.tree.as_ref().map(CallTreeDto::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calltree::build_call_tree;
    use crate::domain::graph::{FrameKind, NestedFrame};

    fn frame(actor: &str, label: &str, start: usize, end: usize, depth: usize) -> NestedFrame {
        NestedFrame {
            actor: actor.into(),
            label: label.into(),
            start,
            end: Some(end),
            depth,
            kind: FrameKind::Method,
            profile: None,
            start_ns: None,
            end_ns: None,
        }
    }

    #[test]
    fn test_links_become_ids() {
        let model = build_call_tree(&[frame("Class:A", "A.run()", 0, 5, 0), frame("Class:B", "B.go()", 1, 2, 1)]);
        let dto = CallTreeDto::from(&model);
        assert_eq!(dto.roots, vec!["Class:A:0"]);
        assert_eq!(dto.nodes["Class:A:0"].children, vec!["Class:B:1"]);
        assert_eq!(dto.nodes["Class:B:1"].parents, vec!["Class:A:0"]);
        assert_eq!(dto.parents_by_signature["B#go()"], vec!["A#run()"]);

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["nodes"]["Class:B:1"]["ref"]["className"], "B");
        assert_eq!(json["totals"]["totalTimeMs"], 5);
    }
}
