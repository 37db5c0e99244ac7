//! Diagram filter over nested frames: hide noise, fold consecutive repeats.

use crate::domain::graph::NestedFrame;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static SYSTEM_ACTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Class:System\b").expect("valid system actor regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub hide_system: bool,
    pub collapse_repeats: bool,
    /// Actor ids (`Class:Logger`) to leave out entirely.
    pub hidden_actors: BTreeSet<String>,
}

/// A frame as drawn, with the number of repeats folded into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramFrame {
    #[serde(flatten)]
    pub frame: NestedFrame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

fn is_system_frame(frame: &NestedFrame) -> bool {
    SYSTEM_ACTOR.is_match(&frame.actor) || frame.label.starts_with("System.")
}

fn folds_into(prev: &NestedFrame, next: &NestedFrame) -> bool {
    prev.actor == next.actor
        && prev.depth == next.depth
        && prev.label == next.label
        && prev.end.unwrap_or(prev.start) <= next.start
}

/// Filter and optionally collapse `frames`. The input is left untouched.
pub fn filter_and_collapse(frames: &[NestedFrame], options: &FilterOptions) -> Vec<DiagramFrame> {
    let mut kept: Vec<&NestedFrame> = frames
        .iter()
        .filter(|f| !(options.hide_system && is_system_frame(f)))
        .filter(|f| !options.hidden_actors.contains(&f.actor))
        .collect();
    kept.sort_by_key(|f| (f.start, f.depth));

    if !options.collapse_repeats {
        return kept
            .into_iter()
            .map(|f| DiagramFrame { frame: f.clone(), count: None })
            .collect();
    }

    let mut out: Vec<DiagramFrame> = Vec::with_capacity(kept.len());
    for frame in kept {
        match out.last_mut() {
            Some(prev) if folds_into(&prev.frame, frame) => {
                prev.frame.end = Some(frame.end.unwrap_or(frame.start + 1));
                prev.count = Some(prev.count.unwrap_or(1) + 1);
                if let Some(profile) = &frame.profile {
                    prev.frame.profile_mut().absorb(profile);
                }
            }
            _ => out.push(DiagramFrame { frame: frame.clone(), count: None }),
        }
    }
    log::trace!("diagram filter kept {} of {} frame(s)", out.len(), frames.len());
    out
}
