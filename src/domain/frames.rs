//! Frame Stack Tracker
//!
//! Four cooperating stacks drive the graph: execution units, method classes,
//! one global nested-frame stack shared by both kinds, and a lane stack per
//! actor for swim-lane spans. Frames and spans live in arenas (`nested`,
//! `flow`); the stacks hold indices into them.
//!
//! A frame starts at the index of its own sequence event and ends at the
//! sequence length when it closes, so a frame's interval covers exactly the
//! events recorded while it was open.

use crate::domain::graph::{
    node_id, FlowSpan, FrameKind, FrameProfile, GraphAssembler, GraphEdge, GraphNode, NestedFrame, NodeKind,
    SequenceEvent,
};
use crate::domain::levels::LogLevels;
use crate::domain::line::{last_segment, Timestamp};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static TRIGGER_DESCRIPTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btrigger event\b").expect("valid trigger regex"));
static SYSTEMISH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSystem\b").expect("valid system regex"));

const TRIGGER_PATH_MARKER: &str = "__sfdc_trigger/";

/// An execution unit on the unit stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub kind: NodeKind,
    pub name: String,
    pub id: String,
}

/// Round `end - start` nanoseconds to whole milliseconds, clamped at zero.
pub fn duration_ms(start_ns: u64, end_ns: u64) -> u64 {
    let delta = end_ns.saturating_sub(start_ns);
    delta / 1_000_000 + u64::from(delta % 1_000_000 >= 500_000)
}

fn payload_parts(payload: &str) -> Vec<&str> {
    payload.split('|').map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// The human label of a unit payload. Trigger paths defer to the label before them.
fn unit_label(payload: &str) -> &str {
    let parts = payload_parts(payload);
    let last = parts.last().copied().unwrap_or("");
    if last.contains(TRIGGER_PATH_MARKER) && parts.len() >= 2 {
        return parts[parts.len() - 2];
    }
    last
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// `MyClass.method` -> `MyClass`; `MyClass` -> `MyClass`.
fn class_unit_name(rest: &str) -> &str {
    let dot = rest.char_indices().skip(1).find(|&(_, c)| c == '.').map(|(i, _)| i);
    match dot {
        Some(i) => &rest[..i],
        None => rest,
    }
}

fn trigger_name(label: &str) -> &str {
    label.split(" on ").next().unwrap_or(label).trim()
}

/// Typed unit descriptor for a `CODE_UNIT_STARTED` payload.
pub fn describe_unit(payload: &str) -> (NodeKind, String) {
    let label = unit_label(payload);
    if let Some(rest) = strip_prefix_ignore_case(label, "Flow:") {
        let name = rest.trim();
        return (NodeKind::Flow, if name.is_empty() { "Flow".to_string() } else { name.to_string() });
    }
    if let Some(rest) = label.strip_prefix("Class.") {
        return (NodeKind::Class, class_unit_name(rest).to_string());
    }
    if TRIGGER_DESCRIPTOR.is_match(label) {
        return (NodeKind::Trigger, trigger_name(label).to_string());
    }
    let name = if label.is_empty() { "CodeUnit" } else { label };
    (NodeKind::Other, name.to_string())
}

/// The unit name a `CODE_UNIT_FINISHED` payload refers to.
pub fn finished_unit_name(payload: &str) -> String {
    let label = unit_label(payload);
    if let Some(rest) = strip_prefix_ignore_case(label, "Flow:") {
        return rest.trim().to_string();
    }
    if let Some(rest) = label.strip_prefix("Class.") {
        return class_unit_name(rest).to_string();
    }
    if TRIGGER_DESCRIPTOR.is_match(label) {
        return trigger_name(label).to_string();
    }
    label.to_string()
}

/// Owner class of a method signature such as `ns__Svc.run(Map<Id,SObject>)`.
/// Built-in `System` classes resolve to `None`.
pub fn class_from_signature(sig: &str) -> Option<String> {
    let no_args = sig.split('(').next().unwrap_or(sig).trim();
    let (cls, method) = no_args.rsplit_once('.')?;
    if cls.is_empty() || method.is_empty() {
        return None;
    }
    if cls == "System" || cls.starts_with("System.") {
        return None;
    }
    Some(cls.to_string())
}

/// How a `METHOD_EXIT` payload maps onto the method stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitTarget {
    /// A full `Class.method(...)` signature.
    MatchedSignature(String),
    /// Only a class name was logged.
    BareIdentifier(String),
    /// No class could be derived.
    Unrecoverable { systemish: bool },
}

impl ExitTarget {
    pub fn resolve(payload: &str) -> ExitTarget {
        if let Some(cls) = class_from_signature(payload) {
            return ExitTarget::MatchedSignature(cls);
        }
        let simple = payload.trim();
        if !simple.is_empty() && !simple.contains(['(', ')']) {
            return ExitTarget::BareIdentifier(simple.to_string());
        }
        let systemish = SYSTEMISH.is_match(simple) || simple.contains(['(', ')', '<', '>']);
        ExitTarget::Unrecoverable { systemish }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            ExitTarget::MatchedSignature(cls) | ExitTarget::BareIdentifier(cls) => Some(cls),
            ExitTarget::Unrecoverable { .. } => None,
        }
    }
}

/// What a method exit did to the stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Popped this many frames down to and including the named class.
    Unwound(usize),
    /// Closed the top frame because no class could be derived.
    FallbackClosed,
    Ignored,
}

/// Which frame receives an attributed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// The innermost open frame of the current actor only.
    OpenCurrent,
    /// The current actor, else the last closed one; open frames first, then
    /// the most recent frame of that actor.
    CurrentOrLastClosed,
}

/// Final state handed back to the parser.
#[derive(Debug)]
pub struct TrackerOutput {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub sequence: Vec<SequenceEvent>,
    pub flow: Vec<FlowSpan>,
    pub nested: Vec<NestedFrame>,
    pub open_units: usize,
    pub open_methods: usize,
}

#[derive(Debug, Default)]
pub struct FrameTracker {
    graph: GraphAssembler,
    levels: Option<LogLevels>,
    units: Vec<Unit>,
    /// Class names only.
    methods: Vec<String>,
    nested: Vec<NestedFrame>,
    nested_stack: Vec<usize>,
    flow: Vec<FlowSpan>,
    lanes: HashMap<String, Vec<usize>>,
    last_closed_method: Option<String>,
    last_closed_unit: Option<String>,
}

impl FrameTracker {
    pub fn new(levels: Option<LogLevels>) -> Self {
        Self { levels, ..Default::default() }
    }

    /// Top method class if any, else the current unit.
    pub fn current_owner(&self) -> Option<String> {
        if let Some(cls) = self.methods.last() {
            return Some(node_id(NodeKind::Class, cls));
        }
        self.units.last().map(|u| u.id.clone())
    }

    pub fn current_actor(&self, kind: FrameKind) -> Option<String> {
        match kind {
            FrameKind::Method => self.methods.last().map(|cls| node_id(NodeKind::Class, cls)),
            FrameKind::Unit => self.units.last().map(|u| u.id.clone()),
        }
    }

    fn last_closed_actor(&self, kind: FrameKind) -> Option<String> {
        match kind {
            FrameKind::Method => self.last_closed_method.clone(),
            FrameKind::Unit => self.last_closed_unit.clone(),
        }
    }

    fn find_open_frame(&self, actor: &str, kind: FrameKind) -> Option<usize> {
        self.nested_stack
            .iter()
            .rev()
            .copied()
            .find(|&i| self.nested[i].actor == actor && self.nested[i].kind == kind)
    }

    fn find_any_frame(&self, actor: &str, kind: FrameKind) -> Option<usize> {
        self.find_open_frame(actor, kind).or_else(|| {
            self.nested
                .iter()
                .rposition(|f| f.actor == actor && f.kind == kind)
        })
    }

    /// Apply `update` to the profile of the frame selected by `policy`.
    /// Returns false when no frame qualifies.
    pub fn attribute(&mut self, kind: FrameKind, policy: Attribution, update: impl FnOnce(&mut FrameProfile)) -> bool {
        let target = match policy {
            Attribution::OpenCurrent => self
                .current_actor(kind)
                .and_then(|actor| self.find_open_frame(&actor, kind)),
            Attribution::CurrentOrLastClosed => self
                .current_actor(kind)
                .or_else(|| self.last_closed_actor(kind))
                .and_then(|actor| self.find_any_frame(&actor, kind)),
        };
        match target {
            Some(idx) => {
                update(self.nested[idx].profile_mut());
                true
            }
            None => false,
        }
    }

    fn push_span(&mut self, actor: &str, label: &str, kind: FrameKind, start: usize, start_ns: Option<u64>) {
        let lane = self.lanes.entry(actor.to_string()).or_default();
        let idx = self.flow.len();
        self.flow.push(FlowSpan {
            actor: actor.to_string(),
            label: label.to_string(),
            start,
            end: None,
            depth: lane.len(),
            kind,
            start_ns,
            end_ns: None,
        });
        lane.push(idx);
    }

    fn end_span(&mut self, actor: &str, end_ns: Option<u64>) {
        let seq_len = self.graph.sequence_len();
        let Some(idx) = self.lanes.get_mut(actor).and_then(Vec::pop) else {
            return;
        };
        let span = &mut self.flow[idx];
        if span.end.is_none() {
            span.end = Some(seq_len.max(span.start + 1));
        }
        if end_ns.is_some() {
            span.end_ns = end_ns;
        }
    }

    fn push_nested(&mut self, actor: &str, label: &str, kind: FrameKind, start: usize, start_ns: Option<u64>) {
        let idx = self.nested.len();
        self.nested.push(NestedFrame {
            actor: actor.to_string(),
            label: label.to_string(),
            start,
            end: None,
            depth: self.nested_stack.len(),
            kind,
            profile: None,
            start_ns,
            end_ns: None,
        });
        self.nested_stack.push(idx);
    }

    fn close_frame(frame: &mut NestedFrame, seq_len: usize, end_ns: Option<u64>) {
        if frame.end.is_none() {
            frame.end = Some(seq_len.max(frame.start + 1));
        }
        if frame.end_ns.is_none() {
            frame.end_ns = end_ns;
        }
        if let (Some(start), Some(end)) = (frame.start_ns, frame.end_ns) {
            let profile = frame.profile_mut();
            profile.time_ms = Some(profile.time_ms.unwrap_or(0) + duration_ms(start, end));
        }
        debug_assert!(frame.end.is_some_and(|end| end > frame.start));
    }

    fn pop_nested_by_actor(&mut self, actor: &str, kind: FrameKind, end_ns: Option<u64>) {
        let Some(pos) = self
            .nested_stack
            .iter()
            .rposition(|&i| self.nested[i].actor == actor && self.nested[i].kind == kind)
        else {
            return;
        };
        let idx = self.nested_stack.remove(pos);
        let seq_len = self.graph.sequence_len();
        Self::close_frame(&mut self.nested[idx], seq_len, end_ns);
        match kind {
            FrameKind::Method => self.last_closed_method = Some(actor.to_string()),
            FrameKind::Unit => self.last_closed_unit = Some(actor.to_string()),
        }
    }

    fn record_event(&mut self, from: Option<String>, to: &str, label: &str, stamp: Option<&Timestamp>) {
        self.graph.add_sequence_event(SequenceEvent {
            from,
            to: to.to_string(),
            label: label.to_string(),
            time: stamp.map(|s| s.time.clone()),
            nanos: stamp.map(|s| s.nanos),
        });
    }

    /// `CODE_UNIT_STARTED`.
    pub fn unit_started(&mut self, payload: &str, stamp: Option<&Timestamp>, last_ns: Option<u64>) {
        let (kind, name) = describe_unit(payload);
        let id = self.graph.upsert_node(kind, &name, self.levels.as_ref()).id.clone();
        let owner = self.current_owner();
        let start = self.graph.sequence_len();
        self.record_event(owner, &id, "CODE_UNIT_STARTED", stamp);
        self.push_span(&id, &name, FrameKind::Unit, start, last_ns);
        self.push_nested(&id, &name, FrameKind::Unit, start, last_ns);
        self.units.push(Unit { kind, name, id });
    }

    /// `CODE_UNIT_FINISHED`. Pops units until one matches the finishing label,
    /// then forgets every open method class.
    pub fn unit_finished(&mut self, payload: &str, last_ns: Option<u64>) {
        let label = finished_unit_name(payload);
        let suffix = format!(":{label}");
        let mut matched = false;
        while let Some(top) = self.units.pop() {
            if top.name == label || top.id.ends_with(&suffix) {
                self.last_closed_unit = Some(top.id.clone());
                self.end_span(&top.id, last_ns);
                self.pop_nested_by_actor(&top.id, FrameKind::Unit, last_ns);
                matched = true;
                break;
            }
            log::trace!("unit {} discarded while finishing {}", top.id, label);
        }
        if !matched {
            log::trace!("CODE_UNIT_FINISHED for {} matched no open unit", label);
        }
        if let Some(last) = self.methods.last() {
            self.last_closed_method = Some(node_id(NodeKind::Class, last));
        }
        self.methods.clear();
    }

    /// `METHOD_ENTRY`. Returns false for built-in `System` methods.
    pub fn method_entry(&mut self, payload: &str, stamp: Option<&Timestamp>, last_ns: Option<u64>) -> bool {
        let sig = last_segment(payload);
        let Some(cls) = class_from_signature(sig) else {
            return false;
        };
        let target = self.graph.upsert_node(NodeKind::Class, &cls, self.levels.as_ref()).id.clone();
        let owner = self.current_owner();
        if let Some(owner) = &owner {
            self.graph.inc_edge(owner, &target);
        }
        let start = self.graph.sequence_len();
        self.record_event(owner, &target, sig, stamp);
        self.push_span(&target, sig, FrameKind::Method, start, last_ns);
        self.push_nested(&target, sig, FrameKind::Method, start, last_ns);
        self.methods.push(cls);
        true
    }

    fn close_method(&mut self, cls: &str, last_ns: Option<u64>) {
        let actor = node_id(NodeKind::Class, cls);
        self.end_span(&actor, last_ns);
        self.pop_nested_by_actor(&actor, FrameKind::Method, last_ns);
    }

    /// `METHOD_EXIT`.
    pub fn method_exit(&mut self, payload: &str, last_ns: Option<u64>) -> ExitOutcome {
        if self.methods.is_empty() {
            return ExitOutcome::Ignored;
        }
        let target = ExitTarget::resolve(last_segment(payload));
        match target.class_name() {
            Some(cls) if self.methods.iter().any(|m| m == cls) => {
                let mut popped = 0;
                while let Some(top) = self.methods.pop() {
                    self.close_method(&top, last_ns);
                    popped += 1;
                    if top == cls {
                        break;
                    }
                }
                self.last_closed_method = Some(node_id(NodeKind::Class, cls));
                ExitOutcome::Unwound(popped)
            }
            Some(_) => ExitOutcome::Ignored,
            None => match target {
                ExitTarget::Unrecoverable { systemish: false } => {
                    if let Some(top) = self.methods.pop() {
                        self.close_method(&top, last_ns);
                    }
                    log::trace!("closed top method frame by fallback");
                    ExitOutcome::FallbackClosed
                }
                _ => ExitOutcome::Ignored,
            },
        }
    }

    /// Close everything still open at the final sequence index and, when
    /// known, at the last observed nanosecond value.
    pub fn finish(mut self, last_ns: Option<u64>) -> TrackerOutput {
        let seq_len = self.graph.sequence_len();
        for lane in self.lanes.values_mut() {
            while let Some(idx) = lane.pop() {
                let span = &mut self.flow[idx];
                if span.end.is_none() {
                    span.end = Some(seq_len.max(span.start + 1));
                }
                if span.end_ns.is_none() {
                    span.end_ns = last_ns;
                }
            }
        }
        while let Some(idx) = self.nested_stack.pop() {
            Self::close_frame(&mut self.nested[idx], seq_len, last_ns);
        }

        let open_units = self.units.len();
        let open_methods = self.methods.len();
        let (nodes, edges, sequence) = self.graph.into_parts();
        TrackerOutput { nodes, edges, sequence, flow: self.flow, nested: self.nested, open_units, open_methods }
    }
}
