//! Metrics Attribution
//!
//! Counts and times SOQL, DML and callouts, and turns cumulative CPU/heap
//! snapshots into per-frame deltas.

use crate::domain::frames::{duration_ms, Attribution, FrameTracker};
use crate::domain::graph::{FrameKind, FrameProfile};
use crate::domain::line::{cumulative_cpu_ms, cumulative_heap_bytes, OperationKind};

fn count_mut(profile: &mut FrameProfile, op: OperationKind) -> &mut u64 {
    match op {
        OperationKind::Soql => &mut profile.soql,
        OperationKind::Dml => &mut profile.dml,
        OperationKind::Callout => &mut profile.callout,
    }
}

fn time_mut(profile: &mut FrameProfile, op: OperationKind) -> &mut u64 {
    match op {
        OperationKind::Soql => &mut profile.soql_time_ms,
        OperationKind::Dml => &mut profile.dml_time_ms,
        OperationKind::Callout => &mut profile.callout_time_ms,
    }
}

/// Maximum values reported inside one cumulative-usage block.
#[derive(Debug, Default, Clone, Copy)]
struct Snapshot {
    cpu_ms: Option<u64>,
    heap_bytes: Option<u64>,
}

#[derive(Debug, Default)]
pub struct MetricsAttribution {
    /// Begin timestamps per operation kind.
    timers: [Vec<u64>; 3],
    last_cpu_ms: u64,
    last_heap_bytes: u64,
    block: Option<Snapshot>,
}

impl MetricsAttribution {
    pub fn new() -> Self {
        Self::default()
    }

    fn timer(&mut self, op: OperationKind) -> &mut Vec<u64> {
        let slot = match op {
            OperationKind::Soql => 0,
            OperationKind::Dml => 1,
            OperationKind::Callout => 2,
        };
        &mut self.timers[slot]
    }

    /// Add `amount` to the active method and unit frames under `policy`.
    fn attribute_both(
        tracker: &mut FrameTracker,
        policy: Attribution,
        amount: u64,
        field: impl Fn(&mut FrameProfile) -> &mut u64,
    ) {
        tracker.attribute(FrameKind::Method, policy, |p| *field(p) += amount);
        tracker.attribute(FrameKind::Unit, policy, |p| *field(p) += amount);
    }

    fn count(tracker: &mut FrameTracker, op: OperationKind) {
        Self::attribute_both(tracker, Attribution::OpenCurrent, 1, |p| count_mut(p, op));
    }

    /// A begin marker: count it and start its timer when a timestamp is known.
    pub fn operation_begin(&mut self, tracker: &mut FrameTracker, op: OperationKind, last_ns: Option<u64>) {
        Self::count(tracker, op);
        if let Some(ns) = last_ns {
            self.timer(op).push(ns);
        }
    }

    /// `QUERY_MORE` counts as a query without a timer.
    pub fn query_more(&mut self, tracker: &mut FrameTracker) {
        Self::count(tracker, OperationKind::Soql);
    }

    /// An end marker: pop the matching begin and attribute the elapsed time.
    pub fn operation_end(&mut self, tracker: &mut FrameTracker, op: OperationKind, last_ns: Option<u64>) {
        let started = self.timer(op).pop();
        let (Some(start), Some(end)) = (started, last_ns) else {
            return;
        };
        let ms = duration_ms(start, end);
        if ms > 0 {
            Self::attribute_both(tracker, Attribution::CurrentOrLastClosed, ms, |p| time_mut(p, op));
        }
    }

    pub fn cumulative_start(&mut self) {
        self.block = Some(Snapshot::default());
    }

    pub fn in_cumulative_block(&self) -> bool {
        self.block.is_some()
    }

    /// Record any CPU/heap figure reported on a line inside the block.
    pub fn observe_block_line(&mut self, line: &str) {
        let Some(snapshot) = self.block.as_mut() else {
            return;
        };
        if let Some(cpu) = cumulative_cpu_ms(line) {
            snapshot.cpu_ms = Some(cpu);
        }
        if let Some(heap) = cumulative_heap_bytes(line) {
            snapshot.heap_bytes = Some(heap);
        }
    }

    /// Close the block and add the growth since the previous snapshot.
    pub fn cumulative_end(&mut self, tracker: &mut FrameTracker) {
        let Some(snapshot) = self.block.take() else {
            return;
        };
        let cpu = snapshot.cpu_ms.unwrap_or(self.last_cpu_ms);
        let heap = snapshot.heap_bytes.unwrap_or(self.last_heap_bytes);
        let d_cpu = cpu.saturating_sub(self.last_cpu_ms);
        let d_heap = heap.saturating_sub(self.last_heap_bytes);
        self.last_cpu_ms = cpu;
        self.last_heap_bytes = heap;

        if d_cpu > 0 {
            Self::attribute_both(tracker, Attribution::CurrentOrLastClosed, d_cpu, |p| &mut p.cpu_ms);
        }
        if d_heap > 0 {
            Self::attribute_both(tracker, Attribution::CurrentOrLastClosed, d_heap, |p| &mut p.heap_bytes);
        }
    }

    /// Begins still waiting for their end marker, per kind.
    pub fn open_operations(&self) -> Vec<(OperationKind, usize)> {
        OperationKind::ALL
            .iter()
            .zip(self.timers.iter())
            .map(|(op, stack)| (*op, stack.len()))
            .collect()
    }
}
