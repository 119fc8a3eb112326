//! Deopt manager (C6, §4.2.3): registry of optimized code, the
//! FRESH -> REGISTERED -> INVALIDATED -> RETIRED state machine, eager and
//! lazy deoptimization, and hot-deopt-site statistics.
//!
//! EAGER deopts go straight REGISTERED -> RETIRED: the frame is
//! reconstructed synchronously and the optimized code is immediately dead.
//! LAZY deopts go REGISTERED -> INVALIDATED the moment they are queued
//! (optimized code may keep running until the next safe point), then
//! INVALIDATED -> RETIRED once `process_pending` successfully drains them.
//!
//! The counting/top-k shape is modeled on the teacher's `profiler.rs`
//! (`HotLoopDetector`/`CallTracker`: a `Mutex`-guarded frequency table plus
//! a print-top-N report), generalized from per-opcode counts to per
//! `(function, point, reason)` deopt-site counts.

use super::frame::{self, InterpreterFrame};
use super::metadata::{BailoutReason, DeoptMode, FunctionId, FunctionProto, JitState, OptimizedCode, SafePoint};
use crate::error::{CoreResult, FatalError, RangeError};
use crate::heap::ObjectArena;
use crate::shape::ShapeTree;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionState {
    Fresh,
    Registered,
    Invalidated,
    Retired,
}

struct Entry {
    proto: FunctionProto,
    code: OptimizedCode,
    state: FunctionState,
}

/// A lazy deopt request queued at the point it was triggered, carrying the
/// optimized-frame snapshot so reconstruction can happen later without
/// needing the caller to keep the frame alive itself.
struct PendingDeopt {
    function: FunctionId,
    point: u32,
    reason: BailoutReason,
    jit: JitState,
}

pub struct DeoptOutcome {
    pub function: FunctionId,
    pub reason: BailoutReason,
    pub frames: Vec<InterpreterFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DeoptSite {
    function: FunctionId,
    point: u32,
    reason: BailoutReason,
}

/// Aggregate deopt counters (§4.2.3, §6): every deopt, eager or lazy, is
/// counted here regardless of whether it ever shows up in `hot_deopts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeoptStats {
    pub total: u64,
    pub by_site: Vec<(FunctionId, u32, BailoutReason, u64)>,
}

pub struct DeoptManager {
    functions: Mutex<HashMap<FunctionId, Entry>>,
    lazy_queue: Mutex<VecDeque<PendingDeopt>>,
    hot_counts: Mutex<HashMap<DeoptSite, u64>>,
    /// Sites hit fewer than this many times are tracked in `stats()` but
    /// excluded from `hot_deopts()`'s report (§10.3's `hot_deopt_threshold`).
    hot_threshold: u64,
}

impl DeoptManager {
    pub fn new() -> Self {
        Self::with_hot_threshold(1)
    }

    /// Builds a manager that only surfaces sites hit at least `hot_threshold`
    /// times through `hot_deopts()`, per the configurable reporting
    /// threshold (§10.3).
    pub fn with_hot_threshold(hot_threshold: u64) -> Self {
        DeoptManager {
            functions: Mutex::new(HashMap::new()),
            lazy_queue: Mutex::new(VecDeque::new()),
            hot_counts: Mutex::new(HashMap::new()),
            hot_threshold,
        }
    }

    /// Starts tracking a function before any optimized code exists for it.
    pub fn track(&self, proto: FunctionProto) {
        let mut functions = self.functions.lock();
        functions.entry(proto.id).or_insert_with(|| {
            let id = proto.id;
            Entry { proto, code: OptimizedCode::new(id), state: FunctionState::Fresh }
        });
    }

    /// Registers optimized code for a function, advancing it to REGISTERED.
    /// A function not yet `track`ed is tracked implicitly with a synthesized
    /// proto (the caller is expected to have called `track` first in the
    /// normal flow; this just keeps `register` total).
    pub fn register(&self, proto: FunctionProto, code: OptimizedCode) {
        let mut functions = self.functions.lock();
        functions.insert(proto.id, Entry { proto, code, state: FunctionState::Registered });
    }

    pub fn state(&self, function: FunctionId) -> Option<FunctionState> {
        self.functions.lock().get(&function).map(|e| e.state)
    }

    fn record_hit(&self, site: DeoptSite) {
        *self.hot_counts.lock().entry(site).or_insert(0) += 1;
    }

    /// Triggers a deoptimization at `point` for `function` for `reason`.
    /// EAGER reconstructs the frame chain immediately, returns it, and
    /// retires the function on the spot. LAZY invalidates the function
    /// immediately, enqueues the request, and returns `None`, deferring
    /// reconstruction (and retirement) to `process_pending` (§4.2.3).
    pub fn deoptimize(
        &self,
        function: FunctionId,
        point: u32,
        reason: BailoutReason,
        mode: DeoptMode,
        jit: JitState,
        shapes: &ShapeTree,
        objects: &ObjectArena,
    ) -> CoreResult<Option<DeoptOutcome>> {
        {
            let mut functions = self.functions.lock();
            let entry = functions
                .get_mut(&function)
                .ok_or(FatalError::UnregisteredFunction(function))?;
            if entry.state == FunctionState::Retired {
                return Err(FatalError::ReconstructAfterRetirement { function }.into());
            }
            if !entry.code.bailout_points.contains_key(&point) {
                return Err(FatalError::UnknownBailoutPoint(function, point).into());
            }
        }

        self.record_hit(DeoptSite { function, point, reason });
        tracing::debug!(?function, point, ?reason, ?mode, "deoptimizing");

        match mode {
            DeoptMode::Eager => {
                let outcome = self.reconstruct_one(function, point, reason, &jit, shapes, objects)?;
                self.set_state(function, FunctionState::Retired);
                Ok(Some(outcome))
            }
            DeoptMode::Lazy => {
                self.set_state(function, FunctionState::Invalidated);
                self.lazy_queue.lock().push_back(PendingDeopt { function, point, reason, jit });
                Ok(None)
            }
        }
    }

    fn reconstruct_one(
        &self,
        function: FunctionId,
        point: u32,
        reason: BailoutReason,
        jit: &JitState,
        shapes: &ShapeTree,
        objects: &ObjectArena,
    ) -> CoreResult<DeoptOutcome> {
        let functions = self.functions.lock();
        let entry = functions.get(&function).ok_or(FatalError::UnregisteredFunction(function))?;
        let metadata = entry
            .code
            .bailout_points
            .get(&point)
            .ok_or(FatalError::UnknownBailoutPoint(function, point))?;
        let frames = frame::reconstruct(function, &entry.proto, metadata, jit, shapes, objects)?;
        Ok(DeoptOutcome { function, reason, frames })
    }

    fn set_state(&self, function: FunctionId, state: FunctionState) {
        if let Some(entry) = self.functions.lock().get_mut(&function) {
            entry.state = state;
        }
    }

    /// Drains the lazy deopt queue in FIFO insertion order, reconstructing
    /// each pending bailout and retiring its function on success. Idempotent
    /// on an empty queue. A failure on one entry does not stop the rest from
    /// draining. `safe_point` identifies where the embedding interpreter is
    /// calling from (§4.2.3, §9) — it is not consulted by this crate beyond
    /// logging, since recognizing safe points is an interpreter concern.
    pub fn process_pending(
        &self,
        safe_point: SafePoint,
        shapes: &ShapeTree,
        objects: &ObjectArena,
    ) -> Vec<CoreResult<DeoptOutcome>> {
        let pending: Vec<PendingDeopt> = {
            let mut queue = self.lazy_queue.lock();
            queue.drain(..).collect()
        };
        tracing::debug!(?safe_point, count = pending.len(), "draining lazy deopt queue");
        let mut results = Vec::with_capacity(pending.len());
        for p in pending {
            let outcome = self.reconstruct_one(p.function, p.point, p.reason, &p.jit, shapes, objects);
            if outcome.is_ok() {
                self.set_state(p.function, FunctionState::Retired);
            }
            results.push(outcome);
        }
        results
    }

    pub fn pending_count(&self) -> usize {
        self.lazy_queue.lock().len()
    }

    fn ranked_sites(&self) -> Vec<(FunctionId, u32, BailoutReason, u64)> {
        let counts = self.hot_counts.lock();
        let mut entries: Vec<_> = counts.iter().map(|(site, &count)| (site.function, site.point, site.reason, count)).collect();
        entries.sort_by(|a, b| b.3.cmp(&a.3));
        entries
    }

    /// Total and per-site deopt counts observed so far (§4.2.3, §6, §7):
    /// every deopt is counted here, whether or not it clears the
    /// `hot_deopts` reporting threshold.
    pub fn stats(&self) -> DeoptStats {
        let by_site = self.ranked_sites();
        let total = by_site.iter().map(|(_, _, _, count)| count).sum();
        DeoptStats { total, by_site }
    }

    /// Returns the `k` most frequently hit deopt sites at or above the
    /// configured hot-deopt threshold, most frequent first.
    pub fn hot_deopts(&self, k: usize) -> CoreResult<Vec<(FunctionId, u32, BailoutReason, u64)>> {
        if k < 1 {
            return Err(RangeError::InvalidTopK(k).into());
        }
        let mut entries = self.ranked_sites();
        entries.retain(|(_, _, _, count)| *count >= self.hot_threshold);
        entries.truncate(k);
        Ok(entries)
    }
}

impl Default for DeoptManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deopt::metadata::{DeoptMetadata, FrameShape, ValueLocation};

    fn proto(id: u32, locals: usize) -> FunctionProto {
        FunctionProto { id: FunctionId(id), name: format!("f{id}"), locals_count: locals }
    }

    fn code_with_point(id: u32, point: u32) -> OptimizedCode {
        OptimizedCode::new(FunctionId(id)).with_bailout_point(
            point,
            DeoptMetadata {
                bytecode_offset: point,
                frame_shape: FrameShape { locals: vec![ValueLocation::Constant(crate::value::Value::from_i32(1))], operand_stack: vec![] },
                inlined_frames: vec![],
                escaped_objects: vec![],
            },
        )
    }

    #[test]
    fn eager_deopt_reconstructs_immediately_and_retires() {
        let mgr = DeoptManager::new();
        mgr.register(proto(1, 1), code_with_point(1, 10));
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
        let outcome = mgr
            .deoptimize(FunctionId(1), 10, BailoutReason::GuardFailure, DeoptMode::Eager, jit, &shapes, &objects)
            .unwrap();
        assert!(outcome.is_some());
        assert_eq!(mgr.state(FunctionId(1)), Some(FunctionState::Retired));
    }

    #[test]
    fn lazy_deopt_invalidates_immediately_and_retires_after_process_pending() {
        let mgr = DeoptManager::new();
        mgr.register(proto(2, 1), code_with_point(2, 5));
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
        let immediate = mgr
            .deoptimize(FunctionId(2), 5, BailoutReason::Overflow, DeoptMode::Lazy, jit, &shapes, &objects)
            .unwrap();
        assert!(immediate.is_none());
        assert_eq!(mgr.pending_count(), 1);
        assert_eq!(mgr.state(FunctionId(2)), Some(FunctionState::Invalidated));

        let results = mgr.process_pending(SafePoint::FunctionExit, &shapes, &objects);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(mgr.pending_count(), 0);
        assert_eq!(mgr.state(FunctionId(2)), Some(FunctionState::Retired));
    }

    #[test]
    fn draining_an_empty_queue_is_a_noop() {
        let mgr = DeoptManager::new();
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        assert!(mgr.process_pending(SafePoint::LoopBackEdge, &shapes, &objects).is_empty());
    }

    #[test]
    fn deopt_on_unregistered_function_is_fatal() {
        let mgr = DeoptManager::new();
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
        let err = mgr
            .deoptimize(FunctionId(9), 0, BailoutReason::TypeMismatch, DeoptMode::Eager, jit, &shapes, &objects)
            .unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Fatal(FatalError::UnregisteredFunction(FunctionId(9)))));
    }

    #[test]
    fn retired_function_cannot_deoptimize_again() {
        let mgr = DeoptManager::new();
        mgr.register(proto(3, 1), code_with_point(3, 1));
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
        mgr.deoptimize(FunctionId(3), 1, BailoutReason::GuardFailure, DeoptMode::Eager, jit, &shapes, &objects)
            .unwrap();
        assert_eq!(mgr.state(FunctionId(3)), Some(FunctionState::Retired));

        let jit2 = JitState { registers: vec![], stack: vec![], constants: vec![] };
        let err = mgr
            .deoptimize(FunctionId(3), 1, BailoutReason::GuardFailure, DeoptMode::Eager, jit2, &shapes, &objects)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Fatal(FatalError::ReconstructAfterRetirement { function: FunctionId(3) })
        ));
    }

    #[test]
    fn hot_deopts_ranks_by_frequency() {
        let mgr = DeoptManager::new();
        mgr.register(proto(4, 1), code_with_point(4, 1));
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        for _ in 0..3 {
            // Eager deopt retires the function, so re-register between hits
            // to isolate the frequency counter from the state machine.
            mgr.register(proto(4, 1), code_with_point(4, 1));
            let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
            mgr.deoptimize(FunctionId(4), 1, BailoutReason::GuardFailure, DeoptMode::Eager, jit, &shapes, &objects).unwrap();
        }
        let top = mgr.hot_deopts(1).unwrap();
        assert_eq!(top[0].3, 3);
    }

    #[test]
    fn hot_deopts_rejects_a_top_k_below_one() {
        let mgr = DeoptManager::new();
        let err = mgr.hot_deopts(0).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Range(RangeError::InvalidTopK(0))));
    }

    #[test]
    fn hot_deopts_excludes_sites_below_the_configured_threshold() {
        let mgr = DeoptManager::with_hot_threshold(2);
        mgr.register(proto(5, 1), code_with_point(5, 1));
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
        mgr.deoptimize(FunctionId(5), 1, BailoutReason::GuardFailure, DeoptMode::Eager, jit, &shapes, &objects).unwrap();
        assert!(mgr.hot_deopts(10).unwrap().is_empty(), "a single hit stays below threshold 2");
    }

    #[test]
    fn stats_reports_the_total_across_every_site() {
        let mgr = DeoptManager::new();
        mgr.register(proto(6, 1), code_with_point(6, 1));
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        let jit1 = JitState { registers: vec![], stack: vec![], constants: vec![] };
        mgr.deoptimize(FunctionId(6), 1, BailoutReason::GuardFailure, DeoptMode::Lazy, jit1, &shapes, &objects).unwrap();
        let jit2 = JitState { registers: vec![], stack: vec![], constants: vec![] };
        mgr.deoptimize(FunctionId(6), 1, BailoutReason::GuardFailure, DeoptMode::Lazy, jit2, &shapes, &objects).unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_site[0].3, 2);
    }
}
