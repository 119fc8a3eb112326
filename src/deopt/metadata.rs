//! Deoptimization metadata schema (§3.5) and the minimal "optimized code"
//! stand-in (§3.7) the rest of the deopt pipeline operates on. The optimizer
//! that would normally emit this is explicitly out of scope (§1 Non-goals);
//! this is data only, in the spirit of the teacher's own `jit.rs`, which is
//! a deliberately inert stand-in for a real code generator.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// The closed reason enumeration of §3.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BailoutReason {
    GuardFailure,
    TypeMismatch,
    Overflow,
    AssumptionInvalidated,
    UncommonPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeoptMode {
    Eager,
    Lazy,
}

/// A program point in optimized code at which lazy deopts are safe to
/// apply: a loop back-edge or a function exit (§4.2.3). The embedding
/// interpreter is responsible for recognizing these points; this crate only
/// guarantees `DeoptManager::process_pending` drains correctly whenever it
/// is called at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafePoint {
    LoopBackEdge,
    FunctionExit,
}

/// The value kind a reconstructed location is expected to carry, checked
/// against the live value pulled from the optimized frame. `Any` skips the
/// check, for locations whose kind genuinely varies (used sparingly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedKind {
    Any,
    Int,
    Float,
    Bool,
    String,
    Object,
    BigInt,
}

impl ExpectedKind {
    pub(super) fn matches(self, value: Value) -> bool {
        match self {
            ExpectedKind::Any => true,
            ExpectedKind::Int => value.is_int(),
            ExpectedKind::Float => value.is_float(),
            ExpectedKind::Bool => value.is_bool(),
            ExpectedKind::String => value.is_string(),
            ExpectedKind::Object => value.is_object(),
            ExpectedKind::BigInt => value.is_bigint(),
        }
    }

    pub(super) fn name(self) -> &'static str {
        match self {
            ExpectedKind::Any => "any",
            ExpectedKind::Int | ExpectedKind::Float => "number",
            ExpectedKind::Bool => "boolean",
            ExpectedKind::String => "string",
            ExpectedKind::Object => "object",
            ExpectedKind::BigInt => "bigint",
        }
    }
}

/// Where a live interpreter value lives in the optimized frame (§3.5).
/// `Register`/`Stack`/`MaterializedObject` carry the kind reconstruction
/// expects to find there, so a drifted optimizer assumption surfaces as
/// `TypeError::ReconstructionKindMismatch` instead of silently handing back
/// the wrong representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueLocation {
    Register(u32, ExpectedKind),
    Stack(u32, ExpectedKind),
    Constant(Value),
    MaterializedObject(u32, ExpectedKind),
}

/// An escaped (scalar-replaced) object's description: the shape it must be
/// re-materialized with, plus one value location per slot. `shape_id`
/// references the live shape tree rather than embedding a `Shape` directly,
/// since the metadata format is meant to be host-snapshottable data (§6) and
/// a `Shape` handle is tree-local, not portable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscapedObjectDesc {
    pub id: u32,
    pub shape_id: u64,
    pub slots: Vec<ValueLocation>,
}

/// Ordered value locations for every interpreter local and operand-stack
/// slot live at a bailout point, for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameShape {
    pub locals: Vec<ValueLocation>,
    pub operand_stack: Vec<ValueLocation>,
}

impl FrameShape {
    pub fn locals_count(&self) -> usize {
        self.locals.len()
    }
}

/// Full deopt metadata attached to one bailout point (§3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeoptMetadata {
    pub bytecode_offset: u32,
    pub frame_shape: FrameShape,
    /// Zero or more nested frame shapes for inlined callees, innermost last.
    pub inlined_frames: Vec<FrameShape>,
    pub escaped_objects: Vec<EscapedObjectDesc>,
}

/// A bytecode function's identity as far as the deopt pipeline needs it:
/// just enough to validate frame size on reconstruction (§4.2.2). Grounded
/// on the teacher's `bytecode::Proto`, which carries `reg_count`; trimmed to
/// the one field the deopt contract actually reads.
#[derive(Debug, Clone)]
pub struct FunctionProto {
    pub id: FunctionId,
    pub name: String,
    pub locals_count: usize,
}

/// "Optimized code" registered for one function: its bailout-point metadata
/// table. Opaque beyond that — per §9's design note, the code generator
/// itself is left abstract.
#[derive(Debug, Clone)]
pub struct OptimizedCode {
    pub function: FunctionId,
    pub bailout_points: HashMap<u32, DeoptMetadata>,
}

impl OptimizedCode {
    pub fn new(function: FunctionId) -> Self {
        OptimizedCode { function, bailout_points: HashMap::new() }
    }

    pub fn with_bailout_point(mut self, point: u32, metadata: DeoptMetadata) -> Self {
        self.bailout_points.insert(point, metadata);
        self
    }
}

/// The optimized frame a bailout is triggered from: register file, operand
/// stack, and constant pool `materialize` resolves `ValueLocation`s against.
#[derive(Debug, Clone)]
pub struct JitState {
    pub registers: Vec<Value>,
    pub stack: Vec<Value>,
    pub constants: Vec<Value>,
}
