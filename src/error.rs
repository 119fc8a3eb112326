//! Core error taxonomy (§7): TYPE, RANGE, REFERENCE, FATAL.
//!
//! Unlike the scripting-language runtime this crate was generalized from —
//! which declares `thiserror` as a dependency but hand-rolls `Display`/`Error`
//! for its own `RuntimeError` — the four kinds here are few enough, and the
//! `Fatal` kind nests enough distinct reasons, that deriving with `thiserror`
//! is the better fit and is what it was pulled in for.

use crate::deopt::FunctionId;
use thiserror::Error;

/// A stable, short code attached to every `CoreError`, in the spirit of the
/// `AXM_4xx`-style codes the teacher runtime tags its `RuntimeError` variants
/// with (`NilCall` -> `AXM_402`, `NotCallable` -> `AXM_401`).
impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Type(_) => "COR-100",
            CoreError::Range(_) => "COR-200",
            CoreError::Reference { .. } => "COR-300",
            CoreError::Fatal(_) => "COR-900",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("range error: {0}")]
    Range(#[from] RangeError),

    #[error("reference error: undeclared global binding '{name}'")]
    Reference { name: String },

    #[error("fatal error: {0}")]
    Fatal(#[from] FatalError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("BigInt and number cannot be mixed in the same operation")]
    BigIntNumberMix,

    #[error("operation '{op}' is not defined for operand kinds {lhs} and {rhs}")]
    IncompatibleKinds {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error(
        "reconstructed value at {location:?} has kind {found}, expected {expected}"
    )]
    ReconstructionKindMismatch {
        location: String,
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("BigInt exponent must be non-negative, got {0}")]
    NegativeBigIntExponent(i64),

    #[error("width must be >= 1 bit, got {0}")]
    InvalidWidth(u32),

    #[error("top-k request must be >= 1, got {0}")]
    InvalidTopK(usize),

    #[error("division by zero")]
    DivisionByZero,
}

/// Malformed-optimized-code conditions. These are unrecoverable: the spec
/// (§4.2.3, §7) requires the runtime to abort rather than continue with
/// incorrect semantics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("no value location recorded for {0:?} at bailout point {1}")]
    MissingValueLocation(FunctionId, u32),

    #[error("escaped-object shape {0} is not reachable in the live shape tree")]
    UnreachableShape(u64),

    #[error(
        "frame-size mismatch reconstructing {function:?}: metadata declares {declared} locals, frame shape has {actual}"
    )]
    FrameSizeMismatch {
        function: FunctionId,
        declared: usize,
        actual: usize,
    },

    #[error("no optimized code registered for function {0:?}")]
    UnregisteredFunction(FunctionId),

    #[error("no bailout-point metadata at point {1} for function {0:?}")]
    UnknownBailoutPoint(FunctionId, u32),

    #[error("attempted to reconstruct a {function:?} already in terminal state RETIRED")]
    ReconstructAfterRetirement { function: FunctionId },
}

pub type CoreResult<T> = Result<T, CoreError>;
