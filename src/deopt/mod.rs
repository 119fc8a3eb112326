//! Deoptimization pipeline: metadata schema (§3.5), state materializer
//! (C4, §4.2.1), frame reconstructor (C5, §4.2.2), and the deopt manager
//! (C6, §4.2.3) tying them together behind a registry of optimized code.

mod frame;
mod manager;
mod materializer;
mod metadata;

pub use frame::{reconstruct, InterpreterFrame};
pub use manager::{DeoptManager, DeoptOutcome, DeoptStats, FunctionState};
pub use materializer::Materializer;
pub use metadata::{
    BailoutReason, DeoptMetadata, DeoptMode, EscapedObjectDesc, ExpectedKind, FrameShape, FunctionId, FunctionProto,
    JitState, OptimizedCode, SafePoint, ValueLocation,
};
