/// Corten core: the hidden-class/value/deopt/event-loop substrate a
/// JavaScript runtime's interpreter and optimizing tiers sit on top of.

pub mod bigint;
pub mod config;
pub mod deopt;
pub mod error;
pub mod event_loop;
pub mod heap;
pub mod shape;
pub mod value;

// Re-exports for convenience
pub use bigint::BigInt;
pub use config::RuntimeConfig;
pub use deopt::{DeoptManager, DeoptMode, DeoptStats, FunctionId, FunctionProto, OptimizedCode, SafePoint};
pub use error::{CoreError, CoreResult};
pub use event_loop::EventLoop;
pub use heap::{BigIntArena, ObjectArena, StringInterner};
pub use shape::{Attrs, ElementKind, Shape, ShapeTree};
pub use value::Value;
