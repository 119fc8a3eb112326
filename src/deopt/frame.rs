//! Frame reconstructor (C5, §4.2.2): turns materialized values back into an
//! interpreter frame chain, outermost first, validating declared frame size
//! against the materialized locals.

use super::materializer::Materializer;
use super::metadata::{DeoptMetadata, FunctionId, FunctionProto, JitState};
use crate::error::{CoreResult, FatalError};
use crate::heap::ObjectArena;
use crate::shape::ShapeTree;
use crate::value::Value;

/// One reconstructed interpreter frame: where execution resumes and the
/// concrete local/stack values it resumes with.
#[derive(Debug, Clone)]
pub struct InterpreterFrame {
    pub function: FunctionId,
    pub instruction_pointer: u32,
    pub locals: Vec<Value>,
    pub operand_stack: Vec<Value>,
}

/// Reconstructs the full frame chain for one bailout: the frame that was
/// actually optimized first, then its inlined callees in stored order
/// (innermost last), matching the calling convention the interpreter would
/// have built had the call never been inlined.
pub fn reconstruct(
    function: FunctionId,
    proto: &FunctionProto,
    metadata: &DeoptMetadata,
    jit: &JitState,
    shapes: &ShapeTree,
    objects: &ObjectArena,
) -> CoreResult<Vec<InterpreterFrame>> {
    let materializer = Materializer::new(function, metadata.bytecode_offset, shapes, objects);
    let (materialized, locals, operand_stack) = materializer.materialize(metadata, &jit.registers, &jit.stack)?;

    if locals.len() != proto.locals_count {
        return Err(FatalError::FrameSizeMismatch {
            function,
            declared: proto.locals_count,
            actual: locals.len(),
        }
        .into());
    }

    let mut frames = Vec::with_capacity(metadata.inlined_frames.len() + 1);
    frames.push(InterpreterFrame {
        function,
        instruction_pointer: metadata.bytecode_offset,
        locals,
        operand_stack,
    });
    for inlined in &metadata.inlined_frames {
        let (inner_locals, inner_stack) =
            materializer.materialize_frame_shape(inlined, &jit.registers, &jit.stack, &materialized)?;
        frames.push(InterpreterFrame {
            function,
            instruction_pointer: metadata.bytecode_offset,
            locals: inner_locals,
            operand_stack: inner_stack,
        });
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deopt::metadata::{FrameShape, ValueLocation};

    #[test]
    fn reconstructs_a_single_frame_with_matching_locals_count() {
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        let proto = FunctionProto { id: FunctionId(1), name: "f".into(), locals_count: 2 };
        let metadata = DeoptMetadata {
            bytecode_offset: 42,
            frame_shape: FrameShape {
                locals: vec![ValueLocation::Constant(Value::from_i32(1)), ValueLocation::Constant(Value::from_i32(2))],
                operand_stack: vec![],
            },
            inlined_frames: vec![],
            escaped_objects: vec![],
        };
        let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
        let frames = reconstruct(FunctionId(1), &proto, &metadata, &jit, &shapes, &objects).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].instruction_pointer, 42);
        assert_eq!(frames[0].locals.len(), 2);
    }

    #[test]
    fn frame_size_mismatch_is_fatal() {
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        let proto = FunctionProto { id: FunctionId(1), name: "f".into(), locals_count: 3 };
        let metadata = DeoptMetadata {
            bytecode_offset: 0,
            frame_shape: FrameShape { locals: vec![ValueLocation::Constant(Value::from_i32(1))], operand_stack: vec![] },
            inlined_frames: vec![],
            escaped_objects: vec![],
        };
        let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
        let err = reconstruct(FunctionId(1), &proto, &metadata, &jit, &shapes, &objects).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Fatal(FatalError::FrameSizeMismatch { declared: 3, actual: 1, .. })
        ));
    }

    #[test]
    fn outer_frame_precedes_inlined_frames() {
        let shapes = ShapeTree::new(8);
        let objects = ObjectArena::new();
        let proto = FunctionProto { id: FunctionId(7), name: "outer".into(), locals_count: 0 };
        let metadata = DeoptMetadata {
            bytecode_offset: 5,
            frame_shape: FrameShape { locals: vec![], operand_stack: vec![] },
            inlined_frames: vec![FrameShape {
                locals: vec![ValueLocation::Constant(Value::from_i32(9))],
                operand_stack: vec![],
            }],
            escaped_objects: vec![],
        };
        let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
        let frames = reconstruct(FunctionId(7), &proto, &metadata, &jit, &shapes, &objects).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].locals.is_empty(), "the optimized frame comes first");
        assert_eq!(frames[1].locals[0].as_i32(), 9, "its inlined callee comes second");
    }
}
