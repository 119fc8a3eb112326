//! State materializer (C4, §4.2.1): turns a `JitState` plus `DeoptMetadata`
//! back into live `Value`s, including two-pass reconstruction of escaped
//! (scalar-replaced) objects that may reference each other cyclically.

use super::metadata::{DeoptMetadata, EscapedObjectDesc, FrameShape, FunctionId, ValueLocation};
use crate::error::{CoreError, CoreResult, FatalError, TypeError};
use crate::heap::ObjectArena;
use crate::shape::ShapeTree;
use crate::value::Value;
use std::collections::HashMap;

/// Materializes every escaped object described by `metadata` against the
/// live shape tree and object arena, then resolves `metadata`'s own frame
/// shapes into concrete values.
///
/// Escaped objects may reference each other (a cycle of objects that all
/// escaped together), so this runs in two passes: pass one allocates an
/// empty object of the right shape for every descriptor up front, which
/// breaks any cycle by giving every object an identity before any slot is
/// filled in; pass two resolves each descriptor's per-slot locations
/// (which may themselves be `MaterializedObject` references into this same
/// set) and writes them into the already-allocated objects.
pub struct Materializer<'a> {
    function: FunctionId,
    bytecode_offset: u32,
    shapes: &'a ShapeTree,
    objects: &'a ObjectArena,
}

impl<'a> Materializer<'a> {
    pub fn new(function: FunctionId, bytecode_offset: u32, shapes: &'a ShapeTree, objects: &'a ObjectArena) -> Self {
        Materializer { function, bytecode_offset, shapes, objects }
    }

    fn missing(&self, point: u32) -> CoreError {
        FatalError::MissingValueLocation(self.function, point).into()
    }

    /// Resolves a single `ValueLocation` against the optimized frame and an
    /// already-populated materialized-object table, validating the live
    /// value's kind against what the location declared it should be.
    fn resolve(
        &self,
        loc: &ValueLocation,
        registers: &[Value],
        stack: &[Value],
        materialized: &HashMap<u32, Value>,
    ) -> CoreResult<Value> {
        let (value, location_desc, expected) = match loc {
            ValueLocation::Register(r, expected) => (
                registers.get(*r as usize).copied().ok_or_else(|| self.missing(self.bytecode_offset))?,
                format!("register {r}"),
                *expected,
            ),
            ValueLocation::Stack(s, expected) => (
                stack.get(*s as usize).copied().ok_or_else(|| self.missing(self.bytecode_offset))?,
                format!("stack slot {s}"),
                *expected,
            ),
            ValueLocation::Constant(v) => return Ok(*v),
            ValueLocation::MaterializedObject(id, expected) => (
                materialized.get(id).copied().ok_or_else(|| self.missing(self.bytecode_offset))?,
                format!("materialized object {id}"),
                *expected,
            ),
        };
        if !expected.matches(value) {
            return Err(TypeError::ReconstructionKindMismatch {
                location: location_desc,
                expected: expected.name(),
                found: value.type_name(),
            }
            .into());
        }
        Ok(value)
    }

    /// Materializes the full `escaped_objects` list, returning a table from
    /// descriptor id to the resulting object handle `Value`.
    pub fn materialize_escaped(
        &self,
        escaped: &[EscapedObjectDesc],
        registers: &[Value],
        stack: &[Value],
    ) -> CoreResult<HashMap<u32, Value>> {
        // Pass 1: allocate every object by shape, establishing identity
        // before any slot is written.
        let mut handles = HashMap::with_capacity(escaped.len());
        for desc in escaped {
            let shape = self
                .shapes
                .find(desc.shape_id)
                .ok_or_else(|| CoreError::from(FatalError::UnreachableShape(desc.shape_id)))?;
            let idx = self.objects.alloc(shape);
            handles.insert(desc.id, Value::from_object_handle(idx));
        }

        // Pass 2: resolve every slot, which may reference another handle
        // from pass 1, and write it in.
        for desc in escaped {
            let handle = handles[&desc.id];
            let idx = handle
                .as_heap_index()
                .expect("object handles minted in pass 1 are always heap handles");
            for (slot, loc) in desc.slots.iter().enumerate() {
                let value = self.resolve(loc, registers, stack, &handles)?;
                self.objects.set_slot(idx, slot, value);
            }
        }

        Ok(handles)
    }

    /// Resolves one frame shape's locals and operand stack into concrete
    /// values, given an already-materialized escaped-object table.
    pub fn materialize_frame_shape(
        &self,
        frame: &FrameShape,
        registers: &[Value],
        stack: &[Value],
        materialized: &HashMap<u32, Value>,
    ) -> CoreResult<(Vec<Value>, Vec<Value>)> {
        let locals = frame
            .locals
            .iter()
            .map(|loc| self.resolve(loc, registers, stack, materialized))
            .collect::<CoreResult<Vec<_>>>()?;
        let operand_stack = frame
            .operand_stack
            .iter()
            .map(|loc| self.resolve(loc, registers, stack, materialized))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok((locals, operand_stack))
    }

    /// Materializes everything `metadata` describes: escaped objects first,
    /// then the outer frame's locals and operand stack.
    pub fn materialize(
        &self,
        metadata: &DeoptMetadata,
        registers: &[Value],
        stack: &[Value],
    ) -> CoreResult<(HashMap<u32, Value>, Vec<Value>, Vec<Value>)> {
        let materialized = self.materialize_escaped(&metadata.escaped_objects, registers, stack)?;
        let (locals, operand_stack) =
            self.materialize_frame_shape(&metadata.frame_shape, registers, stack, &materialized)?;
        Ok((materialized, locals, operand_stack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deopt::metadata::{ExpectedKind, FrameShape};
    use crate::shape::Attrs;

    fn setup() -> (ShapeTree, ObjectArena) {
        (ShapeTree::new(8), ObjectArena::new())
    }

    #[test]
    fn resolves_register_and_constant_locations() {
        let (shapes, objects) = setup();
        let m = Materializer::new(FunctionId(1), 10, &shapes, &objects);
        let registers = vec![Value::from_i32(7)];
        let stack = vec![];
        let frame = FrameShape {
            locals: vec![
                ValueLocation::Register(0, ExpectedKind::Int),
                ValueLocation::Constant(Value::from_i32(99)),
            ],
            operand_stack: vec![],
        };
        let (_materialized, locals, _stack) = m
            .materialize(
                &DeoptMetadata {
                    bytecode_offset: 10,
                    frame_shape: frame,
                    inlined_frames: vec![],
                    escaped_objects: vec![],
                },
                &registers,
                &stack,
            )
            .unwrap();
        assert_eq!(locals[0].as_i32(), 7);
        assert_eq!(locals[1].as_i32(), 99);
    }

    #[test]
    fn materializes_a_self_referential_escaped_object() {
        let (shapes, objects) = setup();
        let shape = shapes.child(&shapes.root(), "next", Attrs::DEFAULT);
        let m = Materializer::new(FunctionId(1), 0, &shapes, &objects);
        let escaped = vec![EscapedObjectDesc {
            id: 0,
            shape_id: shape.id(),
            slots: vec![ValueLocation::MaterializedObject(0, ExpectedKind::Object)],
        }];
        let handles = m.materialize_escaped(&escaped, &[], &[]).unwrap();
        let self_handle = handles[&0];
        let idx = self_handle.as_heap_index().unwrap();
        let slot0 = objects.get_slot(idx, 0).unwrap();
        assert_eq!(slot0, self_handle, "the object's own slot should point back at itself");
    }

    #[test]
    fn kind_mismatch_between_expected_and_live_value_is_a_type_error() {
        let (shapes, objects) = setup();
        let m = Materializer::new(FunctionId(1), 10, &shapes, &objects);
        let registers = vec![Value::from_i32(7)];
        let frame = FrameShape { locals: vec![ValueLocation::Register(0, ExpectedKind::Object)], operand_stack: vec![] };
        let err = m
            .materialize(
                &DeoptMetadata { bytecode_offset: 10, frame_shape: frame, inlined_frames: vec![], escaped_objects: vec![] },
                &registers,
                &[],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Type(TypeError::ReconstructionKindMismatch { expected: "object", found: "number", .. })
        ));
    }

    #[test]
    fn unreachable_shape_is_fatal() {
        let (shapes, objects) = setup();
        let m = Materializer::new(FunctionId(1), 0, &shapes, &objects);
        let escaped = vec![EscapedObjectDesc { id: 0, shape_id: 424_242, slots: vec![] }];
        let err = m.materialize_escaped(&escaped, &[], &[]).unwrap_err();
        assert!(matches!(err, CoreError::Fatal(FatalError::UnreachableShape(424_242))));
    }

    #[test]
    fn missing_register_location_is_fatal() {
        let (shapes, objects) = setup();
        let m = Materializer::new(FunctionId(2), 5, &shapes, &objects);
        let frame = FrameShape { locals: vec![ValueLocation::Register(3, ExpectedKind::Any)], operand_stack: vec![] };
        let err = m
            .materialize(
                &DeoptMetadata { bytecode_offset: 5, frame_shape: frame, inlined_frames: vec![], escaped_objects: vec![] },
                &[],
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Fatal(FatalError::MissingValueLocation(FunctionId(2), 5))));
    }
}
