//! Heap-side storage for the three handle kinds `Value` can reference:
//! interned strings, objects (shape + slot array), and `BigInt`s.
//!
//! The string interner is carried over nearly verbatim from the teacher's
//! `nanbox.rs::StringInterner` (a `parking_lot::RwLock`-guarded table plus a
//! backing `Vec`); the object and BigInt arenas follow the same shape since
//! the teacher has no precedent for them specifically.

use crate::bigint::BigInt;
use crate::shape::Shape;
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;

pub struct StringInterner {
    table: RwLock<HashMap<String, u32>>,
    strings: RwLock<Vec<String>>,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner { table: RwLock::new(HashMap::new()), strings: RwLock::new(Vec::new()) }
    }

    pub fn intern(&self, s: &str) -> u32 {
        {
            let table = self.table.read();
            if let Some(&idx) = table.get(s) {
                return idx;
            }
        }
        let mut table = self.table.write();
        if let Some(&idx) = table.get(s) {
            return idx;
        }
        let idx = {
            let mut strings = self.strings.write();
            let idx = strings.len() as u32;
            strings.push(s.to_string());
            idx
        };
        table.insert(s.to_string(), idx);
        idx
    }

    pub fn get(&self, idx: u32) -> Option<String> {
        self.strings.read().get(idx as usize).cloned()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// An object on the heap: its shape plus a dense slot array matching
/// `shape.num_slots()`, per §3.2's invariant that property-list length
/// equals the shape's slot count.
pub struct HeapObject {
    pub shape: Shape,
    pub slots: Vec<Value>,
}

pub struct ObjectArena {
    objects: RwLock<Vec<HeapObject>>,
}

impl ObjectArena {
    pub fn new() -> Self {
        ObjectArena { objects: RwLock::new(Vec::new()) }
    }

    pub fn alloc(&self, shape: Shape) -> u32 {
        let mut objects = self.objects.write();
        let idx = objects.len() as u32;
        let num_slots = shape.num_slots() as usize;
        objects.push(HeapObject { shape, slots: vec![Value::undefined(); num_slots] });
        idx
    }

    pub fn get_slot(&self, idx: u32, slot: usize) -> Option<Value> {
        self.objects.read().get(idx as usize).and_then(|o| o.slots.get(slot)).copied()
    }

    pub fn set_slot(&self, idx: u32, slot: usize, value: Value) {
        if let Some(obj) = self.objects.write().get_mut(idx as usize) {
            if slot < obj.slots.len() {
                obj.slots[slot] = value;
            }
        }
    }

    pub fn shape_of(&self, idx: u32) -> Option<Shape> {
        self.objects.read().get(idx as usize).map(|o| o.shape.clone())
    }

    pub fn set_shape(&self, idx: u32, shape: Shape) {
        if let Some(obj) = self.objects.write().get_mut(idx as usize) {
            let new_len = shape.num_slots() as usize;
            obj.slots.resize(new_len, Value::undefined());
            obj.shape = shape;
        }
    }
}

impl Default for ObjectArena {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BigIntArena {
    values: RwLock<Vec<BigInt>>,
}

impl BigIntArena {
    pub fn new() -> Self {
        BigIntArena { values: RwLock::new(Vec::new()) }
    }

    pub fn alloc(&self, value: BigInt) -> u32 {
        let mut values = self.values.write();
        let idx = values.len() as u32;
        values.push(value);
        idx
    }

    pub fn get(&self, idx: u32) -> Option<BigInt> {
        self.values.read().get(idx as usize).cloned()
    }
}

impl Default for BigIntArena {
    fn default() -> Self {
        Self::new()
    }
}
