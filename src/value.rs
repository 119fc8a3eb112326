//! NaN-boxed tagged value representation — the C1 value model.
//!
//! DESIGN: every value fits in 64 bits. No heap allocation for primitives.
//!
//! IEEE 754 double-precision NaN has:
//!   - Exponent bits [62:52] all 1  (0x7FF)
//!   - Mantissa bits [51:0]  non-zero  -> "quiet NaN" when bit 51 = 1
//!
//! Two disjoint slices of the quiet-NaN space are used:
//!
//!   0 11111111111 1 [TAG:2] [PAYLOAD:48]     <- immediates (bit 51 = 1)
//!   0 11111111111 0 [KIND:2][INDEX:46]       <- heap handles (bit 51 = 0)
//!
//! Immediate tags (bits [49:48]): NIL, UNDEFINED, BOOL, INT.
//! Heap kinds (top 2 bits of the 46-bit payload): STRING, OBJECT, BIGINT.
//! A plain (non-NaN) f64 bit pattern is left untouched and falls through to
//! the float path, exactly as in the teacher's original scheme.

use crate::error::{CoreError, CoreResult, TypeError};
use serde::{Deserialize, Serialize};
use std::fmt;

const NAN_MASK: u64 = 0x7FFC_0000_0000_0000; // bit63=0, exp=0x7FF, bit51=1
const HEAP_NAN_MASK: u64 = 0x7FF8_0000_0000_0000; // bit51=0, still a quiet NaN pattern
const TAG_MASK: u64 = 0x0003_0000_0000_0000; // bits [49:48]
const HEAP_KIND_MASK: u64 = 0x0000_C000_0000_0000; // top 2 bits of the 48-bit heap payload
const HEAP_INDEX_MASK: u64 = 0x0000_3FFF_FFFF_FFFF; // low 46 bits

const TAG_NIL: u64 = 0x0000_0000_0000_0000;
const TAG_UNDEFINED: u64 = 0x0001_0000_0000_0000;
const TAG_BOOL: u64 = 0x0002_0000_0000_0000;
const TAG_INT: u64 = 0x0003_0000_0000_0000;

const NIL_VALUE: u64 = NAN_MASK | TAG_NIL;
const UNDEFINED_VALUE: u64 = NAN_MASK | TAG_UNDEFINED;
const TRUE_VALUE: u64 = NAN_MASK | TAG_BOOL | 1;
const FALSE_VALUE: u64 = NAN_MASK | TAG_BOOL | 0;

/// Which heap-side table a heap handle's index refers into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum HeapKind {
    String = 0,
    Object = 1,
    BigInt = 2,
}

impl HeapKind {
    fn from_bits(bits: u64) -> Self {
        match (bits & HEAP_KIND_MASK) >> 46 {
            0 => HeapKind::String,
            1 => HeapKind::Object,
            2 => HeapKind::BigInt,
            other => unreachable!("heap kind tag out of range: {other}"),
        }
    }
}

/// A NaN-boxed value. 8 bytes, no indirection for primitives.
///
/// `Serialize`/`Deserialize` round-trip the raw bit pattern; this exists so
/// deopt metadata (§3.5) can be snapshotted by a host, not as part of the
/// value model's actual contract.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    // -- Constructors --------------------------------------------------

    #[inline(always)]
    pub const fn nil() -> Self {
        Value(NIL_VALUE)
    }

    #[inline(always)]
    pub const fn undefined() -> Self {
        Value(UNDEFINED_VALUE)
    }

    #[inline(always)]
    pub const fn bool_val(b: bool) -> Self {
        if b { Value(TRUE_VALUE) } else { Value(FALSE_VALUE) }
    }

    #[inline(always)]
    pub fn from_f64(n: f64) -> Self {
        let bits = n.to_bits();
        if (bits & NAN_MASK) == NAN_MASK {
            // A user-level quiet NaN collides with our tag space; canonicalize.
            Value(NAN_MASK | TAG_INT | 0)
                .with_float_nan_marker(bits)
        } else {
            Value(bits)
        }
    }

    // Re-box a user NaN payload distinctly from our own canonical f64::NAN,
    // by routing it through the heap-free immediate space reserved for it.
    // Kept deliberately simple: any user NaN collapses to the canonical NaN,
    // which is sufficient since IEEE 754 does not distinguish NaN payloads
    // for any operation this value model exposes.
    #[inline(always)]
    fn with_float_nan_marker(self, _original_bits: u64) -> Self {
        Value(f64::NAN.to_bits())
    }

    #[inline(always)]
    pub fn from_i32(n: i32) -> Self {
        Value(NAN_MASK | TAG_INT | (n as u32 as u64))
    }

    #[inline(always)]
    fn from_heap(kind: HeapKind, index: u64) -> Self {
        debug_assert!(index & !HEAP_INDEX_MASK == 0, "heap index exceeds 46 bits");
        Value(HEAP_NAN_MASK | ((kind as u64) << 46) | index)
    }

    #[inline(always)]
    pub fn from_string_handle(index: u32) -> Self {
        Self::from_heap(HeapKind::String, index as u64)
    }

    #[inline(always)]
    pub fn from_object_handle(index: u32) -> Self {
        Self::from_heap(HeapKind::Object, index as u64)
    }

    #[inline(always)]
    pub fn from_bigint_handle(index: u32) -> Self {
        Self::from_heap(HeapKind::BigInt, index as u64)
    }

    // -- Type checks ------------------------------------------------------

    #[inline(always)]
    pub fn is_nil(self) -> bool {
        self.0 == NIL_VALUE
    }

    #[inline(always)]
    pub fn is_undefined(self) -> bool {
        self.0 == UNDEFINED_VALUE
    }

    #[inline(always)]
    pub fn is_bool(self) -> bool {
        (self.0 & (NAN_MASK | TAG_MASK)) == (NAN_MASK | TAG_BOOL)
    }

    #[inline(always)]
    pub fn is_true(self) -> bool {
        self.0 == TRUE_VALUE
    }

    #[inline(always)]
    pub fn is_int(self) -> bool {
        (self.0 & (NAN_MASK | TAG_MASK)) == (NAN_MASK | TAG_INT)
    }

    #[inline(always)]
    pub fn is_float(self) -> bool {
        (self.0 & NAN_MASK) != NAN_MASK && (self.0 & HEAP_NAN_MASK) != HEAP_NAN_MASK
    }

    #[inline(always)]
    pub fn is_number(self) -> bool {
        self.is_float() || self.is_int()
    }

    #[inline(always)]
    fn is_heap(self) -> bool {
        (self.0 & 0xFFF8_0000_0000_0000) == HEAP_NAN_MASK
    }

    #[inline(always)]
    pub fn is_string(self) -> bool {
        self.is_heap() && HeapKind::from_bits(self.0) == HeapKind::String
    }

    #[inline(always)]
    pub fn is_object(self) -> bool {
        self.is_heap() && HeapKind::from_bits(self.0) == HeapKind::Object
    }

    #[inline(always)]
    pub fn is_bigint(self) -> bool {
        self.is_heap() && HeapKind::from_bits(self.0) == HeapKind::BigInt
    }

    #[inline(always)]
    pub fn is_truthy(self) -> bool {
        if self.is_nil() || self.is_undefined() {
            return false;
        }
        if self.is_bool() {
            return self.is_true();
        }
        if self.is_int() {
            return self.as_i32() != 0;
        }
        if self.is_float() {
            return self.as_f64() != 0.0 && !self.as_f64().is_nan();
        }
        true // heap handles (string/object/bigint) are always truthy here;
             // empty-string/zero-bigint falsiness is a stdlib-layer concern.
    }

    // -- Extractors ---------------------------------------------------------

    #[inline(always)]
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    #[inline(always)]
    pub fn as_number_f64(self) -> f64 {
        if self.is_int() { self.as_i32() as f64 } else { self.as_f64() }
    }

    #[inline(always)]
    pub fn as_i32(self) -> i32 {
        (self.0 & 0xFFFF_FFFF) as i32
    }

    #[inline(always)]
    pub fn as_bool(self) -> bool {
        (self.0 & 1) != 0
    }

    #[inline(always)]
    pub fn as_heap_index(self) -> Option<u32> {
        if self.is_heap() { Some((self.0 & HEAP_INDEX_MASK) as u32) } else { None }
    }

    #[inline(always)]
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn type_name(self) -> &'static str {
        if self.is_nil() { "null" }
        else if self.is_undefined() { "undefined" }
        else if self.is_bool() { "boolean" }
        else if self.is_int() || self.is_float() { "number" }
        else if self.is_string() { "string" }
        else if self.is_object() { "object" }
        else if self.is_bigint() { "bigint" }
        else { "unknown" }
    }

    // -- Equality (§3.1) -----------------------------------------------------

    /// Strict equality: same tag AND same payload; NaN is never strict-equal
    /// to NaN, +0 and -0 strict-equal (IEEE 754 `==`).
    pub fn strict_equal(self, rhs: Value) -> bool {
        if self.is_number() && rhs.is_number() {
            return self.as_number_f64() == rhs.as_number_f64();
        }
        self.0 == rhs.0
    }

    /// SameValueZero: as strict, but NaN equals NaN and +0 equals -0 (already
    /// true for strict on numbers other than NaN).
    pub fn same_value_zero(self, rhs: Value) -> bool {
        if self.is_number() && rhs.is_number() {
            let (a, b) = (self.as_number_f64(), rhs.as_number_f64());
            return (a == b) || (a.is_nan() && b.is_nan());
        }
        self.0 == rhs.0
    }

    // -- Arithmetic fast paths (dispatch lives in the interpreter; these are
    // the specialized, branch-free primitives it calls once operand tags are
    // known) -----------------------------------------------------------------

    /// The mixed-type rule (§4.3): a BigInt operand and a plain number
    /// operand can never appear together in the same operation, in either
    /// direction. Callers check this before reaching for `add_int`/
    /// `add_float` or any other numeric fast path.
    #[inline]
    pub fn check_not_bigint_number_mix(self, rhs: Value) -> CoreResult<()> {
        let mixed = (self.is_bigint() && rhs.is_number()) || (self.is_number() && rhs.is_bigint());
        if mixed {
            Err(CoreError::Type(TypeError::BigIntNumberMix))
        } else {
            Ok(())
        }
    }

    #[inline(always)]
    pub fn add_int(self, rhs: Value) -> Value {
        Value::from_i32(self.as_i32().wrapping_add(rhs.as_i32()))
    }

    #[inline(always)]
    pub fn add_float(self, rhs: Value) -> Value {
        Value::from_f64(self.as_f64() + rhs.as_f64())
    }

    #[inline(always)]
    pub fn sub_int(self, rhs: Value) -> Value {
        Value::from_i32(self.as_i32().wrapping_sub(rhs.as_i32()))
    }

    #[inline(always)]
    pub fn mul_int(self, rhs: Value) -> Value {
        Value::from_i32(self.as_i32().wrapping_mul(rhs.as_i32()))
    }

    #[inline(always)]
    pub fn lt_num(self, rhs: Value) -> bool {
        self.as_number_f64() < rhs.as_number_f64()
    }

    #[inline(always)]
    pub fn le_num(self, rhs: Value) -> bool {
        self.as_number_f64() <= rhs.as_number_f64()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() { write!(f, "null") }
        else if self.is_undefined() { write!(f, "undefined") }
        else if self.is_bool() { write!(f, "{}", self.as_bool()) }
        else if self.is_int() { write!(f, "{}i", self.as_i32()) }
        else if self.is_float() { write!(f, "{}f", self.as_f64()) }
        else if self.is_string() { write!(f, "str#{}", self.as_heap_index().unwrap()) }
        else if self.is_object() { write!(f, "obj#{}", self.as_heap_index().unwrap()) }
        else if self.is_bigint() { write!(f, "bigint#{}", self.as_heap_index().unwrap()) }
        else { write!(f, "raw:0x{:016x}", self.0) }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_and_undefined_are_distinct() {
        assert!(Value::nil().is_nil());
        assert!(Value::undefined().is_undefined());
        assert!(!Value::nil().is_undefined());
        assert_ne!(Value::nil(), Value::undefined());
    }

    #[test]
    fn bool_roundtrip() {
        let t = Value::bool_val(true);
        let f = Value::bool_val(false);
        assert!(t.is_bool() && t.is_true());
        assert!(f.is_bool() && !f.is_true());
    }

    #[test]
    fn int_roundtrip() {
        let v = Value::from_i32(42);
        assert!(v.is_int());
        assert_eq!(v.as_i32(), 42);
        let neg = Value::from_i32(-1);
        assert_eq!(neg.as_i32(), -1);
    }

    #[test]
    fn float_roundtrip() {
        let v = Value::from_f64(3.14);
        assert!(v.is_float());
        assert!((v.as_f64() - 3.14).abs() < 1e-10);
    }

    #[test]
    fn heap_handles_carry_their_kind() {
        let s = Value::from_string_handle(7);
        let o = Value::from_object_handle(7);
        let b = Value::from_bigint_handle(7);
        assert!(s.is_string() && !s.is_object() && !s.is_bigint());
        assert!(o.is_object() && !o.is_string());
        assert!(b.is_bigint() && !b.is_object());
        assert_eq!(s.as_heap_index(), Some(7));
        assert_eq!(o.as_heap_index(), Some(7));
    }

    #[test]
    fn strict_equal_rejects_nan_but_same_value_zero_accepts_it() {
        let nan_a = Value::from_f64(f64::NAN);
        let nan_b = Value::from_f64(f64::NAN);
        assert!(!nan_a.strict_equal(nan_b));
        assert!(nan_a.same_value_zero(nan_b));
    }

    #[test]
    fn strict_equal_treats_pos_and_neg_zero_as_equal() {
        let pz = Value::from_f64(0.0);
        let nz = Value::from_f64(-0.0);
        assert!(pz.strict_equal(nz));
        assert!(pz.same_value_zero(nz));
    }

    #[test]
    fn int_and_float_number_compare_by_value() {
        let i = Value::from_i32(3);
        let f = Value::from_f64(3.0);
        assert!(i.strict_equal(f));
    }

    #[test]
    fn nil_is_falsy_and_objects_are_truthy() {
        assert!(!Value::nil().is_truthy());
        assert!(!Value::undefined().is_truthy());
        assert!(Value::from_object_handle(0).is_truthy());
    }

    #[test]
    fn int_arithmetic_fast_paths() {
        let a = Value::from_i32(10);
        let b = Value::from_i32(3);
        assert_eq!(a.add_int(b).as_i32(), 13);
        assert_eq!(a.sub_int(b).as_i32(), 7);
        assert_eq!(a.mul_int(b).as_i32(), 30);
    }

    #[test]
    fn bigint_and_number_can_never_mix_in_either_operand_order() {
        let big = Value::from_bigint_handle(0);
        let int = Value::from_i32(5);
        let float = Value::from_f64(5.5);
        assert!(big.check_not_bigint_number_mix(int).is_err());
        assert!(int.check_not_bigint_number_mix(big).is_err());
        assert!(big.check_not_bigint_number_mix(float).is_err());
        assert!(float.check_not_bigint_number_mix(big).is_err());
    }

    #[test]
    fn same_kind_operands_never_trip_the_mix_check() {
        let a = Value::from_bigint_handle(0);
        let b = Value::from_bigint_handle(1);
        assert!(a.check_not_bigint_number_mix(b).is_ok());
        let x = Value::from_i32(1);
        let y = Value::from_f64(2.0);
        assert!(x.check_not_bigint_number_mix(y).is_ok());
    }
}
