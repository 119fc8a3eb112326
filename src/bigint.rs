//! Arbitrary-precision integer arithmetic — the C3 BigInt engine (§3.4, §4.3).
//!
//! No direct precedent in the teacher runtime (its `NanVal`/`Value` has only
//! machine `i32`/`f64` numerics); this module follows the same discipline —
//! small, `#[inline]`-friendly primitives, explicit sign handling, errors
//! surfaced through the shared `CoreError` taxonomy rather than panics — but
//! the limb algorithms themselves are original to this crate.
//!
//! Representation: sign plus a little-endian `Vec<u32>` of base-2^32 limbs,
//! matching §3.4's "sign and a little-endian sequence of machine limbs."
//! The zero value is always normalized to `sign: Positive, limbs: []`.

use crate::error::{CoreError, RangeError, TypeError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigInt {
    sign: Sign,
    /// Little-endian, base 2^32. No trailing zero limbs (normalized).
    limbs: Vec<u32>,
}

impl BigInt {
    pub fn zero() -> Self {
        BigInt { sign: Sign::Positive, limbs: vec![] }
    }

    pub fn from_i64(n: i64) -> Self {
        if n == 0 {
            return Self::zero();
        }
        let sign = if n < 0 { Sign::Negative } else { Sign::Positive };
        let mag = n.unsigned_abs();
        let mut limbs = vec![(mag & 0xFFFF_FFFF) as u32];
        if mag >> 32 != 0 {
            limbs.push((mag >> 32) as u32);
        }
        BigInt { sign, limbs }
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.is_empty()
    }

    fn normalize(mut self) -> Self {
        while self.limbs.last() == Some(&0) {
            self.limbs.pop();
        }
        if self.limbs.is_empty() {
            self.sign = Sign::Positive;
        }
        self
    }

    /// Parses `<digits>n`-style literals (the trailing `n` is expected to
    /// already be stripped by the caller/lexer) in base 2, 8, 10, or 16 with
    /// the conventional `0b`/`0o`/`0x` prefixes, per §4.3.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let (negative, rest) = match text.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, text),
        };
        let (radix, digits) = if let Some(d) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            (16u32, d)
        } else if let Some(d) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
            (8, d)
        } else if let Some(d) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
            (2, d)
        } else {
            (10, rest)
        };
        if digits.is_empty() {
            return Err(CoreError::Type(TypeError::IncompatibleKinds {
                op: "parse",
                lhs: "bigint-literal",
                rhs: "empty",
            }));
        }
        let mut acc = BigInt::zero();
        let base = BigInt::from_i64(radix as i64);
        for ch in digits.chars() {
            let digit = ch.to_digit(radix).ok_or_else(|| {
                CoreError::Type(TypeError::IncompatibleKinds {
                    op: "parse",
                    lhs: "bigint-literal",
                    rhs: "invalid-digit",
                })
            })?;
            acc = acc.mul(&base).add(&BigInt::from_i64(digit as i64));
        }
        if negative {
            acc.sign = if acc.is_zero() { Sign::Positive } else { Sign::Negative };
        }
        Ok(acc)
    }

    // -- magnitude helpers (unsigned limb arithmetic) ------------------------

    fn cmp_mag(a: &[u32], b: &[u32]) -> Ordering {
        if a.len() != b.len() {
            return a.len().cmp(&b.len());
        }
        for i in (0..a.len()).rev() {
            if a[i] != b[i] {
                return a[i].cmp(&b[i]);
            }
        }
        Ordering::Equal
    }

    fn add_mag(a: &[u32], b: &[u32]) -> Vec<u32> {
        let mut out = Vec::with_capacity(a.len().max(b.len()) + 1);
        let mut carry = 0u64;
        for i in 0..a.len().max(b.len()) {
            let x = *a.get(i).unwrap_or(&0) as u64;
            let y = *b.get(i).unwrap_or(&0) as u64;
            let sum = x + y + carry;
            out.push((sum & 0xFFFF_FFFF) as u32);
            carry = sum >> 32;
        }
        if carry != 0 {
            out.push(carry as u32);
        }
        out
    }

    /// Requires `a >= b` in magnitude.
    fn sub_mag(a: &[u32], b: &[u32]) -> Vec<u32> {
        let mut out = Vec::with_capacity(a.len());
        let mut borrow = 0i64;
        for i in 0..a.len() {
            let x = a[i] as i64;
            let y = *b.get(i).unwrap_or(&0) as i64;
            let mut diff = x - y - borrow;
            if diff < 0 {
                diff += 1 << 32;
                borrow = 1;
            } else {
                borrow = 0;
            }
            out.push(diff as u32);
        }
        out
    }

    fn mul_mag(a: &[u32], b: &[u32]) -> Vec<u32> {
        if a.is_empty() || b.is_empty() {
            return vec![];
        }
        let mut out = vec![0u32; a.len() + b.len()];
        for (i, &ai) in a.iter().enumerate() {
            let mut carry = 0u64;
            for (j, &bj) in b.iter().enumerate() {
                let idx = i + j;
                let product = ai as u64 * bj as u64 + out[idx] as u64 + carry;
                out[idx] = (product & 0xFFFF_FFFF) as u32;
                carry = product >> 32;
            }
            let mut idx = i + b.len();
            while carry != 0 {
                let sum = out[idx] as u64 + carry;
                out[idx] = (sum & 0xFFFF_FFFF) as u32;
                carry = sum >> 32;
                idx += 1;
            }
        }
        out
    }

    /// Schoolbook long division on magnitudes; returns (quotient, remainder).
    fn divmod_mag(a: &[u32], b: &[u32]) -> (Vec<u32>, Vec<u32>) {
        if Self::cmp_mag(a, b) == Ordering::Less {
            return (vec![], a.to_vec());
        }
        // Bit-at-a-time long division: simple and correct, not the fastest
        // algorithm, but this engine does not need Knuth's algorithm D to
        // satisfy the spec's testable properties.
        let total_bits = a.len() * 32;
        let mut quotient = vec![0u32; a.len()];
        let mut remainder: Vec<u32> = vec![];
        for bit in (0..total_bits).rev() {
            remainder = Self::shl_mag(&remainder, 1);
            let limb = bit / 32;
            let offset = bit % 32;
            let bit_val = (a[limb] >> offset) & 1;
            if bit_val == 1 {
                if remainder.is_empty() {
                    remainder.push(1);
                } else {
                    remainder[0] |= 1;
                }
            }
            if Self::cmp_mag(&remainder, b) != Ordering::Less {
                remainder = Self::sub_mag(&remainder, b);
                while remainder.last() == Some(&0) {
                    remainder.pop();
                }
                quotient[limb] |= 1 << offset;
            }
        }
        while quotient.last() == Some(&0) {
            quotient.pop();
        }
        (quotient, remainder)
    }

    fn shl_mag(a: &[u32], bits: u32) -> Vec<u32> {
        if a.is_empty() {
            return vec![];
        }
        let limb_shift = (bits / 32) as usize;
        let bit_shift = bits % 32;
        let mut out = vec![0u32; a.len() + limb_shift + 1];
        for (i, &limb) in a.iter().enumerate() {
            let lo = (limb as u64) << bit_shift;
            out[i + limb_shift] |= (lo & 0xFFFF_FFFF) as u32;
            out[i + limb_shift + 1] |= (lo >> 32) as u32;
        }
        while out.last() == Some(&0) {
            out.pop();
        }
        out
    }

    // -- public arithmetic (§4.3) --------------------------------------------

    pub fn add(&self, other: &BigInt) -> BigInt {
        if self.sign == other.sign {
            BigInt { sign: self.sign, limbs: Self::add_mag(&self.limbs, &other.limbs) }.normalize()
        } else if Self::cmp_mag(&self.limbs, &other.limbs) != Ordering::Less {
            BigInt { sign: self.sign, limbs: Self::sub_mag(&self.limbs, &other.limbs) }.normalize()
        } else {
            BigInt { sign: other.sign, limbs: Self::sub_mag(&other.limbs, &self.limbs) }.normalize()
        }
    }

    pub fn neg(&self) -> BigInt {
        if self.is_zero() {
            return self.clone();
        }
        BigInt {
            sign: if self.sign == Sign::Positive { Sign::Negative } else { Sign::Positive },
            limbs: self.limbs.clone(),
        }
    }

    pub fn sub(&self, other: &BigInt) -> BigInt {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &BigInt) -> BigInt {
        let limbs = Self::mul_mag(&self.limbs, &other.limbs);
        let sign = if self.sign == other.sign { Sign::Positive } else { Sign::Negative };
        BigInt { sign, limbs }.normalize()
    }

    /// Truncating division (toward zero), per §4.3.
    pub fn div(&self, other: &BigInt) -> Result<BigInt, CoreError> {
        if other.is_zero() {
            return Err(CoreError::Range(RangeError::DivisionByZero));
        }
        let (q, _) = Self::divmod_mag(&self.limbs, &other.limbs);
        let sign = if self.sign == other.sign { Sign::Positive } else { Sign::Negative };
        Ok(BigInt { sign, limbs: q }.normalize())
    }

    /// Remainder with the sign of the dividend, per §4.3 and testable
    /// property `a == (a/b)*b + (a%b)`.
    pub fn rem(&self, other: &BigInt) -> Result<BigInt, CoreError> {
        if other.is_zero() {
            return Err(CoreError::Range(RangeError::DivisionByZero));
        }
        let (_, r) = Self::divmod_mag(&self.limbs, &other.limbs);
        Ok(BigInt { sign: self.sign, limbs: r }.normalize())
    }

    pub fn pow(&self, exponent: i64) -> Result<BigInt, CoreError> {
        if exponent < 0 {
            return Err(CoreError::Range(RangeError::NegativeBigIntExponent(exponent)));
        }
        let mut result = BigInt::from_i64(1);
        let mut base = self.clone();
        let mut e = exponent as u64;
        while e > 0 {
            if e & 1 == 1 {
                result = result.mul(&base);
            }
            base = base.mul(&base);
            e >>= 1;
        }
        Ok(result)
    }

    // -- two's-complement bitwise ops ----------------------------------------
    // Implemented via an infinite-precision two's-complement view: negative
    // values are represented, for the purpose of bitwise ops only, as
    // `!magnitude + 1` extended with an implicit sign-extension of all-1
    // limbs above the stored length.

    /// Full two's-complement limb vector at the given width (sign-extended).
    fn twos_complement_limbs(&self, width: usize) -> Vec<u32> {
        let mut mag = vec![0u32; width];
        for (j, &l) in self.limbs.iter().enumerate() {
            if j < width {
                mag[j] = l;
            }
        }
        if self.sign == Sign::Positive {
            return mag;
        }
        let mut carry = 1u64;
        for limb in mag.iter_mut() {
            let sum = !*limb as u64 + carry;
            *limb = (sum & 0xFFFF_FFFF) as u32;
            carry = sum >> 32;
        }
        mag
    }

    fn bitwise(&self, other: &BigInt, f: impl Fn(u32, u32) -> u32) -> BigInt {
        let width = self.limbs.len().max(other.limbs.len()) + 1;
        let a_limbs = self.twos_complement_limbs(width);
        let b_limbs = other.twos_complement_limbs(width);
        let result_limbs: Vec<u32> = a_limbs.iter().zip(b_limbs.iter()).map(|(&a, &b)| f(a, b)).collect();
        let negative_result = f(
            if self.sign == Sign::Negative { u32::MAX } else { 0 },
            if other.sign == Sign::Negative { u32::MAX } else { 0 },
        ) == u32::MAX;
        from_twos_complement(result_limbs, negative_result)
    }

    pub fn and(&self, other: &BigInt) -> BigInt {
        self.bitwise(other, |a, b| a & b)
    }

    pub fn or(&self, other: &BigInt) -> BigInt {
        self.bitwise(other, |a, b| a | b)
    }

    pub fn xor(&self, other: &BigInt) -> BigInt {
        self.bitwise(other, |a, b| a ^ b)
    }

    pub fn not(&self) -> BigInt {
        // ~x == -x - 1
        self.neg().sub(&BigInt::from_i64(1))
    }

    pub fn shl(&self, bits: u32) -> BigInt {
        if self.is_zero() {
            return self.clone();
        }
        BigInt { sign: self.sign, limbs: Self::shl_mag(&self.limbs, bits) }.normalize()
    }

    /// Arithmetic right shift (sign-preserving). `shr` on BigInt is always
    /// arithmetic per §4.3; unsigned right shift is not offered at all (see
    /// `unsigned_shr_unsupported`).
    pub fn shr(&self, bits: u32) -> BigInt {
        if self.is_zero() {
            return self.clone();
        }
        if self.sign == Sign::Positive {
            let limb_shift = (bits / 32) as usize;
            let bit_shift = bits % 32;
            if limb_shift >= self.limbs.len() {
                return BigInt::zero();
            }
            let mut out = vec![0u32; self.limbs.len() - limb_shift];
            for i in 0..out.len() {
                let lo = self.limbs[i + limb_shift] as u64 >> bit_shift;
                let hi = if bit_shift > 0 && i + limb_shift + 1 < self.limbs.len() {
                    (self.limbs[i + limb_shift + 1] as u64) << (32 - bit_shift)
                } else {
                    0
                };
                out[i] = ((lo | hi) & 0xFFFF_FFFF) as u32;
            }
            BigInt { sign: Sign::Positive, limbs: out }.normalize()
        } else {
            // arithmetic shift of a negative value: (x >> n) == (x - ((1<<n)-1)) / (1<<n) for x<0, rounding toward -inf.
            let one = BigInt::from_i64(1);
            let divisor = one.shl(bits);
            let adjustment = divisor.sub(&one);
            self.sub(&adjustment).div(&divisor).expect("divisor is never zero")
        }
    }

    /// The spec defines unsigned right shift to fail outright: there is no
    /// bounded-width unsigned representation to shift into for an
    /// arbitrary-precision integer.
    pub fn unsigned_shr_unsupported() -> CoreError {
        CoreError::Type(TypeError::IncompatibleKinds {
            op: ">>>",
            lhs: "bigint",
            rhs: "bigint",
        })
    }

    // -- width-wrap primitives (§4.3) -----------------------------------------

    pub fn as_int_n(&self, bits: u32) -> Result<BigInt, CoreError> {
        if bits == 0 {
            return Err(CoreError::Range(RangeError::InvalidWidth(bits)));
        }
        let unsigned = self.as_uint_n(bits)?;
        let sign_bit_set = unsigned.test_bit(bits - 1);
        if sign_bit_set {
            Ok(unsigned.sub(&BigInt::from_i64(1).shl(bits)))
        } else {
            Ok(unsigned)
        }
    }

    pub fn as_uint_n(&self, bits: u32) -> Result<BigInt, CoreError> {
        if bits == 0 {
            return Err(CoreError::Range(RangeError::InvalidWidth(bits)));
        }
        let modulus = BigInt::from_i64(1).shl(bits);
        let r = self.rem(&modulus).expect("power-of-two modulus is never zero");
        let r = if r.sign == Sign::Negative { r.add(&modulus) } else { r };
        Ok(r.normalize())
    }

    fn test_bit(&self, bit: u32) -> bool {
        let limb = (bit / 32) as usize;
        let offset = bit % 32;
        self.limbs.get(limb).map(|l| (l >> offset) & 1 == 1).unwrap_or(false)
    }

    // -- comparison (§4.3: never coerces, NaN compares false on both sides) --

    pub fn compare(&self, other: &BigInt) -> Ordering {
        match (self.sign, other.sign) {
            (Sign::Positive, Sign::Negative) => Ordering::Greater,
            (Sign::Negative, Sign::Positive) => Ordering::Less,
            (Sign::Positive, Sign::Positive) => Self::cmp_mag(&self.limbs, &other.limbs),
            (Sign::Negative, Sign::Negative) => Self::cmp_mag(&other.limbs, &self.limbs),
        }
    }

    /// Compares against a float without coercion, per §4.3's comparison
    /// exception to the mixed-type rule. `NaN` makes every comparison false,
    /// modeled by returning `None`.
    pub fn compare_to_number(&self, rhs: f64) -> Option<Ordering> {
        if rhs.is_nan() {
            return None;
        }
        if !rhs.is_finite() {
            return Some(if rhs > 0.0 { Ordering::Less } else { Ordering::Greater });
        }
        // Compare via string-free exact arithmetic: split rhs into integer
        // and fractional parts; fall back to float comparison of the
        // truncated self against rhs when exactness isn't needed for '<'/'>'.
        let truncated = rhs.trunc();
        let self_f = self.to_f64_lossy();
        if self_f != truncated {
            return self_f.partial_cmp(&rhs);
        }
        // equal integer parts: break the tie using the fractional remainder
        Some(0.0.partial_cmp(&(rhs - truncated)).unwrap())
    }

    fn to_f64_lossy(&self) -> f64 {
        let mut acc = 0f64;
        for &limb in self.limbs.iter().rev() {
            acc = acc * 4294967296.0 + limb as f64;
        }
        if self.sign == Sign::Negative { -acc } else { acc }
    }
}

fn from_twos_complement(mut limbs: Vec<u32>, negative: bool) -> BigInt {
    if !negative {
        while limbs.last() == Some(&0) {
            limbs.pop();
        }
        return BigInt { sign: Sign::Positive, limbs }.normalize();
    }
    // invert and add one to recover the magnitude
    let mut carry = 1u64;
    for limb in limbs.iter_mut() {
        let inverted = !*limb as u64;
        let sum = inverted + carry;
        *limb = (sum & 0xFFFF_FFFF) as u32;
        carry = sum >> 32;
    }
    while limbs.last() == Some(&0) {
        limbs.pop();
    }
    BigInt { sign: Sign::Negative, limbs }.normalize()
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0n");
        }
        // repeated division by 10 on the magnitude for decimal digits
        let mut digits = vec![];
        let mut mag = self.limbs.clone();
        let ten = vec![10u32];
        while !mag.is_empty() {
            let (q, r) = BigInt::divmod_mag(&mag, &ten);
            digits.push(r.first().copied().unwrap_or(0) as u8);
            mag = q;
        }
        if self.sign == Sign::Negative {
            write!(f, "-")?;
        }
        for d in digits.iter().rev() {
            write!(f, "{d}")?;
        }
        write!(f, "n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_rounds_toward_zero_with_dividend_sign_remainder() {
        let a = BigInt::from_i64(-7);
        let b = BigInt::from_i64(2);
        assert_eq!(a.div(&b).unwrap(), BigInt::from_i64(-3));
        assert_eq!(a.rem(&b).unwrap(), BigInt::from_i64(-1));
    }

    #[test]
    fn division_identity_holds() {
        for (a, b) in [(17, 5), (-17, 5), (17, -5), (-17, -5), (100, 7)] {
            let a = BigInt::from_i64(a);
            let b = BigInt::from_i64(b);
            let q = a.div(&b).unwrap();
            let r = a.rem(&b).unwrap();
            assert_eq!(q.mul(&b).add(&r), a);
        }
    }

    #[test]
    fn as_uint_n_is_idempotent() {
        for x in [-5i64, 0, 5, 255, -255, 1000] {
            let v = BigInt::from_i64(x);
            let once = v.as_uint_n(8).unwrap();
            let twice = once.as_uint_n(8).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn as_int_n_wraps_two_complement() {
        let v = BigInt::from_i64(200);
        assert_eq!(v.as_int_n(8).unwrap(), BigInt::from_i64(200 - 256));
    }

    #[test]
    fn negative_exponent_is_range_error() {
        let base = BigInt::from_i64(2);
        assert!(matches!(base.pow(-1), Err(CoreError::Range(_))));
    }

    #[test]
    fn parses_radix_prefixed_literals() {
        assert_eq!(BigInt::parse("0x1A").unwrap(), BigInt::from_i64(26));
        assert_eq!(BigInt::parse("0b101").unwrap(), BigInt::from_i64(5));
        assert_eq!(BigInt::parse("0o17").unwrap(), BigInt::from_i64(15));
        assert_eq!(BigInt::parse("42").unwrap(), BigInt::from_i64(42));
        assert_eq!(BigInt::parse("-9").unwrap(), BigInt::from_i64(-9));
    }

    #[test]
    fn comparison_never_coerces_and_nan_is_always_false() {
        let v = BigInt::from_i64(3);
        assert_eq!(v.compare_to_number(3.5), Some(Ordering::Less));
        assert_eq!(v.compare_to_number(f64::NAN), None);
    }

    #[test]
    fn bitwise_not_matches_negate_minus_one() {
        let v = BigInt::from_i64(5);
        assert_eq!(v.not(), BigInt::from_i64(-6));
    }

    #[test]
    fn shift_roundtrips_for_positive_values() {
        let v = BigInt::from_i64(1234);
        assert_eq!(v.shl(10).shr(10), v);
    }

    #[test]
    fn multiplication_matches_known_products() {
        assert_eq!(BigInt::from_i64(123456).mul(&BigInt::from_i64(789012)), BigInt::from_i64(123456 * 789012));
    }
}
