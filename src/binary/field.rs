//! Field specifications and field views.
//!
//! A field specification `(L:R)` selects bytes L..R of a word, where
//! position 0 is the sign. It is packed into one byte as `8*L + R`.
//!
//! Field views are plain values: [`extract`] reads a field out of a word
//! and right-justifies it, [`insert`] writes the low bytes of a value into
//! a field of another word and returns the result. Neither shares storage
//! with its source.

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::binary::{Sign, Word};

/// A validated field specification `(L:R)` with `0 <= L <= R <= 5`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSpec {
    l: u8,
    r: u8,
}

impl FieldSpec {
    /// The whole word, `(0:5)`.
    pub const FULL: FieldSpec = FieldSpec { l: 0, r: 5 };

    /// The sign and the two low-order address bytes, `(0:2)`.
    pub const ADDRESS: FieldSpec = FieldSpec { l: 0, r: 2 };

    /// The sign only, `(0:0)`.
    pub const SIGN: FieldSpec = FieldSpec { l: 0, r: 0 };

    /// Create a field specification, rejecting `R > 5` and `L > R`.
    pub fn new(l: u8, r: u8) -> Result<Self, FieldError> {
        if r as usize > Word::BYTES {
            return Err(FieldError::RightOutOfRange { l, r });
        }
        if l > r {
            return Err(FieldError::Reversed { l, r });
        }
        Ok(Self { l, r })
    }

    /// Decode the packed form `8*L + R`.
    pub fn from_byte(f: u8) -> Result<Self, FieldError> {
        Self::new(f / 8, f % 8)
    }

    /// The packed form `8*L + R`.
    #[inline]
    pub const fn to_byte(self) -> u8 {
        8 * self.l + self.r
    }

    /// Left bound.
    #[inline]
    pub const fn left(self) -> u8 {
        self.l
    }

    /// Right bound.
    #[inline]
    pub const fn right(self) -> u8 {
        self.r
    }

    /// Does the field cover the sign position?
    #[inline]
    pub const fn includes_sign(self) -> bool {
        self.l == 0
    }

    /// First data byte covered (the sign position is skipped).
    #[inline]
    const fn first_byte(self) -> u8 {
        if self.l == 0 { 1 } else { self.l }
    }

    /// Number of data bytes covered, 0 for `(0:0)`.
    #[inline]
    pub const fn width(self) -> u32 {
        if self.r == 0 {
            0
        } else {
            (self.r - self.first_byte() + 1) as u32
        }
    }

    /// Bit mask of the covered bytes, in place within the magnitude.
    fn mask(self) -> u32 {
        let bits = self.width() * Word::BYTE_BITS;
        if bits == 0 {
            return 0;
        }
        (((1u64 << bits) - 1) as u32) << self.shift()
    }

    /// Distance from the field's rightmost byte to the low end of the word.
    #[inline]
    fn shift(self) -> u32 {
        (Word::BYTES as u32 - self.r as u32) * Word::BYTE_BITS
    }
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self::FULL
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.l, self.r)
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.l, self.r)
    }
}

/// Read field `spec` of `word` as a right-justified value.
///
/// The result carries the word's sign when the field includes position 0
/// and is positive otherwise.
pub fn extract(word: Word, spec: FieldSpec) -> Word {
    let magnitude = (word.magnitude() & spec.mask()) >> spec.shift();
    let sign = if spec.includes_sign() { word.sign() } else { Sign::Plus };
    Word::from_parts(sign, magnitude)
}

/// Write the low-order bytes of `value` into field `spec` of `dst`.
///
/// Bytes outside the field keep their values. The sign of `dst` is
/// replaced by the sign of `value` only when the field includes position 0.
/// A value narrower than the field supplies zero bytes on the high side.
pub fn insert(dst: Word, spec: FieldSpec, value: Word) -> Word {
    let mask = spec.mask();
    let magnitude = (dst.magnitude() & !mask) | ((value.magnitude() << spec.shift()) & mask);
    let sign = if spec.includes_sign() { value.sign() } else { dst.sign() };
    Word::from_parts(sign, magnitude)
}

/// Errors for malformed field specifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field ({l}:{r}) ends past byte 5")]
    RightOutOfRange { l: u8, r: u8 },

    #[error("field ({l}:{r}) has its left bound after its right bound")]
    Reversed { l: u8, r: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cell() -> Word {
        Word::compose([1, 2, 3, 4, 5], Sign::Minus)
    }

    fn spec(l: u8, r: u8) -> FieldSpec {
        FieldSpec::new(l, r).unwrap()
    }

    #[test]
    fn test_field_byte_roundtrip() {
        assert_eq!(FieldSpec::from_byte(5).unwrap(), FieldSpec::FULL);
        assert_eq!(FieldSpec::from_byte(13).unwrap(), spec(1, 5));
        assert_eq!(spec(4, 5).to_byte(), 37);
        assert_eq!(FieldSpec::ADDRESS.to_byte(), 2);
    }

    #[test]
    fn test_field_rejects_bad_specs() {
        assert_eq!(FieldSpec::from_byte(6), Err(FieldError::RightOutOfRange { l: 0, r: 6 }));
        assert_eq!(FieldSpec::from_byte(8 * 3 + 2), Err(FieldError::Reversed { l: 3, r: 2 }));
        assert!(FieldSpec::new(7, 5).is_err());
    }

    #[test]
    fn test_extract_with_sign() {
        assert_eq!(extract(cell(), FieldSpec::FULL), cell());
        assert_eq!(extract(cell(), spec(0, 3)), Word::compose([0, 0, 1, 2, 3], Sign::Minus));
        assert_eq!(extract(cell(), FieldSpec::SIGN), Word::ZERO.negate());
    }

    #[test]
    fn test_extract_without_sign() {
        assert_eq!(extract(cell(), spec(4, 5)), Word::compose([0, 0, 0, 4, 5], Sign::Plus));
        assert_eq!(extract(cell(), spec(1, 5)), cell().negate());
        assert_eq!(extract(cell(), spec(3, 3)).to_i64(), 3);
    }

    #[test]
    fn test_insert_keeps_sign_outside_field() {
        let a = Word::compose([6, 7, 8, 9, 0], Sign::Plus);
        assert_eq!(insert(cell(), spec(2, 3), a), Word::compose([1, 9, 0, 4, 5], Sign::Minus));
        assert_eq!(insert(cell(), spec(5, 5), a), Word::compose([1, 2, 3, 4, 0], Sign::Minus));
    }

    #[test]
    fn test_insert_with_sign() {
        let a = Word::compose([6, 7, 8, 9, 0], Sign::Plus);
        assert_eq!(insert(cell(), FieldSpec::FULL, a), a);
        assert_eq!(insert(cell(), spec(0, 1), a), Word::compose([0, 2, 3, 4, 5], Sign::Plus));
        assert_eq!(insert(cell(), FieldSpec::SIGN, a), cell().negate());
    }

    #[test]
    fn test_insert_pads_narrow_value() {
        // A half-width index value: bytes 1-3 are always zero.
        let i1 = Word::compose([0, 0, 0, 9, 9], Sign::Plus);
        assert_eq!(insert(cell(), FieldSpec::FULL, i1), i1);
        assert_eq!(insert(cell(), spec(0, 3), i1), Word::compose([0, 9, 9, 4, 5], Sign::Plus));
    }

    proptest! {
        #[test]
        fn prop_self_copy_is_identity(bits in 0u32..(1 << 31), l in 0u8..=5, r in 0u8..=5) {
            prop_assume!(l <= r);
            let w = Word::from_bits(bits);
            let s = FieldSpec::new(l, r).unwrap();
            prop_assert_eq!(insert(w, s, extract(w, s)), w);
        }

        #[test]
        fn prop_sign_inclusion(bits in 0u32..(1 << 31), l in 0u8..=5, r in 0u8..=5) {
            prop_assume!(l <= r);
            let w = Word::from_bits(bits);
            let view = extract(w, FieldSpec::new(l, r).unwrap());
            if l == 0 {
                prop_assert_eq!(view.sign(), w.sign());
            } else {
                prop_assert_eq!(view.sign(), Sign::Plus);
            }
        }
    }
}
