//! Word arithmetic.
//!
//! Addition, multiplication, division and byte shifting for sign-magnitude
//! words. These are pure functions; the execution engine decides which
//! registers receive the results and when the overflow toggle is raised.

use std::cmp::Ordering;
use crate::binary::{Sign, Word};

/// Add two words, returning (sum, overflowed).
///
/// On overflow the sum holds the low 30 bits of the true magnitude with the
/// sign of the true sum. A zero sum keeps the sign of `a`.
pub fn add(a: Word, b: Word) -> (Word, bool) {
    add_within(a, b, Word::MAX_MAGNITUDE)
}

/// Subtract `b` from `a`, returning (difference, overflowed).
#[inline]
pub fn subtract(a: Word, b: Word) -> (Word, bool) {
    add(a, b.negate())
}

/// Add two words whose result must fit in `max_magnitude`.
///
/// Used for half-width registers, where the limit is two bytes.
pub fn add_within(a: Word, b: Word, max_magnitude: u32) -> (Word, bool) {
    let sum = a.to_i64() + b.to_i64();
    let magnitude = sum.unsigned_abs();
    let overflowed = magnitude > max_magnitude as u64;
    let kept = (magnitude & max_magnitude as u64) as u32;
    let sign = if sum == 0 { a.sign() } else { Sign::of(sum) };
    (Word::from_parts(sign, kept), overflowed)
}

/// Multiply two words, returning the 60-bit product as (high, low).
///
/// Both halves carry the sign of the product, even when zero.
pub fn multiply(a: Word, b: Word) -> (Word, Word) {
    let product = a.magnitude() as u64 * b.magnitude() as u64;
    let sign = a.sign().xor(b.sign());
    let high = (product >> Word::MAGNITUDE_BITS) as u32;
    let low = (product & Word::MAX_MAGNITUDE as u64) as u32;
    (Word::from_parts(sign, high), Word::from_parts(sign, low))
}

/// Divide the 60-bit value (high, low) by `divisor`.
///
/// The dividend's sign is the sign of `high`. Returns (quotient, remainder),
/// or `None` if the divisor is zero or the quotient needs more than 30 bits.
/// The quotient takes the sign of the division, the remainder the sign of
/// the dividend.
pub fn divide(high: Word, low: Word, divisor: Word) -> Option<(Word, Word)> {
    if divisor.is_zero() {
        return None;
    }
    let dividend = ((high.magnitude() as u64) << Word::MAGNITUDE_BITS) | low.magnitude() as u64;
    let denominator = divisor.magnitude() as u64;
    let quotient = dividend / denominator;
    if quotient > Word::MAX_MAGNITUDE as u64 {
        return None;
    }
    let remainder = dividend % denominator;
    let dividend_sign = high.sign();
    Some((
        Word::from_parts(dividend_sign.xor(divisor.sign()), quotient as u32),
        Word::from_parts(dividend_sign, remainder as u32),
    ))
}

/// Shift a run of bytes left (`left == true`) or right by `count` places.
///
/// Vacated positions become zero, or receive the bytes pushed out of the
/// other end when `circular` is set. `count` is reduced modulo the run
/// length.
pub fn shift_bytes(bytes: &mut [u8], count: usize, left: bool, circular: bool) {
    let len = bytes.len();
    if len == 0 {
        return;
    }
    let count = count % len;
    if count == 0 {
        return;
    }
    if left {
        bytes.rotate_left(count);
        if !circular {
            bytes[len - count..].fill(0);
        }
    } else {
        bytes.rotate_right(count);
        if !circular {
            bytes[..count].fill(0);
        }
    }
}

/// Numeric comparison; -0 equals +0.
#[inline]
pub fn compare(a: Word, b: Word) -> Ordering {
    a.to_i64().cmp(&b.to_i64())
}
