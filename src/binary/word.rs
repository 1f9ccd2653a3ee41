//! The MIX machine word.
//!
//! A word is one sign plus five six-bit bytes, a 30-bit magnitude. In
//! memory it is packed into a `u32`:
//!
//! ```text
//!  bit 30   29..24  23..18  17..12  11..6   5..0
//!  sign     byte 1  byte 2  byte 3  byte 4  byte 5
//! ```
//!
//! Byte 1 is the most significant. Negative zero is a distinct bit
//! pattern, so `Word` equality is structural; use [`Word::to_i64`] for
//! numeric comparisons, where `-0 == +0`.

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::binary::Sign;

/// A sign-magnitude MIX word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Word(u32);

impl Word {
    /// Number of data bytes in a word.
    pub const BYTES: usize = 5;

    /// Bits per MIX byte.
    pub const BYTE_BITS: u32 = 6;

    /// Largest value a single byte can hold.
    pub const BYTE_MAX: u8 = 63;

    /// Number of magnitude bits.
    pub const MAGNITUDE_BITS: u32 = 30;

    /// Largest representable magnitude: 2^30 - 1.
    pub const MAX_MAGNITUDE: u32 = (1 << Self::MAGNITUDE_BITS) - 1;

    const SIGN_BIT: u32 = 1 << Self::MAGNITUDE_BITS;
    const BYTE_MASK: u32 = (1 << Self::BYTE_BITS) - 1;

    /// Positive zero.
    pub const ZERO: Word = Word(0);

    /// Create a positive zero word.
    #[inline]
    pub const fn zero() -> Self {
        Self::ZERO
    }

    /// Build a word from a sign and a magnitude.
    ///
    /// Only the low 30 bits of `magnitude` are kept.
    #[inline]
    pub const fn from_parts(sign: Sign, magnitude: u32) -> Self {
        Self((sign.to_bit() << Self::MAGNITUDE_BITS) | (magnitude & Self::MAX_MAGNITUDE))
    }

    /// Pack five bytes (byte 1 first) and a sign into a word.
    ///
    /// A byte above 63 cannot be represented and is stored as 0.
    pub fn compose(bytes: [u8; 5], sign: Sign) -> Self {
        let magnitude = bytes.iter().fold(0u32, |acc, &b| {
            let b = if b > Self::BYTE_MAX { 0 } else { b as u32 };
            (acc << Self::BYTE_BITS) | b
        });
        Self::from_parts(sign, magnitude)
    }

    /// Split a word into its five bytes (byte 1 first) and its sign.
    pub fn decompose(&self) -> ([u8; 5], Sign) {
        (self.bytes(), self.sign())
    }

    /// The five data bytes, byte 1 first.
    pub fn bytes(&self) -> [u8; 5] {
        let mut out = [0u8; 5];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.byte(i + 1);
        }
        out
    }

    /// Get the byte at `position` (1 = most significant, 5 = least).
    ///
    /// # Panics
    /// Panics if position is not in 1..=5.
    #[inline]
    pub fn byte(&self, position: usize) -> u8 {
        assert!(
            (1..=Self::BYTES).contains(&position),
            "byte position {} out of range (1-5)",
            position
        );
        let shift = (Self::BYTES - position) as u32 * Self::BYTE_BITS;
        ((self.magnitude() >> shift) & Self::BYTE_MASK) as u8
    }

    /// The raw packed bits (sign in bit 30).
    #[inline]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Rebuild a word from packed bits. Bits above the sign are dropped.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & (Self::SIGN_BIT | Self::MAX_MAGNITUDE))
    }

    /// The sign of the word. Negative zero reports `Minus`.
    #[inline]
    pub const fn sign(&self) -> Sign {
        Sign::from_bit(self.0 >> Self::MAGNITUDE_BITS)
    }

    /// The unsigned 30-bit magnitude.
    #[inline]
    pub const fn magnitude(&self) -> u32 {
        self.0 & Self::MAX_MAGNITUDE
    }

    /// Flip the sign, leaving the magnitude alone.
    #[inline]
    pub const fn negate(&self) -> Self {
        Self(self.0 ^ Self::SIGN_BIT)
    }

    /// True for both +0 and -0.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.magnitude() == 0
    }

    /// Numeric value. -0 reads as 0.
    #[inline]
    pub fn to_i64(&self) -> i64 {
        self.sign().to_i64() * self.magnitude() as i64
    }

    /// Create from a signed integer.
    ///
    /// Fails if the magnitude does not fit in 30 bits.
    pub fn from_i64(value: i64) -> Result<Self, WordError> {
        let magnitude = value.unsigned_abs();
        if magnitude > Self::MAX_MAGNITUDE as u64 {
            return Err(WordError::MagnitudeOverflow(value));
        }
        Ok(Self::from_parts(Sign::of(value), magnitude as u32))
    }

    /// Parse either the listing form `+ 01 02 03 04 05` or a signed
    /// decimal such as `-12345`.
    pub fn parse(s: &str) -> Result<Self, WordError> {
        let s = s.trim();
        let tokens: Vec<&str> = s.split_whitespace().collect();

        if tokens.len() > 1 {
            let mut chars = s.chars();
            let sign = chars
                .next()
                .and_then(Sign::from_char)
                .ok_or_else(|| WordError::Syntax(s.to_string()))?;
            let fields: Vec<&str> = chars.as_str().split_whitespace().collect();
            if fields.len() != Self::BYTES {
                return Err(WordError::WrongLength { expected: Self::BYTES, got: fields.len() });
            }
            let mut bytes = [0u8; 5];
            for (slot, text) in bytes.iter_mut().zip(fields) {
                let value: u8 = text
                    .parse()
                    .map_err(|_| WordError::Syntax(text.to_string()))?;
                if value > Self::BYTE_MAX {
                    return Err(WordError::InvalidByte(value));
                }
                *slot = value;
            }
            return Ok(Self::compose(bytes, sign));
        }

        let value: i64 = s.parse().map_err(|_| WordError::Syntax(s.to_string()))?;
        let word = Self::from_i64(value)?;
        // "-0" keeps its sign
        if value == 0 && s.starts_with('-') {
            return Ok(word.negate());
        }
        Ok(word)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({} = {})", self, self.to_i64())
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sign())?;
        for b in self.bytes() {
            write!(f, " {:02}", b)?;
        }
        Ok(())
    }
}

impl std::ops::Neg for Word {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Word::negate(&self)
    }
}

impl FromStr for Word {
    type Err = WordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Word::parse(s)
    }
}

/// Errors from building or parsing words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WordError {
    #[error("value {0} does not fit in a 30-bit magnitude")]
    MagnitudeOverflow(i64),

    #[error("byte value {0} exceeds 63")]
    InvalidByte(u8),

    #[error("expected {expected} bytes, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("cannot parse word from {0:?}")]
    Syntax(String),
}
