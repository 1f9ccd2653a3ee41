//! The sign position of a MIX word.
//!
//! MIX words are sign-magnitude: one sign bit sits in front of the five
//! data bytes. The bit encoding used in memory is:
//! - `0` = `+` (Plus)
//! - `1` = `-` (Minus)

use std::fmt;
use std::ops::Neg;
use serde::{Serialize, Deserialize};

/// The sign of a word, register or field view.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Sign {
    /// Positive (bit value 0)
    #[default]
    Plus = 0,
    /// Negative (bit value 1)
    Minus = 1,
}

impl Sign {
    /// Both signs, plus first.
    pub const ALL: [Sign; 2] = [Sign::Plus, Sign::Minus];

    /// Create a sign from the raw sign bit.
    #[inline]
    pub const fn from_bit(bit: u32) -> Self {
        if bit & 1 == 0 {
            Sign::Plus
        } else {
            Sign::Minus
        }
    }

    /// The raw sign bit.
    #[inline]
    pub const fn to_bit(self) -> u32 {
        self as u32
    }

    /// The sign of a signed integer. Zero is `Plus`.
    #[inline]
    pub const fn of(value: i64) -> Self {
        if value < 0 {
            Sign::Minus
        } else {
            Sign::Plus
        }
    }

    /// +1 or -1.
    #[inline]
    pub const fn to_i64(self) -> i64 {
        match self {
            Sign::Plus => 1,
            Sign::Minus => -1,
        }
    }

    /// Flip the sign.
    #[inline]
    pub const fn flip(self) -> Self {
        match self {
            Sign::Plus => Sign::Minus,
            Sign::Minus => Sign::Plus,
        }
    }

    /// Sign of a product or quotient: minus when exactly one operand is minus.
    #[inline]
    pub const fn xor(self, other: Sign) -> Self {
        Sign::from_bit(self.to_bit() ^ other.to_bit())
    }

    /// Is this the negative sign?
    #[inline]
    pub const fn is_minus(self) -> bool {
        matches!(self, Sign::Minus)
    }

    /// The character used in listings.
    #[inline]
    pub const fn to_char(self) -> char {
        match self {
            Sign::Plus => '+',
            Sign::Minus => '-',
        }
    }

    /// Parse `+` or `-`.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Sign::Plus),
            '-' => Some(Sign::Minus),
            _ => None,
        }
    }
}

impl Neg for Sign {
    type Output = Sign;

    fn neg(self) -> Sign {
        self.flip()
    }
}

impl fmt::Debug for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}
