//! MIX registers and scalar machine state.
//!
//! The register file holds:
//! - A: accumulator (sign + 5 bytes)
//! - X: extension (sign + 5 bytes)
//! - I1..I6: index registers (sign + 2 bytes)
//! - J: jump register (2 bytes, always positive)
//!
//! plus the program counter, the overflow toggle and the comparison
//! indicator.

use std::fmt;
use serde::{Serialize, Deserialize};
use crate::binary::{Sign, Word};

/// Register identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    A,
    I1,
    I2,
    I3,
    I4,
    I5,
    I6,
    X,
    J,
}

/// Storage width of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// Sign and five bytes.
    Full,
    /// Sign and two bytes.
    Half,
}

impl Width {
    /// Largest magnitude a register of this width can hold.
    pub const fn max_magnitude(self) -> u32 {
        match self {
            Width::Full => Word::MAX_MAGNITUDE,
            Width::Half => (1 << (2 * Word::BYTE_BITS)) - 1,
        }
    }
}

impl Register {
    /// The eight registers addressed by opcode offsets 0..=7 in the load,
    /// store, jump, address-transfer and compare families.
    pub const OPERAND_ORDER: [Register; 8] = [
        Register::A,
        Register::I1,
        Register::I2,
        Register::I3,
        Register::I4,
        Register::I5,
        Register::I6,
        Register::X,
    ];

    /// Register selected by an opcode offset (0 = A, 1..=6 = I1..I6, 7 = X).
    pub fn from_offset(offset: u8) -> Option<Self> {
        Self::OPERAND_ORDER.get(offset as usize).copied()
    }

    /// Offset of this register within an opcode family. J has none.
    pub fn offset(self) -> Option<u8> {
        Self::OPERAND_ORDER.iter().position(|&r| r == self).map(|i| i as u8)
    }

    /// Index register selected by an instruction's index byte (1..=6).
    pub fn index(n: u8) -> Option<Self> {
        match n {
            1..=6 => Self::from_offset(n),
            _ => None,
        }
    }

    /// Storage width.
    pub const fn width(self) -> Width {
        match self {
            Register::A | Register::X => Width::Full,
            _ => Width::Half,
        }
    }

    /// Name used in mnemonics: `A`, `1`..`6`, `X`, `J`.
    pub const fn suffix(self) -> &'static str {
        match self {
            Register::A => "A",
            Register::I1 => "1",
            Register::I2 => "2",
            Register::I3 => "3",
            Register::I4 => "4",
            Register::I5 => "5",
            Register::I6 => "6",
            Register::X => "X",
            Register::J => "J",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::A | Register::X | Register::J => write!(f, "r{}", self.suffix()),
            _ => write!(f, "rI{}", self.suffix()),
        }
    }
}

/// Result of the most recent comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
}

impl From<std::cmp::Ordering> for Comparison {
    fn from(ordering: std::cmp::Ordering) -> Self {
        match ordering {
            std::cmp::Ordering::Less => Comparison::Less,
            std::cmp::Ordering::Equal => Comparison::Equal,
            std::cmp::Ordering::Greater => Comparison::Greater,
        }
    }
}

/// The MIX register file and status flags.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    a: Word,
    x: Word,
    i: [Word; 6],
    j: Word,

    /// Address of the next instruction to fetch.
    pub pc: u16,

    /// Sticky overflow toggle.
    pub overflow: bool,

    /// Comparison indicator; `None` until the first compare.
    pub comparison: Option<Comparison>,
}

impl Registers {
    /// Create a register file with everything zeroed.
    pub fn new() -> Self {
        Self {
            a: Word::ZERO,
            x: Word::ZERO,
            i: [Word::ZERO; 6],
            j: Word::ZERO,
            pc: 0,
            overflow: false,
            comparison: None,
        }
    }

    /// Reset all registers and flags to zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read a register. Half registers read as words with bytes 1-3 zero.
    #[inline]
    pub fn get(&self, reg: Register) -> Word {
        match reg {
            Register::A => self.a,
            Register::X => self.x,
            Register::J => self.j,
            Register::I1 => self.i[0],
            Register::I2 => self.i[1],
            Register::I3 => self.i[2],
            Register::I4 => self.i[3],
            Register::I5 => self.i[4],
            Register::I6 => self.i[5],
        }
    }

    /// Write a register.
    ///
    /// Half registers keep only the two low-order bytes of `value`. J is
    /// always stored with a positive sign.
    pub fn set(&mut self, reg: Register, value: Word) {
        let magnitude = value.magnitude() & reg.width().max_magnitude();
        let sign = if reg == Register::J { Sign::Plus } else { value.sign() };
        let value = Word::from_parts(sign, magnitude);
        match reg {
            Register::A => self.a = value,
            Register::X => self.x = value,
            Register::J => self.j = value,
            Register::I1 => self.i[0] = value,
            Register::I2 => self.i[1] = value,
            Register::I3 => self.i[2] = value,
            Register::I4 => self.i[3] = value,
            Register::I5 => self.i[4] = value,
            Register::I6 => self.i[5] = value,
        }
    }

    /// Write a register, reporting whether `value` was too wide for it.
    pub fn set_checked(&mut self, reg: Register, value: Word) -> bool {
        let overflowed = value.magnitude() > reg.width().max_magnitude();
        self.set(reg, value);
        overflowed
    }

    /// Accumulator.
    #[inline]
    pub fn a(&self) -> Word {
        self.a
    }

    /// Extension register.
    #[inline]
    pub fn x(&self) -> Word {
        self.x
    }

    /// Jump register.
    #[inline]
    pub fn j(&self) -> Word {
        self.j
    }

    /// Raise the overflow toggle. It stays up until a JOV or JNOV.
    #[inline]
    pub fn raise_overflow(&mut self) {
        self.overflow = true;
    }

    /// Read and clear the overflow toggle.
    #[inline]
    pub fn take_overflow(&mut self) -> bool {
        std::mem::take(&mut self.overflow)
    }

    /// Compute an effective address from an instruction's address field and
    /// index byte.
    ///
    /// With no index the address word is returned unchanged, so a `-0`
    /// address stays `-0`. Otherwise the index register is added; a zero
    /// sum takes the sign of the address.
    pub fn effective_address(&self, address: Word, index: Option<Register>) -> Word {
        match index {
            None => address,
            Some(reg) => {
                let sum = address.to_i64() + self.get(reg).to_i64();
                let sign = if sum == 0 { address.sign() } else { Sign::of(sum) };
                Word::from_parts(sign, sum.unsigned_abs() as u32)
            }
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registers")
            .field("a", &self.a)
            .field("x", &self.x)
            .field("i", &self.i)
            .field("j", &self.j)
            .field("pc", &self.pc)
            .field("overflow", &self.overflow)
            .field("comparison", &self.comparison)
            .finish()
    }
}
