//! Instruction decoder for MIX.
//!
//! An instruction word has the layout
//!
//! ```text
//!   0   1   2   3   4   5
//! | ± | A | A | I | F | C |
//! ```
//!
//! - `±AA`: address (sign and two bytes)
//! - `I`: index register selector, 0 for none or 1..=6
//! - `F`: modifier; a field specification `8*L + R` for the load, store,
//!   arithmetic and compare families, a variant selector elsewhere
//! - `C`: operation code

use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::binary::{extract, FieldError, FieldSpec, Sign, Word};
use crate::cpu::registers::Register;

/// Variants of the shift instruction (opcode 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftKind {
    /// Shift A left.
    Sla,
    /// Shift A right.
    Sra,
    /// Shift AX left.
    Slax,
    /// Shift AX right.
    Srax,
    /// Shift AX left circularly.
    Slc,
    /// Shift AX right circularly.
    Src,
}

impl ShiftKind {
    const ALL: [ShiftKind; 6] = [
        ShiftKind::Sla,
        ShiftKind::Sra,
        ShiftKind::Slax,
        ShiftKind::Srax,
        ShiftKind::Slc,
        ShiftKind::Src,
    ];

    pub fn from_modifier(f: u8) -> Option<Self> {
        Self::ALL.get(f as usize).copied()
    }

    pub fn modifier(self) -> u8 {
        self as u8
    }

    pub fn is_left(self) -> bool {
        matches!(self, ShiftKind::Sla | ShiftKind::Slax | ShiftKind::Slc)
    }

    /// Does the shift run through X as well as A?
    pub fn includes_x(self) -> bool {
        !matches!(self, ShiftKind::Sla | ShiftKind::Sra)
    }

    pub fn is_circular(self) -> bool {
        matches!(self, ShiftKind::Slc | ShiftKind::Src)
    }
}

/// Conditions tested by opcode 39.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpCondition {
    /// Unconditional.
    Jmp,
    /// Unconditional, J untouched.
    Jsj,
    /// Overflow toggle on.
    Jov,
    /// Overflow toggle off.
    Jnov,
    Jl,
    Je,
    Jg,
    Jge,
    Jne,
    Jle,
}

impl JumpCondition {
    const ALL: [JumpCondition; 10] = [
        JumpCondition::Jmp,
        JumpCondition::Jsj,
        JumpCondition::Jov,
        JumpCondition::Jnov,
        JumpCondition::Jl,
        JumpCondition::Je,
        JumpCondition::Jg,
        JumpCondition::Jge,
        JumpCondition::Jne,
        JumpCondition::Jle,
    ];

    pub fn from_modifier(f: u8) -> Option<Self> {
        Self::ALL.get(f as usize).copied()
    }

    pub fn modifier(self) -> u8 {
        self as u8
    }
}

/// Conditions tested on a register by opcodes 40..=47.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterTest {
    Negative,
    Zero,
    Positive,
    NonNegative,
    NonZero,
    NonPositive,
}

impl RegisterTest {
    const ALL: [RegisterTest; 6] = [
        RegisterTest::Negative,
        RegisterTest::Zero,
        RegisterTest::Positive,
        RegisterTest::NonNegative,
        RegisterTest::NonZero,
        RegisterTest::NonPositive,
    ];

    pub fn from_modifier(f: u8) -> Option<Self> {
        Self::ALL.get(f as usize).copied()
    }

    pub fn modifier(self) -> u8 {
        self as u8
    }

    /// Does a register holding `value` satisfy the test? `-0` is zero.
    pub fn holds(self, value: i64) -> bool {
        match self {
            RegisterTest::Negative => value < 0,
            RegisterTest::Zero => value == 0,
            RegisterTest::Positive => value > 0,
            RegisterTest::NonNegative => value >= 0,
            RegisterTest::NonZero => value != 0,
            RegisterTest::NonPositive => value <= 0,
        }
    }

    /// Mnemonic suffix: `N`, `Z`, `P`, `NN`, `NZ`, `NP`.
    pub fn suffix(self) -> &'static str {
        match self {
            RegisterTest::Negative => "N",
            RegisterTest::Zero => "Z",
            RegisterTest::Positive => "P",
            RegisterTest::NonNegative => "NN",
            RegisterTest::NonZero => "NZ",
            RegisterTest::NonPositive => "NP",
        }
    }
}

/// Address transfer variants (opcodes 48..=55).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Inc,
    Dec,
    Ent,
    Enn,
}

impl TransferKind {
    const ALL: [TransferKind; 4] = [
        TransferKind::Inc,
        TransferKind::Dec,
        TransferKind::Ent,
        TransferKind::Enn,
    ];

    pub fn from_modifier(f: u8) -> Option<Self> {
        Self::ALL.get(f as usize).copied()
    }

    pub fn modifier(self) -> u8 {
        self as u8
    }
}

/// Input/output operations (opcodes 34..=38).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoOp {
    /// Jump if the unit is busy.
    Jbus,
    /// Device control.
    Ioc,
    /// Read a block into memory.
    In,
    /// Write a block from memory.
    Out,
    /// Jump if the unit is ready.
    Jred,
}

impl IoOp {
    const ALL: [IoOp; 5] = [IoOp::Jbus, IoOp::Ioc, IoOp::In, IoOp::Out, IoOp::Jred];

    fn from_opcode(opcode: u8) -> Option<Self> {
        opcode
            .checked_sub(Opcode::JBUS)
            .and_then(|i| Self::ALL.get(i as usize).copied())
    }

    fn opcode(self) -> u8 {
        Opcode::JBUS + self as u8
    }
}

/// The operation part of a decoded instruction.
///
/// One variant per instruction family; the modifier byte has already been
/// validated and turned into the family's own type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// No operation.
    Nop,

    // ==================== Arithmetic ====================

    /// A := A + V
    Add(FieldSpec),
    /// A := A - V
    Sub(FieldSpec),
    /// AX := A * V
    Mul(FieldSpec),
    /// A := AX / V, X := remainder
    Div(FieldSpec),

    // ==================== Special ====================

    /// Stop the machine.
    Halt,

    /// Byte shifts of A or AX.
    Shift(ShiftKind),

    /// Copy `count` words from the effective address to the address in I1.
    Move { count: u8 },

    // ==================== Data Transfer ====================

    /// reg := V
    Load { reg: Register, field: FieldSpec },
    /// reg := -V
    LoadNeg { reg: Register, field: FieldSpec },
    /// M[ea](field) := reg, for A, I1..I6, X and J
    Store { reg: Register, field: FieldSpec },
    /// M[ea](field) := 0
    StoreZero { field: FieldSpec },

    // ==================== Devices ====================

    Io { op: IoOp, unit: u8 },

    // ==================== Control Flow ====================

    Jump(JumpCondition),
    JumpRegister { reg: Register, test: RegisterTest },

    /// INC, DEC, ENT, ENN
    Transfer { reg: Register, kind: TransferKind },

    /// Compare a register field with a memory field.
    Compare { reg: Register, field: FieldSpec },
}

/// Opcode values.
struct Opcode;

impl Opcode {
    const NOP: u8 = 0;
    const ADD: u8 = 1;
    const SUB: u8 = 2;
    const MUL: u8 = 3;
    const DIV: u8 = 4;
    const SPECIAL: u8 = 5;
    const SHIFT: u8 = 6;
    const MOVE: u8 = 7;
    const LD: u8 = 8;
    const LDN: u8 = 16;
    const ST: u8 = 24;
    const STJ: u8 = 32;
    const STZ: u8 = 33;
    const JBUS: u8 = 34;
    const JRED: u8 = 38;
    const JMP: u8 = 39;
    const JREG: u8 = 40;
    const TRANSFER: u8 = 48;
    const CMP: u8 = 56;
}

/// Modifier values of the special opcode 5.
const NUM: u8 = 0;
const CHAR: u8 = 1;
const HLT: u8 = 2;

impl Operation {
    /// The (opcode, modifier) pair this operation encodes to.
    ///
    /// J only has an opcode in the store family (STJ); a load, jump,
    /// address transfer or compare naming J has none and yields `None`.
    pub fn code(&self) -> Option<(u8, u8)> {
        let family = |base: u8, reg: Register, modifier: u8| Some((base + reg.offset()?, modifier));
        match *self {
            Operation::Nop => Some((Opcode::NOP, 0)),
            Operation::Add(f) => Some((Opcode::ADD, f.to_byte())),
            Operation::Sub(f) => Some((Opcode::SUB, f.to_byte())),
            Operation::Mul(f) => Some((Opcode::MUL, f.to_byte())),
            Operation::Div(f) => Some((Opcode::DIV, f.to_byte())),
            Operation::Halt => Some((Opcode::SPECIAL, HLT)),
            Operation::Shift(kind) => Some((Opcode::SHIFT, kind.modifier())),
            Operation::Move { count } => Some((Opcode::MOVE, count)),
            Operation::Load { reg, field } => family(Opcode::LD, reg, field.to_byte()),
            Operation::LoadNeg { reg, field } => family(Opcode::LDN, reg, field.to_byte()),
            Operation::Store { reg: Register::J, field } => Some((Opcode::STJ, field.to_byte())),
            Operation::Store { reg, field } => family(Opcode::ST, reg, field.to_byte()),
            Operation::StoreZero { field } => Some((Opcode::STZ, field.to_byte())),
            Operation::Io { op, unit } => Some((op.opcode(), unit)),
            Operation::Jump(cond) => Some((Opcode::JMP, cond.modifier())),
            Operation::JumpRegister { reg, test } => family(Opcode::JREG, reg, test.modifier()),
            Operation::Transfer { reg, kind } => family(Opcode::TRANSFER, reg, kind.modifier()),
            Operation::Compare { reg, field } => family(Opcode::CMP, reg, field.to_byte()),
        }
    }

    /// The modifier an encoder uses when the program gives none.
    ///
    /// STJ defaults to `(0:2)` because J holds two bytes; every other
    /// field-spec family defaults to `(0:5)`.
    pub fn default_field(opcode: u8) -> u8 {
        match opcode {
            Opcode::STJ => FieldSpec::ADDRESS.to_byte(),
            Opcode::ADD..=Opcode::DIV | Opcode::LD..=Opcode::STZ | Opcode::CMP..=63 => {
                FieldSpec::FULL.to_byte()
            }
            Opcode::SPECIAL => HLT,
            _ => 0,
        }
    }

    /// Execution time in machine units. Informational only.
    pub fn duration(&self) -> u64 {
        match *self {
            Operation::Nop => 1,
            Operation::Mul(_) => 10,
            Operation::Div(_) => 12,
            Operation::Halt => 10,
            Operation::Move { count } => 1 + 2 * count as u64,
            Operation::Add(_)
            | Operation::Sub(_)
            | Operation::Shift(_)
            | Operation::Load { .. }
            | Operation::LoadNeg { .. }
            | Operation::Store { .. }
            | Operation::StoreZero { .. }
            | Operation::Compare { .. } => 2,
            Operation::Io { .. }
            | Operation::Jump(_)
            | Operation::JumpRegister { .. }
            | Operation::Transfer { .. } => 1,
        }
    }
}

/// A decoded instruction: address, index selector and operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Signed address field (sign and two bytes).
    pub address: Word,
    /// Index selector, 0 for none or 1..=6.
    pub index: u8,
    /// What to do.
    pub op: Operation,
}

impl Instruction {
    /// Create an instruction with no indexing.
    pub fn new(address: i64, op: Operation) -> Self {
        Self {
            address: address_word(address),
            index: 0,
            op,
        }
    }

    /// The same instruction indexed by `I{index}`.
    pub fn indexed(self, index: u8) -> Self {
        Self { index, ..self }
    }

    /// The index register used to modify the address, if any.
    pub fn index_register(&self) -> Option<Register> {
        Register::index(self.index)
    }
}

/// Build an address field word from a signed value, keeping two bytes.
fn address_word(address: i64) -> Word {
    let magnitude = address.unsigned_abs() as u32 & 0o7777;
    Word::from_parts(Sign::of(address), magnitude)
}

/// Pack the four instruction fields into a word.
pub fn pack(address: Word, index: u8, field: u8, opcode: u8) -> Word {
    let a = address.magnitude();
    Word::compose(
        [((a >> 6) & 63) as u8, (a & 63) as u8, index, field, opcode],
        address.sign(),
    )
}

/// Pack a signed address and the remaining fields into an instruction word.
pub fn compose_instruction(address: i64, index: u8, field: u8, opcode: u8) -> Word {
    pack(address_word(address), index, field, opcode)
}

/// Encode an instruction into a word.
///
/// Fails rather than truncating when a field does not fit its byte.
pub fn encode(instr: &Instruction) -> Result<Word, EncodeError> {
    let (opcode, modifier) = instr.op.code().ok_or(EncodeError::NoOpcode(instr.op))?;
    if instr.index > 6 {
        return Err(EncodeError::InvalidIndex(instr.index));
    }
    if modifier > Word::BYTE_MAX {
        return Err(EncodeError::ModifierOutOfRange(modifier));
    }
    if instr.address.magnitude() > 0o7777 {
        return Err(EncodeError::AddressOutOfRange(instr.address.to_i64()));
    }
    Ok(pack(instr.address, instr.index, modifier, opcode))
}

/// Decode an instruction word.
pub fn decode(word: Word) -> Result<Instruction, DecodeError> {
    let address = extract(word, FieldSpec::ADDRESS);
    let index = word.byte(3);
    let f = word.byte(4);
    let opcode = word.byte(5);

    if index > 6 {
        return Err(DecodeError::InvalidIndex(index));
    }

    let field = || FieldSpec::from_byte(f).map_err(|source| DecodeError::InvalidField { opcode, source });
    let bad_modifier = DecodeError::InvalidModifier { opcode, modifier: f };
    // Offsets within an eight-opcode family always name A, I1..I6 or X.
    let reg = |base: u8| Register::from_offset(opcode - base).ok_or(DecodeError::InvalidOpcode(opcode));

    let op = match opcode {
        Opcode::NOP => Operation::Nop,
        Opcode::ADD => Operation::Add(field()?),
        Opcode::SUB => Operation::Sub(field()?),
        Opcode::MUL => Operation::Mul(field()?),
        Opcode::DIV => Operation::Div(field()?),
        Opcode::SPECIAL => match f {
            HLT => Operation::Halt,
            NUM => return Err(DecodeError::Unsupported { name: "NUM" }),
            CHAR => return Err(DecodeError::Unsupported { name: "CHAR" }),
            _ => return Err(bad_modifier),
        },
        Opcode::SHIFT => Operation::Shift(ShiftKind::from_modifier(f).ok_or(bad_modifier)?),
        Opcode::MOVE => Operation::Move { count: f },
        Opcode::LD..=15 => Operation::Load { reg: reg(Opcode::LD)?, field: field()? },
        Opcode::LDN..=23 => Operation::LoadNeg { reg: reg(Opcode::LDN)?, field: field()? },
        Opcode::ST..=31 => Operation::Store { reg: reg(Opcode::ST)?, field: field()? },
        Opcode::STJ => Operation::Store { reg: Register::J, field: field()? },
        Opcode::STZ => Operation::StoreZero { field: field()? },
        Opcode::JBUS..=Opcode::JRED => Operation::Io {
            op: IoOp::from_opcode(opcode).ok_or(DecodeError::InvalidOpcode(opcode))?,
            unit: f,
        },
        Opcode::JMP => Operation::Jump(JumpCondition::from_modifier(f).ok_or(bad_modifier)?),
        Opcode::JREG..=47 => Operation::JumpRegister {
            reg: reg(Opcode::JREG)?,
            test: RegisterTest::from_modifier(f).ok_or(bad_modifier)?,
        },
        Opcode::TRANSFER..=55 => Operation::Transfer {
            reg: reg(Opcode::TRANSFER)?,
            kind: TransferKind::from_modifier(f).ok_or(bad_modifier)?,
        },
        Opcode::CMP..=63 => Operation::Compare { reg: reg(Opcode::CMP)?, field: field()? },
        _ => return Err(DecodeError::InvalidOpcode(opcode)),
    };

    Ok(Instruction { address, index, op })
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),

    #[error("invalid field specification for opcode {opcode}: {source}")]
    InvalidField { opcode: u8, source: FieldError },

    #[error("invalid modifier {modifier} for opcode {opcode}")]
    InvalidModifier { opcode: u8, modifier: u8 },

    #[error("invalid index register selector: {0}")]
    InvalidIndex(u8),

    #[error("unsupported operation: {name}")]
    Unsupported { name: &'static str },
}

/// Errors that can occur when encoding a hand-built instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("no opcode for {0:?}")]
    NoOpcode(Operation),

    #[error("index selector {0} out of range (0-6)")]
    InvalidIndex(u8),

    #[error("modifier {0} does not fit in a byte")]
    ModifierOutOfRange(u8),

    #[error("address {0} does not fit in two bytes")]
    AddressOutOfRange(i64),
}
