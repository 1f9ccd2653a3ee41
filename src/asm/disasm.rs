//! Disassembler for MIX programs.
//!
//! Renders instruction words in MIXAL notation, `OP ADDRESS,INDEX(FIELD)`,
//! leaving out the index when it is 0 and the field when it is the
//! operation's default.

use std::fmt;
use crate::binary::Word;
use crate::cpu::decode::{decode, Instruction, IoOp, JumpCondition, Operation, ShiftKind, TransferKind};

/// Disassemble a single instruction word to text.
pub fn disassemble_instruction(word: Word) -> String {
    match decode(word) {
        Ok(decoded) => decoded.to_string(),
        Err(_) => "???".to_string(),
    }
}

/// Disassemble a run of words placed at `origin`.
pub fn disassemble(words: &[Word], origin: usize) -> String {
    let mut output = String::new();
    output.push_str("; MIX Disassembly\n");
    output.push_str("; ---------------\n\n");

    for (offset, word) in words.iter().enumerate() {
        let line = disassemble_instruction(*word);
        output.push_str(&format!("{:04}: {:<24} ; {}\n", origin + offset, line, word));
    }

    output
}

/// The operation's mnemonic, e.g. `LDA`, `J1NZ`, `INCX`.
pub fn mnemonic(op: &Operation) -> String {
    match *op {
        Operation::Nop => "NOP".to_string(),
        Operation::Add(_) => "ADD".to_string(),
        Operation::Sub(_) => "SUB".to_string(),
        Operation::Mul(_) => "MUL".to_string(),
        Operation::Div(_) => "DIV".to_string(),
        Operation::Halt => "HLT".to_string(),
        Operation::Shift(kind) => match kind {
            ShiftKind::Sla => "SLA",
            ShiftKind::Sra => "SRA",
            ShiftKind::Slax => "SLAX",
            ShiftKind::Srax => "SRAX",
            ShiftKind::Slc => "SLC",
            ShiftKind::Src => "SRC",
        }
        .to_string(),
        Operation::Move { .. } => "MOVE".to_string(),
        Operation::Load { reg, .. } => format!("LD{}", reg.suffix()),
        Operation::LoadNeg { reg, .. } => format!("LD{}N", reg.suffix()),
        Operation::Store { reg, .. } => format!("ST{}", reg.suffix()),
        Operation::StoreZero { .. } => "STZ".to_string(),
        Operation::Io { op, .. } => match op {
            IoOp::Jbus => "JBUS",
            IoOp::Ioc => "IOC",
            IoOp::In => "IN",
            IoOp::Out => "OUT",
            IoOp::Jred => "JRED",
        }
        .to_string(),
        Operation::Jump(cond) => match cond {
            JumpCondition::Jmp => "JMP",
            JumpCondition::Jsj => "JSJ",
            JumpCondition::Jov => "JOV",
            JumpCondition::Jnov => "JNOV",
            JumpCondition::Jl => "JL",
            JumpCondition::Je => "JE",
            JumpCondition::Jg => "JG",
            JumpCondition::Jge => "JGE",
            JumpCondition::Jne => "JNE",
            JumpCondition::Jle => "JLE",
        }
        .to_string(),
        Operation::JumpRegister { reg, test } => format!("J{}{}", reg.suffix(), test.suffix()),
        Operation::Transfer { reg, kind } => {
            let name = match kind {
                TransferKind::Inc => "INC",
                TransferKind::Dec => "DEC",
                TransferKind::Ent => "ENT",
                TransferKind::Enn => "ENN",
            };
            format!("{}{}", name, reg.suffix())
        }
        Operation::Compare { reg, .. } => format!("CMP{}", reg.suffix()),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = self.address.to_i64();
        if address == 0 && self.address.sign().is_minus() {
            write!(f, "{} -0", mnemonic(&self.op))?;
        } else {
            write!(f, "{} {}", mnemonic(&self.op), address)?;
        }
        if self.index != 0 {
            write!(f, ",{}", self.index)?;
        }

        let default_field = self
            .op
            .code()
            .map(|(opcode, modifier)| modifier == Operation::default_field(opcode))
            .unwrap_or(false);
        match self.op {
            Operation::Add(field)
            | Operation::Sub(field)
            | Operation::Mul(field)
            | Operation::Div(field)
            | Operation::Load { field, .. }
            | Operation::LoadNeg { field, .. }
            | Operation::Store { field, .. }
            | Operation::StoreZero { field }
            | Operation::Compare { field, .. } => {
                if !default_field {
                    write!(f, "{}", field)?;
                }
            }
            Operation::Move { count: n } | Operation::Io { unit: n, .. } => {
                if n != 0 {
                    write!(f, "({})", n)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
