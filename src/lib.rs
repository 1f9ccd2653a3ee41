//! # MIX Emulator
//!
//! An instruction-level emulator of the MIX computer from Knuth's *The Art
//! of Computer Programming*, binary variant: words are a sign and five
//! six-bit bytes.
//!
//! The core is a single [`Machine`] value. Load words into its memory,
//! point the program counter at the first instruction and call
//! [`Machine::step`] or [`Machine::run`].

pub mod binary;
pub mod cpu;
pub mod asm;

// Re-export commonly used types
pub use binary::{FieldSpec, Sign, Word};
pub use cpu::{Machine, MachineError, MachineState, Memory, Registers, Instruction, Operation};
pub use asm::{disassemble, load_image, ImageError, ProgramImage};
