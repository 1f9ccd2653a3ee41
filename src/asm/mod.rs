//! Program images and disassembly.
//!
//! This module provides:
//! - Program image loading (text or JSON → address/word cells)
//! - A disassembler (words → MIXAL notation)

pub mod disasm;
pub mod image;

pub use disasm::{disassemble, disassemble_instruction};
pub use image::{load_image, ImageError, ProgramImage};
