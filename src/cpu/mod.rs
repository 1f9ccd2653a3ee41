//! The MIX machine.
//!
//! This module implements the machine state and the instruction set:
//! - 4000 words of memory
//! - registers A and X (five bytes), I1..I6 and J (two bytes)
//! - overflow toggle and comparison indicator
//! - peripheral units addressed by the I/O instructions

pub mod memory;
pub mod registers;
pub mod decode;
pub mod devices;
pub mod execute;

pub use memory::{Memory, MemoryError, MEMORY_SIZE};
pub use registers::{Comparison, Register, Registers};
pub use decode::{decode, encode, compose_instruction, Instruction, Operation, DecodeError, EncodeError};
pub use devices::{BufferDevice, Device, DeviceError, Devices};
pub use execute::{Machine, MachineError, MachineState};
