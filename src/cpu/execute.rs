//! Execution engine for the MIX machine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! Each instruction either completes or fails as a whole: every read and
//! every bounds check happens before the first write, so a failing step
//! leaves the machine exactly as it was, PC included.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, trace, warn};
use crate::asm::ProgramImage;
use crate::binary::{arith, extract, insert, FieldSpec, Sign, Word};
use crate::cpu::{Devices, Memory, Registers};
use crate::cpu::decode::{self, DecodeError, Instruction, IoOp, JumpCondition, Operation, TransferKind};
use crate::cpu::devices::DeviceError;
use crate::cpu::memory::MemoryError;
use crate::cpu::registers::{Comparison, Register};

/// Machine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// Machine is running normally.
    Running,
    /// Machine has halted (executed HLT instruction).
    Halted,
}

/// Where control goes after an instruction.
enum Flow {
    Next,
    Jump(u16),
}

/// The MIX machine.
pub struct Machine {
    /// Registers and flags.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Attached peripherals.
    pub devices: Devices,
    /// Current execution state.
    pub state: MachineState,
    /// Instructions executed.
    pub steps: u64,
    /// Accumulated instruction durations, in machine time units.
    pub clock: u64,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Machine {
    /// Create a machine with zeroed state and the standard devices.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            devices: Devices::standard(),
            state: MachineState::Running,
            steps: 0,
            clock: 0,
            last_instr: None,
        }
    }

    /// Create a machine that starts executing at `start`.
    pub fn with_start(start: u16) -> Result<Self, MachineError> {
        let mut machine = Self::new();
        machine.set_pc(start)?;
        Ok(machine)
    }

    /// Reset registers, memory and counters. Devices stay attached.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = MachineState::Running;
        self.steps = 0;
        self.clock = 0;
        self.last_instr = None;
    }

    /// Set the address of the next instruction.
    pub fn set_pc(&mut self, pc: u16) -> Result<(), MachineError> {
        Memory::index(pc as i64)?;
        self.regs.pc = pc;
        Ok(())
    }

    /// Place a word in memory.
    pub fn load_word(&mut self, addr: u16, word: Word) -> Result<(), MachineError> {
        self.mem.write(addr as usize, word)?;
        Ok(())
    }

    /// Place every cell of a program image and jump to its start address.
    pub fn load_image(&mut self, image: &ProgramImage) -> Result<(), MachineError> {
        // Validate every address first so a bad image loads nothing.
        for &(addr, _) in &image.cells {
            Memory::index(addr as i64)?;
        }
        Memory::index(image.start as i64)?;

        for &(addr, word) in &image.cells {
            self.mem.write(addr as usize, word)?;
        }
        self.regs.pc = image.start;
        self.state = MachineState::Running;
        Ok(())
    }

    /// Execute the instruction at PC.
    ///
    /// Returns the state after the instruction: `Halted` once HLT runs.
    pub fn step(&mut self) -> Result<MachineState, MachineError> {
        if self.state != MachineState::Running {
            return Err(MachineError::NotRunning(self.state));
        }

        // Fetch
        let word = self.mem.read(self.regs.pc as usize)?;

        // Decode
        let instr = decode::decode(word)?;

        self.perform(instr)
    }

    /// Execute `word` as if it had been fetched from PC.
    pub fn execute_word(&mut self, word: Word) -> Result<MachineState, MachineError> {
        if self.state != MachineState::Running {
            return Err(MachineError::NotRunning(self.state));
        }
        let instr = decode::decode(word)?;
        self.perform(instr)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, MachineError> {
        let start_steps = self.steps;

        while self.state == MachineState::Running {
            self.step()?;
        }

        Ok(self.steps - start_steps)
    }

    /// Run for at most `max_steps` instructions.
    pub fn run_limited(&mut self, max_steps: u64) -> Result<u64, MachineError> {
        let start_steps = self.steps;
        let limit = self.steps.saturating_add(max_steps);

        while self.state == MachineState::Running && self.steps < limit {
            self.step()?;
        }

        Ok(self.steps - start_steps)
    }

    fn perform(&mut self, instr: Instruction) -> Result<MachineState, MachineError> {
        let pc = self.regs.pc;
        Memory::index(pc as i64)?;
        trace!(pc, %instr, "execute");

        match self.execute(instr)? {
            Flow::Next => self.regs.pc = pc + 1,
            Flow::Jump(target) => self.regs.pc = target,
        }

        self.steps += 1;
        self.clock += instr.op.duration();
        self.last_instr = Some(instr);

        Ok(self.state)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<Flow, MachineError> {
        let ea = self.regs.effective_address(instr.address, instr.index_register());

        match instr.op {
            Operation::Nop => {}

            // ==================== Arithmetic ====================

            Operation::Add(field) => {
                let v = self.operand(ea, field)?;
                let (sum, overflowed) = arith::add(self.regs.a(), v);
                self.regs.set(Register::A, sum);
                self.note_overflow(overflowed, "ADD");
            }

            Operation::Sub(field) => {
                let v = self.operand(ea, field)?;
                let (diff, overflowed) = arith::subtract(self.regs.a(), v);
                self.regs.set(Register::A, diff);
                self.note_overflow(overflowed, "SUB");
            }

            Operation::Mul(field) => {
                let v = self.operand(ea, field)?;
                let (high, low) = arith::multiply(self.regs.a(), v);
                self.regs.set(Register::A, high);
                self.regs.set(Register::X, low);
            }

            Operation::Div(field) => {
                let v = self.operand(ea, field)?;
                match arith::divide(self.regs.a(), self.regs.x(), v) {
                    Some((quotient, remainder)) => {
                        self.regs.set(Register::A, quotient);
                        self.regs.set(Register::X, remainder);
                    }
                    None => self.note_overflow(true, "DIV"),
                }
            }

            // ==================== Special ====================

            Operation::Halt => {
                debug!(pc = self.regs.pc, steps = self.steps + 1, "halted");
                self.state = MachineState::Halted;
            }

            Operation::Shift(kind) => {
                let count = ea.to_i64();
                if count < 0 {
                    return Err(MachineError::NegativeShift(count));
                }
                let count = count as usize;
                let a = self.regs.a();
                if kind.includes_x() {
                    let x = self.regs.x();
                    let mut bytes = [0u8; 2 * Word::BYTES];
                    bytes[..Word::BYTES].copy_from_slice(&a.bytes());
                    bytes[Word::BYTES..].copy_from_slice(&x.bytes());
                    arith::shift_bytes(&mut bytes, count, kind.is_left(), kind.is_circular());
                    let (high, low) = bytes.split_at(Word::BYTES);
                    self.regs.set(Register::A, Word::compose(to_array(high), a.sign()));
                    self.regs.set(Register::X, Word::compose(to_array(low), x.sign()));
                } else {
                    let mut bytes = a.bytes();
                    arith::shift_bytes(&mut bytes, count, kind.is_left(), false);
                    self.regs.set(Register::A, Word::compose(bytes, a.sign()));
                }
            }

            Operation::Move { count } => self.move_words(ea, count)?,

            // ==================== Data Transfer ====================

            Operation::Load { reg, field } => {
                let v = self.operand(ea, field)?;
                self.regs.set(reg, v);
            }

            Operation::LoadNeg { reg, field } => {
                let cell = self.mem.read(Memory::index(ea.to_i64())?)?;
                self.regs.set(reg, extract(cell.negate(), field));
            }

            Operation::Store { reg, field } => {
                let value = self.regs.get(reg);
                self.store(ea, field, value)?;
            }

            Operation::StoreZero { field } => self.store(ea, field, Word::ZERO)?,

            // ==================== Devices ====================

            Operation::Io { op, unit } => return self.io(op, unit, ea),

            // ==================== Control Flow ====================

            Operation::Jump(cond) => {
                let overflow = self.regs.overflow;
                let cmp = self.regs.comparison;
                let taken = match cond {
                    JumpCondition::Jmp | JumpCondition::Jsj => true,
                    JumpCondition::Jov => overflow,
                    JumpCondition::Jnov => !overflow,
                    JumpCondition::Jl => cmp == Some(Comparison::Less),
                    JumpCondition::Je => cmp == Some(Comparison::Equal),
                    JumpCondition::Jg => cmp == Some(Comparison::Greater),
                    JumpCondition::Jge => matches!(cmp, Some(Comparison::Greater | Comparison::Equal)),
                    JumpCondition::Jne => matches!(cmp, Some(Comparison::Less | Comparison::Greater)),
                    JumpCondition::Jle => matches!(cmp, Some(Comparison::Less | Comparison::Equal)),
                };
                let target = if taken { Some(jump_target(ea)?) } else { None };

                if matches!(cond, JumpCondition::Jov | JumpCondition::Jnov) {
                    self.regs.take_overflow();
                }
                return Ok(match target {
                    Some(target) if cond == JumpCondition::Jsj => Flow::Jump(target),
                    Some(target) => self.jump(target),
                    None => Flow::Next,
                });
            }

            Operation::JumpRegister { reg, test } => {
                if test.holds(self.regs.get(reg).to_i64()) {
                    let target = jump_target(ea)?;
                    return Ok(self.jump(target));
                }
            }

            Operation::Transfer { reg, kind } => {
                let max = reg.width().max_magnitude();
                let overflowed = match kind {
                    TransferKind::Inc | TransferKind::Dec => {
                        let delta = if kind == TransferKind::Inc { ea } else { ea.negate() };
                        let (sum, overflowed) = arith::add_within(self.regs.get(reg), delta, max);
                        self.regs.set(reg, sum);
                        overflowed
                    }
                    TransferKind::Ent => self.regs.set_checked(reg, ea),
                    TransferKind::Enn => self.regs.set_checked(reg, ea.negate()),
                };
                self.note_overflow(overflowed, "address transfer");
            }

            Operation::Compare { reg, field } => {
                let v = self.operand(ea, field)?;
                let r = extract(self.regs.get(reg), field);
                self.regs.comparison = Some(arith::compare(r, v).into());
            }
        }

        Ok(Flow::Next)
    }

    /// Field view of the memory cell at `ea`.
    fn operand(&self, ea: Word, field: FieldSpec) -> Result<Word, MachineError> {
        let cell = self.mem.read(Memory::index(ea.to_i64())?)?;
        Ok(extract(cell, field))
    }

    fn store(&mut self, ea: Word, field: FieldSpec, value: Word) -> Result<(), MachineError> {
        let addr = Memory::index(ea.to_i64())?;
        let cell = self.mem.read(addr)?;
        self.mem.write(addr, insert(cell, field, value))?;
        Ok(())
    }

    /// Taken jump: J gets the address of the following instruction.
    fn jump(&mut self, target: u16) -> Flow {
        let next = Word::from_parts(Sign::Plus, self.regs.pc as u32 + 1);
        self.regs.set(Register::J, next);
        Flow::Jump(target)
    }

    fn note_overflow(&mut self, overflowed: bool, op: &'static str) {
        if overflowed {
            debug!(pc = self.regs.pc, op, "overflow");
            self.regs.raise_overflow();
        }
    }

    /// MOVE: copy `count` words from `ea` to the address in I1.
    fn move_words(&mut self, ea: Word, count: u8) -> Result<(), MachineError> {
        let src = ea.to_i64();
        let dst = self.regs.get(Register::I1).to_i64();
        if src == dst {
            return Ok(());
        }

        let len = count as usize;
        let from = Memory::block(src, len)?;
        let to = Memory::block(dst, len)?;

        // Word by word, so overlapping ranges propagate like the hardware.
        for (s, d) in from.zip(to) {
            let word = self.mem.read(s)?;
            self.mem.write(d, word)?;
        }
        let i1 = Word::from_i64(dst + len as i64)?;
        self.regs.set(Register::I1, i1);
        Ok(())
    }

    fn io(&mut self, op: IoOp, unit: u8, ea: Word) -> Result<Flow, MachineError> {
        let device = match self.devices.get_mut(unit) {
            Ok(device) => device,
            Err(err) => {
                warn!(pc = self.regs.pc, unit, ?op, "no device attached");
                return Err(err.into());
            }
        };

        match op {
            IoOp::Jbus | IoOp::Jred => {
                let busy = device.is_busy();
                if busy == (op == IoOp::Jbus) {
                    let target = jump_target(ea)?;
                    return Ok(self.jump(target));
                }
            }
            IoOp::Ioc => device.control(ea.to_i64())?,
            IoOp::In => {
                let range = Memory::block(ea.to_i64(), device.block_size())?;
                let mut block = vec![Word::ZERO; range.len()];
                device.input(&mut block)?;
                self.mem.slice_mut(range)?.copy_from_slice(&block);
            }
            IoOp::Out => {
                let range = Memory::block(ea.to_i64(), device.block_size())?;
                device.output(self.mem.slice(range)?)?;
            }
        }
        Ok(Flow::Next)
    }

    /// Last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the machine is halted.
    pub fn is_halted(&self) -> bool {
        self.state == MachineState::Halted
    }

    /// Check if the machine is running.
    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }
}

fn jump_target(ea: Word) -> Result<u16, MachineError> {
    Ok(Memory::index(ea.to_i64())? as u16)
}

fn to_array(bytes: &[u8]) -> [u8; Word::BYTES] {
    let mut out = [0u8; Word::BYTES];
    out.copy_from_slice(bytes);
    out
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("regs", &self.regs)
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Errors that can occur during execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("machine not running: {0:?}")]
    NotRunning(MachineState),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("word error: {0}")]
    Word(#[from] crate::binary::WordError),

    #[error("negative shift count: {0}")]
    NegativeShift(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{compose_instruction, encode, RegisterTest, ShiftKind};
    use crate::cpu::devices::{unit, BufferDevice};

    fn w(value: i64) -> Word {
        Word::from_i64(value).unwrap()
    }

    fn encoded(instr: Instruction) -> Word {
        encode(&instr).unwrap()
    }

    fn spec(l: u8, r: u8) -> FieldSpec {
        FieldSpec::new(l, r).unwrap()
    }

    /// A machine with `program` at 0 and PC = 0.
    fn machine(program: &[Instruction]) -> Machine {
        let mut m = Machine::new();
        let words: Vec<Word> = program.iter().map(|&instr| encoded(instr)).collect();
        m.mem.load_words(0, &words).unwrap();
        m
    }

    fn exec(m: &mut Machine, instr: Instruction) {
        m.execute_word(encoded(instr)).unwrap();
    }

    fn cell() -> Word {
        Word::compose([1, 2, 3, 4, 5], Sign::Minus)
    }

    #[test]
    fn test_halt() {
        let mut m = machine(&[Instruction::new(0, Operation::Halt)]);
        assert_eq!(m.step().unwrap(), MachineState::Halted);
        assert!(m.is_halted());
        assert_eq!(m.regs.pc, 1);
        assert_eq!(m.step(), Err(MachineError::NotRunning(MachineState::Halted)));
    }

    #[test]
    fn test_nop_then_halt() {
        let mut m = machine(&[
            Instruction::new(0, Operation::Nop),
            Instruction::new(0, Operation::Nop),
            Instruction::new(0, Operation::Halt),
        ]);
        assert_eq!(m.run().unwrap(), 3);
        assert_eq!(m.steps, 3);
        assert_eq!(m.clock, 1 + 1 + 10);
        assert_eq!(m.last_instruction().map(|i| i.op), Some(Operation::Halt));
    }

    #[test]
    fn test_run_limited() {
        // JMP 0 loops forever
        let mut m = machine(&[Instruction::new(0, Operation::Jump(JumpCondition::Jmp))]);
        assert_eq!(m.run_limited(25).unwrap(), 25);
        assert!(m.is_running());
    }

    #[test]
    fn test_run_limited_saturates_budget() {
        let mut m = machine(&[
            Instruction::new(0, Operation::Nop),
            Instruction::new(0, Operation::Halt),
        ]);
        m.step().unwrap();
        assert_eq!(m.run_limited(u64::MAX).unwrap(), 1);
        assert!(m.is_halted());
    }

    #[test]
    fn test_load_field_views() {
        let mut m = Machine::new();
        m.mem.write(2000, cell()).unwrap();

        exec(&mut m, Instruction::new(2000, Operation::Load { reg: Register::A, field: FieldSpec::FULL }));
        assert_eq!(m.regs.a(), cell());

        exec(&mut m, Instruction::new(2000, Operation::Load { reg: Register::A, field: spec(0, 3) }));
        assert_eq!(m.regs.a(), Word::compose([0, 0, 1, 2, 3], Sign::Minus));

        exec(&mut m, Instruction::new(2000, Operation::Load { reg: Register::X, field: spec(4, 4) }));
        assert_eq!(m.regs.x(), w(4));
    }

    #[test]
    fn test_load_negative() {
        let mut m = Machine::new();
        m.mem.write(2000, cell()).unwrap();
        exec(&mut m, Instruction::new(2000, Operation::LoadNeg { reg: Register::A, field: FieldSpec::FULL }));
        assert_eq!(m.regs.a(), Word::compose([1, 2, 3, 4, 5], Sign::Plus));
    }

    #[test]
    fn test_load_index_truncates() {
        let mut m = Machine::new();
        m.mem.write(2000, cell()).unwrap();
        exec(&mut m, Instruction::new(2000, Operation::Load { reg: Register::I2, field: FieldSpec::FULL }));
        assert_eq!(m.regs.get(Register::I2), Word::compose([0, 0, 0, 4, 5], Sign::Minus));
    }

    #[test]
    fn test_store_field() {
        let mut m = Machine::new();
        m.mem.write(2000, cell()).unwrap();
        m.regs.set(Register::A, Word::compose([6, 7, 8, 9, 0], Sign::Plus));

        exec(&mut m, Instruction::new(2000, Operation::Store { reg: Register::A, field: spec(2, 3) }));
        assert_eq!(m.mem.read(2000).unwrap(), Word::compose([1, 9, 0, 4, 5], Sign::Minus));
    }

    #[test]
    fn test_store_index_pads_with_zeros() {
        let mut m = Machine::new();
        m.mem.write(2000, cell()).unwrap();
        m.regs.set(Register::I1, w(-70));

        exec(&mut m, Instruction::new(2000, Operation::Store { reg: Register::I1, field: FieldSpec::FULL }));
        assert_eq!(m.mem.read(2000).unwrap().to_i64(), -70);
    }

    #[test]
    fn test_store_jump_and_zero() {
        let mut m = Machine::new();
        m.mem.write(2000, cell()).unwrap();
        m.regs.set(Register::J, w(3001));

        exec(&mut m, Instruction::new(2000, Operation::Store { reg: Register::J, field: FieldSpec::ADDRESS }));
        let stored = m.mem.read(2000).unwrap();
        assert_eq!(stored.sign(), Sign::Plus);
        assert_eq!(extract(stored, spec(1, 2)).to_i64(), 3001);
        assert_eq!(extract(stored, spec(3, 5)), extract(cell(), spec(3, 5)));

        exec(&mut m, Instruction::new(2000, Operation::StoreZero { field: FieldSpec::FULL }));
        assert_eq!(m.mem.read(2000).unwrap(), Word::ZERO);
    }

    #[test]
    fn test_add_and_overflow() {
        let mut m = Machine::new();
        m.regs.set(Register::A, w(Word::MAX_MAGNITUDE as i64));
        m.mem.write(1000, w(1)).unwrap();
        m.mem.load_words(0, &[
            encoded(Instruction::new(1000, Operation::Add(FieldSpec::FULL))),
            encoded(Instruction::new(10, Operation::Jump(JumpCondition::Jov))),
        ]).unwrap();
        m.mem.write(10, encoded(Instruction::new(20, Operation::Jump(JumpCondition::Jov)))).unwrap();

        m.step().unwrap();
        assert!(m.regs.overflow);
        assert!(m.regs.a().is_zero());

        // JOV taken, toggle cleared
        m.step().unwrap();
        assert_eq!(m.regs.pc, 10);
        assert_eq!(m.regs.j().to_i64(), 2);
        assert!(!m.regs.overflow);

        // second JOV falls through
        m.step().unwrap();
        assert_eq!(m.regs.pc, 11);
        assert_eq!(m.regs.j().to_i64(), 2);
    }

    #[test]
    fn test_jnov_clears_toggle() {
        let mut m = Machine::new();
        m.regs.raise_overflow();
        exec(&mut m, Instruction::new(100, Operation::Jump(JumpCondition::Jnov)));
        assert_eq!(m.regs.pc, 1);
        assert!(!m.regs.overflow);
    }

    #[test]
    fn test_sub_keeps_sign_on_zero() {
        let mut m = Machine::new();
        m.regs.set(Register::A, w(-7));
        m.mem.write(1000, w(-7)).unwrap();
        exec(&mut m, Instruction::new(1000, Operation::Sub(FieldSpec::FULL)));
        assert_eq!(m.regs.a(), Word::ZERO.negate());
    }

    #[test]
    fn test_mul() {
        let mut m = Machine::new();
        m.regs.set(Register::A, w(-112));
        m.mem.write(1000, w(3)).unwrap();
        exec(&mut m, Instruction::new(1000, Operation::Mul(FieldSpec::FULL)));
        assert_eq!(m.regs.a(), Word::ZERO.negate());
        assert_eq!(m.regs.x().to_i64(), -336);
    }

    #[test]
    fn test_div() {
        let mut m = Machine::new();
        m.regs.set(Register::A, Word::ZERO.negate());
        m.regs.set(Register::X, w(17));
        m.mem.write(1000, w(5)).unwrap();
        exec(&mut m, Instruction::new(1000, Operation::Div(FieldSpec::FULL)));
        assert_eq!(m.regs.a().to_i64(), -3);
        assert_eq!(m.regs.x().to_i64(), -2);
        assert!(!m.regs.overflow);
    }

    #[test]
    fn test_div_by_zero_leaves_registers() {
        let mut m = Machine::new();
        m.regs.set(Register::A, w(5));
        m.regs.set(Register::X, w(9));
        exec(&mut m, Instruction::new(1000, Operation::Div(FieldSpec::FULL)));
        assert!(m.regs.overflow);
        assert_eq!(m.regs.a().to_i64(), 5);
        assert_eq!(m.regs.x().to_i64(), 9);
    }

    #[test]
    fn test_div_quotient_overflow_leaves_registers() {
        let mut m = Machine::new();
        m.regs.set(Register::A, w(5));
        m.regs.set(Register::X, w(9));
        m.mem.write(1000, w(5)).unwrap();
        exec(&mut m, Instruction::new(1000, Operation::Div(FieldSpec::FULL)));
        assert!(m.regs.overflow);
        assert_eq!(m.regs.a().to_i64(), 5);
        assert_eq!(m.regs.x().to_i64(), 9);
    }

    #[test]
    fn test_compare_and_jumps() {
        let mut m = Machine::new();
        m.regs.set(Register::A, w(-5));
        m.mem.write(1000, w(3)).unwrap();
        m.mem.load_words(0, &[
            encoded(Instruction::new(1000, Operation::Compare { reg: Register::A, field: FieldSpec::FULL })),
            encoded(Instruction::new(50, Operation::Jump(JumpCondition::Jg))),
            encoded(Instruction::new(60, Operation::Jump(JumpCondition::Jl))),
        ]).unwrap();

        m.step().unwrap();
        assert_eq!(m.regs.comparison, Some(Comparison::Less));

        m.step().unwrap();
        assert_eq!(m.regs.pc, 2);
        assert!(m.regs.j().is_zero());

        m.step().unwrap();
        assert_eq!(m.regs.pc, 60);
        assert_eq!(m.regs.j().to_i64(), 3);
    }

    #[test]
    fn test_comparison_jumps_need_indicator() {
        let mut m = Machine::new();
        exec(&mut m, Instruction::new(50, Operation::Jump(JumpCondition::Jle)));
        assert_eq!(m.regs.pc, 1);
    }

    #[test]
    fn test_compare_negative_zero_equal() {
        let mut m = Machine::new();
        m.regs.set(Register::I3, Word::ZERO.negate());
        exec(&mut m, Instruction::new(1000, Operation::Compare { reg: Register::I3, field: FieldSpec::FULL }));
        assert_eq!(m.regs.comparison, Some(Comparison::Equal));
    }

    #[test]
    fn test_jsj_keeps_j() {
        let mut m = Machine::new();
        m.regs.set(Register::J, w(77));
        exec(&mut m, Instruction::new(300, Operation::Jump(JumpCondition::Jsj)));
        assert_eq!(m.regs.pc, 300);
        assert_eq!(m.regs.j().to_i64(), 77);
    }

    #[test]
    fn test_register_jumps() {
        let mut m = Machine::new();
        m.regs.set(Register::X, Word::ZERO.negate());
        let jxz = Operation::JumpRegister { reg: Register::X, test: RegisterTest::Zero };
        exec(&mut m, Instruction::new(400, jxz));
        assert_eq!(m.regs.pc, 400);
        assert_eq!(m.regs.j().to_i64(), 1);

        let jxp = Operation::JumpRegister { reg: Register::X, test: RegisterTest::Positive };
        exec(&mut m, Instruction::new(10, jxp));
        assert_eq!(m.regs.pc, 401);
    }

    #[test]
    fn test_indexed_address() {
        let mut m = Machine::new();
        m.mem.write(2005, w(42)).unwrap();
        m.regs.set(Register::I4, w(5));
        exec(&mut m, Instruction::new(2000, Operation::Load { reg: Register::A, field: FieldSpec::FULL }).indexed(4));
        assert_eq!(m.regs.a().to_i64(), 42);
    }

    #[test]
    fn test_shifts() {
        let mut m = Machine::new();
        m.regs.set(Register::A, Word::compose([1, 2, 3, 4, 5], Sign::Plus));
        m.regs.set(Register::X, Word::compose([6, 7, 8, 9, 10], Sign::Minus));

        exec(&mut m, Instruction::new(1, Operation::Shift(ShiftKind::Srax)));
        assert_eq!(m.regs.a(), Word::compose([0, 1, 2, 3, 4], Sign::Plus));
        assert_eq!(m.regs.x(), Word::compose([5, 6, 7, 8, 9], Sign::Minus));

        exec(&mut m, Instruction::new(2, Operation::Shift(ShiftKind::Sla)));
        assert_eq!(m.regs.a(), Word::compose([2, 3, 4, 0, 0], Sign::Plus));

        exec(&mut m, Instruction::new(501, Operation::Shift(ShiftKind::Src)));
        assert_eq!(m.regs.a(), Word::compose([9, 2, 3, 4, 0], Sign::Plus));
        assert_eq!(m.regs.x(), Word::compose([0, 5, 6, 7, 8], Sign::Minus));

        exec(&mut m, Instruction::new(3, Operation::Shift(ShiftKind::Slc)));
        assert_eq!(m.regs.a(), Word::compose([4, 0, 0, 5, 6], Sign::Plus));
        assert_eq!(m.regs.x(), Word::compose([7, 8, 9, 2, 3], Sign::Minus));
    }

    #[test]
    fn test_shift_right_a_and_left_ax() {
        let mut m = Machine::new();
        m.regs.set(Register::A, Word::compose([1, 2, 3, 4, 5], Sign::Plus));
        m.regs.set(Register::X, Word::compose([6, 7, 8, 9, 10], Sign::Minus));

        exec(&mut m, Instruction::new(2, Operation::Shift(ShiftKind::Sra)));
        assert_eq!(m.regs.a(), Word::compose([0, 0, 1, 2, 3], Sign::Plus));
        assert_eq!(m.regs.x(), Word::compose([6, 7, 8, 9, 10], Sign::Minus));

        m.regs.set(Register::A, Word::compose([1, 2, 3, 4, 5], Sign::Plus));
        exec(&mut m, Instruction::new(3, Operation::Shift(ShiftKind::Slax)));
        assert_eq!(m.regs.a(), Word::compose([4, 5, 6, 7, 8], Sign::Plus));
        assert_eq!(m.regs.x(), Word::compose([9, 10, 0, 0, 0], Sign::Minus));
    }

    #[test]
    fn test_negative_shift_rejected() {
        let mut m = Machine::new();
        m.regs.set(Register::A, w(99));
        let err = m.execute_word(encoded(Instruction::new(-1, Operation::Shift(ShiftKind::Sla)))).unwrap_err();
        assert_eq!(err, MachineError::NegativeShift(-1));
        assert_eq!(m.regs.a().to_i64(), 99);
        assert_eq!(m.regs.pc, 0);
    }

    #[test]
    fn test_move() {
        let mut m = Machine::new();
        m.mem.load_words(1000, &[w(1), w(2), w(3)]).unwrap();
        m.regs.set(Register::I1, w(2000));

        exec(&mut m, Instruction::new(1000, Operation::Move { count: 3 }));
        assert_eq!(m.mem.dump(2000, 3), vec![(2000, w(1)), (2001, w(2)), (2002, w(3))]);
        assert_eq!(m.regs.get(Register::I1).to_i64(), 2003);
        assert_eq!(m.clock, 7);
    }

    #[test]
    fn test_move_overlapping_propagates() {
        let mut m = Machine::new();
        m.mem.write(1000, w(8)).unwrap();
        m.regs.set(Register::I1, w(1001));
        exec(&mut m, Instruction::new(1000, Operation::Move { count: 3 }));
        assert_eq!(m.mem.dump(1000, 4).iter().map(|&(_, v)| v.to_i64()).collect::<Vec<_>>(), vec![8, 8, 8, 8]);
    }

    #[test]
    fn test_move_same_range_is_noop() {
        let mut m = Machine::new();
        m.regs.set(Register::I1, w(1000));
        exec(&mut m, Instruction::new(1000, Operation::Move { count: 5 }));
        assert_eq!(m.regs.get(Register::I1).to_i64(), 1000);
    }

    #[test]
    fn test_move_out_of_range_copies_nothing() {
        let mut m = Machine::new();
        m.mem.write(3998, w(5)).unwrap();
        m.regs.set(Register::I1, w(10));
        let err = m.execute_word(encoded(Instruction::new(3998, Operation::Move { count: 3 }))).unwrap_err();
        assert_eq!(err, MachineError::Memory(MemoryError::AddressOutOfRange(4000)));
        assert!(m.mem.read(10).unwrap().is_zero());
        assert_eq!(m.regs.get(Register::I1).to_i64(), 10);
    }

    #[test]
    fn test_address_transfer() {
        let mut m = Machine::new();
        exec(&mut m, Instruction::new(-300, Operation::Transfer { reg: Register::A, kind: TransferKind::Ent }));
        assert_eq!(m.regs.a().to_i64(), -300);

        exec(&mut m, Instruction::new(100, Operation::Transfer { reg: Register::A, kind: TransferKind::Inc }));
        assert_eq!(m.regs.a().to_i64(), -200);

        exec(&mut m, Instruction::new(50, Operation::Transfer { reg: Register::X, kind: TransferKind::Enn }));
        assert_eq!(m.regs.x().to_i64(), -50);

        exec(&mut m, Instruction::new(8, Operation::Transfer { reg: Register::I2, kind: TransferKind::Dec }));
        assert_eq!(m.regs.get(Register::I2).to_i64(), -8);
        assert!(!m.regs.overflow);
    }

    #[test]
    fn test_ent_negative_zero() {
        let mut m = Machine::new();
        let instr = Instruction {
            address: Word::ZERO.negate(),
            index: 0,
            op: Operation::Transfer { reg: Register::A, kind: TransferKind::Ent },
        };
        exec(&mut m, instr);
        assert_eq!(m.regs.a(), Word::ZERO.negate());
    }

    #[test]
    fn test_index_increment_overflow() {
        let mut m = Machine::new();
        m.regs.set(Register::I5, w(4000));
        exec(&mut m, Instruction::new(100, Operation::Transfer { reg: Register::I5, kind: TransferKind::Inc }));
        assert!(m.regs.overflow);
        assert_eq!(m.regs.get(Register::I5).to_i64(), 4);
    }

    #[test]
    fn test_io_roundtrip() {
        let mut m = Machine::new();
        m.devices.attach(unit::TERMINAL, BufferDevice::new("terminal", 2));
        m.mem.load_words(500, &[w(11), w(12)]).unwrap();

        exec(&mut m, Instruction::new(500, Operation::Io { op: IoOp::Out, unit: unit::TERMINAL }));
        exec(&mut m, Instruction::new(600, Operation::Io { op: IoOp::In, unit: unit::TERMINAL }));
        assert_eq!(m.mem.dump(600, 2), vec![(600, w(11)), (601, w(12))]);

        exec(&mut m, Instruction::new(0, Operation::Io { op: IoOp::Ioc, unit: unit::TERMINAL }));

        // buffer devices are never busy
        exec(&mut m, Instruction::new(900, Operation::Io { op: IoOp::Jbus, unit: unit::TERMINAL }));
        assert_eq!(m.regs.pc, 4);
        exec(&mut m, Instruction::new(900, Operation::Io { op: IoOp::Jred, unit: unit::TERMINAL }));
        assert_eq!(m.regs.pc, 900);
    }

    #[test]
    fn test_io_missing_device() {
        let mut m = Machine::new();
        m.devices.detach(unit::CARD_READER);
        let err = m
            .execute_word(encoded(Instruction::new(100, Operation::Io { op: IoOp::In, unit: unit::CARD_READER })))
            .unwrap_err();
        assert_eq!(err, MachineError::Device(DeviceError::NoSuchDevice(unit::CARD_READER)));
        assert_eq!(m.regs.pc, 0);
    }

    #[test]
    fn test_errors_leave_machine_unchanged() {
        let mut m = Machine::new();
        m.regs.set(Register::A, w(1));

        // address out of range
        let err = m.execute_word(compose_instruction(-1, 0, 5, 8)).unwrap_err();
        assert_eq!(err, MachineError::Memory(MemoryError::AddressOutOfRange(-1)));

        // bad field spec
        let err = m.execute_word(compose_instruction(100, 0, 8 * 4 + 3, 1)).unwrap_err();
        assert!(matches!(err, MachineError::Decode(DecodeError::InvalidField { .. })));

        // index 7
        let err = m.execute_word(compose_instruction(100, 7, 5, 8)).unwrap_err();
        assert_eq!(err, MachineError::Decode(DecodeError::InvalidIndex(7)));

        // NUM
        let err = m.execute_word(compose_instruction(0, 0, 0, 5)).unwrap_err();
        assert!(matches!(err, MachineError::Decode(DecodeError::Unsupported { .. })));

        // jump out of memory
        let err = m.execute_word(compose_instruction(4000, 0, 0, 39)).unwrap_err();
        assert_eq!(err, MachineError::Memory(MemoryError::AddressOutOfRange(4000)));

        assert_eq!(m.regs.a().to_i64(), 1);
        assert_eq!(m.regs.pc, 0);
        assert!(m.regs.j().is_zero());
        assert_eq!(m.steps, 0);
    }

    #[test]
    fn test_fetch_past_memory() {
        let mut m = Machine::with_start(3999).unwrap();
        m.step().unwrap();
        assert_eq!(m.step(), Err(MachineError::Memory(MemoryError::AddressOutOfRange(4000))));
        assert!(Machine::with_start(4000).is_err());
    }

    #[test]
    fn test_execute_word_rejects_bad_pc() {
        let mut m = Machine::new();
        m.regs.pc = u16::MAX;
        let err = m.execute_word(compose_instruction(0, 0, 0, 0)).unwrap_err();
        assert_eq!(err, MachineError::Memory(MemoryError::AddressOutOfRange(65535)));
        assert_eq!(m.regs.pc, u16::MAX);
        assert_eq!(m.steps, 0);
    }

    #[test]
    fn test_load_word_bounds() {
        let mut m = Machine::new();
        m.load_word(3999, w(7)).unwrap();
        assert_eq!(m.mem.read(3999).unwrap().to_i64(), 7);
        assert_eq!(
            m.load_word(4000, w(1)),
            Err(MachineError::Memory(MemoryError::AddressOutOfRange(4000)))
        );
    }

    #[test]
    fn test_load_image() {
        let image = ProgramImage {
            start: 3000,
            cells: vec![
                (3000, compose_instruction(0, 0, 2, 5)),
                (3001, w(-12)),
            ],
        };
        let mut m = Machine::new();
        m.load_image(&image).unwrap();
        assert_eq!(m.regs.pc, 3000);
        assert_eq!(m.mem.read(3001).unwrap().to_i64(), -12);
        assert_eq!(m.run().unwrap(), 1);

        let bad = ProgramImage { start: 0, cells: vec![(1, w(1)), (4000, w(2))] };
        let mut m = Machine::new();
        assert!(m.load_image(&bad).is_err());
        assert!(m.mem.read(1).unwrap().is_zero());
    }
}
