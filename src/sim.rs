//! Interpreter for the emitted instruction subset.
//!
//! Lets compiled expressions run on any host: variable cells live in a
//! word-addressed data memory and native functions are host closures bound to
//! target addresses. Entering a bound address behaves like the callee running
//! and returning through `lr`.

use std::collections::HashMap;

use log::trace;
use snafu::{OptionExt, Snafu, ensure};

use crate::codegen::{ARG_REGS, Address, BinaryOp, Register};
use crate::disasm::{Instruction, decode};

/// Return address planted in `lr` before entering the code.
pub const RETURN_SENTINEL: Address = Address::new(0xffff_fff0);
/// Initial stack pointer; the stack grows down from here.
pub const STACK_TOP: Address = Address::new(0x8000_0000);
/// Value planted in `r4` on entry, checked on return.
const R4_CANARY: u32 = 0x5a5a_5a5a;
const DEFAULT_STEP_LIMIT: usize = 1 << 20;

#[derive(Debug, Snafu)]
pub enum SimError {
  #[snafu(display("undecodable instruction {word:#010x} at {pc:#010x}"))]
  UndecodableInstruction { word: u32, pc: u32 },

  #[snafu(display("access to unmapped address {address:#010x}"))]
  UnmappedAddress { address: u32 },

  #[snafu(display("pop past the top of the stack at {pc:#010x}"))]
  StackUnderflow { pc: u32 },

  #[snafu(display("returned with {depth} words left on the stack"))]
  UnbalancedStack { depth: usize },

  #[snafu(display("callee-saved register {register} was not restored"))]
  ClobberedRegister { register: &'static str },

  #[snafu(display("step limit of {limit} exceeded"))]
  StepLimit { limit: usize },
}

/// Host implementation of a native function: receives `r0`-`r3`, returns `r0`.
pub type NativeFn = Box<dyn Fn([i32; 4]) -> i32>;

pub struct Machine {
  regs: [u32; 16],
  memory: HashMap<u32, u32>,
  natives: HashMap<u32, NativeFn>,
  step_limit: usize,
}

impl Default for Machine {
  fn default() -> Self {
    Self::new()
  }
}

impl Machine {
  pub fn new() -> Self {
    Self {
      regs: [0; 16],
      memory: HashMap::new(),
      natives: HashMap::new(),
      step_limit: DEFAULT_STEP_LIMIT,
    }
  }

  pub fn with_step_limit(mut self, limit: usize) -> Self {
    self.step_limit = limit;
    self
  }

  /// Map a data word, e.g. a variable cell.
  pub fn store(&mut self, addr: Address, value: i32) {
    self.memory.insert(addr.raw(), value as u32);
  }

  pub fn load(&self, addr: Address) -> Option<i32> {
    self.memory.get(&addr.raw()).map(|&word| word as i32)
  }

  /// Bind a host closure to a function entry address.
  pub fn bind(&mut self, entry: Address, native: impl Fn([i32; 4]) -> i32 + 'static) {
    self.natives.insert(entry.raw(), Box::new(native));
  }

  fn reg(&self, r: Register) -> u32 {
    self.regs[r.number() as usize]
  }

  fn set(&mut self, r: Register, value: u32) {
    self.regs[r.number() as usize] = value;
  }

  fn push(&mut self, value: u32) {
    let sp = self.reg(Register::Sp).wrapping_sub(4);
    self.memory.insert(sp, value);
    self.set(Register::Sp, sp);
  }

  fn pop(&mut self, pc: u32) -> Result<u32, SimError> {
    let sp = self.reg(Register::Sp);
    ensure!(sp < STACK_TOP.raw(), StackUnderflowSnafu { pc });
    let value = self.read(sp)?;
    self.set(Register::Sp, sp.wrapping_add(4));
    Ok(value)
  }

  fn read(&self, address: u32) -> Result<u32, SimError> {
    self
      .memory
      .get(&address)
      .copied()
      .context(UnmappedAddressSnafu { address })
  }

  /// Run `code`, loaded at `base`, as a zero-argument function and return `r0`.
  pub fn run(&mut self, code: &[u32], base: Address) -> Result<i32, SimError> {
    self.set(Register::Sp, STACK_TOP.raw());
    self.set(Register::Lr, RETURN_SENTINEL.raw());
    self.set(Register::R4, R4_CANARY);
    let mut pc = base.raw();

    for _ in 0..self.step_limit {
      if pc == RETURN_SENTINEL.raw() {
        return self.finish();
      }

      if let Some(native) = self.natives.get(&pc) {
        let mut args = [0i32; 4];
        for (arg, &reg) in args.iter_mut().zip(ARG_REGS.iter()) {
          *arg = self.regs[reg.number() as usize] as i32;
        }
        let result = native(args);
        trace!("native {pc:#010x}({args:?}) = {result}");
        self.set(Register::R0, result as u32);
        pc = self.reg(Register::Lr);
        continue;
      }

      let index = (pc.wrapping_sub(base.raw()) / 4) as usize;
      let word = code
        .get(index)
        .copied()
        .context(UnmappedAddressSnafu { address: pc })?;
      let insn = decode(word).context(UndecodableInstructionSnafu { word, pc })?;
      trace!("{pc:#010x}: {insn}");

      pc = pc.wrapping_add(4);
      match insn {
        Instruction::Push(rt) => self.push(self.reg(rt)),
        Instruction::Pop(rt) => {
          let value = self.pop(pc.wrapping_sub(4))?;
          self.set(rt, value);
        }
        Instruction::Binary { op, rd, rn, rm } => {
          let (lhs, rhs) = (self.reg(rn), self.reg(rm));
          let value = match op {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
          };
          self.set(rd, value);
        }
        Instruction::Movw(rd, imm) => self.set(rd, u32::from(imm)),
        Instruction::Movt(rd, imm) => {
          let low = self.reg(rd) & 0xffff;
          self.set(rd, u32::from(imm) << 16 | low);
        }
        Instruction::Ldr(rt, rn) => {
          let value = self.read(self.reg(rn))?;
          self.set(rt, value);
        }
        Instruction::Bx(rm) => pc = self.reg(rm) & !1,
      }
    }

    StepLimitSnafu {
      limit: self.step_limit,
    }
    .fail()
  }

  fn finish(&self) -> Result<i32, SimError> {
    let sp = self.reg(Register::Sp);
    ensure!(
      sp == STACK_TOP.raw(),
      UnbalancedStackSnafu {
        depth: (STACK_TOP.raw().wrapping_sub(sp) / 4) as usize,
      }
    );
    ensure!(
      self.reg(Register::R4) == R4_CANARY,
      ClobberedRegisterSnafu { register: "r4" }
    );
    Ok(self.reg(Register::R0) as i32)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codegen::encode;

  const BASE: Address = Address::new(0x0001_0000);

  #[test]
  fn runs_hand_written_function() {
    let code = [
      encode::push(Register::Lr),
      encode::push(Register::R4),
      encode::movw(Register::R0, 42),
      encode::movt(Register::R0, 0),
      encode::push(Register::R0),
      encode::pop(Register::R0),
      encode::pop(Register::R4),
      encode::pop(Register::Lr),
      encode::bx(Register::Lr),
    ];
    assert_eq!(Machine::new().run(&code, BASE).unwrap(), 42);
  }

  #[test]
  fn arithmetic_wraps_like_hardware() {
    let code = [
      encode::movw(Register::R0, 0xffff),
      encode::movt(Register::R0, 0x7fff),
      encode::movw(Register::R1, 1),
      encode::movt(Register::R1, 0),
      encode::binary(BinaryOp::Add, Register::R0, Register::R0, Register::R1),
      encode::bx(Register::Lr),
    ];
    assert_eq!(Machine::new().run(&code, BASE).unwrap(), i32::MIN);
  }

  #[test]
  fn reports_stack_underflow() {
    let code = [encode::pop(Register::R0), encode::bx(Register::Lr)];
    let err = Machine::new().run(&code, BASE).unwrap_err();
    assert!(matches!(err, SimError::StackUnderflow { pc: 0x0001_0000 }));
  }

  #[test]
  fn reports_unbalanced_return() {
    let code = [encode::push(Register::R0), encode::bx(Register::Lr)];
    let err = Machine::new().run(&code, BASE).unwrap_err();
    assert!(matches!(err, SimError::UnbalancedStack { depth: 1 }));
  }

  #[test]
  fn reports_unmapped_load() {
    let code = [
      encode::movw(Register::R0, 0x40),
      encode::ldr(Register::R0, Register::R0),
    ];
    let err = Machine::new().run(&code, BASE).unwrap_err();
    assert!(matches!(err, SimError::UnmappedAddress { address: 0x40 }));
  }

  #[test]
  fn stops_runaway_code() {
    // movw r4, #0 ; movt r4, #1 ; bx r4 loops back to BASE forever.
    let code = [
      encode::movw(Register::R4, 0),
      encode::movt(Register::R4, 1),
      encode::bx(Register::R4),
    ];
    let err = Machine::new()
      .with_step_limit(100)
      .run(&code, BASE)
      .unwrap_err();
    assert!(matches!(err, SimError::StepLimit { limit: 100 }));
  }

  #[test]
  fn rejects_foreign_words() {
    let err = Machine::new().run(&[0], BASE).unwrap_err();
    assert!(matches!(err, SimError::UndecodableInstruction { word: 0, .. }));
  }
}
