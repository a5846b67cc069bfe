//! Instruction encoder: appends ARM32 (A32, little-endian) words to the
//! caller's output buffer.
//!
//! The generated code is a stack machine: every operand is pushed on the
//! runtime stack, every operator pops two words and pushes one. Only `r0`-`r4`
//! and `lr` are touched; `r4` and `lr` are saved by the prologue and restored
//! by the epilogue.
//!
//! All reinterpretation between host integers, addresses and instruction
//! bit patterns happens in this module.

use log::trace;
use snafu::OptionExt;

use crate::error::{BufferTooSmallSnafu, CompileResult, ReturnAddressOverflowSnafu};

/// Maximum number of arguments passed in registers.
pub const MAX_CALL_ARGS: usize = 4;

/// Core registers used by the generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Register {
  R0 = 0,
  R1 = 1,
  R2 = 2,
  R3 = 3,
  R4 = 4,
  Sp = 13,
  Lr = 14,
  Pc = 15,
}

impl Register {
  pub fn number(self) -> u32 {
    self as u32
  }

  pub fn from_number(number: u32) -> Option<Self> {
    match number {
      0 => Some(Self::R0),
      1 => Some(Self::R1),
      2 => Some(Self::R2),
      3 => Some(Self::R3),
      4 => Some(Self::R4),
      13 => Some(Self::Sp),
      14 => Some(Self::Lr),
      15 => Some(Self::Pc),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::R0 => "r0",
      Self::R1 => "r1",
      Self::R2 => "r2",
      Self::R3 => "r3",
      Self::R4 => "r4",
      Self::Sp => "sp",
      Self::Lr => "lr",
      Self::Pc => "pc",
    }
  }
}

/// Argument registers in calling-convention order.
pub const ARG_REGS: [Register; MAX_CALL_ARGS] =
  [Register::R0, Register::R1, Register::R2, Register::R3];

/// Binary operators the encoder knows how to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
}

impl BinaryOp {
  pub fn from_char(c: char) -> Option<Self> {
    match c {
      '+' => Some(Self::Add),
      '-' => Some(Self::Sub),
      '*' => Some(Self::Mul),
      _ => None,
    }
  }

  pub fn symbol(self) -> char {
    match self {
      Self::Add => '+',
      Self::Sub => '-',
      Self::Mul => '*',
    }
  }

  /// Operators that do not bind tighter than their neighbours.
  pub fn is_additive(self) -> bool {
    matches!(self, Self::Add | Self::Sub)
  }
}

/// A 32-bit target address (variable cell or function entry point).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u32);

impl Address {
  pub const fn new(raw: u32) -> Self {
    Self(raw)
  }

  /// Checked conversion from a host address; `None` if it needs more than
  /// 32 bits.
  pub fn from_host(addr: usize) -> Option<Self> {
    u32::try_from(addr).ok().map(Self)
  }

  pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
    Self::from_host(ptr as usize)
  }

  pub const fn raw(self) -> u32 {
    self.0
  }

  /// Address `words` instruction words past `self`; `None` if it would leave
  /// the 32-bit address space.
  pub fn offset_words(self, words: usize) -> Option<Self> {
    let bytes = u32::try_from(words).ok()?.checked_mul(4)?;
    self.0.checked_add(bytes).map(Self)
  }
}

/// Raw A32 instruction words. Condition field is always AL.
pub mod encode {
  use super::{BinaryOp, Register};

  /// `push {rt}` (`str rt, [sp, #-4]!`).
  pub fn push(rt: Register) -> u32 {
    0xe52d_0004 | rt.number() << 12
  }

  /// `pop {rt}` (`ldr rt, [sp], #4`).
  pub fn pop(rt: Register) -> u32 {
    0xe49d_0004 | rt.number() << 12
  }

  pub fn add(rd: Register, rn: Register, rm: Register) -> u32 {
    0xe080_0000 | rn.number() << 16 | rd.number() << 12 | rm.number()
  }

  pub fn sub(rd: Register, rn: Register, rm: Register) -> u32 {
    0xe040_0000 | rn.number() << 16 | rd.number() << 12 | rm.number()
  }

  /// `mul rd, rm, rs`.
  pub fn mul(rd: Register, rm: Register, rs: Register) -> u32 {
    0xe000_0090 | rd.number() << 16 | rs.number() << 8 | rm.number()
  }

  /// Data-processing word computing `rd = rn OP rm`.
  pub fn binary(op: BinaryOp, rd: Register, rn: Register, rm: Register) -> u32 {
    match op {
      BinaryOp::Add => add(rd, rn, rm),
      BinaryOp::Sub => sub(rd, rn, rm),
      // Operand order of mul does not matter for the product.
      BinaryOp::Mul => mul(rd, rm, rn),
    }
  }

  /// Split a 16-bit immediate into the imm4:imm12 fields of movw/movt.
  pub fn imm16_fields(imm: u16) -> u32 {
    let imm = u32::from(imm);
    (imm & 0x0fff) | ((imm << 4) & 0x000f_0000)
  }

  /// `movw rd, #imm` - writes the low half and clears the high half.
  pub fn movw(rd: Register, imm: u16) -> u32 {
    0xe300_0000 | rd.number() << 12 | imm16_fields(imm)
  }

  /// `movt rd, #imm` - writes the high half, keeps the low half.
  pub fn movt(rd: Register, imm: u16) -> u32 {
    0xe340_0000 | rd.number() << 12 | imm16_fields(imm)
  }

  /// `ldr rt, [rn]`.
  pub fn ldr(rt: Register, rn: Register) -> u32 {
    0xe590_0000 | rn.number() << 16 | rt.number() << 12
  }

  /// `bx rm`.
  pub fn bx(rm: Register) -> u32 {
    0xe12f_ff10 | rm.number()
  }
}

/// Words written by the part of a call sequence that follows the argument
/// pops: movw/movt lr, movw/movt r4, bx r4.
const CALL_LINK_WORDS: usize = 5;

/// Append-only writer over the caller's output buffer.
pub struct Emitter<'a> {
  out: &'a mut [u32],
  len: usize,
  base: Address,
}

impl<'a> Emitter<'a> {
  /// `base` is the address the first word of `out` executes from.
  pub fn new(out: &'a mut [u32], base: Address) -> Self {
    Self { out, len: 0, base }
  }

  /// Number of words written so far.
  pub fn len(&self) -> usize {
    self.len
  }

  fn emit(&mut self, word: u32) -> CompileResult<()> {
    let capacity = self.out.len();
    let slot = self
      .out
      .get_mut(self.len)
      .context(BufferTooSmallSnafu { capacity })?;
    *slot = word;
    trace!("{:04}: {word:#010x}", self.len);
    self.len += 1;
    Ok(())
  }

  /// Save `lr` and `r4` on the runtime stack.
  pub fn prologue(&mut self) -> CompileResult<()> {
    self.emit(encode::push(Register::Lr))?;
    self.emit(encode::push(Register::R4))
  }

  /// Pop the result into `r0`, restore `r4` and `lr`, return.
  pub fn epilogue(&mut self) -> CompileResult<()> {
    self.emit(encode::pop(Register::R0))?;
    self.emit(encode::pop(Register::R4))?;
    self.emit(encode::pop(Register::Lr))?;
    self.emit(encode::bx(Register::Lr))
  }

  /// Pop right then left operand, push `left OP right`.
  pub fn binary(&mut self, op: BinaryOp) -> CompileResult<()> {
    self.emit(encode::pop(Register::R1))?;
    self.emit(encode::pop(Register::R0))?;
    self.emit(encode::binary(op, Register::R0, Register::R0, Register::R1))?;
    self.emit(encode::push(Register::R0))
  }

  /// movw/movt pair loading an arbitrary 32-bit value into `rd`.
  fn load_word(&mut self, rd: Register, value: u32) -> CompileResult<()> {
    self.emit(encode::movw(rd, (value & 0xffff) as u16))?;
    self.emit(encode::movt(rd, (value >> 16) as u16))
  }

  /// Materialize a signed constant and push it.
  pub fn constant(&mut self, value: i32) -> CompileResult<()> {
    self.load_word(Register::R0, value as u32)?;
    self.emit(encode::push(Register::R0))
  }

  /// Load the word stored at `addr` and push it.
  pub fn load_external(&mut self, addr: Address) -> CompileResult<()> {
    self.load_word(Register::R0, addr.raw())?;
    self.emit(encode::ldr(Register::R0, Register::R0))?;
    self.emit(encode::push(Register::R0))
  }

  /// Call `callee` with the top `argc` stack values and push its result.
  ///
  /// Arguments are popped into the highest needed register first, so the
  /// first textual argument ends up in `r0`. Counts above
  /// [`MAX_CALL_ARGS`] must be rejected by the caller.
  pub fn call(&mut self, callee: Address, argc: usize) -> CompileResult<()> {
    for &reg in ARG_REGS.iter().take(argc).rev() {
      self.emit(encode::pop(reg))?;
    }

    let words = self.len + CALL_LINK_WORDS;
    let return_addr = self
      .base
      .offset_words(words)
      .context(ReturnAddressOverflowSnafu {
        base: self.base.raw(),
        words,
      })?;
    self.load_word(Register::Lr, return_addr.raw())?;
    self.load_word(Register::R4, callee.raw())?;
    self.emit(encode::bx(Register::R4))?;
    self.emit(encode::push(Register::R0))
  }
}

/// Little-endian byte image of emitted words.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
  words.iter().flat_map(|word| word.to_le_bytes()).collect()
}
