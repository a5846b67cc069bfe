//! Decoder and listing for the instruction subset the encoder produces.

use std::fmt;

use crate::codegen::{BinaryOp, Register};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
  Push(Register),
  Pop(Register),
  /// `rd = rn OP rm`.
  Binary {
    op: BinaryOp,
    rd: Register,
    rn: Register,
    rm: Register,
  },
  Movw(Register, u16),
  Movt(Register, u16),
  /// `ldr rt, [rn]`.
  Ldr(Register, Register),
  Bx(Register),
}

fn reg(word: u32, shift: u32) -> Option<Register> {
  Register::from_number((word >> shift) & 0xf)
}

fn imm16(word: u32) -> u16 {
  (((word >> 4) & 0xf000) | (word & 0x0fff)) as u16
}

/// Decode one word, or `None` if it is outside the emitted subset.
pub fn decode(word: u32) -> Option<Instruction> {
  let insn = match word {
    w if w & 0xffff_0fff == 0xe52d_0004 => Instruction::Push(reg(w, 12)?),
    w if w & 0xffff_0fff == 0xe49d_0004 => Instruction::Pop(reg(w, 12)?),
    w if w & 0xfff0_0ff0 == 0xe080_0000 => Instruction::Binary {
      op: BinaryOp::Add,
      rd: reg(w, 12)?,
      rn: reg(w, 16)?,
      rm: reg(w, 0)?,
    },
    w if w & 0xfff0_0ff0 == 0xe040_0000 => Instruction::Binary {
      op: BinaryOp::Sub,
      rd: reg(w, 12)?,
      rn: reg(w, 16)?,
      rm: reg(w, 0)?,
    },
    // mul rd, rm, rs
    w if w & 0xfff0_f0f0 == 0xe000_0090 => Instruction::Binary {
      op: BinaryOp::Mul,
      rd: reg(w, 16)?,
      rn: reg(w, 0)?,
      rm: reg(w, 8)?,
    },
    w if w & 0xfff0_0000 == 0xe300_0000 => Instruction::Movw(reg(w, 12)?, imm16(w)),
    w if w & 0xfff0_0000 == 0xe340_0000 => Instruction::Movt(reg(w, 12)?, imm16(w)),
    w if w & 0xfff0_0fff == 0xe590_0000 => Instruction::Ldr(reg(w, 12)?, reg(w, 16)?),
    w if w & 0xffff_fff0 == 0xe12f_ff10 => Instruction::Bx(reg(w, 0)?),
    _ => return None,
  };
  Some(insn)
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *self {
      Self::Push(rt) => write!(f, "push {{{}}}", rt.name()),
      Self::Pop(rt) => write!(f, "pop {{{}}}", rt.name()),
      Self::Binary { op, rd, rn, rm } => {
        let mnemonic = match op {
          BinaryOp::Add => "add",
          BinaryOp::Sub => "sub",
          BinaryOp::Mul => "mul",
        };
        write!(f, "{mnemonic} {}, {}, {}", rd.name(), rn.name(), rm.name())
      }
      Self::Movw(rd, imm) => write!(f, "movw {}, #{imm:#06x}", rd.name()),
      Self::Movt(rd, imm) => write!(f, "movt {}, #{imm:#06x}", rd.name()),
      Self::Ldr(rt, rn) => write!(f, "ldr {}, [{}]", rt.name(), rn.name()),
      Self::Bx(rm) => write!(f, "bx {}", rm.name()),
    }
  }
}

/// One line per word: offset, raw word, assembly.
pub fn disassemble(words: &[u32]) -> Vec<String> {
  words
    .iter()
    .enumerate()
    .map(|(i, &word)| {
      let text = match decode(word) {
        Some(insn) => insn.to_string(),
        None => format!(".word {word:#010x}"),
      };
      format!("{:04x}:  {word:08x}  {text}", i * 4)
    })
    .collect()
}
