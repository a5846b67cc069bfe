//! Crate root: single-pass JIT compiler from infix integer expressions to
//! ARM32 machine code.
//!
//! The stages are small and only talk through narrow interfaces:
//! - `tokenizer` classifies characters and accumulates operand tokens.
//! - `parser` drives the scan and decides when code must be emitted.
//! - `codegen` encodes instruction words into the caller's buffer.
//! - `symbols` maps identifiers to variable cells and function entry points.
//! - `disasm` and `sim` decode and interpret what `codegen` produced.
//! - `error` holds the shared error type and source locations.

pub mod codegen;
pub mod disasm;
pub mod error;
pub mod parser;
pub mod sim;
pub mod symbols;
pub mod tokenizer;

pub use codegen::{Address, words_to_bytes};
pub use error::{CompileError, CompileResult};
pub use symbols::{Symbol, SymbolTable};

use codegen::Emitter;
use snafu::OptionExt;

use error::AddressOutOfRangeSnafu;

/// Compile `expr` into `out`, which must be the memory the code will execute
/// from. Returns the number of instruction words written.
///
/// Fails with [`CompileError::AddressOutOfRange`] when `out` lives above the
/// 32-bit address space, e.g. on a 64-bit host; use [`compile_at`] there.
pub fn compile(expr: &str, symbols: &SymbolTable, out: &mut [u32]) -> CompileResult<usize> {
  let address = out.as_ptr() as usize;
  let base = Address::from_host(address).context(AddressOutOfRangeSnafu { address })?;
  compile_at(expr, symbols, out, base)
}

/// Compile `expr` into `out` for execution at `base`.
///
/// Only return addresses of calls depend on `base`, so the words can be
/// copied to `base` after compilation.
pub fn compile_at(
  expr: &str,
  symbols: &SymbolTable,
  out: &mut [u32],
  base: Address,
) -> CompileResult<usize> {
  parser::compile(expr, symbols, Emitter::new(out, base))
}
