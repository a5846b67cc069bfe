//! Shared error types used across the compilation pipeline.
//!
//! Errors raised while scanning the expression carry a [`Location`] that
//! renders the source with a caret under the offending byte, so a bad
//! identifier or literal is easy to spot in a one-line formula.

use std::fmt;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Quoted source line plus a caret marker pointing into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
  expr_line: String,
  marker: String,
  offset: usize,
}

impl Location {
  /// Anchor a location at a specific byte offset in the source.
  pub fn at(expr: &str, loc: usize) -> Self {
    let expr_line = format!("'{expr}'");
    let mut safe_loc = loc.min(expr.len());
    while !expr.is_char_boundary(safe_loc) {
      safe_loc -= 1;
    }
    let char_offset = expr[..safe_loc].chars().count() + 1; // account for opening quote
    let marker = format!("{}^", " ".repeat(char_offset));
    Self {
      expr_line,
      marker,
      offset: safe_loc,
    }
  }

  /// Byte offset into the expression.
  pub fn offset(&self) -> usize {
    self.offset
  }
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}\n{}", self.expr_line, self.marker)
  }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("{at} unknown symbol \"{name}\""))]
  UnknownSymbol { name: String, at: Location },

  #[snafu(display("{at} call passes {argc} arguments, at most 4 are supported"))]
  UnsupportedArity { argc: usize, at: Location },

  #[snafu(display("{at} malformed integer literal \"{literal}\""))]
  MalformedLiteral { literal: String, at: Location },

  #[snafu(display("{at} unbalanced bracket"))]
  UnbalancedBracket { at: Location },

  #[snafu(display("{at} comma outside of a call's argument list"))]
  StrayComma { at: Location },

  #[snafu(display("{at} bracket cannot follow literal \"{literal}\""))]
  UnexpectedBracket { literal: String, at: Location },

  #[snafu(display("output buffer of {capacity} words is too small"))]
  BufferTooSmall { capacity: usize },

  #[snafu(display("address {address:#x} does not fit a 32-bit target word"))]
  AddressOutOfRange { address: usize },

  #[snafu(display("return address {words} words past {base:#010x} overflows 32 bits"))]
  ReturnAddressOverflow { base: u32, words: usize },
}

impl CompileError {
  /// Source location of the error, if it was raised while scanning.
  pub fn location(&self) -> Option<&Location> {
    match self {
      Self::UnknownSymbol { at, .. }
      | Self::UnsupportedArity { at, .. }
      | Self::MalformedLiteral { at, .. }
      | Self::UnbalancedBracket { at }
      | Self::StrayComma { at }
      | Self::UnexpectedBracket { at, .. } => Some(at),
      Self::BufferTooSmall { .. }
      | Self::AddressOutOfRange { .. }
      | Self::ReturnAddressOverflow { .. } => None,
    }
  }
}
