//! Single-pass scanner/parser that emits code as a side effect of stack
//! transitions.
//!
//! Operands are emitted as soon as a delimiter ends them. Operators wait on
//! an operator stack and are emitted when a later delimiter proves nothing of
//! higher precedence can still bind to their right operand: `+`, `-`, `,`,
//! `)` and end of input flush every pending operator down to the nearest
//! bracket, `*` flushes only pending `*`. A function name followed by `(`
//! leaves a call marker below the bracket; closing that bracket emits the call.

use log::debug;
use snafu::{OptionExt, ensure};

use crate::codegen::{Address, BinaryOp, Emitter, MAX_CALL_ARGS};
use crate::error::{
  CompileResult, Location, MalformedLiteralSnafu, StrayCommaSnafu, UnbalancedBracketSnafu,
  UnexpectedBracketSnafu, UnknownSymbolSnafu, UnsupportedAritySnafu,
};
use crate::symbols::SymbolTable;
use crate::tokenizer::{CharClass, Token, TokenKind, classify, is_literal_sign};

/// Entry on the parse-time operator stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackEntry {
  Operator(BinaryOp),
  Bracket,
  CallMarker(Address),
}

struct Parser<'s, 'o> {
  source: &'s str,
  symbols: &'s SymbolTable,
  emitter: Emitter<'o>,
  token: Token,
  ops: Vec<StackEntry>,
  /// One counter per open call, parallel to the call markers on `ops`.
  arg_counts: Vec<usize>,
}

/// Compile `source` into `emitter`: prologue, body, epilogue. Returns the
/// number of words written.
pub fn compile(source: &str, symbols: &SymbolTable, emitter: Emitter<'_>) -> CompileResult<usize> {
  let mut parser = Parser {
    source,
    symbols,
    emitter,
    token: Token::default(),
    ops: Vec::new(),
    arg_counts: Vec::new(),
  };
  parser.run()?;
  Ok(parser.emitter.len())
}

impl Parser<'_, '_> {
  fn run(&mut self) -> CompileResult<()> {
    self.emitter.prologue()?;

    let source = self.source;
    let mut prev = None;
    let mut chars = source.char_indices().peekable();
    while let Some((loc, c)) = chars.next() {
      let next = chars.peek().map(|&(_, next)| next);
      self.step(loc, c, prev, next)?;
      prev = Some(c);
    }

    self.flush()?;
    self.reduce_all()?;
    if !self.ops.is_empty() {
      return UnbalancedBracketSnafu {
        at: self.at(self.source.len()),
      }
      .fail();
    }
    self.emitter.epilogue()?;
    debug!(
      "compiled {:?} into {} words",
      self.source,
      self.emitter.len()
    );
    Ok(())
  }

  fn step(
    &mut self,
    loc: usize,
    c: char,
    prev: Option<char>,
    next: Option<char>,
  ) -> CompileResult<()> {
    let class = classify(c);
    if class == CharClass::Space {
      return Ok(());
    }

    // The first non-space character inside a call's brackets starts its
    // first argument.
    if class != CharClass::CloseBracket
      && let Some(count) = self.arg_counts.last_mut()
      && *count == 0
    {
      *count += 1;
    }

    match class {
      CharClass::Space => {}
      CharClass::Digit => self.token.push_digit(c, loc),
      CharClass::Operator(_) if is_literal_sign(prev, next) => self.token.push_sign(c, loc),
      CharClass::Operator(op) => self.operator(op)?,
      CharClass::OpenBracket => self.open_bracket(loc)?,
      CharClass::CloseBracket => self.close_bracket(loc)?,
      CharClass::Comma => self.comma(loc)?,
      CharClass::Ident => self.token.push_ident(c, loc),
    }
    Ok(())
  }

  fn operator(&mut self, op: BinaryOp) -> CompileResult<()> {
    self.flush()?;
    if op.is_additive() {
      self.reduce_all()?;
    } else {
      self.reduce_multiplies()?;
    }
    self.ops.push(StackEntry::Operator(op));
    Ok(())
  }

  fn open_bracket(&mut self, loc: usize) -> CompileResult<()> {
    let token = self.token.take();
    match token.kind {
      TokenKind::None => {}
      TokenKind::External => {
        let callee = self.resolve(&token)?;
        debug!("call to {} at {:#010x}", token.text, callee.raw());
        self.ops.push(StackEntry::CallMarker(callee));
        self.arg_counts.push(0);
      }
      TokenKind::Constant => {
        return UnexpectedBracketSnafu {
          literal: token.text,
          at: self.at(loc),
        }
        .fail();
      }
    }
    self.ops.push(StackEntry::Bracket);
    Ok(())
  }

  fn close_bracket(&mut self, loc: usize) -> CompileResult<()> {
    self.flush()?;
    self.reduce_all()?;
    ensure!(
      self.ops.pop() == Some(StackEntry::Bracket),
      UnbalancedBracketSnafu {
        at: self.at(loc),
      }
    );

    if let Some(&StackEntry::CallMarker(callee)) = self.ops.last() {
      self.ops.pop();
      let argc = self.arg_counts.pop().unwrap_or_default();
      ensure!(
        argc <= MAX_CALL_ARGS,
        UnsupportedAritySnafu {
          argc,
          at: self.at(loc),
        }
      );
      debug!("emit call {:#010x} with {argc} args", callee.raw());
      self.emitter.call(callee, argc)?;
    }
    Ok(())
  }

  fn comma(&mut self, loc: usize) -> CompileResult<()> {
    self.flush()?;
    self.reduce_all()?;
    let source = self.source;
    let count = self
      .arg_counts
      .last_mut()
      .with_context(|| StrayCommaSnafu {
        at: Location::at(source, loc),
      })?;
    *count += 1;
    Ok(())
  }

  /// Emit code for the accumulated operand, if any.
  fn flush(&mut self) -> CompileResult<()> {
    let token = self.token.take();
    match token.kind {
      TokenKind::None => Ok(()),
      TokenKind::Constant => {
        let value = token
          .text
          .parse::<i32>()
          .ok()
          .with_context(|| MalformedLiteralSnafu {
            literal: token.text.as_str(),
            at: self.at(token.loc),
          })?;
        debug!("constant {value}");
        self.emitter.constant(value)
      }
      TokenKind::External => {
        let cell = self.resolve(&token)?;
        debug!("load {} from {:#010x}", token.text, cell.raw());
        self.emitter.load_external(cell)
      }
    }
  }

  fn resolve(&self, token: &Token) -> CompileResult<Address> {
    self
      .symbols
      .lookup(&token.text)
      .with_context(|| UnknownSymbolSnafu {
        name: token.text.as_str(),
        at: self.at(token.loc),
      })
  }

  /// Emit every pending operator down to the nearest bracket or marker.
  fn reduce_all(&mut self) -> CompileResult<()> {
    while let Some(&StackEntry::Operator(op)) = self.ops.last() {
      self.ops.pop();
      self.emitter.binary(op)?;
    }
    Ok(())
  }

  /// Emit the run of pending `*` on top of the stack.
  fn reduce_multiplies(&mut self) -> CompileResult<()> {
    while let Some(&StackEntry::Operator(BinaryOp::Mul)) = self.ops.last() {
      self.ops.pop();
      self.emitter.binary(BinaryOp::Mul)?;
    }
    Ok(())
  }

  fn at(&self, loc: usize) -> Location {
    Location::at(self.source, loc)
  }
}
