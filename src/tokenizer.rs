//! Character classification and the running token accumulator.
//!
//! The compiler never builds a token stream: it reads one character at a time
//! and keeps the characters of the current operand in a [`Token`] until a
//! delimiter tells it to emit code for them.

use crate::codegen::BinaryOp;

/// What a single source character means to the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
  Space,
  Digit,
  Operator(BinaryOp),
  OpenBracket,
  CloseBracket,
  Comma,
  /// Anything else is part of an identifier.
  Ident,
}

pub fn classify(c: char) -> CharClass {
  match c {
    ' ' => CharClass::Space,
    '0'..='9' => CharClass::Digit,
    '(' => CharClass::OpenBracket,
    ')' => CharClass::CloseBracket,
    ',' => CharClass::Comma,
    _ => match BinaryOp::from_char(c) {
      Some(op) => CharClass::Operator(op),
      None => CharClass::Ident,
    },
  }
}

/// Kind of the operand accumulated so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenKind {
  #[default]
  None,
  Constant,
  External,
}

/// Operand characters collected since the last delimiter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub text: String,
  /// Byte offset of the first character.
  pub loc: usize,
}

impl Token {
  pub fn is_empty(&self) -> bool {
    self.text.is_empty()
  }

  /// Append a digit. An untyped token becomes a constant; identifiers keep
  /// their kind so `x1` stays an identifier.
  pub fn push_digit(&mut self, c: char, loc: usize) {
    self.push(c, loc);
    if self.kind == TokenKind::None {
      self.kind = TokenKind::Constant;
    }
  }

  /// Append a sign that is fused into the literal that follows it.
  pub fn push_sign(&mut self, c: char, loc: usize) {
    self.push(c, loc);
    self.kind = TokenKind::Constant;
  }

  pub fn push_ident(&mut self, c: char, loc: usize) {
    self.push(c, loc);
    self.kind = TokenKind::External;
  }

  fn push(&mut self, c: char, loc: usize) {
    if self.text.is_empty() {
      self.loc = loc;
    }
    self.text.push(c);
  }

  /// Hand out the accumulated token and reset to an empty, untyped one.
  pub fn take(&mut self) -> Token {
    std::mem::take(self)
  }
}

/// A `+`, `-` or `*` is fused into a literal when it starts the expression or
/// directly follows `(`, and a digit directly follows it. Spaces are not
/// skipped on either side.
pub fn is_literal_sign(prev: Option<char>, next: Option<char>) -> bool {
  matches!(prev, None | Some('(')) && next.is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_delimiters_and_operands() {
    assert_eq!(classify('7'), CharClass::Digit);
    assert_eq!(classify('-'), CharClass::Operator(BinaryOp::Sub));
    assert_eq!(classify('*'), CharClass::Operator(BinaryOp::Mul));
    assert_eq!(classify('('), CharClass::OpenBracket);
    assert_eq!(classify(')'), CharClass::CloseBracket);
    assert_eq!(classify(','), CharClass::Comma);
    assert_eq!(classify(' '), CharClass::Space);
    assert_eq!(classify('x'), CharClass::Ident);
    assert_eq!(classify('_'), CharClass::Ident);
    assert_eq!(classify('/'), CharClass::Ident);
  }

  #[test]
  fn digits_after_identifier_stay_identifier() {
    let mut token = Token::default();
    token.push_ident('x', 3);
    token.push_digit('1', 4);
    assert_eq!(token.kind, TokenKind::External);
    assert_eq!(token.text, "x1");
    assert_eq!(token.loc, 3);
  }

  #[test]
  fn letters_after_digits_turn_token_into_identifier() {
    let mut token = Token::default();
    token.push_digit('3', 0);
    assert_eq!(token.kind, TokenKind::Constant);
    token.push_ident('a', 1);
    assert_eq!(token.kind, TokenKind::External);
  }

  #[test]
  fn take_resets_accumulator() {
    let mut token = Token::default();
    token.push_sign('-', 0);
    token.push_digit('3', 1);
    let taken = token.take();
    assert_eq!(taken.text, "-3");
    assert_eq!(taken.kind, TokenKind::Constant);
    assert!(token.is_empty());
    assert_eq!(token.kind, TokenKind::None);
  }

  #[test]
  fn sign_fuses_only_at_start_or_after_open_bracket() {
    assert!(is_literal_sign(None, Some('3')));
    assert!(is_literal_sign(Some('('), Some('0')));
    assert!(!is_literal_sign(None, Some('(')));
    assert!(!is_literal_sign(None, Some(' ')));
    assert!(!is_literal_sign(Some('5'), Some('3')));
    assert!(!is_literal_sign(Some(' '), Some('3')));
    assert!(!is_literal_sign(Some('('), None));
  }
}
