//! Symbol table consumed by the compiler.
//!
//! A symbol binds a name to an [`Address`]. Whether that address is a
//! variable cell or a function entry point is decided by the call site: a
//! name followed by `(` is called, anything else is loaded.

use log::debug;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::codegen::Address;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SymbolError {
  #[snafu(display("malformed declaration \"{decl}\", expected NAME=VALUE"))]
  MalformedDeclaration { decl: String },

  #[snafu(display("declaration \"{decl}\" does not bind a 32-bit integer"))]
  InvalidValue {
    decl: String,
    source: std::num::ParseIntError,
  },

  #[snafu(display("address {address:#x} of \"{name}\" does not fit a 32-bit target word"))]
  AddressOutOfRange { name: String, address: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
  pub name: String,
  pub address: Address,
}

impl Symbol {
  pub fn new(name: impl Into<String>, address: Address) -> Self {
    Self {
      name: name.into(),
      address,
    }
  }

  /// Bind `name` to a host pointer, failing when the pointer is wider than
  /// the target word.
  pub fn from_ptr<T>(name: impl Into<String>, ptr: *const T) -> Result<Self, SymbolError> {
    let name = name.into();
    let address = Address::from_ptr(ptr).context(AddressOutOfRangeSnafu {
      name: name.as_str(),
      address: ptr as usize,
    })?;
    Ok(Self { name, address })
  }
}

/// Ordered, finite list of symbols. The end of the list plays the role of the
/// terminating sentinel: lookups never read past it.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
  symbols: Vec<Symbol>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, symbol: Symbol) {
    self.symbols.push(symbol);
  }

  /// Builder-style registration of a variable cell.
  pub fn variable(mut self, name: impl Into<String>, cell: Address) -> Self {
    self.push(Symbol::new(name, cell));
    self
  }

  /// Builder-style registration of a native function entry point.
  pub fn function(mut self, name: impl Into<String>, entry: Address) -> Self {
    self.push(Symbol::new(name, entry));
    self
  }

  /// Address bound to the first entry named `name`.
  pub fn lookup(&self, name: &str) -> Option<Address> {
    self
      .symbols
      .iter()
      .find(|symbol| symbol.name == name)
      .map(|symbol| symbol.address)
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }
}

/// Parse a `NAME=VALUE` variable declaration. Whitespace around either side is
/// ignored.
pub fn parse_declaration(decl: &str) -> Result<(String, i32), SymbolError> {
  let Some((name, value)) = decl.split_once('=') else {
    return MalformedDeclarationSnafu { decl }.fail();
  };
  let name = name.trim();
  if name.is_empty() || name.chars().any(char::is_whitespace) {
    return MalformedDeclarationSnafu { decl }.fail();
  }
  let value = value
    .trim()
    .parse::<i32>()
    .context(InvalidValueSnafu { decl })?;
  Ok((name.to_string(), value))
}

/// Heap cells backing declared variables. Cells never move, so their
/// addresses stay valid for as long as this value lives.
#[derive(Debug, Default)]
pub struct VariableCells {
  cells: Vec<(String, Box<i32>)>,
}

impl VariableCells {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn declare(&mut self, decl: &str) -> Result<(), SymbolError> {
    let (name, value) = parse_declaration(decl)?;
    debug!("declared variable {name} = {value}");
    self.cells.push((name, Box::new(value)));
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<i32> {
    self
      .cells
      .iter()
      .find(|(cell_name, _)| cell_name == name)
      .map(|(_, cell)| **cell)
  }

  /// Update a declared cell in place; returns `false` if no cell has `name`.
  pub fn set(&mut self, name: &str, value: i32) -> bool {
    match self.cells.iter_mut().find(|(cell_name, _)| cell_name == name) {
      Some((_, cell)) => {
        **cell = value;
        true
      }
      None => false,
    }
  }

  /// Append one symbol per cell, pointing at the cell's host address.
  pub fn register(&self, table: &mut SymbolTable) -> Result<(), SymbolError> {
    for (name, cell) in &self.cells {
      let ptr: *const i32 = &**cell;
      table.push(Symbol::from_ptr(name.as_str(), ptr)?);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table() -> SymbolTable {
    SymbolTable::new()
      .function("div", Address::new(0x100))
      .variable("a", Address::new(0x200))
      .variable("a", Address::new(0x300))
  }

  #[test]
  fn lookup_returns_first_exact_match() {
    let table = table();
    assert_eq!(table.lookup("div"), Some(Address::new(0x100)));
    assert_eq!(table.lookup("a"), Some(Address::new(0x200)));
  }

  #[test]
  fn lookup_stops_at_end_of_table() {
    let table = table();
    assert_eq!(table.lookup("di"), None);
    assert_eq!(table.lookup("divx"), None);
    assert_eq!(SymbolTable::new().lookup("a"), None);
  }

  #[test]
  fn parses_declarations_with_whitespace() {
    assert_eq!(parse_declaration("a=7").unwrap(), ("a".to_string(), 7));
    assert_eq!(parse_declaration(" rate = -12 ").unwrap(), ("rate".to_string(), -12));
  }

  #[test]
  fn rejects_bad_declarations() {
    assert!(matches!(
      parse_declaration("=7"),
      Err(SymbolError::MalformedDeclaration { .. })
    ));
    assert!(matches!(
      parse_declaration("a7"),
      Err(SymbolError::MalformedDeclaration { .. })
    ));
    assert!(matches!(
      parse_declaration("a=seven"),
      Err(SymbolError::InvalidValue { .. })
    ));
    assert!(matches!(
      parse_declaration("a=4294967296"),
      Err(SymbolError::InvalidValue { .. })
    ));
  }

  #[test]
  fn variable_cells_can_be_updated() {
    let mut cells = VariableCells::new();
    cells.declare("a=1").unwrap();
    cells.declare("b = 2").unwrap();
    assert_eq!(cells.get("b"), Some(2));
    assert!(cells.set("a", 5));
    assert!(!cells.set("c", 5));
    assert_eq!(cells.get("a"), Some(5));
  }

  #[test]
  #[cfg(target_pointer_width = "32")]
  fn variable_cells_register_their_addresses() {
    let mut cells = VariableCells::new();
    cells.declare("a=1").unwrap();
    let mut table = SymbolTable::new();
    cells.register(&mut table).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.lookup("a").is_some());
  }

  #[test]
  #[cfg(target_pointer_width = "64")]
  fn variable_cells_above_4gib_are_rejected() {
    let mut cells = VariableCells::new();
    cells.declare("a=1").unwrap();
    cells.declare("b=2").unwrap();
    let mut table = SymbolTable::new();
    let result = cells.register(&mut table);

    let high = cells
      .cells
      .iter()
      .find(|(_, cell)| (&**cell as *const i32 as usize) > u32::MAX as usize);
    match high {
      Some((name, _)) => match result {
        Err(SymbolError::AddressOutOfRange { name: ref rejected, address }) => {
          assert_eq!(rejected, name);
          assert!(address > u32::MAX as usize);
        }
        other => panic!("expected AddressOutOfRange, got {other:?}"),
      },
      None => {
        result.unwrap();
        assert_eq!(table.len(), 2);
      }
    }
  }

  #[test]
  fn symbol_from_ptr_checks_width() {
    let value = 0i32;
    let result = Symbol::from_ptr("v", &value as *const i32);
    if usize::BITS > 32 && (&value as *const i32 as usize) > u32::MAX as usize {
      assert!(matches!(result, Err(SymbolError::AddressOutOfRange { .. })));
    } else {
      assert!(result.is_ok());
    }
  }
}
