//! SQL DDL import and export.

mod dialect;
mod lexer;
mod parser;
mod writer;

pub use dialect::Dialect;
pub use parser::{SqlParseError, parse_sql};
pub use writer::write_sql;
