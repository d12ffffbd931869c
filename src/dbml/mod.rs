//! DBML import and export.

mod lexer;
mod parser;
mod serializer;

pub use lexer::LexError;
pub use parser::{DbmlParseError, parse_dbml};
pub use serializer::serialize;
