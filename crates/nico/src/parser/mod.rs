pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::{ParseOutcome, Parser};
