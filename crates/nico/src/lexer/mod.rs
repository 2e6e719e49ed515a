pub mod lexer;
pub mod token;

pub use lexer::{LeftSpacing, Lexer, LexerOutcome};
pub use token::{keyword_kind, LiteralValue, Location, Token, TokenKind, PRIMITIVE_TYPE_NAMES};
