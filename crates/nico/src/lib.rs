#![doc = include_str!("../../../README.md")]
#![expect(clippy::too_many_arguments, reason = "checker dispatch signatures mirror the AST shape")]
#![expect(clippy::type_complexity, reason = "symbol tree lookups return intentionally rich tuples")]

mod diagnostics;
mod lexer;
mod parser;
mod types;
mod symbol;
mod check;
mod frontend;
mod repl;

pub use crate::{
    check::{Checker, GlobalChecker},
    diagnostics::{CollectingLogger, Diagnostic, ErrorKind, Logger},
    frontend::{compile, CodeFile, FrontendContext, ModuleContext, Request, Status},
    lexer::{Lexer, LexerOutcome, Location, Token, TokenKind},
    parser::{ast::*, ParseOutcome, Parser},
    repl::{Repl, ReplConfig, ReplOutcome},
    symbol::{NodeId, SymbolTree},
    types::{FunctionType, Parameter, Type},
};
