//! The pipeline's shared state (spec §3.5): each stage reads prior fields
//! and writes new ones, short-circuiting on `Error`.

use crate::lexer::token::Token;
use crate::parser::ast::Stmt;
use crate::symbol::tree::SymbolTree;

/// What a REPL submission should do in response to a paused stage (spec
/// §2, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Needs another line of input before re-attempting.
    Input,
    /// Drop the buffered submission; nothing was committed.
    Discard,
    /// As `Discard`, but the symbol tree may have been mutated mid-check.
    DiscardWarn,
    /// Tree + JIT full reset (`:reset`).
    Reset,
    /// Leave the REPL (`:exit`).
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Pause(Request),
    Error,
}

/// An opaque handle the backend owns; the front end only creates,
/// transfers, and resets it (spec §3.5). No backend exists in this crate
/// (§1 Non-goals), so this is a placeholder the driver threads through.
#[derive(Debug, Clone, Default)]
pub struct ModuleContext {
    generation: u64,
}

impl ModuleContext {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump(&mut self) {
        self.generation += 1;
    }
}

/// The front end's persistent state across one or many `compile` calls
/// (spec §3.5).
pub struct FrontendContext {
    pub status: Status,
    pub scanned_tokens: Vec<Token>,
    pub stmts: Vec<Stmt>,
    /// Watermark of statements committed to the symbol tree.
    pub stmts_processed: usize,
    /// Watermark of statements that passed the checker.
    pub stmts_checked: usize,
    pub symbol_tree: SymbolTree,
    pub module_context: ModuleContext,
    pub main_fn_name: Option<String>,
}

impl FrontendContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: Status::Ok,
            scanned_tokens: Vec::new(),
            stmts: Vec::new(),
            stmts_processed: 0,
            stmts_checked: 0,
            symbol_tree: SymbolTree::new(),
            module_context: ModuleContext::default(),
            main_fn_name: None,
        }
    }

    /// Rolls the committed/checked watermarks back to where they stood
    /// before the current submission, per the rollback rule (spec §3.5).
    /// Statements beyond the old watermark are dropped; the symbol tree
    /// itself is not unwound, since only the backend's ModuleContext
    /// tracks generations cheaply enough to fully undo.
    pub fn rollback_to(&mut self, stmts_processed: usize, stmts_checked: usize) {
        self.stmts.truncate(stmts_processed.max(stmts_checked));
        self.stmts_processed = stmts_processed;
        self.stmts_checked = stmts_checked;
    }

    /// `:reset` (spec §6.5): destroys all in-memory state.
    pub fn reset(&mut self) {
        self.scanned_tokens.clear();
        self.stmts.clear();
        self.stmts_processed = 0;
        self.stmts_checked = 0;
        self.symbol_tree.reset();
        self.module_context.bump();
        self.main_fn_name = None;
        self.status = Status::Ok;
    }
}

impl Default for FrontendContext {
    fn default() -> Self {
        Self::new()
    }
}
