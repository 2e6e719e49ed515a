//! `compile(CodeFile, repl_mode) -> &FrontendContext` (spec §4.6): runs the
//! lexer, parser, and two checking passes over one submission, applying
//! the REPL pause/rollback rules between stages.

use crate::check::{Checker, GlobalChecker};
use crate::diagnostics::Logger;
use crate::frontend::context::{FrontendContext, Request, Status};
use crate::lexer::lexer::Lexer;
use crate::parser::parser::Parser;

/// One compilation unit: either a file on disk or a REPL's accumulated
/// buffer. `buffer_id` distinguishes submissions sharing one process
/// (spec §3.1).
pub struct CodeFile {
    pub source: String,
    pub buffer_id: u32,
}

impl CodeFile {
    #[must_use]
    pub fn new(source: impl Into<String>, buffer_id: u32) -> Self {
        Self {
            source: source.into(),
            buffer_id,
        }
    }
}

/// Runs one submission through the pipeline and updates `ctx.status`
/// in place; returns `&ctx` for the caller's convenience (spec §4.6).
pub fn compile<'ctx>(ctx: &'ctx mut FrontendContext, file: CodeFile, repl_mode: bool, logger: &mut dyn Logger) -> &'ctx FrontendContext {
    let stmts_processed = ctx.stmts_processed;
    let stmts_checked = ctx.stmts_checked;

    let lexed = Lexer::new(&file.source, file.buffer_id, repl_mode).scan(logger);
    if lexed.incomplete {
        ctx.status = Status::Pause(Request::Input);
        return ctx;
    }
    if logger.has_errors() {
        ctx.status = if repl_mode { Status::Pause(Request::Discard) } else { Status::Error };
        return ctx;
    }
    ctx.scanned_tokens = lexed.tokens;

    let mut parsed = Parser::new(&ctx.scanned_tokens, repl_mode).parse_program(logger);
    if parsed.incomplete_statement {
        ctx.status = Status::Pause(Request::Input);
        return ctx;
    }
    if logger.has_errors() {
        ctx.status = if repl_mode { Status::Pause(Request::Discard) } else { Status::Error };
        return ctx;
    }

    ctx.stmts.append(&mut parsed.stmts);
    ctx.symbol_tree.clear_modified();

    GlobalChecker::new(&mut ctx.symbol_tree, logger).run(&mut ctx.stmts[stmts_processed..]);
    if logger.has_errors() {
        ctx.rollback_to(stmts_processed, stmts_checked);
        ctx.status = if !repl_mode {
            Status::Error
        } else if ctx.symbol_tree.was_modified() {
            Status::Pause(Request::DiscardWarn)
        } else {
            Status::Pause(Request::Discard)
        };
        return ctx;
    }
    ctx.stmts_processed = ctx.stmts.len();

    Checker::new(&mut ctx.symbol_tree, logger).check_program(&mut ctx.stmts[stmts_checked..]);
    if logger.has_errors() {
        ctx.rollback_to(stmts_processed, stmts_checked);
        ctx.status = if !repl_mode {
            Status::Error
        } else if ctx.symbol_tree.was_modified() {
            Status::Pause(Request::DiscardWarn)
        } else {
            Status::Pause(Request::Discard)
        };
        return ctx;
    }
    ctx.stmts_checked = ctx.stmts.len();

    if ctx.main_fn_name.is_none() {
        ctx.main_fn_name = find_main(&ctx.stmts);
    }

    ctx.status = Status::Ok;
    ctx
}

fn find_main(stmts: &[crate::parser::ast::Stmt]) -> Option<String> {
    stmts.iter().find_map(|stmt| match &stmt.kind {
        crate::parser::ast::StmtKind::Func { name, .. } if name == "main" => Some(name.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingLogger;

    #[test]
    fn successful_submission_advances_watermarks() {
        let mut ctx = FrontendContext::new();
        let mut logger = CollectingLogger::new();
        compile(&mut ctx, CodeFile::new("let a = 1\n", 0), true, &mut logger);
        assert_eq!(ctx.status, Status::Ok);
        assert_eq!(ctx.stmts_processed, 1);
        assert_eq!(ctx.stmts_checked, 1);
        assert!(!logger.has_errors());
    }

    #[test]
    fn unclosed_comment_pauses_for_more_input() {
        let mut ctx = FrontendContext::new();
        let mut logger = CollectingLogger::new();
        compile(&mut ctx, CodeFile::new("/* unterminated\n", 0), true, &mut logger);
        assert_eq!(ctx.status, Status::Pause(Request::Input));
    }

    #[test]
    fn trailing_colon_pauses_for_indented_continuation() {
        let mut ctx = FrontendContext::new();
        let mut logger = CollectingLogger::new();
        compile(&mut ctx, CodeFile::new("if true:\n", 0), true, &mut logger);
        assert_eq!(ctx.status, Status::Pause(Request::Input));
    }

    #[test]
    fn undeclared_name_rolls_back_watermarks() {
        let mut ctx = FrontendContext::new();
        let mut logger = CollectingLogger::new();
        compile(&mut ctx, CodeFile::new("let a = 1\n", 0), true, &mut logger);
        let before = ctx.stmts.len();
        compile(&mut ctx, CodeFile::new("undeclared_thing\n", 1), true, &mut logger);
        assert_eq!(ctx.stmts.len(), before);
    }
}
