//! Integration tests for the frontend driver and REPL shell, covering the
//! seed scenarios enumerated in the specification's testable-properties
//! section.

use nico::{compile, CodeFile, CollectingLogger, FrontendContext, Repl, ReplConfig, ReplOutcome, Status};

fn compile_once(source: &str) -> (FrontendContext, CollectingLogger) {
    let mut ctx = FrontendContext::new();
    let mut logger = CollectingLogger::new();
    compile(&mut ctx, CodeFile::new(source, 0), false, &mut logger);
    (ctx, logger)
}

#[test]
fn overload_resolution_picks_the_matching_signature() {
    let (ctx, logger) = compile_once(
        "func add(a:i32,b:i32)->i32 => a+b\n\
         func add(a:f64,b:f64)->f64 => a+b\n\
         let x = add(1,2)\n\
         let y = add(1.0,2.0)\n",
    );
    assert_eq!(ctx.status, Status::Ok, "{:?}", logger.diagnostics());
}

#[test]
fn overload_resolution_rejects_mixed_argument_types() {
    let (ctx, _logger) = compile_once(
        "func add(a:i32,b:i32)->i32 => a+b\n\
         func add(a:f64,b:f64)->f64 => a+b\n\
         let x = add(1,2.0)\n",
    );
    assert_eq!(ctx.status, Status::Error);
}

#[test]
fn pointer_deref_outside_unsafe_is_rejected() {
    let (ctx, _logger) = compile_once("let a = 1\nlet var b: @i32 = @a\nlet c = ^b\n");
    assert_eq!(ctx.status, Status::Error);
}

#[test]
fn pointer_deref_inside_unsafe_passes() {
    let (ctx, logger) = compile_once("let a = 1\nlet var b: @i32 = @a\nlet c: i32 = unsafe:\n  yield ^b\n");
    assert_eq!(ctx.status, Status::Ok, "{:?}", logger.diagnostics());
}

#[test]
fn nullptr_assignment_requires_a_raw_pointer_type() {
    let (ctx, logger) = compile_once("let var a: @i32 = nullptr\n");
    assert_eq!(ctx.status, Status::Ok, "{:?}", logger.diagnostics());

    let (ctx, _logger) = compile_once("let a: i32 = nullptr\n");
    assert_eq!(ctx.status, Status::Error);
}

#[test]
fn alloc_for_amount_is_allowed_only_for_sized_elements() {
    let (ctx, _logger) = compile_once("alloc for 10 of [i32; ?]\n");
    assert_eq!(ctx.status, Status::Error);
}

#[test]
fn repl_continuation_commits_the_composite_submission() {
    let mut repl = Repl::new(ReplConfig::default());
    assert_eq!(repl.submit_line("if true:"), ReplOutcome::NeedsMoreInput);
    assert_eq!(repl.submit_line("  pass"), ReplOutcome::NeedsMoreInput);
    assert_eq!(repl.submit_line("pass"), ReplOutcome::Committed);
}

#[test]
fn repl_discards_a_failed_submission_without_touching_prior_declarations() {
    let mut repl = Repl::new(ReplConfig::default());
    assert_eq!(repl.submit_line("let a = 1"), ReplOutcome::Committed);
    assert_eq!(repl.submit_line("undeclared_thing"), ReplOutcome::Discarded);
    assert!(!repl.diagnostics().is_empty());
    // the prior declaration is still usable after the failed submission
    assert_eq!(repl.submit_line("let b = a"), ReplOutcome::Committed);
}

#[test]
fn repl_reset_forgets_every_declaration() {
    let mut repl = Repl::new(ReplConfig::default());
    assert_eq!(repl.submit_line("let a = 1"), ReplOutcome::Committed);
    assert_eq!(repl.submit_line(":reset"), ReplOutcome::WasReset);
    assert_eq!(repl.submit_line("a"), ReplOutcome::Discarded);
}

#[test]
fn repl_colon_commands_never_reach_the_frontend() {
    let mut repl = Repl::new(ReplConfig::default());
    match repl.submit_line(":help") {
        ReplOutcome::CommandOutput(text) => assert!(text.contains(":reset")),
        other => panic!("expected :help output, got {other:?}"),
    }
    match repl.submit_line(":version") {
        ReplOutcome::CommandOutput(text) => assert!(text.starts_with("nico ")),
        other => panic!("expected :version output, got {other:?}"),
    }
    assert_eq!(repl.submit_line(":exit"), ReplOutcome::Exit);
}
