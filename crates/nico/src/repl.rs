//! The colon-command REPL shell (spec §4.6, §6.2): accumulates input across
//! lines, dispatches `:command`s before the line ever reaches `compile`, and
//! turns a [`Status`] into what the host should show the user next.
//!
//! Grounded on the teacher's separation of "conservative defaults" from an
//! explicit-override constructor (`SessionManager::new_with_limits`):
//! [`ReplConfig`] carries prompt/continuation glyphs so a host can
//! customize presentation without touching the pipeline itself.

use crate::diagnostics::CollectingLogger;
use crate::frontend::{compile, CodeFile, FrontendContext, Request, Status};

#[derive(Debug, Clone)]
pub struct ReplConfig {
    pub prompt: String,
    pub continuation_prompt: String,
    pub caution_prompt: String,
    pub version: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: ">>> ".to_string(),
            continuation_prompt: "... ".to_string(),
            caution_prompt: "!!! ".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// What the host should do after feeding one line to [`Repl::submit_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplOutcome {
    /// The submission committed; compile succeeded.
    Committed,
    /// Re-prompt with the continuation glyph; more input is needed.
    NeedsMoreInput,
    /// The submission was dropped; print any diagnostics already collected.
    Discarded,
    /// As `Discarded`, but the symbol tree may be partially mutated —
    /// the host should switch to the caution prompt.
    DiscardedWarn,
    /// A hard compile failure (non-REPL semantics leaking through, or an
    /// internal invariant break); the host should print and stop.
    Failed,
    /// A `:command` produced text to show directly (`:help`, `:version`,
    /// `:license`).
    CommandOutput(String),
    /// `:reset` ran; the tree and buffer are now empty.
    WasReset,
    /// `:exit`/`:quit`/`:q` — the host should stop reading input.
    Exit,
}

const HELP_TEXT: &str = "\
:help, :h, :?   show this text
:version        show the compiler version
:license        show license information
:discard        drop the current buffered (incomplete) submission
:reset          forget all declarations and start over
:exit, :quit, :q  leave the REPL";

const LICENSE_TEXT: &str = "Licensed under the MIT license.";

pub struct Repl {
    config: ReplConfig,
    ctx: FrontendContext,
    logger: CollectingLogger,
    buffer: String,
    next_buffer_id: u32,
    in_caution_mode: bool,
    /// Rendered text of whatever diagnostics the most recent `submit_line`
    /// call reported, so a host can print them without the logger growing
    /// unbounded across a long session.
    last_report: Vec<String>,
}

impl Repl {
    #[must_use]
    pub fn new(config: ReplConfig) -> Self {
        Self {
            config,
            ctx: FrontendContext::new(),
            logger: CollectingLogger::new(),
            buffer: String::new(),
            next_buffer_id: 0,
            in_caution_mode: false,
            last_report: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ReplConfig {
        &self.config
    }

    #[must_use]
    pub fn is_in_caution_mode(&self) -> bool {
        self.in_caution_mode
    }

    #[must_use]
    pub fn current_prompt(&self) -> &str {
        if self.in_caution_mode {
            &self.config.caution_prompt
        } else if self.buffer.is_empty() {
            &self.config.prompt
        } else {
            &self.config.continuation_prompt
        }
    }

    /// Diagnostics produced by the most recent `submit_line` call.
    #[must_use]
    pub fn diagnostics(&self) -> &[String] {
        &self.last_report
    }

    /// Feeds one line of input. A line that is exactly a colon command
    /// bypasses the front end entirely, per spec §6.2 ("each must be the
    /// only content of a line").
    pub fn submit_line(&mut self, line: &str) -> ReplOutcome {
        self.last_report.clear();
        if let Some(outcome) = self.dispatch_command(line.trim()) {
            return outcome;
        }

        self.buffer.push_str(line);
        self.buffer.push('\n');

        let watermark = self.logger.watermark();
        let buffer_id = self.next_buffer_id;
        self.next_buffer_id += 1;
        let file = CodeFile::new(self.buffer.clone(), buffer_id);
        compile(&mut self.ctx, file, true, &mut self.logger);

        self.last_report = self.logger.diagnostics()[watermark..].iter().map(ToString::to_string).collect();
        self.logger.truncate(watermark);

        match self.ctx.status {
            Status::Ok => {
                self.buffer.clear();
                self.in_caution_mode = false;
                ReplOutcome::Committed
            }
            Status::Pause(Request::Input) => ReplOutcome::NeedsMoreInput,
            Status::Pause(Request::Discard) => {
                self.buffer.clear();
                ReplOutcome::Discarded
            }
            Status::Pause(Request::DiscardWarn) => {
                self.buffer.clear();
                self.in_caution_mode = true;
                ReplOutcome::DiscardedWarn
            }
            Status::Pause(Request::Reset) => {
                self.ctx.reset();
                self.buffer.clear();
                self.in_caution_mode = false;
                ReplOutcome::WasReset
            }
            Status::Pause(Request::Exit) => ReplOutcome::Exit,
            Status::Error => ReplOutcome::Failed,
        }
    }

    fn dispatch_command(&mut self, trimmed: &str) -> Option<ReplOutcome> {
        Some(match trimmed {
            ":help" | ":h" | ":?" => ReplOutcome::CommandOutput(HELP_TEXT.to_string()),
            ":version" => ReplOutcome::CommandOutput(format!("nico {}", self.config.version)),
            ":license" => ReplOutcome::CommandOutput(LICENSE_TEXT.to_string()),
            ":discard" => {
                self.buffer.clear();
                self.in_caution_mode = false;
                ReplOutcome::Discarded
            }
            ":reset" => {
                self.ctx.reset();
                self.buffer.clear();
                self.in_caution_mode = false;
                ReplOutcome::WasReset
            }
            ":exit" | ":quit" | ":q" => ReplOutcome::Exit,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_command_bypasses_the_front_end() {
        let mut repl = Repl::new(ReplConfig::default());
        assert_eq!(repl.submit_line(":help"), ReplOutcome::CommandOutput(HELP_TEXT.to_string()));
    }

    #[test]
    fn trailing_colon_prompts_for_continuation() {
        let mut repl = Repl::new(ReplConfig::default());
        assert_eq!(repl.submit_line("if true:"), ReplOutcome::NeedsMoreInput);
        assert_eq!(repl.current_prompt(), "... ");
        assert_eq!(repl.submit_line("  pass"), ReplOutcome::NeedsMoreInput);
        assert_eq!(repl.submit_line("pass"), ReplOutcome::Committed);
    }

    #[test]
    fn reset_clears_declarations() {
        let mut repl = Repl::new(ReplConfig::default());
        assert_eq!(repl.submit_line("let a = 1"), ReplOutcome::Committed);
        assert_eq!(repl.submit_line(":reset"), ReplOutcome::WasReset);
        assert_eq!(repl.submit_line("a"), ReplOutcome::Discarded);
    }
}
