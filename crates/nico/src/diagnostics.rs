//! Diagnostic collection for the compiler front end.
//!
//! The core never panics on user-facing errors and never decides how they are
//! displayed. Every stage reports [`Diagnostic`]s to a [`Logger`]; presentation
//! (color, carets, terminal detection) is an external collaborator's concern
//! (see `SPEC_FULL.md` §0) implemented by hosts such as `nico-cli`.

use std::fmt;

use crate::lexer::token::Location;

/// Stable error-kind tags, one per bullet in the spec's error taxonomy (§7).
///
/// Grouped by pipeline stage so a host can filter/color by category without
/// string matching on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "PascalCase")]
pub enum ErrorKind {
    // --- Lex errors ---
    UnexpectedCharacter,
    MixedLeftSpacing,
    MalformedIndent,
    ReservedWordMisuse,
    UnterminatedString,
    UnclosedComment,
    UnopenedComment,
    UnclosedGrouping,
    NumberTooLarge,
    DigitInWrongBase,
    UnexpectedDotOrExponent,

    // --- Parse errors ---
    ExpectedExpression,
    ExpectedIdentifier,
    ExpectedType,
    ExpectedToken,
    MalformedBlock,
    MalformedLoop,
    MalformedConditional,
    MalformedAlloc,
    PosArgumentAfterNamedArgument,
    DeclarationIdentWithColonColon,

    // --- Name/resolution errors ---
    UndeclaredName,
    NameReserved,
    NameAlreadyExists,
    NotAVariable,
    NotACallable,

    // --- Type errors ---
    LetTypeMismatch,
    AssignmentTypeMismatch,
    YieldTypeMismatch,
    NoOperatorOverload,
    InvalidCastOperation,
    PtrDerefNonTyped,
    PtrDerefOutsideUnsafeBlock,
    AddressOfImmutable,
    AssignToImmutable,
    NotAPossibleLValue,
    IndexOutOfBounds,
    WrongIndexKind,
    SizeOfUnsized,
    UnsizedTypeAllocation,
    UnsizedRvalue,
    ArrayElementTypeMismatch,
    WhileLoopYieldingNonUnit,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    YieldOutsideLocalScope,
    ReturnOutsideFunction,
    DefaultArgTypeMismatch,
    FunctionReturnTypeMismatch,
    DuplicateParameterName,
    NegativeOnUnsignedType,
    DeallocNonRawPointer,
    DeallocNullptr,
    DeallocOutsideUnsafeBlock,

    // --- Overload errors ---
    FunctionOverloadConflict,
    NoMatchingFunctionOverload,
    MultipleMatchingFunctionOverloads,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// One reported error or note, with enough context for a caret-underline
/// rendering plus any "previous declaration here"-style secondary notes.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Location,
    /// Secondary notes, each pinned to its own location (e.g. the earlier
    /// declaration in a `NameAlreadyExists` report).
    pub notes: Vec<(String, Location)>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
            notes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_note(mut self, message: impl Into<String>, location: Location) -> Self {
        self.notes.push((message.into(), location));
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.location.line, self.location.column, self.kind, self.message
        )
    }
}

/// Sink that every checking stage reports through.
///
/// Mirrors the teacher's `PrintWriter` trait (`io.rs`): a minimal seam the
/// core writes through, with presentation left to the implementer.
pub trait Logger {
    fn report(&mut self, diagnostic: Diagnostic);

    /// Returns `true` once any diagnostic has been reported. A stage returns
    /// `Status::Error` iff this is true after it runs (§7).
    fn has_errors(&self) -> bool;
}

/// Collects diagnostics in memory; used by tests and as the base for any
/// presentation layer that wants to post-process before printing.
#[derive(Debug, Default, Clone)]
pub struct CollectingLogger {
    diagnostics: Vec<Diagnostic>,
}

impl CollectingLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }

    /// Drops every diagnostic reported at or after `watermark`. Used by the
    /// REPL rollback rule (§3.5) when a submission rolls back.
    pub fn truncate(&mut self, watermark: usize) {
        self.diagnostics.truncate(watermark);
    }

    #[must_use]
    pub fn watermark(&self) -> usize {
        self.diagnostics.len()
    }
}

impl Logger for CollectingLogger {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::new(0, 1, 1, 1)
    }

    #[test]
    fn collecting_logger_tracks_errors() {
        let mut logger = CollectingLogger::new();
        assert!(!logger.has_errors());
        logger.report(Diagnostic::new(ErrorKind::UndeclaredName, "`x` is undeclared", loc()));
        assert!(logger.has_errors());
        assert_eq!(logger.diagnostics().len(), 1);
    }

    #[test]
    fn truncate_rolls_back_to_watermark() {
        let mut logger = CollectingLogger::new();
        let mark = logger.watermark();
        logger.report(Diagnostic::new(ErrorKind::UndeclaredName, "a", loc()));
        logger.report(Diagnostic::new(ErrorKind::UndeclaredName, "b", loc()));
        logger.truncate(mark);
        assert!(!logger.has_errors());
    }
}
