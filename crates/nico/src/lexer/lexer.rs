//! Indentation-sensitive lexer.
//!
//! Two-character operators are always tried before their one-character
//! prefix (`::` before `:`, `+=` before `+`, `->`/`=>` before nothing) —
//! the longest-match-first discipline the lexer follows throughout, spelled
//! out here since nothing downstream re-checks it.

use smallvec::SmallVec;

use crate::diagnostics::{Diagnostic, ErrorKind, Logger};
use crate::lexer::token::{keyword_kind, LiteralValue, Location, Token, TokenKind};

/// Whether a source uses tabs or spaces for indentation; fixed by the first
/// non-blank line and enforced for the rest of the buffer (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeftSpacing {
    Tabs,
    Spaces,
}

/// What the lexer produced, plus whether scanning stopped mid-construct in
/// a way that a REPL should treat as "needs another line" rather than an
/// error (§4.1's unclosed comment / unbalanced grouping / unterminated
/// indent stack / trailing `:` at EOF).
#[derive(Debug, Clone)]
pub struct LexerOutcome {
    pub tokens: Vec<Token>,
    pub incomplete: bool,
}

struct GroupingFrame {
    kind: TokenKind,
    location: Location,
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    buffer_id: u32,
    repl_mode: bool,

    pos: usize,
    line: u32,
    column: u32,

    /// Nesting depth rarely exceeds a handful of levels; inlined to avoid a
    /// heap allocation for the common case.
    grouping_stack: SmallVec<[GroupingFrame; 8]>,
    indent_stack: Vec<u32>,
    left_spacing: Option<LeftSpacing>,
    comment_depth: u32,

    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str, buffer_id: u32, repl_mode: bool) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            buffer_id,
            repl_mode,
            pos: 0,
            line: 1,
            column: 1,
            grouping_stack: SmallVec::new(),
            indent_stack: Vec::new(),
            left_spacing: None,
            comment_depth: 0,
            tokens: Vec::new(),
        }
    }

    pub fn scan(mut self, logger: &mut dyn Logger) -> LexerOutcome {
        let mut at_line_start = true;
        loop {
            if at_line_start && self.grouping_stack.is_empty() {
                self.handle_line_start(logger);
                at_line_start = false;
            }
            self.skip_intra_line_whitespace();
            if self.is_at_end() {
                break;
            }
            let c = self.peek();
            if c == '\n' {
                self.advance();
                at_line_start = self.grouping_stack.is_empty();
                continue;
            }
            if c == '/' && self.peek_at(1) == Some('/') {
                self.skip_line_comment();
                continue;
            }
            if c == '/' && self.peek_at(1) == Some('*') {
                self.skip_block_comment(logger);
                continue;
            }
            self.scan_token(logger);
        }

        let incomplete = self.finish(logger);
        let eof_loc = self.here();
        self.tokens.push(Token::new(TokenKind::Eof, eof_loc, ""));
        LexerOutcome {
            tokens: self.tokens,
            incomplete,
        }
    }

    /// Closes out whatever is still open at end-of-input. Returns whether
    /// the caller should treat this as "needs more input" rather than an
    /// error — only meaningful in REPL mode.
    fn finish(&mut self, logger: &mut dyn Logger) -> bool {
        if self.comment_depth > 0 {
            if self.repl_mode {
                return true;
            }
            logger.report(Diagnostic::new(
                ErrorKind::UnclosedComment,
                "unclosed block comment at end of file",
                self.here(),
            ));
            return false;
        }

        if !self.grouping_stack.is_empty() {
            if self.repl_mode {
                return true;
            }
            for frame in &self.grouping_stack {
                logger.report(Diagnostic::new(
                    ErrorKind::UnclosedGrouping,
                    format!("unclosed `{}`", frame.kind),
                    frame.location,
                ));
            }
            return false;
        }

        if matches!(self.tokens.last().map(|t| t.kind), Some(TokenKind::Colon)) {
            if self.repl_mode {
                return true;
            }
            // Batch mode: leave the dangling `:` for the parser to report
            // as a malformed block.
        }

        if !self.indent_stack.is_empty() {
            if self.repl_mode {
                return true;
            }
            while let Some(_) = self.indent_stack.pop() {
                let loc = self.here();
                self.tokens.push(Token::new(TokenKind::Dedent, loc, ""));
            }
        }

        false
    }

    fn handle_line_start(&mut self, logger: &mut dyn Logger) {
        let mut spacing = 0u32;
        let mut kind: Option<LeftSpacing> = None;
        loop {
            match self.peek_byte() {
                Some(b' ') => {
                    kind = Some(kind.unwrap_or(LeftSpacing::Spaces));
                    if kind != Some(LeftSpacing::Spaces) {
                        break;
                    }
                    spacing += 1;
                    self.advance();
                }
                Some(b'\t') => {
                    kind = Some(kind.unwrap_or(LeftSpacing::Tabs));
                    if kind != Some(LeftSpacing::Tabs) {
                        break;
                    }
                    spacing += 1;
                    self.advance();
                }
                _ => break,
            }
        }

        // Blank lines (only whitespace until newline/EOF) carry no signal.
        if matches!(self.peek(), '\n') || self.is_at_end() {
            return;
        }
        if self.peek() == '/' && self.peek_at(1) == Some('/') {
            return;
        }

        if let Some(observed) = kind {
            match self.left_spacing {
                None => self.left_spacing = Some(observed),
                Some(expected) if expected != observed => {
                    logger.report(Diagnostic::new(
                        ErrorKind::MixedLeftSpacing,
                        "indentation mixes tabs and spaces",
                        self.here(),
                    ));
                }
                _ => {}
            }
        }

        let prev_was_colon = matches!(self.tokens.last().map(|t| t.kind), Some(TokenKind::Colon));
        if prev_was_colon {
            let top = self.indent_stack.last().copied().unwrap_or(0);
            if spacing > top {
                let idx = self.tokens.len() - 1;
                let loc = self.tokens[idx].location;
                self.tokens[idx] = Token::new(TokenKind::Indent, loc, ":");
                self.indent_stack.push(spacing);
            } else {
                logger.report(Diagnostic::new(
                    ErrorKind::MalformedIndent,
                    "expected an indented block after `:`",
                    self.here(),
                ));
            }
            return;
        }

        while self.indent_stack.last().is_some_and(|&top| spacing <= top) {
            self.indent_stack.pop();
            let loc = self.here();
            self.tokens.push(Token::new(TokenKind::Dedent, loc, ""));
        }
    }

    fn scan_token(&mut self, logger: &mut dyn Logger) {
        let start_loc = self.here();
        let start_pos = self.pos;
        let c = self.advance();

        let kind = match c {
            '(' => {
                self.grouping_stack.push(GroupingFrame {
                    kind: TokenKind::LeftParen,
                    location: start_loc,
                });
                TokenKind::LeftParen
            }
            ')' => {
                self.grouping_stack.pop();
                TokenKind::RightParen
            }
            '[' => {
                self.grouping_stack.push(GroupingFrame {
                    kind: TokenKind::LeftBracket,
                    location: start_loc,
                });
                TokenKind::LeftBracket
            }
            ']' => {
                self.grouping_stack.pop();
                TokenKind::RightBracket
            }
            '{' => {
                self.grouping_stack.push(GroupingFrame {
                    kind: TokenKind::LeftBrace,
                    location: start_loc,
                });
                TokenKind::LeftBrace
            }
            '}' => {
                self.grouping_stack.pop();
                TokenKind::RightBrace
            }
            ',' => TokenKind::Comma,
            '.' => {
                if self.peek().is_ascii_digit() {
                    return self.scan_tuple_index(start_loc);
                }
                TokenKind::Dot
            }
            ':' => {
                if self.peek() == ':' {
                    self.advance();
                    TokenKind::ColonColon
                } else {
                    TokenKind::Colon
                }
            }
            ';' => TokenKind::Semicolon,
            '@' => TokenKind::At,
            '&' => TokenKind::Amp,
            '^' => TokenKind::Caret,
            '+' => self.two_char('=', TokenKind::PlusEqual, TokenKind::Plus),
            '-' => {
                if self.peek() == '>' {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    self.two_char('=', TokenKind::MinusEqual, TokenKind::Minus)
                }
            }
            '*' => self.two_char('=', TokenKind::StarEqual, TokenKind::Star),
            '/' => self.two_char('=', TokenKind::SlashEqual, TokenKind::Slash),
            '%' => self.two_char('=', TokenKind::PercentEqual, TokenKind::Percent),
            '!' => self.two_char('=', TokenKind::BangEqual, TokenKind::Bang),
            '=' => {
                if self.peek() == '>' {
                    self.advance();
                    TokenKind::FatArrow
                } else {
                    self.two_char('=', TokenKind::EqualEqual, TokenKind::Equal)
                }
            }
            '<' => self.two_char('=', TokenKind::LessEqual, TokenKind::Less),
            '>' => self.two_char('=', TokenKind::GreaterEqual, TokenKind::Greater),
            '"' => return self.scan_string(start_loc, logger),
            c if c.is_ascii_digit() => return self.scan_number(start_pos, start_loc, logger),
            c if c.is_alphabetic() || c == '_' => return self.scan_identifier(start_pos, start_loc),
            other => {
                logger.report(Diagnostic::new(
                    ErrorKind::UnexpectedCharacter,
                    format!("unexpected character `{other}`"),
                    start_loc,
                ));
                return;
            }
        };

        let lexeme = &self.source[start_pos..self.pos];
        let len = u32::try_from(self.pos - start_pos).unwrap_or(u32::MAX);
        self.tokens.push(Token::new(kind, start_loc.with_length(len), lexeme));
    }

    fn two_char(&mut self, expect: char, then: TokenKind, otherwise: TokenKind) -> TokenKind {
        if self.peek() == expect {
            self.advance();
            then
        } else {
            otherwise
        }
    }

    fn scan_tuple_index(&mut self, start_loc: Location) {
        let start = self.pos;
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let text = &self.source[start..self.pos];
        let value: u32 = text.parse().unwrap_or(0);
        let len = u32::try_from(self.pos - start).unwrap_or(u32::MAX);
        self.tokens.push(
            Token::new(TokenKind::TupleIndex, start_loc.with_length(len + 1), format!(".{text}"))
                .with_literal(LiteralValue::Index(value)),
        );
    }

    fn scan_identifier(&mut self, start: usize, start_loc: Location) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }
        let text = &self.source[start..self.pos];
        let len = u32::try_from(self.pos - start).unwrap_or(u32::MAX);
        let kind = keyword_kind(text).unwrap_or(TokenKind::Identifier);
        self.tokens.push(Token::new(kind, start_loc.with_length(len), text));
    }

    fn scan_number(&mut self, start: usize, start_loc: Location, logger: &mut dyn Logger) {
        let base = if self.peek() == '0' {
            match self.peek_at(1) {
                Some('b') | Some('B') => {
                    self.advance();
                    self.advance();
                    2
                }
                Some('o') | Some('O') => {
                    self.advance();
                    self.advance();
                    8
                }
                Some('x') | Some('X') => {
                    self.advance();
                    self.advance();
                    16
                }
                _ => 10,
            }
        } else {
            10
        };

        let digits_start = self.pos;
        let mut is_float = false;
        let mut e_seen = false;
        loop {
            let c = self.peek();
            if c.is_digit(base) || c == '_' {
                self.advance();
            } else if base == 10 && c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) && !is_float {
                is_float = true;
                self.advance();
            } else if base == 10 && (c == 'e' || c == 'E') && !e_seen {
                e_seen = true;
                self.advance();
                if matches!(self.peek(), '+' | '-') {
                    self.advance();
                }
                is_float = true;
            } else if base == 10 && (c == 'e' || c == 'E') && e_seen {
                logger.report(Diagnostic::new(
                    ErrorKind::UnexpectedDotOrExponent,
                    "a numeric literal may have only one exponent",
                    start_loc,
                ));
                break;
            } else {
                break;
            }
        }

        if base != 10 {
            for ch in self.source[digits_start..self.pos].chars() {
                if ch != '_' && !ch.is_digit(base) {
                    logger.report(Diagnostic::new(
                        ErrorKind::DigitInWrongBase,
                        format!("digit `{ch}` is not valid in base {base}"),
                        start_loc,
                    ));
                    break;
                }
            }
        }

        let digits: String = self.source[digits_start..self.pos].chars().filter(|&c| c != '_').collect();

        let suffix_start = self.pos;
        while self.peek().is_ascii_alphanumeric() {
            self.advance();
        }
        let suffix = &self.source[suffix_start..self.pos];

        let (kind, literal) = classify_numeric_suffix(suffix, is_float, &digits, base);
        let kind = match kind {
            Some(k) => k,
            None => {
                logger.report(Diagnostic::new(
                    ErrorKind::UnexpectedDotOrExponent,
                    format!("unknown numeric suffix `{suffix}`"),
                    start_loc,
                ));
                if is_float {
                    TokenKind::FloatDefault
                } else {
                    TokenKind::IntDefault
                }
            }
        };

        let lexeme = &self.source[start..self.pos];
        let len = u32::try_from(self.pos - start).unwrap_or(u32::MAX);
        let mut token = Token::new(kind, start_loc.with_length(len), lexeme);
        if let Some(lit) = literal {
            token = token.with_literal(lit);
        } else if is_float {
            if let Ok(v) = digits.parse::<f64>() {
                token = token.with_literal(LiteralValue::Float(v));
            }
        } else if let Ok(v) = i128::from_str_radix(&digits, base) {
            token = token.with_literal(LiteralValue::Int(v));
        } else {
            logger.report(Diagnostic::new(ErrorKind::NumberTooLarge, "integer literal too large", start_loc));
        }
        self.tokens.push(token);
    }

    fn scan_string(&mut self, start_loc: Location, logger: &mut dyn Logger) {
        let mut value = String::new();
        loop {
            if self.is_at_end() || self.peek() == '\n' {
                logger.report(Diagnostic::new(ErrorKind::UnterminatedString, "unterminated string literal", start_loc));
                break;
            }
            let c = self.advance();
            if c == '"' {
                break;
            }
            if c == '\\' {
                let escaped = self.advance();
                value.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    'b' => '\u{8}',
                    'f' => '\u{c}',
                    '0' => '\0',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    '%' => '%',
                    '{' => '{',
                    other => other,
                });
            } else {
                value.push(c);
            }
        }
        let lexeme_len = u32::try_from(self.pos - start_loc.start_offset as usize).unwrap_or(u32::MAX);
        self.tokens.push(
            Token::new(TokenKind::StringLiteral, start_loc.with_length(lexeme_len), value.clone())
                .with_literal(LiteralValue::Str(value)),
        );
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self, logger: &mut dyn Logger) {
        let start_loc = self.here();
        self.advance();
        self.advance();
        self.comment_depth += 1;
        while self.comment_depth > 0 {
            if self.is_at_end() {
                break;
            }
            if self.peek() == '/' && self.peek_at(1) == Some('*') {
                self.advance();
                self.advance();
                self.comment_depth += 1;
            } else if self.peek() == '*' && self.peek_at(1) == Some('/') {
                self.advance();
                self.advance();
                self.comment_depth -= 1;
            } else {
                self.advance();
            }
        }
        if self.comment_depth > 0 && !self.repl_mode {
            logger.report(Diagnostic::new(ErrorKind::UnclosedComment, "unclosed block comment", start_loc));
        }
    }

    fn skip_intra_line_whitespace(&mut self) {
        while matches!(self.peek(), ' ' | '\t' | '\r') {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> char {
        self.peek_at(0).unwrap_or('\0')
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(offset)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn here(&self) -> Location {
        Location::new(self.buffer_id, u32::try_from(self.pos).unwrap_or(u32::MAX), self.line, self.column)
    }
}

fn classify_numeric_suffix(suffix: &str, is_float: bool, digits: &str, base: u32) -> (Option<TokenKind>, Option<LiteralValue>) {
    if suffix.is_empty() {
        return (Some(if is_float { TokenKind::FloatDefault } else { TokenKind::IntDefault }), None);
    }
    let kind = match suffix {
        "i8" => TokenKind::Int8,
        "i16" => TokenKind::Int16,
        "i32" => TokenKind::Int32,
        "i64" | "l" | "L" => TokenKind::Int64,
        "u8" => TokenKind::UInt8,
        "u16" => TokenKind::UInt16,
        "u32" => TokenKind::UInt32,
        "u64" | "u" | "U" | "ul" | "UL" => TokenKind::UInt64,
        "f32" => TokenKind::Float32,
        "f64" | "f" | "F" => TokenKind::Float64,
        _ => return (None, None),
    };
    if is_float && !matches!(kind, TokenKind::Float32 | TokenKind::Float64) {
        return (None, None);
    }
    if !is_float && matches!(kind, TokenKind::Float32 | TokenKind::Float64) {
        if let Ok(v) = digits.parse::<f64>() {
            return (Some(kind), Some(LiteralValue::Float(v)));
        }
    }
    if !is_float {
        if let Ok(v) = i128::from_str_radix(digits, base) {
            return (Some(kind), Some(LiteralValue::Int(v)));
        }
    }
    (Some(kind), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingLogger;

    fn scan(src: &str) -> (Vec<TokenKind>, bool, CollectingLogger) {
        let mut logger = CollectingLogger::new();
        let outcome = Lexer::new(src, 0, false).scan(&mut logger);
        (outcome.tokens.iter().map(|t| t.kind).collect(), outcome.incomplete, logger)
    }

    #[test]
    fn scenario_indent_dedent() {
        let (kinds, _, logger) = scan("a:\n  b\nc\n");
        assert!(!logger.has_errors());
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Indent,
                TokenKind::Identifier,
                TokenKind::Dedent,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn repl_mode_pauses_on_unclosed_comment() {
        let mut logger = CollectingLogger::new();
        let outcome = Lexer::new("/* still open", 0, true).scan(&mut logger);
        assert!(outcome.incomplete);
        assert!(!logger.has_errors());
    }

    #[test]
    fn repl_mode_pauses_on_trailing_colon() {
        let mut logger = CollectingLogger::new();
        let outcome = Lexer::new("if true:", 0, true).scan(&mut logger);
        assert!(outcome.incomplete);
    }

    #[test]
    fn two_char_operators_prefer_longest_match() {
        let (kinds, _, _) = scan("a::b += 1 -> c => d");
        assert!(kinds.contains(&TokenKind::ColonColon));
        assert!(kinds.contains(&TokenKind::PlusEqual));
        assert!(kinds.contains(&TokenKind::Arrow));
        assert!(kinds.contains(&TokenKind::FatArrow));
    }

    #[test]
    fn mixed_tabs_and_spaces_is_an_error() {
        let (_, _, logger) = scan("a:\n\t b\n");
        assert!(logger.has_errors());
    }

    #[test]
    fn numeric_suffixes_classify_width() {
        let (kinds, _, logger) = scan("1i8 2u64 3.0f32 4");
        assert!(!logger.has_errors());
        assert_eq!(kinds[0], TokenKind::Int8);
        assert_eq!(kinds[1], TokenKind::UInt64);
        assert_eq!(kinds[2], TokenKind::Float32);
        assert_eq!(kinds[3], TokenKind::IntDefault);
    }

    #[test]
    fn tuple_index_only_after_dot_digit() {
        let (kinds, _, _) = scan("x.0 x.field");
        assert_eq!(kinds[1], TokenKind::TupleIndex);
        assert_eq!(kinds[3], TokenKind::Dot);
    }

    #[test]
    fn nested_block_comments_track_depth() {
        let (kinds, _, logger) = scan("/* outer /* inner */ still */ a");
        assert!(!logger.has_errors());
        assert_eq!(kinds, vec![TokenKind::Identifier, TokenKind::Eof]);
    }
}
