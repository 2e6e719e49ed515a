//! Recursive-descent parser (spec §4.2).
//!
//! The expression grammar is precedence-climbing, top-down, one method per
//! precedence tier, lowest to highest:
//! `assignment → logical_or → logical_and → equality → comparison → term →
//! factor → cast → unary → postfix → primary`.

use crate::diagnostics::{Diagnostic, ErrorKind, Logger};
use crate::lexer::token::{Location, Token, TokenKind};
use crate::parser::ast::*;
use crate::symbol::tree::Name;

pub struct ParseOutcome {
    pub stmts: Vec<Stmt>,
    /// Set when, in REPL mode, the parser hit `Eof` while a primary
    /// expression was still expected — the driver turns this into
    /// `Pause(Input)` (spec §4.2).
    pub incomplete_statement: bool,
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    repl_mode: bool,
    incomplete_statement: bool,
}

type PResult<T> = Result<T, ()>;

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(tokens: &'a [Token], repl_mode: bool) -> Self {
        Self {
            tokens,
            pos: 0,
            repl_mode,
            incomplete_statement: false,
        }
    }

    pub fn parse_program(mut self, logger: &mut dyn Logger) -> ParseOutcome {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::Eof) {
            match self.declaration(logger) {
                Ok(stmt) => stmts.push(stmt),
                Err(()) => {
                    if self.incomplete_statement {
                        break;
                    }
                    self.synchronize();
                }
            }
        }
        stmts.push(Stmt::new(StmtKind::Eof, self.here()));
        ParseOutcome {
            stmts,
            incomplete_statement: self.incomplete_statement,
        }
    }

    // ---- token stream helpers ----

    fn here(&self) -> Location {
        self.tokens[self.pos.min(self.tokens.len() - 1)].location
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    fn advance(&mut self) -> &Token {
        if !self.at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn matches(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, logger: &mut dyn Logger, context: &str) -> PResult<&Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        if self.at_end() && self.repl_mode {
            self.incomplete_statement = true;
        }
        logger.report(Diagnostic::new(
            ErrorKind::ExpectedToken,
            format!("expected {kind} {context}, found {}", self.peek().kind),
            self.here(),
        ));
        Err(())
    }

    fn synchronize(&mut self) {
        self.advance();
        while !self.at_end() {
            if self.previous().kind == TokenKind::Dedent {
                return;
            }
            if matches!(
                self.peek().kind,
                TokenKind::Let
                    | TokenKind::Static
                    | TokenKind::Func
                    | TokenKind::Print
                    | TokenKind::Dealloc
                    | TokenKind::Pass
                    | TokenKind::Yield
                    | TokenKind::Break
                    | TokenKind::Return
                    | TokenKind::Continue
                    | TokenKind::Namespace
                    | TokenKind::Extern
                    | TokenKind::Struct
                    | TokenKind::Class
            ) {
                return;
            }
            self.advance();
        }
    }

    // ---- declarations / statements ----

    fn declaration(&mut self, logger: &mut dyn Logger) -> PResult<Stmt> {
        if self.check(TokenKind::Let) {
            return self.let_statement(logger, false);
        }
        if self.check(TokenKind::Static) {
            return self.let_statement(logger, true);
        }
        if self.check(TokenKind::Func) {
            return self.func_statement(logger);
        }
        if self.check(TokenKind::Class) || self.check(TokenKind::Struct) {
            return self.struct_statement(logger);
        }
        if self.check(TokenKind::Namespace) {
            return self.namespace_statement(logger);
        }
        if self.check(TokenKind::Extern) {
            return self.extern_statement(logger);
        }
        self.statement(logger)
    }

    fn statement(&mut self, logger: &mut dyn Logger) -> PResult<Stmt> {
        let loc = self.here();
        if self.matches(&[TokenKind::Print]) {
            let mut exprs = vec![self.expression(logger)?];
            while self.matches(&[TokenKind::Comma]) {
                exprs.push(self.expression(logger)?);
            }
            return Ok(Stmt::new(StmtKind::Print(exprs), loc));
        }
        if self.matches(&[TokenKind::Dealloc]) {
            let expr = self.expression(logger)?;
            return Ok(Stmt::new(StmtKind::Dealloc(expr), loc));
        }
        if self.matches(&[TokenKind::Pass]) {
            return Ok(Stmt::new(StmtKind::Pass, loc));
        }
        if self.matches(&[TokenKind::Continue]) {
            return Ok(Stmt::new(StmtKind::Continue, loc));
        }
        if self.matches(&[TokenKind::Yield]) {
            let expr = self.optional_trailing_expr(logger)?;
            return Ok(Stmt::new(
                StmtKind::Yield {
                    kind: YieldKind::Yield,
                    expr,
                    target_block: None,
                },
                loc,
            ));
        }
        if self.matches(&[TokenKind::Break]) {
            let expr = self.optional_trailing_expr(logger)?;
            return Ok(Stmt::new(
                StmtKind::Yield {
                    kind: YieldKind::Break,
                    expr,
                    target_block: None,
                },
                loc,
            ));
        }
        if self.matches(&[TokenKind::Return]) {
            let expr = self.optional_trailing_expr(logger)?;
            return Ok(Stmt::new(
                StmtKind::Yield {
                    kind: YieldKind::Return,
                    expr,
                    target_block: None,
                },
                loc,
            ));
        }
        let expr = self.expression(logger)?;
        Ok(Stmt::new(StmtKind::Expression(expr), loc))
    }

    /// `yield`/`break`/`return` may be bare (no trailing expression) when
    /// the next token starts a new statement/dedent rather than an
    /// expression.
    fn optional_trailing_expr(&mut self, logger: &mut dyn Logger) -> PResult<Option<Expr>> {
        if matches!(
            self.peek().kind,
            TokenKind::Dedent | TokenKind::Eof | TokenKind::RightBrace
        ) {
            return Ok(None);
        }
        Ok(Some(self.expression(logger)?))
    }

    /// Parses a declaration-site identifier, rejecting any `::` component
    /// (spec §4.2: "names in declarations reject any `::` component").
    fn declared_name(&mut self, logger: &mut dyn Logger, context: &str) -> PResult<String> {
        let loc = self.here();
        self.expect(TokenKind::Identifier, logger, context)?;
        self.pos -= 1;
        let name = self.parse_multi_part_name();
        if name.parts.len() > 1 {
            logger.report(Diagnostic::new(
                ErrorKind::DeclarationIdentWithColonColon,
                "a declared name cannot contain `::`",
                loc,
            ));
        }
        Ok(name.parts.into_iter().next().unwrap_or_default())
    }

    fn let_statement(&mut self, logger: &mut dyn Logger, is_static: bool) -> PResult<Stmt> {
        let loc = self.here();
        self.advance();
        let has_var = self.matches(&[TokenKind::Var]);
        let name = self.declared_name(logger, "in declaration")?;

        let annotation = if self.matches(&[TokenKind::Colon]) {
            Some(self.annotation(logger)?)
        } else {
            None
        };
        let initializer = if self.matches(&[TokenKind::Equal]) {
            Some(self.expression(logger)?)
        } else {
            None
        };

        if annotation.is_none() && initializer.is_none() {
            logger.report(Diagnostic::new(
                ErrorKind::ExpectedType,
                "a `let`/`static` binding needs an annotation or an initializer",
                loc,
            ));
        }

        let kind = if is_static {
            StmtKind::Static {
                name,
                has_var,
                annotation,
                initializer,
                field_entry: None,
            }
        } else {
            StmtKind::Let {
                name,
                has_var,
                annotation,
                initializer,
                field_entry: None,
            }
        };
        Ok(Stmt::new(kind, loc))
    }

    fn func_statement(&mut self, logger: &mut dyn Logger) -> PResult<Stmt> {
        let loc = self.here();
        self.advance();
        let name = self.declared_name(logger, "after `func`")?;
        self.expect(TokenKind::LeftParen, logger, "to start parameter list")?;
        let params = self.parameter_list(logger)?;
        self.expect(TokenKind::RightParen, logger, "to close parameter list")?;
        let return_annotation = if self.matches(&[TokenKind::Arrow]) {
            Some(self.annotation(logger)?)
        } else {
            None
        };
        let body = if self.matches(&[TokenKind::FatArrow]) {
            let expr_loc = self.here();
            let value = self.expression(logger)?;
            Expr::new(
                ExprKind::Block(Block {
                    open_token: expr_loc,
                    stmts: vec![Stmt::new(
                        StmtKind::Yield {
                            kind: YieldKind::Return,
                            expr: Some(value),
                            target_block: None,
                        },
                        expr_loc,
                    )],
                    label: None,
                    kind: BlockKind::Function,
                    is_unsafe: false,
                    local_scope: None,
                }),
                expr_loc,
            )
        } else {
            self.block(logger, BlockKind::Function)?
        };
        Ok(Stmt::new(
            StmtKind::Func {
                name,
                params,
                return_annotation,
                body,
                field_entry: None,
            },
            loc,
        ))
    }

    fn parameter_list(&mut self, logger: &mut dyn Logger) -> PResult<Vec<ParamDecl>> {
        let mut params = Vec::new();
        if self.check(TokenKind::RightParen) {
            return Ok(params);
        }
        loop {
            let loc = self.here();
            let has_var = self.matches(&[TokenKind::Var]);
            let name_tok = self.expect(TokenKind::Identifier, logger, "in parameter list")?.clone();
            self.expect(TokenKind::Colon, logger, "after parameter name")?;
            let annotation = self.annotation(logger)?;
            let default_expr = if self.matches(&[TokenKind::Equal]) {
                Some(self.expression(logger)?)
            } else {
                None
            };
            params.push(ParamDecl {
                name: name_tok.lexeme.clone(),
                has_var,
                annotation,
                default_expr,
                location: loc,
            });
            if !self.matches(&[TokenKind::Comma]) {
                break;
            }
            if self.check(TokenKind::RightParen) {
                break;
            }
        }
        Ok(params)
    }

    fn struct_statement(&mut self, logger: &mut dyn Logger) -> PResult<Stmt> {
        let loc = self.here();
        let is_class = self.matches(&[TokenKind::Class]);
        self.expect(TokenKind::Struct, logger, "to declare a struct")?;
        let name = self.declared_name(logger, "after `struct`")?;
        let (properties, methods) = self.member_body(logger)?;
        Ok(Stmt::new(
            StmtKind::Struct {
                name,
                is_class,
                properties,
                methods,
                field_entry: None,
            },
            loc,
        ))
    }

    fn namespace_statement(&mut self, logger: &mut dyn Logger) -> PResult<Stmt> {
        let loc = self.here();
        self.advance();
        let name = self.declared_name(logger, "after `namespace`")?;
        let (body, _) = self.member_body(logger)?;
        Ok(Stmt::new(StmtKind::Namespace { name, body }, loc))
    }

    fn extern_statement(&mut self, logger: &mut dyn Logger) -> PResult<Stmt> {
        let loc = self.here();
        self.advance();
        let name_tok = self.expect(TokenKind::Identifier, logger, "after `extern`")?.clone();
        let name = name_tok.lexeme.clone();
        let mut declarations = Vec::new();
        let braces = self.matches(&[TokenKind::LeftBrace]);
        if !braces {
            self.expect(TokenKind::Colon, logger, "to open an `extern` block")?;
            self.expect(TokenKind::Indent, logger, "to open an `extern` block")?;
        }
        while !self.check(TokenKind::Dedent) && !self.check(TokenKind::RightBrace) && !self.at_end() {
            let decl_loc = self.here();
            self.expect(TokenKind::Func, logger, "in `extern` block")?;
            let decl_name = self.expect(TokenKind::Identifier, logger, "in `extern` function signature")?.lexeme.clone();
            self.expect(TokenKind::LeftParen, logger, "to start parameter list")?;
            let params = self.parameter_list(logger)?;
            self.expect(TokenKind::RightParen, logger, "to close parameter list")?;
            let return_annotation = if self.matches(&[TokenKind::Arrow]) {
                Some(self.annotation(logger)?)
            } else {
                None
            };
            declarations.push(ExternDecl {
                name: decl_name,
                params,
                return_annotation,
                location: decl_loc,
            });
        }
        if braces {
            self.expect(TokenKind::RightBrace, logger, "to close `extern` block")?;
        } else {
            self.expect(TokenKind::Dedent, logger, "to close `extern` block")?;
        }
        Ok(Stmt::new(StmtKind::Extern { name, declarations }, loc))
    }

    /// Shared body parser for `namespace`/`struct`: a sequence of
    /// declaration-space statements, splitting `Func` members from
    /// everything else so struct callers get properties/methods apart.
    fn member_body(&mut self, logger: &mut dyn Logger) -> PResult<(Vec<Stmt>, Vec<Stmt>)> {
        let mut properties = Vec::new();
        let mut methods = Vec::new();
        let braces = self.matches(&[TokenKind::LeftBrace]);
        if !braces {
            self.expect(TokenKind::Colon, logger, "to open a body")?;
            self.expect(TokenKind::Indent, logger, "to open a body")?;
        }
        while !self.check(TokenKind::Dedent) && !self.check(TokenKind::RightBrace) && !self.at_end() {
            match self.declaration(logger) {
                Ok(stmt) => {
                    if matches!(stmt.kind, StmtKind::Func { .. }) {
                        methods.push(stmt);
                    } else {
                        properties.push(stmt);
                    }
                }
                Err(()) => {
                    if self.incomplete_statement {
                        break;
                    }
                    self.synchronize();
                }
            }
        }
        if braces {
            self.expect(TokenKind::RightBrace, logger, "to close body")?;
        } else {
            self.expect(TokenKind::Dedent, logger, "to close body")?;
        }
        Ok((properties, methods))
    }

    // ---- expressions ----

    fn expression(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        self.assignment(logger)
    }

    fn assignment(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        let target = self.logical_or(logger)?;
        const COMPOUND: &[(TokenKind, BinaryOp)] = &[
            (TokenKind::PlusEqual, BinaryOp::Add),
            (TokenKind::MinusEqual, BinaryOp::Sub),
            (TokenKind::StarEqual, BinaryOp::Mul),
            (TokenKind::SlashEqual, BinaryOp::Div),
            (TokenKind::PercentEqual, BinaryOp::Rem),
        ];
        if self.check(TokenKind::Equal) {
            let loc = self.here();
            self.advance();
            let value = self.assignment(logger)?;
            return Ok(Expr::new(
                ExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                loc,
            ));
        }
        for &(kind, op) in COMPOUND {
            if self.check(kind) {
                let loc = self.here();
                self.advance();
                let rhs = self.assignment(logger)?;
                // Desugar `a OP= b` into `a = (a OP b)`; the binary
                // sub-expression's location is the `OP=` token's (§4.2).
                let binary = Expr::new(
                    ExprKind::Binary {
                        op,
                        left: Box::new(target.clone()),
                        right: Box::new(rhs),
                    },
                    loc,
                );
                return Ok(Expr::new(
                    ExprKind::Assign {
                        target: Box::new(target),
                        value: Box::new(binary),
                    },
                    loc,
                ));
            }
        }
        Ok(target)
    }

    fn logical_or(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        let mut left = self.logical_and(logger)?;
        while self.check(TokenKind::Or) {
            let loc = self.here();
            self.advance();
            let right = self.logical_and(logger)?;
            left = Expr::new(
                ExprKind::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn logical_and(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        let mut left = self.equality(logger)?;
        while self.check(TokenKind::And) {
            let loc = self.here();
            self.advance();
            let right = self.equality(logger)?;
            left = Expr::new(
                ExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        logger: &mut dyn Logger,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self, &mut dyn Logger) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let mut left = next(self, logger)?;
        'outer: loop {
            for &(kind, op) in ops {
                if self.check(kind) {
                    let loc = self.here();
                    self.advance();
                    let right = next(self, logger)?;
                    left = Expr::new(
                        ExprKind::Binary {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        loc,
                    );
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn equality(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        self.binary_level(
            logger,
            &[(TokenKind::EqualEqual, BinaryOp::Eq), (TokenKind::BangEqual, BinaryOp::NotEq)],
            Self::comparison,
        )
    }

    fn comparison(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        self.binary_level(
            logger,
            &[
                (TokenKind::Less, BinaryOp::Less),
                (TokenKind::LessEqual, BinaryOp::LessEq),
                (TokenKind::Greater, BinaryOp::Greater),
                (TokenKind::GreaterEqual, BinaryOp::GreaterEq),
            ],
            Self::term,
        )
    }

    fn term(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        self.binary_level(logger, &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)], Self::factor)
    }

    fn factor(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        self.binary_level(
            logger,
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Rem),
            ],
            Self::cast,
        )
    }

    fn cast(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        let mut expr = self.unary(logger)?;
        while self.matches(&[TokenKind::As]) {
            let loc = self.here();
            let target = self.annotation(logger)?;
            expr = Expr::new(
                ExprKind::Cast {
                    expr: Box::new(expr),
                    target,
                    resolved_op: None,
                },
                loc,
            );
        }
        Ok(expr)
    }

    fn unary(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        let loc = self.here();
        if self.matches(&[TokenKind::Minus]) {
            let operand = self.unary(logger)?;
            return Ok(Expr::new(ExprKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) }, loc));
        }
        if self.matches(&[TokenKind::Not, TokenKind::Bang]) {
            let operand = self.unary(logger)?;
            return Ok(Expr::new(ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(operand) }, loc));
        }
        if self.matches(&[TokenKind::Caret]) {
            let operand = self.unary(logger)?;
            return Ok(Expr::new(ExprKind::Deref { operand: Box::new(operand) }, loc));
        }
        let has_var = self.matches(&[TokenKind::Var]);
        if self.check(TokenKind::At) || self.check(TokenKind::Amp) {
            let op = if self.check(TokenKind::At) { AddressOp::AddressOf } else { AddressOp::Reference };
            self.advance();
            let right = self.unary(logger)?;
            return Ok(Expr::new(
                ExprKind::Address {
                    op,
                    right: Box::new(right),
                    has_var,
                },
                loc,
            ));
        }
        if has_var {
            logger.report(Diagnostic::new(
                ErrorKind::ExpectedExpression,
                "`var` is only meaningful before `@`/`&`",
                loc,
            ));
        }
        self.postfix(logger)
    }

    fn postfix(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        let mut expr = self.primary(logger)?;
        loop {
            if self.matches(&[TokenKind::Dot]) {
                let loc = self.here();
                if self.check(TokenKind::TupleIndex) {
                    let tok = self.advance().clone();
                    let index = match tok.literal {
                        Some(crate::lexer::token::LiteralValue::Index(i)) => i,
                        _ => 0,
                    };
                    expr = Expr::new(
                        ExprKind::Access {
                            left: Box::new(expr),
                            member: AccessMember::TupleIndex(index),
                        },
                        loc,
                    );
                } else {
                    let name_tok = self.expect(TokenKind::Identifier, logger, "after `.`")?.clone();
                    expr = Expr::new(
                        ExprKind::Access {
                            left: Box::new(expr),
                            member: AccessMember::Field(name_tok.lexeme),
                        },
                        loc,
                    );
                }
            } else if self.matches(&[TokenKind::LeftBracket]) {
                let loc = self.here();
                let index = self.expression(logger)?;
                self.expect(TokenKind::RightBracket, logger, "to close subscript")?;
                expr = Expr::new(
                    ExprKind::Subscript {
                        left: Box::new(expr),
                        index: Box::new(index),
                    },
                    loc,
                );
            } else if self.matches(&[TokenKind::LeftParen]) {
                let loc = self.here();
                let (positional, named) = self.argument_list(logger)?;
                self.expect(TokenKind::RightParen, logger, "to close call arguments")?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        positional,
                        named,
                        resolved_args: None,
                    },
                    loc,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn argument_list(&mut self, logger: &mut dyn Logger) -> PResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut positional = Vec::new();
        let mut named = Vec::new();
        if self.check(TokenKind::RightParen) {
            return Ok((positional, named));
        }
        loop {
            if self.check(TokenKind::Identifier) && self.peek_ahead(1).kind == TokenKind::Colon {
                let name_tok = self.advance().clone();
                self.advance(); // colon
                let value = self.expression(logger)?;
                named.push((name_tok.lexeme, value));
            } else {
                let value = self.expression(logger)?;
                if !named.is_empty() {
                    logger.report(Diagnostic::new(
                        ErrorKind::PosArgumentAfterNamedArgument,
                        "a positional argument cannot follow a named argument",
                        value.location,
                    ));
                }
                positional.push(value);
            }
            if !self.matches(&[TokenKind::Comma]) {
                break;
            }
            if self.check(TokenKind::RightParen) {
                break;
            }
        }
        Ok((positional, named))
    }

    fn peek_ahead(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn primary(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        let loc = self.here();

        if self.at_end() {
            if self.repl_mode {
                self.incomplete_statement = true;
            }
            logger.report(Diagnostic::new(ErrorKind::ExpectedExpression, "expected an expression", loc));
            return Err(());
        }

        if matches!(
            self.peek().kind,
            TokenKind::IntDefault
                | TokenKind::Int8
                | TokenKind::Int16
                | TokenKind::Int32
                | TokenKind::Int64
                | TokenKind::UInt8
                | TokenKind::UInt16
                | TokenKind::UInt32
                | TokenKind::UInt64
                | TokenKind::FloatDefault
                | TokenKind::Float32
                | TokenKind::Float64
                | TokenKind::StringLiteral
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Nullptr
                | TokenKind::Inf
                | TokenKind::Inf32
                | TokenKind::Inf64
                | TokenKind::Nan
                | TokenKind::Nan32
                | TokenKind::Nan64
        ) {
            let tok = self.advance().clone();
            return Ok(Expr::new(ExprKind::Literal(tok), loc));
        }

        if self.check(TokenKind::Identifier) {
            let name = self.parse_multi_part_name();
            return Ok(Expr::new(
                ExprKind::NameRef {
                    name,
                    field_entry: None,
                },
                loc,
            ));
        }

        if self.matches(&[TokenKind::LeftParen]) {
            if self.matches(&[TokenKind::RightParen]) {
                return Ok(Expr::new(ExprKind::Unit, loc));
            }
            let first = self.expression(logger)?;
            if self.matches(&[TokenKind::Comma]) {
                let mut elements = vec![first];
                while !self.check(TokenKind::RightParen) {
                    elements.push(self.expression(logger)?);
                    if !self.matches(&[TokenKind::Comma]) {
                        break;
                    }
                }
                self.expect(TokenKind::RightParen, logger, "to close tuple")?;
                return Ok(Expr::new(ExprKind::Tuple(elements), loc));
            }
            self.expect(TokenKind::RightParen, logger, "to close grouping")?;
            return Ok(first);
        }

        if self.matches(&[TokenKind::LeftBracket]) {
            let mut elements = Vec::new();
            while !self.check(TokenKind::RightBracket) {
                elements.push(self.expression(logger)?);
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
            self.expect(TokenKind::RightBracket, logger, "to close array literal")?;
            return Ok(Expr::new(ExprKind::Array(elements), loc));
        }

        if self.check(TokenKind::LeftBrace) || self.check(TokenKind::Indent) {
            return self.block(logger, BlockKind::Plain);
        }

        if self.matches(&[TokenKind::Unsafe]) {
            let mut block = self.block(logger, BlockKind::Plain)?;
            if let ExprKind::Block(b) = &mut block.kind {
                b.is_unsafe = true;
            }
            return Ok(block);
        }

        if self.matches(&[TokenKind::If]) {
            return self.conditional(logger, loc);
        }

        if self.matches(&[TokenKind::Loop]) {
            let body = self.loop_body(logger)?;
            return Ok(Expr::new(
                ExprKind::Loop {
                    cond: None,
                    body: Box::new(body),
                    loops_once: false,
                },
                loc,
            ));
        }

        if self.matches(&[TokenKind::While]) {
            let cond = self.expression(logger)?;
            self.matches(&[TokenKind::Do]);
            let (cond, loops_once_inf) = self.fold_true_condition(cond);
            let body = self.loop_body(logger)?;
            return Ok(Expr::new(
                ExprKind::Loop {
                    cond,
                    body: Box::new(body),
                    loops_once: loops_once_inf,
                },
                loc,
            ));
        }

        if self.matches(&[TokenKind::Do]) {
            let body = self.loop_body(logger)?;
            self.expect(TokenKind::While, logger, "to close a `do-while` loop")?;
            let cond = self.expression(logger)?;
            let (cond, _) = self.fold_true_condition(cond);
            return Ok(Expr::new(
                ExprKind::Loop {
                    cond,
                    body: Box::new(body),
                    loops_once: true,
                },
                loc,
            ));
        }

        if self.matches(&[TokenKind::SizeOf]) {
            let annotation = self.annotation(logger)?;
            return Ok(Expr::new(
                ExprKind::SizeOf {
                    annotation,
                    resolved_inner_type: None,
                },
                loc,
            ));
        }

        if self.matches(&[TokenKind::Alloc]) {
            return self.alloc_expr(logger, loc);
        }

        logger.report(Diagnostic::new(
            ErrorKind::ExpectedExpression,
            format!("expected an expression, found {}", self.peek().kind),
            loc,
        ));
        Err(())
    }

    /// When the condition is the literal `true`, the parser drops it and
    /// marks the loop as infinite (`cond: None`, here folded into the
    /// "infinite" signal the caller reuses as `loops_once`'s sibling).
    fn fold_true_condition(&self, cond: Expr) -> (Option<Box<Expr>>, bool) {
        if matches!(&cond.kind, ExprKind::Literal(tok) if tok.kind == TokenKind::True) {
            (None, false)
        } else {
            (Some(Box::new(cond)), false)
        }
    }

    fn loop_body(&mut self, logger: &mut dyn Logger) -> PResult<Expr> {
        if self.check(TokenKind::LeftBrace) || self.check(TokenKind::Indent) {
            self.block(logger, BlockKind::Loop)
        } else {
            let loc = self.here();
            let value = self.expression(logger)?;
            Ok(Expr::new(
                ExprKind::Block(Block {
                    open_token: loc,
                    stmts: vec![Stmt::new(
                        StmtKind::Yield {
                            kind: YieldKind::Yield,
                            expr: Some(value),
                            target_block: None,
                        },
                        loc,
                    )],
                    label: None,
                    kind: BlockKind::Loop,
                    is_unsafe: false,
                    local_scope: None,
                }),
                loc,
            ))
        }
    }

    fn conditional(&mut self, logger: &mut dyn Logger, loc: Location) -> PResult<Expr> {
        let cond = self.expression(logger)?;
        let then_branch = if self.check(TokenKind::LeftBrace) || self.check(TokenKind::Indent) {
            self.block(logger, BlockKind::Plain)?
        } else {
            self.expression(logger)?
        };
        let (else_branch, implicit_else) = if self.matches(&[TokenKind::Else]) {
            let branch = if self.check(TokenKind::If) {
                self.advance();
                self.conditional(logger, self.here())?
            } else if self.check(TokenKind::LeftBrace) || self.check(TokenKind::Indent) {
                self.block(logger, BlockKind::Plain)?
            } else {
                self.expression(logger)?
            };
            (branch, false)
        } else {
            (Expr::new(ExprKind::Unit, loc), true)
        };
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
                implicit_else,
            },
            loc,
        ))
    }

    fn alloc_expr(&mut self, logger: &mut dyn Logger, loc: Location) -> PResult<Expr> {
        if self.matches(&[TokenKind::With]) {
            let init = self.expression(logger)?;
            return Ok(Expr::new(ExprKind::Alloc(AllocForm::InitOnly { init: Box::new(init) }), loc));
        }
        if self.matches(&[TokenKind::For]) {
            let amount = self.expression(logger)?;
            self.expect(TokenKind::Of, logger, "in `alloc for ... of ...`")?;
            let ty = self.annotation(logger)?;
            return Ok(Expr::new(
                ExprKind::Alloc(AllocForm::ForAmountOf {
                    amount: Box::new(amount),
                    ty,
                }),
                loc,
            ));
        }
        let ty = self.annotation(logger)?;
        let init = if self.matches(&[TokenKind::With]) {
            Some(Box::new(self.expression(logger)?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Alloc(AllocForm::Typed { ty, init }), loc))
    }

    fn block(&mut self, logger: &mut dyn Logger, kind: BlockKind) -> PResult<Expr> {
        let loc = self.here();
        let braces = self.matches(&[TokenKind::LeftBrace]);
        if !braces {
            self.expect(TokenKind::Indent, logger, "to open a block")?;
        }
        let mut stmts = Vec::new();
        let close_kind = if braces { TokenKind::RightBrace } else { TokenKind::Dedent };
        while !self.check(close_kind) && !self.at_end() {
            match self.declaration(logger) {
                Ok(stmt) => stmts.push(stmt),
                Err(()) => {
                    if self.incomplete_statement {
                        break;
                    }
                    self.synchronize();
                }
            }
        }
        self.expect(close_kind, logger, "to close a block")?;
        Ok(Expr::new(
            ExprKind::Block(Block {
                open_token: loc,
                stmts,
                label: None,
                kind,
                is_unsafe: false,
                local_scope: None,
            }),
            loc,
        ))
    }

    // ---- names & annotations ----

    fn parse_multi_part_name(&mut self) -> Name {
        let mut parts = vec![self.advance().lexeme.clone()];
        while self.check(TokenKind::ColonColon) {
            self.advance();
            if self.check(TokenKind::Identifier) {
                parts.push(self.advance().lexeme.clone());
            } else {
                break;
            }
        }
        Name { parts }
    }

    fn annotation(&mut self, logger: &mut dyn Logger) -> PResult<Annotation> {
        let loc = self.here();
        let has_var = self.matches(&[TokenKind::Var]);

        if self.matches(&[TokenKind::At]) {
            let base = self.annotation(logger)?;
            return Ok(Annotation::new(
                AnnotationKind::Pointer {
                    base: Box::new(base),
                    is_mutable: has_var,
                },
                loc,
            ));
        }
        if self.matches(&[TokenKind::Amp]) {
            let base = self.annotation(logger)?;
            return Ok(Annotation::new(
                AnnotationKind::Reference {
                    base: Box::new(base),
                    is_mutable: has_var,
                },
                loc,
            ));
        }
        if has_var {
            logger.report(Diagnostic::new(ErrorKind::ExpectedType, "`var` is only valid before `@`/`&`", loc));
        }

        if self.matches(&[TokenKind::Nullptr]) {
            return Ok(Annotation::new(AnnotationKind::Nullptr, loc));
        }

        if self.matches(&[TokenKind::LeftBracket]) {
            let base = if self.check(TokenKind::RightBracket) || self.check(TokenKind::Semicolon) {
                None
            } else {
                Some(Box::new(self.annotation(logger)?))
            };
            let size = if self.matches(&[TokenKind::Semicolon]) {
                if self.check(TokenKind::RightBracket) {
                    None
                } else {
                    Some(Box::new(self.expression(logger)?))
                }
            } else {
                None
            };
            self.expect(TokenKind::RightBracket, logger, "to close array annotation")?;
            return Ok(Annotation::new(AnnotationKind::Array { base, size }, loc));
        }

        if self.matches(&[TokenKind::LeftBrace]) {
            let mut fields = Vec::new();
            while !self.check(TokenKind::RightBrace) {
                let field_name = self.expect(TokenKind::Identifier, logger, "in object type")?.lexeme.clone();
                self.expect(TokenKind::Colon, logger, "after field name")?;
                let field_ty = self.annotation(logger)?;
                fields.push((field_name, field_ty));
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
            self.expect(TokenKind::RightBrace, logger, "to close object type")?;
            return Ok(Annotation::new(AnnotationKind::Object { fields }, loc));
        }

        if self.matches(&[TokenKind::LeftParen]) {
            let mut elements = Vec::new();
            while !self.check(TokenKind::RightParen) {
                elements.push(self.annotation(logger)?);
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
            self.expect(TokenKind::RightParen, logger, "to close tuple type")?;
            return Ok(Annotation::new(AnnotationKind::Tuple(elements), loc));
        }

        if self.check(TokenKind::Identifier) && self.peek().lexeme == "typeof" {
            self.advance();
            self.expect(TokenKind::LeftParen, logger, "after `typeof`")?;
            let expr = self.expression(logger)?;
            self.expect(TokenKind::RightParen, logger, "to close `typeof`")?;
            return Ok(Annotation::new(AnnotationKind::TypeOf(Box::new(expr)), loc));
        }

        if self.check(TokenKind::Identifier) {
            let name = self.parse_multi_part_name();
            return Ok(Annotation::new(AnnotationKind::NameRef(name), loc));
        }

        if self.at_end() && self.repl_mode {
            self.incomplete_statement = true;
        }
        logger.report(Diagnostic::new(ErrorKind::ExpectedType, "expected a type annotation", loc));
        Err(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingLogger;
    use crate::lexer::lexer::Lexer;

    fn parse(src: &str) -> (ParseOutcome, CollectingLogger) {
        let mut logger = CollectingLogger::new();
        let outcome = Lexer::new(src, 0, false).scan(&mut logger);
        let parser = Parser::new(&outcome.tokens, false);
        let result = parser.parse_program(&mut logger);
        (result, logger)
    }

    #[test]
    fn parses_let_with_annotation_and_initializer() {
        let (outcome, logger) = parse("let a: i32 = 1\n");
        assert!(!logger.has_errors());
        assert!(matches!(outcome.stmts[0].kind, StmtKind::Let { .. }));
    }

    #[test]
    fn positional_after_named_is_an_error() {
        let (_, logger) = parse("f(a: 1, 2)\n");
        assert!(logger.has_errors());
    }

    #[test]
    fn compound_assignment_desugars_to_binary() {
        let (outcome, logger) = parse("a += 1\n");
        assert!(!logger.has_errors());
        let StmtKind::Expression(expr) = &outcome.stmts[0].kind else {
            panic!("expected expression statement");
        };
        match &expr.kind {
            ExprKind::Assign { value, .. } => assert!(matches!(value.kind, ExprKind::Binary { op: BinaryOp::Add, .. })),
            _ => panic!("expected assign"),
        }
    }

    #[test]
    fn declaration_name_with_colon_colon_is_rejected() {
        let (_, logger) = parse("let a::b = 1\n");
        assert!(logger.has_errors());
    }

    #[test]
    fn alloc_for_amount_of_parses() {
        let (outcome, logger) = parse("alloc for 10 of i32\n");
        assert!(!logger.has_errors());
        let StmtKind::Expression(expr) = &outcome.stmts[0].kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr.kind, ExprKind::Alloc(AllocForm::ForAmountOf { .. })));
    }
}
