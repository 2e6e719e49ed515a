//! The combined expression/annotation/statement checker (spec §4.4, §4.5) —
//! the pipeline's `ExprChecker+StmtChecker` stage. Visits each expression
//! once in post-order, annotates `resolved_type`, and enforces unsafe
//! context, overload resolution, and control-flow targeting.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::diagnostics::{Diagnostic, ErrorKind, Logger};
use crate::lexer::token::{Location, LiteralValue, TokenKind};
use crate::parser::ast::*;
use crate::symbol::tree::{Field, LocalScopeKind, NodeKind, SymbolTree};
use crate::types::{FunctionType, Type};

/// Resolves an annotation into a `Type` using only symbol-tree lookups —
/// no expression type-checking, so `typeof(...)` inside it is rejected.
/// Used by the global pass (parameter/return types) where no checker
/// context exists yet; [`Checker::annotation_type`] is the full version.
pub fn resolve_annotation(tree: &SymbolTree, logger: &mut dyn Logger, ann: &Annotation) -> Option<Type> {
    match &ann.kind {
        AnnotationKind::NameRef(name) => {
            let Some(node_id) = tree.resolve_name(name) else {
                logger.report(Diagnostic::new(
                    ErrorKind::UndeclaredName,
                    format!("undeclared type `{}`", name.parts.join("::")),
                    ann.location,
                ));
                return None;
            };
            match &tree.node(node_id).kind {
                NodeKind::PrimitiveType { ty } => Some(ty.clone()),
                NodeKind::StructDef { .. } => Some(Type::Named {
                    node: node_id,
                    symbol: tree.symbol_of(node_id),
                }),
                _ => {
                    logger.report(Diagnostic::new(
                        ErrorKind::ExpectedType,
                        format!("`{}` does not name a type", name.parts.join("::")),
                        ann.location,
                    ));
                    None
                }
            }
        }
        AnnotationKind::Pointer { base, is_mutable } => resolve_annotation(tree, logger, base).map(|b| Type::raw_ptr(b, *is_mutable)),
        AnnotationKind::Nullptr => Some(Type::Nullptr),
        AnnotationKind::Reference { base, is_mutable } => resolve_annotation(tree, logger, base).map(|b| Type::reference(b, *is_mutable)),
        AnnotationKind::Array { base, size } => {
            let Some(base_ann) = base else { return Some(Type::EmptyArray) };
            let base_ty = resolve_annotation(tree, logger, base_ann)?;
            let size_val = size.as_ref().and_then(|e| literal_u64(e));
            Some(Type::array(base_ty, size_val))
        }
        AnnotationKind::Object { fields } => {
            let mut map = IndexMap::new();
            for (name, field_ann) in fields {
                map.insert(name.clone(), resolve_annotation(tree, logger, field_ann)?);
            }
            Some(Type::Object { fields: map })
        }
        AnnotationKind::Tuple(elements) => {
            let mut out = Vec::new();
            for element in elements {
                out.push(resolve_annotation(tree, logger, element)?);
            }
            Some(Type::Tuple(out))
        }
        AnnotationKind::TypeOf(_) => {
            logger.report(Diagnostic::new(
                ErrorKind::ExpectedType,
                "`typeof` is only valid where an expression can be checked",
                ann.location,
            ));
            None
        }
    }
}

fn literal_u64(expr: &Expr) -> Option<u64> {
    match &expr.kind {
        ExprKind::Literal(tok) => match &tok.literal {
            Some(LiteralValue::Int(v)) => u64::try_from(*v).ok(),
            _ => None,
        },
        _ => None,
    }
}

/// One "effectively callable signature" per subset of omittable defaulted
/// parameters (spec §4.5's disjointness rule), keyed by `name:type`.
#[must_use]
pub fn signature_key_sets(f: &FunctionType) -> Vec<BTreeSet<String>> {
    let required: Vec<String> = f
        .parameters
        .iter()
        .filter(|(_, p)| !p.has_default)
        .map(|(n, p)| format!("{n}:{}", p.ty.canonical()))
        .collect();
    let optional: Vec<String> = f
        .parameters
        .iter()
        .filter(|(_, p)| p.has_default)
        .map(|(n, p)| format!("{n}:{}", p.ty.canonical()))
        .collect();

    let n = optional.len().min(20);
    let mut sets = Vec::with_capacity(1usize << n);
    for mask in 0..(1u32 << n) {
        let mut set: BTreeSet<String> = required.iter().cloned().collect();
        for (i, opt) in optional.iter().enumerate().take(n) {
            if mask & (1 << i) != 0 {
                set.insert(opt.clone());
            }
        }
        sets.push(set);
    }
    sets
}

pub struct Checker<'a> {
    pub tree: &'a mut SymbolTree,
    pub logger: &'a mut dyn Logger,
    scope_kinds: Vec<LocalScopeKind>,
    unsafe_stack: Vec<bool>,
}

impl<'a> Checker<'a> {
    pub fn new(tree: &'a mut SymbolTree, logger: &'a mut dyn Logger) -> Self {
        Self {
            tree,
            logger,
            scope_kinds: Vec::new(),
            unsafe_stack: vec![false],
        }
    }

    #[must_use]
    fn in_unsafe_context(&self) -> bool {
        *self.unsafe_stack.last().unwrap_or(&false)
    }

    fn err(&mut self, kind: ErrorKind, message: impl Into<String>, location: Location) {
        self.logger.report(Diagnostic::new(kind, message, location));
    }

    pub fn check_program(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts.iter_mut() {
            self.check_stmt(stmt);
        }
    }

    pub fn annotation_type(&mut self, ann: &Annotation) -> Option<Type> {
        if let AnnotationKind::TypeOf(inner) = &ann.kind {
            let mut cloned = (**inner).clone();
            self.check_expr(&mut cloned);
            return cloned.resolved_type;
        }
        resolve_annotation(self.tree, self.logger, ann)
    }

    // ---------------- statements ----------------

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        let loc = stmt.location;
        match &mut stmt.kind {
            StmtKind::Expression(expr) => self.check_expr(expr),
            StmtKind::Let {
                name,
                has_var,
                annotation,
                initializer,
                field_entry,
            } => self.check_let(name, *has_var, annotation, initializer, field_entry, loc, false),
            StmtKind::Static {
                name,
                has_var,
                annotation,
                initializer,
                field_entry,
            } => self.check_let(name, *has_var, annotation, initializer, field_entry, loc, true),
            StmtKind::Func {
                params,
                return_annotation,
                body,
                field_entry,
                ..
            } => self.check_func_body(params, return_annotation, body, *field_entry, loc),
            StmtKind::Print(exprs) => {
                for expr in exprs.iter_mut() {
                    self.check_expr(expr);
                }
            }
            StmtKind::Dealloc(expr) => self.check_dealloc(expr, loc),
            StmtKind::Pass | StmtKind::Eof => {}
            StmtKind::Yield { kind, expr, target_block } => self.check_yield(*kind, expr, target_block, loc),
            StmtKind::Continue => {
                if !self.scope_kinds.iter().rev().any(|k| *k == LocalScopeKind::Loop) {
                    self.err(ErrorKind::ContinueOutsideLoop, "`continue` outside a loop", loc);
                }
            }
            StmtKind::Namespace { body, .. } => {
                // Resolution already opened during the global pass; the
                // checker only needs to re-enter to type-check bodies.
                self.check_program(body);
            }
            StmtKind::Struct { properties, methods, .. } => {
                self.check_program(properties);
                self.check_program(methods);
            }
            StmtKind::Extern { .. } => {}
        }
    }

    fn check_let(
        &mut self,
        name: &str,
        has_var: bool,
        annotation: &Option<Annotation>,
        initializer: &mut Option<Expr>,
        field_entry: &mut Option<crate::symbol::tree::NodeId>,
        loc: Location,
        is_static: bool,
    ) {
        if let Some(init) = initializer.as_mut() {
            self.check_expr(init);
        }
        if is_static {
            if let Some(init) = initializer.as_ref() {
                if !init.is_constant() {
                    self.err(ErrorKind::LetTypeMismatch, "`static` requires a compile-time-constant initializer", loc);
                }
            }
        }

        let annotation_ty = annotation.as_ref().and_then(|a| self.annotation_type(a));

        let final_ty = match (&annotation_ty, initializer.as_ref().and_then(|i| i.resolved_type.clone())) {
            (Some(ann_ty), Some(init_ty)) => {
                if !init_ty.assignable_to(ann_ty) {
                    self.err(
                        ErrorKind::LetTypeMismatch,
                        format!("cannot assign `{init_ty}` to a binding of type `{ann_ty}`"),
                        loc,
                    );
                }
                // The annotation's type takes precedence (matters for a
                // `nullptr` initializer, spec §4.5).
                ann_ty.clone()
            }
            (Some(ann_ty), None) => ann_ty.clone(),
            (None, Some(init_ty)) => init_ty,
            (None, None) => Type::Unit,
        };

        if !has_var && initializer.is_none() {
            self.err(ErrorKind::LetTypeMismatch, "an immutable binding requires an initializer", loc);
        }

        let field = Field { is_var: has_var, ty: final_ty };
        match self.tree.add_field_entry(name, field) {
            Ok(id) => *field_entry = Some(id),
            Err(_) => self.err(ErrorKind::NameAlreadyExists, format!("`{name}` is already declared in this scope"), loc),
        }
    }

    fn check_func_body(
        &mut self,
        params: &mut [ParamDecl],
        return_annotation: &Option<Annotation>,
        body: &mut Expr,
        _field_entry: Option<crate::symbol::tree::NodeId>,
        loc: Location,
    ) {
        let mut resolved_params = Vec::new();
        for param in params.iter_mut() {
            let ty = self.annotation_type(&param.annotation);
            if let Some(default) = param.default_expr.as_mut() {
                self.check_expr(default);
                if let (Some(ty), Some(default_ty)) = (&ty, default.resolved_type.clone()) {
                    if !default_ty.assignable_to(ty) {
                        self.err(
                            ErrorKind::DefaultArgTypeMismatch,
                            format!("default value of `{}` has type `{default_ty}`, expected `{ty}`", param.name),
                            param.location,
                        );
                    }
                }
            }
            resolved_params.push((param.name.clone(), param.has_var, ty.unwrap_or(Type::Unit)));
        }
        let mut seen = ahash::AHashSet::new();
        for (name, _, _) in &resolved_params {
            if !seen.insert(name.clone()) {
                self.err(ErrorKind::DuplicateParameterName, format!("duplicate parameter name `{name}`"), loc);
            }
        }

        let return_type = return_annotation.as_ref().and_then(|a| self.annotation_type(a)).unwrap_or(Type::Unit);

        let ExprKind::Block(block) = &mut body.kind else {
            self.err(ErrorKind::MalformedBlock, "function body must be a block", loc);
            return;
        };

        let scope = self.tree.add_function_scope().unwrap_or_else(|_| self.tree.add_local_scope(LocalScopeKind::Function));
        self.scope_kinds.push(LocalScopeKind::Function);
        for (name, is_var, ty) in &resolved_params {
            let _ = self.tree.add_field_entry(name, Field { is_var: *is_var, ty: ty.clone() });
        }
        self.unsafe_stack.push(block.is_unsafe);
        for inner in block.stmts.iter_mut() {
            self.check_stmt(inner);
        }
        self.unsafe_stack.pop();
        let yield_type = self.collect_yield_type(scope);
        self.scope_kinds.pop();
        self.tree.exit_scope();
        block.local_scope = Some(scope);

        let actual_return = yield_type.unwrap_or(Type::Unit);
        if !actual_return.assignable_to(&return_type) {
            self.err(
                ErrorKind::FunctionReturnTypeMismatch,
                format!("function body yields `{actual_return}`, declared return type is `{return_type}`"),
                loc,
            );
        }
        body.resolved_type = Some(return_type);
    }

    fn collect_yield_type(&self, scope: crate::symbol::tree::NodeId) -> Option<Type> {
        match &self.tree.node(scope).kind {
            NodeKind::LocalScope { yield_type, .. } => yield_type.clone(),
            _ => None,
        }
    }

    fn set_yield_type(&mut self, scope: crate::symbol::tree::NodeId, ty: Type, loc: Location) {
        if let NodeKind::LocalScope { yield_type, .. } = &mut self.tree.node_mut(scope).kind {
            match yield_type {
                None => *yield_type = Some(ty),
                Some(existing) if *existing != ty => {
                    self.err(ErrorKind::YieldTypeMismatch, format!("yield type `{ty}` does not match prior `{existing}` in this scope"), loc);
                }
                _ => {}
            }
        }
    }

    fn check_dealloc(&mut self, expr: &mut Expr, loc: Location) {
        self.check_expr(expr);
        if !self.in_unsafe_context() {
            self.err(ErrorKind::DeallocOutsideUnsafeBlock, "`dealloc` requires an `unsafe` block", loc);
            return;
        }
        match expr.resolved_type.as_ref() {
            Some(Type::Nullptr) => self.err(ErrorKind::DeallocNullptr, "cannot `dealloc` a `nullptr`", loc),
            Some(ty) if ty.is_raw_ptr() => {}
            Some(ty) => self.err(ErrorKind::DeallocNonRawPointer, format!("cannot `dealloc` a value of type `{ty}`"), loc),
            None => {}
        }
    }

    fn nearest_scope_of_kind(&self, kind: LocalScopeKind) -> bool {
        self.scope_kinds.iter().rev().any(|k| *k == kind)
    }

    fn current_yield_scope(&self) -> Option<crate::symbol::tree::NodeId> {
        let mut cursor = Some(self.tree.current_scope());
        while let Some(id) = cursor {
            if matches!(self.tree.node(id).kind, NodeKind::LocalScope { .. }) {
                return Some(id);
            }
            cursor = self.tree.node(id).parent;
        }
        None
    }

    fn nearest_scope_ancestor_of_kind(&self, kind: LocalScopeKind) -> Option<crate::symbol::tree::NodeId> {
        let mut cursor = Some(self.tree.current_scope());
        while let Some(id) = cursor {
            if let NodeKind::LocalScope { kind: k, .. } = &self.tree.node(id).kind {
                if *k == kind {
                    return Some(id);
                }
            }
            cursor = self.tree.node(id).parent;
        }
        None
    }

    fn check_yield(&mut self, kind: YieldKind, expr: &mut Option<Expr>, target: &mut Option<crate::symbol::tree::NodeId>, loc: Location) {
        if let Some(e) = expr.as_mut() {
            self.check_expr(e);
        }
        let ty = expr.as_ref().and_then(|e| e.resolved_type.clone()).unwrap_or(Type::Unit);
        match kind {
            YieldKind::Yield => match self.current_yield_scope() {
                Some(scope) => {
                    *target = Some(scope);
                    self.set_yield_type(scope, ty, loc);
                }
                None => self.err(ErrorKind::YieldOutsideLocalScope, "`yield` outside any local scope", loc),
            },
            YieldKind::Break => {
                if !self.nearest_scope_of_kind(LocalScopeKind::Loop) {
                    self.err(ErrorKind::BreakOutsideLoop, "`break` outside a loop", loc);
                } else if let Some(scope) = self.nearest_scope_ancestor_of_kind(LocalScopeKind::Loop) {
                    *target = Some(scope);
                    self.set_yield_type(scope, ty, loc);
                }
            }
            YieldKind::Return => {
                if !self.nearest_scope_of_kind(LocalScopeKind::Function) {
                    self.err(ErrorKind::ReturnOutsideFunction, "`return` outside a function", loc);
                } else if let Some(scope) = self.nearest_scope_ancestor_of_kind(LocalScopeKind::Function) {
                    *target = Some(scope);
                    self.set_yield_type(scope, ty, loc);
                }
            }
        }
    }

    // ---------------- expressions ----------------

    fn check_expr(&mut self, expr: &mut Expr) {
        let loc = expr.location;
        match &mut expr.kind {
            ExprKind::Literal(tok) => expr.resolved_type = Some(self.literal_type(tok)),
            ExprKind::Unit => expr.resolved_type = Some(Type::Unit),
            ExprKind::NameRef { name, field_entry } => self.check_name_ref(name, field_entry, &mut expr.lvalue, &mut expr.resolved_type, loc),
            ExprKind::Tuple(elements) => {
                for e in elements.iter_mut() {
                    self.check_expr(e);
                }
                expr.resolved_type = Some(Type::Tuple(elements.iter().map(|e| e.resolved_type.clone().unwrap_or(Type::Unit)).collect()));
            }
            ExprKind::Array(elements) => {
                for e in elements.iter_mut() {
                    self.check_expr(e);
                }
                let mut iter = elements.iter();
                let first_ty = iter.next().and_then(|e| e.resolved_type.clone());
                if let Some(first) = &first_ty {
                    for e in iter {
                        if e.resolved_type.as_ref() != Some(first) {
                            self.err(ErrorKind::ArrayElementTypeMismatch, "array elements must all have the same type", loc);
                        }
                    }
                }
                expr.resolved_type = Some(match first_ty {
                    Some(t) => Type::array(t, Some(elements.len() as u64)),
                    None => Type::EmptyArray,
                });
            }
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, &mut expr.resolved_type, loc),
            ExprKind::Logical { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
                for side in [&**left, &**right] {
                    if side.resolved_type != Some(Type::Bool) {
                        self.err(ErrorKind::NoOperatorOverload, "logical operators require `bool` operands", loc);
                    }
                }
                expr.resolved_type = Some(Type::Bool);
            }
            ExprKind::Binary { op, left, right } => {
                self.check_expr(left);
                self.check_expr(right);
                expr.resolved_type = self.check_binary(*op, left, right, loc);
            }
            ExprKind::Address { op, right, has_var } => self.check_address(*op, right, *has_var, &mut expr.resolved_type, loc),
            ExprKind::Deref { operand } => self.check_deref(operand, &mut expr.resolved_type, &mut expr.lvalue, loc),
            ExprKind::Cast { expr: inner, target, resolved_op } => self.check_cast(inner, target, resolved_op, &mut expr.resolved_type, loc),
            ExprKind::Access { left, member } => self.check_access(left, member, &mut expr.resolved_type, &mut expr.lvalue, loc),
            ExprKind::Subscript { left, index } => self.check_subscript(left, index, &mut expr.resolved_type, &mut expr.lvalue, loc),
            ExprKind::Call { callee, positional, named, resolved_args } => {
                self.check_call(callee, positional, named, resolved_args, &mut expr.resolved_type, loc);
            }
            ExprKind::SizeOf { annotation, resolved_inner_type } => {
                let ty = self.annotation_type(annotation);
                if let Some(t) = &ty {
                    if !t.is_sized() {
                        self.err(ErrorKind::SizeOfUnsized, "`sizeof` requires a sized type", loc);
                    }
                }
                *resolved_inner_type = ty;
                expr.resolved_type = Some(Type::Int { signed: false, width: 64 });
            }
            ExprKind::Alloc(form) => self.check_alloc(form, &mut expr.resolved_type, loc),
            ExprKind::Assign { target, value } => self.check_assign(target, value, &mut expr.resolved_type, loc),
            ExprKind::Block(block) => {
                let ty = self.check_block(block);
                expr.resolved_type = Some(ty);
            }
            ExprKind::Conditional { cond, then_branch, else_branch, .. } => {
                self.check_expr(cond);
                if cond.resolved_type != Some(Type::Bool) {
                    self.err(ErrorKind::NoOperatorOverload, "`if` condition must be `bool`", loc);
                }
                self.check_expr(then_branch);
                self.check_expr(else_branch);
                let then_ty = then_branch.resolved_type.clone().unwrap_or(Type::Unit);
                let else_ty = else_branch.resolved_type.clone().unwrap_or(Type::Unit);
                if then_ty != else_ty {
                    self.err(
                        ErrorKind::LetTypeMismatch,
                        format!("`if`/`else` branches have different types: `{then_ty}` vs `{else_ty}`"),
                        loc,
                    );
                }
                expr.resolved_type = Some(then_ty);
            }
            ExprKind::Loop { cond, body, loops_once } => {
                if let Some(c) = cond.as_mut() {
                    self.check_expr(c);
                    if c.resolved_type != Some(Type::Bool) {
                        self.err(ErrorKind::NoOperatorOverload, "loop condition must be `bool`", loc);
                    }
                }
                let ExprKind::Block(block) = &mut body.kind else {
                    self.err(ErrorKind::MalformedLoop, "loop body must be a block", loc);
                    return;
                };
                let body_ty = self.check_block(block);
                if cond.is_some() && !*loops_once && body_ty != Type::Unit {
                    self.err(ErrorKind::WhileLoopYieldingNonUnit, "a conditional loop's body must yield `()`", loc);
                }
                expr.resolved_type = Some(body_ty);
            }
        }
    }

    fn literal_type(&self, tok: &crate::lexer::token::Token) -> Type {
        match tok.kind {
            TokenKind::IntDefault => Type::Int { signed: true, width: 32 },
            TokenKind::Int8 => Type::Int { signed: true, width: 8 },
            TokenKind::Int16 => Type::Int { signed: true, width: 16 },
            TokenKind::Int32 => Type::Int { signed: true, width: 32 },
            TokenKind::Int64 => Type::Int { signed: true, width: 64 },
            TokenKind::UInt8 => Type::Int { signed: false, width: 8 },
            TokenKind::UInt16 => Type::Int { signed: false, width: 16 },
            TokenKind::UInt32 => Type::Int { signed: false, width: 32 },
            TokenKind::UInt64 => Type::Int { signed: false, width: 64 },
            TokenKind::FloatDefault | TokenKind::Inf | TokenKind::Nan => Type::Float(crate::types::FloatWidth::W64),
            TokenKind::Float32 | TokenKind::Inf32 | TokenKind::Nan32 => Type::Float(crate::types::FloatWidth::W32),
            TokenKind::Float64 | TokenKind::Inf64 | TokenKind::Nan64 => Type::Float(crate::types::FloatWidth::W64),
            TokenKind::StringLiteral => Type::Str,
            TokenKind::True | TokenKind::False => Type::Bool,
            TokenKind::Nullptr => Type::Nullptr,
            _ => Type::Unit,
        }
    }

    fn check_name_ref(
        &mut self,
        name: &Name,
        field_entry: &mut Option<crate::symbol::tree::NodeId>,
        lvalue: &mut Option<LValueInfo>,
        resolved_type: &mut Option<Type>,
        loc: Location,
    ) {
        let Some(node_id) = self.tree.resolve_name(name) else {
            self.err(ErrorKind::UndeclaredName, format!("undeclared name `{}`", name.parts.join("::")), loc);
            return;
        };
        match &self.tree.node(node_id).kind {
            NodeKind::FieldEntry { field } => {
                *field_entry = Some(node_id);
                *resolved_type = Some(field.ty.clone());
                *lvalue = Some(LValueInfo { assignable: field.is_var, error_location: None });
            }
            NodeKind::OverloadGroup { .. } => {
                *field_entry = Some(node_id);
                *resolved_type = Some(Type::OverloadedFn { group: node_id });
            }
            _ => self.err(ErrorKind::NotAVariable, format!("`{}` is not a variable", name.parts.join("::")), loc),
        }
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &mut Expr, resolved_type: &mut Option<Type>, loc: Location) {
        self.check_expr(operand);
        match (op, operand.resolved_type.clone()) {
            (UnaryOp::Neg, Some(Type::Int { signed: false, width })) => {
                self.err(ErrorKind::NegativeOnUnsignedType, "cannot negate an unsigned integer", loc);
                *resolved_type = Some(Type::Int { signed: false, width });
            }
            (UnaryOp::Neg, Some(t @ (Type::Int { .. } | Type::Float(_)))) => *resolved_type = Some(t),
            (UnaryOp::Neg, _) => self.err(ErrorKind::NoOperatorOverload, "unary `-` requires a numeric operand", loc),
            (UnaryOp::Not, Some(Type::Bool)) => *resolved_type = Some(Type::Bool),
            (UnaryOp::Not, _) => self.err(ErrorKind::NoOperatorOverload, "unary `not`/`!` requires a `bool` operand", loc),
        }
    }

    fn check_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, loc: Location) -> Option<Type> {
        let lt = left.resolved_type.clone()?;
        let rt = right.resolved_type.clone()?;
        let is_comparison = matches!(op, BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq);
        let is_eq_only = matches!(op, BinaryOp::Eq | BinaryOp::NotEq);

        match (&lt, &rt) {
            (Type::Int { .. }, Type::Int { .. }) | (Type::Float(_), Type::Float(_)) if lt == rt => {
                Some(if is_comparison { Type::Bool } else { lt })
            }
            (Type::Bool, Type::Bool) if is_eq_only => Some(Type::Bool),
            (Type::RawTypedPtr { .. }, Type::RawTypedPtr { .. }) if is_eq_only && lt == rt => Some(Type::Bool),
            _ => {
                self.err(ErrorKind::NoOperatorOverload, format!("no operator overload for `{lt}` and `{rt}`"), loc);
                None
            }
        }
    }

    fn check_address(&mut self, op: AddressOp, right: &mut Expr, has_var: bool, resolved_type: &mut Option<Type>, loc: Location) {
        self.check_expr(right);
        match op {
            AddressOp::Reference => {
                // Open Question (spec §9): the source rejects `&`
                // construction with a placeholder fatal path. This crate
                // completes the feature instead of leaving it fatal — see
                // DESIGN.md.
            }
            AddressOp::AddressOf => {}
        }
        let Some(lv) = &right.lvalue else {
            self.err(ErrorKind::NotAPossibleLValue, "operand of `@`/`&` must be an lvalue", loc);
            return;
        };
        if has_var && !lv.assignable {
            self.err(ErrorKind::AddressOfImmutable, "`var@`/`var&` requires an assignable lvalue", loc);
        }
        let base = right.resolved_type.clone().unwrap_or(Type::Unit);
        *resolved_type = Some(match op {
            AddressOp::AddressOf => Type::raw_ptr(base, has_var),
            AddressOp::Reference => Type::reference(base, has_var),
        });
    }

    fn check_deref(&mut self, operand: &mut Expr, resolved_type: &mut Option<Type>, lvalue: &mut Option<LValueInfo>, loc: Location) {
        self.check_expr(operand);
        match operand.resolved_type.clone() {
            Some(Type::RawTypedPtr { base, is_mutable }) => {
                if !self.in_unsafe_context() {
                    self.err(ErrorKind::PtrDerefOutsideUnsafeBlock, "dereferencing a raw pointer requires an `unsafe` block", loc);
                }
                *resolved_type = Some((*base).clone());
                *lvalue = Some(LValueInfo { assignable: is_mutable, error_location: None });
            }
            Some(Type::Reference { base, is_mutable }) => {
                *resolved_type = Some((*base).clone());
                *lvalue = Some(LValueInfo { assignable: is_mutable, error_location: None });
            }
            _ => self.err(ErrorKind::PtrDerefNonTyped, "cannot dereference a non-pointer value", loc),
        }
    }

    /// Repeatedly wraps a pointer-typed left-hand side in a synthesized
    /// deref until the base is reached (spec §4.4's "implicit full
    /// dereference"); each `RawTypedPtr` unwrap is gated by the unsafe
    /// check, mirroring `check_deref`.
    fn implicit_deref(&mut self, expr: &mut Expr) {
        loop {
            let next = match expr.resolved_type.clone() {
                Some(Type::RawTypedPtr { base, is_mutable }) => {
                    if !self.in_unsafe_context() {
                        self.err(ErrorKind::PtrDerefOutsideUnsafeBlock, "implicit pointer dereference requires an `unsafe` block", expr.location);
                    }
                    Some(((*base).clone(), is_mutable))
                }
                Some(Type::Reference { base, is_mutable }) => Some(((*base).clone(), is_mutable)),
                _ => None,
            };
            let Some((base, is_mutable)) = next else { break };
            let loc = expr.location;
            let inner = std::mem::replace(expr, Expr::new(ExprKind::Unit, loc));
            *expr = Expr::new(ExprKind::Deref { operand: Box::new(inner) }, loc);
            expr.resolved_type = Some(base);
            expr.lvalue = Some(LValueInfo { assignable: is_mutable, error_location: None });
        }
    }

    fn check_access(&mut self, left: &mut Expr, member: &mut AccessMember, resolved_type: &mut Option<Type>, lvalue: &mut Option<LValueInfo>, loc: Location) {
        self.check_expr(left);
        self.implicit_deref(left);
        match (&left.resolved_type, &member) {
            (Some(Type::Tuple(elements)), AccessMember::TupleIndex(i)) => {
                if let Some(ty) = elements.get(*i as usize) {
                    *resolved_type = Some(ty.clone());
                    *lvalue = left.lvalue.clone();
                } else {
                    self.err(ErrorKind::IndexOutOfBounds, format!("tuple index {i} out of bounds"), loc);
                }
            }
            (Some(Type::Object { fields }), AccessMember::Field(name)) => {
                if let Some(ty) = fields.get(name) {
                    *resolved_type = Some(ty.clone());
                    *lvalue = left.lvalue.clone();
                } else {
                    self.err(ErrorKind::UndeclaredName, format!("no field named `{name}`"), loc);
                }
            }
            (Some(Type::Tuple(_)), AccessMember::Field(_)) | (Some(Type::Object { .. }), AccessMember::TupleIndex(_)) => {
                self.err(ErrorKind::WrongIndexKind, "member access kind does not match the left operand's type", loc);
            }
            _ => self.err(ErrorKind::WrongIndexKind, "left-hand side of `.` is not a tuple or object", loc),
        }
    }

    fn check_subscript(&mut self, left: &mut Expr, index: &mut Expr, resolved_type: &mut Option<Type>, lvalue: &mut Option<LValueInfo>, loc: Location) {
        self.check_expr(left);
        self.implicit_deref(left);
        self.check_expr(index);
        if !matches!(index.resolved_type, Some(Type::Int { .. })) {
            self.err(ErrorKind::WrongIndexKind, "subscript index must be an integer", loc);
        }
        match left.resolved_type.clone() {
            Some(Type::Array { base, .. }) | Some(Type::RawTypedPtr { base, .. }) => {
                if !base.is_sized() {
                    self.err(ErrorKind::SizeOfUnsized, "array element type must be sized", loc);
                }
                *resolved_type = Some((*base).clone());
                *lvalue = Some(LValueInfo { assignable: true, error_location: None });
            }
            _ => self.err(ErrorKind::WrongIndexKind, "left-hand side of `[]` is not an array", loc),
        }
    }

    fn check_cast(&mut self, inner: &mut Expr, target: &Annotation, resolved_op: &mut Option<CastOp>, resolved_type: &mut Option<Type>, loc: Location) {
        self.check_expr(inner);
        let Some(target_ty) = self.annotation_type(target) else { return };
        let Some(source_ty) = inner.resolved_type.clone() else { return };

        let op = select_cast_op(&source_ty, &target_ty);
        match op {
            Some(op) => {
                *resolved_op = Some(op);
                *resolved_type = Some(target_ty);
            }
            None => self.err(ErrorKind::InvalidCastOperation, format!("cannot cast `{source_ty}` to `{target_ty}`"), loc),
        }
    }

    fn check_alloc(&mut self, form: &mut AllocForm, resolved_type: &mut Option<Type>, loc: Location) {
        match form {
            AllocForm::Typed { ty, init } => {
                let Some(base) = self.annotation_type(ty) else { return };
                if !base.is_sized() {
                    self.err(ErrorKind::UnsizedTypeAllocation, "cannot allocate an unsized type", loc);
                }
                if let Some(init_expr) = init.as_mut() {
                    self.check_expr(init_expr);
                    if let Some(init_ty) = init_expr.resolved_type.clone() {
                        if !init_ty.assignable_to(&base) {
                            self.err(ErrorKind::LetTypeMismatch, format!("`alloc` initializer has type `{init_ty}`, expected `{base}`"), loc);
                        }
                    }
                }
                *resolved_type = Some(Type::raw_ptr(base, true));
            }
            AllocForm::InitOnly { init } => {
                self.check_expr(init);
                let base = init.resolved_type.clone().unwrap_or(Type::Nullptr);
                // The source's treatment of a `nullptr` initializer is
                // intentional (spec §9 Open Question): it yields `@nullptr`.
                *resolved_type = Some(Type::raw_ptr(base, true));
            }
            AllocForm::ForAmountOf { amount, ty } => {
                self.check_expr(amount);
                if !matches!(amount.resolved_type, Some(Type::Int { .. })) {
                    self.err(ErrorKind::WrongIndexKind, "`alloc for` amount must be an integer", loc);
                }
                let Some(base) = self.annotation_type(ty) else { return };
                if !base.is_sized() {
                    self.err(ErrorKind::UnsizedTypeAllocation, "cannot allocate an unsized element type", loc);
                }
                *resolved_type = Some(Type::raw_ptr(Type::array(base, None), true));
            }
        }
    }

    fn check_assign(&mut self, target: &mut Expr, value: &mut Expr, resolved_type: &mut Option<Type>, loc: Location) {
        self.check_expr(target);
        self.check_expr(value);
        let assignable = target.lvalue.as_ref().is_some_and(|lv| lv.assignable);
        if !assignable {
            self.err(ErrorKind::AssignToImmutable, "left-hand side of `=` is not assignable", loc);
        }
        if let (Some(target_ty), Some(value_ty)) = (target.resolved_type.clone(), value.resolved_type.clone()) {
            if !value_ty.assignable_to(&target_ty) {
                self.err(ErrorKind::AssignmentTypeMismatch, format!("cannot assign `{value_ty}` to `{target_ty}`"), loc);
            }
            *resolved_type = Some(target_ty);
        }
    }

    /// Generic block checker shared by `Expr::Block` and loop bodies.
    /// Function bodies go through `check_func_body` instead, which installs
    /// parameters before the block's own statements run.
    fn check_block(&mut self, block: &mut Block) -> Type {
        let scope_kind = match block.kind {
            BlockKind::Plain => LocalScopeKind::Plain,
            BlockKind::Loop => LocalScopeKind::Loop,
            BlockKind::Function => LocalScopeKind::Function,
        };
        let scope = self.tree.add_local_scope(scope_kind);
        self.scope_kinds.push(scope_kind);
        self.unsafe_stack.push(block.is_unsafe);
        for stmt in block.stmts.iter_mut() {
            self.check_stmt(stmt);
        }
        self.unsafe_stack.pop();
        let yield_type = self.collect_yield_type(scope).unwrap_or(Type::Unit);
        self.scope_kinds.pop();
        self.tree.exit_scope();
        block.local_scope = Some(scope);
        yield_type
    }

    fn check_call(
        &mut self,
        callee: &mut Expr,
        positional: &mut [Expr],
        named: &mut [(String, Expr)],
        resolved_args: &mut Option<Vec<(String, Expr)>>,
        resolved_type: &mut Option<Type>,
        loc: Location,
    ) {
        self.check_expr(callee);
        for arg in positional.iter_mut() {
            self.check_expr(arg);
        }
        for (_, arg) in named.iter_mut() {
            self.check_expr(arg);
        }

        let candidates: Vec<(Option<crate::symbol::tree::NodeId>, FunctionType)> = match callee.resolved_type.clone() {
            Some(Type::Function(f)) => vec![(callee_field_entry(callee), f)],
            Some(Type::OverloadedFn { group }) => self
                .tree
                .overloads_of(group)
                .iter()
                .filter_map(|&id| match &self.tree.node(id).kind {
                    NodeKind::FieldEntry { field } => match &field.ty {
                        Type::Function(f) => Some((Some(id), f.clone())),
                        _ => None,
                    },
                    _ => None,
                })
                .collect(),
            _ => {
                self.err(ErrorKind::NotACallable, "callee is not a function", loc);
                return;
            }
        };

        let mut matches = Vec::new();
        for (id, sig) in &candidates {
            if let Some(bound) = try_match_args_to_params(sig, positional, named, loc) {
                matches.push((id, sig, bound));
            }
        }

        match matches.len() {
            0 => {
                let listing = candidates.iter().map(|(_, s)| Type::Function(s.clone()).canonical()).collect::<Vec<_>>().join("; ");
                self.err(ErrorKind::NoMatchingFunctionOverload, format!("no overload matches this call; candidates: {listing}"), loc);
            }
            1 => {
                let (id, sig, bound) = matches.remove(0);
                if let Some(id) = id {
                    if let ExprKind::NameRef { field_entry, .. } = &mut callee.kind {
                        *field_entry = Some(*id);
                    }
                }
                *resolved_type = Some((*sig.return_type).clone());
                *resolved_args = Some(bound);
            }
            _ => {
                let listing = candidates.iter().map(|(_, s)| Type::Function(s.clone()).canonical()).collect::<Vec<_>>().join("; ");
                self.err(ErrorKind::MultipleMatchingFunctionOverloads, format!("call is ambiguous among: {listing}"), loc);
            }
        }
    }
}

fn callee_field_entry(callee: &Expr) -> Option<crate::symbol::tree::NodeId> {
    match &callee.kind {
        ExprKind::NameRef { field_entry, .. } => *field_entry,
        _ => None,
    }
}

/// `try_match_args_to_params` (spec §4.4 step 3): seeds an ordered-parameter
/// map from defaults, assigns positionals by index then named args by
/// name — a second write to the same slot silently wins (documented Open
/// Question, spec §9). A defaulted parameter the caller omits is bound to a
/// synthesized `Unit` placeholder rather than its real default expression:
/// `Parameter` only carries `has_default`, not the expression itself
/// (DESIGN.md notes this as a deliberate simplification).
fn try_match_args_to_params(sig: &FunctionType, positional: &[Expr], named: &[(String, Expr)], call_loc: Location) -> Option<Vec<(String, Expr)>> {
    if positional.len() > sig.parameters.len() {
        return None;
    }
    let mut slots: IndexMap<String, Option<Expr>> = sig.parameters.keys().map(|name| (name.clone(), None)).collect();

    for (i, arg) in positional.iter().enumerate() {
        let Some((name, param)) = sig.parameters.get_index(i) else { return None };
        let arg_ty = arg.resolved_type.as_ref()?;
        if !arg_ty.assignable_to(&param.ty) {
            return None;
        }
        slots.insert(name.clone(), Some(arg.clone()));
    }

    for (name, arg) in named {
        let param = sig.parameters.get(name)?;
        let arg_ty = arg.resolved_type.as_ref()?;
        if !arg_ty.assignable_to(&param.ty) {
            return None;
        }
        // Second write to the same slot silently wins.
        slots.insert(name.clone(), Some(arg.clone()));
    }

    let mut bound = Vec::with_capacity(sig.parameters.len());
    for (name, param) in &sig.parameters {
        match slots.get(name).cloned().flatten() {
            Some(expr) => bound.push((name.clone(), expr)),
            None if param.has_default => {
                let mut placeholder = Expr::new(ExprKind::Unit, call_loc);
                placeholder.resolved_type = Some(param.ty.clone());
                bound.push((name.clone(), placeholder));
            }
            None => return None,
        }
    }
    Some(bound)
}

/// Cast-operation selection (spec §4.4). Pointer casts have their own
/// sub-decision, `check_pointer_cast`.
fn select_cast_op(source: &Type, target: &Type) -> Option<CastOp> {
    if source == target {
        return Some(CastOp::NoOp);
    }
    match (source, target) {
        (Type::Int { signed: ss, width: sw }, Type::Int { signed: ts, width: tw }) => {
            if sw == tw {
                Some(CastOp::NoOp)
            } else if sw < tw {
                Some(if *ss && *ts { CastOp::SignExt } else { CastOp::ZeroExt })
            } else {
                Some(CastOp::IntTrunc)
            }
        }
        (Type::Float(sw), Type::Float(tw)) => {
            if sw == tw {
                Some(CastOp::NoOp)
            } else if float_width_bits(*sw) < float_width_bits(*tw) {
                Some(CastOp::FpExt)
            } else {
                Some(CastOp::FpTrunc)
            }
        }
        (Type::Float(_), Type::Int { signed: true, .. }) => Some(CastOp::FpToSInt),
        (Type::Float(_), Type::Int { signed: false, .. }) => Some(CastOp::FpToUInt),
        (Type::Int { signed: true, .. }, Type::Float(_)) => Some(CastOp::SIntToFp),
        (Type::Int { signed: false, .. }, Type::Float(_)) => Some(CastOp::UIntToFp),
        (Type::Int { .. }, Type::Bool) => Some(CastOp::IntToBool),
        (Type::Float(_), Type::Bool) => Some(CastOp::FpToBool),
        _ if source.is_raw_ptr() || target.is_raw_ptr() || matches!(source, Type::Anyptr | Type::Nullptr) => check_pointer_cast(source, target),
        _ => None,
    }
}

fn float_width_bits(w: crate::types::FloatWidth) -> u32 {
    match w {
        crate::types::FloatWidth::W32 => 32,
        crate::types::FloatWidth::W64 => 64,
    }
}

/// Pointer-cast sub-decision (spec §4.4): `Nullptr → any raw-pointer`;
/// mutable raw pointer → `Anyptr`; matching multi-level pointers must
/// preserve structure; `@[T; N] → @[T; ?]` is legal iff element types
/// match and the target size is absent.
fn check_pointer_cast(source: &Type, target: &Type) -> Option<CastOp> {
    match (source, target) {
        (Type::Nullptr, t) if t.is_raw_ptr() => Some(CastOp::ReinterpretBits),
        (Type::RawTypedPtr { is_mutable: true, .. }, Type::Anyptr) => Some(CastOp::ReinterpretBits),
        (
            Type::RawTypedPtr {
                base: sb,
                is_mutable: _,
            },
            Type::RawTypedPtr { base: tb, is_mutable: _ },
        ) => match (&**sb, &**tb) {
            (Type::Array { base: sb2, size: Some(_) }, Type::Array { base: tb2, size: None }) if sb2 == tb2 => Some(CastOp::ReinterpretBits),
            _ if sb == tb => Some(CastOp::NoOp),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingLogger;
    use crate::lexer::lexer::Lexer;
    use crate::parser::parser::Parser;

    fn check_source(src: &str) -> (SymbolTree, CollectingLogger) {
        let mut logger = CollectingLogger::new();
        let mut tree = SymbolTree::new();
        let lex = Lexer::new(src, 0, false).scan(&mut logger);
        let mut parsed = Parser::new(&lex.tokens, false).parse_program(&mut logger);
        crate::check::global::GlobalChecker::new(&mut tree, &mut logger).run(&mut parsed.stmts);
        Checker::new(&mut tree, &mut logger).check_program(&mut parsed.stmts);
        (tree, logger)
    }

    #[test]
    fn overload_resolution_picks_matching_candidate() {
        let (_, logger) = check_source(
            "func add(a: i32, b: i32) -> i32 => a + b\nfunc add(a: f64, b: f64) -> f64 => a + b\nadd(1, 2)\nadd(1.0, 2.0)\n",
        );
        assert!(!logger.has_errors());
    }

    #[test]
    fn overload_resolution_rejects_mismatched_args() {
        let (_, logger) = check_source(
            "func add(a: i32, b: i32) -> i32 => a + b\nfunc add(a: f64, b: f64) -> f64 => a + b\nadd(1, 2.0)\n",
        );
        assert!(logger.has_errors());
    }

    #[test]
    fn deref_outside_unsafe_block_is_rejected() {
        let (_, logger) = check_source("let a = 1\nlet var b: @i32 = @a\nlet c = ^b\n");
        assert!(logger.has_errors());
    }

    #[test]
    fn deref_inside_unsafe_block_passes() {
        let (_, logger) = check_source("let a = 1\nlet var b: @i32 = @a\nlet c: i32 = unsafe:\n  yield ^b\n");
        assert!(!logger.has_errors());
    }

    #[test]
    fn nullptr_assignment_rules() {
        let (_, logger) = check_source("let var a: @i32 = nullptr\n");
        assert!(!logger.has_errors());
        let (_, logger2) = check_source("let a: i32 = nullptr\n");
        assert!(logger2.has_errors());
    }

    #[test]
    fn alloc_for_unsized_target_is_rejected() {
        let (_, logger) = check_source("alloc for 10 of [i32; ?]\n");
        assert!(logger.has_errors());
    }
}
