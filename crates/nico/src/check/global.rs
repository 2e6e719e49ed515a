//! First checking pass (spec §2's `GlobalChecker`): installs the shape of
//! every declaration — namespaces, structs, function signatures — into the
//! symbol tree before any body is type-checked, so mutually-recursive and
//! forward-referencing calls resolve.
//!
//! Function/let bodies and initializers are left untouched here; that is
//! [`crate::check::checker::Checker`]'s job, run immediately after.

use crate::diagnostics::{Diagnostic, ErrorKind, Logger};
use crate::parser::ast::{Stmt, StmtKind};
use crate::symbol::tree::{DeclareError, Field, SymbolTree};
use crate::types::Type;

use super::checker::{resolve_annotation, signature_key_sets};

pub struct GlobalChecker<'a> {
    tree: &'a mut SymbolTree,
    logger: &'a mut dyn Logger,
}

impl<'a> GlobalChecker<'a> {
    pub fn new(tree: &'a mut SymbolTree, logger: &'a mut dyn Logger) -> Self {
        Self { tree, logger }
    }

    pub fn run(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts.iter_mut() {
            self.register(stmt);
        }
    }

    fn register(&mut self, stmt: &mut Stmt) {
        let loc = stmt.location;
        match &mut stmt.kind {
            StmtKind::Func {
                name,
                params,
                return_annotation,
                field_entry,
                ..
            } => {
                let mut parameters = indexmap::IndexMap::new();
                for param in params.iter() {
                    if let Some(ty) = resolve_annotation(self.tree, self.logger, &param.annotation) {
                        parameters.insert(
                            param.name.clone(),
                            crate::types::Parameter {
                                name: param.name.clone(),
                                is_var: param.has_var,
                                ty,
                                has_default: param.default_expr.is_some(),
                            },
                        );
                    }
                }
                let return_type = return_annotation
                    .as_ref()
                    .and_then(|a| resolve_annotation(self.tree, self.logger, a))
                    .unwrap_or(Type::Unit);
                let fn_type = Type::Function(crate::types::FunctionType {
                    parameters,
                    return_type: Box::new(return_type),
                });
                self.register_field(name, fn_type, false, loc, field_entry);
            }
            StmtKind::Struct {
                name,
                is_class,
                properties,
                methods,
                field_entry,
            } => match self.tree.add_struct_def(name, *is_class) {
                Ok(id) => {
                    *field_entry = Some(id);
                    for member in properties.iter_mut().chain(methods.iter_mut()) {
                        self.register(member);
                    }
                    self.tree.close_struct_def(id);
                }
                Err(err) => self.report_declare_error(err, name, loc),
            },
            StmtKind::Namespace { name, body } => match self.tree.enter_namespace(name) {
                Ok(_) => {
                    for member in body.iter_mut() {
                        self.register(member);
                    }
                    self.tree.exit_scope();
                }
                Err(err) => self.report_declare_error(err, name, loc),
            },
            StmtKind::Extern { declarations, .. } => {
                for decl in declarations.iter() {
                    let mut parameters = indexmap::IndexMap::new();
                    for param in &decl.params {
                        if let Some(ty) = resolve_annotation(self.tree, self.logger, &param.annotation) {
                            parameters.insert(
                                param.name.clone(),
                                crate::types::Parameter {
                                    name: param.name.clone(),
                                    is_var: param.has_var,
                                    ty,
                                    has_default: param.default_expr.is_some(),
                                },
                            );
                        }
                    }
                    let return_type = decl
                        .return_annotation
                        .as_ref()
                        .and_then(|a| resolve_annotation(self.tree, self.logger, a))
                        .unwrap_or(Type::Unit);
                    let fn_type = Type::Function(crate::types::FunctionType {
                        parameters,
                        return_type: Box::new(return_type),
                    });
                    let mut dummy = None;
                    self.register_field(&decl.name, fn_type, false, decl.location, &mut dummy);
                }
            }
            _ => {}
        }
    }

    fn register_field(&mut self, name: &str, ty: Type, is_var: bool, loc: crate::lexer::token::Location, out: &mut Option<crate::symbol::tree::NodeId>) {
        if SymbolTree::is_reserved_name(name) {
            self.logger
                .report(Diagnostic::new(ErrorKind::NameReserved, format!("`{name}` is a reserved name"), loc));
            return;
        }
        let field = Field { is_var, ty: ty.clone() };
        match self.tree.add_field_entry(name, field) {
            Ok(id) => *out = Some(id),
            Err(existing) => self.handle_conflict(name, ty, existing, loc, out),
        }
    }

    fn handle_conflict(
        &mut self,
        name: &str,
        ty: Type,
        existing: crate::symbol::tree::NodeId,
        loc: crate::lexer::token::Location,
        out: &mut Option<crate::symbol::tree::NodeId>,
    ) {
        let Type::Function(new_fn) = &ty else {
            self.report_name_already_exists(name, existing, loc);
            return;
        };

        let existing_node = self.tree.node(existing).clone();
        match &existing_node.kind {
            crate::symbol::tree::NodeKind::FieldEntry { field } => {
                let Type::Function(existing_fn) = &field.ty else {
                    self.report_name_already_exists(name, existing, loc);
                    return;
                };
                if signatures_conflict(existing_fn, new_fn) {
                    self.logger.report(
                        Diagnostic::new(ErrorKind::FunctionOverloadConflict, format!("overload of `{name}` conflicts with an earlier declaration"), loc)
                            .with_note("previous declaration here", loc),
                    );
                    return;
                }
                let group = self.tree.convert_to_overload_group(existing, name, Field { is_var: false, ty });
                *out = Some(group);
            }
            crate::symbol::tree::NodeKind::OverloadGroup { overloads } => {
                for &overload in overloads {
                    if let Some(field) = self.tree.node(overload).field() {
                        if let Type::Function(existing_fn) = &field.ty {
                            if signatures_conflict(existing_fn, new_fn) {
                                self.logger.report(
                                    Diagnostic::new(
                                        ErrorKind::FunctionOverloadConflict,
                                        format!("overload of `{name}` conflicts with an earlier declaration"),
                                        loc,
                                    )
                                    .with_note("previous declaration here", loc),
                                );
                                return;
                            }
                        }
                    }
                }
                let entry = self.tree.add_to_overload_group(existing, name, Field { is_var: false, ty });
                *out = Some(entry);
            }
            _ => self.report_name_already_exists(name, existing, loc),
        }
    }

    fn report_name_already_exists(&mut self, name: &str, existing: crate::symbol::tree::NodeId, loc: crate::lexer::token::Location) {
        let _ = existing;
        self.logger
            .report(Diagnostic::new(ErrorKind::NameAlreadyExists, format!("`{name}` is already declared in this scope"), loc));
    }

    fn report_declare_error(&mut self, err: DeclareError, name: &str, loc: crate::lexer::token::Location) {
        let kind = match err {
            DeclareError::NameReserved => ErrorKind::NameReserved,
            DeclareError::NameAlreadyExists | DeclareError::CannotReopenStruct => ErrorKind::NameAlreadyExists,
            DeclareError::WrongScopeKind => ErrorKind::NameAlreadyExists,
        };
        self.logger.report(Diagnostic::new(kind, format!("cannot declare `{name}` here"), loc));
    }
}

/// Disjointness rule (spec §4.5): conflict iff the new function's
/// effectively-callable signature sets overlap an existing overload's.
fn signatures_conflict(a: &crate::types::FunctionType, b: &crate::types::FunctionType) -> bool {
    let sets_a = signature_key_sets(a);
    let sets_b = signature_key_sets(b);
    sets_a.iter().any(|sa| sets_b.iter().any(|sb| sa == sb))
}
