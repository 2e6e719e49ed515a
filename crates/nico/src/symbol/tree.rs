//! The symbol tree: nested scopes, multi-part name resolution, overload
//! groups (spec §3.4, §4.3).
//!
//! Nodes live in a flat arena and reference each other by [`NodeId`] rather
//! than shared pointers, which is how the cyclic `Named ↔ StructDef` and
//! `OverloadedFn ↔ OverloadGroup` relationships (spec §9) are broken: a type
//! stores a handle, never a pointer, so the arena is the only owner.

use indexmap::IndexMap;

use crate::lexer::token::{keyword_kind, PRIMITIVE_TYPE_NAMES};
use crate::types::{primitive_type_for, Type};

/// Stable handle into a [`SymbolTree`]'s arena. Copy, so types can hold one
/// without borrowing the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalScopeKind {
    Plain,
    Loop,
    Function,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub is_var: bool,
    pub ty: Type,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeData {
    pub children: IndexMap<String, NodeId>,
    /// Child local scopes, reachable only via this list — never through
    /// `children` — so no expression can name-address one (invariant 1).
    pub local_scopes: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    RootScope(ScopeData),
    ReservedScope(ScopeData),
    Namespace(ScopeData),
    StructDef {
        scope: ScopeData,
        is_class: bool,
        closed: bool,
    },
    LocalScope {
        scope: ScopeData,
        kind: LocalScopeKind,
        yield_type: Option<Type>,
    },
    PrimitiveType {
        ty: Type,
    },
    FieldEntry {
        field: Field,
    },
    OverloadGroup {
        overloads: Vec<NodeId>,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub short_name: String,
    pub kind: NodeKind,
}

impl Node {
    #[must_use]
    pub fn as_scope(&self) -> Option<&ScopeData> {
        match &self.kind {
            NodeKind::RootScope(s) | NodeKind::ReservedScope(s) | NodeKind::Namespace(s) => Some(s),
            NodeKind::StructDef { scope, .. } | NodeKind::LocalScope { scope, .. } => Some(scope),
            _ => None,
        }
    }

    fn as_scope_mut(&mut self) -> Option<&mut ScopeData> {
        match &mut self.kind {
            NodeKind::RootScope(s) | NodeKind::ReservedScope(s) | NodeKind::Namespace(s) => Some(s),
            NodeKind::StructDef { scope, .. } | NodeKind::LocalScope { scope, .. } => Some(scope),
            _ => None,
        }
    }

    #[must_use]
    pub fn field(&self) -> Option<&Field> {
        match &self.kind {
            NodeKind::FieldEntry { field } => Some(field),
            _ => None,
        }
    }
}

/// Multi-part reference as built by the parser (`a::b::c`); resolution
/// fills in nothing on the name itself — the checker stores the resolved
/// `NodeId` on the owning AST node (Design Notes §9: static returns, not
/// mutation through a dynamic holder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub parts: Vec<String>,
}

impl Name {
    #[must_use]
    pub fn single(part: impl Into<String>) -> Self {
        Self { parts: vec![part.into()] }
    }
}

/// Why a declaration was rejected outright (reserved names; re-opening a
/// closed struct). Overload conflicts are a separate, richer path the
/// checker drives directly (`existing_field`/`convert_to_overload_group`),
/// since only the checker has the type information to judge disjointness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareError {
    NameReserved,
    NameAlreadyExists,
    CannotReopenStruct,
    WrongScopeKind,
}

pub struct SymbolTree {
    arena: Vec<Node>,
    root: NodeId,
    reserved: NodeId,
    scope_stack: Vec<NodeId>,
    next_local_id: u32,
    modified: bool,
}

impl SymbolTree {
    #[must_use]
    pub fn new() -> Self {
        let mut arena = Vec::new();
        arena.push(Node {
            parent: None,
            short_name: String::new(),
            kind: NodeKind::ReservedScope(ScopeData::default()),
        });
        let reserved = NodeId(0);
        arena.push(Node {
            parent: None,
            short_name: String::new(),
            kind: NodeKind::RootScope(ScopeData::default()),
        });
        let root = NodeId(1);

        let mut tree = Self {
            arena,
            root,
            reserved,
            scope_stack: vec![root],
            next_local_id: 0,
            modified: false,
        };
        tree.install_primitives();
        tree
    }

    fn install_primitives(&mut self) {
        for name in PRIMITIVE_TYPE_NAMES {
            let ty = primitive_type_for(name).expect("PRIMITIVE_TYPE_NAMES entries all have a backing Type");
            let id = self.push_node(Some(self.reserved), name, NodeKind::PrimitiveType { ty });
            self.scope_mut(self.reserved).unwrap().children.insert((*name).to_string(), id);
        }
    }

    /// Rebuilds the tree from scratch, including reinstalling reserved
    /// names (`:reset`, spec §5 "full-reset operation").
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub fn was_modified(&self) -> bool {
        self.modified
    }

    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn current_scope(&self) -> NodeId {
        *self.scope_stack.last().expect("scope stack is never empty")
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.arena[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.arena[id.0 as usize]
    }

    fn scope_mut(&mut self, id: NodeId) -> Option<&mut ScopeData> {
        self.arena[id.0 as usize].as_scope_mut()
    }

    fn push_node(&mut self, parent: Option<NodeId>, short_name: &str, kind: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.arena.len()).expect("arena fits in u32"));
        self.arena.push(Node {
            parent,
            short_name: short_name.to_string(),
            kind,
        });
        id
    }

    /// The globally unique `symbol` string: `parent_symbol :: short_name`.
    #[must_use]
    pub fn symbol_of(&self, id: NodeId) -> String {
        let node = self.node(id);
        match node.parent {
            // Root/reserved scopes have no parent of their own; their
            // direct children are the top of the printable symbol path.
            Some(parent) if self.node(parent).parent.is_some() => {
                format!("{}::{}", self.symbol_of(parent), node.short_name)
            }
            _ => node.short_name.clone(),
        }
    }

    #[must_use]
    pub fn is_reserved_name(word: &str) -> bool {
        word == "true"
            || word == "false"
            || word == "nullptr"
            || keyword_kind(word).is_some()
            || PRIMITIVE_TYPE_NAMES.contains(&word)
    }

    pub fn enter_namespace(&mut self, name: &str) -> Result<NodeId, DeclareError> {
        if Self::is_reserved_name(name) {
            return Err(DeclareError::NameReserved);
        }
        let current = self.current_scope();
        if let NodeKind::LocalScope { .. } = &self.node(current).kind {
            return Err(DeclareError::WrongScopeKind);
        }
        if let Some(existing) = self.node(current).as_scope().and_then(|s| s.children.get(name).copied()) {
            if matches!(self.node(existing).kind, NodeKind::Namespace(_)) {
                self.scope_stack.push(existing);
                return Ok(existing);
            }
            return Err(DeclareError::NameAlreadyExists);
        }
        let id = self.push_node(Some(current), name, NodeKind::Namespace(ScopeData::default()));
        self.scope_mut(current).unwrap().children.insert(name.to_string(), id);
        self.scope_stack.push(id);
        self.modified = true;
        Ok(id)
    }

    pub fn add_struct_def(&mut self, name: &str, is_class: bool) -> Result<NodeId, DeclareError> {
        if Self::is_reserved_name(name) {
            return Err(DeclareError::NameReserved);
        }
        let current = self.current_scope();
        if !matches!(self.node(current).kind, NodeKind::RootScope(_) | NodeKind::Namespace(_)) {
            return Err(DeclareError::WrongScopeKind);
        }
        if let Some(existing) = self.node(current).as_scope().and_then(|s| s.children.get(name).copied()) {
            if let NodeKind::StructDef { closed, .. } = self.node(existing).kind {
                if closed {
                    return Err(DeclareError::CannotReopenStruct);
                }
            }
            return Err(DeclareError::NameAlreadyExists);
        }
        let id = self.push_node(
            Some(current),
            name,
            NodeKind::StructDef {
                scope: ScopeData::default(),
                is_class,
                closed: false,
            },
        );
        self.scope_mut(current).unwrap().children.insert(name.to_string(), id);
        self.scope_stack.push(id);
        self.modified = true;
        Ok(id)
    }

    pub fn close_struct_def(&mut self, id: NodeId) {
        if let NodeKind::StructDef { closed, .. } = &mut self.node_mut(id).kind {
            *closed = true;
        }
        self.exit_scope();
    }

    /// Prohibited inside a local scope (spec §4.3); closures are future work.
    pub fn add_function_scope(&mut self) -> Result<NodeId, DeclareError> {
        let current = self.current_scope();
        if matches!(self.node(current).kind, NodeKind::LocalScope { .. }) {
            return Err(DeclareError::WrongScopeKind);
        }
        Ok(self.add_local_scope(LocalScopeKind::Function))
    }

    /// Always permitted. Assigns a monotonically increasing numeric short
    /// name so nothing outside can reference the scope's interior.
    pub fn add_local_scope(&mut self, kind: LocalScopeKind) -> NodeId {
        let current = self.current_scope();
        let short_name = self.next_local_id.to_string();
        self.next_local_id += 1;
        let id = self.push_node(
            Some(current),
            &short_name,
            NodeKind::LocalScope {
                scope: ScopeData::default(),
                kind,
                yield_type: None,
            },
        );
        if let Some(parent_scope) = self.scope_mut(current) {
            parent_scope.local_scopes.push(id);
        }
        self.scope_stack.push(id);
        id
    }

    /// On exit, the scope's name table stops being searchable, but the node
    /// stays reachable via its parent's `local_scopes` list so types may
    /// still reference it (invariant 1).
    pub fn exit_scope(&mut self) -> Option<NodeId> {
        self.scope_stack.pop();
        self.scope_stack.last().copied()
    }

    #[must_use]
    pub fn lookup_local(&self, name: &str) -> Option<NodeId> {
        self.node(self.current_scope()).as_scope().and_then(|s| s.children.get(name).copied())
    }

    /// Installs a `FieldEntry` in the current scope. Returns `Err(existing)`
    /// on a name clash so the checker can decide between a hard
    /// `NameAlreadyExists` and an overload-disjointness check — the tree
    /// itself has no type-comparison logic (spec §4.5: disjointness needs
    /// the `Function` parameter sets, which only the checker interprets).
    pub fn add_field_entry(&mut self, name: &str, field: Field) -> Result<NodeId, NodeId> {
        let current = self.current_scope();
        if let Some(existing) = self.node(current).as_scope().and_then(|s| s.children.get(name).copied()) {
            return Err(existing);
        }
        let id = self.push_node(Some(current), name, NodeKind::FieldEntry { field });
        self.scope_mut(current).unwrap().children.insert(name.to_string(), id);
        self.modified = true;
        Ok(id)
    }

    /// Replaces `existing` (a lone `FieldEntry`) with a new `OverloadGroup`
    /// containing both overloads, rebinding the scope's slot.
    pub fn convert_to_overload_group(&mut self, existing: NodeId, new_field_name: &str, new_field: Field) -> NodeId {
        let parent = self.node(existing).parent.expect("field entries always have a parent scope");
        let short_name = self.node(existing).short_name.clone();
        let new_entry = self.push_node(Some(parent), new_field_name, NodeKind::FieldEntry { field: new_field });
        let group = self.push_node(
            Some(parent),
            &short_name,
            NodeKind::OverloadGroup {
                overloads: vec![existing, new_entry],
            },
        );
        self.node_mut(existing).parent = Some(group);
        self.node_mut(new_entry).parent = Some(group);
        if let Some(scope) = self.scope_mut(parent) {
            scope.children.insert(short_name, group);
        }
        self.modified = true;
        group
    }

    pub fn add_to_overload_group(&mut self, group: NodeId, field_name: &str, field: Field) -> NodeId {
        let entry = self.push_node(Some(group), field_name, NodeKind::FieldEntry { field });
        if let NodeKind::OverloadGroup { overloads } = &mut self.node_mut(group).kind {
            overloads.push(entry);
        }
        self.modified = true;
        entry
    }

    #[must_use]
    pub fn overloads_of(&self, group: NodeId) -> &[NodeId] {
        match &self.node(group).kind {
            NodeKind::OverloadGroup { overloads } => overloads,
            _ => &[],
        }
    }

    /// Two-phase resolution (spec §4.3): reserved scope first, then an
    /// upward search for `parts[0]` with a downward match of the rest;
    /// a failed downward match resumes the upward search above the
    /// ancestor that matched, not from scratch.
    #[must_use]
    pub fn resolve_name(&self, name: &Name) -> Option<NodeId> {
        if let Some(first) = name.parts.first() {
            if let Some(reserved_hit) = self.node(self.reserved).as_scope().and_then(|s| s.children.get(first).copied())
            {
                if let Some(found) = self.downward_match(reserved_hit, &name.parts[1..]) {
                    return Some(found);
                }
            }
        }
        self.search_name(&name.parts, self.current_scope())
    }

    #[must_use]
    pub fn search_name(&self, parts: &[String], start: NodeId) -> Option<NodeId> {
        let Some((first, rest)) = parts.split_first() else {
            return None;
        };
        let mut cursor = Some(start);
        while let Some(scope_id) = cursor {
            if let Some(hit) = self.node(scope_id).as_scope().and_then(|s| s.children.get(first).copied()) {
                if let Some(found) = self.downward_match(hit, rest) {
                    return Some(found);
                }
                // Downward match failed: resume the upward search at the
                // ancestor above this match, not from scratch.
            }
            cursor = self.node(scope_id).parent;
        }
        None
    }

    fn downward_match(&self, start: NodeId, rest: &[String]) -> Option<NodeId> {
        let mut current = start;
        for part in rest {
            let next = self.node(current).as_scope().and_then(|s| s.children.get(part).copied())?;
            current = next;
        }
        Some(current)
    }
}

impl Default for SymbolTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_reserved_and_preinstalled() {
        let tree = SymbolTree::new();
        assert!(SymbolTree::is_reserved_name("i32"));
        let name = Name::single("i32");
        assert!(tree.resolve_name(&name).is_some());
    }

    #[test]
    fn namespace_can_be_reopened_struct_cannot() {
        let mut tree = SymbolTree::new();
        let ns1 = tree.enter_namespace("n").unwrap();
        tree.exit_scope();
        let ns2 = tree.enter_namespace("n").unwrap();
        assert_eq!(ns1, ns2);

        let s = tree.add_struct_def("S", false).unwrap();
        tree.close_struct_def(s);
        assert_eq!(tree.add_struct_def("S", false), Err(DeclareError::CannotReopenStruct));
    }

    #[test]
    fn local_scope_children_are_invisible_outside() {
        let mut tree = SymbolTree::new();
        let local = tree.add_local_scope(LocalScopeKind::Plain);
        tree.add_field_entry("x", Field { is_var: false, ty: Type::Bool }).unwrap();
        tree.exit_scope();
        let name = Name::single("x");
        assert!(tree.resolve_name(&name).is_none());
        assert!(tree.node(local).as_scope().unwrap().children.contains_key("x"));
    }

    #[test]
    fn multi_part_name_resolves_through_namespace() {
        let mut tree = SymbolTree::new();
        tree.enter_namespace("outer").unwrap();
        tree.add_field_entry("value", Field { is_var: false, ty: Type::Bool }).unwrap();
        tree.exit_scope();
        let name = Name {
            parts: vec!["outer".to_string(), "value".to_string()],
        };
        assert!(tree.resolve_name(&name).is_some());
    }

    #[test]
    fn reserved_names_cannot_be_declared() {
        let mut tree = SymbolTree::new();
        assert_eq!(tree.enter_namespace("true"), Err(DeclareError::NameReserved));
    }
}
