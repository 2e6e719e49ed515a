pub mod tree;

pub use tree::{DeclareError, Field, LocalScopeKind, Name, Node, NodeId, NodeKind, SymbolTree};
