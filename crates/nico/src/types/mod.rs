//! The type lattice: variants, canonical string form, assignability, and
//! sizedness (spec §3.3).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::symbol::tree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    W32,
    W64,
}

/// One function parameter's contribution to a `Function` type: whether it
/// is declared `var`, its type, and (for disjointness checks, §4.5) whether
/// it carries a default.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub is_var: bool,
    pub ty: Type,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub parameters: IndexMap<String, Parameter>,
    pub return_type: Box<Type>,
}

/// A value type. Every variant has a canonical string form (`Type::canonical`)
/// used as the equality/keying representation wherever the spec says
/// "equality keying" (overload disjointness sets, struct-field maps).
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int { signed: bool, width: u32 },
    Float(FloatWidth),
    Bool,
    Str,
    Unit,
    RawTypedPtr { base: Arc<Type>, is_mutable: bool },
    Reference { base: Arc<Type>, is_mutable: bool },
    Nullptr,
    Anyptr,
    Array { base: Arc<Type>, size: Option<u64> },
    EmptyArray,
    Tuple(Vec<Type>),
    Object { fields: IndexMap<String, Type> },
    Function(FunctionType),
    OverloadedFn { group: NodeId },
    Named { node: NodeId, symbol: String },
}

impl Type {
    #[must_use]
    pub fn raw_ptr(base: Type, is_mutable: bool) -> Self {
        Type::RawTypedPtr {
            base: Arc::new(base),
            is_mutable,
        }
    }

    #[must_use]
    pub fn reference(base: Type, is_mutable: bool) -> Self {
        Type::Reference {
            base: Arc::new(base),
            is_mutable,
        }
    }

    #[must_use]
    pub fn array(base: Type, size: Option<u64>) -> Self {
        Type::Array {
            base: Arc::new(base),
            size,
        }
    }

    /// Canonical string form used as the equality-keying representation
    /// (spec §3.3: "every type has a canonical string form used for
    /// equality keying").
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Type::Int { signed, width } => format!("{}{}", if *signed { "i" } else { "u" }, width),
            Type::Float(FloatWidth::W32) => "f32".to_string(),
            Type::Float(FloatWidth::W64) => "f64".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Str => "str".to_string(),
            Type::Unit => "()".to_string(),
            Type::RawTypedPtr { base, is_mutable } => {
                format!("@{}{}", if *is_mutable { "var " } else { "" }, base.canonical())
            }
            Type::Reference { base, is_mutable } => {
                format!("&{}{}", if *is_mutable { "var " } else { "" }, base.canonical())
            }
            Type::Nullptr => "nullptr".to_string(),
            Type::Anyptr => "anyptr".to_string(),
            Type::Array { base, size } => match size {
                Some(n) => format!("[{}; {n}]", base.canonical()),
                None => format!("[{}; ?]", base.canonical()),
            },
            Type::EmptyArray => "[]".to_string(),
            Type::Tuple(elements) => {
                let inner: Vec<String> = elements.iter().map(Type::canonical).collect();
                format!("({})", inner.join(", "))
            }
            Type::Object { fields } => {
                let inner: Vec<String> = fields.iter().map(|(k, v)| format!("{k}: {}", v.canonical())).collect();
                format!("{{{}}}", inner.join(", "))
            }
            Type::Function(f) => {
                let params: Vec<String> = f
                    .parameters
                    .iter()
                    .map(|(name, p)| format!("{name}: {}", p.ty.canonical()))
                    .collect();
                format!("func({}) -> {}", params.join(", "), f.return_type.canonical())
            }
            Type::OverloadedFn { group } => format!("<overload-group #{}>", group.0),
            Type::Named { symbol, .. } => symbol.clone(),
        }
    }

    /// Sizedness: only `Array{size: None}` and `EmptyArray` are unsized
    /// (spec §3.3). Unsized types may only appear behind a pointer, as an
    /// lvalue location, or as a dereference-chain target.
    #[must_use]
    pub fn is_sized(&self) -> bool {
        !matches!(self, Type::Array { size: None, .. } | Type::EmptyArray)
    }

    #[must_use]
    pub fn is_raw_ptr(&self) -> bool {
        matches!(self, Type::RawTypedPtr { .. })
    }

    /// Asymmetric assignability: governs `let`/assignment/argument/return
    /// boundaries (spec §3.3).
    #[must_use]
    pub fn assignable_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            (Type::RawTypedPtr { base: sb, is_mutable: sm }, Type::RawTypedPtr { base: tb, is_mutable: tm }) => {
                sb.assignable_to(tb) && !(!*sm && *tm)
            }
            (Type::Nullptr, Type::RawTypedPtr { .. } | Type::Anyptr) => true,
            (Type::Reference { base: sb, is_mutable: sm }, Type::RawTypedPtr { base: tb, is_mutable: tm }) => {
                sb.assignable_to(tb) && !(!*sm && *tm)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Installs one `PrimitiveType` per builtin name (spec §4.3): widths 8/16/32/64
/// for both signedness, both float widths, `bool`, `str`, `anyptr`.
#[must_use]
pub fn primitive_type_for(name: &str) -> Option<Type> {
    Some(match name {
        "i8" => Type::Int { signed: true, width: 8 },
        "i16" => Type::Int { signed: true, width: 16 },
        "i32" => Type::Int { signed: true, width: 32 },
        "i64" => Type::Int { signed: true, width: 64 },
        "u8" => Type::Int { signed: false, width: 8 },
        "u16" => Type::Int { signed: false, width: 16 },
        "u32" => Type::Int { signed: false, width: 32 },
        "u64" => Type::Int { signed: false, width: 64 },
        "f32" => Type::Float(FloatWidth::W32),
        "f64" => Type::Float(FloatWidth::W64),
        "bool" => Type::Bool,
        "str" => Type::Str,
        "anyptr" => Type::Anyptr,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullptr_assignable_to_any_raw_pointer() {
        let target = Type::raw_ptr(Type::Int { signed: true, width: 32 }, true);
        assert!(Type::Nullptr.assignable_to(&target));
    }

    #[test]
    fn raw_ptr_loses_mutability_but_not_gains_it() {
        let mutable = Type::raw_ptr(Type::Bool, true);
        let immutable = Type::raw_ptr(Type::Bool, false);
        assert!(mutable.assignable_to(&immutable));
        assert!(!immutable.assignable_to(&mutable));
    }

    #[test]
    fn unsized_array_is_not_sized() {
        let unsized_arr = Type::array(Type::Bool, None);
        assert!(!unsized_arr.is_sized());
        assert!(Type::EmptyArray.is_sized() == false);
        let sized_arr = Type::array(Type::Bool, Some(4));
        assert!(sized_arr.is_sized());
    }

    #[test]
    fn canonical_round_trips_through_equality() {
        let a = Type::Int { signed: true, width: 32 };
        let b = Type::Int { signed: true, width: 32 };
        assert_eq!(a.canonical(), b.canonical());
    }
}
