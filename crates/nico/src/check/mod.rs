pub mod checker;
pub mod global;

pub use checker::{resolve_annotation, signature_key_sets, Checker};
pub use global::GlobalChecker;
