//! First-class identity types for compiler entities.
//!
//! These types provide type-safe handles for source inputs, modules, scopes,
//! variables, and interned types, eliminating string-based lookups and
//! preventing mix-ups between different entity kinds.

mod entities;

pub use entities::{InputId, ModuleId, ScopeId, TypeId, VarId};
