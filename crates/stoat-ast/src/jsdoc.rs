//! Structured documentation metadata attached to nodes.
//!
//! Doc comments are the channel through which declared types, constancy,
//! abstractness, generics, and suppressions reach the analysis core. The
//! parser collaborator delivers them already structured; the core never
//! sees comment text.

use rustc_hash::FxHashSet;

use crate::intern::Symbol;

/// A declarative type expression from a doc annotation. Resolved against
/// the type store by semantic analysis; the AST layer only carries the
/// syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// A named type: `number`, `string`, `Foo`, or a type variable.
    Name(Symbol),
    /// `(a|b)`
    Union(Vec<TypeExpr>),
    /// `?a` — a or null
    Nullable(Box<TypeExpr>),
    /// `!a` — a with null removed
    NonNullable(Box<TypeExpr>),
    /// `function(a, b): r`
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
    /// `{p: t, q: u}`
    Record(Vec<(Symbol, TypeExpr)>),
    /// `*`
    All,
    /// `?`
    Unknown,
    /// `undefined` / `void`
    Void,
}

/// Parsed doc-comment info. One record per annotated node; absent entirely
/// on unannotated nodes.
#[derive(Debug, Clone, Default)]
pub struct JsDoc {
    /// `@type {...}` on a name or declaration.
    pub ty: Option<TypeExpr>,
    /// `@param {t} name` entries, in source order.
    pub params: Vec<(Symbol, TypeExpr)>,
    /// `@return {...}`
    pub return_ty: Option<TypeExpr>,
    /// `@this {...}`
    pub this_ty: Option<TypeExpr>,
    /// `@template T, U` type parameter names.
    pub templates: Vec<Symbol>,
    /// `@const`
    pub is_const: bool,
    /// `@abstract`
    pub is_abstract: bool,
    /// `@constructor`
    pub is_constructor: bool,
    /// `@extends {Base}` superclass name.
    pub extends: Option<Symbol>,
    /// `@suppress {key}` entries.
    pub suppressions: FxHashSet<Symbol>,
}

impl JsDoc {
    pub fn has_type_information(&self) -> bool {
        self.ty.is_some()
            || !self.params.is_empty()
            || self.return_ty.is_some()
            || self.this_ty.is_some()
    }

    pub fn suppresses(&self, key: Symbol) -> bool {
        self.suppressions.contains(&key)
    }
}
