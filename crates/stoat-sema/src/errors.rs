//! Semantic analysis diagnostics (S2xxx) and conformance findings (S3xxx).

use miette::Diagnostic;
use thiserror::Error;

use stoat_ast::SourcePos;

/// Errors the inference engine and validity checks report against user
/// source. Compilation continues past all of these.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum SemanticError {
    #[error("cannot assign {found} to {expected}")]
    #[diagnostic(code(S2001))]
    MistypedAssignRhs { expected: String, found: String },

    #[error("invalid operand type {found}, expected {expected}")]
    #[diagnostic(code(S2002))]
    InvalidOperandType { expected: String, found: String },

    #[error("invalid argument: expected {expected}, found {found}")]
    #[diagnostic(code(S2003))]
    InvalidArgumentType {
        argument: usize,
        expected: String,
        found: String,
    },

    #[error("expected {min} to {max} arguments, found {found}")]
    #[diagnostic(code(S2004))]
    WrongArgumentCount {
        min: usize,
        max: usize,
        found: usize,
    },

    #[error("returning {found}, declared return type is {declared}")]
    #[diagnostic(code(S2005))]
    ReturnNondeclaredType { declared: String, found: String },

    #[error("missing return: declared return type is {declared}, but a path reaches the end of the function")]
    #[diagnostic(
        code(S2006),
        help("add a return statement or declare the return type as undefined")
    )]
    MissingReturnStatement { declared: String },

    #[error("property {prop} never defined on {receiver}")]
    #[diagnostic(code(S2007))]
    InexistentProperty { prop: String, receiver: String },

    #[error("property access on non-object {receiver}")]
    #[diagnostic(code(S2008))]
    PropertyAccessOnNonobject { receiver: String },

    #[error("expression is not callable: {found}")]
    #[diagnostic(code(S2009))]
    NotCallable { found: String },

    #[error("constructor {name} cannot be called without new")]
    #[diagnostic(code(S2010))]
    ConstructorNotCallable { name: String },

    #[error("{found} is not a constructor")]
    #[diagnostic(code(S2011))]
    NotAConstructor { found: String },

    #[error("dereference of a value that may be {nullish}")]
    #[diagnostic(code(S2012))]
    NullableDereference { nullish: String },

    #[error("invalid cast: {from} and {to} have no common subtype")]
    #[diagnostic(code(S2013))]
    InvalidCast { from: String, to: String },

    #[error("type variable {type_var} does not have a unique instantiation: candidates are {first} and {second}")]
    #[diagnostic(code(S2014))]
    NotUniqueInstantiation {
        type_var: String,
        first: String,
        second: String,
    },

    #[error("variable {name} is not declared")]
    #[diagnostic(code(S2015))]
    UndeclaredVariable { name: String },

    #[error("duplicate declaration of {name}")]
    #[diagnostic(
        code(S2016),
        help("annotate one of the declarations with @suppress {{duplicate}} if this is intentional")
    )]
    DuplicateDeclaration { name: String },

    #[error("feature set annotation does not cover features used in script")]
    #[diagnostic(code(S2017))]
    FeatureSetMismatch,

    #[error("type inference did not stabilize within {steps} steps; types in this scope may be incomplete")]
    #[diagnostic(code(S2018))]
    AnalysisDidNotConverge { steps: usize },
}

/// Diagnostics the engine downgrades when the evidence rests on an
/// inferred, possibly loose type.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum SemanticWarning {
    #[error("property {prop} may not be present on {receiver}")]
    #[diagnostic(code(S2107))]
    PossiblyInexistentProperty { prop: String, receiver: String },

    #[error("outer variable {name} is reassigned a different type inside a nested function")]
    #[diagnostic(code(S2118))]
    CrossScopeGotcha { name: String },
}

/// A semantic error bound to a source position.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeError {
    pub error: SemanticError,
    pub pos: SourcePos,
}

impl TypeError {
    pub fn new(error: SemanticError, pos: SourcePos) -> Self {
        Self { error, pos }
    }
}

/// A semantic warning bound to a source position.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeWarning {
    pub warning: SemanticWarning,
    pub pos: SourcePos,
}

impl TypeWarning {
    pub fn new(warning: SemanticWarning, pos: SourcePos) -> Self {
        Self { warning, pos }
    }
}
