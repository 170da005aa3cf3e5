//! Syntax tree and scope-root model for the stoat compiler.
//!
//! The tree lives in an [`AstArena`]: all nodes are pool-allocated and
//! addressed by [`NodeId`], so parent/child links are plain indices and
//! node identity is the id. Passes mutate the tree through the arena's
//! mutation primitives and report structural changes to the compiler that
//! owns the arena; attribute writes (jsdoc, inferred types, props) are not
//! change-reported.

pub mod build;
pub mod features;
pub mod intern;
pub mod jsdoc;
pub mod kind;
pub mod node;
pub mod printer;
pub mod source;
pub mod traversal;

pub use features::{Feature, FeatureSet};
pub use intern::{Interner, Symbol};
pub use jsdoc::{JsDoc, TypeExpr};
pub use kind::{AssignOp, BinaryOp, NodeKind, UnaryOp};
pub use node::{AstArena, NodeId, PropKey};
pub use printer::to_source;
pub use source::SourcePos;
pub use traversal::{NodeTraversal, TraversalCallback};
