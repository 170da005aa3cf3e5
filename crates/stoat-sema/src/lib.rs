//! Stoat static analysis: scopes, control flow, dataflow, type inference,
//! reference collection, conformance checking, and change verification.

pub mod bitset;
pub mod change_verifier;
pub mod cfg;
pub mod conformance;
pub mod dataflow;
pub mod env;
pub mod errors;
pub mod inference;
pub mod liveness;
pub mod refs;
pub mod scope;
pub mod scope_creator;
pub mod types;

pub use bitset::BitSet;
pub use change_verifier::{ChangeVerifier, ChangeVerifierError};
pub use cfg::{Branch, CfgVertexId, ControlFlowAnalysis, ControlFlowGraph};
pub use conformance::{
    ConformanceEngine, ConformanceResult, ConformanceViolation, CustomRule, PropAccessMode,
    Rule, RuleKind,
};
pub use dataflow::{DataFlowAnalysis, DataFlowSolver, Direction, Divergence, LatticeElement};
pub use env::TypeEnv;
pub use errors::{SemanticError, SemanticWarning, TypeError, TypeWarning};
pub use inference::{DeferredCheck, FunctionSummary, InferenceResult, TypeInference};
pub use liveness::{LiveVariablesAnalysis, LiveVariablesResult};
pub use refs::{
    is_movable_init, Reference, ReferenceCollection, ReferenceCollector, ReferenceKind,
};
pub use scope::{ScopeStore, VarKind};
pub use scope_creator::{IncrementalScopeCreator, SyntacticScopeCreator};
pub use types::{FunctionType, NominalDef, NominalId, ObjectType, PropLookup, TypeData, TypeStore};
