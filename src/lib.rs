//! The stoat compiler core: whole-program analysis and optimization for
//! JavaScript.
//!
//! This crate owns the compiler instance and the machinery around passes:
//! the phase optimizer that schedules them, the validity check and change
//! verifier that police them, diagnostics, the conformance configuration
//! format, and the concrete transform passes. The analyses themselves
//! (scopes, control flow, dataflow, type inference, conformance
//! evaluation) live in `stoat-sema`; the tree in `stoat-ast`.

pub mod compiler;
pub mod conformance_config;
pub mod diagnostics;
pub mod passes;
pub mod phase;
pub mod validity;

pub use compiler::{Compiler, Module, SourceInput};
pub use conformance_config::{parse_conformance_config, ConfigError};
pub use diagnostics::{CheckLevel, Diagnostic, ErrorManager};
pub use phase::{CompilerPass, FatalError, PassContext, PhaseOptimizer};
pub use validity::AstValidator;
