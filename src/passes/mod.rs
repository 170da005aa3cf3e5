//! Concrete transform passes.
//!
//! Each pass is a [`CompilerPass`](crate::phase::CompilerPass) and plays
//! by the house rules: report every structural change against the
//! enclosing change scope, report function deletions separately, and
//! keep a monotone measure so the pass loop converges. The measures:
//! `PeepholeFoldConstants` and `InlineVariables` only ever shrink the
//! tree; `RewriteDestructuring` removes every `Destructuring` feature it
//! rewrites.

mod inline_vars;
mod peephole_fold;
mod rewrite_destructuring;

pub use inline_vars::InlineVariables;
pub use peephole_fold::PeepholeFoldConstants;
pub use rewrite_destructuring::RewriteDestructuring;
