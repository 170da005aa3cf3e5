//! Variable inlining: replace reads of single-assignment locals with
//! their initializer when doing so cannot change behavior.
//!
//! A binding inlines when it is assigned exactly once, well-defined, not
//! observed from nested functions, and its initializer is a pure literal.
//! The declaration is removed afterwards, so the tree only shrinks.

use stoat_sema::{ReferenceCollector, SyntacticScopeCreator};

use stoat_ast::{NodeId, NodeKind};

use crate::phase::{CompilerPass, PassContext};

#[derive(Default)]
pub struct InlineVariables {
    inlined: usize,
}

impl InlineVariables {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_scope(&mut self, cx: &mut PassContext<'_>, scope_root: NodeId) {
        let mut creator = SyntacticScopeCreator::with_externs(cx.compiler.extern_inputs());
        let scope = creator.create_scope(&cx.compiler.arena, scope_root, None);
        let collections = ReferenceCollector::collect(&cx.compiler.arena, creator.store(), scope);
        // Deterministic order regardless of map iteration.
        let mut ordered: Vec<_> = collections.iter().collect();
        ordered.sort_by_key(|(var, _)| var.index());

        for (var, refs) in ordered {
            if refs.escapes() || !refs.is_assigned_once_in_lifetime() || !refs.is_well_defined() {
                continue;
            }
            let Some(decl) = refs.declaration() else { continue };
            if !matches!(refs.declaration().map(|d| d.kind), Some(k) if k.is_write()) {
                continue;
            }
            // The declaring occurrence is the Name node; its initializer
            // is its only child.
            let decl_name = decl.node;
            let Some(init) = cx.compiler.arena.first_child(decl_name) else {
                continue;
            };
            // Only pure literals duplicate safely into every read.
            if !cx.compiler.arena.kind(init).is_literal_value() {
                continue;
            }
            let decl_stmt = match cx.compiler.arena.parent(decl_name) {
                Some(p) if cx.compiler.arena.kind(p).is_decl() => p,
                _ => continue,
            };
            let _ = var;

            let reads: Vec<NodeId> = refs
                .refs
                .iter()
                .filter(|r| matches!(r.kind, stoat_sema::ReferenceKind::Read))
                .map(|r| r.node)
                .collect();

            for read in &reads {
                let copy = cx.compiler.arena.clone_subtree(init);
                cx.compiler.arena.replace_with(*read, copy);
                cx.compiler.report_change_to_enclosing_scope(copy);
            }

            // Remove the now-dead binding; the whole statement goes when
            // it declared nothing else.
            cx.compiler.report_change_to_enclosing_scope(decl_stmt);
            cx.compiler.arena.detach(decl_name);
            if cx.compiler.arena.children(decl_stmt).is_empty() {
                cx.compiler.arena.detach(decl_stmt);
            }
            self.inlined += 1;
        }
    }
}

impl CompilerPass for InlineVariables {
    fn name(&self) -> &'static str {
        "inline-variables"
    }

    fn process(&mut self, cx: &mut PassContext<'_>) {
        // The global scope plus every function scope.
        let mut scope_roots = vec![cx.root];
        for n in cx.compiler.arena.preorder(cx.root) {
            if matches!(cx.compiler.arena.kind(n), NodeKind::Function) {
                scope_roots.push(n);
            }
        }
        for scope_root in scope_roots {
            self.process_scope(cx, scope_root);
        }
        tracing::debug!(inlined = self.inlined, "variable inlining complete");
    }
}
