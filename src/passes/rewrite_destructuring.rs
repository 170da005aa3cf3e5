//! Destructuring lowering: rewrite object-pattern declarations into a
//! fresh temporary plus property reads, evaluating the right-hand side
//! exactly once.
//!
//! `var {x: y, z: w} = foo();` becomes
//! `var $destructuring$0 = foo(); var y = $destructuring$0.x,
//! w = $destructuring$0.z;` and the script's recorded feature set drops
//! `Destructuring` once no pattern remains.

use stoat_ast::{build, Feature, NodeId, NodeKind, PropKey};

use crate::phase::{CompilerPass, PassContext};

#[derive(Default)]
pub struct RewriteDestructuring {
    rewritten: usize,
}

impl RewriteDestructuring {
    pub fn new() -> Self {
        Self::default()
    }

    fn rewrite_decl(&mut self, cx: &mut PassContext<'_>, decl_stmt: NodeId, lhs: NodeId) {
        let arena = &mut cx.compiler.arena;
        let pattern = arena.child(lhs, 0);
        let rhs = arena.child(lhs, 1);
        let decl_kind = *arena.kind(decl_stmt);

        // One evaluation of the right-hand side, bound to a temporary.
        let temp_name = cx.compiler.unique_temp_name("destructuring");
        let arena = &mut cx.compiler.arena;
        arena.detach(rhs);
        let temp_decl = build::var_decl(arena, &temp_name, Some(rhs));
        let temp_name_node = arena.child(temp_decl, 0);
        arena.set_prop(temp_name_node, PropKey::GeneratedTemp, true);

        // A declaration per pattern entry, reading off the temporary.
        let entries: Vec<(stoat_ast::Symbol, NodeId)> = arena
            .children(pattern)
            .to_vec()
            .into_iter()
            .filter_map(|sk| match *arena.kind(sk) {
                NodeKind::StringKey(key) => arena.first_child(sk).map(|target| (key, target)),
                _ => None,
            })
            .collect();

        let replacement = arena.new_node(decl_kind);
        for (key, target) in entries {
            let Some(target_sym) = arena.name_sym(target) else {
                continue;
            };
            let temp_read = build::name(arena, &temp_name);
            let access = arena.new_node(NodeKind::GetProp(key));
            arena.append_child(access, temp_read);
            let binding = build::name_sym(arena, target_sym);
            arena.append_child(binding, access);
            arena.append_child(replacement, binding);
        }

        arena.insert_after(decl_stmt, temp_decl);
        arena.insert_after(temp_decl, replacement);
        arena.detach(decl_stmt);

        cx.compiler.report_change_to_enclosing_scope(temp_decl);
        self.rewritten += 1;
    }
}

impl CompilerPass for RewriteDestructuring {
    fn name(&self) -> &'static str {
        "rewrite-destructuring"
    }

    fn process(&mut self, cx: &mut PassContext<'_>) {
        loop {
            let target = cx.compiler.arena.preorder(cx.root).into_iter().find_map(|n| {
                if !cx.compiler.arena.kind(n).is_decl() {
                    return None;
                }
                cx.compiler
                    .arena
                    .children(n)
                    .iter()
                    .find(|&&b| matches!(cx.compiler.arena.kind(b), NodeKind::DestructuringLhs))
                    .map(|&b| (n, b))
            });
            let Some((decl_stmt, lhs)) = target else { break };
            self.rewrite_decl(cx, decl_stmt, lhs);
        }

        // Shrink feature sets where no pattern survives.
        let scripts: Vec<NodeId> = cx.compiler.arena.children(cx.root).to_vec();
        for script in scripts {
            let features = cx.compiler.arena.script_features(script);
            if !features.has(Feature::Destructuring) {
                continue;
            }
            let still_present = cx.compiler.arena.preorder(script).into_iter().any(|n| {
                matches!(
                    cx.compiler.arena.kind(n),
                    NodeKind::DestructuringLhs | NodeKind::ObjectPattern
                )
            });
            if !still_present {
                cx.compiler
                    .arena
                    .set_script_features(script, features.without(Feature::Destructuring));
            }
        }
        tracing::debug!(rewritten = self.rewritten, "destructuring lowering complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use stoat_ast::{to_source, FeatureSet};

    fn run(compiler: &mut Compiler, root: NodeId) {
        let mut pass = RewriteDestructuring::new();
        let mut cx = PassContext {
            compiler,
            root,
            last_run_stamp: None,
        };
        pass.process(&mut cx);
    }

    #[test]
    fn lowers_object_pattern_with_single_rhs_evaluation() {
        // var {x: y} = foo();
        let mut compiler = Compiler::new();
        let a = &mut compiler.arena;
        let rhs = build::call_name(a, "foo", vec![]);
        let d = build::destructuring_var(a, &[("x", "y")], rhs);
        let script = build::script(a, vec![d]);
        let root = build::root(a, vec![script]);
        compiler.arena.set_script_features(
            script,
            FeatureSet::ES3.with(Feature::Destructuring),
        );
        compiler.set_root(root);

        run(&mut compiler, root);
        let out = to_source(&compiler.arena, script);
        assert_eq!(
            out,
            "var $destructuring$0=foo();var y=$destructuring$0.x;"
        );
        // exactly one call to foo survives
        assert_eq!(out.matches("foo()").count(), 1);
        // the sugar is gone from the feature set
        assert!(!compiler
            .arena
            .script_features(script)
            .has(Feature::Destructuring));
    }

    #[test]
    fn lowers_multiple_entries_in_order() {
        let mut compiler = Compiler::new();
        let a = &mut compiler.arena;
        let rhs = build::name(a, "src");
        let src_decl = build::var_decl(a, "src", None);
        let d = build::destructuring_var(a, &[("x", "y"), ("z", "w")], rhs);
        let script = build::script(a, vec![src_decl, d]);
        let root = build::root(a, vec![script]);
        compiler.set_root(root);

        run(&mut compiler, root);
        assert_eq!(
            to_source(&compiler.arena, script),
            "var src;var $destructuring$0=src;var y=$destructuring$0.x,w=$destructuring$0.z;"
        );
    }
}
