//! Generic tree traversal.
//!
//! One traverser, one small callback surface. `should_traverse` is the
//! pre-order veto, `visit` fires post-order, and the scope hooks fire when
//! the walk crosses a syntactic scope boundary. Callbacks may mutate the
//! tree under the node being visited: the traverser snapshots child lists
//! before descending.

use smallvec::SmallVec;

use crate::kind::NodeKind;
use crate::node::{AstArena, NodeId};

/// Callbacks for [`NodeTraversal`].
pub trait TraversalCallback {
    /// Pre-order gate: returning `false` skips the subtree.
    fn should_traverse(
        &mut self,
        _arena: &mut AstArena,
        _node: NodeId,
        _parent: Option<NodeId>,
    ) -> bool {
        true
    }

    /// Post-order visit.
    fn visit(&mut self, arena: &mut AstArena, node: NodeId, parent: Option<NodeId>);

    fn enter_scope(&mut self, _arena: &mut AstArena, _scope_root: NodeId) {}

    fn exit_scope(&mut self, _arena: &mut AstArena, _scope_root: NodeId) {}
}

/// Whether `n` roots a syntactic scope: the program root, a function, a
/// catch clause, a block holding block-scoped declarations, or a loop
/// statement with a block-scoped binding.
pub fn is_scope_root(arena: &AstArena, n: NodeId) -> bool {
    match arena.kind(n) {
        NodeKind::Root | NodeKind::Function | NodeKind::Catch => true,
        NodeKind::Block => arena
            .children(n)
            .iter()
            .any(|&c| matches!(arena.kind(c), NodeKind::Let | NodeKind::Const)),
        NodeKind::For => arena
            .first_child(n)
            .is_some_and(|init| matches!(arena.kind(init), NodeKind::Let | NodeKind::Const)),
        NodeKind::ForIn | NodeKind::ForOf => arena
            .first_child(n)
            .is_some_and(|target| matches!(arena.kind(target), NodeKind::Let | NodeKind::Const)),
        _ => false,
    }
}

/// The single generic traverser.
pub struct NodeTraversal;

impl NodeTraversal {
    /// Walk the subtree at `root`, firing the callback's hooks.
    pub fn traverse(arena: &mut AstArena, root: NodeId, cb: &mut impl TraversalCallback) {
        Self::walk(arena, root, arena.parent(root), cb);
    }

    fn walk(
        arena: &mut AstArena,
        node: NodeId,
        parent: Option<NodeId>,
        cb: &mut impl TraversalCallback,
    ) {
        if !cb.should_traverse(arena, node, parent) {
            return;
        }

        let scope = is_scope_root(arena, node);
        if scope {
            cb.enter_scope(arena, node);
        }

        // Snapshot so callbacks may detach/replace children mid-walk.
        let children: SmallVec<[NodeId; 8]> = arena.children(node).iter().copied().collect();
        for child in children {
            // A callback may have detached this child already.
            if arena.parent(child) == Some(node) {
                Self::walk(arena, child, Some(node), cb);
            }
        }

        cb.visit(arena, node, parent);

        if scope {
            cb.exit_scope(arena, node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build;

    struct Collector {
        visited: Vec<NodeId>,
        scopes_entered: usize,
    }

    impl TraversalCallback for Collector {
        fn visit(&mut self, _arena: &mut AstArena, node: NodeId, _parent: Option<NodeId>) {
            self.visited.push(node);
        }

        fn enter_scope(&mut self, _arena: &mut AstArena, _root: NodeId) {
            self.scopes_entered += 1;
        }
    }

    #[test]
    fn visits_post_order() {
        let mut arena = AstArena::new();
        let one = build::number(&mut arena, 1.0);
        let two = build::number(&mut arena, 2.0);
        let sum = build::add(&mut arena, one, two);
        let stmt = build::expr_result(&mut arena, sum);
        let script = build::script(&mut arena, vec![stmt]);

        let mut cb = Collector {
            visited: vec![],
            scopes_entered: 0,
        };
        NodeTraversal::traverse(&mut arena, script, &mut cb);
        assert_eq!(cb.visited, vec![one, two, sum, stmt, script]);
    }

    #[test]
    fn enters_function_scopes() {
        let mut arena = AstArena::new();
        let f = build::function(&mut arena, "f", &[], vec![]);
        let script = build::script(&mut arena, vec![f]);

        let mut cb = Collector {
            visited: vec![],
            scopes_entered: 0,
        };
        NodeTraversal::traverse(&mut arena, script, &mut cb);
        assert_eq!(cb.scopes_entered, 1);
    }

    #[test]
    fn block_with_let_is_scope_root() {
        let mut arena = AstArena::new();
        let decl = build::let_decl(&mut arena, "x", None);
        let block = build::block(&mut arena, vec![decl]);
        assert!(is_scope_root(&arena, block));

        let plain = build::block(&mut arena, vec![]);
        assert!(!is_scope_root(&arena, plain));
    }
}
