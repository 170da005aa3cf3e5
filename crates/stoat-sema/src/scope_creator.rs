//! Scope construction: the syntactic scanner and the memoizing creator.
//!
//! [`SyntacticScopeCreator`] builds a scope from the tree every time it is
//! asked. [`IncrementalScopeCreator`] memoizes scope objects per root node
//! and refreshes only the scopes whose enclosing change scope was reported
//! changed, preserving scope identity across refreshes.

use rustc_hash::{FxHashMap, FxHashSet};

use stoat_ast::{AstArena, NodeId, NodeKind, Symbol};
use stoat_identity::{InputId, ScopeId};

use crate::scope::{ScopeStore, VarKind};

/// One global binding contributed by a script: name, declaring name-node,
/// and binding kind. Recorded per script so an invalidated script can be
/// forgotten wholesale and rescanned.
type Contribution = (Symbol, NodeId, VarKind);

fn is_block_scope_root(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Block
            | NodeKind::For
            | NodeKind::ForIn
            | NodeKind::ForOf
            | NodeKind::Catch
    )
}

/// Collect hoisted bindings (`var`, function declarations) reachable from
/// `from` without crossing a function boundary.
fn scan_hoisted(arena: &AstArena, from: NodeId, out: &mut Vec<Contribution>) {
    for &child in arena.children(from) {
        match arena.kind(child) {
            NodeKind::Var => {
                for &binding in arena.children(child) {
                    collect_decl_targets(arena, binding, VarKind::Var, out);
                }
            }
            NodeKind::Function => {
                // A function introduces its own hoist scope; only the
                // declared name escapes to this one.
                let name = arena.child(child, 0);
                if let Some(sym) = arena.name_sym(name) {
                    if !arena.name_of(sym).is_empty() {
                        out.push((sym, name, VarKind::Function));
                    }
                }
            }
            _ => scan_hoisted(arena, child, out),
        }
    }
}

/// Declaration targets under one binding position: a plain `Name` (with
/// optional initializer child) or a destructuring pattern.
fn collect_decl_targets(
    arena: &AstArena,
    binding: NodeId,
    kind: VarKind,
    out: &mut Vec<Contribution>,
) {
    match arena.kind(binding) {
        NodeKind::Name(sym) => out.push((*sym, binding, kind)),
        NodeKind::DestructuringLhs => {
            let pattern = arena.child(binding, 0);
            for &sk in arena.children(pattern) {
                if let Some(target) = arena.first_child(sk) {
                    if let Some(sym) = arena.name_sym(target) {
                        out.push((sym, target, kind));
                    }
                }
            }
        }
        _ => {}
    }
}

/// Block-scoped bindings declared directly by `root`'s statement list.
fn scan_block_scoped(arena: &AstArena, root: NodeId, out: &mut Vec<Contribution>) {
    for &child in arena.children(root) {
        match arena.kind(child) {
            NodeKind::Let => {
                for &binding in arena.children(child) {
                    collect_decl_targets(arena, binding, VarKind::Let, out);
                }
            }
            NodeKind::Const => {
                for &binding in arena.children(child) {
                    collect_decl_targets(arena, binding, VarKind::Const, out);
                }
            }
            _ => {}
        }
    }
}

/// All bindings owned by the scope rooted at `root`.
fn scan_bindings(arena: &AstArena, root: NodeId) -> Vec<Contribution> {
    let mut out = Vec::new();
    match arena.kind(root) {
        NodeKind::Function => {
            let name = arena.child(root, 0);
            if let Some(sym) = arena.name_sym(name) {
                if !arena.name_of(sym).is_empty() {
                    out.push((sym, name, VarKind::Function));
                }
            }
            let params = arena.child(root, 1);
            for &p in arena.children(params) {
                if let Some(sym) = arena.name_sym(p) {
                    out.push((sym, p, VarKind::Param));
                }
            }
            let body = arena.child(root, 2);
            scan_hoisted(arena, body, &mut out);
            // Lets directly in the body belong to the function's body
            // scope rather than a nested block scope.
            scan_block_scoped(arena, body, &mut out);
        }
        NodeKind::Catch => {
            let param = arena.child(root, 0);
            if let Some(sym) = arena.name_sym(param) {
                out.push((sym, param, VarKind::Catch));
            }
            scan_block_scoped(arena, arena.child(root, 1), &mut out);
        }
        NodeKind::Block => scan_block_scoped(arena, root, &mut out),
        NodeKind::For => {
            let init = arena.child(root, 0);
            if matches!(arena.kind(init), NodeKind::Let | NodeKind::Const) {
                let kind = if matches!(arena.kind(init), NodeKind::Let) {
                    VarKind::Let
                } else {
                    VarKind::Const
                };
                for &binding in arena.children(init) {
                    collect_decl_targets(arena, binding, kind, &mut out);
                }
            }
        }
        NodeKind::ForIn | NodeKind::ForOf => {
            let target = arena.child(root, 0);
            if matches!(arena.kind(target), NodeKind::Let | NodeKind::Const) {
                let kind = if matches!(arena.kind(target), NodeKind::Let) {
                    VarKind::Let
                } else {
                    VarKind::Const
                };
                for &binding in arena.children(target) {
                    collect_decl_targets(arena, binding, kind, &mut out);
                }
            }
        }
        _ => {}
    }
    out
}

/// What one script contributes to the global scope: its hoisted bindings
/// plus its top-level `let`/`const`.
fn scan_script(arena: &AstArena, script: NodeId) -> Vec<Contribution> {
    let mut out = Vec::new();
    scan_hoisted(arena, script, &mut out);
    scan_block_scoped(arena, script, &mut out);
    out
}

/// Builds scopes directly from the tree, no memoization. The plain
/// creator analyses reach for when they need a throwaway scope.
#[derive(Debug, Default)]
pub struct SyntacticScopeCreator {
    store: ScopeStore,
    extern_inputs: FxHashSet<InputId>,
}

impl SyntacticScopeCreator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_externs(extern_inputs: FxHashSet<InputId>) -> Self {
        Self {
            store: ScopeStore::new(),
            extern_inputs,
        }
    }

    pub fn store(&self) -> &ScopeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ScopeStore {
        &mut self.store
    }

    pub fn create_scope(
        &mut self,
        arena: &AstArena,
        root: NodeId,
        parent: Option<ScopeId>,
    ) -> ScopeId {
        let is_block = is_block_scope_root(arena.kind(root));
        let scope = self.store.create_scope(root, parent, is_block);
        populate(
            &mut self.store,
            arena,
            scope,
            root,
            &self.extern_inputs,
        );
        scope
    }
}

fn populate(
    store: &mut ScopeStore,
    arena: &AstArena,
    scope: ScopeId,
    root: NodeId,
    extern_inputs: &FxHashSet<InputId>,
) {
    if matches!(arena.kind(root), NodeKind::Root) {
        for &script in arena.children(root) {
            let is_extern = arena
                .input(script)
                .is_some_and(|i| extern_inputs.contains(&i));
            for (sym, decl, kind) in scan_script(arena, script) {
                let kind = if is_extern { VarKind::Extern } else { kind };
                store.declare(scope, sym, decl, kind, Some(script));
            }
        }
    } else {
        let script = arena.enclosing_script(root);
        for (sym, decl, kind) in scan_bindings(arena, root) {
            store.declare(scope, sym, decl, kind, script);
        }
    }
}

/// A memoizing façade over scope construction.
///
/// While frozen, repeated `create_scope` calls on the same root return the
/// same scope. Change reports (`invalidate`) accumulate; the next
/// `thaw` + `freeze` cycle rebuilds the variable records of exactly the
/// scopes governed by an invalidated change scope, preserving every
/// `ScopeId`.
#[derive(Debug, Default)]
pub struct IncrementalScopeCreator {
    store: ScopeStore,
    frozen: bool,
    memo: FxHashMap<NodeId, ScopeId>,
    global: Option<(NodeId, ScopeId)>,
    invalidated: FxHashSet<NodeId>,
    contributions: FxHashMap<NodeId, Vec<Contribution>>,
    extern_inputs: FxHashSet<InputId>,
}

impl IncrementalScopeCreator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_externs(extern_inputs: FxHashSet<InputId>) -> Self {
        Self {
            extern_inputs,
            ..Self::default()
        }
    }

    pub fn store(&self) -> &ScopeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ScopeStore {
        &mut self.store
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Record that a change scope (script or function) was mutated. Its
    /// dependent scopes are refreshed on the next thaw/freeze cycle.
    pub fn invalidate(&mut self, change_scope_root: NodeId) {
        self.invalidated.insert(change_scope_root);
    }

    /// Apply pending refreshes and disallow further rebuilds.
    pub fn freeze(&mut self, arena: &AstArena) -> &mut Self {
        if !self.invalidated.is_empty() {
            self.refresh(arena);
        }
        self.frozen = true;
        self
    }

    pub fn thaw(&mut self) -> &mut Self {
        self.frozen = false;
        self
    }

    pub fn create_scope(
        &mut self,
        arena: &AstArena,
        root: NodeId,
        parent: Option<ScopeId>,
    ) -> ScopeId {
        if matches!(arena.kind(root), NodeKind::Root) {
            if let Some((global_root, scope)) = self.global {
                assert!(
                    global_root == root,
                    "the shared persistent scope must always be root at the tip of the AST"
                );
                return scope;
            }
            let scope = self.store.create_scope(root, None, false);
            self.rebuild_global(arena, scope, root, true);
            self.global = Some((root, scope));
            self.memo.insert(root, scope);
            return scope;
        }

        if let Some(&scope) = self.memo.get(&root) {
            // A transform may have reattached the root under a new parent
            // scope without touching the scope's own contents.
            if self.store.parent(scope) != parent {
                self.store.reparent(scope, parent);
            }
            return scope;
        }

        let is_block = is_block_scope_root(arena.kind(root));
        let scope = self.store.create_scope(root, parent, is_block);
        let script = arena.enclosing_script(root);
        for (sym, decl, kind) in scan_bindings(arena, root) {
            self.store.declare(scope, sym, decl, kind, script);
        }
        self.memo.insert(root, scope);
        scope
    }

    /// Rebuild the global binding map from per-script contributions. When
    /// `rescan_all` is set every script is rescanned; otherwise only the
    /// scripts in the invalidated set are, and the stored contributions of
    /// untouched scripts are replayed as-is.
    fn rebuild_global(&mut self, arena: &AstArena, scope: ScopeId, root: NodeId, rescan_all: bool) {
        let scripts: Vec<NodeId> = arena.children(root).to_vec();

        for &script in &scripts {
            if rescan_all || self.invalidated.contains(&script) {
                self.contributions
                    .insert(script, scan_script(arena, script));
            }
        }
        // A script that is no longer attached is forgotten entirely, even
        // if its bindings have since moved elsewhere; the new owner's
        // rescan re-adds them.
        self.contributions.retain(|script, _| scripts.contains(script));

        self.store.clear_vars(scope);
        for &script in &scripts {
            let is_extern = arena
                .input(script)
                .is_some_and(|i| self.extern_inputs.contains(&i));
            if let Some(entries) = self.contributions.get(&script) {
                for &(sym, decl, kind) in entries {
                    let kind = if is_extern { VarKind::Extern } else { kind };
                    self.store.declare(scope, sym, decl, kind, Some(script));
                }
            }
        }
    }

    fn refresh(&mut self, arena: &AstArena) {
        tracing::debug!(
            invalidated = self.invalidated.len(),
            "refreshing memoized scopes"
        );

        if let Some((root, scope)) = self.global {
            let any_script_invalid = self
                .invalidated
                .iter()
                .any(|n| matches!(arena.kind(*n), NodeKind::Script | NodeKind::Root));
            if any_script_invalid {
                self.rebuild_global(arena, scope, root, false);
            }
        }

        // Refresh local scopes governed by an invalidated change scope.
        let targets: Vec<(NodeId, ScopeId)> = self
            .memo
            .iter()
            .filter(|(root, _)| !matches!(arena.kind(**root), NodeKind::Root))
            .map(|(&root, &scope)| (root, scope))
            .collect();
        for (root, scope) in targets {
            let governing = arena.enclosing_change_scope(root);
            if self.invalidated.contains(&governing) {
                self.store.clear_vars(scope);
                let script = arena.enclosing_script(root);
                for (sym, decl, kind) in scan_bindings(arena, root) {
                    self.store.declare(scope, sym, decl, kind, script);
                }
            }
        }

        self.invalidated.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_ast::build;

    /// Two scripts under a root: `var a; var b; function foo() { var inside = 1; }`
    /// and `var x;`.
    fn two_script_program(arena: &mut AstArena) -> (NodeId, NodeId, NodeId, NodeId) {
        let a = build::var_decl(arena, "a", None);
        let b = build::var_decl(arena, "b", None);
        let one = build::number(arena, 1.0);
        let inside = build::var_decl(arena, "inside", Some(one));
        let foo = build::function(arena, "foo", &[], vec![inside]);
        let script1 = build::script(arena, vec![a, b, foo]);
        let x = build::var_decl(arena, "x", None);
        let script2 = build::script(arena, vec![x]);
        let root = build::root(arena, vec![script1, script2]);
        arena.set_input(script1, InputId::new(0));
        arena.set_input(script2, InputId::new(1));
        (root, script1, script2, foo)
    }

    fn declared(creator: &IncrementalScopeCreator, arena: &AstArena, scope: ScopeId, name: &str) -> bool {
        let Some(sym) = arena.interner().get(name) else {
            return false;
        };
        creator.store().is_declared(scope, sym, true)
    }

    #[test]
    fn memoization_returns_same_scope_while_frozen() {
        let mut arena = AstArena::new();
        let (root, ..) = two_script_program(&mut arena);
        let mut creator = IncrementalScopeCreator::new();
        creator.freeze(&arena);

        let s1 = creator.create_scope(&arena, root, None);
        let s2 = creator.create_scope(&arena, root, None);
        assert_eq!(s1, s2);

        creator.thaw();
        creator.freeze(&arena);
        assert_eq!(creator.create_scope(&arena, root, None), s1);
    }

    #[test]
    #[should_panic(expected = "shared persistent scope must always be root")]
    fn global_scope_requires_current_root() {
        let mut arena = AstArena::new();
        let (root, ..) = two_script_program(&mut arena);
        let mut creator = IncrementalScopeCreator::new();
        creator.freeze(&arena);
        creator.create_scope(&arena, root, None);

        let other_root = arena.new_node(NodeKind::Root);
        creator.create_scope(&arena, other_root, None);
    }

    #[test]
    fn partial_global_refresh_forgets_removed_decl() {
        let mut arena = AstArena::new();
        let (root, script1, _script2, foo) = two_script_program(&mut arena);
        let mut creator = IncrementalScopeCreator::new();
        creator.freeze(&arena);

        let global = creator.create_scope(&arena, root, None);
        let fn_scope = creator.create_scope(&arena, foo, Some(global));
        let inside_sym = arena.interner().get("inside").unwrap();
        let inside_var = creator.store().lookup(fn_scope, inside_sym).unwrap();

        assert!(declared(&creator, &arena, global, "a"));
        assert!(declared(&creator, &arena, global, "b"));
        assert!(declared(&creator, &arena, global, "x"));
        assert!(!declared(&creator, &arena, global, "nonexistant"));

        // Remove `var a;` and report the change.
        let a_decl = arena.child(script1, 0);
        arena.detach(a_decl);
        creator.invalidate(script1);

        // Frozen: the stale binding is still visible, and identity holds.
        let global2 = creator.create_scope(&arena, root, None);
        assert_eq!(global, global2);
        assert!(declared(&creator, &arena, global2, "a"));

        creator.thaw();
        creator.freeze(&arena);

        let global3 = creator.create_scope(&arena, root, None);
        assert_eq!(global, global3);
        assert!(!declared(&creator, &arena, global3, "a"));
        assert!(declared(&creator, &arena, global3, "b"));
        assert!(declared(&creator, &arena, global3, "x"));

        // The untouched function scope kept its variable records.
        let fn_scope2 = creator.create_scope(&arena, foo, Some(global3));
        assert_eq!(fn_scope, fn_scope2);
        assert_eq!(
            creator.store().lookup(fn_scope2, inside_sym),
            Some(inside_var)
        );
    }

    #[test]
    fn moved_decl_survives_invalidation_of_original_script() {
        let mut arena = AstArena::new();
        let a = build::var_decl(&mut arena, "a", None);
        let b = build::var_decl(&mut arena, "b", None);
        let script1 = build::script(&mut arena, vec![a, b]);
        let x = build::var_decl(&mut arena, "x", None);
        let y = build::var_decl(&mut arena, "y", None);
        let script2 = build::script(&mut arena, vec![x, y]);
        let root = build::root(&mut arena, vec![script1, script2]);

        let mut creator = IncrementalScopeCreator::new();
        creator.freeze(&arena);
        let global = creator.create_scope(&arena, root, None);
        for name in ["a", "b", "x", "y"] {
            assert!(declared(&creator, &arena, global, name));
        }

        // Move `var b;` from script1 to script2 and report both.
        arena.detach(b);
        arena.append_child(script2, b);
        creator.invalidate(script1);
        creator.invalidate(script2);
        creator.thaw();
        creator.freeze(&arena);

        let global = creator.create_scope(&arena, root, None);
        for name in ["a", "b", "x", "y"] {
            assert!(declared(&creator, &arena, global, name));
        }

        // Invalidating the original script alone must not lose `b`: the
        // original script forgot the moved binding when it was rescanned.
        creator.invalidate(script1);
        creator.thaw();
        creator.freeze(&arena);

        let global = creator.create_scope(&arena, root, None);
        for name in ["a", "b", "x", "y"] {
            assert!(declared(&creator, &arena, global, name));
        }
    }

    #[test]
    fn redeclaration_in_second_script_survives_refresh() {
        let mut arena = AstArena::new();
        let a1 = build::var_decl(&mut arena, "a", None);
        let b = build::var_decl(&mut arena, "b", None);
        let script1 = build::script(&mut arena, vec![a1, b]);
        let a2 = build::var_decl(&mut arena, "a", None);
        let script2 = build::script(&mut arena, vec![a2]);
        let root = build::root(&mut arena, vec![script1, script2]);

        let mut creator = IncrementalScopeCreator::new();
        creator.freeze(&arena);
        let global = creator.create_scope(&arena, root, None);
        assert!(declared(&creator, &arena, global, "a"));
        assert!(declared(&creator, &arena, global, "b"));

        arena.detach(a1);
        arena.detach(b);
        creator.invalidate(script1);
        creator.thaw();
        creator.freeze(&arena);

        let global2 = creator.create_scope(&arena, root, None);
        assert_eq!(global, global2);
        assert!(declared(&creator, &arena, global2, "a"));
        assert!(!declared(&creator, &arena, global2, "b"));
    }

    #[test]
    fn reparenting_preserves_scope_and_vars() {
        let mut arena = AstArena::new();
        let one = build::number(&mut arena, 1.0);
        let inside = build::var_decl(&mut arena, "inside", Some(one));
        let foo = build::function(&mut arena, "foo", &[], vec![inside]);
        let block = build::block(&mut arena, vec![foo]);
        let script = build::script(&mut arena, vec![block]);
        let root = build::root(&mut arena, vec![script]);

        let mut creator = IncrementalScopeCreator::new();
        creator.freeze(&arena);
        let global1 = creator.create_scope(&arena, root, None);
        let block_scope = creator.create_scope(&arena, block, Some(global1));
        let fn_scope1 = creator.create_scope(&arena, foo, Some(block_scope));
        assert_eq!(
            creator.store().depth(fn_scope1),
            creator.store().depth(block_scope) + 1
        );
        let inside_sym = arena.interner().get("inside").unwrap();
        let inside1 = creator.store().lookup(fn_scope1, inside_sym).unwrap();

        // Hoist the function out of the block.
        creator.invalidate(script);
        arena.detach(foo);
        arena.replace_with(block, foo);

        creator.thaw();
        creator.freeze(&arena);

        let global2 = creator.create_scope(&arena, root, None);
        let fn_scope2 = creator.create_scope(&arena, foo, Some(global2));
        assert_eq!(fn_scope1, fn_scope2);
        assert_eq!(creator.store().parent(fn_scope2), Some(global2));
        assert_eq!(
            creator.store().depth(fn_scope2),
            creator.store().depth(global2) + 1
        );
        assert_eq!(creator.store().lookup(fn_scope2, inside_sym), Some(inside1));
    }
}
