//! Scope and variable records.
//!
//! Scope and variable data live in a [`ScopeStore`]; `ScopeId`/`VarId`
//! handles keep identity stable while a scope's contents are rebuilt, which
//! is what lets the incremental creator refresh a scope in place without
//! invalidating anyone's reference to it.

use rustc_hash::FxHashMap;

use stoat_ast::{NodeId, Symbol};
use stoat_identity::{ScopeId, TypeId, VarId};

/// What kind of binding introduced a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Param,
    Var,
    Let,
    Const,
    Function,
    Class,
    Catch,
    Extern,
}

impl VarKind {
    /// Hoisted bindings land on the nearest function/global scope.
    pub fn is_hoisted(self) -> bool {
        matches!(self, VarKind::Var | VarKind::Function | VarKind::Extern)
    }
}

#[derive(Debug)]
pub(crate) struct VarData {
    pub name: Symbol,
    pub decl_node: NodeId,
    pub declared_ty: Option<TypeId>,
    pub kind: VarKind,
    pub scope: ScopeId,
    /// Dense index within the owning scope; drives liveness bitmaps.
    pub index: u32,
    /// The script whose text declares this var. Used by the incremental
    /// creator to forget bindings when a script is invalidated.
    pub script: Option<NodeId>,
}

#[derive(Debug)]
pub(crate) struct ScopeData {
    pub root: NodeId,
    pub parent: Option<ScopeId>,
    pub vars: FxHashMap<Symbol, VarId>,
    pub ordered: Vec<VarId>,
    pub is_block_scope: bool,
    pub depth: u32,
}

/// Owns every scope and variable record of one compilation.
#[derive(Debug, Default)]
pub struct ScopeStore {
    scopes: Vec<ScopeData>,
    vars: Vec<VarData>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_scope(
        &mut self,
        root: NodeId,
        parent: Option<ScopeId>,
        is_block_scope: bool,
    ) -> ScopeId {
        let depth = parent.map_or(0, |p| self.depth(p) + 1);
        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes.push(ScopeData {
            root,
            parent,
            vars: FxHashMap::default(),
            ordered: Vec::new(),
            is_block_scope,
            depth,
        });
        id
    }

    fn scope(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id.index() as usize]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut ScopeData {
        &mut self.scopes[id.index() as usize]
    }

    pub fn root(&self, id: ScopeId) -> NodeId {
        self.scope(id).root
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scope(id).parent
    }

    pub fn depth(&self, id: ScopeId) -> u32 {
        self.scope(id).depth
    }

    pub fn is_block_scope(&self, id: ScopeId) -> bool {
        self.scope(id).is_block_scope
    }

    /// Used by the incremental creator when a scope is reparented by a
    /// tree transformation without its own contents changing.
    pub(crate) fn reparent(&mut self, id: ScopeId, parent: Option<ScopeId>) {
        let depth = parent.map_or(0, |p| self.depth(p) + 1);
        let scope = self.scope_mut(id);
        scope.parent = parent;
        scope.depth = depth;
    }

    /// Declare a new variable. The first declaration of a name wins;
    /// redeclaring returns the existing binding.
    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: Symbol,
        decl_node: NodeId,
        kind: VarKind,
        script: Option<NodeId>,
    ) -> VarId {
        if let Some(&existing) = self.scope(scope).vars.get(&name) {
            return existing;
        }
        let index = self.scope(scope).ordered.len() as u32;
        let id = VarId::new(self.vars.len() as u32);
        self.vars.push(VarData {
            name,
            decl_node,
            declared_ty: None,
            kind,
            scope,
            index,
            script,
        });
        let data = self.scope_mut(scope);
        data.vars.insert(name, id);
        data.ordered.push(id);
        id
    }

    /// Drop every binding of `scope`. Scope identity survives; old VarIds
    /// become dangling on purpose (a refresh makes new records).
    pub(crate) fn clear_vars(&mut self, scope: ScopeId) {
        let data = self.scope_mut(scope);
        data.vars.clear();
        data.ordered.clear();
    }

    /// Look up `name` in `scope` only.
    pub fn get_own(&self, scope: ScopeId, name: Symbol) -> Option<VarId> {
        self.scope(scope).vars.get(&name).copied()
    }

    /// Look up `name` in `scope` and its ancestors.
    pub fn lookup(&self, scope: ScopeId, name: Symbol) -> Option<VarId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(v) = self.get_own(s, name) {
                return Some(v);
            }
            cur = self.parent(s);
        }
        None
    }

    pub fn is_declared(&self, scope: ScopeId, name: Symbol, include_ancestors: bool) -> bool {
        if include_ancestors {
            self.lookup(scope, name).is_some()
        } else {
            self.get_own(scope, name).is_some()
        }
    }

    /// All bindings visible from `scope`, innermost first. Shadowed outer
    /// bindings are excluded.
    pub fn accessible_vars(&self, scope: ScopeId) -> Vec<VarId> {
        let mut seen = FxHashMap::default();
        let mut out = Vec::new();
        let mut cur = Some(scope);
        while let Some(s) = cur {
            for &v in &self.scope(s).ordered {
                let name = self.var_name(v);
                if seen.insert(name, ()).is_none() {
                    out.push(v);
                }
            }
            cur = self.parent(s);
        }
        out
    }

    /// Bindings of `scope` itself, in declaration order.
    pub fn own_vars(&self, scope: ScopeId) -> &[VarId] {
        &self.scope(scope).ordered
    }

    pub fn var_count(&self, scope: ScopeId) -> usize {
        self.scope(scope).ordered.len()
    }

    // ------------------------------------------------------------------
    // Variable record accessors
    // ------------------------------------------------------------------

    fn var(&self, id: VarId) -> &VarData {
        &self.vars[id.index() as usize]
    }

    pub fn var_name(&self, id: VarId) -> Symbol {
        self.var(id).name
    }

    pub fn var_decl_node(&self, id: VarId) -> NodeId {
        self.var(id).decl_node
    }

    pub fn var_kind(&self, id: VarId) -> VarKind {
        self.var(id).kind
    }

    pub fn var_scope(&self, id: VarId) -> ScopeId {
        self.var(id).scope
    }

    /// Dense per-scope index, stable for the lifetime of the binding.
    pub fn var_index(&self, id: VarId) -> u32 {
        self.var(id).index
    }

    pub fn var_script(&self, id: VarId) -> Option<NodeId> {
        self.var(id).script
    }

    pub fn declared_type(&self, id: VarId) -> Option<TypeId> {
        self.var(id).declared_ty
    }

    pub fn set_declared_type(&mut self, id: VarId, ty: TypeId) {
        self.vars[id.index() as usize].declared_ty = Some(ty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_ast::{build, AstArena};

    #[test]
    fn lookup_walks_parents() {
        let mut arena = AstArena::new();
        let root = arena.new_node(stoat_ast::NodeKind::Root);
        let func = arena.new_node(stoat_ast::NodeKind::Function);
        let a = arena.intern("a");
        let b = arena.intern("b");
        let decl = build::name(&mut arena, "a");

        let mut store = ScopeStore::new();
        let global = store.create_scope(root, None, false);
        let inner = store.create_scope(func, Some(global), false);
        store.declare(global, a, decl, VarKind::Var, None);

        assert!(store.lookup(inner, a).is_some());
        assert!(store.lookup(inner, b).is_none());
        assert!(store.is_declared(inner, a, true));
        assert!(!store.is_declared(inner, a, false));
        assert_eq!(store.depth(inner), 1);
    }

    #[test]
    fn first_declaration_wins() {
        let mut arena = AstArena::new();
        let root = arena.new_node(stoat_ast::NodeKind::Root);
        let a = arena.intern("a");
        let d1 = build::name(&mut arena, "a");
        let d2 = build::name(&mut arena, "a");

        let mut store = ScopeStore::new();
        let global = store.create_scope(root, None, false);
        let v1 = store.declare(global, a, d1, VarKind::Var, None);
        let v2 = store.declare(global, a, d2, VarKind::Var, None);
        assert_eq!(v1, v2);
        assert_eq!(store.var_decl_node(v1), d1);
    }

    #[test]
    fn accessible_vars_respects_shadowing() {
        let mut arena = AstArena::new();
        let root = arena.new_node(stoat_ast::NodeKind::Root);
        let func = arena.new_node(stoat_ast::NodeKind::Function);
        let a = arena.intern("a");
        let d1 = build::name(&mut arena, "a");
        let d2 = build::name(&mut arena, "a");

        let mut store = ScopeStore::new();
        let global = store.create_scope(root, None, false);
        let inner = store.create_scope(func, Some(global), false);
        let outer_var = store.declare(global, a, d1, VarKind::Var, None);
        let inner_var = store.declare(inner, a, d2, VarKind::Param, None);

        let visible = store.accessible_vars(inner);
        assert!(visible.contains(&inner_var));
        assert!(!visible.contains(&outer_var));
    }
}
