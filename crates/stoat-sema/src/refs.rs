//! Reference collection.
//!
//! For each binding of a scope, the ordered list of its syntactic uses,
//! tagged with enough context (loop nesting, nested-function nesting,
//! top-level statement, source input) for transforms to decide whether a
//! declaration can move or inline: cross-module code motion, property
//! renaming, and inlining all consume these collections.

use rustc_hash::FxHashMap;

use stoat_ast::{AstArena, NodeId, NodeKind, PropKey};
use stoat_identity::{InputId, ScopeId, VarId};

use crate::scope::ScopeStore;

/// Node prop the parser collaborator sets on names participating in a
/// getter or setter definition.
pub const ACCESSOR_PROP: PropKey = PropKey::Other(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// The declaring occurrence; `init` records whether it assigns.
    Declaration { init: bool },
    Read,
    Write,
    /// Compound assignment or update: reads then writes.
    ReadWrite,
}

impl ReferenceKind {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ReferenceKind::Write
                | ReferenceKind::ReadWrite
                | ReferenceKind::Declaration { init: true }
        )
    }

    pub fn is_read(self) -> bool {
        matches!(self, ReferenceKind::Read | ReferenceKind::ReadWrite)
    }
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub node: NodeId,
    pub kind: ReferenceKind,
    /// The statement directly under the scope root containing this
    /// reference; the unit cross-module motion moves.
    pub top_stmt: NodeId,
    pub input: Option<InputId>,
    /// Inside a loop body relative to the declaring scope.
    pub in_loop: bool,
    /// Inside a function nested in the declaring scope, which may run
    /// any number of times.
    pub in_nested_fn: bool,
    /// Nesting depth of control structures at the reference.
    pub nesting: u32,
    /// Part of a getter/setter definition.
    pub in_getter_setter: bool,
}

/// All references to one variable, in traversal (source) order.
#[derive(Debug, Default, Clone)]
pub struct ReferenceCollection {
    pub refs: Vec<Reference>,
}

impl ReferenceCollection {
    pub fn writes(&self) -> impl Iterator<Item = &Reference> {
        self.refs.iter().filter(|r| r.kind.is_write())
    }

    pub fn reads(&self) -> impl Iterator<Item = &Reference> {
        self.refs.iter().filter(|r| r.kind.is_read())
    }

    /// Exactly one write over the variable's lifetime: a single write
    /// that sits in neither a loop nor a nested function.
    pub fn is_assigned_once_in_lifetime(&self) -> bool {
        let mut writes = self.writes();
        let Some(first) = writes.next() else {
            return false;
        };
        if writes.next().is_some() {
            return false;
        }
        !first.in_loop && !first.in_nested_fn
    }

    /// Every read is preceded by a write at its own nesting level or
    /// shallower: the variable is never observed undefined. A write
    /// deeper than the read is conditional and does not define it.
    pub fn is_well_defined(&self) -> bool {
        let mut defined_at: Option<u32> = None;
        for r in &self.refs {
            if r.kind.is_read() && !matches!(defined_at, Some(d) if d <= r.nesting) {
                return false;
            }
            if r.kind.is_write() {
                defined_at = Some(defined_at.map_or(r.nesting, |d| d.min(r.nesting)));
            }
        }
        true
    }

    /// Observed from outside straight-line code in its own scope.
    pub fn escapes(&self) -> bool {
        self.refs.iter().any(|r| r.in_nested_fn || r.in_getter_setter)
    }

    pub fn declaration(&self) -> Option<&Reference> {
        self.refs
            .iter()
            .find(|r| matches!(r.kind, ReferenceKind::Declaration { .. }))
    }
}

/// Collects references for every binding of one scope.
pub struct ReferenceCollector<'a> {
    arena: &'a AstArena,
    store: &'a ScopeStore,
    scope: ScopeId,
    out: FxHashMap<VarId, ReferenceCollection>,
}

impl<'a> ReferenceCollector<'a> {
    pub fn collect(
        arena: &'a AstArena,
        store: &'a ScopeStore,
        scope: ScopeId,
    ) -> FxHashMap<VarId, ReferenceCollection> {
        let mut collector = ReferenceCollector {
            arena,
            store,
            scope,
            out: FxHashMap::default(),
        };
        let root = store.root(scope);
        let tops: Vec<NodeId> = match arena.kind(root) {
            NodeKind::Function => arena.children(arena.child(root, 2)).to_vec(),
            NodeKind::Root => arena
                .children(root)
                .iter()
                .flat_map(|&s| arena.children(s).iter().copied())
                .collect(),
            _ => arena.children(root).to_vec(),
        };
        for top in tops {
            collector.walk(top, top, false, false, 0);
        }
        collector.out
    }

    fn record(&mut self, node: NodeId, kind: ReferenceKind, ctx: (NodeId, bool, bool, u32)) {
        let NodeKind::Name(sym) = *self.arena.kind(node) else {
            return;
        };
        let Some(var) = self.store.lookup(self.scope, sym) else {
            return;
        };
        // Only track bindings owned by the scope under collection.
        if self.store.var_scope(var) != self.scope {
            return;
        }
        let (top_stmt, in_loop, in_nested_fn, nesting) = ctx;
        let in_getter_setter = self.arena.get_prop(node, ACCESSOR_PROP);
        self.out.entry(var).or_default().refs.push(Reference {
            node,
            kind,
            top_stmt,
            input: self.arena.input(node),
            in_loop,
            in_nested_fn,
            nesting,
            in_getter_setter,
        });
    }

    fn walk(&mut self, node: NodeId, top: NodeId, in_loop: bool, in_fn: bool, nesting: u32) {
        match *self.arena.kind(node) {
            NodeKind::Var | NodeKind::Let | NodeKind::Const => {
                for &binding in self.arena.children(node) {
                    match *self.arena.kind(binding) {
                        NodeKind::Name(_) => {
                            let init = self.arena.first_child(binding);
                            self.record(
                                binding,
                                ReferenceKind::Declaration { init: init.is_some() },
                                (top, in_loop, in_fn, nesting),
                            );
                            if let Some(init) = init {
                                self.walk(init, top, in_loop, in_fn, nesting);
                            }
                        }
                        NodeKind::DestructuringLhs => {
                            let pattern = self.arena.child(binding, 0);
                            for &sk in self.arena.children(pattern) {
                                if let Some(target) = self.arena.first_child(sk) {
                                    self.record(
                                        target,
                                        ReferenceKind::Declaration { init: true },
                                        (top, in_loop, in_fn, nesting),
                                    );
                                }
                            }
                            let rhs = self.arena.child(binding, 1);
                            self.walk(rhs, top, in_loop, in_fn, nesting);
                        }
                        _ => {}
                    }
                }
            }

            NodeKind::Assign(op) => {
                let target = self.arena.child(node, 0);
                let value = self.arena.child(node, 1);
                if matches!(self.arena.kind(target), NodeKind::Name(_)) {
                    let kind = if op.is_compound() {
                        ReferenceKind::ReadWrite
                    } else {
                        ReferenceKind::Write
                    };
                    self.record(target, kind, (top, in_loop, in_fn, nesting));
                } else {
                    self.walk(target, top, in_loop, in_fn, nesting);
                }
                self.walk(value, top, in_loop, in_fn, nesting);
            }

            NodeKind::Update { .. } => {
                let operand = self.arena.child(node, 0);
                if matches!(self.arena.kind(operand), NodeKind::Name(_)) {
                    self.record(operand, ReferenceKind::ReadWrite, (top, in_loop, in_fn, nesting));
                } else {
                    self.walk(operand, top, in_loop, in_fn, nesting);
                }
            }

            NodeKind::Name(_) => {
                // For-in binding targets are writes.
                let is_loop_target = self.arena.parent(node).is_some_and(|p| {
                    matches!(self.arena.kind(p), NodeKind::ForIn | NodeKind::ForOf)
                        && self.arena.child(p, 0) == node
                });
                let kind = if is_loop_target {
                    ReferenceKind::Write
                } else {
                    ReferenceKind::Read
                };
                self.record(node, kind, (top, in_loop, in_fn, nesting));
            }

            NodeKind::Function => {
                // Everything below runs an unknowable number of times.
                let body = self.arena.child(node, 2);
                self.walk(body, top, in_loop, true, nesting + 1);
            }

            NodeKind::While | NodeKind::DoWhile | NodeKind::For | NodeKind::ForIn
            | NodeKind::ForOf => {
                let children: Vec<NodeId> = self.arena.children(node).to_vec();
                let body_index = match self.arena.kind(node) {
                    NodeKind::DoWhile => 0,
                    NodeKind::While => 1,
                    NodeKind::For => 3,
                    _ => 2,
                };
                for (i, &c) in children.iter().enumerate() {
                    let inside = i == body_index;
                    self.walk(c, top, in_loop || inside, in_fn, nesting + 1);
                }
            }

            NodeKind::If | NodeKind::Switch | NodeKind::Try | NodeKind::Case
            | NodeKind::Catch | NodeKind::Hook | NodeKind::And | NodeKind::Or => {
                for &c in &self.arena.children(node).to_vec() {
                    self.walk(c, top, in_loop, in_fn, nesting + 1);
                }
            }

            _ => {
                for &c in &self.arena.children(node).to_vec() {
                    self.walk(c, top, in_loop, in_fn, nesting);
                }
            }
        }
    }
}

/// Whether a declaration's initializer can move or inline: pure literals,
/// function expressions, reads of well-defined assigned-once bindings,
/// literal aggregates of movable parts, or a prototype-inheritance helper
/// call.
pub fn is_movable_init(
    arena: &AstArena,
    store: &ScopeStore,
    scope: ScopeId,
    collections: &FxHashMap<VarId, ReferenceCollection>,
    expr: NodeId,
) -> bool {
    match *arena.kind(expr) {
        NodeKind::Number(_)
        | NodeKind::Str(_)
        | NodeKind::Bool(_)
        | NodeKind::Null
        | NodeKind::Function => true,
        NodeKind::Name(sym) => match store.lookup(scope, sym) {
            Some(var) => collections.get(&var).is_some_and(|c| {
                c.is_assigned_once_in_lifetime() && c.is_well_defined()
            }),
            None => false,
        },
        NodeKind::ObjectLit => arena.children(expr).iter().all(|&sk| {
            arena
                .first_child(sk)
                .is_none_or(|v| is_movable_init(arena, store, scope, collections, v))
        }),
        NodeKind::ArrayLit => arena
            .children(expr)
            .iter()
            .all(|&e| is_movable_init(arena, store, scope, collections, e)),
        NodeKind::Call => {
            let callee = arena.child(expr, 0);
            let is_inherits_helper = match arena.kind(callee) {
                NodeKind::GetProp(prop) => arena.name_of(*prop) == "inherits",
                NodeKind::Name(sym) => arena.name_of(*sym) == "inherits",
                _ => false,
            };
            is_inherits_helper
                && arena.children(expr)[1..]
                    .iter()
                    .all(|&a| is_movable_init(arena, store, scope, collections, a))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope_creator::SyntacticScopeCreator;
    use stoat_ast::build;

    fn collect_global(
        build_stmts: impl FnOnce(&mut AstArena) -> Vec<NodeId>,
    ) -> (AstArena, SyntacticScopeCreator, ScopeId, FxHashMap<VarId, ReferenceCollection>) {
        let mut arena = AstArena::new();
        let stmts = build_stmts(&mut arena);
        let script = build::script(&mut arena, stmts);
        let root = build::root(&mut arena, vec![script]);
        let mut creator = SyntacticScopeCreator::new();
        let scope = creator.create_scope(&arena, root, None);
        let refs = ReferenceCollector::collect(&arena, creator.store(), scope);
        (arena, creator, scope, refs)
    }

    fn var_of(
        arena: &AstArena,
        creator: &SyntacticScopeCreator,
        scope: ScopeId,
        name: &str,
    ) -> VarId {
        let sym = arena.interner().get(name).unwrap();
        creator.store().lookup(scope, sym).unwrap()
    }

    #[test]
    fn single_init_is_assigned_once() {
        let (arena, creator, scope, refs) = collect_global(|a| {
            let one = build::number(a, 1.0);
            let d = build::var_decl(a, "x", Some(one));
            let xr = build::name(a, "x");
            let call = build::call_name(a, "use", vec![xr]);
            let s = build::expr_result(a, call);
            vec![d, s]
        });
        let x = var_of(&arena, &creator, scope, "x");
        let c = &refs[&x];
        assert!(c.is_assigned_once_in_lifetime());
        assert!(c.is_well_defined());
        assert!(!c.escapes());
        assert_eq!(c.refs.len(), 2);
    }

    #[test]
    fn write_in_loop_is_not_assigned_once() {
        let (arena, creator, scope, refs) = collect_global(|a| {
            let d = build::var_decl(a, "x", None);
            let cond = build::name(a, "cond");
            let cd = build::var_decl(a, "cond", None);
            let xt = build::name(a, "x");
            let one = build::number(a, 1.0);
            let asg = build::assign(a, xt, one);
            let s = build::expr_result(a, asg);
            let body = build::block(a, vec![s]);
            let w = build::while_stmt(a, cond, body);
            vec![cd, d, w]
        });
        let x = var_of(&arena, &creator, scope, "x");
        assert!(!refs[&x].is_assigned_once_in_lifetime());
    }

    #[test]
    fn write_in_nested_function_is_not_assigned_once() {
        let (arena, creator, scope, refs) = collect_global(|a| {
            let d = build::var_decl(a, "x", None);
            let xt = build::name(a, "x");
            let one = build::number(a, 1.0);
            let asg = build::assign(a, xt, one);
            let s = build::expr_result(a, asg);
            let f = build::function(a, "f", &[], vec![s]);
            vec![d, f]
        });
        let x = var_of(&arena, &creator, scope, "x");
        let c = &refs[&x];
        assert!(!c.is_assigned_once_in_lifetime());
        assert!(c.escapes());
    }

    #[test]
    fn conditional_write_is_not_well_defined() {
        let (arena, creator, scope, refs) = collect_global(|a| {
            let d = build::var_decl(a, "x", None);
            let cond = build::name(a, "cond");
            let cd = build::var_decl(a, "cond", None);
            let xt = build::name(a, "x");
            let one = build::number(a, 1.0);
            let asg = build::assign(a, xt, one);
            let s = build::expr_result(a, asg);
            let iff = build::if_stmt(a, cond, s, None);
            let xr = build::name(a, "x");
            let use_ = build::expr_result(a, xr);
            vec![cd, d, iff, use_]
        });
        let x = var_of(&arena, &creator, scope, "x");
        assert!(!refs[&x].is_well_defined());
    }

    #[test]
    fn movable_initializers() {
        let (arena, creator, scope, refs) = collect_global(|a| {
            let one = build::number(a, 1.0);
            let d1 = build::var_decl(a, "a", Some(one));
            let ar = build::name(a, "a");
            let d2 = build::var_decl(a, "b", Some(ar));
            let callee = build::name(a, "impure");
            let call = build::call(a, callee, vec![]);
            let d3 = build::var_decl(a, "c", Some(call));
            vec![d1, d2, d3]
        });
        let get_init = |name: &str| {
            let v = var_of(&arena, &creator, scope, name);
            let decl = refs[&v].declaration().unwrap().node;
            arena.first_child(decl).unwrap()
        };
        assert!(is_movable_init(&arena, creator.store(), scope, &refs, get_init("a")));
        // a read of an assigned-once, well-defined binding moves
        assert!(is_movable_init(&arena, creator.store(), scope, &refs, get_init("b")));
        // an arbitrary call does not
        assert!(!is_movable_init(&arena, creator.store(), scope, &refs, get_init("c")));
    }

    #[test]
    fn prototype_inheritance_helper_is_movable() {
        let (arena, creator, scope, refs) = collect_global(|a| {
            let child = build::function(a, "", &[], vec![]);
            let d0 = build::var_decl(a, "Child", Some(child));
            let ns = build::name(a, "goog");
            let nsd = build::var_decl(a, "goog", None);
            let helper = build::getprop(a, ns, "inherits");
            let c = build::name(a, "Child");
            let call = build::call(a, helper, vec![c]);
            let d = build::var_decl(a, "link", Some(call));
            vec![d0, nsd, d]
        });
        let link = var_of(&arena, &creator, scope, "link");
        let decl = refs[&link].declaration().unwrap().node;
        let init = arena.first_child(decl).unwrap();
        assert!(is_movable_init(&arena, creator.store(), scope, &refs, init));
    }
}
