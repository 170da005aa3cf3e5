//! Type inference: abstract interpretation of every function scope over
//! its control-flow graph.
//!
//! Scopes are processed bottom-up over the scope tree, so a function's
//! summary exists before its enclosing scope types the calls to it. A
//! call to a function whose summary is not yet computed (a forward
//! reference between siblings) records a deferred check, re-verified once
//! every summary exists.
//!
//! Within one scope the engine runs an optional backward pass (collecting
//! constraints on undeclared formals), then a forward pass that maintains
//! a typing environment per CFG edge: the true successor of a condition
//! sees the condition specialized truthy, the false successor falsy, and
//! exceptional successors see the unrefined in-environment.

mod backward;
mod condition;
mod expr;


use rustc_hash::FxHashMap;

use stoat_ast::{
    AstArena, JsDoc, NodeId, NodeKind, Symbol, TypeExpr,
};
use stoat_identity::{ScopeId, TypeId};

use crate::cfg::{Branch, CfgVertexId, ControlFlowAnalysis, ControlFlowGraph};
use crate::env::TypeEnv;
use crate::errors::{SemanticError, SemanticWarning, TypeError, TypeWarning};
use crate::scope::{ScopeStore, VarKind};
use crate::scope_creator::SyntacticScopeCreator;
use crate::types::{
    FunctionType, NominalDef, NominalId, ObjectType, Property, TypeIdVec, TypeStore,
};

/// Per-function record produced by inference and consumed by callers.
/// Immutable once computed.
#[derive(Debug, Clone)]
pub struct FunctionSummary {
    /// The function type: formals, return, receiver, generics.
    pub fn_type: TypeId,
    /// Types outer free variables must have for the body to be sound.
    pub outer_requirements: Vec<(Symbol, TypeId)>,
}

/// A call site typed before its callee was summarized.
#[derive(Debug, Clone)]
pub struct DeferredCheck {
    pub call_site: NodeId,
    pub callee: NodeId,
    /// The type the caller required of the return value; unknown if none.
    pub expected_ret: TypeId,
    pub arg_types: Vec<TypeId>,
}

/// Everything inference produces for one compilation.
#[derive(Debug)]
pub struct InferenceResult {
    pub summaries: FxHashMap<NodeId, FunctionSummary>,
    pub errors: Vec<TypeError>,
    pub warnings: Vec<TypeWarning>,
}

pub struct TypeInference<'a> {
    pub(crate) arena: &'a mut AstArena,
    pub(crate) store: &'a mut TypeStore,
    pub(crate) creator: SyntacticScopeCreator,
    pub(crate) summaries: FxHashMap<NodeId, FunctionSummary>,
    pub(crate) deferred: Vec<DeferredCheck>,
    pub(crate) errors: Vec<TypeError>,
    pub(crate) warnings: Vec<TypeWarning>,
    /// Compatibility mode: ambiguous generic instantiations join their
    /// candidates instead of degrading to unknown. Both modes report the
    /// ambiguity.
    pub(crate) join_generics: bool,

    pub(crate) nominals_by_name: FxHashMap<Symbol, NominalId>,
    pub(crate) ctor_fn_nominal: FxHashMap<NodeId, NominalId>,
    /// The fixed-point loop re-analyzes vertices; each (node, diagnostic)
    /// pair reports once.
    reported: rustc_hash::FxHashSet<(NodeId, String)>,

    // Per-scope state for the scope currently being analyzed.
    pub(crate) cur_scope: Option<ScopeId>,
    pub(crate) cur_return_declared: Option<TypeId>,
    pub(crate) cur_return_types: Vec<TypeId>,
    pub(crate) cur_outer_reads: Vec<(Symbol, TypeId)>,

    pub(crate) sym_undefined: Symbol,
    pub(crate) sym_this: Symbol,
}

impl<'a> TypeInference<'a> {
    pub fn new(arena: &'a mut AstArena, store: &'a mut TypeStore) -> Self {
        let sym_undefined = arena.intern("undefined");
        let sym_this = arena.intern("this");
        TypeInference {
            arena,
            store,
            creator: SyntacticScopeCreator::new(),
            summaries: FxHashMap::default(),
            deferred: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            join_generics: true,
            nominals_by_name: FxHashMap::default(),
            ctor_fn_nominal: FxHashMap::default(),
            reported: rustc_hash::FxHashSet::default(),
            cur_scope: None,
            cur_return_declared: None,
            cur_return_types: Vec::new(),
            cur_outer_reads: Vec::new(),
            sym_undefined,
            sym_this,
        }
    }

    pub fn strict_generics(mut self) -> Self {
        self.join_generics = false;
        self
    }

    /// Run inference over the whole tree at `root` and consume the engine.
    pub fn process(mut self, root: NodeId) -> InferenceResult {
        self.register_nominals(root);

        // Build the scope tree: the global scope plus one scope per
        // function, children before parents.
        let global = self.creator.create_scope(self.arena, root, None);
        let mut order: Vec<ScopeId> = Vec::new();
        self.collect_scopes(root, global, &mut order);
        order.push(global);

        self.resolve_declared_types(&order);

        for scope in order {
            self.analyze_scope(scope);
        }

        self.resolve_deferred_checks();

        InferenceResult {
            summaries: self.summaries,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    /// Depth-first, post-order: nested functions come before the function
    /// that encloses them.
    fn collect_scopes(&mut self, node: NodeId, parent: ScopeId, order: &mut Vec<ScopeId>) {
        let children: Vec<NodeId> = self.arena.children(node).to_vec();
        if matches!(self.arena.kind(node), NodeKind::Function) && self.arena.parent(node).is_some()
        {
            let scope = self.creator.create_scope(self.arena, node, Some(parent));
            for c in children {
                self.collect_scopes(c, scope, order);
            }
            order.push(scope);
        } else {
            for c in children {
                self.collect_scopes(c, parent, order);
            }
        }
    }

    // ------------------------------------------------------------------
    // Nominal registration (@constructor functions)
    // ------------------------------------------------------------------

    fn register_nominals(&mut self, root: NodeId) {
        // First pass: define each constructor so @extends can resolve in
        // a second pass regardless of declaration order.
        let mut ctors: Vec<(NodeId, Symbol)> = Vec::new();
        for n in self.arena.preorder(root) {
            if !matches!(self.arena.kind(n), NodeKind::Function) {
                continue;
            }
            let Some(doc) = self.arena.jsdoc(n) else { continue };
            if !doc.is_constructor {
                continue;
            }
            let name_node = self.arena.child(n, 0);
            let Some(name) = self.arena.name_sym(name_node) else {
                continue;
            };
            ctors.push((n, name));
        }

        for &(fn_node, name) in &ctors {
            let instance_props = self.scan_instance_props(fn_node);
            let id = self.store.define_nominal(NominalDef {
                name,
                superclass: None,
                is_interface: false,
                instance_props,
            });
            self.nominals_by_name.insert(name, id);
            self.ctor_fn_nominal.insert(fn_node, id);
        }

        for &(fn_node, _) in &ctors {
            let extends = self.arena.jsdoc(fn_node).and_then(|d| d.extends);
            if let Some(super_name) = extends {
                if let (Some(&sub), Some(&sup)) = (
                    self.ctor_fn_nominal.get(&fn_node),
                    self.nominals_by_name.get(&super_name),
                ) {
                    self.store.set_superclass(sub, sup);
                }
            }
        }
    }

    /// Instance properties assigned as `this.p = ...` in a constructor
    /// body. The assigned types are refined during the constructor's own
    /// analysis; registration only needs the names and declared types.
    fn scan_instance_props(&mut self, fn_node: NodeId) -> Vec<(Symbol, Property)> {
        let body = self.arena.child(fn_node, 2);
        let mut props: Vec<(Symbol, Property)> = Vec::new();
        for n in self.arena.preorder(body) {
            if let NodeKind::Assign(_) = self.arena.kind(n) {
                let target = self.arena.child(n, 0);
                if let NodeKind::GetProp(prop) = *self.arena.kind(target) {
                    let obj = self.arena.child(target, 0);
                    if matches!(self.arena.kind(obj), NodeKind::This) {
                        let declared = self.arena.jsdoc(n).and_then(|d| d.ty.clone());
                        let ty = declared
                            .map(|t| self.resolve_type_expr(&t))
                            .unwrap_or(TypeId::UNKNOWN);
                        if !props.iter().any(|(s, _)| *s == prop) {
                            props.push((prop, Property::required(ty)));
                        }
                    }
                }
            }
        }
        props.sort_by_key(|(s, _)| *s);
        props
    }

    // ------------------------------------------------------------------
    // Declared types
    // ------------------------------------------------------------------

    fn resolve_declared_types(&mut self, scopes: &[ScopeId]) {
        for &scope in scopes {
            let vars: Vec<_> = self.creator.store().own_vars(scope).to_vec();
            for var in vars {
                let decl = self.creator.store().var_decl_node(var);
                let kind = self.creator.store().var_kind(var);
                let declared = match kind {
                    VarKind::Param => self.param_declared_type(scope, decl),
                    _ => {
                        let expr = self.decl_statement_doc(decl).and_then(|doc| doc.ty.clone());
                        expr.map(|t| self.resolve_type_expr(&t))
                    }
                };
                if let Some(ty) = declared {
                    self.creator.store_mut().set_declared_type(var, ty);
                }
            }
        }
    }

    fn param_declared_type(&mut self, scope: ScopeId, decl: NodeId) -> Option<TypeId> {
        let fn_node = self.creator.store().root(scope);
        let name = self.arena.name_sym(decl)?;
        let doc = self.arena.jsdoc(fn_node)?;
        let templates = doc.templates.clone();
        let expr = doc
            .params
            .iter()
            .find(|(s, _)| *s == name)
            .map(|(_, t)| t.clone())?;
        Some(self.resolve_type_expr_in(&expr, &templates))
    }

    /// The doc comment governing a declaration: on the name node itself or
    /// on the enclosing declaration statement.
    fn decl_statement_doc(&self, decl: NodeId) -> Option<&JsDoc> {
        if let Some(doc) = self.arena.jsdoc(decl) {
            return Some(doc);
        }
        let parent = self.arena.parent(decl)?;
        self.arena.jsdoc(parent)
    }

    pub(crate) fn resolve_type_expr(&mut self, expr: &TypeExpr) -> TypeId {
        self.resolve_type_expr_in(expr, &[])
    }

    /// Resolve a declared type expression. Names that match a type
    /// parameter in `templates` become type variables; names that match a
    /// registered nominal become instance types; the rest of the alphabet
    /// is the builtin scalars.
    pub(crate) fn resolve_type_expr_in(
        &mut self,
        expr: &TypeExpr,
        templates: &[Symbol],
    ) -> TypeId {
        match expr {
            TypeExpr::Name(sym) => {
                if templates.contains(sym) {
                    return self.store.type_var(*sym);
                }
                if let Some(&nominal) = self.nominals_by_name.get(sym) {
                    return self.store.instance_of(nominal);
                }
                match self.arena.interner().resolve(*sym) {
                    "number" => TypeId::NUMBER,
                    "string" => TypeId::STRING,
                    "boolean" => TypeId::BOOLEAN,
                    "null" => TypeId::NULL,
                    "undefined" | "void" => TypeId::UNDEFINED,
                    "Object" => TypeId::TOP_OBJECT,
                    _ => TypeId::UNKNOWN,
                }
            }
            TypeExpr::Union(parts) => {
                let resolved: Vec<TypeId> = parts
                    .iter()
                    .map(|p| self.resolve_type_expr_in(p, templates))
                    .collect();
                self.store.union(resolved)
            }
            TypeExpr::Nullable(inner) => {
                let t = self.resolve_type_expr_in(inner, templates);
                self.store.union([t, TypeId::NULL])
            }
            TypeExpr::NonNullable(inner) => {
                let t = self.resolve_type_expr_in(inner, templates);
                self.store.remove_type(t, TypeId::NULL)
            }
            TypeExpr::Function { params, ret } => {
                let required: Vec<TypeId> = params
                    .iter()
                    .map(|p| self.resolve_type_expr_in(p, templates))
                    .collect();
                let ret = self.resolve_type_expr_in(ret, templates);
                self.store.function(FunctionType::simple(required, ret))
            }
            TypeExpr::Record(fields) => {
                let props: Vec<(Symbol, Property)> = {
                    let mut resolved: Vec<(Symbol, Property)> = fields
                        .iter()
                        .map(|(s, t)| {
                            let ty = self.resolve_type_expr_in(t, templates);
                            (*s, Property::required(ty))
                        })
                        .collect();
                    resolved.sort_by_key(|(s, _)| *s);
                    resolved
                };
                self.store.object(ObjectType {
                    nominal: None,
                    props,
                    loose: false,
                })
            }
            TypeExpr::All => TypeId::TOP,
            TypeExpr::Unknown => TypeId::UNKNOWN,
            TypeExpr::Void => TypeId::UNDEFINED,
        }
    }

    // ------------------------------------------------------------------
    // Per-scope analysis
    // ------------------------------------------------------------------

    fn analyze_scope(&mut self, scope: ScopeId) {
        let root = self.creator.store().root(scope);
        tracing::debug!(root = %root, "inferring scope");

        self.cur_scope = Some(scope);
        self.cur_return_types.clear();
        self.cur_outer_reads.clear();
        self.cur_return_declared = if matches!(self.arena.kind(root), NodeKind::Function) {
            let doc = self.arena.jsdoc(root);
            let templates = doc.map(|d| d.templates.clone()).unwrap_or_default();
            let ret_expr = doc.and_then(|d| d.return_ty.clone());
            ret_expr.map(|t| self.resolve_type_expr_in(&t, &templates))
        } else {
            None
        };

        let cfg = ControlFlowAnalysis::compute(self.arena, root);

        // Backward pass: lower bounds for undeclared formals.
        let bwd = if self.scope_has_undeclared_formals(scope) {
            self.backward_constraints(&cfg, scope)
        } else {
            FxHashMap::default()
        };

        let entry_env = self.entry_env(scope, &bwd);
        let edge_envs = self.forward_pass(&cfg, scope, entry_env);

        self.summarize(scope, root, &cfg, &edge_envs, &bwd);
        self.cur_scope = None;
    }

    fn scope_has_undeclared_formals(&self, scope: ScopeId) -> bool {
        let store = self.creator.store();
        store.own_vars(scope).iter().any(|&v| {
            store.var_kind(v) == VarKind::Param && store.declared_type(v).is_none()
        })
    }

    fn entry_env(&mut self, scope: ScopeId, bwd: &FxHashMap<Symbol, TypeId>) -> TypeEnv {
        let mut env = TypeEnv::new();
        let vars: Vec<_> = self.creator.store().own_vars(scope).to_vec();
        for var in vars {
            let store = self.creator.store();
            let name = store.var_name(var);
            let kind = store.var_kind(var);
            let declared = store.declared_type(var);
            match kind {
                VarKind::Param => {
                    let ty = declared
                        .or_else(|| bwd.get(&name).copied())
                        .unwrap_or(TypeId::UNKNOWN);
                    env.set(name, ty);
                }
                VarKind::Function => {
                    let decl = store.var_decl_node(var);
                    if let Some(fn_node) = self.arena.parent(decl) {
                        if let Some(summary) = self.summaries.get(&fn_node) {
                            env.set(name, summary.fn_type);
                        }
                    }
                }
                _ => {
                    if let Some(ty) = declared {
                        env.set(name, ty);
                    }
                }
            }
        }

        // The receiver: declared via @this, the instance type for
        // constructors, unknown otherwise.
        let root = self.creator.store().root(scope);
        if matches!(self.arena.kind(root), NodeKind::Function) {
            let this_ty = if let Some(&nominal) = self.ctor_fn_nominal.get(&root) {
                self.store.instance_of(nominal)
            } else if let Some(expr) = self.arena.jsdoc(root).and_then(|d| d.this_ty.clone()) {
                self.resolve_type_expr(&expr)
            } else {
                TypeId::UNKNOWN
            };
            env.set(self.sym_this, this_ty);
        }
        env
    }

    // ------------------------------------------------------------------
    // Forward pass
    // ------------------------------------------------------------------

    fn forward_pass(
        &mut self,
        cfg: &ControlFlowGraph,
        scope: ScopeId,
        entry_env: TypeEnv,
    ) -> FxHashMap<(u32, u32), TypeEnv> {
        let mut edge_envs: FxHashMap<(u32, u32), TypeEnv> = FxHashMap::default();
        let mut queue: std::collections::VecDeque<CfgVertexId> = cfg.vertices().collect();
        let mut queued = vec![true; cfg.vertex_count()];

        let max_steps = cfg.vertex_count().max(1) * 64;
        let mut steps = 0usize;

        while let Some(v) = queue.pop_front() {
            queued[v.0 as usize] = false;
            steps += 1;
            if steps > max_steps {
                // The truncated environments are still used below, so the
                // caller must hear about it: the same contract the generic
                // solver keeps by returning a divergence error.
                tracing::warn!(steps, "type inference did not stabilize; stopping at the iteration cap");
                if let Some(root) = cfg.node(cfg.entry()) {
                    self.error_at(root, SemanticError::AnalysisDidNotConverge { steps });
                }
                break;
            }

            let in_env = self.in_env(cfg, v, &entry_env, &edge_envs, scope);
            let out = self.flow_vertex(cfg, v, in_env);

            let mut changed = false;
            for (succ, env) in out {
                let key = (v.0, succ.0);
                if edge_envs.get(&key) != Some(&env) {
                    edge_envs.insert(key, env);
                    changed = true;
                    if !queued[succ.0 as usize] {
                        queued[succ.0 as usize] = true;
                        queue.push_back(succ);
                    }
                }
            }
            let _ = changed;
        }
        edge_envs
    }

    fn in_env(
        &mut self,
        cfg: &ControlFlowGraph,
        v: CfgVertexId,
        entry_env: &TypeEnv,
        edge_envs: &FxHashMap<(u32, u32), TypeEnv>,
        scope: ScopeId,
    ) -> TypeEnv {
        if v == cfg.entry() {
            return entry_env.clone();
        }
        let mut acc: Option<TypeEnv> = None;
        for &(p, _branch) in cfg.preds(v) {
            if let Some(env) = edge_envs.get(&(p.0, v.0)) {
                acc = Some(match acc {
                    None => env.clone(),
                    Some(a) => {
                        let store = &mut *self.store;
                        let scope_store = self.creator.store();
                        a.join(env, store, |name| {
                            default_type(scope_store, scope, name)
                        })
                    }
                });
            }
        }
        acc.unwrap_or_else(|| entry_env.clone())
    }

    /// Analyze the statement at `v` and produce the environment for each
    /// outgoing edge.
    fn flow_vertex(
        &mut self,
        cfg: &ControlFlowGraph,
        v: CfgVertexId,
        in_env: TypeEnv,
    ) -> Vec<(CfgVertexId, TypeEnv)> {
        let Some(node) = cfg.node(v) else {
            return Vec::new(); // implicit return
        };
        let succs: Vec<(CfgVertexId, Branch)> = cfg.succs(v).to_vec();

        // Branching vertices evaluate a condition and publish specialized
        // environments on their true/false edges.
        let cond = match self.arena.kind(node) {
            NodeKind::If | NodeKind::While => Some(self.arena.child(node, 0)),
            NodeKind::DoWhile => Some(self.arena.child(node, 1)),
            NodeKind::For => {
                let c = self.arena.child(node, 1);
                (!matches!(self.arena.kind(c), NodeKind::Empty)).then_some(c)
            }
            _ => None,
        };

        if let Some(cond) = cond {
            let (out_env, true_env, false_env) = self.analyze_condition(cond, in_env.clone());
            return succs
                .into_iter()
                .map(|(s, branch)| {
                    let env = match branch {
                        Branch::OnTrue => true_env.clone(),
                        Branch::OnFalse => false_env.clone(),
                        Branch::OnEx => in_env.clone(),
                        Branch::Uncond => out_env.clone(),
                    };
                    (s, env)
                })
                .collect();
        }

        let out_env = self.flow_statement(node, in_env.clone());
        succs
            .into_iter()
            .map(|(s, branch)| {
                let env = match branch {
                    Branch::OnEx => in_env.clone(),
                    // For-in/of iteration: the loop may be empty, so the
                    // false edge keeps the unrefined environment too.
                    _ => out_env.clone(),
                };
                (s, env)
            })
            .collect()
    }

    /// Transfer for a non-branching statement vertex.
    fn flow_statement(&mut self, node: NodeId, env: TypeEnv) -> TypeEnv {
        match self.arena.kind(node).clone() {
            NodeKind::Var | NodeKind::Let | NodeKind::Const => {
                // Either a declaration statement or a for-in binding.
                if let Some(parent) = self.arena.parent(node) {
                    if matches!(self.arena.kind(parent), NodeKind::ForIn | NodeKind::ForOf)
                        && self.arena.child(parent, 0) == node
                    {
                        return self.flow_loop_binding(node, env, parent);
                    }
                }
                self.flow_declaration(node, env)
            }
            NodeKind::Name(sym) => {
                // A bare-name vertex is a for-in/of binding target.
                if let Some(parent) = self.arena.parent(node) {
                    if matches!(self.arena.kind(parent), NodeKind::ForIn | NodeKind::ForOf) {
                        let elem = self.loop_element_type(parent);
                        return env.with(sym, elem);
                    }
                }
                let (env, _ty) = self.analyze_expr_fwd(node, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                env
            }
            NodeKind::ExprResult | NodeKind::Throw => {
                let expr = self.arena.child(node, 0);
                let (env, _ty) = self.analyze_expr_fwd(expr, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                env
            }
            NodeKind::Return => {
                let required = self.cur_return_declared.unwrap_or(TypeId::UNKNOWN);
                match self.arena.children(node).first().copied() {
                    Some(expr) => {
                        let (env, ty) =
                            self.analyze_expr_fwd(expr, env, required, TypeId::UNKNOWN);
                        if let Some(declared) = self.cur_return_declared {
                            if !self.store.is_subtype(ty, declared) {
                                self.error_at(
                                    node,
                                    SemanticError::ReturnNondeclaredType {
                                        declared: self.display(declared),
                                        found: self.display(ty),
                                    },
                                );
                            }
                        }
                        self.cur_return_types.push(ty);
                        env
                    }
                    None => {
                        self.cur_return_types.push(TypeId::UNDEFINED);
                        env
                    }
                }
            }
            NodeKind::ForIn | NodeKind::ForOf => {
                // The iterable vertex: evaluate the object once.
                let obj = self.arena.child(node, 1);
                let (env, _ty) = self.analyze_expr_fwd(obj, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                env
            }
            NodeKind::Switch | NodeKind::Case => {
                let test = self.arena.child(node, 0);
                let (env, _ty) = self.analyze_expr_fwd(test, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                env
            }
            NodeKind::Catch => {
                let param = self.arena.child(node, 0);
                match self.arena.name_sym(param) {
                    Some(sym) => env.with(sym, TypeId::UNKNOWN),
                    None => env,
                }
            }
            NodeKind::Break { .. }
            | NodeKind::Continue { .. }
            | NodeKind::Empty
            | NodeKind::DefaultCase
            // A block vertex is the exceptional merge in front of a
            // finally clause; it evaluates nothing itself.
            | NodeKind::Block
            | NodeKind::Function
            | NodeKind::Script
            | NodeKind::Root => env,
            _ => {
                // Expression vertices (for-increment and similar).
                let (env, _ty) = self.analyze_expr_fwd(node, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                env
            }
        }
    }

    fn flow_loop_binding(&mut self, decl: NodeId, env: TypeEnv, loop_node: NodeId) -> TypeEnv {
        let elem = self.loop_element_type(loop_node);
        let mut env = env;
        for &binding in &self.arena.children(decl).to_vec() {
            if let Some(sym) = self.arena.name_sym(binding) {
                env.set(sym, elem);
            }
        }
        env
    }

    fn loop_element_type(&self, loop_node: NodeId) -> TypeId {
        match self.arena.kind(loop_node) {
            // for-in iterates property names
            NodeKind::ForIn => TypeId::STRING,
            _ => TypeId::UNKNOWN,
        }
    }

    fn flow_declaration(&mut self, decl: NodeId, mut env: TypeEnv) -> TypeEnv {
        for binding in self.arena.children(decl).to_vec() {
            match self.arena.kind(binding).clone() {
                NodeKind::Name(sym) => {
                    let declared = self.declared_type_of(sym);
                    match self.arena.first_child(binding) {
                        Some(init) => {
                            let required = declared.unwrap_or(TypeId::UNKNOWN);
                            let (new_env, ty) =
                                self.analyze_expr_fwd(init, env, required, TypeId::UNKNOWN);
                            env = new_env;
                            if let Some(declared) = declared {
                                if !self.store.is_subtype(ty, declared) {
                                    self.error_at(
                                        binding,
                                        SemanticError::MistypedAssignRhs {
                                            expected: self.display(declared),
                                            found: self.display(ty),
                                        },
                                    );
                                }
                            }
                            env.set(sym, ty);
                            self.arena.set_inferred_type(binding, ty);
                        }
                        None => {
                            env.set(sym, TypeId::UNDEFINED);
                        }
                    }
                }
                NodeKind::DestructuringLhs => {
                    let pattern = self.arena.child(binding, 0);
                    let rhs = self.arena.child(binding, 1);
                    let (new_env, obj_ty) =
                        self.analyze_expr_fwd(rhs, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                    env = new_env;
                    for sk in self.arena.children(pattern).to_vec() {
                        let NodeKind::StringKey(key) = *self.arena.kind(sk) else {
                            continue;
                        };
                        let Some(target) = self.arena.first_child(sk) else {
                            continue;
                        };
                        let Some(sym) = self.arena.name_sym(target) else {
                            continue;
                        };
                        let ty = match self.store.get_prop(obj_ty, key) {
                            crate::types::PropLookup::Found(t)
                            | crate::types::PropLookup::Maybe(t) => t,
                            _ => TypeId::UNKNOWN,
                        };
                        env.set(sym, ty);
                    }
                }
                _ => {}
            }
        }
        env
    }

    // ------------------------------------------------------------------
    // Summaries
    // ------------------------------------------------------------------

    fn summarize(
        &mut self,
        scope: ScopeId,
        root: NodeId,
        cfg: &ControlFlowGraph,
        edge_envs: &FxHashMap<(u32, u32), TypeEnv>,
        bwd: &FxHashMap<Symbol, TypeId>,
    ) {
        if !matches!(self.arena.kind(root), NodeKind::Function) {
            return;
        }

        // Can the function complete normally? The implicit return has a
        // non-return predecessor with a recorded environment.
        let implicit = cfg.implicit_return();
        let completes_normally = cfg.preds(implicit).iter().any(|&(p, _)| {
            let is_return = cfg
                .node(p)
                .is_some_and(|n| matches!(self.arena.kind(n), NodeKind::Return));
            !is_return && edge_envs.contains_key(&(p.0, implicit.0))
        }) || cfg.preds(implicit).iter().all(|&(p, _)| {
            // a body with no statements at all
            cfg.node(p).is_some_and(|n| n == root)
        });

        let ret = match self.cur_return_declared {
            Some(declared) => {
                if completes_normally && !self.store.is_subtype(TypeId::UNDEFINED, declared) {
                    self.error_at(
                        root,
                        SemanticError::MissingReturnStatement {
                            declared: self.display(declared),
                        },
                    );
                }
                declared
            }
            None => {
                let mut ret = TypeId::BOTTOM;
                for ty in self.cur_return_types.clone() {
                    ret = self.store.join(ret, ty);
                }
                if completes_normally || self.cur_return_types.is_empty() {
                    ret = self.store.join(ret, TypeId::UNDEFINED);
                }
                ret
            }
        };

        // Formals in declaration order. Undeclared, unconstrained formals
        // become trailing optional unknowns.
        let mut required = TypeIdVec::new();
        let mut optional = TypeIdVec::new();
        let store = self.creator.store();
        let params: Vec<(Symbol, Option<TypeId>)> = store
            .own_vars(scope)
            .iter()
            .filter(|&&v| store.var_kind(v) == VarKind::Param)
            .map(|&v| (store.var_name(v), store.declared_type(v)))
            .collect();
        for (name, declared) in params {
            match declared.or_else(|| bwd.get(&name).copied()) {
                Some(ty) => {
                    // a declared formal after an optional one stays
                    // positional; keep shapes simple
                    required.push(ty);
                }
                None => optional.push(TypeId::UNKNOWN),
            }
        }

        let doc = self.arena.jsdoc(root);
        let type_params: Vec<Symbol> = doc.map(|d| d.templates.clone()).unwrap_or_default();
        let is_abstract = doc.is_some_and(|d| d.is_abstract);
        let ctor_of = self.ctor_fn_nominal.get(&root).copied();
        let receiver = ctor_of.map(|n| self.store.instance_of(n));

        let fn_type = self.store.function(FunctionType {
            required,
            optional,
            rest: None,
            ret,
            receiver,
            is_abstract,
            ctor_of,
            type_params,
        });

        self.arena.set_inferred_type(root, fn_type);
        let mut outer = std::mem::take(&mut self.cur_outer_reads);
        outer.sort_by_key(|(s, t)| (*s, t.index()));
        outer.dedup();
        self.summaries.insert(
            root,
            FunctionSummary {
                fn_type,
                outer_requirements: outer,
            },
        );
    }

    // ------------------------------------------------------------------
    // Deferred checks
    // ------------------------------------------------------------------

    fn resolve_deferred_checks(&mut self) {
        // A call site re-analyzed during the fixed point re-records its
        // check; only the final record per site counts.
        let mut by_site: FxHashMap<NodeId, DeferredCheck> = FxHashMap::default();
        for check in std::mem::take(&mut self.deferred) {
            by_site.insert(check.call_site, check);
        }
        let mut checks: Vec<DeferredCheck> = by_site.into_values().collect();
        checks.sort_by_key(|c| c.call_site.0);
        tracing::debug!(count = checks.len(), "resolving deferred checks");
        for check in checks {
            let Some(summary) = self.summaries.get(&check.callee) else {
                continue;
            };
            let Some(f) = self.store.as_function(summary.fn_type).cloned() else {
                continue;
            };
            self.check_call_shape(check.call_site, &f, &check.arg_types);
            if !check.expected_ret.is_unknown()
                && !self.store.is_subtype(f.ret, check.expected_ret)
            {
                self.error_at(
                    check.call_site,
                    SemanticError::ReturnNondeclaredType {
                        declared: self.display(check.expected_ret),
                        found: self.display(f.ret),
                    },
                );
            }
        }
    }

    /// Arity and argument compatibility for one call.
    pub(crate) fn check_call_shape(
        &mut self,
        call_site: NodeId,
        f: &FunctionType,
        args: &[TypeId],
    ) {
        let min = f.min_arity();
        let max = f.max_arity();
        if args.len() < min || max.is_some_and(|m| args.len() > m) {
            self.error_at(
                call_site,
                SemanticError::WrongArgumentCount {
                    min,
                    max: max.unwrap_or(usize::MAX),
                    found: args.len(),
                },
            );
            return;
        }
        for (i, &arg) in args.iter().enumerate() {
            if let Some(formal) = f.formal(i) {
                if !self.store.is_subtype(arg, formal) {
                    self.error_at(
                        call_site,
                        SemanticError::InvalidArgumentType {
                            argument: i + 1,
                            expected: self.display(formal),
                            found: self.display(arg),
                        },
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    pub(crate) fn display(&self, ty: TypeId) -> String {
        self.store.display(ty, self.arena.interner())
    }

    pub(crate) fn error_at(&mut self, node: NodeId, error: SemanticError) {
        if self.reported.insert((node, format!("{error:?}"))) {
            self.errors.push(TypeError::new(error, self.arena.pos(node)));
        }
    }

    pub(crate) fn warn_at(&mut self, node: NodeId, warning: SemanticWarning) {
        if self.reported.insert((node, format!("{warning:?}"))) {
            self.warnings
                .push(TypeWarning::new(warning, self.arena.pos(node)));
        }
    }

    /// The declared type of `name` looked up through the scope chain.
    pub(crate) fn declared_type_of(&self, name: Symbol) -> Option<TypeId> {
        let scope = self.cur_scope?;
        let store = self.creator.store();
        let var = store.lookup(scope, name)?;
        store.declared_type(var)
    }

    /// Resolve a name the environment has no entry for: declared type,
    /// a sibling function's summary, or unknown.
    pub(crate) fn fallback_type_of(&mut self, name: Symbol) -> TypeId {
        if name == self.sym_undefined {
            return TypeId::UNDEFINED;
        }
        let Some(scope) = self.cur_scope else {
            return TypeId::UNKNOWN;
        };
        let store = self.creator.store();
        let Some(var) = store.lookup(scope, name) else {
            return TypeId::UNKNOWN;
        };
        if let Some(ty) = store.declared_type(var) {
            return ty;
        }
        if store.var_kind(var) == VarKind::Function {
            let decl = store.var_decl_node(var);
            if let Some(fn_node) = self.arena.parent(decl) {
                if let Some(summary) = self.summaries.get(&fn_node) {
                    return summary.fn_type;
                }
            }
        }
        TypeId::UNKNOWN
    }

    /// The function node a name refers to, when it names a function
    /// declared in an enclosing scope.
    pub(crate) fn function_decl_of(&self, name: Symbol) -> Option<NodeId> {
        let scope = self.cur_scope?;
        let store = self.creator.store();
        let var = store.lookup(scope, name)?;
        if store.var_kind(var) != VarKind::Function {
            return None;
        }
        let decl = store.var_decl_node(var);
        let fn_node = self.arena.parent(decl)?;
        matches!(self.arena.kind(fn_node), NodeKind::Function).then_some(fn_node)
    }
}

/// Default type for a name missing from one side of an environment join:
/// its declared type if any, unknown otherwise.
fn default_type(store: &ScopeStore, scope: ScopeId, name: Symbol) -> TypeId {
    store
        .lookup(scope, name)
        .and_then(|v| store.declared_type(v))
        .unwrap_or(TypeId::UNKNOWN)
}
