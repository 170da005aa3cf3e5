//! Forward type propagation through expressions.
//!
//! Each rule takes the expression, the incoming environment, the type the
//! context requires, and the type the context specializes toward, and
//! returns the outgoing environment plus the expression's type. The
//! inferred type is recorded on the node as it is computed.

use rustc_hash::FxHashMap;

use stoat_ast::{BinaryOp, NodeId, NodeKind, UnaryOp};
use stoat_identity::TypeId;

use crate::env::TypeEnv;
use crate::errors::{SemanticError, SemanticWarning};
use crate::types::{FunctionType, ObjectType, PropLookup, Property, TypeData};

use super::{DeferredCheck, TypeInference};

impl TypeInference<'_> {
    pub(crate) fn analyze_expr_fwd(
        &mut self,
        n: NodeId,
        env: TypeEnv,
        required: TypeId,
        specialized: TypeId,
    ) -> (TypeEnv, TypeId) {
        let (env, ty) = self.analyze_expr_inner(n, env, required, specialized);
        self.arena.set_inferred_type(n, ty);
        (env, ty)
    }

    fn analyze_expr_inner(
        &mut self,
        n: NodeId,
        env: TypeEnv,
        required: TypeId,
        specialized: TypeId,
    ) -> (TypeEnv, TypeId) {
        match *self.arena.kind(n) {
            NodeKind::Number(_) => (env, TypeId::NUMBER),
            NodeKind::Str(_) => (env, TypeId::STRING),
            NodeKind::Bool(b) => (env, if b { TypeId::TRUE } else { TypeId::FALSE }),
            NodeKind::Null => (env, TypeId::NULL),
            NodeKind::This => {
                let ty = env.get(self.sym_this).unwrap_or(TypeId::UNKNOWN);
                (env, ty)
            }

            NodeKind::Name(sym) => {
                let base = env
                    .get(sym)
                    .unwrap_or_else(|| self.fallback_type_of(sym));
                let ty = if !specialized.is_unknown() {
                    self.store.specialize(base, specialized)
                } else {
                    base
                };
                // Reads of free outer variables under a concrete
                // requirement become summary preconditions.
                if !required.is_unknown() && self.is_free_outer(sym) {
                    self.cur_outer_reads.push((sym, required));
                }
                (env, ty)
            }

            NodeKind::Assign(op) => self.analyze_assign(n, op.is_compound(), env),

            NodeKind::Binary(op) => self.analyze_binary(n, op, env),

            NodeKind::Unary(op) => {
                let operand = self.arena.child(n, 0);
                match op {
                    UnaryOp::Not => {
                        let (_, out_env, _t, _f) = self.analyze_condition_full(n, env);
                        (out_env, TypeId::BOOLEAN)
                    }
                    UnaryOp::TypeOf => {
                        let (env, _) =
                            self.analyze_expr_fwd(operand, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                        (env, TypeId::STRING)
                    }
                    UnaryOp::Void => {
                        let (env, _) =
                            self.analyze_expr_fwd(operand, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                        (env, TypeId::UNDEFINED)
                    }
                    UnaryOp::Delete => {
                        let (env, _) =
                            self.analyze_expr_fwd(operand, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                        (env, TypeId::BOOLEAN)
                    }
                    UnaryOp::Neg | UnaryOp::Pos | UnaryOp::BitNot => {
                        let (env, ty) =
                            self.analyze_expr_fwd(operand, env, TypeId::NUMBER, TypeId::UNKNOWN);
                        if !self.store.is_subtype(ty, TypeId::NUMBER) {
                            self.error_at(
                                operand,
                                SemanticError::InvalidOperandType {
                                    expected: "number".into(),
                                    found: self.display(ty),
                                },
                            );
                        }
                        (env, TypeId::NUMBER)
                    }
                }
            }

            NodeKind::Update { .. } => {
                let operand = self.arena.child(n, 0);
                let (mut env, ty) =
                    self.analyze_expr_fwd(operand, env, TypeId::NUMBER, TypeId::UNKNOWN);
                if !self.store.is_subtype(ty, TypeId::NUMBER) {
                    self.error_at(
                        operand,
                        SemanticError::InvalidOperandType {
                            expected: "number".into(),
                            found: self.display(ty),
                        },
                    );
                }
                if let Some(sym) = self.arena.name_sym(operand) {
                    env.set(sym, TypeId::NUMBER);
                }
                (env, TypeId::NUMBER)
            }

            NodeKind::And => {
                let lhs = self.arena.child(n, 0);
                let rhs = self.arena.child(n, 1);
                let (lhs_ty, _out, true_env, false_env) = self.analyze_condition_full(lhs, env);
                let (rhs_env, rhs_ty) =
                    self.analyze_expr_fwd(rhs, true_env, required, specialized);
                let falsy_lhs = self.store.falsy_part(lhs_ty);
                let result = self.store.join(falsy_lhs, rhs_ty);
                let out = self.join_envs(&false_env, &rhs_env);
                (out, result)
            }

            NodeKind::Or => {
                let lhs = self.arena.child(n, 0);
                let rhs = self.arena.child(n, 1);
                let (lhs_ty, _out, true_env, false_env) = self.analyze_condition_full(lhs, env);
                let (rhs_env, rhs_ty) =
                    self.analyze_expr_fwd(rhs, false_env, required, specialized);
                let truthy_lhs = self.store.truthy_part(lhs_ty);
                let result = self.store.join(truthy_lhs, rhs_ty);
                let out = self.join_envs(&true_env, &rhs_env);
                (out, result)
            }

            NodeKind::Hook => {
                let cond = self.arena.child(n, 0);
                let then = self.arena.child(n, 1);
                let other = self.arena.child(n, 2);
                let (_ty, _out, true_env, false_env) = self.analyze_condition_full(cond, env);
                let (then_env, then_ty) =
                    self.analyze_expr_fwd(then, true_env, required, specialized);
                let (else_env, else_ty) =
                    self.analyze_expr_fwd(other, false_env, required, specialized);
                let result = self.store.join(then_ty, else_ty);
                (self.join_envs(&then_env, &else_env), result)
            }

            NodeKind::Comma => {
                let lhs = self.arena.child(n, 0);
                let rhs = self.arena.child(n, 1);
                let (env, _) = self.analyze_expr_fwd(lhs, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                self.analyze_expr_fwd(rhs, env, required, specialized)
            }

            NodeKind::Call => self.analyze_call(n, env, required, false),
            NodeKind::New => self.analyze_call(n, env, required, true),

            NodeKind::GetProp(prop) => {
                let obj = self.arena.child(n, 0);
                let (env, obj_ty) =
                    self.analyze_expr_fwd(obj, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                let ty = self.analyze_prop_access(n, obj_ty, prop);
                (env, ty)
            }

            NodeKind::GetElem => {
                let obj = self.arena.child(n, 0);
                let key = self.arena.child(n, 1);
                let (env, obj_ty) =
                    self.analyze_expr_fwd(obj, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                if self.store.contains_nullish(obj_ty) {
                    self.error_at(
                        n,
                        SemanticError::NullableDereference {
                            nullish: self.display(obj_ty),
                        },
                    );
                }
                let (env, _) = self.analyze_expr_fwd(key, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                (env, TypeId::UNKNOWN)
            }

            NodeKind::ObjectLit => {
                let mut env = env;
                let mut props: Vec<(stoat_ast::Symbol, Property)> = Vec::new();
                for sk in self.arena.children(n).to_vec() {
                    let NodeKind::StringKey(key) = *self.arena.kind(sk) else {
                        continue;
                    };
                    if let Some(value) = self.arena.first_child(sk) {
                        let (new_env, ty) =
                            self.analyze_expr_fwd(value, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                        env = new_env;
                        props.push((key, Property::required(ty)));
                    }
                }
                props.sort_by_key(|(s, _)| *s);
                let ty = self.store.object(ObjectType {
                    nominal: None,
                    props,
                    loose: false,
                });
                (env, ty)
            }

            NodeKind::ArrayLit => {
                let mut env = env;
                for e in self.arena.children(n).to_vec() {
                    let (new_env, _) =
                        self.analyze_expr_fwd(e, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                    env = new_env;
                }
                (env, TypeId::TOP_OBJECT)
            }

            NodeKind::Function => {
                let ty = self
                    .summaries
                    .get(&n)
                    .map(|s| s.fn_type)
                    .unwrap_or(TypeId::UNKNOWN);
                (env, ty)
            }

            NodeKind::Cast => {
                let inner = self.arena.child(n, 0);
                let declared_expr = self.arena.jsdoc(n).and_then(|d| d.ty.clone());
                let declared = declared_expr
                    .map(|t| self.resolve_type_expr(&t))
                    .unwrap_or(TypeId::UNKNOWN);
                let (env, inner_ty) =
                    self.analyze_expr_fwd(inner, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                if !declared.is_unknown()
                    && !inner_ty.is_unknown()
                    && self.store.meet(inner_ty, declared).is_bottom()
                {
                    self.error_at(
                        n,
                        SemanticError::InvalidCast {
                            from: self.display(inner_ty),
                            to: self.display(declared),
                        },
                    );
                }
                (env, declared)
            }

            // Remaining kinds are statements; reaching here means an
            // expression position holds something inert.
            _ => (env, TypeId::UNKNOWN),
        }
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn analyze_assign(&mut self, n: NodeId, compound: bool, env: TypeEnv) -> (TypeEnv, TypeId) {
        let target = self.arena.child(n, 0);
        let value = self.arena.child(n, 1);

        if compound {
            // Read-modify-write: both sides must be numeric.
            let (env, target_ty) =
                self.analyze_expr_fwd(target, env, TypeId::NUMBER, TypeId::UNKNOWN);
            let (mut env, value_ty) =
                self.analyze_expr_fwd(value, env, TypeId::NUMBER, TypeId::UNKNOWN);
            for (node, ty) in [(target, target_ty), (value, value_ty)] {
                if !self.store.is_subtype(ty, TypeId::NUMBER) {
                    self.error_at(
                        node,
                        SemanticError::InvalidOperandType {
                            expected: "number".into(),
                            found: self.display(ty),
                        },
                    );
                }
            }
            if let Some(sym) = self.arena.name_sym(target) {
                env.set(sym, TypeId::NUMBER);
            }
            return (env, TypeId::NUMBER);
        }

        match *self.arena.kind(target) {
            NodeKind::Name(sym) => {
                let declared = self.declared_type_of(sym);
                let required = declared.unwrap_or(TypeId::UNKNOWN);
                let (mut env, rhs_ty) =
                    self.analyze_expr_fwd(value, env, required, TypeId::UNKNOWN);
                let stored = match declared {
                    Some(declared) if !self.store.is_subtype(rhs_ty, declared) => {
                        self.error_at(
                            n,
                            SemanticError::MistypedAssignRhs {
                                expected: self.display(declared),
                                found: self.display(rhs_ty),
                            },
                        );
                        declared
                    }
                    _ => rhs_ty,
                };
                env.set(sym, stored);
                self.arena.set_inferred_type(target, stored);
                (env, rhs_ty)
            }
            NodeKind::GetProp(prop) => {
                let obj = self.arena.child(target, 0);
                let (env, obj_ty) =
                    self.analyze_expr_fwd(obj, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                let (mut env, rhs_ty) =
                    self.analyze_expr_fwd(value, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                // Writes through `this` refine the receiver's object type.
                if matches!(self.arena.kind(obj), NodeKind::This) {
                    let updated = self.store.with_property(obj_ty, prop, rhs_ty);
                    env.set(self.sym_this, updated);
                }
                (env, rhs_ty)
            }
            _ => {
                let (env, _) =
                    self.analyze_expr_fwd(target, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                let (env, rhs_ty) =
                    self.analyze_expr_fwd(value, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                (env, rhs_ty)
            }
        }
    }

    // ------------------------------------------------------------------
    // Binary operators
    // ------------------------------------------------------------------

    fn analyze_binary(&mut self, n: NodeId, op: BinaryOp, env: TypeEnv) -> (TypeEnv, TypeId) {
        let lhs = self.arena.child(n, 0);
        let rhs = self.arena.child(n, 1);

        if op.is_equality() {
            let (env, _) = self.analyze_expr_fwd(lhs, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
            let (env, _) = self.analyze_expr_fwd(rhs, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
            return (env, TypeId::BOOLEAN);
        }

        match op {
            BinaryOp::Add => {
                let (env, lt) =
                    self.analyze_expr_fwd(lhs, env, TypeId::NUMBER_OR_STRING, TypeId::UNKNOWN);
                let (env, rt) =
                    self.analyze_expr_fwd(rhs, env, TypeId::NUMBER_OR_STRING, TypeId::UNKNOWN);
                for (node, ty) in [(lhs, lt), (rhs, rt)] {
                    if !self.store.is_subtype(ty, TypeId::NUMBER_OR_STRING) {
                        self.error_at(
                            node,
                            SemanticError::InvalidOperandType {
                                expected: "number|string".into(),
                                found: self.display(ty),
                            },
                        );
                    }
                }
                let result = if self.store.is_subtype(lt, TypeId::NUMBER)
                    && self.store.is_subtype(rt, TypeId::NUMBER)
                    && !lt.is_unknown()
                    && !rt.is_unknown()
                {
                    TypeId::NUMBER
                } else if self.store.is_subtype(lt, TypeId::STRING)
                    || self.store.is_subtype(rt, TypeId::STRING)
                {
                    TypeId::STRING
                } else {
                    TypeId::NUMBER_OR_STRING
                };
                (env, result)
            }
            BinaryOp::InstanceOf => {
                let (env, _) = self.analyze_expr_fwd(lhs, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                let (env, ctor_ty) =
                    self.analyze_expr_fwd(rhs, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                if !ctor_ty.is_unknown() && self.store.as_function(ctor_ty).is_none() {
                    self.error_at(
                        rhs,
                        SemanticError::NotAConstructor {
                            found: self.display(ctor_ty),
                        },
                    );
                }
                (env, TypeId::BOOLEAN)
            }
            BinaryOp::In => {
                let (env, _) =
                    self.analyze_expr_fwd(lhs, env, TypeId::NUMBER_OR_STRING, TypeId::UNKNOWN);
                let (env, _) = self.analyze_expr_fwd(rhs, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                (env, TypeId::BOOLEAN)
            }
            _ if op.is_relational() => {
                let (env, _) =
                    self.analyze_expr_fwd(lhs, env, TypeId::NUMBER_OR_STRING, TypeId::UNKNOWN);
                let (env, _) =
                    self.analyze_expr_fwd(rhs, env, TypeId::NUMBER_OR_STRING, TypeId::UNKNOWN);
                (env, TypeId::BOOLEAN)
            }
            _ => {
                // Arithmetic and bitwise operators.
                let (env, lt) = self.analyze_expr_fwd(lhs, env, TypeId::NUMBER, TypeId::UNKNOWN);
                let (env, rt) = self.analyze_expr_fwd(rhs, env, TypeId::NUMBER, TypeId::UNKNOWN);
                for (node, ty) in [(lhs, lt), (rhs, rt)] {
                    if !self.store.is_subtype(ty, TypeId::NUMBER) {
                        self.error_at(
                            node,
                            SemanticError::InvalidOperandType {
                                expected: "number".into(),
                                found: self.display(ty),
                            },
                        );
                    }
                }
                (env, TypeId::NUMBER)
            }
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn analyze_call(
        &mut self,
        n: NodeId,
        env: TypeEnv,
        required: TypeId,
        is_new: bool,
    ) -> (TypeEnv, TypeId) {
        let children = self.arena.children(n).to_vec();
        let callee = children[0];
        let (mut env, callee_ty) =
            self.analyze_expr_fwd(callee, env, TypeId::UNKNOWN, TypeId::UNKNOWN);

        let mut arg_types = Vec::with_capacity(children.len() - 1);
        for &arg in &children[1..] {
            let (new_env, ty) = self.analyze_expr_fwd(arg, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
            env = new_env;
            arg_types.push(ty);
        }

        // A call to a local function whose body has not been summarized
        // yet (a forward reference between siblings) defers its checks.
        if callee_ty.is_unknown() {
            if let Some(sym) = self.arena.name_sym(callee) {
                if let Some(fn_node) = self.function_decl_of(sym) {
                    if !self.summaries.contains_key(&fn_node) {
                        self.deferred.push(DeferredCheck {
                            call_site: n,
                            callee: fn_node,
                            expected_ret: required,
                            arg_types,
                        });
                        return (env, TypeId::UNKNOWN);
                    }
                }
            }
        }

        let Some(f) = self.store.as_function(callee_ty).cloned() else {
            if !callee_ty.is_unknown()
                && !callee_ty.is_top()
                && !self.store.is_loose(callee_ty)
            {
                self.error_at(
                    callee,
                    SemanticError::NotCallable {
                        found: self.display(callee_ty),
                    },
                );
            }
            return (env, TypeId::UNKNOWN);
        };

        if is_new {
            let Some(nominal) = f.ctor_of else {
                self.error_at(
                    callee,
                    SemanticError::NotAConstructor {
                        found: self.display(callee_ty),
                    },
                );
                return (env, TypeId::UNKNOWN);
            };
            self.check_call_or_instantiate(n, &f, &arg_types);
            let instance = self.store.instance_of(nominal);
            return (env, instance);
        }

        if let Some(nominal) = f.ctor_of {
            let name = self
                .arena
                .interner()
                .resolve(self.store.nominal(nominal).name)
                .to_string();
            self.error_at(callee, SemanticError::ConstructorNotCallable { name });
            return (env, TypeId::UNKNOWN);
        }

        let ret = self.check_call_or_instantiate(n, &f, &arg_types);
        (env, ret)
    }

    /// Check a call against a signature; for generic signatures, resolve
    /// the type variables from the arguments first. Returns the
    /// (instantiated) return type.
    fn check_call_or_instantiate(
        &mut self,
        call_site: NodeId,
        f: &FunctionType,
        args: &[TypeId],
    ) -> TypeId {
        if !f.is_generic() {
            self.check_call_shape(call_site, f, args);
            return f.ret;
        }

        let mut bindings: FxHashMap<stoat_ast::Symbol, Vec<TypeId>> = FxHashMap::default();
        for (i, &arg) in args.iter().enumerate() {
            if let Some(formal) = f.formal(i) {
                self.store
                    .unify_with(formal, arg, &f.type_params, &mut bindings);
            }
        }

        let mut map: FxHashMap<stoat_ast::Symbol, TypeId> = FxHashMap::default();
        for &tv in &f.type_params {
            let resolved = match bindings.get(&tv).map(|v| v.as_slice()) {
                None | Some([]) => TypeId::UNKNOWN,
                Some([one]) => *one,
                Some(candidates) => {
                    self.error_at(
                        call_site,
                        SemanticError::NotUniqueInstantiation {
                            type_var: self.arena.interner().resolve(tv).to_string(),
                            first: self.display(candidates[0]),
                            second: self.display(candidates[1]),
                        },
                    );
                    if self.join_generics {
                        let mut joined = TypeId::BOTTOM;
                        for &c in candidates {
                            joined = self.store.join(joined, c);
                        }
                        joined
                    } else {
                        TypeId::UNKNOWN
                    }
                }
            };
            map.insert(tv, resolved);
        }

        let required: Vec<TypeId> = f
            .required
            .iter()
            .map(|&t| self.store.instantiate_generics(t, &map))
            .collect();
        let optional: Vec<TypeId> = f
            .optional
            .iter()
            .map(|&t| self.store.instantiate_generics(t, &map))
            .collect();
        let rest = f.rest.map(|t| self.store.instantiate_generics(t, &map));
        let ret = self.store.instantiate_generics(f.ret, &map);
        let instantiated = FunctionType {
            required: required.into_iter().collect(),
            optional: optional.into_iter().collect(),
            rest,
            ret,
            receiver: f.receiver,
            is_abstract: f.is_abstract,
            ctor_of: f.ctor_of,
            type_params: Vec::new(),
        };
        self.check_call_shape(call_site, &instantiated, args);
        ret
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    fn analyze_prop_access(
        &mut self,
        n: NodeId,
        obj_ty: TypeId,
        prop: stoat_ast::Symbol,
    ) -> TypeId {
        if obj_ty == TypeId::NULL
            || obj_ty == TypeId::UNDEFINED
            || self.store.contains_nullish(obj_ty)
        {
            self.error_at(
                n,
                SemanticError::NullableDereference {
                    nullish: self.display(obj_ty),
                },
            );
        }
        let receiver = self.store.remove_type(obj_ty, TypeId::NULL_OR_UNDEFINED);
        if receiver.is_bottom() {
            return TypeId::UNKNOWN;
        }
        // Scalars box; their properties are outside this model.
        if matches!(
            self.store.get(receiver),
            TypeData::Number | TypeData::String | TypeData::Boolean | TypeData::True | TypeData::False
        ) {
            return TypeId::UNKNOWN;
        }
        match self.store.get_prop(receiver, prop) {
            PropLookup::Found(ty) => ty,
            PropLookup::Maybe(ty) => {
                if self.store.is_loose(receiver) {
                    self.warn_at(
                        n,
                        SemanticWarning::PossiblyInexistentProperty {
                            prop: self.arena.interner().resolve(prop).to_string(),
                            receiver: self.display(receiver),
                        },
                    );
                }
                ty
            }
            PropLookup::Absent => {
                self.error_at(
                    n,
                    SemanticError::InexistentProperty {
                        prop: self.arena.interner().resolve(prop).to_string(),
                        receiver: self.display(receiver),
                    },
                );
                TypeId::UNKNOWN
            }
            PropLookup::NotObject => {
                self.error_at(
                    n,
                    SemanticError::PropertyAccessOnNonobject {
                        receiver: self.display(receiver),
                    },
                );
                TypeId::UNKNOWN
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    pub(crate) fn join_envs(&mut self, a: &TypeEnv, b: &TypeEnv) -> TypeEnv {
        let Some(scope) = self.cur_scope else {
            return a.clone();
        };
        let store = &mut *self.store;
        let scope_store = self.creator.store();
        a.join(b, store, |name| {
            scope_store
                .lookup(scope, name)
                .and_then(|v| scope_store.declared_type(v))
                .unwrap_or(TypeId::UNKNOWN)
        })
    }

    /// Whether `name` resolves outside the current scope with no
    /// declared type.
    fn is_free_outer(&self, name: stoat_ast::Symbol) -> bool {
        let Some(scope) = self.cur_scope else {
            return false;
        };
        let store = self.creator.store();
        if store.get_own(scope, name).is_some() {
            return false;
        }
        match store.lookup(scope, name) {
            Some(var) => store.declared_type(var).is_none(),
            None => false,
        }
    }
}
