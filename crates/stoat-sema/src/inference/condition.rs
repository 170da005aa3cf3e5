//! Condition analysis: one pass over a boolean context that yields the
//! expression's type, the unrefined out-environment, and the environments
//! the true and false branches observe.
//!
//! Refinements: plain truthiness on names, `typeof x === "..."`,
//! `x instanceof Ctor`, `x == null` (and the strict/negated variants),
//! `!`, and the distribution rules for `&&`/`||`.

use stoat_ast::{BinaryOp, NodeId, NodeKind, Symbol, UnaryOp};
use stoat_identity::TypeId;

use crate::env::TypeEnv;
use crate::types::TypeData;

use super::TypeInference;

impl TypeInference<'_> {
    /// `(out_env, true_env, false_env)` for a branching statement.
    pub(crate) fn analyze_condition(
        &mut self,
        cond: NodeId,
        env: TypeEnv,
    ) -> (TypeEnv, TypeEnv, TypeEnv) {
        let (_ty, out, t, f) = self.analyze_condition_full(cond, env);
        (out, t, f)
    }

    /// `(type, out_env, true_env, false_env)`.
    pub(crate) fn analyze_condition_full(
        &mut self,
        cond: NodeId,
        env: TypeEnv,
    ) -> (TypeId, TypeEnv, TypeEnv, TypeEnv) {
        match *self.arena.kind(cond) {
            NodeKind::Name(sym) => {
                let (out, ty) =
                    self.analyze_expr_fwd(cond, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                let truthy = self.store.truthy_part(ty);
                let falsy = self.store.falsy_part(ty);
                let t_env = out.with(sym, truthy);
                let f_env = out.with(sym, falsy);
                (ty, out, t_env, f_env)
            }

            NodeKind::Unary(UnaryOp::Not) => {
                let inner = self.arena.child(cond, 0);
                let (_ty, out, t, f) = self.analyze_condition_full(inner, env);
                self.arena.set_inferred_type(cond, TypeId::BOOLEAN);
                (TypeId::BOOLEAN, out, f, t)
            }

            NodeKind::And => {
                let lhs = self.arena.child(cond, 0);
                let rhs = self.arena.child(cond, 1);
                let (lhs_ty, _lhs_out, t1, f1) = self.analyze_condition_full(lhs, env);
                let (rhs_ty, rhs_out, t2, f2) = self.analyze_condition_full(rhs, t1);
                let falsy_lhs = self.store.falsy_part(lhs_ty);
                let ty = self.store.join(falsy_lhs, rhs_ty);
                self.arena.set_inferred_type(cond, ty);
                let out = self.join_envs(&f1, &rhs_out);
                let f_env = self.join_envs(&f1, &f2);
                (ty, out, t2, f_env)
            }

            NodeKind::Or => {
                let lhs = self.arena.child(cond, 0);
                let rhs = self.arena.child(cond, 1);
                let (lhs_ty, _lhs_out, t1, f1) = self.analyze_condition_full(lhs, env);
                let (rhs_ty, rhs_out, t2, f2) = self.analyze_condition_full(rhs, f1);
                let truthy_lhs = self.store.truthy_part(lhs_ty);
                let ty = self.store.join(truthy_lhs, rhs_ty);
                self.arena.set_inferred_type(cond, ty);
                let out = self.join_envs(&t1, &rhs_out);
                let t_env = self.join_envs(&t1, &t2);
                (ty, out, t_env, f2)
            }

            NodeKind::Assign(op) if !op.is_compound() => {
                let target = self.arena.child(cond, 0);
                let (out, ty) = self.analyze_expr_fwd(cond, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                match self.arena.name_sym(target) {
                    Some(sym) => {
                        let truthy = self.store.truthy_part(ty);
                        let falsy = self.store.falsy_part(ty);
                        let t_env = out.with(sym, truthy);
                        let f_env = out.with(sym, falsy);
                        (ty, out, t_env, f_env)
                    }
                    None => (ty, out.clone(), out.clone(), out),
                }
            }

            NodeKind::Binary(op) if op.is_equality() => self.analyze_equality(cond, op, env),

            NodeKind::Binary(BinaryOp::InstanceOf) => {
                let lhs = self.arena.child(cond, 0);
                let rhs = self.arena.child(cond, 1);
                let (out, _ty) = self.analyze_expr_fwd(cond, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                let Some(sym) = self.arena.name_sym(lhs) else {
                    return (TypeId::BOOLEAN, out.clone(), out.clone(), out);
                };
                let instance = self.instance_type_of_ctor(rhs, &out);
                let base = out.get(sym).unwrap_or(TypeId::UNKNOWN);
                let narrowed = self.store.specialize(base, instance);
                let t_env = out.with(sym, narrowed);
                // instanceof proves nothing on the false branch
                (TypeId::BOOLEAN, out.clone(), t_env, out)
            }

            _ => {
                let (out, ty) = self.analyze_expr_fwd(cond, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
                (ty, out.clone(), out.clone(), out)
            }
        }
    }

    /// Equality conditions: `typeof` tests and nullish comparisons narrow
    /// a name operand; negated operators swap the branch environments.
    fn analyze_equality(
        &mut self,
        cond: NodeId,
        op: BinaryOp,
        env: TypeEnv,
    ) -> (TypeId, TypeEnv, TypeEnv, TypeEnv) {
        let lhs = self.arena.child(cond, 0);
        let rhs = self.arena.child(cond, 1);
        let (out, _) = self.analyze_expr_fwd(cond, env, TypeId::UNKNOWN, TypeId::UNKNOWN);
        let negated = matches!(op, BinaryOp::Ne | BinaryOp::StrictNe);
        let strict = matches!(op, BinaryOp::StrictEq | BinaryOp::StrictNe);

        let refinement = self
            .typeof_refinement(lhs, rhs)
            .or_else(|| self.typeof_refinement(rhs, lhs))
            .or_else(|| self.nullish_refinement(lhs, rhs, strict))
            .or_else(|| self.nullish_refinement(rhs, lhs, strict));

        let Some((sym, toward)) = refinement else {
            return (TypeId::BOOLEAN, out.clone(), out.clone(), out);
        };

        let base = out.get(sym).unwrap_or_else(|| self.fallback_type_of(sym));
        let eq_ty = self.store.specialize(base, toward);
        let ne_ty = self.store.remove_type(base, toward);
        let eq_env = out.with(sym, eq_ty);
        let ne_env = out.with(sym, ne_ty);
        if negated {
            (TypeId::BOOLEAN, out, ne_env, eq_env)
        } else {
            (TypeId::BOOLEAN, out, eq_env, ne_env)
        }
    }

    /// `typeof x` compared against a string literal.
    fn typeof_refinement(&mut self, a: NodeId, b: NodeId) -> Option<(Symbol, TypeId)> {
        let NodeKind::Unary(UnaryOp::TypeOf) = *self.arena.kind(a) else {
            return None;
        };
        let operand = self.arena.child(a, 0);
        let sym = self.arena.name_sym(operand)?;
        let NodeKind::Str(lit) = *self.arena.kind(b) else {
            return None;
        };
        let toward = match self.arena.name_of(lit) {
            "number" => TypeId::NUMBER,
            "string" => TypeId::STRING,
            "boolean" => TypeId::BOOLEAN,
            "undefined" => TypeId::UNDEFINED,
            "object" => {
                let obj = TypeId::TOP_OBJECT;
                self.store.union([obj, TypeId::NULL])
            }
            "function" => TypeId::TOP_OBJECT,
            _ => return None,
        };
        Some((sym, toward))
    }

    /// `x == null`, `x === null`, `x == undefined`, `x === undefined`.
    /// Loose comparison conflates null and undefined.
    fn nullish_refinement(
        &mut self,
        a: NodeId,
        b: NodeId,
        strict: bool,
    ) -> Option<(Symbol, TypeId)> {
        let sym = self.arena.name_sym(a)?;
        if sym == self.sym_undefined {
            return None;
        }
        let toward = match self.arena.kind(b) {
            NodeKind::Null => {
                if strict {
                    TypeId::NULL
                } else {
                    TypeId::NULL_OR_UNDEFINED
                }
            }
            NodeKind::Name(s) if *s == self.sym_undefined => {
                if strict {
                    TypeId::UNDEFINED
                } else {
                    TypeId::NULL_OR_UNDEFINED
                }
            }
            _ => return None,
        };
        Some((sym, toward))
    }

    /// The instance type `x instanceof Ctor` narrows toward.
    fn instance_type_of_ctor(&mut self, ctor: NodeId, env: &TypeEnv) -> TypeId {
        let ctor_ty = match self.arena.name_sym(ctor) {
            Some(sym) => env.get(sym).unwrap_or_else(|| self.fallback_type_of(sym)),
            None => self.arena.inferred_type(ctor).unwrap_or(TypeId::UNKNOWN),
        };
        let ctor_of = match self.store.get(ctor_ty) {
            TypeData::Function(f) => f.ctor_of,
            _ => None,
        };
        match ctor_of {
            Some(nominal) => self.store.instance_of(nominal),
            None => TypeId::TOP_OBJECT,
        }
    }
}
