//! Backward constraint collection.
//!
//! Before the forward pass, scopes with undeclared formals walk their CFG
//! backward gathering lower bounds on those formals from the way they are
//! used: arithmetic forces number, relational operators number-or-string,
//! argument positions the callee's formal type. Multiple constraints on
//! one name meet.

use rustc_hash::FxHashMap;

use stoat_ast::{NodeId, NodeKind, Symbol};
use stoat_identity::{ScopeId, TypeId};

use crate::cfg::ControlFlowGraph;
use crate::scope::VarKind;

use super::TypeInference;

impl TypeInference<'_> {
    pub(crate) fn backward_constraints(
        &mut self,
        cfg: &ControlFlowGraph,
        scope: ScopeId,
    ) -> FxHashMap<Symbol, TypeId> {
        let mut constraints: FxHashMap<Symbol, TypeId> = FxHashMap::default();

        let vertices: Vec<_> = cfg.vertices().rev().collect();
        for v in vertices {
            let Some(node) = cfg.node(v) else { continue };
            self.collect_constraints(node, &mut constraints);
        }

        // Keep only undeclared formals of this scope.
        let store = self.creator.store();
        constraints.retain(|&name, _| {
            store.get_own(scope, name).is_some_and(|var| {
                store.var_kind(var) == VarKind::Param && store.declared_type(var).is_none()
            })
        });
        tracing::trace!(count = constraints.len(), "backward formal constraints");
        constraints
    }

    fn constrain(
        &mut self,
        constraints: &mut FxHashMap<Symbol, TypeId>,
        target: NodeId,
        ty: TypeId,
    ) {
        let Some(sym) = self.arena.name_sym(target) else {
            return;
        };
        let merged = match constraints.get(&sym) {
            Some(&existing) => self.store.meet(existing, ty),
            None => ty,
        };
        constraints.insert(sym, merged);
    }

    fn collect_constraints(&mut self, node: NodeId, constraints: &mut FxHashMap<Symbol, TypeId>) {
        match *self.arena.kind(node) {
            // Nested functions constrain their own formals.
            NodeKind::Function => {}

            NodeKind::Binary(op) => {
                let lhs = self.arena.child(node, 0);
                let rhs = self.arena.child(node, 1);
                if op.is_arithmetic() {
                    self.constrain(constraints, lhs, TypeId::NUMBER);
                    self.constrain(constraints, rhs, TypeId::NUMBER);
                } else if op.is_relational() {
                    self.constrain(constraints, lhs, TypeId::NUMBER_OR_STRING);
                    self.constrain(constraints, rhs, TypeId::NUMBER_OR_STRING);
                }
                self.collect_constraints(lhs, constraints);
                self.collect_constraints(rhs, constraints);
            }

            NodeKind::Update { .. } => {
                let operand = self.arena.child(node, 0);
                self.constrain(constraints, operand, TypeId::NUMBER);
            }

            NodeKind::Assign(op) if op.is_compound() => {
                let target = self.arena.child(node, 0);
                let value = self.arena.child(node, 1);
                self.constrain(constraints, target, TypeId::NUMBER);
                self.collect_constraints(value, constraints);
            }

            NodeKind::Call => {
                let children: Vec<NodeId> = self.arena.children(node).to_vec();
                let callee = children[0];
                if let Some(sym) = self.arena.name_sym(callee) {
                    if let Some(fn_node) = self.function_decl_of(sym) {
                        if let Some(fn_type) =
                            self.summaries.get(&fn_node).map(|s| s.fn_type)
                        {
                            if let Some(f) = self.store.as_function(fn_type).cloned() {
                                for (i, &arg) in children[1..].iter().enumerate() {
                                    if let Some(formal) = f.formal(i) {
                                        if !formal.is_unknown() {
                                            self.constrain(constraints, arg, formal);
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                for &arg in &children[1..] {
                    self.collect_constraints(arg, constraints);
                }
            }

            _ => {
                for child in self.arena.children(node).to_vec() {
                    self.collect_constraints(child, constraints);
                }
            }
        }
    }
}
