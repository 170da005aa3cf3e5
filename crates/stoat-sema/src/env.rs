//! Typing environments: binding name to abstract type at a program point.
//!
//! Environments live on CFG edges during inference. Joins are pointwise;
//! a name missing on one side falls back to the caller-provided default
//! (its declared type, or unknown), which is how declared types re-enter
//! after a branch forgot a binding.

use rustc_hash::FxHashMap;

use stoat_ast::Symbol;
use stoat_identity::TypeId;

use crate::types::TypeStore;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeEnv {
    slots: FxHashMap<Symbol, TypeId>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: Symbol) -> Option<TypeId> {
        self.slots.get(&name).copied()
    }

    pub fn set(&mut self, name: Symbol, ty: TypeId) {
        self.slots.insert(name, ty);
    }

    pub fn with(&self, name: Symbol, ty: TypeId) -> TypeEnv {
        let mut out = self.clone();
        out.set(name, ty);
        out
    }

    pub fn names(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.slots.keys().copied()
    }

    /// Pointwise join. `default` supplies the type of a name absent from
    /// one side.
    pub fn join(
        &self,
        other: &TypeEnv,
        store: &mut TypeStore,
        mut default: impl FnMut(Symbol) -> TypeId,
    ) -> TypeEnv {
        let mut out = TypeEnv::new();
        for (&name, &a) in &self.slots {
            let b = other.get(name).unwrap_or_else(|| default(name));
            out.set(name, store.join(a, b));
        }
        for (&name, &b) in &other.slots {
            if !self.slots.contains_key(&name) {
                let a = default(name);
                out.set(name, store.join(a, b));
            }
        }
        out
    }
}
