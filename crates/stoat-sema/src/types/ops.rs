//! Lattice algebra: join, meet, subtyping, specialization, property
//! lookup, and generic instantiation. All operations are total.

use rustc_hash::FxHashMap;

use stoat_ast::Symbol;
use stoat_identity::TypeId;

use super::data::{FunctionType, ObjectType, Property, TypeData, TypeIdVec};
use super::store::TypeStore;

/// Result of a property lookup on a receiver type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropLookup {
    /// Present with this type.
    Found(TypeId),
    /// Possibly present (loose receiver or optional property).
    Maybe(TypeId),
    /// Definitely absent.
    Absent,
    /// The receiver is not an object at all.
    NotObject,
}

impl TypeStore {
    // ------------------------------------------------------------------
    // Subtyping
    // ------------------------------------------------------------------

    pub fn is_subtype(&self, a: TypeId, b: TypeId) -> bool {
        if a == b || a.is_bottom() || b.is_top() {
            return true;
        }
        // Unknown is compatible in both directions.
        if a.is_unknown() || b.is_unknown() {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (TypeData::True | TypeData::False, TypeData::Boolean) => true,
            (TypeData::Union(members), _) => {
                members.iter().all(|&m| self.is_subtype(m, b))
            }
            (_, TypeData::Union(members)) => {
                members.iter().any(|&m| self.is_subtype(a, m))
            }
            (TypeData::Object(x), TypeData::Object(y)) => self.object_is_subtype(x, y),
            (TypeData::Function(f), TypeData::Function(g)) => self.function_is_subtype(f, g),
            // Functions are objects; the only object supertype they have
            // is the empty/loose one.
            (TypeData::Function(_), TypeData::Object(y)) => y.props.is_empty() && y.nominal.is_none(),
            _ => false,
        }
    }

    fn object_is_subtype(&self, x: &ObjectType, y: &ObjectType) -> bool {
        if let Some(yn) = y.nominal {
            match x.nominal {
                Some(xn) => {
                    if !self.nominal_is_subclass(xn, yn) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        for (name, yp) in &y.props {
            let found = x
                .prop(*name)
                .map(|p| p.ty)
                .or_else(|| x.nominal.and_then(|n| self.nominal_prop(n, *name)).map(|p| p.ty));
            match found {
                Some(ty) => {
                    if !self.is_subtype(ty, yp.ty) {
                        return false;
                    }
                }
                None => {
                    // Loose receivers may have the property; optional
                    // properties may be absent.
                    if !x.loose && !yp.optional {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn function_is_subtype(&self, f: &FunctionType, g: &FunctionType) -> bool {
        // f must accept every call shape g accepts.
        if f.min_arity() > g.min_arity() {
            return false;
        }
        match (f.max_arity(), g.max_arity()) {
            (Some(fmax), Some(gmax)) if fmax < gmax => return false,
            (Some(_), None) => return false,
            _ => {}
        }
        let g_total = g.required.len() + g.optional.len();
        for i in 0..g_total {
            let (Some(fp), Some(gp)) = (f.formal(i), g.formal(i)) else {
                continue;
            };
            // contravariant in formals
            if !self.is_subtype(gp, fp) {
                return false;
            }
        }
        self.is_subtype(f.ret, g.ret)
    }

    // ------------------------------------------------------------------
    // Join and meet
    // ------------------------------------------------------------------

    pub fn join(&mut self, a: TypeId, b: TypeId) -> TypeId {
        if a == b {
            return a;
        }
        if a.is_bottom() {
            return b;
        }
        if b.is_bottom() {
            return a;
        }
        if a.is_unknown() || b.is_unknown() {
            return TypeId::UNKNOWN;
        }
        if a.is_top() || b.is_top() {
            return TypeId::TOP;
        }
        // Instances of the same nominal type merge pointwise instead of
        // stacking up in a union.
        if let (TypeData::Object(x), TypeData::Object(y)) = (self.get(a), self.get(b)) {
            if x.nominal.is_some() && x.nominal == y.nominal {
                let (x, y) = (x.clone(), y.clone());
                return self.join_objects(&x, &y);
            }
        }
        self.union([a, b])
    }

    fn join_objects(&mut self, x: &ObjectType, y: &ObjectType) -> TypeId {
        let mut props: Vec<(Symbol, Property)> = Vec::new();
        for (name, xp) in &x.props {
            match y.prop(*name) {
                Some(yp) => {
                    let ty = self.join(xp.ty, yp.ty);
                    props.push((
                        *name,
                        Property {
                            ty,
                            optional: xp.optional || yp.optional,
                            constant: xp.constant && yp.constant,
                        },
                    ));
                }
                // A property on one branch only may be absent.
                None => props.push((*name, Property::optional(xp.ty))),
            }
        }
        for (name, yp) in &y.props {
            if x.prop(*name).is_none() {
                props.push((*name, Property::optional(yp.ty)));
            }
        }
        props.sort_by_key(|(s, _)| *s);
        self.object(ObjectType {
            nominal: x.nominal,
            props,
            loose: x.loose || y.loose,
        })
    }

    pub fn meet(&mut self, a: TypeId, b: TypeId) -> TypeId {
        if a == b {
            return a;
        }
        if a.is_unknown() || a.is_top() {
            return b;
        }
        if b.is_unknown() || b.is_top() {
            return a;
        }
        if a.is_bottom() || b.is_bottom() {
            return TypeId::BOTTOM;
        }
        if b == TypeId::TRUTHY {
            return self.truthy_part(a);
        }
        if b == TypeId::FALSY {
            return self.falsy_part(a);
        }
        if a == TypeId::TRUTHY {
            return self.truthy_part(b);
        }
        if a == TypeId::FALSY {
            return self.falsy_part(b);
        }

        match (self.get(a).clone(), self.get(b).clone()) {
            (TypeData::Union(members), _) => {
                let met: Vec<TypeId> = members.iter().map(|&m| self.meet(m, b)).collect();
                self.union(met)
            }
            (_, TypeData::Union(members)) => {
                let met: Vec<TypeId> = members.iter().map(|&m| self.meet(a, m)).collect();
                self.union(met)
            }
            (TypeData::True, TypeData::Boolean) | (TypeData::Boolean, TypeData::True) => {
                TypeId::TRUE
            }
            (TypeData::False, TypeData::Boolean) | (TypeData::Boolean, TypeData::False) => {
                TypeId::FALSE
            }
            (TypeData::Object(x), TypeData::Object(y)) => self.meet_objects(&x, &y),
            (TypeData::Function(f), TypeData::Function(g)) => self.meet_functions(&f, &g),
            _ => TypeId::BOTTOM,
        }
    }

    fn meet_objects(&mut self, x: &ObjectType, y: &ObjectType) -> TypeId {
        let nominal = match (x.nominal, y.nominal) {
            (Some(xn), Some(yn)) => {
                if self.nominal_is_subclass(xn, yn) {
                    Some(xn)
                } else if self.nominal_is_subclass(yn, xn) {
                    Some(yn)
                } else {
                    return TypeId::BOTTOM;
                }
            }
            (n, None) | (None, n) => n,
        };
        let mut props: Vec<(Symbol, Property)> = Vec::new();
        for (name, xp) in &x.props {
            match y.prop(*name) {
                Some(yp) => {
                    let ty = self.meet(xp.ty, yp.ty);
                    if ty.is_bottom() {
                        return TypeId::BOTTOM;
                    }
                    props.push((
                        *name,
                        Property {
                            ty,
                            optional: xp.optional && yp.optional,
                            constant: xp.constant || yp.constant,
                        },
                    ));
                }
                None => props.push((*name, *xp)),
            }
        }
        for (name, yp) in &y.props {
            if x.prop(*name).is_none() {
                props.push((*name, *yp));
            }
        }
        props.sort_by_key(|(s, _)| *s);
        self.object(ObjectType {
            nominal,
            props,
            loose: x.loose && y.loose,
        })
    }

    fn meet_functions(&mut self, f: &FunctionType, g: &FunctionType) -> TypeId {
        if f.required.len() != g.required.len()
            || f.optional.len() != g.optional.len()
            || f.rest.is_some() != g.rest.is_some()
        {
            return TypeId::BOTTOM;
        }
        let required: TypeIdVec = f
            .required
            .iter()
            .zip(&g.required)
            .map(|(&a, &b)| self.join(a, b))
            .collect();
        let optional: TypeIdVec = f
            .optional
            .iter()
            .zip(&g.optional)
            .map(|(&a, &b)| self.join(a, b))
            .collect();
        let rest = match (f.rest, g.rest) {
            (Some(a), Some(b)) => Some(self.join(a, b)),
            _ => None,
        };
        let ret = self.meet(f.ret, g.ret);
        self.function(FunctionType {
            required,
            optional,
            rest,
            ret,
            receiver: f.receiver.or(g.receiver),
            is_abstract: f.is_abstract && g.is_abstract,
            ctor_of: f.ctor_of.or(g.ctor_of),
            type_params: f.type_params.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Specialization
    // ------------------------------------------------------------------

    /// The values of `a` that are truthy.
    pub fn truthy_part(&mut self, a: TypeId) -> TypeId {
        match self.get(a).clone() {
            TypeData::Null | TypeData::Undefined | TypeData::False | TypeData::Falsy => {
                TypeId::BOTTOM
            }
            TypeData::Boolean => TypeId::TRUE,
            TypeData::Union(members) => {
                let filtered: Vec<TypeId> =
                    members.iter().map(|&m| self.truthy_part(m)).collect();
                self.union(filtered)
            }
            _ => a,
        }
    }

    /// The values of `a` that are falsy. Number and string survive (zero
    /// and the empty string are falsy); objects never do.
    pub fn falsy_part(&mut self, a: TypeId) -> TypeId {
        match self.get(a).clone() {
            TypeData::True | TypeData::Truthy => TypeId::BOTTOM,
            TypeData::Boolean => TypeId::FALSE,
            TypeData::Object(_) | TypeData::Function(_) => TypeId::BOTTOM,
            TypeData::Union(members) => {
                let filtered: Vec<TypeId> = members.iter().map(|&m| self.falsy_part(m)).collect();
                self.union(filtered)
            }
            _ => a,
        }
    }

    /// Sharpen `a` toward `toward` within its remaining possibilities.
    /// Specializing unknown yields `toward`; specializing by the truthy or
    /// falsy markers filters; anything else meets.
    pub fn specialize(&mut self, a: TypeId, toward: TypeId) -> TypeId {
        if toward == TypeId::TRUTHY {
            return self.truthy_part(a);
        }
        if toward == TypeId::FALSY {
            return self.falsy_part(a);
        }
        if toward.is_unknown() {
            return a;
        }
        if a.is_unknown() || a.is_top() {
            return toward;
        }
        self.meet(a, toward)
    }

    /// Remove every value of `to_remove` from `a`.
    pub fn remove_type(&mut self, a: TypeId, to_remove: TypeId) -> TypeId {
        if a == to_remove {
            return TypeId::BOTTOM;
        }
        if a.is_unknown() || a.is_top() {
            return a;
        }
        match self.get(a).clone() {
            TypeData::Union(members) => {
                let kept: Vec<TypeId> = members
                    .iter()
                    .copied()
                    .filter(|&m| !self.is_subtype(m, to_remove))
                    .collect();
                self.union(kept)
            }
            TypeData::Boolean if to_remove == TypeId::TRUE => TypeId::FALSE,
            TypeData::Boolean if to_remove == TypeId::FALSE => TypeId::TRUE,
            _ => {
                if self.is_subtype(a, to_remove) {
                    TypeId::BOTTOM
                } else {
                    a
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub fn with_property(&mut self, ty: TypeId, name: Symbol, prop_ty: TypeId) -> TypeId {
        match self.get(ty).clone() {
            TypeData::Object(o) => {
                let updated = o.with_prop(name, Property::required(prop_ty));
                self.object(updated)
            }
            TypeData::Union(members) => {
                let updated: Vec<TypeId> = members
                    .iter()
                    .map(|&m| self.with_property(m, name, prop_ty))
                    .collect();
                self.union(updated)
            }
            _ => ty,
        }
    }

    pub fn get_prop(&mut self, ty: TypeId, name: Symbol) -> PropLookup {
        match self.get(ty).clone() {
            TypeData::Unknown | TypeData::Top => PropLookup::Maybe(TypeId::UNKNOWN),
            TypeData::Object(o) => {
                if let Some(p) = o.prop(name) {
                    if p.optional {
                        PropLookup::Maybe(p.ty)
                    } else {
                        PropLookup::Found(p.ty)
                    }
                } else if let Some(p) = o.nominal.and_then(|n| self.nominal_prop(n, name)) {
                    if p.optional {
                        PropLookup::Maybe(p.ty)
                    } else {
                        PropLookup::Found(p.ty)
                    }
                } else if o.loose {
                    PropLookup::Maybe(TypeId::UNKNOWN)
                } else {
                    PropLookup::Absent
                }
            }
            TypeData::Union(members) => {
                let mut tys: Vec<TypeId> = Vec::new();
                let mut definite = true;
                let mut any = false;
                for &m in members.iter() {
                    match self.get_prop(m, name) {
                        PropLookup::Found(t) => {
                            tys.push(t);
                            any = true;
                        }
                        PropLookup::Maybe(t) => {
                            tys.push(t);
                            definite = false;
                            any = true;
                        }
                        PropLookup::Absent | PropLookup::NotObject => definite = false,
                    }
                }
                if !any {
                    return PropLookup::Absent;
                }
                let mut joined = TypeId::BOTTOM;
                for t in tys {
                    joined = self.join(joined, t);
                }
                if definite {
                    PropLookup::Found(joined)
                } else {
                    PropLookup::Maybe(joined)
                }
            }
            TypeData::Function(_) => PropLookup::Maybe(TypeId::UNKNOWN),
            _ => PropLookup::NotObject,
        }
    }

    pub fn may_have_prop(&mut self, ty: TypeId, name: Symbol) -> bool {
        !matches!(
            self.get_prop(ty, name),
            PropLookup::Absent | PropLookup::NotObject
        )
    }

    pub fn has_constant_prop(&self, ty: TypeId, name: Symbol) -> bool {
        match self.get(ty) {
            TypeData::Object(o) => o
                .prop(name)
                .map(|p| p.constant)
                .or_else(|| {
                    o.nominal
                        .and_then(|n| self.nominal_prop(n, name))
                        .map(|p| p.constant)
                })
                .unwrap_or(false),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Generics
    // ------------------------------------------------------------------

    /// Substitute type variables per `map`, rebuilding compound types.
    pub fn instantiate_generics(
        &mut self,
        ty: TypeId,
        map: &FxHashMap<Symbol, TypeId>,
    ) -> TypeId {
        match self.get(ty).clone() {
            TypeData::TypeVar(s) => map.get(&s).copied().unwrap_or(ty),
            TypeData::Union(members) => {
                let subst: Vec<TypeId> = members
                    .iter()
                    .map(|&m| self.instantiate_generics(m, map))
                    .collect();
                self.union(subst)
            }
            TypeData::Object(o) => {
                let props: Vec<(Symbol, Property)> = o
                    .props
                    .iter()
                    .map(|(s, p)| {
                        (
                            *s,
                            Property {
                                ty: self.instantiate_generics(p.ty, map),
                                ..*p
                            },
                        )
                    })
                    .collect();
                self.object(ObjectType { props, ..o })
            }
            TypeData::Function(f) => {
                // Shadowed variables of a nested generic signature are
                // not substituted.
                let mut map = map.clone();
                for p in &f.type_params {
                    map.remove(p);
                }
                let required: TypeIdVec = f
                    .required
                    .iter()
                    .map(|&t| self.instantiate_generics(t, &map))
                    .collect();
                let optional: TypeIdVec = f
                    .optional
                    .iter()
                    .map(|&t| self.instantiate_generics(t, &map))
                    .collect();
                let rest = f.rest.map(|t| self.instantiate_generics(t, &map));
                let ret = self.instantiate_generics(f.ret, &map);
                let receiver = f.receiver.map(|t| self.instantiate_generics(t, &map));
                self.function(FunctionType {
                    required,
                    optional,
                    rest,
                    ret,
                    receiver,
                    ..(*f).clone()
                })
            }
            _ => ty,
        }
    }

    /// Structural unification of `formal` against `actual`, accumulating
    /// candidate bindings for each type variable in `type_vars` into the
    /// multimap. More than one distinct binding per variable means the
    /// instantiation is ambiguous; the caller decides how to resolve it.
    pub fn unify_with(
        &self,
        formal: TypeId,
        actual: TypeId,
        type_vars: &[Symbol],
        bindings: &mut FxHashMap<Symbol, Vec<TypeId>>,
    ) {
        match self.get(formal) {
            TypeData::TypeVar(s) if type_vars.contains(s) => {
                let entry = bindings.entry(*s).or_default();
                if !entry.contains(&actual) && !actual.is_unknown() {
                    entry.push(actual);
                }
            }
            TypeData::Function(f) => {
                if let TypeData::Function(g) = self.get(actual) {
                    let n = f.required.len().min(g.required.len());
                    for i in 0..n {
                        self.unify_with(f.required[i], g.required[i], type_vars, bindings);
                    }
                    self.unify_with(f.ret, g.ret, type_vars, bindings);
                }
            }
            TypeData::Object(o) => {
                if let TypeData::Object(other) = self.get(actual) {
                    for (name, p) in &o.props {
                        if let Some(q) = other.prop(*name) {
                            self.unify_with(p.ty, q.ty, type_vars, bindings);
                        }
                    }
                }
            }
            TypeData::Union(members) => {
                // A union with a single variable member binds the variable
                // to whatever the concrete members do not cover.
                let vars: Vec<TypeId> = members
                    .iter()
                    .copied()
                    .filter(|&m| matches!(self.get(m), TypeData::TypeVar(s) if type_vars.contains(s)))
                    .collect();
                if vars.len() == 1 {
                    let concrete_covers = members
                        .iter()
                        .filter(|&&m| m != vars[0])
                        .any(|&m| self.is_subtype(actual, m));
                    if !concrete_covers {
                        self.unify_with(vars[0], actual, type_vars, bindings);
                    }
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Queries used by inference
    // ------------------------------------------------------------------

    pub fn as_function(&self, ty: TypeId) -> Option<&FunctionType> {
        match self.get(ty) {
            TypeData::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Whether a value of this type may be `null` or `undefined`.
    pub fn contains_nullish(&self, ty: TypeId) -> bool {
        match self.get(ty) {
            TypeData::Null | TypeData::Undefined => true,
            TypeData::Union(members) => members
                .iter()
                .any(|&m| matches!(self.get(m), TypeData::Null | TypeData::Undefined)),
            _ => false,
        }
    }

    /// Whether a value of this type may be `undefined`.
    pub fn may_be_undefined(&self, ty: TypeId) -> bool {
        ty == TypeId::UNDEFINED
            || ty.is_unknown()
            || match self.get(ty) {
                TypeData::Union(members) => members.contains(&TypeId::UNDEFINED),
                _ => false,
            }
    }

    /// Loose types are objects the engine has incomplete information
    /// about; violations proven only against them are "possible".
    pub fn is_loose(&self, ty: TypeId) -> bool {
        match self.get(ty) {
            TypeData::Unknown | TypeData::Top => true,
            TypeData::Object(o) => o.loose,
            TypeData::Union(members) => members.iter().any(|&m| self.is_loose(m)),
            _ => false,
        }
    }
}
