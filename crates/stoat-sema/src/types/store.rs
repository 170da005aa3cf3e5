//! Per-compilation type storage with interning and nominal definitions.

use rustc_hash::FxHashMap;

use stoat_ast::{Interner, Symbol};
use stoat_identity::TypeId;

use super::data::{FunctionType, NominalId, ObjectType, Property, TypeData, TypeIdVec};

/// A class or interface definition: name, superclass chain, and the
/// properties its instances carry.
#[derive(Debug, Clone)]
pub struct NominalDef {
    pub name: Symbol,
    pub superclass: Option<NominalId>,
    pub is_interface: bool,
    pub instance_props: Vec<(Symbol, Property)>,
}

/// Interned type storage. Every distinct `TypeData` value is stored once;
/// `TypeId` equality is type equality.
#[derive(Debug, Default)]
pub struct TypeStore {
    types: Vec<TypeData>,
    intern_map: FxHashMap<TypeData, TypeId>,
    nominals: Vec<NominalDef>,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = Self::default();

        // Reserved indices, in the exact order TypeId declares them.
        let reserved = [
            TypeData::Bottom,
            TypeData::Unknown,
            TypeData::Top,
            TypeData::Boolean,
            TypeData::True,
            TypeData::False,
            TypeData::Number,
            TypeData::String,
            TypeData::Null,
            TypeData::Undefined,
            TypeData::Truthy,
            TypeData::Falsy,
            TypeData::Union(TypeIdVec::from_slice(&[TypeId::NULL, TypeId::UNDEFINED])),
            TypeData::Union(TypeIdVec::from_slice(&[TypeId::NUMBER, TypeId::STRING])),
            TypeData::Object(ObjectType {
                nominal: None,
                props: Vec::new(),
                loose: true,
            }),
        ];
        for (i, data) in reserved.into_iter().enumerate() {
            let id = store.intern(data);
            debug_assert_eq!(id.index(), i as u32);
        }
        debug_assert_eq!(store.types.len() as u32, TypeId::FIRST_DYNAMIC);
        store
    }

    pub fn intern(&mut self, data: TypeData) -> TypeId {
        if let Some(&id) = self.intern_map.get(&data) {
            return id;
        }
        let id = TypeId::new(self.types.len() as u32);
        self.types.push(data.clone());
        self.intern_map.insert(data, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeData {
        &self.types[id.index() as usize]
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn function(&mut self, f: FunctionType) -> TypeId {
        self.intern(TypeData::Function(Box::new(f)))
    }

    pub fn object(&mut self, o: ObjectType) -> TypeId {
        self.intern(TypeData::Object(o))
    }

    pub fn type_var(&mut self, name: Symbol) -> TypeId {
        self.intern(TypeData::TypeVar(name))
    }

    /// Canonical union construction: flattens, dedupes, drops subsumed
    /// members, collapses `true|false` to `boolean`, and absorbs `top`
    /// and `unknown`.
    pub fn union(&mut self, members: impl IntoIterator<Item = TypeId>) -> TypeId {
        let mut flat: Vec<TypeId> = Vec::new();
        for m in members {
            match self.get(m) {
                TypeData::Bottom => {}
                TypeData::Union(inner) => flat.extend(inner.iter().copied()),
                _ => flat.push(m),
            }
        }
        if flat.iter().any(|t| t.is_top()) {
            return TypeId::TOP;
        }
        if flat.iter().any(|t| t.is_unknown()) {
            return TypeId::UNKNOWN;
        }
        flat.sort_by_key(|t| t.index());
        flat.dedup();

        // true|false collapses to boolean
        if flat.contains(&TypeId::TRUE) && flat.contains(&TypeId::FALSE) {
            flat.retain(|&t| t != TypeId::TRUE && t != TypeId::FALSE);
            flat.push(TypeId::BOOLEAN);
            flat.sort_by_key(|t| t.index());
        }

        // drop members subsumed by another member
        let snapshot = flat.clone();
        flat.retain(|&t| {
            !snapshot
                .iter()
                .any(|&other| other != t && self.is_subtype(t, other))
        });

        match flat.len() {
            0 => TypeId::BOTTOM,
            1 => flat[0],
            _ => self.intern(TypeData::Union(flat.into_iter().collect())),
        }
    }

    // ------------------------------------------------------------------
    // Nominal definitions
    // ------------------------------------------------------------------

    pub fn define_nominal(&mut self, def: NominalDef) -> NominalId {
        let id = NominalId(self.nominals.len() as u32);
        self.nominals.push(def);
        id
    }

    pub fn nominal(&self, id: NominalId) -> &NominalDef {
        &self.nominals[id.0 as usize]
    }

    /// Link a nominal to its superclass after both are defined, so
    /// declaration order between a class and its base does not matter.
    pub fn set_superclass(&mut self, sub: NominalId, superclass: NominalId) {
        self.nominals[sub.0 as usize].superclass = Some(superclass);
    }

    /// The instance type of a nominal definition.
    pub fn instance_of(&mut self, id: NominalId) -> TypeId {
        self.object(ObjectType {
            nominal: Some(id),
            props: Vec::new(),
            loose: false,
        })
    }

    /// Whether `a` is `b` or transitively extends it.
    pub fn nominal_is_subclass(&self, a: NominalId, b: NominalId) -> bool {
        let mut cur = Some(a);
        while let Some(c) = cur {
            if c == b {
                return true;
            }
            cur = self.nominal(c).superclass;
        }
        false
    }

    /// Look up an instance property through the superclass chain.
    pub fn nominal_prop(&self, id: NominalId, name: Symbol) -> Option<Property> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            let def = self.nominal(c);
            if let Some((_, p)) = def.instance_props.iter().find(|(s, _)| *s == name) {
                return Some(*p);
            }
            cur = def.superclass;
        }
        None
    }

    // ------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------

    /// Human-readable form for diagnostics. Deterministic: members print
    /// in interned order, properties in symbol order.
    pub fn display(&self, id: TypeId, interner: &Interner) -> String {
        match self.get(id) {
            TypeData::Bottom => "none".into(),
            TypeData::Unknown => "?".into(),
            TypeData::Top => "*".into(),
            TypeData::Boolean => "boolean".into(),
            TypeData::True => "true".into(),
            TypeData::False => "false".into(),
            TypeData::Number => "number".into(),
            TypeData::String => "string".into(),
            TypeData::Null => "null".into(),
            TypeData::Undefined => "undefined".into(),
            TypeData::Truthy => "truthy".into(),
            TypeData::Falsy => "falsy".into(),
            TypeData::Union(members) => members
                .iter()
                .map(|&m| self.display(m, interner))
                .collect::<Vec<_>>()
                .join("|"),
            TypeData::Object(o) => {
                if let Some(n) = o.nominal {
                    interner.resolve(self.nominal(n).name).to_string()
                } else if o.props.is_empty() {
                    "Object".into()
                } else {
                    let body = o
                        .props
                        .iter()
                        .map(|(s, p)| {
                            format!("{}: {}", interner.resolve(*s), self.display(p.ty, interner))
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{{{body}}}")
                }
            }
            TypeData::Function(f) => {
                let mut parts: Vec<String> = f
                    .required
                    .iter()
                    .map(|&t| self.display(t, interner))
                    .collect();
                parts.extend(
                    f.optional
                        .iter()
                        .map(|&t| format!("{}=", self.display(t, interner))),
                );
                if let Some(rest) = f.rest {
                    parts.push(format!("...{}", self.display(rest, interner)));
                }
                format!(
                    "function({}): {}",
                    parts.join(", "),
                    self.display(f.ret, interner)
                )
            }
            TypeData::TypeVar(s) => interner.resolve(*s).to_string(),
        }
    }
}
