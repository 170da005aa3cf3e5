//! Canonical type representation.

use smallvec::SmallVec;

use stoat_ast::Symbol;
use stoat_identity::TypeId;

pub type TypeIdVec = SmallVec<[TypeId; 4]>;

/// Identity of a nominal type definition (class or interface). Distinct
/// from `TypeId`: a `NominalId` names the definition, while a `TypeId`
/// names an instantiated instance type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NominalId(pub u32);

/// One property on an object or nominal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Property {
    pub ty: TypeId,
    /// The property may be absent.
    pub optional: bool,
    /// Declared `@const`; writes after initialization are violations.
    pub constant: bool,
}

impl Property {
    pub fn required(ty: TypeId) -> Self {
        Self {
            ty,
            optional: false,
            constant: false,
        }
    }

    pub fn optional(ty: TypeId) -> Self {
        Self {
            ty,
            optional: true,
            constant: false,
        }
    }
}

/// A structural object type, optionally tagged with the nominal type it
/// instantiates. Properties are kept sorted by symbol so interning sees a
/// canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ObjectType {
    pub nominal: Option<NominalId>,
    pub props: Vec<(Symbol, Property)>,
    /// Loose objects have an open property set: the engine has incomplete
    /// information about them, so absent properties are possible rather
    /// than definite errors.
    pub loose: bool,
}

impl ObjectType {
    pub fn prop(&self, name: Symbol) -> Option<&Property> {
        self.props
            .binary_search_by_key(&name, |(s, _)| *s)
            .ok()
            .map(|i| &self.props[i].1)
    }

    pub fn with_prop(&self, name: Symbol, prop: Property) -> ObjectType {
        let mut out = self.clone();
        match out.props.binary_search_by_key(&name, |(s, _)| *s) {
            Ok(i) => out.props[i].1 = prop,
            Err(i) => out.props.insert(i, (name, prop)),
        }
        out
    }
}

/// A function type: positional formals (required, then optional, then an
/// optional rest), return, receiver, and generic parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub required: TypeIdVec,
    pub optional: TypeIdVec,
    pub rest: Option<TypeId>,
    pub ret: TypeId,
    pub receiver: Option<TypeId>,
    pub is_abstract: bool,
    /// Set when this function constructs instances of a nominal type.
    pub ctor_of: Option<NominalId>,
    pub type_params: Vec<Symbol>,
}

impl FunctionType {
    /// A plain `(required...) -> ret` signature.
    pub fn simple(required: impl IntoIterator<Item = TypeId>, ret: TypeId) -> Self {
        FunctionType {
            required: required.into_iter().collect(),
            optional: TypeIdVec::new(),
            rest: None,
            ret,
            receiver: None,
            is_abstract: false,
            ctor_of: None,
            type_params: Vec::new(),
        }
    }

    pub fn min_arity(&self) -> usize {
        self.required.len()
    }

    pub fn max_arity(&self) -> Option<usize> {
        if self.rest.is_some() {
            None
        } else {
            Some(self.required.len() + self.optional.len())
        }
    }

    /// The declared type of the formal at `i`, if any.
    pub fn formal(&self, i: usize) -> Option<TypeId> {
        if i < self.required.len() {
            Some(self.required[i])
        } else if i < self.required.len() + self.optional.len() {
            Some(self.optional[i - self.required.len()])
        } else {
            self.rest
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

/// The interned type representation. Scalars and markers live at reserved
/// indices; compound types are interned on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeData {
    /// No values; the identity of join.
    Bottom,
    /// Incomplete information: top in meet, absorbing in join.
    Unknown,
    /// All values.
    Top,
    Boolean,
    /// The boolean refinements.
    True,
    False,
    Number,
    String,
    Null,
    Undefined,
    /// Specialization markers; valid only as `specialize` targets.
    Truthy,
    Falsy,
    /// At least two members, sorted by index, no nested unions.
    Union(TypeIdVec),
    Object(ObjectType),
    Function(Box<FunctionType>),
    /// A generic type variable, identified by name.
    TypeVar(Symbol),
}
