//! The abstract type lattice.
//!
//! Types are interned in a [`TypeStore`]; `TypeId` handles give O(1)
//! equality and keep the lattice operations allocation-light. The store
//! pre-interns the primitive and special types at the reserved indices
//! declared on `TypeId`, so `TypeId::NUMBER` is valid without a store in
//! hand.

mod data;
mod ops;
mod store;


pub use data::{FunctionType, NominalId, ObjectType, Property, TypeData, TypeIdVec};
pub use ops::PropLookup;
pub use store::{NominalDef, TypeStore};
