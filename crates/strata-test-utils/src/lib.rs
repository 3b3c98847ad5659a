//! Utilities shared by Strata tests.
//!
//! The fixture schema declares a small set of entity types covering every
//! field kind and both reference ownerships:
//!
//! - `Named`: keyed by `name`.
//! - `NamedChild`: owned by a `Named` through `owner`.
//! - `Parent` / `Child` / `Grandchild`: a chain of owned references.
//! - `Sample`: scalars, a nullable reference, a reference list and a
//!   symbolic reference to `Named`.

mod fixtures;

pub use fixtures::*;
