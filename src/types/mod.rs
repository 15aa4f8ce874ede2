//! Typed domain objects: the kind registry, records and collections.

mod kind;
mod list;
mod object;

pub use kind::{IdKind, KindDescriptor, ObjectKind};
pub use list::ObjectList;
pub use object::{Decoded, IntoFieldValue, Object};
