//! Registries behind the tether bridge.
//!
//! - [`RepresentativeRegistry`]: native address to representative identity map
//! - [`DependencyGraph`]: keep-alive edges between representatives
//! - [`TypeRegistry`]: registered native types and enums

mod dependency;
mod representatives;
mod types;

pub use dependency::{DependencyGraph, EdgeInsert};
pub use representatives::{RepEntry, RepresentativeRegistry};
pub use types::{EnumConstant, EnumEntry, NativeTypeEntry, TypeFlags, TypeRegistry};
