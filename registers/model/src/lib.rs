// Licensed under the Apache-2.0 license

//! Elaborated SystemRDL register tree consumed by the RAL generator.
//!
//! The SystemRDL compiler runs outside this workspace and hands over its
//! elaborated tree as JSON. [`World`] is the validated, immutable form of that
//! tree: an arena of nodes with parent links, ordered children and
//! kind-specific detail.
//!
//! - [`types`]: arena, nodes and queries
//! - [`load`]: JSON form and load-time validation

pub mod error;
pub mod load;
pub mod types;

pub use error::{ModelError, ModelResult};
pub use load::{NodeDesc, SwAccess};
pub use types::{
    ArrayInfo, EnumEncoding, EnumEncodingEntry, FieldInfo, MemInfo, Node, NodeDetail, NodeIdx,
    NodeKind, PropertyValue, RegInfo, World,
};
