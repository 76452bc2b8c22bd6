// Licensed under the Apache-2.0 license

//! Generated type names and accessor names.
//!
//! Type names embed the structural hash, so a type name is fixed by the
//! shape it describes. Accessor names are derived from instance names and
//! kept clear of the methods every generated type already carries.

use crate::config::INST_NAME_PROPERTY;
use crate::error::{GeneratorError, GeneratorResult};
use crate::util::{camel_case, snake_case};
use ral_model::{NodeIdx, NodeKind, World};
use std::collections::{HashMap, HashSet};

/// Bumped whenever a reserved list below changes, since that renames
/// accessors in previously generated code.
pub const RESERVED_NAMES_VERSION: u32 = 1;

/// Methods and fields of generated address map and register file types.
pub const RESERVED_CONTAINER_NAMES: &[&str] = &["new", "name", "address"];

/// Methods of generated register types.
pub const RESERVED_REGISTER_NAMES: &[&str] = &[
    "new",
    "layout",
    "register",
    "read",
    "write",
    "read_fields",
    "write_fields",
    "with_cached",
    "cached",
    "from_register",
];

/// Methods and fields of generated memory types.
pub const RESERVED_MEMORY_NAMES: &[&str] = &[
    "new",
    "mem",
    "memory",
    "read",
    "write",
    "read_entry",
    "write_entry",
    "with_cached",
    "cached",
    "entries",
];

pub fn reserved_names(kind: NodeKind) -> &'static [&'static str] {
    match kind {
        NodeKind::AddrMap | NodeKind::RegFile => RESERVED_CONTAINER_NAMES,
        NodeKind::Reg => RESERVED_REGISTER_NAMES,
        NodeKind::Mem => RESERVED_MEMORY_NAMES,
        NodeKind::Field | NodeKind::Signal => &[],
    }
}

/// Fully qualified name of a generated type: scope, definition name and
/// hash, e.g. `blocks_ctrl_t_3fa0` or `ctrl_t_neg_3fa0`.
pub fn class_name(scope_path: Option<&str>, type_name: &str, hash: i64) -> String {
    let hex = if hash < 0 {
        format!("neg_{:x}", hash.unsigned_abs())
    } else {
        format!("{hash:x}")
    };
    match scope_path.filter(|s| !s.is_empty()) {
        Some(scope) => format!(
            "{}_{}_{}",
            scope.replace("::", "_").replace('.', "_"),
            type_name,
            hex
        ),
        None => format!("{type_name}_{hex}"),
    }
}

/// Accessor names for the visible children of `parent`, in order.
pub fn accessor_names(world: &World, parent: NodeIdx, children: &[NodeIdx]) -> Vec<String> {
    let reserved = reserved_names(world.node(parent).kind);
    let mut taken: HashSet<String> = reserved.iter().map(|s| s.to_string()).collect();
    children
        .iter()
        .map(|child| {
            let node = world.node(*child);
            let base = node
                .property(INST_NAME_PROPERTY)
                .and_then(|v| v.as_str())
                .unwrap_or(&node.inst_name);
            let mut name = snake_case(base);
            while taken.contains(&name) {
                name.push('_');
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// Tracks emitted identifiers so two different names never map onto one
/// Rust identifier.
#[derive(Default)]
pub struct IdentRegistry {
    idents: HashMap<String, String>,
}

impl IdentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifier for a fully qualified name.
    pub fn register(&mut self, name: &str) -> GeneratorResult<String> {
        let ident = camel_case(name);
        match self.idents.get(&ident) {
            Some(first) if first != name => Err(GeneratorError::ClassNameCollision {
                ident,
                first: first.clone(),
                second: name.to_string(),
            }),
            Some(_) => Ok(ident),
            None => {
                self.idents.insert(ident.clone(), name.to_string());
                Ok(ident)
            }
        }
    }
}
