// Licensed under the Apache-2.0 license

//! Structural hashing of register tree nodes.
//!
//! A node's class hash covers everything that shapes its generated type and
//! nothing about where it sits: two registers with the same layout, access
//! and properties hash equal wherever they are instantiated. The instance
//! hash adds the position (instance name, offset, array placement) and is
//! what a parent folds in for each child.
//!
//! ```text
//! class item list                      instance item list
//! ├── kind tag                         ├── class hash of the child
//! ├── [name] [desc]                    ├── instance name
//! ├── selected user properties         ├── address offset
//! ├── kind specific attributes         └── [stride, dimensions]
//! ├── child contributions
//! └── qualified definition name
//! ```

use crate::config::{ExportConfig, RESERVED_PROPERTIES};
use crate::error::{GeneratorError, GeneratorResult};
use crate::hide::HideFilter;
use crate::names::accessor_names;
use ral_model::{EnumEncoding, FieldInfo, Node, NodeIdx, NodeKind, PropertyValue, World};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::hash_map::RandomState;
use std::collections::{BTreeSet, HashMap};
use std::hash::{BuildHasher, Hash, Hasher};
use std::str::FromStr;

/// One element of a hash input list. Serializes to plain JSON arrays,
/// strings, integers and booleans so the serialized form is canonical.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum HashItem {
    Str(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
    List(Vec<HashItem>),
}

impl HashItem {
    fn str(s: &str) -> Self {
        HashItem::Str(s.to_string())
    }

    fn pair(key: &str, value: HashItem) -> Self {
        HashItem::List(vec![HashItem::str(key), value])
    }
}

impl From<&PropertyValue> for HashItem {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(b) => HashItem::Bool(*b),
            PropertyValue::Int(i) => HashItem::Int(*i),
            PropertyValue::String(s) => HashItem::Str(s.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Process local hasher. Names change from one run to the next.
    Fast,
    /// SHA-256 over the serialized item list. Stable across runs and hosts.
    #[default]
    Sha256,
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(HashAlgorithm::Fast),
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(format!("unknown hash algorithm {other}, expected sha256 or fast")),
        }
    }
}

/// Result of hashing a node's definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClassHash {
    /// Plain field, served by the runtime `Field` type.
    Sentinel,
    Value(i64),
}

impl ClassHash {
    pub fn value(self) -> Option<i64> {
        match self {
            ClassHash::Sentinel => None,
            ClassHash::Value(v) => Some(v),
        }
    }

    fn item(self) -> HashItem {
        match self {
            ClassHash::Sentinel => HashItem::str("sentinel"),
            ClassHash::Value(v) => HashItem::Int(v),
        }
    }
}

fn access_item(info: &FieldInfo) -> HashItem {
    HashItem::str(match (info.sw.readable(), info.sw.writable()) {
        (true, true) => "rw",
        (true, false) => "r",
        _ => "w",
    })
}

/// Qualified definition name, the part of the type name that is not the hash.
pub fn type_key(node: &Node) -> String {
    match node.scope_path.as_deref().filter(|s| !s.is_empty()) {
        Some(scope) => format!("{scope}::{}", node.base_type_name()),
        None => node.base_type_name().to_string(),
    }
}

//=============================================================================
// HashEngine
//=============================================================================

/// Hashes nodes of one tree for one export. Results are memoized, so an
/// engine must not outlive the configuration it was built from.
pub struct HashEngine<'w> {
    world: &'w World,
    algorithm: HashAlgorithm,
    state: RandomState,
    include_name_and_desc: bool,
    /// Sorted, so property order in the configuration does not matter.
    udp: BTreeSet<String>,
    hide: HideFilter,
    class_hashes: HashMap<NodeIdx, ClassHash>,
    accessors: HashMap<NodeIdx, Vec<(NodeIdx, String)>>,
}

impl<'w> HashEngine<'w> {
    pub fn new(world: &'w World, config: &ExportConfig) -> GeneratorResult<Self> {
        config.validate()?;
        Ok(Self::with_filter(world, config, HideFilter::new(&config.hide)?))
    }

    pub fn with_filter(world: &'w World, config: &ExportConfig, hide: HideFilter) -> Self {
        Self {
            world,
            algorithm: config.hash_algorithm,
            state: RandomState::new(),
            include_name_and_desc: config.include_name_and_desc,
            udp: config
                .udp
                .iter()
                .filter(|u| !RESERVED_PROPERTIES.contains(&u.as_str()))
                .cloned()
                .collect(),
            hide,
            class_hashes: HashMap::new(),
            accessors: HashMap::new(),
        }
    }

    pub fn world(&self) -> &'w World {
        self.world
    }

    pub fn udp(&self) -> impl Iterator<Item = &str> {
        self.udp.iter().map(String::as_str)
    }

    pub fn is_hidden(&mut self, idx: NodeIdx) -> GeneratorResult<bool> {
        self.hide.is_hidden(self.world, idx)
    }

    /// Visible children of `idx` with their accessor names.
    pub fn children(&mut self, idx: NodeIdx) -> GeneratorResult<Vec<(NodeIdx, String)>> {
        if let Some(children) = self.accessors.get(&idx).cloned() {
            // Re-query so an unstable predicate is still caught.
            for (child, _) in &children {
                self.is_hidden(*child)?;
            }
            return Ok(children);
        }
        let visible = self.hide.visible_children(self.world, idx)?;
        let names = accessor_names(self.world, idx, &visible);
        let children: Vec<_> = visible.into_iter().zip(names).collect();
        self.accessors.insert(idx, children.clone());
        Ok(children)
    }

    /// Reduces an item list to a signed 64-bit hash.
    pub fn digest(&self, items: &HashItem) -> GeneratorResult<i64> {
        match self.algorithm {
            HashAlgorithm::Fast => {
                let mut hasher = self.state.build_hasher();
                items.hash(&mut hasher);
                Ok(hasher.finish() as i64)
            }
            HashAlgorithm::Sha256 => {
                let bytes = serde_json::to_vec(items)?;
                let digest = Sha256::digest(&bytes);
                let mut head = [0u8; 8];
                head.copy_from_slice(&digest[..8]);
                Ok(i64::from_be_bytes(head))
            }
        }
    }

    fn common_items(&self, node: &Node) -> Vec<HashItem> {
        let mut items = vec![HashItem::str(node.kind.tag())];
        if self.include_name_and_desc {
            if let Some(name) = &node.name {
                items.push(HashItem::pair("name", HashItem::str(name)));
            }
            if let Some(desc) = &node.desc {
                items.push(HashItem::pair("desc", HashItem::str(desc)));
            }
        }
        for udp in &self.udp {
            if let Some(value) = node.property(udp) {
                items.push(HashItem::pair(udp, value.into()));
            }
        }
        items
    }

    /// Hash of an enumeration: its name and ordered entries.
    pub fn enum_hash(&self, encoding: &EnumEncoding) -> GeneratorResult<i64> {
        let entries = encoding
            .entries
            .iter()
            .map(|e| {
                let mut entry = vec![HashItem::UInt(e.value), HashItem::str(&e.name)];
                if let Some(desc) = &e.desc {
                    entry.push(HashItem::str(desc));
                }
                HashItem::List(entry)
            })
            .collect();
        self.digest(&HashItem::List(vec![
            HashItem::str("Enum"),
            HashItem::str(encoding.scope_path.as_deref().unwrap_or("")),
            HashItem::str(&encoding.name),
            HashItem::List(entries),
        ]))
    }

    /// Hash of a node's definition. Memoized per node.
    pub fn class_hash(&mut self, idx: NodeIdx) -> GeneratorResult<ClassHash> {
        if let Some(hash) = self.class_hashes.get(&idx) {
            return Ok(*hash);
        }
        let world = self.world;
        let node = world.node(idx);
        let mut items = self.common_items(node);
        match node.kind {
            NodeKind::Field => {
                let Some(info) = node.as_field() else {
                    return Err(GeneratorError::UnsupportedKind {
                        path: world.path(idx),
                        kind: node.kind,
                    });
                };
                items.push(access_item(info));
                if let Some(encoding) = &info.encode {
                    items.push(HashItem::pair("encode", HashItem::Int(self.enum_hash(encoding)?)));
                }
                if items.len() == 2 {
                    let plain = matches!(&items[1], HashItem::Str(s) if matches!(s.as_str(), "rw" | "r" | "w"));
                    if items[0] != HashItem::str("Field") || !plain {
                        return Err(GeneratorError::MalformedSentinel {
                            path: world.path(idx),
                            items: serde_json::to_string(&items)?,
                        });
                    }
                    self.class_hashes.insert(idx, ClassHash::Sentinel);
                    return Ok(ClassHash::Sentinel);
                }
            }
            NodeKind::Reg => {
                let children = self.children(idx)?;
                let visible: Vec<&FieldInfo> = children
                    .iter()
                    .filter_map(|(c, _)| world.node(*c).as_field())
                    .collect();
                let reg = node.as_reg().ok_or_else(|| GeneratorError::UnsupportedKind {
                    path: world.path(idx),
                    kind: node.kind,
                })?;
                items.push(HashItem::Bool(visible.iter().any(|f| f.sw.readable())));
                items.push(HashItem::Bool(visible.iter().any(|f| f.sw.writable())));
                items.push(HashItem::UInt(reg.accesswidth as u64));
                items.push(HashItem::UInt(reg.regwidth as u64));
                items.push(HashItem::Bool(node.is_array()));
                for (child, accessor) in children {
                    items.push(self.field_contribution(child, &accessor)?);
                }
            }
            NodeKind::RegFile | NodeKind::AddrMap => {
                items.push(HashItem::Bool(node.is_array()));
                for (child, accessor) in self.children(idx)? {
                    items.push(HashItem::List(vec![
                        HashItem::Int(self.instance_hash(child)?),
                        HashItem::str(&accessor),
                    ]));
                }
            }
            NodeKind::Mem => {
                let mem = node.as_mem().ok_or_else(|| GeneratorError::UnsupportedKind {
                    path: world.path(idx),
                    kind: node.kind,
                })?;
                items.push(HashItem::Bool(mem.sw.readable()));
                items.push(HashItem::Bool(mem.sw.writable()));
                items.push(HashItem::UInt(mem.mementries));
                items.push(HashItem::UInt(mem.memwidth as u64));
                items.push(HashItem::UInt(mem.accesswidth as u64));
                items.push(HashItem::Bool(node.is_array()));
                for (child, accessor) in self.children(idx)? {
                    items.push(HashItem::List(vec![
                        HashItem::Int(self.instance_hash(child)?),
                        HashItem::str(&accessor),
                    ]));
                }
            }
            NodeKind::Signal => {
                return Err(GeneratorError::UnsupportedKind {
                    path: world.path(idx),
                    kind: node.kind,
                })
            }
        }
        items.push(HashItem::pair("type", HashItem::Str(type_key(node))));
        let hash = ClassHash::Value(self.digest(&HashItem::List(items))?);
        self.class_hashes.insert(idx, hash);
        Ok(hash)
    }

    /// A field as seen by its register: the field's own hash plus its
    /// placement, which the field hash leaves out.
    fn field_contribution(&mut self, idx: NodeIdx, accessor: &str) -> GeneratorResult<HashItem> {
        let world = self.world;
        let node = world.node(idx);
        let info = node.as_field().ok_or_else(|| GeneratorError::UnsupportedKind {
            path: world.path(idx),
            kind: node.kind,
        })?;
        let geometry = info.geometry;
        Ok(HashItem::List(vec![
            self.class_hash(idx)?.item(),
            HashItem::UInt(geometry.lsb() as u64),
            HashItem::UInt(geometry.msb() as u64),
            HashItem::UInt(geometry.low() as u64),
            HashItem::UInt(geometry.high() as u64),
            match info.reset {
                Some(reset) => HashItem::UInt(reset),
                None => HashItem::str("none"),
            },
            HashItem::Bool(info.hw_writable),
            HashItem::str(&node.inst_name),
            HashItem::str(accessor),
        ]))
    }

    /// Class hash plus the node's position in its parent.
    pub fn instance_hash(&mut self, idx: NodeIdx) -> GeneratorResult<i64> {
        let world = self.world;
        let node = world.node(idx);
        let class = self.class_hash(idx)?;
        let mut items = vec![
            class.item(),
            HashItem::str(&node.inst_name),
            HashItem::UInt(node.address_offset),
        ];
        if let Some(array) = &node.array {
            items.push(HashItem::List(vec![
                HashItem::UInt(array.stride),
                HashItem::List(
                    array
                        .dimensions
                        .iter()
                        .map(|d| HashItem::UInt(*d as u64))
                        .collect(),
                ),
            ]));
        }
        self.digest(&HashItem::List(items))
    }
}
