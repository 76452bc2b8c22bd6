// Licensed under the Apache-2.0 license

//! In-memory form of an elaborated register tree.
//!
//! ```text
//! World
//! ├── nodes: Vec<Node>      # every node, parents before children
//! │   ├── AddrMap / RegFile # containers
//! │   ├── Reg               # registers, children are fields
//! │   ├── Field             # validated bit geometry + optional encoding
//! │   ├── Mem               # memories, children are virtual registers
//! │   └── Signal            # carried for completeness, never addressed
//! │
//! └── top: NodeIdx          # export root, an addrmap
//! ```
//!
//! Nodes refer to each other by [`NodeIdx`]. Arrays are kept as one node
//! with its [`ArrayInfo`]; consumers unroll them.

use ral_runtime::{Access, EnumDef, EnumEntry, FieldGeometry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index into the node arena.
pub type NodeIdx = usize;

//=============================================================================
// Node kinds and properties
//=============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    #[serde(rename = "addrmap")]
    AddrMap,
    #[serde(rename = "regfile")]
    RegFile,
    #[serde(rename = "reg")]
    Reg,
    #[serde(rename = "field")]
    Field,
    #[serde(rename = "mem")]
    Mem,
    #[serde(rename = "signal")]
    Signal,
}

impl NodeKind {
    /// Literal tag folded into structural hashes.
    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::AddrMap => "AddressMap",
            NodeKind::RegFile => "RegisterFile",
            NodeKind::Reg => "Register",
            NodeKind::Field => "Field",
            NodeKind::Mem => "Memory",
            NodeKind::Signal => "Signal",
        }
    }

    /// Stand-in definition name for anonymous definitions.
    pub fn anonymous_type_name(self) -> &'static str {
        match self {
            NodeKind::AddrMap => "anon_addrmap",
            NodeKind::RegFile => "anon_regfile",
            NodeKind::Reg => "anon_reg",
            NodeKind::Field => "anon_field",
            NodeKind::Mem => "anon_mem",
            NodeKind::Signal => "anon_signal",
        }
    }

    pub fn can_contain(self, child: NodeKind) -> bool {
        use NodeKind::*;
        match self {
            AddrMap => matches!(child, AddrMap | RegFile | Reg | Mem | Signal),
            RegFile => matches!(child, RegFile | Reg | Signal),
            Reg => matches!(child, Field | Signal),
            Mem => matches!(child, Reg | Signal),
            Field | Signal => false,
        }
    }
}

/// Value of a built-in or user-defined property.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::String(s) => write!(f, "{}", s),
        }
    }
}

/// Array placement of a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayInfo {
    pub dimensions: Vec<usize>,
    /// Byte distance between consecutive elements.
    pub stride: u64,
}

impl ArrayInfo {
    pub fn len(&self) -> usize {
        self.dimensions.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//=============================================================================
// Kind specific detail
//=============================================================================

/// Enumeration attached to a field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumEncoding {
    pub name: String,
    #[serde(default)]
    pub scope_path: Option<String>,
    pub entries: Vec<EnumEncodingEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumEncodingEntry {
    pub value: u64,
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
}

impl EnumEncoding {
    /// Runtime form of the enumeration.
    pub fn to_enum_def(&self) -> EnumDef {
        EnumDef {
            name: self.name.clone(),
            entries: self
                .entries
                .iter()
                .map(|e| EnumEntry {
                    value: e.value,
                    name: e.name.clone(),
                    desc: e.desc.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub geometry: FieldGeometry,
    pub sw: Access,
    /// Hardware can update the field behind software's back.
    pub hw_writable: bool,
    pub reset: Option<u64>,
    pub encode: Option<EnumEncoding>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegInfo {
    pub regwidth: u32,
    pub accesswidth: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemInfo {
    pub mementries: u64,
    pub memwidth: u32,
    /// Width of one physical access; wider entries move as sub-words.
    pub accesswidth: u32,
    pub sw: Access,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeDetail {
    AddrMap,
    RegFile,
    Reg(RegInfo),
    Field(FieldInfo),
    Mem(MemInfo),
    Signal,
}

//=============================================================================
// Node
//=============================================================================

#[derive(Clone, Debug)]
pub struct Node {
    pub idx: NodeIdx,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    pub kind: NodeKind,
    /// Name of this instance in its parent.
    pub inst_name: String,
    /// Name of the component definition, absent for anonymous definitions.
    pub type_name: Option<String>,
    /// Lexical scope of the definition, `::` separated.
    pub scope_path: Option<String>,
    pub name: Option<String>,
    pub desc: Option<String>,
    /// Byte offset in the parent (bit offset is carried by field geometry).
    pub address_offset: u64,
    pub array: Option<ArrayInfo>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub detail: NodeDetail,
}

impl Node {
    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Definition name. Anonymous definitions fall back to a name derived
    /// from the kind alone, so identical anonymous definitions at different
    /// positions stay interchangeable.
    pub fn base_type_name(&self) -> &str {
        self.type_name
            .as_deref()
            .unwrap_or_else(|| self.kind.anonymous_type_name())
    }

    pub fn as_field(&self) -> Option<&FieldInfo> {
        match &self.detail {
            NodeDetail::Field(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_reg(&self) -> Option<&RegInfo> {
        match &self.detail {
            NodeDetail::Reg(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_mem(&self) -> Option<&MemInfo> {
        match &self.detail {
            NodeDetail::Mem(info) => Some(info),
            _ => None,
        }
    }
}

//=============================================================================
// World
//=============================================================================

/// Arena holding a whole register tree.
#[derive(Clone, Debug)]
pub struct World {
    pub(crate) nodes: Vec<Node>,
    pub(crate) top: NodeIdx,
}

impl World {
    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Root of the export, an addrmap.
    pub fn top(&self) -> NodeIdx {
        self.top
    }

    pub fn top_node(&self) -> &Node {
        &self.nodes[self.top]
    }

    pub fn children(&self, idx: NodeIdx) -> impl Iterator<Item = &Node> + '_ {
        self.nodes[idx].children.iter().map(|c| &self.nodes[*c])
    }

    /// Children of the given kind, in declaration order.
    pub fn children_of_kind(
        &self,
        idx: NodeIdx,
        kind: NodeKind,
    ) -> impl Iterator<Item = &Node> + '_ {
        self.children(idx).filter(move |c| c.kind == kind)
    }

    pub fn parent(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes[idx].parent.map(|p| &self.nodes[p])
    }

    /// Dotted path from the export root, e.g. `top.block.reg`.
    pub fn path(&self, idx: NodeIdx) -> String {
        let mut parts = vec![self.nodes[idx].inst_name.as_str()];
        let mut current = idx;
        while current != self.top {
            match self.nodes[current].parent {
                Some(parent) => {
                    current = parent;
                    parts.push(&self.nodes[current].inst_name);
                }
                None => break,
            }
        }
        parts.reverse();
        parts.join(".")
    }

    /// Finds a node by dotted path. The first component may name the export
    /// root or the original root of the tree.
    pub fn find(&self, path: &str) -> Option<NodeIdx> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = [self.top, 0]
            .into_iter()
            .find(|idx| self.nodes[*idx].inst_name == first)?;
        for part in parts {
            current = *self.nodes[current]
                .children
                .iter()
                .find(|c| self.nodes[**c].inst_name == part)?;
        }
        Some(current)
    }

    /// Makes the addrmap at `path` the export root.
    pub fn select_top(&mut self, path: &str) -> crate::ModelResult<()> {
        let idx = self
            .find(path)
            .ok_or_else(|| crate::ModelError::NotFound(path.to_string()))?;
        let kind = self.nodes[idx].kind;
        if kind != NodeKind::AddrMap {
            return Err(crate::ModelError::RootNotAddrMap(kind));
        }
        self.top = idx;
        Ok(())
    }

    /// Absolute byte address of a node, taking element 0 of every enclosing
    /// array. Fields report the address of their register.
    pub fn absolute_address(&self, idx: NodeIdx) -> u64 {
        let mut address = 0;
        let mut current = Some(idx);
        while let Some(i) = current {
            address += self.nodes[i].address_offset;
            current = self.nodes[i].parent;
        }
        address
    }

    /// Nearest addrmap containing the node, the node itself included.
    pub fn enclosing_addrmap(&self, idx: NodeIdx) -> NodeIdx {
        let mut current = idx;
        loop {
            let node = &self.nodes[current];
            if node.kind == NodeKind::AddrMap {
                return current;
            }
            match node.parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Addrmaps below the export root (root included), in pre-order.
    pub fn addrmaps(&self) -> Vec<NodeIdx> {
        let mut result = Vec::new();
        let mut stack = vec![self.top];
        while let Some(idx) = stack.pop() {
            result.push(idx);
            stack.extend(
                self.nodes[idx]
                    .children
                    .iter()
                    .rev()
                    .filter(|c| self.nodes[**c].kind == NodeKind::AddrMap),
            );
        }
        result
    }

    /// A register is readable when any field is.
    pub fn reg_readable(&self, idx: NodeIdx) -> bool {
        self.children(idx)
            .filter_map(Node::as_field)
            .any(|f| f.sw.readable())
    }

    pub fn reg_writable(&self, idx: NodeIdx) -> bool {
        self.children(idx)
            .filter_map(Node::as_field)
            .any(|f| f.sw.writable())
    }

    /// Register value with every field at its reset.
    pub fn reg_reset(&self, idx: NodeIdx) -> u128 {
        self.children(idx)
            .filter_map(Node::as_field)
            .filter_map(|f| f.reset.and_then(|r| f.geometry.encode(r).ok()))
            .fold(0, |acc, v| acc | v)
    }
}
