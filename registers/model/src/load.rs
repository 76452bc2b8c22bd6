// Licensed under the Apache-2.0 license

//! Loading the compiled tree from its JSON form.

use crate::error::{ModelError, ModelResult};
use crate::types::{
    ArrayInfo, EnumEncoding, FieldInfo, MemInfo, Node, NodeDetail, NodeIdx, NodeKind,
    PropertyValue, RegInfo, World,
};
use log::debug;
use ral_runtime::bits::{low_mask, MAX_VALUE_WIDTH, MAX_WORD_WIDTH};
use ral_runtime::{Access, FieldGeometry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Software access as written by the compiler front end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwAccess {
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "w")]
    Write,
}

impl From<SwAccess> for Access {
    fn from(value: SwAccess) -> Self {
        match value {
            SwAccess::ReadWrite => Access::ReadWrite,
            SwAccess::Read => Access::ReadOnly,
            SwAccess::Write => Access::WriteOnly,
        }
    }
}

/// One node of the serialized tree. Kind specific attributes are optional
/// and checked against the kind when the [`World`] is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDesc {
    pub kind: NodeKind,
    pub inst_name: String,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub scope_path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub address_offset: u64,
    #[serde(default)]
    pub array: Option<ArrayInfo>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub children: Vec<NodeDesc>,

    // field
    #[serde(default)]
    pub lsb: Option<u32>,
    #[serde(default)]
    pub msb: Option<u32>,
    #[serde(default)]
    pub sw: Option<SwAccess>,
    #[serde(default)]
    pub hw_writable: Option<bool>,
    #[serde(default)]
    pub reset: Option<u64>,
    #[serde(default)]
    pub encode: Option<EnumEncoding>,

    // reg, mem
    #[serde(default)]
    pub regwidth: Option<u32>,
    #[serde(default)]
    pub accesswidth: Option<u32>,

    // mem
    #[serde(default)]
    pub mementries: Option<u64>,
    #[serde(default)]
    pub memwidth: Option<u32>,
}

impl World {
    pub fn load(path: &Path) -> ModelResult<World> {
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> ModelResult<World> {
        Self::from_desc(serde_json::from_str(text)?)
    }

    pub fn from_value(value: serde_json::Value) -> ModelResult<World> {
        Self::from_desc(serde_json::from_value(value)?)
    }

    pub fn from_desc(root: NodeDesc) -> ModelResult<World> {
        if root.kind != NodeKind::AddrMap {
            return Err(ModelError::RootNotAddrMap(root.kind));
        }
        let mut world = World {
            nodes: Vec::new(),
            top: 0,
        };
        world.add(root, None, "")?;
        debug!(
            "loaded register tree {} with {} nodes",
            world.top_node().inst_name,
            world.nodes.len()
        );
        Ok(world)
    }

    fn add(
        &mut self,
        desc: NodeDesc,
        parent: Option<NodeIdx>,
        prefix: &str,
    ) -> ModelResult<NodeIdx> {
        let path = if prefix.is_empty() {
            desc.inst_name.clone()
        } else {
            format!("{}.{}", prefix, desc.inst_name)
        };
        if let Some(array) = &desc.array {
            check_array(&path, array)?;
        }
        let detail = detail(&path, &desc, parent.map(|p| &self.nodes[p]))?;
        let idx = self.nodes.len();
        let NodeDesc {
            kind,
            inst_name,
            type_name,
            scope_path,
            name,
            desc: description,
            address_offset,
            array,
            properties,
            children,
            ..
        } = desc;
        self.nodes.push(Node {
            idx,
            parent,
            children: Vec::new(),
            kind,
            inst_name,
            type_name,
            scope_path,
            name,
            desc: description,
            address_offset,
            array,
            properties,
            detail,
        });
        for child in children {
            if !kind.can_contain(child.kind) {
                return Err(ModelError::IllegalChild {
                    path: format!("{}.{}", path, child.inst_name),
                    parent: kind,
                    child: child.kind,
                });
            }
            let child_idx = self.add(child, Some(idx), &path)?;
            self.nodes[idx].children.push(child_idx);
        }
        if kind == NodeKind::Reg {
            self.check_fields(idx, &path)?;
        }
        Ok(idx)
    }

    fn check_fields(&self, idx: NodeIdx, path: &str) -> ModelResult<()> {
        let fields: Vec<&Node> = self.children_of_kind(idx, NodeKind::Field).collect();
        if fields.is_empty() {
            return Err(ModelError::EmptyRegister {
                path: path.to_string(),
            });
        }
        for (i, a) in fields.iter().enumerate() {
            let Some(ga) = a.as_field().map(|f| f.geometry) else {
                continue;
            };
            for b in &fields[..i] {
                let Some(gb) = b.as_field().map(|f| f.geometry) else {
                    continue;
                };
                if ga.bitmask() & gb.bitmask() != 0 {
                    return Err(ModelError::FieldOverlap {
                        path: format!("{}.{}", path, a.inst_name),
                        other: b.inst_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_array(path: &str, array: &ArrayInfo) -> ModelResult<()> {
    if array.dimensions.is_empty() || array.dimensions.contains(&0) {
        return Err(ModelError::InvalidArray {
            path: path.to_string(),
            reason: format!("dimensions {:?}", array.dimensions),
        });
    }
    if array.stride == 0 {
        return Err(ModelError::InvalidArray {
            path: path.to_string(),
            reason: "stride 0".to_string(),
        });
    }
    Ok(())
}

fn check_width(path: &str, what: &'static str, width: u32, max: u32) -> ModelResult<()> {
    if !width.is_power_of_two() || !(8..=max).contains(&width) {
        return Err(ModelError::InvalidWidth {
            path: path.to_string(),
            what,
            width,
        });
    }
    Ok(())
}

fn detail(path: &str, desc: &NodeDesc, parent: Option<&Node>) -> ModelResult<NodeDetail> {
    let missing = |attribute| ModelError::MissingAttribute {
        path: path.to_string(),
        attribute,
    };
    Ok(match desc.kind {
        NodeKind::AddrMap => NodeDetail::AddrMap,
        NodeKind::RegFile => NodeDetail::RegFile,
        NodeKind::Signal => NodeDetail::Signal,
        NodeKind::Reg => {
            let regwidth = desc.regwidth.ok_or_else(|| missing("regwidth"))?;
            check_width(path, "regwidth", regwidth, MAX_VALUE_WIDTH)?;
            let accesswidth = desc.accesswidth.unwrap_or(regwidth.min(MAX_WORD_WIDTH));
            check_width(path, "accesswidth", accesswidth, MAX_WORD_WIDTH)?;
            if accesswidth > regwidth {
                return Err(ModelError::InvalidWidth {
                    path: path.to_string(),
                    what: "accesswidth",
                    width: accesswidth,
                });
            }
            NodeDetail::Reg(RegInfo {
                regwidth,
                accesswidth,
            })
        }
        NodeKind::Field => {
            let msb = desc.msb.ok_or_else(|| missing("msb"))?;
            let lsb = desc.lsb.ok_or_else(|| missing("lsb"))?;
            let geometry = FieldGeometry::from_msb_lsb(msb, lsb).map_err(|source| {
                ModelError::InvalidGeometry {
                    path: path.to_string(),
                    source,
                }
            })?;
            if let Some(reg) = parent.and_then(Node::as_reg) {
                if geometry.high() >= reg.regwidth {
                    return Err(ModelError::FieldOutOfRange {
                        path: path.to_string(),
                        high: geometry.high(),
                        regwidth: reg.regwidth,
                    });
                }
            }
            let max = low_mask(geometry.width());
            let too_large = |value| ModelError::ValueTooLarge {
                path: path.to_string(),
                value,
                width: geometry.width(),
            };
            if let Some(reset) = desc.reset.filter(|r| *r > max) {
                return Err(too_large(reset));
            }
            if let Some(encode) = &desc.encode {
                if let Some(entry) = encode.entries.iter().find(|e| e.value > max) {
                    return Err(too_large(entry.value));
                }
            }
            NodeDetail::Field(FieldInfo {
                geometry,
                sw: desc.sw.unwrap_or(SwAccess::ReadWrite).into(),
                hw_writable: desc.hw_writable.unwrap_or(true),
                reset: desc.reset,
                encode: desc.encode.clone(),
            })
        }
        NodeKind::Mem => {
            let mementries = desc.mementries.ok_or_else(|| missing("mementries"))?;
            let memwidth = desc.memwidth.ok_or_else(|| missing("memwidth"))?;
            if !(8..=MAX_VALUE_WIDTH).contains(&memwidth) {
                return Err(ModelError::InvalidWidth {
                    path: path.to_string(),
                    what: "memwidth",
                    width: memwidth,
                });
            }
            let accesswidth = desc.accesswidth.unwrap_or(memwidth.min(MAX_WORD_WIDTH));
            if !(8..=MAX_WORD_WIDTH).contains(&accesswidth) || memwidth % accesswidth != 0 {
                return Err(ModelError::InvalidWidth {
                    path: path.to_string(),
                    what: "accesswidth",
                    width: accesswidth,
                });
            }
            if mementries == 0 {
                return Err(ModelError::InvalidWidth {
                    path: path.to_string(),
                    what: "mementries",
                    width: 0,
                });
            }
            NodeDetail::Mem(MemInfo {
                mementries,
                memwidth,
                accesswidth,
                sw: desc.sw.unwrap_or(SwAccess::ReadWrite).into(),
            })
        }
    })
}
