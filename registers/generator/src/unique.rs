// Licensed under the Apache-2.0 license

//! Deduplication walk: decides which nodes get a generated type.

use crate::error::{GeneratorError, GeneratorResult};
use crate::hash::{ClassHash, HashEngine};
use crate::names::{class_name, IdentRegistry};
use log::debug;
use ral_model::{EnumEncoding, NodeIdx, World};
use std::collections::HashMap;

/// A node that gets its own generated type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniqueRecord {
    /// First node found with this hash. Its subtree describes the type body.
    pub node: NodeIdx,
    pub hash: i64,
    /// Fully qualified name, e.g. `blocks_ctrl_t_3fa0`.
    pub name: String,
    /// Rust identifier of the generated type, e.g. `BlocksCtrlT3fa0`.
    pub ident: String,
}

/// An enumeration that gets a generated Rust enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumRecord {
    pub hash: i64,
    pub name: String,
    pub ident: String,
    pub encoding: EnumEncoding,
}

/// Everything the emitter needs to know about one export.
#[derive(Debug, Default)]
pub struct ExportPlan {
    /// Dependencies before dependents.
    records: Vec<UniqueRecord>,
    by_hash: HashMap<i64, usize>,
    /// Class of every node the walk reached. `None` for plain fields.
    class_of: HashMap<NodeIdx, Option<i64>>,
    children: HashMap<NodeIdx, Vec<(NodeIdx, String)>>,
    enums: Vec<EnumRecord>,
    enum_by_hash: HashMap<i64, usize>,
    enum_of: HashMap<NodeIdx, i64>,
}

impl ExportPlan {
    pub fn records(&self) -> &[UniqueRecord] {
        &self.records
    }

    pub fn record(&self, hash: i64) -> Option<&UniqueRecord> {
        self.by_hash.get(&hash).map(|i| &self.records[*i])
    }

    /// Generated type of a node, `None` when the runtime type serves it.
    pub fn class_of(&self, idx: NodeIdx) -> Option<&UniqueRecord> {
        self.class_of
            .get(&idx)
            .copied()
            .flatten()
            .and_then(|hash| self.record(hash))
    }

    pub fn is_plain_field(&self, idx: NodeIdx) -> bool {
        matches!(self.class_of.get(&idx), Some(None))
    }

    /// Visible children of a record's node with their accessor names.
    pub fn children(&self, idx: NodeIdx) -> &[(NodeIdx, String)] {
        self.children.get(&idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn enums(&self) -> &[EnumRecord] {
        &self.enums
    }

    pub fn enum_of(&self, field: NodeIdx) -> Option<&EnumRecord> {
        self.enum_of
            .get(&field)
            .and_then(|hash| self.enum_by_hash.get(hash))
            .map(|i| &self.enums[*i])
    }
}

/// Walks the tree from the export root and builds the plan.
///
/// Pre-order: a node whose class hash was seen before reuses that type and
/// its subtree is not visited again. Records are returned in reverse
/// discovery order, so every type is preceded by the types it refers to.
/// Arrays are single nodes, all elements share one type.
pub fn build_plan(engine: &mut HashEngine) -> GeneratorResult<ExportPlan> {
    let world = engine.world();
    let top = world.top();
    if engine.is_hidden(top)? {
        return Err(GeneratorError::TopHidden(world.path(top)));
    }
    let mut walk = Walk {
        plan: ExportPlan::default(),
        idents: IdentRegistry::new(),
    };
    walk.visit(engine, world, top)?;

    let mut plan = walk.plan;
    plan.records.reverse();
    plan.by_hash = plan
        .records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.hash, i))
        .collect();
    Ok(plan)
}

struct Walk {
    plan: ExportPlan,
    idents: IdentRegistry,
}

impl Walk {
    fn visit(&mut self, engine: &mut HashEngine, world: &World, idx: NodeIdx) -> GeneratorResult<()> {
        let node = world.node(idx);
        let hash = match engine.class_hash(idx)? {
            ClassHash::Sentinel => {
                self.plan.class_of.insert(idx, None);
                return Ok(());
            }
            ClassHash::Value(hash) => hash,
        };
        let name = class_name(node.scope_path.as_deref(), node.base_type_name(), hash);
        self.plan.class_of.insert(idx, Some(hash));
        if let Some(encoding) = node.as_field().and_then(|f| f.encode.as_ref()) {
            self.add_enum(engine, idx, node.scope_path.as_deref(), encoding)?;
        }

        if let Some(existing) = self
            .plan
            .by_hash
            .get(&hash)
            .map(|i| &self.plan.records[*i])
        {
            if existing.name != name {
                return Err(GeneratorError::NameMismatch {
                    hash,
                    path: world.path(idx),
                    existing: existing.name.clone(),
                    computed: name,
                });
            }
            debug!("{}: reusing {}", world.path(idx), existing.ident);
            return Ok(());
        }

        let ident = self.idents.register(&name)?;
        debug!("{}: new type {}", world.path(idx), ident);
        self.plan.by_hash.insert(hash, self.plan.records.len());
        self.plan.records.push(UniqueRecord {
            node: idx,
            hash,
            name,
            ident,
        });

        let children = engine.children(idx)?;
        self.plan.children.insert(idx, children.clone());
        for (child, _) in children {
            self.visit(engine, world, child)?;
        }
        Ok(())
    }

    fn add_enum(
        &mut self,
        engine: &HashEngine,
        field: NodeIdx,
        field_scope: Option<&str>,
        encoding: &EnumEncoding,
    ) -> GeneratorResult<()> {
        let hash = engine.enum_hash(encoding)?;
        self.plan.enum_of.insert(field, hash);
        if self.plan.enum_by_hash.contains_key(&hash) {
            return Ok(());
        }
        let scope = encoding.scope_path.as_deref().or(field_scope);
        let name = class_name(scope, &encoding.name, hash);
        let ident = self.idents.register(&name)?;
        debug!("new enumeration {}", ident);
        self.plan.enum_by_hash.insert(hash, self.plan.enums.len());
        self.plan.enums.push(EnumRecord {
            hash,
            name,
            ident,
            encoding: encoding.clone(),
        });
        Ok(())
    }
}
