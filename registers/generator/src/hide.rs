// Licensed under the Apache-2.0 license

//! Decides which nodes stay out of the generated model.

use crate::config::{HideConfig, HIDE_PROPERTY};
use crate::error::{GeneratorError, GeneratorResult};
use ral_model::{NodeIdx, NodeKind, World};
use regex::Regex;
use std::collections::HashMap;

/// Caller supplied predicate, consulted after the property and the patterns.
pub type HidePredicate = Box<dyn Fn(&World, NodeIdx) -> bool>;

/// Hide predicate for one export.
///
/// Every answer is remembered. The predicate is re-evaluated on each query and
/// a different answer for a node already asked about aborts the export: two
/// parts of the generated code would otherwise disagree about the node.
pub struct HideFilter {
    honor_property: bool,
    patterns: Vec<Regex>,
    custom: Option<HidePredicate>,
    answers: HashMap<NodeIdx, bool>,
}

impl HideFilter {
    pub fn new(config: &HideConfig) -> GeneratorResult<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{p})$")).map_err(|source| {
                    GeneratorError::InvalidHidePattern {
                        pattern: p.clone(),
                        source,
                    }
                })
            })
            .collect::<GeneratorResult<Vec<_>>>()?;
        Ok(Self {
            honor_property: config.honor_ral_hide,
            patterns,
            custom: None,
            answers: HashMap::new(),
        })
    }

    pub fn with_predicate(mut self, predicate: HidePredicate) -> Self {
        self.custom = Some(predicate);
        self
    }

    fn evaluate(&self, world: &World, idx: NodeIdx) -> bool {
        let node = world.node(idx);
        if self.honor_property
            && node
                .property(HIDE_PROPERTY)
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        {
            return true;
        }
        if !self.patterns.is_empty() {
            let path = world.path(idx);
            if self.patterns.iter().any(|p| p.is_match(&path)) {
                return true;
            }
        }
        self.custom.as_ref().is_some_and(|f| f(world, idx))
    }

    /// True when the node is left out of the model. Signals are always
    /// hidden and a register with no visible field is hidden as well.
    pub fn is_hidden(&mut self, world: &World, idx: NodeIdx) -> GeneratorResult<bool> {
        let node = world.node(idx);
        if node.kind == NodeKind::Signal {
            return Ok(true);
        }
        let mut hidden = self.evaluate(world, idx);
        if let Some(previous) = self.answers.get(&idx) {
            if *previous != hidden {
                return Err(GeneratorError::InconsistentHidePredicate {
                    path: world.path(idx),
                });
            }
        }
        self.answers.insert(idx, hidden);
        if !hidden && node.kind == NodeKind::Reg {
            let fields: Vec<NodeIdx> = world
                .children_of_kind(idx, NodeKind::Field)
                .map(|f| f.idx)
                .collect();
            let mut any_visible = false;
            for field in fields {
                any_visible |= !self.is_hidden(world, field)?;
            }
            hidden = !any_visible;
        }
        Ok(hidden)
    }

    /// Direct children that appear in the model, in declaration order.
    pub fn visible_children(
        &mut self,
        world: &World,
        idx: NodeIdx,
    ) -> GeneratorResult<Vec<NodeIdx>> {
        let mut visible = Vec::new();
        for child in world.node(idx).children.clone() {
            if !self.is_hidden(world, child)? {
                visible.push(child);
            }
        }
        Ok(visible)
    }
}
