// Licensed under the Apache-2.0 license

//! Register access layer generator.
//!
//! Takes an elaborated register tree ([`ral_model::World`]) and produces a
//! Cargo package with a typed register model over `ral-runtime`, a simulator
//! preload, generated tests and a demo program.
//!
//! ```text
//! World ──► HashEngine ──► build_plan ──► ExportPlan ──► render ──► Package
//!           (hash)         (unique)                      (output,    (write)
//!                                                         scaffold)
//! ```
//!
//! Structurally identical nodes share one generated type. The type name
//! embeds the structural hash, so with the default SHA-256 hash repeated
//! exports of the same tree produce identical sources.

pub mod config;
pub mod error;
pub mod hash;
pub mod hide;
pub mod names;
pub mod output;
pub mod package;
pub mod scaffold;
pub mod unique;
pub mod util;

pub use config::{ExportConfig, HideConfig, RuntimeSource};
pub use error::{GeneratorError, GeneratorResult};
pub use hash::{ClassHash, HashAlgorithm, HashEngine, HashItem};
pub use hide::{HideFilter, HidePredicate};
pub use package::Package;
pub use unique::{build_plan, EnumRecord, ExportPlan, UniqueRecord};

use anyhow::Result;
use log::info;
use ral_model::World;
use std::path::{Path, PathBuf};

/// Outcome of one export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSummary {
    pub package: PathBuf,
    pub types: usize,
    pub enums: usize,
    pub files: usize,
}

/// Hashes, deduplicates and renders `world` without writing anything.
pub fn generate(
    world: &World,
    config: &ExportConfig,
    hide: Option<HidePredicate>,
) -> GeneratorResult<(ExportPlan, Package)> {
    config.validate()?;
    let mut filter = HideFilter::new(&config.hide)?;
    if let Some(predicate) = hide {
        filter = filter.with_predicate(predicate);
    }
    let mut engine = HashEngine::with_filter(world, config, filter);
    let plan = build_plan(&mut engine)?;
    let package = package::render(world, &plan, config)?;
    Ok((plan, package))
}

/// Generates the package for `world` below `out`.
pub fn export(world: &World, config: &ExportConfig, out: &Path) -> Result<ExportSummary> {
    let (plan, package) = generate(world, config, None)?;
    let root = package.write(out)?;
    let summary = ExportSummary {
        package: root,
        types: plan.records().len(),
        enums: plan.enums().len(),
        files: package.files.len(),
    };
    info!(
        "exported {} to {}: {} types, {} enumerations, {} files",
        world.top_node().inst_name,
        summary.package.display(),
        summary.types,
        summary.enums,
        summary.files
    );
    Ok(summary)
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
