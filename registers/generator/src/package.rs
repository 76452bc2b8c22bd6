// Licensed under the Apache-2.0 license

//! Renders a generated package and writes it to disk.

use crate::config::ExportConfig;
use crate::error::GeneratorResult;
use crate::output::ModelEmitter;
use crate::scaffold::PackageEmitter;
use crate::unique::ExportPlan;
use anyhow::{Context, Result};
use ral_model::World;
use std::path::{Path, PathBuf};

/// A rendered package: relative paths and file contents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub files: Vec<(PathBuf, String)>,
}

impl Package {
    pub fn file(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(p, _)| p == Path::new(path))
            .map(|(_, contents)| contents.as_str())
    }

    /// Writes every file below `<out>/<name>` and returns that directory.
    pub fn write(&self, out: &Path) -> Result<PathBuf> {
        let root = out.join(&self.name);
        for (path, contents) in &self.files {
            let path = root.join(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(&path, contents)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(root)
    }
}

/// Renders every file of the package. Pure: nothing touches the disk.
pub fn render(world: &World, plan: &ExportPlan, config: &ExportConfig) -> GeneratorResult<Package> {
    let model = ModelEmitter::new(world, plan, config);
    let scaffold = PackageEmitter::new(world, plan, config);
    let top = scaffold.top_module();

    let mut files = vec![
        (PathBuf::from("Cargo.toml"), scaffold.cargo_toml()),
        (PathBuf::from("src/lib.rs"), scaffold.lib_rs()),
        (
            PathBuf::from("src/reg_model/mod.rs"),
            scaffold.reg_model_mod_rs(),
        ),
        (
            PathBuf::from(format!("src/reg_model/{top}.rs")),
            model.render()?,
        ),
        (PathBuf::from("src/sim.rs"), scaffold.sim_rs()?),
        (PathBuf::from("demos/demo.rs"), scaffold.demo_rs()?),
    ];
    if !config.skip_test_case_generation {
        let (mod_rs, modules) = scaffold.tests()?;
        files.push((PathBuf::from("src/tests/mod.rs"), mod_rs));
        for (module, contents) in modules {
            files.push((PathBuf::from(format!("src/tests/{module}.rs")), contents));
        }
    }
    Ok(Package {
        name: scaffold.package_name(),
        files,
    })
}
