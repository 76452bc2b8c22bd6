// Licensed under the Apache-2.0 license

//! Export configuration.
//!
//! ```toml
//! udp = ["secure"]
//! hash_algorithm = "sha256"
//! asynchronous = false
//!
//! [hide]
//! honor_ral_hide = true
//! patterns = ['.*\.debug_.*']
//!
//! [runtime]
//! path = "../registers"
//! ```

use crate::error::{GeneratorError, GeneratorResult};
use crate::hash::HashAlgorithm;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Property hiding a node and its subtree from the generated model.
pub const HIDE_PROPERTY: &str = "ral_hide";

/// Property overriding the accessor name of a node.
pub const INST_NAME_PROPERTY: &str = "ral_inst_name";

/// Properties consumed by the generator itself. They never take part in a
/// structural hash.
pub const RESERVED_PROPERTIES: [&str; 2] = [HIDE_PROPERTY, INST_NAME_PROPERTY];

//=============================================================================
// Sub-configurations
//=============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HideConfig {
    /// Hide nodes whose `ral_hide` property is true.
    pub honor_ral_hide: bool,
    /// Regular expressions matched against the full dotted path of a node.
    pub patterns: Vec<String>,
}

impl Default for HideConfig {
    fn default() -> Self {
        Self {
            honor_ral_hide: true,
            patterns: Vec::new(),
        }
    }
}

/// Where the generated package finds `ral-runtime` and `ral-sim`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeSource {
    /// Directory holding the `runtime` and `sim` crates.
    Path(PathBuf),
    /// Registry version requirement.
    Version(String),
}

impl Default for RuntimeSource {
    fn default() -> Self {
        RuntimeSource::Version(env!("CARGO_PKG_VERSION").to_string())
    }
}

//=============================================================================
// ExportConfig
//=============================================================================

/// Everything that shapes one export besides the register tree itself.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// User-defined properties folded into hashes and emitted as constants.
    pub udp: Vec<String>,
    pub hide: HideConfig,
    pub hash_algorithm: HashAlgorithm,
    /// Fold `name` and `desc` into structural hashes.
    pub include_name_and_desc: bool,
    /// Emit async accessors over `AsyncCallbackSet`.
    pub asynchronous: bool,
    /// Block accessors take and return `TypedBuffer` instead of `Vec<u64>`.
    pub legacy_block_access: bool,
    pub skip_test_case_generation: bool,
    /// Name of the generated Cargo package, defaults to `<top>_ral`.
    pub package_name: Option<String>,
    pub runtime: RuntimeSource,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            udp: Vec::new(),
            hide: HideConfig::default(),
            hash_algorithm: HashAlgorithm::default(),
            include_name_and_desc: true,
            asynchronous: false,
            legacy_block_access: false,
            skip_test_case_generation: false,
            package_name: None,
            runtime: RuntimeSource::default(),
        }
    }
}

impl ExportConfig {
    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str, path: &Path) -> GeneratorResult<Self> {
        let config: Self = toml::from_str(text).map_err(|source| GeneratorError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> GeneratorResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| GeneratorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Rejects user-defined property lists naming a reserved property.
    pub fn validate(&self) -> GeneratorResult<()> {
        match self
            .udp
            .iter()
            .find(|u| RESERVED_PROPERTIES.contains(&u.as_str()))
        {
            Some(reserved) => Err(GeneratorError::ReservedProperty(reserved.clone())),
            None => Ok(()),
        }
    }

    pub fn add_udp(mut self, name: &str) -> Self {
        if !self.udp.iter().any(|u| u == name) {
            self.udp.push(name.to_string());
        }
        self
    }

    pub fn hide_pattern(mut self, pattern: &str) -> Self {
        self.hide.patterns.push(pattern.to_string());
        self
    }

    pub fn ignore_hide_property(mut self) -> Self {
        self.hide.honor_ral_hide = false;
        self
    }

    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn without_name_and_desc(mut self) -> Self {
        self.include_name_and_desc = false;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    pub fn legacy_block_access(mut self) -> Self {
        self.legacy_block_access = true;
        self
    }

    pub fn skip_tests(mut self) -> Self {
        self.skip_test_case_generation = true;
        self
    }

    pub fn package_name(mut self, name: &str) -> Self {
        self.package_name = Some(name.to_string());
        self
    }

    pub fn runtime_path(mut self, path: &Path) -> Self {
        self.runtime = RuntimeSource::Path(path.to_path_buf());
        self
    }
}
