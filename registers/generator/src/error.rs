// Licensed under the Apache-2.0 license

use ral_model::{ModelError, NodeKind};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an export. All of them mean the generated code would
/// be wrong, so none is recovered from.
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("{path}: {kind:?} nodes have no generated type")]
    UnsupportedKind { path: String, kind: NodeKind },

    #[error("{path}: hide predicate changed its answer during the export")]
    InconsistentHidePredicate { path: String },

    #[error("hash {hash:#x} is named {existing} but {path} computes {computed}")]
    NameMismatch {
        hash: i64,
        path: String,
        existing: String,
        computed: String,
    },

    #[error("identifier {ident} is produced by both {first} and {second}")]
    ClassNameCollision {
        ident: String,
        first: String,
        second: String,
    },

    #[error("{path}: no generated type recorded")]
    MissingClass { path: String },

    #[error("{path}: two element field hash input {items} is not a plain field")]
    MalformedSentinel { path: String, items: String },

    #[error("property {0} is reserved by the generator")]
    ReservedProperty(String),

    #[error("invalid hide pattern {pattern}")]
    InvalidHidePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("the export root {0} is hidden")]
    TopHidden(String),

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("failed to serialize hash input")]
    Serialize(#[from] serde_json::Error),
}

pub type GeneratorResult<T> = std::result::Result<T, GeneratorError>;
