// Licensed under the Apache-2.0 license

use crate::types::NodeKind;
use ral_runtime::RalError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or querying a compiled register tree.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed register tree")]
    Json(#[from] serde_json::Error),

    #[error("{path}: missing attribute {attribute}")]
    MissingAttribute {
        path: String,
        attribute: &'static str,
    },

    #[error("{path}: invalid field bits")]
    InvalidGeometry {
        path: String,
        #[source]
        source: RalError,
    },

    #[error("{path}: invalid {what} {width}")]
    InvalidWidth {
        path: String,
        what: &'static str,
        width: u32,
    },

    #[error("{path}: {child:?} cannot be placed in {parent:?}")]
    IllegalChild {
        path: String,
        parent: NodeKind,
        child: NodeKind,
    },

    #[error("{path}: bit {high} does not fit a {regwidth} bit register")]
    FieldOutOfRange {
        path: String,
        high: u32,
        regwidth: u32,
    },

    #[error("{path}: overlaps field {other}")]
    FieldOverlap { path: String, other: String },

    #[error("{path}: register has no fields")]
    EmptyRegister { path: String },

    #[error("{path}: value {value:#x} does not fit in {width} bits")]
    ValueTooLarge { path: String, value: u64, width: u32 },

    #[error("{path}: invalid array {reason}")]
    InvalidArray { path: String, reason: String },

    #[error("root node must be an addrmap, found {0:?}")]
    RootNotAddrMap(NodeKind),

    #[error("no node at path {0}")]
    NotFound(String),
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
