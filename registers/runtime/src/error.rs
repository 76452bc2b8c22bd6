// Licensed under the Apache-2.0 license

use thiserror::Error;

/// Errors raised by the register access layer.
///
/// Validation errors are raised before any physical access is issued, so a
/// failed `write_fields` or cached session never leaves a partial write behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RalError {
    #[error("value {value} is negative")]
    Negative { value: i128 },

    #[error("value {value:#x} exceeds the maximum of {max:#x}")]
    TooLarge { value: u128, max: u128 },

    #[error("invalid field geometry: {0}")]
    InvalidGeometry(String),

    #[error("value {value:#x} is not a member of enumeration {enum_name}")]
    NotEnumMember { enum_name: String, value: u128 },

    #[error("field {field} expects {expected}, got {actual}")]
    WrongType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("write_fields on {register} called without any field")]
    NoFieldArguments { register: String },

    #[error("{register} has no field named {field}")]
    UnknownField { register: String, field: String },

    #[error("write-only register {register} requires every field, missing {missing:?}")]
    MissingFields {
        register: String,
        missing: Vec<String>,
    },

    #[error("{name} does not permit {operation}")]
    AccessDenied {
        name: String,
        operation: &'static str,
    },

    #[error("no {operation} callback available for address {address:#x}")]
    MissingCallback {
        operation: &'static str,
        address: u64,
    },

    #[error("bus error at {address:#x}: {reason}")]
    Bus { address: u64, reason: String },

    #[error("read back {actual:#x} from {address:#x} after writing {expected:#x}")]
    VerifyMismatch {
        address: u64,
        expected: u128,
        actual: u128,
    },

    #[error("a cached access session is already open on {name}")]
    CachedAccessActive { name: String },

    #[error("index {index:?} out of range for dimensions {dimensions:?}")]
    IndexOutOfRange {
        index: Vec<usize>,
        dimensions: Vec<usize>,
    },

    #[error("{width} bit {kind} exceeds the supported maximum of {max} bits")]
    TooWide {
        kind: &'static str,
        width: u32,
        max: u32,
    },

    #[error("expected {expected} entries, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

pub type RalResult<T> = std::result::Result<T, RalError>;
