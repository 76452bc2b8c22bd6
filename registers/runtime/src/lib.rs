// Licensed under the Apache-2.0 license

//! Runtime support for generated register access layers.
//!
//! Generated register models are thin typed wrappers over the objects in this
//! crate. A model is bound to hardware through a [`CallbackSet`] (or an
//! [`AsyncCallbackSet`]); every field read or write goes through the codec in
//! [`field`], and aggregate writes are composed in memory before a single
//! physical write is issued.

pub mod array;
pub mod asynchronous;
pub mod bits;
pub mod cache;
pub mod callbacks;
pub mod error;
pub mod field;
pub mod memory;
pub mod register;

pub use array::{
    flat_index, index_suffix, CachedArray, FromRegister, NodeArray, RegisterArray,
    TypedRegisterArray,
};
pub use asynchronous::{
    AsyncCachedArray, AsyncCachedMemory, AsyncCachedRegister, AsyncCallbackSet, AsyncField,
    AsyncFromRegister, AsyncMemory, AsyncRegister, AsyncRegisterArray, AsyncTypedRegisterArray,
};
pub use bits::{reverse_bits, reverse_bits_wide};
pub use cache::{CacheLock, CacheOptions};
pub use callbacks::{BlockTransfer, CallbackSet};
pub use error::{RalError, RalResult};
pub use field::{
    Access, EnumDef, EnumEntry, EnumMember, FieldEnum, FieldGeometry, FieldSpec, FieldValue,
};
pub use memory::{Memory, MemorySpec, TypedBuffer};
pub use register::{CachedRegister, Field, FieldValues, Register, RegisterSpec, WriteMask};
