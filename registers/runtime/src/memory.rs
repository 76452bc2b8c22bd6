// Licensed under the Apache-2.0 license

//! Memories and the width-typed block buffers used by legacy block accessors.

use crate::bits::{bits_to_words, value_mask, words_to_bits};
use crate::cache::{verify_words, CacheLock, CacheOptions};
use crate::callbacks::{entry_bytes, BlockTransfer, CallbackSet};
use crate::error::{RalError, RalResult};
use crate::field::Access;
use bit_vec::BitVec;
use std::sync::Arc;

/// Block contents stored in the narrowest unsigned type holding one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypedBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    U128(Vec<u128>),
}

impl TypedBuffer {
    /// Values wider than the chosen element type are truncated; callers pass
    /// words that already fit `width`.
    pub fn from_words(width: u32, words: &[u128]) -> Self {
        match entry_bytes(width) {
            1 => TypedBuffer::U8(words.iter().map(|w| *w as u8).collect()),
            2 => TypedBuffer::U16(words.iter().map(|w| *w as u16).collect()),
            4 => TypedBuffer::U32(words.iter().map(|w| *w as u32).collect()),
            8 => TypedBuffer::U64(words.iter().map(|w| *w as u64).collect()),
            _ => TypedBuffer::U128(words.to_vec()),
        }
    }

    pub fn to_words(&self) -> Vec<u128> {
        match self {
            TypedBuffer::U8(v) => v.iter().map(|w| u128::from(*w)).collect(),
            TypedBuffer::U16(v) => v.iter().map(|w| u128::from(*w)).collect(),
            TypedBuffer::U32(v) => v.iter().map(|w| u128::from(*w)).collect(),
            TypedBuffer::U64(v) => v.iter().map(|w| u128::from(*w)).collect(),
            TypedBuffer::U128(v) => v.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedBuffer::U8(v) => v.len(),
            TypedBuffer::U16(v) => v.len(),
            TypedBuffer::U32(v) => v.len(),
            TypedBuffer::U64(v) => v.len(),
            TypedBuffer::U128(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bits per element of the buffer type.
    pub fn element_width(&self) -> u32 {
        match self {
            TypedBuffer::U8(_) => 8,
            TypedBuffer::U16(_) => 16,
            TypedBuffer::U32(_) => 32,
            TypedBuffer::U64(_) => 64,
            TypedBuffer::U128(_) => 128,
        }
    }
}

/// Static description of a memory. Entries wider than `accesswidth` are
/// moved as consecutive access-width sub-words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemorySpec {
    pub name: String,
    pub address: u64,
    pub entries: u64,
    pub width: u32,
    pub accesswidth: u32,
    pub access: Access,
}

impl MemorySpec {
    pub fn entry_bytes(&self) -> u64 {
        entry_bytes(self.width)
    }

    /// Byte size of the memory.
    pub fn size(&self) -> u64 {
        self.entries * self.entry_bytes()
    }
}

/// A memory bound to a set of callbacks.
#[derive(Clone)]
pub struct Memory {
    spec: Arc<MemorySpec>,
    callbacks: Arc<dyn CallbackSet>,
    lock: Arc<CacheLock>,
}

impl Memory {
    pub fn new(spec: MemorySpec, callbacks: Arc<dyn CallbackSet>) -> Self {
        Self {
            spec: Arc::new(spec),
            callbacks,
            lock: CacheLock::new(),
        }
    }

    pub fn spec(&self) -> &MemorySpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn entries(&self) -> u64 {
        self.spec.entries
    }

    pub fn width(&self) -> u32 {
        self.spec.width
    }

    pub fn callbacks(&self) -> &Arc<dyn CallbackSet> {
        &self.callbacks
    }

    fn check_range(&self, start: u64, count: usize) -> RalResult<()> {
        if start.saturating_add(count as u64) > self.spec.entries {
            return Err(RalError::IndexOutOfRange {
                index: vec![start as usize, count],
                dimensions: vec![self.spec.entries as usize],
            });
        }
        Ok(())
    }

    fn check(&self, operation: &'static str, allowed: bool) -> RalResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(RalError::AccessDenied {
                name: self.spec.name.clone(),
                operation,
            })
        }
    }

    fn transfer(&self, start: u64, count: usize) -> BlockTransfer {
        BlockTransfer::contiguous(
            self.spec.address + start * self.spec.entry_bytes(),
            self.spec.width,
            self.spec.accesswidth,
            count,
        )
    }

    fn physical_read(&self, start: u64, count: usize) -> RalResult<Vec<u128>> {
        self.check_range(start, count)?;
        self.transfer(start, count)
            .read_values(self.callbacks.as_ref())
    }

    fn physical_write(&self, start: u64, data: &[u128]) -> RalResult<()> {
        self.check_range(start, data.len())?;
        let max = value_mask(self.spec.width);
        if let Some(value) = data.iter().find(|v| **v > max) {
            return Err(RalError::TooLarge { value: *value, max });
        }
        self.transfer(start, data.len())
            .write_values(self.callbacks.as_ref(), data)
    }

    /// Reads `count` entries starting at entry `start`.
    pub fn read(&self, start: u64, count: usize) -> RalResult<Vec<u128>> {
        self.check("read", self.spec.access.readable())?;
        self.physical_read(start, count)
    }

    pub fn write(&self, start: u64, data: &[u128]) -> RalResult<()> {
        self.check("write", self.spec.access.writable())?;
        self.physical_write(start, data)
    }

    pub fn read_entry(&self, index: u64) -> RalResult<u128> {
        Ok(self.read(index, 1)?[0])
    }

    pub fn write_entry(&self, index: u64, value: u128) -> RalResult<()> {
        self.write(index, &[value])
    }

    pub fn read_typed(&self, start: u64, count: usize) -> RalResult<TypedBuffer> {
        Ok(TypedBuffer::from_words(
            self.spec.width,
            &self.read(start, count)?,
        ))
    }

    pub fn write_typed(&self, start: u64, buffer: &TypedBuffer) -> RalResult<()> {
        self.write(start, &buffer.to_words())
    }

    /// Entries `start..start + count` concatenated, entry `start` in the
    /// least significant bits.
    pub fn read_bits(&self, start: u64, count: usize) -> RalResult<BitVec> {
        Ok(words_to_bits(&self.read(start, count)?, self.spec.width))
    }

    /// Writes a concatenation of whole entries starting at `start`.
    pub fn write_bits(&self, start: u64, bits: &BitVec) -> RalResult<()> {
        let width = self.spec.width as usize;
        if bits.len() % width != 0 {
            return Err(RalError::LengthMismatch {
                expected: bits.len().div_ceil(width) * width,
                actual: bits.len(),
            });
        }
        self.write(start, &bits_to_words(bits, self.spec.width))
    }

    /// Loads entries `start..start + count` once, lets `f` edit them in memory
    /// and writes them back once unless `f` fails or `skip_write` is set.
    pub fn with_cached<T>(
        &self,
        options: CacheOptions,
        start: u64,
        count: usize,
        f: impl FnOnce(&mut [u128]) -> RalResult<T>,
    ) -> RalResult<T> {
        let _guard = self.lock.acquire(&self.spec.name)?;
        self.check_range(start, count)?;
        if options.verify {
            self.check("read", self.spec.access.readable())?;
        }
        let mut values = if self.spec.access.readable() {
            self.physical_read(start, count)?
        } else {
            vec![0; count]
        };
        let result = f(&mut values)?;
        if !options.skip_write {
            self.write(start, &values)?;
            if options.verify {
                let actual = self.physical_read(start, count)?;
                let address = self.spec.address + start * self.spec.entry_bytes();
                verify_words(address, self.spec.entry_bytes(), &values, &actual)?;
            }
        }
        Ok(result)
    }
}
