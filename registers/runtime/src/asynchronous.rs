// Licensed under the Apache-2.0 license

//! Async flavour of the access layer. Codec and composition are shared with
//! the blocking types; only the physical accesses are awaited.

use crate::array::{flat_index, index_suffix, unflatten_index};
use crate::bits::value_mask;
use crate::cache::{verify_words, CacheGuard, CacheLock, CacheOptions};
use crate::callbacks::BlockTransfer;
use crate::error::{RalError, RalResult};
use crate::field::{FieldEnum, FieldSpec, FieldValue};
use crate::memory::{MemorySpec, TypedBuffer};
use crate::register::{FieldValues, RegisterSpec};
use async_trait::async_trait;
use log::trace;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// Awaitable counterpart of [`crate::CallbackSet`].
#[async_trait]
pub trait AsyncCallbackSet: Send + Sync {
    async fn read(&self, address: u64, width: u32, accesswidth: u32) -> RalResult<u64> {
        let _ = (width, accesswidth);
        Err(RalError::MissingCallback {
            operation: "read",
            address,
        })
    }

    async fn write(&self, address: u64, width: u32, accesswidth: u32, data: u64) -> RalResult<()> {
        let _ = (width, accesswidth, data);
        Err(RalError::MissingCallback {
            operation: "write",
            address,
        })
    }

    async fn read_block(
        &self,
        address: u64,
        width: u32,
        accesswidth: u32,
        length: usize,
    ) -> RalResult<Vec<u64>> {
        let _ = (width, accesswidth, length);
        Err(RalError::MissingCallback {
            operation: "block read",
            address,
        })
    }

    async fn write_block(
        &self,
        address: u64,
        width: u32,
        accesswidth: u32,
        data: &[u64],
    ) -> RalResult<()> {
        let _ = (width, accesswidth, data);
        Err(RalError::MissingCallback {
            operation: "block write",
            address,
        })
    }

    fn supports_block_read(&self) -> bool {
        false
    }

    fn supports_block_write(&self) -> bool {
        false
    }
}

impl BlockTransfer {
    pub async fn read_async(&self, callbacks: &dyn AsyncCallbackSet) -> RalResult<Vec<u64>> {
        if self.entries == 0 {
            return Ok(Vec::new());
        }
        if callbacks.supports_block_read() && self.is_contiguous() {
            trace!("block read {:#x} x{}", self.address, self.entries);
            let data = callbacks
                .read_block(self.address, self.width, self.accesswidth, self.entries)
                .await?;
            if data.len() != self.entries {
                return Err(RalError::LengthMismatch {
                    expected: self.entries,
                    actual: data.len(),
                });
            }
            return Ok(data);
        }
        let mut data = Vec::with_capacity(self.entries);
        for i in 0..self.entries {
            let address = self.entry_address(i);
            trace!("read {:#x}", address);
            data.push(callbacks.read(address, self.width, self.accesswidth).await?);
        }
        Ok(data)
    }

    pub async fn write_async(&self, callbacks: &dyn AsyncCallbackSet, data: &[u64]) -> RalResult<()> {
        if data.len() != self.entries {
            return Err(RalError::LengthMismatch {
                expected: self.entries,
                actual: data.len(),
            });
        }
        if data.is_empty() {
            return Ok(());
        }
        if callbacks.supports_block_write() && self.is_contiguous() {
            trace!("block write {:#x} x{}", self.address, self.entries);
            return callbacks
                .write_block(self.address, self.width, self.accesswidth, data)
                .await;
        }
        for (i, value) in data.iter().enumerate() {
            let address = self.entry_address(i);
            trace!("write {:#x} <- {:#x}", address, value);
            callbacks
                .write(address, self.width, self.accesswidth, *value)
                .await?;
        }
        Ok(())
    }

    /// Awaitable counterpart of [`BlockTransfer::read_values`].
    pub async fn read_values_async(&self, callbacks: &dyn AsyncCallbackSet) -> RalResult<Vec<u128>> {
        self.check_widths()?;
        let mut words = Vec::with_capacity(self.entries * self.words_per_entry());
        for transfer in self.word_transfers() {
            words.extend(transfer.read_async(callbacks).await?);
        }
        Ok(self.join_entries(&words))
    }

    pub async fn write_values_async(
        &self,
        callbacks: &dyn AsyncCallbackSet,
        values: &[u128],
    ) -> RalResult<()> {
        self.check_widths()?;
        let words = self.split_entries(values)?;
        let mut rest = words.as_slice();
        for transfer in self.word_transfers() {
            let (head, tail) = rest.split_at(transfer.entries);
            transfer.write_async(callbacks, head).await?;
            rest = tail;
        }
        Ok(())
    }
}

/// Async register handle.
#[derive(Clone)]
pub struct AsyncRegister {
    spec: Arc<RegisterSpec>,
    callbacks: Arc<dyn AsyncCallbackSet>,
    lock: Arc<CacheLock>,
}

impl AsyncRegister {
    pub fn new(spec: RegisterSpec, callbacks: Arc<dyn AsyncCallbackSet>) -> Self {
        Self {
            spec: Arc::new(spec),
            callbacks,
            lock: CacheLock::new(),
        }
    }

    pub(crate) fn with_lock(
        spec: RegisterSpec,
        callbacks: Arc<dyn AsyncCallbackSet>,
        lock: Arc<CacheLock>,
    ) -> Self {
        Self {
            spec: Arc::new(spec),
            callbacks,
            lock,
        }
    }

    pub fn spec(&self) -> &RegisterSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn address(&self) -> u64 {
        self.spec.address
    }

    pub fn width(&self) -> u32 {
        self.spec.width
    }

    pub fn field(&self, name: &str) -> RalResult<AsyncField> {
        let index = self
            .spec
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| RalError::UnknownField {
                register: self.spec.name.clone(),
                field: name.to_string(),
            })?;
        Ok(AsyncField {
            register: self.clone(),
            index,
        })
    }

    pub fn field_at(&self, index: usize) -> AsyncField {
        debug_assert!(index < self.spec.fields.len());
        AsyncField {
            register: self.clone(),
            index,
        }
    }

    async fn physical_read(&self) -> RalResult<u128> {
        let spec = &self.spec;
        if spec.is_wide() {
            let words = spec.sub_words().read_async(self.callbacks.as_ref()).await?;
            return Ok(spec.join_words(&words));
        }
        trace!("read {} @ {:#x}", spec.name, spec.address);
        self.callbacks
            .read(spec.address, spec.width, spec.accesswidth)
            .await
            .map(u128::from)
    }

    async fn physical_write(&self, value: u128) -> RalResult<()> {
        let spec = &self.spec;
        if spec.is_wide() {
            return spec
                .sub_words()
                .write_async(self.callbacks.as_ref(), &spec.split_words(value))
                .await;
        }
        trace!("write {} @ {:#x} <- {:#x}", spec.name, spec.address, value);
        let word = spec.to_word(value)?;
        self.callbacks
            .write(spec.address, spec.width, spec.accesswidth, word)
            .await
    }

    pub async fn read(&self) -> RalResult<u128> {
        self.spec.check_readable()?;
        self.physical_read().await
    }

    pub async fn write(&self, value: u128) -> RalResult<()> {
        self.spec.check_writable()?;
        self.spec.check_value(value)?;
        self.physical_write(value).await
    }

    pub async fn read_fields(&self) -> RalResult<FieldValues> {
        let snapshot = self.read().await?;
        self.spec.decode_fields(snapshot)
    }

    pub async fn write_fields(&self, args: &[(&str, FieldValue)]) -> RalResult<()> {
        let prepared = self.spec.prepare_write(args)?;
        self.spec.check_complete(args)?;
        let base = if self.spec.readable() {
            self.physical_read().await?
        } else {
            0
        };
        self.physical_write(prepared.apply(base)).await
    }

    /// Opens a cached session; the snapshot is written back by
    /// [`AsyncCachedRegister::finish`]. Dropping the session discards it.
    pub async fn cached(&self, options: CacheOptions) -> RalResult<AsyncCachedRegister> {
        let guard = self.lock.acquire(&self.spec.name)?;
        if options.verify {
            self.spec.check_readable()?;
        }
        let value = if self.spec.readable() {
            self.physical_read().await?
        } else {
            self.spec.reset_value()
        };
        Ok(AsyncCachedRegister {
            register: self.clone(),
            options,
            value,
            _guard: guard,
        })
    }
}

#[must_use = "the snapshot is only written back by `finish`"]
pub struct AsyncCachedRegister {
    register: AsyncRegister,
    options: CacheOptions,
    value: u128,
    _guard: CacheGuard,
}

impl AsyncCachedRegister {
    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn set_value(&mut self, value: u128) -> RalResult<()> {
        self.register.spec.check_value(value)?;
        self.value = value;
        Ok(())
    }

    pub fn read_fields(&self) -> RalResult<FieldValues> {
        self.register.spec.decode_fields(self.value)
    }

    pub fn write_fields(&mut self, args: &[(&str, FieldValue)]) -> RalResult<()> {
        self.value = self.register.spec.compose_write(self.value, args)?;
        Ok(())
    }

    pub async fn finish(self) -> RalResult<()> {
        if self.options.skip_write {
            return Ok(());
        }
        self.register.write(self.value).await?;
        if self.options.verify {
            let actual = self.register.physical_read().await?;
            verify_words(self.register.address(), 0, &[self.value], &[actual])?;
        }
        Ok(())
    }
}

/// One field of an [`AsyncRegister`].
#[derive(Clone)]
pub struct AsyncField {
    register: AsyncRegister,
    index: usize,
}

impl AsyncField {
    pub fn spec(&self) -> &FieldSpec {
        &self.register.spec.fields[self.index]
    }

    pub fn register(&self) -> &AsyncRegister {
        &self.register
    }

    fn check_readable(&self) -> RalResult<()> {
        if self.spec().access.readable() {
            return Ok(());
        }
        Err(RalError::AccessDenied {
            name: format!("{}.{}", self.register.name(), self.spec().name),
            operation: "read",
        })
    }

    pub async fn read(&self) -> RalResult<u128> {
        self.check_readable()?;
        let raw = self.register.physical_read().await?;
        self.spec().geometry.decode(raw, self.register.width())
    }

    pub async fn read_value(&self) -> RalResult<FieldValue> {
        self.check_readable()?;
        let raw = self.register.physical_read().await?;
        self.spec().decode(raw, self.register.width())
    }

    pub async fn write(&self, value: impl Into<FieldValue>) -> RalResult<()> {
        let name = self.spec().name.clone();
        self.register
            .write_fields(&[(name.as_str(), value.into())])
            .await
    }

    pub async fn read_enum<E: FieldEnum>(&self) -> RalResult<E> {
        let value = self.read().await?;
        let member = u64::try_from(value).ok().and_then(E::from_value);
        member.ok_or_else(|| RalError::NotEnumMember {
            enum_name: E::ENUM_NAME.to_string(),
            value,
        })
    }

    pub async fn write_enum<E: FieldEnum>(&self, value: E) -> RalResult<()> {
        self.write(value.into_value()).await
    }
}

/// Async register array.
#[derive(Clone)]
pub struct AsyncRegisterArray {
    spec: Arc<RegisterSpec>,
    dimensions: Vec<usize>,
    stride: u64,
    callbacks: Arc<dyn AsyncCallbackSet>,
    lock: Arc<CacheLock>,
    element_locks: Arc<Vec<Arc<CacheLock>>>,
}

impl AsyncRegisterArray {
    pub fn new(
        spec: RegisterSpec,
        dimensions: Vec<usize>,
        stride: u64,
        callbacks: Arc<dyn AsyncCallbackSet>,
    ) -> Self {
        let lock = CacheLock::new();
        let len = dimensions.iter().product();
        let element_locks = (0..len).map(|_| CacheLock::child(&lock)).collect();
        Self {
            spec: Arc::new(spec),
            dimensions,
            stride,
            callbacks,
            lock,
            element_locks: Arc::new(element_locks),
        }
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.dimensions.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spec(&self) -> &RegisterSpec {
        &self.spec
    }

    fn element(&self, flat: usize) -> AsyncRegister {
        let index = unflatten_index(flat, &self.dimensions);
        let name = format!("{}{}", self.spec.name, index_suffix(&index));
        AsyncRegister::with_lock(
            self.spec
                .at(self.spec.address + flat as u64 * self.stride, name),
            self.callbacks.clone(),
            self.element_locks[flat].clone(),
        )
    }

    pub fn get(&self, index: &[usize]) -> RalResult<AsyncRegister> {
        Ok(self.element(flat_index(index, &self.dimensions)?))
    }

    fn transfer(&self) -> BlockTransfer {
        BlockTransfer {
            address: self.spec.address,
            width: self.spec.width,
            accesswidth: self.spec.accesswidth,
            entries: self.len(),
            stride: self.stride,
        }
    }

    async fn physical_read_all(&self) -> RalResult<Vec<u128>> {
        self.transfer()
            .read_values_async(self.callbacks.as_ref())
            .await
    }

    pub async fn read_all(&self) -> RalResult<Vec<u128>> {
        self.spec.check_readable()?;
        self.physical_read_all().await
    }

    pub async fn write_all(&self, values: &[u128]) -> RalResult<()> {
        self.spec.check_writable()?;
        if values.len() != self.len() {
            return Err(RalError::LengthMismatch {
                expected: self.len(),
                actual: values.len(),
            });
        }
        for value in values {
            self.spec.check_value(*value)?;
        }
        self.transfer()
            .write_values_async(self.callbacks.as_ref(), values)
            .await
    }

    pub async fn read_fields_all(&self) -> RalResult<Vec<FieldValues>> {
        self.read_all()
            .await?
            .into_iter()
            .map(|raw| self.spec.decode_fields(raw))
            .collect()
    }

    pub async fn read_typed(&self) -> RalResult<TypedBuffer> {
        Ok(TypedBuffer::from_words(
            self.spec.width,
            &self.read_all().await?,
        ))
    }

    pub async fn write_typed(&self, buffer: &TypedBuffer) -> RalResult<()> {
        self.write_all(&buffer.to_words()).await
    }

    pub async fn cached(&self, options: CacheOptions) -> RalResult<AsyncCachedArray> {
        let guard = self.lock.acquire(&self.spec.name)?;
        if options.verify {
            self.spec.check_readable()?;
        }
        let values = if self.spec.readable() {
            self.physical_read_all().await?
        } else {
            vec![self.spec.reset_value(); self.len()]
        };
        Ok(AsyncCachedArray {
            array: self.clone(),
            options,
            values,
            _guard: guard,
        })
    }
}

#[must_use = "the snapshot is only written back by `finish`"]
pub struct AsyncCachedArray {
    array: AsyncRegisterArray,
    options: CacheOptions,
    values: Vec<u128>,
    _guard: CacheGuard,
}

impl AsyncCachedArray {
    pub fn values(&self) -> &[u128] {
        &self.values
    }

    pub fn get(&self, index: &[usize]) -> RalResult<u128> {
        Ok(self.values[flat_index(index, &self.array.dimensions)?])
    }

    pub fn set(&mut self, index: &[usize], value: u128) -> RalResult<()> {
        let flat = flat_index(index, &self.array.dimensions)?;
        self.array.spec.check_value(value)?;
        self.values[flat] = value;
        Ok(())
    }

    pub fn read_fields(&self, index: &[usize]) -> RalResult<FieldValues> {
        self.array.spec.decode_fields(self.get(index)?)
    }

    pub fn write_fields(&mut self, index: &[usize], args: &[(&str, FieldValue)]) -> RalResult<()> {
        let flat = flat_index(index, &self.array.dimensions)?;
        self.values[flat] = self.array.spec.compose_write(self.values[flat], args)?;
        Ok(())
    }

    pub async fn finish(self) -> RalResult<()> {
        if self.options.skip_write {
            return Ok(());
        }
        self.array.write_all(&self.values).await?;
        if self.options.verify {
            let actual = self.array.physical_read_all().await?;
            verify_words(
                self.array.spec.address,
                self.array.stride,
                &self.values,
                &actual,
            )?;
        }
        Ok(())
    }
}

/// Async memory handle.
#[derive(Clone)]
pub struct AsyncMemory {
    spec: Arc<MemorySpec>,
    callbacks: Arc<dyn AsyncCallbackSet>,
    lock: Arc<CacheLock>,
}

impl AsyncMemory {
    pub fn new(spec: MemorySpec, callbacks: Arc<dyn AsyncCallbackSet>) -> Self {
        Self {
            spec: Arc::new(spec),
            callbacks,
            lock: CacheLock::new(),
        }
    }

    pub fn spec(&self) -> &MemorySpec {
        &self.spec
    }

    pub fn entries(&self) -> u64 {
        self.spec.entries
    }

    fn transfer(&self, start: u64, count: usize) -> RalResult<BlockTransfer> {
        if start.saturating_add(count as u64) > self.spec.entries {
            return Err(RalError::IndexOutOfRange {
                index: vec![start as usize, count],
                dimensions: vec![self.spec.entries as usize],
            });
        }
        Ok(BlockTransfer::contiguous(
            self.spec.address + start * self.spec.entry_bytes(),
            self.spec.width,
            self.spec.accesswidth,
            count,
        ))
    }

    fn denied(&self, operation: &'static str) -> RalError {
        RalError::AccessDenied {
            name: self.spec.name.clone(),
            operation,
        }
    }

    pub async fn read(&self, start: u64, count: usize) -> RalResult<Vec<u128>> {
        if !self.spec.access.readable() {
            return Err(self.denied("read"));
        }
        self.transfer(start, count)?
            .read_values_async(self.callbacks.as_ref())
            .await
    }

    pub async fn write(&self, start: u64, data: &[u128]) -> RalResult<()> {
        if !self.spec.access.writable() {
            return Err(self.denied("write"));
        }
        let transfer = self.transfer(start, data.len())?;
        let max = value_mask(self.spec.width);
        if let Some(value) = data.iter().find(|v| **v > max) {
            return Err(RalError::TooLarge { value: *value, max });
        }
        transfer
            .write_values_async(self.callbacks.as_ref(), data)
            .await
    }

    pub async fn read_entry(&self, index: u64) -> RalResult<u128> {
        Ok(self.read(index, 1).await?[0])
    }

    pub async fn write_entry(&self, index: u64, value: u128) -> RalResult<()> {
        self.write(index, &[value]).await
    }

    pub async fn read_typed(&self, start: u64, count: usize) -> RalResult<TypedBuffer> {
        Ok(TypedBuffer::from_words(
            self.spec.width,
            &self.read(start, count).await?,
        ))
    }

    pub async fn write_typed(&self, start: u64, buffer: &TypedBuffer) -> RalResult<()> {
        self.write(start, &buffer.to_words()).await
    }

    pub async fn cached(
        &self,
        options: CacheOptions,
        start: u64,
        count: usize,
    ) -> RalResult<AsyncCachedMemory> {
        let guard = self.lock.acquire(&self.spec.name)?;
        let transfer = self.transfer(start, count)?;
        if options.verify && !self.spec.access.readable() {
            return Err(self.denied("read"));
        }
        let values = if self.spec.access.readable() {
            transfer.read_values_async(self.callbacks.as_ref()).await?
        } else {
            vec![0; count]
        };
        Ok(AsyncCachedMemory {
            memory: self.clone(),
            options,
            start,
            values,
            _guard: guard,
        })
    }
}

#[must_use = "the snapshot is only written back by `finish`"]
pub struct AsyncCachedMemory {
    memory: AsyncMemory,
    options: CacheOptions,
    start: u64,
    values: Vec<u128>,
    _guard: CacheGuard,
}

impl AsyncCachedMemory {
    pub fn values(&self) -> &[u128] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [u128] {
        &mut self.values
    }

    pub async fn finish(self) -> RalResult<()> {
        if self.options.skip_write {
            return Ok(());
        }
        self.memory.write(self.start, &self.values).await?;
        if self.options.verify {
            let actual = self
                .memory
                .transfer(self.start, self.values.len())?
                .read_values_async(self.memory.callbacks.as_ref())
                .await?;
            let spec = &self.memory.spec;
            verify_words(
                spec.address + self.start * spec.entry_bytes(),
                spec.entry_bytes(),
                &self.values,
                &actual,
            )?;
        }
        Ok(())
    }
}

/// Async counterpart of [`crate::FromRegister`].
pub trait AsyncFromRegister {
    fn from_register(register: AsyncRegister) -> Self;
}

/// Async register array handing out generated register types.
#[derive(Clone)]
pub struct AsyncTypedRegisterArray<R> {
    array: AsyncRegisterArray,
    marker: PhantomData<fn() -> R>,
}

impl<R: AsyncFromRegister> AsyncTypedRegisterArray<R> {
    pub fn new(array: AsyncRegisterArray) -> Self {
        Self {
            array,
            marker: PhantomData,
        }
    }

    pub fn get(&self, index: &[usize]) -> RalResult<R> {
        self.array.get(index).map(R::from_register)
    }

    pub fn iter(&self) -> impl Iterator<Item = R> + '_ {
        (0..self.array.len()).map(|flat| R::from_register(self.array.element(flat)))
    }

    pub fn array(&self) -> &AsyncRegisterArray {
        &self.array
    }
}

impl<R> Deref for AsyncTypedRegisterArray<R> {
    type Target = AsyncRegisterArray;

    fn deref(&self) -> &AsyncRegisterArray {
        &self.array
    }
}
