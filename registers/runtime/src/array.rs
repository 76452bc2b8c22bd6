// Licensed under the Apache-2.0 license

//! Register arrays and arrays of container nodes.

use crate::cache::{verify_words, CacheLock, CacheOptions};
use crate::callbacks::{BlockTransfer, CallbackSet};
use crate::error::{RalError, RalResult};
use crate::field::FieldValue;
use crate::memory::TypedBuffer;
use crate::register::{FieldValues, Register, RegisterSpec};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// Row-major position of `index` in an array of `dimensions`.
pub fn flat_index(index: &[usize], dimensions: &[usize]) -> RalResult<usize> {
    if index.len() != dimensions.len() || index.iter().zip(dimensions).any(|(i, d)| i >= d) {
        return Err(RalError::IndexOutOfRange {
            index: index.to_vec(),
            dimensions: dimensions.to_vec(),
        });
    }
    Ok(index
        .iter()
        .zip(dimensions)
        .fold(0, |acc, (i, d)| acc * d + i))
}

/// Inverse of [`flat_index`].
pub fn unflatten_index(mut flat: usize, dimensions: &[usize]) -> Vec<usize> {
    let mut index = vec![0; dimensions.len()];
    for (slot, d) in index.iter_mut().zip(dimensions).rev() {
        *slot = flat % d;
        flat /= d;
    }
    index
}

/// `[i][j]` suffix naming one array element.
pub fn index_suffix(index: &[usize]) -> String {
    index.iter().map(|i| format!("[{i}]")).collect()
}

/// An array of identical registers, `stride` bytes apart.
#[derive(Clone)]
pub struct RegisterArray {
    spec: Arc<RegisterSpec>,
    dimensions: Vec<usize>,
    stride: u64,
    callbacks: Arc<dyn CallbackSet>,
    lock: Arc<CacheLock>,
    /// One lock per element, nested under `lock`.
    element_locks: Arc<Vec<Arc<CacheLock>>>,
}

impl RegisterArray {
    /// `spec` describes element 0.
    pub fn new(
        spec: RegisterSpec,
        dimensions: Vec<usize>,
        stride: u64,
        callbacks: Arc<dyn CallbackSet>,
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

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn spec(&self) -> &RegisterSpec {
        &self.spec
    }

    pub(crate) fn element_spec(&self, flat: usize) -> RegisterSpec {
        let index = unflatten_index(flat, &self.dimensions);
        self.spec.at(
            self.spec.address + flat as u64 * self.stride,
            format!("{}{}", self.spec.name, index_suffix(&index)),
        )
    }

    pub fn get(&self, index: &[usize]) -> RalResult<Register> {
        Ok(self.element(flat_index(index, &self.dimensions)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = Register> + '_ {
        (0..self.len()).map(|flat| self.element(flat))
    }

    /// Handles to the same element share its lock, which is nested under the
    /// array's own.
    fn element(&self, flat: usize) -> Register {
        Register::with_lock(
            self.element_spec(flat),
            self.callbacks.clone(),
            self.element_locks[flat].clone(),
        )
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

    fn physical_read_all(&self) -> RalResult<Vec<u128>> {
        self.transfer().read_values(self.callbacks.as_ref())
    }

    fn physical_write_all(&self, values: &[u128]) -> RalResult<()> {
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
            .write_values(self.callbacks.as_ref(), values)
    }

    /// Raw values of every element, through one block read when possible.
    pub fn read_all(&self) -> RalResult<Vec<u128>> {
        self.spec.check_readable()?;
        self.physical_read_all()
    }

    pub fn write_all(&self, values: &[u128]) -> RalResult<()> {
        self.spec.check_writable()?;
        self.physical_write_all(values)
    }

    pub fn read_fields_all(&self) -> RalResult<Vec<FieldValues>> {
        self.read_all()?
            .into_iter()
            .map(|raw| self.spec.decode_fields(raw))
            .collect()
    }

    pub fn read_typed(&self) -> RalResult<TypedBuffer> {
        Ok(TypedBuffer::from_words(self.spec.width, &self.read_all()?))
    }

    pub fn write_typed(&self, buffer: &TypedBuffer) -> RalResult<()> {
        self.write_all(&buffer.to_words())
    }

    /// Loads the whole array once, runs `f` on the snapshot and writes it
    /// back once unless `f` fails or `options.skip_write` is set.
    pub fn with_cached<T>(
        &self,
        options: CacheOptions,
        f: impl FnOnce(&mut CachedArray) -> RalResult<T>,
    ) -> RalResult<T> {
        let _guard = self.lock.acquire(&self.spec.name)?;
        if options.verify {
            self.spec.check_readable()?;
        }
        let values = if self.spec.readable() {
            self.physical_read_all()?
        } else {
            vec![self.spec.reset_value(); self.len()]
        };
        let mut cached = CachedArray {
            spec: &self.spec,
            dimensions: &self.dimensions,
            values,
        };
        let result = f(&mut cached)?;
        if !options.skip_write {
            let values = cached.values;
            self.write_all(&values)?;
            if options.verify {
                let actual = self.physical_read_all()?;
                verify_words(self.spec.address, self.stride, &values, &actual)?;
            }
        }
        Ok(result)
    }
}

/// In-memory array snapshot handed out by [`RegisterArray::with_cached`].
pub struct CachedArray<'a> {
    pub(crate) spec: &'a RegisterSpec,
    pub(crate) dimensions: &'a [usize],
    pub(crate) values: Vec<u128>,
}

impl CachedArray<'_> {
    pub fn values(&self) -> &[u128] {
        &self.values
    }

    pub fn get(&self, index: &[usize]) -> RalResult<u128> {
        Ok(self.values[flat_index(index, self.dimensions)?])
    }

    pub fn set(&mut self, index: &[usize], value: u128) -> RalResult<()> {
        let flat = flat_index(index, self.dimensions)?;
        self.spec.check_value(value)?;
        self.values[flat] = value;
        Ok(())
    }

    pub fn read_fields(&self, index: &[usize]) -> RalResult<FieldValues> {
        self.spec.decode_fields(self.get(index)?)
    }

    pub fn write_fields(&mut self, index: &[usize], args: &[(&str, FieldValue)]) -> RalResult<()> {
        let flat = flat_index(index, self.dimensions)?;
        self.values[flat] = self.spec.compose_write(self.values[flat], args)?;
        Ok(())
    }
}

/// Unrolled elements of a register-file or address-map array.
#[derive(Clone, Debug)]
pub struct NodeArray<T> {
    dimensions: Vec<usize>,
    elements: Vec<T>,
}

impl<T> NodeArray<T> {
    pub fn new(dimensions: Vec<usize>, elements: Vec<T>) -> RalResult<Self> {
        let expected: usize = dimensions.iter().product();
        if elements.len() != expected {
            return Err(RalError::LengthMismatch {
                expected,
                actual: elements.len(),
            });
        }
        Ok(Self {
            dimensions,
            elements,
        })
    }

    /// Builds every element from its row-major position and its
    /// multi-dimensional index. The first error aborts the build.
    pub fn try_from_fn<E>(
        dimensions: Vec<usize>,
        mut f: impl FnMut(usize, &[usize]) -> Result<T, E>,
    ) -> Result<Self, E> {
        let len = dimensions.iter().product();
        let elements = (0..len)
            .map(|flat| f(flat, &unflatten_index(flat, &dimensions)))
            .collect::<Result<_, E>>()?;
        Ok(Self {
            dimensions,
            elements,
        })
    }

    pub fn from_fn(dimensions: Vec<usize>, mut f: impl FnMut(usize, &[usize]) -> T) -> Self {
        let len = dimensions.iter().product();
        let elements = (0..len)
            .map(|flat| f(flat, &unflatten_index(flat, &dimensions)))
            .collect();
        Self {
            dimensions,
            elements,
        }
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: &[usize]) -> RalResult<&T> {
        Ok(&self.elements[flat_index(index, &self.dimensions)?])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.elements.iter()
    }
}

impl<'a, T> IntoIterator for &'a NodeArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// Generated register types are built from a bound [`Register`].
pub trait FromRegister {
    fn from_register(register: Register) -> Self;
}

/// Register array handing out generated register types.
#[derive(Clone)]
pub struct TypedRegisterArray<R> {
    array: RegisterArray,
    marker: PhantomData<fn() -> R>,
}

impl<R: FromRegister> TypedRegisterArray<R> {
    pub fn new(array: RegisterArray) -> Self {
        Self {
            array,
            marker: PhantomData,
        }
    }

    pub fn get(&self, index: &[usize]) -> RalResult<R> {
        self.array.get(index).map(R::from_register)
    }

    pub fn iter(&self) -> impl Iterator<Item = R> + '_ {
        self.array.iter().map(R::from_register)
    }

    pub fn array(&self) -> &RegisterArray {
        &self.array
    }
}

impl<R> Deref for TypedRegisterArray<R> {
    type Target = RegisterArray;

    fn deref(&self) -> &RegisterArray {
        &self.array
    }
}
