// Licensed under the Apache-2.0 license

//! Registers and their fields.

use crate::bits::{join_words, split_words, value_mask};
use crate::cache::{verify_words, CacheLock, CacheOptions};
use crate::callbacks::{BlockTransfer, CallbackSet};
use crate::error::{RalError, RalResult};
use crate::field::{Access, FieldEnum, FieldSpec, FieldValue};
use log::trace;
use std::sync::Arc;

/// Decoded field values of one register snapshot, in field order.
pub type FieldValues = Vec<(String, FieldValue)>;

/// Static description of a register: where it lives and how its fields are
/// packed. All composition logic lives here so it can be shared by the sync
/// and async register objects and by cached sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterSpec {
    pub name: String,
    pub address: u64,
    pub width: u32,
    pub accesswidth: u32,
    pub fields: Vec<FieldSpec>,
}

/// Field contributions of a `write_fields` call, already encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteMask {
    pub mask: u128,
    pub value: u128,
}

impl WriteMask {
    pub fn apply(&self, base: u128) -> u128 {
        (base & !self.mask) | self.value
    }
}

impl RegisterSpec {
    pub fn new(name: &str, address: u64, width: u32, accesswidth: u32) -> Self {
        Self {
            name: name.to_string(),
            address,
            width,
            accesswidth,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Same register layout relocated to `address`, used for array elements.
    pub fn at(&self, address: u64, name: String) -> Self {
        Self {
            name,
            address,
            ..self.clone()
        }
    }

    pub fn readable(&self) -> bool {
        self.fields.iter().any(|f| f.access.readable())
    }

    pub fn writable(&self) -> bool {
        self.fields.iter().any(|f| f.access.writable())
    }

    pub fn access(&self) -> Option<Access> {
        Access::from_flags(self.readable(), self.writable())
    }

    pub fn max_value(&self) -> u128 {
        value_mask(self.width)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Register value with every field at its reset value (zero when absent).
    pub fn reset_value(&self) -> u128 {
        self.fields
            .iter()
            .filter_map(|f| {
                f.reset
                    .and_then(|reset| f.geometry.encode_unsigned(reset).ok())
            })
            .fold(0, |acc, v| acc | v)
    }

    /// Decodes every readable field from a single snapshot.
    pub fn decode_fields(&self, snapshot: u128) -> RalResult<FieldValues> {
        self.fields
            .iter()
            .filter(|f| f.access.readable())
            .map(|f| Ok((f.name.clone(), f.decode(snapshot, self.width)?)))
            .collect()
    }

    /// Validates and encodes the arguments of a `write_fields` call without
    /// touching hardware.
    pub fn prepare_write(&self, args: &[(&str, FieldValue)]) -> RalResult<WriteMask> {
        if args.is_empty() {
            return Err(RalError::NoFieldArguments {
                register: self.name.clone(),
            });
        }
        let mut result = WriteMask::default();
        for (name, value) in args {
            let field = self.field(name).ok_or_else(|| RalError::UnknownField {
                register: self.name.clone(),
                field: name.to_string(),
            })?;
            if !field.access.writable() {
                return Err(RalError::AccessDenied {
                    name: format!("{}.{}", self.name, field.name),
                    operation: "write",
                });
            }
            let mask = field.geometry.bitmask();
            result.mask |= mask;
            result.value = (result.value & !mask) | field.encode(value)?;
        }
        Ok(result)
    }

    /// Replaces the named fields in `base`, keeping every other bit.
    pub fn compose_write(&self, base: u128, args: &[(&str, FieldValue)]) -> RalResult<u128> {
        Ok(self.prepare_write(args)?.apply(base))
    }

    /// A register without readable fields cannot be read-modify-written, so
    /// every field has to be supplied.
    pub fn check_complete(&self, args: &[(&str, FieldValue)]) -> RalResult<()> {
        if self.readable() {
            return Ok(());
        }
        let missing: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !args.iter().any(|(name, _)| *name == f.name))
            .map(|f| f.name.clone())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RalError::MissingFields {
                register: self.name.clone(),
                missing,
            })
        }
    }

    pub(crate) fn check_value(&self, value: u128) -> RalResult<()> {
        if value > self.max_value() {
            return Err(RalError::TooLarge {
                value,
                max: self.max_value(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_readable(&self) -> RalResult<()> {
        if self.readable() {
            return Ok(());
        }
        Err(RalError::AccessDenied {
            name: self.name.clone(),
            operation: "read",
        })
    }

    pub(crate) fn check_writable(&self) -> RalResult<()> {
        if self.writable() {
            return Ok(());
        }
        Err(RalError::AccessDenied {
            name: self.name.clone(),
            operation: "write",
        })
    }

    /// True when the register has to be moved as several access-width words.
    pub fn is_wide(&self) -> bool {
        self.width > self.accesswidth
    }

    pub(crate) fn sub_words(&self) -> BlockTransfer {
        BlockTransfer::contiguous(
            self.address,
            self.accesswidth,
            self.accesswidth,
            (self.width / self.accesswidth) as usize,
        )
    }

    pub(crate) fn join_words(&self, words: &[u64]) -> u128 {
        join_words(words, self.accesswidth)
    }

    pub(crate) fn split_words(&self, value: u128) -> Vec<u64> {
        split_words(value, self.width, self.accesswidth)
    }

    /// A value that fits a single access. Only called for registers that are
    /// not wide, whose checked values always fit.
    pub(crate) fn to_word(&self, value: u128) -> RalResult<u64> {
        u64::try_from(value).map_err(|_| RalError::TooLarge {
            value,
            max: u128::from(u64::MAX),
        })
    }
}

/// A register bound to a set of callbacks.
#[derive(Clone)]
pub struct Register {
    spec: Arc<RegisterSpec>,
    callbacks: Arc<dyn CallbackSet>,
    lock: Arc<CacheLock>,
}

impl Register {
    pub fn new(spec: RegisterSpec, callbacks: Arc<dyn CallbackSet>) -> Self {
        Self {
            spec: Arc::new(spec),
            callbacks,
            lock: CacheLock::new(),
        }
    }

    /// A register whose cached sessions are guarded by `lock`.
    pub(crate) fn with_lock(
        spec: RegisterSpec,
        callbacks: Arc<dyn CallbackSet>,
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

    pub fn callbacks(&self) -> &Arc<dyn CallbackSet> {
        &self.callbacks
    }

    /// Handle on one field of this register.
    pub fn field(&self, name: &str) -> RalResult<Field> {
        let index = self
            .spec
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| RalError::UnknownField {
                register: self.spec.name.clone(),
                field: name.to_string(),
            })?;
        Ok(Field {
            register: self.clone(),
            index,
        })
    }

    /// Handle on the field at `index` in declaration order. Generated models
    /// use this with indices taken from their own layout.
    pub fn field_at(&self, index: usize) -> Field {
        debug_assert!(index < self.spec.fields.len());
        Field {
            register: self.clone(),
            index,
        }
    }

    fn physical_read(&self) -> RalResult<u128> {
        let spec = &self.spec;
        if spec.is_wide() {
            let words = spec.sub_words().read(self.callbacks.as_ref())?;
            return Ok(spec.join_words(&words));
        }
        trace!("read {} @ {:#x}", spec.name, spec.address);
        self.callbacks
            .read(spec.address, spec.width, spec.accesswidth)
            .map(u128::from)
    }

    fn physical_write(&self, value: u128) -> RalResult<()> {
        let spec = &self.spec;
        if spec.is_wide() {
            return spec
                .sub_words()
                .write(self.callbacks.as_ref(), &spec.split_words(value));
        }
        trace!("write {} @ {:#x} <- {:#x}", spec.name, spec.address, value);
        self.callbacks
            .write(spec.address, spec.width, spec.accesswidth, spec.to_word(value)?)
    }

    pub fn read(&self) -> RalResult<u128> {
        self.spec.check_readable()?;
        self.physical_read()
    }

    pub fn write(&self, value: u128) -> RalResult<()> {
        self.spec.check_writable()?;
        self.spec.check_value(value)?;
        self.physical_write(value)
    }

    /// Reads the register once and decodes every readable field.
    pub fn read_fields(&self) -> RalResult<FieldValues> {
        let snapshot = self.read()?;
        self.spec.decode_fields(snapshot)
    }

    /// Updates the named fields with a single read-modify-write. Everything is
    /// validated and encoded before the read, so an invalid argument leaves the
    /// hardware untouched.
    pub fn write_fields(&self, args: &[(&str, FieldValue)]) -> RalResult<()> {
        let prepared = self.spec.prepare_write(args)?;
        self.spec.check_complete(args)?;
        let base = if self.spec.readable() {
            self.physical_read()?
        } else {
            0
        };
        self.physical_write(prepared.apply(base))
    }

    /// Runs `f` against an in-memory copy of the register, then writes the
    /// result back once. An error from `f` skips the write.
    pub fn with_cached<T>(
        &self,
        options: CacheOptions,
        f: impl FnOnce(&mut CachedRegister) -> RalResult<T>,
    ) -> RalResult<T> {
        let _guard = self.lock.acquire(&self.spec.name)?;
        if options.verify {
            self.spec.check_readable()?;
        }
        let value = if self.spec.readable() {
            self.physical_read()?
        } else {
            self.spec.reset_value()
        };
        let mut cached = CachedRegister {
            spec: &self.spec,
            value,
        };
        let result = f(&mut cached)?;
        if !options.skip_write {
            let value = cached.value;
            self.write(value)?;
            if options.verify {
                let actual = self.physical_read()?;
                verify_words(self.spec.address, 0, &[value], &[actual])?;
            }
        }
        Ok(result)
    }
}

/// In-memory register snapshot handed out by [`Register::with_cached`].
pub struct CachedRegister<'a> {
    pub(crate) spec: &'a RegisterSpec,
    pub(crate) value: u128,
}

impl CachedRegister<'_> {
    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn set_value(&mut self, value: u128) -> RalResult<()> {
        self.spec.check_value(value)?;
        self.value = value;
        Ok(())
    }

    pub fn read_fields(&self) -> RalResult<FieldValues> {
        self.spec.decode_fields(self.value)
    }

    pub fn write_fields(&mut self, args: &[(&str, FieldValue)]) -> RalResult<()> {
        self.value = self.spec.compose_write(self.value, args)?;
        Ok(())
    }
}

/// One field of a bound register.
#[derive(Clone)]
pub struct Field {
    register: Register,
    index: usize,
}

impl Field {
    pub fn spec(&self) -> &FieldSpec {
        &self.register.spec.fields[self.index]
    }

    pub fn register(&self) -> &Register {
        &self.register
    }

    /// Raw integer value of the field.
    pub fn read(&self) -> RalResult<u128> {
        let spec = self.spec();
        self.check("read", spec.access.readable())?;
        let raw = self.register.physical_read()?;
        spec.geometry.decode(raw, self.register.width())
    }

    /// Field value mapped through its enumeration when it has one.
    pub fn read_value(&self) -> RalResult<FieldValue> {
        let spec = self.spec();
        self.check("read", spec.access.readable())?;
        let raw = self.register.physical_read()?;
        spec.decode(raw, self.register.width())
    }

    pub fn write(&self, value: impl Into<FieldValue>) -> RalResult<()> {
        let name = self.spec().name.clone();
        self.register.write_fields(&[(name.as_str(), value.into())])
    }

    pub fn read_enum<E: FieldEnum>(&self) -> RalResult<E> {
        let value = self.read()?;
        let member = u64::try_from(value).ok().and_then(E::from_value);
        member.ok_or_else(|| RalError::NotEnumMember {
            enum_name: E::ENUM_NAME.to_string(),
            value,
        })
    }

    pub fn write_enum<E: FieldEnum>(&self, value: E) -> RalResult<()> {
        self.write(value.into_value())
    }

    fn check(&self, operation: &'static str, allowed: bool) -> RalResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(RalError::AccessDenied {
                name: format!("{}.{}", self.register.name(), self.spec().name),
                operation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::mock::MockCallbacks;
    use crate::field::{EnumDef, FieldGeometry};

    fn spec(access: Access) -> RegisterSpec {
        let encoding = Arc::new(EnumDef::new("mode_e", &[(0, "value1"), (1, "value2")]));
        RegisterSpec::new("top.reg_a", 0x10, 32, 32)
            .with_field(FieldSpec::new(
                "first_field",
                FieldGeometry::lsb0(0, 15).unwrap(),
                access,
            ))
            .with_field(
                FieldSpec::new("second_field", FieldGeometry::lsb0(16, 17).unwrap(), access)
                    .with_encoding(encoding),
            )
    }

    fn register(access: Access) -> (Arc<MockCallbacks>, Register) {
        let cb = Arc::new(MockCallbacks::new(false));
        let reg = Register::new(spec(access), cb.clone());
        (cb, reg)
    }

    #[test]
    fn test_write_fields_single_read_modify_write() {
        let (cb, reg) = register(Access::ReadWrite);
        cb.set(0x10, 0x3FFFF);
        reg.write_fields(&[("first_field", FieldValue::Int(0xABCD))])
            .unwrap();
        assert_eq!(*cb.reads.lock().unwrap(), vec![0x10]);
        assert_eq!(*cb.writes.lock().unwrap(), vec![(0x10, 0x3ABCD)]);
    }

    #[test]
    fn test_write_fields_rejects_before_access() {
        let (cb, reg) = register(Access::ReadWrite);
        assert_eq!(
            reg.write_fields(&[]),
            Err(RalError::NoFieldArguments {
                register: "top.reg_a".to_string()
            })
        );
        assert!(matches!(
            reg.write_fields(&[("third_field", FieldValue::Int(1))]),
            Err(RalError::UnknownField { .. })
        ));
        assert!(matches!(
            reg.write_fields(&[("first_field", FieldValue::Int(0x10000))]),
            Err(RalError::TooLarge { .. })
        ));
        assert!(matches!(
            reg.write_fields(&[("second_field", FieldValue::Int(1))]),
            Err(RalError::WrongType { .. })
        ));
        assert_eq!(cb.read_count(), 0);
        assert_eq!(cb.write_count(), 0);
    }

    #[test]
    fn test_read_fields_single_read() {
        let (cb, reg) = register(Access::ReadWrite);
        cb.set(0x10, 0x1_1234);
        let values = reg.read_fields().unwrap();
        assert_eq!(cb.read_count(), 1);
        assert_eq!(values[0], ("first_field".to_string(), FieldValue::Int(0x1234)));
        let member = values[1].1.as_member().unwrap();
        assert_eq!(member.name, "value2");
    }

    #[test]
    fn test_enum_rejection_on_read() {
        let (cb, reg) = register(Access::ReadWrite);
        for raw in [0x2_0000, 0x3_0000] {
            cb.set(0x10, raw);
            assert!(matches!(
                reg.read_fields(),
                Err(RalError::NotEnumMember { value, .. }) if value == u128::from(raw >> 16)
            ));
            assert!(reg.field("second_field").unwrap().read_value().is_err());
        }
        assert_eq!(reg.field("second_field").unwrap().read().unwrap(), 3);
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Mode {
        Value1,
        Value2,
    }

    impl FieldEnum for Mode {
        const ENUM_NAME: &'static str = "mode_e";

        fn value(self) -> u64 {
            self as u64
        }

        fn name(self) -> &'static str {
            match self {
                Mode::Value1 => "value1",
                Mode::Value2 => "value2",
            }
        }

        fn from_value(value: u64) -> Option<Self> {
            match value {
                0 => Some(Mode::Value1),
                1 => Some(Mode::Value2),
                _ => None,
            }
        }
    }

    #[test]
    fn test_typed_enum_field() {
        let (cb, reg) = register(Access::ReadWrite);
        cb.set(0x10, 0x1234);
        let second = reg.field_at(1);
        second.write_enum(Mode::Value2).unwrap();
        assert_eq!(cb.get(0x10), 0x1_1234);
        assert_eq!(second.read_enum::<Mode>().unwrap(), Mode::Value2);
        cb.set(0x10, 0x3_0000);
        assert_eq!(
            second.read_enum::<Mode>(),
            Err(RalError::NotEnumMember {
                enum_name: "mode_e".to_string(),
                value: 3
            })
        );
    }

    #[test]
    fn test_write_only_register_needs_every_field() {
        let (cb, reg) = register(Access::WriteOnly);
        assert!(matches!(
            reg.write_fields(&[("first_field", FieldValue::Int(1))]),
            Err(RalError::MissingFields { missing, .. }) if missing == vec!["second_field".to_string()]
        ));
        let value2 = spec(Access::WriteOnly).fields[1]
            .encoding
            .as_ref()
            .unwrap()
            .member("value2")
            .unwrap();
        reg.write_fields(&[
            ("first_field", FieldValue::Int(0xABCD)),
            ("second_field", value2.into()),
        ])
        .unwrap();
        assert_eq!(cb.read_count(), 0);
        assert_eq!(*cb.writes.lock().unwrap(), vec![(0x10, 0x1ABCD)]);
        assert!(matches!(reg.read(), Err(RalError::AccessDenied { .. })));
    }

    #[test]
    fn test_read_only_register() {
        let (cb, reg) = register(Access::ReadOnly);
        assert!(matches!(
            reg.write(1),
            Err(RalError::AccessDenied { operation: "write", .. })
        ));
        assert!(matches!(
            reg.field("first_field").unwrap().write(1u64),
            Err(RalError::AccessDenied { .. })
        ));
        assert_eq!(cb.write_count(), 0);
    }

    #[test]
    fn test_register_write_range() {
        let (_, reg) = register(Access::ReadWrite);
        assert!(matches!(
            reg.write(0x1_0000_0000),
            Err(RalError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_field_write_keeps_other_bits() {
        let (cb, reg) = register(Access::ReadWrite);
        cb.set(0x10, 0x2_0000);
        reg.field("first_field").unwrap().write(0x55u64).unwrap();
        assert_eq!(cb.get(0x10), 0x2_0055);
        assert_eq!(reg.field("first_field").unwrap().read().unwrap(), 0x55);
    }

    #[test]
    fn test_wide_register_sub_words() {
        let cb = Arc::new(MockCallbacks::new(false));
        let spec = RegisterSpec::new("top.wide", 0x20, 64, 32).with_field(FieldSpec::new(
            "value",
            FieldGeometry::lsb0(0, 63).unwrap(),
            Access::ReadWrite,
        ));
        let reg = Register::new(spec, cb.clone());
        reg.write(0x1122_3344_5566_7788).unwrap();
        assert_eq!(
            *cb.writes.lock().unwrap(),
            vec![(0x20, 0x5566_7788), (0x24, 0x1122_3344)]
        );
        assert_eq!(reg.read().unwrap(), 0x1122_3344_5566_7788);
    }

    #[test]
    fn test_128_bit_register() {
        let cb = Arc::new(MockCallbacks::new(false));
        let spec = RegisterSpec::new("top.wide", 0x40, 128, 32)
            .with_field(FieldSpec::new(
                "low",
                FieldGeometry::lsb0(0, 55).unwrap(),
                Access::ReadWrite,
            ))
            .with_field(FieldSpec::new(
                "span",
                FieldGeometry::msb0(56, 71).unwrap(),
                Access::ReadWrite,
            ))
            .with_field(
                FieldSpec::new("high", FieldGeometry::lsb0(72, 127).unwrap(), Access::ReadWrite)
                    .with_reset(1),
            );
        assert_eq!(spec.max_value(), u128::MAX);
        assert_eq!(spec.reset_value(), 1 << 72);
        let reg = Register::new(spec, cb.clone());

        cb.set(0x40, 0xffff_ffff);
        cb.set(0x4c, 0x8000_0000);
        reg.write_fields(&[("span", FieldValue::Int(1))]).unwrap();
        // four sub-word reads, then four sub-word writes
        assert_eq!(*cb.reads.lock().unwrap(), vec![0x40, 0x44, 0x48, 0x4c]);
        assert_eq!(
            *cb.writes.lock().unwrap(),
            vec![(0x40, 0xffff_ffff), (0x44, 0), (0x48, 0x80), (0x4c, 0x8000_0000)]
        );
        assert_eq!(reg.read().unwrap(), (1 << 127) | (1 << 71) | 0xffff_ffff);
        let values = reg.read_fields().unwrap();
        assert_eq!(values[0].1, FieldValue::Int(0xffff_ffff));
        assert_eq!(values[1].1, FieldValue::Int(1));
        assert_eq!(values[2].1, FieldValue::Int(1 << 55));
        assert_eq!(reg.field("span").unwrap().read().unwrap(), 1);

        reg.field("high").unwrap().write((1u128 << 56) - 1).unwrap();
        assert_eq!(cb.get(0x48) >> 8, 0xff_ffff);
        assert_eq!(cb.get(0x4c), 0xffff_ffff);
    }

    #[test]
    fn test_cached_register() {
        let (cb, reg) = register(Access::ReadWrite);
        cb.set(0x10, 0x1_0000);
        let first = reg
            .with_cached(CacheOptions::verified(), |c| {
                c.write_fields(&[("first_field", FieldValue::Int(1))])?;
                c.write_fields(&[("first_field", FieldValue::Int(2))])?;
                Ok(c.read_fields()?[0].1.clone())
            })
            .unwrap();
        assert_eq!(first, FieldValue::Int(2));
        assert_eq!(*cb.writes.lock().unwrap(), vec![(0x10, 0x1_0002)]);
        assert_eq!(cb.read_count(), 2);

        let err = reg.with_cached(CacheOptions::default(), |c| {
            c.write_fields(&[("first_field", FieldValue::Int(9))])?;
            c.write_fields(&[])
        });
        assert!(err.is_err());
        assert_eq!(cb.write_count(), 1);

        let nested = reg.with_cached(CacheOptions::default(), |_| {
            reg.with_cached(CacheOptions::default(), |_| Ok(()))
        });
        assert!(matches!(nested, Err(RalError::CachedAccessActive { .. })));
    }
}
