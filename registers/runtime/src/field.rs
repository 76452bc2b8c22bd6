// Licensed under the Apache-2.0 license

//! Field bit geometry and the field value codec.
//!
//! A field occupies bits `low..=high` of its register. Its logical bit 0 is
//! either the least significant physical bit of that range (lsb0, `msb == high`)
//! or the most significant one (msb0, `msb == low`). Decoding extracts the bits
//! and, for msb0 fields, reverses them across the field width; encoding does
//! the opposite and shifts the result into register position.

use crate::bits::{range_mask, reverse_bits, value_mask, MAX_VALUE_WIDTH};
use crate::error::{RalError, RalResult};
use std::fmt;
use std::sync::Arc;

/// Software access of a field, register or memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl Access {
    pub fn from_flags(readable: bool, writable: bool) -> Option<Self> {
        match (readable, writable) {
            (true, true) => Some(Access::ReadWrite),
            (true, false) => Some(Access::ReadOnly),
            (false, true) => Some(Access::WriteOnly),
            (false, false) => None,
        }
    }

    pub fn readable(self) -> bool {
        matches!(self, Access::ReadWrite | Access::ReadOnly)
    }

    pub fn writable(self) -> bool {
        matches!(self, Access::ReadWrite | Access::WriteOnly)
    }
}

/// Validated position of a field inside its register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldGeometry {
    low: u32,
    high: u32,
    msb: u32,
    lsb: u32,
    width: u32,
}

impl FieldGeometry {
    /// Builds a geometry, rejecting any combination where `high - low + 1`
    /// differs from `width` or where `msb`/`lsb` are neither `high`/`low`
    /// (lsb0) nor `low`/`high` (msb0).
    pub fn new(low: u32, high: u32, msb: u32, lsb: u32, width: u32) -> RalResult<Self> {
        if high < low {
            return Err(RalError::InvalidGeometry(format!(
                "high bit {high} is below low bit {low}"
            )));
        }
        if high - low + 1 != width {
            return Err(RalError::InvalidGeometry(format!(
                "width {width} does not match bits {low}..={high}"
            )));
        }
        if high >= MAX_VALUE_WIDTH {
            return Err(RalError::InvalidGeometry(format!(
                "high bit {high} is beyond a {MAX_VALUE_WIDTH} bit register"
            )));
        }
        let lsb0 = msb == high && lsb == low;
        let msb0 = msb == low && lsb == high;
        if !lsb0 && !msb0 {
            return Err(RalError::InvalidGeometry(format!(
                "msb {msb} / lsb {lsb} do not match bits {low}..={high}"
            )));
        }
        Ok(Self {
            low,
            high,
            msb,
            lsb,
            width,
        })
    }

    /// Derives the geometry from the SystemRDL `[msb:lsb]` notation.
    pub fn from_msb_lsb(msb: u32, lsb: u32) -> RalResult<Self> {
        let (low, high) = (msb.min(lsb), msb.max(lsb));
        Self::new(low, high, msb, lsb, high - low + 1)
    }

    pub fn lsb0(low: u32, high: u32) -> RalResult<Self> {
        Self::from_msb_lsb(high, low)
    }

    pub fn msb0(low: u32, high: u32) -> RalResult<Self> {
        Self::from_msb_lsb(low, high)
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    pub fn msb(&self) -> u32 {
        self.msb
    }

    pub fn lsb(&self) -> u32 {
        self.lsb
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// True when the bit numbering runs opposite to storage order. Single bit
    /// fields satisfy both orientations and are treated as lsb0.
    pub fn is_msb0(&self) -> bool {
        self.msb == self.low && self.msb != self.high
    }

    pub fn bitmask(&self) -> u128 {
        range_mask(self.low, self.high)
    }

    /// Mask of every register bit outside this field.
    pub fn inverse_bitmask(&self, register_width: u32) -> u128 {
        value_mask(register_width) & !self.bitmask()
    }

    pub fn max_value(&self) -> u128 {
        value_mask(self.width)
    }

    /// Extracts the field value from a raw register value.
    pub fn decode(&self, raw: u128, register_width: u32) -> RalResult<u128> {
        let register_max = value_mask(register_width);
        if raw > register_max {
            return Err(RalError::TooLarge {
                value: raw,
                max: register_max,
            });
        }
        let value = (raw & self.bitmask()) >> self.low;
        if self.is_msb0() {
            Ok(reverse_bits(value, self.width))
        } else {
            Ok(value)
        }
    }

    /// Produces the field value already shifted into register position, ready
    /// to be OR'ed into a read-modify-write.
    pub fn encode(&self, value: impl Into<i128>) -> RalResult<u128> {
        let value = value.into();
        if value < 0 {
            return Err(RalError::Negative { value });
        }
        self.encode_unsigned(value as u128)
    }

    /// [`FieldGeometry::encode`] for values that may not fit an `i128`, such
    /// as the top bit of a 128 bit field.
    pub fn encode_unsigned(&self, value: u128) -> RalResult<u128> {
        let max = self.max_value();
        if value > max {
            return Err(RalError::TooLarge { value, max });
        }
        let value = if self.is_msb0() {
            reverse_bits(value, self.width)
        } else {
            value
        };
        Ok(value << self.low)
    }
}

/// One entry of a field enumeration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumEntry {
    pub value: u64,
    pub name: String,
    pub desc: Option<String>,
}

/// Ordered set of (value, name) pairs attached to a field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumDef {
    pub name: String,
    pub entries: Vec<EnumEntry>,
}

impl EnumDef {
    pub fn new(name: &str, entries: &[(u64, &str)]) -> Self {
        Self {
            name: name.to_string(),
            entries: entries
                .iter()
                .map(|(value, name)| EnumEntry {
                    value: *value,
                    name: name.to_string(),
                    desc: None,
                })
                .collect(),
        }
    }

    pub fn member_by_value(&self, value: u64) -> Option<EnumMember> {
        self.entries
            .iter()
            .find(|e| e.value == value)
            .map(|e| self.make_member(e))
    }

    pub fn member(&self, name: &str) -> Option<EnumMember> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| self.make_member(e))
    }

    pub fn contains(&self, member: &EnumMember) -> bool {
        member.enum_name == self.name
            && self
                .entries
                .iter()
                .any(|e| e.name == member.name && e.value == member.value)
    }

    fn make_member(&self, entry: &EnumEntry) -> EnumMember {
        EnumMember {
            enum_name: self.name.clone(),
            name: entry.name.clone(),
            value: entry.value,
        }
    }
}

/// A symbolic value of a field enumeration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumMember {
    pub enum_name: String,
    pub name: String,
    pub value: u64,
}

/// Implemented by the enumerations emitted for encoded fields.
pub trait FieldEnum: Copy + Sized {
    const ENUM_NAME: &'static str;

    fn value(self) -> u64;

    fn name(self) -> &'static str;

    fn from_value(value: u64) -> Option<Self>;

    fn member(self) -> EnumMember {
        EnumMember {
            enum_name: Self::ENUM_NAME.to_string(),
            name: self.name().to_string(),
            value: self.value(),
        }
    }

    fn into_value(self) -> FieldValue {
        FieldValue::Member(self.member())
    }

    fn from_member(member: &EnumMember) -> Option<Self> {
        if member.enum_name != Self::ENUM_NAME {
            return None;
        }
        Self::from_value(member.value).filter(|v| v.name() == member.name)
    }
}

/// Logical value of a field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Int(u128),
    Member(EnumMember),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<u128> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Member(_) => None,
        }
    }

    pub fn as_member(&self) -> Option<&EnumMember> {
        match self {
            FieldValue::Int(_) => None,
            FieldValue::Member(m) => Some(m),
        }
    }

    fn type_name(&self) -> String {
        match self {
            FieldValue::Int(_) => "integer".to_string(),
            FieldValue::Member(m) => format!("enumeration {}", m.enum_name),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v:#x}"),
            FieldValue::Member(m) => write!(f, "{}.{}", m.enum_name, m.name),
        }
    }
}

impl From<u128> for FieldValue {
    fn from(value: u128) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<EnumMember> for FieldValue {
    fn from(value: EnumMember) -> Self {
        FieldValue::Member(value)
    }
}

/// Everything the codec needs to know about one field of a register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub geometry: FieldGeometry,
    pub access: Access,
    pub encoding: Option<Arc<EnumDef>>,
    pub reset: Option<u128>,
}

impl FieldSpec {
    pub fn new(name: &str, geometry: FieldGeometry, access: Access) -> Self {
        Self {
            name: name.to_string(),
            geometry,
            access,
            encoding: None,
            reset: None,
        }
    }

    pub fn with_encoding(mut self, encoding: Arc<EnumDef>) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_reset(mut self, reset: u128) -> Self {
        self.reset = Some(reset);
        self
    }

    /// Decodes this field out of a register snapshot, mapping through the
    /// enumeration when the field has one.
    pub fn decode(&self, raw: u128, register_width: u32) -> RalResult<FieldValue> {
        let value = self.geometry.decode(raw, register_width)?;
        match &self.encoding {
            None => Ok(FieldValue::Int(value)),
            Some(encoding) => u64::try_from(value)
                .ok()
                .and_then(|v| encoding.member_by_value(v))
                .map(FieldValue::Member)
                .ok_or_else(|| RalError::NotEnumMember {
                    enum_name: encoding.name.clone(),
                    value,
                }),
        }
    }

    /// Encodes a logical value into register position. Encoded fields only
    /// accept members of their own enumeration; plain fields only integers.
    pub fn encode(&self, value: &FieldValue) -> RalResult<u128> {
        match (&self.encoding, value) {
            (None, FieldValue::Int(v)) => self.geometry.encode_unsigned(*v),
            (Some(encoding), FieldValue::Member(m)) if encoding.contains(m) => {
                self.geometry.encode_unsigned(m.value.into())
            }
            (encoding, value) => Err(RalError::WrongType {
                field: self.name.clone(),
                expected: match encoding {
                    Some(e) => format!("enumeration {}", e.name),
                    None => "integer".to_string(),
                },
                actual: value.type_name(),
            }),
        }
    }
}
