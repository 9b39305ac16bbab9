//! Schema-less Bond compact-binary values.

pub mod reader;

use serde_derive::Serialize;
use strum::{Display, FromRepr};

pub use reader::{
    decode_value_tree, get_base_struct, get_base_struct_with, BondReader, DecodeLimits,
};

use crate::error::{DecodeError, DecodeResult};

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display, FromRepr, Serialize)]
pub enum TypeTag {
    Stop = 0,
    StopBase = 1,
    Bool = 2,
    Uint8 = 3,
    Uint16 = 4,
    Uint32 = 5,
    Uint64 = 6,
    Float = 7,
    Double = 8,
    String = 9,
    Struct = 10,
    List = 11,
    Set = 12,
    Map = 13,
    Int8 = 14,
    Int16 = 15,
    Int32 = 16,
    Int64 = 17,
    WString = 18,
    Unavailable = 127,
}

impl TypeTag {
    pub(crate) fn from_byte(value: u8, offset: u64) -> DecodeResult<Self> {
        Self::from_repr(value).ok_or(DecodeError::InvalidEnum {
            offset,
            kind: "bond type",
            value: value.into(),
        })
    }

    /// Tags whose payload is a sequence of child values.
    #[inline]
    pub fn has_elements(self) -> bool { matches!(self, Self::List | Self::Set | Self::Struct) }
}

/// Decoded payload. Which arm a value carries follows from its [`TypeTag`]:
///
/// | tag                          | payload    |
/// |------------------------------|------------|
/// | Stop, StopBase, Unavailable  | `Empty`    |
/// | Bool                         | `Bool`     |
/// | Uint8/16/32/64               | `UInt`     |
/// | Int8/16/32/64                | `Int`      |
/// | Float                        | `Float`    |
/// | Double                       | `Double`   |
/// | String, WString              | `String`   |
/// | Struct, List, Set            | `Elements` |
/// | Map                          | `Map`      |
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Empty,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f32),
    Double(f64),
    String(String),
    Elements(Vec<TaggedValue>),
    Map(Vec<(TaggedValue, TaggedValue)>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaggedValue {
    pub id: u16,
    pub kind: TypeTag,
    pub payload: Payload,
}

impl TaggedValue {
    pub fn new(id: u16, kind: TypeTag, payload: Payload) -> Self { Self { id, kind, payload } }

    /// Child values of a list, set or struct. Empty for anything else.
    pub fn children(&self) -> &[TaggedValue] {
        match &self.payload {
            Payload::Elements(elements) if self.kind.has_elements() => elements,
            _ => &[],
        }
    }

    /// First child carrying field id `id`.
    pub fn get_by_id(&self, id: u16) -> Option<&TaggedValue> {
        self.children().iter().find(|child| child.id == id)
    }

    pub fn nth(&self, index: usize) -> Option<&TaggedValue> { self.children().get(index) }

    /// Follows a chain of field ids, e.g. `traverse(&[8, 23, 0])`.
    pub fn traverse(&self, ids: &[u16]) -> Option<&TaggedValue> {
        ids.iter().try_fold(self, |value, &id| value.get_by_id(id))
    }

    /// Key/value pairs of a map. Empty for anything else.
    pub fn entries(&self) -> &[(TaggedValue, TaggedValue)] {
        match &self.payload {
            Payload::Map(entries) => entries,
            _ => &[],
        }
    }

    /// Integer payload. Unsigned values are reinterpreted bit for bit.
    pub fn as_i64(&self) -> Option<i64> {
        match self.payload {
            Payload::Int(v) => Some(v),
            Payload::UInt(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.payload {
            Payload::UInt(v) => Some(v),
            Payload::Int(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.payload {
            Payload::Float(v) => Some(v.into()),
            Payload::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            Payload::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Every float or double child, in order.
    pub fn floats(&self) -> Vec<f32> {
        self.children().iter().filter_map(|child| child.as_f64()).map(|v| v as f32).collect()
    }
}
