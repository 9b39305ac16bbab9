use zerocopy::{ByteOrder, LittleEndian};

use super::{Payload, TaggedValue, TypeTag};
use crate::{
    error::{DecodeError, DecodeResult},
    util::{varint, ByteCursor},
};

const BYTE_ORDER_MARK: u16 = 0xFEFF;
const SWAPPED_BYTE_ORDER_MARK: u16 = 0xFFFE;

/// Caps applied while decoding untrusted buffers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum nesting of structs, lists, sets and maps. The root struct counts as 1.
    pub max_depth: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self { Self { max_depth: 64 } }
}

/// Recursive Bond compact-binary decoder over a borrowed cursor.
pub struct BondReader<'c, 'a> {
    cursor: &'c mut ByteCursor<'a>,
    limits: DecodeLimits,
    depth: usize,
}

impl<'c, 'a> BondReader<'c, 'a> {
    pub fn new(cursor: &'c mut ByteCursor<'a>, limits: DecodeLimits) -> Self {
        Self { cursor, limits, depth: 0 }
    }

    fn type_tag(&mut self) -> DecodeResult<TypeTag> {
        let offset = self.cursor.position();
        let byte = self.cursor.read_u8()?;
        TypeTag::from_byte(byte & 0x1F, offset)
    }

    /// Field id and type. Ids 6 and 7 in the packed byte escape to a 1 or 2 byte id.
    pub fn field_header(&mut self) -> DecodeResult<(u16, TypeTag)> {
        let offset = self.cursor.position();
        let byte = self.cursor.read_u8()?;
        let kind = TypeTag::from_byte(byte & 0x1F, offset)?;
        let id = match byte >> 5 {
            6 => u16::from(self.cursor.read_u8()?),
            7 => self.cursor.read_u16()?,
            id => u16::from(id),
        };
        Ok((id, kind))
    }

    /// Element type and count of a list or set.
    pub fn collection_header(&mut self) -> DecodeResult<(TypeTag, usize)> {
        let offset = self.cursor.position();
        let byte = self.cursor.read_u8()?;
        let kind = TypeTag::from_byte(byte & 0x1F, offset)?;
        let count = match byte >> 5 {
            0 => varint::decode_uleb128(self.cursor)?,
            len => u64::from(len - 1),
        };
        Ok((kind, self.bounded_count(count, offset)?))
    }

    /// Rejects counts that cannot fit in the rest of the buffer.
    fn bounded_count(&self, declared: u64, offset: u64) -> DecodeResult<usize> {
        let remaining = self.cursor.remaining();
        match usize::try_from(declared) {
            Ok(count) if count <= remaining => Ok(count),
            _ => Err(DecodeError::LengthOverrun { offset, declared, remaining }),
        }
    }

    fn enter(&mut self) -> DecodeResult<()> {
        if self.depth >= self.limits.max_depth {
            return Err(DecodeError::DepthLimitExceeded {
                offset: self.cursor.position(),
                limit: self.limits.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) { self.depth -= 1; }

    fn read_string(&mut self) -> DecodeResult<String> {
        let offset = self.cursor.position();
        let len = varint::decode_uleb128(self.cursor)?;
        let bytes = self.cursor.read_exact(usize::try_from(len).unwrap_or(usize::MAX))?;
        Ok(String::from_utf8(bytes.to_vec()).unwrap_or_else(|e| {
            log::error!("Invalid UTF-8 string at offset {offset:#x}: {e}");
            String::new()
        }))
    }

    fn read_wstring(&mut self) -> DecodeResult<String> {
        let offset = self.cursor.position();
        let len = varint::decode_uleb128(self.cursor)?;
        let size = usize::try_from(len).ok().and_then(|n| n.checked_mul(2)).unwrap_or(usize::MAX);
        let bytes = self.cursor.read_exact(size)?;
        let mut units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
        match units.first() {
            Some(&BYTE_ORDER_MARK) => {
                units.remove(0);
            }
            Some(&SWAPPED_BYTE_ORDER_MARK) => {
                units.remove(0);
                units.iter_mut().for_each(|u| *u = u.swap_bytes());
            }
            _ => {}
        }
        Ok(String::from_utf16(&units).unwrap_or_else(|e| {
            log::error!("Invalid UTF-16 string at offset {offset:#x}: {e}");
            String::new()
        }))
    }

    fn read_list(&mut self) -> DecodeResult<Vec<TaggedValue>> {
        let (kind, count) = self.collection_header()?;
        match kind {
            // Nested lists and byte arrays are kept opaque.
            TypeTag::List | TypeTag::Int8 | TypeTag::Uint8 => {
                self.cursor.skip(count)?;
                Ok(Vec::new())
            }
            _ => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(self.read_value(0, kind)?);
                }
                Ok(values)
            }
        }
    }

    fn read_map(&mut self) -> DecodeResult<Vec<(TaggedValue, TaggedValue)>> {
        let key_kind = self.type_tag()?;
        let value_kind = self.type_tag()?;
        let offset = self.cursor.position();
        let declared = varint::decode_uleb128(self.cursor)?;
        let count = self.bounded_count(declared, offset)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = self.read_value(0, key_kind)?;
            let value = self.read_value(0, value_kind)?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Fields up to the next `Stop`. `StopBase` markers between base and derived fields are
    /// dropped.
    pub fn read_struct(&mut self) -> DecodeResult<Vec<TaggedValue>> {
        // Length hint, not used for bounds.
        varint::decode_uleb128(self.cursor)?;
        let mut fields = Vec::new();
        loop {
            let (id, kind) = self.field_header()?;
            match kind {
                TypeTag::Stop => break,
                TypeTag::StopBase => continue,
                _ => fields.push(self.read_value(id, kind)?),
            }
        }
        Ok(fields)
    }

    fn nested<T>(&mut self, read: impl FnOnce(&mut Self) -> DecodeResult<T>) -> DecodeResult<T> {
        self.enter()?;
        let result = read(self);
        self.leave();
        result
    }

    pub fn read_value(&mut self, id: u16, kind: TypeTag) -> DecodeResult<TaggedValue> {
        let payload = match kind {
            TypeTag::Struct => Payload::Elements(self.nested(Self::read_struct)?),
            TypeTag::Int16 | TypeTag::Int32 | TypeTag::Int64 => {
                Payload::Int(varint::decode_sleb128(self.cursor)?)
            }
            TypeTag::Uint16 | TypeTag::Uint32 | TypeTag::Uint64 => {
                Payload::UInt(varint::decode_uleb128(self.cursor)?)
            }
            TypeTag::Uint8 => Payload::UInt(self.cursor.read_u8()?.into()),
            TypeTag::Int8 => Payload::Int(self.cursor.read_i8()?.into()),
            TypeTag::Bool => Payload::Bool(self.cursor.read_u8()? != 0),
            TypeTag::Float => Payload::Float(self.cursor.read_f32()?),
            TypeTag::Double => Payload::Double(self.cursor.read_f64()?),
            TypeTag::List | TypeTag::Set => Payload::Elements(self.nested(Self::read_list)?),
            TypeTag::Map => Payload::Map(self.nested(Self::read_map)?),
            TypeTag::String => Payload::String(self.read_string()?),
            TypeTag::WString => Payload::String(self.read_wstring()?),
            TypeTag::Stop | TypeTag::StopBase | TypeTag::Unavailable => Payload::Empty,
        };
        Ok(TaggedValue { id, kind, payload })
    }
}

/// Decodes the root struct at the cursor as a value with id 0.
pub fn get_base_struct(cursor: &mut ByteCursor) -> DecodeResult<TaggedValue> {
    get_base_struct_with(cursor, DecodeLimits::default())
}

pub fn get_base_struct_with(
    cursor: &mut ByteCursor,
    limits: DecodeLimits,
) -> DecodeResult<TaggedValue> {
    let mut reader = BondReader::new(cursor, limits);
    reader.read_value(0, TypeTag::Struct)
}

/// Decodes a complete buffer holding one root struct.
pub fn decode_value_tree(data: &[u8], limits: DecodeLimits) -> DecodeResult<TaggedValue> {
    let mut cursor = ByteCursor::new(data);
    let root = get_base_struct_with(&mut cursor, limits)?;
    if !cursor.is_at_end() {
        log::debug!("{} bytes after root struct", cursor.remaining());
    }
    Ok(root)
}
