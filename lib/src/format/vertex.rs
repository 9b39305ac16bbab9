//! Optional vertex sub-buffers of a section and their dequantization.
//!
//! Every sub-buffer starts with a signed stride byte and a `u32` record count.
//! A stride wider than the decoded record is honoured by skipping the excess.

use std::collections::BTreeMap;

use serde_derive::Serialize;

use crate::{
    error::{DecodeError, DecodeResult},
    format::mesh::{VertexFlags, VertexType},
    util::ByteCursor,
};

const UNORM16_MAX: f32 = 65535.0;
const UNORM10_MAX: f32 = 1023.0;
const UNORM2_MAX: f32 = 3.0;

#[inline]
pub fn unorm16(v: u16) -> f32 { f32::from(v) / UNORM16_MAX }

#[inline]
fn unorm10(word: u32, shift: u32) -> f32 { ((word >> shift) & 0x3FF) as f32 / UNORM10_MAX }

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SubBuffer<T> {
    pub stride: i8,
    pub items: Vec<T>,
}

impl<T> SubBuffer<T> {
    #[inline]
    pub fn len(&self) -> usize { self.items.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

/// 10-10-10-2 normal, each component mapped to `[-1, 1]`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct PackedNormal {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl PackedNormal {
    pub fn from_bits(word: u32) -> Self {
        Self {
            x: unorm10(word, 0) * 2.0 - 1.0,
            y: unorm10(word, 10) * 2.0 - 1.0,
            z: unorm10(word, 20) * 2.0 - 1.0,
            w: ((word >> 30) & 0x3) as f32 / UNORM2_MAX * 2.0 - 1.0,
        }
    }

    /// Unit-length copy over all four components. Near-zero vectors are returned as is.
    pub fn normalized(&self) -> Self {
        let length_sq = self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w;
        if length_sq.abs() <= 1e-6 {
            return *self;
        }
        let length = length_sq.sqrt();
        Self { x: self.x / length, y: self.y / length, z: self.z / length, w: self.w / length }
    }

    pub fn xyz(&self) -> [f32; 3] { [self.x, self.y, self.z] }
}

/// Raw vertex color bytes in stored order.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Blend-shape positions sharing one shape index.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BlendShapeGroup {
    pub index: u16,
    pub positions: Vec<[f32; 3]>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BlendPair {
    pub vertex: usize,
    pub indices: Vec<u32>,
    pub weights: Vec<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VertexBuffers {
    pub flags: VertexFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SubBuffer<[f32; 4]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv0: Option<SubBuffer<[f32; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv1: Option<SubBuffer<[f32; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv2: Option<SubBuffer<[f32; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal: Option<SubBuffer<PackedNormal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<SubBuffer<Color>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_index: Option<SubBuffer<[u32; 4]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<SubBuffer<[f32; 3]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_extra: Option<SubBuffer<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blendshape_index: Option<SubBuffer<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blendshape_position: Option<SubBuffer<BlendShapeGroup>>,
}

struct BufferHeader {
    offset: u64,
    stride: i8,
    count: usize,
}

impl BufferHeader {
    fn read(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        let offset = cursor.position();
        let stride = cursor.read_i8()?;
        let count = cursor.read_u32()? as usize;
        Ok(Self { offset, stride, count })
    }

    fn expect_stride(&self, buffer: &'static str, expected: i8) -> DecodeResult<()> {
        if self.stride != expected {
            return Err(DecodeError::IncorrectStrideValue {
                offset: self.offset,
                buffer,
                expected,
                found: self.stride,
            });
        }
        Ok(())
    }

    fn invalid(&self, buffer: &'static str) -> DecodeError {
        DecodeError::InvalidStride { offset: self.offset, buffer, stride: self.stride }
    }

    /// Reads `count` records of `natural` bytes, skipping any stride padding.
    fn records<T, F>(
        &self,
        cursor: &mut ByteCursor,
        natural: usize,
        mut read: F,
    ) -> DecodeResult<SubBuffer<T>>
    where F: FnMut(&mut ByteCursor) -> DecodeResult<T> {
        let padding = usize::try_from(self.stride).unwrap_or(0).saturating_sub(natural);
        let mut items = Vec::with_capacity(cursor.capacity_for(self.count, natural + padding));
        for _ in 0..self.count {
            items.push(read(cursor)?);
            if padding > 0 {
                cursor.skip(padding)?;
            }
        }
        Ok(SubBuffer { stride: self.stride, items })
    }
}

fn read_position(cursor: &mut ByteCursor) -> DecodeResult<SubBuffer<[f32; 4]>> {
    let header = BufferHeader::read(cursor)?;
    header.records(cursor, 8, |c| {
        Ok([
            unorm16(c.read_u16()?),
            unorm16(c.read_u16()?),
            unorm16(c.read_u16()?),
            unorm16(c.read_u16()?),
        ])
    })
}

fn read_uv(cursor: &mut ByteCursor) -> DecodeResult<SubBuffer<[f32; 2]>> {
    let header = BufferHeader::read(cursor)?;
    if header.stride <= 0 || header.stride % 4 != 0 {
        return Err(header.invalid("uv"));
    }
    header.records(cursor, 4, |c| Ok([unorm16(c.read_u16()?), unorm16(c.read_u16()?)]))
}

fn read_normal(cursor: &mut ByteCursor) -> DecodeResult<SubBuffer<PackedNormal>> {
    let header = BufferHeader::read(cursor)?;
    header.records(cursor, 4, |c| c.read_u32().map(PackedNormal::from_bits))
}

fn read_color(cursor: &mut ByteCursor) -> DecodeResult<SubBuffer<Color>> {
    let header = BufferHeader::read(cursor)?;
    header.records(cursor, 4, |c| {
        let [a, r, g, b] = c.read_array::<4>()?;
        Ok(Color { a, r, g, b })
    })
}

fn read_weight_index(cursor: &mut ByteCursor) -> DecodeResult<SubBuffer<[u32; 4]>> {
    let header = BufferHeader::read(cursor)?;
    let width = match header.stride {
        4 | 8 | 16 => header.stride as usize / 4,
        _ => return Err(header.invalid("weight index")),
    };
    header.records(cursor, width * 4, |c| {
        let mut slots = [0u32; 4];
        for slot in &mut slots {
            *slot = c.read_uint(width)? as u32;
        }
        Ok(slots)
    })
}

fn read_weight(cursor: &mut ByteCursor) -> DecodeResult<SubBuffer<[f32; 3]>> {
    let header = BufferHeader::read(cursor)?;
    header.records(cursor, 4, |c| {
        let word = c.read_u32()?;
        Ok([unorm10(word, 0), unorm10(word, 10), unorm10(word, 20)])
    })
}

fn read_weight_extra(cursor: &mut ByteCursor) -> DecodeResult<SubBuffer<f32>> {
    let header = BufferHeader::read(cursor)?;
    header.records(cursor, 4, |c| c.read_f32())
}

fn read_blendshape_index(cursor: &mut ByteCursor) -> DecodeResult<SubBuffer<i32>> {
    let header = BufferHeader::read(cursor)?;
    header.expect_stride("blend-shape index", 4)?;
    header.records(cursor, 4, |c| c.read_i32())
}

fn read_blendshape_position(cursor: &mut ByteCursor) -> DecodeResult<SubBuffer<BlendShapeGroup>> {
    let header = BufferHeader::read(cursor)?;
    header.expect_stride("blend-shape position", 8)?;
    let records = header.records(cursor, 8, |c| {
        let position = [unorm16(c.read_u16()?), unorm16(c.read_u16()?), unorm16(c.read_u16()?)];
        Ok((c.read_u16()?, position))
    })?;
    let mut groups = BTreeMap::<u16, Vec<[f32; 3]>>::new();
    for (index, position) in records.items {
        groups.entry(index).or_default().push(position);
    }
    let items = groups
        .into_iter()
        .map(|(index, positions)| BlendShapeGroup { index, positions })
        .collect();
    Ok(SubBuffer { stride: header.stride, items })
}

impl VertexBuffers {
    /// Reads the sub-buffers whose flags are set, in their fixed stream order.
    pub fn decode(cursor: &mut ByteCursor, flags: VertexFlags) -> DecodeResult<Self> {
        fn gated<T>(
            present: bool,
            cursor: &mut ByteCursor,
            read: fn(&mut ByteCursor) -> DecodeResult<T>,
        ) -> DecodeResult<Option<T>> {
            if present {
                read(cursor).map(Some)
            } else {
                Ok(None)
            }
        }

        let buffers = Self {
            flags,
            position: gated(flags.has_position, cursor, read_position)?,
            uv0: gated(flags.has_uv0, cursor, read_uv)?,
            uv1: gated(flags.has_uv1, cursor, read_uv)?,
            uv2: gated(flags.has_uv2, cursor, read_uv)?,
            normal: gated(flags.has_normal, cursor, read_normal)?,
            color: gated(flags.has_color, cursor, read_color)?,
            weight_index: gated(flags.has_blend_indices, cursor, read_weight_index)?,
            weight: gated(flags.has_blend_weights, cursor, read_weight)?,
            weight_extra: gated(flags.has_blend_weights_extra, cursor, read_weight_extra)?,
            blendshape_index: gated(flags.has_blendshape_index, cursor, read_blendshape_index)?,
            blendshape_position: gated(
                flags.has_blendshape_position,
                cursor,
                read_blendshape_position,
            )?,
        };
        log::trace!("Vertex buffers: {} vertices", buffers.vertex_count());
        Ok(buffers)
    }

    pub fn vertex_count(&self) -> usize { self.position.as_ref().map_or(0, SubBuffer::len) }

    /// Pairs the weight-index and weight buffers per vertex, with weights normalized to sum 1.
    ///
    /// Sections without weights, and rigid-boned sections without the weight flag, bind each
    /// index with weight 1. Other layouts carry an implied final weight of 1 unless the vertex
    /// type is [`VertexType::Skinned8Weights`]. Zero weights drop their index.
    pub fn enumerate_blend_pairs(
        &self,
        vertex_type: VertexType,
    ) -> impl Iterator<Item = BlendPair> + '_ {
        let indices = self.weight_index.as_ref().map_or(&[][..], |b| &b.items[..]);
        let weights = self.weight.as_ref().map_or(&[][..], |b| &b.items[..]);
        let rigid = weights.is_empty();
        let rigid_boned = vertex_type == VertexType::RigidBoned && !self.flags.has_blend_weights;
        let implied = vertex_type != VertexType::Skinned8Weights && self.flags.has_blend_weights;

        (0..self.vertex_count()).filter_map(move |vertex| {
            let mut blend_indices = indices.get(vertex)?.to_vec();
            let mut blend_weights = if rigid || rigid_boned {
                vec![1.0; blend_indices.len()]
            } else {
                let mut w = weights.get(vertex)?.to_vec();
                if implied {
                    w.push(1.0);
                }
                w
            };
            if !(rigid || rigid_boned) && blend_weights.contains(&0.0) {
                (blend_indices, blend_weights) = blend_indices
                    .iter()
                    .zip(&blend_weights)
                    .filter(|(_, w)| **w > 0.0)
                    .map(|(i, w)| (*i, *w))
                    .unzip();
            }
            let sum: f32 = blend_weights.iter().sum();
            if sum > 0.0 {
                blend_weights.iter_mut().for_each(|w| *w /= sum);
            }
            Some(BlendPair { vertex, indices: blend_indices, weights: blend_weights })
        })
    }
}

#[inline]
pub fn decode_vertex_buffers(
    cursor: &mut ByteCursor,
    flags: VertexFlags,
) -> DecodeResult<VertexBuffers> {
    VertexBuffers::decode(cursor, flags)
}
