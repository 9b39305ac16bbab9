use binrw_derive::binread;
use serde_derive::Serialize;
use strum::{Display, FromRepr};

use crate::{
    error::{DecodeError, DecodeResult},
    util::ByteCursor,
};

/// Vertex layout of a section. Governs how many blend slots each vertex carries.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display, FromRepr, Serialize)]
pub enum VertexType {
    World = 0,
    Rigid = 1,
    Skinned = 2,
    ParticleModel = 3,
    Screen = 4,
    Debug = 5,
    Transparent = 6,
    Particle = 7,
    Removed08 = 8,
    Removed09 = 9,
    ChudSimple = 10,
    Decorator = 11,
    PositionOnly = 12,
    Removed13 = 13,
    Ripple = 14,
    Removed15 = 15,
    TessellatedTerrain = 16,
    Empty = 17,
    Decal = 18,
    Removed19 = 19,
    Removed20 = 20,
    PositionOnly2D = 21,
    Tracer = 22,
    RigidBoned = 23,
    Removed24 = 24,
    CheapParticle = 25,
    DqSkinned = 26,
    Skinned8Weights = 27,
    TessellatedVector = 28,
    Interaction = 29,
}

impl VertexType {
    pub fn read(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        let offset = cursor.position();
        let value = cursor.read_u8()?;
        Self::from_repr(value).ok_or(DecodeError::InvalidEnum {
            offset,
            kind: "vertex type",
            value: value.into(),
        })
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display, FromRepr, Serialize)]
pub enum IndexBufferType {
    Default = 0,
    LineList = 1,
    LineStrip = 2,
    TriangleList = 3,
    TrianglePatch = 4,
    TriangleStrip = 5,
    QuadList = 6,
}

#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Submesh {
    // Start precedes count in this layout.
    pub index_start: i32,
    pub index_count: i32,
    pub vertex_count: u16,
    pub subset_count: u16,
    pub subset_index: i16,
    /// Index into the model's material id list. May be out of range.
    pub shader_index: i16,
}

impl Submesh {
    /// Range of this submesh inside the section's index buffer, if non-negative.
    pub fn index_range(&self) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(self.index_start).ok()?;
        let count = usize::try_from(self.index_count).ok()?;
        Some(start..start + count)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndexBuffer {
    pub topology: IndexBufferType,
    /// Bytes per index: 1, 2 or 4.
    pub stride: i8,
    pub indices: Vec<u32>,
}

impl IndexBuffer {
    pub fn read(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        let offset = cursor.position();
        let raw = cursor.read_u8()?;
        let topology = IndexBufferType::from_repr(raw).ok_or(DecodeError::InvalidEnum {
            offset,
            kind: "index buffer topology",
            value: raw.into(),
        })?;
        let stride_offset = cursor.position();
        let stride = cursor.read_i8()?;
        let width = match stride {
            1 | 2 | 4 => stride as usize,
            _ => {
                return Err(DecodeError::InvalidStride {
                    offset: stride_offset,
                    buffer: "index",
                    stride,
                })
            }
        };
        let count = cursor.read_u32()? as usize;
        let indices = cursor.read_vec(count, width, |c| c.read_uint(width).map(|i| i as u32))?;
        Ok(Self { topology, stride, indices })
    }

    /// Triangles described by this buffer. Empty for non-triangle topologies.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        match self.topology {
            IndexBufferType::TriangleList => {
                self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect()
            }
            IndexBufferType::TriangleStrip => self
                .indices
                .windows(3)
                .enumerate()
                .filter(|(_, t)| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
                .map(|(i, t)| if i % 2 == 0 { [t[0], t[1], t[2]] } else { [t[1], t[0], t[2]] })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Presence flags for the optional vertex sub-buffers, one byte each.
#[binread]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VertexFlags {
    #[br(map = |b: u8| b != 0)]
    pub has_position: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_uv0: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_uv1: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_uv2: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_normal: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_color: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_blend_indices: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_blend_weights: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_blend_weights_extra: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_blendshape_index: bool,
    #[br(map = |b: u8| b != 0)]
    pub has_blendshape_position: bool,
}

#[cfg(test)]
mod tests {
    use binrw::BinReaderExt;

    use super::*;

    #[test]
    fn vertex_type_from_byte() {
        assert_eq!(VertexType::from_repr(2), Some(VertexType::Skinned));
        assert_eq!(VertexType::from_repr(23), Some(VertexType::RigidBoned));
        assert_eq!(VertexType::from_repr(29), Some(VertexType::Interaction));
        assert_eq!(VertexType::from_repr(30), None);

        let mut cursor = ByteCursor::new(&[40]);
        assert!(matches!(
            VertexType::read(&mut cursor),
            Err(DecodeError::InvalidEnum { offset: 0, value: 40, .. })
        ));
    }

    #[test]
    fn index_buffer_widths() {
        let mut data = vec![3u8, 2];
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&[0, 0, 1, 0, 0xFF, 0xFF]);
        let mut cursor = ByteCursor::new(&data);
        let ibuf = IndexBuffer::read(&mut cursor).unwrap();
        assert_eq!(ibuf.topology, IndexBufferType::TriangleList);
        assert_eq!(ibuf.indices, vec![0, 1, 0xFFFF]);
        assert_eq!(ibuf.triangles(), vec![[0, 1, 0xFFFF]]);
        assert!(cursor.is_at_end());

        let mut data = vec![5u8, 1];
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&[0, 1, 2, 3]);
        let ibuf = IndexBuffer::read(&mut ByteCursor::new(&data)).unwrap();
        assert_eq!(ibuf.triangles(), vec![[0, 1, 2], [2, 1, 3]]);
    }

    #[test]
    fn index_buffer_rejects_odd_stride() {
        let mut data = vec![3u8, 3];
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[0, 0, 0]);
        let err = IndexBuffer::read(&mut ByteCursor::new(&data)).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidStride { offset: 1, stride: 3, .. }));
    }

    #[test]
    fn index_buffer_truncated() {
        let mut data = vec![3u8, 4];
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[0, 0, 0, 0, 1]);
        let err = IndexBuffer::read(&mut ByteCursor::new(&data)).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { offset: 10 }));
    }

    #[test]
    fn flags_and_submesh() {
        let flags_data = [1u8, 0, 0, 0, 2, 0, 0, 0, 0, 0, 1];
        let mut cursor = ByteCursor::new(&flags_data);
        let flags: VertexFlags = cursor.parse(|c| c.read_le()).unwrap();
        assert!(flags.has_position && flags.has_normal && flags.has_blendshape_position);
        assert!(!flags.has_uv0 && !flags.has_blendshape_index);

        let mut data = Vec::new();
        data.extend_from_slice(&6i32.to_le_bytes());
        data.extend_from_slice(&3i32.to_le_bytes());
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&(-1i16).to_le_bytes());
        data.extend_from_slice(&7i16.to_le_bytes());
        let submesh: Submesh = ByteCursor::new(&data).parse(|c| c.read_le()).unwrap();
        assert_eq!(submesh.index_range(), Some(6..9));
        assert_eq!(submesh.subset_index, -1);
        assert_eq!(submesh.shader_index, 7);
    }
}
