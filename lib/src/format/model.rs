//! SURA model container.
//!
//! The file is a flat little-endian stream: header, regions, bones, markers,
//! bounding boxes, material ids, blend-shape bounding boxes, sections and, for
//! rtgo models, an offset table.

use binrw::{BinRead, BinReaderExt};
use binrw_derive::binread;
use serde_derive::Serialize;

use crate::{
    error::{DecodeError, DecodeResult},
    format::{
        mesh::{IndexBuffer, Submesh, VertexFlags, VertexType},
        peek_four_cc,
        vertex::{decode_vertex_buffers, BlendPair, VertexBuffers},
        AxisRange, Bounds, FourCC, Matrix4x4, Vector3, Vector4,
    },
    util::ByteCursor,
};

pub const MODEL_MAGIC: FourCC = FourCC(*b"SURA");

/// Marker node index meaning "not bound to a bone".
pub const UNBOUND_NODE: u8 = 255;

#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ModelHeader {
    #[br(map = FourCC)]
    pub magic: FourCC,
    pub tag_id: i32,
    #[br(map = |b: u8| b != 0)]
    pub is_rtgo: bool,
    pub region_count: u32,
    pub node_count: u32,
    pub marker_count: u32,
    pub material_count: u32,
    pub section_count: u32,
    pub bounding_box_count: u32,
    pub blendshape_bounding_box_count: u32,
    #[br(if(is_rtgo))]
    pub offset_count: u32,
}

#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Permutation {
    pub name: i32,
    pub section_count: u16,
    pub section_index: u16,
}

#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Region {
    pub name: i32,
    #[br(temp)]
    permutation_count: u32,
    #[br(count = permutation_count)]
    pub permutations: Vec<Permutation>,
}

#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Bone {
    pub name: i32,
    pub parent_index: i32,
    pub local_transform: Matrix4x4,
    pub world_transform: Matrix4x4,
}

impl Bone {
    /// Parent bone index, `None` for a root.
    pub fn parent(&self) -> Option<usize> { usize::try_from(self.parent_index).ok() }
}

#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MarkerInstance {
    pub position: Vector3,
    pub rotation: Vector4,
    pub region_index: i8,
    pub permutation_index: i32,
    pub node_index: u8,
}

impl MarkerInstance {
    pub fn node(&self) -> Option<usize> {
        (self.node_index != UNBOUND_NODE).then_some(self.node_index as usize)
    }
}

#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Marker {
    pub name: i32,
    #[br(temp)]
    instance_count: u32,
    #[br(count = instance_count)]
    pub instances: Vec<MarkerInstance>,
}

/// Compression bounds for positions and the three UV channels.
#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: Bounds,
    pub y: Bounds,
    pub z: Bounds,
    pub u0: Bounds,
    pub v0: Bounds,
    pub u1: Bounds,
    pub v1: Bounds,
    pub u2: Bounds,
    pub v2: Bounds,
}

impl BoundingBox {
    pub fn model_scale(&self) -> [AxisRange; 3] { [self.x.axis(), self.y.axis(), self.z.axis()] }

    /// `(u, v)` ranges for UV channel 0, 1 or 2.
    pub fn uv_scale(&self, channel: usize) -> Option<[AxisRange; 2]> {
        let (u, v) = match channel {
            0 => (&self.u0, &self.v0),
            1 => (&self.u1, &self.v1),
            2 => (&self.u2, &self.v2),
            _ => return None,
        };
        Some([u.axis(), v.axis()])
    }

    pub fn dequantize_position(&self, normalized: [f32; 4]) -> [f32; 3] {
        let [x, y, z] = self.model_scale();
        [x.expand(normalized[0]), y.expand(normalized[1]), z.expand(normalized[2])]
    }

    pub fn dequantize_uv(&self, channel: usize, normalized: [f32; 2]) -> Option<[f32; 2]> {
        let [u, v] = self.uv_scale(channel)?;
        Some([u.expand(normalized[0]), v.expand(normalized[1])])
    }
}

#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BlendShapeBoundingBox {
    pub position_scale: Vector3,
    pub position_offset: Vector3,
    pub normal_scale: Vector3,
    pub normal_offset: Vector3,
}

#[binread]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RtgoOffset {
    pub name: i32,
    pub mesh_index: i16,
    pub position: Vector3,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Section {
    pub region_name: i32,
    pub permutation_name: i32,
    /// Bone the whole section is bound to, negative when unbound.
    pub node_index: i8,
    pub vertex_type: VertexType,
    pub use_dual_quat: bool,
    pub submeshes: Vec<Submesh>,
    pub index_buffer: IndexBuffer,
    pub vertex_buffers: VertexBuffers,
}

impl Section {
    pub fn read(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        let region_name = cursor.read_i32()?;
        let permutation_name = cursor.read_i32()?;
        let submesh_count = cursor.read_u32()? as usize;
        let node_index = cursor.read_i8()?;
        let vertex_type = VertexType::read(cursor)?;
        let use_dual_quat = cursor.read_u8()? != 0;
        let submeshes =
            cursor.read_vec(submesh_count, 16, |c| c.parse(|c| c.read_le::<Submesh>()))?;
        let index_buffer = IndexBuffer::read(cursor)?;
        let flags: VertexFlags = cursor.parse(|c| c.read_le())?;
        let vertex_buffers = decode_vertex_buffers(cursor, flags)?;
        log::debug!(
            "Section {region_name}/{permutation_name}: {vertex_type}, \
             {} submeshes, {} indices, {} vertices",
            submeshes.len(),
            index_buffer.indices.len(),
            vertex_buffers.vertex_count()
        );
        Ok(Self {
            region_name,
            permutation_name,
            node_index,
            vertex_type,
            use_dual_quat,
            submeshes,
            index_buffer,
            vertex_buffers,
        })
    }

    #[inline]
    pub fn vertex_flags(&self) -> VertexFlags { self.vertex_buffers.flags }

    pub fn rigid_node(&self) -> Option<usize> { usize::try_from(self.node_index).ok() }

    pub fn blend_pairs(&self) -> impl Iterator<Item = BlendPair> + '_ {
        self.vertex_buffers.enumerate_blend_pairs(self.vertex_type)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Model {
    pub header: ModelHeader,
    pub regions: Vec<Region>,
    pub bones: Vec<Bone>,
    pub markers: Vec<Marker>,
    pub bounding_boxes: Vec<BoundingBox>,
    pub materials: Vec<i32>,
    pub blendshape_bounding_boxes: Vec<BlendShapeBoundingBox>,
    pub sections: Vec<Section>,
    pub offsets: Vec<RtgoOffset>,
}

impl Model {
    /// Material id referenced by a submesh. Out-of-range shader indices yield `None`.
    pub fn material_for(&self, submesh: &Submesh) -> Option<i32> {
        let index = usize::try_from(submesh.shader_index).ok()?;
        self.materials.get(index).copied()
    }
}

fn read_header(cursor: &mut ByteCursor) -> DecodeResult<ModelHeader> {
    let offset = cursor.position();
    let found = peek_four_cc(cursor.peek(4)?).unwrap_or_default();
    if found != MODEL_MAGIC {
        return Err(DecodeError::BadMagic { offset, expected: MODEL_MAGIC, found });
    }
    cursor.parse(|c| c.read_le())
}

/// `count` fixed-layout records of at least `min_size` bytes each.
fn read_records<T>(cursor: &mut ByteCursor, count: u32, min_size: usize) -> DecodeResult<Vec<T>>
where T: for<'a> BinRead<Args<'a> = ()> {
    cursor.read_vec(count as usize, min_size, |c| c.parse(|c| c.read_le::<T>()))
}

/// Decodes one model starting at the cursor position.
pub fn decode_model(cursor: &mut ByteCursor) -> DecodeResult<Model> {
    let header = read_header(cursor)?;
    log::debug!("Model header: {header:?}");

    let regions = read_records::<Region>(cursor, header.region_count, 8)?;
    let bones = read_records::<Bone>(cursor, header.node_count, 136)?;
    let markers = read_records::<Marker>(cursor, header.marker_count, 8)?;
    let bounding_boxes = read_records::<BoundingBox>(cursor, header.bounding_box_count, 72)?;
    let materials = cursor.read_vec(header.material_count as usize, 4, ByteCursor::read_i32)?;
    let blendshape_bounding_boxes = read_records::<BlendShapeBoundingBox>(
        cursor,
        header.blendshape_bounding_box_count,
        48,
    )?;
    let sections = cursor.read_vec(header.section_count as usize, 32, Section::read)?;
    // Offsets follow the sections in this layout, not the bounding boxes.
    let offsets = read_records::<RtgoOffset>(cursor, header.offset_count, 18)?;

    log::debug!(
        "Model {}: {} regions, {} bones, {} markers, {} materials, {} sections, {} offsets",
        header.tag_id,
        regions.len(),
        bones.len(),
        markers.len(),
        materials.len(),
        sections.len(),
        offsets.len()
    );
    Ok(Model {
        header,
        regions,
        bones,
        markers,
        bounding_boxes,
        materials,
        blendshape_bounding_boxes,
        sections,
        offsets,
    })
}

/// Decodes a whole buffer as one model. Trailing bytes are logged, not rejected.
pub fn decode_model_bytes(data: &[u8]) -> DecodeResult<Model> {
    let mut cursor = ByteCursor::new(data);
    let model = decode_model(&mut cursor)?;
    if !cursor.is_at_end() {
        log::warn!(
            "{} trailing bytes after model at offset {:#x}",
            cursor.remaining(),
            cursor.position()
        );
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(counts: [u32; 7], rtgo: Option<u32>) -> Vec<u8> {
        let mut out = b"SURA".to_vec();
        out.extend_from_slice(&42i32.to_le_bytes());
        out.push(rtgo.is_some() as u8);
        for count in counts {
            out.extend_from_slice(&count.to_le_bytes());
        }
        if let Some(offsets) = rtgo {
            out.extend_from_slice(&offsets.to_le_bytes());
        }
        out
    }

    #[test]
    fn header_conditional_offset_count() {
        let data = header_bytes([1, 2, 3, 4, 5, 6, 7], None);
        let header: ModelHeader = ByteCursor::new(&data).parse(|c| c.read_le()).unwrap();
        assert_eq!(header.magic, MODEL_MAGIC);
        assert_eq!(header.tag_id, 42);
        assert!(!header.is_rtgo);
        assert_eq!(header.material_count, 4);
        assert_eq!(header.blendshape_bounding_box_count, 7);
        assert_eq!(header.offset_count, 0);

        let data = header_bytes([0; 7], Some(9));
        let mut cursor = ByteCursor::new(&data);
        let header = read_header(&mut cursor).unwrap();
        assert!(header.is_rtgo);
        assert_eq!(header.offset_count, 9);
        assert!(cursor.is_at_end());
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut data = header_bytes([0; 7], None);
        data[..4].copy_from_slice(b"ARUS");
        let err = decode_model_bytes(&data).unwrap_err();
        match err {
            DecodeError::BadMagic { offset, expected, found } => {
                assert_eq!(offset, 0);
                assert_eq!(expected, MODEL_MAGIC);
                assert_eq!(found, *b"ARUS");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(decode_model_bytes(b"SU"), Err(DecodeError::UnexpectedEof { offset: 0 })));
    }

    #[test]
    fn region_and_marker_records() {
        let mut data = Vec::new();
        data.extend_from_slice(&7i32.to_le_bytes());
        data.extend_from_slice(&2u32.to_le_bytes());
        for (name, count, index) in [(1i32, 1u16, 0u16), (2, 3, 1)] {
            data.extend_from_slice(&name.to_le_bytes());
            data.extend_from_slice(&count.to_le_bytes());
            data.extend_from_slice(&index.to_le_bytes());
        }
        let region: Region = ByteCursor::new(&data).parse(|c| c.read_le()).unwrap();
        assert_eq!(region.name, 7);
        assert_eq!(region.permutations[1], Permutation {
            name: 2,
            section_count: 3,
            section_index: 1
        });

        let mut data = Vec::new();
        data.extend_from_slice(&3i32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        for f in [1.0f32, 2.0, 3.0, 0.0, 0.0, 0.0, 1.0] {
            data.extend_from_slice(&f.to_le_bytes());
        }
        data.push(0xFF);
        data.extend_from_slice(&(-1i32).to_le_bytes());
        data.push(UNBOUND_NODE);
        let mut cursor = ByteCursor::new(&data);
        let marker: Marker = cursor.parse(|c| c.read_le()).unwrap();
        assert!(cursor.is_at_end());
        let instance = &marker.instances[0];
        assert_eq!(instance.position.to_array(), [1.0, 2.0, 3.0]);
        assert_eq!(instance.region_index, -1);
        assert_eq!(instance.permutation_index, -1);
        assert_eq!(instance.node(), None);
    }

    #[test]
    fn bounding_box_dequantizes() {
        let bounds = |min, max| Bounds { min, max };
        let bbox = BoundingBox {
            x: bounds(-1.0, 1.0),
            y: bounds(0.0, 10.0),
            z: bounds(5.0, 5.0),
            u0: bounds(0.0, 2.0),
            v0: bounds(-1.0, 0.0),
            ..Default::default()
        };
        assert_eq!(bbox.dequantize_position([0.0, 1.0, 0.5, 1.0]), [-1.0, 10.0, 5.0]);
        assert_eq!(bbox.dequantize_uv(0, [0.5, 1.0]), Some([1.0, 0.0]));
        assert_eq!(bbox.uv_scale(2).map(|s| s[0].range), Some(0.0));
        assert_eq!(bbox.uv_scale(3), None);
    }

    #[test]
    fn material_lookup_tolerates_out_of_range() {
        let model = Model {
            header: ModelHeader::default(),
            regions: Vec::new(),
            bones: Vec::new(),
            markers: Vec::new(),
            bounding_boxes: Vec::new(),
            materials: vec![100, 200],
            blendshape_bounding_boxes: Vec::new(),
            sections: Vec::new(),
            offsets: Vec::new(),
        };
        let submesh = |shader_index| Submesh { shader_index, ..Default::default() };
        assert_eq!(model.material_for(&submesh(1)), Some(200));
        assert_eq!(model.material_for(&submesh(2)), None);
        assert_eq!(model.material_for(&submesh(-1)), None);
    }
}
