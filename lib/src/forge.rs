//! Forge map placements decoded from a Bond value tree.

use serde_derive::Serialize;
use uuid::Uuid;

use crate::{
    bond::{decode_value_tree, DecodeLimits, TaggedValue},
    error::DecodeResult,
};

/// Folder id used when a folder record carries none.
pub const ROOT_FOLDER_ID: i64 = u32::MAX as i64;

const BLOB_HOST: &str = "https://blobs-infiniteugc.svc.halowaypoint.com/ugcstorage/map";

/// URL of the map variant blob for an asset/version pair.
pub fn blob_url(asset_id: &Uuid, version_id: &Uuid) -> String {
    format!("{BLOB_HOST}/{asset_id}/{version_id}/map.mvar")
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlacedObject {
    /// Position among the placement list siblings.
    pub index: usize,
    pub global_id: i64,
    pub position: [f32; 3],
    pub rotation_up: [f32; 3],
    pub rotation_forward: [f32; 3],
    /// Empty when the map stores no scale for this object.
    pub scale: Vec<f32>,
    pub variant: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ForgeFolderEntry {
    pub index: i64,
    pub name: String,
    pub parent: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ForgeFolder {
    pub name: String,
    pub id: i64,
    pub parent: i64,
    pub objects: Vec<ForgeFolderEntry>,
    pub subfolders: Vec<ForgeFolder>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ForgeMap {
    pub objects: Vec<PlacedObject>,
    pub folders: Vec<ForgeFolder>,
    pub root_folder: i64,
}

/// Required field path absent or of the wrong type.
#[derive(Debug)]
struct MissingField(&'static str);

fn require<'v>(
    value: Option<&'v TaggedValue>,
    path: &'static str,
) -> Result<&'v TaggedValue, MissingField> {
    value.ok_or(MissingField(path))
}

fn require_int(value: Option<&TaggedValue>, path: &'static str) -> Result<i64, MissingField> {
    value.and_then(TaggedValue::as_i64).ok_or(MissingField(path))
}

/// Vector stored as float fields 0, 1 and 2. Fields holding their default value are omitted on
/// the wire, so each component goes to the slot named by its id.
fn components(value: &TaggedValue, default: [f32; 3]) -> [f32; 3] {
    let mut out = default;
    for child in value.children() {
        if let (Some(slot), Some(v)) = (out.get_mut(usize::from(child.id)), child.as_f64()) {
            *slot = v as f32;
        }
    }
    out
}

fn try_extract(root: &TaggedValue) -> Result<PlacedObject, MissingField> {
    let global_id = require_int(root.traverse(&[2, 0]), "2.0")?;

    let position = components(require(root.get_by_id(3), "3")?, [0.0; 3]);
    // Up defaults to +Z.
    let rotation_up = components(require(root.get_by_id(4), "4")?, [0.0, 0.0, 1.0]);
    let rotation_forward = components(require(root.get_by_id(5), "5")?, [0.0; 3]);

    let properties = require(root.get_by_id(8), "8")?;
    let variant = require_int(
        properties
            .get_by_id(24)
            .and_then(|v| v.nth(0))
            .and_then(|v| v.nth(1))
            .and_then(|v| v.nth(0)),
        "8.24[0][1][0]",
    )?;
    let scale = properties.traverse(&[23, 0, 0]).map(TaggedValue::floats).unwrap_or_default();

    Ok(PlacedObject {
        index: 0,
        global_id,
        position,
        rotation_up,
        rotation_forward,
        scale,
        variant,
    })
}

/// Reads one placement record. Returns `None` when a required field is missing.
pub fn extract_placed_object(root: &TaggedValue) -> Option<PlacedObject> {
    match try_extract(root) {
        Ok(object) => Some(object),
        Err(MissingField(path)) => {
            log::debug!("Skipping placement without field {path}");
            None
        }
    }
}

fn folder_entry(value: &TaggedValue) -> ForgeFolderEntry {
    ForgeFolderEntry {
        index: value.get_by_id(8).and_then(TaggedValue::as_i64).unwrap_or_default(),
        name: value.get_by_id(2).and_then(TaggedValue::as_str).unwrap_or_default().to_string(),
        parent: value.get_by_id(6).and_then(TaggedValue::as_i64).unwrap_or_default(),
    }
}

fn subfolder(value: &TaggedValue) -> Option<ForgeFolder> {
    let id = value.get_by_id(1).and_then(TaggedValue::as_i64).unwrap_or_default();
    let objects = value
        .get_by_id(7)?
        .children()
        .iter()
        .map(folder_entry)
        .filter(|entry| entry.parent == id)
        .collect();
    Some(ForgeFolder {
        name: value.get_by_id(2).and_then(TaggedValue::as_str).unwrap_or_default().to_string(),
        id,
        parent: value.get_by_id(5).and_then(TaggedValue::as_i64).unwrap_or_default(),
        objects,
        subfolders: Vec::new(),
    })
}

fn read_folders(value: &TaggedValue) -> Vec<ForgeFolder> {
    let Some(folders) = value.get_by_id(0) else { return Vec::new() };
    let mut out = Vec::new();
    for folder in folders.children() {
        let Some(children) = folder.get_by_id(1) else { continue };
        let mut result = ForgeFolder {
            name: folder.get_by_id(2).and_then(TaggedValue::as_str).unwrap_or_default().to_string(),
            id: folder.get_by_id(0).and_then(TaggedValue::as_i64).unwrap_or(ROOT_FOLDER_ID),
            ..Default::default()
        };
        for child in children.children() {
            // Object entries carry an id 0 field, subfolders do not.
            if child.get_by_id(0).is_some() {
                result.objects.push(folder_entry(child));
            } else if let Some(sub) = subfolder(child) {
                result.subfolders.push(sub);
            }
        }
        out.push(result);
    }
    out
}

/// Extracts placements and the folder tree from a decoded map root.
pub fn forge_map_from_tree(root: &TaggedValue) -> ForgeMap {
    let mut objects = Vec::new();
    if let Some(items) = root.get_by_id(3) {
        for (index, item) in items.children().iter().enumerate() {
            if let Some(object) = extract_placed_object(item) {
                objects.push(PlacedObject { index, ..object });
            }
        }
    }
    let (folders, root_folder) = match root.get_by_id(6) {
        Some(value) => (
            read_folders(value),
            value.get_by_id(1).and_then(TaggedValue::as_i64).unwrap_or_default(),
        ),
        None => (Vec::new(), 0),
    };
    log::debug!("Forge map: {} objects, {} folders", objects.len(), folders.len());
    ForgeMap { objects, folders, root_folder }
}

/// Decodes a map variant blob.
pub fn read_forge_map(data: &[u8], limits: DecodeLimits) -> DecodeResult<ForgeMap> {
    let root = decode_value_tree(data, limits)?;
    Ok(forge_map_from_tree(&root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bond::{Payload, TypeTag},
        util::varint::tests::{encode_sleb128, encode_uleb128},
    };

    fn float(id: u16, v: f32) -> TaggedValue {
        TaggedValue::new(id, TypeTag::Float, Payload::Float(v))
    }

    fn int(id: u16, v: i64) -> TaggedValue { TaggedValue::new(id, TypeTag::Int64, Payload::Int(v)) }

    fn node(id: u16, children: Vec<TaggedValue>) -> TaggedValue {
        TaggedValue::new(id, TypeTag::Struct, Payload::Elements(children))
    }

    fn placement(
        forward: Vec<TaggedValue>,
        up: Vec<TaggedValue>,
        scale: Option<Vec<TaggedValue>>,
    ) -> TaggedValue {
        let variant = node(0, vec![int(0, 1), node(1, vec![int(0, 9)])]);
        let mut properties = vec![node(24, vec![variant])];
        if let Some(scale) = scale {
            properties.push(node(23, vec![node(0, vec![node(0, scale)])]));
        }
        node(0, vec![
            node(2, vec![int(0, 1234)]),
            node(3, vec![float(0, 1.0), float(1, 2.0), float(2, 3.0)]),
            node(4, up),
            node(5, forward),
            node(8, properties),
        ])
    }

    #[test]
    fn extracts_full_record() {
        let tree = placement(
            vec![float(0, 1.0), float(1, 0.0), float(2, 0.0)],
            vec![float(0, 0.0), float(1, 0.0), float(2, 1.0)],
            Some(vec![float(0, 2.0), float(1, 2.0), float(2, 2.0)]),
        );
        let object = extract_placed_object(&tree).unwrap();
        assert_eq!(object.global_id, 1234);
        assert_eq!(object.position, [1.0, 2.0, 3.0]);
        assert_eq!(object.rotation_forward, [1.0, 0.0, 0.0]);
        assert_eq!(object.rotation_up, [0.0, 0.0, 1.0]);
        assert_eq!(object.scale, vec![2.0, 2.0, 2.0]);
        assert_eq!(object.variant, 9);
    }

    #[test]
    fn pads_short_rotations() {
        let tree = placement(vec![float(0, 5.0)], vec![float(0, 0.25), float(1, 0.5)], None);
        let object = extract_placed_object(&tree).unwrap();
        assert_eq!(object.rotation_forward, [5.0, 0.0, 0.0]);
        assert_eq!(object.rotation_up, [0.25, 0.5, 1.0]);
        assert!(object.scale.is_empty());

        let tree = placement(vec![float(0, 1.0), float(1, 2.0)], vec![float(0, 3.0)], None);
        let object = extract_placed_object(&tree).unwrap();
        assert_eq!(object.rotation_forward, [1.0, 2.0, 0.0]);
        assert_eq!(object.rotation_up, [3.0, 0.0, 1.0]);
    }

    #[test]
    fn omitted_components_keep_their_slot() {
        let mut tree = placement(vec![float(1, 1.0)], vec![float(2, 1.0)], None);
        if let Payload::Elements(fields) = &mut tree.payload {
            fields[1] = node(3, vec![float(1, 2.0), float(2, 3.0)]);
        }
        let object = extract_placed_object(&tree).unwrap();
        assert_eq!(object.position, [0.0, 2.0, 3.0]);
        assert_eq!(object.rotation_up, [0.0, 0.0, 1.0]);
        assert_eq!(object.rotation_forward, [0.0, 1.0, 0.0]);

        let tree = placement(vec![float(2, -1.0)], vec![float(0, 0.5), float(2, 0.0)], None);
        let object = extract_placed_object(&tree).unwrap();
        assert_eq!(object.rotation_forward, [0.0, 0.0, -1.0]);
        assert_eq!(object.rotation_up, [0.5, 0.0, 0.0]);
    }

    #[test]
    fn missing_or_mistyped_id_is_skipped() {
        let mut tree = placement(vec![float(0, 1.0)], vec![float(0, 1.0)], None);
        if let Payload::Elements(fields) = &mut tree.payload {
            fields.remove(0);
        }
        assert_eq!(extract_placed_object(&tree), None);

        let mut tree = placement(vec![float(0, 1.0)], vec![float(0, 1.0)], None);
        if let Payload::Elements(fields) = &mut tree.payload {
            fields[0] = node(2, vec![float(0, 1.0)]);
        }
        assert_eq!(extract_placed_object(&tree), None);

        let mut tree = placement(vec![float(0, 1.0)], vec![float(0, 1.0)], None);
        if let Payload::Elements(fields) = &mut tree.payload {
            fields.retain(|f| f.id != 8);
        }
        assert_eq!(extract_placed_object(&tree), None);
    }

    #[test]
    fn blob_url_template() {
        let asset = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let version = Uuid::nil();
        assert_eq!(
            blob_url(&asset, &version),
            "https://blobs-infiniteugc.svc.halowaypoint.com/ugcstorage/map/\
             01234567-89ab-cdef-0123-456789abcdef/00000000-0000-0000-0000-000000000000/map.mvar"
        );
    }

    /// Minimal compact-binary writer for map fixtures.
    #[derive(Default)]
    struct Writer(Vec<u8>);

    impl Writer {
        fn header(&mut self, id: u16, kind: TypeTag) -> &mut Self {
            match id {
                0..=5 => self.0.push(((id as u8) << 5) | kind as u8),
                6..=255 => self.0.extend_from_slice(&[0xC0 | kind as u8, id as u8]),
                _ => {
                    self.0.push(0xE0 | kind as u8);
                    self.0.extend_from_slice(&id.to_le_bytes());
                }
            }
            self
        }

        fn int(&mut self, id: u16, v: i64) -> &mut Self {
            self.header(id, TypeTag::Int64);
            encode_sleb128(v, &mut self.0);
            self
        }

        fn uint(&mut self, id: u16, v: u64) -> &mut Self {
            self.header(id, TypeTag::Uint32);
            encode_uleb128(v, &mut self.0);
            self
        }

        fn float(&mut self, id: u16, v: f32) -> &mut Self {
            self.header(id, TypeTag::Float);
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }

        fn string(&mut self, id: u16, s: &str) -> &mut Self {
            self.header(id, TypeTag::String);
            encode_uleb128(s.len() as u64, &mut self.0);
            self.0.extend_from_slice(s.as_bytes());
            self
        }

        fn begin_struct(&mut self, id: u16) -> &mut Self {
            self.header(id, TypeTag::Struct);
            self.0.push(0);
            self
        }

        /// List of structs; each element starts with [`Writer::element`].
        fn begin_list(&mut self, id: u16, count: u8) -> &mut Self {
            self.header(id, TypeTag::List);
            self.0.push(((count + 1) << 5) | TypeTag::Struct as u8);
            self
        }

        fn element(&mut self) -> &mut Self {
            self.0.push(0);
            self
        }

        fn end(&mut self) -> &mut Self {
            self.0.push(TypeTag::Stop as u8);
            self
        }
    }

    #[test]
    fn reads_objects_and_folders() {
        let mut w = Writer::default();
        w.element().begin_list(3, 2);
        // Complete placement
        w.element();
        w.begin_struct(2).int(0, -77).end();
        w.begin_struct(3).float(0, 1.0).float(1, 2.0).float(2, 3.0).end();
        w.begin_struct(4).float(0, 0.0).float(1, 1.0).end();
        w.begin_struct(5).float(0, 1.0).end();
        w.begin_struct(8).begin_struct(24).begin_struct(0);
        w.int(0, 0).begin_struct(1).int(0, 3).end();
        w.end().end().end();
        w.end();
        // Placement without a global id
        w.element().begin_struct(3).float(0, 1.0).end().end();

        w.begin_struct(6).begin_list(0, 1);
        w.element().string(2, "Root").begin_list(1, 2);
        w.element().int(1, 5).string(2, "Props").int(5, -1).begin_list(7, 2);
        w.element().int(8, 0).string(2, "crate").int(6, 5).end();
        w.element().int(8, 1).string(2, "stray").int(6, 3).end();
        w.end();
        w.element().int(0, 1).int(8, 2).string(2, "loose").int(6, -1).end();
        w.end();
        w.uint(1, u64::from(u32::MAX)).end();
        w.end();

        let map = read_forge_map(&w.0, DecodeLimits::default()).unwrap();
        assert_eq!(map.objects.len(), 1);
        let object = &map.objects[0];
        assert_eq!(object.index, 0);
        assert_eq!(object.global_id, -77);
        assert_eq!(object.rotation_up, [0.0, 1.0, 1.0]);
        assert_eq!(object.variant, 3);

        assert_eq!(map.root_folder, ROOT_FOLDER_ID);
        assert_eq!(map.folders.len(), 1);
        let root = &map.folders[0];
        assert_eq!(root.name, "Root");
        assert_eq!(root.id, ROOT_FOLDER_ID);
        assert_eq!(root.objects, vec![ForgeFolderEntry {
            index: 2,
            name: "loose".into(),
            parent: -1
        }]);
        assert_eq!(root.subfolders.len(), 1);
        let props = &root.subfolders[0];
        assert_eq!((props.id, props.parent, props.name.as_str()), (5, -1, "Props"));
        assert_eq!(props.objects, vec![ForgeFolderEntry {
            index: 0,
            name: "crate".into(),
            parent: 5
        }]);
    }
}
