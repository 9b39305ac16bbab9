pub mod mesh;
pub mod model;
pub mod vertex;

use std::fmt::{Debug, Display, Formatter, Write};

use binrw_derive::binread;
use serde::Serializer;
use serde_derive::Serialize;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct FourCC(pub [u8; 4]);

impl Display for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for c in self.0 {
            f.write_char(c as char)?;
        }
        Ok(())
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_char('"')?;
        Display::fmt(self, f)?;
        f.write_char('"')
    }
}

impl PartialEq<[u8; 4]> for FourCC {
    fn eq(&self, other: &[u8; 4]) -> bool { &self.0 == other }
}

impl serde::Serialize for FourCC {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[inline]
pub fn peek_four_cc(data: &[u8]) -> Option<FourCC> {
    data.get(..4).map(|b| FourCC([b[0], b[1], b[2], b[3]]))
}

#[binread]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn to_array(self) -> [f32; 3] { [self.x, self.y, self.z] }
}

#[binread]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vector4 {
    pub fn to_array(self) -> [f32; 4] { [self.x, self.y, self.z, self.w] }
}

/// Row-major 4x4 matrix.
#[binread]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Matrix4x4 {
    pub rows: [[f32; 4]; 4],
}

impl Matrix4x4 {
    pub const IDENTITY: Self = Self {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Translation component (bottom row).
    pub fn translation(&self) -> [f32; 3] {
        let [x, y, z, _] = self.rows[3];
        [x, y, z]
    }
}

#[binread]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Bounds {
    pub min: f32,
    pub max: f32,
}

impl Bounds {
    #[inline]
    pub fn range(&self) -> f32 { self.max - self.min }

    #[inline]
    pub fn axis(&self) -> AxisRange {
        AxisRange { min: self.min, max: self.max, range: self.range() }
    }
}

/// `(min, max, range)` triple used to expand a normalized attribute.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct AxisRange {
    pub min: f32,
    pub max: f32,
    pub range: f32,
}

impl AxisRange {
    #[inline]
    pub fn expand(&self, normalized: f32) -> f32 { normalized * self.range + self.min }
}
