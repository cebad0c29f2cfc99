//! Watch assets: a flat sprite or a deformable 3D model.
//!
//! A [`MeshAsset`] is built once per session from a flat list of named parts.
//! Parts whose name mentions a strap are split off as [`StrapMesh`]es, each of
//! which keeps a pristine copy of its vertex positions for the deformer.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use image::RgbaImage;

use crate::geometry::RawGeometry;

/// Name fragments that mark a part as strap geometry.
pub const STRAP_PATTERNS: [&str; 3] = ["strap", "band", "bracelet"];

/// Case-insensitive strap check on a part name.
pub fn is_strap_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    STRAP_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Linear RGBA part color.
pub type PartColor = [f32; 4];

pub const DEFAULT_BODY_COLOR: PartColor = [0.78, 0.79, 0.82, 1.0];
pub const DEFAULT_STRAP_COLOR: PartColor = [0.24, 0.15, 0.09, 1.0];

/// A named part before partitioning.
#[derive(Clone, Debug)]
pub struct NamedPart {
    pub name: String,
    pub geometry: RawGeometry,
    pub color: Option<PartColor>,
}

impl NamedPart {
    pub fn new(name: impl Into<String>, geometry: RawGeometry) -> Self {
        Self {
            name: name.into(),
            geometry,
            color: None,
        }
    }

    pub fn with_color(mut self, color: PartColor) -> Self {
        self.color = Some(color);
        self
    }
}

/// Rigid part of a watch (case, dial, crown).
#[derive(Clone, Debug)]
pub struct SubMesh {
    pub name: String,
    pub geometry: RawGeometry,
    pub color: PartColor,
}

/// A strap part whose live vertices are re-derived every frame.
#[derive(Clone, Debug)]
pub struct StrapMesh {
    pub name: String,
    pristine: Box<[Vec3]>,
    /// Deformed geometry drawn this frame.
    pub live: RawGeometry,
    /// Model-to-scene transform used by the most recent deformation.
    pub world: Mat4,
    pub color: PartColor,
    dirty: bool,
}

impl StrapMesh {
    /// Captures the pristine positions from `geometry`.
    pub fn new(name: impl Into<String>, geometry: RawGeometry, color: PartColor) -> Self {
        let pristine = geometry.positions().into_boxed_slice();
        Self {
            name: name.into(),
            pristine,
            live: geometry,
            world: Mat4::IDENTITY,
            color,
            dirty: false,
        }
    }

    /// Undeformed positions as loaded.
    pub fn pristine(&self) -> &[Vec3] {
        &self.pristine
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clears the dirty flag, returning whether it was set.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

/// A loaded 3D watch model.
#[derive(Clone, Debug)]
pub struct MeshAsset {
    /// Identifier for GPU caching; unique per load.
    pub id: u64,
    pub body: Vec<SubMesh>,
    pub straps: Vec<StrapMesh>,
}

impl MeshAsset {
    /// Partitions named parts into body and strap meshes.
    pub fn from_parts(id: u64, parts: Vec<NamedPart>) -> Self {
        let mut body = Vec::new();
        let mut straps = Vec::new();

        for part in parts {
            if is_strap_name(&part.name) {
                let color = part.color.unwrap_or(DEFAULT_STRAP_COLOR);
                straps.push(StrapMesh::new(part.name, part.geometry, color));
            } else {
                body.push(SubMesh {
                    name: part.name,
                    geometry: part.geometry,
                    color: part.color.unwrap_or(DEFAULT_BODY_COLOR),
                });
            }
        }

        Self { id, body, straps }
    }

    pub fn part_count(&self) -> usize {
        self.body.len() + self.straps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.iter().all(|b| b.geometry.is_empty())
            && self.straps.iter().all(|s| s.live.is_empty())
    }
}

/// Centers parts on their combined bounds and scales them to fit a unit cube.
///
/// Runs before partitioning so pristine strap positions are captured in the
/// normalized frame.
pub fn normalize_parts(parts: &mut [NamedPart]) {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for part in parts.iter().filter(|p| !p.geometry.is_empty()) {
        let (lo, hi) = part.geometry.bounds();
        min = min.min(lo);
        max = max.max(hi);
    }
    if !min.is_finite() || !max.is_finite() {
        return;
    }

    let center = (min + max) * 0.5;
    let extent = (max - min).max_element();
    let factor = if extent > f32::EPSILON { 1.0 / extent } else { 1.0 };

    for part in parts.iter_mut() {
        part.geometry.translate(-center);
        part.geometry.scale(factor);
    }
}

/// A flat product image.
#[derive(Clone, Debug)]
pub struct SpriteAsset {
    /// Identifies the source image; a new id invalidates keyed copies.
    pub id: u64,
    pub image: Arc<RgbaImage>,
}

impl SpriteAsset {
    pub fn new(id: u64, image: RgbaImage) -> Self {
        Self {
            id,
            image: Arc::new(image),
        }
    }

    pub fn aspect(&self) -> f32 {
        let (w, h) = self.image.dimensions();
        if h == 0 { 1.0 } else { w as f32 / h as f32 }
    }
}

/// A finished asset load, handed to the session that requested it.
///
/// A product can deliver both: the sprite stays around as the 2D fallback
/// while the model drives the 3D overlay.
#[derive(Clone, Debug)]
pub enum WatchAsset {
    Sprite(SpriteAsset),
    Mesh(MeshAsset),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mesh::Vertex3d;

    /// A flat quad spanning `[x0, x1]` in X at height `y`.
    pub(crate) fn quad(x0: f32, x1: f32, y: f32, z: f32) -> RawGeometry {
        let n = [0.0, 0.0, 1.0];
        RawGeometry::new(
            vec![
                Vertex3d::new([x0, y - 0.05, z], n, [0.0, 0.0]),
                Vertex3d::new([x1, y - 0.05, z], n, [1.0, 0.0]),
                Vertex3d::new([x1, y + 0.05, z], n, [1.0, 1.0]),
                Vertex3d::new([x0, y + 0.05, z], n, [0.0, 1.0]),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn strap_patterns_match_case_insensitively() {
        assert!(is_strap_name("Strap_Upper"));
        assert!(is_strap_name("leather BAND"));
        assert!(is_strap_name("steel_bracelet_links"));
        assert!(!is_strap_name("case"));
        assert!(!is_strap_name("dial"));
    }

    #[test]
    fn partition_splits_body_and_straps() {
        let parts = vec![
            NamedPart::new("case", quad(-0.2, 0.2, 0.0, 0.0)),
            NamedPart::new("strap_top", quad(0.2, 0.8, 0.0, 0.0)),
            NamedPart::new("Band-Bottom", quad(-0.8, -0.2, 0.0, 0.0)).with_color([1.0; 4]),
        ];
        let asset = MeshAsset::from_parts(7, parts);

        assert_eq!(asset.body.len(), 1);
        assert_eq!(asset.straps.len(), 2);
        assert_eq!(asset.body[0].color, DEFAULT_BODY_COLOR);
        assert_eq!(asset.straps[0].color, DEFAULT_STRAP_COLOR);
        assert_eq!(asset.straps[1].color, [1.0; 4]);
        assert_eq!(asset.part_count(), 3);
    }

    #[test]
    fn pristine_is_captured_at_construction() {
        let mut strap = StrapMesh::new("strap", quad(0.0, 1.0, 0.0, 0.0), DEFAULT_STRAP_COLOR);
        strap.live.translate(Vec3::new(5.0, 0.0, 0.0));

        assert_eq!(strap.pristine()[1], Vec3::new(1.0, -0.05, 0.0));
        assert!(!strap.is_dirty());
        strap.mark_dirty();
        assert!(strap.take_dirty());
        assert!(!strap.take_dirty());
    }

    #[test]
    fn normalize_fits_combined_bounds_in_unit_cube() {
        let mut parts = vec![
            NamedPart::new("case", quad(0.0, 2.0, 1.0, 0.0)),
            NamedPart::new("strap", quad(2.0, 4.0, 1.0, 0.0)),
        ];
        normalize_parts(&mut parts);

        let (lo0, _) = parts[0].geometry.bounds();
        let (_, hi1) = parts[1].geometry.bounds();
        assert!((lo0.x + 0.5).abs() < 1e-5);
        assert!((hi1.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn sprite_aspect_handles_empty_image() {
        let wide = SpriteAsset::new(1, RgbaImage::new(200, 100));
        assert_eq!(wide.aspect(), 2.0);
        let empty = SpriteAsset::new(2, RgbaImage::new(0, 0));
        assert_eq!(empty.aspect(), 1.0);
    }
}
