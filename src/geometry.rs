//! CPU-side geometry for watch models.
//!
//! [`RawGeometry`] holds vertex and index data before (and while) it lives on
//! the GPU. Model parts are normalized here at load time, and strap parts are
//! deformed here every frame before their vertex buffers are re-uploaded.
//!
//! # Supported Formats
//!
//! | Format | Extensions | Notes |
//! |--------|------------|-------|
//! | STL    | `.stl`     | Binary and ASCII, no UV coordinates |

use std::path::Path;

use glam::Vec3;

use crate::error::{TryOnError, TryOnResult};
use crate::mesh::Vertex3d;

/// Raw geometry data.
#[derive(Clone, Debug, Default)]
pub struct RawGeometry {
    /// Vertex positions, normals, and UVs.
    pub vertices: Vec<Vertex3d>,
    /// Triangle indices.
    pub indices: Vec<u32>,
}

impl RawGeometry {
    /// Creates raw geometry from vertices and indices.
    pub fn new(vertices: Vec<Vertex3d>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex positions as vectors.
    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|v| Vec3::from(v.position)).collect()
    }

    /// Computes the axis-aligned bounding box.
    ///
    /// Returns `(min, max)` corners of the bounding box.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for v in &self.vertices {
            let p = Vec3::from(v.position);
            min = min.min(p);
            max = max.max(p);
        }

        (min, max)
    }

    /// Returns the size of the bounding box.
    pub fn size(&self) -> Vec3 {
        let (min, max) = self.bounds();
        max - min
    }

    /// Translates all vertices by the given offset.
    pub fn translate(&mut self, offset: Vec3) {
        for v in &mut self.vertices {
            v.position = (Vec3::from(v.position) + offset).into();
        }
    }

    /// Scales all vertices uniformly around the origin.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.vertices {
            v.position = (Vec3::from(v.position) * factor).into();
        }
    }

    /// Recalculates vertex normals from face geometry.
    ///
    /// This computes smooth normals by averaging the face normals
    /// of all triangles that share each vertex. Triangles referencing
    /// out-of-range vertices are skipped.
    pub fn recalculate_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = [0.0, 0.0, 0.0];
        }

        let count = self.vertices.len();
        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if i0 >= count || i1 >= count || i2 >= count {
                continue;
            }

            let p0 = Vec3::from(self.vertices[i0].position);
            let p1 = Vec3::from(self.vertices[i1].position);
            let p2 = Vec3::from(self.vertices[i2].position);

            // Area-weighted: the cross product length is twice the face area.
            let face_normal = (p1 - p0).cross(p2 - p0);

            for i in [i0, i1, i2] {
                let n = Vec3::from(self.vertices[i].normal) + face_normal;
                self.vertices[i].normal = n.into();
            }
        }

        for v in &mut self.vertices {
            v.normal = Vec3::from(v.normal).normalize_or_zero().into();
        }
    }

    /// Loads geometry from a file, detecting the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> TryOnResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "stl" => Self::from_stl_file(path),
            _ => Err(TryOnError::unsupported(format!(
                "unknown geometry format '{ext}' for {}",
                path.display()
            ))),
        }
    }

    /// Loads an STL file.
    pub fn from_stl_file(path: impl AsRef<Path>) -> TryOnResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let mut reader = std::io::BufReader::new(file);
        Self::parse_stl(&mut reader)
    }

    /// Parses STL from bytes.
    pub fn from_stl_bytes(bytes: &[u8]) -> TryOnResult<Self> {
        let mut cursor = std::io::Cursor::new(bytes);
        Self::parse_stl(&mut cursor)
    }

    fn parse_stl<R: std::io::Read + std::io::Seek>(reader: &mut R) -> TryOnResult<Self> {
        let stl = stl_io::read_stl(reader)
            .map_err(|e| TryOnError::asset_load(format!("STL parse error: {e}")))?;

        let mut vertices = Vec::with_capacity(stl.faces.len() * 3);
        let mut indices = Vec::with_capacity(stl.faces.len() * 3);

        // stl_io returns an IndexedMesh; faces are unrolled so each keeps its own normal.
        for (i, face) in stl.faces.iter().enumerate() {
            let normal: [f32; 3] = face.normal.into();

            for &vertex_idx in &face.vertices {
                let vertex = stl.vertices.get(vertex_idx).ok_or_else(|| {
                    TryOnError::asset_load(format!("STL face {i} references missing vertex"))
                })?;
                let position: [f32; 3] = (*vertex).into();
                vertices.push(Vertex3d::new(position, normal, [0.0, 0.0]));
            }

            let base = (i * 3) as u32;
            indices.extend_from_slice(&[base, base + 1, base + 2]);
        }

        Ok(Self::new(vertices, indices))
    }
}
