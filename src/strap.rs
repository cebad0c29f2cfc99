//! Wraps rigid strap geometry around the wrist.
//!
//! The wrist is approximated by a cylinder whose axis is the Y axis of the
//! band frame (`rotation_basis`) and which passes through `wrist_center`.
//! Each vertex is pulled part of the way toward that cylinder's surface.
//!
//! Deformation always starts from the strap's pristine positions, so calling
//! [`StrapDeformer::deform`] repeatedly with the same inputs gives the same
//! result; nothing accumulates from frame to frame.

use glam::{Quat, Vec3};

use crate::config::ModelConfig;
use crate::watch::StrapMesh;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrapDeformer {
    /// Weight of the cylinder radius against the vertex's own radius.
    pub blend: f32,
    /// Vertices closer than this to the axis keep their position.
    pub axis_epsilon: f32,
}

impl Default for StrapDeformer {
    fn default() -> Self {
        Self {
            blend: 0.8,
            axis_epsilon: 1e-4,
        }
    }
}

impl StrapDeformer {
    pub fn new(blend: f32, axis_epsilon: f32) -> Self {
        Self {
            blend,
            axis_epsilon,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.strap_blend, config.axis_epsilon)
    }

    /// Rewrites the strap's live vertices from its pristine copy.
    ///
    /// Uses `strap.world` as the mesh-to-scene transform. Returns `false`
    /// (and leaves the strap untouched) when there is no usable position data
    /// or the world transform cannot be inverted.
    pub fn deform(
        &self,
        strap: &mut StrapMesh,
        wrist_center: Vec3,
        wrist_radius: f32,
        rotation_basis: Quat,
    ) -> bool {
        let vertex_count = strap.live.vertices.len();
        if strap.pristine().is_empty() || strap.pristine().len() != vertex_count {
            tracing::warn!(
                strap = %strap.name,
                pristine = strap.pristine().len(),
                live = vertex_count,
                "strap mesh has no usable position data; skipping deformation"
            );
            return false;
        }

        let world = strap.world;
        if world.determinant().abs() <= f32::EPSILON {
            tracing::warn!(strap = %strap.name, "strap world transform is singular");
            return false;
        }
        let inverse_world = world.inverse();
        let inverse_rotation = rotation_basis.inverse();

        let deformed: Vec<Vec3> = strap
            .pristine()
            .iter()
            .map(|&rest| {
                let scene = world.transform_point3(rest);
                let local = inverse_rotation * (scene - wrist_center);
                let wrapped = self.wrap(local, wrist_radius);
                inverse_world.transform_point3(rotation_basis * wrapped + wrist_center)
            })
            .collect();

        for (vertex, position) in strap.live.vertices.iter_mut().zip(deformed) {
            vertex.position = position.into();
        }
        strap.live.recalculate_normals();
        strap.mark_dirty();
        true
    }

    /// Pulls a wrist-local point toward the cylinder; Y is left as is.
    fn wrap(&self, local: Vec3, wrist_radius: f32) -> Vec3 {
        let dist_from_axis = (local.x * local.x + local.z * local.z).sqrt();
        if dist_from_axis <= self.axis_epsilon {
            return local;
        }

        let angle = local.z.atan2(local.x);
        let radius = dist_from_axis * (1.0 - self.blend) + wrist_radius * self.blend;
        Vec3::new(radius * angle.cos(), local.y, radius * angle.sin())
    }
}
