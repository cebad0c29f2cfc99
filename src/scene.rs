//! The persistent 3D scene for the try-on model.
//!
//! A [`WristScene`] lives for one session. It owns the camera, the lights and
//! the loaded [`MeshAsset`]; each frame [`WristScene::update`] places the
//! model on the wrist and re-wraps the straps. Rasterization is left to a
//! [`FrameCanvas`](crate::canvas::FrameCanvas).

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec3};

use crate::camera::Camera;
use crate::config::ModelConfig;
use crate::mesh::Transform;
use crate::pose::HandPose;
use crate::strap::StrapDeformer;
use crate::watch::MeshAsset;

/// Directional light plus an ambient term.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    /// Direction the light travels (normalized).
    pub direction: Vec3,
    pub color: Vec3,
    pub ambient: f32,
}

impl Lighting {
    pub fn new(direction: Vec3, ambient: f32) -> Self {
        Self {
            direction: direction.normalize_or(Vec3::NEG_Z),
            color: Vec3::ONE,
            ambient,
        }
    }
}

impl Default for Lighting {
    fn default() -> Self {
        Self::new(Vec3::new(-0.3, -0.6, -1.0), 0.35)
    }
}

/// Rotation from model space into the band frame.
///
/// Models face +Z with the strap along ±X; this turns the model so its face
/// lies on the back of the wrist and its Y axis runs down the forearm.
pub fn model_alignment() -> Quat {
    Quat::from_rotation_x(-FRAC_PI_2)
}

pub struct WristScene {
    pub camera: Camera,
    pub lighting: Lighting,
    asset: MeshAsset,
    config: ModelConfig,
    deformer: StrapDeformer,
    transform: Option<Transform>,
}

impl WristScene {
    pub fn new(asset: MeshAsset, config: ModelConfig) -> Self {
        let lighting = Lighting::new(Vec3::from(config.light_direction), config.ambient);
        Self {
            camera: Camera::new(),
            lighting,
            deformer: StrapDeformer::from_config(&config),
            asset,
            config,
            transform: None,
        }
    }

    pub fn asset(&self) -> &MeshAsset {
        &self.asset
    }

    pub fn asset_mut(&mut self) -> &mut MeshAsset {
        &mut self.asset
    }

    /// Placement from the latest [`update`](Self::update), if the model is visible.
    pub fn transform(&self) -> Option<Transform> {
        self.transform
    }

    pub fn model_matrix(&self) -> Option<Mat4> {
        self.transform.map(|t| t.matrix())
    }

    /// Hides the model until the next pose arrives.
    pub fn hide(&mut self) {
        self.transform = None;
    }

    /// Band-frame orientation for a pose.
    pub fn band_rotation(pose: &HandPose) -> Quat {
        (pose.basis.to_quat() * model_alignment()).normalize()
    }

    /// Where the model sits for a pose.
    pub fn model_transform(&self, pose: &HandPose) -> Transform {
        Transform::new()
            .position(pose.position + pose.basis.up * self.config.up_offset)
            .rotation(Self::band_rotation(pose))
            .uniform_scale(pose.wrist_radius * self.config.model_scale)
    }

    /// Places the model on the wrist and wraps every strap around it.
    pub fn update(&mut self, pose: &HandPose) {
        let transform = self.model_transform(pose);
        let world = transform.matrix();
        let rotation = transform.rotation;
        let strap_radius = pose.wrist_radius * self.config.strap_radius_factor;

        for strap in &mut self.asset.straps {
            strap.world = world;
            self.deformer
                .deform(strap, pose.position, strap_radius, rotation);
        }

        tracing::trace!(
            position = ?transform.position,
            scale = transform.scale.x,
            straps = self.asset.straps.len(),
            "wrist scene updated"
        );
        self.transform = Some(transform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::PoseBasis;
    use crate::watch::{NamedPart, tests::quad};

    fn pose() -> HandPose {
        HandPose {
            position: Vec3::new(0.1, -0.2, 0.0),
            basis: PoseBasis {
                right: Vec3::X,
                up: Vec3::Z,
                forward: Vec3::NEG_Y,
            },
            wrist_radius: 0.1,
        }
    }

    fn scene() -> WristScene {
        let asset = MeshAsset::from_parts(
            1,
            vec![
                NamedPart::new("case", quad(-0.2, 0.2, 0.0, 0.1)),
                NamedPart::new("strap", quad(0.2, 0.5, 0.0, 0.0)),
            ],
        );
        WristScene::new(asset, ModelConfig::default())
    }

    #[test]
    fn model_face_points_along_back_of_hand() {
        let p = pose();
        let rotation = WristScene::band_rotation(&p);
        assert!((rotation * Vec3::Z).abs_diff_eq(p.basis.up, 1e-5));
        // Model Y lies on the forearm axis.
        assert!((rotation * Vec3::Y).cross(p.basis.forward).length() < 1e-5);
    }

    #[test]
    fn transform_scales_with_wrist_and_lifts_off_skin() {
        let scene = scene();
        let p = pose();
        let t = scene.model_transform(&p);
        assert!((t.scale.x - 0.1 * 2.5).abs() < 1e-6);
        assert!(t.position.abs_diff_eq(p.position + Vec3::Z * 0.02, 1e-6));
    }

    #[test]
    fn update_wraps_straps_and_sets_world() {
        let mut scene = scene();
        assert!(scene.transform().is_none());

        let p = pose();
        scene.update(&p);

        let world = scene.model_matrix().unwrap();
        let strap = &scene.asset().straps[0];
        assert_eq!(strap.world, world);
        assert!(strap.is_dirty());
        assert_ne!(strap.live.positions(), strap.pristine().to_vec());
        // Body parts are rigid.
        assert_eq!(scene.asset().body[0].geometry.positions()[0], Vec3::new(-0.2, -0.05, 0.1));

        scene.hide();
        assert!(scene.transform().is_none());
    }

    #[test]
    fn repeated_updates_do_not_accumulate() {
        let mut scene = scene();
        let p = pose();
        scene.update(&p);
        let first = scene.asset().straps[0].live.positions();
        scene.update(&p);
        let second = scene.asset().straps[0].live.positions();
        for (a, b) in first.iter().zip(&second) {
            assert!(a.abs_diff_eq(*b, 1e-6));
        }
    }
}
