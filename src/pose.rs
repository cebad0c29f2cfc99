//! Wrist pose estimation from sparse hand landmarks.
//!
//! The estimator turns four landmarks (wrist, index, middle and pinky bases)
//! into a [`HandPose`]: the wrist position in render space, an orthonormal
//! orientation basis and an approximate wrist radius.
//!
//! # Render space
//!
//! Landmarks arrive in normalized image space (`[0, 1]`, Y down). They are
//! mapped into a symmetric space where Y grows upward:
//!
//! | Axis | Mapping |
//! |------|---------|
//! | X    | `(2x - 1) * aspect` (aspect = width / height, or 1 when disabled) |
//! | Y    | `1 - 2y` |
//! | Z    | `-z * depth_scale` |
//!
//! The 3D scene camera spans the same extents, so a pose positioned here
//! lands on the wrist in the video.
//!
//! # Basis
//!
//! `forward` runs from the wrist toward the knuckles, `right` across the back
//! of the hand and `up` out of it. The raw across-hand vector is generally not
//! perpendicular to `forward`, so `right` is rebuilt from `up × forward`
//! before it is stored.

use glam::{Mat3, Quat, Vec3};

use crate::config::PoseConfig;
use crate::error::TryOnError;
use crate::landmarks::{HandLandmarks, Landmark};

/// Why a frame produced no pose.
#[derive(Clone, Debug, PartialEq)]
pub enum PoseError {
    /// A required landmark was absent or not finite.
    MissingLandmarks(&'static str),
    /// A basis vector had near-zero length.
    Degenerate(&'static str),
    /// The frame has no area.
    EmptyFrame,
}

impl std::fmt::Display for PoseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoseError::MissingLandmarks(which) => write!(f, "missing landmark: {which}"),
            PoseError::Degenerate(which) => write!(f, "degenerate {which} vector"),
            PoseError::EmptyFrame => write!(f, "frame has zero width or height"),
        }
    }
}

impl std::error::Error for PoseError {}

impl From<PoseError> for TryOnError {
    fn from(e: PoseError) -> Self {
        match e {
            PoseError::MissingLandmarks(_) => TryOnError::missing_landmarks(e.to_string()),
            PoseError::Degenerate(_) | PoseError::EmptyFrame => {
                TryOnError::degenerate(e.to_string())
            }
        }
    }
}

/// Orthonormal orientation of the hand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseBasis {
    /// Across the back of the hand, from pinky side toward index side.
    pub right: Vec3,
    /// Out of the back of the hand.
    pub up: Vec3,
    /// Along the forearm, from the wrist toward the fingers.
    pub forward: Vec3,
}

impl PoseBasis {
    /// Rotation taking local X/Y/Z onto right/up/forward.
    pub fn to_mat3(&self) -> Mat3 {
        Mat3::from_cols(self.right, self.up, self.forward)
    }

    pub fn to_quat(&self) -> Quat {
        Quat::from_mat3(&self.to_mat3()).normalize()
    }
}

/// Wrist pose for a single frame.
///
/// Constructed fresh every frame and dropped after rendering; there is no
/// identity across frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandPose {
    pub position: Vec3,
    pub basis: PoseBasis,
    /// Half the index-to-pinky distance, always positive.
    pub wrist_radius: f32,
}

/// Converts landmarks into a [`HandPose`].
#[derive(Clone, Debug, Default)]
pub struct PoseEstimator {
    config: PoseConfig,
}

impl PoseEstimator {
    pub fn new(config: PoseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    /// Maps a normalized landmark into render space.
    pub fn to_render_space(&self, landmark: Landmark, frame_width: f32, frame_height: f32) -> Vec3 {
        let aspect = if self.config.aspect_correct {
            frame_width / frame_height
        } else {
            1.0
        };
        Vec3::new(
            (landmark.x * 2.0 - 1.0) * aspect,
            1.0 - landmark.y * 2.0,
            -landmark.z * self.config.depth_scale,
        )
    }

    /// Estimates the wrist pose, or explains why none can be built.
    pub fn estimate(
        &self,
        landmarks: &HandLandmarks,
        frame_width: f32,
        frame_height: f32,
    ) -> Result<HandPose, PoseError> {
        if !(frame_width > 0.0 && frame_height > 0.0) {
            return Err(PoseError::EmptyFrame);
        }

        let wrist = self.key_point(landmarks.wrist(), "wrist", frame_width, frame_height)?;
        let index = self.key_point(landmarks.index_base(), "index base", frame_width, frame_height)?;
        let middle =
            self.key_point(landmarks.middle_base(), "middle base", frame_width, frame_height)?;
        let pinky = self.key_point(landmarks.pinky_base(), "pinky base", frame_width, frame_height)?;

        let eps = self.config.epsilon;
        let knuckle_center = (index + middle + pinky) / 3.0;

        let forward = unit(knuckle_center - wrist, eps).ok_or(PoseError::Degenerate("forward"))?;
        let across = index - pinky;
        let right = unit(across, eps).ok_or(PoseError::Degenerate("right"))?;
        let up = unit(forward.cross(right), eps).ok_or(PoseError::Degenerate("up"))?;
        let right = unit(up.cross(forward), eps).ok_or(PoseError::Degenerate("right"))?;

        Ok(HandPose {
            position: wrist,
            basis: PoseBasis { right, up, forward },
            wrist_radius: across.length() * 0.5,
        })
    }

    fn key_point(
        &self,
        landmark: Landmark,
        name: &'static str,
        frame_width: f32,
        frame_height: f32,
    ) -> Result<Vec3, PoseError> {
        if !landmark.is_finite() {
            return Err(PoseError::MissingLandmarks(name));
        }
        Ok(self.to_render_space(landmark, frame_width, frame_height))
    }
}

fn unit(v: Vec3, eps: f32) -> Option<Vec3> {
    let len = v.length();
    (len.is_finite() && len > eps).then(|| v / len)
}
