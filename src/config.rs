//! Tunable constants for the try-on pipeline.
//!
//! Most values here are empirical visual calibrations rather than derived
//! quantities, so they are kept as named, overridable settings. Every section
//! defaults field-by-field, which lets a config file override a single value:
//!
//! ```
//! use wristfit::TryOnConfig;
//!
//! let config = TryOnConfig::from_json(r#"{ "overlay": { "size_factor": 0.9 } }"#).unwrap();
//! assert_eq!(config.overlay.size_factor, 0.9);
//! assert_eq!(config.overlay.offset_factor, 0.1);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TryOnError, TryOnResult};

/// Root configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnConfig {
    pub pose: PoseConfig,
    pub overlay: OverlayConfig,
    pub chroma_key: ChromaKeyConfig,
    pub model: ModelConfig,
    pub basic_overlay: BasicOverlayConfig,
    pub window: WindowConfig,
}

impl TryOnConfig {
    /// Parses a config from JSON text.
    pub fn from_json(text: &str) -> TryOnResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> TryOnResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Rejects values that would break the geometry downstream.
    pub fn validate(&self) -> TryOnResult<()> {
        if !(self.pose.epsilon > 0.0) {
            return Err(TryOnError::config("pose.epsilon must be positive"));
        }
        if !(self.overlay.size_factor > 0.0) {
            return Err(TryOnError::config("overlay.size_factor must be positive"));
        }
        if !(0.0..=1.0).contains(&self.model.strap_blend) {
            return Err(TryOnError::config("model.strap_blend must be within [0, 1]"));
        }
        if !(self.model.model_scale > 0.0) {
            return Err(TryOnError::config("model.model_scale must be positive"));
        }
        if !(0.0..=MAX_SHADOW_BLUR).contains(&self.overlay.shadow_blur) {
            return Err(TryOnError::config(format!(
                "overlay.shadow_blur must be within [0, {MAX_SHADOW_BLUR}]"
            )));
        }
        if !(0.0..=1.0).contains(&self.overlay.shadow_opacity) {
            return Err(TryOnError::config("overlay.shadow_opacity must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Largest accepted drop-shadow blur radius, in pixels.
pub const MAX_SHADOW_BLUR: f32 = 64.0;

/// Landmark-to-pose conversion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Multiplier applied to landmark depth to make it perceptible.
    pub depth_scale: f32,
    /// Vectors shorter than this are treated as degenerate.
    pub epsilon: f32,
    /// Scale X by the frame aspect ratio so pose space is isotropic.
    pub aspect_correct: bool,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            depth_scale: 2.0,
            epsilon: 1e-6,
            aspect_correct: true,
        }
    }
}

/// 2D sprite placement and drop shadow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Sprite width as a fraction of the index-to-pinky pixel distance.
    pub size_factor: f32,
    /// Shift along the forearm, as a fraction of the sprite width.
    pub offset_factor: f32,
    /// Shadow blur radius in pixels.
    pub shadow_blur: f32,
    /// Shadow offset in pixels (x right, y down).
    pub shadow_offset: [f32; 2],
    pub shadow_opacity: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            size_factor: 0.85,
            offset_factor: 0.1,
            shadow_blur: 10.0,
            shadow_offset: [4.0, 4.0],
            shadow_opacity: 0.45,
        }
    }
}

/// Background removal thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaKeyConfig {
    /// Every channel above this is background.
    pub white_threshold: u8,
    /// Every channel above this, with near-equal channels, is background.
    pub gray_threshold: u8,
    /// Maximum channel difference still counted as "near-equal".
    pub gray_tolerance: u8,
}

impl Default for ChromaKeyConfig {
    fn default() -> Self {
        Self {
            white_threshold: 240,
            gray_threshold: 230,
            gray_tolerance: 10,
        }
    }
}

/// 3D model placement and strap deformation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model scale relative to the wrist radius (model normalized to a unit cube).
    pub model_scale: f32,
    /// Lift along the back-of-hand normal, in scene units.
    pub up_offset: f32,
    /// Straps wrap a cylinder of `wrist_radius * strap_radius_factor`.
    pub strap_radius_factor: f32,
    /// Interpolation weight toward the cylinder surface.
    pub strap_blend: f32,
    /// Vertices closer than this to the wrist axis are left alone.
    pub axis_epsilon: f32,
    /// Direction the light travels, in scene space.
    pub light_direction: [f32; 3],
    pub ambient: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_scale: 2.5,
            up_offset: 0.02,
            strap_radius_factor: 0.8,
            strap_blend: 0.8,
            axis_epsilon: 1e-4,
            light_direction: [-0.3, -0.6, -1.0],
            ambient: 0.35,
        }
    }
}

/// The untracked overlay shown in Basic mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicOverlayConfig {
    /// Sprite center in normalized frame coordinates.
    pub center: [f32; 2],
    /// Sprite width as a fraction of the frame width.
    pub width_fraction: f32,
}

impl Default for BasicOverlayConfig {
    fn default() -> Self {
        Self {
            center: [0.5, 0.7],
            width_fraction: 0.25,
        }
    }
}

/// Window settings for the viewer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "wristfit".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

impl WindowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}
