//! # Wristfit
//!
//! **Real-time virtual watch try-on over a camera feed.**
//!
//! Hand landmarks from a tracker become a wrist pose, and the pose places
//! either a chroma-keyed product photo (2D) or a watch model whose straps
//! wrap around the wrist (3D) on top of the video.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wristfit::*;
//!
//! fn main() -> TryOnResult<()> {
//!     let config = TryOnConfig::default();
//!     let catalog = Catalog::from_file("catalog.json")?;
//!     let window = config.window.clone();
//!
//!     let factory = SessionFactory {
//!         config,
//!         loader: Arc::new(FileAssetLoader::new("assets")),
//!         video: "frames/".into(),
//!         landmarks: "hands.jsonl".into(),
//!         latency: 1,
//!     };
//!     run(window, Viewer::new(factory, catalog, "titan-1")?)
//! }
//! ```
//!
//! ## Pipeline
//!
//! - [`PoseEstimator`] turns four landmarks into a position, an orthonormal
//!   basis and a wrist radius.
//! - [`ChromaKeyCompositor`] keys the product photo once per session and
//!   draws it across the wrist with a soft shadow.
//! - [`WristScene`] places the model and bends every strap with a
//!   [`StrapDeformer`].
//! - [`RenderModeController`] picks 3D, 2D or a static overlay from what
//!   loaded, and only ever steps down.
//! - [`TryOnSession`] runs all of it once per video frame.

mod app;
mod camera;
mod canvas;
mod chroma_key;
mod compositor;
mod config;
mod detector;
mod draw2d;
mod error;
mod geometry;
mod gpu;
mod input;
mod landmarks;
mod loader;
mod mesh;
mod mesh_pass;
mod pose;
mod product;
mod render_mode;
mod renderer;
mod scene;
mod session;
mod strap;
mod texture;
mod video;
mod watch;

pub use app::{SessionFactory, Viewer, run};
pub use camera::Camera;
pub use canvas::{DropShadow, FrameCanvas, SpriteQuad};
pub use chroma_key::ChromaKey;
pub use compositor::{ChromaKeyCompositor, KeyedSprite, OverlayPlacement, SpriteKey, shadow_mask};
pub use config::{
    BasicOverlayConfig, ChromaKeyConfig, MAX_SHADOW_BLUR, ModelConfig, OverlayConfig, PoseConfig,
    TryOnConfig, WindowConfig,
};
pub use detector::{HandDetector, ReplayDetector};
pub use draw2d::{Draw2d, SpriteBatch, TextureKey, Vertex2d};
pub use error::{TryOnError, TryOnResult};
pub use geometry::RawGeometry;
pub use gpu::GpuContext;
pub use input::{Command, Input};
pub use landmarks::{Detection, HandLandmarks, LANDMARK_COUNT, Landmark};
pub use loader::{
    AssetLoader, FileAssetLoader, LoadState, ManifestPart, ModelManifest, PendingLoad,
    load_model_async, load_sprite_async, next_asset_id,
};
pub use mesh::{Mesh, Transform, Vertex3d};
pub use mesh_pass::{CameraUniforms, DrawCall, MeshPass, ModelUniforms};
pub use pose::{HandPose, PoseBasis, PoseError, PoseEstimator};
pub use product::{Catalog, ProductDescriptor, TRY_ON_CATEGORY};
pub use render_mode::{ModeState, RenderMode, RenderModeController};
pub use renderer::FrameRenderer;
pub use scene::{Lighting, WristScene, model_alignment};
pub use session::{FrameReport, OverlayKind, SessionId, TryOnSession};
pub use strap::StrapDeformer;
pub use texture::Texture;
pub use video::{FrameSource, ImageSequenceSource, VideoFrame};
pub use watch::{
    DEFAULT_BODY_COLOR, DEFAULT_STRAP_COLOR, MeshAsset, NamedPart, PartColor, STRAP_PATTERNS,
    SpriteAsset, StrapMesh, SubMesh, WatchAsset, is_strap_name, normalize_parts,
};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3};
