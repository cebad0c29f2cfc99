//! Asset loading off the frame loop.
//!
//! Loads run on a background thread and are observed through a
//! [`PendingLoad`], which the session polls once per frame. A load that fails,
//! panics or is abandoned shows up as [`LoadState::Failed`]; nothing here
//! blocks the caller.
//!
//! Models come either as a single `.stl` file or as a JSON manifest naming
//! several STL parts:
//!
//! ```json
//! {
//!   "parts": [
//!     { "name": "case", "path": "case.stl", "color": [0.8, 0.8, 0.82, 1.0] },
//!     { "name": "strap_top", "path": "strap_top.stl" },
//!     { "name": "strap_bottom", "path": "strap_bottom.stl" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use serde::{Deserialize, Serialize};

use crate::error::{TryOnError, TryOnResult};
use crate::geometry::RawGeometry;
use crate::watch::{MeshAsset, NamedPart, PartColor, SpriteAsset, WatchAsset, normalize_parts};

static NEXT_ASSET_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique id for a freshly loaded asset.
pub fn next_asset_id() -> u64 {
    NEXT_ASSET_ID.fetch_add(1, Ordering::Relaxed)
}

/// Source of watch assets.
pub trait AssetLoader: Send + Sync {
    fn load_model(&self, path: &str) -> TryOnResult<MeshAsset>;
    fn load_sprite(&self, path: &str) -> TryOnResult<SpriteAsset>;
}

/// What a [`PendingLoad`] has to report this frame.
#[derive(Debug)]
pub enum LoadState<T> {
    Pending,
    Ready(T),
    Failed(TryOnError),
}

/// An asset load running in the background.
#[derive(Debug)]
pub struct PendingLoad<T> {
    label: String,
    receiver: Option<Receiver<TryOnResult<T>>>,
}

impl<T: Send + 'static> PendingLoad<T> {
    /// Runs `load` on a new thread.
    pub fn spawn<F>(label: impl Into<String>, load: F) -> Self
    where
        F: FnOnce() -> TryOnResult<T> + Send + 'static,
    {
        let label = label.into();
        let (sender, receiver) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name(format!("load:{label}"))
            .spawn(move || {
                // The receiver may be gone if the session ended first.
                let _ = sender.send(load());
            });

        match spawned {
            Ok(_) => Self {
                label,
                receiver: Some(receiver),
            },
            Err(e) => Self::failed(label, TryOnError::asset_load(format!("cannot spawn loader: {e}"))),
        }
    }

    /// A load that already failed.
    pub fn failed(label: impl Into<String>, error: TryOnError) -> Self {
        Self::finished(label.into(), Err(error))
    }

    fn finished(label: String, result: TryOnResult<T>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(result);
        Self {
            label,
            receiver: Some(receiver),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Checks for a result without blocking.
    ///
    /// A result is handed out once; later polls report a failure.
    pub fn poll(&mut self) -> LoadState<T> {
        let Some(receiver) = &self.receiver else {
            return LoadState::Failed(TryOnError::asset_load(format!(
                "{}: result already taken",
                self.label
            )));
        };

        match receiver.try_recv() {
            Ok(result) => {
                self.receiver = None;
                match result {
                    Ok(value) => LoadState::Ready(value),
                    Err(e) => LoadState::Failed(e),
                }
            }
            Err(TryRecvError::Empty) => LoadState::Pending,
            Err(TryRecvError::Disconnected) => {
                self.receiver = None;
                LoadState::Failed(TryOnError::asset_load(format!(
                    "{}: loader exited without a result",
                    self.label
                )))
            }
        }
    }
}

/// Starts loading a model in the background; it arrives as [`WatchAsset::Mesh`].
pub fn load_model_async(loader: Arc<dyn AssetLoader>, path: &str) -> PendingLoad<WatchAsset> {
    let owned = path.to_string();
    PendingLoad::spawn(path, move || loader.load_model(&owned).map(WatchAsset::Mesh))
}

/// Starts loading a sprite in the background; it arrives as [`WatchAsset::Sprite`].
pub fn load_sprite_async(loader: Arc<dyn AssetLoader>, path: &str) -> PendingLoad<WatchAsset> {
    let owned = path.to_string();
    PendingLoad::spawn(path, move || loader.load_sprite(&owned).map(WatchAsset::Sprite))
}

/// A multi-part model description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub parts: Vec<ManifestPart>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestPart {
    pub name: String,
    /// STL path, relative to the manifest.
    pub path: String,
    #[serde(default)]
    pub color: Option<PartColor>,
}

impl ModelManifest {
    pub fn from_json(text: &str) -> TryOnResult<Self> {
        let manifest: Self = serde_json::from_str(text)?;
        if manifest.parts.is_empty() {
            return Err(TryOnError::asset_load("model manifest lists no parts"));
        }
        Ok(manifest)
    }
}

/// Loads assets from the local filesystem.
#[derive(Clone, Debug)]
pub struct FileAssetLoader {
    base: PathBuf,
}

impl FileAssetLoader {
    /// Relative asset paths are resolved against `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Maps a catalog path or URL to a local file.
    pub fn resolve(&self, path: &str) -> TryOnResult<PathBuf> {
        let lower = path.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Err(TryOnError::unsupported(format!(
                "remote assets are not supported: {path}"
            )));
        }
        let local = Path::new(path.strip_prefix("file://").unwrap_or(path));
        Ok(if local.is_absolute() {
            local.to_path_buf()
        } else {
            self.base.join(local)
        })
    }

    fn load_parts(&self, file: &Path) -> TryOnResult<Vec<NamedPart>> {
        let ext = file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "stl" => {
                let name = file
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("body")
                    .to_string();
                Ok(vec![NamedPart::new(name, RawGeometry::from_stl_file(file)?)])
            }
            "json" => {
                let manifest = ModelManifest::from_json(&std::fs::read_to_string(file)?)?;
                let dir = file.parent().unwrap_or_else(|| Path::new(""));
                manifest
                    .parts
                    .into_iter()
                    .map(|part| {
                        let geometry = RawGeometry::from_file(dir.join(&part.path))?;
                        let named = NamedPart::new(part.name, geometry);
                        Ok(match part.color {
                            Some(color) => named.with_color(color),
                            None => named,
                        })
                    })
                    .collect()
            }
            _ => Err(TryOnError::unsupported(format!(
                "unknown model format '{ext}' for {}",
                file.display()
            ))),
        }
    }
}

impl AssetLoader for FileAssetLoader {
    #[tracing::instrument(skip(self), fields(base = %self.base.display()))]
    fn load_model(&self, path: &str) -> TryOnResult<MeshAsset> {
        let file = self.resolve(path)?;
        let mut parts = self.load_parts(&file).map_err(|e| match e {
            TryOnError::UnsupportedAsset(_) | TryOnError::AssetLoad(_) => e,
            other => TryOnError::asset_load(format!("{}: {other}", file.display())),
        })?;

        if parts.iter().all(|p| p.geometry.is_empty()) {
            return Err(TryOnError::asset_load(format!(
                "{} contains no geometry",
                file.display()
            )));
        }
        normalize_parts(&mut parts);

        let asset = MeshAsset::from_parts(next_asset_id(), parts);
        tracing::info!(
            body = asset.body.len(),
            straps = asset.straps.len(),
            "model loaded"
        );
        Ok(asset)
    }

    #[tracing::instrument(skip(self), fields(base = %self.base.display()))]
    fn load_sprite(&self, path: &str) -> TryOnResult<SpriteAsset> {
        let file = self.resolve(path)?;
        let image = image::open(&file)
            .map_err(|e| TryOnError::asset_load(format!("{}: {e}", file.display())))?
            .to_rgba8();
        tracing::info!(width = image.width(), height = image.height(), "sprite loaded");
        Ok(SpriteAsset::new(next_asset_id(), image))
    }
}

/// Loader serving fixed results, for tests.
#[cfg(test)]
pub(crate) struct StubLoader {
    pub model: Option<MeshAsset>,
    pub sprite: Option<SpriteAsset>,
}

#[cfg(test)]
impl AssetLoader for StubLoader {
    fn load_model(&self, path: &str) -> TryOnResult<MeshAsset> {
        self.model
            .clone()
            .ok_or_else(|| TryOnError::asset_load(format!("{path}: not found")))
    }

    fn load_sprite(&self, path: &str) -> TryOnResult<SpriteAsset> {
        self.sprite
            .clone()
            .ok_or_else(|| TryOnError::asset_load(format!("{path}: not found")))
    }
}
