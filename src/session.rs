//! One try-on session: a product, its assets and the per-frame loop.
//!
//! Each call to [`TryOnSession::frame`] runs the whole pipeline for a single
//! video frame:
//!
//! 1. collect finished asset loads and let the render-mode controller react;
//! 2. draw the video;
//! 3. hand the frame to the detector and take whatever result is ready;
//! 4. draw the overlay for the active mode, if there is a hand to draw on.
//!
//! A frame without fresh landmarks, or with landmarks too degenerate to place
//! an overlay, just shows the video. Nothing that happens inside a frame stops
//! the loop.
//!
//! Sessions own their detector and frame source and release both when closed
//! or dropped, whichever comes first.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::canvas::FrameCanvas;
use crate::compositor::{ChromaKeyCompositor, SpriteKey};
use crate::config::{ModelConfig, TryOnConfig};
use crate::detector::HandDetector;
use crate::error::TryOnResult;
use crate::landmarks::HandLandmarks;
use crate::loader::{AssetLoader, LoadState, PendingLoad, load_model_async, load_sprite_async};
use crate::pose::PoseEstimator;
use crate::product::ProductDescriptor;
use crate::render_mode::{ModeState, RenderMode, RenderModeController};
use crate::scene::WristScene;
use crate::video::{FrameSource, VideoFrame};
use crate::watch::{SpriteAsset, WatchAsset};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What was drawn over the video.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayKind {
    None,
    /// Untracked Basic-mode sprite.
    Static,
    /// Tracked 2D sprite.
    Sprite,
    /// Tracked 3D model.
    Model,
}

/// Outcome of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub index: u64,
    pub mode: ModeState,
    pub overlay: OverlayKind,
}

pub struct TryOnSession {
    id: SessionId,
    product: ProductDescriptor,
    controller: RenderModeController,
    estimator: PoseEstimator,
    compositor: ChromaKeyCompositor,
    model_config: ModelConfig,
    detector: Option<Box<dyn HandDetector>>,
    source: Box<dyn FrameSource>,
    model_load: Option<PendingLoad<WatchAsset>>,
    sprite_load: Option<PendingLoad<WatchAsset>>,
    sprite: Option<SpriteAsset>,
    scene: Option<WristScene>,
    frames: u64,
    closed: bool,
}

impl TryOnSession {
    /// Opens the video source, starts the asset loads and picks the initial mode.
    ///
    /// `detector` carries the tracker's start-up result; a failure there is not
    /// fatal and puts the session in Basic mode. Failing to open the video
    /// source is fatal: the detector is released and the error returned.
    pub fn start(
        product: ProductDescriptor,
        config: &TryOnConfig,
        loader: Arc<dyn AssetLoader>,
        detector: TryOnResult<Box<dyn HandDetector>>,
        mut source: Box<dyn FrameSource>,
    ) -> TryOnResult<Self> {
        let id = SessionId::next();

        let detector = match detector {
            Ok(detector) => Some(detector),
            Err(e) => {
                tracing::error!(session = %id, error = %e, "hand tracker failed to start");
                None
            }
        };

        if let Err(e) = source.open() {
            tracing::error!(session = %id, error = %e, "video source unavailable");
            if let Some(mut detector) = detector {
                detector.close();
            }
            return Err(e);
        }

        let controller = RenderModeController::start(&product, detector.is_some());

        let model_load = match (&product.model_url, controller.is_initializing()) {
            (Some(url), true) => Some(load_model_async(loader.clone(), url)),
            _ => None,
        };
        let sprite_load = product
            .sprite_url()
            .map(|url| load_sprite_async(loader, url));

        tracing::info!(
            session = %id,
            product = %product.id,
            state = ?controller.state(),
            "session started"
        );

        Ok(Self {
            id,
            controller,
            estimator: PoseEstimator::new(config.pose.clone()),
            compositor: ChromaKeyCompositor::new(
                config.overlay.clone(),
                config.chroma_key.clone(),
                config.basic_overlay.clone(),
            ),
            model_config: config.model.clone(),
            product,
            detector,
            source,
            model_load,
            sprite_load,
            sprite: None,
            scene: None,
            frames: 0,
            closed: false,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn product(&self) -> &ProductDescriptor {
        &self.product
    }

    pub fn state(&self) -> ModeState {
        self.controller.state()
    }

    pub fn mode(&self) -> Option<RenderMode> {
        self.controller.mode()
    }

    pub fn scene(&self) -> Option<&WristScene> {
        self.scene.as_ref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn is_loading(&self) -> bool {
        self.model_load.is_some() || self.sprite_load.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Applies any finished asset loads.
    pub fn poll_loads(&mut self) {
        if let Some(pending) = &mut self.model_load {
            match pending.poll() {
                LoadState::Pending => {}
                LoadState::Ready(asset) => {
                    self.model_load = None;
                    self.receive(asset);
                }
                LoadState::Failed(e) => {
                    self.model_load = None;
                    self.controller.on_model_failed(&e);
                }
            }
        }

        if let Some(pending) = &mut self.sprite_load {
            match pending.poll() {
                LoadState::Pending => {}
                LoadState::Ready(asset) => {
                    self.sprite_load = None;
                    self.receive(asset);
                }
                LoadState::Failed(e) => {
                    self.sprite_load = None;
                    self.controller.on_sprite_failed(&e);
                }
            }
        }
    }

    fn receive(&mut self, asset: WatchAsset) {
        match asset {
            WatchAsset::Mesh(mesh) => {
                self.controller.on_model_loaded();
                if self.controller.mode() == Some(RenderMode::ThreeD) {
                    self.scene = Some(WristScene::new(mesh, self.model_config.clone()));
                }
            }
            WatchAsset::Sprite(sprite) => self.sprite = Some(sprite),
        }
    }

    /// Pulls the next frame from the source and renders it.
    ///
    /// Returns `None` once the source is closed or exhausted.
    pub fn tick(&mut self, canvas: &mut dyn FrameCanvas) -> Option<FrameReport> {
        if self.closed {
            return None;
        }
        let video = self.source.next_frame()?;
        Some(self.frame(&video, canvas))
    }

    /// Renders one video frame with the overlay for the current mode.
    pub fn frame(&mut self, video: &VideoFrame, canvas: &mut dyn FrameCanvas) -> FrameReport {
        self.poll_loads();
        canvas.draw_video(video);

        let detection = match &mut self.detector {
            Some(detector) if !self.closed => {
                detector.submit(video);
                detector.poll()
            }
            _ => None,
        };
        let hand = detection.as_ref().and_then(|d| d.primary());

        let overlay = match self.controller.mode() {
            None => OverlayKind::None,
            Some(RenderMode::Basic) => self.draw_static(video, canvas),
            Some(RenderMode::TwoD) => hand.map_or(OverlayKind::None, |hand| {
                self.draw_sprite(video, hand, canvas)
            }),
            Some(RenderMode::ThreeD) => match hand {
                Some(hand) => self.draw_model(video, hand, canvas),
                None => {
                    if let Some(scene) = &mut self.scene {
                        scene.hide();
                    }
                    OverlayKind::None
                }
            },
        };

        self.frames += 1;
        let report = FrameReport {
            index: video.index,
            mode: self.controller.state(),
            overlay,
        };
        tracing::trace!(session = %self.id, ?report, "frame");
        report
    }

    fn sprite_key(&self, sprite: &SpriteAsset) -> SpriteKey {
        SpriteKey {
            session: self.id.0,
            product: self.product.id.clone(),
            source: sprite.id,
        }
    }

    fn draw_static(&mut self, video: &VideoFrame, canvas: &mut dyn FrameCanvas) -> OverlayKind {
        let Some(sprite) = &self.sprite else {
            return OverlayKind::None;
        };
        let key = self.sprite_key(sprite);
        if self
            .compositor
            .composite_static(canvas, key, Some(sprite), video.size())
        {
            OverlayKind::Static
        } else {
            OverlayKind::None
        }
    }

    fn draw_sprite(
        &mut self,
        video: &VideoFrame,
        hand: &HandLandmarks,
        canvas: &mut dyn FrameCanvas,
    ) -> OverlayKind {
        let Some(sprite) = &self.sprite else {
            return OverlayKind::None;
        };
        let key = self.sprite_key(sprite);
        match self
            .compositor
            .composite(canvas, key, Some(sprite), hand, video.size())
        {
            Ok(true) => OverlayKind::Sprite,
            Ok(false) => OverlayKind::None,
            Err(e) => {
                tracing::debug!(session = %self.id, frame = video.index, error = %e, "no overlay this frame");
                OverlayKind::None
            }
        }
    }

    fn draw_model(
        &mut self,
        video: &VideoFrame,
        hand: &HandLandmarks,
        canvas: &mut dyn FrameCanvas,
    ) -> OverlayKind {
        let Some(scene) = &mut self.scene else {
            return OverlayKind::None;
        };
        let (width, height) = video.size();
        match self.estimator.estimate(hand, width, height) {
            Ok(pose) => {
                scene.update(&pose);
                canvas.draw_model(scene);
                OverlayKind::Model
            }
            Err(e) => {
                scene.hide();
                tracing::debug!(session = %self.id, frame = video.index, error = %e, "no overlay this frame");
                OverlayKind::None
            }
        }
    }

    /// Releases the detector, the video source and the loaded assets.
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(detector) = &mut self.detector {
            detector.close();
        }
        self.detector = None;
        self.source.close();
        self.model_load = None;
        self.sprite_load = None;
        self.scene = None;
        self.sprite = None;
        self.compositor.clear();

        tracing::info!(session = %self.id, frames = self.frames, "session closed");
    }
}

impl Drop for TryOnSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use image::{Rgba, RgbaImage};

    use crate::canvas::RecordingCanvas;
    use crate::detector::ScriptedDetector;
    use crate::error::TryOnError;
    use crate::landmarks::{Detection, Landmark};
    use crate::loader::StubLoader;
    use crate::video::ImageSequenceSource;
    use crate::watch::{MeshAsset, NamedPart, tests::quad};

    fn hand() -> HandLandmarks {
        HandLandmarks::from_key_points(
            Landmark::new(0.5, 0.5, 0.0),
            Landmark::new(0.45, 0.3, 0.0),
            Landmark::new(0.5, 0.28, 0.0),
            Landmark::new(0.55, 0.3, 0.0),
        )
    }

    fn video(index: u64) -> VideoFrame {
        VideoFrame::new(index, RgbaImage::from_pixel(64, 48, Rgba([90, 60, 40, 255])))
    }

    fn source() -> Box<dyn FrameSource> {
        Box::new(ImageSequenceSource::from_images(vec![RgbaImage::new(64, 48)]))
    }

    fn loader(with_model: bool) -> Arc<dyn AssetLoader> {
        let model = with_model.then(|| {
            MeshAsset::from_parts(
                11,
                vec![
                    NamedPart::new("case", quad(-0.2, 0.2, 0.0, 0.1)),
                    NamedPart::new("strap", quad(0.2, 0.5, 0.0, 0.0)),
                ],
            )
        });
        let sprite = RgbaImage::from_pixel(8, 4, Rgba([20, 20, 20, 255]));
        Arc::new(StubLoader {
            model,
            sprite: Some(SpriteAsset::new(12, sprite)),
        })
    }

    fn product_3d() -> ProductDescriptor {
        ProductDescriptor::new("titan-1", "Titan")
            .with_sprite("titan.png")
            .with_model("titan.json")
    }

    fn detector(
        script: impl IntoIterator<Item = Option<Detection>>,
    ) -> (TryOnResult<Box<dyn HandDetector>>, Rc<Cell<bool>>) {
        let scripted = ScriptedDetector::new(script);
        let closed = scripted.closed.clone();
        (Ok(Box::new(scripted)), closed)
    }

    fn settle(session: &mut TryOnSession) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.is_loading() && Instant::now() < deadline {
            session.poll_loads();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!session.is_loading(), "asset loads did not finish");
    }

    #[test]
    fn model_product_renders_3d_once_loaded() {
        let (det, _) = detector(vec![Some(Detection::single(hand())); 3]);
        let mut session =
            TryOnSession::start(product_3d(), &TryOnConfig::default(), loader(true), det, source())
                .unwrap();
        settle(&mut session);
        assert_eq!(session.mode(), Some(RenderMode::ThreeD));

        let mut canvas = RecordingCanvas::default();
        let report = session.frame(&video(0), &mut canvas);
        assert_eq!(report.overlay, OverlayKind::Model);
        assert_eq!(canvas.models, 1);
        assert!(session.scene().unwrap().asset().straps[0].is_dirty());
    }

    #[test]
    fn loaded_assets_are_routed_by_kind() {
        let (det, _) = detector([]);
        let mut session =
            TryOnSession::start(product_3d(), &TryOnConfig::default(), loader(true), det, source())
                .unwrap();
        session.model_load = None;
        session.sprite_load = None;

        session.receive(WatchAsset::Sprite(SpriteAsset::new(40, RgbaImage::new(2, 2))));
        assert_eq!(session.sprite.as_ref().map(|s| s.id), Some(40));
        assert_eq!(session.state(), ModeState::Initializing);

        let mesh = MeshAsset::from_parts(41, vec![NamedPart::new("case", quad(-0.2, 0.2, 0.0, 0.0))]);
        session.receive(WatchAsset::Mesh(mesh));
        assert_eq!(session.mode(), Some(RenderMode::ThreeD));
        assert_eq!(session.scene().unwrap().asset().id, 41);
        assert!(session.sprite.is_some());
    }

    #[test]
    fn rejected_model_falls_back_to_2d_without_model_draws() {
        let (det, _) = detector(vec![Some(Detection::single(hand())); 5]);
        let mut session =
            TryOnSession::start(product_3d(), &TryOnConfig::default(), loader(false), det, source())
                .unwrap();
        settle(&mut session);
        assert_eq!(session.mode(), Some(RenderMode::TwoD));

        let mut canvas = RecordingCanvas::default();
        for i in 0..5 {
            let report = session.frame(&video(i), &mut canvas);
            assert_eq!(report.overlay, OverlayKind::Sprite);
        }
        assert_eq!(canvas.models, 0);
        assert!(session.scene().is_none());
    }

    #[test]
    fn frames_without_hands_hide_overlay_and_keep_running() {
        let mut script = vec![Some(Detection::none()); 10];
        script.push(Some(Detection::single(hand())));
        let (det, _) = detector(script);
        let product = ProductDescriptor::new("w", "Watch").with_sprite("w.png");
        let mut session =
            TryOnSession::start(product, &TryOnConfig::default(), loader(false), det, source())
                .unwrap();
        settle(&mut session);

        let mut canvas = RecordingCanvas::default();
        for i in 0..10 {
            let report = session.frame(&video(i), &mut canvas);
            assert_eq!(report.overlay, OverlayKind::None);
        }
        assert_eq!(canvas.overlay_count(), 0);
        assert_eq!(canvas.videos.len(), 10);

        let report = session.frame(&video(10), &mut canvas);
        assert_eq!(report.overlay, OverlayKind::Sprite);
        assert_eq!(session.frames_rendered(), 11);
    }

    #[test]
    fn late_detector_results_skip_frames() {
        // No fresh result on most frames, as with a slow tracker.
        let script = [None, None, Some(Detection::single(hand())), None];
        let (det, _) = detector(script);
        let product = ProductDescriptor::new("w", "Watch").with_sprite("w.png");
        let mut session =
            TryOnSession::start(product, &TryOnConfig::default(), loader(false), det, source())
                .unwrap();
        settle(&mut session);

        let mut canvas = RecordingCanvas::default();
        let overlays: Vec<_> = (0..4)
            .map(|i| session.frame(&video(i), &mut canvas).overlay)
            .collect();
        assert_eq!(
            overlays,
            vec![OverlayKind::None, OverlayKind::None, OverlayKind::Sprite, OverlayKind::None]
        );
    }

    #[test]
    fn detector_failure_forces_static_overlay() {
        let det: TryOnResult<Box<dyn HandDetector>> = Err(TryOnError::detector_init("no model"));
        let mut session =
            TryOnSession::start(product_3d(), &TryOnConfig::default(), loader(true), det, source())
                .unwrap();
        assert_eq!(session.mode(), Some(RenderMode::Basic));
        settle(&mut session);

        let mut canvas = RecordingCanvas::default();
        let report = session.frame(&video(0), &mut canvas);
        assert_eq!(report.overlay, OverlayKind::Static);
        assert_eq!(canvas.models, 0);
    }

    #[test]
    fn degenerate_hand_skips_overlay() {
        let flat = HandLandmarks::from_key_points(
            Landmark::new(0.5, 0.5, 0.0),
            Landmark::new(0.5, 0.5, 0.0),
            Landmark::new(0.5, 0.5, 0.0),
            Landmark::new(0.5, 0.5, 0.0),
        );
        let (det, _) = detector([Some(Detection::single(flat)), Some(Detection::single(hand()))]);
        let mut session =
            TryOnSession::start(product_3d(), &TryOnConfig::default(), loader(true), det, source())
                .unwrap();
        settle(&mut session);

        let mut canvas = RecordingCanvas::default();
        assert_eq!(session.frame(&video(0), &mut canvas).overlay, OverlayKind::None);
        assert_eq!(session.frame(&video(1), &mut canvas).overlay, OverlayKind::Model);
    }

    #[test]
    fn initializing_shows_plain_video() {
        let (det, _) = detector([Some(Detection::single(hand()))]);
        let mut session =
            TryOnSession::start(product_3d(), &TryOnConfig::default(), loader(true), det, source())
                .unwrap();
        // Hold back the model so the session stays in Initializing.
        let (release, gate) = std::sync::mpsc::channel::<()>();
        session.model_load = Some(PendingLoad::spawn("slow", move || {
            let _ = gate.recv();
            Err(TryOnError::asset_load("cancelled"))
        }));
        assert_eq!(session.state(), ModeState::Initializing);

        let mut canvas = RecordingCanvas::default();
        let report = session.frame(&video(0), &mut canvas);
        assert_eq!(report.overlay, OverlayKind::None);
        assert_eq!(report.mode, ModeState::Initializing);
        assert_eq!(canvas.videos, vec![0]);
        drop(release);
    }

    #[test]
    fn camera_failure_is_fatal_and_releases_detector() {
        let (det, closed) = detector([]);
        let empty: Box<dyn FrameSource> = Box::new(ImageSequenceSource::from_images(vec![]));
        let result = TryOnSession::start(product_3d(), &TryOnConfig::default(), loader(true), det, empty);
        assert!(matches!(result, Err(TryOnError::CameraUnavailable(_))));
        assert!(closed.get());
    }

    #[test]
    fn drop_releases_detector_and_source() {
        let (det, closed) = detector([]);
        let session =
            TryOnSession::start(product_3d(), &TryOnConfig::default(), loader(true), det, source())
                .unwrap();
        assert!(!closed.get());
        drop(session);
        assert!(closed.get());
    }

    #[test]
    fn tick_pulls_from_source_until_closed() {
        let (det, _) = detector([]);
        let product = ProductDescriptor::new("w", "Watch").with_sprite("w.png");
        let mut session =
            TryOnSession::start(product, &TryOnConfig::default(), loader(false), det, source())
                .unwrap();

        let mut canvas = RecordingCanvas::default();
        assert_eq!(session.tick(&mut canvas).unwrap().index, 0);
        assert_eq!(session.tick(&mut canvas).unwrap().index, 1);
        session.close();
        assert!(session.is_closed());
        assert!(session.tick(&mut canvas).is_none());
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let (a, _) = detector([]);
        let (b, _) = detector([]);
        let config = TryOnConfig::default();
        let product = ProductDescriptor::new("w", "Watch");
        let first = TryOnSession::start(product.clone(), &config, loader(false), a, source()).unwrap();
        let second = TryOnSession::start(product, &config, loader(false), b, source()).unwrap();
        assert_ne!(first.id(), second.id());
    }
}
