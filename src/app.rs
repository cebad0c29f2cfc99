//! The windowed viewer.
//!
//! [`Viewer`] holds the catalog and the live [`TryOnSession`] and reacts to
//! [`Command`]s; it has no GPU state and is what the tests drive.
//! [`run`] wraps it in a winit event loop with a [`FrameRenderer`].

use std::path::PathBuf;
use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::canvas::FrameCanvas;
use crate::config::{TryOnConfig, WindowConfig};
use crate::detector::{HandDetector, ReplayDetector};
use crate::error::{TryOnError, TryOnResult};
use crate::gpu::GpuContext;
use crate::input::{Command, Input};
use crate::loader::AssetLoader;
use crate::product::{Catalog, ProductDescriptor};
use crate::renderer::FrameRenderer;
use crate::session::{FrameReport, TryOnSession};
use crate::video::ImageSequenceSource;

/// Builds sessions from recorded inputs on disk.
pub struct SessionFactory {
    pub config: TryOnConfig,
    pub loader: Arc<dyn AssetLoader>,
    /// Image or directory of images played back as the camera.
    pub video: PathBuf,
    /// JSON-lines landmark recording replayed as the tracker.
    pub landmarks: PathBuf,
    /// Frames between submitting a frame and its landmarks arriving.
    pub latency: usize,
}

impl SessionFactory {
    pub fn start(&self, product: &ProductDescriptor) -> TryOnResult<TryOnSession> {
        let detector = ReplayDetector::from_file(&self.landmarks, self.latency)
            .map(|d| Box::new(d) as Box<dyn HandDetector>);
        let source = Box::new(ImageSequenceSource::new(&self.video));
        TryOnSession::start(
            product.clone(),
            &self.config,
            Arc::clone(&self.loader),
            detector,
            source,
        )
    }
}

/// Catalog navigation plus the active session.
pub struct Viewer {
    factory: SessionFactory,
    catalog: Catalog,
    product: ProductDescriptor,
    session: Option<TryOnSession>,
    last_error: Option<TryOnError>,
}

impl Viewer {
    /// Fails if `product_id` is not in the catalog.
    pub fn new(factory: SessionFactory, catalog: Catalog, product_id: &str) -> TryOnResult<Self> {
        let product = catalog
            .get(product_id)
            .cloned()
            .ok_or_else(|| TryOnError::config(format!("unknown product '{product_id}'")))?;
        Ok(Self {
            factory,
            catalog,
            product,
            session: None,
            last_error: None,
        })
    }

    pub fn product(&self) -> &ProductDescriptor {
        &self.product
    }

    pub fn session(&self) -> Option<&TryOnSession> {
        self.session.as_ref()
    }

    /// Why the last session failed to start, if it did.
    pub fn last_error(&self) -> Option<&TryOnError> {
        self.last_error.as_ref()
    }

    /// Starts a session for the current product, replacing any running one.
    pub fn open(&mut self) {
        // Release the old camera before the new session acquires it.
        self.session = None;
        match self.factory.start(&self.product) {
            Ok(session) => {
                self.session = Some(session);
                self.last_error = None;
            }
            Err(e) => {
                tracing::error!(product = %self.product.id, error = %e, "session failed to start");
                self.last_error = Some(e);
            }
        }
    }

    /// Switches to the next try-on product. Returns `false` if there is none.
    pub fn next_product(&mut self) -> bool {
        let Some(next) = self.catalog.next_try_on(&self.product.id).cloned() else {
            tracing::warn!("no try-on products in the catalog");
            return false;
        };
        tracing::info!(from = %self.product.id, to = %next.id, "switching product");
        self.product = next;
        self.open();
        true
    }

    /// Runs one command. Returns `false` when the viewer should quit.
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::NextProduct => {
                self.next_product();
            }
            Command::Retry => self.open(),
        }
        true
    }

    /// Renders the next frame of the active session.
    pub fn tick(&mut self, canvas: &mut dyn FrameCanvas) -> Option<FrameReport> {
        self.session.as_mut()?.tick(canvas)
    }

    /// Window title for the current state.
    pub fn title(&self, base: &str) -> String {
        match (&self.session, &self.last_error) {
            (Some(session), _) => match session.mode() {
                Some(mode) => format!("{base} - {} [{mode}]", self.product.name),
                None => format!("{base} - {} [loading]", self.product.name),
            },
            (None, Some(_)) => format!("{base} - {} [camera unavailable, R to retry]", self.product.name),
            (None, None) => base.to_string(),
        }
    }
}

enum WristfitApp {
    Pending {
        window: WindowConfig,
        viewer: Option<Viewer>,
    },
    Running {
        window: Arc<Window>,
        base_title: String,
        renderer: FrameRenderer,
        viewer: Viewer,
        input: Input,
    },
    Failed(TryOnError),
}

impl WristfitApp {
    fn start(
        event_loop: &ActiveEventLoop,
        config: &WindowConfig,
        mut viewer: Viewer,
    ) -> TryOnResult<Self> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .map_err(|e| TryOnError::gpu(format!("cannot create window: {e}")))?,
        );
        let gpu = GpuContext::new(window.clone())?;
        viewer.open();

        Ok(WristfitApp::Running {
            window,
            base_title: config.title.clone(),
            renderer: FrameRenderer::new(gpu),
            viewer,
            input: Input::new(),
        })
    }
}

impl ApplicationHandler for WristfitApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let WristfitApp::Pending { window, viewer } = self else {
            return;
        };
        let Some(viewer) = viewer.take() else {
            return;
        };
        let config = window.clone();
        *self = match WristfitApp::start(event_loop, &config, viewer) {
            Ok(app) => app,
            Err(e) => {
                tracing::error!(error = %e, "viewer failed to start");
                event_loop.exit();
                WristfitApp::Failed(e)
            }
        };
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let WristfitApp::Running {
            window,
            base_title,
            renderer,
            viewer,
            input,
        } = self
        else {
            return;
        };

        input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                renderer.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                for command in input.commands() {
                    if !viewer.apply(command) {
                        event_loop.exit();
                        return;
                    }
                    if command != Command::Quit {
                        renderer.release_models();
                    }
                }
                input.begin_frame();

                if viewer.tick(renderer).is_none() {
                    renderer.clear_frame();
                }
                if let Err(e) = renderer.present() {
                    tracing::error!(error = %e, "render failed");
                    event_loop.exit();
                    return;
                }

                let title = viewer.title(base_title);
                if window.title() != title {
                    window.set_title(&title);
                }
                window.request_redraw();
            }
            _ => (),
        }
    }
}

/// Opens the viewer window and runs until it is closed.
pub fn run(window: WindowConfig, viewer: Viewer) -> TryOnResult<()> {
    let event_loop =
        EventLoop::new().map_err(|e| TryOnError::gpu(format!("cannot create event loop: {e}")))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = WristfitApp::Pending {
        window,
        viewer: Some(viewer),
    };
    event_loop
        .run_app(&mut app)
        .map_err(|e| TryOnError::gpu(format!("event loop failed: {e}")))?;

    match app {
        WristfitApp::Failed(e) => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::RecordingCanvas;
    use crate::loader::FileAssetLoader;
    use image::{Rgba, RgbaImage};
    use std::path::Path;

    fn workspace(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wristfit-app-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]))
            .save(dir.join("watch.png"))
            .unwrap();
        std::fs::write(dir.join("hands.jsonl"), "{}\n").unwrap();
        dir
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            ProductDescriptor::new("a", "Alpha").with_sprite("watch.png"),
            ProductDescriptor::new("plain", "No Image"),
            ProductDescriptor::new("b", "Beta").with_sprite("watch.png"),
        ])
    }

    fn viewer(dir: &Path, video: PathBuf) -> Viewer {
        let factory = SessionFactory {
            config: TryOnConfig::default(),
            loader: Arc::new(FileAssetLoader::new(dir)),
            video,
            landmarks: dir.join("hands.jsonl"),
            latency: 0,
        };
        Viewer::new(factory, catalog(), "a").unwrap()
    }

    #[test]
    fn unknown_product_is_rejected() {
        let dir = workspace("unknown");
        let factory = SessionFactory {
            config: TryOnConfig::default(),
            loader: Arc::new(FileAssetLoader::new(&dir)),
            video: dir.join("watch.png"),
            landmarks: dir.join("hands.jsonl"),
            latency: 0,
        };
        let err = Viewer::new(factory, catalog(), "missing").err().unwrap();
        assert!(matches!(err, TryOnError::Config(_)));
    }

    #[test]
    fn next_product_skips_products_without_try_on() {
        let dir = workspace("next");
        let mut viewer = viewer(&dir, dir.join("watch.png"));
        viewer.open();
        let first = viewer.session().unwrap().id();

        assert!(viewer.apply(Command::NextProduct));
        assert_eq!(viewer.product().id, "b");
        assert_ne!(viewer.session().unwrap().id(), first);

        viewer.next_product();
        assert_eq!(viewer.product().id, "a");
    }

    #[test]
    fn retry_recovers_after_camera_failure() {
        let dir = workspace("retry");
        let video = dir.join("camera.png");
        let _ = std::fs::remove_file(&video);
        let mut viewer = viewer(&dir, video.clone());

        viewer.open();
        assert!(viewer.session().is_none());
        assert!(matches!(
            viewer.last_error(),
            Some(TryOnError::CameraUnavailable(_))
        ));
        assert!(viewer.title("wristfit").contains("R to retry"));

        let mut canvas = RecordingCanvas::default();
        assert!(viewer.tick(&mut canvas).is_none());

        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))
            .save(&video)
            .unwrap();
        assert!(viewer.apply(Command::Retry));
        assert!(viewer.session().is_some());
        assert!(viewer.last_error().is_none());
        assert!(viewer.tick(&mut canvas).is_some());
        assert_eq!(canvas.videos, vec![0]);
    }

    #[test]
    fn quit_stops_the_viewer() {
        let dir = workspace("quit");
        let mut viewer = viewer(&dir, dir.join("watch.png"));
        assert!(!viewer.apply(Command::Quit));
    }
}
