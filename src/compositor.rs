//! The 2D try-on pipeline.
//!
//! A product photo is keyed once per session, then drawn every frame across
//! the wrist: rotated perpendicular to the forearm, scaled to the hand and
//! nudged toward the knuckles, with a soft shadow underneath.
//!
//! All placement math happens in frame pixels with Y growing downward, so
//! angles are clockwise on screen.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;
use image::{Rgba, RgbaImage};

use crate::canvas::{DropShadow, FrameCanvas, SpriteQuad};
use crate::chroma_key::ChromaKey;
use crate::config::{BasicOverlayConfig, ChromaKeyConfig, MAX_SHADOW_BLUR, OverlayConfig};
use crate::landmarks::{HandLandmarks, Landmark};
use crate::pose::PoseError;
use crate::watch::SpriteAsset;

/// Minimum pixel length for the hand-width and forearm vectors.
const MIN_SPAN_PX: f32 = 1e-3;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Where and how large the sprite is drawn for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayPlacement {
    /// Index-to-pinky distance in pixels.
    pub hand_width: f32,
    /// Midpoint of the index and pinky bases.
    pub knuckle_center: Vec2,
    /// Direction from the wrist to the knuckles, in radians.
    pub forearm_angle: f32,
    /// Sprite rotation: the forearm angle plus a quarter turn.
    pub rotation: f32,
    /// Drawn sprite width.
    pub size: f32,
    /// Sprite center.
    pub position: Vec2,
}

impl OverlayPlacement {
    pub fn compute(
        landmarks: &HandLandmarks,
        frame_width: f32,
        frame_height: f32,
        config: &OverlayConfig,
    ) -> Result<Self, PoseError> {
        let screen = |lm: Landmark, name: &'static str| {
            if lm.is_finite() {
                Ok(lm.to_screen(frame_width, frame_height))
            } else {
                Err(PoseError::MissingLandmarks(name))
            }
        };
        let wrist = screen(landmarks.wrist(), "wrist")?;
        let index = screen(landmarks.index_base(), "index base")?;
        let pinky = screen(landmarks.pinky_base(), "pinky base")?;

        let hand_width = index.distance(pinky);
        if hand_width <= MIN_SPAN_PX {
            return Err(PoseError::Degenerate("hand width"));
        }

        let knuckle_center = (index + pinky) * 0.5;
        let forearm = knuckle_center - wrist;
        let forearm_length = forearm.length();
        if forearm_length <= MIN_SPAN_PX {
            return Err(PoseError::Degenerate("forearm"));
        }

        let forearm_angle = forearm.y.atan2(forearm.x);
        let size = hand_width * config.size_factor;
        let position = wrist + forearm / forearm_length * (size * config.offset_factor);

        Ok(Self {
            hand_width,
            knuckle_center,
            forearm_angle,
            rotation: forearm_angle + FRAC_PI_2,
            size,
            position,
        })
    }

    /// The sprite rectangle for an image of the given aspect (width / height).
    pub fn quad(&self, aspect: f32) -> SpriteQuad {
        SpriteQuad::new(self.position, self.size, self.size / aspect, self.rotation)
    }
}

/// Identity of a keyed sprite: who asked for it and from which image.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpriteKey {
    pub session: u64,
    pub product: String,
    pub source: u64,
}

/// A background-removed sprite ready to draw.
#[derive(Clone, Debug)]
pub struct KeyedSprite {
    pub key: SpriteKey,
    /// Unique per keying pass; GPU textures are cached by it.
    pub generation: u64,
    pub image: Arc<RgbaImage>,
    /// Black, blurred copy of the keyed alpha, padded by `shadow_padding`.
    pub shadow: Option<Arc<RgbaImage>>,
    pub shadow_padding: u32,
}

impl KeyedSprite {
    pub fn aspect(&self) -> f32 {
        let (w, h) = self.image.dimensions();
        if h == 0 { 1.0 } else { w as f32 / h as f32 }
    }

    /// Where the shadow image lands for a sprite drawn at `quad`.
    pub fn shadow_quad(&self, quad: SpriteQuad, shadow: DropShadow) -> Option<SpriteQuad> {
        let mask = self.shadow.as_ref()?;
        let width = self.image.width();
        if width == 0 {
            return None;
        }
        let px_scale = quad.width / width as f32;
        Some(
            SpriteQuad::new(
                quad.center,
                mask.width() as f32 * px_scale,
                mask.height() as f32 * px_scale,
                quad.rotation,
            )
            .translated(shadow.offset),
        )
    }
}

/// Builds the blurred drop-shadow mask for a keyed image.
///
/// The mask is padded so the blur is not clipped at the image edge.
///
/// The radius is clamped to [`MAX_SHADOW_BLUR`]; a non-finite radius or one
/// whose padding would not fit the image size gives an unblurred mask.
pub fn shadow_mask(keyed: &RgbaImage, blur_radius: f32) -> (RgbaImage, u32) {
    let (w, h) = keyed.dimensions();
    let sigma = if blur_radius.is_finite() {
        blur_radius.clamp(0.0, MAX_SHADOW_BLUR) * 0.5
    } else {
        0.0
    };
    let padding = if sigma > 0.0 { (sigma * 3.0).ceil() as u32 } else { 0 };
    let padded = padding
        .checked_mul(2)
        .and_then(|pad| Some((w.checked_add(pad)?, h.checked_add(pad)?)));
    let (sigma, padding, (mw, mh)) = match padded {
        Some(size) => (sigma, padding, size),
        None => (0.0, 0, (w, h)),
    };

    let mut mask = RgbaImage::new(mw, mh);
    for (x, y, pixel) in keyed.enumerate_pixels() {
        mask.put_pixel(x + padding, y + padding, Rgba([0, 0, 0, pixel.0[3]]));
    }

    if sigma > 0.0 {
        mask = image::imageops::blur(&mask, sigma);
    }
    (mask, padding)
}

fn key_sprite(chroma: &ChromaKey, shadow_blur: f32, key: SpriteKey, sprite: &SpriteAsset) -> KeyedSprite {
    let mut image = (*sprite.image).clone();
    let removed = chroma.apply(&mut image);
    let (mask, shadow_padding) = shadow_mask(&image, shadow_blur);
    tracing::debug!(
        session = key.session,
        product = %key.product,
        removed,
        "keyed sprite"
    );
    KeyedSprite {
        key,
        generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        image: Arc::new(image),
        shadow: Some(Arc::new(mask)),
        shadow_padding,
    }
}

/// Draws chroma-keyed sprites over the video.
///
/// Keying and shadow blurring run once per [`SpriteKey`]; later frames reuse
/// the cached result until the session, product or source image changes.
#[derive(Debug)]
pub struct ChromaKeyCompositor {
    overlay: OverlayConfig,
    basic: BasicOverlayConfig,
    key: ChromaKey,
    cache: Option<KeyedSprite>,
}

impl ChromaKeyCompositor {
    pub fn new(overlay: OverlayConfig, chroma: ChromaKeyConfig, basic: BasicOverlayConfig) -> Self {
        Self {
            overlay,
            basic,
            key: ChromaKey::new(chroma),
            cache: None,
        }
    }

    /// The keyed sprite for `key`, keying `sprite` if the cache is stale.
    pub fn prepare(&mut self, key: SpriteKey, sprite: &SpriteAsset) -> &KeyedSprite {
        let cache = &mut self.cache;
        if cache.as_ref().is_some_and(|cached| cached.key != key) {
            *cache = None;
        }
        cache.get_or_insert_with(|| key_sprite(&self.key, self.overlay.shadow_blur, key, sprite))
    }

    /// Drops the cached sprite.
    pub fn clear(&mut self) {
        self.cache = None;
    }

    pub fn cached(&self) -> Option<&KeyedSprite> {
        self.cache.as_ref()
    }

    fn drop_shadow(&self) -> DropShadow {
        DropShadow {
            offset: Vec2::from(self.overlay.shadow_offset),
            opacity: self.overlay.shadow_opacity,
        }
    }

    /// Draws the sprite across the tracked wrist.
    ///
    /// Returns `Ok(false)` without drawing while the sprite is still loading.
    pub fn composite(
        &mut self,
        canvas: &mut dyn FrameCanvas,
        key: SpriteKey,
        sprite: Option<&SpriteAsset>,
        landmarks: &HandLandmarks,
        frame_size: (f32, f32),
    ) -> Result<bool, PoseError> {
        let Some(sprite) = sprite else {
            return Ok(false);
        };
        let placement =
            OverlayPlacement::compute(landmarks, frame_size.0, frame_size.1, &self.overlay)?;
        let shadow = self.drop_shadow();
        let keyed = self.prepare(key, sprite);
        canvas.draw_sprite(keyed, placement.quad(keyed.aspect()), Some(shadow));
        Ok(true)
    }

    /// Draws the untracked Basic-mode overlay at a fixed spot.
    pub fn composite_static(
        &mut self,
        canvas: &mut dyn FrameCanvas,
        key: SpriteKey,
        sprite: Option<&SpriteAsset>,
        frame_size: (f32, f32),
    ) -> bool {
        let Some(sprite) = sprite else {
            return false;
        };
        let (w, h) = frame_size;
        let center = Vec2::new(self.basic.center[0] * w, self.basic.center[1] * h);
        let width = self.basic.width_fraction * w;
        let shadow = self.drop_shadow();

        let keyed = self.prepare(key, sprite);
        let quad = SpriteQuad::new(center, width, width / keyed.aspect(), 0.0);
        canvas.draw_sprite(keyed, quad, Some(shadow));
        true
    }
}

impl Default for ChromaKeyCompositor {
    fn default() -> Self {
        Self::new(
            OverlayConfig::default(),
            ChromaKeyConfig::default(),
            BasicOverlayConfig::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::RecordingCanvas;

    const EPS: f32 = 1e-4;

    fn upright_hand() -> HandLandmarks {
        HandLandmarks::from_key_points(
            Landmark::new(0.5, 0.5, 0.0),
            Landmark::new(0.45, 0.3, 0.0),
            Landmark::new(0.5, 0.28, 0.0),
            Landmark::new(0.55, 0.3, 0.0),
        )
    }

    fn key(session: u64, product: &str, source: u64) -> SpriteKey {
        SpriteKey {
            session,
            product: product.to_string(),
            source,
        }
    }

    fn sprite(id: u64) -> SpriteAsset {
        // White backdrop with a dark 2x2 watch face in the middle.
        let mut image = RgbaImage::from_pixel(8, 4, Rgba([255, 255, 255, 255]));
        for (x, y) in [(3, 1), (4, 1), (3, 2), (4, 2)] {
            image.put_pixel(x, y, Rgba([30, 30, 30, 255]));
        }
        SpriteAsset::new(id, image)
    }

    #[test]
    fn upright_hand_scenario() {
        let config = OverlayConfig::default();
        let p = OverlayPlacement::compute(&upright_hand(), 640.0, 480.0, &config).unwrap();

        let expected_width = Vec2::new(288.0, 144.0).distance(Vec2::new(352.0, 144.0));
        assert!((p.hand_width - expected_width).abs() < EPS);
        assert!((p.size - expected_width * 0.85).abs() < EPS);
        assert!(p.knuckle_center.abs_diff_eq(Vec2::new(320.0, 144.0), EPS));

        // The forearm points straight up the screen; the sprite lies across it.
        assert!((p.forearm_angle + FRAC_PI_2).abs() < EPS);
        assert!(p.rotation.abs() < EPS);

        // Shifted a tenth of the sprite width toward the knuckles.
        assert!(p.position.abs_diff_eq(Vec2::new(320.0, 240.0 - p.size * 0.1), EPS));
    }

    #[test]
    fn rotation_is_forearm_plus_quarter_turn() {
        let config = OverlayConfig::default();
        let hands = [
            ([0.2, 0.8], [0.5, 0.4], [0.6, 0.6]),
            ([0.7, 0.3], [0.3, 0.35], [0.35, 0.2]),
            ([0.5, 0.2], [0.45, 0.7], [0.6, 0.72]),
        ];
        for (w, i, p) in hands {
            let hand = HandLandmarks::from_key_points(
                Landmark::new(w[0], w[1], 0.0),
                Landmark::new(i[0], i[1], 0.0),
                Landmark::new((i[0] + p[0]) * 0.5, (i[1] + p[1]) * 0.5, 0.0),
                Landmark::new(p[0], p[1], 0.0),
            );
            let placement = OverlayPlacement::compute(&hand, 1280.0, 720.0, &config).unwrap();
            assert!((placement.rotation - placement.forearm_angle - FRAC_PI_2).abs() < EPS);
        }
    }

    #[test]
    fn degenerate_hands_are_rejected() {
        let config = OverlayConfig::default();
        let pinched = HandLandmarks::from_key_points(
            Landmark::new(0.5, 0.5, 0.0),
            Landmark::new(0.5, 0.3, 0.0),
            Landmark::new(0.5, 0.3, 0.0),
            Landmark::new(0.5, 0.3, 0.0),
        );
        assert_eq!(
            OverlayPlacement::compute(&pinched, 640.0, 480.0, &config),
            Err(PoseError::Degenerate("hand width"))
        );

        let on_wrist = HandLandmarks::from_key_points(
            Landmark::new(0.5, 0.3, 0.0),
            Landmark::new(0.45, 0.3, 0.0),
            Landmark::new(0.5, 0.3, 0.0),
            Landmark::new(0.55, 0.3, 0.0),
        );
        assert_eq!(
            OverlayPlacement::compute(&on_wrist, 640.0, 480.0, &config),
            Err(PoseError::Degenerate("forearm"))
        );
    }

    #[test]
    fn quad_keeps_image_aspect() {
        let p = OverlayPlacement::compute(&upright_hand(), 640.0, 480.0, &OverlayConfig::default())
            .unwrap();
        let quad = p.quad(2.0);
        assert_eq!(quad.width, p.size);
        assert!((quad.height - p.size / 2.0).abs() < EPS);
    }

    #[test]
    fn composite_draws_keyed_sprite_with_shadow() {
        let mut compositor = ChromaKeyCompositor::default();
        let mut canvas = RecordingCanvas::default();
        let sprite = sprite(1);

        let drawn = compositor
            .composite(&mut canvas, key(1, "w", 1), Some(&sprite), &upright_hand(), (640.0, 480.0))
            .unwrap();
        assert!(drawn);

        let (quad, shadow) = canvas.sprites[0];
        assert!((quad.height - quad.width / 2.0).abs() < EPS);
        let shadow = shadow.unwrap();
        assert_eq!(shadow.offset, Vec2::new(4.0, 4.0));
        assert_eq!(shadow.opacity, 0.45);

        let keyed = compositor.cached().unwrap();
        assert_eq!(keyed.image.get_pixel(0, 0).0[3], 0);
        assert_eq!(keyed.image.get_pixel(3, 1).0[3], 255);
        // Source sprite is left untouched.
        assert_eq!(sprite.image.get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn composite_is_no_op_until_sprite_loads() {
        let mut compositor = ChromaKeyCompositor::default();
        let mut canvas = RecordingCanvas::default();
        let drawn = compositor
            .composite(&mut canvas, key(1, "w", 1), None, &upright_hand(), (640.0, 480.0))
            .unwrap();
        assert!(!drawn);
        assert!(canvas.sprites.is_empty());
        assert!(compositor.cached().is_none());
    }

    #[test]
    fn cache_is_reused_until_key_changes() {
        let mut compositor = ChromaKeyCompositor::default();
        let asset = sprite(1);

        let first = compositor.prepare(key(1, "w", 1), &asset).generation;
        let again = compositor.prepare(key(1, "w", 1), &asset).generation;
        assert_eq!(first, again);

        let new_session = compositor.prepare(key(2, "w", 1), &asset).generation;
        assert_ne!(new_session, again);
        let new_product = compositor.prepare(key(2, "x", 1), &asset).generation;
        assert_ne!(new_product, new_session);
        let new_source = compositor.prepare(key(2, "x", 9), &sprite(9)).generation;
        assert_ne!(new_source, new_product);
    }

    #[test]
    fn shadow_mask_is_padded_and_blurred() {
        let mut keyed = RgbaImage::new(10, 10);
        keyed.put_pixel(5, 5, Rgba([200, 10, 10, 255]));

        let (mask, padding) = shadow_mask(&keyed, 4.0);
        assert_eq!(padding, 6);
        assert_eq!(mask.dimensions(), (22, 22));

        let center = mask.get_pixel(11, 11);
        assert_eq!(&center.0[..3], &[0, 0, 0]);
        assert!(center.0[3] < 255);
        let spread = mask.pixels().filter(|p| p.0[3] > 0).count();
        assert!(spread > 1);
    }

    #[test]
    fn oversized_blur_is_clamped() {
        let keyed = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let (mask, padding) = shadow_mask(&keyed, 3e9);
        assert_eq!(padding, (MAX_SHADOW_BLUR * 1.5).ceil() as u32);
        assert_eq!(mask.width(), 4 + padding * 2);

        let (mask, padding) = shadow_mask(&keyed, f32::NAN);
        assert_eq!(padding, 0);
        assert_eq!(mask.dimensions(), (4, 4));
    }

    #[test]
    fn unblurred_mask_copies_alpha() {
        let keyed = RgbaImage::from_pixel(3, 2, Rgba([9, 9, 9, 77]));
        let (mask, padding) = shadow_mask(&keyed, 0.0);
        assert_eq!(padding, 0);
        assert!(mask.pixels().all(|p| p.0 == [0, 0, 0, 77]));
    }

    #[test]
    fn shadow_quad_covers_padding_and_offsets() {
        let mut compositor = ChromaKeyCompositor::default();
        let keyed = compositor.prepare(key(1, "w", 1), &sprite(1)).clone();
        let quad = SpriteQuad::new(Vec2::new(100.0, 100.0), 80.0, 40.0, 0.0);
        let shadow = DropShadow {
            offset: Vec2::new(4.0, 4.0),
            opacity: 0.45,
        };

        let sq = keyed.shadow_quad(quad, shadow).unwrap();
        let scale = 80.0 / 8.0;
        assert!((sq.width - (8 + 2 * keyed.shadow_padding) as f32 * scale).abs() < EPS);
        assert_eq!(sq.center, Vec2::new(104.0, 104.0));
    }

    #[test]
    fn static_overlay_uses_fixed_placement() {
        let mut compositor = ChromaKeyCompositor::default();
        let mut canvas = RecordingCanvas::default();
        let sprite = sprite(1);
        assert!(compositor.composite_static(&mut canvas, key(1, "w", 1), Some(&sprite), (1000.0, 500.0)));

        let (quad, _) = canvas.sprites[0];
        assert_eq!(quad.center, Vec2::new(500.0, 350.0));
        assert_eq!(quad.width, 250.0);
        assert_eq!(quad.rotation, 0.0);
        assert!(!compositor.composite_static(&mut canvas, key(1, "w", 1), None, (1000.0, 500.0)));
    }
}
