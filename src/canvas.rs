//! The drawing surface both overlay pipelines render onto.
//!
//! A [`FrameCanvas`] receives the video frame first, then at most one overlay:
//! a keyed sprite (2D and Basic modes) or the wrist scene (3D mode). The GPU
//! renderer implements it for the window; tests use a recording canvas.

use glam::Vec2;

use crate::compositor::KeyedSprite;
use crate::scene::WristScene;
use crate::video::VideoFrame;

/// A rotated, centered rectangle in frame pixels (Y down).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpriteQuad {
    pub center: Vec2,
    pub width: f32,
    pub height: f32,
    /// Clockwise on screen, in radians.
    pub rotation: f32,
}

impl SpriteQuad {
    pub fn new(center: Vec2, width: f32, height: f32, rotation: f32) -> Self {
        Self {
            center,
            width,
            height,
            rotation,
        }
    }

    /// Same quad shifted by `offset` pixels.
    pub fn translated(self, offset: Vec2) -> Self {
        Self {
            center: self.center + offset,
            ..self
        }
    }

    /// Corners in order top-left, top-right, bottom-right, bottom-left
    /// (before rotation).
    pub fn corners(&self) -> [Vec2; 4] {
        let half = Vec2::new(self.width, self.height) * 0.5;
        let rot = Vec2::from_angle(self.rotation);
        [
            Vec2::new(-half.x, -half.y),
            Vec2::new(half.x, -half.y),
            Vec2::new(half.x, half.y),
            Vec2::new(-half.x, half.y),
        ]
        .map(|local| self.center + rot.rotate(local))
    }
}

/// Soft shadow drawn beneath a sprite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DropShadow {
    /// Pixel offset from the sprite.
    pub offset: Vec2,
    /// Black tint opacity in `[0, 1]`.
    pub opacity: f32,
}

/// Receives the layers of one composited frame.
pub trait FrameCanvas {
    /// Draws the camera image as the background.
    fn draw_video(&mut self, frame: &VideoFrame);

    /// Draws a keyed sprite, optionally with its blurred shadow underneath.
    fn draw_sprite(&mut self, sprite: &KeyedSprite, quad: SpriteQuad, shadow: Option<DropShadow>);

    /// Rasterizes the wrist scene over the current frame.
    ///
    /// Takes the scene mutably so the canvas can consume the straps' dirty
    /// flags once their vertices are uploaded.
    fn draw_model(&mut self, scene: &mut WristScene);
}

/// Canvas that records calls instead of drawing.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingCanvas {
    pub videos: Vec<u64>,
    pub sprites: Vec<(SpriteQuad, Option<DropShadow>)>,
    pub models: usize,
}

#[cfg(test)]
impl RecordingCanvas {
    pub fn overlay_count(&self) -> usize {
        self.sprites.len() + self.models
    }
}

#[cfg(test)]
impl FrameCanvas for RecordingCanvas {
    fn draw_video(&mut self, frame: &VideoFrame) {
        self.videos.push(frame.index);
    }

    fn draw_sprite(&mut self, _sprite: &KeyedSprite, quad: SpriteQuad, shadow: Option<DropShadow>) {
        self.sprites.push((quad, shadow));
    }

    fn draw_model(&mut self, _scene: &mut WristScene) {
        self.models += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrotated_corners_span_the_quad() {
        let quad = SpriteQuad::new(Vec2::new(10.0, 20.0), 4.0, 2.0, 0.0);
        let [tl, tr, br, bl] = quad.corners();
        assert!(tl.abs_diff_eq(Vec2::new(8.0, 19.0), 1e-5));
        assert!(tr.abs_diff_eq(Vec2::new(12.0, 19.0), 1e-5));
        assert!(br.abs_diff_eq(Vec2::new(12.0, 21.0), 1e-5));
        assert!(bl.abs_diff_eq(Vec2::new(8.0, 21.0), 1e-5));
    }

    #[test]
    fn quarter_turn_swaps_extent() {
        let quad = SpriteQuad::new(Vec2::ZERO, 4.0, 2.0, std::f32::consts::FRAC_PI_2);
        let [tl, tr, ..] = quad.corners();
        // The top edge now runs vertically.
        assert!((tl.x - tr.x).abs() < 1e-5);
        assert!(((tr.y - tl.y).abs() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn translated_keeps_size() {
        let quad = SpriteQuad::new(Vec2::ZERO, 4.0, 2.0, 0.3).translated(Vec2::new(4.0, 4.0));
        assert_eq!(quad.center, Vec2::new(4.0, 4.0));
        assert_eq!((quad.width, quad.height), (4.0, 2.0));
    }
}
