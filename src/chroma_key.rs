//! Background removal for product sprites.
//!
//! Catalog images are shot on a white or light-gray backdrop. Keying makes
//! those pixels transparent so only the product is composited over the video.

use image::{Rgba, RgbaImage};

use crate::config::ChromaKeyConfig;

/// Near-white / near-uniform light-gray keyer.
#[derive(Clone, Debug, Default)]
pub struct ChromaKey {
    config: ChromaKeyConfig,
}

impl ChromaKey {
    pub fn new(config: ChromaKeyConfig) -> Self {
        Self { config }
    }

    /// Whether a pixel belongs to the backdrop.
    ///
    /// A pixel is backdrop when every channel exceeds the white threshold, or
    /// when every channel exceeds the gray threshold and the channels are
    /// within the gray tolerance of each other.
    pub fn is_background(&self, pixel: Rgba<u8>) -> bool {
        let [r, g, b, _] = pixel.0;
        let c = &self.config;

        if r > c.white_threshold && g > c.white_threshold && b > c.white_threshold {
            return true;
        }

        r > c.gray_threshold
            && g > c.gray_threshold
            && b > c.gray_threshold
            && r.abs_diff(g) < c.gray_tolerance
            && g.abs_diff(b) < c.gray_tolerance
    }

    /// Zeroes alpha on backdrop pixels in place; other pixels keep their alpha.
    ///
    /// Returns the number of pixels keyed out.
    pub fn apply(&self, image: &mut RgbaImage) -> usize {
        let mut keyed = 0;
        for pixel in image.pixels_mut() {
            if self.is_background(*pixel) {
                pixel.0[3] = 0;
                keyed += 1;
            }
        }
        keyed
    }
}
