//! Hand keypoints as produced by the external hand-tracking detector.
//!
//! A detector reports 21 landmarks per hand in normalized image coordinates:
//! `x` and `y` in `[0, 1]` relative to the frame (Y grows downward) and `z` a
//! relative depth. Only four of them drive the try-on: the wrist and the bases
//! of the index, middle and pinky fingers.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{TryOnError, TryOnResult};

pub const WRIST: usize = 0;
pub const INDEX_BASE: usize = 5;
pub const MIDDLE_BASE: usize = 9;
pub const PINKY_BASE: usize = 17;

/// Number of landmarks per detected hand.
pub const LANDMARK_COUNT: usize = 21;

/// One tracked keypoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Pixel position in a frame of the given size.
    pub fn to_screen(self, width: f32, height: f32) -> Vec2 {
        Vec2::new(self.x * width, self.y * height)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// The full set of landmarks for one hand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct HandLandmarks {
    points: [Landmark; LANDMARK_COUNT],
}

impl HandLandmarks {
    /// Builds a hand from exactly [`LANDMARK_COUNT`] points.
    pub fn from_slice(points: &[Landmark]) -> TryOnResult<Self> {
        let points: [Landmark; LANDMARK_COUNT] = points.try_into().map_err(|_| {
            TryOnError::missing_landmarks(format!(
                "expected {LANDMARK_COUNT} landmarks, got {}",
                points.len()
            ))
        })?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }

    pub fn wrist(&self) -> Landmark {
        self.points[WRIST]
    }

    pub fn index_base(&self) -> Landmark {
        self.points[INDEX_BASE]
    }

    pub fn middle_base(&self) -> Landmark {
        self.points[MIDDLE_BASE]
    }

    pub fn pinky_base(&self) -> Landmark {
        self.points[PINKY_BASE]
    }

    /// A hand whose unused landmarks all sit on the wrist.
    ///
    /// Handy for synthetic input where only the four driving points matter.
    pub fn from_key_points(
        wrist: Landmark,
        index_base: Landmark,
        middle_base: Landmark,
        pinky_base: Landmark,
    ) -> Self {
        let mut points = [wrist; LANDMARK_COUNT];
        points[INDEX_BASE] = index_base;
        points[MIDDLE_BASE] = middle_base;
        points[PINKY_BASE] = pinky_base;
        Self { points }
    }
}

impl TryFrom<Vec<Landmark>> for HandLandmarks {
    type Error = TryOnError;

    fn try_from(points: Vec<Landmark>) -> Result<Self, Self::Error> {
        Self::from_slice(&points)
    }
}

impl From<HandLandmarks> for Vec<Landmark> {
    fn from(hand: HandLandmarks) -> Self {
        hand.points.to_vec()
    }
}

/// Detector output for a single frame.
///
/// An empty `hands` list means "no hand this frame", which is not an error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub hands: Vec<HandLandmarks>,
}

impl Detection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn single(hand: HandLandmarks) -> Self {
        Self { hands: vec![hand] }
    }

    /// The hand that drives rendering; any others are ignored.
    pub fn primary(&self) -> Option<&HandLandmarks> {
        self.hands.first()
    }
}
