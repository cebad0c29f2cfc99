//! Which overlay pipeline a session runs.
//!
//! ```text
//!                ┌──────────────┐
//!                │ Initializing │── model loaded ──▶ ThreeD
//!                └──────────────┘
//!                  │         │
//!   model failed,  │         │ model failed, no sprite
//!   sprite exists  ▼         ▼ or detector failed
//!                TwoD ──────▶ Basic
//!                  sprite failed
//! ```
//!
//! Transitions only ever go down (ThreeD → TwoD → Basic) within a session.
//! A new session starts over from `Initializing`.

use std::fmt;

use crate::product::ProductDescriptor;

/// The active overlay pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderMode {
    /// Raw video plus a static, untracked overlay.
    Basic,
    /// Chroma-keyed sprite placed on the wrist.
    TwoD,
    /// Deformable 3D model placed on the wrist.
    ThreeD,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RenderMode::Basic => "basic",
            RenderMode::TwoD => "2d",
            RenderMode::ThreeD => "3d",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeState {
    /// Waiting for the 3D model; frames show plain video.
    Initializing,
    Active(RenderMode),
}

impl ModeState {
    pub fn mode(self) -> Option<RenderMode> {
        match self {
            ModeState::Initializing => None,
            ModeState::Active(mode) => Some(mode),
        }
    }
}

/// Per-session render mode state machine.
#[derive(Clone, Debug)]
pub struct RenderModeController {
    state: ModeState,
    has_sprite: bool,
}

impl RenderModeController {
    /// Evaluates a product at session start.
    ///
    /// `detector_ready` is false when the hand tracker failed to initialize,
    /// which forces Basic whatever assets exist.
    pub fn start(product: &ProductDescriptor, detector_ready: bool) -> Self {
        let has_sprite = product.sprite_url().is_some();
        let mut controller = Self {
            state: ModeState::Initializing,
            has_sprite,
        };

        if !detector_ready {
            controller.transition(RenderMode::Basic, "hand tracker unavailable");
        } else if product.wants_3d() {
            tracing::info!(product = %product.id, "waiting for 3D model");
        } else if has_sprite {
            controller.transition(RenderMode::TwoD, "no 3D model");
        } else {
            controller.transition(RenderMode::Basic, "no 3D model or sprite");
        }
        controller
    }

    pub fn state(&self) -> ModeState {
        self.state
    }

    pub fn mode(&self) -> Option<RenderMode> {
        self.state.mode()
    }

    pub fn is_initializing(&self) -> bool {
        self.state == ModeState::Initializing
    }

    pub fn on_model_loaded(&mut self) {
        if self.is_initializing() {
            self.transition(RenderMode::ThreeD, "model loaded");
        }
    }

    pub fn on_model_failed(&mut self, error: &dyn std::error::Error) {
        tracing::warn!(%error, "3D model failed to load");
        let fallback = if self.has_sprite {
            RenderMode::TwoD
        } else {
            RenderMode::Basic
        };
        self.transition(fallback, "model load failed");
    }

    pub fn on_sprite_failed(&mut self, error: &dyn std::error::Error) {
        tracing::warn!(%error, "sprite failed to load");
        self.has_sprite = false;
        if self.mode() == Some(RenderMode::TwoD) {
            self.transition(RenderMode::Basic, "sprite load failed");
        }
    }

    /// Moves to `to` unless that would be a promotion.
    fn transition(&mut self, to: RenderMode, reason: &str) -> bool {
        let allowed = match self.state {
            ModeState::Initializing => true,
            ModeState::Active(current) => to < current,
        };
        if allowed {
            tracing::info!(from = ?self.state, to = %to, reason, "render mode changed");
            self.state = ModeState::Active(to);
        } else {
            tracing::debug!(state = ?self.state, to = %to, reason, "render mode unchanged");
        }
        allowed
    }
}
