use std::collections::HashSet;

use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Viewer actions bound to keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Close the window (`Esc`).
    Quit,
    /// Start a session for the next try-on product (`N`).
    NextProduct,
    /// Restart the current session, e.g. after a camera failure (`R`).
    Retry,
}

impl Command {
    pub fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::Escape => Some(Self::Quit),
            KeyCode::KeyN => Some(Self::NextProduct),
            KeyCode::KeyR => Some(Self::Retry),
            _ => None,
        }
    }
}

/// Tracks keyboard state between frames.
#[derive(Debug, Default)]
pub struct Input {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the start of each frame to reset per-frame state.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
    }

    /// Process a window event and update input state.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput { event, .. } = event
            && let PhysicalKey::Code(key) = event.physical_key
        {
            match event.state {
                ElementState::Pressed => self.press(key),
                ElementState::Released => self.release(key),
            }
        }
    }

    fn press(&mut self, key: KeyCode) {
        // Held keys repeat; only the first press counts.
        if self.keys_down.insert(key) {
            self.keys_pressed.insert(key);
        }
    }

    fn release(&mut self, key: KeyCode) {
        self.keys_down.remove(&key);
        self.keys_released.insert(key);
    }

    /// Returns true if the key is currently held down.
    pub fn key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// Returns true if the key was pressed this frame.
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Returns true if the key was released this frame.
    pub fn key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }

    /// Commands whose key went down this frame, `Quit` first.
    pub fn commands(&self) -> Vec<Command> {
        let mut commands: Vec<Command> = self
            .keys_pressed
            .iter()
            .filter_map(|key| Command::from_key(*key))
            .collect();
        commands.sort_by_key(|c| *c != Command::Quit);
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_press_counts_once() {
        let mut input = Input::new();
        input.press(KeyCode::KeyN);
        assert!(input.key_pressed(KeyCode::KeyN));

        input.begin_frame();
        input.press(KeyCode::KeyN);
        assert!(input.key_down(KeyCode::KeyN));
        assert!(!input.key_pressed(KeyCode::KeyN));

        input.release(KeyCode::KeyN);
        assert!(input.key_released(KeyCode::KeyN));
        assert!(!input.key_down(KeyCode::KeyN));
    }

    #[test]
    fn commands_map_bound_keys() {
        let mut input = Input::new();
        input.press(KeyCode::KeyR);
        input.press(KeyCode::Escape);
        input.press(KeyCode::KeyQ);

        let commands = input.commands();
        assert_eq!(commands, vec![Command::Quit, Command::Retry]);

        input.begin_frame();
        assert!(input.commands().is_empty());
    }
}
