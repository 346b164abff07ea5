// Hyperlayer Action Types
// Physical key edges delivered by the input substrate

use std::fmt;

use crate::key::KeyCode;

/// Physical edge of a key event delivered by the input substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Release,
    Press,
}

impl Action {
    /// Returns true if this is a key-down
    pub fn is_pressed(self) -> bool {
        matches!(self, Action::Press)
    }

    /// Returns true if this is a key-up
    pub fn is_released(self) -> bool {
        matches!(self, Action::Release)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Release => write!(f, "release"),
            Action::Press => write!(f, "press"),
        }
    }
}

/// One physical key event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub action: Action,
}

impl KeyEvent {
    pub fn press(key: impl Into<KeyCode>) -> Self {
        Self {
            key: key.into(),
            action: Action::Press,
        }
    }

    pub fn release(key: impl Into<KeyCode>) -> Self {
        Self {
            key: key.into(),
            action: Action::Release,
        }
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.key)
    }
}
