// Hyperlayer Key Type
// Symbolic key codes and the identity a rule unit is triggered by

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::modifier::ModifierSet;

/// Represents a single key by its symbolic engine name.
///
/// The name is opaque to this crate (`spacebar`, `left_command`, `d`, ...);
/// it is only compared and handed through to the compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(String);

impl KeyCode {
    /// Get the symbolic name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}

impl From<&str> for KeyCode {
    fn from(name: &str) -> Self {
        KeyCode(name.to_string())
    }
}

impl From<String> for KeyCode {
    fn from(name: String) -> Self {
        KeyCode(name)
    }
}

impl FromStr for KeyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if KeyCode::is_valid_name(&name) {
            Ok(KeyCode(name))
        } else {
            Err(format!("Unknown key: {}", s))
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key plus the modifiers that must be held for it to match.
///
/// Immutable once built; used only as a lookup key for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyIdentity {
    code: KeyCode,
    mandatory: ModifierSet,
    optional_any: bool,
}

impl KeyIdentity {
    /// Identity that matches the key with any extra modifiers held
    pub fn new(code: impl Into<KeyCode>) -> Self {
        Self {
            code: code.into(),
            mandatory: ModifierSet::new(),
            optional_any: true,
        }
    }

    /// Require these modifiers to be held
    pub fn with_mandatory(mut self, modifiers: ModifierSet) -> Self {
        self.mandatory = modifiers;
        self
    }

    /// Reject extra modifiers beyond the mandatory ones
    pub fn exact(mut self) -> Self {
        self.optional_any = false;
        self
    }

    pub fn code(&self) -> &KeyCode {
        &self.code
    }

    pub fn mandatory(&self) -> &ModifierSet {
        &self.mandatory
    }

    /// Whether extra held modifiers are accepted (and passed through)
    pub fn accepts_extra_modifiers(&self) -> bool {
        self.optional_any
    }

    /// Check if a physical key-down with `held` modifiers matches
    pub fn matches(&self, code: &KeyCode, held: &ModifierSet) -> bool {
        if &self.code != code || !self.mandatory.satisfied_by(held) {
            return false;
        }
        self.optional_any || self.mandatory.uncovered(held).is_empty()
    }
}

impl From<KeyCode> for KeyIdentity {
    fn from(code: KeyCode) -> Self {
        KeyIdentity::new(code)
    }
}

impl From<&str> for KeyIdentity {
    fn from(name: &str) -> Self {
        KeyIdentity::new(name)
    }
}

impl fmt::Display for KeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mandatory.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}-{}", self.mandatory, self.code)
        }
    }
}
