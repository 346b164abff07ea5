// Hyperlayer Modifier System
// Represents keyboard combo modifiers as named by the remapping engine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::key::KeyCode;

/// Errors produced when resolving modifier names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModifierError {
    #[error("unknown modifier: '{0}'")]
    Unknown(String),
}

/// Represents a keyboard combo modifier, such as Shift or Command
///
/// Generic modifiers (`command`, `shift`, ...) are satisfied by either side;
/// sided modifiers (`left_command`, ...) double as physical key codes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    AsRefStr,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    #[strum(to_string = "command", serialize = "cmd")]
    Command,
    #[strum(to_string = "left_command", serialize = "lcmd")]
    LeftCommand,
    #[strum(to_string = "right_command", serialize = "rcmd")]
    RightCommand,
    #[strum(to_string = "control", serialize = "ctrl")]
    Control,
    #[strum(to_string = "left_control", serialize = "lctrl")]
    LeftControl,
    #[strum(to_string = "right_control", serialize = "rctrl")]
    RightControl,
    #[strum(to_string = "option", serialize = "alt", serialize = "opt")]
    #[serde(rename = "option")]
    Alt,
    #[strum(to_string = "left_option", serialize = "lalt")]
    #[serde(rename = "left_option")]
    LeftAlt,
    #[strum(to_string = "right_option", serialize = "ralt")]
    #[serde(rename = "right_option")]
    RightAlt,
    #[strum(to_string = "shift")]
    Shift,
    #[strum(to_string = "left_shift", serialize = "lshift")]
    LeftShift,
    #[strum(to_string = "right_shift", serialize = "rshift")]
    RightShift,
    #[strum(to_string = "fn")]
    Fn,
    #[strum(to_string = "caps_lock")]
    CapsLock,
}

impl Modifier {
    /// Parse a modifier name or alias
    pub fn parse(name: &str) -> Result<Self, ModifierError> {
        Modifier::from_str(name.trim()).map_err(|_| ModifierError::Unknown(name.to_string()))
    }

    /// Check if this is a generic (side-agnostic) modifier
    pub fn is_generic(self) -> bool {
        matches!(
            self,
            Modifier::Command | Modifier::Control | Modifier::Alt | Modifier::Shift
        )
    }

    /// Get the generic form of a sided modifier
    pub fn generic(self) -> Modifier {
        match self {
            Modifier::LeftCommand | Modifier::RightCommand => Modifier::Command,
            Modifier::LeftControl | Modifier::RightControl => Modifier::Control,
            Modifier::LeftAlt | Modifier::RightAlt => Modifier::Alt,
            Modifier::LeftShift | Modifier::RightShift => Modifier::Shift,
            other => other,
        }
    }

    /// Whether a held modifier satisfies this one as a requirement
    pub fn covers(self, held: Modifier) -> bool {
        self == held || (self.is_generic() && held.generic() == self)
    }

    /// Resolve the modifier a physical key stands for, if any
    pub fn from_key(key: &KeyCode) -> Option<Modifier> {
        Modifier::from_str(key.as_str())
            .ok()
            .filter(|m| !m.is_generic())
    }
}

/// Small ordered, de-duplicated set of modifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierSet(SmallVec<[Modifier; 4]>);

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, modifier: Modifier) {
        if let Err(pos) = self.0.binary_search(&modifier) {
            self.0.insert(pos, modifier);
        }
    }

    pub fn remove(&mut self, modifier: Modifier) {
        self.0.retain(|m| *m != modifier);
    }

    pub fn contains(&self, modifier: Modifier) -> bool {
        self.0.binary_search(&modifier).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Modifier> + '_ {
        self.0.iter().copied()
    }

    /// Every requirement in `self` is satisfied by some modifier in `held`
    pub fn satisfied_by(&self, held: &ModifierSet) -> bool {
        self.iter().all(|req| held.iter().any(|h| req.covers(h)))
    }

    /// Modifiers in `held` that no requirement in `self` accounts for
    pub fn uncovered(&self, held: &ModifierSet) -> ModifierSet {
        held.iter()
            .filter(|h| !self.iter().any(|req| req.covers(*h)))
            .collect()
    }

    pub fn union(&self, other: &ModifierSet) -> ModifierSet {
        self.iter().chain(other.iter()).collect()
    }
}

impl FromIterator<Modifier> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        let mut set = ModifierSet::new();
        for modifier in iter {
            set.insert(modifier);
        }
        set
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self.0.iter().map(|m| m.as_ref()).collect();
        write!(f, "{}", parts.join("-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!(Modifier::parse("command"), Ok(Modifier::Command));
        assert_eq!(Modifier::parse("Cmd"), Ok(Modifier::Command));
        assert_eq!(Modifier::parse("alt"), Ok(Modifier::Alt));
        assert_eq!(Modifier::parse("left_option"), Ok(Modifier::LeftAlt));
        assert_eq!(
            Modifier::parse("hyper"),
            Err(ModifierError::Unknown("hyper".to_string()))
        );
    }

    #[test]
    fn test_display_uses_engine_names() {
        assert_eq!(Modifier::Alt.to_string(), "option");
        assert_eq!(Modifier::LeftCommand.to_string(), "left_command");
        assert_eq!(Modifier::CapsLock.as_ref(), "caps_lock");
    }

    #[test]
    fn test_generic_covers_sides() {
        assert!(Modifier::Command.covers(Modifier::LeftCommand));
        assert!(Modifier::Command.covers(Modifier::RightCommand));
        assert!(!Modifier::LeftCommand.covers(Modifier::RightCommand));
        assert!(!Modifier::Shift.covers(Modifier::LeftCommand));
    }

    #[test]
    fn test_from_key_only_sided() {
        assert_eq!(
            Modifier::from_key(&KeyCode::from("left_shift")),
            Some(Modifier::LeftShift)
        );
        assert_eq!(Modifier::from_key(&KeyCode::from("shift")), None);
        assert_eq!(Modifier::from_key(&KeyCode::from("d")), None);
    }

    #[test]
    fn test_set_is_sorted_and_deduplicated() {
        let set: ModifierSet = [Modifier::Shift, Modifier::Command, Modifier::Shift]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "command-shift");
    }

    #[test]
    fn test_satisfied_by_and_uncovered() {
        let required: ModifierSet = [Modifier::Command].into_iter().collect();
        let held: ModifierSet = [Modifier::LeftCommand, Modifier::LeftShift]
            .into_iter()
            .collect();

        assert!(required.satisfied_by(&held));
        assert!(!required.satisfied_by(&ModifierSet::new()));

        let extra = required.uncovered(&held);
        assert_eq!(extra.iter().collect::<Vec<_>>(), vec![Modifier::LeftShift]);
    }
}
