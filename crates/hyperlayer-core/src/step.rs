// Hyperlayer Action Steps
// Terminal actions a rule unit branch executes, in order

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::key::KeyCode;
use crate::modifier::{Modifier, ModifierSet};

/// How a sticky-modifier step changes the modifier's latch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StickyMode {
    On,
    Off,
    #[default]
    Toggle,
}

/// A single step in an action list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStep {
    /// Emit a synthetic keystroke
    Key { code: KeyCode, modifiers: ModifierSet },
    /// Run a shell command
    Shell(String),
    /// Open a file, directory or URL with its default handler
    Open(String),
    /// Launch or focus an application by bundle identifier
    OpenApp(String),
    /// Latch, unlatch or toggle a sticky modifier
    Sticky { modifier: Modifier, mode: StickyMode },
    /// Write an integer into a persisted variable
    SetVariable { name: String, value: i64 },
    /// Write the substrate's current millisecond clock into a variable
    StampVariable(String),
}

/// Ordered list of steps executed as one atomic unit
pub type ActionList = Vec<ActionStep>;

impl ActionStep {
    pub fn key(code: impl Into<KeyCode>) -> Self {
        ActionStep::Key {
            code: code.into(),
            modifiers: ModifierSet::new(),
        }
    }

    pub fn key_with(code: impl Into<KeyCode>, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        ActionStep::Key {
            code: code.into(),
            modifiers: modifiers.into_iter().collect(),
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        ActionStep::Shell(command.into())
    }

    pub fn open(target: impl Into<String>) -> Self {
        ActionStep::Open(target.into())
    }

    pub fn open_app(bundle_id: impl Into<String>) -> Self {
        ActionStep::OpenApp(bundle_id.into())
    }

    pub fn set(name: impl Into<String>, value: i64) -> Self {
        ActionStep::SetVariable {
            name: name.into(),
            value,
        }
    }

    /// Reset a variable to 0
    pub fn clear(name: impl Into<String>) -> Self {
        ActionStep::set(name, 0)
    }

    pub fn stamp(name: impl Into<String>) -> Self {
        ActionStep::StampVariable(name.into())
    }

    pub fn sticky(modifier: Modifier, mode: StickyMode) -> Self {
        ActionStep::Sticky { modifier, mode }
    }

    /// Name of the variable this step writes, if any
    pub fn variable(&self) -> Option<&str> {
        match self {
            ActionStep::SetVariable { name, .. } | ActionStep::StampVariable(name) => Some(name),
            _ => None,
        }
    }

    /// Shell command line for an `Open` step
    pub fn open_command(target: &str) -> String {
        format!("open '{}'", target.replace('\'', r"'\''"))
    }
}

impl fmt::Display for ActionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStep::Key { code, modifiers } if modifiers.is_empty() => write!(f, "key {}", code),
            ActionStep::Key { code, modifiers } => write!(f, "key {}-{}", modifiers, code),
            ActionStep::Shell(command) => write!(f, "shell `{}`", command),
            ActionStep::Open(target) => write!(f, "open {}", target),
            ActionStep::OpenApp(bundle_id) => write!(f, "app {}", bundle_id),
            ActionStep::Sticky { modifier, mode } => write!(f, "sticky {} {}", modifier, mode),
            ActionStep::SetVariable { name, value } => write!(f, "{} = {}", name, value),
            ActionStep::StampVariable(name) => write!(f, "{} = now", name),
        }
    }
}
