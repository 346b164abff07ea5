// Hyperlayer Config - Key String Parser
// Parses key strings like "left_command-shift-d" into a key and its modifiers

use crate::key::{KeyCode, KeyIdentity};
use crate::modifier::{Modifier, ModifierSet};

/// Result of parsing a key string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    /// Modifiers named before the key
    pub modifiers: ModifierSet,
    /// The last component after hyphens
    pub key: KeyCode,
}

impl ParsedKey {
    /// Trigger identity requiring the parsed modifiers
    pub fn identity(&self) -> KeyIdentity {
        KeyIdentity::new(self.key.clone()).with_mandatory(self.modifiers.clone())
    }
}

/// Errors that can occur during key string parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    EmptyInput,
    UnknownKey(String),
    UnknownModifier(String),
    /// Input ends with hyphen (e.g., "command-")
    TrailingHyphen,
}

impl std::fmt::Display for KeyParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyParseError::EmptyInput => write!(f, "key string cannot be empty"),
            KeyParseError::UnknownKey(name) => write!(f, "unknown key name: '{}'", name),
            KeyParseError::UnknownModifier(name) => write!(f, "unknown modifier: '{}'", name),
            KeyParseError::TrailingHyphen => write!(f, "key string cannot end with hyphen"),
        }
    }
}

impl std::error::Error for KeyParseError {}

/// Parse a key string like "command-shift-d" into modifiers and key
///
/// # Examples
/// ```
/// use hyperlayer_core::config::parse_key_string;
/// use hyperlayer_core::{KeyCode, Modifier};
///
/// let parsed = parse_key_string("left_command-tab").unwrap();
/// assert_eq!(parsed.key, KeyCode::from("tab"));
/// assert!(parsed.modifiers.contains(Modifier::LeftCommand));
/// ```
pub fn parse_key_string(exp: &str) -> Result<ParsedKey, KeyParseError> {
    let trimmed = exp.trim();
    if trimmed.is_empty() {
        return Err(KeyParseError::EmptyInput);
    }
    if trimmed.ends_with('-') {
        return Err(KeyParseError::TrailingHyphen);
    }

    let mut parts: Vec<&str> = trimmed.split('-').collect();
    let key_str = parts.pop().ok_or(KeyParseError::EmptyInput)?;
    let key = key_str
        .parse::<KeyCode>()
        .map_err(|_| KeyParseError::UnknownKey(key_str.to_string()))?;

    let modifiers = parts
        .into_iter()
        .map(|name| {
            Modifier::parse(name).map_err(|_| KeyParseError::UnknownModifier(name.to_string()))
        })
        .collect::<Result<ModifierSet, _>>()?;

    Ok(ParsedKey { modifiers, key })
}
