// Hyperlayer Config Parser - TOML with Serde
// Parses a profile definition from TOML into a compiled Profile

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::condition::AppMatcher;
use crate::config::key_parser::{parse_key_string, KeyParseError, ParsedKey};
use crate::guard::GuardScope;
use crate::key::{KeyCode, KeyIdentity};
use crate::modifier::{Modifier, ModifierSet};
use crate::multi_tap::{MultiTap, DEFAULT_DOUBLE_TAP_WINDOW_MS};
use crate::profile::{Profile, ProfileBuilder, ProfileError};
use crate::reset::GlobalReset;
use crate::step::{ActionList, ActionStep, StickyMode};
use crate::sublayer::{ModalLayer, Persistence, SublayerDescriptor};
use crate::tap_hold::{TapHold, DEFAULT_THRESHOLD_MS};

/// Configuration parser errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid modifier: {0}")]
    InvalidModifier(String),

    #[error("Invalid app matcher: {0}")]
    InvalidPattern(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid profile: {0}")]
    Profile(#[from] ProfileError),
}

impl From<KeyParseError> for ConfigError {
    fn from(err: KeyParseError) -> Self {
        match err {
            KeyParseError::UnknownModifier(_) => ConfigError::InvalidModifier(err.to_string()),
            _ => ConfigError::InvalidKey(err.to_string()),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_modal_variable() -> String {
    "hyper".to_string()
}

/// Root TOML table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileToml {
    pub profile: ProfileSection,

    #[serde(default)]
    pub timing: TimingSection,

    #[serde(default)]
    pub tap_hold: Vec<TapHoldToml>,

    #[serde(default)]
    pub multi_tap: Vec<MultiTapToml>,

    #[serde(default)]
    pub modal: Option<ModalToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSection {
    pub title: String,
    /// Key that zeroes every variable
    pub reset_key: Option<String>,
    #[serde(default = "default_true")]
    pub reset_passthrough: bool,
    #[serde(default)]
    pub guard_scope: GuardScope,
}

/// Defaults applied where a definition sets no timer of its own
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TimingSection {
    pub hold_threshold_ms: u64,
    pub alone_timeout_ms: u64,
    pub double_tap_window_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            hold_threshold_ms: DEFAULT_THRESHOLD_MS,
            alone_timeout_ms: DEFAULT_THRESHOLD_MS,
            double_tap_window_ms: DEFAULT_DOUBLE_TAP_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TapHoldToml {
    pub key: String,
    /// Defaults to re-emitting the key
    pub alone: Option<StepsToml>,
    #[serde(default)]
    pub held: StepsToml,
    pub threshold_ms: Option<u64>,
    pub alone_timeout_ms: Option<u64>,
    #[serde(default)]
    pub app: Vec<AppOverrideToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppOverrideToml {
    pub bundle_id: Option<String>,
    pub pattern: Option<String>,
    /// Condition string such as `bundle_id != "com.apple.finder"`
    pub when: Option<String>,
    #[serde(default)]
    pub negate: bool,
    pub alone: Option<StepsToml>,
    #[serde(default)]
    pub held: StepsToml,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiTapToml {
    pub key: String,
    pub variable: Option<String>,
    pub window_ms: Option<u64>,
    pub threshold_ms: Option<u64>,
    #[serde(default)]
    pub hold: StepsToml,
    #[serde(default)]
    pub tap_tap: StepsToml,
    #[serde(default)]
    pub tap_tap_hold: StepsToml,
    #[serde(default = "default_true")]
    pub passthrough: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModalToml {
    pub key: String,
    #[serde(default = "default_modal_variable")]
    pub variable: String,
    pub threshold_ms: Option<u64>,
    pub alone: Option<StepsToml>,
    #[serde(default)]
    pub record_activation_time: bool,
    #[serde(default)]
    pub sublayer: Vec<SublayerToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SublayerToml {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub persistence: Persistence,
    /// Whether extra held modifiers reach the bound keystroke
    #[serde(default = "default_true")]
    pub passthrough_modifiers: bool,
    #[serde(default)]
    pub bindings: IndexMap<String, StepsToml>,
}

/// A list of steps or a single step
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StepsToml {
    // Must precede One: struct steps also deserialize from arrays
    Many(Vec<StepToml>),
    One(StepToml),
}

impl Default for StepsToml {
    fn default() -> Self {
        StepsToml::Many(Vec::new())
    }
}

impl StepsToml {
    fn steps(&self) -> &[StepToml] {
        match self {
            StepsToml::One(step) => std::slice::from_ref(step),
            StepsToml::Many(steps) => steps,
        }
    }

    fn to_action_list(&self) -> Result<ActionList, ConfigError> {
        self.steps().iter().map(StepToml::to_step).collect()
    }
}

/// Inline action table, or a bare key string like `"left_command-tab"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StepToml {
    Combo(String),
    Key {
        key: String,
        #[serde(default)]
        modifiers: Vec<String>,
    },
    Shell {
        shell: String,
    },
    Open {
        open: String,
    },
    App {
        app: String,
    },
    Sticky {
        sticky: String,
        #[serde(default)]
        mode: StickyMode,
    },
    Set {
        set: String,
        value: i64,
    },
}

fn non_empty<'a>(kind: &str, value: &'a str) -> Result<&'a str, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::InvalidAction(format!("{} cannot be empty", kind)))
    } else {
        Ok(value)
    }
}

fn parse_modifier(name: &str) -> Result<Modifier, ConfigError> {
    Modifier::parse(name).map_err(|e| ConfigError::InvalidModifier(e.to_string()))
}

impl StepToml {
    fn to_step(&self) -> Result<ActionStep, ConfigError> {
        match self {
            StepToml::Combo(combo) => {
                let ParsedKey { modifiers, key } = parse_key_string(combo)?;
                Ok(ActionStep::Key {
                    code: key,
                    modifiers,
                })
            }
            StepToml::Key { key, modifiers } => {
                let code = key.parse::<KeyCode>().map_err(ConfigError::InvalidKey)?;
                let modifiers = modifiers
                    .iter()
                    .map(|m| parse_modifier(m))
                    .collect::<Result<ModifierSet, _>>()?;
                Ok(ActionStep::Key { code, modifiers })
            }
            StepToml::Shell { shell } => Ok(ActionStep::shell(non_empty("shell", shell)?)),
            StepToml::Open { open } => Ok(ActionStep::open(non_empty("open", open)?)),
            StepToml::App { app } => Ok(ActionStep::open_app(non_empty("app", app)?)),
            StepToml::Sticky { sticky, mode } => {
                Ok(ActionStep::sticky(parse_modifier(sticky)?, *mode))
            }
            StepToml::Set { set, value } => Ok(ActionStep::set(non_empty("set", set)?, *value)),
        }
    }
}

fn parse_trigger(key: &str) -> Result<KeyIdentity, ConfigError> {
    Ok(parse_key_string(key)?.identity())
}

fn parse_key(name: &str) -> Result<KeyCode, ConfigError> {
    name.parse::<KeyCode>().map_err(ConfigError::InvalidKey)
}

impl AppOverrideToml {
    fn matcher(&self) -> Result<AppMatcher, ConfigError> {
        let matcher = match (&self.bundle_id, &self.pattern, &self.when) {
            (Some(id), None, None) => AppMatcher::bundle_id(non_empty("bundle_id", id)?),
            (None, Some(pattern), None) => AppMatcher::pattern(pattern)
                .map_err(|e| ConfigError::InvalidPattern(e.to_string()))?,
            (None, None, Some(when)) => {
                AppMatcher::parse(when).map_err(|e| ConfigError::InvalidPattern(e.to_string()))?
            }
            _ => {
                return Err(ConfigError::InvalidPattern(
                    "app override needs exactly one of bundle_id, pattern or when".to_string(),
                ))
            }
        };
        Ok(if self.negate { matcher.negate() } else { matcher })
    }
}

impl TapHoldToml {
    fn to_tap_hold(&self, timing: &TimingSection) -> Result<TapHold, ConfigError> {
        let mut tap_hold = TapHold::new(parse_trigger(&self.key)?)
            .held(self.held.to_action_list()?)
            .held_threshold_ms(self.threshold_ms.unwrap_or(timing.hold_threshold_ms))
            .alone_timeout_ms(self.alone_timeout_ms.unwrap_or(timing.alone_timeout_ms));
        if let Some(alone) = &self.alone {
            tap_hold = tap_hold.alone(alone.to_action_list()?);
        }

        for app in &self.app {
            let alone = match &app.alone {
                Some(alone) => alone.to_action_list()?,
                None => vec![ActionStep::key(tap_hold.key().code().clone())],
            };
            tap_hold = tap_hold.on_app(app.matcher()?, alone, app.held.to_action_list()?);
        }
        Ok(tap_hold)
    }
}

impl MultiTapToml {
    fn to_multi_tap(&self, timing: &TimingSection) -> Result<MultiTap, ConfigError> {
        let mut multi_tap = MultiTap::new(parse_trigger(&self.key)?)
            .window_ms(self.window_ms.unwrap_or(timing.double_tap_window_ms))
            .threshold_ms(self.threshold_ms.unwrap_or(timing.hold_threshold_ms))
            .passthrough(self.passthrough)
            .hold(self.hold.to_action_list()?)
            .tap_tap(self.tap_tap.to_action_list()?)
            .tap_tap_hold(self.tap_tap_hold.to_action_list()?);
        if let Some(variable) = &self.variable {
            multi_tap = multi_tap.variable(variable);
        }
        Ok(multi_tap)
    }
}

impl SublayerToml {
    fn to_descriptor(&self) -> Result<SublayerDescriptor, ConfigError> {
        let mut descriptor =
            SublayerDescriptor::new(parse_key(&self.key)?, &self.name).persistence(self.persistence);
        for (key, steps) in &self.bindings {
            let mut identity = parse_trigger(key)?;
            if !self.passthrough_modifiers {
                identity = identity.exact();
            }
            descriptor = descriptor.bind_identity(identity, steps.to_action_list()?);
        }
        Ok(descriptor)
    }
}

impl ModalToml {
    fn to_layer(&self) -> Result<ModalLayer, ConfigError> {
        let mut layer = ModalLayer::new(parse_key(&self.key)?)
            .variable(&self.variable)
            .record_activation_time(self.record_activation_time);
        if let Some(ms) = self.threshold_ms {
            layer = layer.threshold_ms(ms);
        }
        if let Some(alone) = &self.alone {
            layer = layer.alone(alone.to_action_list()?);
        }
        for sublayer in &self.sublayer {
            layer = layer.sublayer(sublayer.to_descriptor()?);
        }
        Ok(layer)
    }
}

impl ProfileToml {
    /// Parse the TOML text without building
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))
    }

    /// Convert into a profile builder
    pub fn to_builder(&self) -> Result<ProfileBuilder, ConfigError> {
        let mut builder =
            Profile::builder(&self.profile.title).guard_scope(self.profile.guard_scope);

        if let Some(key) = &self.profile.reset_key {
            builder = builder
                .reset(GlobalReset::new(parse_key(key)?).passthrough(self.profile.reset_passthrough));
        }
        if let Some(modal) = &self.modal {
            builder = builder.modal(modal.to_layer()?);
        }
        for tap_hold in &self.tap_hold {
            builder = builder.tap_hold(tap_hold.to_tap_hold(&self.timing)?);
        }
        for multi_tap in &self.multi_tap {
            builder = builder.multi_tap(multi_tap.to_multi_tap(&self.timing)?);
        }

        log::debug!(
            "Parsed profile '{}': {} tap-hold, {} multi-tap, modal layer: {}",
            self.profile.title,
            self.tap_hold.len(),
            self.multi_tap.len(),
            self.modal.is_some()
        );
        Ok(builder)
    }
}

/// Parse and build a profile from TOML text
pub fn parse_profile(content: &str) -> Result<Profile, ConfigError> {
    Ok(ProfileToml::from_toml(content)?.to_builder()?.build()?)
}

/// Read, parse and build a profile file
pub fn load_profile<P: AsRef<Path>>(path: P) -> Result<Profile, ConfigError> {
    let path = path.as_ref();
    log::debug!("Loading profile from {}", path.display());
    let content = fs::read_to_string(path)?;
    parse_profile(&content)
}

/// Default profile location under the user's config directory
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hyperlayer").join("profile.toml"))
}
