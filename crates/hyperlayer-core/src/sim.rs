// Hyperlayer Substrate Simulator
//
// Deterministic model of the remapping engine that executes compiled rule
// units on a virtual millisecond clock:
// - key-down is offered to units in dispatch order; the first whose trigger
//   and guards match claims the key until its key-up
// - alone fires on key-up before the alone timeout, held fires once when the
//   held threshold elapses; a later key-down interrupts both
// - a delayed action window runs exactly one of invoked/canceled; any later
//   key-down cancels it, after that key-down has picked its unit
// - at most one delayed window per key
// - latched sticky modifiers apply to every emitted keystroke until turned off

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::action::{Action, KeyEvent};
use crate::condition::{EvalContext, Predicate};
use crate::key::KeyCode;
use crate::modifier::{Modifier, ModifierSet};
use crate::profile::Profile;
use crate::rule::RuleUnit;
use crate::state::{MemoryStore, VariableStore};
use crate::step::{ActionStep, StickyMode};

/// Engine default when a unit sets no alone timeout
pub const ENGINE_ALONE_TIMEOUT_MS: u64 = 1000;
/// Engine default when a unit sets no held threshold
pub const ENGINE_HELD_THRESHOLD_MS: u64 = 500;
/// Engine default when a unit sets no delayed action delay
pub const ENGINE_DELAYED_ACTION_MS: u64 = 500;

/// Externally observable output of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Key { code: KeyCode, modifiers: ModifierSet },
    Shell(String),
    Open(String),
    OpenApp(String),
    Sticky { modifier: Modifier, mode: StickyMode },
}

impl Effect {
    /// Plain keystroke without modifiers
    pub fn key(code: impl Into<KeyCode>) -> Self {
        Effect::Key {
            code: code.into(),
            modifiers: ModifierSet::new(),
        }
    }

    pub fn key_with(code: impl Into<KeyCode>, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        Effect::Key {
            code: code.into(),
            modifiers: modifiers.into_iter().collect(),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Key { code, modifiers } if modifiers.is_empty() => write!(f, "key {}", code),
            Effect::Key { code, modifiers } => write!(f, "key {}-{}", modifiers, code),
            Effect::Shell(command) => write!(f, "shell `{}`", command),
            Effect::Open(target) => write!(f, "open {}", target),
            Effect::OpenApp(bundle_id) => write!(f, "app {}", bundle_id),
            Effect::Sticky { modifier, mode } => write!(f, "sticky {} {}", modifier, mode),
        }
    }
}

/// A physical key currently down
#[derive(Debug, Clone)]
struct Press {
    /// Unit that claimed the key-down, if any
    unit: Option<usize>,
    pressed_at: u64,
    /// Held modifiers passed through to emitted keystrokes
    passthrough: ModifierSet,
    held_fired: bool,
    interrupted: bool,
}

#[derive(Debug, Clone, Copy)]
struct DelayedWindow {
    unit: usize,
    deadline: u64,
}

/// Timer due next; held timers sort before delayed windows at equal times
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Timer {
    Held(KeyCode),
    Delayed(KeyCode),
}

/// Virtual-clock engine running the units of one profile
#[derive(Debug)]
pub struct Simulator<S: VariableStore = MemoryStore> {
    units: Vec<RuleUnit>,
    store: S,
    now: u64,
    frontmost: Option<String>,
    down: IndexMap<KeyCode, Press>,
    windows: IndexMap<KeyCode, DelayedWindow>,
    sticky: ModifierSet,
    effects: Vec<Effect>,
}

impl Simulator<MemoryStore> {
    pub fn new(profile: &Profile) -> Self {
        Self::with_store(profile, MemoryStore::new())
    }

    /// Run an arbitrary unit list in the given order
    pub fn from_units(units: Vec<RuleUnit>) -> Self {
        Self::from_units_with_store(units, MemoryStore::new())
    }
}

impl<S: VariableStore> Simulator<S> {
    pub fn with_store(profile: &Profile, store: S) -> Self {
        Self::from_units_with_store(profile.units().to_vec(), store)
    }

    pub fn from_units_with_store(units: Vec<RuleUnit>, store: S) -> Self {
        Self {
            units,
            store,
            now: 0,
            frontmost: None,
            down: IndexMap::new(),
            windows: IndexMap::new(),
            sticky: ModifierSet::new(),
            effects: Vec::new(),
        }
    }

    /// Current virtual time in milliseconds
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn variable(&self, name: &str) -> i64 {
        self.store.get(name)
    }

    /// Set the bundle identifier of the foreground application
    pub fn set_frontmost(&mut self, bundle_id: impl Into<String>) {
        self.frontmost = Some(bundle_id.into());
    }

    pub fn clear_frontmost(&mut self) {
        self.frontmost = None;
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Drain every effect produced so far
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn sticky_modifiers(&self) -> &ModifierSet {
        &self.sticky
    }

    pub fn is_down(&self, key: &KeyCode) -> bool {
        self.down.contains_key(key)
    }

    /// Number of outstanding delayed action windows
    pub fn pending_windows(&self) -> usize {
        self.windows.len()
    }

    pub fn has_pending_window(&self, key: &KeyCode) -> bool {
        self.windows.contains_key(key)
    }

    /// Name of the unit that claimed a key currently down
    pub fn claimed_by(&self, key: &KeyCode) -> Option<&str> {
        self.down
            .get(key)
            .and_then(|press| press.unit)
            .map(|index| self.units[index].name.as_str())
    }

    fn held_modifiers(&self, except: &KeyCode) -> ModifierSet {
        self.down
            .keys()
            .filter(|key| *key != except)
            .filter_map(Modifier::from_key)
            .collect()
    }

    /// First unit in dispatch order whose trigger and guards match
    fn select(&self, key: &KeyCode, held: &ModifierSet) -> Option<usize> {
        let ctx = EvalContext {
            store: &self.store,
            frontmost: self.frontmost.as_deref(),
        };
        self.units
            .iter()
            .position(|unit| unit.trigger.matches(key, held) && unit.conditions.holds(&ctx))
    }

    /// Cancel every outstanding delayed window
    fn cancel_windows(&mut self) {
        let windows: Vec<(KeyCode, DelayedWindow)> = self.windows.drain(..).collect();
        for (key, window) in windows {
            log::trace!("{}ms: delayed action on {} canceled", self.now, key);
            if let Some(delayed) = self.units[window.unit].delayed.clone() {
                self.run(&delayed.if_canceled, &ModifierSet::new());
            }
        }
    }

    /// Physical key-down
    pub fn press(&mut self, key: impl Into<KeyCode>) {
        let key = key.into();
        if self.down.contains_key(&key) {
            log::trace!("{}ms: {} already down", self.now, key);
            return;
        }

        let held = self.held_modifiers(&key);
        for press in self.down.values_mut() {
            press.interrupted = true;
        }

        // Selection sees the variables as they were before this key-down
        // cancels any pending window
        let selected = self.select(&key, &held);
        self.cancel_windows();

        let Some(index) = selected else {
            log::trace!("{}ms: press {} unclaimed", self.now, key);
            self.down.insert(
                key.clone(),
                Press {
                    unit: None,
                    pressed_at: self.now,
                    passthrough: ModifierSet::new(),
                    held_fired: false,
                    interrupted: false,
                },
            );
            if Modifier::from_key(&key).is_none() {
                self.effects.push(Effect::Key {
                    code: key,
                    modifiers: held.union(&self.sticky),
                });
            }
            return;
        };

        let unit = &self.units[index];
        log::trace!("{}ms: press {} claimed by {}", self.now, key, unit);
        let passthrough = if unit.trigger.accepts_extra_modifiers() {
            unit.trigger.mandatory().uncovered(&held)
        } else {
            ModifierSet::new()
        };
        let on_press = unit.on_press.clone();
        let window = unit.delayed.as_ref().map(|_| {
            unit.timing
                .delayed_action_ms
                .unwrap_or(ENGINE_DELAYED_ACTION_MS)
        });

        self.down.insert(
            key.clone(),
            Press {
                unit: Some(index),
                pressed_at: self.now,
                passthrough: passthrough.clone(),
                held_fired: false,
                interrupted: false,
            },
        );
        self.run(&on_press, &passthrough);

        if let Some(delay) = window {
            let window = DelayedWindow {
                unit: index,
                deadline: self.now.saturating_add(delay),
            };
            if let Some(previous) = self.windows.insert(key, window) {
                if let Some(delayed) = self.units[previous.unit].delayed.clone() {
                    self.run(&delayed.if_canceled, &ModifierSet::new());
                }
            }
        }
    }

    /// Physical key-up
    pub fn release(&mut self, key: impl Into<KeyCode>) {
        let key = key.into();
        let Some(press) = self.down.shift_remove(&key) else {
            log::trace!("{}ms: release {} without press", self.now, key);
            return;
        };
        let Some(index) = press.unit else {
            return;
        };

        let unit = &self.units[index];
        let elapsed = self.now - press.pressed_at;
        let alone_timeout = unit
            .timing
            .alone_timeout_ms
            .unwrap_or(ENGINE_ALONE_TIMEOUT_MS);

        let mut steps = Vec::new();
        if !unit.if_alone.is_empty()
            && !press.held_fired
            && !press.interrupted
            && elapsed < alone_timeout
        {
            log::trace!("{}ms: {} alone after {}ms", self.now, key, elapsed);
            steps.extend(unit.if_alone.iter().cloned());
        }
        steps.extend(unit.after_key_up.iter().cloned());
        self.run(&steps, &press.passthrough);
    }

    /// Deliver one physical key event
    pub fn handle(&mut self, event: KeyEvent) {
        match event.action {
            Action::Press => self.press(event.key),
            Action::Release => self.release(event.key),
        }
    }

    /// Press, hold for `hold_ms`, release
    pub fn tap(&mut self, key: impl Into<KeyCode>, hold_ms: u64) {
        let key = key.into();
        self.press(key.clone());
        self.advance(hold_ms);
        self.release(key);
    }

    fn next_timer(&self, until: u64) -> Option<(u64, Timer)> {
        let held = self.down.iter().filter_map(|(key, press)| {
            let unit = &self.units[press.unit?];
            if unit.if_held.is_empty() || press.held_fired || press.interrupted {
                return None;
            }
            let threshold = unit
                .timing
                .held_threshold_ms
                .unwrap_or(ENGINE_HELD_THRESHOLD_MS);
            Some((press.pressed_at.saturating_add(threshold), Timer::Held(key.clone())))
        });
        let delayed = self
            .windows
            .iter()
            .map(|(key, window)| (window.deadline, Timer::Delayed(key.clone())));

        held.chain(delayed)
            .filter(|(deadline, _)| *deadline <= until)
            .min()
    }

    /// Let `ms` milliseconds pass, firing due timers in order
    pub fn advance(&mut self, ms: u64) {
        let until = self.now.saturating_add(ms);

        while let Some((deadline, timer)) = self.next_timer(until) {
            self.now = deadline;
            match timer {
                Timer::Held(key) => {
                    let Some(press) = self.down.get_mut(&key) else {
                        continue;
                    };
                    press.held_fired = true;
                    let passthrough = press.passthrough.clone();
                    let Some(index) = press.unit else {
                        continue;
                    };
                    log::trace!("{}ms: {} held", self.now, key);
                    let steps = self.units[index].if_held.clone();
                    self.run(&steps, &passthrough);
                }
                Timer::Delayed(key) => {
                    let Some(window) = self.windows.shift_remove(&key) else {
                        continue;
                    };
                    log::trace!("{}ms: delayed action on {} invoked", self.now, key);
                    if let Some(delayed) = self.units[window.unit].delayed.clone() {
                        self.run(&delayed.if_invoked, &ModifierSet::new());
                    }
                }
            }
        }

        self.now = until;
    }

    fn run(&mut self, steps: &[ActionStep], passthrough: &ModifierSet) {
        for step in steps {
            log::trace!("{}ms:   {}", self.now, step);
            match step {
                ActionStep::Key { code, modifiers } => self.effects.push(Effect::Key {
                    code: code.clone(),
                    modifiers: modifiers.union(passthrough).union(&self.sticky),
                }),
                ActionStep::Shell(command) => self.effects.push(Effect::Shell(command.clone())),
                ActionStep::Open(target) => self.effects.push(Effect::Open(target.clone())),
                ActionStep::OpenApp(bundle_id) => {
                    self.effects.push(Effect::OpenApp(bundle_id.clone()))
                }
                ActionStep::Sticky { modifier, mode } => {
                    let latched = match mode {
                        StickyMode::On => true,
                        StickyMode::Off => false,
                        StickyMode::Toggle => !self.sticky.contains(*modifier),
                    };
                    if latched {
                        self.sticky.insert(*modifier);
                    } else {
                        self.sticky.remove(*modifier);
                    }
                    self.effects.push(Effect::Sticky {
                        modifier: *modifier,
                        mode: *mode,
                    });
                }
                ActionStep::SetVariable { name, value } => self.store.set(name, *value),
                ActionStep::StampVariable(name) => {
                    let now = i64::try_from(self.now).unwrap_or(i64::MAX);
                    self.store.set(name, now);
                }
            }
        }
    }

    /// Replay a parsed script
    pub fn play(&mut self, script: &[ScriptEvent]) {
        for event in script {
            match event {
                ScriptEvent::Key(key_event) => self.handle(key_event.clone()),
                ScriptEvent::Wait(ms) => self.advance(*ms),
                ScriptEvent::App(bundle_id) => self.set_frontmost(bundle_id.clone()),
            }
        }
    }
}

/// Errors from parsing a simulation script
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("invalid script token '{0}' (expected d:KEY, u:KEY, t:MS or app:BUNDLE)")]
    InvalidToken(String),

    #[error("invalid key in '{token}': {message}")]
    InvalidKey { token: String, message: String },

    #[error("invalid duration in '{0}'")]
    InvalidDuration(String),
}

/// One step of a simulation script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEvent {
    Key(KeyEvent),
    Wait(u64),
    App(String),
}

impl ScriptEvent {
    /// Parse one `d:KEY`, `u:KEY`, `t:MS` or `app:BUNDLE` token
    pub fn parse(token: &str) -> Result<Self, ScriptError> {
        let (kind, value) = token
            .split_once(':')
            .ok_or_else(|| ScriptError::InvalidToken(token.to_string()))?;
        let key = || {
            value.parse::<KeyCode>().map_err(|message| ScriptError::InvalidKey {
                token: token.to_string(),
                message,
            })
        };
        match kind {
            "d" => Ok(ScriptEvent::Key(KeyEvent::press(key()?))),
            "u" => Ok(ScriptEvent::Key(KeyEvent::release(key()?))),
            "t" => value
                .parse()
                .map(ScriptEvent::Wait)
                .map_err(|_| ScriptError::InvalidDuration(token.to_string())),
            "app" if !value.is_empty() => Ok(ScriptEvent::App(value.to_string())),
            _ => Err(ScriptError::InvalidToken(token.to_string())),
        }
    }
}

/// Parse a whitespace separated script
pub fn parse_script(script: &str) -> Result<Vec<ScriptEvent>, ScriptError> {
    script.split_whitespace().map(ScriptEvent::parse).collect()
}
