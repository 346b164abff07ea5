// Hyperlayer Sublayer Activation Network
//
// A modal layer armed by holding one key. While armed, a fixed alphabet of
// activation keys selects named sublayers; each sublayer maps its own keys
// to terminal action lists.
//
// Variable schema (all 0/1 unless noted):
//   <modal>                      modal layer armed
//   <modal>_sublayer_<key>       sublayer selected by <key> active
//   <modal>_armed_at             millisecond clock at arming (optional, timestamp)
//
// State machine:
//   Idle --hold modal key past threshold--> Armed
//   Armed --activation key--> Active(L)     (armed 0 and L 1 in one action list)
//   Active(L) --mapped key, auto release--> Idle
//   Active(L) --mapped key, sticky--> Active(L)
//   any --modal key up / global reset--> Idle

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::condition::Condition;
use crate::key::{KeyCode, KeyIdentity};
use crate::rule::{Priority, RuleUnit, Timing, UnitRole};
use crate::step::{ActionList, ActionStep};

/// Default threshold for arming the modal layer
pub const DEFAULT_MODAL_THRESHOLD_MS: u64 = 200;

/// What happens to a sublayer after one of its bindings fires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum Persistence {
    /// Return to idle after a single action
    #[default]
    #[serde(rename = "auto", alias = "auto_release")]
    AutoRelease,
    /// Stay active until the modal key is released or a reset fires
    #[serde(rename = "sticky")]
    Sticky,
}

/// One key mapped inside a sublayer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub key: KeyIdentity,
    pub steps: ActionList,
}

/// A named sublayer owned by a modal layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SublayerDescriptor {
    activation: KeyCode,
    name: String,
    persistence: Persistence,
    bindings: IndexMap<KeyCode, Binding>,
}

impl SublayerDescriptor {
    pub fn new(activation: impl Into<KeyCode>, name: impl Into<String>) -> Self {
        Self {
            activation: activation.into(),
            name: name.into(),
            persistence: Persistence::AutoRelease,
            bindings: IndexMap::new(),
        }
    }

    pub fn persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn sticky(self) -> Self {
        self.persistence(Persistence::Sticky)
    }

    /// Map a key (any extra modifiers allowed) to an action list
    pub fn bind(self, key: impl Into<KeyCode>, steps: ActionList) -> Self {
        self.bind_identity(KeyIdentity::new(key), steps)
    }

    /// Map a full key identity to an action list; a later binding for the
    /// same key code replaces the earlier one
    pub fn bind_identity(mut self, key: KeyIdentity, steps: ActionList) -> Self {
        self.bindings
            .insert(key.code().clone(), Binding { key, steps });
        self
    }

    pub fn activation(&self) -> &KeyCode {
        &self.activation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> Persistence {
        self.persistence
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }
}

/// The parent layer and every sublayer it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalLayer {
    key: KeyCode,
    variable: String,
    threshold_ms: u64,
    alone: Option<ActionList>,
    record_activation: bool,
    sublayers: Vec<SublayerDescriptor>,
}

impl ModalLayer {
    pub fn new(key: impl Into<KeyCode>) -> Self {
        Self {
            key: key.into(),
            variable: "hyper".to_string(),
            threshold_ms: DEFAULT_MODAL_THRESHOLD_MS,
            alone: None,
            record_activation: false,
            sublayers: Vec::new(),
        }
    }

    /// Name of the "armed" variable; also prefixes every sublayer variable
    pub fn variable(mut self, name: impl Into<String>) -> Self {
        self.variable = name.into();
        self
    }

    pub fn threshold_ms(mut self, ms: u64) -> Self {
        self.threshold_ms = ms;
        self
    }

    /// Replace the tap action (defaults to re-emitting the modal key)
    pub fn alone(mut self, steps: ActionList) -> Self {
        self.alone = Some(steps);
        self
    }

    /// Stamp `<variable>_armed_at` with the clock when the layer arms
    pub fn record_activation_time(mut self, enabled: bool) -> Self {
        self.record_activation = enabled;
        self
    }

    pub fn sublayer(mut self, descriptor: SublayerDescriptor) -> Self {
        self.sublayers.push(descriptor);
        self
    }

    pub fn key(&self) -> &KeyCode {
        &self.key
    }

    pub fn armed_variable(&self) -> &str {
        &self.variable
    }

    pub fn threshold(&self) -> u64 {
        self.threshold_ms
    }

    pub fn sublayers(&self) -> &[SublayerDescriptor] {
        &self.sublayers
    }

    /// Active flag of a sublayer
    pub fn sublayer_variable(&self, descriptor: &SublayerDescriptor) -> String {
        format!("{}_sublayer_{}", self.variable, descriptor.activation)
    }

    /// Timestamp variable, if activation time is recorded
    pub fn timestamp_variable(&self) -> Option<String> {
        self.record_activation
            .then(|| format!("{}_armed_at", self.variable))
    }

    /// Every 0/1 flag this layer owns: armed first, then one per sublayer
    pub fn flag_variables(&self) -> Vec<String> {
        std::iter::once(self.variable.clone())
            .chain(self.sublayers.iter().map(|s| self.sublayer_variable(s)))
            .collect()
    }

    /// Action list zeroing every flag of this layer
    fn release_steps(&self) -> ActionList {
        self.flag_variables()
            .into_iter()
            .map(ActionStep::clear)
            .collect()
    }

    /// Generate the modal key unit, one activation unit per sublayer and one
    /// binding unit per mapped key
    pub fn units(&self) -> Vec<RuleUnit> {
        let mut units = Vec::new();

        let mut modal = RuleUnit::new(
            format!("modal {}", self.key),
            UnitRole::ModalKey,
            KeyIdentity::new(self.key.clone()),
        )
        .with_priority(Priority::LAYER);
        modal.if_alone = self
            .alone
            .clone()
            .unwrap_or_else(|| vec![ActionStep::key(self.key.clone())]);
        modal.if_held.push(ActionStep::set(&self.variable, 1));
        if let Some(stamp) = self.timestamp_variable() {
            modal.if_held.push(ActionStep::stamp(stamp));
        }
        modal.after_key_up = self.release_steps();
        modal.timing = Timing {
            alone_timeout_ms: Some(self.threshold_ms),
            held_threshold_ms: Some(self.threshold_ms),
            delayed_action_ms: None,
        };
        units.push(modal);

        if self.sublayers.is_empty() {
            log::warn!("Modal layer '{}' has no sublayers", self.variable);
        }

        for sublayer in &self.sublayers {
            let flag = self.sublayer_variable(sublayer);

            let mut activation = RuleUnit::new(
                format!("sublayer {} ({})", sublayer.activation, sublayer.name),
                UnitRole::SublayerActivation,
                KeyIdentity::new(sublayer.activation.clone()),
            )
            .with_priority(Priority::LAYER)
            .with_condition(Condition::variable(&self.variable, 1));
            activation.on_press = vec![
                ActionStep::clear(&self.variable),
                ActionStep::set(&flag, 1),
            ];
            units.push(activation);

            for binding in sublayer.bindings() {
                let mut unit = RuleUnit::new(
                    format!("{} {}", sublayer.name, binding.key),
                    UnitRole::SublayerBinding,
                    binding.key.clone(),
                )
                .with_priority(Priority::LAYER)
                .with_condition(Condition::variable(&flag, 1));
                unit.on_press = binding.steps.clone();
                if sublayer.persistence == Persistence::AutoRelease {
                    unit.on_press.push(ActionStep::clear(&flag));
                }
                units.push(unit);
            }

            log::debug!(
                "Sublayer '{}' on {} generated with {} bindings ({})",
                sublayer.name,
                sublayer.activation,
                sublayer.bindings.len(),
                sublayer.persistence
            );
        }

        units
    }
}
