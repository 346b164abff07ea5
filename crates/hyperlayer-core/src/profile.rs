// Hyperlayer Profile
// Ordered registration of every state machine into one dispatch list

use std::cmp::Reverse;

use indexmap::IndexMap;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::emit::{self, ComplexModification};
use crate::guard::{ConflictGuard, GuardScope};
use crate::key::{KeyCode, KeyIdentity};
use crate::modifier::Modifier;
use crate::multi_tap::MultiTap;
use crate::reset::GlobalReset;
use crate::rule::{RuleUnit, UnitRole};
use crate::step::{ActionStep, StickyMode};
use crate::sublayer::ModalLayer;
use crate::tap_hold::TapHold;

/// Definition-time defects detected while building a profile
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("sublayer activation key '{0}' is registered twice")]
    DuplicateSublayer(KeyCode),

    #[error("sublayer activation key '{0}' is the modal key itself")]
    SublayerIsModalKey(KeyCode),

    #[error("reset key '{key}' is also claimed by '{unit}'")]
    ResetKeyConflict { key: KeyCode, unit: String },

    #[error("variable '{name}' is owned by both '{first}' and '{second}'")]
    DuplicateVariable {
        name: String,
        first: String,
        second: String,
    },

    #[error("key '{key}' is defined by both '{first}' and '{second}'")]
    DuplicateTrigger {
        key: KeyIdentity,
        first: String,
        second: String,
    },
}

/// Kind of value a profile variable holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum VariableKind {
    /// 0/1 state flag
    Flag,
    /// Millisecond clock value
    Timestamp,
}

/// One entry of the variable schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSpec {
    pub name: String,
    /// State machine that owns the variable
    pub owner: String,
    pub kind: VariableKind,
}

/// Collects state machines before they are compiled into a [`Profile`]
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    title: String,
    reset: Option<GlobalReset>,
    modal: Option<ModalLayer>,
    tap_holds: Vec<TapHold>,
    multi_taps: Vec<MultiTap>,
    scope: GuardScope,
}

impl ProfileBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            reset: None,
            modal: None,
            tap_holds: Vec::new(),
            multi_taps: Vec::new(),
            scope: GuardScope::default(),
        }
    }

    pub fn reset(mut self, reset: GlobalReset) -> Self {
        self.reset = Some(reset);
        self
    }

    pub fn modal(mut self, layer: ModalLayer) -> Self {
        self.modal = Some(layer);
        self
    }

    pub fn tap_hold(mut self, tap_hold: TapHold) -> Self {
        self.tap_holds.push(tap_hold);
        self
    }

    pub fn multi_tap(mut self, multi_tap: MultiTap) -> Self {
        self.multi_taps.push(multi_tap);
        self
    }

    pub fn guard_scope(mut self, scope: GuardScope) -> Self {
        self.scope = scope;
        self
    }

    fn validate_layer(&self) -> Result<(), ProfileError> {
        let Some(layer) = &self.modal else {
            return Ok(());
        };

        let mut seen: Vec<&KeyCode> = Vec::new();
        for sublayer in layer.sublayers() {
            let key = sublayer.activation();
            if key == layer.key() {
                return Err(ProfileError::SublayerIsModalKey(key.clone()));
            }
            if seen.contains(&key) {
                return Err(ProfileError::DuplicateSublayer(key.clone()));
            }
            seen.push(key);
        }
        Ok(())
    }

    /// Tap-hold, multi-tap and modal keys must not share a trigger
    fn validate_triggers(&self) -> Result<(), ProfileError> {
        let mut owners: IndexMap<KeyIdentity, String> = IndexMap::new();
        let mut claim = |key: &KeyIdentity, owner: String| match owners.get(key) {
            Some(first) => Err(ProfileError::DuplicateTrigger {
                key: key.clone(),
                first: first.clone(),
                second: owner,
            }),
            None => {
                owners.insert(key.clone(), owner);
                Ok(())
            }
        };

        if let Some(layer) = &self.modal {
            claim(
                &KeyIdentity::new(layer.key().clone()),
                format!("modal {}", layer.key()),
            )?;
        }
        for tap_hold in &self.tap_holds {
            claim(tap_hold.key(), format!("tap-hold {}", tap_hold.key()))?;
        }
        for multi_tap in &self.multi_taps {
            claim(multi_tap.key(), format!("multi-tap {}", multi_tap.key()))?;
        }
        Ok(())
    }

    /// Variables owned by the layer and disambiguators
    fn schema(&self) -> Result<Vec<VariableSpec>, ProfileError> {
        let mut specs: Vec<VariableSpec> = Vec::new();
        let mut add = |name: String, owner: String, kind: VariableKind| {
            if let Some(first) = specs.iter().find(|s| s.name == name) {
                return Err(ProfileError::DuplicateVariable {
                    name,
                    first: first.owner.clone(),
                    second: owner,
                });
            }
            specs.push(VariableSpec { name, owner, kind });
            Ok(())
        };

        if let Some(layer) = &self.modal {
            let owner = format!("modal {}", layer.key());
            for flag in layer.flag_variables() {
                add(flag, owner.clone(), VariableKind::Flag)?;
            }
            if let Some(stamp) = layer.timestamp_variable() {
                add(stamp, owner, VariableKind::Timestamp)?;
            }
        }
        for multi_tap in &self.multi_taps {
            add(
                multi_tap.flag_variable().to_string(),
                format!("multi-tap {}", multi_tap.key()),
                VariableKind::Flag,
            )?;
        }
        Ok(specs)
    }

    /// Validate, generate every unit, apply guards and order by priority
    pub fn build(self) -> Result<Profile, ProfileError> {
        self.validate_layer()?;
        self.validate_triggers()?;
        let mut variables = self.schema()?;

        let guard = ConflictGuard::new(self.modal.as_ref(), self.scope);
        let mut units: Vec<RuleUnit> = Vec::new();

        if let Some(layer) = &self.modal {
            units.extend(layer.units());
        }
        for tap_hold in &self.tap_holds {
            for mut unit in tap_hold.units() {
                guard.apply(&mut unit);
                units.push(unit);
            }
        }
        for multi_tap in &self.multi_taps {
            for mut unit in multi_tap.units() {
                guard.apply(&mut unit);
                units.push(unit);
            }
        }

        // Variables written by bound actions join the schema so the reset
        // covers them too
        for unit in &units {
            for name in unit.variables_written() {
                if !variables.iter().any(|v| v.name == name) {
                    variables.push(VariableSpec {
                        name: name.to_string(),
                        owner: unit.name.clone(),
                        kind: VariableKind::Flag,
                    });
                }
            }
        }

        let sticky = sticky_modifiers(&units);

        if let Some(reset) = &self.reset {
            if let Some(unit) = units.iter().find(|u| u.trigger.code() == reset.key()) {
                return Err(ProfileError::ResetKeyConflict {
                    key: reset.key().clone(),
                    unit: unit.name.clone(),
                });
            }
            let unit = reset.unit(
                variables.iter().map(|v| v.name.as_str()),
                sticky.iter().copied(),
            );
            units.insert(0, unit);
        } else {
            log::warn!("Profile '{}' has no global reset key", self.title);
        }

        // Stable: equal priorities keep registration order
        units.sort_by_key(|unit| Reverse(unit.priority));

        log::debug!(
            "Built profile '{}': {} units, {} variables",
            self.title,
            units.len(),
            variables.len()
        );
        for unit in &units {
            log::trace!("  {}", unit);
        }

        Ok(Profile {
            title: self.title,
            units,
            variables,
            sticky,
            guard,
        })
    }
}

/// Modifiers any unit may latch, in first-use order
fn sticky_modifiers(units: &[RuleUnit]) -> Vec<Modifier> {
    let mut modifiers = Vec::new();
    for step in units.iter().flat_map(|u| u.steps()) {
        if let ActionStep::Sticky { modifier, mode } = step {
            if *mode != StickyMode::Off && !modifiers.contains(modifier) {
                modifiers.push(*modifier);
            }
        }
    }
    modifiers
}

/// A compiled profile: every rule unit in dispatch order
#[derive(Debug, Clone)]
pub struct Profile {
    title: String,
    units: Vec<RuleUnit>,
    variables: Vec<VariableSpec>,
    sticky: Vec<Modifier>,
    guard: ConflictGuard,
}

impl Profile {
    pub fn builder(title: impl Into<String>) -> ProfileBuilder {
        ProfileBuilder::new(title)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Units in dispatch order, highest priority first
    pub fn units(&self) -> &[RuleUnit] {
        &self.units
    }

    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    pub fn sticky_modifiers(&self) -> &[Modifier] {
        &self.sticky
    }

    pub fn guard(&self) -> &ConflictGuard {
        &self.guard
    }

    /// Units triggered by `key`, in dispatch order
    pub fn units_for<'a>(&'a self, key: &'a KeyCode) -> impl Iterator<Item = &'a RuleUnit> {
        self.units.iter().filter(move |u| u.trigger.code() == key)
    }

    /// Units playing `role`, in dispatch order
    pub fn units_with_role(&self, role: UnitRole) -> impl Iterator<Item = &RuleUnit> {
        self.units.iter().filter(move |u| u.role == role)
    }

    /// Compiled artifact for the remapping engine
    pub fn to_artifact(&self) -> ComplexModification {
        emit::complex_modification(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_artifact())
    }
}
