// Hyperlayer Conflict Guard
//
// Keeps disambiguator units and the sublayer network from claiming the same
// key at the same time. Guards are derived from the live sublayer set at
// build time, never written by hand.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::condition::{Condition, ConditionSet};
use crate::key::KeyCode;
use crate::rule::RuleUnit;
use crate::sublayer::ModalLayer;

/// Which disambiguator units receive the derived guard
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GuardScope {
    /// Guard every tap-hold and multi-tap unit
    #[default]
    All,
    /// Guard only units whose key belongs to the layer alphabet
    Overlapping,
}

/// Guard conditions for a modal layer: armed == 0 and every sublayer flag == 0
pub fn derive_guards(layer: &ModalLayer) -> ConditionSet {
    layer
        .flag_variables()
        .into_iter()
        .map(|name| Condition::variable(name, 0))
        .collect()
}

/// Every key the layer network can claim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerAlphabet {
    keys: IndexSet<KeyCode>,
}

impl LayerAlphabet {
    pub fn of(layer: &ModalLayer) -> Self {
        let mut keys = IndexSet::new();
        keys.insert(layer.key().clone());
        for sublayer in layer.sublayers() {
            keys.insert(sublayer.activation().clone());
            for binding in sublayer.bindings() {
                keys.insert(binding.key.code().clone());
            }
        }
        Self { keys }
    }

    pub fn contains(&self, key: &KeyCode) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Derived guard plus the scope it is applied with
#[derive(Debug, Clone, Default)]
pub struct ConflictGuard {
    guards: ConditionSet,
    alphabet: LayerAlphabet,
    scope: GuardScope,
}

impl ConflictGuard {
    /// Guard for a profile; without a modal layer nothing is guarded
    pub fn new(layer: Option<&ModalLayer>, scope: GuardScope) -> Self {
        match layer {
            Some(layer) => {
                let guards = derive_guards(layer);
                let alphabet = LayerAlphabet::of(layer);
                log::debug!(
                    "Derived {} guard conditions over a {}-key layer alphabet ({} scope)",
                    guards.len(),
                    alphabet.len(),
                    scope
                );
                Self {
                    guards,
                    alphabet,
                    scope,
                }
            }
            None => Self {
                scope,
                ..Self::default()
            },
        }
    }

    pub fn guards(&self) -> &ConditionSet {
        &self.guards
    }

    pub fn scope(&self) -> GuardScope {
        self.scope
    }

    /// Check if a unit on `key` must carry the guard
    pub fn applies_to(&self, key: &KeyCode) -> bool {
        if self.guards.is_empty() {
            return false;
        }
        match self.scope {
            GuardScope::All => true,
            GuardScope::Overlapping => self.alphabet.contains(key),
        }
    }

    /// Append the guard to a unit when its key is in scope
    pub fn apply(&self, unit: &mut RuleUnit) {
        if self.applies_to(unit.trigger.code()) {
            unit.conditions.extend(&self.guards);
        }
    }

    /// Check if a unit carries the full guard
    pub fn is_guarded(&self, unit: &RuleUnit) -> bool {
        unit.conditions.includes(&self.guards)
    }
}
