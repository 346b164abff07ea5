// Hyperlayer Tap-Hold Disambiguator
// Decides between an "alone" and a "held" action list for one key

use crate::condition::{AppMatcher, Condition};
use crate::key::KeyIdentity;
use crate::rule::{Priority, RuleUnit, Timing, UnitRole};
use crate::step::{ActionList, ActionStep};

/// Default tap/hold threshold
pub const DEFAULT_THRESHOLD_MS: u64 = 300;

/// Alone/held pair used while a matching application is in the foreground
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOverride {
    pub matcher: AppMatcher,
    pub alone: ActionList,
    pub held: ActionList,
}

/// Tap vs. hold definition for one key
///
/// Overrides are offered the key before the default pair, in the order they
/// were added; the first whose matcher holds wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapHold {
    key: KeyIdentity,
    alone: ActionList,
    held: ActionList,
    alone_timeout_ms: u64,
    held_threshold_ms: u64,
    overrides: Vec<AppOverride>,
}

impl TapHold {
    /// Create a tap-hold whose tap re-emits the key itself
    pub fn new(key: impl Into<KeyIdentity>) -> Self {
        let key = key.into();
        let alone = vec![ActionStep::key(key.code().clone())];
        Self {
            key,
            alone,
            held: Vec::new(),
            alone_timeout_ms: DEFAULT_THRESHOLD_MS,
            held_threshold_ms: DEFAULT_THRESHOLD_MS,
            overrides: Vec::new(),
        }
    }

    pub fn alone(mut self, steps: ActionList) -> Self {
        self.alone = steps;
        self
    }

    pub fn held(mut self, steps: ActionList) -> Self {
        self.held = steps;
        self
    }

    pub fn alone_timeout_ms(mut self, ms: u64) -> Self {
        self.alone_timeout_ms = ms;
        self
    }

    pub fn held_threshold_ms(mut self, ms: u64) -> Self {
        self.held_threshold_ms = ms;
        self
    }

    /// Set both timers to the same value
    pub fn threshold_ms(self, ms: u64) -> Self {
        self.alone_timeout_ms(ms).held_threshold_ms(ms)
    }

    pub fn on_app(mut self, matcher: AppMatcher, alone: ActionList, held: ActionList) -> Self {
        self.overrides.push(AppOverride {
            matcher,
            alone,
            held,
        });
        self
    }

    pub fn key(&self) -> &KeyIdentity {
        &self.key
    }

    pub fn overrides(&self) -> &[AppOverride] {
        &self.overrides
    }

    /// Alone timeout actually emitted: never shorter than the held
    /// threshold, so a release before the held branch fires still taps
    fn effective_alone_timeout(&self) -> u64 {
        if self.alone_timeout_ms < self.held_threshold_ms {
            log::debug!(
                "Tap-hold on {}: alone timeout {}ms raised to held threshold {}ms",
                self.key,
                self.alone_timeout_ms,
                self.held_threshold_ms
            );
        }
        self.alone_timeout_ms.max(self.held_threshold_ms)
    }

    fn unit(&self, name: String, role: UnitRole, alone: &ActionList, held: &ActionList) -> RuleUnit {
        let mut unit = RuleUnit::new(name, role, self.key.clone());

        if alone.is_empty() && held.is_empty() {
            log::warn!("Tap-hold on {} has no actions; emitting pass-through", self.key);
            unit.on_press = vec![ActionStep::key(self.key.code().clone())];
            return unit;
        }

        unit.if_alone = alone.clone();
        unit.if_held = held.clone();
        unit.timing = Timing {
            alone_timeout_ms: Some(self.effective_alone_timeout()),
            held_threshold_ms: Some(self.held_threshold_ms),
            delayed_action_ms: None,
        };
        unit
    }

    /// Generate one unit per override followed by the default unit
    pub fn units(&self) -> Vec<RuleUnit> {
        let mut units: Vec<RuleUnit> = self
            .overrides
            .iter()
            .map(|o| {
                self.unit(
                    format!("tap-hold {} ({})", self.key, o.matcher),
                    UnitRole::TapHoldOverride,
                    &o.alone,
                    &o.held,
                )
                .with_priority(Priority::OVERRIDE)
                .with_condition(Condition::Frontmost(o.matcher.clone()))
            })
            .collect();

        units.push(self.unit(
            format!("tap-hold {}", self.key),
            UnitRole::TapHold,
            &self.alone,
            &self.held,
        ));

        log::debug!(
            "Tap-hold on {} generated with {} app overrides",
            self.key,
            self.overrides.len()
        );
        units
    }
}
