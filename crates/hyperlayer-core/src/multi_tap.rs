// Hyperlayer Multi-Stage Disambiguator
// Tap, double-tap, hold and double-tap-hold on a single key

use crate::condition::Condition;
use crate::key::{KeyCode, KeyIdentity};
use crate::rule::{DelayedAction, Priority, RuleUnit, Timing, UnitRole};
use crate::step::{ActionList, ActionStep};
use crate::tap_hold::DEFAULT_THRESHOLD_MS;

/// Default window in which a second press counts as a double tap
pub const DEFAULT_DOUBLE_TAP_WINDOW_MS: u64 = 250;

/// Multi-stage definition for one key
///
/// Two units are generated. The initiation unit sets a first-tap flag and
/// opens a delayed window that clears it; the continuation unit only matches
/// while the flag is set and must be offered the key first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiTap {
    key: KeyIdentity,
    variable: String,
    window_ms: u64,
    threshold_ms: u64,
    passthrough: bool,
    hold: ActionList,
    tap_tap: ActionList,
    tap_tap_hold: ActionList,
}

impl MultiTap {
    pub fn new(key: impl Into<KeyIdentity>) -> Self {
        let key = key.into();
        let variable = Self::default_variable(key.code());
        Self {
            key,
            variable,
            window_ms: DEFAULT_DOUBLE_TAP_WINDOW_MS,
            threshold_ms: DEFAULT_THRESHOLD_MS,
            passthrough: true,
            hold: Vec::new(),
            tap_tap: Vec::new(),
            tap_tap_hold: Vec::new(),
        }
    }

    /// First-tap flag name used when none is configured
    pub fn default_variable(key: &KeyCode) -> String {
        format!("{}_first_tap", key)
    }

    pub fn variable(mut self, name: impl Into<String>) -> Self {
        self.variable = name.into();
        self
    }

    pub fn window_ms(mut self, ms: u64) -> Self {
        self.window_ms = ms;
        self
    }

    pub fn threshold_ms(mut self, ms: u64) -> Self {
        self.threshold_ms = ms;
        self
    }

    /// Whether the first press re-emits the key immediately
    pub fn passthrough(mut self, enabled: bool) -> Self {
        self.passthrough = enabled;
        self
    }

    pub fn hold(mut self, steps: ActionList) -> Self {
        self.hold = steps;
        self
    }

    pub fn tap_tap(mut self, steps: ActionList) -> Self {
        self.tap_tap = steps;
        self
    }

    pub fn tap_tap_hold(mut self, steps: ActionList) -> Self {
        self.tap_tap_hold = steps;
        self
    }

    pub fn key(&self) -> &KeyIdentity {
        &self.key
    }

    pub fn flag_variable(&self) -> &str {
        &self.variable
    }

    /// Generate the continuation unit followed by the initiation unit
    pub fn units(&self) -> Vec<RuleUnit> {
        let threshold = Timing {
            alone_timeout_ms: Some(self.threshold_ms),
            held_threshold_ms: Some(self.threshold_ms),
            delayed_action_ms: None,
        };

        let mut continuation = RuleUnit::new(
            format!("double tap {}", self.key),
            UnitRole::TapContinuation,
            self.key.clone(),
        )
        .with_priority(Priority::CONTINUATION)
        .with_condition(Condition::variable(&self.variable, 1));
        continuation.on_press = vec![ActionStep::clear(&self.variable)];
        continuation.if_alone = self.tap_tap.clone();
        continuation.if_held = self.tap_tap_hold.clone();
        continuation.timing = threshold;

        let mut initiation = RuleUnit::new(
            format!("first tap {}", self.key),
            UnitRole::TapInitiation,
            self.key.clone(),
        );
        initiation.on_press.push(ActionStep::set(&self.variable, 1));
        if self.passthrough {
            initiation
                .on_press
                .push(ActionStep::key(self.key.code().clone()));
        }
        initiation.if_held = self.hold.clone();
        initiation.delayed = Some(DelayedAction {
            if_invoked: vec![ActionStep::clear(&self.variable)],
            if_canceled: vec![ActionStep::clear(&self.variable)],
        });
        initiation.timing = Timing {
            delayed_action_ms: Some(self.window_ms),
            ..threshold
        };

        if self.tap_tap.is_empty() && self.tap_tap_hold.is_empty() {
            log::warn!("Multi-tap on {} has no double-tap actions", self.key);
        }
        log::debug!(
            "Multi-tap on {} uses flag '{}' with a {}ms window",
            self.key,
            self.variable,
            self.window_ms
        );

        vec![continuation, initiation]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::Modifier;

    fn command() -> MultiTap {
        MultiTap::new("left_command")
            .hold(vec![ActionStep::key("left_command")])
            .tap_tap(vec![ActionStep::key_with("tab", [Modifier::LeftCommand])])
            .tap_tap_hold(vec![ActionStep::open_app("com.apple.Terminal")])
    }

    #[test]
    fn test_default_variable() {
        assert_eq!(command().flag_variable(), "left_command_first_tap");
        assert_eq!(command().variable("cmd").flag_variable(), "cmd");
    }

    #[test]
    fn test_continuation_outranks_initiation() {
        let units = command().units();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].role, UnitRole::TapContinuation);
        assert_eq!(units[1].role, UnitRole::TapInitiation);
        assert!(units[0].priority > units[1].priority);
    }

    #[test]
    fn test_continuation_unit() {
        let units = command().units();
        let continuation = &units[0];

        assert!(continuation
            .conditions
            .contains(&Condition::variable("left_command_first_tap", 1)));
        assert_eq!(
            continuation.on_press,
            vec![ActionStep::clear("left_command_first_tap")]
        );
        assert_eq!(
            continuation.if_alone,
            vec![ActionStep::key_with("tab", [Modifier::LeftCommand])]
        );
        assert_eq!(
            continuation.if_held,
            vec![ActionStep::open_app("com.apple.Terminal")]
        );
    }

    #[test]
    fn test_initiation_unit() {
        let units = command().window_ms(180).units();
        let initiation = &units[1];

        assert!(initiation.conditions.is_empty());
        assert_eq!(
            initiation.on_press,
            vec![
                ActionStep::set("left_command_first_tap", 1),
                ActionStep::key("left_command"),
            ]
        );
        assert_eq!(initiation.if_held, vec![ActionStep::key("left_command")]);
        assert_eq!(initiation.timing.delayed_action_ms, Some(180));

        let delayed = initiation.delayed.as_ref().unwrap();
        assert_eq!(delayed.if_invoked, vec![ActionStep::clear("left_command_first_tap")]);
        assert_eq!(delayed.if_canceled, vec![ActionStep::clear("left_command_first_tap")]);
    }

    #[test]
    fn test_without_passthrough() {
        let units = command().passthrough(false).units();
        assert_eq!(
            units[1].on_press,
            vec![ActionStep::set("left_command_first_tap", 1)]
        );
    }
}
