// Hyperlayer Global Reset
// Unconditional escape hatch back to the idle state

use crate::key::{KeyCode, KeyIdentity};
use crate::modifier::Modifier;
use crate::rule::{Priority, RuleUnit, UnitRole};
use crate::step::{ActionStep, StickyMode};

/// Key that zeroes every layer and disambiguator variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalReset {
    key: KeyCode,
    passthrough: bool,
}

impl GlobalReset {
    pub fn new(key: impl Into<KeyCode>) -> Self {
        Self {
            key: key.into(),
            passthrough: true,
        }
    }

    /// Whether the reset key is still delivered after the reset
    pub fn passthrough(mut self, enabled: bool) -> Self {
        self.passthrough = enabled;
        self
    }

    pub fn key(&self) -> &KeyCode {
        &self.key
    }

    /// Build the reset unit. It carries no conditions and outranks every
    /// other unit, so it fires from any state.
    pub fn unit<'a>(
        &self,
        variables: impl IntoIterator<Item = &'a str>,
        sticky: impl IntoIterator<Item = Modifier>,
    ) -> RuleUnit {
        let mut unit = RuleUnit::new(
            format!("reset {}", self.key),
            UnitRole::GlobalReset,
            KeyIdentity::new(self.key.clone()),
        )
        .with_priority(Priority::GLOBAL_RESET);

        unit.on_press = variables.into_iter().map(ActionStep::clear).collect();
        unit.on_press.extend(
            sticky
                .into_iter()
                .map(|modifier| ActionStep::sticky(modifier, StickyMode::Off)),
        );
        if self.passthrough {
            unit.on_press.push(ActionStep::key(self.key.clone()));
        }

        log::debug!(
            "Global reset on {} clears {} steps",
            self.key,
            unit.on_press.len()
        );
        unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_unit() {
        let unit = GlobalReset::new("escape").unit(["hyper", "hyper_sublayer_d"], []);

        assert_eq!(unit.role, UnitRole::GlobalReset);
        assert_eq!(unit.priority, Priority::GLOBAL_RESET);
        assert!(unit.conditions.is_empty());
        assert_eq!(
            unit.on_press,
            vec![
                ActionStep::clear("hyper"),
                ActionStep::clear("hyper_sublayer_d"),
                ActionStep::key("escape"),
            ]
        );
    }

    #[test]
    fn test_reset_releases_sticky_modifiers() {
        let unit = GlobalReset::new("escape")
            .passthrough(false)
            .unit(["hyper"], [Modifier::LeftShift]);
        assert_eq!(
            unit.on_press,
            vec![
                ActionStep::clear("hyper"),
                ActionStep::sticky(Modifier::LeftShift, StickyMode::Off),
            ]
        );
    }
}
