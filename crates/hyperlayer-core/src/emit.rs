// Hyperlayer Artifact Emission
// Wire types of the complex-modification JSON the remapping engine loads

use indexmap::IndexMap;
use serde::Serialize;

use crate::condition::{Condition, ConditionSet};
use crate::key::KeyIdentity;
use crate::modifier::ModifierSet;
use crate::profile::Profile;
use crate::rule::RuleUnit;
use crate::step::{ActionList, ActionStep};

pub const ALONE_TIMEOUT_PARAM: &str = "basic.to_if_alone_timeout_milliseconds";
pub const HELD_THRESHOLD_PARAM: &str = "basic.to_if_held_down_threshold_milliseconds";
pub const DELAYED_ACTION_PARAM: &str = "basic.to_delayed_action_delay_milliseconds";

/// Expression the engine evaluates to its millisecond clock
pub const NOW_EXPRESSION: &str = "system.now.milliseconds";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexModification {
    pub title: String,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub description: String,
    pub manipulators: Vec<Manipulator>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manipulator {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub from: FromEvent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<WireCondition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<ToEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to_if_alone: Vec<ToEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to_if_held_down: Vec<ToEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to_after_key_up: Vec<ToEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_delayed_action: Option<DelayedActionEvents>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FromEvent {
    pub key_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<FromModifiers>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FromModifiers {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mandatory: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayedActionEvents {
    pub to_if_invoked: Vec<ToEvent>,
    pub to_if_canceled: Vec<ToEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToEvent {
    Key {
        key_code: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        modifiers: Vec<String>,
    },
    Shell {
        shell_command: String,
    },
    SetVariable {
        set_variable: SetVariable,
    },
    SoftwareFunction {
        software_function: SoftwareFunction,
    },
    StickyModifier {
        sticky_modifier: IndexMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetVariable {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoftwareFunction {
    pub open_application: OpenApplication,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenApplication {
    pub bundle_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireCondition {
    VariableIf { name: String, value: i64 },
    FrontmostApplicationIf { bundle_identifiers: Vec<String> },
    FrontmostApplicationUnless { bundle_identifiers: Vec<String> },
}

fn modifier_names(modifiers: &ModifierSet) -> Vec<String> {
    modifiers.iter().map(|m| m.as_ref().to_string()).collect()
}

fn from_event(key: &KeyIdentity) -> FromEvent {
    let mandatory = modifier_names(key.mandatory());
    let optional = if key.accepts_extra_modifiers() {
        vec!["any".to_string()]
    } else {
        Vec::new()
    };
    let modifiers = (!mandatory.is_empty() || !optional.is_empty())
        .then_some(FromModifiers { mandatory, optional });
    FromEvent {
        key_code: key.code().to_string(),
        modifiers,
    }
}

fn to_event(step: &ActionStep) -> ToEvent {
    match step {
        ActionStep::Key { code, modifiers } => ToEvent::Key {
            key_code: code.to_string(),
            modifiers: modifier_names(modifiers),
        },
        ActionStep::Shell(command) => ToEvent::Shell {
            shell_command: command.clone(),
        },
        ActionStep::Open(target) => ToEvent::Shell {
            shell_command: ActionStep::open_command(target),
        },
        ActionStep::OpenApp(bundle_id) => ToEvent::SoftwareFunction {
            software_function: SoftwareFunction {
                open_application: OpenApplication {
                    bundle_identifier: bundle_id.clone(),
                },
            },
        },
        ActionStep::Sticky { modifier, mode } => {
            let mut sticky_modifier = IndexMap::new();
            sticky_modifier.insert(modifier.as_ref().to_string(), mode.as_ref().to_string());
            ToEvent::StickyModifier { sticky_modifier }
        }
        ActionStep::SetVariable { name, value } => ToEvent::SetVariable {
            set_variable: SetVariable {
                name: name.clone(),
                value: Some(*value),
                expression: None,
            },
        },
        ActionStep::StampVariable(name) => ToEvent::SetVariable {
            set_variable: SetVariable {
                name: name.clone(),
                value: None,
                expression: Some(NOW_EXPRESSION.to_string()),
            },
        },
    }
}

fn to_events(steps: &ActionList) -> Vec<ToEvent> {
    steps.iter().map(to_event).collect()
}

fn wire_condition(condition: &Condition) -> WireCondition {
    match condition {
        Condition::Variable { name, value } => WireCondition::VariableIf {
            name: name.clone(),
            value: *value,
        },
        Condition::Frontmost(matcher) => {
            let (leaf, negated) = matcher.normalized();
            let bundle_identifiers = vec![leaf.regex_source()];
            if negated {
                WireCondition::FrontmostApplicationUnless { bundle_identifiers }
            } else {
                WireCondition::FrontmostApplicationIf { bundle_identifiers }
            }
        }
    }
}

fn wire_conditions(conditions: &ConditionSet) -> Vec<WireCondition> {
    conditions.iter().map(wire_condition).collect()
}

/// Translate one rule unit into an engine manipulator
pub fn manipulator(unit: &RuleUnit) -> Manipulator {
    let mut parameters = IndexMap::new();
    if let Some(ms) = unit.timing.alone_timeout_ms {
        parameters.insert(ALONE_TIMEOUT_PARAM.to_string(), ms);
    }
    if let Some(ms) = unit.timing.held_threshold_ms {
        parameters.insert(HELD_THRESHOLD_PARAM.to_string(), ms);
    }
    if let Some(ms) = unit.timing.delayed_action_ms {
        parameters.insert(DELAYED_ACTION_PARAM.to_string(), ms);
    }

    Manipulator {
        kind: "basic".to_string(),
        description: unit.name.clone(),
        from: from_event(&unit.trigger),
        conditions: wire_conditions(&unit.conditions),
        to: to_events(&unit.on_press),
        to_if_alone: to_events(&unit.if_alone),
        to_if_held_down: to_events(&unit.if_held),
        to_after_key_up: to_events(&unit.after_key_up),
        to_delayed_action: unit.delayed.as_ref().map(|d| DelayedActionEvents {
            to_if_invoked: to_events(&d.if_invoked),
            to_if_canceled: to_events(&d.if_canceled),
        }),
        parameters,
    }
}

/// One rule holding every unit of the profile in dispatch order
pub fn complex_modification(profile: &Profile) -> ComplexModification {
    let manipulators = profile.units().iter().map(manipulator).collect();
    ComplexModification {
        title: profile.title().to_string(),
        rules: vec![Rule {
            description: profile.title().to_string(),
            manipulators,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::AppMatcher;
    use crate::key::KeyCode;
    use crate::modifier::Modifier;
    use crate::rule::{DelayedAction, Timing, UnitRole};
    use crate::step::StickyMode;
    use serde_json::json;

    fn unit() -> RuleUnit {
        let mut unit = RuleUnit::new("tap-hold d", UnitRole::TapHold, KeyIdentity::new("d"))
            .with_condition(Condition::variable("hyper", 0))
            .with_condition(Condition::Frontmost(
                AppMatcher::bundle_id("com.apple.Terminal").negate(),
            ));
        unit.if_alone = vec![ActionStep::key("d")];
        unit.if_held = vec![ActionStep::open("~/Downloads")];
        unit.timing = Timing {
            alone_timeout_ms: Some(300),
            held_threshold_ms: Some(400),
            delayed_action_ms: None,
        };
        unit
    }

    #[test]
    fn test_manipulator_json() {
        let value = serde_json::to_value(manipulator(&unit())).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "basic",
                "description": "tap-hold d",
                "from": { "key_code": "d", "modifiers": { "optional": ["any"] } },
                "conditions": [
                    { "type": "variable_if", "name": "hyper", "value": 0 },
                    {
                        "type": "frontmost_application_unless",
                        "bundle_identifiers": ["^com\\.apple\\.Terminal$"]
                    }
                ],
                "to_if_alone": [{ "key_code": "d" }],
                "to_if_held_down": [{ "shell_command": "open '~/Downloads'" }],
                "parameters": {
                    "basic.to_if_alone_timeout_milliseconds": 300,
                    "basic.to_if_held_down_threshold_milliseconds": 400
                }
            })
        );
    }

    #[test]
    fn test_to_events() {
        let steps = vec![
            ActionStep::key_with("tab", [Modifier::LeftCommand]),
            ActionStep::open_app("com.apple.Safari"),
            ActionStep::sticky(Modifier::LeftShift, StickyMode::Toggle),
            ActionStep::stamp("hyper_armed_at"),
        ];
        let value = serde_json::to_value(to_events(&steps)).unwrap();
        assert_eq!(
            value,
            json!([
                { "key_code": "tab", "modifiers": ["left_command"] },
                { "software_function": { "open_application": { "bundle_identifier": "com.apple.Safari" } } },
                { "sticky_modifier": { "left_shift": "toggle" } },
                { "set_variable": { "name": "hyper_armed_at", "expression": "system.now.milliseconds" } }
            ])
        );
    }

    #[test]
    fn test_delayed_action() {
        let mut unit = RuleUnit::new(
            "first tap left_command",
            UnitRole::TapInitiation,
            KeyIdentity::new(KeyCode::from("left_command")).exact(),
        );
        unit.on_press = vec![ActionStep::set("left_command_first_tap", 1)];
        unit.delayed = Some(DelayedAction {
            if_invoked: vec![ActionStep::clear("left_command_first_tap")],
            if_canceled: vec![ActionStep::clear("left_command_first_tap")],
        });
        unit.timing.delayed_action_ms = Some(250);

        let value = serde_json::to_value(manipulator(&unit)).unwrap();
        assert_eq!(value["from"], json!({ "key_code": "left_command" }));
        assert_eq!(
            value["to_delayed_action"]["to_if_canceled"],
            json!([{ "set_variable": { "name": "left_command_first_tap", "value": 0 } }])
        );
        assert_eq!(
            value["parameters"]["basic.to_delayed_action_delay_milliseconds"],
            json!(250)
        );
    }
}
