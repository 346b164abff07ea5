// Hyperlayer Rule Units
// The compiled artifact: triggers, guards and branch action lists

use std::fmt;

use smallvec::SmallVec;
use strum_macros::{AsRefStr, Display};

use crate::condition::{Condition, ConditionSet};
use crate::key::KeyIdentity;
use crate::step::{ActionList, ActionStep};

/// Role a unit plays inside its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum UnitRole {
    /// Default tap/hold pair of a key
    TapHold,
    /// Foreground-application specific tap/hold pair
    TapHoldOverride,
    /// First press of a multi-stage key
    TapInitiation,
    /// Second press of a multi-stage key while the first-tap flag is set
    TapContinuation,
    /// The key that arms the modal layer
    ModalKey,
    /// Key selecting a sublayer while the modal layer is armed
    SublayerActivation,
    /// Key mapped inside an active sublayer
    SublayerBinding,
    /// Unconditional escape hatch zeroing every layer variable
    GlobalReset,
}

/// Named branch of a rule unit as seen by the artifact consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Branch {
    Alone,
    Held,
    TapTap,
    TapTapHold,
}

/// Dispatch priority. Units with a higher priority are offered a key-down
/// before units with a lower one; equal priorities keep registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    pub const GLOBAL_RESET: Priority = Priority(400);
    /// Must outrank `DEFAULT` so a second press sees the still-set flag
    pub const CONTINUATION: Priority = Priority(300);
    pub const LAYER: Priority = Priority(200);
    pub const OVERRIDE: Priority = Priority(100);
    pub const DEFAULT: Priority = Priority(0);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::DEFAULT
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timer parameters of one unit, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    /// Release before this elapses counts as "alone"
    pub alone_timeout_ms: Option<u64>,
    /// Still down when this elapses counts as "held"
    pub held_threshold_ms: Option<u64>,
    /// Delay of the delayed action window
    pub delayed_action_ms: Option<u64>,
}

/// Action window that either times out (invoked) or is cancelled by a
/// later key-down; exactly one of the two lists runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelayedAction {
    pub if_invoked: ActionList,
    pub if_canceled: ActionList,
}

/// One dispatchable rule unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleUnit {
    pub name: String,
    pub role: UnitRole,
    pub priority: Priority,
    pub trigger: KeyIdentity,
    /// Conjunctive guard list evaluated at key-down
    pub conditions: ConditionSet,
    /// Runs immediately on key-down
    pub on_press: ActionList,
    /// Runs on key-up if released before the alone timeout
    pub if_alone: ActionList,
    /// Runs once when the held threshold elapses with the key down
    pub if_held: ActionList,
    /// Runs on every key-up of a claimed key-down
    pub after_key_up: ActionList,
    pub delayed: Option<DelayedAction>,
    pub timing: Timing,
}

impl RuleUnit {
    /// Create an empty unit
    pub fn new(name: impl Into<String>, role: UnitRole, trigger: KeyIdentity) -> Self {
        Self {
            name: name.into(),
            role,
            priority: Priority::DEFAULT,
            trigger,
            conditions: ConditionSet::new(),
            on_press: Vec::new(),
            if_alone: Vec::new(),
            if_held: Vec::new(),
            after_key_up: Vec::new(),
            delayed: None,
            timing: Timing::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Check if the unit does nothing but let the key through
    pub fn is_pass_through(&self) -> bool {
        self.if_alone.is_empty()
            && self.if_held.is_empty()
            && self.after_key_up.is_empty()
            && self.delayed.is_none()
            && self.on_press.iter().all(|step| {
                matches!(step, ActionStep::Key { code, .. } if code == self.trigger.code())
            })
    }

    /// Branches this unit carries, named by role
    pub fn branches(&self) -> SmallVec<[(Branch, &ActionList); 4]> {
        let (alone, held) = match self.role {
            UnitRole::TapContinuation => (Branch::TapTap, Branch::TapTapHold),
            _ => (Branch::Alone, Branch::Held),
        };
        let mut branches = SmallVec::new();
        if !self.if_alone.is_empty() {
            branches.push((alone, &self.if_alone));
        }
        if !self.if_held.is_empty() {
            branches.push((held, &self.if_held));
        }
        branches
    }

    /// Every variable any of this unit's lists writes
    pub fn variables_written(&self) -> impl Iterator<Item = &str> {
        self.steps().filter_map(|step| step.variable())
    }

    /// Every step across all branches, delayed window included
    pub fn steps(&self) -> impl Iterator<Item = &ActionStep> {
        let delayed = self
            .delayed
            .iter()
            .flat_map(|d| d.if_invoked.iter().chain(d.if_canceled.iter()));
        self.on_press
            .iter()
            .chain(self.if_alone.iter())
            .chain(self.if_held.iter())
            .chain(self.after_key_up.iter())
            .chain(delayed)
    }

    /// Every variable this unit's guard list reads
    pub fn variables_read(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().filter_map(|c| c.reads())
    }
}

impl fmt::Display for RuleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} @{}] on {}",
            self.name, self.role, self.priority, self.trigger
        )
    }
}
