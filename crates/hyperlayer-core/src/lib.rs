// Hyperlayer Core Library
// Tap/hold disambiguation and modal sublayers compiled into engine rules

pub mod action;
pub mod condition;
pub mod config;
pub mod emit;
pub mod guard;
pub mod key;
pub mod modifier;
pub mod multi_tap;
pub mod profile;
pub mod reset;
pub mod rule;
pub mod sim;
pub mod state;
pub mod step;
pub mod sublayer;
pub mod tap_hold;

pub use action::{Action, KeyEvent};
pub use condition::{AppMatcher, Condition, ConditionParseError, ConditionSet, EvalContext, Predicate};
pub use config::{default_path, load_profile, parse_key_string, parse_profile, ConfigError, ProfileToml};
pub use emit::ComplexModification;
pub use guard::{derive_guards, ConflictGuard, GuardScope, LayerAlphabet};
pub use key::{KeyCode, KeyIdentity};
pub use modifier::{Modifier, ModifierError, ModifierSet};
pub use multi_tap::MultiTap;
pub use profile::{Profile, ProfileBuilder, ProfileError, VariableKind, VariableSpec};
pub use reset::GlobalReset;
pub use rule::{Branch, DelayedAction, Priority, RuleUnit, Timing, UnitRole};
pub use sim::{parse_script, Effect, ScriptError, ScriptEvent, Simulator};
pub use state::{MemoryStore, SharedStore, VariableStore};
pub use step::{ActionList, ActionStep, StickyMode};
pub use sublayer::{Binding, ModalLayer, Persistence, SublayerDescriptor};
pub use tap_hold::{AppOverride, TapHold};
