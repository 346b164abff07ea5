// Hyperlayer End-to-End Tests
//
// Profiles are compiled and replayed on the substrate simulator, checking the
// timing and mutual-exclusion properties of every state machine.
//
// Run with: cargo test -p hyperlayer-core --test scenarios

use hyperlayer_core::{
    ActionStep, AppMatcher, Effect, GlobalReset, GuardScope, KeyCode, MemoryStore, ModalLayer,
    Modifier, MultiTap, Profile, RuleUnit, SharedStore, Simulator, StickyMode, SublayerDescriptor,
    TapHold, UnitRole, VariableStore,
};

// =========================================================================
// Test Helpers
// =========================================================================

fn layer() -> ModalLayer {
    ModalLayer::new("spacebar")
        .threshold_ms(200)
        .record_activation_time(true)
        .sublayer(
            SublayerDescriptor::new("d", "Directories")
                .bind("p", vec![ActionStep::open("~/Projects")]),
        )
        .sublayer(
            SublayerDescriptor::new("v", "Move")
                .sticky()
                .bind("h", vec![ActionStep::key("left_arrow")])
                .bind("l", vec![ActionStep::key("right_arrow")]),
        )
        .sublayer(
            SublayerDescriptor::new("s", "Select").bind(
                "j",
                vec![ActionStep::sticky(Modifier::LeftShift, StickyMode::Toggle)],
            ),
        )
}

fn previous_app() -> ActionStep {
    ActionStep::key_with("tab", [Modifier::LeftCommand])
}

/// Full profile: modal layer, a tap-hold on a sublayer key and a multi-tap
fn profile() -> Profile {
    Profile::builder("Hyper")
        .reset(GlobalReset::new("escape"))
        .modal(layer())
        .tap_hold(
            TapHold::new("d")
                .threshold_ms(400)
                .held(vec![ActionStep::shell("action_x")]),
        )
        .multi_tap(
            MultiTap::new("left_command")
                .hold(vec![ActionStep::open_app("com.apple.Terminal")])
                .tap_tap(vec![previous_app()])
                .tap_tap_hold(vec![ActionStep::shell("tap_tap_hold")]),
        )
        .build()
        .unwrap()
}

fn all_zero<S: VariableStore>(profile: &Profile, sim: &Simulator<S>) -> bool {
    profile
        .variables()
        .iter()
        .all(|spec| sim.variable(&spec.name) == 0)
}

fn count(effects: &[Effect], effect: &Effect) -> usize {
    effects.iter().filter(|e| *e == effect).count()
}

fn shell(command: &str) -> Effect {
    Effect::Shell(command.to_string())
}

/// Hold the modal key long enough to arm the layer
fn arm(sim: &mut Simulator) {
    sim.press("spacebar");
    sim.advance(300);
}

// =========================================================================
// Tap-hold
// =========================================================================

#[test]
fn test_quick_tap_emits_key_only() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.tap("d", 150);
    assert_eq!(sim.effects(), &[Effect::key("d")]);
}

#[test]
fn test_long_hold_runs_action_only() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.tap("d", 500);
    assert_eq!(sim.effects(), &[shell("action_x")]);
}

#[test]
fn test_release_before_threshold_always_taps() {
    let profile = profile();
    for epsilon in [1, 50, 100, 200] {
        let mut sim = Simulator::new(&profile);
        sim.tap("d", 400 - epsilon);
        sim.advance(1000);
        assert_eq!(sim.effects(), &[Effect::key("d")], "epsilon {}", epsilon);
    }
}

#[test]
fn test_unequal_timers_tap_until_held_threshold() {
    let profile = Profile::builder("Unequal")
        .tap_hold(
            TapHold::new("f")
                .alone_timeout_ms(300)
                .held_threshold_ms(450)
                .held(vec![ActionStep::shell("held")]),
        )
        .build()
        .unwrap();

    let mut sim = Simulator::new(&profile);
    sim.tap("f", 299);
    assert_eq!(sim.take_effects(), vec![Effect::key("f")]);

    // Released after the alone timeout but before the held threshold
    for hold in [300, 350, 449] {
        sim.tap("f", hold);
        sim.advance(1000);
        assert_eq!(sim.take_effects(), vec![Effect::key("f")], "hold {}", hold);
    }

    sim.tap("f", 451);
    assert_eq!(sim.take_effects(), vec![shell("held")]);
}

#[test]
fn test_hold_past_threshold_never_taps() {
    let profile = profile();
    for epsilon in [1, 100, 5000] {
        let mut sim = Simulator::new(&profile);
        sim.tap("d", 400 + epsilon);
        assert_eq!(sim.effects(), &[shell("action_x")], "epsilon {}", epsilon);
    }
}

#[test]
fn test_extra_modifiers_reach_alone_keystroke() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.press("left_shift");
    sim.tap("d", 100);
    sim.release("left_shift");
    assert_eq!(
        sim.effects(),
        &[Effect::key_with("d", [Modifier::LeftShift])]
    );
}

#[test]
fn test_app_overrides_first_match_wins() {
    let profile = Profile::builder("Apps")
        .tap_hold(
            TapHold::new("o")
                .held(vec![ActionStep::shell("default")])
                .on_app(
                    AppMatcher::bundle_id("com.apple.Terminal"),
                    vec![ActionStep::key("o")],
                    vec![ActionStep::shell("terminal")],
                )
                .on_app(
                    AppMatcher::bundle_id("com.apple.finder").negate(),
                    vec![ActionStep::key("o")],
                    vec![ActionStep::shell("not finder")],
                ),
        )
        .build()
        .unwrap();
    let mut sim = Simulator::new(&profile);

    sim.set_frontmost("com.apple.Terminal");
    sim.tap("o", 500);
    assert_eq!(sim.take_effects(), vec![shell("terminal")]);

    sim.set_frontmost("com.apple.Safari");
    sim.tap("o", 500);
    assert_eq!(sim.take_effects(), vec![shell("not finder")]);

    sim.set_frontmost("com.apple.finder");
    sim.tap("o", 500);
    assert_eq!(sim.take_effects(), vec![shell("default")]);
}

// =========================================================================
// Modal layer and sublayers
// =========================================================================

#[test]
fn test_sublayer_binding_fires_and_releases() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    arm(&mut sim);
    assert_eq!(sim.variable("hyper"), 1);
    assert_eq!(sim.variable("hyper_armed_at"), 200);

    sim.tap("d", 20);
    assert_eq!(sim.variable("hyper"), 0);
    assert_eq!(sim.variable("hyper_sublayer_d"), 1);

    sim.tap("p", 20);
    assert_eq!(sim.effects(), &[Effect::Open("~/Projects".to_string())]);
    assert_eq!(sim.variable("hyper_sublayer_d"), 0);

    sim.release("spacebar");
    assert_eq!(sim.variable("hyper"), 0);
    assert_eq!(sim.effects().len(), 1);
}

#[test]
fn test_modal_tap_passes_through() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.tap("spacebar", 80);
    assert_eq!(sim.effects(), &[Effect::key("spacebar")]);
    assert!(all_zero(&profile, &sim));
}

#[test]
fn test_sticky_sublayer_stays_active_until_modal_release() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    arm(&mut sim);
    sim.tap("v", 20);
    for _ in 0..3 {
        sim.tap("h", 20);
    }
    sim.tap("l", 20);
    assert_eq!(sim.variable("hyper_sublayer_v"), 1);
    assert_eq!(
        sim.take_effects(),
        vec![
            Effect::key("left_arrow"),
            Effect::key("left_arrow"),
            Effect::key("left_arrow"),
            Effect::key("right_arrow"),
        ]
    );

    sim.release("spacebar");
    assert_eq!(sim.variable("hyper_sublayer_v"), 0);
    assert_eq!(sim.variable("hyper"), 0);
    sim.tap("h", 20);
    assert_eq!(sim.take_effects(), vec![Effect::key("h")]);
}

#[test]
fn test_sublayer_key_after_modal_release_is_ordinary() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    arm(&mut sim);
    sim.release("spacebar");
    sim.tap("v", 5);

    assert_eq!(sim.variable("hyper_sublayer_v"), 0);
    assert_eq!(sim.effects(), &[Effect::key("v")]);
}

#[test]
fn test_unbound_key_in_sublayer_is_not_claimed() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    arm(&mut sim);
    sim.tap("d", 20);
    sim.tap("x", 20);

    assert_eq!(sim.effects(), &[Effect::key("x")]);
    assert_eq!(sim.variable("hyper_sublayer_d"), 1);
}

// =========================================================================
// Multi-stage disambiguation
// =========================================================================

#[test]
fn test_double_tap_fires_once() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.tap("left_command", 50);
    sim.advance(50);
    sim.tap("left_command", 20);
    sim.advance(1000);

    let effects = sim.take_effects();
    assert_eq!(count(&effects, &Effect::key_with("tab", [Modifier::LeftCommand])), 1);
    assert_eq!(
        effects,
        vec![
            Effect::key("left_command"),
            Effect::key_with("tab", [Modifier::LeftCommand]),
        ]
    );
    assert!(all_zero(&profile, &sim));
}

#[test]
fn test_single_tap_never_double_taps() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.tap("left_command", 50);
    assert_eq!(sim.variable("left_command_first_tap"), 1);
    sim.advance(1000);

    assert_eq!(sim.effects(), &[Effect::key("left_command")]);
    assert_eq!(sim.variable("left_command_first_tap"), 0);
}

#[test]
fn test_first_press_effect_is_pass_through_only() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.tap("left_command", 50);
    sim.advance(100);
    assert_eq!(sim.take_effects(), vec![Effect::key("left_command")]);

    sim.tap("left_command", 50);
    assert_eq!(
        sim.take_effects(),
        vec![Effect::key_with("tab", [Modifier::LeftCommand])]
    );
}

#[test]
fn test_hold_and_tap_tap_hold() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.tap("left_command", 600);
    assert_eq!(
        sim.take_effects(),
        vec![
            Effect::key("left_command"),
            Effect::OpenApp("com.apple.Terminal".to_string()),
        ]
    );
    sim.advance(1000);

    sim.tap("left_command", 50);
    sim.advance(50);
    sim.tap("left_command", 600);
    assert_eq!(
        sim.take_effects(),
        vec![Effect::key("left_command"), shell("tap_tap_hold")]
    );
}

#[test]
fn test_second_press_after_window_is_a_new_first_tap() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.tap("left_command", 50);
    sim.advance(300);
    sim.tap("left_command", 50);

    assert_eq!(
        sim.effects(),
        &[Effect::key("left_command"), Effect::key("left_command")]
    );
    assert_eq!(sim.variable("left_command_first_tap"), 1);
}

#[test]
fn test_single_pending_window() {
    let profile = profile();
    let key = KeyCode::from("left_command");
    let mut sim = Simulator::new(&profile);

    for _ in 0..3 {
        sim.press("left_command");
        assert!(sim.pending_windows() <= 1);
        sim.advance(30);
        sim.release("left_command");
        assert!(sim.pending_windows() <= 1);
        sim.advance(30);
    }

    // Third press started a fresh first tap with its own window
    assert!(sim.has_pending_window(&key));
    assert_eq!(sim.variable("left_command_first_tap"), 1);

    sim.press("left_command");
    assert_eq!(sim.claimed_by(&key), Some("double tap left_command"));
    assert_eq!(sim.pending_windows(), 0);
}

#[test]
fn test_double_tap_misclassified_when_initiation_dispatches_first() {
    let profile = profile();
    let mut units: Vec<RuleUnit> = profile.units().to_vec();
    let continuation = units
        .iter()
        .position(|u| u.role == UnitRole::TapContinuation)
        .unwrap();
    let initiation = units
        .iter()
        .position(|u| u.role == UnitRole::TapInitiation)
        .unwrap();
    units.swap(continuation, initiation);

    let mut sim = Simulator::from_units(units);
    sim.tap("left_command", 50);
    sim.advance(50);
    sim.tap("left_command", 20);

    assert_eq!(
        count(sim.effects(), &Effect::key_with("tab", [Modifier::LeftCommand])),
        0
    );
}

// =========================================================================
// Conflict guard
// =========================================================================

#[test]
fn test_every_disambiguator_unit_is_guarded() {
    let profile = profile();
    let guarded: Vec<&RuleUnit> = profile
        .units()
        .iter()
        .filter(|u| {
            matches!(
                u.role,
                UnitRole::TapHold
                    | UnitRole::TapHoldOverride
                    | UnitRole::TapInitiation
                    | UnitRole::TapContinuation
            )
        })
        .collect();

    assert_eq!(guarded.len(), 3);
    for unit in guarded {
        assert!(profile.guard().is_guarded(unit), "{} is unguarded", unit);
        assert_eq!(unit.variables_read().filter(|v| v.starts_with("hyper")).count(), 4);
    }
}

#[test]
fn test_overlapping_scope_leaves_other_keys_unguarded() {
    let profile = Profile::builder("Overlap")
        .modal(layer())
        .guard_scope(GuardScope::Overlapping)
        .tap_hold(TapHold::new("d").held(vec![ActionStep::shell("x")]))
        .multi_tap(MultiTap::new("left_command").tap_tap(vec![previous_app()]))
        .build()
        .unwrap();

    for unit in profile.units_for(&KeyCode::from("d")) {
        if unit.role == UnitRole::TapHold {
            assert!(profile.guard().is_guarded(unit));
        }
    }
    for unit in profile.units_for(&KeyCode::from("left_command")) {
        assert!(!profile.guard().is_guarded(unit));
    }
}

#[test]
fn test_tap_hold_suppressed_while_layer_active() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    arm(&mut sim);
    sim.tap("d", 600);
    assert_eq!(sim.variable("hyper_sublayer_d"), 1);

    sim.release("spacebar");
    arm(&mut sim);
    sim.tap("v", 20);
    sim.tap("d", 600);

    assert_eq!(count(sim.effects(), &shell("action_x")), 0);
}

#[test]
fn test_arming_interrupts_pending_tap_hold() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.press("d");
    sim.advance(50);
    sim.press("spacebar");
    sim.advance(600);
    assert_eq!(sim.variable("hyper"), 1);
    sim.release("d");
    sim.release("spacebar");

    assert!(sim.effects().is_empty());
}

#[test]
fn test_adding_sublayer_extends_existing_guards() {
    let extended = Profile::builder("Extended")
        .modal(layer().sublayer(SublayerDescriptor::new("a", "Apps")))
        .tap_hold(TapHold::new("d").held(vec![ActionStep::shell("x")]))
        .build()
        .unwrap();

    let tap_hold = extended
        .units_with_role(UnitRole::TapHold)
        .next()
        .unwrap();
    assert!(tap_hold
        .variables_read()
        .any(|name| name == "hyper_sublayer_a"));
}

// =========================================================================
// Global reset
// =========================================================================

#[test]
fn test_reset_from_active_sublayer() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    arm(&mut sim);
    sim.tap("d", 20);
    assert_eq!(sim.variable("hyper_sublayer_d"), 1);
    assert_eq!(sim.variable("hyper"), 0);

    sim.press("escape");
    assert_eq!(sim.variable("hyper_sublayer_d"), 0);
    assert_eq!(sim.variable("hyper"), 0);
    assert!(all_zero(&profile, &sim));
}

#[test]
fn test_reset_from_armed_layer() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    arm(&mut sim);
    assert_ne!(sim.variable("hyper_armed_at"), 0);
    sim.tap("escape", 10);

    assert!(all_zero(&profile, &sim));
    assert_eq!(sim.effects().last(), Some(&Effect::key("escape")));
}

#[test]
fn test_reset_from_first_tap() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    sim.tap("left_command", 50);
    assert_eq!(sim.variable("left_command_first_tap"), 1);
    sim.press("escape");

    assert!(all_zero(&profile, &sim));
    assert_eq!(sim.pending_windows(), 0);
}

#[test]
fn test_reset_recovers_wedged_variables() {
    let profile = profile();
    let mut store = MemoryStore::new();
    store.set("left_command_first_tap", 1);
    store.set("hyper_sublayer_v", 1);
    store.set("hyper", 1);
    let mut sim = Simulator::with_store(&profile, store);

    sim.tap("escape", 10);
    assert!(sim.store().all_zero());
}

#[test]
fn test_reset_releases_sticky_modifiers() {
    let profile = profile();
    let mut sim = Simulator::new(&profile);

    arm(&mut sim);
    sim.tap("s", 20);
    sim.tap("j", 20);
    assert!(sim.sticky_modifiers().contains(Modifier::LeftShift));

    sim.tap("escape", 10);
    assert!(sim.sticky_modifiers().is_empty());
    assert!(sim.effects().contains(&Effect::Sticky {
        modifier: Modifier::LeftShift,
        mode: StickyMode::Off,
    }));
}

// =========================================================================
// Store sharing and artifact
// =========================================================================

#[test]
fn test_shared_store_observes_simulation() {
    let profile = profile();
    let shared = SharedStore::new();
    let mut sim = Simulator::with_store(&profile, shared.clone());

    sim.press("spacebar");
    sim.advance(250);
    assert_eq!(shared.get("hyper"), 1);

    sim.release("spacebar");
    assert_eq!(shared.get("hyper"), 0);
    // Timestamps survive the modal release; only a reset zeroes them
    assert_eq!(shared.snapshot().non_zero(), vec!["hyper_armed_at"]);
}

#[test]
fn test_artifact_preserves_dispatch_order() {
    let profile = profile();
    let value = serde_json::to_value(profile.to_artifact()).unwrap();

    assert_eq!(value["title"], "Hyper");
    let manipulators = value["rules"][0]["manipulators"].as_array().unwrap();
    assert_eq!(manipulators.len(), profile.units().len());
    assert_eq!(manipulators[0]["description"], "reset escape");
    assert_eq!(manipulators[1]["description"], "double tap left_command");

    let descriptions: Vec<&str> = manipulators
        .iter()
        .filter_map(|m| m["description"].as_str())
        .collect();
    let continuation = descriptions
        .iter()
        .position(|d| *d == "double tap left_command")
        .unwrap();
    let initiation = descriptions
        .iter()
        .position(|d| *d == "first tap left_command")
        .unwrap();
    assert!(continuation < initiation);
}
