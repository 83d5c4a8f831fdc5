//! End-to-end gesture behaviour through the public engine API
//!
//! Every test drives a [`RemotePad`] built from configuration, the same way
//! the binary does, and inspects what reached the transport.

use lamco_remote_pad::config::Config;
use lamco_remote_pad::engine::{
    Command, Millis, MouseButton, PadEvent, PointerEvent, PointerId, PointerPhase,
    PointerTarget, Position, RecordingTransport, RemotePad, RepeatSchedule, ScrollDirection,
    TimerScheduler,
};

fn pad_from(toml: &str) -> RemotePad<RecordingTransport> {
    Config::from_toml(toml)
        .unwrap()
        .build_pad(RecordingTransport::new())
        .unwrap()
}

fn default_pad() -> RemotePad<RecordingTransport> {
    Config::default_config()
        .unwrap()
        .build_pad(RecordingTransport::new())
        .unwrap()
}

fn event(
    pointer_id: PointerId,
    target: PointerTarget,
    phase: PointerPhase,
    x: f64,
    y: f64,
    timestamp_ms: Millis,
) -> PadEvent {
    PadEvent::Pointer(PointerEvent {
        pointer_id,
        target,
        phase,
        position: Position::new(x, y),
        timestamp_ms,
    })
}

fn trackpad(pointer: PointerId, phase: PointerPhase, x: f64, y: f64, t: Millis) -> PadEvent {
    event(pointer, PointerTarget::Trackpad, phase, x, y, t)
}

fn element(id: &str, pointer: PointerId, phase: PointerPhase, t: Millis) -> PadEvent {
    event(
        pointer,
        PointerTarget::Element(id.to_string()),
        phase,
        0.0,
        0.0,
        t,
    )
}

fn clicks(commands: &[Command]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, Command::Click { .. } | Command::DoubleClick { .. }))
        .count()
}

const POWER_LAYOUT: &str = r#"
[[elements]]
id = "power"
code = "KEY_POWER"

[[overrides]]
element = "power"
short = "KEY_SLEEP"
long = "KEY_POWER"
"#;

#[test]
fn test_quick_taps_emit_one_short_click_each() {
    for hold_ms in [0, 1, 250, 499] {
        let mut pad = default_pad();
        pad.handle_event(trackpad(1, PointerPhase::Down, 40.0, 40.0, 1_000))
            .unwrap();
        pad.handle_event(trackpad(1, PointerPhase::Up, 40.0, 40.0, 1_000 + hold_ms))
            .unwrap();

        assert_eq!(
            pad.transport().commands(),
            vec![Command::Click {
                button: MouseButton::Left
            }],
            "hold of {} ms",
            hold_ms
        );
        assert_eq!(pad.pending_timers(), 0);
    }
}

#[test]
fn test_long_press_fires_once_at_delay() {
    let mut pad = pad_from(POWER_LAYOUT);

    pad.handle_event(element("power", 1, PointerPhase::Down, 0))
        .unwrap();
    assert_eq!(pad.next_deadline(), Some(500));
    assert_eq!(pad.fire_due(499), 0);
    assert!(pad.transport().commands().is_empty());

    assert_eq!(pad.fire_due(500), 1);
    let fired = pad.transport().commands();
    assert_eq!(
        fired,
        vec![
            Command::PressKey {
                code: "KEY_POWER".into()
            },
            Command::ReleaseKey {
                code: "KEY_POWER".into()
            },
        ]
    );

    pad.handle_event(element("power", 1, PointerPhase::Up, 900))
        .unwrap();
    assert_eq!(pad.transport().commands(), fired);
    assert_eq!(pad.pending_timers(), 0);
}

#[test]
fn test_repeat_schedule_accelerates_to_floor() {
    let schedule = RepeatSchedule {
        initial_ms: 500,
        decrement_ms: 50,
        floor_ms: 350,
    };
    assert_eq!(schedule.delays(7), vec![500, 450, 400, 350, 350, 350, 350]);
}

#[test]
fn test_repeating_override_follows_schedule() {
    let mut pad = pad_from(
        r#"
[timing.repeat]
initial_ms = 500
decrement_ms = 50
floor_ms = 350

[[elements]]
id = "vol"
code = "CON_VOLUME_UP"

[[overrides]]
element = "vol"
short = { action = "CON_VOLUME_UP", repeat = true }
"#,
    );

    pad.handle_event(element("vol", 1, PointerPhase::Down, 0))
        .unwrap();

    let mut fire_times = Vec::new();
    while let Some(deadline) = pad.next_deadline().filter(|d| *d <= 2_500) {
        pad.fire_due(deadline);
        fire_times.push(deadline);
    }
    // 500, +450, +400, +350, +350, +350
    assert_eq!(fire_times, vec![500, 950, 1_350, 1_700, 2_050, 2_400]);

    pad.handle_event(element("vol", 1, PointerPhase::Up, 2_500))
        .unwrap();
    assert_eq!(pad.pending_timers(), 0);
}

#[test]
fn test_move_detection_is_sticky() {
    let mut pad = default_pad();

    pad.handle_event(trackpad(1, PointerPhase::Down, 100.0, 100.0, 0))
        .unwrap();
    pad.handle_event(trackpad(1, PointerPhase::Move, 110.0, 100.0, 20))
        .unwrap();
    pad.handle_event(trackpad(1, PointerPhase::Move, 100.0, 100.0, 40))
        .unwrap();
    pad.handle_event(trackpad(1, PointerPhase::Up, 100.0, 100.0, 60))
        .unwrap();

    let commands = pad.transport().commands();
    assert_eq!(clicks(&commands), 0);
    assert_eq!(
        commands,
        vec![
            Command::MoveCursor { dx: 10, dy: 0 },
            Command::MoveCursor { dx: -10, dy: 0 },
        ]
    );

    // The long-click timer was cancelled on the first detected move
    assert_eq!(pad.fire_due(10_000), 0);
    assert_eq!(clicks(&pad.transport().commands()), 0);
}

#[test]
fn test_release_by_other_pointer_is_ignored() {
    let mut pad = default_pad();

    pad.handle_event(element("key-enter", 1, PointerPhase::Down, 0))
        .unwrap();
    pad.handle_event(element("key-enter", 2, PointerPhase::Up, 50))
        .unwrap();
    assert_eq!(
        pad.transport().commands(),
        vec![Command::PressKey {
            code: "KEY_ENTER".into()
        }]
    );

    pad.handle_event(element("key-enter", 1, PointerPhase::Up, 100))
        .unwrap();
    assert_eq!(
        pad.transport().commands(),
        vec![
            Command::PressKey {
                code: "KEY_ENTER".into()
            },
            Command::ReleaseKey {
                code: "KEY_ENTER".into()
            },
        ]
    );
}

#[test]
fn test_vertical_scroll_wins_below_horizontal_threshold() {
    let mut pad = pad_from(
        r#"
[trackpad]
scroll_threshold_x = 2.0
scroll_threshold_y = 2.0
"#,
    );

    pad.handle_event(trackpad(1, PointerPhase::Down, 0.0, 0.0, 0))
        .unwrap();
    pad.handle_event(trackpad(2, PointerPhase::Down, 50.0, 0.0, 5))
        .unwrap();
    // Average delta over both pointers is (1, 3)
    pad.handle_event(trackpad(1, PointerPhase::Move, 2.0, 6.0, 20))
        .unwrap();

    let scroll = pad
        .trackpad()
        .scroll_session()
        .map(|s| s.direction);
    assert_eq!(scroll, Some(ScrollDirection::Bottom));
    assert_eq!(
        pad.transport().commands(),
        vec![Command::Scroll { dx: 0, dy: -1 }]
    );

    pad.handle_event(trackpad(1, PointerPhase::Up, 2.0, 6.0, 40))
        .unwrap();
    pad.handle_event(trackpad(2, PointerPhase::Up, 50.0, 0.0, 45))
        .unwrap();
    assert!(pad.trackpad().scroll_session().is_none());
    assert_eq!(clicks(&pad.transport().commands()), 0);
    assert_eq!(pad.pending_timers(), 0);
}

#[test]
fn test_survivor_after_two_pointer_scroll_moves_only_new_travel() {
    for lift in [PointerPhase::Up, PointerPhase::Cancel, PointerPhase::Leave] {
        let mut pad = pad_from(
            r#"
[trackpad]
scroll_threshold_x = 2.0
scroll_threshold_y = 2.0
"#,
        );

        pad.handle_event(trackpad(1, PointerPhase::Down, 0.0, 0.0, 0))
            .unwrap();
        pad.handle_event(trackpad(2, PointerPhase::Down, 50.0, 0.0, 10))
            .unwrap();
        pad.handle_event(trackpad(1, PointerPhase::Move, 1.0, 3.0, 20))
            .unwrap();
        pad.handle_event(trackpad(2, PointerPhase::Move, 51.0, 3.0, 20))
            .unwrap();
        pad.handle_event(trackpad(1, PointerPhase::Move, 1.0, 60.0, 30))
            .unwrap();
        pad.handle_event(trackpad(2, PointerPhase::Move, 51.0, 60.0, 30))
            .unwrap();
        pad.handle_event(trackpad(1, lift, 1.0, 60.0, 40)).unwrap();
        pad.handle_event(trackpad(2, PointerPhase::Move, 51.0, 61.0, 50))
            .unwrap();

        assert_eq!(
            pad.transport().commands(),
            vec![
                Command::Scroll { dx: 0, dy: -1 },
                Command::MoveCursor { dx: 0, dy: 1 },
            ],
            "first pointer ended with {:?}",
            lift
        );
        assert!(pad.trackpad().scroll_session().is_none());
    }
}

#[test]
fn test_cancel_releases_optimistic_press() {
    for phase in [PointerPhase::Cancel, PointerPhase::Leave] {
        let mut pad = default_pad();

        pad.handle_event(element("volume-up", 3, PointerPhase::Down, 0))
            .unwrap();
        pad.handle_event(element("volume-up", 3, phase, 30))
            .unwrap();

        assert_eq!(
            pad.transport().commands(),
            vec![
                Command::PressConsumer {
                    code: "CON_VOLUME_UP".into()
                },
                Command::ReleaseConsumer {
                    code: "CON_VOLUME_UP".into()
                },
            ]
        );
        assert!(pad.dispatcher().held().is_empty());
    }
}

#[test]
fn test_abort_drops_pending_long_override() {
    let mut pad = pad_from(POWER_LAYOUT);

    pad.handle_event(element("power", 1, PointerPhase::Down, 0))
        .unwrap();
    pad.handle_event(element("power", 1, PointerPhase::Cancel, 200))
        .unwrap();

    assert_eq!(pad.pending_timers(), 0);
    assert_eq!(pad.fire_due(5_000), 0);
    assert!(pad.transport().commands().is_empty());
}

#[test]
fn test_cancel_is_idempotent() {
    let mut timers = TimerScheduler::new();
    let handle = timers.schedule(0, 100, "long-press");

    assert!(timers.cancel(&handle));
    assert!(!timers.cancel(&handle));
    assert!(timers.pop_due(1_000).is_none());

    let handle = timers.schedule(0, 100, "repeat");
    let fired = timers.pop_due(100);
    assert!(fired.is_some());
    assert!(!timers.cancel(&handle));
    assert!(timers.pop_due(1_000).is_none());
}

#[test]
fn test_both_same_override_rejected_at_press() {
    let mut pad = pad_from(
        r#"
[[elements]]
id = "home"
code = "KEY_HOME"

[[overrides]]
element = "home"
short = "same"
long = "same"
"#,
    );

    // Falls back to the default action
    pad.handle_event(element("home", 1, PointerPhase::Down, 0))
        .unwrap();
    pad.handle_event(element("home", 1, PointerPhase::Up, 50))
        .unwrap();
    assert_eq!(
        pad.transport().commands(),
        vec![
            Command::PressKey {
                code: "KEY_HOME".into()
            },
            Command::ReleaseKey {
                code: "KEY_HOME".into()
            },
        ]
    );
}

#[test]
fn test_unknown_element_has_no_side_effects() {
    let mut pad = default_pad();

    assert!(pad
        .handle_event(element("no-such-key", 1, PointerPhase::Down, 0))
        .is_err());
    assert!(pad.transport().events().is_empty());
    assert_eq!(pad.pending_timers(), 0);
}
