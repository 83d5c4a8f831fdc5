//! Trackpad Surface
//!
//! Drives pointer sessions, the gesture classifier and trackpad timers.
//!
//! ```text
//!   1 pointer  down ──> long-click timer (cancelled by move / 2nd pointer / up)
//!              move ──> MoveCursor (move mode) or Scroll step (scroll mode)
//!              up   ──> Click | DoubleClick | nothing
//!   2 pointers move ──> first ScrollIntent opens a ScrollSession:
//!                       one Scroll now, then repeats until either pointer ends
//! ```
//!
//! Sessions that ever coexisted with another pointer never click.

use tracing::{debug, info};

use crate::engine::classifier::{ClassifierConfig, GestureClassifier, GestureIntent, ScrollDirection};
use crate::engine::error::{EngineError, Result};
use crate::engine::pad::TimerKind;
use crate::engine::session::{MoveThresholds, PointerId, PointerSessionTable, Position};
use crate::engine::timer::{Millis, RepeatSchedule, TimerHandle, TimerScheduler};
use crate::engine::transport::{Command, CommandTransport, HapticKind, MouseButton};

/// Single-pointer movement interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackpadMode {
    /// Movement moves the cursor
    #[default]
    Move,
    /// Movement scrolls
    Scroll,
}

/// Trackpad configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackpadConfig {
    /// Movement detection thresholds
    pub move_thresholds: MoveThresholds,
    /// Classification thresholds
    pub classifier: ClassifierConfig,
    /// Two-pointer scroll repeat timing
    pub scroll_repeat: RepeatSchedule,
}

impl Default for TrackpadConfig {
    fn default() -> Self {
        Self {
            move_thresholds: MoveThresholds::default(),
            classifier: ClassifierConfig::default(),
            scroll_repeat: RepeatSchedule {
                initial_ms: 350,
                decrement_ms: 25,
                floor_ms: 75,
            },
        }
    }
}

/// Active two-pointer scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSession {
    /// Direction chosen by the first intent
    pub direction: ScrollDirection,
    /// Pending repeat
    pub repeat: Option<TimerHandle>,
    /// Delay of the pending repeat
    pub delay_ms: Millis,
}

/// Trackpad gesture surface
#[derive(Debug)]
pub struct Trackpad {
    sessions: PointerSessionTable,
    classifier: GestureClassifier,
    scroll: Option<ScrollSession>,
    scroll_repeat: RepeatSchedule,
    mode: TrackpadMode,
}

impl Trackpad {
    /// Create a trackpad
    pub fn new(config: TrackpadConfig) -> Self {
        Self {
            sessions: PointerSessionTable::new(config.move_thresholds),
            classifier: GestureClassifier::new(config.classifier),
            scroll: None,
            scroll_repeat: config.scroll_repeat,
            mode: TrackpadMode::Move,
        }
    }

    /// Pointer touched the trackpad
    pub fn pointer_down(
        &mut self,
        pointer: PointerId,
        position: Position,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
    ) {
        if !self.sessions.begin(pointer, position, now) {
            return;
        }

        if self.sessions.len() == 1 {
            let handle = timers.schedule(
                now,
                self.classifier.config().long_click_delay_ms,
                TimerKind::LongClick { pointer },
            );
            if let Some(session) = self.sessions.get_mut(pointer) {
                session.pending_timer = Some(handle);
            }
        } else {
            debug!(
                "Pointer {} joined, {} pointers on trackpad",
                pointer,
                self.sessions.len()
            );
            self.cancel_long_clicks(timers);
            self.sessions.mark_all_overlapped();
            self.sessions.advance_all_anchors();
        }
    }

    /// Pointer moved on the trackpad
    pub fn pointer_move<T: CommandTransport>(
        &mut self,
        pointer: PointerId,
        position: Position,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) {
        let Some(session) = self.sessions.update(pointer, position, now) else {
            return;
        };
        let move_detected = session.move_detected;

        if move_detected {
            if let Some(handle) = self
                .sessions
                .get_mut(pointer)
                .and_then(|s| s.pending_timer.take())
            {
                timers.cancel(&handle);
            }
        }

        match self.sessions.len() {
            1 => self.single_pointer_move(pointer, move_detected, transport),
            2 => self.two_pointer_move(now, timers, transport),
            _ => {}
        }
    }

    /// Pointer lifted from the trackpad
    pub fn pointer_up<T: CommandTransport>(
        &mut self,
        pointer: PointerId,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) {
        let Some(session) = self.sessions.end(pointer, timers) else {
            return;
        };
        self.end_scroll(timers);
        // Survivors restart from where they are now
        self.sessions.advance_all_anchors();

        match self.classifier.classify_release(&session, now) {
            GestureIntent::ShortClick => {
                debug!("Short click by pointer {}", pointer);
                transport.send(Command::Click {
                    button: MouseButton::Left,
                });
                transport.haptic(HapticKind::Normal);
            }
            GestureIntent::LongClick => {
                debug!("Long click by pointer {} confirmed on release", pointer);
                transport.send(Command::DoubleClick {
                    button: MouseButton::Left,
                });
                transport.haptic(HapticKind::Long);
            }
            _ => {}
        }
    }

    /// Pointer cancelled or left the trackpad
    pub fn pointer_abort(&mut self, pointer: PointerId, timers: &mut TimerScheduler<TimerKind>) {
        if self.sessions.end(pointer, timers).is_some() {
            debug!("Pointer {} aborted on trackpad", pointer);
            self.end_scroll(timers);
            self.sessions.advance_all_anchors();
        }
    }

    /// Long-click timer fired
    pub fn fire_long_click<T: CommandTransport>(
        &mut self,
        pointer: PointerId,
        handle: TimerHandle,
        transport: &mut T,
    ) -> Result<()> {
        let session = self
            .sessions
            .get_mut(pointer)
            .filter(|s| s.pending_timer == Some(handle))
            .ok_or_else(|| EngineError::StaleTimer(format!("long click for pointer {}", pointer)))?;
        session.pending_timer = None;

        if session.move_detected || session.overlapped {
            return Err(EngineError::StaleTimer(format!(
                "long click for pointer {} after move",
                pointer
            )));
        }

        session.long_click_fired = true;
        debug!("Long click by pointer {}", pointer);
        transport.send(Command::DoubleClick {
            button: MouseButton::Left,
        });
        transport.haptic(HapticKind::Long);
        Ok(())
    }

    /// Scroll repeat timer fired
    pub fn fire_scroll_repeat<T: CommandTransport>(
        &mut self,
        handle: TimerHandle,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) -> Result<()> {
        let scroll = self
            .scroll
            .as_mut()
            .filter(|s| s.repeat == Some(handle))
            .ok_or_else(|| EngineError::StaleTimer("scroll repeat".to_string()))?;

        let (dx, dy) = scroll.direction.step();
        transport.send(Command::Scroll { dx, dy });
        transport.haptic(HapticKind::Short);

        scroll.delay_ms = self.scroll_repeat.next_delay(scroll.delay_ms);
        scroll.repeat = Some(timers.schedule(now, scroll.delay_ms, TimerKind::ScrollRepeat));
        Ok(())
    }

    /// Flip between move and scroll mode
    pub fn toggle_mode(&mut self) -> TrackpadMode {
        self.mode = match self.mode {
            TrackpadMode::Move => TrackpadMode::Scroll,
            TrackpadMode::Scroll => TrackpadMode::Move,
        };
        info!("Trackpad mode: {:?}", self.mode);
        self.mode
    }

    /// Current mode
    pub fn mode(&self) -> TrackpadMode {
        self.mode
    }

    /// Active scroll session
    pub fn scroll_session(&self) -> Option<&ScrollSession> {
        self.scroll.as_ref()
    }

    /// Session table
    pub fn sessions(&self) -> &PointerSessionTable {
        &self.sessions
    }

    /// Drop every session and the scroll session
    pub fn reset(&mut self, timers: &mut TimerScheduler<TimerKind>) {
        self.sessions.clear(timers);
        self.end_scroll(timers);
    }

    fn single_pointer_move<T: CommandTransport>(
        &mut self,
        pointer: PointerId,
        move_detected: bool,
        transport: &mut T,
    ) {
        let Some(session) = self.sessions.get(pointer) else {
            return;
        };

        let intent = match self.mode {
            TrackpadMode::Move => self.classifier.classify_move(session),
            TrackpadMode::Scroll => self.classifier.classify_scroll_step(session),
        };

        match intent {
            GestureIntent::MoveDelta { dx, dy } => {
                transport.send(Command::MoveCursor { dx, dy });
                if move_detected {
                    transport.haptic(HapticKind::Short);
                }
                self.sessions.advance_anchor(pointer);
            }
            GestureIntent::ScrollStep { dx, dy } => {
                transport.send(Command::Scroll { dx, dy });
                transport.haptic(HapticKind::Short);
                self.sessions.advance_anchor(pointer);
            }
            _ => {}
        }
    }

    fn two_pointer_move<T: CommandTransport>(
        &mut self,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) {
        if self.scroll.is_some() {
            // Travel during an open scroll session is consumed by it
            self.sessions.advance_all_anchors();
            return;
        }

        let intent = self
            .classifier
            .classify_scroll(self.sessions.iter().map(|(_, s)| s));
        let GestureIntent::ScrollIntent(direction) = intent else {
            return;
        };

        debug!("Two-pointer scroll {:?}", direction);
        let (dx, dy) = direction.step();
        transport.send(Command::Scroll { dx, dy });
        transport.haptic(HapticKind::Short);
        self.sessions.advance_all_anchors();

        let delay_ms = self.scroll_repeat.initial_ms;
        self.scroll = Some(ScrollSession {
            direction,
            repeat: Some(timers.schedule(now, delay_ms, TimerKind::ScrollRepeat)),
            delay_ms,
        });
    }

    fn cancel_long_clicks(&mut self, timers: &mut TimerScheduler<TimerKind>) {
        let pointers: Vec<PointerId> = self.sessions.iter().map(|(id, _)| *id).collect();
        for pointer in pointers {
            if let Some(handle) = self
                .sessions
                .get_mut(pointer)
                .and_then(|s| s.pending_timer.take())
            {
                timers.cancel(&handle);
            }
        }
    }

    fn end_scroll(&mut self, timers: &mut TimerScheduler<TimerKind>) {
        if let Some(scroll) = self.scroll.take() {
            debug!("Scroll session {:?} ended", scroll.direction);
            if let Some(handle) = scroll.repeat {
                timers.cancel(&handle);
            }
        }
    }
}

impl Default for Trackpad {
    fn default() -> Self {
        Self::new(TrackpadConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::transport::RecordingTransport;

    struct Rig {
        trackpad: Trackpad,
        timers: TimerScheduler<TimerKind>,
        transport: RecordingTransport,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                trackpad: Trackpad::new(TrackpadConfig {
                    move_thresholds: MoveThresholds { x: 2.0, y: 2.0 },
                    classifier: ClassifierConfig {
                        long_click_delay_ms: 500,
                        scroll_threshold_x: 2.0,
                        scroll_threshold_y: 2.0,
                    },
                    ..TrackpadConfig::default()
                }),
                timers: TimerScheduler::new(),
                transport: RecordingTransport::new(),
            }
        }

        fn down(&mut self, pointer: PointerId, x: f64, y: f64, now: Millis) {
            self.advance(now);
            self.trackpad
                .pointer_down(pointer, Position::new(x, y), now, &mut self.timers);
        }

        fn moved(&mut self, pointer: PointerId, x: f64, y: f64, now: Millis) {
            self.advance(now);
            self.trackpad.pointer_move(
                pointer,
                Position::new(x, y),
                now,
                &mut self.timers,
                &mut self.transport,
            );
        }

        fn up(&mut self, pointer: PointerId, now: Millis) {
            self.advance(now);
            self.trackpad
                .pointer_up(pointer, now, &mut self.timers, &mut self.transport);
        }

        fn advance(&mut self, now: Millis) {
            while let Some(fired) = self.timers.pop_due(now) {
                let _ = match fired.payload {
                    TimerKind::LongClick { pointer } => {
                        self.trackpad
                            .fire_long_click(pointer, fired.handle, &mut self.transport)
                    }
                    TimerKind::ScrollRepeat => self.trackpad.fire_scroll_repeat(
                        fired.handle,
                        fired.deadline,
                        &mut self.timers,
                        &mut self.transport,
                    ),
                    _ => Ok(()),
                };
            }
        }

        fn commands(&self) -> Vec<Command> {
            self.transport.commands()
        }
    }

    const LEFT: MouseButton = MouseButton::Left;

    #[test]
    fn test_short_click() {
        let mut rig = Rig::new();
        rig.down(1, 100.0, 100.0, 0);
        rig.moved(1, 101.0, 100.0, 50);
        rig.up(1, 120);

        assert_eq!(
            rig.commands(),
            vec![
                Command::MoveCursor { dx: 1, dy: 0 },
                Command::Click { button: LEFT },
            ]
        );
        assert!(rig.timers.is_empty());
    }

    #[test]
    fn test_long_click_by_timer_then_silent_release() {
        let mut rig = Rig::new();
        rig.down(1, 100.0, 100.0, 0);
        rig.advance(499);
        assert!(rig.commands().is_empty());

        rig.up(1, 800);
        assert_eq!(rig.commands(), vec![Command::DoubleClick { button: LEFT }]);
        assert!(rig.transport.haptics().contains(&HapticKind::Long));
    }

    #[test]
    fn test_long_click_confirmed_on_release() {
        let mut rig = Rig::new();
        rig.trackpad
            .pointer_down(1, Position::new(0.0, 0.0), 0, &mut rig.timers);
        // release processed without firing the timer first
        rig.trackpad
            .pointer_up(1, 600, &mut rig.timers, &mut rig.transport);

        assert_eq!(rig.commands(), vec![Command::DoubleClick { button: LEFT }]);
        assert!(rig.timers.is_empty());
    }

    #[test]
    fn test_drag_moves_and_never_clicks() {
        let mut rig = Rig::new();
        rig.down(1, 100.0, 100.0, 0);
        rig.moved(1, 110.0, 104.0, 30);
        rig.moved(1, 101.0, 100.0, 60);
        rig.up(1, 100);

        assert_eq!(
            rig.commands(),
            vec![
                Command::MoveCursor { dx: 10, dy: 4 },
                Command::MoveCursor { dx: -9, dy: -4 },
            ]
        );
        // long-click timer was cancelled by the move
        assert!(rig.timers.is_empty());
    }

    #[test]
    fn test_small_moves_below_threshold_skip_haptic() {
        let mut rig = Rig::new();
        rig.down(1, 0.0, 0.0, 0);
        rig.moved(1, 1.0, 0.0, 10);

        assert_eq!(rig.commands(), vec![Command::MoveCursor { dx: 1, dy: 0 }]);
        assert!(rig.transport.haptics().is_empty());

        rig.up(1, 50);
        assert_eq!(rig.commands().last(), Some(&Command::Click { button: LEFT }));
    }

    #[test]
    fn test_two_pointer_scroll_opens_repeat_chain() {
        let mut rig = Rig::new();
        rig.down(1, 0.0, 0.0, 0);
        rig.down(2, 50.0, 0.0, 10);
        rig.moved(1, 1.0, 3.0, 20);
        rig.moved(2, 51.0, 3.0, 20);

        // average dy = (3 + 3) / 2 = 3 > 2 on the second move only
        assert_eq!(rig.commands(), vec![Command::Scroll { dx: 0, dy: -1 }]);
        assert_eq!(
            rig.trackpad.scroll_session().map(|s| s.direction),
            Some(ScrollDirection::Bottom)
        );

        // further qualifying moves do not re-fire
        rig.moved(1, 1.0, 30.0, 30);
        rig.moved(2, 51.0, 30.0, 30);
        assert_eq!(rig.commands().len(), 1);

        rig.advance(20 + 350 + 325);
        assert_eq!(rig.commands().len(), 3);

        rig.up(1, 700);
        rig.up(2, 710);
        rig.advance(10_000);
        assert_eq!(rig.commands().len(), 3);
        assert!(rig.timers.is_empty());
    }

    #[test]
    fn test_survivor_moves_from_release_point_after_scroll() {
        let mut rig = Rig::new();
        rig.down(1, 0.0, 0.0, 0);
        rig.down(2, 50.0, 0.0, 10);
        rig.moved(1, 1.0, 3.0, 20);
        rig.moved(2, 51.0, 3.0, 20);
        // Travel while the scroll session is open
        rig.moved(1, 1.0, 60.0, 30);
        rig.moved(2, 51.0, 60.0, 30);
        rig.up(1, 40);
        rig.moved(2, 51.0, 61.0, 50);

        assert_eq!(
            rig.commands(),
            vec![
                Command::Scroll { dx: 0, dy: -1 },
                Command::MoveCursor { dx: 0, dy: 1 },
            ]
        );
        assert!(rig.trackpad.scroll_session().is_none());
    }

    #[test]
    fn test_survivor_moves_from_release_point_after_abort() {
        let mut rig = Rig::new();
        rig.down(1, 0.0, 0.0, 0);
        rig.down(2, 50.0, 0.0, 10);
        rig.moved(1, 1.0, 3.0, 20);
        rig.moved(2, 51.0, 3.0, 20);
        rig.moved(1, 1.0, 60.0, 30);
        rig.moved(2, 51.0, 60.0, 30);
        rig.trackpad.pointer_abort(1, &mut rig.timers);
        rig.moved(2, 51.0, 61.0, 50);
        rig.advance(10_000);

        assert_eq!(
            rig.commands(),
            vec![
                Command::Scroll { dx: 0, dy: -1 },
                Command::MoveCursor { dx: 0, dy: 1 },
            ]
        );
        assert!(rig.timers.is_empty());
    }

    #[test]
    fn test_survivor_drops_sub_threshold_two_pointer_travel() {
        let mut rig = Rig::new();
        rig.down(1, 0.0, 0.0, 0);
        rig.down(2, 50.0, 0.0, 10);
        // average dy = 1, below the scroll threshold
        rig.moved(1, 0.0, 1.0, 20);
        rig.moved(2, 50.0, 1.0, 20);
        rig.up(1, 30);
        rig.moved(2, 50.0, 2.0, 40);

        assert_eq!(rig.commands(), vec![Command::MoveCursor { dx: 0, dy: 1 }]);
    }

    #[test]
    fn test_second_pointer_cancels_long_click() {
        let mut rig = Rig::new();
        rig.down(1, 0.0, 0.0, 0);
        rig.down(2, 40.0, 0.0, 100);
        rig.advance(2_000);
        rig.up(2, 2_000);
        rig.up(1, 2_010);

        assert!(rig.commands().is_empty());
    }

    #[test]
    fn test_overlapped_pointer_release_is_silent() {
        let mut rig = Rig::new();
        rig.down(1, 0.0, 0.0, 0);
        rig.down(2, 40.0, 0.0, 10);
        rig.up(2, 20);
        rig.up(1, 30);

        assert!(rig.commands().is_empty());
    }

    #[test]
    fn test_abort_is_silent_and_cancels_timer() {
        let mut rig = Rig::new();
        rig.down(1, 0.0, 0.0, 0);
        rig.trackpad.pointer_abort(1, &mut rig.timers);
        rig.advance(10_000);

        assert!(rig.commands().is_empty());
        assert!(rig.trackpad.sessions().is_empty());
    }

    #[test]
    fn test_scroll_mode_single_pointer() {
        let mut rig = Rig::new();
        assert_eq!(rig.trackpad.toggle_mode(), TrackpadMode::Scroll);

        rig.down(1, 0.0, 0.0, 0);
        rig.moved(1, 0.0, -5.0, 10);
        rig.moved(1, 0.0, -6.0, 20);
        rig.moved(1, 4.0, -6.0, 30);

        assert_eq!(
            rig.commands(),
            vec![
                Command::Scroll { dx: 0, dy: 3 },
                Command::Scroll { dx: 2, dy: 0 },
            ]
        );
        assert_eq!(rig.trackpad.toggle_mode(), TrackpadMode::Move);
    }

    #[test]
    fn test_stale_long_click() {
        let mut rig = Rig::new();
        rig.down(1, 0.0, 0.0, 0);
        let stale = TimerScheduler::<()>::new().schedule(0, 1, ());

        let result = rig.trackpad.fire_long_click(1, stale, &mut rig.transport);
        assert!(matches!(result, Err(EngineError::StaleTimer(_))));
        assert!(rig.commands().is_empty());
    }
}
