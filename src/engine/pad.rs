//! Remote Pad Coordinator
//!
//! Owns the trackpad, the action dispatcher, the shared timer queue and the
//! outbound transport. All pointer input and all timer firings enter here, so
//! the engine is driven from a single logical thread.
//!
//! ```text
//!   PadEvent ──> fire_due(t) ──> route by target ──┬─> Trackpad
//!                                                 └─> ActionDispatcher
//!                                                          │
//!   TimerScheduler<TimerKind> <── schedule / cancel ───────┘
//!                                                          │
//!                              Metered<T: CommandTransport> <┘
//! ```
//!
//! Every event carries its own timestamp. Timers due at or before that
//! timestamp fire before the event is handled.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::engine::dispatcher::ActionDispatcher;
use crate::engine::element::ElementKey;
use crate::engine::error::{report, Result};
use crate::engine::session::{PointerId, Position};
use crate::engine::timer::{Millis, TimerScheduler};
use crate::engine::trackpad::{Trackpad, TrackpadMode};
use crate::engine::transport::{Command, CommandTransport, HapticKind};
use crate::utils::metrics::{metric_names, MetricsCollector, MetricsSnapshot};

/// Timer payloads shared by every surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Trackpad long click for one pointer
    LongClick {
        /// Pointer holding still
        pointer: PointerId,
    },
    /// Two-pointer scroll repeat
    ScrollRepeat,
    /// Element long press
    LongPress {
        /// Pressed element
        element: ElementKey,
    },
    /// Element auto-repeat
    Repeat {
        /// Repeating element
        element: ElementKey,
    },
}

/// Pointer lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerPhase {
    /// Pointer touched down
    Down,
    /// Pointer moved
    Move,
    /// Pointer lifted
    Up,
    /// Platform cancelled the pointer
    Cancel,
    /// Pointer slid off its target
    Leave,
}

/// Surface a pointer event is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerTarget {
    /// The trackpad surface
    Trackpad,
    /// A keyboard or button element by id
    Element(String),
}

/// Pointer event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Pointer identifier
    pub pointer_id: PointerId,
    /// Addressed surface
    pub target: PointerTarget,
    /// Lifecycle phase
    pub phase: PointerPhase,
    /// Position on the surface
    #[serde(flatten)]
    pub position: Position,
    /// Event time
    pub timestamp_ms: Millis,
}

/// Input accepted by the pad
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PadEvent {
    /// Pointer input
    Pointer(PointerEvent),
    /// Ambient mode change
    Mode {
        /// New mode
        mode: String,
        /// Event time
        timestamp_ms: Millis,
    },
    /// Sensor state change
    Sensor {
        /// Sensor name
        sensor: String,
        /// Sensor state
        on: bool,
        /// Event time
        timestamp_ms: Millis,
    },
}

impl PadEvent {
    /// Event time
    pub fn timestamp_ms(&self) -> Millis {
        match self {
            PadEvent::Pointer(event) => event.timestamp_ms,
            PadEvent::Mode { timestamp_ms, .. } | PadEvent::Sensor { timestamp_ms, .. } => {
                *timestamp_ms
            }
        }
    }

    /// Restamp the event
    pub fn set_timestamp_ms(&mut self, at: Millis) {
        match self {
            PadEvent::Pointer(event) => event.timestamp_ms = at,
            PadEvent::Mode { timestamp_ms, .. } | PadEvent::Sensor { timestamp_ms, .. } => {
                *timestamp_ms = at
            }
        }
    }
}

/// Transport wrapper counting outbound traffic
struct Metered<'a, T> {
    inner: &'a mut T,
    metrics: &'a MetricsCollector,
}

impl<T: CommandTransport> CommandTransport for Metered<'_, T> {
    fn send(&mut self, command: Command) {
        trace!("Command: {:?}", command);
        self.metrics.increment_counter(metric_names::COMMANDS_SENT, 1);
        self.metrics
            .increment_counter(&metric_names::command_counter(command.kind()), 1);
        self.inner.send(command);
    }

    fn haptic(&mut self, kind: HapticKind) {
        self.metrics.increment_counter(metric_names::HAPTICS_REQUESTED, 1);
        self.inner.haptic(kind);
    }
}

/// Remote pad engine
pub struct RemotePad<T: CommandTransport> {
    trackpad: Trackpad,
    dispatcher: ActionDispatcher,
    timers: TimerScheduler<TimerKind>,
    transport: T,
    metrics: Arc<MetricsCollector>,
}

impl<T: CommandTransport> RemotePad<T> {
    /// Assemble a pad from its surfaces
    pub fn new(trackpad: Trackpad, dispatcher: ActionDispatcher, transport: T) -> Self {
        Self {
            trackpad,
            dispatcher,
            timers: TimerScheduler::new(),
            transport,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Share an existing metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Handle one event, firing due timers first
    pub fn handle_event(&mut self, event: PadEvent) -> Result<()> {
        let now = event.timestamp_ms();
        self.fire_due(now);
        self.metrics.increment_counter(metric_names::EVENTS_RECEIVED, 1);

        let result = match event {
            PadEvent::Pointer(pointer) => self.handle_pointer(pointer),
            PadEvent::Mode { mode, .. } => {
                self.dispatcher.set_mode(mode);
                Ok(())
            }
            PadEvent::Sensor { sensor, on, .. } => {
                self.dispatcher.set_sensor(sensor, on);
                Ok(())
            }
        };

        if result.is_err() {
            self.metrics.increment_counter(metric_names::EVENT_ERRORS, 1);
        }
        self.update_gauges();
        result
    }

    /// Handle one pointer event. Due timers must already have fired.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Result<()> {
        let PointerEvent {
            pointer_id,
            target,
            phase,
            position,
            timestamp_ms: now,
        } = event;
        if phase == PointerPhase::Up {
            self.record_duration(pointer_id, &target, now);
        }
        let mut out = Metered {
            inner: &mut self.transport,
            metrics: &self.metrics,
        };

        match target {
            PointerTarget::Trackpad => {
                match phase {
                    PointerPhase::Down => {
                        self.trackpad
                            .pointer_down(pointer_id, position, now, &mut self.timers)
                    }
                    PointerPhase::Move => self.trackpad.pointer_move(
                        pointer_id,
                        position,
                        now,
                        &mut self.timers,
                        &mut out,
                    ),
                    PointerPhase::Up => {
                        self.trackpad
                            .pointer_up(pointer_id, now, &mut self.timers, &mut out)
                    }
                    PointerPhase::Cancel | PointerPhase::Leave => {
                        self.trackpad.pointer_abort(pointer_id, &mut self.timers)
                    }
                }
                Ok(())
            }
            PointerTarget::Element(element) => {
                let result = match phase {
                    PointerPhase::Down => {
                        self.dispatcher
                            .press(&element, pointer_id, now, &mut self.timers, &mut out)
                    }
                    PointerPhase::Move => Ok(()),
                    PointerPhase::Up => {
                        self.dispatcher
                            .release(&element, pointer_id, &mut self.timers, &mut out)
                    }
                    PointerPhase::Cancel | PointerPhase::Leave => {
                        self.dispatcher
                            .abort(&element, pointer_id, &mut self.timers, &mut out)
                    }
                };

                if self.dispatcher.take_scroll_toggle() {
                    self.trackpad.toggle_mode();
                }
                result
            }
        }
    }

    /// Fire every timer due at or before `now`. Returns the number fired.
    pub fn fire_due(&mut self, now: Millis) -> usize {
        let mut fired_count = 0;

        while let Some(fired) = self.timers.pop_due(now) {
            fired_count += 1;
            self.metrics.increment_counter(metric_names::TIMERS_FIRED, 1);
            trace!("Timer {:?} due at {}", fired.payload, fired.deadline);

            let mut out = Metered {
                inner: &mut self.transport,
                metrics: &self.metrics,
            };
            let at = fired.deadline;
            let result = match fired.payload {
                TimerKind::LongClick { pointer } => {
                    self.trackpad.fire_long_click(pointer, fired.handle, &mut out)
                }
                TimerKind::ScrollRepeat => {
                    self.trackpad
                        .fire_scroll_repeat(fired.handle, at, &mut self.timers, &mut out)
                }
                TimerKind::LongPress { element } => self.dispatcher.fire_long_press(
                    element,
                    fired.handle,
                    at,
                    &mut self.timers,
                    &mut out,
                ),
                TimerKind::Repeat { element } => self.dispatcher.fire_repeat(
                    element,
                    fired.handle,
                    at,
                    &mut self.timers,
                    &mut out,
                ),
            };

            if let Err(e) = result {
                self.metrics.increment_counter(metric_names::TIMERS_STALE, 1);
                report(&e);
            }
        }

        if fired_count > 0 {
            self.update_gauges();
        }
        fired_count
    }

    /// Earliest pending deadline
    pub fn next_deadline(&mut self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    /// Set the ambient mode
    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.dispatcher.set_mode(mode);
    }

    /// Set a sensor state
    pub fn set_sensor(&mut self, sensor: impl Into<String>, on: bool) {
        self.dispatcher.set_sensor(sensor, on);
    }

    /// Current trackpad mode
    pub fn trackpad_mode(&self) -> TrackpadMode {
        self.trackpad.mode()
    }

    /// Current modifier state label
    pub fn modifier_label(&self) -> &str {
        self.dispatcher.modifiers().label()
    }

    /// Trackpad surface
    pub fn trackpad(&self) -> &Trackpad {
        &self.trackpad
    }

    /// Action dispatcher
    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// Outbound transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Outbound transport (mutable)
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Pending timer count
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Shared metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Snapshot of engine statistics
    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Abort every active press and pointer session
    pub fn reset(&mut self) {
        debug!("Resetting pad");
        let mut out = Metered {
            inner: &mut self.transport,
            metrics: &self.metrics,
        };
        self.dispatcher.abort_all(&mut self.timers, &mut out);
        self.trackpad.reset(&mut self.timers);
        self.timers.clear();
        self.update_gauges();
    }

    fn record_duration(&self, pointer_id: PointerId, target: &PointerTarget, now: Millis) {
        let started_at = match target {
            PointerTarget::Trackpad => self
                .trackpad
                .sessions()
                .get(pointer_id)
                .map(|s| s.start_time),
            PointerTarget::Element(element) => self
                .dispatcher
                .elements()
                .resolve(element)
                .ok()
                .and_then(|key| self.dispatcher.elements().state(key))
                .filter(|state| state.reference_pointer == Some(pointer_id))
                .map(|state| state.started_at),
        };
        if let Some(started_at) = started_at {
            self.metrics.record_histogram(
                metric_names::GESTURE_DURATION_MS,
                now.saturating_sub(started_at) as f64,
            );
        }
    }

    fn update_gauges(&self) {
        self.metrics.set_gauge(
            metric_names::POINTERS_ACTIVE,
            self.trackpad.sessions().len() as f64,
        );
        self.metrics
            .set_gauge(metric_names::TIMERS_PENDING, self.timers.len() as f64);
    }
}

impl<T: CommandTransport + std::fmt::Debug> std::fmt::Debug for RemotePad<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePad")
            .field("trackpad", &self.trackpad)
            .field("dispatcher", &self.dispatcher)
            .field("pending_timers", &self.timers.len())
            .field("transport", &self.transport)
            .finish()
    }
}
