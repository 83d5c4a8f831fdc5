//! Remote Input Engine
//!
//! Turns raw pointer input on a touch surface into remote-control commands.
//!
//! # Architecture
//!
//! ```text
//! RemotePad
//!   ├─> Trackpad
//!   │     ├─> PointerSessionTable   (one session per contacting pointer)
//!   │     └─> GestureClassifier     (click / long click / move / scroll)
//!   ├─> ActionDispatcher
//!   │     ├─> ElementTable          (element configs + press state)
//!   │     ├─> OverrideConfig list   (short / long / repeat overrides)
//!   │     ├─> CodeClassifier        (KEY_ / MOD_ / CON_ / BTN_ / SCROLL_ / virtual)
//!   │     └─> ModifierStateMachine  (table-driven keyboard states)
//!   ├─> TimerScheduler<TimerKind>   (shared one-shot timers)
//!   └─> CommandTransport            (commands + haptic requests out)
//! ```
//!
//! The engine is single-threaded and clock-agnostic: callers pass the current
//! time with every call and drive timers through [`RemotePad::fire_due`].
//! [`crate::driver`] runs it against the tokio clock and [`crate::replay`]
//! against a virtual one.

pub mod classifier;
pub mod codes;
pub mod dispatcher;
pub mod element;
pub mod error;
pub mod modifier;
pub mod pad;
pub mod session;
pub mod timer;
pub mod trackpad;
pub mod transport;

pub use classifier::{ClassifierConfig, GestureClassifier, GestureIntent, ScrollDirection};
pub use codes::{CodeCategory, CodeClassifier, SCROLL_TOGGLE_CODE};
pub use dispatcher::{ActionDispatcher, DispatchTiming};
pub use element::{
    ActionTarget, CalloutConfig, ElementConfig, ElementKey, ElementTable, OverrideAction,
    OverrideConfig, OverrideSlot, RepeatConfig, SAME_AS_OTHER,
};
pub use error::{EngineError, ErrorSeverity, Result};
pub use modifier::{KeyEdge, ModifierStateMachine, ModifierTable, Predicate, StateDef, Transition};
pub use pad::{PadEvent, PointerEvent, PointerPhase, PointerTarget, RemotePad, TimerKind};
pub use session::{MoveThresholds, PointerId, PointerSession, PointerSessionTable, Position};
pub use timer::{Millis, RepeatSchedule, TimerHandle, TimerScheduler};
pub use trackpad::{Trackpad, TrackpadConfig, TrackpadMode};
pub use transport::{
    ChannelTransport, Command, CommandTransport, HapticKind, MouseButton, RecordingTransport,
    ServiceAction, TransportEvent,
};
