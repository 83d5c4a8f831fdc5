//! # lamco-remote-pad
//!
//! Gesture engine for a remote-control input surface.
//!
//! A touch surface (trackpad area plus on-screen keys, media buttons and
//! scroll zones) produces pointer events. The engine turns them into
//! high-level commands for a remote host: cursor moves, clicks, scroll
//! steps, key presses and typed characters.
//!
//! # Architecture
//!
//! ```text
//! lamco-remote-pad
//!   ├─> engine::RemotePad        (event entry point, owns the timers)
//!   │     ├─> Trackpad           (pointer sessions + gesture classifier)
//!   │     └─> ActionDispatcher   (element presses, overrides, modifiers)
//!   ├─> driver::EngineDriver     (tokio task, real clock)
//!   ├─> replay                   (JSON-lines scripts, virtual clock)
//!   └─> config::Config           (TOML layout, timing, keyboard table)
//! ```
//!
//! # Data Flow
//!
//! **Trackpad:** PointerEvent → Trackpad → GestureClassifier → Command
//!
//! **Keys:** PointerEvent → ActionDispatcher → ModifierStateMachine → Command
//!
//! **Timers:** TimerScheduler → RemotePad::fire_due → long press / repeat

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Engine configuration
pub mod config;

/// Realtime tokio driver
pub mod driver;

/// Gesture engine core
pub mod engine;

/// Event script replay
pub mod replay;

/// Metrics and error formatting
pub mod utils;
