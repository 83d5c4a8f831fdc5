//! Command Transport
//!
//! Outbound vocabulary of the engine. Commands are fire-and-forget: the engine
//! never awaits or retries a send, delivery failures belong to the transport.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    /// Left button
    Left,
    /// Middle button
    Middle,
    /// Right button
    Right,
}

/// Configured action passed through to the host untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAction {
    /// Service or action name understood by the host
    pub service: String,
    /// Arbitrary action payload
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Semantic command sent to the remote side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Press and hold a keyboard key or modifier
    PressKey {
        /// `KEY_` or `MOD_` code
        code: String,
    },
    /// Release a held keyboard key or modifier
    ReleaseKey {
        /// `KEY_` or `MOD_` code
        code: String,
    },
    /// Press and hold a consumer control
    PressConsumer {
        /// `CON_` code
        code: String,
    },
    /// Release a held consumer control
    ReleaseConsumer {
        /// `CON_` code
        code: String,
    },
    /// Type literal characters
    TapChars {
        /// Text to type
        text: String,
    },
    /// Relative cursor movement
    MoveCursor {
        /// Horizontal delta
        dx: i32,
        /// Vertical delta
        dy: i32,
    },
    /// Scroll step
    Scroll {
        /// Horizontal amount
        dx: i32,
        /// Vertical amount
        dy: i32,
    },
    /// Press and hold a mouse button
    PressButton {
        /// Button
        button: MouseButton,
    },
    /// Release a held mouse button
    ReleaseButton {
        /// Button
        button: MouseButton,
    },
    /// Single click
    Click {
        /// Button
        button: MouseButton,
    },
    /// Double click (long click on the trackpad)
    DoubleClick {
        /// Button
        button: MouseButton,
    },
    /// Run a configured host action
    TriggerAction {
        /// Action
        action: ServiceAction,
    },
}

impl Command {
    /// Short stable name used for statistics
    pub fn kind(&self) -> &'static str {
        match self {
            Command::PressKey { .. } => "press_key",
            Command::ReleaseKey { .. } => "release_key",
            Command::PressConsumer { .. } => "press_consumer",
            Command::ReleaseConsumer { .. } => "release_consumer",
            Command::TapChars { .. } => "tap_chars",
            Command::MoveCursor { .. } => "move_cursor",
            Command::Scroll { .. } => "scroll",
            Command::PressButton { .. } => "press_button",
            Command::ReleaseButton { .. } => "release_button",
            Command::Click { .. } => "click",
            Command::DoubleClick { .. } => "double_click",
            Command::TriggerAction { .. } => "trigger_action",
        }
    }
}

/// Haptic feedback strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HapticKind {
    /// Move and scroll steps
    Short,
    /// Clicks and key presses
    Normal,
    /// Long clicks and long presses
    Long,
}

/// Anything the engine emitted, in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportEvent {
    /// Command
    Command(Command),
    /// Haptic request
    Haptic(HapticKind),
}

/// Outbound collaborator
#[cfg_attr(test, mockall::automock)]
pub trait CommandTransport {
    /// Deliver a command
    fn send(&mut self, command: Command);

    /// Request haptic feedback
    fn haptic(&mut self, kind: HapticKind);
}

/// Transport that keeps everything it receives
#[derive(Debug, Default)]
pub struct RecordingTransport {
    events: Vec<TransportEvent>,
}

impl RecordingTransport {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far
    pub fn events(&self) -> &[TransportEvent] {
        &self.events
    }

    /// Commands received so far, haptics skipped
    pub fn commands(&self) -> Vec<Command> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Command(command) => Some(command.clone()),
                TransportEvent::Haptic(_) => None,
            })
            .collect()
    }

    /// Haptic requests received so far
    pub fn haptics(&self) -> Vec<HapticKind> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Haptic(kind) => Some(*kind),
                TransportEvent::Command(_) => None,
            })
            .collect()
    }

    /// Take and clear everything received so far
    pub fn drain(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.events)
    }
}

impl CommandTransport for RecordingTransport {
    fn send(&mut self, command: Command) {
        self.events.push(TransportEvent::Command(command));
    }

    fn haptic(&mut self, kind: HapticKind) {
        self.events.push(TransportEvent::Haptic(kind));
    }
}

/// Transport forwarding into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ChannelTransport {
    /// Create a transport and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CommandTransport for ChannelTransport {
    fn send(&mut self, command: Command) {
        if self.tx.send(TransportEvent::Command(command)).is_err() {
            debug!("Command receiver dropped, command discarded");
        }
    }

    fn haptic(&mut self, kind: HapticKind) {
        if self.tx.send(TransportEvent::Haptic(kind)).is_err() {
            debug!("Command receiver dropped, haptic discarded");
        }
    }
}
