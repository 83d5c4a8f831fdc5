//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::element::{CalloutConfig, ElementConfig, RepeatConfig};
use crate::engine::modifier::ModifierTable;

/// Element press timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Hold time before a long-press override or callout fires
    pub long_press_delay_ms: u64,

    /// Override auto-repeat
    pub repeat: RepeatConfig,

    /// Scroll zone auto-repeat
    pub scroll_repeat: RepeatConfig,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            long_press_delay_ms: 500,
            repeat: RepeatConfig {
                initial_ms: 500,
                decrement_ms: 50,
                floor_ms: 350,
            },
            scroll_repeat: RepeatConfig {
                initial_ms: 350,
                decrement_ms: 25,
                floor_ms: 75,
            },
        }
    }
}

/// Trackpad thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackpadSettings {
    /// Hold time separating short and long clicks
    pub long_click_delay_ms: u64,

    /// Horizontal move detection threshold (pixels)
    pub move_threshold_x: f64,

    /// Vertical move detection threshold (pixels)
    pub move_threshold_y: f64,

    /// Horizontal scroll threshold (pixels)
    pub scroll_threshold_x: f64,

    /// Vertical scroll threshold (pixels)
    pub scroll_threshold_y: f64,

    /// Two-pointer scroll repeat
    pub scroll_repeat: RepeatConfig,
}

impl Default for TrackpadSettings {
    fn default() -> Self {
        Self {
            long_click_delay_ms: 500,
            move_threshold_x: 2.0,
            move_threshold_y: 2.0,
            scroll_threshold_x: 10.0,
            scroll_threshold_y: 10.0,
            scroll_repeat: RepeatConfig {
                initial_ms: 350,
                decrement_ms: 25,
                floor_ms: 75,
            },
        }
    }
}

/// Keyboard modifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Built-in table ("android" or "windows"), ignored when `table` is set
    pub preset: String,

    /// Custom transition table
    pub table: Option<ModifierTable>,

    /// Codes that only drive the state machine and are never sent
    /// (defaults depend on the preset)
    pub virtual_codes: Option<Vec<String>>,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            preset: "android".to_string(),
            table: None,
            virtual_codes: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for daily rolling log files
    pub log_dir: Option<PathBuf>,

    /// Log the metrics summary at debug level when a run ends
    pub metrics: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            metrics: true,
        }
    }
}

/// Built-in element layout: one alphabetic keyboard page, an alternate page
/// of digits, editing keys, media keys, mouse buttons and scroll zones.
pub(crate) fn default_elements() -> Vec<ElementConfig> {
    const DIGITS: &str = "1234567890";
    const SYMBOLS: &str = "!@#$%^&*()";
    let mut elements = Vec::new();

    for (i, letter) in ('a'..='z').enumerate() {
        let lower = letter.to_string();
        let upper = letter.to_ascii_uppercase().to_string();
        let mut labels = vec![("normal", lower.clone()), ("shift", upper)];
        if let (Some(digit), Some(symbol)) = (DIGITS.chars().nth(i), SYMBOLS.chars().nth(i)) {
            labels.push(("alt1", digit.to_string()));
            labels.push(("alt2", symbol.to_string()));
        }
        let labels: Vec<(&str, &str)> = labels.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let mut element = ElementConfig::character(
            format!("key-{}", lower),
            format!("KEY_{}", letter.to_ascii_uppercase()),
            &labels,
        );
        if letter == 'e' {
            element.callout = Some(CalloutConfig {
                chars: ["é", "è", "ê", "ë"].iter().map(|c| c.to_string()).collect(),
                modes: vec!["normal".to_string(), "shift".to_string()],
            });
        }
        elements.push(element);
    }

    elements.push(ElementConfig::character(
        "key-space",
        "KEY_SPACE",
        &[("normal", " ")],
    ));
    elements.push(ElementConfig::new("key-shift", "MOD_LEFT_SHIFT"));
    elements.push(ElementConfig::new("key-mode", "KEY_MODE"));
    elements.push(ElementConfig::new("key-enter", "KEY_ENTER"));
    elements.push(ElementConfig {
        repeat: Some(RepeatConfig {
            initial_ms: 500,
            decrement_ms: 50,
            floor_ms: 100,
        }),
        ..ElementConfig::new("key-backspace", "KEY_BACKSPACE")
    });

    for (id, code) in [
        ("volume-up", "CON_VOLUME_UP"),
        ("volume-down", "CON_VOLUME_DOWN"),
        ("mute", "CON_MUTE"),
        ("play-pause", "CON_PLAY_PAUSE"),
        ("button-left", "BTN_LEFT"),
        ("button-right", "BTN_RIGHT"),
        ("scroll-up", "SCROLL_UP"),
        ("scroll-down", "SCROLL_DOWN"),
        ("scroll-left", "SCROLL_LEFT"),
        ("scroll-right", "SCROLL_RIGHT"),
        ("scroll-toggle", crate::engine::codes::SCROLL_TOGGLE_CODE),
    ] {
        elements.push(ElementConfig::new(id, code));
    }

    elements
}
