//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments
//!
//! # Example
//!
//! ```toml
//! mode = "normal"
//!
//! [timing]
//! long_press_delay_ms = 500
//! repeat = { initial_ms = 500, decrement_ms = 50, floor_ms = 350 }
//!
//! [trackpad]
//! move_threshold_x = 2.0
//! scroll_threshold_y = 10.0
//!
//! [keyboard]
//! preset = "android"
//!
//! [[elements]]
//! id = "power"
//! code = "CON_POWER"
//!
//! [[overrides]]
//! element = "power"
//! mode = "media"
//! short = "CON_PLAY_PAUSE"
//! long = { action = "CON_POWER", repeat = false }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::warn;

use crate::engine::classifier::ClassifierConfig;
use crate::engine::codes::CodeClassifier;
use crate::engine::dispatcher::{ActionDispatcher, DispatchTiming};
use crate::engine::element::{ElementConfig, ElementTable, OverrideConfig, RepeatConfig};
use crate::engine::error::EngineError;
use crate::engine::modifier::{ModifierStateMachine, ModifierTable};
use crate::engine::pad::RemotePad;
use crate::engine::session::MoveThresholds;
use crate::engine::trackpad::{Trackpad, TrackpadConfig};
use crate::engine::transport::CommandTransport;

pub mod types;

pub use types::{KeyboardConfig, LoggingConfig, TimingConfig, TrackpadSettings};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Initial ambient mode
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Element press timing
    #[serde(default)]
    pub timing: TimingConfig,
    /// Trackpad thresholds
    #[serde(default)]
    pub trackpad: TrackpadSettings,
    /// Keyboard modifier states
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    /// Element layout
    #[serde(default = "types::default_elements")]
    pub elements: Vec<ElementConfig>,
    /// Action overrides
    #[serde(default)]
    pub overrides: Vec<OverrideConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_mode() -> String {
    "normal".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration without validating it
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Create default configuration
    pub fn default_config() -> Result<Self> {
        Ok(Self::default())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.timing.long_press_delay_ms == 0 {
            return Err(invalid("timing.long_press_delay_ms must be non-zero".to_string()));
        }
        if self.trackpad.long_click_delay_ms == 0 {
            return Err(invalid("trackpad.long_click_delay_ms must be non-zero".to_string()));
        }

        validate_repeat("timing.repeat", &self.timing.repeat)?;
        validate_repeat("timing.scroll_repeat", &self.timing.scroll_repeat)?;
        validate_repeat("trackpad.scroll_repeat", &self.trackpad.scroll_repeat)?;
        for element in &self.elements {
            if let Some(repeat) = &element.repeat {
                validate_repeat(&format!("element {} repeat", element.id), repeat)?;
            }
        }

        for (name, value) in [
            ("trackpad.move_threshold_x", self.trackpad.move_threshold_x),
            ("trackpad.move_threshold_y", self.trackpad.move_threshold_y),
            ("trackpad.scroll_threshold_x", self.trackpad.scroll_threshold_x),
            ("trackpad.scroll_threshold_y", self.trackpad.scroll_threshold_y),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        self.modifier_table()?
            .validate()
            .context("Invalid keyboard configuration")?;

        let mut ids = HashSet::new();
        for element in &self.elements {
            if !ids.insert(element.id.as_str()) {
                return Err(EngineError::DuplicateElement(element.id.clone()).into());
            }
        }

        let codes = self.code_classifier()?;
        for element in &self.elements {
            if let Err(e) = codes.classify(&element.code) {
                warn!("Element {} will be ignored: {}", element.id, e);
            }
        }

        for config in &self.overrides {
            if !ids.contains(config.element.as_str()) {
                return Err(invalid(format!(
                    "override names unknown element {}",
                    config.element
                )));
            }
            if let Err(e) = config.resolve() {
                warn!("{}; the element keeps its default action", e);
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!("unknown log level {}", self.logging.level)));
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, mode: Option<String>, log_dir: Option<PathBuf>) -> Self {
        if let Some(mode) = mode {
            self.mode = mode;
        }
        if let Some(log_dir) = log_dir {
            self.logging.log_dir = Some(log_dir);
        }
        self
    }

    /// Modifier table from the preset or the custom table
    pub fn modifier_table(&self) -> Result<ModifierTable> {
        match &self.keyboard.table {
            Some(table) => Ok(table.clone()),
            None => ModifierTable::preset(&self.keyboard.preset)
                .with_context(|| format!("Unknown keyboard preset: {}", self.keyboard.preset)),
        }
    }

    /// Code classifier with the configured virtual codes
    pub fn code_classifier(&self) -> Result<CodeClassifier> {
        let virtual_codes = match &self.keyboard.virtual_codes {
            Some(codes) => codes.clone(),
            None if self.keyboard.table.is_none() && self.keyboard.preset == "android" => {
                vec!["KEY_MODE".to_string(), "MOD_LEFT_SHIFT".to_string()]
            }
            None => Vec::new(),
        };
        Ok(CodeClassifier::new(virtual_codes))
    }

    /// Trackpad settings as engine configuration
    pub fn trackpad_config(&self) -> TrackpadConfig {
        TrackpadConfig {
            move_thresholds: MoveThresholds {
                x: self.trackpad.move_threshold_x,
                y: self.trackpad.move_threshold_y,
            },
            classifier: ClassifierConfig {
                long_click_delay_ms: self.trackpad.long_click_delay_ms,
                scroll_threshold_x: self.trackpad.scroll_threshold_x,
                scroll_threshold_y: self.trackpad.scroll_threshold_y,
            },
            scroll_repeat: self.trackpad.scroll_repeat.into(),
        }
    }

    /// Element timing as engine configuration
    pub fn dispatch_timing(&self) -> DispatchTiming {
        DispatchTiming {
            long_press_delay_ms: self.timing.long_press_delay_ms,
            repeat: self.timing.repeat.into(),
            scroll_repeat: self.timing.scroll_repeat.into(),
        }
    }

    /// Build the action dispatcher
    pub fn build_dispatcher(&self) -> Result<ActionDispatcher> {
        let elements =
            ElementTable::new(self.elements.clone()).context("Failed to build element table")?;
        let modifiers = ModifierStateMachine::new(self.modifier_table()?)
            .context("Failed to build keyboard state machine")?;

        let mut dispatcher = ActionDispatcher::new(
            elements,
            self.overrides.clone(),
            self.code_classifier()?,
            modifiers,
            self.dispatch_timing(),
        );
        dispatcher.set_mode(self.mode.clone());
        Ok(dispatcher)
    }

    /// Build a pad sending to `transport`
    pub fn build_pad<T: CommandTransport>(&self, transport: T) -> Result<RemotePad<T>> {
        Ok(RemotePad::new(
            Trackpad::new(self.trackpad_config()),
            self.build_dispatcher()?,
            transport,
        ))
    }
}

fn validate_repeat(name: &str, repeat: &RepeatConfig) -> Result<()> {
    if repeat.initial_ms == 0 || repeat.floor_ms == 0 {
        return Err(invalid(format!("{}: repeat delays must be non-zero", name)));
    }
    if repeat.floor_ms > repeat.initial_ms {
        return Err(invalid(format!(
            "{}: floor_ms ({}) cannot be greater than initial_ms ({})",
            name, repeat.floor_ms, repeat.initial_ms
        )));
    }
    Ok(())
}

fn invalid(message: String) -> anyhow::Error {
    EngineError::InvalidConfig(message).into()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: default_mode(),
            timing: TimingConfig::default(),
            trackpad: TrackpadSettings::default(),
            keyboard: KeyboardConfig::default(),
            elements: types::default_elements(),
            overrides: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}
