//! Element Side Table
//!
//! Interactive elements (keys, buttons, scroll zones) are addressed by a
//! synthetic [`ElementKey`] assigned at registration. The table keeps the
//! static [`ElementConfig`] and the runtime [`PressState`] side by side, so
//! handlers look both up by key instead of hanging data off the UI element.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::engine::error::{EngineError, Result};
use crate::engine::session::PointerId;
use crate::engine::timer::{Millis, RepeatSchedule, TimerHandle};
use crate::engine::transport::ServiceAction;

/// Slot marker meaning "use the other slot's action"
pub const SAME_AS_OTHER: &str = "same";

/// Label key used when the current modifier label has no entry
pub const DEFAULT_LABEL: &str = "normal";

/// Synthetic element identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey(usize);

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Auto-repeat timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatConfig {
    /// Delay before the first repeat
    pub initial_ms: Millis,
    /// Decrement per repeat
    pub decrement_ms: Millis,
    /// Minimum delay
    pub floor_ms: Millis,
}

impl From<RepeatConfig> for RepeatSchedule {
    fn from(config: RepeatConfig) -> Self {
        RepeatSchedule {
            initial_ms: config.initial_ms,
            decrement_ms: config.decrement_ms,
            floor_ms: config.floor_ms,
        }
    }
}

/// Long-press callout (extended characters popup)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalloutConfig {
    /// Characters offered by the callout
    #[serde(default)]
    pub chars: Vec<String>,
    /// Modifier labels in which the callout may open (empty: all)
    #[serde(default)]
    pub modes: Vec<String>,
}

impl CalloutConfig {
    /// Whether the callout may open under the given modifier label
    pub fn allowed_in(&self, label: &str) -> bool {
        self.modes.is_empty() || self.modes.iter().any(|m| m == label)
    }
}

/// Static element configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementConfig {
    /// Unique element name
    pub id: String,
    /// Element code (`KEY_A`, `CON_MUTE`, `SCROLL_UP`, ...)
    pub code: String,
    /// Special keys are held on the remote side instead of typed as characters
    #[serde(default)]
    pub special: bool,
    /// Characters typed on release, keyed by modifier label
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Long-press callout
    #[serde(default)]
    pub callout: Option<CalloutConfig>,
    /// Auto-repeat of the default action while held
    #[serde(default)]
    pub repeat: Option<RepeatConfig>,
    /// First press latches the code, second press releases it
    #[serde(default)]
    pub toggle: bool,
}

impl ElementConfig {
    /// Minimal special element with a code
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            special: true,
            labels: HashMap::new(),
            callout: None,
            repeat: None,
            toggle: false,
        }
    }

    /// Character element typing `labels` by modifier label
    pub fn character(id: impl Into<String>, code: impl Into<String>, labels: &[(&str, &str)]) -> Self {
        Self {
            special: false,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Self::new(id, code)
        }
    }

    /// Whether release types a character instead of releasing a held code
    pub fn types_characters(&self) -> bool {
        !self.special && !self.labels.is_empty()
    }

    /// Text typed for `label`, falling back to the default label
    pub fn text_for(&self, label: &str) -> Option<&str> {
        self.labels
            .get(label)
            .or_else(|| self.labels.get(DEFAULT_LABEL))
            .map(String::as_str)
            .filter(|text| !text.is_empty())
    }
}

/// Target of an override action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionTarget {
    /// Tap an element code
    Code(String),
    /// Pass a host action through
    Service(ServiceAction),
}

/// Override action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideAction {
    /// Unconditional action
    #[serde(default)]
    pub action: Option<ActionTarget>,
    /// Sensor selecting between the conditional actions
    #[serde(default)]
    pub sensor: Option<String>,
    /// Action when the sensor is on
    #[serde(default)]
    pub action_when_on: Option<ActionTarget>,
    /// Action when the sensor is off
    #[serde(default)]
    pub action_when_off: Option<ActionTarget>,
    /// Repeat while held
    #[serde(default)]
    pub repeat: bool,
}

impl OverrideAction {
    /// Unconditional code tap
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            action: Some(ActionTarget::Code(code.into())),
            ..Self::default()
        }
    }

    /// Builder: repeat while held
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Target for the given sensor states
    pub fn target(&self, sensors: &HashMap<String, bool>) -> Option<&ActionTarget> {
        match &self.sensor {
            Some(sensor) => {
                let on = sensors.get(sensor).copied().unwrap_or(false);
                let conditional = if on {
                    self.action_when_on.as_ref()
                } else {
                    self.action_when_off.as_ref()
                };
                conditional.or(self.action.as_ref())
            }
            None => self.action.as_ref(),
        }
    }
}

/// Configured override slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideSlot {
    /// `"same"` marker or a code shorthand
    Shorthand(String),
    /// Full action
    Action(OverrideAction),
}

impl OverrideSlot {
    fn is_same_marker(&self) -> bool {
        matches!(self, OverrideSlot::Shorthand(s) if s == SAME_AS_OTHER)
    }

    fn into_action(self) -> OverrideAction {
        match self {
            OverrideSlot::Shorthand(code) => OverrideAction::code(code),
            OverrideSlot::Action(action) => action,
        }
    }
}

/// Override declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideConfig {
    /// Element name
    pub element: String,
    /// Ambient mode the override applies to (absent: every mode)
    #[serde(default)]
    pub mode: Option<String>,
    /// Short-press slot
    #[serde(default)]
    pub short: Option<OverrideSlot>,
    /// Long-press slot
    #[serde(default)]
    pub long: Option<OverrideSlot>,
}

/// Override with both slots resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOverride {
    /// Short-press action
    pub short: Option<OverrideAction>,
    /// Long-press action
    pub long: Option<OverrideAction>,
}

impl ResolvedOverride {
    /// Whether the short slot repeats
    pub fn short_repeats(&self) -> bool {
        self.short.as_ref().is_some_and(|a| a.repeat)
    }

    /// Whether the long slot repeats. Short-slot repeat takes precedence.
    pub fn long_repeats(&self) -> bool {
        !self.short_repeats() && self.long.as_ref().is_some_and(|a| a.repeat)
    }

    /// Whether no slot is set
    pub fn is_empty(&self) -> bool {
        self.short.is_none() && self.long.is_none()
    }
}

impl OverrideConfig {
    /// Resolve `"same"` markers. Both slots set to the marker is an error.
    pub fn resolve(&self) -> Result<ResolvedOverride> {
        let short_same = self.short.as_ref().is_some_and(OverrideSlot::is_same_marker);
        let long_same = self.long.as_ref().is_some_and(OverrideSlot::is_same_marker);

        if short_same && long_same {
            return Err(EngineError::InvalidOverride {
                element: self.element.clone(),
            });
        }

        let short = self.short.clone().filter(|_| !short_same).map(OverrideSlot::into_action);
        let long = self.long.clone().filter(|_| !long_same).map(OverrideSlot::into_action);

        Ok(ResolvedOverride {
            short: if short_same { long.clone() } else { short.clone() },
            long: if long_same { short } else { long },
        })
    }
}

/// Timer-driven override execution of one press
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideEntry {
    /// Set once the override executed; the release becomes a no-op
    pub was_ran: bool,
    /// Timer driving the entry
    pub timer: Option<TimerHandle>,
}

/// Context captured at press time and compared at every firing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    /// Ambient mode
    pub mode: String,
    /// Modifier state id
    pub modifier_state: String,
}

/// Press lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PressPhase {
    /// Not pressed
    #[default]
    Idle,
    /// Pressed, no long-press timer
    Pressed,
    /// Long-press timer armed
    LongPressPending,
    /// Long-press override or callout fired
    LongPressFired,
}

/// Action driven by an auto-repeat chain
#[derive(Debug, Clone, PartialEq)]
pub enum RepeatAction {
    /// Default action of the element
    Default,
    /// Override action
    Override(OverrideAction),
}

/// Modifier state change to revert when a press is aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierRollback {
    /// State before the press edge
    pub before: String,
    /// State the press edge moved to
    pub after: String,
}

/// Running auto-repeat chain
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatChain {
    /// Action repeated
    pub action: RepeatAction,
    /// Delay sequence
    pub schedule: RepeatSchedule,
    /// Delay of the pending firing
    pub delay_ms: Millis,
    /// Pending firing
    pub timer: TimerHandle,
}

/// Runtime press state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PressState {
    /// Lifecycle phase
    pub phase: PressPhase,
    /// Pointer owning the press
    pub reference_pointer: Option<PointerId>,
    /// Press timestamp
    pub started_at: Millis,
    /// Context at press time
    pub snapshot: ContextSnapshot,
    /// Override resolved at press time
    pub resolved: ResolvedOverride,
    /// Timer-driven override entry
    pub entry: Option<OverrideEntry>,
    /// Long-press timer
    pub long_timer: Option<TimerHandle>,
    /// Auto-repeat chain
    pub repeat: Option<RepeatChain>,
    /// Code pressed optimistically at press time
    pub default_pressed: Option<String>,
    /// Default action deferred to release
    pub default_deferred: bool,
    /// Callout opened by long press
    pub callout_open: bool,
    /// Modifier transition made by the press edge, undone on abort
    pub modifier_rollback: Option<ModifierRollback>,
}

impl PressState {
    /// Whether a press is in progress
    pub fn is_active(&self) -> bool {
        self.phase != PressPhase::Idle
    }

    /// Whether the override already executed
    pub fn override_ran(&self) -> bool {
        self.entry.as_ref().is_some_and(|e| e.was_ran)
    }
}

/// Element configs and runtime state keyed by [`ElementKey`]
#[derive(Debug, Default)]
pub struct ElementTable {
    configs: Vec<ElementConfig>,
    states: Vec<PressState>,
    by_id: HashMap<String, ElementKey>,
}

impl ElementTable {
    /// Register elements. Duplicate ids are rejected.
    pub fn new(configs: Vec<ElementConfig>) -> Result<Self> {
        let mut table = Self::default();
        for config in configs {
            table.insert(config)?;
        }
        Ok(table)
    }

    /// Register one element
    pub fn insert(&mut self, config: ElementConfig) -> Result<ElementKey> {
        if self.by_id.contains_key(&config.id) {
            return Err(EngineError::DuplicateElement(config.id));
        }
        let key = ElementKey(self.configs.len());
        self.by_id.insert(config.id.clone(), key);
        self.configs.push(config);
        self.states.push(PressState::default());
        Ok(key)
    }

    /// Key for an element name
    pub fn resolve(&self, id: &str) -> Result<ElementKey> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::UnresolvedElement(id.to_string()))
    }

    /// Static configuration
    pub fn config(&self, key: ElementKey) -> Option<&ElementConfig> {
        self.configs.get(key.0)
    }

    /// Runtime state
    pub fn state(&self, key: ElementKey) -> Option<&PressState> {
        self.states.get(key.0)
    }

    /// Runtime state, mutable
    pub fn state_mut(&mut self, key: ElementKey) -> Option<&mut PressState> {
        self.states.get_mut(key.0)
    }

    /// Keys of elements with a press in progress
    pub fn active_keys(&self) -> Vec<ElementKey> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_active())
            .map(|(i, _)| ElementKey(i))
            .collect()
    }

    /// Number of registered elements
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Whether no element is registered
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
