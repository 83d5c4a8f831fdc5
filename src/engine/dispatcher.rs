//! Action Dispatcher
//!
//! Per-element press state machine deciding between the default action, a
//! configured override, or nothing.
//!
//! # Press Lifecycle
//!
//! ```text
//!            press                      long-press timer
//!   Idle ─────────────> Pressed ──────────────────────────> LongPressFired
//!                          │  ╲                                   │
//!                          │   ╲ (long slot / callout)            │
//!                          │    > LongPressPending ───────────────┘
//!                          │                 │
//!              release /   │                 │ release / abort
//!              abort       v                 v
//!                        Idle <──────────── Idle
//! ```
//!
//! Timer firings carry only the element key. Each firing checks that its
//! handle is still the one stored on the element and that the context
//! captured at press time still matches before it acts.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use crate::engine::codes::{CodeCategory, CodeClassifier};
use crate::engine::element::{
    ActionTarget, ContextSnapshot, ElementConfig, ElementKey, ElementTable, ModifierRollback,
    OverrideAction, OverrideConfig, OverrideEntry, PressPhase, RepeatAction, RepeatChain,
    ResolvedOverride,
};
use crate::engine::error::{report, EngineError, Result};
use crate::engine::modifier::{KeyEdge, ModifierInput, ModifierStateMachine};
use crate::engine::pad::TimerKind;
use crate::engine::session::PointerId;
use crate::engine::timer::{Millis, RepeatSchedule, TimerHandle, TimerScheduler};
use crate::engine::transport::{Command, CommandTransport, HapticKind};

/// Dispatcher timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTiming {
    /// Long-press delay
    pub long_press_delay_ms: Millis,
    /// Override auto-repeat
    pub repeat: RepeatSchedule,
    /// Scroll zone auto-repeat
    pub scroll_repeat: RepeatSchedule,
}

impl Default for DispatchTiming {
    fn default() -> Self {
        Self {
            long_press_delay_ms: 500,
            repeat: RepeatSchedule {
                initial_ms: 500,
                decrement_ms: 50,
                floor_ms: 350,
            },
            scroll_repeat: RepeatSchedule {
                initial_ms: 350,
                decrement_ms: 25,
                floor_ms: 75,
            },
        }
    }
}

enum LongPressOutcome {
    RunOverride {
        action: OverrideAction,
        repeat: bool,
    },
    OpenCallout,
    Nothing,
}

/// Action dispatcher
#[derive(Debug)]
pub struct ActionDispatcher {
    elements: ElementTable,
    overrides: Vec<OverrideConfig>,
    codes: CodeClassifier,
    modifiers: ModifierStateMachine,
    timing: DispatchTiming,
    /// Codes currently held on the remote side (plus held virtual codes)
    held: BTreeSet<String>,
    /// Codes latched by toggle elements
    latched: BTreeSet<String>,
    sensors: HashMap<String, bool>,
    mode: String,
    open_callout: Option<ElementKey>,
    scroll_toggle_requested: bool,
}

impl ActionDispatcher {
    /// Create a dispatcher
    pub fn new(
        elements: ElementTable,
        overrides: Vec<OverrideConfig>,
        codes: CodeClassifier,
        modifiers: ModifierStateMachine,
        timing: DispatchTiming,
    ) -> Self {
        for config in &overrides {
            if elements.resolve(&config.element).is_err() {
                debug!("Override for unknown element {} never applies", config.element);
            }
        }

        Self {
            elements,
            overrides,
            codes,
            modifiers,
            timing,
            held: BTreeSet::new(),
            latched: BTreeSet::new(),
            sensors: HashMap::new(),
            mode: "normal".to_string(),
            open_callout: None,
            scroll_toggle_requested: false,
        }
    }

    /// Handle a press of `element` by `pointer`
    pub fn press<T: CommandTransport>(
        &mut self,
        element: &str,
        pointer: PointerId,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) -> Result<()> {
        let key = self.elements.resolve(element)?;
        let config = self.config(key)?;

        if let Some(state) = self.elements.state(key) {
            if let Some(owner) = state.reference_pointer {
                debug!(
                    "Press on {} by pointer {} ignored, held by pointer {}",
                    config.id, pointer, owner
                );
                return Ok(());
            }
        }

        let resolved = self.resolve_override(&config.id);
        let category = match self.codes.classify(&config.code) {
            Ok(category) => Some(category),
            Err(e) => {
                report(&e);
                None
            }
        };

        if let Some(state) = self.elements.state_mut(key) {
            state.phase = PressPhase::Pressed;
            state.reference_pointer = Some(pointer);
            state.started_at = now;
            state.resolved = resolved.clone();
        }

        if let Some(short) = resolved.short.as_ref().filter(|a| a.repeat) {
            debug!("Repeating short override on {}", config.id);
            self.run_override(short, transport);
            let timer = self.start_repeat(
                key,
                RepeatAction::Override(short.clone()),
                self.timing.repeat,
                now,
                timers,
            );
            let entry = OverrideEntry {
                was_ran: true,
                timer: Some(timer),
            };
            if let Some(state) = self.elements.state_mut(key) {
                state.entry = Some(entry);
            }
        } else if resolved.short.is_some() {
            debug!("Short override on {} deferred to release", config.id);
            if resolved.long.is_some() {
                self.arm_long_press(key, true, now, timers);
            } else if config.callout.is_some() {
                self.arm_long_press(key, false, now, timers);
            }
        } else if resolved.long.is_some() {
            debug!("Long override on {}, default deferred to release", config.id);
            if let Some(state) = self.elements.state_mut(key) {
                state.default_deferred = true;
            }
            self.arm_long_press(key, true, now, timers);
        } else if let Some(category) = category {
            self.press_default(key, &config, category, now, timers, transport);
        }

        let snapshot = self.snapshot();
        if let Some(state) = self.elements.state_mut(key) {
            state.snapshot = snapshot;
        }
        transport.haptic(HapticKind::Normal);
        Ok(())
    }

    /// Handle a release of `element` by `pointer`
    pub fn release<T: CommandTransport>(
        &mut self,
        element: &str,
        pointer: PointerId,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) -> Result<()> {
        let key = self.elements.resolve(element)?;
        let config = self.config(key)?;
        let Some(state) = self.take_press(key, pointer, timers) else {
            debug!("Release on {} by pointer {} ignored", config.id, pointer);
            return Ok(());
        };

        if state.callout_open {
            debug!("Release on {} suppressed, callout open", config.id);
            return Ok(());
        }
        if state.override_ran() {
            debug!("Release on {} is a no-op, override already ran", config.id);
            return Ok(());
        }

        if let Some(short) = state.resolved.short.as_ref() {
            debug!("Executing short override on {}", config.id);
            self.run_override(short, transport);
        } else if state.default_deferred {
            self.tap_default(&config, transport);
        } else {
            self.release_default(&config, state.default_pressed.as_deref(), transport);
        }
        transport.haptic(HapticKind::Normal);
        Ok(())
    }

    /// Handle cancel / leave of `element` by `pointer`
    pub fn abort<T: CommandTransport>(
        &mut self,
        element: &str,
        pointer: PointerId,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) -> Result<()> {
        let key = self.elements.resolve(element)?;
        let config = self.config(key)?;
        let Some(state) = self.take_press(key, pointer, timers) else {
            debug!("Abort on {} by pointer {} ignored", config.id, pointer);
            return Ok(());
        };

        if let Some(code) = state.default_pressed.as_deref() {
            debug!("Safety release of {} after abort on {}", code, config.id);
            self.release_held(code, transport);
        } else {
            debug!("Press on {} aborted, pending actions dropped", config.id);
        }

        // The release edge never comes, so undo what the press edge did
        if let Some(rollback) = state.modifier_rollback.as_ref() {
            if self.modifiers.current() == rollback.after {
                self.modifiers.restore(&rollback.before);
            }
        }
        Ok(())
    }

    /// Abort every press in progress
    pub fn abort_all<T: CommandTransport>(
        &mut self,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) {
        for key in self.elements.active_keys() {
            let Some(pointer) = self.elements.state(key).and_then(|s| s.reference_pointer) else {
                continue;
            };
            let Some(id) = self.elements.config(key).map(|c| c.id.clone()) else {
                continue;
            };
            if let Err(e) = self.abort(&id, pointer, timers, transport) {
                report(&e);
            }
        }
    }

    /// Long-press timer fired
    pub fn fire_long_press<T: CommandTransport>(
        &mut self,
        key: ElementKey,
        handle: TimerHandle,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) -> Result<()> {
        let config = self.config(key)?;
        let current = self.snapshot();
        let label = self.modifiers.label().to_string();

        let outcome = {
            let state = self
                .elements
                .state_mut(key)
                .ok_or_else(|| EngineError::UnresolvedElement(key.to_string()))?;

            if state.long_timer != Some(handle) || state.phase != PressPhase::LongPressPending {
                return Err(EngineError::StaleTimer(format!("long press on {}", config.id)));
            }
            state.long_timer = None;
            if let Some(entry) = state.entry.as_mut() {
                entry.timer = None;
            }

            if state.snapshot != current {
                state.phase = PressPhase::Pressed;
                return Err(EngineError::StaleTimer(format!(
                    "context changed before long press on {}",
                    config.id
                )));
            }

            if let Some(long) = state.resolved.long.clone() {
                if let Some(entry) = state.entry.as_mut() {
                    entry.was_ran = true;
                }
                state.phase = PressPhase::LongPressFired;
                LongPressOutcome::RunOverride {
                    action: long,
                    repeat: state.resolved.long_repeats(),
                }
            } else if config
                .callout
                .as_ref()
                .is_some_and(|callout| callout.allowed_in(&label))
            {
                state.callout_open = true;
                state.phase = PressPhase::LongPressFired;
                LongPressOutcome::OpenCallout
            } else {
                state.phase = PressPhase::Pressed;
                LongPressOutcome::Nothing
            }
        };

        match outcome {
            LongPressOutcome::RunOverride { action, repeat } => {
                debug!("Executing long override on {}", config.id);
                self.run_override(&action, transport);
                transport.haptic(HapticKind::Long);
                if repeat {
                    let timer = self.start_repeat(
                        key,
                        RepeatAction::Override(action),
                        self.timing.repeat,
                        now,
                        timers,
                    );
                    if let Some(entry) = self.elements.state_mut(key).and_then(|s| s.entry.as_mut()) {
                        entry.timer = Some(timer);
                    }
                }
            }
            LongPressOutcome::OpenCallout => {
                debug!("Callout opened on {}", config.id);
                self.open_callout = Some(key);
                transport.haptic(HapticKind::Long);
            }
            LongPressOutcome::Nothing => {
                debug!("Long press on {} has nothing to run in {}", config.id, label);
            }
        }
        Ok(())
    }

    /// Auto-repeat timer fired
    pub fn fire_repeat<T: CommandTransport>(
        &mut self,
        key: ElementKey,
        handle: TimerHandle,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) -> Result<()> {
        let config = self.config(key)?;
        let current = self.snapshot();

        let chain = {
            let state = self
                .elements
                .state_mut(key)
                .ok_or_else(|| EngineError::UnresolvedElement(key.to_string()))?;

            if state.repeat.as_ref().map(|c| c.timer) != Some(handle) {
                return Err(EngineError::StaleTimer(format!("repeat on {}", config.id)));
            }
            let chain = state.repeat.take();

            if state.snapshot != current {
                if let Some(entry) = state.entry.as_mut() {
                    entry.timer = None;
                }
                return Err(EngineError::StaleTimer(format!(
                    "context changed, repeat on {} stopped",
                    config.id
                )));
            }
            chain
        };
        let Some(chain) = chain else {
            return Ok(());
        };

        match &chain.action {
            RepeatAction::Default => self.tap_default(&config, transport),
            RepeatAction::Override(action) => self.run_override(action, transport),
        }

        let delay_ms = chain.schedule.next_delay(chain.delay_ms);
        let timer = timers.schedule(now, delay_ms, TimerKind::Repeat { element: key });
        debug!("Repeat on {} rescheduled in {}ms", config.id, delay_ms);

        if let Some(state) = self.elements.state_mut(key) {
            if let Some(entry) = state.entry.as_mut() {
                entry.timer = Some(timer);
            }
            state.repeat = Some(RepeatChain {
                delay_ms,
                timer,
                ..chain
            });
        }
        Ok(())
    }

    /// Set the ambient mode
    pub fn set_mode(&mut self, mode: impl Into<String>) {
        let mode = mode.into();
        if mode != self.mode {
            info!("Ambient mode changed: {} -> {}", self.mode, mode);
            self.mode = mode;
        }
    }

    /// Ambient mode
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Update a sensor state used by conditional overrides
    pub fn set_sensor(&mut self, sensor: impl Into<String>, on: bool) {
        self.sensors.insert(sensor.into(), on);
    }

    /// Codes currently held
    pub fn held(&self) -> &BTreeSet<String> {
        &self.held
    }

    /// Modifier state machine
    pub fn modifiers(&self) -> &ModifierStateMachine {
        &self.modifiers
    }

    /// Element table
    pub fn elements(&self) -> &ElementTable {
        &self.elements
    }

    /// Element whose callout is open, with the offered characters
    pub fn open_callout(&self) -> Option<(&str, &[String])> {
        let config = self.elements.config(self.open_callout?)?;
        let chars = config
            .callout
            .as_ref()
            .map(|c| c.chars.as_slice())
            .unwrap_or(&[]);
        Some((config.id.as_str(), chars))
    }

    /// Consume a pending trackpad scroll-mode toggle request
    pub fn take_scroll_toggle(&mut self) -> bool {
        std::mem::take(&mut self.scroll_toggle_requested)
    }

    fn config(&self, key: ElementKey) -> Result<ElementConfig> {
        self.elements
            .config(key)
            .cloned()
            .ok_or_else(|| EngineError::UnresolvedElement(key.to_string()))
    }

    fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            mode: self.mode.clone(),
            modifier_state: self.modifiers.current().to_string(),
        }
    }

    fn resolve_override(&self, element: &str) -> ResolvedOverride {
        let exact = self
            .overrides
            .iter()
            .find(|o| o.element == element && o.mode.as_deref() == Some(self.mode.as_str()));
        let any = || {
            self.overrides
                .iter()
                .find(|o| o.element == element && o.mode.is_none())
        };

        match exact.or_else(any) {
            Some(config) => config.resolve().unwrap_or_else(|e| {
                report(&e);
                ResolvedOverride::default()
            }),
            None => ResolvedOverride::default(),
        }
    }

    fn arm_long_press(
        &mut self,
        key: ElementKey,
        with_entry: bool,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
    ) {
        let handle = timers.schedule(
            now,
            self.timing.long_press_delay_ms,
            TimerKind::LongPress { element: key },
        );
        let entry = with_entry.then(|| OverrideEntry {
            was_ran: false,
            timer: Some(handle),
        });

        if let Some(state) = self.elements.state_mut(key) {
            state.long_timer = Some(handle);
            state.phase = PressPhase::LongPressPending;
            state.entry = entry;
        }
    }

    fn start_repeat(
        &mut self,
        key: ElementKey,
        action: RepeatAction,
        schedule: RepeatSchedule,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
    ) -> TimerHandle {
        let timer = timers.schedule(now, schedule.initial_ms, TimerKind::Repeat { element: key });
        if let Some(state) = self.elements.state_mut(key) {
            state.repeat = Some(RepeatChain {
                action,
                schedule,
                delay_ms: schedule.initial_ms,
                timer,
            });
        }
        timer
    }

    /// Clear the press state if `pointer` owns it, cancelling every timer
    fn take_press(
        &mut self,
        key: ElementKey,
        pointer: PointerId,
        timers: &mut TimerScheduler<TimerKind>,
    ) -> Option<crate::engine::element::PressState> {
        let state = self.elements.state_mut(key)?;
        if state.reference_pointer != Some(pointer) {
            return None;
        }

        if let Some(handle) = state.long_timer.take() {
            timers.cancel(&handle);
        }
        if let Some(chain) = state.repeat.take() {
            timers.cancel(&chain.timer);
        }
        if let Some(handle) = state.entry.as_mut().and_then(|e| e.timer.take()) {
            timers.cancel(&handle);
        }

        let state = std::mem::take(state);
        if self.open_callout == Some(key) {
            self.open_callout = None;
        }
        Some(state)
    }

    fn press_default<T: CommandTransport>(
        &mut self,
        key: ElementKey,
        config: &ElementConfig,
        category: CodeCategory,
        now: Millis,
        timers: &mut TimerScheduler<TimerKind>,
        transport: &mut T,
    ) {
        if config.toggle && (category.is_held() || category == CodeCategory::Virtual) {
            if self.latched.remove(&config.code) {
                debug!("Unlatching {}", config.code);
                self.release_held(&config.code, transport);
            } else {
                debug!("Latching {}", config.code);
                self.latched.insert(config.code.clone());
                self.press_held(&config.code, category, transport);
            }
            return;
        }

        match category {
            CodeCategory::Scroll(_) => {
                self.tap_code(&config.code, transport);
                let schedule = config
                    .repeat
                    .map(RepeatSchedule::from)
                    .unwrap_or(self.timing.scroll_repeat);
                self.start_repeat(key, RepeatAction::Default, schedule, now, timers);
            }
            CodeCategory::ScrollToggle => {}
            _ if config.repeat.is_some() => {
                self.tap_default(config, transport);
                let schedule = config
                    .repeat
                    .map(RepeatSchedule::from)
                    .unwrap_or(self.timing.repeat);
                self.start_repeat(key, RepeatAction::Default, schedule, now, timers);
            }
            _ if config.types_characters() => {
                let before = self.modifiers.current().to_string();
                self.feed_modifier(&config.code, KeyEdge::Press);
                if self.modifiers.current() != before {
                    let after = self.modifiers.current().to_string();
                    if let Some(state) = self.elements.state_mut(key) {
                        state.modifier_rollback = Some(ModifierRollback { before, after });
                    }
                }
                if config.callout.is_some() {
                    self.arm_long_press(key, false, now, timers);
                }
            }
            _ => {
                self.press_held(&config.code, category, transport);
                if let Some(state) = self.elements.state_mut(key) {
                    state.default_pressed = Some(config.code.clone());
                }
            }
        }
    }

    fn release_default<T: CommandTransport>(
        &mut self,
        config: &ElementConfig,
        pressed: Option<&str>,
        transport: &mut T,
    ) {
        if let Some(code) = pressed {
            self.release_held(code, transport);
            return;
        }

        match self.codes.classify(&config.code) {
            Ok(CodeCategory::ScrollToggle) => {
                debug!("Trackpad scroll mode toggle requested by {}", config.id);
                self.scroll_toggle_requested = true;
            }
            Ok(_) if config.toggle || config.repeat.is_some() => {}
            Ok(CodeCategory::Scroll(_)) => {}
            Ok(_) if config.types_characters() => {
                self.type_text(config, transport);
                self.feed_modifier(&config.code, KeyEdge::Release);
            }
            Ok(_) => {}
            Err(e) => report(&e),
        }
    }

    fn press_held<T: CommandTransport>(
        &mut self,
        code: &str,
        category: CodeCategory,
        transport: &mut T,
    ) {
        let command = match category {
            CodeCategory::Key | CodeCategory::Modifier => Some(Command::PressKey {
                code: code.to_string(),
            }),
            CodeCategory::Consumer => Some(Command::PressConsumer {
                code: code.to_string(),
            }),
            CodeCategory::Button(button) => Some(Command::PressButton { button }),
            _ => None,
        };
        if let Some(command) = command {
            transport.send(command);
        }
        self.held.insert(code.to_string());
        self.feed_modifier(code, KeyEdge::Press);
    }

    fn release_held<T: CommandTransport>(&mut self, code: &str, transport: &mut T) {
        let command = match self.codes.classify(code) {
            Ok(CodeCategory::Key | CodeCategory::Modifier) => Some(Command::ReleaseKey {
                code: code.to_string(),
            }),
            Ok(CodeCategory::Consumer) => Some(Command::ReleaseConsumer {
                code: code.to_string(),
            }),
            Ok(CodeCategory::Button(button)) => Some(Command::ReleaseButton { button }),
            Ok(_) => None,
            Err(e) => {
                report(&e);
                None
            }
        };
        if let Some(command) = command {
            transport.send(command);
        }
        self.held.remove(code);
        self.feed_modifier(code, KeyEdge::Release);
    }

    /// Default action performed as a single tap
    fn tap_default<T: CommandTransport>(&mut self, config: &ElementConfig, transport: &mut T) {
        if config.types_characters() {
            self.type_text(config, transport);
            self.feed_modifier(&config.code, KeyEdge::Release);
        } else {
            self.tap_code(&config.code, transport);
        }
    }

    fn type_text<T: CommandTransport>(&mut self, config: &ElementConfig, transport: &mut T) {
        match config.text_for(self.modifiers.label()) {
            Some(text) => transport.send(Command::TapChars {
                text: text.to_string(),
            }),
            None => debug!("No text for {} in {}", config.id, self.modifiers.label()),
        }
    }

    fn tap_code<T: CommandTransport>(&mut self, code: &str, transport: &mut T) {
        let category = match self.codes.classify(code) {
            Ok(category) => category,
            Err(e) => {
                report(&e);
                return;
            }
        };

        match category {
            CodeCategory::Key | CodeCategory::Modifier => {
                transport.send(Command::PressKey {
                    code: code.to_string(),
                });
                transport.send(Command::ReleaseKey {
                    code: code.to_string(),
                });
            }
            CodeCategory::Consumer => {
                transport.send(Command::PressConsumer {
                    code: code.to_string(),
                });
                transport.send(Command::ReleaseConsumer {
                    code: code.to_string(),
                });
            }
            CodeCategory::Button(button) => transport.send(Command::Click { button }),
            CodeCategory::Scroll(direction) => {
                let (dx, dy) = direction.step();
                transport.send(Command::Scroll { dx, dy });
                transport.haptic(HapticKind::Short);
            }
            CodeCategory::ScrollToggle => self.scroll_toggle_requested = true,
            CodeCategory::Virtual => {
                self.feed_modifier(code, KeyEdge::Press);
                self.feed_modifier(code, KeyEdge::Release);
            }
        }
    }

    fn run_override<T: CommandTransport>(&mut self, action: &OverrideAction, transport: &mut T) {
        match action.target(&self.sensors).cloned() {
            Some(ActionTarget::Code(code)) => self.tap_code(&code, transport),
            Some(ActionTarget::Service(service)) => {
                transport.send(Command::TriggerAction { action: service })
            }
            None => debug!("Override has no action for the current sensor state"),
        }
    }

    fn feed_modifier(&mut self, code: &str, edge: KeyEdge) {
        self.modifiers.apply(&ModifierInput {
            code,
            edge,
            held: &self.held,
        });
    }
}
