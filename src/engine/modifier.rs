//! Modifier State Machine
//!
//! Table-driven tracking of shift / alt / mode state for a virtual keyboard.
//!
//! # Transition Table
//!
//! Every state declares an ordered list of `(predicate, next)` rules. On each
//! press or release the rules of the current state are evaluated in
//! declaration order against the incoming code and the set of codes held
//! *after* the event was applied. The first match wins. No match keeps the
//! current state.
//!
//! ```text
//!   Predicate fields (all optional, all must hold):
//!     on         press | release edge
//!     codes      incoming code is one of these
//!     except     incoming code is none of these
//!     held_all   every listed code is held
//!     held_any   at least one listed code is held
//!     held_none  no listed code is held
//! ```
//!
//! Trigger-driven tables (android layout) use `on` + `codes`; held-set driven
//! tables (windows layout) use the `held_*` fields and ignore the code.
//! Overlapping predicates are legal; declaration order decides.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::engine::error::{EngineError, Result};

/// State identifier
pub type StateId = String;

/// Press or release edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEdge {
    /// Code pressed
    Press,
    /// Code released
    Release,
}

/// One modifier machine input
#[derive(Debug, Clone, Copy)]
pub struct ModifierInput<'a> {
    /// Code that changed
    pub code: &'a str,
    /// Direction of the change
    pub edge: KeyEdge,
    /// Codes held after the change
    pub held: &'a BTreeSet<String>,
}

/// Transition predicate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Predicate {
    /// Required edge
    pub on: Option<KeyEdge>,
    /// Allow-list for the incoming code (empty: any)
    pub codes: Vec<String>,
    /// Deny-list for the incoming code
    pub except: Vec<String>,
    /// Codes that must all be held
    pub held_all: Vec<String>,
    /// Codes of which at least one must be held (empty: no constraint)
    pub held_any: Vec<String>,
    /// Codes that must not be held
    pub held_none: Vec<String>,
}

impl Predicate {
    /// Whether the predicate accepts the input
    pub fn matches(&self, input: &ModifierInput<'_>) -> bool {
        if let Some(edge) = self.on {
            if edge != input.edge {
                return false;
            }
        }
        if !self.codes.is_empty() && !self.codes.iter().any(|c| c == input.code) {
            return false;
        }
        if self.except.iter().any(|c| c == input.code) {
            return false;
        }
        if !self.held_all.iter().all(|c| input.held.contains(c)) {
            return false;
        }
        if !self.held_any.is_empty() && !self.held_any.iter().any(|c| input.held.contains(c)) {
            return false;
        }
        !self.held_none.iter().any(|c| input.held.contains(c))
    }
}

/// Transition rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Predicate
    #[serde(default)]
    pub when: Predicate,
    /// Target state
    pub next: StateId,
}

/// State declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDef {
    /// Identifier
    pub id: StateId,
    /// Label key used to pick element labels (defaults to the id)
    #[serde(default)]
    pub label: Option<String>,
    /// Ordered rules
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Per-code action lists
    #[serde(default)]
    pub actions: HashMap<String, Vec<String>>,
}

impl StateDef {
    fn new(id: &str, label: &str, transitions: Vec<Transition>) -> Self {
        Self {
            id: id.to_string(),
            label: Some(label.to_string()),
            transitions,
            actions: HashMap::new(),
        }
    }

    /// Label key of this state
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// Declarative transition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierTable {
    /// Initial state
    pub initial: StateId,
    /// States in declaration order
    pub states: Vec<StateDef>,
}

const KEY_MODE: &str = "KEY_MODE";
const LEFT_SHIFT: &str = "MOD_LEFT_SHIFT";
const RIGHT_SHIFT: &str = "MOD_RIGHT_SHIFT";
const RIGHT_ALT: &str = "MOD_RIGHT_ALT";

fn on_press(code: &str, next: &str) -> Transition {
    Transition {
        when: Predicate {
            on: Some(KeyEdge::Press),
            codes: vec![code.to_string()],
            ..Predicate::default()
        },
        next: next.to_string(),
    }
}

fn strings(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

impl ModifierTable {
    /// Android-style virtual keyboard.
    ///
    /// `KEY_MODE` flips between letters and the alternate pages. `MOD_LEFT_SHIFT`
    /// cycles normal → shift-once → shift-locked → normal on letters and flips
    /// between alternate pages. Shift-once falls back to normal when any other
    /// key is released.
    pub fn android() -> Self {
        let revert_once = Transition {
            when: Predicate {
                on: Some(KeyEdge::Release),
                except: strings(&[LEFT_SHIFT, KEY_MODE]),
                ..Predicate::default()
            },
            next: "normal".to_string(),
        };

        Self {
            initial: "normal".to_string(),
            states: vec![
                StateDef::new(
                    "normal",
                    "normal",
                    vec![
                        on_press(KEY_MODE, "alt-page-1"),
                        on_press(LEFT_SHIFT, "shift-once"),
                    ],
                ),
                StateDef::new(
                    "shift-once",
                    "shift",
                    vec![
                        on_press(KEY_MODE, "alt-page-1"),
                        on_press(LEFT_SHIFT, "shift-locked"),
                        revert_once,
                    ],
                ),
                StateDef::new(
                    "shift-locked",
                    "shift",
                    vec![
                        on_press(KEY_MODE, "alt-page-1"),
                        on_press(LEFT_SHIFT, "normal"),
                    ],
                ),
                StateDef::new(
                    "alt-page-1",
                    "alt1",
                    vec![
                        on_press(KEY_MODE, "normal"),
                        on_press(LEFT_SHIFT, "alt-page-2"),
                    ],
                ),
                StateDef::new(
                    "alt-page-2",
                    "alt2",
                    vec![
                        on_press(KEY_MODE, "normal"),
                        on_press(LEFT_SHIFT, "alt-page-1"),
                    ],
                ),
            ],
        }
    }

    /// Windows-style keyboard driven by the held set.
    ///
    /// The state-independent revert rule comes first in every state.
    pub fn windows() -> Self {
        let shifts = strings(&[LEFT_SHIFT, RIGHT_SHIFT]);
        let rules = vec![
            Transition {
                when: Predicate {
                    held_none: strings(&[LEFT_SHIFT, RIGHT_SHIFT, RIGHT_ALT]),
                    ..Predicate::default()
                },
                next: "normal".to_string(),
            },
            Transition {
                when: Predicate {
                    held_any: shifts.clone(),
                    held_all: strings(&[RIGHT_ALT]),
                    ..Predicate::default()
                },
                next: "shift-altgr".to_string(),
            },
            Transition {
                when: Predicate {
                    held_any: shifts.clone(),
                    held_none: strings(&[RIGHT_ALT]),
                    ..Predicate::default()
                },
                next: "shift".to_string(),
            },
            Transition {
                when: Predicate {
                    held_all: strings(&[RIGHT_ALT]),
                    held_none: shifts,
                    ..Predicate::default()
                },
                next: "altgr".to_string(),
            },
        ];

        Self {
            initial: "normal".to_string(),
            states: ["normal", "shift", "altgr", "shift-altgr"]
                .iter()
                .map(|id| StateDef::new(id, id, rules.clone()))
                .collect(),
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "android" => Some(Self::android()),
            "windows" => Some(Self::windows()),
            _ => None,
        }
    }

    /// Check ids and transition targets
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for state in &self.states {
            if !seen.insert(state.id.as_str()) {
                return Err(EngineError::InvalidModifierTable(format!(
                    "duplicate state id '{}'",
                    state.id
                )));
            }
        }

        if !seen.contains(self.initial.as_str()) {
            return Err(EngineError::InvalidModifierTable(format!(
                "initial state '{}' is not declared",
                self.initial
            )));
        }

        for state in &self.states {
            for transition in &state.transitions {
                if !seen.contains(transition.next.as_str()) {
                    return Err(EngineError::InvalidModifierTable(format!(
                        "state '{}' transitions to undeclared state '{}'",
                        state.id, transition.next
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Modifier state machine over a validated table
#[derive(Debug, Clone)]
pub struct ModifierStateMachine {
    table: ModifierTable,
    index: HashMap<StateId, usize>,
    initial: usize,
    current: usize,
}

impl ModifierStateMachine {
    /// Validate the table and start in its initial state
    pub fn new(table: ModifierTable) -> Result<Self> {
        table.validate()?;

        let index: HashMap<StateId, usize> = table
            .states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let initial = index.get(&table.initial).copied().ok_or_else(|| {
            EngineError::InvalidModifierTable(format!("unknown initial state '{}'", table.initial))
        })?;

        Ok(Self {
            table,
            index,
            initial,
            current: initial,
        })
    }

    /// Next state for `input` when in `current`. Pure.
    pub fn next<'a>(&'a self, current: &'a str, input: &ModifierInput<'_>) -> &'a str {
        let Some(&idx) = self.index.get(current) else {
            return current;
        };

        self.table.states[idx]
            .transitions
            .iter()
            .find(|t| t.when.matches(input))
            .map(|t| t.next.as_str())
            .unwrap_or(current)
    }

    /// Advance on `input`. Returns the new state id when it changed.
    pub fn apply(&mut self, input: &ModifierInput<'_>) -> Option<&str> {
        let current = self.table.states[self.current].id.as_str();
        let next = self.next(current, input);
        if next == current {
            return None;
        }

        let next_idx = *self.index.get(next)?;
        debug!(
            "Modifier state {} -> {} on {:?} {}",
            current, next, input.edge, input.code
        );
        self.current = next_idx;
        Some(self.table.states[next_idx].id.as_str())
    }

    /// Current state id
    pub fn current(&self) -> &str {
        &self.table.states[self.current].id
    }

    /// Label key of the current state
    pub fn label(&self) -> &str {
        self.table.states[self.current].label()
    }

    /// Action list of the current state for `code`
    pub fn actions(&self, code: &str) -> &[String] {
        self.table.states[self.current]
            .actions
            .get(code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Declared state by id
    pub fn state(&self, id: &str) -> Option<&StateDef> {
        self.index.get(id).map(|&i| &self.table.states[i])
    }

    /// Jump to a declared state. Returns false for an unknown id.
    pub fn restore(&mut self, id: &str) -> bool {
        match self.index.get(id) {
            Some(&idx) => {
                debug!("Modifier state {} restored to {}", self.current(), id);
                self.current = idx;
                true
            }
            None => false,
        }
    }

    /// Return to the initial state
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
