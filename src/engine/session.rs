//! Pointer Session Tracking
//!
//! One [`PointerSession`] per pointer currently in contact with the trackpad.
//! Sessions are created on pointer-down, updated on every move and destroyed on
//! pointer-up, cancel or leave. A session's pending timer is always cancelled
//! before the session is dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::engine::timer::{Millis, TimerHandle, TimerScheduler};

/// Pointer identifier as reported by the host (unique per active contact)
pub type PointerId = u32;

/// Surface position in host pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Position {
    /// Create a position
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Raw offset from `self` to `other`
    pub fn offset_to(&self, other: Position) -> (f64, f64) {
        (other.x - self.x, other.y - self.y)
    }

    /// Offset from `self` to `other`, rounded to whole pixels
    pub fn rounded_offset_to(&self, other: Position) -> (i32, i32) {
        let (dx, dy) = self.offset_to(other);
        (dx.round() as i32, dy.round() as i32)
    }
}

/// Per-axis movement thresholds (pixels)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveThresholds {
    /// Horizontal threshold
    pub x: f64,
    /// Vertical threshold
    pub y: f64,
}

impl MoveThresholds {
    /// Whether the offset exceeds either axis threshold
    pub fn exceeded_by(&self, dx: f64, dy: f64) -> bool {
        dx.abs() > self.x || dy.abs() > self.y
    }
}

impl Default for MoveThresholds {
    fn default() -> Self {
        Self { x: 2.0, y: 2.0 }
    }
}

/// Bookkeeping for one contacting pointer
#[derive(Debug, Clone, PartialEq)]
pub struct PointerSession {
    /// Position at pointer-down
    pub start_position: Position,
    /// Timestamp at pointer-down
    pub start_time: Millis,
    /// Most recent position
    pub last_position: Position,
    /// Most recent timestamp
    pub last_time: Millis,
    /// Position incremental deltas are measured from
    pub anchor_position: Position,
    /// Movement beyond threshold was seen (sticky)
    pub move_detected: bool,
    /// Long-click timer owned by this session
    pub pending_timer: Option<TimerHandle>,
    /// Session coexisted with another pointer
    pub overlapped: bool,
    /// Long click already emitted by timer
    pub long_click_fired: bool,
}

impl PointerSession {
    fn new(position: Position, time: Millis) -> Self {
        Self {
            start_position: position,
            start_time: time,
            last_position: position,
            last_time: time,
            anchor_position: position,
            move_detected: false,
            pending_timer: None,
            overlapped: false,
            long_click_fired: false,
        }
    }

    /// Milliseconds from pointer-down to `now`
    pub fn elapsed_ms(&self, now: Millis) -> Millis {
        now.saturating_sub(self.start_time)
    }

    /// Rounded offset from start to last position
    pub fn delta(&self) -> (i32, i32) {
        self.start_position.rounded_offset_to(self.last_position)
    }

    /// Raw offset from anchor to last position
    pub fn anchor_offset(&self) -> (f64, f64) {
        self.anchor_position.offset_to(self.last_position)
    }
}

/// Table of active pointer sessions
#[derive(Debug)]
pub struct PointerSessionTable {
    sessions: HashMap<PointerId, PointerSession>,
    thresholds: MoveThresholds,
}

impl PointerSessionTable {
    /// Create an empty table
    pub fn new(thresholds: MoveThresholds) -> Self {
        Self {
            sessions: HashMap::new(),
            thresholds,
        }
    }

    /// Start a session. Ignored (returns `false`) if one already exists.
    pub fn begin(&mut self, pointer_id: PointerId, position: Position, time: Millis) -> bool {
        if self.sessions.contains_key(&pointer_id) {
            debug!("Pointer {} already has a session, down ignored", pointer_id);
            return false;
        }
        self.sessions
            .insert(pointer_id, PointerSession::new(position, time));
        true
    }

    /// Record a move. Movement detection is sticky within a session.
    pub fn update(
        &mut self,
        pointer_id: PointerId,
        position: Position,
        time: Millis,
    ) -> Option<&PointerSession> {
        let thresholds = self.thresholds;
        let session = self.sessions.get_mut(&pointer_id)?;

        session.last_position = position;
        session.last_time = time;

        if !session.move_detected {
            let (dx, dy) = session.start_position.offset_to(position);
            if thresholds.exceeded_by(dx, dy) {
                debug!("Move detected for pointer {}", pointer_id);
                session.move_detected = true;
            }
        }

        Some(session)
    }

    /// End a session, cancelling its pending timer
    pub fn end<T>(
        &mut self,
        pointer_id: PointerId,
        timers: &mut TimerScheduler<T>,
    ) -> Option<PointerSession> {
        let mut session = self.sessions.remove(&pointer_id)?;
        if let Some(handle) = session.pending_timer.take() {
            timers.cancel(&handle);
        }
        Some(session)
    }

    /// End every session
    pub fn clear<T>(&mut self, timers: &mut TimerScheduler<T>) {
        for (_, session) in self.sessions.drain() {
            if let Some(handle) = session.pending_timer {
                timers.cancel(&handle);
            }
        }
    }

    /// Rounded start-to-last delta
    pub fn delta(&self, pointer_id: PointerId) -> Option<(i32, i32)> {
        self.sessions.get(&pointer_id).map(PointerSession::delta)
    }

    /// Move the anchor of one session to its last position
    pub fn advance_anchor(&mut self, pointer_id: PointerId) {
        if let Some(session) = self.sessions.get_mut(&pointer_id) {
            session.anchor_position = session.last_position;
        }
    }

    /// Move every anchor to its session's last position
    pub fn advance_all_anchors(&mut self) {
        for session in self.sessions.values_mut() {
            session.anchor_position = session.last_position;
        }
    }

    /// Mark every active session as part of a multi-pointer gesture
    pub fn mark_all_overlapped(&mut self) {
        for session in self.sessions.values_mut() {
            session.overlapped = true;
        }
    }

    /// Look up a session
    pub fn get(&self, pointer_id: PointerId) -> Option<&PointerSession> {
        self.sessions.get(&pointer_id)
    }

    /// Look up a session mutably
    pub fn get_mut(&mut self, pointer_id: PointerId) -> Option<&mut PointerSession> {
        self.sessions.get_mut(&pointer_id)
    }

    /// Iterate over active sessions
    pub fn iter(&self) -> impl Iterator<Item = (&PointerId, &PointerSession)> {
        self.sessions.iter()
    }

    /// Whether a session exists for the pointer
    pub fn contains(&self, pointer_id: PointerId) -> bool {
        self.sessions.contains_key(&pointer_id)
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is active
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
