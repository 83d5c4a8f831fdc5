//! Gesture Classification
//!
//! Pure classification of pointer sessions into intents. The classifier owns
//! no state: the trackpad feeds it sessions and acts on the returned intent.
//!
//! ```text
//!   release, no move, elapsed <  long-click delay   -> ShortClick
//!   release, no move, elapsed >= long-click delay   -> LongClick
//!   release after move / overlap / timer long click -> None
//!   one pointer moving (move mode)                  -> MoveDelta
//!   one pointer moving (scroll mode)                -> ScrollStep
//!   two pointers moving past scroll threshold       -> ScrollIntent
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::session::PointerSession;
use crate::engine::timer::Millis;

/// Scroll direction, named after finger travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    /// Fingers moving up
    Top,
    /// Fingers moving down
    Bottom,
    /// Fingers moving left
    Left,
    /// Fingers moving right
    Right,
}

impl ScrollDirection {
    /// Unit scroll step sent for this direction
    pub fn step(&self) -> (i32, i32) {
        match self {
            ScrollDirection::Top => (0, 1),
            ScrollDirection::Bottom => (0, -1),
            ScrollDirection::Left => (-1, 0),
            ScrollDirection::Right => (1, 0),
        }
    }
}

/// Classified gesture intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureIntent {
    /// Quick tap without movement
    ShortClick,
    /// Held tap without movement
    LongClick,
    /// Cursor movement since the anchor
    MoveDelta {
        /// Horizontal delta
        dx: i32,
        /// Vertical delta
        dy: i32,
    },
    /// Two-pointer scroll in one direction
    ScrollIntent(ScrollDirection),
    /// Scaled scroll step (single-pointer scroll mode)
    ScrollStep {
        /// Horizontal amount
        dx: i32,
        /// Vertical amount
        dy: i32,
    },
    /// Nothing to do yet
    None,
}

/// Classification thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    /// Hold time separating short and long clicks
    pub long_click_delay_ms: Millis,
    /// Horizontal scroll threshold (pixels)
    pub scroll_threshold_x: f64,
    /// Vertical scroll threshold (pixels)
    pub scroll_threshold_y: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            long_click_delay_ms: 500,
            scroll_threshold_x: 10.0,
            scroll_threshold_y: 10.0,
        }
    }
}

/// Gesture classifier
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    config: ClassifierConfig,
}

impl GestureClassifier {
    /// Create a classifier
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a session ending at `now`
    pub fn classify_release(&self, session: &PointerSession, now: Millis) -> GestureIntent {
        if session.move_detected || session.overlapped || session.long_click_fired {
            return GestureIntent::None;
        }

        if session.elapsed_ms(now) < self.config.long_click_delay_ms {
            GestureIntent::ShortClick
        } else {
            GestureIntent::LongClick
        }
    }

    /// Cursor movement since the session's anchor. Zero deltas yield `None`.
    pub fn classify_move(&self, session: &PointerSession) -> GestureIntent {
        let (dx, dy) = session
            .anchor_position
            .rounded_offset_to(session.last_position);
        if dx == 0 && dy == 0 {
            GestureIntent::None
        } else {
            GestureIntent::MoveDelta { dx, dy }
        }
    }

    /// Scroll intent from the average anchor delta of the given sessions
    pub fn classify_scroll<'a, I>(&self, sessions: I) -> GestureIntent
    where
        I: IntoIterator<Item = &'a PointerSession>,
    {
        let mut count = 0usize;
        let (mut sum_dx, mut sum_dy) = (0.0, 0.0);
        for session in sessions {
            let (dx, dy) = session.anchor_offset();
            sum_dx += dx;
            sum_dy += dy;
            count += 1;
        }
        if count == 0 {
            return GestureIntent::None;
        }

        let avg_dx = sum_dx / count as f64;
        let avg_dy = sum_dy / count as f64;
        match self.scroll_direction(avg_dx, avg_dy) {
            Some(direction) => GestureIntent::ScrollIntent(direction),
            None => GestureIntent::None,
        }
    }

    /// Direction for an average delta. Vertical wins when both axes qualify.
    pub fn scroll_direction(&self, avg_dx: f64, avg_dy: f64) -> Option<ScrollDirection> {
        if avg_dy.abs() > self.config.scroll_threshold_y {
            Some(if avg_dy > 0.0 {
                ScrollDirection::Bottom
            } else {
                ScrollDirection::Top
            })
        } else if avg_dx.abs() > self.config.scroll_threshold_x {
            Some(if avg_dx > 0.0 {
                ScrollDirection::Right
            } else {
                ScrollDirection::Left
            })
        } else {
            None
        }
    }

    /// Scaled scroll step for one pointer in scroll mode.
    ///
    /// The dominant axis (vertical on ties) scrolls by
    /// `clamp(delta, -1, 1) * round(|delta| / threshold)`; vertical amounts are
    /// inverted so content follows the finger.
    pub fn classify_scroll_step(&self, session: &PointerSession) -> GestureIntent {
        let (dx, dy) = session.anchor_offset();
        if dx.abs() <= self.config.scroll_threshold_x && dy.abs() <= self.config.scroll_threshold_y
        {
            return GestureIntent::None;
        }

        if dy.abs() >= dx.abs() {
            let amount = scaled(dy, self.config.scroll_threshold_y);
            GestureIntent::ScrollStep { dx: 0, dy: -amount }
        } else {
            let amount = scaled(dx, self.config.scroll_threshold_x);
            GestureIntent::ScrollStep { dx: amount, dy: 0 }
        }
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

fn scaled(delta: f64, threshold: f64) -> i32 {
    let unit = delta.clamp(-1.0, 1.0);
    let steps = if threshold > 0.0 {
        (delta.abs() / threshold).round()
    } else {
        1.0
    };
    (unit * steps).round() as i32
}
