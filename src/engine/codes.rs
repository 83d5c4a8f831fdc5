//! Code Category Classification
//!
//! Element codes are plain strings whose prefix decides how the engine treats
//! them:
//!
//! ```text
//! KEY_*                    HID keyboard key          press / release
//! MOD_*                    HID modifier key          press / release
//! CON_*                    consumer control          press / release
//! BTN_LEFT|MIDDLE|RIGHT    mouse button              press / release
//! SCROLL_UP|DOWN|LEFT|RIGHT scroll zone              scroll + auto-repeat
//! TRACKPAD_SCROLL_TOGGLE   trackpad scroll mode      toggle on release
//! (configured list)        virtual modifier          modifier machine only
//! ```

use std::collections::HashSet;

use crate::engine::classifier::ScrollDirection;
use crate::engine::error::{EngineError, Result};
use crate::engine::transport::MouseButton;

/// Code used by the trackpad scroll-mode toggle element
pub const SCROLL_TOGGLE_CODE: &str = "TRACKPAD_SCROLL_TOGGLE";

/// Category of an element code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCategory {
    /// Keyboard key (`KEY_`)
    Key,
    /// Modifier key (`MOD_`)
    Modifier,
    /// Consumer control (`CON_`)
    Consumer,
    /// Mouse button (`BTN_`)
    Button(MouseButton),
    /// Scroll zone (`SCROLL_`)
    Scroll(ScrollDirection),
    /// Trackpad scroll-mode toggle
    ScrollToggle,
    /// Virtual modifier consumed by the modifier state machine only
    Virtual,
}

impl CodeCategory {
    /// Whether the code is held on the remote side between press and release
    pub fn is_held(&self) -> bool {
        matches!(
            self,
            CodeCategory::Key
                | CodeCategory::Modifier
                | CodeCategory::Consumer
                | CodeCategory::Button(_)
        )
    }
}

/// Maps codes to categories
#[derive(Debug, Clone, Default)]
pub struct CodeClassifier {
    virtual_codes: HashSet<String>,
}

impl CodeClassifier {
    /// Create a classifier that treats `virtual_codes` as virtual modifiers
    pub fn new<I, S>(virtual_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            virtual_codes: virtual_codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Classify a code.
    ///
    /// Virtual codes are checked first so a configured `MOD_` code can be
    /// made virtual.
    pub fn classify(&self, code: &str) -> Result<CodeCategory> {
        if self.is_virtual(code) {
            return Ok(CodeCategory::Virtual);
        }
        if code == SCROLL_TOGGLE_CODE {
            return Ok(CodeCategory::ScrollToggle);
        }

        if code.starts_with("KEY_") {
            Ok(CodeCategory::Key)
        } else if code.starts_with("MOD_") {
            Ok(CodeCategory::Modifier)
        } else if code.starts_with("CON_") {
            Ok(CodeCategory::Consumer)
        } else if let Some(name) = code.strip_prefix("BTN_") {
            parse_button(name)
                .map(CodeCategory::Button)
                .ok_or_else(|| EngineError::UnknownCodeCategory(code.to_string()))
        } else if let Some(name) = code.strip_prefix("SCROLL_") {
            parse_scroll(name)
                .map(CodeCategory::Scroll)
                .ok_or_else(|| EngineError::UnknownCodeCategory(code.to_string()))
        } else {
            Err(EngineError::UnknownCodeCategory(code.to_string()))
        }
    }

    /// Whether the code is a configured virtual modifier
    pub fn is_virtual(&self, code: &str) -> bool {
        self.virtual_codes.contains(code)
    }
}

fn parse_button(name: &str) -> Option<MouseButton> {
    match name {
        "LEFT" => Some(MouseButton::Left),
        "MIDDLE" => Some(MouseButton::Middle),
        "RIGHT" => Some(MouseButton::Right),
        _ => None,
    }
}

fn parse_scroll(name: &str) -> Option<ScrollDirection> {
    match name {
        "UP" => Some(ScrollDirection::Top),
        "DOWN" => Some(ScrollDirection::Bottom),
        "LEFT" => Some(ScrollDirection::Left),
        "RIGHT" => Some(ScrollDirection::Right),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_classification() {
        let codes = CodeClassifier::default();

        assert_eq!(codes.classify("KEY_A").unwrap(), CodeCategory::Key);
        assert_eq!(codes.classify("MOD_LEFT_SHIFT").unwrap(), CodeCategory::Modifier);
        assert_eq!(codes.classify("CON_VOLUME_UP").unwrap(), CodeCategory::Consumer);
        assert_eq!(
            codes.classify("BTN_RIGHT").unwrap(),
            CodeCategory::Button(MouseButton::Right)
        );
        assert_eq!(
            codes.classify("SCROLL_DOWN").unwrap(),
            CodeCategory::Scroll(ScrollDirection::Bottom)
        );
        assert_eq!(
            codes.classify(SCROLL_TOGGLE_CODE).unwrap(),
            CodeCategory::ScrollToggle
        );
    }

    #[test]
    fn test_virtual_codes_take_precedence() {
        let codes = CodeClassifier::new(["KEY_MODE", "MOD_LEFT_SHIFT"]);

        assert_eq!(codes.classify("KEY_MODE").unwrap(), CodeCategory::Virtual);
        assert_eq!(codes.classify("MOD_LEFT_SHIFT").unwrap(), CodeCategory::Virtual);
        assert_eq!(codes.classify("MOD_LEFT_CTRL").unwrap(), CodeCategory::Modifier);
        assert!(codes.is_virtual("KEY_MODE"));
    }

    #[test]
    fn test_unknown_codes() {
        let codes = CodeClassifier::default();

        match codes.classify("FOO_BAR") {
            Err(EngineError::UnknownCodeCategory(code)) => assert_eq!(code, "FOO_BAR"),
            other => panic!("Expected UnknownCodeCategory, got {:?}", other),
        }
        assert!(codes.classify("BTN_SIDE").is_err());
        assert!(codes.classify("SCROLL_DIAGONAL").is_err());
        assert!(codes.classify("key_a").is_err());
    }

    #[test]
    fn test_held_categories() {
        assert!(CodeCategory::Key.is_held());
        assert!(CodeCategory::Button(MouseButton::Left).is_held());
        assert!(!CodeCategory::Virtual.is_held());
        assert!(!CodeCategory::Scroll(ScrollDirection::Top).is_held());
        assert!(!CodeCategory::ScrollToggle.is_held());
    }
}
