//! Input gate for raw control-logic text.

use serde::{Deserialize, Serialize};

/// Minimum words required to describe a complete control process.
pub const MIN_WORDS: usize = 50;

/// Maximum accepted words.
pub const MAX_WORDS: usize = 5000;

/// Why a piece of input was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InputRejection {
    /// Empty or whitespace-only text.
    Empty,
    /// Fewer than `min` words.
    TooShort { word_count: usize, min: usize },
    /// More than `max` words.
    TooLong { word_count: usize, max: usize },
}

impl std::fmt::Display for InputRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("control logic cannot be empty"),
            Self::TooShort { word_count, min } => write!(
                f,
                "control logic too brief ({word_count} words); provide at least {min} words \
                 describing the complete control process"
            ),
            Self::TooLong { word_count, max } => write!(
                f,
                "control logic too long ({word_count} words); maximum {max} words allowed"
            ),
        }
    }
}

/// The outcome of the input gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputReport {
    pub valid: bool,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<InputRejection>,
}

/// Bounds-check raw control-logic text by word count.
#[must_use]
pub fn validate(text: &str) -> InputReport {
    if text.trim().is_empty() {
        return InputReport {
            valid: false,
            word_count: 0,
            rejection: Some(InputRejection::Empty),
        };
    }

    let word_count = text.split_whitespace().count();
    let rejection = if word_count < MIN_WORDS {
        Some(InputRejection::TooShort {
            word_count,
            min: MIN_WORDS,
        })
    } else if word_count > MAX_WORDS {
        Some(InputRejection::TooLong {
            word_count,
            max: MAX_WORDS,
        })
    } else {
        None
    };

    InputReport {
        valid: rejection.is_none(),
        word_count,
        rejection,
    }
}
