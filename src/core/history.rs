//! History policies for composite states.
//!
//! A composite state remembers which direct substate was active the last time
//! it was exited. The policy decides how much of that memory is used when the
//! composite is targeted again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which substate a composite state re-enters.
///
/// - `None`: always descend through the configured initial substate, then
///   apply that substate's own policy.
/// - `Shallow`: re-enter the most recently exited direct substate (or the
///   initial one if the composite was never exited), then descend through
///   initial substates below it.
/// - `Deep`: re-enter the most recently active substate at every level down
///   to a leaf.
///
/// # Example
///
/// ```rust
/// use statecraft::core::HistoryType;
///
/// assert_eq!(HistoryType::default(), HistoryType::None);
/// assert_eq!(HistoryType::Deep.to_string(), "deep");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryType {
    #[default]
    None,
    Shallow,
    Deep,
}

impl fmt::Display for HistoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Shallow => "shallow",
            Self::Deep => "deep",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_no_history() {
        assert_eq!(HistoryType::default(), HistoryType::None);
    }

    #[test]
    fn history_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&HistoryType::Shallow).unwrap(), "\"shallow\"");

        let parsed: HistoryType = serde_json::from_str("\"deep\"").unwrap();
        assert_eq!(parsed, HistoryType::Deep);
    }

    #[test]
    fn display_matches_serialized_name() {
        for history in [HistoryType::None, HistoryType::Shallow, HistoryType::Deep] {
            let json = serde_json::to_string(&history).unwrap();
            assert_eq!(json.trim_matches('"'), history.to_string());
        }
    }
}
