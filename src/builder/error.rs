//! Build errors for state machine and transition builders.

use thiserror::Error;

/// Errors that can occur when building state trees and transitions.
///
/// State identifiers are carried in their `Debug` rendering.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Transition source state not specified. Call .from(state)")]
    MissingSourceState,

    #[error("Transition event not specified. Call .on(event)")]
    MissingEvent,

    #[error("Initial substate {initial} of {state} is not one of its substates")]
    InitialNotSubstate { state: String, initial: String },

    #[error("Composite state {state} declares no substates")]
    EmptySubstates { state: String },

    #[error("State {state} is a substate of both {first} and {second}")]
    MultipleSuperstates {
        state: String,
        first: String,
        second: String,
    },

    #[error("State {state} is its own ancestor")]
    Cycle { state: String },

    #[error("State tree has {} violations", violations.len())]
    Invalid { violations: Vec<BuildError> },
}

impl BuildError {
    /// Every individual violation, flattening `Invalid`.
    pub fn violations(&self) -> Vec<&BuildError> {
        match self {
            Self::Invalid { violations } => violations.iter().collect(),
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_counts_and_flattens_violations() {
        let error = BuildError::Invalid {
            violations: vec![
                BuildError::EmptySubstates {
                    state: "Root".to_string(),
                },
                BuildError::Cycle {
                    state: "Loop".to_string(),
                },
            ],
        };

        assert_eq!(error.to_string(), "State tree has 2 violations");
        assert_eq!(error.violations().len(), 2);
        assert_eq!(BuildError::MissingEvent.violations(), vec![&BuildError::MissingEvent]);
    }
}
