//! Generation lifecycle
//!
//! `Draft -> Validated -> Generated -> Applied(partial|full) -> Committed
//! -> {Superseded | RolledBack}`. Committed is terminal but supersedable;
//! RolledBack is terminal.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationState {
    Draft,
    Validated,
    Generated,
    AppliedPartial,
    AppliedFull,
    Committed,
    Superseded,
    RolledBack,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Validated => "validated",
            Self::Generated => "generated",
            Self::AppliedPartial => "applied-partial",
            Self::AppliedFull => "applied-full",
            Self::Committed => "committed",
            Self::Superseded => "superseded",
            Self::RolledBack => "rolled-back",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid generation state transition {from} -> {to}")]
pub struct StateError {
    pub from: GenerationState,
    pub to: GenerationState,
}

impl GenerationState {
    pub fn can_transition(self, to: Self) -> bool {
        use GenerationState::{
            AppliedFull, AppliedPartial, Committed, Draft, Generated, RolledBack, Superseded,
            Validated,
        };
        matches!(
            (self, to),
            (Draft, Validated)
                | (Validated, Generated)
                | (Generated, AppliedPartial | AppliedFull)
                | (AppliedPartial | AppliedFull, Committed)
                | (Committed, Superseded | RolledBack)
        )
    }

    /// Move to `to`, rejecting transitions outside the lifecycle
    pub fn advance(self, to: Self) -> Result<Self, StateError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(StateError { from: self, to })
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Superseded | Self::RolledBack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = GenerationState::Draft
            .advance(GenerationState::Validated)
            .and_then(|s| s.advance(GenerationState::Generated))
            .and_then(|s| s.advance(GenerationState::AppliedFull))
            .and_then(|s| s.advance(GenerationState::Committed))
            .unwrap();
        assert_eq!(state, GenerationState::Committed);
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_partial_apply_still_commits() {
        assert!(GenerationState::Generated.can_transition(GenerationState::AppliedPartial));
        assert!(GenerationState::AppliedPartial.can_transition(GenerationState::Committed));
    }

    #[test]
    fn test_skipping_validation_rejected() {
        let result = GenerationState::Draft.advance(GenerationState::Generated);
        assert_eq!(
            result,
            Err(StateError {
                from: GenerationState::Draft,
                to: GenerationState::Generated,
            })
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(GenerationState::RolledBack.is_terminal());
        assert!(GenerationState::Superseded.is_terminal());
        assert!(!GenerationState::RolledBack.can_transition(GenerationState::Committed));
    }
}
