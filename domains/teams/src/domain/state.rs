//! Invitation state machine
//!
//! `pending` is the only live state; every event moves it to exactly one
//! terminal state and terminal states accept nothing. Persistence applies a
//! transition only while the stored row is still `pending`, so concurrent
//! callers cannot both win.

use crowd_common::Error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during state transitions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("Invalid transition: cannot transition from {from} via {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Guard condition failed: {0}")]
    GuardFailed(String),

    #[error("Terminal state: {0} is a terminal state and cannot transition")]
    TerminalState(String),
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        match err {
            StateError::TerminalState(state) => {
                Error::AlreadyTerminal(format!("Invitation is already {}", state))
            }
            StateError::GuardFailed(msg) => Error::AlreadyTerminal(msg),
            e @ StateError::InvalidTransition { .. } => Error::Conflict(e.to_string()),
        }
    }
}

/// Invitation states, stored as the `invitation_state` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invitation_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvitationState {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl InvitationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [InvitationState] {
        match self {
            Self::Pending => &[Self::Accepted, Self::Declined, Self::Expired],
            Self::Accepted | Self::Declined | Self::Expired => &[],
        }
    }
}

impl std::fmt::Display for InvitationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Declined => write!(f, "declined"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Events that trigger invitation state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationEvent {
    /// Invitee joins the team
    Accept,
    /// Invitee turns the invitation down
    Decline,
    /// Time-based expiry, lazily or from the sweep
    Expire,
}

impl std::fmt::Display for InvitationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Decline => write!(f, "decline"),
            Self::Expire => write!(f, "expire"),
        }
    }
}

/// Guard context for invitation transitions
#[derive(Debug, Clone, Copy)]
pub struct InvitationGuardContext {
    /// `expires_at` has passed
    pub is_overdue: bool,
}

/// Invitation state machine
pub struct InvitationStateMachine;

impl InvitationStateMachine {
    /// Attempt a state transition with guard conditions
    pub fn transition(
        current: InvitationState,
        event: InvitationEvent,
        context: Option<&InvitationGuardContext>,
    ) -> Result<InvitationState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        let overdue = context.is_some_and(|ctx| ctx.is_overdue);
        let next = match event {
            InvitationEvent::Accept | InvitationEvent::Decline if overdue => {
                return Err(StateError::GuardFailed(
                    "Invitation has expired".to_string(),
                ));
            }
            InvitationEvent::Accept => InvitationState::Accepted,
            InvitationEvent::Decline => InvitationState::Declined,
            InvitationEvent::Expire => InvitationState::Expired,
        };

        if !current.valid_transitions().contains(&next) {
            return Err(StateError::InvalidTransition {
                from: current.to_string(),
                event: event.to_string(),
            });
        }

        Ok(next)
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition(
        current: InvitationState,
        event: InvitationEvent,
        context: Option<&InvitationGuardContext>,
    ) -> bool {
        Self::transition(current, event, context).is_ok()
    }
}
