//! Teams domain: teams, memberships, invitations and the invitation workflow

pub mod domain;
pub mod repository;
pub mod workflow;

// Re-export domain types at the crate root for convenience
pub use domain::entities::*;
pub use domain::state::{
    InvitationEvent, InvitationGuardContext, InvitationState, InvitationStateMachine, StateError,
};
// Re-export repository types
pub use repository::{InMemoryTeamRepository, PgTeamRepository, TeamRepository};
pub use workflow::{Acceptance, InvitationWorkflow};
