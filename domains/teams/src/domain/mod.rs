//! Teams domain layer: entities and the invitation state machine

pub mod entities;
pub mod state;
