//! Identity domain layer: credential policy, entities, password hashing

pub mod entities;
pub mod password;
pub mod policy;
