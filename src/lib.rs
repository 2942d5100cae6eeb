//! Conservative time management for HLA federations: a per-federate time-advance state machine
//! and a federation-wide GALT coordinator, connected only by messages.
mod error;

pub mod channel;
pub mod federate;
pub mod federation;
pub mod local;
pub mod messages;
pub mod queue;
pub mod time;

pub use error::TimeError;
