//! Per-connection session handling
//!
//! A session reads the connection identifier, resolves its role and then
//! runs either the producer pump or the viewer pump.

pub mod handler;
pub mod identifier;
pub mod state;

pub use handler::Session;
pub use identifier::StreamIdentifier;
pub use state::{Role, SessionPhase, SessionState};
