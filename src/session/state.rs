//! Session state machine
//!
//! Tracks a connection from accept to close:
//! `Accepted → RoleResolved → Active → Closed`.

use std::net::SocketAddr;
use std::time::Instant;

use crate::stats::SessionStats;

/// Connection role, decided by the identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Streamer feeding a quality
    Producer,
    /// Viewer reading from a quality
    Consumer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Consumer => write!(f, "consumer"),
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connection accepted, identifier not read yet
    Accepted,
    /// Identifier parsed
    RoleResolved(Role),
    /// Pumping bytes
    Active(Role),
    /// Torn down
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Stream name once resolved
    pub stream: Option<String>,

    /// Quality name once resolved
    pub quality: Option<String>,

    /// When the role was resolved
    pub resolved_at: Option<Instant>,

    /// Transfer statistics
    pub stats: SessionStats,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Accepted,
            stream: None,
            quality: None,
            resolved_at: None,
            stats: SessionStats::new(),
        }
    }

    /// Record the parsed identifier
    pub fn resolve(&mut self, role: Role, stream: &str, quality: &str) {
        if self.phase == SessionPhase::Accepted {
            self.phase = SessionPhase::RoleResolved(role);
            self.stream = Some(stream.to_string());
            self.quality = Some(quality.to_string());
            self.resolved_at = Some(Instant::now());
        }
    }

    /// Enter the pumping phase
    pub fn activate(&mut self) {
        if let SessionPhase::RoleResolved(role) = self.phase {
            self.phase = SessionPhase::Active(role);
        }
    }

    /// Mark the session closed
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Resolved role, if any
    pub fn role(&self) -> Option<Role> {
        match self.phase {
            SessionPhase::RoleResolved(role) | SessionPhase::Active(role) => Some(role),
            SessionPhase::Accepted | SessionPhase::Closed => None,
        }
    }

    /// Check if session is pumping bytes
    pub fn is_active(&self) -> bool {
        matches!(self.phase, SessionPhase::Active(_))
    }
}
