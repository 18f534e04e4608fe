//! # Session State Machine
//!
//! One machine exists per client connection and drives the session
//! lifecycle across the two transports:
//!
//! ```text
//! Idle -> Connecting -> Active -> Finishing -> Closed
//!            |             |          |
//!            +------- Failed ---------+  (from any non-Closed state)
//! ```
//!
//! Transitions are guarded: an invalid transition returns an error string
//! describing the current state instead of silently corrupting it. Audio
//! arriving before Active is dropped and counted; dropping bounds memory.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle states of a bridged translation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been requested yet.
    Idle,
    /// A start request was received; the upstream connection is being
    /// established.
    Connecting,
    /// Upstream acknowledged the session; audio flows.
    Active,
    /// A stop was requested; waiting for the upstream acknowledgement or
    /// the grace timeout.
    Finishing,
    /// Terminal: the session ended and the upstream transport is released.
    Closed,
    /// Terminal-but-for-Closed: something went wrong. Carries the reason
    /// that was (or will be) surfaced to the client.
    Failed(String),
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Finishing => "finishing",
            SessionState::Closed => "closed",
            SessionState::Failed(_) => "failed",
        }
    }
}

/// Per-connection session bookkeeping.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    /// Opaque unique session token sent upstream in every frame.
    pub session_id: String,
    /// Per-connection correlation id carried in the upstream handshake.
    pub connect_id: String,
    pub source_language: String,
    pub target_language: String,
    pub created_at: DateTime<Utc>,
    state: SessionState,
    /// Audio blocks dropped because the session was not Active.
    dropped_audio_blocks: u64,
}

impl SessionMachine {
    /// A fresh machine in Idle with no identifiers assigned.
    pub fn new() -> Self {
        Self {
            session_id: String::new(),
            connect_id: String::new(),
            source_language: String::new(),
            target_language: String::new(),
            created_at: Utc::now(),
            state: SessionState::Idle,
            dropped_audio_blocks: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Idle -> Connecting. Records the language pair and generates the
    /// session and correlation identifiers.
    ///
    /// Also accepted from Closed/Failed: a client may issue a new start on
    /// the same connection after its previous session ended; nothing is
    /// reused from the old session.
    pub fn begin_connect(
        &mut self,
        source_language: &str,
        target_language: &str,
    ) -> Result<(), String> {
        match self.state {
            SessionState::Idle | SessionState::Closed | SessionState::Failed(_) => {
                self.session_id = Uuid::new_v4().to_string();
                self.connect_id = Uuid::new_v4().to_string();
                self.source_language = source_language.to_string();
                self.target_language = target_language.to_string();
                self.created_at = Utc::now();
                self.dropped_audio_blocks = 0;
                self.state = SessionState::Connecting;
                Ok(())
            }
            _ => Err(format!(
                "cannot start a session from state '{}'",
                self.state.as_str()
            )),
        }
    }

    /// Connecting -> Active, on the upstream "session started" event.
    pub fn activate(&mut self) -> Result<(), String> {
        match self.state {
            SessionState::Connecting => {
                self.state = SessionState::Active;
                Ok(())
            }
            _ => Err(format!(
                "cannot activate from state '{}'",
                self.state.as_str()
            )),
        }
    }

    /// Connecting/Active -> Finishing, on a client stop or disconnect.
    pub fn begin_finish(&mut self) -> Result<(), String> {
        match self.state {
            SessionState::Connecting | SessionState::Active => {
                self.state = SessionState::Finishing;
                Ok(())
            }
            _ => Err(format!(
                "cannot finish from state '{}'",
                self.state.as_str()
            )),
        }
    }

    /// Finishing -> Closed, when the grace timeout fires before the
    /// upstream acknowledgement. Returns whether the expiry closed the
    /// session; a stale timer firing in any other state is a no-op.
    pub fn expire_finish(&mut self) -> bool {
        if self.state == SessionState::Finishing {
            self.state = SessionState::Closed;
            return true;
        }
        false
    }

    /// Any state -> Closed. Idempotent; also the exit from Failed.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Any non-Closed state -> Failed with a reason.
    pub fn fail(&mut self, reason: &str) -> Result<(), String> {
        match self.state {
            SessionState::Closed => Err("session already closed".to_string()),
            _ => {
                self.state = SessionState::Failed(reason.to_string());
                Ok(())
            }
        }
    }

    /// Whether inbound client audio should be forwarded upstream.
    pub fn can_accept_audio(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Count one dropped audio block (session not Active).
    pub fn note_dropped_block(&mut self) {
        self.dropped_audio_blocks += 1;
    }

    pub fn dropped_audio_blocks(&self) -> u64 {
        self.dropped_audio_blocks
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
