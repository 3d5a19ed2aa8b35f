//! Session identity and the per-message header

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Fixed 8-byte session identifier.
///
/// Created by the station when a new session is established, or adopted from
/// the vehicle's request when it resumes a paused session. The all-zero id
/// is reserved for the pre-establishment phase.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; 8]);

impl SessionId {
    /// The reserved pre-establishment id.
    pub const ZERO: SessionId = SessionId([0u8; 8]);

    /// Generate a fresh random session id.
    pub fn random() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", hex::encode_upper(self.0))
    }
}

/// Optional fault notification carried in a message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub fault_code: u16,
    pub message: String,
}

/// Message header present on every request and response.
///
/// The session id is validated against the session's own id before any other
/// field of an inbound request is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

impl Header {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            notification: None,
        }
    }

    /// Header for the pre-establishment phase.
    pub fn anonymous() -> Self {
        Self::new(SessionId::ZERO)
    }

    pub fn with_notification(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }
}
