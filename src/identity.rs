//! Author / committer identity, and the `{name, email, timestamp}` signature
//! shape that commits carry (spec §3 `NormalizedCommit`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Git identity: a display name plus an email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl core::fmt::Display for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// An identity plus the instant it acted — one half of a `NormalizedCommit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
}

impl Signature {
    pub fn now(identity: &Identity) -> Self {
        Self {
            name: identity.name.clone(),
            email: identity.email.clone(),
            timestamp: Utc::now(),
        }
    }
}
