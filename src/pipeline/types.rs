//! Shared types for the spam-check pipeline.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Domain values ───────────────────────────────────────────────────

/// Numeric message identifier returned by the mailbox service.
pub type MsgId = u64;

/// Canonical user record returned by the identity resolver.
///
/// Several raw addresses (aliases, different casing) may resolve to the same user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub email: String,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// Spam verdict for a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgData {
    pub id: MsgId,
    pub has_spam: bool,
}

impl MsgData {
    pub fn new(id: MsgId, has_spam: bool) -> Self {
        Self { id, has_spam }
    }

    /// Report order: spam before clean, then ascending id.
    pub fn report_order(&self, other: &Self) -> Ordering {
        other
            .has_spam
            .cmp(&self.has_spam)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Report line, e.g. `true 42`.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MsgData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.has_spam, self.id)
    }
}

// ── Queue envelope ──────────────────────────────────────────────────

/// Value carried between stages.
///
/// Every queue carries the same envelope so any ordered list of stages can be
/// chained. Stages accept the variant they work on and skip the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// Raw input address, not validated.
    Email(String),
    /// Resolved, deduplicated user.
    User(User),
    /// Message to classify.
    MessageId(MsgId),
    /// Classification result.
    Record(MsgData),
    /// Formatted report line.
    Line(String),
}

impl Item {
    pub fn into_email(self) -> Option<String> {
        match self {
            Self::Email(email) => Some(email),
            _ => None,
        }
    }

    pub fn into_user(self) -> Option<User> {
        match self {
            Self::User(user) => Some(user),
            _ => None,
        }
    }

    pub fn into_message_id(self) -> Option<MsgId> {
        match self {
            Self::MessageId(id) => Some(id),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<MsgData> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_line(self) -> Option<String> {
        match self {
            Self::Line(line) => Some(line),
            _ => None,
        }
    }
}

impl From<User> for Item {
    fn from(user: User) -> Self {
        Self::User(user)
    }
}

impl From<MsgId> for Item {
    fn from(id: MsgId) -> Self {
        Self::MessageId(id)
    }
}

impl From<MsgData> for Item {
    fn from(record: MsgData) -> Self {
        Self::Record(record)
    }
}
