//! In-memory collaborators backed by a JSON fixture.
//!
//! ```json
//! {
//!   "aliases":   { "Alice@X": "alice@x" },
//!   "mailboxes": { "alice@x": [1, 2], "bob@x": [3] },
//!   "spam":      [2, 3],
//!   "failing_ids": [],
//!   "max_batch": 2
//! }
//! ```
//!
//! Unknown addresses resolve to themselves; users without a mailbox own no messages.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{IdentityResolver, MessageEnumerator, SpamClassifier};
use crate::error::{ConfigError, ServiceError};
use crate::pipeline::types::{MsgId, User};

/// Raw fixture document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureData {
    /// Raw address → canonical address.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Canonical address → owned message ids.
    #[serde(default)]
    pub mailboxes: HashMap<String, Vec<MsgId>>,
    /// Ids judged as spam.
    #[serde(default)]
    pub spam: HashSet<MsgId>,
    /// Ids whose spam check fails.
    #[serde(default)]
    pub failing_ids: HashSet<MsgId>,
    /// Largest batch the mailbox listing accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch: Option<usize>,
}

/// Fixture-backed resolver, enumerator and classifier.
#[derive(Debug, Clone)]
pub struct FixtureServices {
    data: FixtureData,
}

impl FixtureServices {
    pub fn new(data: FixtureData) -> Self {
        Self { data }
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let data: FixtureData =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(Self::new(data))
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn data(&self) -> &FixtureData {
        &self.data
    }
}

#[async_trait]
impl IdentityResolver for FixtureServices {
    async fn resolve(&self, email: &str) -> User {
        let canonical = self
            .data
            .aliases
            .get(email)
            .cloned()
            .unwrap_or_else(|| email.to_string());
        User::new(canonical)
    }
}

#[async_trait]
impl MessageEnumerator for FixtureServices {
    async fn list_message_ids(&self, users: &[User]) -> Result<Vec<MsgId>, ServiceError> {
        if let Some(max) = self.data.max_batch {
            if users.len() > max {
                return Err(ServiceError::BatchTooLarge {
                    size: users.len(),
                    max,
                });
            }
        }

        let ids: Vec<MsgId> = users
            .iter()
            .filter_map(|user| self.data.mailboxes.get(&user.email))
            .flatten()
            .copied()
            .collect();
        debug!(users = users.len(), ids = ids.len(), "Listed fixture messages");
        Ok(ids)
    }
}

#[async_trait]
impl SpamClassifier for FixtureServices {
    async fn has_spam(&self, id: MsgId) -> Result<bool, ServiceError> {
        if self.data.failing_ids.contains(&id) {
            return Err(ServiceError::RequestFailed {
                service: "fixture-classifier".to_string(),
                reason: format!("message {id} is marked as failing"),
            });
        }
        Ok(self.data.spam.contains(&id))
    }
}
