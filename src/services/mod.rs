//! External collaborators the pipeline calls into.
//!
//! - `IdentityResolver` — raw address → canonical user
//! - `MessageEnumerator` — batch of users → message ids
//! - `SpamClassifier` — message id → spam verdict
//!
//! `FixtureServices` implements all three from a JSON document.

pub mod fixture;

pub use fixture::{FixtureData, FixtureServices};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::pipeline::types::{MsgId, User};

/// Maps a raw address to its canonical user. Assumed total.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, email: &str) -> User;
}

/// Lists the message ids owned by a batch of users.
#[async_trait]
pub trait MessageEnumerator: Send + Sync {
    /// Callers never pass more than the configured batch size.
    async fn list_message_ids(&self, users: &[User]) -> Result<Vec<MsgId>, ServiceError>;
}

/// Judges a single message.
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn has_spam(&self, id: MsgId) -> Result<bool, ServiceError>;
}

/// Collaborator bundle shared by the pipeline stages.
#[derive(Clone)]
pub struct Services {
    pub resolver: Arc<dyn IdentityResolver>,
    pub enumerator: Arc<dyn MessageEnumerator>,
    pub classifier: Arc<dyn SpamClassifier>,
}

impl Services {
    pub fn new(
        resolver: Arc<dyn IdentityResolver>,
        enumerator: Arc<dyn MessageEnumerator>,
        classifier: Arc<dyn SpamClassifier>,
    ) -> Self {
        Self {
            resolver,
            enumerator,
            classifier,
        }
    }

    /// Use one value for all three roles.
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: IdentityResolver + MessageEnumerator + SpamClassifier + 'static,
    {
        Self {
            resolver: backend.clone(),
            enumerator: backend.clone(),
            classifier: backend,
        }
    }
}
