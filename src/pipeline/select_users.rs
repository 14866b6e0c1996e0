//! Dedup stage: raw addresses → distinct canonical users.
//!
//! Each address is resolved in its own task. Lookups in flight are capped by a
//! semaphore; the uncapped task-per-address fan-out is not reproduced. A user
//! is forwarded by whichever lookup inserts its canonical address first.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::orchestrator::Stage;
use super::queue::{QueueReceiver, QueueSender};
use crate::error::PipelineError;
use crate::services::IdentityResolver;

pub const STAGE_NAME: &str = "select_users";

pub struct SelectUsers {
    resolver: Arc<dyn IdentityResolver>,
    max_concurrent_lookups: usize,
}

impl SelectUsers {
    pub fn new(resolver: Arc<dyn IdentityResolver>, max_concurrent_lookups: usize) -> Self {
        Self {
            resolver,
            max_concurrent_lookups: max_concurrent_lookups.max(1),
        }
    }
}

#[async_trait]
impl Stage for SelectUsers {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn run(&self, mut input: QueueReceiver, output: QueueSender) -> Vec<PipelineError> {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_lookups));
        let seen: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut lookups = JoinSet::new();
        let mut received = 0usize;

        while let Some(item) = input.recv().await {
            let Some(email) = item.into_email() else {
                continue;
            };
            received += 1;

            // Never closed, so acquisition only fails if the stage is torn down.
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };

            let resolver = Arc::clone(&self.resolver);
            let seen = Arc::clone(&seen);
            let output = output.clone();
            lookups.spawn(async move {
                let _permit = permit;
                let user = resolver.resolve(&email).await;

                let first = seen.lock().await.insert(user.email.clone());
                if first {
                    debug!(email = %email, user = %user.email, "New user");
                    output.send(user);
                }
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = lookups.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Identity lookup task failed");
                errors.push(PipelineError::StagePanicked {
                    stage: STAGE_NAME.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let distinct = seen.lock().await.len();
        info!(emails = received, users = distinct, "Users selected");
        errors
    }
}
