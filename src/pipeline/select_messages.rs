//! Batch stage: users → message ids.
//!
//! Users are buffered into batches of `batch_size`. Each full batch is listed
//! in its own task; the leftover partial batch is listed inline once the input
//! closes. A failed listing is logged and contributes no ids.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::orchestrator::Stage;
use super::queue::{QueueReceiver, QueueSender};
use super::types::User;
use crate::error::PipelineError;
use crate::services::MessageEnumerator;

pub const STAGE_NAME: &str = "select_messages";

pub struct SelectMessages {
    enumerator: Arc<dyn MessageEnumerator>,
    batch_size: usize,
}

impl SelectMessages {
    pub fn new(enumerator: Arc<dyn MessageEnumerator>, batch_size: usize) -> Self {
        Self {
            enumerator,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl Stage for SelectMessages {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn run(&self, mut input: QueueReceiver, output: QueueSender) -> Vec<PipelineError> {
        let mut batch: Vec<User> = Vec::with_capacity(self.batch_size);
        let mut in_flight = JoinSet::new();
        let mut batches = 0usize;

        while let Some(item) = input.recv().await {
            let Some(user) = item.into_user() else {
                continue;
            };
            batch.push(user);

            if batch.len() == self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                let enumerator = Arc::clone(&self.enumerator);
                let output = output.clone();
                batches += 1;
                in_flight.spawn(async move { forward_batch(enumerator.as_ref(), &full, &output).await });
            }
        }

        let mut errors = Vec::new();

        if !batch.is_empty() {
            batches += 1;
            if let Err(e) = forward_batch(self.enumerator.as_ref(), &batch, &output).await {
                errors.push(e);
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => {
                    error!(error = %e, "Batch task failed");
                    errors.push(PipelineError::StagePanicked {
                        stage: STAGE_NAME.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(batches, failed = errors.len(), "Messages selected");
        errors
    }
}

/// List one batch and forward every id.
async fn forward_batch(
    enumerator: &dyn MessageEnumerator,
    users: &[User],
    output: &QueueSender,
) -> Result<(), PipelineError> {
    match enumerator.list_message_ids(users).await {
        Ok(ids) => {
            debug!(users = users.len(), ids = ids.len(), "Batch listed");
            for id in ids {
                output.send(id);
            }
            Ok(())
        }
        Err(e) => {
            warn!(users = users.len(), error = %e, "Listing messages failed, skipping batch");
            Err(PipelineError::Enumerate {
                batch_size: users.len(),
                source: e,
            })
        }
    }
}
