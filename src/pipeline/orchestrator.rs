//! Stage chaining.
//!
//! `run_pipeline` allocates one queue per stage, spawns one task per stage with
//! the previous stage's output as its input, drains the last queue, and joins
//! every stage. A stage's output queue closes when its task ends, whether it
//! returned normally or panicked, so downstream stages always see end of stream.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use super::queue::{QueueReceiver, QueueSender, queue};
use super::types::Item;
use crate::error::PipelineError;

/// One pipeline step.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name used in logs and error reports.
    fn name(&self) -> &'static str;

    /// Consume `input` until it closes, writing results to `output`.
    ///
    /// Returns the non-fatal errors observed along the way. `output` is
    /// dropped when this returns, which closes the queue downstream.
    async fn run(&self, input: QueueReceiver, output: QueueSender) -> Vec<PipelineError>;
}

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Everything the last stage produced, in arrival order.
    pub output: Vec<Item>,
    /// Non-fatal errors from every stage.
    pub errors: Vec<PipelineError>,
}

impl PipelineReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Run `stages` in order over `input` and wait for the last queue to close.
pub async fn run_pipeline(
    stages: Vec<Arc<dyn Stage>>,
    input: Vec<Item>,
) -> Result<PipelineReport, PipelineError> {
    if stages.is_empty() {
        return Err(PipelineError::EmptyPipeline);
    }

    let run_id = Uuid::new_v4();
    let span = info_span!("pipeline", %run_id);

    async move {
        let started_at = Utc::now();
        info!(stages = stages.len(), items = input.len(), "Pipeline started");

        let (seed, mut inbound) = queue();
        for item in input {
            seed.send(item);
        }
        drop(seed);

        let mut names = Vec::with_capacity(stages.len());
        let mut handles = Vec::with_capacity(stages.len());
        for stage in stages {
            let (outbound, next) = queue();
            let input = std::mem::replace(&mut inbound, next);
            let name = stage.name();
            names.push(name);
            handles.push(tokio::spawn(
                async move {
                    debug!("Stage started");
                    let errors = stage.run(input, outbound).await;
                    debug!(errors = errors.len(), "Stage finished");
                    errors
                }
                .instrument(info_span!("stage", stage = name)),
            ));
        }

        let output = inbound.drain().await;

        let mut errors = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(stage_errors) => errors.extend(stage_errors),
                Err(e) => {
                    error!(stage = name, error = %e, "Stage task failed");
                    errors.push(PipelineError::StagePanicked {
                        stage: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let finished_at = Utc::now();
        info!(
            output = output.len(),
            errors = errors.len(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Pipeline finished"
        );

        Ok(PipelineReport {
            run_id,
            started_at,
            finished_at,
            output,
            errors,
        })
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::MsgData;

    /// Doubles every message id, skips everything else.
    struct Doubler;

    #[async_trait]
    impl Stage for Doubler {
        fn name(&self) -> &'static str {
            "doubler"
        }

        async fn run(&self, mut input: QueueReceiver, output: QueueSender) -> Vec<PipelineError> {
            while let Some(item) = input.recv().await {
                if let Some(id) = item.into_message_id() {
                    output.send(id * 2);
                }
            }
            Vec::new()
        }
    }

    /// Ignores its input and emits fixed records.
    struct Generator;

    #[async_trait]
    impl Stage for Generator {
        fn name(&self) -> &'static str {
            "generator"
        }

        async fn run(&self, _input: QueueReceiver, output: QueueSender) -> Vec<PipelineError> {
            output.send(MsgData::new(1, true));
            output.send(MsgData::new(2, false));
            Vec::new()
        }
    }

    struct Panicker;

    #[async_trait]
    impl Stage for Panicker {
        fn name(&self) -> &'static str {
            "panicker"
        }

        async fn run(&self, _input: QueueReceiver, _output: QueueSender) -> Vec<PipelineError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn empty_stage_list_is_rejected() {
        let err = run_pipeline(Vec::new(), vec![Item::MessageId(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyPipeline));
    }

    #[tokio::test]
    async fn chains_stages_in_order() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Doubler), Arc::new(Doubler)];
        let report = run_pipeline(stages, vec![Item::MessageId(1), Item::MessageId(5)])
            .await
            .unwrap();
        assert_eq!(report.output, vec![Item::MessageId(4), Item::MessageId(20)]);
        assert!(!report.has_errors());
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn mismatched_items_are_dropped() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Doubler)];
        let report = run_pipeline(
            stages,
            vec![Item::Email("a@x".into()), Item::MessageId(3), Item::Line("x".into())],
        )
        .await
        .unwrap();
        assert_eq!(report.output, vec![Item::MessageId(6)]);
    }

    #[tokio::test]
    async fn empty_input_terminates() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Doubler), Arc::new(Doubler)];
        let report = run_pipeline(stages, Vec::new()).await.unwrap();
        assert!(report.output.is_empty());
    }

    #[tokio::test]
    async fn first_stage_may_ignore_input() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Generator)];
        let report = run_pipeline(stages, Vec::new()).await.unwrap();
        assert_eq!(report.output.len(), 2);
    }

    #[tokio::test]
    async fn panicking_stage_still_closes_its_output() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Panicker), Arc::new(Doubler)];
        let report = run_pipeline(stages, vec![Item::MessageId(1)]).await.unwrap();
        assert!(report.output.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            &report.errors[0],
            PipelineError::StagePanicked { stage, .. } if stage == "panicker"
        ));
    }
}
