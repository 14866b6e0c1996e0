//! Classify stage: message ids → spam verdicts through a fixed worker pool.
//!
//! A distributor task moves ids from the stage input onto a shared work queue;
//! `workers` tasks pull from it, call the classifier, and write records to the
//! stage output. The output closes once every worker has exited.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::orchestrator::Stage;
use super::queue::{QueueReceiver, QueueSender};
use super::types::{MsgData, MsgId};
use crate::config::ClassifyErrorPolicy;
use crate::error::PipelineError;
use crate::services::SpamClassifier;

pub const STAGE_NAME: &str = "check_spam";

type WorkQueue = Arc<Mutex<mpsc::Receiver<MsgId>>>;

pub struct CheckSpam {
    classifier: Arc<dyn SpamClassifier>,
    workers: usize,
    on_error: ClassifyErrorPolicy,
}

impl CheckSpam {
    pub fn new(
        classifier: Arc<dyn SpamClassifier>,
        workers: usize,
        on_error: ClassifyErrorPolicy,
    ) -> Self {
        Self {
            classifier,
            workers: workers.max(1),
            on_error,
        }
    }
}

#[async_trait]
impl Stage for CheckSpam {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn run(&self, mut input: QueueReceiver, output: QueueSender) -> Vec<PipelineError> {
        let (work_tx, work_rx) = mpsc::channel::<MsgId>(self.workers);
        let work_rx: WorkQueue = Arc::new(Mutex::new(work_rx));

        let distributor = tokio::spawn(async move {
            let mut queued = 0usize;
            while let Some(item) = input.recv().await {
                let Some(id) = item.into_message_id() else {
                    continue;
                };
                if work_tx.send(id).await.is_err() {
                    break;
                }
                queued += 1;
            }
            queued
        });

        let workers: Vec<_> = (0..self.workers)
            .map(|worker| {
                let classifier = Arc::clone(&self.classifier);
                let work_rx = Arc::clone(&work_rx);
                let output = output.clone();
                let on_error = self.on_error;
                tokio::spawn(
                    run_worker(classifier, work_rx, output, on_error)
                        .instrument(info_span!("worker", worker)),
                )
            })
            .collect();

        let mut errors = Vec::new();

        let queued = match distributor.await {
            Ok(queued) => queued,
            Err(e) => {
                error!(error = %e, "Distributor task failed");
                errors.push(PipelineError::StagePanicked {
                    stage: STAGE_NAME.to_string(),
                    reason: e.to_string(),
                });
                0
            }
        };

        for joined in join_all(workers).await {
            match joined {
                Ok(worker_errors) => errors.extend(worker_errors),
                Err(e) => {
                    error!(error = %e, "Spam worker failed");
                    errors.push(PipelineError::StagePanicked {
                        stage: STAGE_NAME.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(messages = queued, failed = errors.len(), "Spam checks complete");
        errors
    }
}

/// Pull ids until the work queue is closed and empty.
async fn run_worker(
    classifier: Arc<dyn SpamClassifier>,
    work_rx: WorkQueue,
    output: QueueSender,
    on_error: ClassifyErrorPolicy,
) -> Vec<PipelineError> {
    let mut errors = Vec::new();

    loop {
        let next = work_rx.lock().await.recv().await;
        let Some(id) = next else {
            break;
        };

        let has_spam = match classifier.has_spam(id).await {
            Ok(has_spam) => Some(has_spam),
            Err(e) => {
                warn!(id, error = %e, policy = %on_error, "Spam check failed");
                errors.push(PipelineError::Classify { id, source: e });
                on_error.fallback()
            }
        };

        if let Some(has_spam) = has_spam {
            debug!(id, has_spam, "Message checked");
            output.send(MsgData::new(id, has_spam));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::ServiceError;
    use crate::pipeline::queue::queue;
    use crate::pipeline::types::Item;

    /// Spam when the id is even; fails for ids in `failing`.
    struct MockClassifier {
        failing: HashSet<MsgId>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockClassifier {
        fn new(failing: &[MsgId]) -> Self {
            Self {
                failing: failing.iter().copied().collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpamClassifier for MockClassifier {
        async fn has_spam(&self, id: MsgId) -> Result<bool, ServiceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&id) {
                return Err(ServiceError::RequestFailed {
                    service: "mock-classifier".into(),
                    reason: "flaky".into(),
                });
            }
            Ok(id % 2 == 0)
        }
    }

    async fn run_stage(stage: &CheckSpam, items: Vec<Item>) -> (Vec<MsgData>, Vec<PipelineError>) {
        let (in_tx, in_rx) = queue();
        let (out_tx, out_rx) = queue();
        for item in items {
            in_tx.send(item);
        }
        drop(in_tx);

        let errors = stage.run(in_rx, out_tx).await;
        let mut records: Vec<MsgData> = out_rx
            .drain()
            .await
            .into_iter()
            .filter_map(Item::into_record)
            .collect();
        records.sort_by_key(|r| r.id);
        (records, errors)
    }

    fn ids(range: std::ops::Range<MsgId>) -> Vec<Item> {
        range.map(Item::MessageId).collect()
    }

    #[tokio::test]
    async fn one_record_per_id() {
        let stage = CheckSpam::new(Arc::new(MockClassifier::new(&[])), 5, ClassifyErrorPolicy::default());
        let (records, errors) = run_stage(&stage, ids(1..51)).await;

        assert!(errors.is_empty());
        assert_eq!(records.len(), 50);
        assert!(records.iter().zip(1..).all(|(r, id)| r.id == id));
        assert!(records.iter().all(|r| r.has_spam == (r.id % 2 == 0)));
    }

    #[tokio::test]
    async fn pool_size_caps_concurrency() {
        let classifier = Arc::new(MockClassifier::new(&[]));
        let stage = CheckSpam::new(classifier.clone(), 3, ClassifyErrorPolicy::default());
        run_stage(&stage, ids(0..30)).await;

        let peak = classifier.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency was {peak}");
    }

    #[tokio::test]
    async fn failure_reports_clean_by_default() {
        let stage = CheckSpam::new(
            Arc::new(MockClassifier::new(&[4])),
            2,
            ClassifyErrorPolicy::ReportClean,
        );
        let (records, errors) = run_stage(&stage, ids(3..6)).await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[1], MsgData::new(4, false));
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PipelineError::Classify { id: 4, .. }));
    }

    #[tokio::test]
    async fn failure_can_exclude_record() {
        let stage = CheckSpam::new(
            Arc::new(MockClassifier::new(&[4])),
            2,
            ClassifyErrorPolicy::Exclude,
        );
        let (records, errors) = run_stage(&stage, ids(3..6)).await;

        assert_eq!(records, vec![MsgData::new(3, false), MsgData::new(5, false)]);
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn failure_can_report_spam() {
        let stage = CheckSpam::new(
            Arc::new(MockClassifier::new(&[3])),
            1,
            ClassifyErrorPolicy::ReportSpam,
        );
        let (records, _) = run_stage(&stage, ids(3..4)).await;
        assert_eq!(records, vec![MsgData::new(3, true)]);
    }

    #[tokio::test]
    async fn non_id_items_are_skipped() {
        let stage = CheckSpam::new(Arc::new(MockClassifier::new(&[])), 2, ClassifyErrorPolicy::default());
        let items = vec![
            Item::Email("a@x".into()),
            Item::MessageId(2),
            Item::Record(MsgData::new(8, true)),
        ];
        let (records, _) = run_stage(&stage, items).await;
        assert_eq!(records, vec![MsgData::new(2, true)]);
    }

    #[tokio::test]
    async fn empty_input_closes_output() {
        let stage = CheckSpam::new(Arc::new(MockClassifier::new(&[])), 4, ClassifyErrorPolicy::default());
        let (records, errors) = run_stage(&stage, Vec::new()).await;
        assert!(records.is_empty());
        assert!(errors.is_empty());
    }
}
