//! Aggregate stage: collects every verdict, sorts, and emits report lines.
//!
//! Not streaming. Nothing is emitted until the input closes.

use async_trait::async_trait;
use tracing::info;

use super::orchestrator::Stage;
use super::queue::{QueueReceiver, QueueSender};
use super::types::{Item, MsgData};
use crate::error::PipelineError;

pub const STAGE_NAME: &str = "combine_results";

#[derive(Debug, Default)]
pub struct CombineResults;

#[async_trait]
impl Stage for CombineResults {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn run(&self, mut input: QueueReceiver, output: QueueSender) -> Vec<PipelineError> {
        let mut records = Vec::new();
        while let Some(item) = input.recv().await {
            if let Some(record) = item.into_record() {
                records.push(record);
            }
        }

        sort_records(&mut records);
        let spam = records.iter().filter(|r| r.has_spam).count();

        for record in &records {
            if !output.send(Item::Line(record.to_line())) {
                break;
            }
        }

        info!(messages = records.len(), spam, "Results combined");
        Vec::new()
    }
}

/// Spam first, then ascending id.
pub fn sort_records(records: &mut [MsgData]) {
    records.sort_by(MsgData::report_order);
}
