//! The spam-check pipeline: select users → select messages → check spam → combine.

use std::sync::Arc;

use uuid::Uuid;

use super::check_spam::CheckSpam;
use super::combine_results::CombineResults;
use super::orchestrator::{Stage, run_pipeline};
use super::select_messages::SelectMessages;
use super::select_users::SelectUsers;
use super::types::Item;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::services::Services;

/// Final report of a spam-check run.
#[derive(Debug)]
pub struct SpamReport {
    pub run_id: Uuid,
    /// `"<true|false> <id>"`, spam first then ascending id.
    pub lines: Vec<String>,
    /// Collaborator failures the run degraded around.
    pub errors: Vec<PipelineError>,
}

/// Wires the four spam-check stages over a set of collaborators.
pub struct SpamPipeline {
    services: Services,
    config: PipelineConfig,
}

impl SpamPipeline {
    pub fn new(services: Services, config: PipelineConfig) -> Self {
        Self { services, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stages in execution order.
    pub fn stages(&self) -> Vec<Arc<dyn Stage>> {
        vec![
            Arc::new(SelectUsers::new(
                Arc::clone(&self.services.resolver),
                self.config.max_concurrent_lookups,
            )),
            Arc::new(SelectMessages::new(
                Arc::clone(&self.services.enumerator),
                self.config.batch_size,
            )),
            Arc::new(CheckSpam::new(
                Arc::clone(&self.services.classifier),
                self.config.classify_workers,
                self.config.classify_error_policy,
            )),
            Arc::new(CombineResults),
        ]
    }

    /// Run the full pipeline over raw addresses.
    pub async fn run<I, S>(&self, emails: I) -> Result<SpamReport, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let input = emails.into_iter().map(|e| Item::Email(e.into())).collect();
        let report = run_pipeline(self.stages(), input).await?;

        Ok(SpamReport {
            run_id: report.run_id,
            lines: report
                .output
                .into_iter()
                .filter_map(Item::into_line)
                .collect(),
            errors: report.errors,
        })
    }
}
