//! Periodic sweep over articles that never finished enrichment.
//!
//! Picks up articles created before enrichment was configured, articles
//! whose first pass failed, and audio that came back failed. One batch per
//! run; whatever is left waits for the next tick.

use super::super::context::JobContext;
use super::super::job::{BackgroundJob, JobError, JobSchedule};
use crate::catalog_store::AudioStatus;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_BATCH_SIZE: usize = 20;

pub struct EnrichmentBacklogJob {
    interval: Duration,
    batch_size: usize,
}

impl EnrichmentBacklogJob {
    pub fn new(interval: Duration) -> Self {
        EnrichmentBacklogJob {
            interval,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[async_trait]
impl BackgroundJob for EnrichmentBacklogJob {
    fn id(&self) -> &'static str {
        "enrichment_backlog"
    }

    fn name(&self) -> &'static str {
        "Enrichment Backlog"
    }

    fn description(&self) -> &'static str {
        "Summarizes and synthesizes articles that missed or failed enrichment"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    fn run_on_startup(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let backlog = ctx
            .catalog_store
            .get_unprocessed(self.batch_size)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        if backlog.is_empty() {
            return Ok(());
        }
        info!("Enrichment backlog: {} articles to revisit", backlog.len());

        let mut summarized = 0usize;
        let mut audio_retried = 0usize;
        for article in backlog {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }

            if article.summary.is_none() {
                match ctx.pipeline.process(article.id).await {
                    Ok(_) => summarized += 1,
                    Err(err) => {
                        warn!(
                            article_id = article.id,
                            "Backlog enrichment failed: {}", err
                        );
                    }
                }
            } else if ctx.pipeline.audio_enabled()
                && matches!(article.audio_status, AudioStatus::None | AudioStatus::Failed)
            {
                match ctx.pipeline.regenerate_audio(article.id) {
                    Ok(true) => audio_retried += 1,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            article_id = article.id,
                            "Backlog audio retry failed: {}", err
                        );
                    }
                }
            }
        }

        info!(
            summarized = summarized,
            audio_retried = audio_retried,
            "Enrichment backlog pass complete"
        );
        Ok(())
    }
}
