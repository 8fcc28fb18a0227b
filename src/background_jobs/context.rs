use crate::catalog_store::FullCatalogStore;
use crate::enrichment::EnrichmentPipeline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Access to the article catalog.
    pub catalog_store: Arc<dyn FullCatalogStore>,

    /// The enrichment pipeline, for jobs that summarize or synthesize.
    pub pipeline: EnrichmentPipeline,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        catalog_store: Arc<dyn FullCatalogStore>,
        pipeline: EnrichmentPipeline,
    ) -> Self {
        Self {
            cancellation_token,
            catalog_store,
            pipeline,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
