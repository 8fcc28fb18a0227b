mod enrichment_backlog;

pub use enrichment_backlog::EnrichmentBacklogJob;
