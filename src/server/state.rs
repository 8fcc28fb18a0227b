use axum::extract::FromRef;

use crate::catalog_store::FullCatalogStore;
use crate::enrichment::{AudioStore, EnrichmentPipeline};
use crate::recommender::RecommenderSync;
use crate::user::UserManager;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedCatalogStore = Arc<dyn FullCatalogStore>;
pub type GuardedUserManager = Arc<UserManager>;
pub type GuardedAudioStore = Arc<AudioStore>;
pub type OptionalPipeline = Option<EnrichmentPipeline>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalog_store: GuardedCatalogStore,
    pub user_manager: GuardedUserManager,
    pub audio_store: GuardedAudioStore,
    pub pipeline: OptionalPipeline,
    pub recommender: RecommenderSync,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedCatalogStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog_store.clone()
    }
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedAudioStore {
    fn from_ref(input: &ServerState) -> Self {
        input.audio_store.clone()
    }
}

impl FromRef<ServerState> for OptionalPipeline {
    fn from_ref(input: &ServerState) -> Self {
        input.pipeline.clone()
    }
}

impl FromRef<ServerState> for RecommenderSync {
    fn from_ref(input: &ServerState) -> Self {
        input.recommender.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
