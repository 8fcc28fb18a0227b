//! Best-effort event stream towards the recommendation service.
//!
//! Nothing here may ever fail a user request: events that cannot be queued
//! are dropped with a warning, delivery failures are logged and skipped, and
//! a dead recommender just means empty recommendations.

use super::client::{FeedbackKind, RecommenderClient, RecommenderItem};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum RecommenderEvent {
    ItemUpserted {
        external_id: String,
        title: String,
        labels: Vec<String>,
    },
    Feedback {
        user_id: i64,
        external_id: String,
        kind: FeedbackKind,
    },
    FeedbackRemoved {
        user_id: i64,
        external_id: String,
        kind: FeedbackKind,
    },
}

#[derive(Clone)]
pub struct RecommenderSync {
    tx: Option<mpsc::Sender<RecommenderEvent>>,
    client: Option<Arc<dyn RecommenderClient>>,
}

impl RecommenderSync {
    /// No recommender configured: publishing is a no-op and recommendation
    /// queries come back empty.
    pub fn disabled() -> Self {
        RecommenderSync {
            tx: None,
            client: None,
        }
    }

    /// Start the dispatcher task draining the event queue towards the client.
    pub fn start(client: Arc<dyn RecommenderClient>) -> Self {
        Self::start_with_capacity(client, EVENT_QUEUE_CAPACITY)
    }

    fn start_with_capacity(client: Arc<dyn RecommenderClient>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<RecommenderEvent>(capacity);
        let dispatch_client = client.clone();
        tokio::spawn(async move {
            info!("Recommender sync dispatcher started");
            while let Some(event) = rx.recv().await {
                let result = match &event {
                    RecommenderEvent::ItemUpserted {
                        external_id,
                        title,
                        labels,
                    } => {
                        dispatch_client
                            .upsert_item(&RecommenderItem {
                                external_id: external_id.clone(),
                                title: title.clone(),
                                labels: labels.clone(),
                            })
                            .await
                    }
                    RecommenderEvent::Feedback {
                        user_id,
                        external_id,
                        kind,
                    } => {
                        dispatch_client
                            .send_feedback(*user_id, external_id, *kind)
                            .await
                    }
                    RecommenderEvent::FeedbackRemoved {
                        user_id,
                        external_id,
                        kind,
                    } => {
                        dispatch_client
                            .remove_feedback(*user_id, external_id, *kind)
                            .await
                    }
                };
                if let Err(err) = result {
                    warn!("Dropping recommender event after delivery failure: {}", err);
                }
            }
            info!("Recommender sync dispatcher stopped");
        });
        RecommenderSync {
            tx: Some(tx),
            client: Some(client),
        }
    }

    pub fn enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue an event. Never blocks; a full queue drops the event.
    pub fn publish(&self, event: RecommenderEvent) {
        let tx = match &self.tx {
            Some(tx) => tx,
            None => return,
        };
        if let Err(err) = tx.try_send(event) {
            warn!("Recommender event queue rejected event: {}", err);
        }
    }

    /// Recommended external ids for a user. Failures come back as empty.
    pub async fn get_recommendations(&self, user_id: i64, limit: usize) -> Vec<String> {
        let client = match &self.client {
            Some(client) => client,
            None => return Vec::new(),
        };
        match client.get_recommendations(user_id, limit).await {
            Ok(items) => items,
            Err(err) => {
                warn!(user_id = user_id, "Recommendations unavailable: {}", err);
                Vec::new()
            }
        }
    }
}
