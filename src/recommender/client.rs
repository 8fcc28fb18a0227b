//! HTTP client for the external recommendation service.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Catalog item as the recommender sees it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecommenderItem {
    pub external_id: String,
    pub title: String,
    pub labels: Vec<String>,
}

/// Feedback vocabulary of the recommendation service. It predates this
/// server, hence the different names for the same actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Read,
    Like,
    Bookmark,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Read => "read",
            FeedbackKind::Like => "like",
            FeedbackKind::Bookmark => "bookmark",
        }
    }
}

impl From<crate::catalog_store::InteractionKind> for FeedbackKind {
    fn from(kind: crate::catalog_store::InteractionKind) -> Self {
        use crate::catalog_store::InteractionKind;
        match kind {
            InteractionKind::View => FeedbackKind::Read,
            InteractionKind::Like => FeedbackKind::Like,
            InteractionKind::Save => FeedbackKind::Bookmark,
        }
    }
}

#[async_trait]
pub trait RecommenderClient: Send + Sync {
    async fn upsert_item(&self, item: &RecommenderItem) -> Result<()>;

    async fn send_feedback(
        &self,
        user_id: i64,
        external_id: &str,
        kind: FeedbackKind,
    ) -> Result<()>;

    async fn remove_feedback(
        &self,
        user_id: i64,
        external_id: &str,
        kind: FeedbackKind,
    ) -> Result<()>;

    /// Recommended item external ids for a user, best first.
    async fn get_recommendations(&self, user_id: i64, limit: usize) -> Result<Vec<String>>;
}

pub struct HttpRecommenderClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRecommenderClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct FeedbackRequest<'a> {
    user_id: i64,
    item_id: &'a str,
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct RecommendationsResponse {
    items: Vec<String>,
}

#[async_trait]
impl RecommenderClient for HttpRecommenderClient {
    async fn upsert_item(&self, item: &RecommenderItem) -> Result<()> {
        debug!(external_id = %item.external_id, "Upserting recommender item");
        let response = self
            .client
            .put(format!("{}/items/{}", self.base_url, item.external_id))
            .json(item)
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("item upsert failed with {}", response.status()));
        }
        Ok(())
    }

    async fn send_feedback(
        &self,
        user_id: i64,
        external_id: &str,
        kind: FeedbackKind,
    ) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/feedback", self.base_url))
            .json(&FeedbackRequest {
                user_id,
                item_id: external_id,
                kind: kind.as_str(),
            })
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("feedback failed with {}", response.status()));
        }
        Ok(())
    }

    async fn remove_feedback(
        &self,
        user_id: i64,
        external_id: &str,
        kind: FeedbackKind,
    ) -> Result<()> {
        let response = self
            .client
            .delete(format!(
                "{}/feedback/{}/{}/{}",
                self.base_url,
                user_id,
                external_id,
                kind.as_str()
            ))
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("feedback removal failed with {}", response.status()));
        }
        Ok(())
    }

    async fn get_recommendations(&self, user_id: i64, limit: usize) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!(
                "{}/recommendations/{}?limit={}",
                self.base_url, user_id, limit
            ))
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "recommendations failed with {}",
                response.status()
            ));
        }
        let body: RecommendationsResponse = response.json().await?;
        Ok(body.items)
    }
}
