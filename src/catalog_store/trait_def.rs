//! Catalog and interaction store trait definitions.
//!
//! Both trait families are implemented by the same SQLite store because the
//! interaction ledger and the article counters must share transactions.

use super::models::*;
use crate::error::ServiceResult;

pub trait CatalogStore: Send + Sync {
    /// Insert the article if no row matches its external identity, otherwise
    /// return the existing row. Losers of a concurrent insert race are
    /// resolved by re-reading the winner's row, never by surfacing an error.
    fn upsert_article(&self, item: &NewArticle) -> ServiceResult<UpsertOutcome>;

    fn get_article(&self, id: i64) -> ServiceResult<Option<Article>>;

    fn get_article_by_external_id(&self, external_id: &str) -> ServiceResult<Option<Article>>;

    fn get_article_by_external_url(&self, external_url: &str) -> ServiceResult<Option<Article>>;

    /// Case-insensitive substring search over title, summary and tags.
    /// Only active articles are returned.
    fn search_articles(
        &self,
        query: &str,
        page: usize,
        limit: usize,
        sort_by: ArticleSortBy,
        order: SortOrder,
    ) -> ServiceResult<Vec<Article>>;

    /// Articles still awaiting enrichment, oldest first.
    fn get_unprocessed(&self, limit: usize) -> ServiceResult<Vec<Article>>;

    fn set_article_active(&self, id: i64, active: bool) -> ServiceResult<()>;

    fn delete_article(&self, id: i64) -> ServiceResult<()>;

    fn get_articles_count(&self) -> usize;

    // Enrichment state transitions. No other code path touches these columns.

    fn store_summary(&self, id: i64, summary: &str, tags: &[String]) -> ServiceResult<()>;

    fn set_audio_status(&self, id: i64, status: AudioStatus) -> ServiceResult<()>;

    /// Persist the synthesized audio path and flip `audio_status` to ready.
    fn store_audio(&self, id: i64, audio_path: &str) -> ServiceResult<()>;

    fn set_processed(&self, id: i64) -> ServiceResult<()>;
}

pub trait InteractionStore: Send + Sync {
    /// Record an interaction and bump the matching counter in one
    /// transaction. Duplicate likes/saves surface as Conflict, a missing
    /// article as NotFound.
    fn create_interaction(
        &self,
        user_id: i64,
        article_id: i64,
        kind: InteractionKind,
    ) -> ServiceResult<Interaction>;

    /// Remove an interaction and decrement its counter (clamped at zero) in
    /// one transaction. Views are permanent and surface as BadRequest.
    fn delete_interaction(
        &self,
        user_id: i64,
        article_id: i64,
        kind: InteractionKind,
    ) -> ServiceResult<()>;

    fn has_interaction(
        &self,
        user_id: i64,
        article_id: i64,
        kind: InteractionKind,
    ) -> ServiceResult<bool>;

    /// Liked + saved status for one article, answered with a single query.
    fn get_interaction_status(
        &self,
        user_id: i64,
        article_id: i64,
    ) -> ServiceResult<InteractionStatus>;

    fn list_interactions_for_user(
        &self,
        user_id: i64,
        kind: Option<InteractionKind>,
        page: usize,
        limit: usize,
    ) -> ServiceResult<Vec<Interaction>>;

    fn list_interactions_for_article(&self, article_id: i64) -> ServiceResult<Vec<Interaction>>;

    /// Articles the user liked/saved, most recently interacted first.
    fn list_articles_by_interaction(
        &self,
        user_id: i64,
        kind: InteractionKind,
        page: usize,
        limit: usize,
    ) -> ServiceResult<Vec<Article>>;
}

pub trait FullCatalogStore: CatalogStore + InteractionStore {}

impl<T: CatalogStore + InteractionStore> FullCatalogStore for T {}
