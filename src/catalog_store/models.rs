//! Data models for articles and interactions.

use serde::{Deserialize, Serialize};

/// A catalog article. `id` is the immutable internal key; `external_id` and
/// `external_url` identify the article towards upstream feeds.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: i64,
    pub external_id: Option<String>,
    pub external_url: String,
    pub title: String,
    pub body: Option<String>,
    pub summary: Option<String>,
    pub audio_path: Option<String>,
    pub audio_status: AudioStatus,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub published_at: Option<i64>,
    pub created: i64,
    pub active: bool,
    pub processed: bool,
    pub view_count: i64,
    pub like_count: i64,
    pub save_count: i64,
    pub category: Option<String>,
}

/// Input payload for article upserts.
#[derive(Debug, Clone, Deserialize)]
pub struct NewArticle {
    pub external_id: Option<String>,
    pub external_url: String,
    pub title: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub published_at: Option<i64>,
    pub category: Option<String>,
}

/// State of the synthesized audio for an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioStatus {
    None,
    Pending,
    Ready,
    Failed,
}

impl AudioStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AudioStatus::None => "none",
            AudioStatus::Pending => "pending",
            AudioStatus::Ready => "ready",
            AudioStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "pending" => AudioStatus::Pending,
            "ready" => AudioStatus::Ready,
            "failed" => AudioStatus::Failed,
            _ => AudioStatus::None,
        }
    }
}

/// Result of a single upsert: the stored row and whether this call created it.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    pub article: Article,
    pub created: bool,
}

/// Summary of a bulk upsert. Per-item failures are skipped, never fatal.
#[derive(Debug, Serialize)]
pub struct BulkUpsertOutcome {
    pub created_count: usize,
    pub existing_count: usize,
    pub skipped_count: usize,
    pub items: Vec<UpsertOutcome>,
}

/// A recorded user interaction with an article.
#[derive(Debug, Clone, Serialize)]
pub struct Interaction {
    pub id: i64,
    pub user_id: i64,
    pub article_id: i64,
    pub kind: InteractionKind,
    pub created: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    View,
    Like,
    Save,
}

impl InteractionKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Like => "like",
            InteractionKind::Save => "save",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "view" => Some(InteractionKind::View),
            "like" => Some(InteractionKind::Like),
            "save" => Some(InteractionKind::Save),
            _ => None,
        }
    }

    /// Column on the article row holding this kind's counter.
    pub fn counter_column(&self) -> &'static str {
        match self {
            InteractionKind::View => "view_count",
            InteractionKind::Like => "like_count",
            InteractionKind::Save => "save_count",
        }
    }

    /// Views may repeat; likes and saves are at most one per user per article.
    pub fn is_repeatable(&self) -> bool {
        matches!(self, InteractionKind::View)
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Per-user interaction status for an article, answered with a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InteractionStatus {
    pub liked: bool,
    pub saved: bool,
}

/// Sort key for article search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArticleSortBy {
    #[default]
    Created,
    Published,
    ViewCount,
    LikeCount,
    Title,
}

impl ArticleSortBy {
    pub fn column(&self) -> &'static str {
        match self {
            ArticleSortBy::Created => "created",
            ArticleSortBy::Published => "published_at",
            ArticleSortBy::ViewCount => "view_count",
            ArticleSortBy::LikeCount => "like_count",
            ArticleSortBy::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}
