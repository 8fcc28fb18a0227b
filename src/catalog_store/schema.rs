//! SQLite schema definitions for the article catalog database.
//!
//! Articles and interactions live in the same database on purpose: an
//! interaction insert and its counter update must commit in one transaction.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, UniqueIndex, VersionedSchema,
    DEFAULT_TIMESTAMP,
};

const ARTICLE_TABLE: Table = Table {
    name: "article",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("external_id", &SqlType::Text, is_unique = true),
        sqlite_column!(
            "external_url",
            &SqlType::Text,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text),
        sqlite_column!("summary", &SqlType::Text),
        sqlite_column!("audio_path", &SqlType::Text),
        sqlite_column!(
            "audio_status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'none'")
        ),
        // JSON array of tag strings
        sqlite_column!(
            "tags",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!("published_at", &SqlType::Integer),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "processed",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "view_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "like_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "save_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("category", &SqlType::Text),
    ],
    indices: &[
        ("idx_article_processed", "processed"),
        ("idx_article_created", "created"),
    ],
    unique_indices: &[],
};

const ARTICLE_FK: ForeignKey = ForeignKey {
    foreign_table: "article",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// Views can repeat, so the uniqueness rule only covers the other kinds.
const INTERACTION_TABLE: Table = Table {
    name: "interaction",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "article_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTICLE_FK)
        ),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_interaction_user", "user_id"),
        ("idx_interaction_article", "article_id"),
    ],
    unique_indices: &[UniqueIndex {
        name: "idx_interaction_user_article_kind",
        columns: &["user_id", "article_id", "kind"],
        condition: Some("kind != 'view'"),
    }],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[ARTICLE_TABLE, INTERACTION_TABLE],
    migration: None,
}];
