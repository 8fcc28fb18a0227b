//! SQLite-backed article catalog store.
//!
//! One connection guards both the article table and the interaction ledger,
//! so an interaction insert and its counter delta commit atomically. The
//! counters are only ever written from this module.

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::{CatalogStore, InteractionStore};
use crate::error::{is_constraint_violation, ServiceError, ServiceResult};
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const ARTICLE_COLUMNS: &str = "id, external_id, external_url, title, body, summary, audio_path, \
     audio_status, tags, image_url, published_at, created, active, processed, \
     view_count, like_count, save_count, category";

#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = CATALOG_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &CATALOG_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating catalog db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    let mut current_version = (db_version - BASE_DB_VERSION as i64).max(0) as usize;
    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in CATALOG_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating catalog db from version {} to {}",
                current_version, schema.version
            );
            migration_fn(&tx)?;
            current_version = schema.version;
        }
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
    tx.commit()?;
    Ok(())
}

fn parse_article_row(row: &rusqlite::Row) -> rusqlite::Result<Article> {
    let audio_status: String = row.get(7)?;
    let tags_json: String = row.get(8)?;
    Ok(Article {
        id: row.get(0)?,
        external_id: row.get(1)?,
        external_url: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        summary: row.get(5)?,
        audio_path: row.get(6)?,
        audio_status: AudioStatus::from_db_str(&audio_status),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        image_url: row.get(9)?,
        published_at: row.get(10)?,
        created: row.get(11)?,
        active: row.get::<_, i64>(12)? != 0,
        processed: row.get::<_, i64>(13)? != 0,
        view_count: row.get(14)?,
        like_count: row.get(15)?,
        save_count: row.get(16)?,
        category: row.get(17)?,
    })
}

fn parse_interaction_row(row: &rusqlite::Row) -> rusqlite::Result<Interaction> {
    let kind: String = row.get(3)?;
    Ok(Interaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        article_id: row.get(2)?,
        kind: InteractionKind::from_db_str(&kind).unwrap_or(InteractionKind::View),
        created: row.get(4)?,
    })
}

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn =
            Connection::open(db_path.as_ref()).context("Failed to open catalog database")?;
        migrate_if_needed(&mut conn)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        CATALOG_VERSIONED_SCHEMAS[CATALOG_VERSIONED_SCHEMAS.len() - 1].validate(&conn)?;

        let article_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM article", [], |r| r.get(0))
            .unwrap_or(0);
        info!("Opened article catalog with {} articles", article_count);

        Ok(SqliteCatalogStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn find_by_identity(
        conn: &Connection,
        external_id: Option<&str>,
        external_url: &str,
    ) -> ServiceResult<Option<Article>> {
        if let Some(external_id) = external_id {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM article WHERE external_id = ?1",
                        ARTICLE_COLUMNS
                    ),
                    params![external_id],
                    parse_article_row,
                )
                .optional()?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM article WHERE external_url = ?1",
                    ARTICLE_COLUMNS
                ),
                params![external_url],
                parse_article_row,
            )
            .optional()?)
    }

    fn get_article_with_conn(conn: &Connection, id: i64) -> ServiceResult<Option<Article>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM article WHERE id = ?1", ARTICLE_COLUMNS),
                params![id],
                parse_article_row,
            )
            .optional()?)
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn upsert_article(&self, item: &NewArticle) -> ServiceResult<UpsertOutcome> {
        let conn = self.conn.lock().unwrap();

        if let Some(existing) =
            Self::find_by_identity(&conn, item.external_id.as_deref(), &item.external_url)?
        {
            return Ok(UpsertOutcome {
                article: existing,
                created: false,
            });
        }

        let inserted = conn.execute(
            "INSERT INTO article (external_id, external_url, title, body, image_url, published_at, category) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item.external_id,
                item.external_url,
                item.title,
                item.body,
                item.image_url,
                item.published_at,
                item.category,
            ],
        );

        match inserted {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                let article = Self::get_article_with_conn(&conn, id)?.ok_or_else(|| {
                    ServiceError::Internal(anyhow::anyhow!(
                        "article {} vanished right after insert",
                        id
                    ))
                })?;
                Ok(UpsertOutcome {
                    article,
                    created: true,
                })
            }
            Err(err) if is_constraint_violation(&err) => {
                // Lost the race against a concurrent upsert of the same
                // identity. The winner's row is authoritative.
                let article =
                    Self::find_by_identity(&conn, item.external_id.as_deref(), &item.external_url)?
                        .ok_or_else(|| {
                            ServiceError::Internal(anyhow::anyhow!(
                                "constraint violation for {} but no matching row",
                                item.external_url
                            ))
                        })?;
                Ok(UpsertOutcome {
                    article,
                    created: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get_article(&self, id: i64) -> ServiceResult<Option<Article>> {
        let conn = self.conn.lock().unwrap();
        Self::get_article_with_conn(&conn, id)
    }

    fn get_article_by_external_id(&self, external_id: &str) -> ServiceResult<Option<Article>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM article WHERE external_id = ?1",
                    ARTICLE_COLUMNS
                ),
                params![external_id],
                parse_article_row,
            )
            .optional()?)
    }

    fn get_article_by_external_url(&self, external_url: &str) -> ServiceResult<Option<Article>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM article WHERE external_url = ?1",
                    ARTICLE_COLUMNS
                ),
                params![external_url],
                parse_article_row,
            )
            .optional()?)
    }

    fn search_articles(
        &self,
        query: &str,
        page: usize,
        limit: usize,
        sort_by: ArticleSortBy,
        order: SortOrder,
    ) -> ServiceResult<Vec<Article>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", query.to_lowercase());
        let sql = format!(
            "SELECT {} FROM article \
             WHERE active = 1 AND (LOWER(title) LIKE ?1 OR LOWER(summary) LIKE ?1 OR LOWER(tags) LIKE ?1) \
             ORDER BY {} {} LIMIT ?2 OFFSET ?3",
            ARTICLE_COLUMNS,
            sort_by.column(),
            order.sql(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let articles = stmt
            .query_map(
                params![pattern, limit as i64, (page * limit) as i64],
                parse_article_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(articles)
    }

    fn get_unprocessed(&self, limit: usize) -> ServiceResult<Vec<Article>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM article WHERE processed = 0 AND active = 1 ORDER BY created ASC, id ASC LIMIT ?1",
            ARTICLE_COLUMNS
        ))?;
        let articles = stmt
            .query_map(params![limit as i64], parse_article_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(articles)
    }

    fn set_article_active(&self, id: i64, active: bool) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE article SET active = ?1 WHERE id = ?2",
            params![active as i64, id],
        )?;
        if changed == 0 {
            return Err(ServiceError::not_found(format!("no article with id {}", id)));
        }
        Ok(())
    }

    fn delete_article(&self, id: i64) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM article WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(ServiceError::not_found(format!("no article with id {}", id)));
        }
        Ok(())
    }

    fn get_articles_count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM article", [], |r| r.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }

    fn store_summary(&self, id: i64, summary: &str, tags: &[String]) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();
        let tags_json = serde_json::to_string(tags)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("serializing tags: {}", e)))?;
        let changed = conn.execute(
            "UPDATE article SET summary = ?1, tags = ?2 WHERE id = ?3",
            params![summary, tags_json, id],
        )?;
        if changed == 0 {
            return Err(ServiceError::not_found(format!("no article with id {}", id)));
        }
        Ok(())
    }

    fn set_audio_status(&self, id: i64, status: AudioStatus) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE article SET audio_status = ?1 WHERE id = ?2",
            params![status.as_db_str(), id],
        )?;
        if changed == 0 {
            return Err(ServiceError::not_found(format!("no article with id {}", id)));
        }
        Ok(())
    }

    fn store_audio(&self, id: i64, audio_path: &str) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE article SET audio_path = ?1, audio_status = 'ready' WHERE id = ?2",
            params![audio_path, id],
        )?;
        if changed == 0 {
            return Err(ServiceError::not_found(format!("no article with id {}", id)));
        }
        Ok(())
    }

    fn set_processed(&self, id: i64) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("UPDATE article SET processed = 1 WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(ServiceError::not_found(format!("no article with id {}", id)));
        }
        Ok(())
    }
}

impl InteractionStore for SqliteCatalogStore {
    fn create_interaction(
        &self,
        user_id: i64,
        article_id: i64,
        kind: InteractionKind,
    ) -> ServiceResult<Interaction> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(anyhow::Error::from)?;

        let article_exists: bool = tx
            .query_row(
                "SELECT 1 FROM article WHERE id = ?1",
                params![article_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !article_exists {
            return Err(ServiceError::not_found(format!(
                "no article with id {}",
                article_id
            )));
        }

        let inserted = tx.execute(
            "INSERT INTO interaction (user_id, article_id, kind) VALUES (?1, ?2, ?3)",
            params![user_id, article_id, kind.as_db_str()],
        );
        if let Err(err) = inserted {
            if is_constraint_violation(&err) {
                return Err(ServiceError::conflict(format!(
                    "user {} already has a {} interaction on article {}",
                    user_id, kind, article_id
                )));
            }
            return Err(err.into());
        }
        let interaction_id = tx.last_insert_rowid();

        // The ledger update rides in the same transaction as the insert.
        tx.execute(
            &format!(
                "UPDATE article SET {} = {} + 1 WHERE id = ?1",
                kind.counter_column(),
                kind.counter_column()
            ),
            params![article_id],
        )?;

        let interaction = tx.query_row(
            "SELECT id, user_id, article_id, kind, created FROM interaction WHERE id = ?1",
            params![interaction_id],
            parse_interaction_row,
        )?;

        tx.commit().map_err(anyhow::Error::from)?;
        Ok(interaction)
    }

    fn delete_interaction(
        &self,
        user_id: i64,
        article_id: i64,
        kind: InteractionKind,
    ) -> ServiceResult<()> {
        if kind.is_repeatable() {
            return Err(ServiceError::bad_request(
                "view interactions are permanent and cannot be removed",
            ));
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(anyhow::Error::from)?;

        let deleted = tx.execute(
            "DELETE FROM interaction WHERE user_id = ?1 AND article_id = ?2 AND kind = ?3",
            params![user_id, article_id, kind.as_db_str()],
        )?;
        if deleted == 0 {
            return Err(ServiceError::not_found(format!(
                "user {} has no {} interaction on article {}",
                user_id, kind, article_id
            )));
        }

        // Clamped at zero so a ledger drift can never push a counter negative.
        tx.execute(
            &format!(
                "UPDATE article SET {} = MAX({} - 1, 0) WHERE id = ?1",
                kind.counter_column(),
                kind.counter_column()
            ),
            params![article_id],
        )?;

        tx.commit().map_err(anyhow::Error::from)?;
        Ok(())
    }

    fn has_interaction(
        &self,
        user_id: i64,
        article_id: i64,
        kind: InteractionKind,
    ) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT 1 FROM interaction WHERE user_id = ?1 AND article_id = ?2 AND kind = ?3 LIMIT 1",
                params![user_id, article_id, kind.as_db_str()],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false))
    }

    fn get_interaction_status(
        &self,
        user_id: i64,
        article_id: i64,
    ) -> ServiceResult<InteractionStatus> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT kind FROM interaction \
             WHERE user_id = ?1 AND article_id = ?2 AND kind != 'view'",
        )?;
        let kinds = stmt
            .query_map(params![user_id, article_id], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(InteractionStatus {
            liked: kinds.iter().any(|k| k == "like"),
            saved: kinds.iter().any(|k| k == "save"),
        })
    }

    fn list_interactions_for_user(
        &self,
        user_id: i64,
        kind: Option<InteractionKind>,
        page: usize,
        limit: usize,
    ) -> ServiceResult<Vec<Interaction>> {
        let conn = self.conn.lock().unwrap();
        let offset = (page * limit) as i64;
        let interactions = match kind {
            Some(kind) => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, article_id, kind, created FROM interaction \
                     WHERE user_id = ?1 AND kind = ?2 ORDER BY created DESC, id DESC LIMIT ?3 OFFSET ?4",
                )?;
                let rows = stmt
                    .query_map(
                        params![user_id, kind.as_db_str(), limit as i64, offset],
                        parse_interaction_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, article_id, kind, created FROM interaction \
                     WHERE user_id = ?1 ORDER BY created DESC, id DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![user_id, limit as i64, offset], parse_interaction_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(interactions)
    }

    fn list_interactions_for_article(&self, article_id: i64) -> ServiceResult<Vec<Interaction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, article_id, kind, created FROM interaction \
             WHERE article_id = ?1 ORDER BY created DESC, id DESC",
        )?;
        let interactions = stmt
            .query_map(params![article_id], parse_interaction_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(interactions)
    }

    fn list_articles_by_interaction(
        &self,
        user_id: i64,
        kind: InteractionKind,
        page: usize,
        limit: usize,
    ) -> ServiceResult<Vec<Article>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM article a \
             JOIN interaction i ON i.article_id = a.id \
             WHERE i.user_id = ?1 AND i.kind = ?2 \
             ORDER BY i.created DESC, i.id DESC LIMIT ?3 OFFSET ?4",
            ARTICLE_COLUMNS
                .split(", ")
                .map(|c| format!("a.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let articles = stmt
            .query_map(
                params![
                    user_id,
                    kind.as_db_str(),
                    limit as i64,
                    (page * limit) as i64
                ],
                parse_article_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(articles)
    }
}
