//! SQLite-backed user store: users, auth tokens and feeds.

use super::auth::{AuthToken, AuthTokenValue};
use super::user_models::{Feed, User};
use super::user_store::{AuthTokenStore, FeedStore, UserStore};
use crate::error::{map_constraint_violation, ServiceError, ServiceResult};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
    DEFAULT_TIMESTAMP,
};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const USER_TABLE: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "is_admin",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_indices: &[],
};

const USER_FK: ForeignKey = ForeignKey {
    foreign_table: "user",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const AUTH_TOKEN_TABLE: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[("idx_auth_token_user", "user_id")],
    unique_indices: &[],
};

// One feed row per user, article ids stored as a JSON array.
const FEED_TABLE: Table = Table {
    name: "feed",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!(
            "article_ids",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "position",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_indices: &[],
};

pub const USER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[USER_TABLE, AUTH_TOKEN_TABLE, FEED_TABLE],
    migration: None,
}];

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = USER_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &USER_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating user db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    let mut current_version = (db_version - BASE_DB_VERSION as i64).max(0) as usize;
    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in USER_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating user db from version {} to {}",
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

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        handle: row.get(1)?,
        is_admin: row.get::<_, i64>(2)? != 0,
        created: row.get(3)?,
    })
}

fn parse_feed_row(row: &rusqlite::Row) -> rusqlite::Result<Feed> {
    let article_ids_json: String = row.get(1)?;
    let position: i64 = row.get(2)?;
    Ok(Feed {
        user_id: row.get(0)?,
        article_ids: serde_json::from_str(&article_ids_json).unwrap_or_default(),
        position: position.max(0) as usize,
        updated: row.get(3)?,
    })
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref()).context("Failed to open user database")?;
        migrate_if_needed(&mut conn)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        USER_VERSIONED_SCHEMAS[USER_VERSIONED_SCHEMAS.len() - 1].validate(&conn)?;

        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, handle: &str, is_admin: bool) -> ServiceResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user (handle, is_admin) VALUES (?1, ?2)",
            params![handle, is_admin as i64],
        )
        .map_err(|err| {
            map_constraint_violation(err, &format!("handle '{}' is already taken", handle))
        })?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, handle, is_admin, created FROM user WHERE id = ?1",
            params![id],
            parse_user_row,
        )
        .map_err(ServiceError::from)
    }

    fn get_user(&self, id: i64) -> ServiceResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, handle, is_admin, created FROM user WHERE id = ?1",
                params![id],
                parse_user_row,
            )
            .optional()?)
    }

    fn get_user_by_handle(&self, handle: &str) -> ServiceResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, handle, is_admin, created FROM user WHERE handle = ?1",
                params![handle],
                parse_user_row,
            )
            .optional()?)
    }

    fn get_users_count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM user", [], |r| r.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }
}

impl AuthTokenStore for SqliteUserStore {
    fn create_token(&self, user_id: i64) -> ServiceResult<AuthToken> {
        let conn = self.conn.lock().unwrap();
        let value = AuthTokenValue::generate();
        conn.execute(
            "INSERT INTO auth_token (user_id, value) VALUES (?1, ?2)",
            params![user_id, value.0],
        )?;
        let created: i64 = conn.query_row(
            "SELECT created FROM auth_token WHERE value = ?1",
            params![value.0],
            |r| r.get(0),
        )?;
        Ok(AuthToken {
            user_id,
            value,
            created,
            last_used: None,
        })
    }

    fn get_token(&self, value: &AuthTokenValue) -> ServiceResult<Option<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT user_id, value, created, last_used FROM auth_token WHERE value = ?1",
                params![value.0],
                |row| {
                    Ok(AuthToken {
                        user_id: row.get(0)?,
                        value: AuthTokenValue(row.get(1)?),
                        created: row.get(2)?,
                        last_used: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    fn touch_token(&self, value: &AuthTokenValue) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE auth_token SET last_used = cast(strftime('%s','now') as int) WHERE value = ?1",
            params![value.0],
        )?;
        Ok(())
    }

    fn delete_token(&self, value: &AuthTokenValue) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM auth_token WHERE value = ?1",
            params![value.0],
        )?;
        if deleted == 0 {
            return Err(ServiceError::not_found("no such token"));
        }
        Ok(())
    }
}

impl FeedStore for SqliteUserStore {
    fn get_feed(&self, user_id: i64) -> ServiceResult<Option<Feed>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT user_id, article_ids, position, updated FROM feed WHERE user_id = ?1",
                params![user_id],
                parse_feed_row,
            )
            .optional()?)
    }

    fn create_feed(&self, user_id: i64, article_ids: &[i64]) -> ServiceResult<Feed> {
        let conn = self.conn.lock().unwrap();
        let ids_json = serde_json::to_string(article_ids)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("serializing feed ids: {}", e)))?;
        conn.execute(
            "INSERT INTO feed (user_id, article_ids) VALUES (?1, ?2)",
            params![user_id, ids_json],
        )
        .map_err(|err| {
            map_constraint_violation(err, &format!("user {} already has a feed", user_id))
        })?;
        conn.query_row(
            "SELECT user_id, article_ids, position, updated FROM feed WHERE user_id = ?1",
            params![user_id],
            parse_feed_row,
        )
        .map_err(ServiceError::from)
    }

    fn save_feed(
        &self,
        user_id: i64,
        article_ids: &[i64],
        position: usize,
    ) -> ServiceResult<Feed> {
        let conn = self.conn.lock().unwrap();
        let ids_json = serde_json::to_string(article_ids)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("serializing feed ids: {}", e)))?;
        let changed = conn.execute(
            "UPDATE feed SET article_ids = ?1, position = ?2, \
             updated = cast(strftime('%s','now') as int) WHERE user_id = ?3",
            params![ids_json, position as i64, user_id],
        )?;
        if changed == 0 {
            return Err(ServiceError::not_found(format!(
                "user {} has no feed",
                user_id
            )));
        }
        conn.query_row(
            "SELECT user_id, article_ids, position, updated FROM feed WHERE user_id = ?1",
            params![user_id],
            parse_feed_row,
        )
        .map_err(ServiceError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, SqliteUserStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteUserStore::new(dir.path().join("user.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_schema_creates_and_validates() {
        let (_dir, _store) = make_store();
    }

    #[test]
    fn test_create_user_and_lookup() {
        let (_dir, store) = make_store();
        let user = store.create_user("alice", false).unwrap();
        assert_eq!(user.handle, "alice");
        assert!(!user.is_admin);

        let by_handle = store.get_user_by_handle("alice").unwrap().unwrap();
        assert_eq!(by_handle.id, user.id);
        assert!(store.get_user_by_handle("bob").unwrap().is_none());
        assert_eq!(store.get_users_count(), 1);
    }

    #[test]
    fn test_duplicate_handle_is_conflict() {
        let (_dir, store) = make_store();
        store.create_user("alice", false).unwrap();
        let err = store.create_user("alice", true).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn test_token_round_trip() {
        let (_dir, store) = make_store();
        let user = store.create_user("alice", false).unwrap();
        let token = store.create_token(user.id).unwrap();

        let found = store.get_token(&token.value).unwrap().unwrap();
        assert_eq!(found.user_id, user.id);
        assert!(found.last_used.is_none());

        store.touch_token(&token.value).unwrap();
        let touched = store.get_token(&token.value).unwrap().unwrap();
        assert!(touched.last_used.is_some());

        store.delete_token(&token.value).unwrap();
        assert!(store.get_token(&token.value).unwrap().is_none());
    }

    #[test]
    fn test_unknown_token_is_none() {
        let (_dir, store) = make_store();
        let missing = store
            .get_token(&AuthTokenValue("nope".to_string()))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_feed_lifecycle() {
        let (_dir, store) = make_store();
        let user = store.create_user("alice", false).unwrap();

        assert!(store.get_feed(user.id).unwrap().is_none());

        let feed = store.create_feed(user.id, &[5, 3, 8]).unwrap();
        assert_eq!(feed.article_ids, vec![5, 3, 8]);
        assert_eq!(feed.position, 0);

        let err = store.create_feed(user.id, &[1]).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let saved = store.save_feed(user.id, &[5, 3], 2).unwrap();
        assert_eq!(saved.article_ids, vec![5, 3]);
        assert_eq!(saved.position, 2);
    }

    #[test]
    fn test_save_feed_without_row_is_not_found() {
        let (_dir, store) = make_store();
        let user = store.create_user("alice", false).unwrap();
        let err = store.save_feed(user.id, &[1], 0).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_tokens_cascade_on_user_delete() {
        let (_dir, store) = make_store();
        let user = store.create_user("alice", false).unwrap();
        let token = store.create_token(user.id).unwrap();

        {
            let conn = store.conn.lock().unwrap();
            conn.execute("DELETE FROM user WHERE id = ?1", params![user.id])
                .unwrap();
        }
        assert!(store.get_token(&token.value).unwrap().is_none());
    }
}
