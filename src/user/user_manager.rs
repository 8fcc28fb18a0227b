//! User-facing business logic on top of the user store.
//!
//! The manager owns the feed cursor rules: the cursor always lands inside
//! `0..=len`, an explicit out-of-bounds cursor is rejected, and a cursor that
//! only became stale because the feed shrank is clamped instead.

use super::auth::{AuthToken, AuthTokenValue};
use super::user_models::{Feed, User};
use super::user_store::FullUserStore;
use crate::error::{ServiceError, ServiceResult};
use std::sync::Arc;
use tracing::info;

pub struct UserManager {
    store: Arc<dyn FullUserStore>,
}

impl UserManager {
    pub fn new(store: Arc<dyn FullUserStore>) -> Self {
        UserManager { store }
    }

    /// Create the initial admin account when the user db is empty, so a fresh
    /// deployment has a way in. The token is only ever logged here.
    pub fn bootstrap_admin_if_empty(&self) -> ServiceResult<Option<(User, AuthToken)>> {
        if self.store.get_users_count() > 0 {
            return Ok(None);
        }
        let user = self.store.create_user("admin", true)?;
        let token = self.store.create_token(user.id)?;
        info!(
            "Created bootstrap admin user '{}' with token {}",
            user.handle, token.value.0
        );
        Ok(Some((user, token)))
    }

    /// Create a user together with their first auth token.
    pub fn create_user(&self, handle: &str, is_admin: bool) -> ServiceResult<(User, AuthToken)> {
        if handle.trim().is_empty() {
            return Err(ServiceError::bad_request("handle must not be empty"));
        }
        let user = self.store.create_user(handle.trim(), is_admin)?;
        let token = self.store.create_token(user.id)?;
        info!("Created user '{}' (admin: {})", user.handle, user.is_admin);
        Ok((user, token))
    }

    /// Resolve a token to its user and record the usage.
    pub fn authenticate(&self, token_value: &str) -> ServiceResult<Option<User>> {
        let value = AuthTokenValue(token_value.to_string());
        let token = match self.store.get_token(&value)? {
            Some(token) => token,
            None => return Ok(None),
        };
        self.store.touch_token(&value)?;
        self.store.get_user(token.user_id)
    }

    pub fn get_user(&self, id: i64) -> ServiceResult<Option<User>> {
        self.store.get_user(id)
    }

    /// The caller's own feed, created empty on first access.
    pub fn get_or_create_feed(&self, user_id: i64) -> ServiceResult<Feed> {
        if let Some(feed) = self.store.get_feed(user_id)? {
            return Ok(feed);
        }
        self.store.create_feed(user_id, &[])
    }

    /// Another user's feed, admin only. Never auto-creates.
    pub fn get_feed_as_admin(
        &self,
        requesting: &User,
        target_user_id: i64,
    ) -> ServiceResult<Feed> {
        if !requesting.is_admin && requesting.id != target_user_id {
            return Err(ServiceError::forbidden("not allowed to read this feed"));
        }
        self.store
            .get_feed(target_user_id)?
            .ok_or_else(|| ServiceError::not_found(format!("user {} has no feed", target_user_id)))
    }

    /// Explicit feed creation; an existing feed surfaces as Conflict.
    pub fn create_feed(&self, user_id: i64, article_ids: &[i64]) -> ServiceResult<Feed> {
        self.store.create_feed(user_id, article_ids)
    }

    /// Partial feed update. When the articles change and the old cursor no
    /// longer fits it is clamped; an explicitly requested cursor out of
    /// bounds is an error instead.
    pub fn update_feed(
        &self,
        user_id: i64,
        article_ids: Option<Vec<i64>>,
        position: Option<usize>,
    ) -> ServiceResult<Feed> {
        let current = self.get_or_create_feed(user_id)?;
        let new_ids = article_ids.unwrap_or(current.article_ids);
        let new_position = match position {
            Some(requested) => {
                if requested > new_ids.len() {
                    return Err(ServiceError::bad_request(format!(
                        "position {} is out of bounds for a feed of {} articles",
                        requested,
                        new_ids.len()
                    )));
                }
                requested
            }
            None => current.position.min(new_ids.len()),
        };
        self.store.save_feed(user_id, &new_ids, new_position)
    }

    /// Move the cursor. A position equal to the feed length is valid and
    /// means the feed has been fully read.
    pub fn set_feed_position(&self, user_id: i64, position: usize) -> ServiceResult<Feed> {
        let current = self.get_or_create_feed(user_id)?;
        if position > current.article_ids.len() {
            return Err(ServiceError::bad_request(format!(
                "position {} is out of bounds for a feed of {} articles",
                position,
                current.article_ids.len()
            )));
        }
        self.store
            .save_feed(user_id, &current.article_ids, position)
    }

    /// Replace the feed content and reset the cursor to the start.
    pub fn regenerate_feed(&self, user_id: i64, article_ids: Vec<i64>) -> ServiceResult<Feed> {
        // First regeneration may run before the feed row exists
        self.get_or_create_feed(user_id)?;
        self.store.save_feed(user_id, &article_ids, 0)
    }
}
