//! User, auth token and feed store traits.

use super::auth::{AuthToken, AuthTokenValue};
use super::user_models::{Feed, User};
use crate::error::ServiceResult;

pub trait UserStore: Send + Sync {
    /// Create a user. A taken handle surfaces as Conflict.
    fn create_user(&self, handle: &str, is_admin: bool) -> ServiceResult<User>;

    fn get_user(&self, id: i64) -> ServiceResult<Option<User>>;

    fn get_user_by_handle(&self, handle: &str) -> ServiceResult<Option<User>>;

    fn get_users_count(&self) -> usize;
}

pub trait AuthTokenStore: Send + Sync {
    fn create_token(&self, user_id: i64) -> ServiceResult<AuthToken>;

    fn get_token(&self, value: &AuthTokenValue) -> ServiceResult<Option<AuthToken>>;

    fn touch_token(&self, value: &AuthTokenValue) -> ServiceResult<()>;

    fn delete_token(&self, value: &AuthTokenValue) -> ServiceResult<()>;
}

pub trait FeedStore: Send + Sync {
    fn get_feed(&self, user_id: i64) -> ServiceResult<Option<Feed>>;

    /// Insert a feed row. A user with an existing feed surfaces as Conflict.
    fn create_feed(&self, user_id: i64, article_ids: &[i64]) -> ServiceResult<Feed>;

    /// Overwrite the feed content and cursor. The caller is responsible for
    /// keeping the cursor within bounds.
    fn save_feed(&self, user_id: i64, article_ids: &[i64], position: usize)
        -> ServiceResult<Feed>;
}

pub trait FullUserStore: UserStore + AuthTokenStore + FeedStore {}

impl<T: UserStore + AuthTokenStore + FeedStore> FullUserStore for T {}
