mod auth;
mod sqlite_user_store;
mod user_manager;
mod user_models;
mod user_store;

pub use auth::{AuthToken, AuthTokenValue};
pub use sqlite_user_store::{SqliteUserStore, USER_VERSIONED_SCHEMAS};
pub use user_manager::UserManager;
pub use user_models::{Feed, User};
pub use user_store::{AuthTokenStore, FeedStore, FullUserStore, UserStore};
