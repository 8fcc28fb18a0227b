//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own databases and media dir.

use super::constants::*;
use audicle_server::catalog_store::{FullCatalogStore, SqliteCatalogStore};
use audicle_server::enrichment::AudioStore;
use audicle_server::recommender::RecommenderSync;
use audicle_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use audicle_server::user::{SqliteUserStore, UserManager};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated databases
///
/// When dropped, the server gracefully shuts down and temp resources are
/// cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Token of a seeded admin user
    pub admin_token: String,

    /// Token of a seeded regular user
    pub user_token: String,

    /// Id of the seeded regular user
    pub user_id: i64,

    /// Catalog store for direct database access in tests
    pub catalog_store: Arc<dyn FullCatalogStore>,

    /// User manager for direct access in tests
    pub user_manager: Arc<UserManager>,

    client: reqwest::Client,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with one admin and one
    /// regular user already provisioned.
    pub async fn spawn() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let catalog_store: Arc<dyn FullCatalogStore> = Arc::new(
            SqliteCatalogStore::new(temp_dir.path().join("catalog.db"))
                .expect("Failed to open catalog store"),
        );
        let user_store = Arc::new(
            SqliteUserStore::new(temp_dir.path().join("user.db"))
                .expect("Failed to open user store"),
        );
        let user_manager = Arc::new(UserManager::new(user_store));
        let audio_store = Arc::new(
            AudioStore::new(temp_dir.path().join("media")).expect("Failed to create media dir"),
        );

        let (_, admin_token) = user_manager
            .create_user("admin", true)
            .expect("Failed to create admin user");
        let (user, user_token) = user_manager
            .create_user("reader", false)
            .expect("Failed to create regular user");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            ..ServerConfig::default()
        };

        let state = ServerState::new(
            config,
            catalog_store.clone(),
            user_manager.clone(),
            audio_store,
            None, // no enrichment pipeline in e2e tests
            RecommenderSync::disabled(),
        );

        let app = make_app(state);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            admin_token: admin_token.value.0,
            user_token: user_token.value.0,
            user_id: user.id,
            catalog_store,
            user_manager,
            client: reqwest::Client::new(),
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", token)
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn post_json(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", token)
            .json(body)
            .send()
            .await
            .expect("POST request failed")
    }

    pub async fn patch_json(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .patch(format!("{}{}", self.base_url, path))
            .header("Authorization", token)
            .json(body)
            .send()
            .await
            .expect("PATCH request failed")
    }

    pub async fn put_json(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .header("Authorization", token)
            .json(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .header("Authorization", token)
            .send()
            .await
            .expect("DELETE request failed")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
