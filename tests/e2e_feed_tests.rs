//! End-to-end tests for feeds, the cursor and user administration

mod common;

use common::fixtures::seed_article;
use common::TestServer;
use serde_json::{json, Value};

#[tokio::test]
async fn test_feed_is_created_empty_on_first_access() {
    let server = TestServer::spawn().await;

    let response = server.get("/v1/me/feed", &server.user_token).await;
    assert_eq!(response.status(), 200);
    let feed: Value = response.json().await.unwrap();
    assert_eq!(feed["article_ids"], json!([]));
    assert_eq!(feed["position"], 0);
}

#[tokio::test]
async fn test_patch_feed_replaces_articles() {
    let server = TestServer::spawn().await;
    let a = seed_article(&server, "a1", "One").await;
    let b = seed_article(&server, "a2", "Two").await;

    let response = server
        .patch_json(
            "/v1/me/feed",
            &server.user_token,
            &json!({ "article_ids": [b, a] }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let feed: Value = response.json().await.unwrap();
    assert_eq!(feed["article_ids"], json!([b, a]));
    assert_eq!(feed["position"], 0);
}

#[tokio::test]
async fn test_explicit_create_conflicts_when_feed_exists() {
    let server = TestServer::spawn().await;

    let response = server
        .post_json("/v1/me/feed", &server.user_token, &json!({ "article_ids": [] }))
        .await;
    assert_eq!(response.status(), 201);

    let response = server
        .post_json("/v1/me/feed", &server.user_token, &json!({ "article_ids": [] }))
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn test_position_bounds() {
    let server = TestServer::spawn().await;
    let a = seed_article(&server, "a1", "One").await;
    let b = seed_article(&server, "a2", "Two").await;

    server
        .patch_json(
            "/v1/me/feed",
            &server.user_token,
            &json!({ "article_ids": [a, b] }),
        )
        .await;

    // position == len means read to the end and is valid
    let response = server
        .put_json(
            "/v1/me/feed/position",
            &server.user_token,
            &json!({ "position": 2 }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let feed: Value = response.json().await.unwrap();
    assert_eq!(feed["position"], 2);

    let response = server
        .put_json(
            "/v1/me/feed/position",
            &server.user_token,
            &json!({ "position": 3 }),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_shrinking_feed_clamps_inherited_position() {
    let server = TestServer::spawn().await;
    let a = seed_article(&server, "a1", "One").await;
    let b = seed_article(&server, "a2", "Two").await;
    let c = seed_article(&server, "a3", "Three").await;

    server
        .patch_json(
            "/v1/me/feed",
            &server.user_token,
            &json!({ "article_ids": [a, b, c] }),
        )
        .await;
    server
        .put_json(
            "/v1/me/feed/position",
            &server.user_token,
            &json!({ "position": 3 }),
        )
        .await;

    // Replacing with a shorter list carries the cursor down to the new end
    let response = server
        .patch_json(
            "/v1/me/feed",
            &server.user_token,
            &json!({ "article_ids": [a] }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let feed: Value = response.json().await.unwrap();
    assert_eq!(feed["position"], 1);
}

#[tokio::test]
async fn test_regenerate_falls_back_to_recent_articles() {
    let server = TestServer::spawn().await;
    let a = seed_article(&server, "a1", "One").await;
    let b = seed_article(&server, "a2", "Two").await;

    server
        .put_json(
            "/v1/me/feed/position",
            &server.user_token,
            &json!({ "position": 0 }),
        )
        .await;

    // Recommender is disabled in tests: regeneration uses the newest articles
    let response = server
        .post_json("/v1/me/feed/regenerate", &server.user_token, &json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let feed: Value = response.json().await.unwrap();
    assert_eq!(feed["position"], 0);
    let ids: Vec<i64> = feed["article_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    assert!(ids.contains(&a));
    assert!(ids.contains(&b));
}

#[tokio::test]
async fn test_recommendations_are_empty_when_disabled() {
    let server = TestServer::spawn().await;
    seed_article(&server, "a1", "One").await;

    let response = server.get("/v1/me/recommendations", &server.user_token).await;
    assert_eq!(response.status(), 200);
    let articles: Vec<Value> = response.json().await.unwrap();
    assert!(articles.is_empty());
}

#[tokio::test]
async fn test_admin_can_read_other_feeds() {
    let server = TestServer::spawn().await;

    // Materialize the reader's feed first
    server.get("/v1/me/feed", &server.user_token).await;

    let response = server
        .get(
            &format!("/v1/users/{}/feed", server.user_id),
            &server.admin_token,
        )
        .await;
    assert_eq!(response.status(), 200);

    // Reading a feed that was never created is not found, never auto-created
    let response = server.get("/v1/users/999/feed", &server.admin_token).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_non_admin_cannot_read_other_feeds() {
    let server = TestServer::spawn().await;

    let (other, _) = server.user_manager.create_user("other", false).unwrap();
    let response = server
        .get(&format!("/v1/users/{}/feed", other.id), &server.user_token)
        .await;
    assert_eq!(response.status(), 403);

    // Reading your own feed through the admin route is allowed
    server.get("/v1/me/feed", &server.user_token).await;
    let response = server
        .get(
            &format!("/v1/users/{}/feed", server.user_id),
            &server.user_token,
        )
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_admin_creates_users() {
    let server = TestServer::spawn().await;

    let response = server
        .post_json(
            "/v1/admin/users",
            &server.user_token,
            &json!({ "handle": "newbie" }),
        )
        .await;
    assert_eq!(response.status(), 403);

    let response = server
        .post_json(
            "/v1/admin/users",
            &server.admin_token,
            &json!({ "handle": "newbie" }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["handle"], "newbie");
    assert_eq!(body["user"]["is_admin"], false);

    // The returned token authenticates
    let response = server.get("/v1/me/feed", &token).await;
    assert_eq!(response.status(), 200);

    // Duplicate handles conflict
    let response = server
        .post_json(
            "/v1/admin/users",
            &server.admin_token,
            &json!({ "handle": "newbie" }),
        )
        .await;
    assert_eq!(response.status(), 409);
}
