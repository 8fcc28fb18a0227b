//! Test data helpers shared across e2e tests

use serde_json::{json, Value};

/// JSON payload for a valid article with the given url suffix.
pub fn article_json(suffix: &str, title: &str) -> Value {
    json!({
        "external_id": format!("ext-{}", suffix),
        "external_url": format!("https://news.example/{}", suffix),
        "title": title,
        "body": format!("Body text of {}", title),
        "image_url": null,
        "published_at": 1700000000,
        "category": "tech",
    })
}

/// Seed an article through the API and return its id.
pub async fn seed_article(server: &super::server::TestServer, suffix: &str, title: &str) -> i64 {
    let response = server
        .post_json("/v1/articles", &server.admin_token, &article_json(suffix, title))
        .await;
    assert_eq!(response.status(), 201, "seeding article {}", suffix);
    let body: Value = response.json().await.expect("invalid upsert response");
    body["article"]["id"].as_i64().expect("missing article id")
}
