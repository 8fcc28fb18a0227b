//! User and feed data models.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub handle: String,
    pub is_admin: bool,
    pub created: i64,
}

/// A user's reading feed: an ordered list of article ids plus a cursor.
///
/// The cursor is always within `0..=article_ids.len()`; a position equal to
/// the length means the feed has been read to the end.
#[derive(Debug, Clone, Serialize)]
pub struct Feed {
    pub user_id: i64,
    pub article_ids: Vec<i64>,
    pub position: usize,
    pub updated: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_serializes_article_ids_as_array() {
        let feed = Feed {
            user_id: 1,
            article_ids: vec![3, 1, 2],
            position: 1,
            updated: 0,
        };
        let json = serde_json::to_value(&feed).unwrap();
        assert_eq!(json["article_ids"], serde_json::json!([3, 1, 2]));
        assert_eq!(json["position"], 1);
    }
}
