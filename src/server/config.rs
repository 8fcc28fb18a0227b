use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub frontend_dir_path: Option<String>,
    /// Upper bound for bulk article submissions in a single request.
    pub max_bulk_articles: usize,
    /// Number of articles requested from the recommender when a feed is rebuilt.
    pub feed_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            frontend_dir_path: None,
            max_bulk_articles: 100,
            feed_size: 30,
        }
    }
}
