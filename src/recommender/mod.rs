mod client;
mod sync;

pub use client::{FeedbackKind, HttpRecommenderClient, RecommenderClient, RecommenderItem};
pub use sync::{RecommenderEvent, RecommenderSync};
