//! Article enrichment pipeline.
//!
//! Summarization runs synchronously in the caller's request so failures
//! surface immediately. Audio synthesis is slower and runs as a detached
//! task; its failures only mark the article's audio as failed. An article
//! counts as processed once it has a summary and its audio is either ready
//! or synthesis is not configured at all.

use super::audio_store::AudioStore;
use super::llm::Summarizer;
use super::tts::SpeechSynthesizer;
use crate::catalog_store::{Article, AudioStatus, FullCatalogStore};
use crate::error::{ServiceError, ServiceResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct EnrichmentPipeline {
    catalog_store: Arc<dyn FullCatalogStore>,
    summarizer: Arc<dyn Summarizer>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    audio_store: Arc<AudioStore>,
    // Article ids with a synthesis task currently running
    audio_in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl EnrichmentPipeline {
    pub fn new(
        catalog_store: Arc<dyn FullCatalogStore>,
        summarizer: Arc<dyn Summarizer>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        audio_store: Arc<AudioStore>,
    ) -> Self {
        EnrichmentPipeline {
            catalog_store,
            summarizer,
            synthesizer,
            audio_store,
            audio_in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn audio_enabled(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Run the full enrichment for one article: summarize now, then kick off
    /// audio synthesis in the background when it is configured and missing.
    pub async fn process(&self, article_id: i64) -> ServiceResult<Article> {
        let article = self.load(article_id)?;

        let body = article.body.clone().unwrap_or_else(|| article.title.clone());
        let digest = self.summarizer.summarize(&article.title, &body).await?;
        self.catalog_store
            .store_summary(article_id, &digest.summary, &digest.tags)?;
        info!(
            article_id = article_id,
            tag_count = digest.tags.len(),
            "Stored article summary"
        );

        if self.synthesizer.is_none() || article.audio_status == AudioStatus::Ready {
            self.mark_processed_if_complete(article_id)?;
        } else {
            self.spawn_audio_task(article_id);
        }

        self.load(article_id)
    }

    /// Redo only the summary. Existing audio is left untouched.
    pub async fn regenerate_summary(&self, article_id: i64) -> ServiceResult<Article> {
        let article = self.load(article_id)?;

        let body = article.body.clone().unwrap_or_else(|| article.title.clone());
        let digest = self.summarizer.summarize(&article.title, &body).await?;
        self.catalog_store
            .store_summary(article_id, &digest.summary, &digest.tags)?;
        self.mark_processed_if_complete(article_id)?;

        self.load(article_id)
    }

    /// Redo the audio. Returns false when a synthesis task for this article
    /// is already running, in which case nothing else happens.
    pub fn regenerate_audio(&self, article_id: i64) -> ServiceResult<bool> {
        let article = self.load(article_id)?;
        if self.synthesizer.is_none() {
            return Err(ServiceError::bad_request(
                "audio synthesis is not configured",
            ));
        }
        if article.summary.is_none() && article.body.is_none() {
            return Err(ServiceError::bad_request(
                "article has no text to synthesize",
            ));
        }

        // The previous blob goes away before the new task starts, so a
        // download during regeneration cannot serve a half-written file.
        if let Some(old_path) = &article.audio_path {
            self.audio_store.delete(old_path);
        }

        Ok(self.spawn_audio_task(article_id))
    }

    /// Start a detached synthesis task unless one is already in flight for
    /// this article. Returns whether a task was started.
    fn spawn_audio_task(&self, article_id: i64) -> bool {
        {
            let mut in_flight = self.audio_in_flight.lock().unwrap();
            if !in_flight.insert(article_id) {
                info!(
                    article_id = article_id,
                    "Audio synthesis already in flight, skipping"
                );
                return false;
            }
        }

        if let Err(err) = self
            .catalog_store
            .set_audio_status(article_id, AudioStatus::Pending)
        {
            error!(article_id = article_id, "Failed to mark audio pending: {}", err);
            self.audio_in_flight.lock().unwrap().remove(&article_id);
            return false;
        }

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run_audio_task(article_id).await;
            pipeline.audio_in_flight.lock().unwrap().remove(&article_id);
        });
        true
    }

    async fn run_audio_task(&self, article_id: i64) {
        let synthesizer = match &self.synthesizer {
            Some(synthesizer) => synthesizer.clone(),
            None => return,
        };
        let article = match self.catalog_store.get_article(article_id) {
            Ok(Some(article)) => article,
            Ok(None) => {
                warn!(article_id = article_id, "Article vanished before synthesis");
                return;
            }
            Err(err) => {
                error!(article_id = article_id, "Failed to load article: {}", err);
                return;
            }
        };

        // Prefer the summary, it is what listeners actually want read out
        let text = article
            .summary
            .or(article.body)
            .unwrap_or(article.title);

        match synthesizer.synthesize(&text).await {
            Ok(bytes) => {
                let stored = self
                    .audio_store
                    .store(article_id, &bytes)
                    .map_err(ServiceError::Internal)
                    .and_then(|path| self.catalog_store.store_audio(article_id, &path))
                    .and_then(|_| self.mark_processed_if_complete(article_id));
                match stored {
                    Ok(()) => info!(article_id = article_id, "Audio synthesis complete"),
                    Err(err) => {
                        error!(
                            article_id = article_id,
                            "Failed to persist synthesized audio: {}", err
                        );
                        let _ = self
                            .catalog_store
                            .set_audio_status(article_id, AudioStatus::Failed);
                    }
                }
            }
            Err(err) => {
                warn!(article_id = article_id, "Audio synthesis failed: {}", err);
                if let Err(err) = self
                    .catalog_store
                    .set_audio_status(article_id, AudioStatus::Failed)
                {
                    error!(
                        article_id = article_id,
                        "Failed to mark audio failed: {}", err
                    );
                }
            }
        }
    }

    fn mark_processed_if_complete(&self, article_id: i64) -> ServiceResult<()> {
        let article = self.load(article_id)?;
        let audio_done = self.synthesizer.is_none() || article.audio_status == AudioStatus::Ready;
        if article.summary.is_some() && audio_done {
            self.catalog_store.set_processed(article_id)?;
        }
        Ok(())
    }

    fn load(&self, article_id: i64) -> ServiceResult<Article> {
        self.catalog_store.get_article(article_id)?.ok_or_else(|| {
            ServiceError::not_found(format!("no article with id {}", article_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::{CatalogStore, NewArticle, SqliteCatalogStore};
    use crate::enrichment::llm::{ArticleDigest, EnrichmentError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    struct FixedSummarizer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedSummarizer {
        fn new() -> Self {
            FixedSummarizer {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            FixedSummarizer {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(
            &self,
            title: &str,
            _body: &str,
        ) -> Result<ArticleDigest, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EnrichmentError::Timeout);
            }
            Ok(ArticleDigest {
                summary: format!("Summary of {}", title),
                tags: vec!["tag".to_string()],
            })
        }
    }

    struct FixedSynthesizer {
        calls: AtomicUsize,
        fail: bool,
        // Each call waits for one permit before answering
        gate: Option<Arc<Semaphore>>,
    }

    impl FixedSynthesizer {
        fn new() -> Self {
            FixedSynthesizer {
                calls: AtomicUsize::new(0),
                fail: false,
                gate: None,
            }
        }

        fn failing() -> Self {
            FixedSynthesizer {
                calls: AtomicUsize::new(0),
                fail: true,
                gate: None,
            }
        }

        fn gated(gate: Arc<Semaphore>) -> Self {
            FixedSynthesizer {
                calls: AtomicUsize::new(0),
                fail: false,
                gate: Some(gate),
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FixedSynthesizer {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|_| EnrichmentError::Connection("gate closed".to_string()))?;
                permit.forget();
            }
            if self.fail {
                return Err(EnrichmentError::Connection("synthesis down".to_string()));
            }
            Ok(b"mp3 bytes".to_vec())
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: Arc<SqliteCatalogStore>,
        audio_store: Arc<AudioStore>,
        article_id: i64,
    }

    fn make_fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteCatalogStore::new(dir.path().join("catalog.db")).unwrap());
        let audio_store = Arc::new(AudioStore::new(dir.path().join("media")).unwrap());
        let article_id = store
            .upsert_article(&NewArticle {
                external_id: None,
                external_url: "https://e.example/1".to_string(),
                title: "A headline".to_string(),
                body: Some("The full article body.".to_string()),
                image_url: None,
                published_at: None,
                category: None,
            })
            .unwrap()
            .article
            .id;
        Fixture {
            _dir: dir,
            store,
            audio_store,
            article_id,
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn test_process_without_audio_marks_processed() {
        let fx = make_fixture();
        let pipeline = EnrichmentPipeline::new(
            fx.store.clone(),
            Arc::new(FixedSummarizer::new()),
            None,
            fx.audio_store.clone(),
        );

        let article = pipeline.process(fx.article_id).await.unwrap();
        assert_eq!(article.summary.as_deref(), Some("Summary of A headline"));
        assert!(article.processed);
        assert_eq!(article.audio_status, AudioStatus::None);
    }

    #[tokio::test]
    async fn test_process_with_audio_completes_in_background() {
        let fx = make_fixture();
        let pipeline = EnrichmentPipeline::new(
            fx.store.clone(),
            Arc::new(FixedSummarizer::new()),
            Some(Arc::new(FixedSynthesizer::new())),
            fx.audio_store.clone(),
        );

        let article = pipeline.process(fx.article_id).await.unwrap();
        // Summary is there right away, audio still on its way
        assert!(article.summary.is_some());
        assert!(!article.processed);

        let store = fx.store.clone();
        let id = fx.article_id;
        wait_until(move || store.get_article(id).unwrap().unwrap().processed).await;

        let article = fx.store.get_article(fx.article_id).unwrap().unwrap();
        assert_eq!(article.audio_status, AudioStatus::Ready);
        let path = fx
            .audio_store
            .resolve(article.audio_path.as_deref().unwrap())
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"mp3 bytes");
    }

    #[tokio::test]
    async fn test_tts_failure_marks_audio_failed_but_keeps_summary() {
        let fx = make_fixture();
        let pipeline = EnrichmentPipeline::new(
            fx.store.clone(),
            Arc::new(FixedSummarizer::new()),
            Some(Arc::new(FixedSynthesizer::failing())),
            fx.audio_store.clone(),
        );

        pipeline.process(fx.article_id).await.unwrap();

        let store = fx.store.clone();
        let id = fx.article_id;
        wait_until(move || {
            store.get_article(id).unwrap().unwrap().audio_status == AudioStatus::Failed
        })
        .await;

        let article = fx.store.get_article(fx.article_id).unwrap().unwrap();
        assert!(article.summary.is_some());
        assert!(!article.processed);
    }

    #[tokio::test]
    async fn test_summarizer_failure_is_dependency_error() {
        let fx = make_fixture();
        let pipeline = EnrichmentPipeline::new(
            fx.store.clone(),
            Arc::new(FixedSummarizer::failing()),
            None,
            fx.audio_store.clone(),
        );

        let err = pipeline.process(fx.article_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Dependency(_)));

        let article = fx.store.get_article(fx.article_id).unwrap().unwrap();
        assert!(article.summary.is_none());
        assert!(!article.processed);
    }

    #[tokio::test]
    async fn test_regenerate_audio_is_single_flight() {
        let fx = make_fixture();
        let gate = Arc::new(Semaphore::new(0));
        let synthesizer = Arc::new(FixedSynthesizer::gated(gate.clone()));
        let pipeline = EnrichmentPipeline::new(
            fx.store.clone(),
            Arc::new(FixedSummarizer::new()),
            Some(synthesizer.clone()),
            fx.audio_store.clone(),
        );

        assert!(pipeline.regenerate_audio(fx.article_id).unwrap());
        // Second request while the first is blocked at the gate is a no-op
        assert!(!pipeline.regenerate_audio(fx.article_id).unwrap());

        gate.add_permits(1);
        let store = fx.store.clone();
        let id = fx.article_id;
        wait_until(move || {
            store.get_article(id).unwrap().unwrap().audio_status == AudioStatus::Ready
        })
        .await;
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);

        // Once the task finished a new regeneration may start again
        assert!(pipeline.regenerate_audio(fx.article_id).unwrap());
    }

    #[tokio::test]
    async fn test_regenerate_audio_removes_previous_blob_on_failure() {
        let fx = make_fixture();
        let old_path = fx.audio_store.store(fx.article_id, b"old audio").unwrap();
        fx.store.store_audio(fx.article_id, &old_path).unwrap();

        let pipeline = EnrichmentPipeline::new(
            fx.store.clone(),
            Arc::new(FixedSummarizer::new()),
            Some(Arc::new(FixedSynthesizer::failing())),
            fx.audio_store.clone(),
        );
        assert!(pipeline.regenerate_audio(fx.article_id).unwrap());

        let store = fx.store.clone();
        let id = fx.article_id;
        wait_until(move || {
            store.get_article(id).unwrap().unwrap().audio_status == AudioStatus::Failed
        })
        .await;
        assert!(!fx.audio_store.resolve(&old_path).unwrap().exists());
    }

    #[tokio::test]
    async fn test_regenerate_audio_without_synthesizer_is_rejected() {
        let fx = make_fixture();
        let pipeline = EnrichmentPipeline::new(
            fx.store.clone(),
            Arc::new(FixedSummarizer::new()),
            None,
            fx.audio_store.clone(),
        );
        let err = pipeline.regenerate_audio(fx.article_id).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_regenerate_summary_leaves_audio_untouched() {
        let fx = make_fixture();
        let old_path = fx.audio_store.store(fx.article_id, b"old audio").unwrap();
        fx.store.store_audio(fx.article_id, &old_path).unwrap();

        let pipeline = EnrichmentPipeline::new(
            fx.store.clone(),
            Arc::new(FixedSummarizer::new()),
            Some(Arc::new(FixedSynthesizer::new())),
            fx.audio_store.clone(),
        );
        let article = pipeline.regenerate_summary(fx.article_id).await.unwrap();

        assert!(article.summary.is_some());
        assert_eq!(article.audio_status, AudioStatus::Ready);
        assert_eq!(article.audio_path.as_deref(), Some(old_path.as_str()));
        // Summary present and audio ready, so the article is now processed
        assert!(article.processed);
        assert!(fx.audio_store.resolve(&old_path).unwrap().exists());
    }

    #[tokio::test]
    async fn test_process_missing_article_is_not_found() {
        let fx = make_fixture();
        let pipeline = EnrichmentPipeline::new(
            fx.store.clone(),
            Arc::new(FixedSummarizer::new()),
            None,
            fx.audio_store.clone(),
        );
        let err = pipeline.process(9999).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
