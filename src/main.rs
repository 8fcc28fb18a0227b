use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use audicle_server::background_jobs::jobs::EnrichmentBacklogJob;
use audicle_server::background_jobs::{JobContext, JobScheduler};
use audicle_server::config::{AppConfig, CliConfig, FileConfig};
use audicle_server::enrichment::{
    AudioStore, EnrichmentPipeline, HttpSpeechSynthesizer, OpenAiSummarizer, SpeechSynthesizer,
    Summarizer,
};
use audicle_server::recommender::{HttpRecommenderClient, RecommenderClient, RecommenderSync};
use audicle_server::server::{run_server, RequestsLoggingLevel, ServerConfig, ServerState};
use audicle_server::{SqliteCatalogStore, SqliteUserStore, UserManager};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in it override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the SQLite database files.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to the media directory (for synthesized audio files).
    #[clap(long, value_parser = parse_path)]
    pub media_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Base URL of the OpenAI-compatible LLM service used for summaries.
    #[clap(long)]
    pub llm_url: Option<String>,

    /// Model name to request from the LLM service.
    #[clap(long)]
    pub llm_model: Option<String>,

    /// API key for the LLM service, if it requires one.
    #[clap(long)]
    pub llm_api_key: Option<String>,

    /// Base URL of the speech synthesis service. Requires --llm-url.
    #[clap(long)]
    pub tts_url: Option<String>,

    /// Voice to request from the speech synthesis service.
    #[clap(long)]
    pub tts_voice: Option<String>,

    /// URL of the recommendation service.
    #[clap(long)]
    pub recommender_url: Option<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            media_path: self.media_path.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            frontend_dir_path: self.frontend_dir_path.clone(),
            llm_url: self.llm_url.clone(),
            llm_model: self.llm_model.clone(),
            llm_api_key: self.llm_api_key.clone(),
            tts_url: self.tts_url.clone(),
            tts_voice: self.tts_voice.clone(),
            recommender_url: self.recommender_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!(
        "Opening SQLite catalog database at {:?}...",
        config.catalog_db_path()
    );
    let catalog_store = Arc::new(SqliteCatalogStore::new(config.catalog_db_path())?);

    let user_store = Arc::new(SqliteUserStore::new(config.user_db_path())?);
    let user_manager = Arc::new(UserManager::new(user_store));
    user_manager.bootstrap_admin_if_empty()?;

    let audio_store = Arc::new(AudioStore::new(&config.media_path)?);

    let pipeline = match &config.llm {
        Some(llm) => {
            info!("LLM summarization configured at {}", llm.base_url);
            let summarizer: Arc<dyn Summarizer> = Arc::new(OpenAiSummarizer::new(
                llm.base_url.clone(),
                llm.model.clone(),
                llm.api_key.clone(),
                llm.timeout,
            ));
            let synthesizer: Option<Arc<dyn SpeechSynthesizer>> = config.tts.as_ref().map(|tts| {
                info!("Speech synthesis configured at {}", tts.base_url);
                Arc::new(HttpSpeechSynthesizer::new(
                    tts.base_url.clone(),
                    tts.model.clone(),
                    tts.voice.clone(),
                    tts.api_key.clone(),
                    tts.timeout,
                )) as Arc<dyn SpeechSynthesizer>
            });
            Some(EnrichmentPipeline::new(
                catalog_store.clone(),
                summarizer,
                synthesizer,
                audio_store.clone(),
            ))
        }
        None => {
            info!("No LLM configured, articles are served unenriched");
            None
        }
    };

    let recommender = match &config.recommender {
        Some(settings) => {
            info!("Recommender service configured at {}", settings.url);
            let client: Arc<dyn RecommenderClient> = Arc::new(HttpRecommenderClient::new(
                settings.url.clone(),
                settings.timeout,
            ));
            RecommenderSync::start(client)
        }
        None => RecommenderSync::disabled(),
    };

    let shutdown_token = CancellationToken::new();
    let mut job_handles = Vec::new();
    if let Some(pipeline) = &pipeline {
        let context = JobContext::new(
            shutdown_token.child_token(),
            catalog_store.clone(),
            pipeline.clone(),
        );
        let mut scheduler = JobScheduler::new(context, shutdown_token.clone());
        scheduler.register_job(Arc::new(EnrichmentBacklogJob::new(
            config.background_jobs.enrichment_backlog_interval,
        )));
        job_handles = scheduler.start();
    }

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        frontend_dir_path: config.frontend_dir_path.clone(),
        feed_size: config
            .recommender
            .as_ref()
            .map(|r| r.feed_size)
            .unwrap_or_else(|| ServerConfig::default().feed_size),
        ..ServerConfig::default()
    };
    let state = ServerState::new(
        server_config,
        catalog_store,
        user_manager,
        audio_store,
        pipeline,
        recommender,
    );

    info!("Ready to serve at port {}!", config.port);
    let result = tokio::select! {
        result = run_server(state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    shutdown_token.cancel();
    for handle in job_handles {
        let _ = handle.await;
    }
    result
}
