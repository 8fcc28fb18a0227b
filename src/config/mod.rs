mod file_config;

pub use file_config::{
    BackgroundJobsConfig, FileConfig, LlmConfig, RecommenderConfig, TtsConfig,
};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub media_path: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub llm_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub tts_url: Option<String>,
    pub tts_voice: Option<String>,
    pub recommender_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub media_path: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,

    // Feature configs, absent when the backing service is not configured
    pub llm: Option<LlmSettings>,
    pub tts: Option<TtsSettings>,
    pub recommender: Option<RecommenderSettings>,
    pub background_jobs: BackgroundJobsSettings,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TtsSettings {
    pub base_url: String,
    pub model: String,
    pub voice: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RecommenderSettings {
    pub url: String,
    pub timeout: Duration,
    pub feed_size: usize,
}

#[derive(Debug, Clone)]
pub struct BackgroundJobsSettings {
    pub enrichment_backlog_interval: Duration,
}

impl Default for BackgroundJobsSettings {
    fn default() -> Self {
        Self {
            enrichment_backlog_interval: Duration::from_secs(300),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let media_path = file
            .media_path
            .map(PathBuf::from)
            .or_else(|| cli.media_path.clone())
            .unwrap_or_else(|| db_dir.clone());

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        // LLM enrichment is on when a base URL is configured anywhere
        let llm_file = file.llm.unwrap_or_default();
        let llm = llm_file
            .base_url
            .or_else(|| cli.llm_url.clone())
            .map(|base_url| LlmSettings {
                base_url,
                model: llm_file
                    .model
                    .or_else(|| cli.llm_model.clone())
                    .unwrap_or_else(|| "gpt-4o-mini".to_string()),
                api_key: llm_file.api_key.or_else(|| cli.llm_api_key.clone()),
                timeout: Duration::from_secs(llm_file.timeout_sec.unwrap_or(30)),
            });

        let tts_file = file.tts.unwrap_or_default();
        let tts = tts_file
            .base_url
            .or_else(|| cli.tts_url.clone())
            .map(|base_url| TtsSettings {
                base_url,
                model: tts_file.model.unwrap_or_else(|| "tts-1".to_string()),
                voice: tts_file
                    .voice
                    .or_else(|| cli.tts_voice.clone())
                    .unwrap_or_else(|| "alloy".to_string()),
                api_key: tts_file.api_key,
                timeout: Duration::from_secs(tts_file.timeout_sec.unwrap_or(60)),
            });

        if tts.is_some() && llm.is_none() {
            bail!("TTS is configured but LLM is not; audio synthesis requires summaries");
        }

        let rec_file = file.recommender.unwrap_or_default();
        let recommender = rec_file
            .url
            .or_else(|| cli.recommender_url.clone())
            .map(|url| RecommenderSettings {
                url,
                timeout: Duration::from_secs(rec_file.timeout_sec.unwrap_or(5)),
                feed_size: rec_file.feed_size.unwrap_or(30),
            });

        let jobs_file = file.background_jobs.unwrap_or_default();
        let background_jobs = BackgroundJobsSettings {
            enrichment_backlog_interval: Duration::from_secs(
                jobs_file.enrichment_backlog_interval_secs.unwrap_or(300),
            ),
        };

        Ok(Self {
            db_dir,
            media_path,
            port,
            logging_level,
            frontend_dir_path,
            llm,
            tts,
            recommender,
            background_jobs,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("user.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
