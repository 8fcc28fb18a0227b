mod audio_store;
mod llm;
mod pipeline;
mod tts;

pub use audio_store::AudioStore;
pub use llm::{ArticleDigest, EnrichmentError, OpenAiSummarizer, Summarizer};
pub use pipeline::EnrichmentPipeline;
pub use tts::{HttpSpeechSynthesizer, SpeechSynthesizer};
