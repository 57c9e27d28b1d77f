//! Process-wide configuration and shared request state.

use std::path::PathBuf;
use std::sync::Arc;

use crate::classifier::AnimalClassifier;

/// Runtime configuration assembled from the command line.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub top_k: usize,
    pub session_pool_size: usize,
}

/// State shared by every worker: the classifier, loaded once at startup and
/// read-only thereafter, plus the result count the endpoint serves.
#[derive(Debug, Clone)]
pub struct AppState {
    pub classifier: Arc<AnimalClassifier>,
    pub top_k: usize,
}

impl AppState {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let classifier = AnimalClassifier::load(&config.model_path, config.session_pool_size)?;
        Ok(Self {
            classifier: Arc::new(classifier),
            top_k: config.top_k,
        })
    }
}
