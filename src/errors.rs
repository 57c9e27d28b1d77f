//! Error types for the classifier and its HTTP boundary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Model weights were missing, corrupt, or rejected by ONNX Runtime.
    #[error("failed to load model from {path}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },

    /// Uploaded bytes could not be decoded as an image.
    #[error("image decode: {0}")]
    InvalidImage(#[from] image::ImageError),

    /// Structurally invalid request to the core.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Forward pass or output extraction failed.
    #[error("inference failed: {context}")]
    Inference {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// ONNX Runtime error outside the load/forward paths.
    #[error(transparent)]
    Session(#[from] ort::Error),
}

impl ClassifierError {
    pub fn inference(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Plain-message error for failures with no underlying source.
#[derive(Debug)]
pub struct SimpleError {
    message: String,
}

impl SimpleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SimpleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SimpleError {}
