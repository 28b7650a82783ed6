//! Errors raised while turning an upload into a prediction.

/// Error type for preprocessing and model scoring.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The bytes are not a decodable image, or decode to unusable values.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The model server could not be reached.
    #[error("Model request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The model server answered with a non-2xx status.
    #[error("Model server error ({status}): {body}")]
    Serving { status: u16, body: String },

    /// The model answered, but not with one score per class.
    #[error("Unexpected model output: {0}")]
    BadOutput(String),

    /// Blocking preprocessing task panicked or was cancelled.
    #[error("Preprocessing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl InferenceError {
    /// Whether the failure is the caller's fault (bad upload) rather than
    /// the model's.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, InferenceError::InvalidImage(_))
    }
}
