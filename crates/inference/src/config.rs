//! Model-serving configuration loaded from environment variables.

use std::str::FromStr;

/// Side length of the square input the network was trained on.
pub const DEFAULT_INPUT_SIZE: u32 = 380;

const DEFAULT_MODEL_NAME: &str = "retina";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How pixel values are scaled before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Raw `0..=255` floats; the network applies its own rescaling.
    #[default]
    Passthrough,
    /// `x / 127.5 - 1`, mapping into `[-1, 1]`.
    Symmetric,
}

impl Normalization {
    pub fn apply(self, value: u8) -> f32 {
        match self {
            Normalization::Passthrough => f32::from(value),
            Normalization::Symmetric => f32::from(value) / 127.5 - 1.0,
        }
    }
}

impl FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "efficientnet" => Ok(Normalization::Passthrough),
            "symmetric" => Ok(Normalization::Symmetric),
            other => Err(format!("unknown normalization '{other}'")),
        }
    }
}

/// Where the classifier is served and how to feed it.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL of the TensorFlow Serving REST API, e.g. `http://localhost:8501`.
    pub endpoint: String,
    pub model_name: String,
    pub input_size: u32,
    pub normalization: Normalization,
    pub timeout_secs: u64,
}

impl ModelConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `MODEL_ENDPOINT` is not set; prediction endpoints
    /// then answer 503 `MODEL_UNAVAILABLE`.
    ///
    /// | Variable              | Required | Default       |
    /// |-----------------------|----------|---------------|
    /// | `MODEL_ENDPOINT`      | yes      |               |
    /// | `MODEL_NAME`          | no       | `retina`      |
    /// | `MODEL_INPUT_SIZE`    | no       | `380`         |
    /// | `MODEL_NORMALIZATION` | no       | `passthrough` |
    /// | `MODEL_TIMEOUT_SECS`  | no       | `30`          |
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("MODEL_ENDPOINT").ok()?;
        let normalization = match std::env::var("MODEL_NORMALIZATION") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "Falling back to passthrough normalization");
                Normalization::default()
            }),
            Err(_) => Normalization::default(),
        };
        Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model_name: std::env::var("MODEL_NAME")
                .unwrap_or_else(|_| DEFAULT_MODEL_NAME.to_string()),
            input_size: std::env::var("MODEL_INPUT_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_INPUT_SIZE),
            normalization,
            timeout_secs: std::env::var("MODEL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}
