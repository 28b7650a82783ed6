//! Fundus-image classification and prescription-suggestion clients.
//!
//! - [`preprocess`]: decode, resize and normalise an upload into a tensor.
//! - [`ScoreModel`]: the seam in front of the trained network;
//!   [`ServingModel`] reaches it over TensorFlow Serving REST.
//! - [`InferenceAdapter`]: bytes in, [`Prediction`] out, single or batch.
//! - [`providers`]: HTTP clients for the suggestion providers.

pub mod adapter;
pub mod config;
pub mod error;
pub mod model;
pub mod prediction;
pub mod preprocess;
pub mod providers;

pub use adapter::InferenceAdapter;
pub use config::{ModelConfig, Normalization};
pub use error::InferenceError;
pub use model::{ScoreModel, ServingModel};
pub use prediction::Prediction;
pub use preprocess::{preprocess, Tensor};
pub use providers::{ProviderError, SuggestionClient, SuggestionRequest};
