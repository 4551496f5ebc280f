//! # Cortex Embeddings
//!
//! Interchangeable embedding backends behind one [`EmbeddingProvider`] contract.
//!
//! * [`LocalProvider`] runs a sentence-embedding model through ONNX Runtime. The model is
//!   loaded lazily on the first call and shared by every provider built for the same model
//!   within the process. `mode = "stub"` swaps the model for deterministic hash-seeded
//!   vectors, which is what tests and offline runs use.
//! * [`RemoteProvider`] calls an OpenAI-compatible `/embeddings` endpoint with a per-request
//!   timeout and capped exponential backoff on rate limits and transient failures.
//!
//! ```rust
//! use cortex_embeddings::{build_provider, LocalMode, ProviderConfig};
//!
//! # tokio_test_block(async {
//! let mut config = ProviderConfig::local("all-minilm-l6-v2");
//! config.local.mode = LocalMode::Stub;
//! let provider = build_provider(&config).unwrap();
//!
//! let vectors = provider.embed(&["fn main() {}".to_string()]).await.unwrap();
//! assert_eq!(vectors[0].len(), provider.dimension());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod config;
mod error;
mod local;
mod onnx;
mod provider;
mod remote;
mod stub;

pub use config::{
    LocalConfig, LocalMode, ProviderConfig, ProviderKind, RemoteConfig, DEFAULT_LOCAL_MODEL,
    DEFAULT_REMOTE_MODEL, EMBEDDING_MODE_ENV, MODEL_DIR_ENV,
};
pub use error::{EmbeddingError, Result};
pub use local::{LocalProvider, ModelSpec, MODELS};
pub use onnx::Device;
pub use provider::{build_provider, cosine_similarity, EmbeddingProvider, ItemResult};
pub use remote::{
    EmbeddingData, EmbeddingRequest, EmbeddingResponse, HttpTransport, RemoteProvider,
    RetryPolicy, Transport,
};
