//! Infrastructure layer - collaborator implementations and process plumbing

pub mod embedding;
pub mod http_client;
pub mod logging;
pub mod memory;
pub mod registry;

pub use embedding::{CachedEmbeddingProvider, HashingEmbeddingProvider, OpenAiEmbeddingProvider};
pub use http_client::{HttpClient, HttpClientTrait};
pub use memory::{InMemoryParameterMemory, JsonFileParameterMemory};
pub use registry::FileWorkflowSource;
