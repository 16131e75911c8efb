//! Workflow Compiler
//!
//! Turns a natural-language goal plus a declarative workflow template into a
//! fully resolved, ordered list of tool calls:
//! - a sandboxed expression evaluator for `$CALCULATE(...)` and conditions
//! - loop expansion with `{var}` interpolation
//! - three-tier parameter resolution (modifiers, learned memory, clarification)
//! - an eight-stage compilation pipeline

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use config::{EmbeddingBackend, EmbeddingConfig, MemoryConfig, RegistryConfig};
use domain::workflow::load_registry;
use domain::{
    ClarificationHandler, Compiler, EmbeddingProvider, ParameterMemory, ParameterResolver,
    RegistryHandle,
};
use infrastructure::{
    CachedEmbeddingProvider, FileWorkflowSource, HashingEmbeddingProvider, HttpClient,
    InMemoryParameterMemory, JsonFileParameterMemory, OpenAiEmbeddingProvider,
};
use tracing::info;

/// Build a compiler with every collaborator taken from `config`
pub async fn create_compiler(
    config: &AppConfig,
    handler: Option<Arc<dyn ClarificationHandler>>,
) -> anyhow::Result<Compiler> {
    let registry = create_registry(&config.registry).await?;
    let embedder = create_embedder(&config.embedding)?;
    let memory = create_memory(&config.memory).await?;

    let resolver = ParameterResolver::new(
        embedder,
        Arc::clone(&memory),
        handler,
        config.resolver_settings(),
    );
    let compiler = Compiler::new(registry, resolver, memory, config.compiler_settings());

    Ok(match config.compiler.simulator()? {
        Some(simulator) => compiler.with_simulator(simulator),
        None => compiler,
    })
}

/// Load and validate every workflow in the configured directory
pub async fn create_registry(config: &RegistryConfig) -> anyhow::Result<Arc<RegistryHandle>> {
    let source = FileWorkflowSource::new(&config.workflows_dir);
    let registry = load_registry(&source).await?;
    info!(
        dir = %config.workflows_dir.display(),
        workflows = registry.len(),
        "Workflow registry ready"
    );
    Ok(Arc::new(RegistryHandle::new(registry)))
}

pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingBackend::Hashing => {
            let dimensions = config
                .dimensions
                .unwrap_or(infrastructure::embedding::DEFAULT_DIMENSIONS);
            info!(dimensions, "Using offline hashing embeddings");
            Ok(with_cache(HashingEmbeddingProvider::new(dimensions), config))
        }
        EmbeddingBackend::OpenAi => Ok(with_cache(create_openai_embedder(config)?, config)),
    }
}

fn create_openai_embedder(
    config: &EmbeddingConfig,
) -> anyhow::Result<OpenAiEmbeddingProvider<HttpClient>> {
    let api_key = std::env::var(&config.api_key_env).map_err(|_| {
        anyhow::anyhow!("{} environment variable is required for openai embeddings", config.api_key_env)
    })?;
    let client = HttpClient::with_timeout(Duration::from_secs(config.request_timeout_secs))?;

    let provider = match &config.base_url {
        Some(url) => {
            info!("Using OpenAI embeddings with custom base URL: {}", url);
            OpenAiEmbeddingProvider::with_base_url(client, api_key, url)
        }
        None => {
            info!("Using OpenAI embeddings with default base URL");
            OpenAiEmbeddingProvider::new(client, api_key)
        }
    };
    let provider = match &config.model {
        Some(model) => provider.with_model(model),
        None => provider,
    };

    Ok(match config.dimensions {
        Some(dimensions) => provider.with_dimensions(dimensions),
        None => provider,
    })
}

fn with_cache<P: EmbeddingProvider + 'static>(
    provider: P,
    config: &EmbeddingConfig,
) -> Arc<dyn EmbeddingProvider> {
    if config.cache_capacity == 0 {
        return Arc::new(provider);
    }
    Arc::new(CachedEmbeddingProvider::with_capacity(
        provider,
        Duration::from_secs(config.cache_ttl_secs),
        config.cache_capacity,
    ))
}

pub async fn create_memory(config: &MemoryConfig) -> anyhow::Result<Arc<dyn ParameterMemory>> {
    match &config.path {
        Some(path) => {
            info!(path = %path.display(), "Using JSON file parameter memory");
            Ok(Arc::new(JsonFileParameterMemory::open(path).await?))
        }
        None => {
            info!("Using in-memory parameter memory");
            Ok(Arc::new(InMemoryParameterMemory::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::compiler::{Clarification, ClarificationOutcome, CompileRequest, CompileResponse};
    use serde_json::json;
    use tempfile::TempDir;

    const SHELF: &str = r#"
        name = "shelf"
        description = "wall shelf with boards"
        trigger_keywords = ["shelf"]

        [[parameters]]
        name = "board_count"
        type = "int"
        default = 2
        range = [1, 6]

        [[parameters]]
        name = "board_depth"
        type = "float"
        default = 0.25
        range = [0.1, 0.6]
        description = "depth of each board"
        semantic_hints = ["deep", "depth"]

        [[steps]]
        id = "board_{i}"
        tool = "modeling_create_primitive"
        params = { primitive_type = "CUBE", depth = "$board_depth" }
        loop = { variable = "i", range = "1..board_count" }
    "#;

    fn config(dir: &TempDir) -> AppConfig {
        let workflows = dir.path().join("workflows");
        std::fs::create_dir(&workflows).unwrap();
        std::fs::write(workflows.join("shelf.toml"), SHELF).unwrap();

        let mut config = AppConfig::default();
        config.registry.workflows_dir = workflows;
        config.memory.path = Some(dir.path().join("memory.json"));
        config
    }

    #[tokio::test]
    async fn test_compiler_from_config() {
        let dir = TempDir::new().unwrap();
        let compiler = create_compiler(&config(&dir), None).await.unwrap();

        let response = compiler
            .compile(CompileRequest::new("a shelf").with_param("board_count", json!(3)))
            .await
            .unwrap();

        let instructions = response.instructions().unwrap();
        let ids: Vec<&str> = instructions.iter().filter_map(|i| i.id.as_deref()).collect();
        assert_eq!(ids, vec!["board_1", "board_2", "board_3"]);
        assert_eq!(instructions[0].params["depth"], json!(0.25));
    }

    #[tokio::test]
    async fn test_clarification_is_learned_across_compilers() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let goal = "a shelf with deep boards";

        let compiler = create_compiler(&config, None).await.unwrap();
        let first = compiler.compile(CompileRequest::new(goal)).await.unwrap();
        let CompileResponse::NeedsParameterInput { questions, .. } = &first else {
            panic!("expected questions, got {:?}", first);
        };
        assert_eq!(questions[0].parameter, "board_depth");

        let outcome = compiler
            .submit_clarification(
                "shelf",
                Clarification::new("board_depth", json!(0.5), questions[0].context.clone()),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ClarificationOutcome::Accepted { .. }));

        // a fresh compiler reopens the same memory file
        let compiler = create_compiler(&config, None).await.unwrap();
        let second = compiler.compile(CompileRequest::new(goal)).await.unwrap();
        assert_eq!(second.instructions().unwrap()[0].params["depth"], json!(0.5));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingBackend::OpenAi,
            api_key_env: "WORKFLOW_COMPILER_TEST_UNSET_KEY".to_string(),
            ..Default::default()
        };

        let err = create_embedder(&config).err().unwrap();
        assert!(err.to_string().contains("WORKFLOW_COMPILER_TEST_UNSET_KEY"));
    }
}
