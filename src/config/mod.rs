//! Application configuration
//!
//! Loaded from `config/default`, `config/local` and `APP__*` environment
//! variables, later sources overriding earlier ones. Every section and field
//! is optional.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::domain::compiler::{
    default_initial_state, CompilerSettings, SimulationRule, StateEffect, StateSimulator,
};
use crate::domain::resolver::ResolverSettings;
use crate::domain::workflow::DEFAULT_MAX_STEPS;
use crate::domain::DomainError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub compiler: CompilerConfig,
    pub resolver: ResolverConfig,
    pub embedding: EmbeddingConfig,
    pub registry: RegistryConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Extra state simulation rule, e.g.
/// `{ pattern = "^mesh_extrude", set = { current_mode = "EDIT" } }`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulationRuleConfig {
    pub pattern: String,
    pub set: BTreeMap<String, Value>,
    /// State key to step parameter name
    pub from_param: BTreeMap<String, String>,
}

impl SimulationRuleConfig {
    pub fn to_rule(&self) -> Result<SimulationRule, DomainError> {
        let rule = SimulationRule::parse(&self.pattern)?;
        let rule = self.set.iter().fold(rule, |rule, (key, value)| {
            rule.with_effect(key, StateEffect::Set(value.clone()))
        });
        Ok(self.from_param.iter().fold(rule, |rule, (key, param)| {
            rule.with_effect(key, StateEffect::FromParam(param.clone()))
        }))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub max_steps: usize,
    pub enable_simulation: bool,
    pub initial_state: BTreeMap<String, Value>,
    pub simulation_rules: Vec<SimulationRuleConfig>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            enable_simulation: true,
            initial_state: default_initial_state(),
            simulation_rules: Vec::new(),
        }
    }
}

impl CompilerConfig {
    /// Standard rules plus the configured ones; `None` when simulation is off
    pub fn simulator(&self) -> Result<Option<StateSimulator>, DomainError> {
        if !self.enable_simulation {
            return Ok(None);
        }
        self.simulation_rules
            .iter()
            .try_fold(StateSimulator::new(self.initial_state.clone()), |sim, rule| {
                Ok(sim.with_rule(rule.to_rule()?))
            })
            .map(Some)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub word_similarity_threshold: f32,
    pub memory_similarity_threshold: f32,
    pub relevance_threshold: f32,
    pub workflow_match_threshold: f32,
    pub clarification_timeout_secs: u64,
    pub max_clarification_attempts: u32,
    pub fallback_on_timeout: bool,
    pub snippet_max_chars: usize,
    pub snippet_window: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let settings = ResolverSettings::default();
        Self {
            word_similarity_threshold: settings.word_similarity_threshold,
            memory_similarity_threshold: settings.memory_similarity_threshold,
            relevance_threshold: settings.relevance_threshold,
            workflow_match_threshold: 0.60,
            clarification_timeout_secs: settings.clarification_timeout.as_secs(),
            max_clarification_attempts: settings.max_clarification_attempts,
            fallback_on_timeout: settings.fallback_on_timeout,
            snippet_max_chars: settings.snippet_max_chars,
            snippet_window: settings.snippet_window,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Hashing,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub dimensions: Option<usize>,
    /// Zero disables the cache
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::default(),
            model: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimensions: None,
            cache_capacity: 10_000,
            cache_ttl_secs: 3600,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub workflows_dir: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            workflows_dir: PathBuf::from("workflows"),
        }
    }
}

/// JSON-file memory when `path` is set, in-memory otherwise
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        let resolver = &self.resolver;
        ResolverSettings {
            word_similarity_threshold: resolver.word_similarity_threshold,
            memory_similarity_threshold: resolver.memory_similarity_threshold,
            relevance_threshold: resolver.relevance_threshold,
            clarification_timeout: Duration::from_secs(resolver.clarification_timeout_secs),
            max_clarification_attempts: resolver.max_clarification_attempts,
            fallback_on_timeout: resolver.fallback_on_timeout,
            snippet_max_chars: resolver.snippet_max_chars,
            snippet_window: resolver.snippet_window,
        }
    }

    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings {
            max_steps: self.compiler.max_steps,
            enable_simulation: self.compiler.enable_simulation,
            initial_state: self.compiler.initial_state.clone(),
            workflow_match_threshold: self.resolver.workflow_match_threshold,
        }
    }
}
