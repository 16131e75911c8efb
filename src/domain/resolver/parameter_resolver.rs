//! Three-tier parameter resolver

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::analysis::GoalAnalysis;
use super::clarification::ClarificationHandler;
use super::modifier::{modifier_assignments, ModifierMatcher};
use super::question::UnresolvedParameter;
use super::tiers::{
    FallbackTier, LearnedTier, ModifierTier, ResolutionTier, ResolveInput, ResolverSettings,
    TierOutcome,
};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::memory::ParameterMemory;
use crate::domain::workflow::{CompileError, EvaluationContext, ParameterSource, WorkflowDefinition};

/// What the resolver settled for one goal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionResult {
    pub resolved: BTreeMap<String, Value>,
    pub sources: BTreeMap<String, ParameterSource>,
    pub unresolved: Vec<UnresolvedParameter>,
}

impl ResolutionResult {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    fn record(&mut self, name: String, value: Value, source: ParameterSource) {
        let replace = match self.sources.get(&name) {
            None => true,
            Some(existing) => *existing == ParameterSource::Default,
        };
        if replace {
            self.resolved.insert(name.clone(), value);
            self.sources.insert(name, source);
        }
    }
}

/// Runs every non-explicit, non-computed parameter through the tier chain
pub struct ParameterResolver {
    embedder: Arc<dyn EmbeddingProvider>,
    matcher: ModifierMatcher,
    tiers: Vec<Box<dyn ResolutionTier>>,
}

impl ParameterResolver {
    /// Standard chain: modifier, then learned, then fallback
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        memory: Arc<dyn ParameterMemory>,
        handler: Option<Arc<dyn ClarificationHandler>>,
        settings: ResolverSettings,
    ) -> Self {
        let tiers: Vec<Box<dyn ResolutionTier>> = vec![
            Box::new(ModifierTier),
            Box::new(LearnedTier::new(
                Arc::clone(&memory),
                settings.memory_similarity_threshold,
            )),
            Box::new(FallbackTier::new(
                Arc::clone(&embedder),
                memory,
                handler,
                settings.clone(),
            )),
        ];

        Self {
            embedder,
            matcher: ModifierMatcher::new(settings.word_similarity_threshold),
            tiers,
        }
    }

    /// Replace the tier chain
    pub fn with_tiers(mut self, tiers: Vec<Box<dyn ResolutionTier>>) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Tokenize and embed a goal once for the whole resolution
    pub async fn analyze(&self, goal: &str) -> Result<GoalAnalysis, CompileError> {
        Ok(GoalAnalysis::build(goal, self.embedder.as_ref()).await?)
    }

    pub async fn resolve(
        &self,
        definition: &WorkflowDefinition,
        analysis: &GoalAnalysis,
        context: &EvaluationContext,
    ) -> Result<ResolutionResult, CompileError> {
        let matches = self
            .matcher
            .matches(definition, analysis, self.embedder.as_ref())
            .await?;
        let assignments = modifier_assignments(definition, &matches);
        let mut result = ResolutionResult::default();

        for parameter in &definition.parameters {
            if parameter.is_computed() || context.is_explicit(&parameter.name) {
                continue;
            }
            if result
                .sources
                .get(&parameter.name)
                .is_some_and(|source| *source != ParameterSource::Default)
            {
                continue;
            }

            let input = ResolveInput {
                definition,
                parameter,
                analysis,
                assignments: &assignments,
            };

            for tier in &self.tiers {
                let Some(outcome) = tier.try_resolve(&input).await? else {
                    continue;
                };
                debug!(parameter = %parameter.name, tier = %tier.tier(), "Tier answered");
                match outcome {
                    TierOutcome::Resolved { values, source } => {
                        for (name, value) in values {
                            if !context.is_explicit(&name) {
                                result.record(name, value, source);
                            }
                        }
                    }
                    TierOutcome::Unresolved(unresolved) => result.unresolved.push(unresolved),
                }
                break;
            }
        }

        debug!(
            workflow = %definition.name,
            resolved = result.resolved.len(),
            unresolved = result.unresolved.len(),
            "Parameter resolution finished"
        );
        Ok(result)
    }
}

impl fmt::Debug for ParameterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tiers: Vec<String> = self.tiers.iter().map(|t| t.tier().to_string()).collect();
        f.debug_struct("ParameterResolver")
            .field("embedder", &self.embedder.provider_name())
            .field("matcher", &self.matcher)
            .field("tiers", &tiers)
            .finish()
    }
}
