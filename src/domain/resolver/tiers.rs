//! The three resolution tiers
//!
//! Each tier is one strategy object. The resolver runs them in a fixed
//! order for every parameter and stops at the first that answers, so a
//! modifier always dominates a learned mapping, and a learned mapping
//! always dominates the fallback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::analysis::{tokenize, GoalAnalysis};
use super::clarification::{remember_answer, ClarificationHandler};
use super::group::bind_targets;
use super::modifier::ModifierAssignment;
use super::question::{ParameterQuestion, UnresolvedParameter};
use super::snippet::extract_snippet;
use crate::domain::embedding::{cosine_similarity, EmbeddingProvider};
use crate::domain::memory::{MemoryQuery, ParameterMemory};
use crate::domain::workflow::{CompileError, ParameterSchema, ParameterSource, WorkflowDefinition};

/// Tunables shared by the tiers
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    pub word_similarity_threshold: f32,
    pub memory_similarity_threshold: f32,
    pub relevance_threshold: f32,
    pub clarification_timeout: Duration,
    pub max_clarification_attempts: u32,
    /// Use the schema default when clarification times out instead of failing
    pub fallback_on_timeout: bool,
    pub snippet_max_chars: usize,
    pub snippet_window: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            word_similarity_threshold: 0.65,
            memory_similarity_threshold: 0.85,
            relevance_threshold: 0.50,
            clarification_timeout: Duration::from_secs(30),
            max_clarification_attempts: 3,
            fallback_on_timeout: true,
            snippet_max_chars: 500,
            snippet_window: 100,
        }
    }
}

/// Identifies a tier in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Modifier,
    Learned,
    Fallback,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modifier => write!(f, "modifier"),
            Self::Learned => write!(f, "learned"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Everything a tier may look at for one parameter
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    pub definition: &'a WorkflowDefinition,
    pub parameter: &'a ParameterSchema,
    pub analysis: &'a GoalAnalysis,
    pub assignments: &'a BTreeMap<String, ModifierAssignment>,
}

/// A tier's answer for one parameter
#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    /// Values to bind; more than one when an answer covers a parameter group
    Resolved {
        values: Vec<(String, Value)>,
        source: ParameterSource,
    },
    Unresolved(UnresolvedParameter),
}

impl TierOutcome {
    fn single(name: &str, value: Value, source: ParameterSource) -> Self {
        Self::Resolved {
            values: vec![(name.to_string(), value)],
            source,
        }
    }
}

/// One resolution strategy
#[async_trait]
pub trait ResolutionTier: Send + Sync {
    fn tier(&self) -> Tier;

    /// `None` passes the parameter on to the next tier
    async fn try_resolve(&self, input: &ResolveInput<'_>)
        -> Result<Option<TierOutcome>, CompileError>;
}

/// Tier 1: values from modifier phrases found in the goal
#[derive(Debug, Clone, Default)]
pub struct ModifierTier;

#[async_trait]
impl ResolutionTier for ModifierTier {
    fn tier(&self) -> Tier {
        Tier::Modifier
    }

    async fn try_resolve(
        &self,
        input: &ResolveInput<'_>,
    ) -> Result<Option<TierOutcome>, CompileError> {
        let name = &input.parameter.name;
        Ok(input.assignments.get(name).map(|assignment| {
            debug!(parameter = %name, phrase = %assignment.phrase, "Resolved by modifier");
            TierOutcome::single(name, assignment.value.clone(), ParameterSource::Modifier)
        }))
    }
}

/// Tier 2: values learned from earlier clarifications of similar goals
pub struct LearnedTier {
    memory: Arc<dyn ParameterMemory>,
    min_similarity: f32,
}

impl LearnedTier {
    pub fn new(memory: Arc<dyn ParameterMemory>, min_similarity: f32) -> Self {
        Self {
            memory,
            min_similarity,
        }
    }
}

#[async_trait]
impl ResolutionTier for LearnedTier {
    fn tier(&self) -> Tier {
        Tier::Learned
    }

    async fn try_resolve(
        &self,
        input: &ResolveInput<'_>,
    ) -> Result<Option<TierOutcome>, CompileError> {
        let name = &input.parameter.name;
        let query = MemoryQuery::new(
            input.definition.name.clone(),
            name.clone(),
            input.analysis.goal_embedding().to_vec(),
        )
        .with_min_similarity(self.min_similarity)
        .with_limit(5);

        let matches = match self.memory.search(&query).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(parameter = %name, error = %e, "Parameter memory search failed");
                return Ok(None);
            }
        };

        for candidate in matches {
            if candidate.similarity < self.min_similarity {
                continue;
            }
            let value = match input.parameter.validate(candidate.mapping.value()) {
                Ok(value) => value,
                Err(e) => {
                    warn!(parameter = %name, error = %e, "Ignoring learned value that violates the schema");
                    continue;
                }
            };

            if let Err(e) = self.memory.record_usage(candidate.mapping.id()).await {
                warn!(parameter = %name, error = %e, "Failed to record learned mapping usage");
            }
            debug!(
                parameter = %name,
                similarity = candidate.similarity,
                context = %candidate.mapping.context_text(),
                "Resolved from memory"
            );
            return Ok(Some(TierOutcome::single(name, value, ParameterSource::Learned)));
        }

        Ok(None)
    }
}

enum Clarified {
    Answer(Value),
    NoAnswer,
}

/// Tier 3: relevance-gated fallback.
///
/// A parameter the goal does not talk about gets its schema default. One the
/// goal does mention is asked about through the clarification handler if
/// there is one, and otherwise reported unresolved.
pub struct FallbackTier {
    embedder: Arc<dyn EmbeddingProvider>,
    memory: Arc<dyn ParameterMemory>,
    handler: Option<Arc<dyn ClarificationHandler>>,
    settings: ResolverSettings,
}

impl FallbackTier {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        memory: Arc<dyn ParameterMemory>,
        handler: Option<Arc<dyn ClarificationHandler>>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            embedder,
            memory,
            handler,
            settings,
        }
    }

    /// Relevance of the parameter to the goal and the goal text that made it relevant
    async fn relevance(&self, input: &ResolveInput<'_>) -> Result<(f32, Option<String>), CompileError> {
        let analysis = input.analysis;
        let mut best: (f32, Option<String>) = (0.0, None);

        for hint in &input.parameter.semantic_hints {
            let words = tokenize(hint);
            if analysis.contains_sequence(&words) {
                return Ok((1.0, Some(hint.clone())));
            }
            let embedding = self.embedder.embed(hint).await?;
            if let Some((gram, similarity)) = analysis.best_ngram(&embedding) {
                if similarity > best.0 {
                    best = (similarity, Some(gram.to_string()));
                }
            }
        }

        let description = input.parameter.description.trim();
        if !description.is_empty() {
            let embedding = self.embedder.embed(description).await?;
            let similarity = cosine_similarity(&embedding, analysis.goal_embedding());
            best.0 = best.0.max(similarity);
        }

        Ok(best)
    }

    async fn clarify(
        &self,
        handler: &dyn ClarificationHandler,
        input: &ResolveInput<'_>,
        context: &str,
    ) -> Result<Clarified, CompileError> {
        let schema = input.parameter;
        let workflow = input.definition.name.as_str();
        let mut question = ParameterQuestion::for_parameter(schema, context);
        if let Some(group) = &schema.group {
            let members: Vec<String> = bind_targets(input.definition, &schema.name, context)
                .iter()
                .map(|p| p.name.clone())
                .collect();
            if members.len() > 1 {
                question = question.with_group(group.clone(), members);
            }
        }

        let attempts = self.settings.max_clarification_attempts.max(1);
        for attempt in 1..=attempts {
            let asked = tokio::time::timeout(
                self.settings.clarification_timeout,
                handler.ask(workflow, &question, attempt),
            )
            .await;

            match asked {
                Err(_) => {
                    let timeout_secs = self.settings.clarification_timeout.as_secs();
                    if !self.settings.fallback_on_timeout {
                        return Err(CompileError::ClarificationTimeout {
                            parameter: schema.name.clone(),
                            timeout_secs,
                        });
                    }
                    warn!(parameter = %schema.name, timeout_secs, "Clarification timed out, using default");
                    return Ok(Clarified::NoAnswer);
                }
                Ok(Err(e)) => {
                    warn!(parameter = %schema.name, error = %e, "Clarification failed, using default");
                    return Ok(Clarified::NoAnswer);
                }
                Ok(Ok(None)) => {
                    debug!(parameter = %schema.name, "Clarification declined, using default");
                    return Ok(Clarified::NoAnswer);
                }
                Ok(Ok(Some(answer))) => match schema.validate(&answer) {
                    Ok(value) => return Ok(Clarified::Answer(value)),
                    Err(e) => {
                        warn!(parameter = %schema.name, attempt, error = %e, "Clarification answer rejected");
                        question = question.with_rejection(e.to_string());
                    }
                },
            }
        }

        warn!(parameter = %schema.name, attempts, "Clarification attempts exhausted, using default");
        Ok(Clarified::NoAnswer)
    }
}

#[async_trait]
impl ResolutionTier for FallbackTier {
    fn tier(&self) -> Tier {
        Tier::Fallback
    }

    async fn try_resolve(
        &self,
        input: &ResolveInput<'_>,
    ) -> Result<Option<TierOutcome>, CompileError> {
        let schema = input.parameter;
        let default = || TierOutcome::single(&schema.name, schema.default.clone(), ParameterSource::Default);

        let (relevance, term) = self.relevance(input).await?;
        if relevance < self.settings.relevance_threshold {
            return Ok(Some(default()));
        }

        let context = extract_snippet(
            input.analysis.goal(),
            term.as_deref(),
            self.settings.snippet_max_chars,
            self.settings.snippet_window,
        );

        let Some(handler) = self.handler.as_deref() else {
            debug!(parameter = %schema.name, relevance, "Parameter mentioned but unknown");
            return Ok(Some(TierOutcome::Unresolved(UnresolvedParameter {
                name: schema.name.clone(),
                context_text: context,
                relevance,
            })));
        };

        let value = match self.clarify(handler, input, &context).await? {
            Clarified::Answer(value) => value,
            Clarified::NoAnswer => return Ok(Some(default())),
        };

        let values: Vec<(String, Value)> = bind_targets(input.definition, &schema.name, &context)
            .into_iter()
            .filter_map(|target| target.validate(&value).ok().map(|v| (target.name.clone(), v)))
            .collect();

        if let Err(e) = remember_answer(
            self.memory.as_ref(),
            self.embedder.as_ref(),
            &input.definition.name,
            &values,
            &context,
        )
        .await
        {
            warn!(parameter = %schema.name, error = %e, "Failed to store clarified value");
        }

        Ok(Some(TierOutcome::Resolved {
            values,
            source: ParameterSource::Clarified,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::memory::{MemoryMatch, MockParameterMemory, StoredMapping};
    use crate::domain::resolver::clarification::MockClarificationHandler;
    use crate::domain::workflow::{ParameterType, WorkflowDefinition};
    use serde_json::json;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new("picnic_table").with_parameter(
            ParameterSchema::new("leg_angle", ParameterType::Float, json!(0.32))
                .with_range(-1.57, 1.57)
                .with_hints(&["angle", "splay"])
                .with_description("leg splay angle"),
        )
    }

    async fn analysis(goal: &str) -> GoalAnalysis {
        GoalAnalysis::build(goal, &MockEmbeddingProvider::new(256)).await.unwrap()
    }

    fn input<'a>(
        definition: &'a WorkflowDefinition,
        analysis: &'a GoalAnalysis,
        assignments: &'a BTreeMap<String, ModifierAssignment>,
    ) -> ResolveInput<'a> {
        ResolveInput {
            definition,
            parameter: &definition.parameters[0],
            analysis,
            assignments,
        }
    }

    #[tokio::test]
    async fn test_learned_tier_hit_records_usage() {
        let mapping = StoredMapping::new("picnic_table", "leg_angle", json!(0.1), "angled", vec![1.0]);
        let id = *mapping.id();

        let mut memory = MockParameterMemory::new();
        memory
            .expect_search()
            .withf(|q| q.workflow_name == "picnic_table" && q.parameter == "leg_angle")
            .returning(move |_| Ok(vec![MemoryMatch::new(mapping.clone(), 0.93)]));
        memory
            .expect_record_usage()
            .withf(move |got| *got == id)
            .times(1)
            .returning(|_| Ok(1));

        let definition = definition();
        let analysis = analysis("table with angled legs").await;
        let assignments = BTreeMap::new();
        let tier = LearnedTier::new(Arc::new(memory), 0.85);

        let outcome = tier
            .try_resolve(&input(&definition, &analysis, &assignments))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Some(TierOutcome::single("leg_angle", json!(0.1), ParameterSource::Learned))
        );
    }

    #[tokio::test]
    async fn test_learned_tier_skips_invalid_value() {
        let mapping = StoredMapping::new("picnic_table", "leg_angle", json!(9.0), "angled", vec![1.0]);
        let mut memory = MockParameterMemory::new();
        memory
            .expect_search()
            .returning(move |_| Ok(vec![MemoryMatch::new(mapping.clone(), 0.99)]));
        memory.expect_record_usage().never();

        let definition = definition();
        let analysis = analysis("angled legs").await;
        let assignments = BTreeMap::new();
        let tier = LearnedTier::new(Arc::new(memory), 0.85);

        assert_eq!(
            tier.try_resolve(&input(&definition, &analysis, &assignments)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_learned_tier_survives_store_error() {
        let mut memory = MockParameterMemory::new();
        memory
            .expect_search()
            .returning(|_| Err(crate::domain::DomainError::storage("offline")));

        let definition = definition();
        let analysis = analysis("angled legs").await;
        let assignments = BTreeMap::new();
        let tier = LearnedTier::new(Arc::new(memory), 0.85);

        assert!(tier
            .try_resolve(&input(&definition, &analysis, &assignments))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fallback_default_when_irrelevant() {
        let definition = definition();
        let analysis = analysis("build a bookshelf").await;
        let assignments = BTreeMap::new();
        let tier = FallbackTier::new(
            Arc::new(MockEmbeddingProvider::new(256)),
            Arc::new(MockParameterMemory::new()),
            None,
            ResolverSettings::default(),
        );

        let outcome = tier
            .try_resolve(&input(&definition, &analysis, &assignments))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Some(TierOutcome::single("leg_angle", json!(0.32), ParameterSource::Default))
        );
    }

    #[tokio::test]
    async fn test_fallback_unresolved_when_mentioned() {
        let definition = definition();
        let analysis = analysis("table whose legs splay outward").await;
        let assignments = BTreeMap::new();
        let tier = FallbackTier::new(
            Arc::new(MockEmbeddingProvider::new(256)),
            Arc::new(MockParameterMemory::new()),
            None,
            ResolverSettings::default(),
        );

        let outcome = tier
            .try_resolve(&input(&definition, &analysis, &assignments))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Some(TierOutcome::Unresolved(UnresolvedParameter {
                name: "leg_angle".into(),
                context_text: "table whose legs splay outward".into(),
                relevance: 1.0,
            }))
        );
    }

    #[tokio::test]
    async fn test_fallback_clarifies_and_remembers() {
        let mut handler = MockClarificationHandler::new();
        let mut sequence = mockall::Sequence::new();
        handler
            .expect_ask()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|_, _, attempt| *attempt == 1)
            .returning(|_, _, _| Ok(Some(json!(5.0))));
        handler
            .expect_ask()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|_, question, attempt| *attempt == 2 && question.rejected.is_some())
            .returning(|_, _, _| Ok(Some(json!(0.4))));

        let mut memory = MockParameterMemory::new();
        memory
            .expect_upsert()
            .times(1)
            .withf(|m| m.parameter() == "leg_angle" && m.value() == &json!(0.4))
            .returning(Ok);

        let definition = definition();
        let analysis = analysis("legs that splay").await;
        let assignments = BTreeMap::new();
        let tier = FallbackTier::new(
            Arc::new(MockEmbeddingProvider::new(256)),
            Arc::new(memory),
            Some(Arc::new(handler)),
            ResolverSettings::default(),
        );

        let outcome = tier
            .try_resolve(&input(&definition, &analysis, &assignments))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Some(TierOutcome::single("leg_angle", json!(0.4), ParameterSource::Clarified))
        );
    }

    #[derive(Debug)]
    struct SlowHandler;

    #[async_trait]
    impl ClarificationHandler for SlowHandler {
        async fn ask(
            &self,
            _workflow: &str,
            _question: &ParameterQuestion,
            _attempt: u32,
        ) -> Result<Option<Value>, crate::domain::DomainError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Some(json!(0.1)))
        }
    }

    #[tokio::test]
    async fn test_fallback_timeout_uses_default() {
        let definition = definition();
        let analysis = analysis("legs that splay").await;
        let assignments = BTreeMap::new();
        let settings = ResolverSettings {
            clarification_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let tier = FallbackTier::new(
            Arc::new(MockEmbeddingProvider::new(256)),
            Arc::new(MockParameterMemory::new()),
            Some(Arc::new(SlowHandler)),
            settings,
        );

        let outcome = tier
            .try_resolve(&input(&definition, &analysis, &assignments))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Some(TierOutcome::single("leg_angle", json!(0.32), ParameterSource::Default))
        );
    }

    #[tokio::test]
    async fn test_fallback_timeout_error_when_configured() {
        let definition = definition();
        let analysis = analysis("legs that splay").await;
        let assignments = BTreeMap::new();
        let settings = ResolverSettings {
            clarification_timeout: Duration::from_secs(1),
            fallback_on_timeout: false,
            ..Default::default()
        };
        let tier = FallbackTier::new(
            Arc::new(MockEmbeddingProvider::new(256)),
            Arc::new(MockParameterMemory::new()),
            Some(Arc::new(SlowHandler)),
            settings,
        );

        let err = tier
            .try_resolve(&input(&definition, &analysis, &assignments))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::ClarificationTimeout {
                parameter: "leg_angle".into(),
                timeout_secs: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_modifier_tier_reads_assignments() {
        let definition = definition();
        let analysis = analysis("straight legs").await;
        let assignments = BTreeMap::from([(
            "leg_angle".to_string(),
            ModifierAssignment {
                value: json!(0.0),
                phrase: "straight legs".into(),
                aligned: 2,
                direct: true,
            },
        )]);

        let outcome = ModifierTier
            .try_resolve(&input(&definition, &analysis, &assignments))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Some(TierOutcome::single("leg_angle", json!(0.0), ParameterSource::Modifier))
        );
    }
}
