//! Modifier phrase matching

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use super::analysis::{tokenize, GoalAnalysis};
use super::group::bind_targets;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::workflow::WorkflowDefinition;
use crate::domain::DomainError;

/// A modifier whose phrase matched the goal
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierMatch {
    /// Declaration index in the workflow
    pub index: usize,
    /// Phrase words that aligned with the goal
    pub aligned: usize,
    /// Phrase length in words
    pub words: usize,
}

/// Why a modifier did not match
#[derive(Debug, Clone, PartialEq)]
pub enum ModifierRejection {
    NegativeSignal(String),
    TooFewAligned { aligned: usize, required: usize },
}

/// Value a matched modifier assigns to one parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierAssignment {
    pub value: Value,
    pub phrase: String,
    pub aligned: usize,
    /// Set by name rather than through its group
    pub direct: bool,
}

/// Matches modifier phrases against a goal word by word
#[derive(Debug, Clone)]
pub struct ModifierMatcher {
    word_threshold: f32,
}

impl ModifierMatcher {
    pub fn new(word_threshold: f32) -> Self {
        Self { word_threshold }
    }

    /// Evaluate every modifier of `definition` against the goal
    pub async fn evaluate(
        &self,
        definition: &WorkflowDefinition,
        analysis: &GoalAnalysis,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<Result<ModifierMatch, ModifierRejection>>, DomainError> {
        let mut word_cache: HashMap<String, bool> = HashMap::new();
        let mut outcomes = Vec::with_capacity(definition.modifiers.len());

        for (index, modifier) in definition.modifiers.iter().enumerate() {
            if let Some(signal) = modifier
                .negative_signals
                .iter()
                .find(|signal| analysis.contains_sequence(&tokenize(signal)))
            {
                debug!(phrase = %modifier.phrase, signal = %signal, "Modifier vetoed by negative signal");
                outcomes.push(Err(ModifierRejection::NegativeSignal(signal.clone())));
                continue;
            }

            let words = tokenize(&modifier.phrase);
            let required = words.len().min(2);
            let mut aligned = 0;

            for word in &words {
                if let Some(&hit) = word_cache.get(word) {
                    aligned += usize::from(hit);
                    continue;
                }
                let hit = self.word_aligns(word, analysis, embedder).await?;
                word_cache.insert(word.clone(), hit);
                aligned += usize::from(hit);
            }

            if words.is_empty() || aligned < required {
                outcomes.push(Err(ModifierRejection::TooFewAligned { aligned, required }));
            } else {
                debug!(phrase = %modifier.phrase, aligned, "Modifier matched");
                outcomes.push(Ok(ModifierMatch {
                    index,
                    aligned,
                    words: words.len(),
                }));
            }
        }

        Ok(outcomes)
    }

    /// Matched modifiers only
    pub async fn matches(
        &self,
        definition: &WorkflowDefinition,
        analysis: &GoalAnalysis,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<ModifierMatch>, DomainError> {
        Ok(self
            .evaluate(definition, analysis, embedder)
            .await?
            .into_iter()
            .filter_map(Result::ok)
            .collect())
    }

    async fn word_aligns(
        &self,
        word: &str,
        analysis: &GoalAnalysis,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<bool, DomainError> {
        if analysis.contains_word(word) {
            return Ok(true);
        }
        let embedding = embedder.embed(word).await?;
        Ok(analysis
            .best_ngram(&embedding)
            .is_some_and(|(_, similarity)| similarity >= self.word_threshold))
    }
}

/// Parameter values set by the matched modifiers.
///
/// When two matched modifiers set the same parameter the one with more
/// aligned words wins; on a tie the earlier declaration wins. Values reach
/// every group member the modifier phrase does not single out by side.
pub fn modifier_assignments(
    definition: &WorkflowDefinition,
    matches: &[ModifierMatch],
) -> BTreeMap<String, ModifierAssignment> {
    let mut ordered: Vec<&ModifierMatch> = matches.iter().collect();
    ordered.sort_by_key(|m| m.index);

    let mut assignments: BTreeMap<String, ModifierAssignment> = BTreeMap::new();

    for matched in ordered {
        let modifier = &definition.modifiers[matched.index];
        for (parameter, value) in &modifier.values {
            for target in bind_targets(definition, parameter, &modifier.phrase) {
                let direct = target.name == *parameter;
                let Ok(value) = target.validate(value) else {
                    continue;
                };
                let replace = match assignments.get(&target.name) {
                    None => true,
                    Some(existing) => {
                        matched.aligned > existing.aligned
                            || (matched.aligned == existing.aligned && direct && !existing.direct)
                    }
                };
                if replace {
                    assignments.insert(
                        target.name.clone(),
                        ModifierAssignment {
                            value,
                            phrase: modifier.phrase.clone(),
                            aligned: matched.aligned,
                            direct,
                        },
                    );
                }
            }
        }
    }

    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::workflow::{Modifier, ParameterSchema, ParameterType};
    use serde_json::json;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new("picnic_table")
            .with_parameter(
                ParameterSchema::new("leg_angle", ParameterType::Float, json!(0.32))
                    .with_range(-1.57, 1.57),
            )
            .with_modifier(
                Modifier::new("straight legs")
                    .with_value("leg_angle", json!(0.0))
                    .with_negative_signals(&["X"]),
            )
    }

    async fn analyze(goal: &str, embedder: &MockEmbeddingProvider) -> GoalAnalysis {
        GoalAnalysis::build(goal, embedder).await.unwrap()
    }

    #[tokio::test]
    async fn test_exact_phrase_matches() {
        let embedder = MockEmbeddingProvider::new(256);
        let analysis = analyze("create a picnic table with straight legs", &embedder).await;

        let matches = ModifierMatcher::new(0.65)
            .matches(&definition(), &analysis, &embedder)
            .await
            .unwrap();
        assert_eq!(matches, vec![ModifierMatch { index: 0, aligned: 2, words: 2 }]);
    }

    #[tokio::test]
    async fn test_similar_word_aligns() {
        let embedder = MockEmbeddingProvider::new(3)
            .with_vector("straight", vec![1.0, 0.0, 0.0])
            .with_vector("vertical", vec![0.9, 0.2, 0.0])
            .with_vector("legs", vec![0.0, 1.0, 0.0])
            .with_vector("table", vec![0.0, 0.0, 1.0])
            .with_vector("with", vec![0.0, 0.0, 1.0]);
        let analysis = analyze("table with vertical legs", &embedder).await;

        let matches = ModifierMatcher::new(0.65)
            .matches(&definition(), &analysis, &embedder)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[tokio::test]
    async fn test_negative_signal_rejects() {
        let embedder = MockEmbeddingProvider::new(256);
        let analysis = analyze("table with legs X", &embedder).await;

        let outcomes = ModifierMatcher::new(0.65)
            .evaluate(&definition(), &analysis, &embedder)
            .await
            .unwrap();
        assert_eq!(outcomes, vec![Err(ModifierRejection::NegativeSignal("X".into()))]);
    }

    #[tokio::test]
    async fn test_negative_signal_beats_full_alignment() {
        let embedder = MockEmbeddingProvider::new(256);
        let analysis = analyze("straight legs but X shaped", &embedder).await;

        let matches = ModifierMatcher::new(0.65)
            .matches(&definition(), &analysis, &embedder)
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_single_aligned_word_is_not_enough() {
        let definition = WorkflowDefinition::new("picnic_table")
            .with_parameter(ParameterSchema::new("leg_angle", ParameterType::Float, json!(0.3)))
            .with_modifier(Modifier::new("straight legs").with_value("leg_angle", json!(0.0)));
        let embedder = MockEmbeddingProvider::new(3)
            .with_vector("straight", vec![1.0, 0.0, 0.0])
            .with_vector("legs", vec![0.0, 1.0, 0.0])
            .with_vector("table", vec![0.0, 0.0, 1.0])
            .with_vector("with", vec![0.0, 0.0, 1.0])
            .with_vector("table with", vec![0.0, 0.0, 1.0])
            .with_vector("with legs", vec![0.0, 0.7, 0.7])
            .with_vector("table with legs", vec![0.0, 0.5, 0.8]);
        let analysis = analyze("table with legs", &embedder).await;

        let outcomes = ModifierMatcher::new(0.65)
            .evaluate(&definition, &analysis, &embedder)
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![Err(ModifierRejection::TooFewAligned { aligned: 1, required: 2 })]
        );
    }

    #[test]
    fn test_assignments_prefer_stronger_match_then_declaration() {
        let definition = WorkflowDefinition::new("table")
            .with_parameter(ParameterSchema::new("height", ParameterType::Float, json!(0.75)))
            .with_modifier(Modifier::new("low").with_value("height", json!(0.4)))
            .with_modifier(Modifier::new("bar height").with_value("height", json!(1.1)))
            .with_modifier(Modifier::new("short").with_value("height", json!(0.5)));

        let matches = vec![
            ModifierMatch { index: 2, aligned: 1, words: 1 },
            ModifierMatch { index: 0, aligned: 1, words: 1 },
        ];
        assert_eq!(modifier_assignments(&definition, &matches)["height"].value, json!(0.4));

        let matches = vec![
            ModifierMatch { index: 0, aligned: 1, words: 1 },
            ModifierMatch { index: 1, aligned: 2, words: 2 },
        ];
        assert_eq!(modifier_assignments(&definition, &matches)["height"].value, json!(1.1));
    }

    #[test]
    fn test_assignments_spread_over_group() {
        let definition = WorkflowDefinition::new("table")
            .with_parameter(
                ParameterSchema::new("leg_angle_left", ParameterType::Float, json!(0.3))
                    .with_group("legs"),
            )
            .with_parameter(
                ParameterSchema::new("leg_angle_right", ParameterType::Float, json!(-0.3))
                    .with_group("legs"),
            )
            .with_modifier(Modifier::new("straight legs").with_value("leg_angle_left", json!(0.0)))
            .with_modifier(
                Modifier::new("splayed right leg").with_value("leg_angle_right", json!(-0.5)),
            );

        let both = vec![ModifierMatch { index: 0, aligned: 2, words: 2 }];
        let assignments = modifier_assignments(&definition, &both);
        assert_eq!(assignments["leg_angle_left"].value, json!(0.0));
        assert_eq!(assignments["leg_angle_right"].value, json!(0.0));

        let side = vec![ModifierMatch { index: 1, aligned: 3, words: 3 }];
        let assignments = modifier_assignments(&definition, &side);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments["leg_angle_right"].value, json!(-0.5));
    }
}
