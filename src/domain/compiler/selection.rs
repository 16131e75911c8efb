//! Goal to workflow matching

use std::sync::Arc;

use tracing::debug;

use crate::domain::embedding::{cosine_similarity, EmbeddingProvider};
use crate::domain::resolver::GoalAnalysis;
use crate::domain::workflow::{WorkflowDefinition, WorkflowRegistry};
use crate::domain::DomainError;

/// Why a workflow was picked
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionReason {
    Trigger,
    Similarity(f32),
}

/// Picks the workflow a goal asks for.
///
/// A trigger keyword in the goal wins outright. Otherwise the workflow whose
/// name and description read closest to the goal is taken if it clears the
/// threshold.
#[derive(Debug, Clone)]
pub struct WorkflowSelector {
    threshold: f32,
}

impl WorkflowSelector {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub async fn select(
        &self,
        registry: &WorkflowRegistry,
        analysis: &GoalAnalysis,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Option<(Arc<WorkflowDefinition>, SelectionReason)>, DomainError> {
        if let Some(workflow) = registry.match_trigger(analysis.goal()) {
            debug!(workflow = %workflow.name, "Workflow matched by trigger");
            return Ok(Some((workflow, SelectionReason::Trigger)));
        }

        let mut best: Option<(Arc<WorkflowDefinition>, f32)> = None;
        for workflow in registry.list() {
            let text = format!("{} {}", workflow.name.replace('_', " "), workflow.description);
            let embedding = embedder.embed(text.trim()).await?;
            let similarity = cosine_similarity(&embedding, analysis.goal_embedding());
            if best.as_ref().is_none_or(|(_, s)| similarity > *s) {
                best = Some((Arc::clone(workflow), similarity));
            }
        }

        Ok(best
            .filter(|(_, similarity)| *similarity >= self.threshold)
            .map(|(workflow, similarity)| {
                debug!(workflow = %workflow.name, similarity, "Workflow matched by similarity");
                (workflow, SelectionReason::Similarity(similarity))
            }))
    }
}
