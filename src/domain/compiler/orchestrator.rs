//! The compilation pipeline

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use super::dto::{Clarification, ClarificationOutcome, CompileRequest, CompileResponse};
use super::selection::WorkflowSelector;
use super::simulation::{default_initial_state, StateSimulator};
use super::stages;
use crate::domain::memory::ParameterMemory;
use crate::domain::resolver::{bind_targets, remember_answer, ParameterQuestion, ParameterResolver};
use crate::domain::workflow::{
    apply_computed, computed_order, CompileError, LoopExpander, ParameterSource, RegistryHandle,
    WorkflowDefinition, DEFAULT_MAX_STEPS,
};

/// Knobs of the pipeline outside parameter resolution
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerSettings {
    pub max_steps: usize,
    pub enable_simulation: bool,
    /// Overrides of the simulated starting state
    pub initial_state: BTreeMap<String, Value>,
    pub workflow_match_threshold: f32,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            enable_simulation: true,
            initial_state: default_initial_state(),
            workflow_match_threshold: 0.60,
        }
    }
}

/// Compiles goals into ordered instruction lists.
///
/// Stages always run in this order, whether the steps come from the workflow
/// or from `steps_override`:
/// 1. defaults and explicit values
/// 2. computed parameters
/// 3. parameter resolution; anything unresolved stops here with questions
/// 4. loop expansion and `{var}` interpolation
/// 5. `$CALCULATE` and `$name` substitution
/// 6. conditions, against simulated host state when enabled
/// 7. dependency ordering
/// 8. instructions with provenance
pub struct Compiler {
    registry: Arc<RegistryHandle>,
    resolver: ParameterResolver,
    memory: Arc<dyn ParameterMemory>,
    expander: LoopExpander,
    selector: WorkflowSelector,
    simulator: Option<StateSimulator>,
}

impl Compiler {
    pub fn new(
        registry: Arc<RegistryHandle>,
        resolver: ParameterResolver,
        memory: Arc<dyn ParameterMemory>,
        settings: CompilerSettings,
    ) -> Self {
        let simulator = settings
            .enable_simulation
            .then(|| StateSimulator::new(settings.initial_state.clone()));

        Self {
            registry,
            resolver,
            memory,
            expander: LoopExpander::new(settings.max_steps),
            selector: WorkflowSelector::new(settings.workflow_match_threshold),
            simulator,
        }
    }

    /// Replace the state simulator, e.g. to add host-specific rules
    pub fn with_simulator(mut self, simulator: StateSimulator) -> Self {
        self.simulator = Some(simulator);
        self
    }

    pub fn registry(&self) -> &Arc<RegistryHandle> {
        &self.registry
    }

    pub async fn compile(&self, request: CompileRequest) -> Result<CompileResponse, CompileError> {
        let span = info_span!(
            "compile",
            workflow = request.workflow_name.as_deref().unwrap_or(""),
            overridden = request.steps_override.is_some()
        );
        self.compile_inner(request).instrument(span).await
    }

    async fn compile_inner(&self, request: CompileRequest) -> Result<CompileResponse, CompileError> {
        let registry = self.registry.snapshot();
        let analysis = self.resolver.analyze(&request.goal).await?;

        let definition = match request.workflow_name.as_deref() {
            Some(name) => registry
                .get(name)
                .ok_or_else(|| CompileError::workflow_not_found(name))?,
            None => {
                let selected = self
                    .selector
                    .select(&registry, &analysis, self.resolver.embedder().as_ref())
                    .await?;
                match selected {
                    Some((workflow, _)) => workflow,
                    None => {
                        info!(goal = %request.goal, "No workflow matched");
                        return Ok(CompileResponse::NoMatch);
                    }
                }
            }
        };

        let mut context = stages::initial_context(&definition, &request.explicit_params)?;

        let computed = computed_order(&definition)?;
        apply_computed(&computed, &mut context)?;
        debug!(stage = "computed", count = computed.len(), "Computed parameters applied");

        let resolution = self.resolver.resolve(&definition, &analysis, &context).await?;
        if !resolution.is_complete() {
            let questions = stages::questions(&definition, &resolution.unresolved);
            info!(
                workflow = %definition.name,
                questions = questions.len(),
                "Compilation needs parameter input"
            );
            return Ok(CompileResponse::NeedsParameterInput {
                workflow: definition.name.clone(),
                questions,
            });
        }
        for (name, value) in resolution.resolved {
            match resolution.sources.get(&name) {
                Some(ParameterSource::Default) | None => {}
                Some(source) => {
                    context.bind(name, value, *source);
                }
            }
        }
        apply_computed(&computed, &mut context)?;
        debug!(stage = "resolve", bound = context.len(), "Parameters resolved");

        let templates = request.steps_override.as_deref().unwrap_or(&definition.steps);
        let expanded = self.expander.expand(templates, &context)?;
        debug!(stage = "expand", templates = templates.len(), steps = expanded.len(), "Loops expanded");

        let substituted = expanded
            .into_iter()
            .map(|step| stages::substitute_params(step, &context))
            .collect::<Result<Vec<_>, _>>()?;
        stages::check_step_graph(&substituted)?;

        let (accepted, dropped) =
            stages::apply_conditions(substituted, &context, self.simulator.as_ref())?;
        debug!(stage = "conditions", accepted = accepted.len(), skipped = dropped.len(), "Conditions evaluated");

        let ordered = stages::order_steps(accepted, &dropped)?;
        let instructions = stages::emit(ordered, &context);

        info!(
            workflow = %definition.name,
            instructions = instructions.len(),
            "Compilation ready"
        );
        Ok(CompileResponse::Ready {
            workflow: definition.name.clone(),
            instructions,
        })
    }

    /// Validate and store a value the caller supplied for a question.
    ///
    /// A value that breaks the schema is not an error: the outcome carries
    /// the question to ask again.
    pub async fn submit_clarification(
        &self,
        workflow: &str,
        clarification: Clarification,
    ) -> Result<ClarificationOutcome, CompileError> {
        let registry = self.registry.snapshot();
        let definition = registry
            .get(workflow)
            .ok_or_else(|| CompileError::workflow_not_found(workflow))?;
        let schema = definition
            .parameter(&clarification.parameter_name)
            .ok_or_else(|| {
                CompileError::unknown_parameter(&clarification.parameter_name, workflow)
            })?;

        let value = match schema.validate(&clarification.value) {
            Ok(value) => value,
            Err(e) => {
                warn!(parameter = %schema.name, error = %e, "Clarification rejected");
                return Ok(ClarificationOutcome::Rejected {
                    question: ParameterQuestion::for_parameter(schema, clarification.context)
                        .with_rejection(e.to_string()),
                });
            }
        };

        let values = bound_values(&definition, &schema.name, &clarification.context, &value);
        let stored = remember_answer(
            self.memory.as_ref(),
            self.resolver.embedder().as_ref(),
            &definition.name,
            &values,
            &clarification.context,
        )
        .await?;

        info!(
            workflow = %definition.name,
            parameter = %schema.name,
            stored = stored.len(),
            "Clarification stored"
        );
        Ok(ClarificationOutcome::Accepted {
            stored: values.into_iter().map(|(name, _)| name).collect(),
        })
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("resolver", &self.resolver)
            .field("expander", &self.expander)
            .field("selector", &self.selector)
            .field("simulation", &self.simulator.is_some())
            .finish_non_exhaustive()
    }
}

fn bound_values(
    definition: &WorkflowDefinition,
    parameter: &str,
    context: &str,
    value: &Value,
) -> Vec<(String, Value)> {
    bind_targets(definition, parameter, context)
        .into_iter()
        .filter_map(|target| target.validate(value).ok().map(|v| (target.name.clone(), v)))
        .collect()
}
