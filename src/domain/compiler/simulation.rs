//! Forward simulation of host state
//!
//! Conditions may read state the host would be in after the steps accepted
//! so far, e.g. `has_selection` or `current_mode == 'EDIT'`. The simulator
//! predicts that state from tool names alone; nothing is executed.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::domain::workflow::WorkflowStep;
use crate::domain::DomainError;

/// How a matched step changes one state key
#[derive(Debug, Clone, PartialEq)]
pub enum StateEffect {
    Set(Value),
    /// Copy a step parameter; no change when the step lacks it
    FromParam(String),
}

/// State effects of the tools whose name matches `pattern`
#[derive(Debug, Clone)]
pub struct SimulationRule {
    pattern: Regex,
    effects: Vec<(String, StateEffect)>,
}

impl SimulationRule {
    pub fn new(pattern: Regex) -> Self {
        Self {
            pattern,
            effects: Vec::new(),
        }
    }

    pub fn parse(pattern: &str) -> Result<Self, DomainError> {
        let pattern = Regex::new(pattern).map_err(|e| {
            DomainError::configuration(format!("Invalid simulation pattern '{}': {}", pattern, e))
        })?;
        Ok(Self::new(pattern))
    }

    pub fn with_effect(mut self, key: impl Into<String>, effect: StateEffect) -> Self {
        self.effects.push((key.into(), effect));
        self
    }

    pub fn matches(&self, tool: &str) -> bool {
        self.pattern.is_match(tool)
    }

    fn apply(&self, state: &mut BTreeMap<String, Value>, step: &WorkflowStep) {
        for (key, effect) in &self.effects {
            let value = match effect {
                StateEffect::Set(value) => value.clone(),
                StateEffect::FromParam(param) => match step.params.get(param) {
                    Some(value) => value.clone(),
                    None => continue,
                },
            };
            state.insert(key.clone(), value);
        }
    }
}

static STANDARD_RULES: Lazy<Vec<SimulationRule>> = Lazy::new(|| {
    let rule = |pattern: &str| SimulationRule::new(Regex::new(pattern).unwrap());
    vec![
        rule(r"^system_set_mode$")
            .with_effect("current_mode", StateEffect::FromParam("mode".into())),
        rule(r"_create_|_duplicate|_add_")
            .with_effect("current_mode", StateEffect::Set(json!("OBJECT")))
            .with_effect("has_selection", StateEffect::Set(json!(true)))
            .with_effect("selected_count", StateEffect::Set(json!(1))),
        rule(r"_select_all$|_select_by_")
            .with_effect("has_selection", StateEffect::Set(json!(true))),
        rule(r"_deselect|_delete")
            .with_effect("has_selection", StateEffect::Set(json!(false)))
            .with_effect("selected_count", StateEffect::Set(json!(0))),
    ]
});

/// State keys every simulation starts from
pub fn default_initial_state() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("current_mode".to_string(), json!("OBJECT")),
        ("has_selection".to_string(), json!(false)),
        ("selected_count".to_string(), json!(0)),
    ])
}

/// Predicts host state step by step
#[derive(Debug, Clone)]
pub struct StateSimulator {
    initial: BTreeMap<String, Value>,
    rules: Vec<SimulationRule>,
}

impl Default for StateSimulator {
    fn default() -> Self {
        Self {
            initial: default_initial_state(),
            rules: STANDARD_RULES.clone(),
        }
    }
}

impl StateSimulator {
    /// Standard rules over a custom starting state; keys not given keep their defaults
    pub fn new(initial: BTreeMap<String, Value>) -> Self {
        let mut simulator = Self::default();
        simulator.initial.extend(initial);
        simulator
    }

    pub fn with_rule(mut self, rule: SimulationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn start(&self) -> BTreeMap<String, Value> {
        self.initial.clone()
    }

    /// Fold one accepted step into `state`; every matching rule applies in order
    pub fn apply(&self, state: &mut BTreeMap<String, Value>, step: &WorkflowStep) {
        for rule in self.rules.iter().filter(|r| r.matches(&step.tool)) {
            rule.apply(state, step);
        }
    }
}
