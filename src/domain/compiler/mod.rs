//! Goal compilation
//!
//! Turns a goal plus a workflow template into an ordered list of concrete
//! tool calls, or into the questions that must be answered first.

mod dto;
mod orchestrator;
mod selection;
mod simulation;
pub mod stages;

pub use dto::{
    Clarification, ClarificationOutcome, CompileRequest, CompileResponse, Instruction,
};
pub use orchestrator::{Compiler, CompilerSettings};
pub use selection::{SelectionReason, WorkflowSelector};
pub use simulation::{default_initial_state, SimulationRule, StateEffect, StateSimulator};
