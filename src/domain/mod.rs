//! Domain layer - Core compilation logic and entities

pub mod compiler;
pub mod embedding;
pub mod error;
pub mod expression;
pub mod memory;
pub mod resolver;
pub mod workflow;

pub use compiler::{
    Clarification, ClarificationOutcome, CompileRequest, CompileResponse, Compiler,
    CompilerSettings, Instruction,
};
pub use embedding::EmbeddingProvider;
pub use error::DomainError;
pub use memory::{ParameterMemory, StoredMapping};
pub use resolver::{ClarificationHandler, ParameterQuestion, ParameterResolver, ResolverSettings};
pub use workflow::{
    CompileError, RegistryHandle, WorkflowDefinition, WorkflowRegistry, WorkflowSource,
    WorkflowStep,
};
