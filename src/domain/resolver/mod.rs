//! Parameter resolution
//!
//! Fills every parameter the caller did not set. Each one goes through a
//! fixed chain of tiers and takes the first answer:
//! 1. modifier phrases recognised in the goal
//! 2. values learned from earlier clarifications of similar goals
//! 3. the schema default, unless the goal mentions the parameter, in which
//!    case the caller is asked

mod analysis;
mod clarification;
mod group;
mod modifier;
mod parameter_resolver;
mod question;
mod snippet;
mod tiers;

pub use analysis::{ngrams, tokenize, GoalAnalysis, MAX_NGRAM};
pub use clarification::{remember_answer, ClarificationHandler};
pub use group::{bind_targets, side_qualifiers, SIDE_QUALIFIERS};
pub use modifier::{
    modifier_assignments, ModifierAssignment, ModifierMatch, ModifierMatcher, ModifierRejection,
};
pub use parameter_resolver::{ParameterResolver, ResolutionResult};
pub use question::{ParameterQuestion, UnresolvedParameter};
pub use snippet::extract_snippet;
pub use tiers::{
    FallbackTier, LearnedTier, ModifierTier, ResolutionTier, ResolveInput, ResolverSettings, Tier,
    TierOutcome,
};

#[cfg(test)]
pub use clarification::MockClarificationHandler;
