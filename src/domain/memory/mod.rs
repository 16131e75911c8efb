//! Learned parameter memory
//!
//! Values a user supplied through clarification are stored together with
//! the goal text they answered and its embedding, so a later goal that reads
//! the same way can reuse them without asking again.

mod mapping;
mod repository;

pub use mapping::StoredMapping;
pub use repository::{MemoryMatch, MemoryQuery, ParameterMemory};

#[cfg(test)]
pub use repository::MockParameterMemory;
