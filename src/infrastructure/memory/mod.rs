//! Parameter memory stores

mod in_memory;
mod json_file;

pub use in_memory::InMemoryParameterMemory;
pub use json_file::JsonFileParameterMemory;
