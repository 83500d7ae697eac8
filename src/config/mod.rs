//! Compiler configuration types and YAML loader.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::CeConfig;
