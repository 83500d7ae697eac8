//! Configuration types.

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_MAX_FILTER_DEPTH, DEFAULT_REGEX_SIZE_LIMIT};

/// Limits applied while compiling a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeConfig {
    /// Compiled size limit for `~=` patterns, in bytes.
    pub regex_size_limit: usize,
    /// Largest element count any single projection may select.
    pub max_projection_elements: Option<u64>,
    /// Deepest filter nesting accepted.
    pub max_filter_depth: usize,
}

impl Default for CeConfig {
    fn default() -> Self {
        Self {
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            max_projection_elements: None,
            max_filter_depth: DEFAULT_MAX_FILTER_DEPTH,
        }
    }
}

impl CeConfig {
    /// Defaults with a projection cap.
    pub fn with_max_projection(max: u64) -> Self {
        Self {
            max_projection_elements: Some(max),
            ..Self::default()
        }
    }
}
