//! Capability Manifest: the static table behind the Capability Registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-role entry in the capability manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCapability {
    pub role: String,
    pub tools: Vec<String>,
    pub strengths: Vec<String>,
    pub cannots: Vec<String>,
}

/// Global numeric budgets that bound one pipeline execution. These are the
/// single source of truth for planning and execution limits (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManifestBudgets {
    pub max_search_queries_per_step: u32,
    pub max_page_fetches_per_step: u32,
    pub max_urls_per_query: u32,
    pub max_chars_per_page: usize,
    pub min_research_iterations: u32,
    pub max_research_iterations: u32,
}

impl Default for ManifestBudgets {
    fn default() -> Self {
        Self {
            max_search_queries_per_step: 6,
            max_page_fetches_per_step: 16,
            max_urls_per_query: 3,
            max_chars_per_page: 8_000,
            min_research_iterations: 2,
            max_research_iterations: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityManifest {
    pub roles: HashMap<String, RoleCapability>,
    pub budgets: ManifestBudgets,
}

impl Default for CapabilityManifest {
    fn default() -> Self {
        Self {
            roles: HashMap::new(),
            budgets: ManifestBudgets::default(),
        }
    }
}
