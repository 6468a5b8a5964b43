//! Resolving free-text module references from the language model.
//!
//! A name matches a module when either lowercased string contains the
//! other. Resolution never guesses between several matches: the caller
//! gets the candidate list and an [`AmbiguityPolicy`] decides what to do.

use serde::{Deserialize, Serialize};

use crate::models::LearningModule;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Leave every module untouched and report the candidates.
    #[default]
    Reject,
    /// Update every matching module.
    ApplyAll,
}

impl AmbiguityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbiguityPolicy::Reject => "reject",
            AmbiguityPolicy::ApplyAll => "apply_all",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reject" => Some(AmbiguityPolicy::Reject),
            "apply_all" | "apply-all" | "all" => Some(AmbiguityPolicy::ApplyAll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
}

impl From<&LearningModule> for Candidate {
    fn from(m: &LearningModule) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    ById(String),
    ByName(String),
    Ambiguous(Vec<Candidate>),
    NotFound,
}

pub fn names_match(module_name: &str, query: &str) -> bool {
    let name = module_name.trim().to_lowercase();
    let query = query.trim().to_lowercase();
    if name.is_empty() || query.is_empty() {
        return false;
    }
    name.contains(&query) || query.contains(&name)
}

/// Every module whose name contains, or is contained in, the query.
pub fn find_candidates(modules: &[LearningModule], query: &str) -> Vec<Candidate> {
    modules
        .iter()
        .filter(|m| names_match(&m.name, query))
        .map(Candidate::from)
        .collect()
}

/// An exact id wins; otherwise the name must match exactly one module.
pub fn resolve(modules: &[LearningModule], id: Option<&str>, name: &str) -> Resolution {
    if let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) {
        if modules.iter().any(|m| m.id == id) {
            return Resolution::ById(id.to_string());
        }
        tracing::debug!(id, "unknown module id, falling back to name");
    }

    let mut candidates = find_candidates(modules, name);
    match candidates.len() {
        0 => Resolution::NotFound,
        1 => Resolution::ByName(candidates.remove(0).id),
        _ => Resolution::Ambiguous(candidates),
    }
}
