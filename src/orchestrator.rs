//! Structured `updateLearningModule` calls coming back from the language
//! model, and how they map onto the scheduler.
//!
//! Arguments are parsed leniently: a field of the wrong type is treated as
//! absent, never as an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::LearningModule;
use crate::resolve::{self, AmbiguityPolicy, Candidate, Resolution};
use crate::schedule::{self, ProgressUpdate};

pub const UPDATE_MODULE_TOOL: &str = "updateLearningModule";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleUpdateCall {
    pub module_name: String,
    pub module_id: Option<String>,
    pub completion_percentage: Option<f64>,
    pub exercises_delta: Option<i64>,
    pub is_review_complete: bool,
    pub notes: Option<String>,
}

fn number_field(args: &Value, key: &str) -> Option<f64> {
    let n = match args.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn bool_field(args: &Value, key: &str) -> bool {
    match args.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn string_field(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ModuleUpdateCall {
    pub fn from_args(args: &Value) -> Self {
        Self {
            module_name: string_field(args, "moduleName").unwrap_or_default(),
            module_id: string_field(args, "moduleId"),
            completion_percentage: number_field(args, "completionPercentage"),
            exercises_delta: number_field(args, "exercisesDelta").map(|d| d.round() as i64),
            is_review_complete: bool_field(args, "isReviewComplete"),
            notes: string_field(args, "notes"),
        }
    }

    pub fn progress(&self) -> ProgressUpdate {
        ProgressUpdate {
            delta: self.exercises_delta,
            percentage: self.completion_percentage,
        }
    }

    /// A call with neither a review flag nor progress fields changes nothing.
    pub fn is_actionable(&self) -> bool {
        self.is_review_complete || !self.progress().is_empty()
    }
}

/// Function declaration advertised to the model.
pub fn update_module_declaration() -> Value {
    json!({
        "name": UPDATE_MODULE_TOOL,
        "description": "Updates learning progress, adds exercises, or completes a scheduled review session.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "moduleName": {
                    "type": "STRING",
                    "description": "Name of the module (e.g., \"Physics\")."
                },
                "moduleId": {
                    "type": "STRING",
                    "description": "Exact module id when known; preferred over the name."
                },
                "completionPercentage": {
                    "type": "NUMBER",
                    "description": "New completion percentage (0-100)."
                },
                "exercisesDelta": {
                    "type": "NUMBER",
                    "description": "Number of exercises to add to the completed count (negative to remove)."
                },
                "isReviewComplete": {
                    "type": "BOOLEAN",
                    "description": "True if a scheduled spaced repetition review was completed."
                },
                "notes": {
                    "type": "STRING",
                    "description": "Contextual notes for the update."
                }
            },
            "required": ["moduleName"]
        }
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Updated { modules: Vec<LearningModule> },
    Ambiguous { candidates: Vec<Candidate> },
    NotFound { query: String },
    NoChange,
}

fn apply_one(module: &LearningModule, call: &ModuleUpdateCall, now: DateTime<Utc>) -> LearningModule {
    if call.is_review_complete {
        schedule::complete_scheduled_review(module, now)
    } else {
        schedule::record_exercise_progress(module, call.progress(), now)
    }
}

/// Applies a model-driven update to the in-memory collection. Only
/// `Updated` leaves `modules` modified.
pub fn apply_update(
    modules: &mut [LearningModule],
    call: &ModuleUpdateCall,
    policy: AmbiguityPolicy,
    now: DateTime<Utc>,
) -> ApplyOutcome {
    if !call.is_actionable() {
        return ApplyOutcome::NoChange;
    }

    let targets: Vec<String> = match resolve::resolve(modules, call.module_id.as_deref(), &call.module_name) {
        Resolution::ById(id) | Resolution::ByName(id) => vec![id],
        Resolution::Ambiguous(candidates) => match policy {
            AmbiguityPolicy::Reject => {
                tracing::info!(query = %call.module_name, count = candidates.len(), "ambiguous module name");
                return ApplyOutcome::Ambiguous { candidates };
            }
            AmbiguityPolicy::ApplyAll => candidates.into_iter().map(|c| c.id).collect(),
        },
        Resolution::NotFound => {
            tracing::info!(query = %call.module_name, "no module matches");
            return ApplyOutcome::NotFound {
                query: call.module_name.clone(),
            };
        }
    };

    if let Some(notes) = &call.notes {
        tracing::debug!(notes = %notes, "update notes");
    }

    let mut updated = Vec::with_capacity(targets.len());
    for module in modules.iter_mut().filter(|m| targets.contains(&m.id)) {
        *module = apply_one(module, call, now);
        updated.push(module.clone());
    }

    ApplyOutcome::Updated { modules: updated }
}
