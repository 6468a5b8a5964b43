//! The learning companion: one chat turn against the completion service,
//! with model-issued progress updates applied to the hub in between.
//!
//! Service failures never reach the caller as errors. They are logged and
//! replaced by a fixed reply; store errors still propagate.

use serde::Serialize;

use crate::completion::{CompletionRequest, CompletionService};
use crate::error::Result;
use crate::hub::LearningHub;
use crate::models::{ChatMessage, ChatRole, LearningModule};
use crate::orchestrator::{self, ApplyOutcome, ModuleUpdateCall, UPDATE_MODULE_TOOL};
use crate::store::ModuleStore;

pub const FALLBACK_REPLY: &str =
    "I'm MindHub and I'm still here with you. I ran into a small technical problem, but we can keep going.";

pub const BRIEFING_FALLBACK: &str = "A new day with MindHub, a new chance to make progress.";

const REPORT_PROMPT: &str = "The learning records have been processed. Tell the user the result and the next suggested step clearly, in your voice as their MindHub companion. If a module name was ambiguous or unknown, ask which module they meant.";

pub fn learning_summary(modules: &[LearningModule]) -> String {
    if modules.is_empty() {
        return "No learning modules yet.".to_string();
    }

    modules
        .iter()
        .map(|m| {
            let next_review = m
                .next_review_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "none".to_string());
            let summary = if m.pdf_summary_url.is_some() {
                "available"
            } else {
                "not available"
            };
            format!(
                "- {} [id: {}]: {}% (exercises: {}/{}). Stage: {}. Next review: {}. PDF summary: {}",
                m.name,
                m.id,
                m.completion_percentage,
                m.exercises_completed,
                m.exercises_total,
                m.review_stage.as_u8(),
                next_review,
                summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn system_instruction(modules: &[LearningModule]) -> String {
    format!(
        r#"You are "MindHub", a smart learning companion and study planner.
Your current job is to act as a learning orchestrator and guide the user based on their actual records.

The user's current learning record:
{}

Next action rules:
1. Spaced repetition: focus on reviews that are due.
2. Fill the gaps: suggest finishing exercises in an incomplete module.
3. Deepen understanding: suggest explaining the material back to reinforce it.
4. Always speak as MindHub, be smart and encouraging.

When the user reports progress or a finished review, call {} with the module name, and its id when you know it."#,
        learning_summary(modules),
        UPDATE_MODULE_TOOL
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub reply: String,
    pub outcomes: Vec<ApplyOutcome>,
    /// True when the reply is the fixed fallback rather than model output.
    pub degraded: bool,
}

impl ChatTurn {
    fn fallback(outcomes: Vec<ApplyOutcome>) -> Self {
        Self {
            reply: FALLBACK_REPLY.to_string(),
            outcomes,
            degraded: true,
        }
    }
}

fn recent(history: &[ChatMessage], window: usize) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(window);
    history[start..].to_vec()
}

/// Runs one chat turn. Tool calls are applied only after the first request
/// succeeded; a second, tool-less request then reports the result.
pub fn converse<S, C>(
    hub: &mut LearningHub<S>,
    service: &C,
    history: &[ChatMessage],
    input: &str,
    history_window: usize,
) -> Result<ChatTurn>
where
    S: ModuleStore,
    C: CompletionService + ?Sized,
{
    let modules = hub.modules()?;
    let window = recent(history, history_window);

    let request = CompletionRequest {
        system_instruction: system_instruction(&modules),
        history: window.clone(),
        user_input: input.to_string(),
        tools: vec![orchestrator::update_module_declaration()],
    };

    let response = match service.generate(&request) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "completion request failed");
            return Ok(ChatTurn::fallback(vec![]));
        }
    };

    let mut outcomes = Vec::new();
    for call in &response.function_calls {
        if call.name != UPDATE_MODULE_TOOL {
            tracing::warn!(name = %call.name, "ignoring unknown function call");
            continue;
        }
        let update = ModuleUpdateCall::from_args(&call.args);
        outcomes.push(hub.apply_tool_call(&update)?);
    }

    if outcomes.is_empty() {
        return Ok(match response.text {
            Some(reply) => ChatTurn {
                reply,
                outcomes,
                degraded: false,
            },
            None => ChatTurn::fallback(outcomes),
        });
    }

    let mut report_history = window;
    report_history.push(ChatMessage {
        role: ChatRole::User,
        text: input.to_string(),
        timestamp: hub.now(),
    });
    let report = CompletionRequest {
        system_instruction: system_instruction(&hub.modules()?),
        history: report_history,
        user_input: format!("{}\n\nResults: {}", REPORT_PROMPT, serde_json::to_string(&outcomes)?),
        tools: vec![],
    };

    match service.generate(&report) {
        Ok(r) => Ok(match r.text {
            Some(reply) => ChatTurn {
                reply,
                outcomes,
                degraded: false,
            },
            None => ChatTurn::fallback(outcomes),
        }),
        Err(e) => {
            tracing::warn!(error = %e, "report request failed after applying updates");
            Ok(ChatTurn::fallback(outcomes))
        }
    }
}

/// A short motivating briefing built around today's due reviews.
pub fn daily_briefing<S, C>(hub: &LearningHub<S>, service: &C, energy: Option<u8>) -> Result<String>
where
    S: ModuleStore,
    C: CompletionService + ?Sized,
{
    let modules = hub.modules()?;
    let due = hub.due_modules()?;
    let due_names = if due.is_empty() {
        "none".to_string()
    } else {
        due.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join(", ")
    };
    let energy = energy
        .map(|e| format!("{}%", e.min(100)))
        .unwrap_or_else(|| "unknown".to_string());

    let request = CompletionRequest {
        system_instruction: system_instruction(&modules),
        history: vec![],
        user_input: format!(
            "As MindHub, give a short, smart briefing.\nEnergy: {}.\nDue reviews: {}.\nGive one specific piece of advice in a very motivating tone.",
            energy, due_names
        ),
        tools: vec![],
    };

    match service.generate(&request) {
        Ok(response) => Ok(response
            .text
            .unwrap_or_else(|| BRIEFING_FALLBACK.to_string())),
        Err(e) => {
            tracing::warn!(error = %e, "briefing request failed");
            Ok(BRIEFING_FALLBACK.to_string())
        }
    }
}
