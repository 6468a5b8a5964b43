use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EXERCISES_TOTAL: u32 = 20;

// Spaced repetition stage of a module; Mastered is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReviewStage {
    NotStarted = 0,
    First = 1,
    Second = 2,
    Third = 3,
    Mastered = 4,
}

impl ReviewStage {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Out-of-range values saturate at Mastered.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => ReviewStage::NotStarted,
            1 => ReviewStage::First,
            2 => ReviewStage::Second,
            3 => ReviewStage::Third,
            _ => ReviewStage::Mastered,
        }
    }

    pub fn next(&self) -> Self {
        Self::from_u8(self.as_u8() + 1)
    }

    /// Whether a review date must be scheduled at this stage.
    pub fn is_scheduled(&self) -> bool {
        matches!(
            self,
            ReviewStage::First | ReviewStage::Second | ReviewStage::Third
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReviewStage::NotStarted => "Not started",
            ReviewStage::First => "Stage 1",
            ReviewStage::Second => "Stage 2",
            ReviewStage::Third => "Stage 3",
            ReviewStage::Mastered => "Mastered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub date: DateTime<Utc>,
    pub stage: ReviewStage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningModule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub completion_percentage: u8,
    pub exercises_completed: u32,
    pub exercises_total: u32,
    pub pdf_summary_url: Option<String>,
    pub last_studied: DateTime<Utc>,
    pub review_stage: ReviewStage,
    pub next_review_date: Option<DateTime<Utc>>,
    pub review_history: Vec<ReviewRecord>,
}

impl LearningModule {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        exercises_total: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            completion_percentage: 0,
            exercises_completed: 0,
            exercises_total,
            pdf_summary_url: None,
            last_studied: now,
            review_stage: ReviewStage::NotStarted,
            next_review_date: None,
            review_history: Vec::new(),
        }
    }

    /// Checks the stored invariants: counts in range, percentage in range,
    /// and a review date present exactly for the scheduled stages.
    pub fn is_consistent(&self) -> bool {
        self.exercises_completed <= self.exercises_total
            && self.completion_percentage <= 100
            && self.review_stage.is_scheduled() == self.next_review_date.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(ChatRole::User),
            "model" | "assistant" => Some(ChatRole::Model),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_modules: usize,
    pub in_review: usize,
    pub mastered: usize,
    pub due_now: usize,
    pub total_reviews: usize,
    pub avg_completion: f64,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
