use std::ops::AddAssign;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clients::models::common::{ExerciseToAdd, GeneratedBlock};

/// Token counts reported by the provider for one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// A structured document the model returns as its final answer.
pub trait GeneratedDocument: DeserializeOwned + Send {
    fn validate(&self) -> Result<(), String>;
    fn exercises_to_add(&self) -> &[ExerciseToAdd];
}

/// One plan day as returned by a daily-scope prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DayDocument {
    pub day: Option<serde_json::Value>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub blocks: Vec<GeneratedBlock>,
    pub exercises_to_add: Vec<ExerciseToAdd>,
}

impl DayDocument {
    /// Sum of the declared block durations, ignoring blocks that declare none.
    pub fn declared_minutes(&self) -> u32 {
        self.blocks
            .iter()
            .filter_map(|block| block.block_duration_minutes)
            .fold(0u32, u32::saturating_add)
    }
}

impl GeneratedDocument for DayDocument {
    fn validate(&self) -> Result<(), String> {
        if self.blocks.is_empty() {
            return Err("day has no blocks".to_string());
        }
        for (index, block) in self.blocks.iter().enumerate() {
            block.validate(index)?;
        }
        validate_exercises_to_add(&self.exercises_to_add)
    }

    fn exercises_to_add(&self) -> &[ExerciseToAdd] {
        &self.exercises_to_add
    }
}

/// Every plan day at once, as returned by a weekly-scope prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanDocument {
    pub name: Option<String>,
    pub description: Option<String>,
    pub days: Vec<DayDocument>,
    pub exercises_to_add: Vec<ExerciseToAdd>,
}

impl GeneratedDocument for PlanDocument {
    fn validate(&self) -> Result<(), String> {
        if self.days.is_empty() {
            return Err("plan has no days".to_string());
        }
        for (index, day) in self.days.iter().enumerate() {
            day.validate()
                .map_err(|reason| format!("day {}: {}", index + 1, reason))?;
        }
        validate_exercises_to_add(&self.exercises_to_add)
    }

    fn exercises_to_add(&self) -> &[ExerciseToAdd] {
        &self.exercises_to_add
    }
}

fn validate_exercises_to_add(entries: &[ExerciseToAdd]) -> Result<(), String> {
    match entries.iter().position(|entry| entry.name.trim().is_empty()) {
        Some(position) => Err(format!("exercisesToAdd entry {} has no name", position + 1)),
        None => Ok(()),
    }
}
