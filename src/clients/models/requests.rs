use serde::{Deserialize, Serialize};

/// Who authored a message in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Human,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Ai,
            content: content.into(),
        }
    }
}

/// Filter set the model emits inside an `EXERCISE_SEARCH_REQUEST:` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExerciseSearchRequest {
    pub muscle_groups: Vec<String>,
    pub equipment: Vec<String>,
    pub difficulty: Vec<String>,
    pub styles: Vec<String>,
    pub limit: Option<u32>,
}

impl ExerciseSearchRequest {
    /// Short human-readable form used when echoing results back to the model.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.muscle_groups.is_empty() {
            parts.push(format!("muscleGroups={}", self.muscle_groups.join("/")));
        }
        if !self.equipment.is_empty() {
            parts.push(format!("equipment={}", self.equipment.join("/")));
        }
        if !self.difficulty.is_empty() {
            parts.push(format!("difficulty={}", self.difficulty.join("/")));
        }
        if !self.styles.is_empty() {
            parts.push(format!("styles={}", self.styles.join("/")));
        }
        if parts.is_empty() {
            "no filters".to_string()
        } else {
            parts.join(", ")
        }
    }
}
