//! Scripted language model and canned generation documents.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::clients::gemini::LanguageModel;
use crate::clients::models::requests::LlmMessage;
use crate::clients::models::responses::{LlmResponse, TokenUsage};
use crate::error::{PlannerError, Result};

pub enum ScriptStep {
    Reply(String),
    Fail(String),
    /// Never resolves; used to exercise cancellation.
    Hang,
}

/// Replays a fixed list of responses and records every message list it was sent.
#[derive(Default)]
pub struct ScriptedModel {
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: Mutex<Vec<Vec<LlmMessage>>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(replies: &[&str]) -> Self {
        Self::new(
            replies
                .iter()
                .map(|reply| ScriptStep::Reply(reply.to_string()))
                .collect(),
        )
    }

    pub fn calls(&self) -> Vec<Vec<LlmMessage>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, messages: &[LlmMessage]) -> Result<LlmResponse> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let step = self.steps.lock().unwrap().pop_front();

        match step {
            Some(ScriptStep::Reply(content)) => Ok(LlmResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            }),
            Some(ScriptStep::Fail(message)) => Err(PlannerError::llm(message)),
            Some(ScriptStep::Hang) => std::future::pending().await,
            None => Err(PlannerError::llm("script exhausted")),
        }
    }
}

/// A valid single-day document with a warm-up and one main block.
pub fn day_json(name: &str, main_exercise: &str) -> String {
    format!(
        r#"{{
    "day": 1,
    "name": "{name}",
    "description": "{name} session",
    "instructions": "Keep good form",
    "blocks": [
        {{
            "blockType": "warmup",
            "blockName": "Warm-up",
            "blockDurationMinutes": 5,
            "exercises": [{{"name": "Jumping Jacks", "duration": 60, "order": 1}}]
        }},
        {{
            "blockType": "traditional",
            "blockName": "Main",
            "blockDurationMinutes": 25,
            "rounds": 1,
            "exercises": [
                {{"name": "{main_exercise}", "sets": 3, "reps": "8-10", "restTime": 90, "order": 1}},
                {{"name": "Plank", "sets": 3, "duration": 45, "order": 2}}
            ]
        }}
    ],
    "exercisesToAdd": [
        {{"name": "Jumping Jacks", "muscleGroups": ["full body"], "equipment": [], "difficulty": "beginner", "tag": "cardio"}}
    ]
}}"#,
        name = name,
        main_exercise = main_exercise
    )
}

/// A weekly document wrapping `days` single-day documents.
pub fn plan_json(day_names: &[&str]) -> String {
    let days = day_names
        .iter()
        .map(|name| day_json(name, "Goblet Squat"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        r#"{{"name": "Weekly Plan", "description": "Full week", "days": [{}], "exercisesToAdd": []}}"#,
        days
    )
}
