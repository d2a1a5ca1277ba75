use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::clients::gemini::LanguageModel;
use crate::clients::models::requests::{ExerciseSearchRequest, LlmMessage};
use crate::clients::models::responses::{GeneratedDocument, LlmResponse, TokenUsage};
use crate::db::{DbPool, exercises};
use crate::error::{PlannerError, Result};
use crate::services::ai_parser;
use crate::services::conversation::ConversationStore;

/// One generation request against a conversation thread.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub system: String,
    pub user: String,
    pub thread_id: String,
}

#[derive(Debug)]
pub struct AgentOutcome<T> {
    pub document: T,
    /// The final response text the document was parsed from.
    pub raw_response: String,
    pub usage: TokenUsage,
    pub search_count: usize,
    /// The user message and final answer, as they belong in thread history.
    pub exchange: Vec<LlmMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentState {
    AwaitingDesign,
    AwaitingFinal,
}

impl AgentState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingDesign => "awaiting_design",
            Self::AwaitingFinal => "awaiting_final",
        }
    }
}

/// Drives the model through at most one exercise-search round and parses its final answer.
#[derive(Clone)]
pub struct WorkoutAgent {
    llm: Arc<dyn LanguageModel>,
    pool: DbPool,
    conversations: Arc<dyn ConversationStore>,
}

impl WorkoutAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        pool: DbPool,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            llm,
            pool,
            conversations,
        }
    }

    /// Run one exchange without touching the thread.
    ///
    /// `staged` messages are replayed after the stored history, so a caller can
    /// chain exchanges and `record` them once its results are stored.
    pub async fn run<T: GeneratedDocument>(
        &self,
        request: &AgentRequest,
        staged: &[LlmMessage],
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome<T>> {
        if cancel.is_cancelled() {
            return Err(PlannerError::Cancelled);
        }

        let history = self.conversations.history(&request.thread_id).await;
        let mut messages = Vec::with_capacity(history.len() + staged.len() + 4);
        messages.push(LlmMessage::system(request.system.clone()));
        messages.extend(history);
        messages.extend_from_slice(staged);
        messages.push(LlmMessage::human(request.user.clone()));

        let mut usage = TokenUsage::default();
        let mut search_count = 0;
        let mut state = AgentState::AwaitingDesign;

        let final_response = loop {
            tracing::debug!(
                thread_id = %request.thread_id,
                state = state.as_str(),
                message_count = messages.len(),
                "agent.state"
            );

            let response = self.invoke(&messages, cancel).await?;
            usage += response.usage;

            if state == AgentState::AwaitingFinal {
                break response.content;
            }

            let search_requests = ai_parser::extract_search_requests(&response.content);
            if search_requests.is_empty() {
                if ai_parser::contains_search_marker(&response.content) {
                    tracing::warn!(thread_id = %request.thread_id, "agent.search_requests_unusable");
                }
                break response.content;
            }

            search_count = search_requests.len();
            let results = self.run_searches(&search_requests).await?;
            tracing::info!(
                thread_id = %request.thread_id,
                search_count,
                "agent.search_completed"
            );

            messages.push(LlmMessage::ai(response.content));
            messages.push(LlmMessage::human(results));
            state = AgentState::AwaitingFinal;
        };

        let document = ai_parser::parse_document::<T>(&final_response)?;

        tracing::info!(
            thread_id = %request.thread_id,
            search_count,
            new_exercises = document.exercises_to_add().len(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "agent.completed"
        );

        let exchange = vec![
            LlmMessage::human(request.user.clone()),
            LlmMessage::ai(final_response.clone()),
        ];
        Ok(AgentOutcome {
            document,
            raw_response: final_response,
            usage,
            search_count,
            exchange,
        })
    }

    /// Append messages to the thread history.
    pub async fn record(&self, thread_id: &str, messages: Vec<LlmMessage>) {
        if !messages.is_empty() {
            self.conversations.append(thread_id, messages).await;
        }
    }

    async fn invoke(
        &self,
        messages: &[LlmMessage],
        cancel: &CancellationToken,
    ) -> Result<LlmResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("agent.cancelled");
                Err(PlannerError::Cancelled)
            }
            response = self.llm.invoke(messages) => response,
        }
    }

    /// Run every search and render all result sets as one message.
    async fn run_searches(&self, requests: &[ExerciseSearchRequest]) -> Result<String> {
        let mut conn = self.pool.acquire().await?;
        let mut output = String::from("EXERCISE SEARCH RESULTS:\n");

        for (index, request) in requests.iter().enumerate() {
            let results = exercises::search(&mut conn, request).await?;
            tracing::debug!(
                search = index + 1,
                filters = %request.describe(),
                result_count = results.len(),
                "agent.search"
            );
            output.push_str(&format!(
                "\nSearch {} ({}), {} results:\n{}\n",
                index + 1,
                request.describe(),
                results.len(),
                serde_json::to_string(&results)?
            ));
        }

        output.push_str(
            "\nUse these exercises (or list new ones in exercisesToAdd) and respond now with ONLY the final JSON.",
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::clients::models::requests::MessageRole;
    use crate::clients::models::responses::DayDocument;
    use crate::db::test_utils::{seed_exercise, setup_test_db};
    use crate::services::conversation::InMemoryConversationStore;
    use crate::services::test_utils::{ScriptStep, ScriptedModel, day_json};

    fn request(thread_id: &str) -> AgentRequest {
        AgentRequest {
            system: "system prompt".to_string(),
            user: "design day 1".to_string(),
            thread_id: thread_id.to_string(),
        }
    }

    fn agent(model: Arc<ScriptedModel>, pool: DbPool) -> (WorkoutAgent, Arc<InMemoryConversationStore>) {
        let store = Arc::new(InMemoryConversationStore::new(Duration::from_secs(3600), 40));
        (WorkoutAgent::new(model, pool, store.clone()), store)
    }

    #[tokio::test]
    async fn test_direct_answer_needs_one_call() {
        let pool = setup_test_db().await;
        let answer = day_json("Legs", "Goblet Squat");
        let model = Arc::new(ScriptedModel::replies(&[answer.as_str()]));
        let (agent, store) = agent(model.clone(), pool);

        let outcome: AgentOutcome<DayDocument> = agent
            .run(&request("t1"), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(model.call_count(), 1);
        assert_eq!(outcome.search_count, 0);
        assert_eq!(outcome.usage.total_tokens, 15);
        assert_eq!(outcome.document.name.as_deref(), Some("Legs"));
        assert!(store.history("t1").await.is_empty());

        agent.record("t1", outcome.exchange).await;
        let history = store.history("t1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "design day 1");
        assert_eq!(history[1].role, MessageRole::Ai);
    }

    #[tokio::test]
    async fn test_two_search_requests_make_exactly_one_follow_up() {
        let pool = setup_test_db().await;
        {
            let mut conn = pool.acquire().await.unwrap();
            seed_exercise(&mut conn, "Goblet Squat", &["legs"], Some(&["dumbbells"]), "beginner", "strength").await;
            seed_exercise(&mut conn, "Burpee", &["full body"], None, "intermediate", "hiit").await;
        }

        let first = r#"Let me look up options.
EXERCISE_SEARCH_REQUEST: {"muscleGroups": ["legs"]}
EXERCISE_SEARCH_REQUEST: {"styles": ["hiit"]}"#;
        let answer = day_json("Legs", "Goblet Squat");
        let model = Arc::new(ScriptedModel::replies(&[first, answer.as_str()]));
        let (agent, _) = agent(model.clone(), pool);

        let outcome: AgentOutcome<DayDocument> = agent
            .run(&request("t2"), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(model.call_count(), 2);
        assert_eq!(outcome.search_count, 2);
        assert_eq!(outcome.usage.total_tokens, 30);

        let second_call = &model.calls()[1];
        assert_eq!(second_call.len(), 4);
        assert_eq!(second_call[2].role, MessageRole::Ai);
        assert_eq!(second_call[2].content, first);
        let results = &second_call[3].content;
        assert!(results.contains("Search 1"));
        assert!(results.contains("Goblet Squat"));
        assert!(results.contains("Search 2"));
        assert!(results.contains("Burpee"));
    }

    #[tokio::test]
    async fn test_history_is_replayed_on_the_same_thread() {
        let pool = setup_test_db().await;
        let (day_a, day_b) = (day_json("Day A", "Push-Up"), day_json("Day B", "Squat"));
        let model = Arc::new(ScriptedModel::replies(&[day_a.as_str(), day_b.as_str()]));
        let (agent, _) = agent(model.clone(), pool);
        let cancel = CancellationToken::new();

        let first: AgentOutcome<DayDocument> =
            agent.run(&request("shared"), &[], &cancel).await.unwrap();
        agent.record("shared", first.exchange).await;
        let _: AgentOutcome<DayDocument> = agent.run(&request("shared"), &[], &cancel).await.unwrap();

        let calls = model.calls();
        assert_eq!(calls[0].len(), 2);
        assert_eq!(calls[1].len(), 4);
        assert_eq!(calls[1][0].role, MessageRole::System);
        assert!(calls[1][2].content.contains("Day A"));
    }

    #[tokio::test]
    async fn test_staged_run_replays_without_recording() {
        let pool = setup_test_db().await;
        let (day_a, day_b) = (day_json("Day A", "Push-Up"), day_json("Day B", "Squat"));
        let model = Arc::new(ScriptedModel::replies(&[day_a.as_str(), day_b.as_str()]));
        let (agent, store) = agent(model.clone(), pool);
        let cancel = CancellationToken::new();

        let first: AgentOutcome<DayDocument> =
            agent.run(&request("staged"), &[], &cancel).await.unwrap();
        let _: AgentOutcome<DayDocument> = agent
            .run(&request("staged"), &first.exchange, &cancel)
            .await
            .unwrap();

        assert_eq!(model.calls()[1].len(), 4);
        assert!(model.calls()[1][2].content.contains("Day A"));
        assert!(store.history("staged").await.is_empty());

        agent.record("staged", first.exchange).await;
        assert_eq!(store.history("staged").await.len(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_not_recorded() {
        let pool = setup_test_db().await;
        let model = Arc::new(ScriptedModel::replies(&["```json\n{\"name\": \"broken\""]));
        let (agent, store) = agent(model, pool);

        let err = agent
            .run::<DayDocument>(&request("t3"), &[], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PlannerError::GenerationParse(_)));
        assert!(store.history("t3").await.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_in_flight_call() {
        let pool = setup_test_db().await;
        let model = Arc::new(ScriptedModel::new(vec![ScriptStep::Hang]));
        let (agent, store) = agent(model, pool);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = agent.run::<DayDocument>(&request("t4"), &[], &cancel).await.unwrap_err();
        assert!(matches!(err, PlannerError::Cancelled));
        assert!(store.history("t4").await.is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let pool = setup_test_db().await;
        let model = Arc::new(ScriptedModel::new(vec![ScriptStep::Fail("quota".to_string())]));
        let (agent, _) = agent(model, pool);

        let err = agent
            .run::<DayDocument>(&request("t5"), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::Llm(_)));
    }
}
