use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::models::ProfileData;
use crate::error::{PlannerError, Result};
use crate::services::workout::WorkoutService;

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    GeneratePlan,
    RegeneratePlan,
    RegenerateDay,
}

impl JobKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::GeneratePlan => "generate_plan",
            Self::RegeneratePlan => "regenerate_plan",
            Self::RegenerateDay => "regenerate_day",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub user_id: i64,
    pub job_id: Option<String>,
    pub custom_feedback: Option<String>,
    pub profile_data: Option<ProfileData>,
    pub plan_day_id: Option<i64>,
    pub regeneration_reason: Option<String>,
    pub thread_id: Option<String>,
    pub timezone: Option<String>,
    pub styles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub kind: JobKind,
    pub user_id: i64,
    pub status: JobStatus,
    pub attempts: u32,
    pub error: Option<String>,
    /// The serialized workout or plan day once the job completes.
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub delay: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl JobSettings {
    pub fn new(delay_seconds: u64, max_attempts: u32) -> Self {
        Self {
            delay: Duration::from_secs(delay_seconds),
            max_attempts: max_attempts.max(1),
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

/// Wait before retry `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Runs generation requests in the background and keeps their status in memory.
#[derive(Clone)]
pub struct JobQueue {
    service: WorkoutService,
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
    settings: JobSettings,
    shutdown: CancellationToken,
}

impl JobQueue {
    pub fn new(service: WorkoutService, settings: JobSettings) -> Self {
        Self {
            service,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn service(&self) -> &WorkoutService {
        &self.service
    }

    /// Record a pending job and start it after the configured delay.
    pub async fn enqueue(&self, kind: JobKind, payload: JobPayload) -> Result<JobRecord> {
        if kind == JobKind::RegenerateDay {
            if payload.plan_day_id.is_none() {
                return Err(PlannerError::invalid_param("planDayId is required"));
            }
            if payload
                .regeneration_reason
                .as_deref()
                .is_none_or(|reason| reason.trim().is_empty())
            {
                return Err(PlannerError::invalid_param("regenerationReason is required"));
            }
        }

        let job_id = payload
            .job_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();
        let record = JobRecord {
            job_id: job_id.clone(),
            kind,
            user_id: payload.user_id,
            status: JobStatus::Pending,
            attempts: 0,
            error: None,
            result: None,
            created_at: now,
            updated_at: now,
        };

        {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&job_id) {
                return Err(PlannerError::invalid_param(format!("job {} already exists", job_id)));
            }
            jobs.insert(job_id.clone(), record.clone());
        }

        tracing::info!(
            job_id = %job_id,
            kind = kind.as_str(),
            user_id = payload.user_id,
            delay_secs = self.settings.delay.as_secs(),
            "job.enqueued"
        );

        let queue = self.clone();
        tokio::spawn(async move {
            queue.process(job_id, kind, payload).await;
        });

        Ok(record)
    }

    pub async fn status(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Drop finished jobs last updated more than `older_than` ago.
    pub async fn evict_finished(&self, older_than: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.updated_at < cutoff));
        before - jobs.len()
    }

    /// Cancel every pending and running job.
    pub fn shutdown(&self) {
        tracing::info!("job.queue_shutdown");
        self.shutdown.cancel();
    }

    async fn process(&self, job_id: String, kind: JobKind, payload: JobPayload) {
        let cancel = self.shutdown.child_token();

        if !self.settings.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.finish(&job_id, Err(PlannerError::Cancelled)).await;
                    return;
                }
                _ = tokio::time::sleep(self.settings.delay) => {}
            }
        }

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            self.update(&job_id, |job| {
                job.status = JobStatus::Processing;
                job.attempts = attempt;
            })
            .await;
            tracing::info!(job_id = %job_id, kind = kind.as_str(), attempt, "job.processing");

            match self.execute(kind, &payload, &cancel).await {
                Err(e) if e.is_retriable() && attempt < self.settings.max_attempts => {
                    let wait = backoff_delay(self.settings.backoff_base, attempt);
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        error = %e,
                        retry_in_ms = wait.as_millis() as u64,
                        "job.retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break Err(PlannerError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                outcome => break outcome,
            }
        };

        self.finish(&job_id, outcome).await;
    }

    async fn execute(
        &self,
        kind: JobKind,
        payload: &JobPayload,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let user_id = payload.user_id;
        let value = match kind {
            JobKind::GeneratePlan => {
                let workout = self
                    .service
                    .generate_workout_plan(
                        user_id,
                        payload.custom_feedback.as_deref(),
                        payload.timezone.as_deref(),
                        cancel,
                    )
                    .await?;
                serde_json::to_value(&workout)?
            }
            JobKind::RegeneratePlan => {
                let workout = self
                    .service
                    .regenerate_workout_plan(
                        user_id,
                        payload.custom_feedback.as_deref(),
                        payload.profile_data.as_ref(),
                        payload.timezone.as_deref(),
                        cancel,
                    )
                    .await?;
                serde_json::to_value(&workout)?
            }
            JobKind::RegenerateDay => {
                let plan_day_id = payload
                    .plan_day_id
                    .ok_or_else(|| PlannerError::invalid_param("planDayId is required"))?;
                let day = self
                    .service
                    .regenerate_daily_workout(
                        user_id,
                        plan_day_id,
                        payload.regeneration_reason.as_deref().unwrap_or_default(),
                        payload.styles.as_deref(),
                        payload.thread_id.as_deref(),
                        cancel,
                    )
                    .await?;
                serde_json::to_value(&day)?
            }
        };
        Ok(value)
    }

    async fn finish(&self, job_id: &str, outcome: Result<serde_json::Value>) {
        match outcome {
            Ok(value) => {
                self.update(job_id, |job| {
                    job.status = JobStatus::Completed;
                    job.result = Some(value);
                })
                .await;
                tracing::info!(job_id = %job_id, "job.completed");
            }
            Err(e) => {
                let message = e.to_string();
                self.update(job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.error = Some(message);
                })
                .await;
                tracing::error!(job_id = %job_id, error = %e, "job.failed");
            }
        }
    }

    async fn update(&self, job_id: &str, apply: impl FnOnce(&mut JobRecord)) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            apply(job);
            job.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::db::DbPool;
    use crate::db::test_utils::{sample_profile_data, seed_exercise, seed_profile, setup_test_db};
    use crate::services::conversation::InMemoryConversationStore;
    use crate::services::test_utils::{ScriptStep, ScriptedModel, day_json};
    use crate::services::workout_agent::WorkoutAgent;

    async fn queue_with(steps: Vec<ScriptStep>, settings: JobSettings) -> (JobQueue, DbPool) {
        let pool = setup_test_db().await;
        {
            let mut conn = pool.acquire().await.unwrap();
            seed_profile(&mut conn, 1, &sample_profile_data()).await;
            seed_exercise(&mut conn, "Goblet Squat", &["legs"], Some(&["dumbbells"]), "beginner", "strength").await;
            seed_exercise(&mut conn, "Plank", &["core"], None, "beginner", "pilates").await;
        }
        let model = Arc::new(ScriptedModel::new(steps));
        let store = Arc::new(InMemoryConversationStore::new(Duration::from_secs(60), 40));
        let agent = WorkoutAgent::new(model, pool.clone(), store);
        let service = WorkoutService::new(pool.clone(), agent);
        (JobQueue::new(service, settings), pool)
    }

    async fn wait_for_terminal(queue: &JobQueue, job_id: &str) -> JobRecord {
        for _ in 0..500 {
            if let Some(job) = queue.status(job_id).await
                && job.status.is_terminal()
            {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", job_id);
    }

    #[tokio::test]
    async fn test_generate_job_completes_with_workout() {
        let steps = vec![
            ScriptStep::Reply(day_json("Lower", "Goblet Squat")),
            ScriptStep::Reply(day_json("Upper", "Goblet Squat")),
        ];
        let (queue, _pool) = queue_with(steps, JobSettings::new(0, 3)).await;

        let record = queue
            .enqueue(
                JobKind::GeneratePlan,
                JobPayload {
                    user_id: 1,
                    job_id: Some("job-1".to_string()),
                    ..JobPayload::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record.job_id, "job-1");
        assert_eq!(record.status, JobStatus::Pending);

        let job = wait_for_terminal(&queue, "job-1").await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
        let result = job.result.unwrap();
        assert_eq!(result["planDays"].as_array().unwrap().len(), 2);
        assert_eq!(result["isActive"], true);
    }

    #[tokio::test]
    async fn test_non_retriable_failure_fails_after_one_attempt() {
        let (queue, _pool) = queue_with(vec![], JobSettings::new(0, 3)).await;

        let record = queue
            .enqueue(
                JobKind::GeneratePlan,
                JobPayload {
                    user_id: 404,
                    ..JobPayload::default()
                },
            )
            .await
            .unwrap();

        let job = wait_for_terminal(&queue, &record.job_id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error.as_deref(), Some("Profile not found for user 404"));
    }

    #[tokio::test]
    async fn test_day_regeneration_requires_plan_day_and_reason() {
        let (queue, _pool) = queue_with(vec![], JobSettings::new(0, 3)).await;

        let missing_day = queue
            .enqueue(
                JobKind::RegenerateDay,
                JobPayload {
                    user_id: 1,
                    regeneration_reason: Some("sore".to_string()),
                    ..JobPayload::default()
                },
            )
            .await;
        assert!(matches!(missing_day, Err(PlannerError::InvalidParameter(_))));

        let blank_reason = queue
            .enqueue(
                JobKind::RegenerateDay,
                JobPayload {
                    user_id: 1,
                    plan_day_id: Some(3),
                    regeneration_reason: Some("  ".to_string()),
                    ..JobPayload::default()
                },
            )
            .await;
        assert!(matches!(blank_reason, Err(PlannerError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn test_duplicate_job_id_is_rejected() {
        let (queue, _pool) = queue_with(vec![], JobSettings::new(60, 1)).await;
        let payload = JobPayload {
            user_id: 1,
            job_id: Some("same".to_string()),
            ..JobPayload::default()
        };

        queue.enqueue(JobKind::GeneratePlan, payload.clone()).await.unwrap();
        let err = queue.enqueue(JobKind::GeneratePlan, payload).await.unwrap_err();
        assert!(matches!(err, PlannerError::InvalidParameter(_)));
        queue.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_delayed_job() {
        let (queue, pool) = queue_with(vec![], JobSettings::new(60, 3)).await;

        let record = queue
            .enqueue(
                JobKind::GeneratePlan,
                JobPayload {
                    user_id: 1,
                    ..JobPayload::default()
                },
            )
            .await
            .unwrap();
        queue.shutdown();

        let job = wait_for_terminal(&queue, &record.job_id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.error.as_deref(), Some("Generation cancelled"));

        let workouts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workouts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(workouts, 0);
    }

    #[tokio::test]
    async fn test_evict_finished_keeps_recent_and_running_jobs() {
        let (queue, _pool) = queue_with(vec![], JobSettings::new(3600, 1)).await;
        for id in ["old-done", "old-failed", "fresh-done", "old-pending"] {
            let payload = JobPayload {
                user_id: 1,
                job_id: Some(id.to_string()),
                ..JobPayload::default()
            };
            queue.enqueue(JobKind::GeneratePlan, payload).await.unwrap();
        }

        let long_ago = Utc::now() - TimeDelta::hours(2);
        {
            let mut jobs = queue.jobs.write().await;
            for (id, status, updated_at) in [
                ("old-done", JobStatus::Completed, long_ago),
                ("old-failed", JobStatus::Failed, long_ago),
                ("fresh-done", JobStatus::Completed, Utc::now()),
                ("old-pending", JobStatus::Pending, long_ago),
            ] {
                let job = jobs.get_mut(id).unwrap();
                job.status = status;
                job.updated_at = updated_at;
            }
        }

        assert_eq!(queue.evict_finished(Duration::from_secs(3600)).await, 2);
        assert!(queue.status("old-done").await.is_none());
        assert!(queue.status("old-failed").await.is_none());
        assert!(queue.status("fresh-done").await.is_some());
        assert!(queue.status("old-pending").await.is_some());
        queue.shutdown();
    }

    #[tokio::test]
    async fn test_evict_finished_respects_retention_window() {
        let (queue, _pool) = queue_with(vec![], JobSettings::new(0, 3)).await;
        let record = queue
            .enqueue(
                JobKind::GeneratePlan,
                JobPayload {
                    user_id: 404,
                    ..JobPayload::default()
                },
            )
            .await
            .unwrap();
        wait_for_terminal(&queue, &record.job_id).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(queue.evict_finished(Duration::MAX).await, 0);
        assert_eq!(queue.evict_finished(Duration::ZERO).await, 1);
        assert!(queue.status(&record.job_id).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job_has_no_status() {
        let (queue, _pool) = queue_with(vec![], JobSettings::new(0, 3)).await;
        assert!(queue.status("missing").await.is_none());
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(4));
    }

    #[test]
    fn test_payload_reads_camel_case() {
        let payload: JobPayload = serde_json::from_str(
            r#"{"userId": 9, "planDayId": 4, "regenerationReason": "knee pain", "styles": ["yoga"]}"#,
        )
        .unwrap();
        assert_eq!(payload.user_id, 9);
        assert_eq!(payload.plan_day_id, Some(4));
        assert_eq!(payload.styles.as_deref(), Some(&["yoga".to_string()][..]));
    }
}
