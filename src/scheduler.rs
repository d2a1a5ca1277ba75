use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::services::conversation::ConversationStore;
use crate::services::jobs::JobQueue;

/// Every five minutes.
const EVICTION_SCHEDULE: &str = "0 */5 * * * *";

pub async fn start_scheduler(
    conversations: Arc<dyn ConversationStore>,
    jobs: JobQueue,
    job_retention: Duration,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    scheduler
        .add(Job::new_async(EVICTION_SCHEDULE, move |_uuid, _l| {
            let conversations = Arc::clone(&conversations);
            let jobs = jobs.clone();
            Box::pin(async move {
                run_eviction(conversations.as_ref()).await;
                run_job_eviction(&jobs, job_retention).await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!(
        schedule = EVICTION_SCHEDULE,
        job_retention_secs = job_retention.as_secs(),
        "cron.started"
    );
    Ok(scheduler)
}

pub async fn run_eviction(conversations: &dyn ConversationStore) -> usize {
    let evicted = conversations.evict_expired().await;
    if evicted > 0 {
        tracing::info!(evicted, "conversation.eviction");
    } else {
        tracing::debug!("conversation.eviction_idle");
    }
    evicted
}

pub async fn run_job_eviction(jobs: &JobQueue, retention: Duration) -> usize {
    let evicted = jobs.evict_finished(retention).await;
    if evicted > 0 {
        tracing::info!(evicted, "job.eviction");
    } else {
        tracing::debug!("job.eviction_idle");
    }
    evicted
}
