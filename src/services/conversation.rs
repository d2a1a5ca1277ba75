use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::clients::models::requests::LlmMessage;

/// Message history per conversation thread.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Prior messages for the thread, oldest first. Unknown or expired threads are empty.
    async fn history(&self, thread_id: &str) -> Vec<LlmMessage>;

    async fn append(&self, thread_id: &str, messages: Vec<LlmMessage>);

    /// Drop threads idle for longer than the TTL. Returns how many were removed.
    async fn evict_expired(&self) -> usize;
}

#[derive(Debug)]
struct ThreadEntry {
    messages: Vec<LlmMessage>,
    last_used: Instant,
}

impl ThreadEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_used.elapsed() >= ttl
    }
}

/// Process-local store. Threads do not survive a restart.
#[derive(Clone)]
pub struct InMemoryConversationStore {
    threads: Arc<Mutex<HashMap<String, ThreadEntry>>>,
    ttl: Duration,
    max_messages: usize,
}

impl InMemoryConversationStore {
    pub fn new(ttl: Duration, max_messages: usize) -> Self {
        Self {
            threads: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            max_messages: max_messages.max(2),
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn history(&self, thread_id: &str) -> Vec<LlmMessage> {
        let threads = self.threads.lock().await;
        match threads.get(thread_id) {
            Some(entry) if !entry.is_expired(self.ttl) => entry.messages.clone(),
            _ => Vec::new(),
        }
    }

    async fn append(&self, thread_id: &str, messages: Vec<LlmMessage>) {
        let mut threads = self.threads.lock().await;
        let entry = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| ThreadEntry {
                messages: Vec::new(),
                last_used: Instant::now(),
            });

        if entry.is_expired(self.ttl) {
            entry.messages.clear();
        }
        entry.messages.extend(messages);
        entry.last_used = Instant::now();

        if entry.messages.len() > self.max_messages {
            let excess = entry.messages.len() - self.max_messages;
            entry.messages.drain(..excess);
            tracing::debug!(thread_id, dropped = excess, "conversation.trimmed");
        }
    }

    async fn evict_expired(&self) -> usize {
        let mut threads = self.threads.lock().await;
        let before = threads.len();
        threads.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before - threads.len();

        if removed > 0 {
            tracing::debug!(removed, remaining = threads.len(), "conversation.evicted");
        }
        removed
    }
}
