//! Conversation history per call
//!
//! Every script injected into a call reconnects it to a fresh media stream,
//! so one phone call spans several call sessions. History is keyed by call
//! SID and outlives each session; it is dropped once no stream has been
//! attached to the call for the retention window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use call_bridge_config::CallConfig;
use call_bridge_core::ConversationTurn;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Default)]
struct Conversation {
    turns: VecDeque<ConversationTurn>,
    /// Media streams currently attached
    streams: usize,
    detached_at: Option<Instant>,
}

impl Conversation {
    fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        self.streams == 0
            && self
                .detached_at
                .map_or(false, |at| now.saturating_duration_since(at) >= retention)
    }
}

/// Shared conversation history, one entry per live call
pub struct ConversationStore {
    max_turns: usize,
    retention: Duration,
    calls: RwLock<HashMap<String, Conversation>>,
}

impl ConversationStore {
    /// `max_turns` bounds the turns kept per call; 0 disables history
    pub fn new(max_turns: usize, retention: Duration) -> Self {
        Self {
            max_turns,
            retention,
            calls: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CallConfig) -> Self {
        Self::new(config.history_turns, config.history_retention())
    }

    /// A media stream for `call_sid` started
    pub fn attach(&self, call_sid: &str) {
        let mut calls = self.calls.write();
        self.cleanup_expired_internal(&mut calls);

        let conversation = calls.entry(call_sid.to_string()).or_default();
        conversation.streams += 1;
        conversation.detached_at = None;
    }

    /// A media stream for `call_sid` ended
    pub fn detach(&self, call_sid: &str) {
        let mut calls = self.calls.write();
        if let Some(conversation) = calls.get_mut(call_sid) {
            conversation.streams = conversation.streams.saturating_sub(1);
            if conversation.streams == 0 {
                conversation.detached_at = Some(Instant::now());
            }
        }
        self.cleanup_expired_internal(&mut calls);
    }

    /// Turns so far, oldest first
    pub fn history(&self, call_sid: &str) -> Vec<ConversationTurn> {
        self.calls
            .read()
            .get(call_sid)
            .map(|c| c.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record one answered question
    pub fn remember(&self, call_sid: &str, query: &str, answer: &str) {
        if self.max_turns == 0 {
            return;
        }

        let mut calls = self.calls.write();
        let conversation = calls.entry(call_sid.to_string()).or_default();
        // Never attached; expire like a detached call
        if conversation.streams == 0 && conversation.detached_at.is_none() {
            conversation.detached_at = Some(Instant::now());
        }

        let turns = &mut conversation.turns;
        turns.push_back(ConversationTurn::user(query));
        turns.push_back(ConversationTurn::assistant(answer));
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
    }

    /// Drop calls whose last stream ended longer than the retention ago
    pub fn cleanup_expired(&self) {
        let mut calls = self.calls.write();
        self.cleanup_expired_internal(&mut calls);
    }

    /// Sweep expired calls every `interval` until the handle is aborted
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let interval = interval.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                let before = store.len();
                store.cleanup_expired();
                let after = store.len();
                if before != after {
                    tracing::info!(
                        removed = before - after,
                        remaining = after,
                        "Conversation history cleanup"
                    );
                }
            }
        })
    }

    fn cleanup_expired_internal(&self, calls: &mut HashMap<String, Conversation>) {
        let now = Instant::now();
        let expired: Vec<String> = calls
            .iter()
            .filter(|(_, c)| c.is_expired(now, self.retention))
            .map(|(sid, _)| sid.clone())
            .collect();

        for call_sid in expired {
            calls.remove(&call_sid);
            tracing::debug!(call_sid = %call_sid, "Conversation history expired");
        }
    }

    /// Calls with history or an attached stream
    pub fn len(&self) -> usize {
        self.calls.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::from_config(&CallConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_bridge_core::TurnRole;

    #[test]
    fn test_history_is_bounded_per_call() {
        let store = ConversationStore::new(4, Duration::from_secs(60));
        for q in ["one", "two", "three"] {
            store.remember("CA1", q, &format!("answer to {q}"));
        }
        store.remember("CA2", "other", "answer to other");

        let history = store.history("CA1");
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "two");
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[3].content, "answer to three");
        assert_eq!(store.history("CA2").len(), 2);
        assert!(store.history("CA3").is_empty());
    }

    #[test]
    fn test_zero_turns_disables_history() {
        let store = ConversationStore::new(0, Duration::from_secs(60));
        store.remember("CA1", "one", "answer");
        assert!(store.history("CA1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_survives_reconnect_within_retention() {
        let store = ConversationStore::new(10, Duration::from_secs(60));
        store.attach("CA1");
        store.remember("CA1", "opening hours", "nine to five");
        store.detach("CA1");

        tokio::time::advance(Duration::from_secs(2)).await;
        store.attach("CA1");
        assert_eq!(store.history("CA1").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_call_expires() {
        let store = ConversationStore::new(10, Duration::from_secs(60));
        store.attach("CA1");
        store.remember("CA1", "opening hours", "nine to five");
        store.attach("CA2");
        store.detach("CA1");

        tokio::time::advance(Duration::from_secs(61)).await;
        store.cleanup_expired();

        assert!(store.history("CA1").is_empty());
        // Still attached
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_evicts_ended_call() {
        let store = Arc::new(ConversationStore::new(10, Duration::from_secs(60)));
        store.attach("CA1");
        store.remember("CA1", "q", "a");
        store.detach("CA1");

        let task = store.start_cleanup_task(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(75)).await;

        assert!(store.is_empty());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_streams_keep_history() {
        let store = ConversationStore::new(10, Duration::from_secs(1));
        store.attach("CA1");
        store.attach("CA1");
        store.remember("CA1", "q", "a");
        store.detach("CA1");

        tokio::time::advance(Duration::from_secs(5)).await;
        store.cleanup_expired();
        assert_eq!(store.history("CA1").len(), 2);
    }
}
