//! Transcript reaction
//!
//! Turns finalized utterances into knowledge queries. Events are handled one
//! at a time in arrival order by the call's transcript worker.

use std::sync::Arc;

use call_bridge_core::{Error, KnowledgeQuery, KnowledgeRequest, PendingResponse, TranscriptEvent};

use crate::conversations::ConversationStore;

/// What happened to one transcript event
#[derive(Debug)]
pub enum Reaction {
    /// Interim, empty or whitespace-only; no query was made
    Ignored,
    /// The knowledge service answered
    Answered(PendingResponse),
    /// The query failed; nothing to deliver
    Failed { query: String, error: Error },
}

/// Per-call transcript → answer pipeline
pub struct TranscriptReactor {
    knowledge: Arc<dyn KnowledgeQuery>,
    conversations: Arc<ConversationStore>,
    user_id: String,
}

impl TranscriptReactor {
    pub fn new(
        knowledge: Arc<dyn KnowledgeQuery>,
        conversations: Arc<ConversationStore>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            knowledge,
            conversations,
            user_id: user_id.into(),
        }
    }

    /// React to one transcript event
    ///
    /// History is read and recorded under `call_sid`; without one the query
    /// goes out with no history.
    pub async fn react(&self, call_sid: Option<&str>, event: &TranscriptEvent) -> Reaction {
        if !event.is_actionable() {
            return Reaction::Ignored;
        }

        let query = event.text.trim().to_string();
        let request = KnowledgeRequest {
            user_id: self.user_id.clone(),
            query: query.clone(),
            conversation_history: call_sid
                .map(|sid| self.conversations.history(sid))
                .unwrap_or_default(),
        };

        tracing::info!(query = %query, history = request.conversation_history.len(), "Querying knowledge service");
        metrics::counter!("call_bridge_knowledge_queries_total").increment(1);

        let answer = match self.knowledge.query(&request).await {
            Ok(answer) if !answer.response.trim().is_empty() => answer.response,
            Ok(_) => {
                return self.failed(query, Error::Query("empty answer".to_string()));
            }
            Err(e) => return self.failed(query, e),
        };

        if let Some(call_sid) = call_sid {
            self.conversations.remember(call_sid, &query, &answer);
        }
        Reaction::Answered(PendingResponse::new(query, answer))
    }

    fn failed(&self, query: String, error: Error) -> Reaction {
        tracing::warn!(query = %query, error = %error, "Knowledge query failed, answer withheld");
        metrics::counter!("call_bridge_knowledge_failures_total").increment(1);
        Reaction::Failed { query, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use call_bridge_core::{KnowledgeAnswer, TurnRole};
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Echoes the query back; fails on "boom"
    #[derive(Default)]
    struct EchoKnowledge {
        requests: Mutex<Vec<KnowledgeRequest>>,
    }

    #[async_trait]
    impl KnowledgeQuery for EchoKnowledge {
        async fn query(&self, request: &KnowledgeRequest) -> call_bridge_core::Result<KnowledgeAnswer> {
            self.requests.lock().push(request.clone());
            match request.query.as_str() {
                "boom" => Err(Error::Query("500 Internal Server Error".into())),
                "silent" => Ok(KnowledgeAnswer { response: "  ".into() }),
                q => Ok(KnowledgeAnswer { response: format!("answer to {q}") }),
            }
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn reactor(history_turns: usize) -> (TranscriptReactor, Arc<EchoKnowledge>, Arc<ConversationStore>) {
        let knowledge = Arc::new(EchoKnowledge::default());
        let conversations = Arc::new(ConversationStore::new(history_turns, Duration::from_secs(60)));
        (
            TranscriptReactor::new(knowledge.clone(), conversations.clone(), "tenant-1"),
            knowledge,
            conversations,
        )
    }

    #[tokio::test]
    async fn test_non_actionable_events_never_query() {
        let (reactor, knowledge, _conversations) = reactor(10);

        for event in [
            TranscriptEvent::finalized(""),
            TranscriptEvent::finalized("  \n\t "),
            TranscriptEvent::interim("what are your"),
        ] {
            assert!(matches!(reactor.react(Some("CA1"), &event).await, Reaction::Ignored));
        }
        assert!(knowledge.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_answer_and_history() {
        let (reactor, knowledge, conversations) = reactor(10);

        match reactor.react(Some("CA1"), &TranscriptEvent::finalized(" opening hours ")).await {
            Reaction::Answered(response) => {
                assert_eq!(response.query, "opening hours");
                assert_eq!(response.answer, "answer to opening hours");
            }
            other => panic!("unexpected reaction: {other:?}"),
        }

        reactor.react(Some("CA1"), &TranscriptEvent::finalized("and on sunday")).await;

        let requests = knowledge.requests.lock();
        assert_eq!(requests[0].user_id, "tenant-1");
        assert!(requests[0].conversation_history.is_empty());
        assert_eq!(requests[1].conversation_history.len(), 2);
        assert_eq!(requests[1].conversation_history[0].role, TurnRole::User);
        assert_eq!(requests[1].conversation_history[1].content, "answer to opening hours");
        assert_eq!(conversations.history("CA1").len(), 4);
    }

    #[tokio::test]
    async fn test_history_is_scoped_to_call() {
        let (reactor, knowledge, conversations) = reactor(10);
        reactor.react(Some("CA1"), &TranscriptEvent::finalized("one")).await;
        reactor.react(Some("CA2"), &TranscriptEvent::finalized("two")).await;
        reactor.react(None, &TranscriptEvent::finalized("three")).await;

        let requests = knowledge.requests.lock();
        assert!(requests[1].conversation_history.is_empty());
        assert!(requests[2].conversation_history.is_empty());
        assert_eq!(conversations.history("CA1").len(), 2);
        assert_eq!(conversations.history("CA2").len(), 2);
        assert_eq!(conversations.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_turns_disables_history() {
        let (reactor, knowledge, conversations) = reactor(0);
        reactor.react(Some("CA1"), &TranscriptEvent::finalized("one")).await;
        reactor.react(Some("CA1"), &TranscriptEvent::finalized("two")).await;

        assert!(conversations.history("CA1").is_empty());
        assert!(knowledge.requests.lock()[1].conversation_history.is_empty());
    }

    #[tokio::test]
    async fn test_failures_withhold_answer_and_history() {
        let (reactor, _knowledge, conversations) = reactor(10);

        let reaction = reactor.react(Some("CA1"), &TranscriptEvent::finalized("boom")).await;
        assert!(matches!(reaction, Reaction::Failed { ref query, .. } if query == "boom"));

        let reaction = reactor.react(Some("CA1"), &TranscriptEvent::finalized("silent")).await;
        assert!(matches!(reaction, Reaction::Failed { .. }));

        assert!(conversations.history("CA1").is_empty());
    }
}
