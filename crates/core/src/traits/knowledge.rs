//! Knowledge query trait

use crate::conversation::{KnowledgeAnswer, KnowledgeRequest};
use crate::Result;
use async_trait::async_trait;

/// Answers a caller's utterance from a knowledge base
///
/// # Example
///
/// ```ignore
/// let answer = knowledge
///     .query(&KnowledgeRequest {
///         user_id: "tenant-1".into(),
///         query: "what are your opening hours".into(),
///         conversation_history: vec![],
///     })
///     .await?;
/// println!("{}", answer.response);
/// ```
#[async_trait]
pub trait KnowledgeQuery: Send + Sync + 'static {
    /// Run one query
    ///
    /// A missing or empty answer is an error, never an empty response.
    async fn query(&self, request: &KnowledgeRequest) -> Result<KnowledgeAnswer>;

    /// Adapter name for logging
    fn name(&self) -> &str;
}
