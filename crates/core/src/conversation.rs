//! Conversation types exchanged with the knowledge service

use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One turn of the call conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for the knowledge query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRequest {
    /// Tenant identity the knowledge base is scoped to
    pub user_id: String,
    /// Finalized transcript text
    pub query: String,
    /// Prior turns of this call, oldest first
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
}

/// Answer returned by the knowledge query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeAnswer {
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = KnowledgeRequest {
            user_id: "tenant-1".to_string(),
            query: "what are your opening hours".to_string(),
            conversation_history: vec![ConversationTurn::user("hello")],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["user_id"], "tenant-1");
        assert_eq!(json["query"], "what are your opening hours");
        assert_eq!(json["conversation_history"][0]["role"], "user");
        assert_eq!(json["conversation_history"][0]["content"], "hello");
    }
}
