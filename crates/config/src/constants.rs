//! Default values shared across the call bridge

/// External service endpoints
pub mod endpoints {
    /// Deepgram live transcription websocket
    pub const DEEPGRAM_LIVE: &str = "wss://api.deepgram.com/v1/listen";

    /// Local knowledge query service
    pub const KNOWLEDGE_QUERY: &str = "http://127.0.0.1:5001/rag_query";

    /// Twilio REST API base
    pub const TWILIO_API_BASE: &str = "https://api.twilio.com";
}

/// Pacing and call timing (milliseconds unless noted)
pub mod timing {
    /// Pacer tick
    pub const PACER_TICK_MS: u64 = 10;

    /// Gap after which a silence frame is inserted
    pub const SILENCE_GAP_MS: u64 = 100;

    /// Duration of one silence frame
    pub const SILENCE_FRAME_MS: u32 = 20;

    /// Pacer wait for a queued frame
    pub const DEQUEUE_TIMEOUT_MS: u64 = 10;

    /// Call session tick (pending answers, keep-alive)
    pub const CALL_TICK_MS: u64 = 200;

    /// Inactivity window before a keep-alive prompt (seconds)
    pub const INACTIVITY_TIMEOUT_SECS: u64 = 30;

    /// Bound on draining the pacer at call end (seconds)
    pub const DRAIN_TIMEOUT_SECS: u64 = 5;
    /// Conversation history kept after a call's last media stream ends
    pub const HISTORY_RETENTION_SECS: u64 = 60;

    /// Speech backend connect timeout
    pub const TRANSCRIPTION_CONNECT_MS: u64 = 10_000;

    /// Knowledge query timeout
    pub const KNOWLEDGE_QUERY_MS: u64 = 30_000;

    /// Call control request timeout
    pub const CALL_CONTROL_MS: u64 = 10_000;
}

/// Prompts spoken into the call
pub mod prompts {
    pub const GREETING: &str = "Start speaking.";
    pub const LOOKUP_PREAMBLE: &str = "Just a Second looking for the information";
    pub const CONTINUE: &str = "Please continue speaking.";
    pub const KEEP_ALIVE: &str = "Still here and listening.";
}
