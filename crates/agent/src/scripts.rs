//! Call scripts spoken back into the call
//!
//! Every script that should keep the call transcribing ends by reconnecting
//! the media stream.

use call_bridge_config::CallConfig;
use call_bridge_core::CallScript;

/// Greeting returned by the incoming call webhook
pub fn greeting_script(config: &CallConfig, stream_url: &str) -> CallScript {
    CallScript::new()
        .say(&config.greeting)
        .connect_stream(stream_url)
}

/// Spoken answer with the lookup preamble and the continue prompt
pub fn answer_script(config: &CallConfig, answer: &str, stream_url: &str) -> CallScript {
    CallScript::new()
        .pause(config.pause_secs)
        .say(&config.lookup_preamble)
        .say(answer)
        .pause(config.pause_secs)
        .say(&config.continue_prompt)
        .connect_stream(stream_url)
}

/// Prompt injected after a period of silence
pub fn keep_alive_script(config: &CallConfig, stream_url: &str) -> CallScript {
    CallScript::new()
        .pause(config.pause_secs)
        .say(&config.keep_alive_prompt)
        .connect_stream(stream_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_bridge_core::CallInstruction;

    const URL: &str = "wss://bridge.example.com/realtime";

    #[test]
    fn test_answer_script_order() {
        let script = answer_script(&CallConfig::default(), "We open at nine.", URL);
        assert_eq!(
            script.spoken_text(),
            vec![
                "Just a Second looking for the information",
                "We open at nine.",
                "Please continue speaking."
            ]
        );
        assert_eq!(script.instructions[0], CallInstruction::Pause { seconds: 1 });
        assert!(script.reconnects_stream());
    }

    #[test]
    fn test_keep_alive_and_greeting() {
        let config = CallConfig::default();
        let keep_alive = keep_alive_script(&config, URL);
        assert_eq!(keep_alive.spoken_text(), vec!["Still here and listening."]);
        assert!(keep_alive.reconnects_stream());

        let greeting = greeting_script(&config, URL);
        assert_eq!(greeting.spoken_text(), vec!["Start speaking."]);
        assert_eq!(
            greeting.instructions.last(),
            Some(&CallInstruction::ConnectStream { url: URL.to_string() })
        );
    }
}
