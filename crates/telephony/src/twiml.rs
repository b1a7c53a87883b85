//! TwiML rendering

use call_bridge_core::{CallInstruction, CallScript};

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Escape text for XML content and attribute values
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Media stream websocket URL for a public host
pub fn stream_url(host: &str, ws_path: &str) -> String {
    format!("wss://{}{}", host.trim_end_matches('/'), ws_path)
}

/// Render a call script as a TwiML document
pub fn render(script: &CallScript) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str("<Response>");

    for instruction in &script.instructions {
        match instruction {
            CallInstruction::Pause { seconds } => {
                xml.push_str(&format!(r#"<Pause length="{}"/>"#, seconds));
            }
            CallInstruction::Say { text } => {
                xml.push_str("<Say>");
                xml.push_str(&escape_xml(text));
                xml.push_str("</Say>");
            }
            CallInstruction::ConnectStream { url } => {
                xml.push_str(&format!(
                    r#"<Connect><Stream url="{}"/></Connect>"#,
                    escape_xml(url)
                ));
            }
        }
    }

    xml.push_str("</Response>");
    xml
}
