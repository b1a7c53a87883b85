//! Media stream WebSocket handler
//!
//! One Twilio media stream connection per call. The socket is read by the
//! call session until the stream stops or disconnects; nothing is sent back
//! on it, answers reach the caller through call updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use futures::StreamExt;

use call_bridge_agent::{CallSession, TransportError, TransportMessage};

use crate::state::AppState;
use crate::ServerError;

/// WebSocket handler
pub struct MediaStreamHandler;

impl MediaStreamHandler {
    /// Handle WebSocket upgrade
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
        headers: HeaderMap,
    ) -> Result<Response, StatusCode> {
        if state.calls.count() >= state.calls.capacity() {
            tracing::warn!(live = state.calls.count(), "Rejecting media stream, call limit reached");
            return Err(ServerError::CallLimit(state.calls.count()).into());
        }

        let host = headers.get(header::HOST).and_then(|h| h.to_str().ok());
        let stream_url = state
            .stream_url(host)
            .ok_or_else(|| StatusCode::from(ServerError::InvalidRequest("missing Host header".into())))?;

        Ok(ws.on_upgrade(move |socket| Self::handle_socket(socket, state, stream_url)))
    }

    /// Run one call over an upgraded socket
    async fn handle_socket(socket: WebSocket, state: AppState, stream_url: String) {
        let session = CallSession::new(
            state.session_config(),
            state.collaborators.clone(),
            stream_url,
        );
        let call_id = session.id().to_string();

        if let Err(e) = state.calls.register(session.clone()) {
            tracing::warn!(call_id = %call_id, error = %e, "Media stream rejected");
            return;
        }
        tracing::info!(call_id = %call_id, "Media stream connected");

        let inbound = socket.map(transport_message);
        match session.run(inbound).await {
            Ok(summary) => {
                tracing::info!(
                    call_id = %call_id,
                    call_sid = ?summary.call_sid,
                    reason = %summary.reason,
                    duration_ms = summary.duration_ms,
                    frames_received = summary.frames_received,
                    frames_dropped = summary.frames_dropped,
                    answers_delivered = summary.answers_delivered,
                    keep_alives = summary.keep_alives,
                    "Media stream finished"
                );
            }
            Err(e) => {
                tracing::error!(call_id = %call_id, error = %e, "Call session failed");
            }
        }

        state.calls.remove(&call_id);
    }
}

fn transport_message(message: Result<Message, axum::Error>) -> Result<TransportMessage, TransportError> {
    match message {
        Ok(Message::Text(text)) => Ok(TransportMessage::Text(text)),
        Ok(Message::Close(_)) => Ok(TransportMessage::Close),
        Ok(_) => Ok(TransportMessage::Other),
        Err(e) => Err(TransportError(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_message_mapping() {
        assert_eq!(
            transport_message(Ok(Message::Text("{}".into()))).unwrap(),
            TransportMessage::Text("{}".to_string())
        );
        assert_eq!(
            transport_message(Ok(Message::Close(None))).unwrap(),
            TransportMessage::Close
        );
        assert_eq!(
            transport_message(Ok(Message::Ping(vec![1]))).unwrap(),
            TransportMessage::Other
        );
        assert_eq!(
            transport_message(Ok(Message::Binary(vec![0xFF]))).unwrap(),
            TransportMessage::Other
        );
    }
}
