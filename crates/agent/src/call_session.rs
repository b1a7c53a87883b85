//! Call session state machine
//!
//! One session per media stream websocket. The session owns the media frame
//! queue, the pacer task, the transcription session and the transcript
//! worker for its whole lifetime, and tears all of them down exactly once.
//!
//! ```text
//!            open ok                stop / disconnect /            pacer drained,
//!   Idle ─────────────▶ Active ─── receive errors / backend ───▶ Draining ──────▶ Closed
//!     │                                   failure                  session closed    ▲
//!     └──────────────────────── open failed ─────────────────────────────────────────┘
//! ```
//!
//! Concurrency: the receive loop (this task), the pacer task and the
//! transcript worker. State shared between them lives behind one mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use call_bridge_config::{CallConfig, OverflowPolicy, PacerConfig, QueueConfig, Settings};
use call_bridge_core::{
    CallControl, CallState, KnowledgeQuery, LiveOptions, MediaFrame, MediaStreamEvent,
    PendingResponse, PendingSlot, RecognizerEvent, SpeechRecognizer, TranscriptEvent,
};
use call_bridge_pipeline::{
    media_queue, EnqueueError, Enqueued, FrameConsumer, FrameProducer, Pacer, PacerOutcome,
    PipelineError, TranscriptionSession,
};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::conversations::ConversationStore;
use crate::reaction::{Reaction, TranscriptReactor};
use crate::scripts::{answer_script, keep_alive_script};
use crate::{CallError, TransportError};

/// Message read from the call transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    /// JSON text frame
    Text(String),
    /// Binary, ping and pong frames; ignored
    Other,
    /// Peer closed the websocket
    Close,
}

/// Why a call left the Active state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CloseReason {
    /// Transport sent a `stop` event
    Stopped,
    /// Transport disconnected
    Disconnected,
    /// Too many consecutive receive errors
    ReceiveErrors(u32),
    /// Speech backend failed or closed
    BackendFailed(String),
    /// Speech backend could not be opened
    OpenFailed(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::ReceiveErrors(n) => write!(f, "{} consecutive receive errors", n),
            Self::BackendFailed(msg) => write!(f, "backend failed: {}", msg),
            Self::OpenFailed(msg) => write!(f, "open failed: {}", msg),
        }
    }
}

/// Why a media frame never reached the pacer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropCause {
    /// Evicted or refused by the overflow policy
    Overflow,
    /// Queue already closed by a stopped pacer
    QueueClosed,
}

impl DropCause {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Overflow => "overflow",
            Self::QueueClosed => "queue_closed",
        }
    }
}

/// Call session events
#[derive(Debug, Clone)]
pub enum CallEvent {
    StateChanged { old: CallState, new: CallState },
    /// `start` event received
    StreamStarted { call_sid: String, stream_sid: Option<String> },
    /// Media frame buffered for the pacer
    FrameQueued { sequence: u64 },
    /// Media frame lost before the pacer
    FrameDropped { sequence: u64, cause: DropCause },
    Transcript(TranscriptEvent),
    /// Answer stored for delivery; `superseded` when it replaced an undelivered one
    AnswerReady { query: String, answer: String, superseded: bool },
    QueryFailed { query: String, error: String },
    AnswerDelivered { answer: String },
    KeepAliveSent,
    InjectionFailed { error: String },
    Closed { reason: CloseReason },
}

/// Per-call settings
#[derive(Debug, Clone)]
pub struct CallSessionConfig {
    pub call: CallConfig,
    pub queue: QueueConfig,
    pub pacer: PacerConfig,
    pub live: LiveOptions,
    pub connect_timeout: Duration,
    pub event_buffer: usize,
    /// Tenant identity sent with knowledge queries
    pub user_id: String,
}

impl CallSessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            call: settings.call.clone(),
            queue: settings.queue.clone(),
            pacer: settings.pacer.clone(),
            live: settings.transcription.live_options(),
            connect_timeout: settings.transcription.connect_timeout(),
            event_buffer: settings.transcription.event_buffer,
            user_id: settings.knowledge.user_id.clone().unwrap_or_default(),
        }
    }
}

impl Default for CallSessionConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// External services a call talks to
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub knowledge: Arc<dyn KnowledgeQuery>,
    pub control: Arc<dyn CallControl>,
    /// History shared by every media stream of a call
    pub conversations: Arc<ConversationStore>,
}

/// Point-in-time view of a call
#[derive(Debug, Clone, Serialize)]
pub struct CallSnapshot {
    pub call_id: String,
    pub call_sid: Option<String>,
    pub stream_sid: Option<String>,
    pub state: CallState,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub idle_ms: u64,
    pub answer_pending: bool,
    pub frames_received: u64,
}

/// Result of a finished call
#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    pub call_id: String,
    pub call_sid: Option<String>,
    pub reason: CloseReason,
    pub duration_ms: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_sent: u64,
    pub silence_sent: u64,
    pub answers_delivered: u64,
    pub answers_superseded: u64,
    pub keep_alives: u64,
}

struct Shared {
    state: CallState,
    /// Set once by the first `run`
    started: bool,
    last_activity: Instant,
    pending: PendingSlot,
    call_sid: Option<String>,
    stream_sid: Option<String>,
}

#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    answers_delivered: AtomicU64,
    keep_alives: AtomicU64,
}

/// Signals from the worker tasks to the receive loop
enum Signal {
    BackendFailed(String),
    PacerStopped(PipelineError),
}

/// One call's lifecycle
pub struct CallSession {
    id: String,
    config: CallSessionConfig,
    collaborators: Collaborators,
    /// Media stream URL the call reconnects to after each injected script
    stream_url: String,
    shared: Mutex<Shared>,
    counters: Counters,
    event_tx: broadcast::Sender<CallEvent>,
    started_at: chrono::DateTime<chrono::Utc>,
    created: Instant,
}

impl CallSession {
    pub fn new(
        config: CallSessionConfig,
        collaborators: Collaborators,
        stream_url: impl Into<String>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);

        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            collaborators,
            stream_url: stream_url.into(),
            shared: Mutex::new(Shared {
                state: CallState::Idle,
                started: false,
                last_activity: Instant::now(),
                pending: PendingSlot::new(),
                call_sid: None,
                stream_sid: None,
            }),
            counters: Counters::default(),
            event_tx,
            started_at: chrono::Utc::now(),
            created: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> CallState {
        self.shared.lock().state
    }

    pub fn call_sid(&self) -> Option<String> {
        self.shared.lock().call_sid.clone()
    }

    /// Subscribe to call events; subscribe before `run` to see every transition
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let shared = self.shared.lock();
        CallSnapshot {
            call_id: self.id.clone(),
            call_sid: shared.call_sid.clone(),
            stream_sid: shared.stream_sid.clone(),
            state: shared.state,
            started_at: self.started_at,
            idle_ms: shared.last_activity.elapsed().as_millis() as u64,
            answer_pending: !shared.pending.is_empty(),
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
        }
    }

    /// Drive the call until the transport stops or the backend fails
    ///
    /// `inbound` yields transport messages; its end is a disconnect.
    pub async fn run<S>(self: Arc<Self>, mut inbound: S) -> Result<CallSummary, CallError>
    where
        S: Stream<Item = Result<TransportMessage, TransportError>> + Unpin + Send,
    {
        {
            let mut shared = self.shared.lock();
            if shared.state != CallState::Idle {
                return Err(CallError::InvalidTransition {
                    from: shared.state,
                    to: CallState::Active,
                });
            }
            if shared.started {
                return Err(CallError::AlreadyRunning);
            }
            shared.started = true;
        }

        let transcription = Arc::new(TranscriptionSession::new(
            self.collaborators.recognizer.clone(),
            self.config.live.clone(),
            self.config.connect_timeout,
            self.config.event_buffer,
        ));

        let events = match transcription.open().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(call_id = %self.id, error = %e, "Transcription session failed to open");
                metrics::counter!("call_bridge_calls_total", "outcome" => "open_failed").increment(1);
                self.transition(CallState::Closed)?;
                self.emit(CallEvent::Closed {
                    reason: CloseReason::OpenFailed(e.to_string()),
                });
                return Err(CallError::Open(e));
            }
        };

        let (mut producer, consumer) = media_queue(self.config.queue.capacity);
        let (signal_tx, mut signal_rx) = mpsc::channel(4);

        let pacer_task = self.spawn_pacer(consumer, transcription.clone(), signal_tx.clone());
        let worker = self.spawn_worker(events, signal_tx);

        self.transition(CallState::Active)?;
        self.touch();
        metrics::gauge!("call_bridge_active_calls").increment(1.0);
        tracing::info!(call_id = %self.id, "Call active");

        let reason = self
            .receive_loop(&mut inbound, &mut producer, &mut signal_rx)
            .await;

        let summary = self
            .drain(reason, producer, pacer_task, worker, &transcription)
            .await;
        metrics::gauge!("call_bridge_active_calls").decrement(1.0);

        Ok(summary)
    }

    async fn receive_loop<S>(
        &self,
        inbound: &mut S,
        producer: &mut FrameProducer,
        signals: &mut mpsc::Receiver<Signal>,
    ) -> CloseReason
    where
        S: Stream<Item = Result<TransportMessage, TransportError>> + Unpin + Send,
    {
        let mut ticker = tokio::time::interval(self.config.call.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        let mut sequence: u64 = 0;
        let mut receive_errors: u32 = 0;

        loop {
            tokio::select! {
                message = inbound.next() => match message {
                    None | Some(Ok(TransportMessage::Close)) => return CloseReason::Disconnected,
                    Some(Err(e)) => {
                        receive_errors += 1;
                        tracing::warn!(call_id = %self.id, error = %e, receive_errors, "Transport receive error");
                        if receive_errors >= self.config.call.max_receive_errors {
                            return CloseReason::ReceiveErrors(receive_errors);
                        }
                    }
                    Some(Ok(TransportMessage::Text(text))) => {
                        receive_errors = 0;
                        if let Some(reason) = self.handle_text(&text, producer, &mut sequence).await {
                            return reason;
                        }
                    }
                    Some(Ok(TransportMessage::Other)) => receive_errors = 0,
                },
                _ = ticker.tick() => self.on_tick().await,
                Some(signal) = signals.recv() => {
                    return match signal {
                        Signal::BackendFailed(msg) => CloseReason::BackendFailed(msg),
                        Signal::PacerStopped(e) => CloseReason::BackendFailed(e.to_string()),
                    };
                }
            }
        }
    }

    /// Handle one media stream event; `Some` ends the Active phase
    async fn handle_text(
        &self,
        text: &str,
        producer: &mut FrameProducer,
        sequence: &mut u64,
    ) -> Option<CloseReason> {
        let event = match MediaStreamEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(call_id = %self.id, error = %e, "Malformed media stream message skipped");
                metrics::counter!("call_bridge_malformed_messages_total").increment(1);
                return None;
            }
        };

        match event {
            MediaStreamEvent::Connected { protocol, .. } => {
                tracing::debug!(call_id = %self.id, ?protocol, "Media stream connected");
                self.touch();
            }
            MediaStreamEvent::Start { stream_sid, start } => {
                let stream_sid = stream_sid.or(start.stream_sid.clone());
                if let Some(format) = &start.media_format {
                    if format.audio_encoding() != Some(self.config.live.encoding)
                        || format.sample_rate != self.config.live.sample_rate
                    {
                        tracing::warn!(
                            call_id = %self.id,
                            encoding = %format.encoding,
                            sample_rate = format.sample_rate,
                            expected_encoding = %self.config.live.encoding,
                            expected_sample_rate = self.config.live.sample_rate,
                            "Media format differs from recognition options"
                        );
                    }
                }

                let previous = {
                    let mut shared = self.shared.lock();
                    shared.stream_sid = stream_sid.clone();
                    shared.last_activity = Instant::now();
                    shared.call_sid.replace(start.call_sid.clone())
                };
                if previous.as_deref() != Some(start.call_sid.as_str()) {
                    if let Some(previous) = previous {
                        self.collaborators.conversations.detach(&previous);
                    }
                    self.collaborators.conversations.attach(&start.call_sid);
                }
                tracing::info!(call_id = %self.id, call_sid = %start.call_sid, ?stream_sid, "Call started");
                self.emit(CallEvent::StreamStarted {
                    call_sid: start.call_sid,
                    stream_sid,
                });
            }
            MediaStreamEvent::Media { media, .. } => {
                let payload = match media.decode() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(call_id = %self.id, error = %e, "Undecodable media payload skipped");
                        return None;
                    }
                };
                self.touch();
                self.enqueue(producer, *sequence, Bytes::from(payload)).await;
                *sequence += 1;
            }
            MediaStreamEvent::Stop { .. } => {
                tracing::info!(call_id = %self.id, "Stop event received");
                return Some(CloseReason::Stopped);
            }
            MediaStreamEvent::Unknown => {
                tracing::trace!(call_id = %self.id, "Unknown media stream event ignored");
            }
        }

        None
    }

    async fn enqueue(&self, producer: &mut FrameProducer, sequence: u64, payload: Bytes) {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("call_bridge_frames_received_total").increment(1);

        let wait = Duration::from_millis(self.config.queue.enqueue_wait_ms);
        let policy: OverflowPolicy = self.config.queue.overflow;

        match producer
            .enqueue_with_policy(MediaFrame::new(sequence, payload), wait, policy)
            .await
        {
            Ok(Enqueued::Accepted) => self.emit(CallEvent::FrameQueued { sequence }),
            Ok(Enqueued::EvictedOldest(old)) => {
                self.record_drop(old.sequence, DropCause::Overflow);
                self.emit(CallEvent::FrameQueued { sequence });
            }
            Ok(Enqueued::DroppedNewest(frame)) | Err(EnqueueError::Full(frame)) => {
                self.record_drop(frame.sequence, DropCause::Overflow)
            }
            Err(EnqueueError::Closed(frame)) => {
                self.record_drop(frame.sequence, DropCause::QueueClosed)
            }
        }
    }

    fn record_drop(&self, sequence: u64, cause: DropCause) {
        match cause {
            DropCause::Overflow => {
                tracing::warn!(call_id = %self.id, sequence, "Media frame dropped on queue overflow")
            }
            // Pacer already gone; its signal ends the call shortly
            DropCause::QueueClosed => {
                tracing::debug!(call_id = %self.id, sequence, "Media frame discarded, queue closed")
            }
        }
        self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("call_bridge_frames_dropped_total", "cause" => cause.as_str()).increment(1);
        self.emit(CallEvent::FrameDropped { sequence, cause });
    }

    async fn on_tick(&self) {
        if self.state() != CallState::Active {
            return;
        }

        // An answer reconnects the stream itself; no keep-alive on the same tick
        if !self.deliver_pending().await {
            self.keep_alive_if_idle().await;
        }
    }

    /// Inject a pending answer; `true` when one was delivered
    async fn deliver_pending(&self) -> bool {
        let (call_sid, response) = {
            let mut shared = self.shared.lock();
            let Some(call_sid) = shared.call_sid.clone() else {
                return false;
            };
            match shared.pending.take() {
                Some(response) => (call_sid, response),
                None => return false,
            }
        };

        let script = answer_script(&self.config.call, &response.answer, &self.stream_url);
        match self.collaborators.control.inject(&call_sid, &script).await {
            Ok(()) => {
                self.counters.answers_delivered.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("call_bridge_answers_delivered_total").increment(1);
                metrics::histogram!("call_bridge_answer_delivery_seconds")
                    .record(response.created_at.elapsed().as_secs_f64());
                tracing::info!(call_id = %self.id, call_sid = %call_sid, "Answer delivered");
                self.emit(CallEvent::AnswerDelivered {
                    answer: response.answer,
                });
                true
            }
            Err(e) => {
                tracing::warn!(call_id = %self.id, call_sid = %call_sid, error = %e, "Answer injection failed, retrying next tick");
                self.emit(CallEvent::InjectionFailed { error: e.to_string() });
                let restored = self.shared.lock().pending.restore(response);
                if !restored {
                    tracing::debug!(call_id = %self.id, "Newer answer waiting, failed answer dropped");
                }
                false
            }
        }
    }

    async fn keep_alive_if_idle(&self) {
        let call_sid = {
            let shared = self.shared.lock();
            if shared.last_activity.elapsed() < self.config.call.inactivity_timeout() {
                return;
            }
            match shared.call_sid.clone() {
                Some(call_sid) => call_sid,
                None => return,
            }
        };

        let script = keep_alive_script(&self.config.call, &self.stream_url);
        match self.collaborators.control.inject(&call_sid, &script).await {
            Ok(()) => {
                self.touch();
                self.counters.keep_alives.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("call_bridge_keep_alives_total").increment(1);
                tracing::info!(call_id = %self.id, call_sid = %call_sid, "Keep-alive prompt sent");
                self.emit(CallEvent::KeepAliveSent);
            }
            Err(e) => {
                tracing::warn!(call_id = %self.id, call_sid = %call_sid, error = %e, "Keep-alive injection failed");
                self.emit(CallEvent::InjectionFailed { error: e.to_string() });
            }
        }
    }

    fn spawn_pacer(
        &self,
        consumer: FrameConsumer,
        transcription: Arc<TranscriptionSession>,
        signals: mpsc::Sender<Signal>,
    ) -> JoinHandle<PacerOutcome> {
        let pacer = Pacer::new(
            &self.config.pacer,
            self.config.live.encoding,
            self.config.live.sample_rate,
        );

        tokio::spawn(async move {
            let outcome = pacer.run(consumer, transcription.as_ref()).await;
            if let Some(error) = &outcome.error {
                let _ = signals.send(Signal::PacerStopped(error.clone())).await;
            }
            outcome
        })
    }

    fn spawn_worker(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<RecognizerEvent>,
        signals: mpsc::Sender<Signal>,
    ) -> JoinHandle<()> {
        let this = self.clone();
        let reactor = TranscriptReactor::new(
            self.collaborators.knowledge.clone(),
            self.collaborators.conversations.clone(),
            self.config.user_id.clone(),
        );

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    RecognizerEvent::Transcript(transcript) => {
                        this.touch();
                        metrics::counter!("call_bridge_transcripts_total").increment(1);
                        this.emit(CallEvent::Transcript(transcript.clone()));
                        let call_sid = this.call_sid();
                        let reaction = reactor.react(call_sid.as_deref(), &transcript).await;
                        this.apply_reaction(reaction);
                    }
                    RecognizerEvent::Metadata(metadata) => {
                        tracing::debug!(call_id = %this.id, %metadata, "Speech backend metadata");
                    }
                    RecognizerEvent::Error(message) => {
                        tracing::error!(call_id = %this.id, error = %message, "Speech backend error");
                        let _ = signals.send(Signal::BackendFailed(message)).await;
                        return;
                    }
                    RecognizerEvent::Closed => {
                        let _ = signals
                            .send(Signal::BackendFailed("speech backend closed the stream".to_string()))
                            .await;
                        return;
                    }
                }
            }
        })
    }

    fn apply_reaction(&self, reaction: Reaction) {
        match reaction {
            Reaction::Ignored => {}
            Reaction::Answered(response) => {
                let query = response.query.clone();
                let answer = response.answer.clone();
                let replaced = self.store_answer(response);
                self.emit(CallEvent::AnswerReady {
                    query,
                    answer,
                    superseded: replaced.is_some(),
                });
            }
            Reaction::Failed { query, error } => {
                self.emit(CallEvent::QueryFailed {
                    query,
                    error: error.to_string(),
                });
            }
        }
    }

    /// Latest answer wins; the replaced one is returned
    fn store_answer(&self, response: PendingResponse) -> Option<PendingResponse> {
        let replaced = self.shared.lock().pending.put(response);
        if let Some(old) = &replaced {
            metrics::counter!("call_bridge_answers_superseded_total").increment(1);
            tracing::warn!(call_id = %self.id, query = %old.query, "Undelivered answer superseded by a newer one");
        }
        replaced
    }

    async fn drain(
        &self,
        reason: CloseReason,
        producer: FrameProducer,
        mut pacer_task: JoinHandle<PacerOutcome>,
        worker: JoinHandle<()>,
        transcription: &TranscriptionSession,
    ) -> CallSummary {
        if let Err(e) = self.transition(CallState::Draining) {
            tracing::warn!(call_id = %self.id, error = %e, "Unexpected state at drain");
        }
        tracing::info!(call_id = %self.id, %reason, "Call draining");

        // Pacer exits once the buffered frames are sent
        producer.close();
        drop(producer);

        let outcome = match tokio::time::timeout(self.config.call.drain_timeout(), &mut pacer_task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!(call_id = %self.id, error = %e, "Pacer task failed");
                PacerOutcome::default()
            }
            Err(_) => {
                tracing::warn!(call_id = %self.id, "Pacer did not drain in time, aborting");
                pacer_task.abort();
                PacerOutcome::default()
            }
        };

        if let Err(e) = transcription
            .close_within(self.config.call.drain_timeout())
            .await
        {
            tracing::warn!(call_id = %self.id, error = %e, "Transcription session close failed");
        }
        worker.abort();

        if let Err(e) = self.transition(CallState::Closed) {
            tracing::warn!(call_id = %self.id, error = %e, "Unexpected state at close");
        }

        let (call_sid, superseded) = {
            let shared = self.shared.lock();
            (shared.call_sid.clone(), shared.pending.superseded())
        };
        if let Some(call_sid) = &call_sid {
            self.collaborators.conversations.detach(call_sid);
        }
        let summary = CallSummary {
            call_id: self.id.clone(),
            call_sid,
            reason: reason.clone(),
            duration_ms: self.created.elapsed().as_millis() as u64,
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            frames_sent: outcome.frames_sent,
            silence_sent: outcome.silence_sent,
            answers_delivered: self.counters.answers_delivered.load(Ordering::Relaxed),
            answers_superseded: superseded,
            keep_alives: self.counters.keep_alives.load(Ordering::Relaxed),
        };

        metrics::counter!("call_bridge_calls_total", "outcome" => "completed").increment(1);
        metrics::histogram!("call_bridge_call_duration_seconds")
            .record(summary.duration_ms as f64 / 1000.0);
        tracing::info!(
            call_id = %self.id,
            call_sid = ?summary.call_sid,
            frames_received = summary.frames_received,
            frames_sent = summary.frames_sent,
            answers_delivered = summary.answers_delivered,
            "Call closed"
        );
        self.emit(CallEvent::Closed { reason });

        summary
    }

    fn transition(&self, to: CallState) -> Result<(), CallError> {
        let from = {
            let mut shared = self.shared.lock();
            let from = shared.state;
            if !from.can_transition_to(to) {
                return Err(CallError::InvalidTransition { from, to });
            }
            shared.state = to;
            from
        };

        tracing::debug!(call_id = %self.id, %from, %to, "Call state changed");
        self.emit(CallEvent::StateChanged { old: from, new: to });
        Ok(())
    }

    fn touch(&self) {
        self.shared.lock().last_activity = Instant::now();
    }

    fn emit(&self, event: CallEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use call_bridge_core::{
        CallScript, Error, KnowledgeAnswer, KnowledgeRequest, RecognizerStream,
    };

    struct Offline;

    #[async_trait]
    impl SpeechRecognizer for Offline {
        async fn connect(
            &self,
            _options: &LiveOptions,
            _events: mpsc::Sender<RecognizerEvent>,
        ) -> call_bridge_core::Result<Box<dyn RecognizerStream>> {
            Err(Error::Backend("offline".into()))
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    #[async_trait]
    impl KnowledgeQuery for Offline {
        async fn query(&self, _request: &KnowledgeRequest) -> call_bridge_core::Result<KnowledgeAnswer> {
            Err(Error::Query("offline".into()))
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    #[async_trait]
    impl CallControl for Offline {
        async fn inject(&self, _call_sid: &str, _script: &CallScript) -> call_bridge_core::Result<()> {
            Err(Error::CallControl("offline".into()))
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    fn session(config: CallSessionConfig) -> Arc<CallSession> {
        CallSession::new(
            config,
            Collaborators {
                recognizer: Arc::new(Offline),
                knowledge: Arc::new(Offline),
                control: Arc::new(Offline),
                conversations: Arc::new(ConversationStore::default()),
            },
            "wss://bridge.test/realtime",
        )
    }

    fn dropped(events: &mut broadcast::Receiver<CallEvent>) -> Vec<(u64, DropCause)> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CallEvent::FrameDropped { sequence, cause } = event {
                seen.push((sequence, cause));
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_frames_after_pacer_stop_are_not_overflow() {
        let call = session(CallSessionConfig::default());
        let mut events = call.subscribe();
        let (mut producer, consumer) = media_queue(4);
        consumer.close();

        call.enqueue(&mut producer, 7, Bytes::from_static(&[0x55; 160])).await;

        assert_eq!(dropped(&mut events), vec![(7, DropCause::QueueClosed)]);
        assert_eq!(call.counters.frames_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(call.counters.frames_received.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_policies() {
        let mut config = CallSessionConfig::default();
        config.queue.overflow = OverflowPolicy::DropNewest;
        let call = session(config);
        let mut events = call.subscribe();
        let (mut producer, _consumer) = media_queue(1);

        call.enqueue(&mut producer, 0, Bytes::from_static(&[0x55])).await;
        call.enqueue(&mut producer, 1, Bytes::from_static(&[0x55])).await;
        assert_eq!(dropped(&mut events), vec![(1, DropCause::Overflow)]);

        let call = session(CallSessionConfig::default());
        let mut events = call.subscribe();
        let (mut producer, _consumer) = media_queue(1);

        call.enqueue(&mut producer, 0, Bytes::from_static(&[0x55])).await;
        call.enqueue(&mut producer, 1, Bytes::from_static(&[0x55])).await;
        assert_eq!(dropped(&mut events), vec![(0, DropCause::Overflow)]);
    }
}
