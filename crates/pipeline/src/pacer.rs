//! Outbound audio pacer
//!
//! The speech backend expects a continuous stream. The pacer drains the
//! media frame queue on a fixed tick and fills gaps with silence so the
//! backend never sees a lull longer than the silence threshold.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use call_bridge_config::PacerConfig;
use call_bridge_core::{silence_frame, AudioEncoding};
use tokio::time::{Instant, MissedTickBehavior};

use crate::queue::{Dequeued, FrameConsumer};
use crate::PipelineError;

/// Destination of paced audio
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Send one encoded chunk
    async fn send_audio(&self, audio: Bytes) -> Result<(), PipelineError>;

    /// Release the sink after a fatal send error
    async fn abort(&self);
}

/// What the pacer did before it stopped
#[derive(Debug, Default)]
pub struct PacerOutcome {
    pub frames_sent: u64,
    pub silence_sent: u64,
    /// Send error that stopped the pacer early
    pub error: Option<PipelineError>,
}

/// Steady-cadence forwarder from the queue to an [`AudioSink`]
#[derive(Debug, Clone)]
pub struct Pacer {
    tick: Duration,
    silence_gap: Duration,
    dequeue_timeout: Duration,
    silence: Bytes,
}

impl Pacer {
    pub fn new(config: &PacerConfig, encoding: AudioEncoding, sample_rate: u32) -> Self {
        Self {
            tick: Duration::from_millis(config.tick_ms.max(1)),
            silence_gap: Duration::from_millis(config.silence_gap_ms),
            dequeue_timeout: Duration::from_millis(config.dequeue_timeout_ms),
            silence: silence_frame(encoding, sample_rate, config.silence_frame_ms),
        }
    }

    /// Silence payload sent to fill gaps
    pub fn silence(&self) -> &Bytes {
        &self.silence
    }

    /// Run until the queue is closed and drained, or a send fails
    pub async fn run<S>(&self, mut frames: FrameConsumer, sink: &S) -> PacerOutcome
    where
        S: AudioSink + ?Sized,
    {
        let mut outcome = PacerOutcome::default();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_sent = Instant::now();

        loop {
            ticker.tick().await;

            let step = match frames.dequeue(self.dequeue_timeout).await {
                Dequeued::Frame(frame) => {
                    let fill_gap = last_sent.elapsed() > self.silence_gap;
                    self.send_frame(sink, frame.payload, fill_gap, &mut outcome)
                        .await
                }
                Dequeued::Empty if last_sent.elapsed() > self.silence_gap => {
                    self.send_silence(sink, &mut outcome).await
                }
                Dequeued::Empty => continue,
                Dequeued::Closed => {
                    tracing::debug!(
                        frames_sent = outcome.frames_sent,
                        silence_sent = outcome.silence_sent,
                        "Pacer drained queue"
                    );
                    return outcome;
                }
            };

            match step {
                Ok(()) => last_sent = Instant::now(),
                Err(e) => return self.stop(frames, sink, outcome, e).await,
            }
        }
    }

    async fn send_frame<S>(
        &self,
        sink: &S,
        payload: Bytes,
        fill_gap: bool,
        outcome: &mut PacerOutcome,
    ) -> Result<(), PipelineError>
    where
        S: AudioSink + ?Sized,
    {
        if fill_gap {
            self.send_silence(sink, outcome).await?;
        }
        sink.send_audio(payload).await?;
        outcome.frames_sent += 1;
        metrics::counter!("call_bridge_frames_sent_total").increment(1);
        Ok(())
    }

    async fn send_silence<S>(&self, sink: &S, outcome: &mut PacerOutcome) -> Result<(), PipelineError>
    where
        S: AudioSink + ?Sized,
    {
        sink.send_audio(self.silence.clone()).await?;
        outcome.silence_sent += 1;
        metrics::counter!("call_bridge_silence_frames_total").increment(1);
        Ok(())
    }

    async fn stop<S>(
        &self,
        frames: FrameConsumer,
        sink: &S,
        mut outcome: PacerOutcome,
        error: PipelineError,
    ) -> PacerOutcome
    where
        S: AudioSink + ?Sized,
    {
        // The producer sees Closed from now on
        frames.close();

        if error.is_fatal() {
            tracing::error!(error = %error, "Pacer stopped on fatal send error");
            sink.abort().await;
        } else {
            tracing::debug!(error = %error, "Pacer stopped, sink no longer accepting audio");
        }

        outcome.error = Some(error);
        outcome
    }
}
