//! Pacer cadence tests on paused time

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use call_bridge_config::PacerConfig;
use call_bridge_core::{AudioEncoding, MediaFrame};
use call_bridge_pipeline::{media_queue, AudioSink, Pacer, PipelineError};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Frame(u8),
    Silence,
}

/// Records what reached the backend; real frames carry their sequence in byte 0
#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
    fail_after: Option<usize>,
    aborts: AtomicUsize,
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn send_audio(&self, audio: Bytes) -> Result<(), PipelineError> {
        let mut sent = self.sent.lock();
        if let Some(limit) = self.fail_after {
            if sent.len() >= limit {
                return Err(PipelineError::Backend("connection reset".into()));
            }
        }
        if audio.iter().all(|&b| b == 0xFF) {
            sent.push(Sent::Silence);
        } else {
            sent.push(Sent::Frame(audio[0]));
        }
        Ok(())
    }

    async fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingSink {
    fn frames(&self) -> Vec<u8> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Frame(seq) => Some(*seq),
                Sent::Silence => None,
            })
            .collect()
    }
}

fn frame(seq: u8) -> MediaFrame {
    MediaFrame::new(seq as u64, vec![seq; 160])
}

fn pacer(config: PacerConfig) -> Pacer {
    Pacer::new(&config, AudioEncoding::Mulaw, 8000)
}

#[tokio::test(start_paused = true)]
async fn test_frames_in_order_with_silence_across_gap() {
    let (mut tx, rx) = media_queue(16);
    let sink = Arc::new(RecordingSink::default());
    let pacer = pacer(PacerConfig::default());

    let task = {
        let sink = sink.clone();
        tokio::spawn(async move { pacer.run(rx, sink.as_ref()).await })
    };

    for seq in 1..=2 {
        tx.enqueue(frame(seq), Duration::ZERO).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    tx.enqueue(frame(3), Duration::ZERO).await.unwrap();
    tx.close();

    let outcome = task.await.unwrap();
    assert!(outcome.error.is_none());
    assert_eq!(outcome.frames_sent, 3);
    assert!(outcome.silence_sent >= 1);

    assert_eq!(sink.frames(), vec![1, 2, 3]);

    let sent = sink.sent.lock().clone();
    let second = sent.iter().position(|s| *s == Sent::Frame(2)).unwrap();
    let third = sent.iter().position(|s| *s == Sent::Frame(3)).unwrap();
    assert!(sent[second..third].contains(&Sent::Silence));
}

#[tokio::test(start_paused = true)]
async fn test_silence_precedes_late_frame() {
    // Long dequeue wait so the late frame is picked up before any filler
    let config = PacerConfig {
        dequeue_timeout_ms: 1_000,
        ..Default::default()
    };
    let (mut tx, rx) = media_queue(16);
    let sink = Arc::new(RecordingSink::default());
    let pacer = pacer(config);

    let task = {
        let sink = sink.clone();
        tokio::spawn(async move { pacer.run(rx, sink.as_ref()).await })
    };

    tokio::time::sleep(Duration::from_millis(250)).await;
    tx.enqueue(frame(7), Duration::ZERO).await.unwrap();
    tx.close();

    task.await.unwrap();
    assert_eq!(*sink.sent.lock(), vec![Sent::Silence, Sent::Frame(7)]);
}

#[tokio::test(start_paused = true)]
async fn test_no_silence_for_back_to_back_frames() {
    let (mut tx, rx) = media_queue(16);
    for seq in 1..=5 {
        tx.enqueue(frame(seq), Duration::ZERO).await.unwrap();
    }
    tx.close();

    let sink = RecordingSink::default();
    let outcome = pacer(PacerConfig::default()).run(rx, &sink).await;

    assert_eq!(outcome.frames_sent, 5);
    assert_eq!(outcome.silence_sent, 0);
    assert_eq!(sink.frames(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_send_error_stops_and_aborts() {
    let (mut tx, rx) = media_queue(16);
    for seq in 1..=4 {
        tx.enqueue(frame(seq), Duration::ZERO).await.unwrap();
    }

    let sink = RecordingSink {
        fail_after: Some(2),
        ..Default::default()
    };
    let outcome = pacer(PacerConfig::default()).run(rx, &sink).await;

    assert_eq!(outcome.frames_sent, 2);
    assert!(matches!(outcome.error, Some(PipelineError::Backend(_))));
    assert_eq!(sink.aborts.load(Ordering::SeqCst), 1);

    // The pacer closed the queue on its way out
    assert!(tx.is_closed());
}
