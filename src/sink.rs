//! Media sink seam between the delivery engine and the transport layer.
//!
//! The core writes timestamped samples to two per-station tracks; session
//! negotiation and network transmission are the transport collaborator's
//! concern. An unbound sink is a transient condition the delivery engine
//! pauses on, never an error.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One timestamped sample on a track.
///
/// `pts` and `duration` are in the track's own clock: 90 kHz ticks for video,
/// 48 kHz samples for audio.
#[derive(Debug, Clone)]
pub struct MediaSample {
    pub data: Vec<u8>,
    pub pts: u64,
    pub duration: u64,
}

/// Which track a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Video,
    Audio,
}

/// Errors surfaced by a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The transport has not bound the track yet; transient.
    #[error("sink not bound")]
    NotBound,

    /// The transport closed the track.
    #[error("sink closed: {0}")]
    Closed(String),
}

/// Per-station output: two tracks the transport multiplexes to viewers.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Whether the transport has bound both tracks.
    fn bound(&self) -> bool;

    async fn write_video(&self, sample: MediaSample) -> Result<(), SinkError>;

    async fn write_audio(&self, sample: MediaSample) -> Result<(), SinkError>;
}

/// Sink backed by an mpsc channel; what the transport layer plugs in.
pub struct ChannelSink {
    tx: mpsc::Sender<(Track, MediaSample)>,
    bound: AtomicBool,
}

impl ChannelSink {
    /// Create a sink and the receiving end the transport drains.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<(Track, MediaSample)>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Arc::new(Self {
                tx,
                bound: AtomicBool::new(false),
            }),
            rx,
        )
    }

    /// Mark the tracks as negotiated and ready.
    pub fn bind(&self) {
        self.bound.store(true, Ordering::Release);
    }

    async fn send(&self, track: Track, sample: MediaSample) -> Result<(), SinkError> {
        if !self.bound() {
            return Err(SinkError::NotBound);
        }
        self.tx
            .send((track, sample))
            .await
            .map_err(|e| SinkError::Closed(e.to_string()))
    }
}

#[async_trait]
impl MediaSink for ChannelSink {
    fn bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    async fn write_video(&self, sample: MediaSample) -> Result<(), SinkError> {
        self.send(Track::Video, sample).await
    }

    async fn write_audio(&self, sample: MediaSample) -> Result<(), SinkError> {
        self.send(Track::Audio, sample).await
    }
}

/// Always-bound sink that counts and discards samples. Used by the headless
/// `serve` mode and in tests.
#[derive(Default)]
pub struct DiscardSink {
    pub video_samples: AtomicU64,
    pub audio_samples: AtomicU64,
}

#[async_trait]
impl MediaSink for DiscardSink {
    fn bound(&self) -> bool {
        true
    }

    async fn write_video(&self, _sample: MediaSample) -> Result<(), SinkError> {
        self.video_samples.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_audio(&self, _sample: MediaSample) -> Result<(), SinkError> {
        self.audio_samples.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
