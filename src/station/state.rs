//! Per-station mutable playback state.
//!
//! Everything mutable about a station sits behind one `parking_lot::Mutex`.
//! Both engines take the lock only for short state transitions, never across
//! a transcoder call or a pacing sleep.

use std::collections::VecDeque;
use std::path::PathBuf;

use airwave_av::Rational;
use anyhow::ensure;
use parking_lot::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A produced segment pair awaiting delivery.
///
/// Created by the production engine; ownership transfers to the delivery
/// engine on dequeue, which deletes the files after transmission.
#[derive(Debug)]
pub struct BufferedChunk {
    /// Raw H.264 Annex-B elementary stream.
    pub video_path: PathBuf,
    /// Ogg/Opus audio container.
    pub audio_path: PathBuf,
    /// Achieved wall-clock duration in seconds.
    pub duration: f64,
    /// Advertisement chunks never advance the program timeline.
    pub is_ad: bool,
    /// The video this chunk was cut from.
    pub video_id: String,
    /// Total duration of that source video (for rollover re-checks).
    pub source_duration: f64,
    pub frame_rate: Rational,
    /// How much of the underlying video's timeline this chunk represents;
    /// differs from `duration` near fades and is zero for ads.
    pub effective_advance: f64,
    /// Rotation pass the chunk was produced in. A wrap back onto the same
    /// video starts a new pass; chunks of an earlier pass no longer count
    /// toward the production frontier.
    pub pass: u64,
}

/// Timeline claim of the chunk currently being transmitted.
///
/// A dequeued chunk leaves the queue long before its real-time transmission
/// finishes; its advance is held here so the production frontier does not
/// collapse backwards for the in-flight window.
#[derive(Debug, Clone, Copy)]
pub struct InFlight {
    pub pass: u64,
    pub advance: f64,
}

/// Cached SPS/PPS from the first produced chunk of a video.
///
/// Keyed by source so a leftover chunk of a rotated-away video is never
/// prefixed with the next video's codec configuration.
#[derive(Debug, Clone)]
pub struct ParameterSets {
    pub video_id: String,
    pub nalus: Vec<Vec<u8>>,
}

impl BufferedChunk {
    /// Best-effort removal of the chunk's files.
    pub fn delete_files(&self) {
        for path in [&self.video_path, &self.audio_path] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to delete chunk file");
                }
            }
        }
    }
}

/// Mutable station fields, guarded by the station's single lock.
#[derive(Debug)]
pub struct StationState {
    /// Ordered video rotation; never empty after bootstrap.
    pub rotation: Vec<String>,
    /// Index of the current video in the rotation.
    pub index: usize,
    /// Rotation pass counter; incremented on every rotation step.
    pub pass: u64,
    /// Seconds into the current video already delivered.
    pub current_offset: f64,
    pub viewers: u32,
    /// Chunks produced but not yet delivered, FIFO.
    pub queue: VecDeque<BufferedChunk>,
    /// Advance of the chunk the delivery engine is currently transmitting.
    pub in_flight: Option<InFlight>,
    /// Cached SPS/PPS, keyed by the video they were extracted from.
    pub parameter_sets: Option<ParameterSets>,
    /// Negotiated playout format descriptor.
    pub format: Option<String>,
    /// Carried video presentation time, 90 kHz ticks.
    pub video_pts: u64,
    /// Carried audio presentation time, 48 kHz samples.
    pub audio_pts: u64,
    /// Time of the last break served in the current video; breaks at or
    /// before this point are spent.
    pub last_break_time: Option<f64>,
}

impl StationState {
    /// ID of the video currently playing.
    pub fn current_video(&self) -> &str {
        &self.rotation[self.index]
    }

    /// Effective production position: current offset plus the timeline the
    /// in-flight chunk and the queued chunks of the current pass cover.
    ///
    /// Counting by pass rather than by video ID keeps a wrap back onto the
    /// same video from seeing the previous pass's chunks as its own.
    pub fn next_start(&self) -> f64 {
        let in_flight = self
            .in_flight
            .filter(|f| f.pass == self.pass)
            .map(|f| f.advance)
            .unwrap_or(0.0);
        self.current_offset
            + in_flight
            + self
                .queue
                .iter()
                .filter(|c| !c.is_ad && c.pass == self.pass)
                .map(|c| c.effective_advance)
                .sum::<f64>()
    }

    /// Total buffered playout time in seconds.
    pub fn buffered_secs(&self) -> f64 {
        self.queue.iter().map(|c| c.duration).sum()
    }

    /// Move to the next video in the rotation (wrapping) and reset per-video
    /// state. The parameter-set cache stays; it is keyed by video and chunks
    /// of the previous video may still be queued.
    pub fn advance_rotation(&mut self) {
        self.index = (self.index + 1) % self.rotation.len();
        self.pass += 1;
        self.current_offset = 0.0;
        self.format = None;
        self.last_break_time = None;
    }

    /// Drop all buffered chunks, deleting their files.
    pub fn flush_queue(&mut self) {
        for chunk in self.queue.drain(..) {
            chunk.delete_files();
        }
        self.in_flight = None;
        self.parameter_sets = None;
        self.format = None;
    }
}

/// One independent simulated live channel.
pub struct Station {
    pub name: String,
    state: Mutex<StationState>,
    /// Stop signal for the current engine generation; reissued per start.
    stop: Mutex<CancellationToken>,
}

impl Station {
    /// Bootstrap a station at a synchronized position.
    ///
    /// An empty rotation is a programming-invariant violation and fatal here,
    /// never mid-playback.
    pub fn new(
        name: impl Into<String>,
        rotation: Vec<String>,
        index: usize,
        offset: f64,
    ) -> anyhow::Result<Self> {
        ensure!(!rotation.is_empty(), "station rotation must not be empty");
        ensure!(index < rotation.len(), "rotation index out of range");

        Ok(Self {
            name: name.into(),
            state: Mutex::new(StationState {
                rotation,
                index,
                pass: 0,
                current_offset: offset,
                viewers: 0,
                queue: VecDeque::new(),
                in_flight: None,
                parameter_sets: None,
                format: None,
                video_pts: 0,
                audio_pts: 0,
                last_break_time: None,
            }),
            stop: Mutex::new(CancellationToken::new()),
        })
    }

    /// Take the station lock.
    pub fn lock(&self) -> MutexGuard<'_, StationState> {
        self.state.lock()
    }

    /// Clone the current generation's stop token.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.lock().clone()
    }

    /// Raise the stop signal for the current generation.
    pub fn raise_stop(&self) {
        self.stop.lock().cancel();
    }

    /// Issue a fresh stop token for a new engine generation.
    pub fn reissue_stop(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.stop.lock() = token.clone();
        token
    }
}
