//! Real-time delivery engine.
//!
//! Drains the station's chunk queue in FIFO order, turns each chunk back into
//! timed samples (access units on the video track, Opus packets on the audio
//! track), and paces transmission against wall-clock targets measured from
//! the start of the chunk. Timestamps carry over between chunks so the
//! transport sees one continuous monotonic stream.

use std::sync::Arc;
use std::time::Duration;

use airwave_bitstream::{group_access_units, nal_type, ogg, split_nalus, NalUnitType};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PlayoutConfig;
use crate::sink::{MediaSample, MediaSink, SinkError};
use crate::station::{BufferedChunk, InFlight, Station};

/// Video track clock rate in ticks per second.
const VIDEO_CLOCK_HZ: f64 = 90_000.0;
/// Audio track clock rate in samples per second.
const AUDIO_CLOCK_HZ: f64 = 48_000.0;

/// Outcome of one chunk transmission attempt.
enum Delivery {
    /// The chunk was sent, or its window has irrecoverably passed.
    Completed,
    /// The transport unbound mid-chunk; the chunk is still deliverable.
    SinkUnbound,
}

pub struct DeliveryEngine {
    station: Arc<Station>,
    sink: Arc<dyn MediaSink>,
    config: Arc<PlayoutConfig>,
}

impl DeliveryEngine {
    pub fn new(
        station: Arc<Station>,
        sink: Arc<dyn MediaSink>,
        config: Arc<PlayoutConfig>,
    ) -> Self {
        Self {
            station,
            sink,
            config,
        }
    }

    /// Run until the stop signal is raised.
    pub async fn run(self, stop: CancellationToken) {
        info!(station = %self.station.name, "delivery engine started");
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        while !stop.is_cancelled() {
            if !self.sink.bound() {
                // The transport has not negotiated the tracks yet; hold the
                // queue rather than dropping samples.
                self.sleep(poll, &stop).await;
                continue;
            }

            let Some(chunk) = self.dequeue() else {
                self.sleep(poll, &stop).await;
                continue;
            };

            match self.deliver_chunk(&chunk, &stop).await {
                Ok(Delivery::Completed) => {
                    self.advance(&chunk);
                    chunk.delete_files();
                }
                Ok(Delivery::SinkUnbound) => {
                    // The transport dropped the tracks mid-chunk. Put the
                    // chunk back and wait for a rebind; nothing advances.
                    debug!(
                        station = %self.station.name,
                        video = %chunk.video_id,
                        "sink unbound mid-chunk, requeueing"
                    );
                    {
                        let mut state = self.station.lock();
                        state.in_flight = None;
                        state.queue.push_front(chunk);
                    }
                    self.sleep(poll, &stop).await;
                }
                Err(e) => {
                    error!(
                        station = %self.station.name,
                        video = %chunk.video_id,
                        error = %e,
                        "chunk delivery failed"
                    );
                    self.advance(&chunk);
                    chunk.delete_files();
                }
            }
        }

        info!(station = %self.station.name, "delivery engine stopped");
    }

    /// Pop the next deliverable chunk, discarding stale ones. Ads are never
    /// stale; they are not rotation members to begin with.
    ///
    /// The popped chunk's advance is recorded as in-flight so production
    /// keeps counting its span until [`advance`](Self::advance) folds it into
    /// the offset; the transmission takes the chunk's full duration in wall
    /// time and the frontier must not drop back meanwhile.
    fn dequeue(&self) -> Option<BufferedChunk> {
        let mut state = self.station.lock();
        while let Some(chunk) = state.queue.pop_front() {
            if chunk.is_ad || state.rotation.contains(&chunk.video_id) {
                state.in_flight = Some(InFlight {
                    pass: chunk.pass,
                    advance: chunk.effective_advance,
                });
                return Some(chunk);
            }
            warn!(
                station = %self.station.name,
                video = %chunk.video_id,
                "discarding chunk for video no longer in rotation"
            );
            chunk.delete_files();
        }
        None
    }

    async fn deliver_chunk(
        &self,
        chunk: &BufferedChunk,
        stop: &CancellationToken,
    ) -> anyhow::Result<Delivery> {
        let video_bytes = tokio::fs::read(&chunk.video_path).await?;
        let audio_bytes = tokio::fs::read(&chunk.audio_path).await?;

        let nalus = split_nalus(&video_bytes);
        let has_own_sps = nalus
            .iter()
            .any(|n| nal_type(n) == Some(NalUnitType::Sps));

        let mut frames: Vec<Vec<u8>> = group_access_units(&nalus)
            .iter()
            .filter(|au| au.has_vcl())
            .map(|au| au.to_annex_b())
            .collect();
        if frames.is_empty() {
            anyhow::bail!("chunk {} contains no video frames", chunk.video_path.display());
        }

        // A stream cut mid-GOP may lack its own parameter sets; prefix the
        // cached ones so the first frame is decodable. The cache is keyed by
        // video, so another video's configuration is never borrowed.
        if !has_own_sps {
            let cached = {
                let state = self.station.lock();
                state
                    .parameter_sets
                    .as_ref()
                    .filter(|ps| ps.video_id == chunk.video_id)
                    .map(|ps| ps.nalus.clone())
            };
            match cached {
                Some(nalus) => {
                    let mut prefixed = Vec::new();
                    for ps in &nalus {
                        prefixed.extend_from_slice(&[0, 0, 0, 1]);
                        prefixed.extend_from_slice(ps);
                    }
                    prefixed.extend_from_slice(&frames[0]);
                    frames[0] = prefixed;
                }
                None => warn!(
                    station = %self.station.name,
                    video = %chunk.video_id,
                    "no parameter sets in chunk and none cached for its video"
                ),
            }
        }

        let packets = ogg::packets(&audio_bytes)?;
        let packet_count = packets.len();

        let frame_count = frames.len();
        let frame_interval = chunk.duration / frame_count as f64;
        let frame_ticks = (frame_interval * VIDEO_CLOCK_HZ).round() as u64;

        let (video_base, audio_base) = {
            let state = self.station.lock();
            (state.video_pts, state.audio_pts)
        };

        debug!(
            station = %self.station.name,
            video = %chunk.video_id,
            frames = frame_count,
            packets = packet_count,
            duration = chunk.duration,
            "delivering chunk"
        );

        // Both tracks pace against the same start instant so wall-clock error
        // never accumulates across samples.
        let start = Instant::now();

        let video_task = {
            let sink = Arc::clone(&self.sink);
            let stop = stop.clone();
            tokio::spawn(async move {
                for (i, frame) in frames.into_iter().enumerate() {
                    let target = start + Duration::from_secs_f64(frame_interval * i as f64);
                    tokio::select! {
                        _ = tokio::time::sleep_until(target) => {}
                        _ = stop.cancelled() => return Ok(()),
                    }
                    let pts = video_base + (i as f64 * frame_interval * VIDEO_CLOCK_HZ).round() as u64;
                    sink.write_video(MediaSample {
                        data: frame,
                        pts,
                        duration: frame_ticks,
                    })
                    .await?;
                }
                Ok::<(), SinkError>(())
            })
        };

        let audio_task = {
            let sink = Arc::clone(&self.sink);
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut samples_sent: u64 = 0;
                for packet in packets {
                    let target =
                        start + Duration::from_secs_f64(samples_sent as f64 / AUDIO_CLOCK_HZ);
                    tokio::select! {
                        _ = tokio::time::sleep_until(target) => {}
                        _ = stop.cancelled() => return Ok(()),
                    }
                    let duration = u64::from(packet.duration_samples);
                    sink.write_audio(MediaSample {
                        data: packet.data,
                        pts: audio_base + samples_sent,
                        duration,
                    })
                    .await?;
                    samples_sent += duration;
                }
                Ok::<(), SinkError>(())
            })
        };

        let video_abort = video_task.abort_handle();
        let audio_abort = audio_task.abort_handle();
        let deadline =
            Duration::from_secs_f64(chunk.duration + self.config.delivery_slack_secs.max(0.0));
        match tokio::time::timeout(deadline, async {
            tokio::join!(video_task, audio_task)
        })
        .await
        {
            Ok((video, audio)) => {
                let mut unbound = false;
                for result in [video, audio] {
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(SinkError::NotBound)) => unbound = true,
                        Ok(Err(e)) => warn!(
                            station = %self.station.name,
                            error = %e,
                            "track transmission aborted"
                        ),
                        Err(e) => warn!(
                            station = %self.station.name,
                            error = %e,
                            "track task panicked"
                        ),
                    }
                }
                if unbound {
                    return Ok(Delivery::SinkUnbound);
                }
            }
            Err(_) => {
                // A wedged transport must not wedge the station.
                video_abort.abort();
                audio_abort.abort();
                error!(
                    station = %self.station.name,
                    video = %chunk.video_id,
                    "chunk transmission exceeded its deadline"
                );
            }
        }

        Ok(Delivery::Completed)
    }

    /// Advance timestamps and the program position after a chunk, delivered
    /// or not; the playhead must keep moving.
    fn advance(&self, chunk: &BufferedChunk) {
        let mut state = self.station.lock();
        state.in_flight = None;

        state.video_pts += (chunk.duration * VIDEO_CLOCK_HZ).round() as u64;
        state.audio_pts += (chunk.duration * AUDIO_CLOCK_HZ).round() as u64;

        if !chunk.is_ad && chunk.pass == state.pass {
            state.current_offset += chunk.effective_advance;
            // Rollover is re-checked here as well as in production; both
            // engines observe the same offset.
            if state.current_offset >= chunk.source_duration - 1e-6 {
                debug!(
                    station = %self.station.name,
                    video = %chunk.video_id,
                    "video finished during delivery, rotating"
                );
                state.advance_rotation();
            }
        }
    }

    async fn sleep(&self, duration: Duration, stop: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = stop.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::DiscardSink;
    use airwave_av::Rational;
    use std::path::PathBuf;

    fn chunk(advance: f64) -> BufferedChunk {
        BufferedChunk {
            video_path: PathBuf::from("/tmp/none.h264"),
            audio_path: PathBuf::from("/tmp/none.ogg"),
            duration: advance,
            is_ad: false,
            video_id: "a".into(),
            source_duration: 200.0,
            frame_rate: Rational::new(25, 1),
            effective_advance: advance,
            pass: 0,
        }
    }

    fn engine(station: &Arc<Station>) -> DeliveryEngine {
        DeliveryEngine::new(
            Arc::clone(station),
            Arc::new(DiscardSink::default()),
            Arc::new(PlayoutConfig::default()),
        )
    }

    #[test]
    fn dequeue_keeps_the_chunk_span_claimed() {
        let station = Arc::new(Station::new("s", vec!["a".into()], 0, 0.0).unwrap());
        {
            let mut state = station.lock();
            state.queue.push_back(chunk(30.0));
            state.queue.push_back(chunk(30.0));
        }

        let popped = engine(&station).dequeue().unwrap();
        assert_eq!(popped.effective_advance, 30.0);

        // The popped chunk transmits for its whole duration; production must
        // still see its span and plan the next window at 60, not re-cut 30.
        let state = station.lock();
        assert!(state.in_flight.is_some());
        assert_eq!(state.next_start(), 60.0);
    }

    #[test]
    fn advance_releases_the_claim_and_folds_the_offset() {
        let station = Arc::new(Station::new("s", vec!["a".into()], 0, 0.0).unwrap());
        station.lock().queue.push_back(chunk(30.0));

        let engine = engine(&station);
        let popped = engine.dequeue().unwrap();
        engine.advance(&popped);

        let state = station.lock();
        assert!(state.in_flight.is_none());
        assert_eq!(state.current_offset, 30.0);
        assert_eq!(state.next_start(), 30.0);
    }
}
