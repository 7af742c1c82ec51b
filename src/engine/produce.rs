//! Chunk production engine.
//!
//! One task per active station. Each cycle plans the next piece of content,
//! asks the transcoder for it, and enqueues the result for delivery. The
//! transcoder call happens outside the station lock; only the short state
//! transitions around it take the lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use airwave_av::{ChunkOutput, ChunkRequest, LoudnessParams, SourceVideo};
use airwave_db::pool::{get_conn, DbPool};
use airwave_db::queries::videos;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::breaks::resolve_breaks;
use crate::config::PlayoutConfig;
use crate::engine::plan::{plan_next, AdBreakPlan, NextAction, PlanInputs, WindowPlan};
use crate::engine::ChunkTranscoder;
use crate::station::{BufferedChunk, ParameterSets, Station};

pub struct ProductionEngine {
    station: Arc<Station>,
    pool: DbPool,
    transcoder: Arc<dyn ChunkTranscoder>,
    config: Arc<PlayoutConfig>,
}

impl ProductionEngine {
    pub fn new(
        station: Arc<Station>,
        pool: DbPool,
        transcoder: Arc<dyn ChunkTranscoder>,
        config: Arc<PlayoutConfig>,
    ) -> Self {
        Self {
            station,
            pool,
            transcoder,
            config,
        }
    }

    /// Run until the stop signal is raised. Buffered chunk files are flushed
    /// on the way out; the rest of the state stays for the next restart.
    pub async fn run(self, stop: CancellationToken) {
        info!(station = %self.station.name, "production engine started");

        while !stop.is_cancelled() {
            if let Err(e) = self.cycle(&stop).await {
                error!(station = %self.station.name, error = %e, "production cycle failed");
                self.sleep(Duration::from_millis(self.config.poll_interval_ms), &stop)
                    .await;
            }
        }

        self.station.lock().flush_queue();
        info!(station = %self.station.name, "production engine stopped");
    }

    async fn cycle(&self, stop: &CancellationToken) -> anyhow::Result<()> {
        let (video_id, next_start, last_break, buffered_secs, buffered_chunks) = {
            let state = self.station.lock();
            (
                state.current_video().to_string(),
                state.next_start(),
                state.last_break_time,
                state.buffered_secs(),
                state.queue.len(),
            )
        };

        let conn = get_conn(&self.pool)?;
        let video = match self.load_source(&conn, &video_id)? {
            Some(v) => v,
            None => {
                // Unprobed video in the rotation: skip it rather than stall.
                warn!(station = %self.station.name, video = %video_id, "video has no probed duration, rotating past it");
                self.station.lock().advance_rotation();
                return Ok(());
            }
        };
        let breaks = resolve_breaks(&conn, &video_id)?;
        drop(conn);

        let action = plan_next(
            &PlanInputs {
                next_start,
                video_duration: video.duration_secs,
                breaks: &breaks,
                last_break_time: last_break,
                buffered_secs,
                buffered_chunks,
            },
            &self.config,
        );

        match action {
            NextAction::Idle => {
                self.sleep(Duration::from_millis(self.config.poll_interval_ms), stop)
                    .await;
            }
            NextAction::Rotate => {
                let mut state = self.station.lock();
                // Re-check under the lock; delivery may have rotated already.
                if state.current_video() == video_id
                    && state.next_start() >= video.duration_secs - 1e-6
                {
                    debug!(station = %self.station.name, video = %video_id, "video exhausted, rotating");
                    state.advance_rotation();
                }
            }
            NextAction::Regular(window) => {
                let retries = if window.is_final {
                    self.config.extended_retries
                } else {
                    self.config.chunk_retries
                };
                match self.produce_window(&video, &window, retries, stop).await {
                    Some(output) => self.admit(&video, output, false),
                    None => {
                        // A station must never stall on one broken video.
                        error!(
                            station = %self.station.name,
                            video = %video.id,
                            start = window.start_secs,
                            "chunk retries exhausted, forcing rotation"
                        );
                        self.station.lock().advance_rotation();
                    }
                }
            }
            NextAction::AdBreak(plan) => {
                self.serve_ad_break(&video, &plan, stop).await?;
            }
        }

        Ok(())
    }

    async fn serve_ad_break(
        &self,
        video: &SourceVideo,
        plan: &AdBreakPlan,
        stop: &CancellationToken,
    ) -> anyhow::Result<()> {
        // Mark the break served before producing anything so a crashed or
        // slow pass cannot double-insert it.
        self.station.lock().last_break_time = Some(plan.break_time);
        info!(
            station = %self.station.name,
            video = %video.id,
            break_time = plan.break_time,
            "serving ad break"
        );

        if let Some(window) = &plan.fade_out {
            match self
                .produce_window(video, window, self.config.chunk_retries, stop)
                .await
            {
                Some(output) => self.admit(video, output, false),
                // A failed fade window is skipped, not fatal: the break still
                // runs and regular content resumes past it.
                None => warn!(station = %self.station.name, "fade-out chunk failed, skipping"),
            }
        }

        for ad in self.pick_ads(&video.id)? {
            if stop.is_cancelled() {
                return Ok(());
            }
            let window = WindowPlan {
                start_secs: 0.0,
                duration_secs: ad.duration_secs,
                fade: None,
                is_final: true,
            };
            match self
                .produce_window(&ad, &window, self.config.extended_retries, stop)
                .await
            {
                Some(output) => self.admit(&ad, output, true),
                None => warn!(station = %self.station.name, ad = %ad.id, "ad chunk failed, dropping from break"),
            }
        }

        if let Some(window) = &plan.fade_in {
            match self
                .produce_window(video, window, self.config.chunk_retries, stop)
                .await
            {
                Some(output) => self.admit(video, output, false),
                None => warn!(station = %self.station.name, "fade-in chunk failed, skipping"),
            }
        }

        Ok(())
    }

    /// Produce one window with bounded retries and linear backoff.
    /// `None` means the retries are exhausted (or the stop signal fired).
    async fn produce_window(
        &self,
        video: &SourceVideo,
        window: &WindowPlan,
        retries: u32,
        stop: &CancellationToken,
    ) -> Option<ChunkOutput> {
        // The planner already bounds regular windows; ads and fade windows
        // are cut at their full planned length.
        let request = ChunkRequest {
            video: video.clone(),
            start_secs: window.start_secs,
            duration_secs: window.duration_secs,
            fade: window.fade.clone(),
        };

        for attempt in 1..=retries.max(1) {
            if stop.is_cancelled() {
                return None;
            }
            match self.transcoder.produce(&request).await {
                Ok(output) => return Some(output),
                Err(e) => {
                    warn!(
                        station = %self.station.name,
                        video = %video.id,
                        attempt,
                        error = %e,
                        "chunk production failed"
                    );
                    let backoff =
                        Duration::from_millis(self.config.retry_backoff_ms * u64::from(attempt));
                    self.sleep(backoff, stop).await;
                }
            }
        }
        None
    }

    /// Fold a transcoder result into station state: enqueue it, or absorb a
    /// negligible window's time directly into the offset.
    fn admit(&self, video: &SourceVideo, output: ChunkOutput, is_ad: bool) {
        let mut state = self.station.lock();
        match output.segments {
            Some(segments) => {
                // First chunk of a video primes the cached codec
                // configuration the delivery engine prefixes when needed;
                // the cache is keyed so leftover chunks of the previous
                // video keep finding their own.
                if !is_ad && !output.parameter_sets.is_empty() {
                    let stale = state
                        .parameter_sets
                        .as_ref()
                        .map(|ps| ps.video_id != video.id)
                        .unwrap_or(true);
                    if stale {
                        state.parameter_sets = Some(ParameterSets {
                            video_id: video.id.clone(),
                            nalus: output.parameter_sets.clone(),
                        });
                        state.format = output.format.clone();
                    }
                }
                let pass = state.pass;
                state.queue.push_back(BufferedChunk {
                    video_path: segments.video_path,
                    audio_path: segments.audio_path,
                    duration: output.actual_duration,
                    is_ad,
                    video_id: video.id.clone(),
                    source_duration: video.duration_secs,
                    frame_rate: output.frame_rate,
                    // The achieved duration already reflects the consumed
                    // window scaled by encoder rounding.
                    effective_advance: if is_ad { 0.0 } else { output.actual_duration },
                    pass,
                });
            }
            None => {
                if !is_ad {
                    debug!(
                        station = %self.station.name,
                        video = %video.id,
                        consumed = output.actual_duration,
                        "negligible window folded into offset"
                    );
                    state.current_offset += output.actual_duration;
                }
            }
        }
    }

    /// Random distinct ads from the commercial pool, excluding the video the
    /// break interrupts.
    fn pick_ads(&self, current_video: &str) -> anyhow::Result<Vec<SourceVideo>> {
        let conn = get_conn(&self.pool)?;
        let mut ids = videos::videos_with_tag(&conn, &self.config.commercial_tag)?;
        ids.retain(|id| id != current_video);
        ids.shuffle(&mut rand::thread_rng());

        let mut ads = Vec::new();
        for id in ids.iter().take(self.config.ads_per_break) {
            if let Some(ad) = self.load_source(&conn, id)? {
                ads.push(ad);
            }
        }
        Ok(ads)
    }

    fn load_source(
        &self,
        conn: &rusqlite::Connection,
        id: &str,
    ) -> anyhow::Result<Option<SourceVideo>> {
        let video = videos::get_video(conn, id)?;
        let Some(duration_secs) = video.duration_secs else {
            return Ok(None);
        };
        Ok(Some(SourceVideo {
            id: video.id,
            path: PathBuf::from(video.source_path),
            duration_secs,
            loudness: video.loudness.map(|l| LoudnessParams {
                input_i: l.input_i,
                input_tp: l.input_tp,
                input_lra: l.input_lra,
                input_thresh: l.input_thresh,
            }),
        }))
    }

    async fn sleep(&self, duration: Duration, stop: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = stop.cancelled() => {}
        }
    }
}
