//! Startup metadata backfill.
//!
//! Before a station can schedule a video, its duration must be known and its
//! loudness parameters measured. Both come from the external tools, so the
//! backfill runs them as a bounded-concurrency batch job at startup rather
//! than on the hot scheduling path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use airwave_av::{measure_loudness, probe_duration};
use airwave_db::models::Loudness;
use airwave_db::pool::{get_conn, DbPool};
use airwave_db::queries::videos;

use crate::config::ToolsConfig;

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub probed: usize,
    pub failed: usize,
}

/// Probe duration and measure loudness for every video missing either,
/// running at most `concurrency` subprocess jobs at once.
///
/// Individual video failures are logged and counted, never fatal: a station
/// can run with a partially backfilled library, it just skips the holes.
pub async fn run_backfill(
    pool: &DbPool,
    tools: &ToolsConfig,
    concurrency: usize,
) -> Result<BackfillReport> {
    let pending = {
        let conn = get_conn(pool)?;
        videos::list_videos_missing_metadata(&conn)?
    };
    if pending.is_empty() {
        info!("no videos need metadata backfill");
        return Ok(BackfillReport::default());
    }
    info!(videos = pending.len(), concurrency, "starting metadata backfill");

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(pending.len());

    for video in pending {
        let semaphore = Arc::clone(&semaphore);
        let pool = pool.clone();
        let ffmpeg = tools.ffmpeg.clone();
        let ffprobe = tools.ffprobe.clone();
        handles.push(tokio::spawn(async move {
            // Closing the semaphore is not part of this flow; acquire cannot
            // fail while it is held open by the loop.
            let _permit = semaphore.acquire_owned().await;
            let id = video.id.clone();
            match backfill_one(&pool, &ffmpeg, &ffprobe, &video.id, &video.source_path).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(video = %id, error = %e, "metadata backfill failed");
                    false
                }
            }
        }));
    }

    let mut report = BackfillReport::default();
    for handle in handles {
        match handle.await {
            Ok(true) => report.probed += 1,
            Ok(false) => report.failed += 1,
            Err(e) => {
                warn!(error = %e, "backfill task panicked");
                report.failed += 1;
            }
        }
    }

    info!(probed = report.probed, failed = report.failed, "metadata backfill finished");
    Ok(report)
}

async fn backfill_one(
    pool: &DbPool,
    ffmpeg: &PathBuf,
    ffprobe: &PathBuf,
    id: &str,
    source_path: &str,
) -> Result<()> {
    let path = Path::new(source_path);

    let duration = probe_duration(ffprobe, path).await?;
    let loudness = measure_loudness(ffmpeg, path).await?;

    let conn = get_conn(pool)?;
    videos::set_duration(&conn, id, duration)?;
    videos::set_loudness(
        &conn,
        id,
        &Loudness {
            input_i: loudness.input_i,
            input_tp: loudness.input_tp,
            input_lra: loudness.input_lra,
            input_thresh: loudness.input_thresh,
        },
    )?;
    Ok(())
}
