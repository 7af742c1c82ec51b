//! Production engine integration tests against a scripted transcoder.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use airwave::config::PlayoutConfig;
use airwave::engine::{ChunkTranscoder, ProductionEngine};
use airwave::station::Station;
use airwave_av::{
    ChunkOutput, ChunkRequest, ChunkSegments, Error as AvError, FadeDirection, Rational,
    NEGLIGIBLE_FLOOR_SECS,
};
use airwave_db::pool::{init_memory_pool, DbPool};
use airwave_db::queries::{annotations, stations, videos};

/// Transcoder stand-in: clamps and floors like the real adapter, records
/// every request, and can be scripted to round durations or fail per video.
struct ScriptedTranscoder {
    requests: Mutex<Vec<ChunkRequest>>,
    /// (window start, achieved duration) overrides.
    rounded: Vec<(f64, f64)>,
    /// Video IDs whose production always fails.
    failing: HashSet<String>,
}

impl ScriptedTranscoder {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            rounded: Vec::new(),
            failing: HashSet::new(),
        }
    }

    fn requests(&self) -> Vec<ChunkRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChunkTranscoder for ScriptedTranscoder {
    async fn produce(&self, request: &ChunkRequest) -> airwave_av::Result<ChunkOutput> {
        self.requests.lock().push(request.clone());

        if self.failing.contains(&request.video.id) {
            return Err(AvError::InvalidOutput("scripted failure".into()));
        }

        let remaining = request.video.duration_secs - request.start_secs;
        if remaining <= 0.0 {
            return Err(AvError::InvalidDuration(remaining));
        }
        let is_final = request.duration_secs >= remaining - f64::EPSILON;
        let requested = request.duration_secs.min(remaining);

        if requested < NEGLIGIBLE_FLOOR_SECS {
            return Ok(ChunkOutput {
                segments: None,
                actual_duration: requested,
                requested_duration: requested,
                is_final,
                frame_rate: Rational::new(25, 1),
                parameter_sets: Vec::new(),
                format: None,
            });
        }

        let actual = self
            .rounded
            .iter()
            .find(|(start, _)| (start - request.start_secs).abs() < 1e-6)
            .map(|(_, actual)| *actual)
            .unwrap_or(requested);

        Ok(ChunkOutput {
            segments: Some(ChunkSegments {
                video_path: PathBuf::from(format!("/tmp/fake-{}.h264", request.start_secs)),
                audio_path: PathBuf::from(format!("/tmp/fake-{}.ogg", request.start_secs)),
            }),
            actual_duration: actual,
            requested_duration: requested,
            is_final,
            frame_rate: Rational::new(25, 1),
            parameter_sets: vec![vec![0x67, 0x42, 0xE0, 0x1F], vec![0x68, 0xCE]],
            format: Some("packetization-mode=1;profile-level-id=42e01f".into()),
        })
    }
}

fn seeded_pool() -> DbPool {
    let pool = init_memory_pool().unwrap();
    {
        let conn = pool.get().unwrap();
        stations::create_station(&conn, "test", 0).unwrap();
        for (id, duration) in [("film", 100.0), ("other", 40.0), ("spot1", 15.0), ("spot2", 15.0)]
        {
            videos::create_video(&conn, id, &format!("/media/{id}.mp4")).unwrap();
            videos::set_duration(&conn, id, duration).unwrap();
        }
        videos::tag_video(&conn, "spot1", "commercial").unwrap();
        videos::tag_video(&conn, "spot2", "commercial").unwrap();
    }
    pool
}

fn spawn_engine(
    station: &Arc<Station>,
    pool: &DbPool,
    transcoder: &Arc<ScriptedTranscoder>,
) -> tokio_util::sync::CancellationToken {
    let stop = station.reissue_stop();
    let engine = ProductionEngine::new(
        Arc::clone(station),
        pool.clone(),
        Arc::clone(transcoder) as Arc<dyn ChunkTranscoder>,
        Arc::new(PlayoutConfig::default()),
    );
    tokio::spawn(engine.run(stop.clone()));
    stop
}

#[tokio::test(start_paused = true)]
async fn ad_break_produces_fade_ads_fade_sequence() {
    let pool = seeded_pool();
    {
        let conn = pool.get().unwrap();
        annotations::add_annotation(
            &conn,
            "film",
            annotations::BREAK_KIND,
            r#"{"type":"fade","time":30,
                "fade_out":{"video":{"start":-1,"end":1},"audio":{"start":-1,"end":1}},
                "fade_in":{"video":{"start":0,"end":2},"audio":{"start":0,"end":2}}}"#,
        )
        .unwrap();
    }

    let mut transcoder = ScriptedTranscoder::new();
    // Encoder rounding: the 20s chunk comes back a second short, leaving the
    // position exactly at the start of the fade-out window.
    transcoder.rounded.push((10.0, 19.0));
    let transcoder = Arc::new(transcoder);

    let station = Arc::new(Station::new("test", vec!["film".into()], 0, 10.0).unwrap());
    let stop = spawn_engine(&station, &pool, &transcoder);

    // Let production run until the buffer high-water mark idles it.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let requests = transcoder.requests();
    assert!(requests.len() >= 6, "expected a full break sequence, got {}", requests.len());

    // Regular chunk shortened to the break time: min(30, 30-10).
    assert_eq!(requests[0].start_secs, 10.0);
    assert_eq!(requests[0].duration_secs, 20.0);
    assert!(requests[0].fade.is_none());

    // Fade-out covers [29, 31).
    assert_eq!(requests[1].start_secs, 29.0);
    assert_eq!(requests[1].duration_secs, 2.0);
    let fade = requests[1].fade.as_ref().unwrap();
    assert_eq!(fade.direction, FadeDirection::Out);
    assert_eq!(fade.video_start, 0.0);
    assert_eq!(fade.video_duration, 2.0);

    // Two distinct ads from the commercial pool, full length, from zero.
    let ad_ids: HashSet<&str> = [requests[2].video.id.as_str(), requests[3].video.id.as_str()]
        .into_iter()
        .collect();
    assert_eq!(ad_ids, HashSet::from(["spot1", "spot2"]));
    for ad in &requests[2..4] {
        assert_eq!(ad.start_secs, 0.0);
        assert_eq!(ad.duration_secs, 15.0);
        assert!(ad.fade.is_none());
    }

    // Fade-in resumes at 31, not re-covering the fade-out's window.
    assert_eq!(requests[4].start_secs, 31.0);
    assert_eq!(requests[4].duration_secs, 1.0);
    let fade = requests[4].fade.as_ref().unwrap();
    assert_eq!(fade.direction, FadeDirection::In);
    assert_eq!(fade.video_duration, 1.0);

    // Regular content resumes past the break, exactly once.
    assert_eq!(requests[5].start_secs, 32.0);
    assert_eq!(requests[5].duration_secs, 30.0);

    {
        let state = station.lock();
        assert_eq!(state.last_break_time, Some(30.0));
        let ad_chunks: Vec<_> = state.queue.iter().filter(|c| c.is_ad).collect();
        assert_eq!(ad_chunks.len(), 2);
        assert!(ad_chunks.iter().all(|c| c.effective_advance == 0.0));
    }

    // Stop flushes the buffer.
    stop.cancel();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(station.lock().queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn negligible_window_folds_into_offset_without_enqueue() {
    let pool = seeded_pool();
    let transcoder = Arc::new(ScriptedTranscoder::new());

    // 0.1s short of the end: below the negligible floor.
    let station = Arc::new(Station::new("test", vec!["film".into()], 0, 99.9).unwrap());
    let stop = spawn_engine(&station, &pool, &transcoder);

    tokio::time::sleep(Duration::from_secs(5)).await;
    stop.cancel();

    let requests = transcoder.requests();
    assert!((requests[0].start_secs - 99.9).abs() < 1e-9);
    // The sliver was consumed, the video rotated, production restarted at 0.
    assert_eq!(requests[1].start_secs, 0.0);

    // Nothing shorter than the floor ever reached the queue.
    let state = station.lock();
    assert!(state
        .queue
        .iter()
        .all(|c| c.duration >= NEGLIGIBLE_FLOOR_SECS));
}

#[tokio::test(start_paused = true)]
async fn single_video_rotation_wraps_onto_itself() {
    let pool = seeded_pool();
    let transcoder = Arc::new(ScriptedTranscoder::new());

    // 30s left of the only video; the wrap must restart it from zero even
    // though the whole previous pass is still buffered.
    let station = Arc::new(Station::new("test", vec!["film".into()], 0, 70.0).unwrap());
    let stop = spawn_engine(&station, &pool, &transcoder);

    tokio::time::sleep(Duration::from_secs(10)).await;
    stop.cancel();

    let requests = transcoder.requests();
    let starts: Vec<f64> = requests.iter().map(|r| r.start_secs).collect();
    assert_eq!(&starts[..4], &[70.0, 0.0, 30.0, 60.0]);

    // Exactly one rotation step, not a storm.
    let state = station.lock();
    assert_eq!(state.index, 0);
    assert_eq!(state.pass, 1);
}

#[tokio::test(start_paused = true)]
async fn long_commercials_are_not_truncated() {
    let pool = init_memory_pool().unwrap();
    {
        let conn = pool.get().unwrap();
        stations::create_station(&conn, "test", 0).unwrap();
        for (id, duration) in [("film", 200.0), ("infomercial", 90.0)] {
            videos::create_video(&conn, id, &format!("/media/{id}.mp4")).unwrap();
            videos::set_duration(&conn, id, duration).unwrap();
        }
        videos::tag_video(&conn, "infomercial", "commercial").unwrap();
        annotations::add_annotation(&conn, "film", annotations::BREAK_KIND, "30").unwrap();
    }

    let transcoder = Arc::new(ScriptedTranscoder::new());
    let station = Arc::new(Station::new("test", vec!["film".into()], 0, 0.0).unwrap());
    let stop = spawn_engine(&station, &pool, &transcoder);

    tokio::time::sleep(Duration::from_secs(10)).await;
    stop.cancel();

    let requests = transcoder.requests();
    let ad = requests
        .iter()
        .find(|r| r.video.id == "infomercial")
        .expect("commercial requested at the break");
    assert_eq!(ad.start_secs, 0.0);
    // Full length: the regular-chunk cap does not apply to ads.
    assert_eq!(ad.duration_secs, 90.0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_force_rotation() {
    let pool = seeded_pool();
    let mut transcoder = ScriptedTranscoder::new();
    transcoder.failing.insert("film".to_string());
    let transcoder = Arc::new(transcoder);

    let station = Arc::new(Station::new(
        "test",
        vec!["film".into(), "other".into()],
        0,
        0.0,
    )
    .unwrap());
    let stop = spawn_engine(&station, &pool, &transcoder);

    tokio::time::sleep(Duration::from_secs(30)).await;
    stop.cancel();

    let requests = transcoder.requests();
    let film_attempts = requests.iter().filter(|r| r.video.id == "film").count();
    let other_attempts = requests.iter().filter(|r| r.video.id == "other").count();

    // Bounded retries on the broken video, then the station moved on.
    assert!(film_attempts >= 3);
    assert!(other_attempts > 0, "station stalled on a broken video");
}
