//! Chunk production: cutting exact-duration A/V segment pairs with ffmpeg.
//!
//! One chunk is a pair of files: a raw H.264 Annex-B elementary stream and an
//! Ogg/Opus audio container, both covering the same source window. The
//! adapter owns the ffmpeg invocation, output validation, and the
//! independently measured achieved duration; scheduling stays upstream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use airwave_bitstream::{group_access_units, nal_type, split_nalus, NalUnitType};
use tracing::{debug, warn};

use crate::command::ToolCommand;
use crate::error::{Error, Result};
use crate::probe::{self, LoudnessParams, Rational};

/// Windows shorter than this produce no segments, only consumed time.
pub const NEGLIGIBLE_FLOOR_SECS: f64 = 0.25;

/// Maximum tolerated audio/video duration skew before an audio re-encode.
const AV_TOLERANCE_SECS: f64 = 0.5;

/// Frame rate assumed when the output probe reports none.
const DEFAULT_FRAME_RATE: Rational = Rational::new(25, 1);

// Output must hold at least this share of the expected frame count to be
// considered plausible.
const MIN_FRAME_RATIO: f64 = 0.5;

/// A source video as the scheduler knows it.
#[derive(Debug, Clone)]
pub struct SourceVideo {
    pub id: String,
    pub path: PathBuf,
    /// Known total duration in seconds.
    pub duration_secs: f64,
    /// Precomputed loudness parameters, when the backfill has run.
    pub loudness: Option<LoudnessParams>,
}

/// Direction of a cross-fade within the cut window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

impl FadeDirection {
    fn ffmpeg_name(self) -> &'static str {
        match self {
            FadeDirection::In => "in",
            FadeDirection::Out => "out",
        }
    }
}

/// Synchronized video+audio fade applied to a chunk.
///
/// Start offsets are relative to the cut window, not the source timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FadeSpec {
    pub direction: FadeDirection,
    /// Fade color name (e.g. "black").
    pub color: String,
    pub video_start: f64,
    pub video_duration: f64,
    pub audio_start: f64,
    pub audio_duration: f64,
}

/// A request to produce one chunk.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub video: SourceVideo,
    /// Window start in source-timeline seconds.
    pub start_secs: f64,
    /// Requested window duration in seconds.
    pub duration_secs: f64,
    pub fade: Option<FadeSpec>,
}

/// The produced segment pair.
#[derive(Debug, Clone)]
pub struct ChunkSegments {
    /// Raw H.264 Annex-B elementary stream.
    pub video_path: PathBuf,
    /// Ogg/Opus audio container.
    pub audio_path: PathBuf,
}

/// Result of producing one chunk.
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    /// `None` when the window was below the negligible floor: time was
    /// consumed but there is nothing to deliver.
    pub segments: Option<ChunkSegments>,
    /// Achieved duration, measured from the output rather than assumed.
    pub actual_duration: f64,
    /// The duration actually requested from ffmpeg after end-of-source
    /// clamping.
    pub requested_duration: f64,
    /// The window reached the end of the source video.
    pub is_final: bool,
    pub frame_rate: Rational,
    /// SPS/PPS NAL units extracted from the produced stream.
    pub parameter_sets: Vec<Vec<u8>>,
    /// Playout format descriptor derived from the parameter sets.
    pub format: Option<String>,
}

/// ffmpeg-backed chunk producer.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    work_dir: PathBuf,
    /// Hard ceiling on one encode run.
    encode_timeout: Duration,
}

impl FfmpegTranscoder {
    /// Create a transcoder with explicit tool paths.
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            work_dir,
            encode_timeout: Duration::from_secs(300),
        }
    }

    /// Create a transcoder by discovering ffmpeg/ffprobe on PATH.
    pub fn discover(work_dir: PathBuf) -> Result<Self> {
        let ffmpeg = crate::tools::require_tool("ffmpeg")?;
        let ffprobe = crate::tools::require_tool("ffprobe")?;
        Ok(Self::new(ffmpeg, ffprobe, work_dir))
    }

    /// Produce one chunk per the request.
    ///
    /// The window is clamped to the source's known duration; a shortened
    /// window marks the chunk final. Windows below [`NEGLIGIBLE_FLOOR_SECS`]
    /// return success with no segments but nonzero `actual_duration`.
    pub async fn produce(&self, req: &ChunkRequest) -> Result<ChunkOutput> {
        if !req.video.path.exists() {
            return Err(Error::source_not_found(&req.video.path));
        }

        let remaining = req.video.duration_secs - req.start_secs;
        if remaining <= 0.0 {
            return Err(Error::InvalidDuration(remaining));
        }

        let is_final = req.duration_secs >= remaining - f64::EPSILON;
        let duration = req.duration_secs.min(remaining);

        if duration < NEGLIGIBLE_FLOOR_SECS {
            debug!(
                video = %req.video.id,
                duration,
                "window below negligible floor, consuming time without output"
            );
            return Ok(ChunkOutput {
                segments: None,
                actual_duration: duration,
                requested_duration: duration,
                is_final,
                frame_rate: DEFAULT_FRAME_RATE,
                parameter_sets: Vec::new(),
                format: None,
            });
        }

        std::fs::create_dir_all(&self.work_dir)?;
        let stem = format!("{}-{}", req.video.id, uuid::Uuid::new_v4());
        let video_path = self.work_dir.join(format!("{stem}.h264"));
        let audio_path = self.work_dir.join(format!("{stem}.ogg"));

        let result = self
            .produce_inner(req, duration, is_final, &video_path, &audio_path)
            .await;

        if result.is_err() {
            let _ = std::fs::remove_file(&video_path);
            let _ = std::fs::remove_file(&audio_path);
        }

        result
    }

    async fn produce_inner(
        &self,
        req: &ChunkRequest,
        duration: f64,
        is_final: bool,
        video_path: &Path,
        audio_path: &Path,
    ) -> Result<ChunkOutput> {
        self.encode(req, duration, video_path, audio_path, false)
            .await?;

        let mut validation = self.validate_video(video_path).await?;
        let probe_info = probe::probe(&self.ffprobe, video_path).await?;
        let frame_rate = probe_info.frame_rate.unwrap_or(DEFAULT_FRAME_RATE);

        let expected_frames = duration * frame_rate.as_f64();
        if !validation.has_keyframe
            || (validation.frame_count as f64) < expected_frames * MIN_FRAME_RATIO
        {
            warn!(
                video = %req.video.id,
                frames = validation.frame_count,
                expected = expected_frames as u64,
                keyframe = validation.has_keyframe,
                "implausible video output, attempting repair re-encode"
            );
            self.encode(req, duration, video_path, audio_path, true)
                .await?;
            validation = self.validate_video(video_path).await?;
            if !validation.has_keyframe {
                return Err(Error::MissingKeyframe {
                    path: video_path.to_path_buf(),
                });
            }
            if validation.frame_count == 0 {
                return Err(Error::InvalidOutput(format!(
                    "no access units in {}",
                    video_path.display()
                )));
            }
        }

        // Measure what we actually achieved rather than trusting the request.
        let mut audio_duration = probe::probe_duration(&self.ffprobe, audio_path).await?;
        let video_duration = validation.frame_count as f64 / frame_rate.as_f64();

        if (video_duration - audio_duration).abs() > AV_TOLERANCE_SECS {
            warn!(
                video = %req.video.id,
                video_duration,
                audio_duration,
                "A/V duration mismatch, re-encoding audio to match"
            );
            self.encode_audio(req, video_duration, audio_path).await?;
            audio_duration = probe::probe_duration(&self.ffprobe, audio_path).await?;
        }

        if audio_duration <= 0.0 {
            return Err(Error::InvalidDuration(audio_duration));
        }

        let format = validation
            .parameter_sets
            .iter()
            .find(|ps| nal_type(ps) == Some(NalUnitType::Sps))
            .map(|sps| format_descriptor(sps));

        Ok(ChunkOutput {
            segments: Some(ChunkSegments {
                video_path: video_path.to_path_buf(),
                audio_path: audio_path.to_path_buf(),
            }),
            actual_duration: audio_duration,
            requested_duration: duration,
            is_final,
            frame_rate,
            parameter_sets: validation.parameter_sets,
            format,
        })
    }

    /// Run the combined video+audio cut.
    async fn encode(
        &self,
        req: &ChunkRequest,
        duration: f64,
        video_path: &Path,
        audio_path: &Path,
        repair: bool,
    ) -> Result<()> {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.timeout(self.encode_timeout);
        cmd.args(["-hide_banner", "-nostats", "-y"]);
        cmd.args(["-ss", &format_secs(req.start_secs)]);
        cmd.args(["-t", &format_secs(duration)]);
        cmd.arg("-i");
        cmd.arg(req.video.path.to_string_lossy());

        // Video output: raw Annex-B elementary stream.
        cmd.args(["-map", "0:v:0", "-c:v", "libx264"]);
        cmd.args(["-preset", "veryfast", "-pix_fmt", "yuv420p"]);
        if repair {
            // Force an IDR on the first frame.
            cmd.args(["-force_key_frames", "0"]);
        }
        if let Some(vf) = self.video_filters(req) {
            cmd.args(["-vf", &vf]);
        }
        cmd.args(["-f", "h264"]);
        cmd.arg(video_path.to_string_lossy());

        // Audio output: Ogg/Opus padded to the exact window.
        cmd.args(["-map", "0:a:0", "-c:a", "libopus"]);
        cmd.args(["-b:a", "128k", "-ar", "48000", "-ac", "2"]);
        cmd.args(["-af", &self.audio_filters(req)]);
        cmd.args(["-t", &format_secs(duration)]);
        cmd.args(["-f", "ogg"]);
        cmd.arg(audio_path.to_string_lossy());

        cmd.execute().await?;
        Ok(())
    }

    /// Re-encode only the audio, padded/truncated to the given duration.
    async fn encode_audio(&self, req: &ChunkRequest, duration: f64, audio_path: &Path) -> Result<()> {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.timeout(self.encode_timeout);
        cmd.args(["-hide_banner", "-nostats", "-y"]);
        cmd.args(["-ss", &format_secs(req.start_secs)]);
        cmd.args(["-t", &format_secs(duration)]);
        cmd.arg("-i");
        cmd.arg(req.video.path.to_string_lossy());
        cmd.args(["-vn", "-c:a", "libopus"]);
        cmd.args(["-b:a", "128k", "-ar", "48000", "-ac", "2"]);
        cmd.args(["-af", &self.audio_filters(req)]);
        cmd.args(["-t", &format_secs(duration)]);
        cmd.args(["-f", "ogg"]);
        cmd.arg(audio_path.to_string_lossy());
        cmd.execute().await?;
        Ok(())
    }

    fn video_filters(&self, req: &ChunkRequest) -> Option<String> {
        let fade = req.fade.as_ref()?;
        if fade.video_duration <= 0.0 {
            return None;
        }
        Some(format!(
            "fade=t={}:st={}:d={}:color={}",
            fade.direction.ffmpeg_name(),
            format_secs(fade.video_start),
            format_secs(fade.video_duration),
            fade.color,
        ))
    }

    fn audio_filters(&self, req: &ChunkRequest) -> String {
        let mut filters = Vec::new();

        if let Some(loudness) = &req.video.loudness {
            filters.push(format!(
                "loudnorm=I=-16:TP=-1.5:LRA=11:measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:linear=true",
                loudness.input_i, loudness.input_tp, loudness.input_lra, loudness.input_thresh,
            ));
        }

        if let Some(fade) = &req.fade {
            if fade.audio_duration > 0.0 {
                filters.push(format!(
                    "afade=t={}:st={}:d={}",
                    fade.direction.ffmpeg_name(),
                    format_secs(fade.audio_start),
                    format_secs(fade.audio_duration),
                ));
            }
        }

        // Always pad so the audio track reaches the full window.
        filters.push("apad".to_string());
        filters.join(",")
    }

    /// Parse the produced elementary stream: parameter sets, frame count,
    /// keyframe presence.
    async fn validate_video(&self, video_path: &Path) -> Result<VideoValidation> {
        let bytes = tokio::fs::read(video_path).await?;
        if bytes.is_empty() {
            return Err(Error::InvalidOutput(format!(
                "empty video output {}",
                video_path.display()
            )));
        }

        let nalus = split_nalus(&bytes);
        if nalus.is_empty() {
            return Err(Error::InvalidOutput(format!(
                "no NAL units in {}",
                video_path.display()
            )));
        }

        let mut parameter_sets = Vec::new();
        let mut has_keyframe = false;
        for nalu in &nalus {
            match nal_type(nalu) {
                Some(NalUnitType::Sps) | Some(NalUnitType::Pps) => {
                    parameter_sets.push(nalu.to_vec());
                }
                Some(NalUnitType::IdrSlice) => has_keyframe = true,
                _ => {}
            }
        }

        let frame_count = group_access_units(&nalus)
            .iter()
            .filter(|au| au.has_vcl())
            .count();

        Ok(VideoValidation {
            parameter_sets,
            frame_count,
            has_keyframe,
        })
    }
}

struct VideoValidation {
    parameter_sets: Vec<Vec<u8>>,
    frame_count: usize,
    has_keyframe: bool,
}

/// Derive the playout format descriptor from an SPS NAL unit.
///
/// The transport negotiates H.264 with the profile-level-id taken from SPS
/// bytes 1-3.
pub fn format_descriptor(sps: &[u8]) -> String {
    if sps.len() >= 4 {
        format!(
            "packetization-mode=1;profile-level-id={:02x}{:02x}{:02x}",
            sps[1], sps[2], sps[3]
        )
    } else {
        "packetization-mode=1".to_string()
    }
}

fn format_secs(secs: f64) -> String {
    format!("{secs:.3}")
}
