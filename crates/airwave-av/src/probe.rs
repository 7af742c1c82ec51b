//! FFprobe-based output probing and loudness measurement.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::command::ToolCommand;
use crate::error::{Error, Result};

/// A rational frame rate as reported by ffprobe (`r_frame_rate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            f64::from(self.num) / f64::from(self.den)
        }
    }
}

impl FromStr for Rational {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n, d),
            None => (s, "1"),
        };
        let num = num
            .trim()
            .parse::<u32>()
            .map_err(|e| Error::parse_error("ffprobe", format!("bad frame rate '{s}': {e}")))?;
        let den = den
            .trim()
            .parse::<u32>()
            .map_err(|e| Error::parse_error("ffprobe", format!("bad frame rate '{s}': {e}")))?;
        Ok(Rational { num, den })
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Stream-level facts extracted from a probe pass.
#[derive(Debug, Clone, Default)]
pub struct ProbeInfo {
    /// Container/stream duration in seconds, when reported.
    pub duration_secs: Option<f64>,
    /// Frame rate of the first video stream.
    pub frame_rate: Option<Rational>,
    /// Whether a video stream is present.
    pub has_video: bool,
    /// Whether an audio stream is present.
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Probe a media file with ffprobe.
///
/// Works for both containers (Ogg) and raw elementary streams; raw H.264 has
/// no container duration, so callers derive video timing from frame counts
/// instead.
pub async fn probe(ffprobe: &Path, path: &Path) -> Result<ProbeInfo> {
    let output = ToolCommand::new(ffprobe.to_path_buf())
        .timeout(Duration::from_secs(60))
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path.to_string_lossy())
        .execute()
        .await?;

    let parsed: FfprobeOutput = serde_json::from_str(&output.stdout)?;

    let mut info = ProbeInfo::default();
    info.duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());

    for stream in &parsed.streams {
        match stream.codec_type.as_deref() {
            Some("video") => {
                info.has_video = true;
                if info.frame_rate.is_none() {
                    info.frame_rate = stream
                        .r_frame_rate
                        .as_deref()
                        .and_then(|r| r.parse::<Rational>().ok())
                        .filter(|r| r.num > 0 && r.den > 0);
                }
            }
            Some("audio") => {
                info.has_audio = true;
                if info.duration_secs.is_none() {
                    info.duration_secs = stream
                        .duration
                        .as_deref()
                        .and_then(|d| d.parse::<f64>().ok());
                }
            }
            _ => {}
        }
    }

    Ok(info)
}

/// Probe just the duration of a media file.
///
/// # Errors
///
/// Returns [`Error::InvalidDuration`] when the file reports no usable
/// duration.
pub async fn probe_duration(ffprobe: &Path, path: &Path) -> Result<f64> {
    let info = probe(ffprobe, path).await?;
    match info.duration_secs {
        Some(d) if d > 0.0 => Ok(d),
        Some(d) => Err(Error::InvalidDuration(d)),
        None => Err(Error::InvalidDuration(0.0)),
    }
}

/// Precomputed loudness-normalization parameters (first-pass loudnorm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessParams {
    pub input_i: f64,
    pub input_tp: f64,
    pub input_lra: f64,
    pub input_thresh: f64,
}

#[derive(Debug, Deserialize)]
struct LoudnormJson {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
}

/// Measure a file's loudness with a first-pass `loudnorm` analysis run.
///
/// ffmpeg prints the measurement JSON at the tail of stderr; the media itself
/// is discarded (`-f null`).
pub async fn measure_loudness(ffmpeg: &Path, path: &Path) -> Result<LoudnessParams> {
    let output = ToolCommand::new(ffmpeg.to_path_buf())
        .timeout(Duration::from_secs(600))
        .args(["-hide_banner", "-nostats", "-i"])
        .arg(path.to_string_lossy())
        .args(["-af", "loudnorm=I=-16:TP=-1.5:LRA=11:print_format=json"])
        .args(["-f", "null", "-"])
        .execute()
        .await?;

    let json = extract_trailing_json(&output.stderr).ok_or_else(|| {
        Error::parse_error("ffmpeg", "no loudnorm JSON block in stderr".to_string())
    })?;

    let parsed: LoudnormJson = serde_json::from_str(json)?;
    let field = |name: &str, value: &str| -> Result<f64> {
        value
            .parse::<f64>()
            .map_err(|e| Error::parse_error("ffmpeg", format!("loudnorm {name} '{value}': {e}")))
    };

    Ok(LoudnessParams {
        input_i: field("input_i", &parsed.input_i)?,
        input_tp: field("input_tp", &parsed.input_tp)?,
        input_lra: field("input_lra", &parsed.input_lra)?,
        input_thresh: field("input_thresh", &parsed.input_thresh)?,
    })
}

/// Find the last `{ ... }` block in tool stderr.
fn extract_trailing_json(stderr: &str) -> Option<&str> {
    let end = stderr.rfind('}')?;
    let start = stderr[..end].rfind('{')?;
    Some(&stderr[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_parsing() {
        assert_eq!("30000/1001".parse::<Rational>().unwrap(), Rational::new(30000, 1001));
        assert_eq!("25".parse::<Rational>().unwrap(), Rational::new(25, 1));
        assert!("abc/def".parse::<Rational>().is_err());
        assert!((Rational::new(30000, 1001).as_f64() - 29.97).abs() < 0.01);
    }

    #[test]
    fn trailing_json_extraction() {
        let stderr = "frame= 100 fps=25\n[Parsed_loudnorm_0] \n{\n\t\"input_i\" : \"-23.0\"\n}\n";
        let json = extract_trailing_json(stderr).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.contains("input_i"));
        assert!(extract_trailing_json("no json here").is_none());
    }
}
