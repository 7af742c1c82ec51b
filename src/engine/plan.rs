//! Pure scheduling decisions for the production engine.
//!
//! `plan_next` looks at the station's effective position and decides what to
//! produce next: nothing (buffer full), a rotation to the next video, a
//! regular chunk, or a full ad break with optional fade windows. It never
//! touches I/O or station locks, which keeps every branch unit-testable.

use airwave_av::{FadeDirection, FadeSpec};

use crate::breaks::{BreakPoint, FadePhase};
use crate::config::PlayoutConfig;

const POSITION_EPS: f64 = 1e-6;

/// One cut window on the current video's timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPlan {
    pub start_secs: f64,
    pub duration_secs: f64,
    pub fade: Option<FadeSpec>,
    /// The window is expected to reach end-of-video (wider retry bound).
    pub is_final: bool,
}

/// A due ad break: fade out (if any window remains), ads, fade in.
#[derive(Debug, Clone, PartialEq)]
pub struct AdBreakPlan {
    /// Authored break time; recorded as served before production starts.
    pub break_time: f64,
    pub fade_out: Option<WindowPlan>,
    pub fade_in: Option<WindowPlan>,
}

/// The production engine's next move.
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    /// Buffer is at the high-water mark; poll again later.
    Idle,
    /// The current video is exhausted; advance the rotation.
    Rotate,
    Regular(WindowPlan),
    AdBreak(AdBreakPlan),
}

/// Snapshot of the state the planner needs.
#[derive(Debug, Clone)]
pub struct PlanInputs<'a> {
    /// Effective position: offset plus queued advances (see station state).
    pub next_start: f64,
    pub video_duration: f64,
    /// Break points of the current video, sorted ascending.
    pub breaks: &'a [BreakPoint],
    /// Breaks at or before this time are already served this pass.
    pub last_break_time: Option<f64>,
    pub buffered_secs: f64,
    pub buffered_chunks: usize,
}

/// Decide the next production step.
pub fn plan_next(inputs: &PlanInputs<'_>, cfg: &PlayoutConfig) -> NextAction {
    if inputs.buffered_secs >= cfg.buffer_high_water_secs
        && inputs.buffered_chunks >= cfg.buffer_high_water_chunks
    {
        return NextAction::Idle;
    }

    if inputs.next_start >= inputs.video_duration - POSITION_EPS {
        return NextAction::Rotate;
    }

    // First break not yet served this pass through the video. A viewer who
    // joins mid-video has last_break_time primed to the join offset, so
    // breaks behind the join point never fire retroactively.
    let served_until = inputs.last_break_time.unwrap_or(f64::NEG_INFINITY);
    let next_break = inputs.breaks.iter().find(|b| b.time() > served_until);

    if let Some(bp) = next_break {
        // Due when the fade-out window has been reached. Slightly-late
        // triggering after a long chunk is accepted; the served marker keeps
        // the break exactly-once.
        if bp.fade_out_window_start() - inputs.next_start <= 0.0 {
            return NextAction::AdBreak(plan_ad_break(bp, inputs.next_start));
        }
    }

    // Regular chunk: nominal length, shortened to not cross the break or the
    // end of the video.
    let mut duration = cfg.nominal_chunk_secs.min(cfg.max_chunk_secs);
    if let Some(bp) = next_break {
        let to_break = bp.time() - inputs.next_start;
        if to_break > 0.0 {
            duration = duration.min(to_break);
        }
    }
    let to_end = inputs.video_duration - inputs.next_start;
    let is_final = duration >= to_end - POSITION_EPS;
    duration = duration.min(to_end);

    NextAction::Regular(WindowPlan {
        start_secs: inputs.next_start,
        duration_secs: duration,
        fade: None,
        is_final,
    })
}

fn plan_ad_break(bp: &BreakPoint, next_start: f64) -> AdBreakPlan {
    let (time, color, fade_out, fade_in) = match bp {
        BreakPoint::Simple { time } => {
            return AdBreakPlan {
                break_time: *time,
                fade_out: None,
                fade_in: None,
            };
        }
        BreakPoint::Fade {
            time,
            color,
            fade_out,
            fade_in,
        } => (*time, color, fade_out, fade_in),
    };

    // Fade-out window: the minimal span covering both track ranges, clipped
    // to not precede the effective position or go negative.
    let out_raw_start = time + fade_out.earliest_start();
    let out_end = time + fade_out.latest_end();
    let out_start = out_raw_start.max(next_start).max(0.0);
    let out_plan = (out_end - out_start > POSITION_EPS).then(|| WindowPlan {
        start_secs: out_start,
        duration_secs: out_end - out_start,
        fade: Some(fade_spec(FadeDirection::Out, color, fade_out, time, out_start)),
        is_final: false,
    });

    // Resume point after the break: end of what the fade-out emitted, or the
    // break time itself when no fade-out window survived clipping.
    let resume = if out_plan.is_some() {
        out_end
    } else {
        next_start.max(time)
    };

    let in_raw_start = time + fade_in.earliest_start();
    let in_end = time + fade_in.latest_end();
    let in_start = in_raw_start.max(resume);
    let in_plan = (in_end - in_start > POSITION_EPS).then(|| WindowPlan {
        start_secs: in_start,
        duration_secs: in_end - in_start,
        fade: Some(fade_spec(FadeDirection::In, color, fade_in, time, in_start)),
        is_final: false,
    });

    AdBreakPlan {
        break_time: time,
        fade_out: out_plan,
        fade_in: in_plan,
    }
}

/// Translate a break-relative fade phase into window-relative filter offsets.
fn fade_spec(
    direction: FadeDirection,
    color: &str,
    phase: &FadePhase,
    break_time: f64,
    window_start: f64,
) -> FadeSpec {
    let video_start = (break_time + phase.video.start - window_start).max(0.0);
    let video_end = (break_time + phase.video.end - window_start).max(video_start);
    let audio_start = (break_time + phase.audio.start - window_start).max(0.0);
    let audio_end = (break_time + phase.audio.end - window_start).max(audio_start);

    FadeSpec {
        direction,
        color: color.to_string(),
        video_start,
        video_duration: video_end - video_start,
        audio_start,
        audio_duration: audio_end - audio_start,
    }
}
