use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

/// Stream metadata needed to play a video back.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Frames per second of the video stream.
    pub frame_rate: f64,
    /// `None` when the container does not report a duration.
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

pub fn probe_video(path: &Path) -> Result<VideoInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,avg_frame_rate,r_frame_rate,duration:format=duration",
            "-of", "json",
        ])
        .arg(path)
        .output()
        .context("Failed to run ffprobe. Is ffmpeg installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffprobe failed for {}:\n{}", path.display(), stderr);
    }

    let json = String::from_utf8(output.stdout).context("ffprobe produced non-UTF-8 output")?;
    let info = parse_probe_json(&json)
        .with_context(|| format!("Failed to read video metadata: {}", path.display()))?;

    log::info!(
        "Video: {}x{} @ {:.3}fps, duration {}",
        info.width,
        info.height,
        info.frame_rate,
        info.duration
            .map(|d| format!("{:.2}s", d))
            .unwrap_or_else(|| "unknown".into())
    );
    Ok(info)
}

fn parse_probe_json(json: &str) -> Result<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json).context("Invalid ffprobe JSON")?;
    let stream = probe.streams.first().context("No video stream found")?;

    let width = stream.width.filter(|&w| w > 0).context("Video width unavailable")?;
    let height = stream.height.filter(|&h| h > 0).context("Video height unavailable")?;

    let frame_rate = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|r| parse_rate(r))
        .context("Video frame rate unavailable")?;

    // Container duration first; some muxers only report it per stream
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds)
        .or_else(|| stream.duration.as_deref().and_then(parse_seconds));

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        duration,
    })
}

/// Parse an ffprobe rational such as `30000/1001`.
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn parse_seconds(value: &str) -> Option<f64> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}
