use clap::Parser;
use std::path::PathBuf;

use crate::analysis::diff::{DiffMode, SplitLine};
use crate::analysis::series::TimestampMode;
use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "diffline", about = "Left/right motion analysis of a video by frame differencing")]
pub struct Cli {
    /// Input video file
    pub input: PathBuf,

    /// CSV output file. Defaults to <video>_motion_analysis.csv in --out-dir
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for the derived CSV file
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Target sampling rate in frames per second
    #[arg(long, default_value_t = 25.0, value_parser = parse_fps)]
    pub fps: f64,

    /// Split line position as a percentage of the frame width (0-100)
    #[arg(short, long, default_value_t = 50.0, value_parser = parse_split)]
    pub split: f64,

    /// Per-pixel difference measure
    #[arg(long, value_enum, default_value_t = DiffMode::Luma)]
    pub mode: DiffMode,

    /// First CSV column: playback seconds or captured frame number
    #[arg(long, value_enum, default_value_t = TimestampMode::Seconds)]
    pub timestamps: TimestampMode,

    /// Encode the per-pixel difference frames to this video file
    #[arg(long)]
    pub motion_map: Option<PathBuf>,

    /// Downscale frames to this width before differencing
    #[arg(long)]
    pub analysis_width: Option<u32>,

    /// Difference frames on one thread
    #[arg(long)]
    pub sequential: bool,

    /// FFmpeg video codec for the motion map
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format for the motion map
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// Motion map CRF quality (0-51, lower = better)
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Config values apply only where the CLI is still at its default.
    /// Out-of-range fps or split values are ignored with a warning.
    pub fn merge_config(&mut self, cfg: Config) {
        if self.fps == 25.0 {
            if valid_fps(cfg.analysis.fps) {
                self.fps = cfg.analysis.fps;
            } else {
                log::warn!("Ignoring config fps {}: frame rate must be greater than 0", cfg.analysis.fps);
            }
        }
        if self.split == 50.0 {
            match SplitLine::from_percent(cfg.analysis.split) {
                Some(split) => self.split = split.percent(),
                None => log::warn!(
                    "Ignoring config split {}: split must be between 0 and 100",
                    cfg.analysis.split
                ),
            }
        }
        if self.mode == DiffMode::default() { self.mode = cfg.analysis.mode; }
        if self.timestamps == TimestampMode::default() { self.timestamps = cfg.analysis.timestamps; }
        if !self.sequential { self.sequential = !cfg.analysis.parallel; }
        if self.analysis_width.is_none() { self.analysis_width = cfg.analysis.analysis_width; }
        if self.out_dir == PathBuf::from(".") { self.out_dir = cfg.output.dir; }
        if self.codec == "libx264" { self.codec = cfg.motion_map.codec; }
        if self.pix_fmt == "yuv420p" { self.pix_fmt = cfg.motion_map.pix_fmt; }
        if self.crf == 18 { self.crf = cfg.motion_map.crf; }
    }

    pub fn split_line(&self) -> SplitLine {
        SplitLine::from_percent(self.split).unwrap_or_default()
    }
}

fn parse_fps(value: &str) -> Result<f64, String> {
    let fps: f64 = value.parse().map_err(|_| format!("'{}' is not a number", value))?;
    if valid_fps(fps) {
        Ok(fps)
    } else {
        Err("frame rate must be greater than 0".into())
    }
}

fn valid_fps(fps: f64) -> bool {
    fps.is_finite() && fps > 0.0
}

fn parse_split(value: &str) -> Result<f64, String> {
    let pct: f64 = value.parse().map_err(|_| format!("'{}' is not a number", value))?;
    SplitLine::from_percent(pct)
        .map(SplitLine::percent)
        .ok_or_else(|| "split must be between 0 and 100".into())
}
