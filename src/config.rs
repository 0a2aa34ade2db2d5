use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::diff::DiffMode;
use crate::analysis::series::TimestampMode;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub motion_map: MotionMapConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_split")]
    pub split: f64,
    #[serde(default)]
    pub mode: DiffMode,
    #[serde(default)]
    pub timestamps: TimestampMode,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub analysis_width: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct MotionMapConfig {
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default = "default_crf")]
    pub crf: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            split: default_split(),
            mode: DiffMode::default(),
            timestamps: TimestampMode::default(),
            parallel: default_parallel(),
            analysis_width: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_dir() }
    }
}

impl Default for MotionMapConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            crf: default_crf(),
        }
    }
}

fn default_fps() -> f64 { 25.0 }
fn default_split() -> f64 { 50.0 }
fn default_parallel() -> bool { true }
fn default_dir() -> PathBuf { PathBuf::from(".") }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_crf() -> u32 { 18 }

/// Explicit path, else `diffline.toml` in the working directory, else the
/// user config locations.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("diffline.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("diffline").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("diffline").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.analysis.fps, 25.0);
        assert_eq!(cfg.analysis.split, 50.0);
        assert!(cfg.analysis.parallel);
        assert_eq!(cfg.motion_map.crf, 18);
        assert_eq!(cfg.output.dir, PathBuf::from("."));
    }

    #[test]
    fn reads_partial_sections() {
        let cfg: Config = toml::from_str(
            r#"
            [analysis]
            mode = "rgb"
            analysis_width = 320

            [motion_map]
            codec = "libx265"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.analysis.mode, DiffMode::Rgb);
        assert_eq!(cfg.analysis.analysis_width, Some(320));
        assert_eq!(cfg.analysis.timestamps, TimestampMode::Seconds);
        assert_eq!(cfg.motion_map.codec, "libx265");
        assert_eq!(cfg.motion_map.pix_fmt, "yuv420p");
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diffline.toml");
        std::fs::write(&path, "[analysis]\nfps = \"fast\"\n").unwrap();
        assert!(load_config(&path).is_err());
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/tmp/custom.toml");
        assert_eq!(find_config(Some(path)), Some(path.to_path_buf()));
    }
}
