use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::render::frame::PixelFrame;

/// Receives motion-map frames while a run is in progress.
pub trait MotionMapSink {
    fn write_frame(&mut self, frame: &PixelFrame) -> Result<()>;

    fn finish(self: Box<Self>) -> Result<()>;
}

/// Encoding settings for the motion-map video.
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderSettings {
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
}

pub struct FfmpegEncoder {
    child: Child,
    width: u32,
    height: u32,
}

impl FfmpegEncoder {
    pub fn new(
        output_path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        settings: &EncoderSettings,
    ) -> Result<Self> {
        let args = encoder_args(output_path, width, height, fps, settings)?;

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "Motion map encoder started: {}x{} @ {}fps, codec={}",
            width, height, fps, settings.codec
        );

        Ok(Self { child, width, height })
    }
}

impl MotionMapSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &PixelFrame) -> Result<()> {
        anyhow::ensure!(
            frame.width() == self.width && frame.height() == self.height,
            "Motion map frame is {}x{}, encoder expects {}x{}",
            frame.width(),
            frame.height(),
            self.width,
            self.height
        );
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(frame.data()).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("Motion map encoding complete");
        Ok(())
    }
}

fn encoder_args(
    output_path: &Path,
    width: u32,
    height: u32,
    fps: f64,
    settings: &EncoderSettings,
) -> Result<Vec<String>> {
    let output = output_path
        .to_str()
        .context("Motion map path contains invalid UTF-8")?;

    Ok(vec![
        "-y".to_string(),
        "-v".into(), "error".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", width, height),
        "-framerate".into(), fps.to_string(),
        "-i".into(), "pipe:0".into(),
        "-c:v".into(), settings.codec.clone(),
        "-pix_fmt".into(), settings.pix_fmt.clone(),
        "-crf".into(), settings.crf.to_string(),
        output.to_string(),
    ])
}
