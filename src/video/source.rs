use anyhow::{Context, Result};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Instant;

use super::probe::{self, VideoInfo};
use crate::render::frame::CHANNELS;

/// A playable video with a timeline.
pub trait VideoSource {
    /// Playback position in seconds.
    fn current_time(&self) -> f64;

    /// Total length in seconds, if known.
    fn duration(&self) -> Option<f64>;

    /// Native raster size as `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    fn seek(&mut self, time: f64) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    /// RGBA raster at native size for the frame shown at `current_time`.
    fn frame(&mut self) -> Result<&[u8]>;
}

/// Plays a video file in real time by reading decoded RGBA frames from an
/// ffmpeg subprocess.
pub struct FfmpegVideoSource {
    path: PathBuf,
    info: VideoInfo,
    decoder: Option<FrameDecoder>,
    /// Timeline position the decoder was started from.
    origin: f64,
    playing_since: Option<Instant>,
    frame: Vec<u8>,
    /// Index (relative to `origin`) of the frame held in `frame`.
    shown: Option<u64>,
}

impl FfmpegVideoSource {
    pub fn open(path: &Path) -> Result<Self> {
        let info = probe::probe_video(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            frame: vec![0; frame_bytes(&info)],
            info,
            decoder: None,
            origin: 0.0,
            playing_since: None,
            shown: None,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn clamp_to_duration(&self, time: f64) -> f64 {
        match self.info.duration {
            Some(duration) => time.clamp(0.0, duration),
            None => time.max(0.0),
        }
    }

    fn ensure_decoder(&mut self) -> Result<()> {
        if self.decoder.is_none() {
            self.decoder = Some(FrameDecoder::spawn(&self.path, self.origin, frame_bytes(&self.info))?);
            self.shown = None;
        }
        Ok(())
    }
}

impl VideoSource for FfmpegVideoSource {
    fn current_time(&self) -> f64 {
        let elapsed = self
            .playing_since
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.clamp_to_duration(self.origin + elapsed)
    }

    fn duration(&self) -> Option<f64> {
        self.info.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        self.origin = self.clamp_to_duration(time);
        self.decoder = None;
        self.shown = None;
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        log::debug!("Seeked to {:.3}s", self.origin);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.ensure_decoder()?;
        self.playing_since = Some(Instant::now());
        Ok(())
    }

    fn frame(&mut self) -> Result<&[u8]> {
        let target = ((self.current_time() - self.origin) * self.info.frame_rate).floor().max(0.0) as u64;
        self.ensure_decoder()?;
        let decoder = self.decoder.as_mut().context("Video decoder not available")?;

        // Frames between the last shown one and the target are dropped
        while !decoder.finished && self.shown.map_or(true, |n| n < target) {
            if decoder.read_into(&mut self.frame)? {
                self.shown = Some(self.shown.map_or(0, |n| n + 1));
            }
        }

        if self.shown.is_none() {
            anyhow::bail!("No frames could be decoded from {}", self.path.display());
        }
        Ok(&self.frame)
    }
}

fn frame_bytes(info: &VideoInfo) -> usize {
    info.width as usize * info.height as usize * CHANNELS
}

struct FrameDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    scratch: Vec<u8>,
    finished: bool,
}

impl FrameDecoder {
    fn spawn(path: &Path, start: f64, frame_len: usize) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-ss", &format!("{:.6}", start), "-i"])
            .arg(path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        let stdout = child.stdout.take().context("FFmpeg stdout not available")?;
        log::debug!("FFmpeg decoder started at {:.3}s for {}", start, path.display());

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            scratch: vec![0; frame_len],
            finished: false,
        })
    }

    /// Read the next frame into `frame`. Returns false at end of stream, in
    /// which case `frame` is left untouched.
    fn read_into(&mut self, frame: &mut Vec<u8>) -> Result<bool> {
        match self.stdout.read_exact(&mut self.scratch) {
            Ok(()) => {
                std::mem::swap(frame, &mut self.scratch);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.finished = true;
                let status = self.child.wait().context("Failed to wait for ffmpeg")?;
                if !status.success() {
                    anyhow::bail!("FFmpeg decoder exited with {}", status);
                }
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to read frame from ffmpeg"),
        }
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
