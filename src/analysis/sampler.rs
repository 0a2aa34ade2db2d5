use anyhow::Context;
use std::time::Duration;

use super::diff::{DiffEngine, SplitLine};
use super::series::{DiffSample, TimeSeries, TimestampMode};
use super::timing::{Clock, SystemClock, TimerHandle, TimerQueue};
use crate::encode::ffmpeg::MotionMapSink;
use crate::error::{AnalysisError, DiffError};
use crate::export::csv::CsvExporter;
use crate::render::frame::{FramePair, PixelFrame};
use crate::render::raster::{scaled_dimensions, FrameRenderer};
use crate::video::source::VideoSource;

/// External collaborators a run talks to.
pub struct RunContext {
    pub source: Box<dyn VideoSource>,
    pub renderer: Box<dyn FrameRenderer>,
    pub exporter: CsvExporter,
    pub motion_map: Option<Box<dyn MotionMapSink>>,
}

/// Outcome of a single [`FrameSampler::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A frame was captured and another cycle is scheduled.
    Captured { time: f64, duration: f64, samples: usize },
    /// The video ended and the series was exported.
    Finished(RunSummary),
    /// No run is in progress.
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub samples: usize,
    pub cycles: u64,
    pub file_name: String,
    pub elapsed: Duration,
}

struct ActiveRun {
    interval: Duration,
    started: Duration,
    cycles: u64,
}

/// Walks the video timeline at a target rate, differencing each captured
/// frame against the previous one.
///
/// All state of a run lives here; `start` and `stop` are the only ways to
/// begin or abandon one. Cycles are driven from a single thread by
/// [`step`](Self::step), which sleeps until the pending timer is due.
pub struct FrameSampler<C: Clock = SystemClock> {
    clock: C,
    engine: DiffEngine,
    analysis_width: Option<u32>,
    split: SplitLine,
    timers: TimerQueue,
    pending: Option<TimerHandle>,
    run: Option<ActiveRun>,
    frames: Option<FramePair>,
    motion: Option<PixelFrame>,
    series: TimeSeries,
}

impl<C: Clock> FrameSampler<C> {
    pub fn new(clock: C, engine: DiffEngine) -> Self {
        Self {
            clock,
            engine,
            analysis_width: None,
            split: SplitLine::default(),
            timers: TimerQueue::new(),
            pending: None,
            run: None,
            frames: None,
            motion: None,
            series: TimeSeries::new(),
        }
    }

    /// Downscale captured frames to this width before differencing.
    pub fn with_analysis_width(mut self, width: Option<u32>) -> Self {
        self.analysis_width = width;
        self
    }

    #[allow(dead_code)]
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    /// Takes effect from the next captured frame.
    #[allow(dead_code)]
    pub fn set_split_line(&mut self, split: SplitLine) {
        self.split = split;
    }

    /// Begin a run: reset the series and previous frame, rewind and play the
    /// source, and schedule the first capture immediately.
    pub fn start(&mut self, ctx: &mut RunContext, fps: f64, split: SplitLine) -> Result<(), AnalysisError> {
        if self.run.is_some() {
            return Err(AnalysisError::AlreadyRunning);
        }
        if !(fps.is_finite() && fps > 0.0) {
            return Err(AnalysisError::InvalidFrameRate(fps));
        }

        self.split = split;
        self.series.reset();
        self.motion = None;

        let (native_width, native_height) = ctx.source.dimensions();
        let (width, height) = scaled_dimensions(native_width, native_height, self.analysis_width);
        let has_raster = width > 0 && height > 0;
        if has_raster {
            if let Some(frames) = self.frames.as_mut() {
                frames.reset(width, height).map_err(AnalysisError::Playback)?;
            } else {
                self.frames = Some(FramePair::new(width, height).map_err(AnalysisError::Playback)?);
            }
            if ctx.motion_map.is_some() {
                self.motion = Some(PixelFrame::new(width, height).map_err(AnalysisError::Playback)?);
            }
        } else {
            self.frames = None;
        }

        ctx.source.seek(0.0).map_err(AnalysisError::Playback)?;
        ctx.source.play().map_err(AnalysisError::Playback)?;

        let now = self.clock.now();
        self.run = Some(ActiveRun {
            interval: Duration::from_secs_f64(1.0 / fps),
            started: now,
            cycles: 0,
        });

        let playable = matches!(ctx.source.duration(), Some(d) if d.is_finite() && d > 0.0);
        if playable && has_raster {
            self.pending = Some(self.timers.schedule(now, Duration::ZERO));
            log::info!(
                "Analysis started: {}x{} raster, {}fps, split at {}% (column {})",
                width,
                height,
                fps,
                split.percent(),
                split.column(width)
            );
        } else {
            log::warn!("Video duration or size unavailable; ending run without capturing");
        }
        Ok(())
    }

    /// Abandon the run: cancel the pending capture and keep the samples
    /// collected so far. Nothing is exported.
    pub fn stop(&mut self) -> bool {
        if self.run.take().is_none() {
            return false;
        }
        self.cancel_pending();
        log::info!("Analysis stopped with {} samples", self.series.len());
        true
    }

    /// Wait for the pending timer and run one capture cycle.
    pub fn step(&mut self, ctx: &mut RunContext) -> Result<Step, AnalysisError> {
        if self.run.is_none() {
            return Ok(Step::Idle);
        }

        // Only the pending capture is ever queued
        loop {
            match self.timers.wait_next(&self.clock) {
                Some(handle) if self.pending == Some(handle) => {
                    self.pending = None;
                    return self.cycle(ctx);
                }
                Some(_) => continue,
                None => return self.finish(ctx).map(Step::Finished),
            }
        }
    }

    /// Step until the run finishes. Returns `None` if no run was in progress
    /// or it was stopped.
    #[allow(dead_code)]
    pub fn run(&mut self, ctx: &mut RunContext) -> Result<Option<RunSummary>, AnalysisError> {
        loop {
            match self.step(ctx)? {
                Step::Captured { .. } => continue,
                Step::Finished(summary) => return Ok(Some(summary)),
                Step::Idle => return Ok(None),
            }
        }
    }

    fn cycle(&mut self, ctx: &mut RunContext) -> Result<Step, AnalysisError> {
        let begin = self.clock.now();

        if let Err(source) = self.capture(ctx) {
            let time = ctx.source.current_time();
            return Err(self.abort(ctx, time, source));
        }

        let time = ctx.source.current_time();
        let duration = ctx.source.duration().unwrap_or(0.0);

        if time < duration {
            let Some(run) = self.run.as_ref() else {
                return Ok(Step::Idle);
            };
            let now = self.clock.now();
            let delay = run.interval.saturating_sub(now.saturating_sub(begin));
            self.pending = Some(self.timers.schedule(now, delay));
            log::debug!("Captured {:.3}s/{:.3}s, next in {:?}", time, duration, delay);
            Ok(Step::Captured {
                time,
                duration,
                samples: self.series.len(),
            })
        } else {
            self.finish(ctx).map(Step::Finished)
        }
    }

    /// Draw the current frame, difference it against the previous one and
    /// record the sample.
    fn capture(&mut self, ctx: &mut RunContext) -> anyhow::Result<()> {
        let run = self.run.as_mut().context("No analysis run in progress")?;
        let frames = self.frames.as_mut().context("Capture buffers not allocated")?;

        ctx.renderer
            .draw(ctx.source.as_mut(), frames.current_mut())
            .context("Failed to draw video frame")?;
        let frame_index = run.cycles;
        run.cycles += 1;

        if let Some((current, previous)) = frames.both() {
            let split_col = self.split.column(current.width());
            let diff = self
                .engine
                .compare(current, previous, split_col, self.motion.as_mut())?;

            let timestamp = match ctx.exporter.timestamps() {
                TimestampMode::Seconds => ctx.source.current_time(),
                TimestampMode::Frame => frame_index as f64,
            };
            self.series.push(DiffSample {
                timestamp,
                left_avg: diff.left_avg,
                right_avg: diff.right_avg,
            });

            let failed = match (ctx.motion_map.as_mut(), self.motion.as_ref()) {
                (Some(sink), Some(map)) => sink.write_frame(map).err(),
                _ => None,
            };
            if let Some(e) = failed {
                log::warn!("Motion map encoding failed, continuing without it: {:#}", e);
                self.motion = None;
                if let Some(sink) = ctx.motion_map.take() {
                    if let Err(e) = sink.finish() {
                        log::warn!("Failed to close motion map: {:#}", e);
                    }
                }
            }
        }

        frames.commit();
        Ok(())
    }

    fn finish(&mut self, ctx: &mut RunContext) -> Result<RunSummary, AnalysisError> {
        self.cancel_pending();
        let Some(run) = self.run.take() else {
            return Err(AnalysisError::Playback(anyhow::anyhow!("No analysis run in progress")));
        };
        self.finish_motion_map(ctx);

        let elapsed = self.clock.now().saturating_sub(run.started);
        log::info!(
            "Analysis execution time: {:.3}s ({} frames, {} samples)",
            elapsed.as_secs_f64(),
            run.cycles,
            self.series.len()
        );

        let file_name = ctx.exporter.export(&self.series)?.to_string();
        Ok(RunSummary {
            samples: self.series.len(),
            cycles: run.cycles,
            file_name,
            elapsed,
        })
    }

    /// End the run after a failed cycle, flushing what was collected.
    fn abort(&mut self, ctx: &mut RunContext, time: f64, source: anyhow::Error) -> AnalysisError {
        self.cancel_pending();
        self.run = None;
        self.finish_motion_map(ctx);

        log::error!("Capture failed at {:.3}s: {:#}", time, source);
        match ctx.exporter.export(&self.series) {
            Ok(name) => log::info!("Flushed {} samples to {}", self.series.len(), name),
            Err(e) => log::warn!("Failed to flush partial results: {:#}", anyhow::Error::new(e)),
        }
        match source.downcast::<DiffError>() {
            Ok(diff) => AnalysisError::Diff(diff),
            Err(source) => AnalysisError::CaptureFailed { time, source },
        }
    }

    fn finish_motion_map(&mut self, ctx: &mut RunContext) {
        if let Some(sink) = ctx.motion_map.take() {
            if let Err(e) = sink.finish() {
                log::warn!("Motion map encoding failed: {:#}", e);
            }
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.timers.cancel(handle);
        }
    }
}
