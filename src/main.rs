mod analysis;
mod cli;
mod config;
mod encode;
mod error;
mod export;
mod render;
mod video;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use analysis::diff::DiffEngine;
use analysis::sampler::{FrameSampler, RunContext, Step};
use analysis::timing::SystemClock;
use cli::Cli;
use error::AnalysisError;
use encode::ffmpeg::{EncoderSettings, FfmpegEncoder, MotionMapSink};
use export::csv::{CsvExporter, FileSink};
use render::raster::{scaled_dimensions, RasterRenderer};
use video::source::FfmpegVideoSource;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    if let Some(path) = config::find_config(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cli.merge_config(cfg);
            }
            Err(err) => log::warn!("{:#}", err),
        }
    }

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("diffline - frame differencing motion analysis");
    log::info!("Input: {}", cli.input.display());
    log::info!(
        "Sampling at {}fps, split at {}%, {:?} differences",
        cli.fps, cli.split, cli.mode
    );

    // 1. Open the video
    let source = FfmpegVideoSource::open(&cli.input)?;
    let info = source.info();
    let (width, height) = scaled_dimensions(info.width, info.height, cli.analysis_width);
    if (width, height) != (info.width, info.height) {
        log::info!("Analyzing at {}x{}", width, height);
    }

    // 2. Export destination
    let exporter = match cli.output {
        Some(ref path) => CsvExporter::to_path(path, cli.timestamps)?,
        None => CsvExporter::for_video(
            Box::new(FileSink::new(&cli.out_dir)),
            cli.timestamps,
            Some(&cli.input),
        ),
    };
    log::info!("Output: {}", exporter.file_name());

    // 3. Optional motion map encoder
    let motion_map: Option<Box<dyn MotionMapSink>> = match cli.motion_map {
        Some(ref path) => {
            let settings = EncoderSettings {
                codec: cli.codec.clone(),
                pix_fmt: cli.pix_fmt.clone(),
                crf: cli.crf,
            };
            Some(Box::new(FfmpegEncoder::new(path, width, height, cli.fps, &settings)?))
        }
        None => None,
    };

    let mut ctx = RunContext {
        source: Box::new(source),
        renderer: Box::new(RasterRenderer::new()),
        exporter,
        motion_map,
    };

    let engine = DiffEngine::new(cli.mode, !cli.sequential);
    let mut sampler =
        FrameSampler::new(SystemClock::new(), engine).with_analysis_width(cli.analysis_width);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupted.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("Failed to install Ctrl-C handler")?;
    }

    // 4. Sample until the video ends
    sampler.start(&mut ctx, cli.fps, cli.split_line())?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ms {msg}")?
            .progress_chars("=>-"),
    );

    let summary = loop {
        if interrupted.load(Ordering::SeqCst) {
            sampler.stop();
            if let Some(map) = ctx.motion_map.take() {
                if let Err(e) = map.finish() {
                    log::warn!("Motion map encoding failed: {:#}", e);
                }
            }
            pb.abandon_with_message("interrupted");
            log::warn!(
                "Interrupted; {} samples collected, nothing exported",
                sampler.series().len()
            );
            return Ok(());
        }

        match sampler.step(&mut ctx) {
            Ok(Step::Captured { time, duration, samples }) => {
                pb.set_length((duration * 1000.0) as u64);
                pb.set_position((time * 1000.0) as u64);
                pb.set_message(format!("({} samples)", samples));
            }
            Ok(Step::Finished(summary)) => break summary,
            Ok(Step::Idle) => anyhow::bail!("Analysis ended without a result"),
            Err(AnalysisError::Export(e)) => {
                // The series survives a failed delivery, so try once more
                pb.abandon_with_message("export failed");
                log::warn!("{:#}; retrying export", anyhow::Error::new(e));
                let file_name = ctx.exporter.export(sampler.series())?;
                log::info!("Done! {} samples written to {}", sampler.series().len(), file_name);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    };

    pb.finish_with_message("done");

    let series = sampler.series();
    if !series.is_empty() {
        let samples = series.samples();
        let peak_left = samples.iter().max_by(|a, b| a.left_avg.total_cmp(&b.left_avg));
        let peak_right = samples.iter().max_by(|a, b| a.right_avg.total_cmp(&b.right_avg));
        if let (Some(l), Some(r)) = (peak_left, peak_right) {
            log::info!(
                "Peak motion: left {:.3} at {}, right {:.3} at {}",
                l.left_avg, l.timestamp, r.right_avg, r.timestamp
            );
        }
    }
    log::info!(
        "Done! {} samples from {} frames in {:.1}s, written to {}",
        summary.samples,
        summary.cycles,
        summary.elapsed.as_secs_f64(),
        summary.file_name
    );
    Ok(())
}
