use rayon::prelude::*;
use serde::Deserialize;
use std::iter::Sum;
use std::ops::Add;

use crate::error::DiffError;
use crate::render::frame::{PixelFrame, CHANNELS};

/// How the per-pixel intensity difference is measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// Absolute difference of the first channel only.
    #[default]
    Luma,
    /// Mean absolute difference of the three color channels, alpha ignored.
    Rgb,
}

impl DiffMode {
    /// Number of channel differences folded into one integer sample.
    fn channels(self) -> u64 {
        match self {
            DiffMode::Luma => 1,
            DiffMode::Rgb => 3,
        }
    }
}

/// Vertical split position as a percentage of the frame width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitLine(f64);

impl SplitLine {
    pub fn from_percent(percent: f64) -> Option<Self> {
        (percent.is_finite() && (0.0..=100.0).contains(&percent)).then_some(Self(percent))
    }

    pub fn percent(self) -> f64 {
        self.0
    }

    /// Pixel column of the split: `floor(width * pct / 100)`, within `[0, width]`.
    pub fn column(self, width: u32) -> u32 {
        ((width as f64 * self.0 / 100.0).floor().max(0.0) as u32).min(width)
    }
}

impl Default for SplitLine {
    fn default() -> Self {
        Self(50.0)
    }
}

/// Average intensity difference on each side of the split.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionDiff {
    pub left_avg: f64,
    pub right_avg: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct RegionSums {
    left: u64,
    right: u64,
}

impl Add for RegionSums {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl Sum for RegionSums {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Stateless frame comparator.
///
/// Differences are summed as integers, so the row-parallel path produces
/// exactly the same averages as the sequential one.
#[derive(Clone, Copy, Debug)]
pub struct DiffEngine {
    pub mode: DiffMode,
    pub parallel: bool,
}

impl DiffEngine {
    pub fn new(mode: DiffMode, parallel: bool) -> Self {
        Self { mode, parallel }
    }

    /// Compare two equally shaped frames split at `split_col`.
    ///
    /// When `map` is given, each of its pixels receives the difference value
    /// in all three color channels with alpha forced opaque.
    pub fn compare(
        &self,
        current: &PixelFrame,
        previous: &PixelFrame,
        split_col: u32,
        map: Option<&mut PixelFrame>,
    ) -> Result<RegionDiff, DiffError> {
        check_shape(current, previous)?;
        if let Some(ref m) = map {
            check_shape(current, m)?;
        }

        let width = current.width();
        let height = current.height();
        let split = split_col.min(width) as usize;
        let row = current.row_bytes();
        let mode = self.mode;
        let cur = current.data();
        let prev = previous.data();

        let sums: RegionSums = match (map, self.parallel) {
            (Some(map), true) => cur
                .par_chunks(row)
                .zip(prev.par_chunks(row))
                .zip(map.data_mut().par_chunks_mut(row))
                .map(|((c, p), m)| row_sums(c, p, split, mode, Some(m)))
                .sum(),
            (Some(map), false) => cur
                .chunks(row)
                .zip(prev.chunks(row))
                .zip(map.data_mut().chunks_mut(row))
                .map(|((c, p), m)| row_sums(c, p, split, mode, Some(m)))
                .sum(),
            (None, true) => cur
                .par_chunks(row)
                .zip(prev.par_chunks(row))
                .map(|(c, p)| row_sums(c, p, split, mode, None))
                .sum(),
            (None, false) => cur
                .chunks(row)
                .zip(prev.chunks(row))
                .map(|(c, p)| row_sums(c, p, split, mode, None))
                .sum(),
        };

        let scale = mode.channels() as f64;
        let left_pixels = split as u64 * height as u64;
        let right_pixels = (width as u64 - split as u64) * height as u64;

        // An empty region has no defined average; report zero
        let average = |sum: u64, pixels: u64| {
            if pixels == 0 {
                0.0
            } else {
                sum as f64 / (pixels as f64 * scale)
            }
        };

        Ok(RegionDiff {
            left_avg: average(sums.left, left_pixels),
            right_avg: average(sums.right, right_pixels),
        })
    }
}

fn check_shape(current: &PixelFrame, other: &PixelFrame) -> Result<(), DiffError> {
    if current.same_shape(other) {
        Ok(())
    } else {
        Err(DiffError::ShapeMismatch {
            current_width: current.width(),
            current_height: current.height(),
            previous_width: other.width(),
            previous_height: other.height(),
        })
    }
}

fn row_sums(
    current: &[u8],
    previous: &[u8],
    split: usize,
    mode: DiffMode,
    mut map: Option<&mut [u8]>,
) -> RegionSums {
    let mut sums = RegionSums::default();

    for (x, (c, p)) in current
        .chunks_exact(CHANNELS)
        .zip(previous.chunks_exact(CHANNELS))
        .enumerate()
    {
        let d = match mode {
            DiffMode::Luma => c[0].abs_diff(p[0]) as u64,
            DiffMode::Rgb => {
                c[0].abs_diff(p[0]) as u64 + c[1].abs_diff(p[1]) as u64 + c[2].abs_diff(p[2]) as u64
            }
        };

        if let Some(m) = map.as_deref_mut() {
            let px = &mut m[x * CHANNELS..(x + 1) * CHANNELS];
            let value = (d as f64 / mode.channels() as f64).round() as u8;
            px[..3].fill(value);
            px[3] = u8::MAX;
        }

        if x < split {
            sums.left += d;
        } else {
            sums.right += d;
        }
    }

    sums
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> PixelFrame {
        let mut frame = PixelFrame::new(width, height).unwrap();
        frame.data_mut().fill(value);
        frame
    }

    /// Deterministic pseudo-random frame.
    fn noise(width: u32, height: u32, seed: u32) -> PixelFrame {
        let mut state = seed;
        let data = (0..width * height * CHANNELS as u32)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            })
            .collect();
        PixelFrame::from_rgba(width, height, data).unwrap()
    }

    fn engines() -> Vec<DiffEngine> {
        let mut all = Vec::new();
        for mode in [DiffMode::Luma, DiffMode::Rgb] {
            for parallel in [false, true] {
                all.push(DiffEngine::new(mode, parallel));
            }
        }
        all
    }

    #[test]
    fn identical_frames_have_no_difference() {
        let frame = noise(16, 9, 7);
        for engine in engines() {
            let diff = engine.compare(&frame, &frame.clone(), 8, None).unwrap();
            assert_eq!(diff, RegionDiff { left_avg: 0.0, right_avg: 0.0 });
        }
    }

    #[test]
    fn split_at_edges_puts_everything_on_one_side() {
        let a = noise(10, 4, 1);
        let b = noise(10, 4, 2);
        for engine in engines() {
            let full = engine.compare(&a, &b, 0, None).unwrap();
            assert_eq!(full.left_avg, 0.0);
            assert!(full.right_avg > 0.0);

            let mirrored = engine.compare(&a, &b, 10, None).unwrap();
            assert_eq!(mirrored.right_avg, 0.0);
            assert_eq!(mirrored.left_avg, full.right_avg);
        }
    }

    #[test]
    fn split_past_width_is_clamped() {
        let a = solid(4, 1, 0);
        let b = solid(4, 1, 40);
        let diff = DiffEngine::new(DiffMode::Luma, false).compare(&a, &b, 99, None).unwrap();
        assert_eq!(diff, RegionDiff { left_avg: 40.0, right_avg: 0.0 });
    }

    #[test]
    fn boundary_column_belongs_to_right_region() {
        let previous = solid(10, 1, 0);
        let mut current = solid(10, 1, 0);
        current.data_mut()[3 * CHANNELS] = 210;

        let diff = DiffEngine::new(DiffMode::Luma, false)
            .compare(&current, &previous, 3, None)
            .unwrap();
        assert_eq!(diff.left_avg, 0.0);
        assert_eq!(diff.right_avg, 210.0 / 7.0);
    }

    #[test]
    fn black_to_white_saturates_both_regions() {
        let black = solid(4, 2, 0);
        let white = solid(4, 2, 255);
        let split = SplitLine::from_percent(50.0).unwrap().column(4);
        for engine in engines() {
            let diff = engine.compare(&white, &black, split, None).unwrap();
            assert_eq!(diff, RegionDiff { left_avg: 255.0, right_avg: 255.0 });
        }
    }

    #[test]
    fn luma_mode_reads_only_first_channel() {
        let previous = solid(2, 1, 0);
        let current = PixelFrame::from_rgba(2, 1, vec![0, 90, 90, 0, 30, 90, 90, 255]).unwrap();

        let luma = DiffEngine::new(DiffMode::Luma, false)
            .compare(&current, &previous, 1, None)
            .unwrap();
        assert_eq!(luma, RegionDiff { left_avg: 0.0, right_avg: 30.0 });

        let rgb = DiffEngine::new(DiffMode::Rgb, false)
            .compare(&current, &previous, 1, None)
            .unwrap();
        assert_eq!(rgb, RegionDiff { left_avg: 60.0, right_avg: 70.0 });
    }

    #[test]
    fn motion_map_holds_channel_average_and_opaque_alpha() {
        let previous = PixelFrame::from_rgba(2, 1, vec![10, 10, 10, 0, 0, 0, 0, 0]).unwrap();
        let current = PixelFrame::from_rgba(2, 1, vec![40, 70, 100, 9, 1, 1, 0, 200]).unwrap();
        for parallel in [false, true] {
            let mut map = PixelFrame::new(2, 1).unwrap();
            DiffEngine::new(DiffMode::Rgb, parallel)
                .compare(&current, &previous, 1, Some(&mut map))
                .unwrap();
            // (30 + 60 + 90) / 3 = 60; (1 + 1 + 0) / 3 rounds to 1
            assert_eq!(map.data(), &[60, 60, 60, 255, 1, 1, 1, 255]);
        }
    }

    #[test]
    fn parallel_matches_sequential_exactly() {
        let a = noise(97, 61, 3);
        let b = noise(97, 61, 4);
        for mode in [DiffMode::Luma, DiffMode::Rgb] {
            let seq = DiffEngine::new(mode, false).compare(&a, &b, 40, None).unwrap();
            let par = DiffEngine::new(mode, true).compare(&a, &b, 40, None).unwrap();
            assert_eq!(seq.left_avg.to_bits(), par.left_avg.to_bits());
            assert_eq!(seq.right_avg.to_bits(), par.right_avg.to_bits());
        }
    }

    #[test]
    fn repeated_calls_are_bit_identical() {
        let a = noise(33, 17, 11);
        let b = noise(33, 17, 12);
        let engine = DiffEngine::new(DiffMode::Rgb, true);
        let first = engine.compare(&a, &b, 13, None).unwrap();
        let second = engine.compare(&a, &b, 13, None).unwrap();
        assert_eq!(first.left_avg.to_bits(), second.left_avg.to_bits());
        assert_eq!(first.right_avg.to_bits(), second.right_avg.to_bits());
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let a = solid(4, 2, 0);
        let b = solid(2, 4, 0);
        let err = DiffEngine::new(DiffMode::Luma, false)
            .compare(&a, &b, 2, None)
            .unwrap_err();
        assert!(matches!(err, DiffError::ShapeMismatch { .. }));
    }

    #[test]
    fn split_line_column_floors_and_validates() {
        let split = SplitLine::from_percent(33.0).unwrap();
        assert_eq!(split.column(10), 3);
        assert_eq!(SplitLine::from_percent(100.0).unwrap().column(7), 7);
        assert_eq!(SplitLine::from_percent(0.0).unwrap().column(7), 0);
        assert!(SplitLine::from_percent(100.5).is_none());
        assert!(SplitLine::from_percent(f64::NAN).is_none());
    }
}
