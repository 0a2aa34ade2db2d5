use serde::Deserialize;

pub const TIME_HEADER: &str =
    "Time,Left Average Pixel Intensity Difference,Right Average Pixel Intensity Difference";
pub const FRAME_HEADER: &str =
    "Frame number,Left Average Pixel Intensity Difference,Right Average Pixel Intensity Difference";

/// What the first CSV column records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    /// Playback position in seconds.
    #[default]
    Seconds,
    /// Index of the captured frame within the run.
    Frame,
}

impl TimestampMode {
    pub fn header(self) -> &'static str {
        match self {
            TimestampMode::Seconds => TIME_HEADER,
            TimestampMode::Frame => FRAME_HEADER,
        }
    }
}

/// Left/right difference for one processed frame pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiffSample {
    pub timestamp: f64,
    pub left_avg: f64,
    pub right_avg: f64,
}

/// Samples of one analysis run, in capture order.
#[derive(Clone, Debug, Default)]
pub struct TimeSeries {
    samples: Vec<DiffSample>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn push(&mut self, sample: DiffSample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[DiffSample] {
        &self.samples
    }

    /// Header row plus one row per sample, newline separated, no trailing
    /// newline. Floats use the shortest representation that round-trips.
    pub fn to_csv(&self, header: &str) -> String {
        let mut out = String::with_capacity(header.len() + self.samples.len() * 48);
        out.push_str(header);
        for s in &self.samples {
            out.push('\n');
            out.push_str(&format!("{},{},{}", s.timestamp, s.left_avg, s.right_avg));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64, l: f64, r: f64) -> DiffSample {
        DiffSample {
            timestamp: t,
            left_avg: l,
            right_avg: r,
        }
    }

    #[test]
    fn csv_has_header_plus_one_line_per_sample() {
        let mut series = TimeSeries::new();
        for i in 0..5 {
            series.push(sample(i as f64 * 0.04, 1.0, 2.0));
        }
        let csv = series.to_csv(TIME_HEADER);
        assert_eq!(csv.lines().count(), 6);
        assert!(!csv.ends_with('\n'));
        assert_eq!(csv.lines().next(), Some(TIME_HEADER));
    }

    #[test]
    fn empty_series_is_header_only() {
        let csv = TimeSeries::new().to_csv(FRAME_HEADER);
        assert_eq!(csv, FRAME_HEADER);
    }

    #[test]
    fn floats_keep_full_precision() {
        let mut series = TimeSeries::new();
        series.push(sample(0.1 + 0.2, 255.0, 1.0 / 3.0));
        let csv = series.to_csv(TIME_HEADER);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(row, "0.30000000000000004,255,0.3333333333333333");

        let parsed: Vec<f64> = row.split(',').map(|v| v.parse().unwrap()).collect();
        assert_eq!(parsed, vec![0.1 + 0.2, 255.0, 1.0 / 3.0]);
    }

    #[test]
    fn keeps_insertion_order_and_duplicates() {
        let mut series = TimeSeries::new();
        series.push(sample(1.0, 5.0, 5.0));
        series.push(sample(1.0, 5.0, 5.0));
        series.push(sample(0.5, 0.0, 0.0));
        assert_eq!(series.len(), 3);
        assert_eq!(series.samples()[2].timestamp, 0.5);

        series.reset();
        assert!(series.is_empty());
    }
}
