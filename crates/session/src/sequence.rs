use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use lightfield::{GridSpec, LoadError};
use rand::prelude::*;

use crate::SessionError;

const COLUMNS: [&str; 9] = [
    "sample_id",
    "lf_directory_path",
    "file_prefix",
    "cam_horizontal",
    "cam_vertical",
    "image_width",
    "image_height",
    "zoom_factor",
    "presentation_time",
];

/// One light field to present and rate.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSample {
    pub sample_id: String,
    pub directory: String,
    pub file_prefix: String,
    pub columns: u32,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
    pub zoom_factor: f32,
    pub presentation_time: Duration,
}

impl TestSample {
    pub fn grid(&self) -> Result<GridSpec, LoadError> {
        GridSpec::new(
            self.directory.clone(),
            self.file_prefix.clone(),
            self.columns,
            self.rows,
            self.width,
            self.height,
        )
    }
}

/// Ordered list of samples for one test run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSequence {
    samples: Vec<TestSample>,
}

impl TestSequence {
    pub fn new(samples: Vec<TestSample>) -> Self {
        Self { samples }
    }

    pub fn from_path(path: &Path) -> Result<Self, SessionError> {
        let text = fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_str(&text)
    }

    /// Parses the sequence CSV. The first line is a header and is skipped
    /// without inspection; blank lines are ignored.
    pub fn from_csv_str(text: &str) -> Result<Self, SessionError> {
        let mut samples = Vec::new();
        for (index, raw) in text.lines().enumerate().skip(1) {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            samples.push(parse_row(index + 1, line)?);
        }
        tracing::debug!(samples = samples.len(), "parsed test sequence");
        Ok(Self { samples })
    }

    /// Seeded Fisher-Yates shuffle.
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        self.shuffle_with(&mut rng);
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.samples.shuffle(rng);
    }

    pub fn samples(&self) -> &[TestSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<TestSample> {
        self.samples
    }
}

fn parse_row(line: usize, row: &str) -> Result<TestSample, SessionError> {
    let fields: Vec<&str> = row.split(',').map(str::trim).collect();
    if fields.len() < COLUMNS.len() {
        return Err(SessionError::Csv {
            line,
            reason: format!(
                "expected {} columns, found {}",
                COLUMNS.len(),
                fields.len()
            ),
        });
    }

    let seconds: f64 = parse_field(line, &fields, 8)?;
    let presentation_time =
        Duration::try_from_secs_f64(seconds).map_err(|err| SessionError::Csv {
            line,
            reason: format!("presentation_time '{}': {err}", fields[8]),
        })?;

    Ok(TestSample {
        sample_id: fields[0].to_string(),
        directory: fields[1].to_string(),
        file_prefix: fields[2].to_string(),
        columns: parse_field(line, &fields, 3)?,
        rows: parse_field(line, &fields, 4)?,
        width: parse_field(line, &fields, 5)?,
        height: parse_field(line, &fields, 6)?,
        zoom_factor: parse_field(line, &fields, 7)?,
        presentation_time,
    })
}

fn parse_field<T>(line: usize, fields: &[&str], column: usize) -> Result<T, SessionError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fields[column].parse().map_err(|err| SessionError::Csv {
        line,
        reason: format!("{} '{}': {err}", COLUMNS[column], fields[column]),
    })
}
