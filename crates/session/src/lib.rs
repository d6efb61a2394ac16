//! Rating-session plumbing for light-field quality tests: the sample
//! sequence, the per-participant phase machine and the experiment server
//! client.

use std::path::PathBuf;

mod client;
mod sequence;
mod session;

pub use client::ExperimentClient;
pub use sequence::{TestSample, TestSequence};
pub use session::{Phase, RatingScale, ResultSubmission, Session};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("test id must not be empty")]
    EmptyTestId,
    #[error("test sequence has no samples")]
    EmptySequence,
    #[error("rating scale has no labels")]
    EmptyRatingScale,
    #[error("sequence line {line}: {reason}")]
    Csv { line: usize, reason: String },
    #[error("cannot {action} during the {phase} phase")]
    Phase { action: &'static str, phase: Phase },
    #[error("'{0}' is not on the rating scale")]
    UnknownRating(String),
    #[error("session incomplete: {rated} of {total} samples rated")]
    NotFinished { rated: usize, total: usize },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid server url '{url}': {reason}")]
    Url { url: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
