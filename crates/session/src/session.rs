use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sequence::{TestSample, TestSequence};
use crate::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the first sample.
    Start,
    /// Between a rating and the next sample becoming visible.
    Loading,
    Presentation,
    Rating,
    End,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::Loading => "loading",
            Phase::Presentation => "presentation",
            Phase::Rating => "rating",
            Phase::End => "end",
        };
        f.write_str(name)
    }
}

/// Ordered labels offered to the participant, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingScale {
    labels: Vec<String>,
}

impl RatingScale {
    pub fn from_labels<I, S>(labels: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(SessionError::EmptyRatingScale);
        }
        Ok(Self { labels })
    }

    /// Absolute category rating.
    pub fn acr() -> Self {
        Self::fixed(&["5 - Excellent", "4 - Good", "3 - Fair", "2 - Poor", "1 - Bad"])
    }

    /// Degradation category (impairment) scale.
    pub fn dsis() -> Self {
        Self::fixed(&[
            "5 - Imperceptible",
            "4 - Perceptible But Not Annoying",
            "3 - Slightly Annoying",
            "2 - Annoying",
            "1 - Very Annoying",
        ])
    }

    fn fixed(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|label| label.to_string()).collect(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|candidate| candidate == label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self::acr()
    }
}

/// Body posted to the results endpoint; `sceneID[i]` was rated `rating[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSubmission {
    #[serde(rename = "testID")]
    pub test_id: String,
    #[serde(rename = "sceneID")]
    pub scene_ids: Vec<String>,
    pub rating: Vec<String>,
}

/// Phase machine for one participant working through a sequence.
#[derive(Debug)]
pub struct Session {
    test_id: String,
    samples: Vec<TestSample>,
    scale: RatingScale,
    cursor: usize,
    phase: Phase,
    presented_at: Option<Instant>,
    scene_ids: Vec<String>,
    ratings: Vec<String>,
}

impl Session {
    pub fn new(
        test_id: &str,
        sequence: TestSequence,
        scale: RatingScale,
    ) -> Result<Self, SessionError> {
        let test_id = test_id.trim();
        if test_id.is_empty() {
            return Err(SessionError::EmptyTestId);
        }
        if sequence.is_empty() {
            return Err(SessionError::EmptySequence);
        }
        Ok(Self {
            test_id: test_id.to_string(),
            samples: sequence.into_samples(),
            scale,
            cursor: 0,
            phase: Phase::Start,
            presented_at: None,
            scene_ids: Vec::new(),
            ratings: Vec::new(),
        })
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn scale(&self) -> &RatingScale {
        &self.scale
    }

    /// Sample being shown, rated, or next up.
    pub fn current(&self) -> Option<&TestSample> {
        self.samples.get(self.cursor)
    }

    /// `(samples rated, total samples)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.ratings.len(), self.samples.len())
    }

    /// Shows the current sample and starts its presentation clock.
    pub fn begin_sample(&mut self, now: Instant) -> Result<&TestSample, SessionError> {
        if !matches!(self.phase, Phase::Start | Phase::Loading) {
            return Err(self.wrong_phase("begin a sample"));
        }
        let sample = self
            .samples
            .get(self.cursor)
            .ok_or(SessionError::EmptySequence)?;
        self.phase = Phase::Presentation;
        self.presented_at = Some(now);
        debug!(
            sample = %sample.sample_id,
            index = self.cursor,
            "presenting sample"
        );
        Ok(sample)
    }

    /// Whether the current sample has been on screen for its full time.
    pub fn presentation_finished(&self, now: Instant) -> bool {
        match (self.phase, self.presented_at, self.current()) {
            (Phase::Presentation, Some(started), Some(sample)) => {
                now.saturating_duration_since(started) >= sample.presentation_time
            }
            _ => false,
        }
    }

    /// Ends the presentation and asks for a rating.
    pub fn start_rating(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Presentation {
            return Err(self.wrong_phase("start rating"));
        }
        self.phase = Phase::Rating;
        Ok(())
    }

    /// Records `label` for the current sample and advances.
    pub fn rate(&mut self, label: &str) -> Result<Phase, SessionError> {
        if self.phase != Phase::Rating {
            return Err(self.wrong_phase("rate"));
        }
        if !self.scale.contains(label) {
            return Err(SessionError::UnknownRating(label.to_string()));
        }
        let sample_id = match self.current() {
            Some(sample) => sample.sample_id.clone(),
            None => return Err(SessionError::EmptySequence),
        };
        info!(sample = %sample_id, rating = label, "recorded rating");
        self.scene_ids.push(sample_id);
        self.ratings.push(label.to_string());
        self.cursor += 1;
        self.presented_at = None;
        self.phase = if self.cursor >= self.samples.len() {
            Phase::End
        } else {
            Phase::Loading
        };
        Ok(self.phase)
    }

    /// Rates using the scale entry at `index`.
    pub fn rate_index(&mut self, index: usize) -> Result<Phase, SessionError> {
        let label = self
            .scale
            .get(index)
            .ok_or_else(|| SessionError::UnknownRating(index.to_string()))?
            .to_string();
        self.rate(&label)
    }

    /// Results once every sample has been rated.
    pub fn submission(&self) -> Result<ResultSubmission, SessionError> {
        if self.phase != Phase::End {
            let (rated, total) = self.progress();
            return Err(SessionError::NotFinished { rated, total });
        }
        Ok(ResultSubmission {
            test_id: self.test_id.clone(),
            scene_ids: self.scene_ids.clone(),
            rating: self.ratings.clone(),
        })
    }

    fn wrong_phase(&self, action: &'static str) -> SessionError {
        SessionError::Phase {
            action,
            phase: self.phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sequence() -> TestSequence {
        TestSequence::from_csv_str(
            "header\na,dir/,a_,2,2,4,4,1.0,2\nb,dir/,b_,3,3,4,4,1.0,0.5\n",
        )
        .unwrap()
    }

    #[test]
    fn empty_test_id_is_rejected() {
        assert!(matches!(
            Session::new("   ", sequence(), RatingScale::acr()),
            Err(SessionError::EmptyTestId)
        ));
        assert!(matches!(
            Session::new("p01", TestSequence::default(), RatingScale::acr()),
            Err(SessionError::EmptySequence)
        ));
    }

    #[test]
    fn walks_every_phase_and_builds_submission() {
        let mut session = Session::new(" p01 ", sequence(), RatingScale::acr()).unwrap();
        assert_eq!(session.phase(), Phase::Start);
        assert!(matches!(
            session.rate("5 - Excellent"),
            Err(SessionError::Phase { .. })
        ));

        let start = Instant::now();
        assert_eq!(session.begin_sample(start).unwrap().sample_id, "a");
        assert!(!session.presentation_finished(start + Duration::from_secs(1)));
        assert!(session.presentation_finished(start + Duration::from_secs(2)));
        session.start_rating().unwrap();
        assert!(matches!(
            session.rate("10 - Sublime"),
            Err(SessionError::UnknownRating(_))
        ));
        assert_eq!(session.rate("4 - Good").unwrap(), Phase::Loading);
        assert!(session.submission().is_err());

        session.begin_sample(start).unwrap();
        session.start_rating().unwrap();
        assert_eq!(session.rate_index(4).unwrap(), Phase::End);
        assert!(session.begin_sample(start).is_err());

        let submission = session.submission().unwrap();
        assert_eq!(submission.test_id, "p01");
        assert_eq!(submission.scene_ids, vec!["a", "b"]);
        assert_eq!(submission.rating, vec!["4 - Good", "1 - Bad"]);
    }

    #[test]
    fn submission_uses_wire_field_names() {
        let submission = ResultSubmission {
            test_id: "p01".into(),
            scene_ids: vec!["a".into()],
            rating: vec!["3 - Fair".into()],
        };
        let json = serde_json::to_value(&submission).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"testID": "p01", "sceneID": ["a"], "rating": ["3 - Fair"]})
        );
    }

    #[test]
    fn scales_are_ordered_best_first() {
        assert_eq!(RatingScale::default(), RatingScale::acr());
        assert_eq!(RatingScale::acr().get(0), Some("5 - Excellent"));
        assert_eq!(RatingScale::dsis().get(4), Some("1 - Very Annoying"));
        assert!(RatingScale::from_labels(Vec::<String>::new()).is_err());
        let scale: RatingScale = serde_json::from_str(r#"["Good","Bad"]"#).unwrap();
        assert_eq!(scale.len(), 2);
    }
}
