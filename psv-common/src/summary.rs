//! Participant-level aggregate over the response log
//!
//! Read-only: summarizing never touches sessions or the log contents.

use crate::judgment::Judgment;
use crate::store::{Response, ResponseStore};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which judgments count as a match
///
/// The polarity is a survey choice: a "fooled by AI" survey counts picks of
/// the candidate side, a "spot the original" survey counts ground-truth picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReference {
    GroundTruth,
    Candidate,
    ScoreAtLeast(i64),
}

impl MatchReference {
    pub fn matches(&self, judgment: &Judgment) -> bool {
        match (self, judgment) {
            (MatchReference::GroundTruth, Judgment::Choice { .. }) => {
                judgment.picked_ground_truth() == Some(true)
            }
            (MatchReference::Candidate, Judgment::Choice { .. }) => {
                judgment.picked_ground_truth() == Some(false)
            }
            (MatchReference::ScoreAtLeast(threshold), Judgment::Score(score)) => {
                score >= threshold
            }
            _ => false,
        }
    }
}

/// Aggregate for one participant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub participant_id: String,
    pub total_responses: usize,
    pub matches: usize,
    /// `None` when the participant has no responses
    pub match_rate: Option<f64>,
}

impl Summary {
    /// Fold the participant's rows out of `responses`
    pub fn from_responses<'a>(
        participant_id: &str,
        reference: MatchReference,
        responses: impl IntoIterator<Item = &'a Response>,
    ) -> Self {
        let (total, matches) = responses
            .into_iter()
            .filter(|r| r.participant_id == participant_id)
            .fold((0usize, 0usize), |(total, matches), r| {
                (total + 1, matches + usize::from(reference.matches(&r.judgment)))
            });

        Self {
            participant_id: participant_id.to_string(),
            total_responses: total,
            matches,
            match_rate: (total > 0).then(|| matches as f64 / total as f64),
        }
    }

    /// Match rate as a rounded percentage
    pub fn match_percent(&self) -> Option<f64> {
        self.match_rate.map(|rate| (rate * 1000.0).round() / 10.0)
    }
}

/// Computes summaries on demand from the shared store
pub struct ScoreSummarizer {
    store: Arc<dyn ResponseStore>,
    reference: MatchReference,
}

impl ScoreSummarizer {
    pub fn new(store: Arc<dyn ResponseStore>, reference: MatchReference) -> Self {
        Self { store, reference }
    }

    pub fn reference(&self) -> MatchReference {
        self.reference
    }

    pub async fn summarize(&self, participant_id: &str) -> Result<Summary> {
        let responses = self.store.read_all().await?;
        Ok(Summary::from_responses(
            participant_id,
            self.reference,
            &responses,
        ))
    }
}
