//! Judgment kinds, validation, and their tabular columns

use crate::catalog::{Item, ItemKind};
use crate::pairing::{PresentationOrder, Side};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// What a participant gives for each item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JudgmentKind {
    /// Integer score in `min..=max`
    Score { min: i64, max: i64 },
    /// Pick one side of a pair item
    ForcedChoice,
}

impl JudgmentKind {
    /// Response log columns for this kind, in row order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            JudgmentKind::Score { .. } => &["user", "item", "score", "recorded_at"],
            JudgmentKind::ForcedChoice => &[
                "user",
                "item",
                "gt_side",
                "choice_side",
                "picked_gt",
                "recorded_at",
            ],
        }
    }

    /// Turn raw input into a judgment, or explain why it is unacceptable
    ///
    /// `order` is the placement the participant saw; forced-choice judgments
    /// record it so the ground-truth side survives in the log.
    pub fn validate(
        &self,
        item: &Item,
        order: Option<PresentationOrder>,
        input: &JudgmentInput,
    ) -> Result<Judgment> {
        match *self {
            JudgmentKind::Score { min, max } => {
                let score = input
                    .score
                    .ok_or_else(|| Error::Validation("A score is required".to_string()))?;
                if score < min || score > max {
                    return Err(Error::Validation(format!(
                        "Score {} outside {}..={}",
                        score, min, max
                    )));
                }
                Ok(Judgment::Score(score))
            }
            JudgmentKind::ForcedChoice => {
                if item.kind() != ItemKind::Pair {
                    return Err(Error::Validation(format!(
                        "Item '{}' is not a pair",
                        item.id
                    )));
                }
                let chosen = input
                    .choice
                    .ok_or_else(|| Error::Validation("Pick a side".to_string()))?;
                let order = order.ok_or_else(|| {
                    Error::InvalidAction(format!("Item '{}' has not been shown", item.id))
                })?;
                Ok(Judgment::Choice {
                    ground_truth_side: order.ground_truth_side(),
                    chosen,
                })
            }
        }
    }
}

/// Raw judgment as submitted by the participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentInput {
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub choice: Option<Side>,
}

impl JudgmentInput {
    pub fn score(score: i64) -> Self {
        Self {
            score: Some(score),
            choice: None,
        }
    }

    pub fn choice(side: Side) -> Self {
        Self {
            score: None,
            choice: Some(side),
        }
    }
}

/// Validated judgment as recorded in the response log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Judgment {
    Score(i64),
    Choice { ground_truth_side: Side, chosen: Side },
}

impl Judgment {
    /// True when a forced choice landed on the ground-truth image
    pub fn picked_ground_truth(&self) -> Option<bool> {
        match self {
            Judgment::Choice {
                ground_truth_side,
                chosen,
            } => Some(ground_truth_side == chosen),
            Judgment::Score(_) => None,
        }
    }

    pub fn score(&self) -> Option<i64> {
        match self {
            Judgment::Score(score) => Some(*score),
            Judgment::Choice { .. } => None,
        }
    }

    /// Judgment-specific cells, in the order of [`JudgmentKind::columns`]
    pub(crate) fn to_cells(&self) -> Vec<String> {
        match self {
            Judgment::Score(score) => vec![score.to_string()],
            Judgment::Choice {
                ground_truth_side,
                chosen,
            } => vec![
                ground_truth_side.as_str().to_string(),
                chosen.as_str().to_string(),
                (ground_truth_side == chosen).to_string(),
            ],
        }
    }

    /// Parse judgment-specific cells written by [`Judgment::to_cells`]
    pub(crate) fn from_cells(kind: &JudgmentKind, cells: &[&str]) -> Result<Self> {
        match kind {
            JudgmentKind::Score { .. } => {
                let [score] = cells else {
                    return Err(malformed(cells));
                };
                let score = score
                    .parse::<i64>()
                    .map_err(|e| Error::Persistence(format!("Bad score '{}': {}", score, e)))?;
                Ok(Judgment::Score(score))
            }
            JudgmentKind::ForcedChoice => {
                let [gt_side, choice_side, _picked_gt] = cells else {
                    return Err(malformed(cells));
                };
                Ok(Judgment::Choice {
                    ground_truth_side: gt_side.parse().map_err(Error::Persistence)?,
                    chosen: choice_side.parse().map_err(Error::Persistence)?,
                })
            }
        }
    }
}

fn malformed(cells: &[&str]) -> Error {
    Error::Persistence(format!("Malformed judgment cells: {:?}", cells))
}
