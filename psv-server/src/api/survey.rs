//! Participant-facing survey API
//!
//! JSON views carry item ids, slots and progress only. Asset paths and the
//! ground-truth side never leave the server.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use psv_common::config::JudgmentKindName;
use psv_common::{
    Error, ItemKind, MatchReference, Progress, Submission, Summary, SurveyConfig, View,
};
use serde::Serialize;

use super::ApiError;
use crate::AppState;

/// Survey description for the page
#[derive(Debug, Clone, Serialize)]
pub struct SurveyInfo {
    pub title: String,
    pub prompt: String,
    pub judgment: JudgmentInfo,
    pub total_items: usize,
}

/// Judgment control settings
#[derive(Debug, Clone, Serialize)]
pub struct JudgmentInfo {
    pub kind: JudgmentKindName,
    pub min: i64,
    pub max: i64,
    pub default: i64,
    pub low_label: String,
    pub high_label: String,
}

impl SurveyInfo {
    pub fn new(config: &SurveyConfig, total_items: usize) -> Self {
        let j = &config.judgment;
        Self {
            title: config.title.clone(),
            prompt: config.prompt.clone(),
            judgment: JudgmentInfo {
                kind: j.kind,
                min: j.min,
                max: j.max,
                default: j.default,
                low_label: j.low_label.clone(),
                high_label: j.high_label.clone(),
            },
            total_items,
        }
    }
}

/// Blinded view of the participant's state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewResponse {
    InProgress {
        index: usize,
        item_id: String,
        kind: ItemKind,
        /// Image slots to fetch from `/items/:index/:slot`
        slots: Vec<&'static str>,
        progress: Progress,
    },
    Complete {
        progress: Progress,
    },
}

impl From<&View> for ViewResponse {
    fn from(view: &View) -> Self {
        match view {
            View::InProgress { item, progress, .. } => {
                let kind = item.kind();
                let slots = match kind {
                    ItemKind::Single => vec!["image"],
                    ItemKind::Pair => vec!["left", "right"],
                };
                ViewResponse::InProgress {
                    index: progress.current,
                    item_id: item.id.clone(),
                    kind,
                    slots,
                    progress: *progress,
                }
            }
            View::Complete { progress } => ViewResponse::Complete {
                progress: *progress,
            },
        }
    }
}

/// Participant summary
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub participant_id: String,
    pub total_responses: usize,
    pub matches: usize,
    pub match_rate: Option<f64>,
    pub match_percent: Option<f64>,
    pub reference: MatchReference,
}

impl SummaryResponse {
    fn new(summary: Summary, reference: MatchReference) -> Self {
        Self {
            match_percent: summary.match_percent(),
            participant_id: summary.participant_id,
            total_responses: summary.total_responses,
            matches: summary.matches,
            match_rate: summary.match_rate,
            reference,
        }
    }
}

/// Attach the participant's unchanged state to a failed request
async fn failure(state: &AppState, participant: &str, error: Error) -> ApiError {
    let snapshot = state.controller.snapshot(participant).await;
    ApiError::new(error).with_view(snapshot.as_ref().map(ViewResponse::from))
}

/// GET /api/survey
pub async fn get_survey(State(state): State<AppState>) -> Json<SurveyInfo> {
    Json(state.survey.as_ref().clone())
}

/// GET /api/participants/:id/view
///
/// Starts the participant's session on first call.
pub async fn get_view(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> Result<Json<ViewResponse>, ApiError> {
    match state.controller.current_view(&participant).await {
        Ok(view) => Ok(Json(ViewResponse::from(&view))),
        Err(e) => Err(failure(&state, &participant, e).await),
    }
}

/// POST /api/participants/:id/submit
pub async fn submit(
    State(state): State<AppState>,
    Path(participant): Path<String>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Result<Json<ViewResponse>, ApiError> {
    let submission = match payload {
        Ok(Json(submission)) => submission,
        Err(rejection) => {
            let error = Error::Validation(rejection.body_text());
            return Err(failure(&state, &participant, error).await);
        }
    };
    match state.controller.submit(&participant, &submission).await {
        Ok(view) => Ok(Json(ViewResponse::from(&view))),
        Err(e) => Err(failure(&state, &participant, e).await),
    }
}

/// POST /api/participants/:id/reset
pub async fn reset(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> Result<Json<ViewResponse>, ApiError> {
    match state.controller.reset(&participant).await {
        Ok(view) => Ok(Json(ViewResponse::from(&view))),
        Err(e) => Err(failure(&state, &participant, e).await),
    }
}

/// GET /api/participants/:id/summary
pub async fn get_summary(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    match state.controller.summary(&participant).await {
        Ok(summary) => Ok(Json(SummaryResponse::new(
            summary,
            state.controller.reference(),
        ))),
        Err(e) => Err(failure(&state, &participant, e).await),
    }
}

/// GET /api/participants/:id/export
///
/// The full response log as a CSV download, byte for byte.
pub async fn export_responses(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> Result<Response, ApiError> {
    match state.controller.export(&participant).await {
        Ok(bytes) => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"responses.csv\"",
                ),
            ],
            bytes,
        )
            .into_response()),
        Err(e) => Err(failure(&state, &participant, e).await),
    }
}
