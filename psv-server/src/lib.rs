//! psv-server library - HTTP presentation boundary for the survey core
//!
//! Exposes getCurrentView / submit / reset / getSummary / export over JSON,
//! serves stimulus bytes by screen slot, and hosts the survey page.

use axum::Router;
use psv_common::{SurveyConfig, SurveyController};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;

use api::assets::AssetCache;
use api::survey::SurveyInfo;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Survey state machine (owns the session registry)
    pub controller: Arc<SurveyController>,
    /// Static survey description served to the page
    pub survey: Arc<SurveyInfo>,
    /// Stimulus bytes, cached after first read
    pub assets: Arc<AssetCache>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: &SurveyConfig, controller: SurveyController) -> Self {
        let survey = SurveyInfo::new(config, controller.catalog().len());
        Self {
            controller: Arc::new(controller),
            survey: Arc::new(survey),
            assets: Arc::new(AssetCache::new()),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let participant = Router::new()
        .route("/api/participants/:id/view", get(api::get_view))
        .route("/api/participants/:id/submit", post(api::submit))
        .route("/api/participants/:id/reset", post(api::reset))
        .route("/api/participants/:id/summary", get(api::get_summary))
        .route("/api/participants/:id/export", get(api::export_responses))
        .route(
            "/api/participants/:id/items/:index/:slot",
            get(api::get_item_asset),
        );

    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .route("/api/survey", get(api::get_survey))
        .merge(api::health_routes());

    Router::new()
        .merge(participant)
        .merge(public)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
