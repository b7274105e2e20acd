//! HTTP API handlers for psv-server

pub mod assets;
pub mod error;
pub mod health;
pub mod survey;
pub mod ui;

pub use assets::get_item_asset;
pub use error::ApiError;
pub use health::health_routes;
pub use survey::{export_responses, get_summary, get_survey, get_view, reset, submit};
pub use ui::{serve_app_js, serve_index};
