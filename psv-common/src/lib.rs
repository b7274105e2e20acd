//! # Perceptual Survey Core
//!
//! Everything a survey deployment needs apart from presentation:
//! - Stimulus discovery and item grouping (catalog)
//! - Per-(session, item) left/right placement (pairing)
//! - Participant progress tracking (session)
//! - Judgment validation and the append-only response log (judgment, store)
//! - Participant summaries (summary)
//! - The survey state machine tying these together (controller)

pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod judgment;
pub mod pairing;
pub mod session;
pub mod store;
pub mod summary;

pub use catalog::{Catalog, CatalogCache, Item, ItemAssets, ItemKind};
pub use config::SurveyConfig;
pub use controller::{AssetSlot, Progress, Submission, SurveyController, SurveyState, View};
pub use error::{Error, Result};
pub use judgment::{Judgment, JudgmentInput, JudgmentKind};
pub use pairing::{PairingEngine, PresentationOrder, Side};
pub use session::{Session, SessionRegistry};
pub use store::{open_store, Response, ResponseStore};
pub use summary::{MatchReference, ScoreSummarizer, Summary};
