//! Survey state machine
//!
//! `AwaitingIdentity -> InProgress(cursor) -> Complete`, driven by explicit
//! actions that each return the new view. A submit is written to the response
//! store before the cursor moves, so a failed write leaves the participant on
//! the same item and a retry records exactly one row.

use crate::catalog::{Catalog, Item, ItemAssets};
use crate::config::SurveyConfig;
use crate::judgment::{JudgmentInput, JudgmentKind};
use crate::pairing::{PairingEngine, PresentationOrder, Side};
use crate::session::{Session, SessionRegistry};
use crate::store::{Response, ResponseStore};
use crate::summary::{MatchReference, ScoreSummarizer, Summary};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Position within the item sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Items answered so far (also the index of the item on screen)
    pub current: usize,
    pub total: usize,
}

/// Where a participant is in the survey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyState {
    AwaitingIdentity,
    InProgress(usize),
    Complete,
}

/// What the presentation layer should show next
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    InProgress {
        item: Item,
        order: Option<PresentationOrder>,
        progress: Progress,
    },
    Complete {
        progress: Progress,
    },
}

impl View {
    pub fn progress(&self) -> Progress {
        match self {
            View::InProgress { progress, .. } | View::Complete { progress } => *progress,
        }
    }

    pub fn state(&self) -> SurveyState {
        match self {
            View::InProgress { progress, .. } => SurveyState::InProgress(progress.current),
            View::Complete { .. } => SurveyState::Complete,
        }
    }
}

/// One submit action: the judgment for the item at `index`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Index of the item the participant was shown
    pub index: usize,
    #[serde(flatten)]
    pub judgment: JudgmentInput,
}

impl Submission {
    pub fn new(index: usize, judgment: JudgmentInput) -> Self {
        Self { index, judgment }
    }
}

/// Image slot of the item on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSlot {
    Image,
    Side(Side),
}

impl std::str::FromStr for AssetSlot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "image" => Ok(AssetSlot::Image),
            other => other
                .parse::<Side>()
                .map(AssetSlot::Side)
                .map_err(|_| Error::NotFound(format!("Unknown asset slot '{}'", other))),
        }
    }
}

/// Orchestrates catalog, sessions, placements, store and summaries
pub struct SurveyController {
    catalog: Arc<Catalog>,
    sessions: SessionRegistry,
    pairing: PairingEngine,
    judgment: JudgmentKind,
    store: Arc<dyn ResponseStore>,
    summarizer: ScoreSummarizer,
}

impl SurveyController {
    pub fn new(
        catalog: Arc<Catalog>,
        store: Arc<dyn ResponseStore>,
        judgment: JudgmentKind,
        reference: MatchReference,
        pairing: PairingEngine,
    ) -> Self {
        let sessions = SessionRegistry::new(catalog.len());
        let summarizer = ScoreSummarizer::new(Arc::clone(&store), reference);
        Self {
            catalog,
            sessions,
            pairing,
            judgment,
            store,
            summarizer,
        }
    }

    pub fn from_config(
        config: &SurveyConfig,
        catalog: Arc<Catalog>,
        store: Arc<dyn ResponseStore>,
    ) -> Self {
        Self::new(
            catalog,
            store,
            config.judgment.judgment_kind(),
            config.scoring.reference,
            PairingEngine::new(config.pairing.seed),
        )
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn judgment_kind(&self) -> JudgmentKind {
        self.judgment
    }

    pub fn reference(&self) -> MatchReference {
        self.summarizer.reference()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    pub async fn state(&self, participant_id: &str) -> SurveyState {
        let Ok(participant_id) = identity(participant_id) else {
            return SurveyState::AwaitingIdentity;
        };
        match self.sessions.find(participant_id).await {
            Some(handle) => {
                let session = handle.lock().await;
                if session.is_complete() {
                    SurveyState::Complete
                } else {
                    SurveyState::InProgress(session.cursor())
                }
            }
            None => SurveyState::AwaitingIdentity,
        }
    }

    /// Render the participant's current item, starting a session if needed
    ///
    /// Draws the placement for a pair item on first render; later renders of
    /// the same item reuse it.
    pub async fn current_view(&self, participant_id: &str) -> Result<View> {
        let participant_id = identity(participant_id)?;
        let handle = self.sessions.get(participant_id).await;
        let mut session = handle.lock().await;
        Ok(self.render(&mut session))
    }

    /// Current view without drawing placements or marking a render
    pub async fn snapshot(&self, participant_id: &str) -> Option<View> {
        let participant_id = identity(participant_id).ok()?;
        let handle = self.sessions.find(participant_id).await?;
        let session = handle.lock().await;
        Some(self.peek(&session))
    }

    /// Record a judgment for the item on screen and move to the next one
    pub async fn submit(&self, participant_id: &str, submission: &Submission) -> Result<View> {
        let participant_id = identity(participant_id)?;
        let handle = self.sessions.find(participant_id).await.ok_or_else(|| {
            Error::InvalidAction(format!(
                "No survey started for '{}'",
                participant_id
            ))
        })?;

        // Held until the cursor moves so duplicate submits serialize
        let mut session = handle.lock().await;

        if session.is_complete() {
            return Err(Error::InvalidAction(
                "All items have already been answered".to_string(),
            ));
        }
        if submission.index != session.cursor() || session.rendered() != Some(submission.index) {
            return Err(Error::InvalidAction(format!(
                "Item {} is not the item on screen",
                item_number(submission.index)
            )));
        }

        let item = self.catalog.get(session.cursor()).ok_or(Error::OutOfRange {
            cursor: session.cursor(),
            total: self.catalog.len(),
        })?;
        let order = session.presentation_order(&item.id);
        let judgment = self.judgment.validate(item, order, &submission.judgment)?;

        let response = Response::new(participant_id, &item.id, judgment);
        if let Err(e) = self.store.append(&response).await {
            error!(
                "Failed to record {}/{}: {}",
                participant_id, item.id, e
            );
            return Err(e);
        }

        let cursor = session.advance()?;
        debug!(
            "Recorded {}/{} ({} of {})",
            participant_id,
            response.item_id,
            cursor,
            self.catalog.len()
        );

        Ok(self.render(&mut session))
    }

    /// Start over from the first item; recorded responses are kept
    pub async fn reset(&self, participant_id: &str) -> Result<View> {
        let participant_id = identity(participant_id)?;
        let handle = self.sessions.find(participant_id).await.ok_or_else(|| {
            Error::InvalidAction(format!("No survey started for '{}'", participant_id))
        })?;

        let mut session = handle.lock().await;
        session.reset();
        info!("Session reset for {} (pass {})", participant_id, session.pass());
        Ok(self.render(&mut session))
    }

    pub async fn summary(&self, participant_id: &str) -> Result<Summary> {
        let participant_id = identity(participant_id)?;
        self.summarizer.summarize(participant_id).await
    }

    /// Full response log, available once the participant has finished
    pub async fn export(&self, participant_id: &str) -> Result<Vec<u8>> {
        let participant_id = identity(participant_id)?;
        match self.state(participant_id).await {
            SurveyState::Complete => {
                let bytes = self.store.export().await?;
                info!(
                    "Response log exported by {} ({} bytes)",
                    participant_id,
                    bytes.len()
                );
                Ok(bytes)
            }
            _ => Err(Error::InvalidAction(
                "Export is available after the last item".to_string(),
            )),
        }
    }

    /// File behind `slot` of the item currently on screen
    ///
    /// Pair sides resolve through the memoized placement, so the caller never
    /// learns which file is the ground truth.
    pub async fn asset_path(
        &self,
        participant_id: &str,
        index: usize,
        slot: AssetSlot,
    ) -> Result<PathBuf> {
        let participant_id = identity(participant_id)?;
        let handle = self
            .sessions
            .find(participant_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("No session for '{}'", participant_id)))?;
        let session = handle.lock().await;

        if index != session.cursor() {
            return Err(Error::NotFound(format!(
                "Item {} is not on screen",
                item_number(index)
            )));
        }
        let item = self
            .catalog
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("No item {}", item_number(index))))?;

        match (&item.assets, slot) {
            (ItemAssets::Single(path), AssetSlot::Image) => Ok(path.clone()),
            (
                ItemAssets::Pair {
                    ground_truth,
                    candidate,
                },
                AssetSlot::Side(side),
            ) => {
                let order = session.presentation_order(&item.id).ok_or_else(|| {
                    Error::NotFound(format!("Item {} has not been shown", item_number(index)))
                })?;
                if order.ground_truth_side() == side {
                    Ok(ground_truth.clone())
                } else {
                    Ok(candidate.clone())
                }
            }
            _ => Err(Error::NotFound(format!(
                "Item {} has no such image slot",
                item_number(index)
            ))),
        }
    }

    fn render(&self, session: &mut Session) -> View {
        let progress = self.progress(session);
        match self.catalog.get(session.cursor()) {
            Some(item) => {
                let order = self.pairing.order_for(session, item);
                session.mark_rendered();
                View::InProgress {
                    item: item.clone(),
                    order,
                    progress,
                }
            }
            None => View::Complete { progress },
        }
    }

    fn peek(&self, session: &Session) -> View {
        let progress = self.progress(session);
        match self.catalog.get(session.cursor()) {
            Some(item) => View::InProgress {
                item: item.clone(),
                order: session.presentation_order(&item.id),
                progress,
            },
            None => View::Complete { progress },
        }
    }

    fn progress(&self, session: &Session) -> Progress {
        Progress {
            current: session.cursor(),
            total: self.catalog.len(),
        }
    }
}

/// One-based item number for messages; indices come from the client
fn item_number(index: usize) -> usize {
    index.saturating_add(1)
}

/// Trimmed participant identity; blank means no identity yet
fn identity(participant_id: &str) -> Result<&str> {
    let trimmed = participant_id.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidAction(
            "Enter your name or ID to begin".to_string(),
        ));
    }
    Ok(trimmed)
}
