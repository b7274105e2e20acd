//! Per-participant progress
//!
//! A [`Session`] is private to one participant identity. The [`SessionRegistry`]
//! maps identities to sessions and is owned by the controller; sessions live
//! until an explicit reset or process restart.

use crate::pairing::PresentationOrder;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// One participant's progress through the item sequence
#[derive(Debug, Clone)]
pub struct Session {
    participant_id: String,
    cursor: usize,
    total: usize,
    presentation_orders: HashMap<String, PresentationOrder>,
    /// Index shown by the most recent render
    rendered: Option<usize>,
    /// Incremented on every reset
    pass: u64,
}

impl Session {
    pub fn new(participant_id: impl Into<String>, total: usize) -> Self {
        Self {
            participant_id: participant_id.into(),
            cursor: 0,
            total,
            presentation_orders: HashMap::new(),
            rendered: None,
            pass: 0,
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn pass(&self) -> u64 {
        self.pass
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == self.total
    }

    /// Move to the next item
    ///
    /// Fails with `OutOfRange` once every item has been answered.
    pub fn advance(&mut self) -> Result<usize> {
        if self.cursor >= self.total {
            return Err(Error::OutOfRange {
                cursor: self.cursor,
                total: self.total,
            });
        }
        self.cursor += 1;
        Ok(self.cursor)
    }

    /// Back to the first item with fresh placements
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.presentation_orders.clear();
        self.rendered = None;
        self.pass += 1;
    }

    pub fn presentation_order(&self, item_id: &str) -> Option<PresentationOrder> {
        self.presentation_orders.get(item_id).copied()
    }

    pub(crate) fn remember_order(&mut self, item_id: &str, order: PresentationOrder) {
        self.presentation_orders.insert(item_id.to_string(), order);
    }

    /// Record that the current item has been shown to the participant
    pub fn mark_rendered(&mut self) {
        self.rendered = Some(self.cursor);
    }

    pub fn rendered(&self) -> Option<usize> {
        self.rendered
    }
}

/// Shared handle to one participant's session
pub type SessionHandle = Arc<Mutex<Session>>;

/// Registry of live sessions keyed by participant identity
pub struct SessionRegistry {
    total_items: usize,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(total_items: usize) -> Self {
        Self {
            total_items,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// Existing session, or a new one at cursor 0
    pub async fn get(&self, participant_id: &str) -> SessionHandle {
        if let Some(handle) = self.find(participant_id).await {
            return handle;
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(participant_id.to_string()).or_insert_with(|| {
            debug!("New session for participant {}", participant_id);
            Arc::new(Mutex::new(Session::new(participant_id, self.total_items)))
        }))
    }

    /// Existing session only
    pub async fn find(&self, participant_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(participant_id).cloned()
    }

    /// Advance an existing session by one item
    pub async fn advance(&self, participant_id: &str) -> Result<usize> {
        let handle = self.existing(participant_id).await?;
        let mut session = handle.lock().await;
        session.advance()
    }

    /// Reset an existing session to cursor 0
    pub async fn reset(&self, participant_id: &str) -> Result<()> {
        let handle = self.existing(participant_id).await?;
        handle.lock().await.reset();
        Ok(())
    }

    pub async fn is_complete(&self, participant_id: &str) -> bool {
        match self.find(participant_id).await {
            Some(handle) => handle.lock().await.is_complete(),
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn existing(&self, participant_id: &str) -> Result<SessionHandle> {
        self.find(participant_id).await.ok_or_else(|| {
            Error::InvalidAction(format!("No session for participant '{}'", participant_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_stops_at_total() {
        let mut session = Session::new("alice", 2);
        assert_eq!(session.advance().unwrap(), 1);
        assert_eq!(session.advance().unwrap(), 2);
        assert!(session.is_complete());

        let err = session.advance().unwrap_err();
        assert!(matches!(err, Error::OutOfRange { cursor: 2, total: 2 }));
        assert_eq!(session.cursor(), 2);
    }

    #[test]
    fn test_reset_clears_orders_and_bumps_pass() {
        let mut session = Session::new("alice", 3);
        session.remember_order("a", PresentationOrder::new(true));
        session.mark_rendered();
        session.advance().unwrap();

        session.reset();

        assert_eq!(session.cursor(), 0);
        assert_eq!(session.presentation_order("a"), None);
        assert_eq!(session.rendered(), None);
        assert_eq!(session.pass(), 1);
    }

    #[test]
    fn test_empty_catalog_session_is_complete() {
        let session = Session::new("alice", 0);
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn test_registry_get_creates_once() {
        let registry = SessionRegistry::new(3);
        assert!(registry.find("alice").await.is_none());

        let first = registry.get("alice").await;
        first.lock().await.advance().unwrap();
        let second = registry.get("alice").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.cursor(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_registry_operations_require_session() {
        let registry = SessionRegistry::new(3);
        assert!(matches!(
            registry.advance("bob").await,
            Err(Error::InvalidAction(_))
        ));
        assert!(matches!(
            registry.reset("bob").await,
            Err(Error::InvalidAction(_))
        ));
        assert!(!registry.is_complete("bob").await);
    }

    #[tokio::test]
    async fn test_registry_advance_and_reset() {
        let registry = SessionRegistry::new(1);
        registry.get("carol").await;
        assert_eq!(registry.advance("carol").await.unwrap(), 1);
        assert!(registry.is_complete("carol").await);

        registry.reset("carol").await.unwrap();
        assert!(!registry.is_complete("carol").await);
    }
}
