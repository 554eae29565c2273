use crate::merge;
use crate::paper::{Field, PendingUpdate};
use crate::store::{PaperStore, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("No pending update for paper '{0}'")]
    UnknownUpdate(String),
    #[error("Paper '{0}' is no longer in the library")]
    PaperMissing(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Holds proposed updates until the user accepts or rejects each one.
///
/// Accepting re-reads the library and applies the update to the stored copy
/// with the usual merge rules, so values entered since the update was
/// proposed are kept.
pub struct ConfirmationGate {
    store: Arc<dyn PaperStore>,
    pending: BTreeMap<String, PendingUpdate>,
}

impl ConfirmationGate {
    pub fn new(store: Arc<dyn PaperStore>) -> Self {
        Self {
            store,
            pending: BTreeMap::new(),
        }
    }

    /// Stage an update, replacing any earlier one for the same paper
    pub fn stage(&mut self, update: PendingUpdate) {
        tracing::debug!(paper = %update.paper_id, "update staged");
        self.pending.insert(update.paper_id.clone(), update);
    }

    /// Pending updates ordered by paper id
    pub fn pending(&self) -> impl Iterator<Item = &PendingUpdate> + '_ {
        self.pending.values()
    }

    pub fn get(&self, paper_id: &str) -> Option<&PendingUpdate> {
        self.pending.get(paper_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Ids of the pending updates, for callers that accept or reject in a loop
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    /// Persist the update for `paper_id`, returning the fields that changed.
    ///
    /// On a store error the update stays pending.
    pub async fn accept(&mut self, paper_id: &str) -> Result<Vec<Field>, GateError> {
        let update = self
            .pending
            .get(paper_id)
            .ok_or_else(|| GateError::UnknownUpdate(paper_id.to_string()))?;

        let mut papers = self.store.get_all().await?;
        let Some(paper) = papers.get_mut(paper_id) else {
            self.pending.remove(paper_id);
            return Err(GateError::PaperMissing(paper_id.to_string()));
        };

        let changed = merge::apply(paper, &update.changes);
        if !changed.is_empty() {
            self.store.put_all(&papers).await?;
        }
        self.pending.remove(paper_id);

        tracing::info!(paper = %paper_id, ?changed, "update accepted");
        Ok(changed)
    }

    /// Drop the update for `paper_id` without touching the library
    pub fn reject(&mut self, paper_id: &str) -> Result<PendingUpdate, GateError> {
        let update = self
            .pending
            .remove(paper_id)
            .ok_or_else(|| GateError::UnknownUpdate(paper_id.to_string()))?;
        tracing::info!(paper = %paper_id, "update rejected");
        Ok(update)
    }
}
