//! Group membership tracking for bulk expiry
//!
//! At most one group is open at a time. Documents added while a group is
//! open become members of it. Closing a group seals its membership;
//! expiring a sealed group hands its members back for deletion and
//! forgets the group.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::{Result, SluiceError};

use super::types::{DocId, GroupId};

#[derive(Debug, Default)]
struct GroupState {
    open: Option<(GroupId, Vec<DocId>)>,
    sealed: BTreeMap<GroupId, Vec<DocId>>,
}

#[derive(Debug, Default)]
pub struct GroupManager {
    state: Mutex<GroupState>,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_group(&self, id: GroupId) -> Result<()> {
        let mut state = self.state.lock();
        if let Some((current, _)) = &state.open {
            return Err(SluiceError::GroupAlreadyOpen(*current));
        }
        if state.sealed.contains_key(&id) {
            return Err(SluiceError::DuplicateGroup(id));
        }
        state.open = Some((id, Vec::new()));
        Ok(())
    }

    /// Seal the open group, returning its id. No-op when none is open.
    pub fn close_group(&self) -> Option<GroupId> {
        let mut state = self.state.lock();
        let (id, members) = state.open.take()?;
        state.sealed.insert(id, members);
        Some(id)
    }

    /// Add `doc_id` to the open group, if any, returning that group
    pub fn record(&self, doc_id: DocId) -> Option<GroupId> {
        let mut state = self.state.lock();
        let (id, members) = state.open.as_mut()?;
        members.push(doc_id);
        Some(*id)
    }

    /// Remove a sealed group and return its members
    pub fn take_for_expiry(&self, id: GroupId) -> Result<Vec<DocId>> {
        self.state
            .lock()
            .sealed
            .remove(&id)
            .ok_or(SluiceError::GroupNotClosed(id))
    }

    pub fn current(&self) -> Option<GroupId> {
        self.state.lock().open.as_ref().map(|(id, _)| *id)
    }

    pub fn sealed_groups(&self) -> Vec<GroupId> {
        self.state.lock().sealed.keys().copied().collect()
    }

    pub fn members(&self, id: GroupId) -> Option<Vec<DocId>> {
        let state = self.state.lock();
        match &state.open {
            Some((open, members)) if *open == id => Some(members.clone()),
            _ => state.sealed.get(&id).cloned(),
        }
    }
}
