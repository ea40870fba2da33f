//! Torrent list kept in display order
//!
//! Entries are ordered by suggested name as it was when the torrent was
//! inserted. Later state updates never move an entry.

use crate::error::{Error, Result};
use crate::service::UiMessage;
use crate::types::{TorrentId, TorrentState};

#[derive(Debug, Clone)]
pub struct ListEntry<H> {
    sort_key: String,
    state: TorrentState,
    waiting_action: bool,
    pub handle: H,
}

impl<H> ListEntry<H> {
    pub fn id(&self) -> &TorrentId {
        &self.state.id
    }

    pub fn sort_key(&self) -> &str {
        &self.sort_key
    }

    pub fn state(&self) -> &TorrentState {
        &self.state
    }

    /// An action was submitted for this torrent and has not settled yet
    pub fn waiting_action(&self) -> bool {
        self.waiting_action
    }
}

/// Which toolbar actions apply to a selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailableActions {
    pub pause: bool,
    pub resume: bool,
    pub remove: bool,
}

#[derive(Debug, Clone)]
pub struct TorrentList<H> {
    entries: Vec<ListEntry<H>>,
}

impl<H> Default for TorrentList<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> TorrentList<H> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ListEntry<H>> {
        self.entries.iter()
    }

    pub fn position(&self, id: &TorrentId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id() == id)
    }

    pub fn contains(&self, id: &TorrentId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &TorrentId) -> Option<&ListEntry<H>> {
        self.position(id).map(|i| &self.entries[i])
    }

    /// Insert after every entry whose key is not greater, returning the index
    pub fn insert(&mut self, state: TorrentState, handle: H) -> Result<usize> {
        if self.contains(&state.id) {
            return Err(Error::DuplicateTorrent(state.id.to_string()));
        }

        let sort_key = state.suggested_name.clone();
        let mut index = 0;
        for entry in &self.entries {
            if entry.sort_key > sort_key {
                break;
            }
            index += 1;
        }

        self.entries.insert(
            index,
            ListEntry {
                sort_key,
                state,
                waiting_action: false,
                handle,
            },
        );
        Ok(index)
    }

    pub fn remove(&mut self, id: &TorrentId) -> Result<ListEntry<H>> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::UnknownTorrent(id.to_string()))?;
        Ok(self.entries.remove(index))
    }

    /// Replace the state of an entry in place and clear its waiting flag.
    ///
    /// Returns false when the torrent is not in the list.
    pub fn update(&mut self, id: &TorrentId, state: TorrentState) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let entry = &mut self.entries[index];
        entry.state = state;
        entry.waiting_action = false;
        true
    }

    /// Flag an entry as waiting on an action. Returns false if it already was.
    pub fn mark_waiting(&mut self, id: &TorrentId) -> Result<bool> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::UnknownTorrent(id.to_string()))?;
        let entry = &mut self.entries[index];
        if entry.waiting_action {
            return Ok(false);
        }
        entry.waiting_action = true;
        Ok(true)
    }

    /// Clear the waiting flag for an action that settled without a state
    /// update (ignored or failed). Unknown ids are skipped.
    pub fn settle(&mut self, id: &TorrentId) {
        if let Some(index) = self.position(id) {
            self.entries[index].waiting_action = false;
        }
    }

    pub fn available_actions(&self, selected: &[TorrentId]) -> AvailableActions {
        let mut actions = AvailableActions::default();
        for entry in self
            .entries
            .iter()
            .filter(|entry| selected.contains(entry.id()) && !entry.waiting_action)
        {
            if entry.state.paused {
                actions.resume = true;
            } else {
                actions.pause = true;
            }
            actions.remove = true;
        }
        actions
    }

    /// Fold an engine notification into the list.
    ///
    /// Returns whether the list changed. Messages unrelated to the list are
    /// ignored.
    pub fn apply<F>(&mut self, msg: &UiMessage, make_handle: F) -> Result<bool>
    where
        F: FnOnce(&TorrentState) -> H,
    {
        match msg {
            UiMessage::TorrentAdded(state) => {
                let handle = make_handle(state);
                self.insert(state.clone(), handle)?;
                Ok(true)
            }
            UiMessage::TorrentChanged(state) => Ok(self.update(&state.id, state.clone())),
            UiMessage::TorrentRemoved(id) => {
                self.remove(id)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
