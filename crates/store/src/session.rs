//! Session-scoped operator state.
//!
//! One `SessionState` lives for one operator session and is passed by
//! mutable reference into the query runner and the overwrite coordinator.
//! It never holds the credential; the backend binding does.

use vsctl_api::AssistantHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    selected_index: Option<String>,
    assistant: Option<AssistantHandle>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, index_id: impl Into<String>) {
        self.selected_index = Some(index_id.into());
    }

    pub fn selected_index(&self) -> Option<&str> {
        self.selected_index.as_deref()
    }

    pub fn clear_selection(&mut self) {
        self.selected_index = None;
    }

    /// Move the selection from a replaced index to its successor.
    ///
    /// An empty selection takes the successor; a selection of some other
    /// index is left alone.
    pub fn follow_replacement(&mut self, previous_index_id: &str, new_index_id: &str) {
        match self.selected_index.as_deref() {
            Some(selected) if selected != previous_index_id => {}
            _ => self.select(new_index_id),
        }
    }

    /// Clear the selection if it names `index_id`.
    pub fn deselect(&mut self, index_id: &str) {
        if self.selected_index.as_deref() == Some(index_id) {
            self.selected_index = None;
        }
    }

    /// The cached assistant handle, if a query has created one.
    pub fn assistant(&self) -> Option<&AssistantHandle> {
        self.assistant.as_ref()
    }

    pub fn cache_assistant(&mut self, handle: AssistantHandle) {
        self.assistant = Some(handle);
    }

    /// Drop the cached handle, returning it.
    pub fn forget_assistant(&mut self) -> Option<AssistantHandle> {
        self.assistant.take()
    }

    /// Whether the cached handle's retrieval tool points at `index_id`.
    pub fn is_bound_to(&self, index_id: &str) -> bool {
        self.assistant
            .as_ref()
            .is_some_and(|handle| handle.index_id == index_id)
    }

    /// Record that the cached handle now searches `new_index_id`.
    ///
    /// Returns the previously bound index id, or `None` when no handle is cached.
    pub fn rebind(&mut self, new_index_id: &str) -> Option<String> {
        self.assistant
            .as_mut()
            .map(|handle| std::mem::replace(&mut handle.index_id, new_index_id.to_string()))
    }
}
