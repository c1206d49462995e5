//! The HelloWorld game state and the store that mutates it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use gsp_moves::Move;
use gsp_store::UndoEntry;

use crate::GameError;

/// Latest message per name. Serializes as a JSON object with sorted keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameState(BTreeMap<String, String>);

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player: &str) -> Option<&str> {
        self.0.get(player).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for GameState {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GameState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Mutable game state with exact undo.
///
/// Cloning is O(1): clones share the underlying state until one of them is
/// mutated, at which point that clone copies it. Snapshots handed out earlier
/// therefore never change.
#[derive(Clone, Debug, Default)]
pub struct StateStore {
    state: Arc<GameState>,
}

impl StateStore {
    pub fn new(state: GameState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// A read-only view of the current state.
    pub fn snapshot(&self) -> Arc<GameState> {
        Arc::clone(&self.state)
    }

    /// Record `mv`, returning what is needed to reverse it.
    pub fn apply(&mut self, mv: &Move) -> UndoEntry {
        let map = &mut Arc::make_mut(&mut self.state).0;
        let previous = map.insert(mv.player.clone(), mv.message.clone());
        UndoEntry {
            player: mv.player.clone(),
            previous,
        }
    }

    /// Reverse one [`apply`](Self::apply).
    ///
    /// The name must currently have a message: every applied move leaves one
    /// behind, so an empty slot means the undo log and the state disagree.
    pub fn undo(&mut self, entry: &UndoEntry) -> Result<(), GameError> {
        let map = &mut Arc::make_mut(&mut self.state).0;
        if !map.contains_key(&entry.player) {
            return Err(GameError::ApplyFailure(format!(
                "undo for {} but it has no message",
                entry.player
            )));
        }
        match &entry.previous {
            Some(previous) => {
                map.insert(entry.player.clone(), previous.clone());
            }
            None => {
                map.remove(&entry.player);
            }
        }
        Ok(())
    }

    /// Final value of every name touched by `entries`, for persisting a step.
    pub(crate) fn values_of(&self, entries: &[UndoEntry]) -> BTreeMap<String, Option<String>> {
        entries
            .iter()
            .map(|e| (e.player.clone(), self.state.0.get(&e.player).cloned()))
            .collect()
    }
}
