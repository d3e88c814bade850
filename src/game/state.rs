// Canonical game state: the single unit of checkpoint, persistence, and
// cross-window sync.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entrant::{Entrant, LogEvent, Participant};

/// Maximum number of retained log entries; older entries are silently
/// dropped.
pub const MAX_LOGS: usize = 50;

/// The complete state of a rumble. Every component reads and writes only
/// through this struct, and it is what gets snapshotted for undo, persisted
/// to the durable store, and broadcast to other windows.
///
/// The serde names match the versionless JSON wire/store format, so a
/// serialized `GameState` is simultaneously the store record, the broadcast
/// payload, and the export file body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    pub entrants: Vec<Entrant>,
    pub participants: Vec<Participant>,
    /// Index into `participants` of whoever drafts next.
    pub current_drafter_index: usize,
    pub is_drafting: bool,
    /// Picks completed so far, across all rounds.
    pub total_picks: u32,
    /// Event log, newest first, capped at [`MAX_LOGS`].
    pub logs: Vec<LogEvent>,
}

impl Default for GameState {
    fn default() -> Self {
        GameState {
            entrants: Vec::new(),
            participants: Vec::new(),
            current_drafter_index: 0,
            is_drafting: true,
            total_picks: 0,
            logs: Vec::new(),
        }
    }
}

impl GameState {
    /// Look up an entrant by id.
    pub fn entrant(&self, id: Uuid) -> Option<&Entrant> {
        self.entrants.iter().find(|e| e.id == id)
    }

    /// Mutable entrant lookup.
    pub fn entrant_mut(&mut self, id: Uuid) -> Option<&mut Entrant> {
        self.entrants.iter_mut().find(|e| e.id == id)
    }

    /// Look up a participant by id.
    pub fn participant(&self, id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Mutable participant lookup.
    pub fn participant_mut(&mut self, id: Uuid) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    /// Append a log event at the head of the log, dropping the oldest
    /// entries beyond the retention cap.
    pub fn add_log(&mut self, message: impl Into<String>) {
        self.logs.insert(0, LogEvent::now(message));
        self.logs.truncate(MAX_LOGS);
    }
}
