// Checkpointed mutation engine: drafting, ring entry, elimination scoring,
// single-step undo, and state import/export.
//
// Every mutating operation snapshots the pre-mutation state onto a bounded
// history stack before applying its change, then raises a dirty flag that
// the app layer consumes to persist and broadcast. State adopted from a
// remote window bypasses both, which is what keeps windows from
// re-broadcasting each other's updates forever.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::entrant::{Entrant, EntrantDraft, EntrantStatus, LogEvent, Participant};
use super::now_ms;
use super::state::GameState;
use super::turn::next_drafter_index;

/// Undo stack capacity. The oldest snapshot is discarded when a new
/// checkpoint would exceed it.
pub const MAX_HISTORY: usize = 20;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GameError {
    #[error("validation error for `{field}`: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{name} is {actual}, expected {expected}")]
    Precondition {
        name: String,
        actual: EntrantStatus,
        expected: EntrantStatus,
    },

    #[error("no entrant with id {0}")]
    UnknownEntrant(Uuid),

    #[error("no participant with id {0}")]
    UnknownParticipant(Uuid),

    #[error("failed to parse imported state: {0}")]
    ImportParse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Scoring rules
// ---------------------------------------------------------------------------

/// Point values applied on each elimination. Defaults reproduce the house
/// rules: 3 points split among eliminator owners, 1 point per survivor.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    /// Pot split evenly among the owners of the credited eliminators.
    pub elimination_points: f64,
    /// Awarded to the owner of every entrant still in the ring.
    pub survival_points: f64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringRules {
            elimination_points: 3.0,
            survival_points: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Partial import payload
// ---------------------------------------------------------------------------

/// Import payload where every field is independently optional; fields absent
/// from the JSON leave the current value untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PartialState {
    entrants: Option<Vec<Entrant>>,
    participants: Option<Vec<Participant>>,
    current_drafter_index: Option<usize>,
    is_drafting: Option<bool>,
    total_picks: Option<u32>,
    logs: Option<Vec<LogEvent>>,
}

// ---------------------------------------------------------------------------
// GameEngine
// ---------------------------------------------------------------------------

/// The authoritative mutator of [`GameState`].
///
/// UI windows never touch the state directly; they dispatch commands that
/// resolve to one of the operations below and render whatever comes back.
pub struct GameEngine {
    state: GameState,
    /// Pre-mutation snapshots, oldest first, capped at [`MAX_HISTORY`].
    history: Vec<GameState>,
    scoring: ScoringRules,
    /// Raised by locally-originated mutations, consumed once by the app
    /// layer to persist + broadcast. Never raised by `apply_remote`.
    dirty: bool,
}

impl GameEngine {
    pub fn new(scoring: ScoringRules) -> Self {
        GameEngine {
            state: GameState::default(),
            history: Vec::new(),
            scoring,
            dirty: false,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Consume the dirty flag. Returns true exactly once after each
    /// locally-originated mutation.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Adopt state loaded from the durable store at startup. Not a mutation:
    /// no checkpoint, no dirty flag.
    pub fn hydrate(&mut self, state: GameState) {
        self.state = state;
    }

    /// Adopt state broadcast by another window, replacing every field.
    ///
    /// Deliberately does not raise the dirty flag: a remotely-originated
    /// update must propagate zero further times from this window, or two
    /// windows would bounce the same state back and forth indefinitely.
    pub fn apply_remote(&mut self, state: GameState) {
        self.state = state;
    }

    fn checkpoint(&mut self) {
        if self.history.len() == MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(self.state.clone());
    }

    // -- lifecycle operations ------------------------------------------------

    /// Register a new participant. Rejects empty or whitespace-only names.
    pub fn register_participant(&mut self, name: &str) -> Result<Uuid, GameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::Validation {
                field: "name",
                message: "participant name must not be empty".into(),
            });
        }

        self.checkpoint();
        let participant = Participant::new(name);
        let id = participant.id;
        self.state.participants.push(participant);
        self.state.add_log(format!("{name} joined the Rumble!"));
        self.dirty = true;
        Ok(id)
    }

    /// Add a single entrant to the pool. No log entry, so bulk loads don't
    /// flood the event feed.
    pub fn add_entrant(&mut self, draft: EntrantDraft) -> Result<Uuid, GameError> {
        if draft.name.trim().is_empty() {
            return Err(GameError::Validation {
                field: "name",
                message: "entrant name must not be empty".into(),
            });
        }

        self.checkpoint();
        let entrant = Entrant::new(draft);
        let id = entrant.id;
        self.state.entrants.push(entrant);
        self.dirty = true;
        Ok(id)
    }

    /// Add a whole batch of entrants under a single checkpoint, so one undo
    /// reverses the entire load. Rows with blank names are skipped with a
    /// warning. Returns the number of entrants added.
    pub fn add_entrants(&mut self, drafts: Vec<EntrantDraft>) -> usize {
        let valid: Vec<EntrantDraft> = drafts
            .into_iter()
            .filter(|d| {
                let ok = !d.name.trim().is_empty();
                if !ok {
                    warn!("skipping pool entrant with blank name");
                }
                ok
            })
            .collect();

        if valid.is_empty() {
            return 0;
        }

        self.checkpoint();
        let added = valid.len();
        self.state
            .entrants
            .extend(valid.into_iter().map(Entrant::new));
        self.dirty = true;
        added
    }

    /// Remove an entrant from the pool entirely. No log entry.
    pub fn remove_entrant(&mut self, id: Uuid) -> Result<(), GameError> {
        if self.state.entrant(id).is_none() {
            return Err(GameError::UnknownEntrant(id));
        }

        self.checkpoint();
        self.state.entrants.retain(|e| e.id != id);
        self.dirty = true;
        Ok(())
    }

    /// Draft the entrant for whoever is on the clock, then advance the snake
    /// order. A draft with zero registered participants is a no-op.
    pub fn draft_pick(&mut self, entrant_id: Uuid) -> Result<(), GameError> {
        let num_participants = self.state.participants.len();
        if num_participants == 0 {
            return Ok(());
        }

        let entrant = self
            .state
            .entrant(entrant_id)
            .ok_or(GameError::UnknownEntrant(entrant_id))?;
        if entrant.status != EntrantStatus::Pool {
            return Err(GameError::Precondition {
                name: entrant.name.clone(),
                actual: entrant.status,
                expected: EntrantStatus::Pool,
            });
        }
        let entrant_name = entrant.name.clone();

        self.checkpoint();

        // Index may be out of range after a hand-edited import; clamp rather
        // than panic.
        let drafter_idx = self.state.current_drafter_index.min(num_participants - 1);
        let drafter = &mut self.state.participants[drafter_idx];
        let drafter_id = drafter.id;
        let drafter_name = drafter.name.clone();
        drafter.roster.push(entrant_id);

        let entrant = self
            .state
            .entrant_mut(entrant_id)
            .expect("entrant checked above");
        entrant.status = EntrantStatus::Drafted;
        entrant.drafted_by = Some(drafter_id);

        self.state
            .add_log(format!("{drafter_name} drafted {entrant_name}."));

        let picks_before = self.state.total_picks;
        self.state.total_picks = picks_before + 1;
        self.state.current_drafter_index = next_drafter_index(picks_before, num_participants);
        self.dirty = true;
        Ok(())
    }

    /// Send a drafted entrant into the ring, stamping their entry time.
    pub fn enter_ring(&mut self, entrant_id: Uuid) -> Result<(), GameError> {
        let entrant = self
            .state
            .entrant(entrant_id)
            .ok_or(GameError::UnknownEntrant(entrant_id))?;
        if entrant.status != EntrantStatus::Drafted {
            return Err(GameError::Precondition {
                name: entrant.name.clone(),
                actual: entrant.status,
                expected: EntrantStatus::Drafted,
            });
        }
        let name = entrant.name.clone();

        self.checkpoint();
        let entrant = self
            .state
            .entrant_mut(entrant_id)
            .expect("entrant checked above");
        entrant.status = EntrantStatus::InRing;
        entrant.entry_order = Some(now_ms());
        self.state.add_log(format!("{name} has entered the ring!"));
        self.dirty = true;
        Ok(())
    }

    /// Eliminate an in-ring entrant and score the fallout.
    ///
    /// The elimination pot is split evenly among the owners of the credited
    /// eliminators; shares belonging to unowned or self-referential
    /// eliminators are absorbed, not redistributed. Every other entrant
    /// still in the ring earns its owner a survival point. Both computations
    /// read ring membership and ownership as they stood immediately before
    /// this elimination took effect.
    pub fn eliminate(
        &mut self,
        entrant_id: Uuid,
        eliminator_ids: &[Uuid],
    ) -> Result<(), GameError> {
        let entrant = self
            .state
            .entrant(entrant_id)
            .ok_or(GameError::UnknownEntrant(entrant_id))?;
        if entrant.status != EntrantStatus::InRing {
            return Err(GameError::Precondition {
                name: entrant.name.clone(),
                actual: entrant.status,
                expected: EntrantStatus::InRing,
            });
        }

        self.checkpoint();

        // Pre-mutation capture; all scoring reads go through this, never
        // through the just-mutated entrant list.
        let before: Vec<Entrant> = self.state.entrants.clone();

        let entrant = self
            .state
            .entrant_mut(entrant_id)
            .expect("entrant checked above");
        let eliminated_name = entrant.name.clone();
        entrant.status = EntrantStatus::Eliminated;
        entrant.elimination_time = Some(now_ms());
        entrant.eliminated_by = eliminator_ids.to_vec();

        let eliminator_names: Vec<&str> = eliminator_ids
            .iter()
            .filter_map(|id| before.iter().find(|e| e.id == *id))
            .map(|e| e.name.as_str())
            .collect();
        let credit = if eliminator_names.is_empty() {
            "Unknown".to_string()
        } else {
            eliminator_names.join(", ")
        };
        self.state
            .add_log(format!("{eliminated_name} eliminated by {credit}!"));

        // Elimination points: an even split per credited eliminator, paid to
        // that eliminator's owner. Two eliminators owned by the same
        // participant pay that participant twice.
        if !eliminator_ids.is_empty() {
            let share = self.scoring.elimination_points / eliminator_ids.len() as f64;
            for eliminator_id in eliminator_ids {
                if *eliminator_id == entrant_id {
                    continue;
                }
                let owner = before
                    .iter()
                    .find(|e| e.id == *eliminator_id)
                    .and_then(|e| e.drafted_by);
                match owner.and_then(|id| self.state.participant_mut(id)) {
                    Some(participant) => participant.total_score += share,
                    None => info!("eliminator {eliminator_id} has no owner; share absorbed"),
                }
            }
        }

        // Survival points: everyone still in the ring at the moment of this
        // elimination, excluding the entrant who just went over the top rope.
        for survivor in before
            .iter()
            .filter(|e| e.status == EntrantStatus::InRing && e.id != entrant_id)
        {
            if let Some(owner) = survivor.drafted_by {
                if let Some(participant) = self.state.participant_mut(owner) {
                    participant.total_score += self.scoring.survival_points;
                }
            }
        }

        self.dirty = true;
        Ok(())
    }

    /// Directly override a participant's score. Manual correction only; no
    /// derivation, no log.
    pub fn set_participant_score(
        &mut self,
        participant_id: Uuid,
        new_score: f64,
    ) -> Result<(), GameError> {
        if self.state.participant(participant_id).is_none() {
            return Err(GameError::UnknownParticipant(participant_id));
        }

        self.checkpoint();
        self.state
            .participant_mut(participant_id)
            .expect("participant checked above")
            .total_score = new_score;
        self.dirty = true;
        Ok(())
    }

    /// Toggle the draft phase flag. A no-op when the flag already has the
    /// requested value.
    pub fn set_drafting(&mut self, drafting: bool) {
        if self.state.is_drafting == drafting {
            return;
        }
        self.checkpoint();
        self.state.is_drafting = drafting;
        self.dirty = true;
    }

    /// Wipe the game back to an empty drafting state. The app layer clears
    /// the durable store record alongside this.
    pub fn reset_game(&mut self) {
        self.checkpoint();
        self.state = GameState::default();
        self.dirty = true;
    }

    /// Append a free-form log entry.
    pub fn add_log(&mut self, message: impl Into<String>) {
        self.state.add_log(message);
        self.dirty = true;
    }

    // -- undo ----------------------------------------------------------------

    /// Roll back to the most recent checkpoint. Returns false (and does
    /// nothing) when the history is empty.
    ///
    /// The "Undid last action." entry is logged after restoration and is not
    /// itself checkpointed, so undo cannot be undone; redo is unsupported.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.pop() else {
            return false;
        };
        self.state = previous;
        self.state.add_log("Undid last action.");
        self.dirty = true;
        true
    }

    // -- import / export -----------------------------------------------------

    /// Serialize the full state as pretty-printed JSON, the same shape the
    /// durable store and the broadcast channel use.
    pub fn export_state(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.state)
    }

    /// Write the exported state to `dir` under a timestamped filename and
    /// return the path.
    pub fn export_to_file(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let body = self.export_state().context("failed to serialize state")?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create export dir {}", dir.display()))?;
        let filename = format!(
            "royal-rumble-state-{}.json",
            Utc::now().format("%Y-%m-%dT%H-%M-%S")
        );
        let path = dir.join(filename);
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write export file {}", path.display()))?;
        Ok(path)
    }

    /// Import state from JSON text. Fields present in the payload replace
    /// the current value; absent fields are left untouched.
    ///
    /// The checkpoint is pushed before the parse attempt, so a malformed
    /// payload leaves the state untouched but the checkpoint in place:
    /// undoing after a failed import undoes the previous real action.
    pub fn import_state(&mut self, json: &str) -> Result<(), GameError> {
        self.checkpoint();
        let parsed: PartialState = serde_json::from_str(json)?;

        if let Some(entrants) = parsed.entrants {
            self.state.entrants = entrants;
        }
        if let Some(participants) = parsed.participants {
            self.state.participants = participants;
        }
        if let Some(index) = parsed.current_drafter_index {
            self.state.current_drafter_index = index;
        }
        if let Some(is_drafting) = parsed.is_drafting {
            self.state.is_drafting = is_drafting;
        }
        if let Some(total_picks) = parsed.total_picks {
            self.state.total_picks = total_picks;
        }
        if let Some(logs) = parsed.logs {
            self.state.logs = logs;
        }

        self.state.add_log("Game state imported successfully.");
        self.dirty = true;
        Ok(())
    }
}
