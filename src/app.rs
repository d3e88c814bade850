// Application state and orchestration logic.
//
// The central event loop that owns the engine: window frames come in from
// the sync hub, commands are dispatched to engine operations, and every
// locally-originated state change is persisted to SQLite and broadcast back
// out to all connected windows.

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{Database, STATE_KEY};
use crate::game::engine::GameEngine;
use crate::game::state::GameState;
use crate::protocol::{GameCommand, WireMessage};
use crate::sync::{PeerMap, SyncEvent};

/// The complete application state.
pub struct AppState {
    pub config: Config,
    pub engine: GameEngine,
    pub db: Database,
    pub peers: PeerMap,
}

impl AppState {
    pub fn new(config: Config, db: Database, peers: PeerMap) -> Self {
        let engine = GameEngine::new(config.scoring);
        AppState {
            config,
            engine,
            db,
            peers,
        }
    }
}

/// Hydrate the engine from the durable store. Returns true when a stored
/// state was found and adopted. A corrupt record is logged and skipped so a
/// bad write can never brick startup.
pub fn hydrate_from_db(app: &mut AppState) -> anyhow::Result<bool> {
    let Some(value) = app
        .db
        .load_state(STATE_KEY)
        .context("failed to read stored game state")?
    else {
        return Ok(false);
    };

    match serde_json::from_value::<GameState>(value) {
        Ok(state) => {
            app.engine.hydrate(state);
            Ok(true)
        }
        Err(e) => {
            warn!("Stored game state is unreadable, starting empty: {e}");
            Ok(false)
        }
    }
}

/// Run the app loop until the sync channel closes.
pub async fn run(mut sync_rx: mpsc::Receiver<SyncEvent>, mut app: AppState) -> anyhow::Result<()> {
    while let Some(event) = sync_rx.recv().await {
        match event {
            SyncEvent::Connected { peer_id, addr } => {
                info!("Window {peer_id} joined from {addr}");
                greet_window(&app, peer_id);
            }
            SyncEvent::Disconnected { peer_id } => {
                info!("Window {peer_id} disconnected");
            }
            SyncEvent::Message { peer_id, text } => {
                handle_message(&mut app, peer_id, &text);
            }
        }
    }
    info!("Sync channel closed; app loop exiting");
    Ok(())
}

/// Push the current state to a window that just connected, so late-opened
/// windows render the live game instead of an empty one.
fn greet_window(app: &AppState, peer_id: u64) {
    match serde_json::to_string(&WireMessage::state_update(app.engine.state().clone())) {
        Ok(frame) => app.peers.send_to(peer_id, &frame),
        Err(e) => warn!("failed to serialize greeting snapshot: {e}"),
    }
}

/// Process one inbound frame, then persist + broadcast if it produced a
/// locally-originated mutation.
pub fn handle_message(app: &mut AppState, peer_id: u64, text: &str) {
    match serde_json::from_str::<WireMessage>(text) {
        Ok(WireMessage::StateUpdate { payload, .. }) => {
            // Another window pushed its state: adopt it wholesale and relay
            // the frame once to the remaining windows. The engine does not
            // mark this dirty, so it is never re-persisted or re-broadcast
            // from here; remote updates propagate exactly zero further
            // times.
            debug!("Adopting state update from window {peer_id}");
            app.engine.apply_remote(payload);
            app.peers.broadcast_except(text, peer_id);
        }
        Ok(WireMessage::Command { payload, .. }) => {
            if let Err(e) = dispatch_command(app, payload) {
                warn!("Command from window {peer_id} failed: {e:#}");
            }
        }
        Err(e) => {
            warn!("Unparseable frame from window {peer_id}: {e}");
        }
    }

    sync_after_mutation(app);
}

/// Map a wire command onto the corresponding engine operation.
pub fn dispatch_command(app: &mut AppState, command: GameCommand) -> anyhow::Result<()> {
    match command {
        GameCommand::RegisterParticipant { name } => {
            app.engine.register_participant(&name)?;
        }
        GameCommand::AddEntrant { entrant } => {
            app.engine.add_entrant(entrant)?;
        }
        GameCommand::AddEntrants { entrants } => {
            let added = app.engine.add_entrants(entrants);
            info!("Bulk-added {added} entrants to the pool");
        }
        GameCommand::RemoveEntrant { id } => {
            app.engine.remove_entrant(id)?;
        }
        GameCommand::DraftPick { id } => {
            app.engine.draft_pick(id)?;
        }
        GameCommand::EnterRing { id } => {
            app.engine.enter_ring(id)?;
        }
        GameCommand::Eliminate { id, eliminated_by } => {
            app.engine.eliminate(id, &eliminated_by)?;
        }
        GameCommand::SetParticipantScore { id, score } => {
            app.engine.set_participant_score(id, score)?;
        }
        GameCommand::SetDrafting { drafting } => {
            app.engine.set_drafting(drafting);
        }
        GameCommand::AddLog { message } => {
            app.engine.add_log(message);
        }
        GameCommand::Undo => {
            if !app.engine.undo() {
                debug!("Undo requested with empty history");
            }
        }
        GameCommand::ResetGame => {
            app.engine.reset_game();
            // The stored record is cleared here and re-written as the fresh
            // empty state by the sync step below, mirroring the storage
            // lifecycle of the original reset.
            app.db
                .clear_state(STATE_KEY)
                .context("failed to clear stored state")?;
        }
        GameCommand::ImportState { json } => {
            app.engine.import_state(&json)?;
        }
        GameCommand::ExportState => {
            let path = app.engine.export_to_file(&app.config.export_dir)?;
            info!("Exported game state to {}", path.display());
        }
    }
    Ok(())
}

/// Persist and broadcast the state if (and only if) the last frame produced
/// a locally-originated mutation.
fn sync_after_mutation(app: &mut AppState) {
    if !app.engine.take_dirty() {
        return;
    }

    match serde_json::to_value(app.engine.state()) {
        Ok(value) => {
            if let Err(e) = app.db.save_state(STATE_KEY, &value) {
                warn!("Failed to persist state to DB: {e:#}");
            }
        }
        Err(e) => warn!("Failed to serialize state for persistence: {e}"),
    }

    match serde_json::to_string(&WireMessage::state_update(app.engine.state().clone())) {
        Ok(frame) => app.peers.broadcast(&frame),
        Err(e) => warn!("Failed to serialize state broadcast: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::ScoringRules;
    use std::path::PathBuf;
    use tokio_tungstenite::tungstenite::Message;

    fn test_config() -> Config {
        Config {
            ws_port: 0,
            db_path: ":memory:".into(),
            export_dir: PathBuf::from("exports"),
            pool_csv: None,
            scoring: ScoringRules::default(),
        }
    }

    fn test_app() -> AppState {
        AppState::new(
            test_config(),
            Database::open(":memory:").unwrap(),
            PeerMap::new(),
        )
    }

    fn command_frame(command: GameCommand) -> String {
        serde_json::to_string(&WireMessage::command(command)).unwrap()
    }

    /// Pull the next text frame off a peer channel and parse it.
    fn next_frame(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Message>) -> WireMessage {
        match rx.try_recv().unwrap() {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn command_mutates_persists_and_broadcasts_once() {
        let mut app = test_app();
        let (peer, mut rx) = app.peers.register();

        let frame = command_frame(GameCommand::RegisterParticipant {
            name: "Alice".into(),
        });
        handle_message(&mut app, peer, &frame);

        assert_eq!(app.engine.state().participants.len(), 1);

        // Persisted under the fixed key...
        let stored = app.db.load_state(STATE_KEY).unwrap().unwrap();
        assert_eq!(stored["participants"].as_array().unwrap().len(), 1);

        // ...and broadcast exactly once, to every window (origin included:
        // it needs the authoritative result too).
        match next_frame(&mut rx) {
            WireMessage::StateUpdate { payload, .. } => {
                assert_eq!(payload.participants.len(), 1);
            }
            other => panic!("expected state update, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn remote_state_update_is_adopted_but_never_repropagated() {
        let mut app = test_app();
        let (origin, mut rx_origin) = app.peers.register();
        let (_other, mut rx_other) = app.peers.register();

        let mut remote = GameState::default();
        remote.total_picks = 9;
        let frame =
            serde_json::to_string(&WireMessage::state_update(remote.clone())).unwrap();
        handle_message(&mut app, origin, &frame);

        // Adopted wholesale...
        assert_eq!(app.engine.state().total_picks, 9);
        // ...not persisted (zero further propagation from the state layer)...
        assert!(app.db.load_state(STATE_KEY).unwrap().is_none());
        // ...relayed once by the transport to the other window only.
        match next_frame(&mut rx_other) {
            WireMessage::StateUpdate { payload, .. } => assert_eq!(payload.total_picks, 9),
            other => panic!("expected state update, got {other:?}"),
        }
        assert!(rx_origin.try_recv().is_err());
    }

    #[test]
    fn failed_command_changes_and_broadcasts_nothing() {
        let mut app = test_app();
        let (peer, mut rx) = app.peers.register();

        let frame = command_frame(GameCommand::DraftPick {
            id: uuid::Uuid::new_v4(),
        });
        handle_message(&mut app, peer, &frame);

        assert_eq!(*app.engine.state(), GameState::default());
        assert!(app.db.load_state(STATE_KEY).unwrap().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn garbage_frame_is_ignored() {
        let mut app = test_app();
        let (peer, mut rx) = app.peers.register();
        handle_message(&mut app, peer, "not even json");
        assert!(rx.try_recv().is_err());
        assert!(app.db.load_state(STATE_KEY).unwrap().is_none());
    }

    #[test]
    fn reset_rewrites_the_store_with_a_fresh_game() {
        let mut app = test_app();
        let (peer, _rx) = app.peers.register();

        handle_message(
            &mut app,
            peer,
            &command_frame(GameCommand::RegisterParticipant {
                name: "Alice".into(),
            }),
        );
        handle_message(&mut app, peer, &command_frame(GameCommand::ResetGame));

        assert_eq!(*app.engine.state(), GameState::default());
        let stored = app.db.load_state(STATE_KEY).unwrap().unwrap();
        assert!(stored["participants"].as_array().unwrap().is_empty());
    }

    #[test]
    fn undo_command_round_trips_through_the_wire() {
        let mut app = test_app();
        let (peer, _rx) = app.peers.register();

        handle_message(
            &mut app,
            peer,
            &command_frame(GameCommand::RegisterParticipant {
                name: "Alice".into(),
            }),
        );
        handle_message(&mut app, peer, &command_frame(GameCommand::Undo));

        assert!(app.engine.state().participants.is_empty());
        assert_eq!(app.engine.state().logs[0].message, "Undid last action.");
    }

    #[test]
    fn hydrate_from_db_restores_stored_state() {
        let mut app = test_app();
        let mut state = GameState::default();
        state.total_picks = 4;
        app.db
            .save_state(STATE_KEY, &serde_json::to_value(&state).unwrap())
            .unwrap();

        assert!(hydrate_from_db(&mut app).unwrap());
        assert_eq!(app.engine.state().total_picks, 4);
        // Hydration is not a mutation: nothing to re-persist or broadcast.
        assert!(!app.engine.take_dirty());
    }

    #[test]
    fn hydrate_from_db_with_no_record_starts_empty() {
        let mut app = test_app();
        assert!(!hydrate_from_db(&mut app).unwrap());
        assert_eq!(*app.engine.state(), GameState::default());
    }

    #[test]
    fn hydrate_from_db_survives_a_corrupt_record() {
        let mut app = test_app();
        app.db
            .save_state(STATE_KEY, &serde_json::json!({"totalPicks": "not a number"}))
            .unwrap();
        assert!(!hydrate_from_db(&mut app).unwrap());
        assert_eq!(*app.engine.state(), GameState::default());
    }

    #[test]
    fn stored_record_with_missing_fields_hydrates_with_defaults() {
        let mut app = test_app();
        app.db
            .save_state(STATE_KEY, &serde_json::json!({"totalPicks": 2}))
            .unwrap();
        assert!(hydrate_from_db(&mut app).unwrap());
        assert_eq!(app.engine.state().total_picks, 2);
        assert!(app.engine.state().is_drafting);
    }
}
