// Game-state engine: entities, lifecycle transitions, turn order, scoring,
// and the checkpoint/undo stack.

pub mod engine;
pub mod entrant;
pub mod pool;
pub mod state;
pub mod turn;

/// Current wall-clock time as Unix milliseconds, the timestamp unit used
/// throughout the wire format and the durable store.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
