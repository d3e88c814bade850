// Entrant and participant records and their lifecycle fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_ms;

/// Lifecycle stage of an entrant.
///
/// The only legal progression is POOL -> DRAFTED -> IN_RING -> ELIMINATED;
/// the engine rejects transitions that skip a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntrantStatus {
    Pool,
    Drafted,
    InRing,
    Eliminated,
}

impl fmt::Display for EntrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntrantStatus::Pool => "POOL",
            EntrantStatus::Drafted => "DRAFTED",
            EntrantStatus::InRing => "IN_RING",
            EntrantStatus::Eliminated => "ELIMINATED",
        };
        f.write_str(s)
    }
}

/// Betting odds attached to an entrant. Some roster sources quote odds as
/// text ("5/2"), others as a bare number, so both shapes are accepted on
/// the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Odds {
    Text(String),
    Number(f64),
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Odds::Text(s) => f.write_str(s),
            Odds::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A competitor in the rumble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entrant {
    pub id: Uuid,
    pub name: String,
    pub status: EntrantStatus,
    /// Owning participant once drafted, `None` while in the pool.
    pub drafted_by: Option<Uuid>,
    /// Entrants credited with this entrant's elimination.
    pub eliminated_by: Vec<Uuid>,
    /// Ring-entry timestamp (Unix ms), `None` until the entrant enters.
    pub entry_order: Option<i64>,
    /// Elimination timestamp (Unix ms), `None` until eliminated.
    pub elimination_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds: Option<Odds>,
    #[serde(default)]
    pub confirmed: bool,
}

/// Input fields for a new pool entrant. Everything the lifecycle owns
/// (id, status, ownership, timestamps) is filled in by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrantDraft {
    pub name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub odds: Option<Odds>,
    #[serde(default)]
    pub confirmed: bool,
}

impl Entrant {
    /// Create a fresh pool entrant from draft data.
    pub fn new(draft: EntrantDraft) -> Self {
        Entrant {
            id: Uuid::new_v4(),
            name: draft.name,
            status: EntrantStatus::Pool,
            drafted_by: None,
            eliminated_by: Vec::new(),
            entry_order: None,
            elimination_time: None,
            affiliation: draft.affiliation,
            odds: draft.odds,
            confirmed: draft.confirmed,
        }
    }
}

/// A manager who drafts entrants and accumulates score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    /// Drafted entrants in pick order. Append-only.
    pub roster: Vec<Uuid>,
    pub total_score: f64,
}

impl Participant {
    /// Register a new participant with an empty roster and zero score.
    pub fn new(name: impl Into<String>) -> Self {
        Participant {
            id: Uuid::new_v4(),
            name: name.into(),
            roster: Vec::new(),
            total_score: 0.0,
        }
    }
}

/// A single entry in the rolling event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    /// Unix ms at which the event was recorded.
    pub timestamp: i64,
}

impl LogEvent {
    /// Build a log event stamped with the current time.
    pub fn now(message: impl Into<String>) -> Self {
        LogEvent {
            message: message.into(),
            timestamp: now_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_to_wire_names() {
        assert_eq!(
            serde_json::to_string(&EntrantStatus::InRing).unwrap(),
            "\"IN_RING\""
        );
        assert_eq!(
            serde_json::to_string(&EntrantStatus::Pool).unwrap(),
            "\"POOL\""
        );
        let parsed: EntrantStatus = serde_json::from_str("\"ELIMINATED\"").unwrap();
        assert_eq!(parsed, EntrantStatus::Eliminated);
    }

    #[test]
    fn new_entrant_starts_in_pool() {
        let e = Entrant::new(EntrantDraft {
            name: "The Anvil".into(),
            ..Default::default()
        });
        assert_eq!(e.status, EntrantStatus::Pool);
        assert!(e.drafted_by.is_none());
        assert!(e.eliminated_by.is_empty());
        assert!(e.entry_order.is_none());
        assert!(e.elimination_time.is_none());
        assert!(!e.confirmed);
    }

    #[test]
    fn entrant_wire_fields_are_camel_case() {
        let e = Entrant::new(EntrantDraft {
            name: "Big Red".into(),
            affiliation: Some("North".into()),
            odds: Some(Odds::Text("5/2".into())),
            confirmed: true,
        });
        let v = serde_json::to_value(&e).unwrap();
        assert!(v.get("draftedBy").is_some());
        assert!(v.get("eliminatedBy").is_some());
        assert!(v.get("entryOrder").is_some());
        assert!(v.get("eliminationTime").is_some());
        assert_eq!(v["status"], "POOL");
        assert_eq!(v["odds"], "5/2");
    }

    #[test]
    fn odds_accept_text_and_numbers() {
        let text: Odds = serde_json::from_str("\"12/1\"").unwrap();
        assert_eq!(text, Odds::Text("12/1".into()));
        let num: Odds = serde_json::from_str("4.5").unwrap();
        assert_eq!(num, Odds::Number(4.5));
    }

    #[test]
    fn participant_wire_field_is_total_score() {
        let p = Participant::new("Alice");
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["totalScore"], 0.0);
        assert!(v["roster"].as_array().unwrap().is_empty());
    }
}
