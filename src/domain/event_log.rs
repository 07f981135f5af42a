//! Incident timeline entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DatReceived,
    DatOnScene,
    DatDepartedScene,
    ResponderAssigned,
    ResponderDispatched,
    ResponderOnScene,
    ResponderDeparted,
    IncidentClosed,
    Note,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DatReceived => "dat_received",
            EventKind::DatOnScene => "dat_on_scene",
            EventKind::DatDepartedScene => "dat_departed_scene",
            EventKind::ResponderAssigned => "responder_assigned",
            EventKind::ResponderDispatched => "responder_dispatched",
            EventKind::ResponderOnScene => "responder_on_scene",
            EventKind::ResponderDeparted => "responder_departed",
            EventKind::IncidentClosed => "incident_closed",
            EventKind::Note => "note",
        }
    }

    /// DAT-derived kinds appear at most once per incident and are upserted.
    pub fn is_singular(&self) -> bool {
        matches!(
            self,
            EventKind::DatReceived | EventKind::DatOnScene | EventKind::DatDepartedScene
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "dat_received" => EventKind::DatReceived,
            "dat_on_scene" => EventKind::DatOnScene,
            "dat_departed_scene" => EventKind::DatDepartedScene,
            "responder_assigned" => EventKind::ResponderAssigned,
            "responder_dispatched" => EventKind::ResponderDispatched,
            "responder_on_scene" => EventKind::ResponderOnScene,
            "responder_departed" => EventKind::ResponderDeparted,
            "incident_closed" => EventKind::IncidentClosed,
            "note" => EventKind::Note,
            other => return Err(DomainError::invalid("event", format!("unknown event {other}"))),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub id: i64,
    pub incident_id: i64,
    pub chapter_id: i64,
    pub person_id: Option<i64>,
    pub event: EventKind,
    pub event_time: DateTime<Utc>,
    pub message: Option<String>,
}

impl EventLog {
    pub fn new(
        incident_id: i64,
        chapter_id: i64,
        event: EventKind,
        event_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            incident_id,
            chapter_id,
            person_id: None,
            event,
            event_time,
            message: None,
        }
    }

    pub fn by(mut self, person_id: i64) -> Self {
        self.person_id = Some(person_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
