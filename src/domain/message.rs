//! Responder messages (SMS in both directions) and inbound reply classification.

use super::errors::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(Direction::Incoming),
            "outgoing" => Ok(Direction::Outgoing),
            other => Err(DomainError::Repo(format!("unknown message direction {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderMessage {
    pub id: i64,
    pub chapter_id: i64,
    pub person_id: Option<i64>,
    pub incident_id: Option<i64>,
    pub direction: Direction,
    /// Our gateway number.
    pub local_number: Option<String>,
    /// The responder's number.
    pub remote_number: Option<String>,
    pub body: String,
    pub acknowledged: bool,
    pub in_reply_to_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ResponderMessage {
    pub fn incoming(chapter_id: i64, person_id: i64, body: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            chapter_id,
            person_id: Some(person_id),
            incident_id: None,
            direction: Direction::Incoming,
            local_number: None,
            remote_number: None,
            body: body.into(),
            acknowledged: false,
            in_reply_to_id: None,
            created_at: now,
        }
    }

    pub fn outgoing(chapter_id: i64, person_id: i64, body: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            direction: Direction::Outgoing,
            // Nothing to acknowledge on our own messages.
            acknowledged: true,
            ..Self::incoming(chapter_id, person_id, body, now)
        }
    }

    pub fn for_incident(mut self, incident_id: Option<i64>) -> Self {
        self.incident_id = incident_id;
        self
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }

    /// First `max_chars` characters, with an ellipsis when truncated.
    pub fn preview(&self, max_chars: usize) -> String {
        let text = self.body.trim();
        if text.chars().count() <= max_chars {
            text.to_string()
        } else {
            let head: String = text.chars().take(max_chars).collect();
            format!("{head}...")
        }
    }
}

/// What an inbound SMS asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsReply {
    Yes,
    No,
    Help,
    IncidentInfo,
    Map,
    FreeText,
}

impl SmsReply {
    pub fn classify(body: &str) -> Self {
        let normalized: String = body
            .trim()
            .trim_end_matches(['.', '!', '?'])
            .to_lowercase();
        match normalized.as_str() {
            "yes" | "y" | "yeah" | "yep" | "available" => SmsReply::Yes,
            "no" | "n" | "nope" | "unavailable" | "not available" => SmsReply::No,
            "help" | "commands" => SmsReply::Help,
            "incident" | "info" | "details" | "address" => SmsReply::IncidentInfo,
            "map" => SmsReply::Map,
            _ => SmsReply::FreeText,
        }
    }

    /// Replies the service fully handles; free text is left for a dispatcher.
    pub fn is_command(&self) -> bool {
        !matches!(self, SmsReply::FreeText)
    }
}

/// Keywords a responder can text back.
pub const COMMANDS_HELP: &str =
    "Reply YES if available, NO if not, INCIDENT for details, MAP for a map link.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(SmsReply::classify("yes"), SmsReply::Yes);
        assert_eq!(SmsReply::classify("  Yes! "), SmsReply::Yes);
        assert_eq!(SmsReply::classify("Y"), SmsReply::Yes);
        assert_eq!(SmsReply::classify("no."), SmsReply::No);
        assert_eq!(SmsReply::classify("Not available"), SmsReply::No);
        assert_eq!(SmsReply::classify("MAP"), SmsReply::Map);
        assert_eq!(SmsReply::classify("commands"), SmsReply::Help);
        assert_eq!(SmsReply::classify("info"), SmsReply::IncidentInfo);
        assert_eq!(
            SmsReply::classify("yes but I can only stay an hour"),
            SmsReply::FreeText
        );
        assert!(!SmsReply::FreeText.is_command());
    }

    #[test]
    fn test_outgoing_is_acknowledged() {
        let m = ResponderMessage::outgoing(1, 2, "hello", Utc::now());
        assert!(m.acknowledged);
        assert!(!m.is_incoming());
        let m = ResponderMessage::incoming(1, 2, "hello", Utc::now());
        assert!(!m.acknowledged);
    }

    #[test]
    fn test_preview() {
        let m = ResponderMessage::incoming(1, 2, "Running ten minutes late", Utc::now());
        assert_eq!(m.preview(7), "Running...");
        assert_eq!(m.preview(100), "Running ten minutes late");
    }
}
