//! Outgoing SMS: send through the gateway, then record the message.
//! Also builds the canned bodies (incident details, map links) responders can ask for.

use crate::domain::incident::humanize;
use crate::domain::{Chapter, DomainError, Incident, Person, ResponderMessage};
use crate::ports::{MapProvider, MessageRepo, SmsGateway, UrlShortener};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Outbox {
    sms: Arc<dyn SmsGateway>,
    messages: Arc<dyn MessageRepo>,
    shortener: Arc<dyn UrlShortener>,
    maps: Arc<dyn MapProvider>,
}

impl Outbox {
    pub fn new(
        sms: Arc<dyn SmsGateway>,
        messages: Arc<dyn MessageRepo>,
        shortener: Arc<dyn UrlShortener>,
        maps: Arc<dyn MapProvider>,
    ) -> Self {
        Self {
            sms,
            messages,
            shortener,
            maps,
        }
    }

    /// Shortened map link for the incident, or None when it has no location.
    pub async fn map_link(&self, incident: &Incident) -> Result<Option<String>, DomainError> {
        let Some(location) = incident.location() else {
            return Ok(None);
        };
        let long = self.maps.location_link(&location);
        self.shortener.shorten(&long).await.map(Some)
    }

    pub async fn map_link_text(&self, incident: &Incident) -> Result<String, DomainError> {
        Ok(match self.map_link(incident).await? {
            Some(link) => format!("Map to incident {}: {}", incident.incident_number, link),
            None => format!("No map is available for incident {}.", incident.incident_number),
        })
    }

    /// Send `body` to the person's SMS number and store it as an outgoing message.
    pub async fn send_to_person(
        &self,
        chapter: &Chapter,
        person: &Person,
        incident_id: Option<i64>,
        body: &str,
    ) -> Result<ResponderMessage, DomainError> {
        let Some(number) = person.sms_number.as_deref().filter(|n| !n.trim().is_empty()) else {
            warn!(person_id = person.id, "person has no SMS number");
            return Err(DomainError::invalid(
                "sms_number",
                format!("{} has no SMS number", person.full_name()),
            ));
        };
        self.send(chapter, person.id, number, incident_id, None, body).await
    }

    /// Send to an explicit number (replies go back to the number that texted us).
    pub async fn send(
        &self,
        chapter: &Chapter,
        person_id: i64,
        to: &str,
        incident_id: Option<i64>,
        in_reply_to_id: Option<i64>,
        body: &str,
    ) -> Result<ResponderMessage, DomainError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(DomainError::invalid("message", "can't be blank"));
        }
        self.sms.send_sms(to, body).await?;

        let mut message =
            ResponderMessage::outgoing(chapter.id, person_id, body, Utc::now()).for_incident(incident_id);
        message.local_number = self.sms.from_number();
        message.remote_number = Some(to.to_string());
        message.in_reply_to_id = in_reply_to_id;
        let stored = self.messages.save_message(&message).await?;
        debug!(message_id = stored.id, person_id, ?incident_id, "outgoing SMS recorded");
        Ok(stored)
    }
}

/// "Incident 25-001: Fire at 1663 Market St, San Francisco. <narrative>"
pub fn incident_details_text(incident: &Incident) -> String {
    let kind = incident
        .incident_type
        .as_deref()
        .map(humanize)
        .unwrap_or_else(|| "Incident".to_string());
    let mut text = format!("Incident {}: {}", incident.incident_number, kind);
    let address = incident.short_address();
    if !address.is_empty() {
        text.push_str(&format!(" at {address}"));
    }
    text.push('.');
    if let Some(narrative) = incident.narrative.as_deref() {
        text.push(' ');
        text.push_str(narrative);
    }
    text
}
