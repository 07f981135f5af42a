//! Inbound SMS handling. Stores what responders text us and answers the keywords.

use super::dispatch_service::require_messaging;
use super::outbox::{Outbox, incident_details_text};
use crate::domain::message::COMMANDS_HELP;
use crate::domain::person::normalize_phone;
use crate::domain::{
    Ability, Action, Chapter, DomainError, Incident, Person, ResponderMessage, SmsReply, Subject,
    SubjectKind,
};
use crate::ports::{ChapterRepo, DispatchRepo, IncidentRepo, MessageRepo, PersonRepo};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NO_OPEN_REQUESTS: &str = "There are no open requests for your availability.";
pub const NO_ACTIVE_INCIDENT: &str = "You are not assigned to an open incident.";
pub const FORWARDED: &str = "Your message has been forwarded to dispatch.";

#[derive(Debug, Clone, Serialize)]
pub struct InboundOutcome {
    pub incoming: ResponderMessage,
    pub reply: Option<ResponderMessage>,
}

pub struct MessageService {
    chapters: Arc<dyn ChapterRepo>,
    people: Arc<dyn PersonRepo>,
    incidents: Arc<dyn IncidentRepo>,
    dispatch: Arc<dyn DispatchRepo>,
    messages: Arc<dyn MessageRepo>,
    outbox: Arc<Outbox>,
}

impl MessageService {
    pub fn new(
        chapters: Arc<dyn ChapterRepo>,
        people: Arc<dyn PersonRepo>,
        incidents: Arc<dyn IncidentRepo>,
        dispatch: Arc<dyn DispatchRepo>,
        messages: Arc<dyn MessageRepo>,
        outbox: Arc<Outbox>,
    ) -> Self {
        Self {
            chapters,
            people,
            incidents,
            dispatch,
            messages,
            outbox,
        }
    }

    /// Gateway webhook entry point. Returns `None` for numbers we don't know.
    pub async fn receive(&self, from: &str, to: &str, body: &str) -> Result<Option<InboundOutcome>, DomainError> {
        let normalized = normalize_phone(from);
        let Some(person) = self.people.find_person_by_sms_number(&normalized).await? else {
            warn!(from, "SMS from unknown number ignored");
            return Ok(None);
        };
        let chapter = self.chapters.get_chapter(person.chapter_id).await?;

        let mut incoming = ResponderMessage::incoming(chapter.id, person.id, body.trim(), Utc::now());
        incoming.local_number = Some(to.to_string());
        incoming.remote_number = Some(from.to_string());
        let incoming = self.messages.save_message(&incoming).await?;
        info!(message_id = incoming.id, person_id = person.id, "inbound SMS stored");

        if !chapter.incidents_enable_messaging {
            debug!(chapter_id = chapter.id, "messaging disabled, not replying");
            return Ok(Some(InboundOutcome { incoming, reply: None }));
        }
        let (incoming, reply) = self.reply(&chapter, &person, incoming).await?;
        Ok(Some(InboundOutcome { incoming, reply }))
    }

    /// Answer a stored incoming message. Returns the updated incoming message and the reply.
    ///
    /// Once the incoming side is stored, gateway failures are logged and the reply is `None`,
    /// so the webhook still succeeds and the gateway does not redeliver.
    pub async fn reply(
        &self,
        chapter: &Chapter,
        person: &Person,
        mut incoming: ResponderMessage,
    ) -> Result<(ResponderMessage, Option<ResponderMessage>), DomainError> {
        let command = SmsReply::classify(&incoming.body);
        let body = match command {
            SmsReply::Yes | SmsReply::No => {
                self.record_availability(person, &mut incoming, command == SmsReply::Yes)
                    .await?
            }
            SmsReply::Help => COMMANDS_HELP.to_string(),
            SmsReply::IncidentInfo => match self.active_incident(person).await? {
                Some(incident) => {
                    incoming.incident_id = Some(incident.id);
                    incident_details_text(&incident)
                }
                None => NO_ACTIVE_INCIDENT.to_string(),
            },
            SmsReply::Map => match self.active_incident(person).await? {
                Some(incident) => {
                    incoming.incident_id = Some(incident.id);
                    match self.outbox.map_link_text(&incident).await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, incident_id = incident.id, "map link unavailable");
                            format!("No map is available for incident {}.", incident.incident_number)
                        }
                    }
                }
                None => NO_ACTIVE_INCIDENT.to_string(),
            },
            SmsReply::FreeText => {
                if let Some(incident) = self.active_incident(person).await? {
                    incoming.incident_id = Some(incident.id);
                }
                FORWARDED.to_string()
            }
        };
        incoming.acknowledged = command.is_command();
        let incoming = self.messages.save_message(&incoming).await?;

        let Some(to) = incoming.remote_number.clone().or_else(|| person.sms_number.clone()) else {
            warn!(message_id = incoming.id, person_id = person.id, "no number to reply to");
            return Ok((incoming, None));
        };
        match self
            .outbox
            .send(chapter, person.id, &to, incoming.incident_id, Some(incoming.id), &body)
            .await
        {
            Ok(reply) => {
                debug!(?command, message_id = incoming.id, "inbound SMS answered");
                Ok((incoming, Some(reply)))
            }
            Err(e) => {
                warn!(error = %e, message_id = incoming.id, "reply SMS not sent");
                Ok((incoming, None))
            }
        }
    }

    /// Unacknowledged incoming messages for the incident, newest first.
    pub async fn incoming_for_incident(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
    ) -> Result<Vec<ResponderMessage>, DomainError> {
        Ability::for_person(actor).authorize(
            Action::Read,
            &Subject::in_chapter(SubjectKind::ResponderMessage, chapter.id),
        )?;
        let incident = self.incidents.find_incident(chapter.id, number).await?;
        self.messages.unacknowledged_for_incident(incident.id).await
    }

    pub async fn acknowledge(&self, actor: &Person, message_id: i64) -> Result<ResponderMessage, DomainError> {
        let message = self.messages.get_message(message_id).await?;
        Ability::for_person(actor).authorize(
            Action::Update,
            &Subject::in_chapter(SubjectKind::ResponderMessage, message.chapter_id),
        )?;
        let chapter = self.chapters.get_chapter(message.chapter_id).await?;
        require_messaging(&chapter)?;
        if !message.is_incoming() {
            return Err(DomainError::invalid("message", "only incoming messages can be acknowledged"));
        }
        self.messages.set_acknowledged(message.id, true).await?;
        info!(message_id, actor_id = actor.id, "message acknowledged");
        Ok(ResponderMessage {
            acknowledged: true,
            ..message
        })
    }

    async fn record_availability(
        &self,
        person: &Person,
        incoming: &mut ResponderMessage,
        available: bool,
    ) -> Result<String, DomainError> {
        let Some(mut recruitment) = self.dispatch.latest_open_recruitment(person.id).await? else {
            return Ok(NO_OPEN_REQUESTS.to_string());
        };
        incoming.incident_id = Some(recruitment.incident_id);
        let incident = self.incidents.get_incident(recruitment.incident_id).await?;
        if recruitment.record_reply(available, incoming.id, Utc::now()) {
            self.dispatch.save_recruitment(&recruitment).await?;
            info!(
                incident_id = incident.id,
                person_id = person.id,
                available,
                "recruitment answered"
            );
        }
        Ok(if available {
            format!(
                "Thank you. You have been marked available for incident {}. A dispatcher will contact you.",
                incident.incident_number
            )
        } else {
            format!(
                "Thank you. You have been marked not available for incident {}.",
                incident.incident_number
            )
        })
    }

    /// The incident the responder is working, or failing that, the one they were asked about.
    async fn active_incident(&self, person: &Person) -> Result<Option<Incident>, DomainError> {
        let incident_id = match self.dispatch.active_assignment_for_person(person.id).await? {
            Some(assignment) => Some(assignment.incident_id),
            None => self
                .dispatch
                .latest_open_recruitment(person.id)
                .await?
                .map(|r| r.incident_id),
        };
        match incident_id {
            Some(id) => Ok(Some(self.incidents.get_incident(id).await?)),
            None => Ok(None),
        }
    }
}
