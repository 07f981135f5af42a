//! Dispatch service. The responders console: recruiting by SMS, assigning responders,
//! moving them through their statuses, and messaging them.
//!
//! Every state change is written to the incident timeline. Notification failures after
//! an assignment is saved are logged and do not undo the assignment.

use super::outbox::{Outbox, incident_details_text};
use crate::domain::dispatch::check_team_lead;
use crate::domain::{
    Ability, Action, AssignmentRole, Chapter, DomainError, EventKind, EventLog, Incident, Person,
    RecruitmentResponse, ResponderAssignment, ResponderMessage, ResponderRecruitment,
    ResponderStatus, Subject, SubjectKind,
};
use crate::ports::{DispatchRepo, Email, IncidentRepo, Mailer, MessageRepo, PersonRepo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct AssignRequest {
    pub person_id: i64,
    pub role: AssignmentRole,
    #[serde(default)]
    pub send_sms: bool,
    #[serde(default)]
    pub send_email: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTemplate {
    #[default]
    Custom,
    MapLink,
    IncidentInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectMessage {
    #[serde(default)]
    pub template: MessageTemplate,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub assignment: ResponderAssignment,
    pub changed: bool,
}

/// A responder on the response.
#[derive(Debug, Clone, Serialize)]
pub struct AssignedResponder {
    pub assignment_id: i64,
    pub person_id: i64,
    pub name: String,
    pub role: AssignmentRole,
    pub role_label: &'static str,
    pub status: ResponderStatus,
    /// e.g. "Dispatched at"
    pub status_caption: &'static str,
    pub status_time: DateTime<Utc>,
}

/// A chapter member who is not (or not usefully) assigned.
#[derive(Debug, Clone, Serialize)]
pub struct ResponderRow {
    pub person_id: i64,
    pub name: String,
    pub distance_miles: Option<f64>,
    /// Recruitment or assignment label, e.g. "Message Sent", "Not Available".
    pub label: Option<&'static str>,
    pub recruitment: Option<RecruitmentResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponderConsole {
    pub incident: Incident,
    pub assigned: Vec<AssignedResponder>,
    pub candidates: Vec<ResponderRow>,
    pub not_available: Vec<ResponderRow>,
    /// Unacknowledged incoming messages, newest first.
    pub incoming: Vec<ResponderMessage>,
}

pub struct DispatchService {
    incidents: Arc<dyn IncidentRepo>,
    people: Arc<dyn PersonRepo>,
    dispatch: Arc<dyn DispatchRepo>,
    messages: Arc<dyn MessageRepo>,
    outbox: Arc<Outbox>,
    mailer: Arc<dyn Mailer>,
    mail_from: String,
}

impl DispatchService {
    pub fn new(
        incidents: Arc<dyn IncidentRepo>,
        people: Arc<dyn PersonRepo>,
        dispatch: Arc<dyn DispatchRepo>,
        messages: Arc<dyn MessageRepo>,
        outbox: Arc<Outbox>,
        mailer: Arc<dyn Mailer>,
        mail_from: String,
    ) -> Self {
        Self {
            incidents,
            people,
            dispatch,
            messages,
            outbox,
            mailer,
            mail_from,
        }
    }

    pub async fn responders_console(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
    ) -> Result<ResponderConsole, DomainError> {
        require_console(chapter)?;
        authorize(actor, Action::Read, SubjectKind::ResponderAssignment, chapter)?;
        let incident = self.incidents.find_incident(chapter.id, number).await?;

        let people: HashMap<i64, Person> = self
            .people
            .people_in_chapter(chapter.id)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let assignments = self.dispatch.assignments_for_incident(incident.id).await?;
        let recruitments: HashMap<i64, ResponderRecruitment> = self
            .dispatch
            .recruitments_for_incident(incident.id)
            .await?
            .into_iter()
            .map(|r| (r.person_id, r))
            .collect();

        let name_of = |id: i64| {
            people
                .get(&id)
                .map(Person::full_name)
                .unwrap_or_else(|| format!("Person #{id}"))
        };
        let distance_to = |person: &Person| -> Option<f64> {
            let from = person.location()?;
            let to = incident.location()?;
            Some((from.distance_miles(&to) * 10.0).round() / 10.0)
        };

        let mut assigned = Vec::new();
        let mut not_available = Vec::new();
        for a in &assignments {
            if a.was_available() {
                assigned.push(AssignedResponder {
                    assignment_id: a.id,
                    person_id: a.person_id,
                    name: name_of(a.person_id),
                    role: a.role,
                    role_label: a.role.label(),
                    status: a.status(),
                    status_caption: a.status().caption(),
                    status_time: a.status_time(),
                });
            } else {
                not_available.push(ResponderRow {
                    person_id: a.person_id,
                    name: name_of(a.person_id),
                    distance_miles: people.get(&a.person_id).and_then(distance_to),
                    label: Some(a.role.label()),
                    recruitment: recruitments.get(&a.person_id).map(|r| r.response),
                });
            }
        }

        let mut candidates = Vec::new();
        for person in people.values() {
            if assignments.iter().any(|a| a.person_id == person.id) {
                continue;
            }
            let recruitment = recruitments.get(&person.id).map(|r| r.response);
            let row = ResponderRow {
                person_id: person.id,
                name: person.full_name(),
                distance_miles: distance_to(person),
                label: recruitment.map(|r| r.label()),
                recruitment,
            };
            if recruitment == Some(RecruitmentResponse::Unavailable) {
                not_available.push(row);
            } else {
                candidates.push(row);
            }
        }
        // Available first, then closest.
        candidates.sort_by(|a, b| {
            let rank = |r: &ResponderRow| match r.recruitment {
                Some(RecruitmentResponse::Available) => 0,
                Some(RecruitmentResponse::Pending) => 1,
                _ => 2,
            };
            rank(a)
                .cmp(&rank(b))
                .then(
                    a.distance_miles
                        .unwrap_or(f64::MAX)
                        .total_cmp(&b.distance_miles.unwrap_or(f64::MAX)),
                )
                .then_with(|| a.name.cmp(&b.name))
        });
        not_available.sort_by(|a, b| a.name.cmp(&b.name));

        let incoming = self.messages.unacknowledged_for_incident(incident.id).await?;
        Ok(ResponderConsole {
            incident,
            assigned,
            candidates,
            not_available,
            incoming,
        })
    }

    pub async fn set_recruitment_message(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
        message: &str,
    ) -> Result<Incident, DomainError> {
        authorize(actor, Action::Update, SubjectKind::Incident, chapter)?;
        let mut incident = self.incidents.find_incident(chapter.id, number).await?;
        let message = message.trim();
        incident.recruitment_message = (!message.is_empty()).then(|| message.to_string());
        self.incidents.update_incident(&incident).await?;
        Ok(incident)
    }

    /// Ask a person by SMS whether they can respond.
    ///
    /// A pending request is left alone. After an answer, or when the last request never
    /// went out, a new request is sent and the response goes back to pending.
    pub async fn recruit(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
        person_id: i64,
    ) -> Result<ResponderRecruitment, DomainError> {
        require_messaging(chapter)?;
        authorize(actor, Action::Create, SubjectKind::ResponderMessage, chapter)?;
        let incident = self.open_incident(chapter, number).await?;
        let person = self.chapter_person(chapter, person_id).await?;

        let existing = self.dispatch.find_recruitment(incident.id, person.id).await?;
        if let Some(r) = existing.as_ref().filter(|r| r.is_awaiting_reply()) {
            info!(incident_id = incident.id, person_id, "recruitment already pending");
            return Ok(r.clone());
        }

        // Stored before the SMS goes out. A racing first request hits the unique row instead.
        let now = Utc::now();
        let recruitment = match existing {
            Some(mut r) => {
                r.reopen(now);
                r
            }
            None => ResponderRecruitment::new(incident.id, person.id, now),
        };
        let mut saved = self.dispatch.save_recruitment(&recruitment).await?;

        let body = recruitment_text(&incident);
        let sent = self
            .outbox
            .send_to_person(chapter, &person, Some(incident.id), &body)
            .await?;
        saved.outbound_message_id = Some(sent.id);
        let saved = self.dispatch.save_recruitment(&saved).await?;
        info!(incident_id = incident.id, person_id, "recruitment sent");
        Ok(saved)
    }

    /// Assign (or re-assign) a person with a role.
    pub async fn assign(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
        request: AssignRequest,
    ) -> Result<ResponderAssignment, DomainError> {
        require_console(chapter)?;
        authorize(actor, Action::Create, SubjectKind::ResponderAssignment, chapter)?;
        let incident = self.incidents.find_incident(chapter.id, number).await?;
        let person = self.chapter_person(chapter, request.person_id).await?;

        let existing = self.dispatch.assignments_for_incident(incident.id).await?;
        let now = Utc::now();
        let candidate = match existing.iter().find(|a| a.person_id == person.id) {
            Some(current) => {
                let mut updated = current.clone();
                updated.reassign(request.role);
                updated
            }
            None => ResponderAssignment::new(incident.id, person.id, request.role, now),
        };
        check_team_lead(&existing, &candidate)?;
        let saved = self
            .dispatch
            .save_assignment_logged(
                &candidate,
                &EventLog::new(incident.id, chapter.id, EventKind::ResponderAssigned, now)
                    .by(actor.id)
                    .with_message(format!("{} assigned as {}", person.full_name(), request.role.label())),
            )
            .await?;
        info!(
            incident_id = incident.id,
            person_id = person.id,
            role = %request.role,
            "responder assigned"
        );

        if saved.was_available() {
            if request.send_sms {
                let body = assignment_text(&incident, request.role);
                if let Err(e) = self
                    .outbox
                    .send_to_person(chapter, &person, Some(incident.id), &body)
                    .await
                {
                    warn!(error = %e, person_id = person.id, "assignment SMS not sent");
                }
            }
            if request.send_email {
                if let Err(e) = self.send_assignment_email(&incident, &person, request.role).await {
                    warn!(error = %e, person_id = person.id, "assignment email not sent");
                }
            }
        }
        Ok(saved)
    }

    /// Move an assignment one step forward. Repeating the current status changes nothing.
    pub async fn update_status(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
        assignment_id: i64,
        target: ResponderStatus,
    ) -> Result<StatusChange, DomainError> {
        require_console(chapter)?;
        authorize(actor, Action::Update, SubjectKind::ResponderAssignment, chapter)?;
        let incident = self.incidents.find_incident(chapter.id, number).await?;
        let mut assignment = self.incident_assignment(&incident, assignment_id).await?;

        let now = Utc::now();
        if !assignment.advance(target, now)? {
            return Ok(StatusChange { assignment, changed: false });
        }
        let person = self.people.get_person(assignment.person_id).await?;
        let event = EventLog::new(incident.id, chapter.id, target.event(), now)
            .by(actor.id)
            .with_message(format!("{} {}", person.full_name(), status_phrase(target)));
        if !self.dispatch.advance_assignment(&assignment, target, &event).await? {
            // Another request got there first.
            let assignment = self.dispatch.get_assignment(assignment_id).await?;
            return Ok(StatusChange { assignment, changed: false });
        }
        info!(assignment_id, status = %target, "responder status changed");
        Ok(StatusChange { assignment, changed: true })
    }

    /// Text every responder still on the response.
    pub async fn message_all(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
        body: &str,
    ) -> Result<Vec<ResponderMessage>, DomainError> {
        require_messaging(chapter)?;
        authorize(actor, Action::Create, SubjectKind::ResponderMessage, chapter)?;
        if body.trim().is_empty() {
            return Err(DomainError::invalid("message", "can't be blank"));
        }
        let incident = self.incidents.find_incident(chapter.id, number).await?;

        let mut sent = Vec::new();
        for assignment in self.dispatch.assignments_for_incident(incident.id).await? {
            if !assignment.is_active() {
                continue;
            }
            let person = self.people.get_person(assignment.person_id).await?;
            if person.sms_number.is_none() {
                warn!(person_id = person.id, "skipping responder without SMS number");
                continue;
            }
            sent.push(
                self.outbox
                    .send_to_person(chapter, &person, Some(incident.id), body)
                    .await?,
            );
        }
        info!(incident_id = incident.id, recipients = sent.len(), "message sent to all responders");
        Ok(sent)
    }

    /// Text one assigned responder: free text, the incident details, or a map link.
    pub async fn message_responder(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
        assignment_id: i64,
        message: DirectMessage,
    ) -> Result<ResponderMessage, DomainError> {
        require_messaging(chapter)?;
        authorize(actor, Action::Create, SubjectKind::ResponderMessage, chapter)?;
        let incident = self.incidents.find_incident(chapter.id, number).await?;
        let assignment = self.incident_assignment(&incident, assignment_id).await?;
        let person = self.people.get_person(assignment.person_id).await?;

        let body = match message.template {
            MessageTemplate::Custom => message.body.unwrap_or_default(),
            MessageTemplate::IncidentInfo => incident_details_text(&incident),
            MessageTemplate::MapLink => self.outbox.map_link_text(&incident).await?,
        };
        self.outbox
            .send_to_person(chapter, &person, Some(incident.id), &body)
            .await
    }

    async fn send_assignment_email(
        &self,
        incident: &Incident,
        person: &Person,
        role: AssignmentRole,
    ) -> Result<(), DomainError> {
        let to = person
            .mail_address()
            .ok_or_else(|| DomainError::invalid("email", "person has no email address"))?;
        let email = Email {
            from: self.mail_from.clone(),
            to,
            subject: format!("Incident {} Assignment", incident.incident_number),
            text_body: format!(
                "{},\n\n{}\n\n{}\n",
                person.first_name,
                assignment_text(incident, role),
                incident_details_text(incident)
            ),
            tags: vec!["incidents".into(), "assignment".into()],
            ..Default::default()
        };
        self.mailer.deliver(&email).await
    }

    async fn open_incident(&self, chapter: &Chapter, number: &str) -> Result<Incident, DomainError> {
        let incident = self.incidents.find_incident(chapter.id, number).await?;
        if !incident.is_open() {
            return Err(DomainError::InvalidTransition(format!(
                "incident {} is {}",
                incident.incident_number, incident.status
            )));
        }
        Ok(incident)
    }

    async fn chapter_person(&self, chapter: &Chapter, person_id: i64) -> Result<Person, DomainError> {
        let person = self.people.get_person(person_id).await?;
        if person.chapter_id != chapter.id {
            return Err(DomainError::not_found("person", person_id));
        }
        Ok(person)
    }

    async fn incident_assignment(
        &self,
        incident: &Incident,
        assignment_id: i64,
    ) -> Result<ResponderAssignment, DomainError> {
        let assignment = self.dispatch.get_assignment(assignment_id).await?;
        if assignment.incident_id != incident.id {
            return Err(DomainError::not_found("assignment", assignment_id));
        }
        Ok(assignment)
    }
}

fn authorize(actor: &Person, action: Action, kind: SubjectKind, chapter: &Chapter) -> Result<(), DomainError> {
    Ability::for_person(actor).authorize(action, &Subject::in_chapter(kind, chapter.id))
}

fn require_console(chapter: &Chapter) -> Result<(), DomainError> {
    if chapter.incidents_enable_dispatch_console {
        Ok(())
    } else {
        Err(DomainError::FeatureDisabled("dispatch console"))
    }
}

pub(crate) fn require_messaging(chapter: &Chapter) -> Result<(), DomainError> {
    if chapter.incidents_enable_messaging {
        Ok(())
    } else {
        Err(DomainError::FeatureDisabled("messaging"))
    }
}

fn recruitment_text(incident: &Incident) -> String {
    let request = incident
        .recruitment_message
        .clone()
        .unwrap_or_else(|| format!("DAT responders needed for {}.", incident_details_text(incident)));
    format!("{request} Reply YES if you are available or NO if not.")
}

fn assignment_text(incident: &Incident, role: AssignmentRole) -> String {
    let mut text = format!(
        "You have been assigned to incident {} as {}.",
        incident.incident_number,
        role.label()
    );
    let address = incident.short_address();
    if !address.is_empty() {
        text.push_str(&format!(" Location: {address}."));
    }
    text.push_str(" Reply INCIDENT for details or MAP for a map link.");
    text
}

fn status_phrase(status: ResponderStatus) -> &'static str {
    match status {
        ResponderStatus::Assigned => "assigned",
        ResponderStatus::Dispatched => "dispatched",
        ResponderStatus::OnScene => "on scene",
        ResponderStatus::Departed => "departed scene",
    }
}
