//! Incident service. Opening, editing and closing incidents, DAT submission, timelines.

use crate::domain::dat_incident::parse_form_time;
use crate::domain::incident::blank_to_none;
use crate::domain::{
    Ability, Action, Chapter, DatIncident, DomainError, EventKind, EventLog, Incident,
    IncidentStatus, NewIncident, Person, ResponderTime, Subject, SubjectKind, ValidationErrors,
};
use crate::ports::IncidentRepo;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Partial update of an incident. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentUpdate {
    pub incident_number: Option<String>,
    pub date: Option<NaiveDate>,
    pub status: Option<IncidentStatus>,
    pub incident_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub narrative: Option<String>,
    pub num_cases: Option<i64>,
}

/// DAT form submission. Responder times arrive as strings in chapter-local time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatSubmission {
    #[serde(default)]
    pub dat: DatIncident,
    pub responder_notified: Option<String>,
    pub responder_arrived: Option<String>,
    pub responder_departed: Option<String>,
}

pub struct IncidentService {
    incidents: Arc<dyn IncidentRepo>,
}

impl IncidentService {
    pub fn new(incidents: Arc<dyn IncidentRepo>) -> Self {
        Self { incidents }
    }

    pub async fn create_incident(
        &self,
        actor: &Person,
        chapter: &Chapter,
        attrs: NewIncident,
    ) -> Result<Incident, DomainError> {
        Ability::for_person(actor)
            .authorize(Action::Create, &Subject::in_chapter(SubjectKind::Incident, chapter.id))?;
        let incident = attrs.into_incident(chapter, Utc::now());
        incident.validate_attributes(chapter)?;
        let created = self
            .incidents
            .create_incident(&incident, chapter, chapter.today())
            .await?;
        info!(incident_id = created.id, number = %created.incident_number, "incident opened");
        Ok(created)
    }

    pub async fn get_incident(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
    ) -> Result<Incident, DomainError> {
        Ability::for_person(actor)
            .authorize(Action::Read, &Subject::in_chapter(SubjectKind::Incident, chapter.id))?;
        self.incidents.find_incident(chapter.id, number).await
    }

    pub async fn update_incident(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
        update: IncidentUpdate,
    ) -> Result<Incident, DomainError> {
        self.authorize_report_edit(actor, chapter, SubjectKind::Incident)?;
        let mut incident = self.incidents.find_incident(chapter.id, number).await?;

        if update.status == Some(IncidentStatus::Closed) {
            return Err(DomainError::invalid("status", "use close to close an incident"));
        }
        if let Some(n) = update.incident_number {
            incident.incident_number = n.trim().to_string();
        }
        if let Some(date) = update.date {
            incident.date = date;
        }
        if let Some(status) = update.status {
            incident.status = status;
        }
        for (target, value) in [
            (&mut incident.incident_type, update.incident_type),
            (&mut incident.address, update.address),
            (&mut incident.city, update.city),
            (&mut incident.county, update.county),
            (&mut incident.state, update.state),
            (&mut incident.zip, update.zip),
            (&mut incident.narrative, update.narrative),
        ] {
            if value.is_some() {
                *target = blank_to_none(value);
            }
        }
        if update.lat.is_some() {
            incident.lat = update.lat;
        }
        if update.lng.is_some() {
            incident.lng = update.lng;
        }
        if let Some(cases) = update.num_cases {
            incident.num_cases = cases;
        }

        incident.validate(chapter)?;
        self.incidents.update_incident(&incident).await?;
        info!(incident_id = incident.id, status = %incident.status, "incident updated");
        Ok(incident)
    }

    /// Save the DAT record, copy it into the incident, and mirror its times on the timeline.
    pub async fn submit_dat(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
        submission: DatSubmission,
    ) -> Result<DatIncident, DomainError> {
        self.authorize_report_edit(actor, chapter, SubjectKind::DatIncident)?;
        let mut incident = self.incidents.find_incident(chapter.id, number).await?;
        let existing = self.incidents.get_dat_incident(incident.id).await?;

        let mut dat = submission.dat;
        dat.id = existing.map(|d| d.id).unwrap_or(0);
        dat.incident_id = incident.id;
        dat.normalize();

        let mut errors = ValidationErrors::new();
        for (which, raw) in [
            (ResponderTime::Notified, submission.responder_notified),
            (ResponderTime::Arrived, submission.responder_arrived),
            (ResponderTime::Departed, submission.responder_departed),
        ] {
            let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
                continue;
            };
            match parse_form_time(which, &raw, chapter.time_zone()) {
                Ok(at) => dat.set_responder_time(which, Some(at)),
                Err(message) => {
                    dat.set_responder_time(which, None);
                    errors.add(which.field(), message);
                }
            }
        }
        if let Err(DomainError::Validation(dat_errors)) = dat.validate(chapter) {
            errors.merge(dat_errors);
        }
        errors.into_result()?;

        incident.apply_dat(&dat);
        let timeline: Vec<EventLog> = dat
            .timeline_events()
            .into_iter()
            .map(|(kind, at)| EventLog::new(incident.id, chapter.id, kind, at).by(actor.id))
            .collect();
        let saved = self.incidents.save_dat_incident(&dat, &incident, &timeline).await?;
        info!(incident_id = incident.id, dat_id = saved.id, "DAT record submitted");
        Ok(saved)
    }

    pub async fn close_incident(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
    ) -> Result<Incident, DomainError> {
        self.authorize_report_edit(actor, chapter, SubjectKind::Incident)?;
        let mut incident = self.incidents.find_incident(chapter.id, number).await?;
        let dat = self.incidents.get_dat_incident(incident.id).await?;
        incident.close(chapter, dat.as_ref())?;
        self.incidents
            .update_incident_logged(
                &incident,
                &EventLog::new(incident.id, chapter.id, EventKind::IncidentClosed, Utc::now())
                    .by(actor.id)
                    .with_message(format!("Closed by {}", actor.full_name())),
            )
            .await?;
        info!(incident_id = incident.id, "incident closed");
        Ok(incident)
    }

    /// Timeline, newest first.
    pub async fn timeline(
        &self,
        actor: &Person,
        chapter: &Chapter,
        number: &str,
    ) -> Result<Vec<EventLog>, DomainError> {
        Ability::for_person(actor)
            .authorize(Action::Read, &Subject::in_chapter(SubjectKind::EventLog, chapter.id))?;
        let incident = self.incidents.find_incident(chapter.id, number).await?;
        self.incidents.event_logs(incident.id).await
    }

    /// Report submitters may only edit when the chapter allows it; incident admins always can.
    fn authorize_report_edit(
        &self,
        actor: &Person,
        chapter: &Chapter,
        kind: SubjectKind,
    ) -> Result<(), DomainError> {
        let ability = Ability::for_person(actor);
        let subject = Subject::in_chapter(kind, chapter.id);
        ability.authorize(Action::Update, &subject)?;
        if !chapter.incidents_report_editable && !ability.allows(Action::Manage, &subject) {
            return Err(DomainError::FeatureDisabled("incident report editing"));
        }
        Ok(())
    }
}
