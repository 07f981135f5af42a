//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{
    Chapter, DatIncident, DateRange, DomainError, EventLog, Incident, IncidentStats, LatLng,
    Person, ResponderAssignment, ResponderMessage, ResponderRecruitment, ResponderStatus,
};
use std::collections::BTreeMap;

/// Chapters (tenants).
#[async_trait::async_trait]
pub trait ChapterRepo: Send + Sync {
    async fn create_chapter(&self, chapter: &Chapter) -> Result<Chapter, DomainError>;

    async fn get_chapter(&self, id: i64) -> Result<Chapter, DomainError>;

    async fn find_chapter_by_slug(&self, slug: &str) -> Result<Chapter, DomainError>;

    async fn list_chapters(&self) -> Result<Vec<Chapter>, DomainError>;
}

/// People (volunteers and staff).
#[async_trait::async_trait]
pub trait PersonRepo: Send + Sync {
    async fn create_person(&self, person: &Person) -> Result<Person, DomainError>;

    async fn get_person(&self, id: i64) -> Result<Person, DomainError>;

    /// Match an inbound SMS sender. `normalized` is digits only (see `normalize_phone`).
    async fn find_person_by_sms_number(&self, normalized: &str) -> Result<Option<Person>, DomainError>;

    async fn people_in_chapter(&self, chapter_id: i64) -> Result<Vec<Person>, DomainError>;
}

/// Incidents, DAT records and timelines.
#[async_trait::async_trait]
pub trait IncidentRepo: Send + Sync {
    /// Insert with the next number from the chapter sequence, atomically.
    /// `today` is the chapter-local date that drives the sequence year.
    async fn create_incident(
        &self,
        incident: &Incident,
        chapter: &Chapter,
        today: chrono::NaiveDate,
    ) -> Result<Incident, DomainError>;

    async fn update_incident(&self, incident: &Incident) -> Result<(), DomainError>;

    async fn get_incident(&self, id: i64) -> Result<Incident, DomainError>;

    async fn find_incident(&self, chapter_id: i64, number: &str) -> Result<Incident, DomainError>;

    /// Valid (non-invalid) incidents dated within `range`, ordered by date.
    async fn valid_incidents_in_range(
        &self,
        chapter_id: i64,
        range: DateRange,
    ) -> Result<Vec<Incident>, DomainError>;

    async fn incident_stats(&self, chapter_id: i64, range: DateRange) -> Result<IncidentStats, DomainError>;

    /// Sum of each resource over DAT records of valid incidents in range; missing counts as 0.
    async fn count_resources(
        &self,
        chapter_id: i64,
        range: DateRange,
        resources: &[String],
    ) -> Result<BTreeMap<String, i64>, DomainError>;

    async fn get_dat_incident(&self, incident_id: i64) -> Result<Option<DatIncident>, DomainError>;

    /// Insert or replace the DAT record, the incident it updated and its timeline entries,
    /// in one transaction.
    async fn save_dat_incident(
        &self,
        dat: &DatIncident,
        incident: &Incident,
        timeline: &[EventLog],
    ) -> Result<DatIncident, DomainError>;

    /// `update_incident` plus a timeline entry, in one transaction.
    async fn update_incident_logged(&self, incident: &Incident, event: &EventLog) -> Result<(), DomainError>;

    /// Append a timeline entry. Singular kinds (DAT timestamps) replace the existing entry.
    async fn record_event(&self, event: &EventLog) -> Result<EventLog, DomainError>;

    /// Newest first.
    async fn event_logs(&self, incident_id: i64) -> Result<Vec<EventLog>, DomainError>;
}

/// Responder assignments and recruitments.
#[async_trait::async_trait]
pub trait DispatchRepo: Send + Sync {
    /// Insert (id == 0) or update. At most one team lead per incident.
    async fn save_assignment(&self, assignment: &ResponderAssignment) -> Result<ResponderAssignment, DomainError>;

    /// `save_assignment` plus its timeline entry, in one transaction.
    async fn save_assignment_logged(
        &self,
        assignment: &ResponderAssignment,
        event: &EventLog,
    ) -> Result<ResponderAssignment, DomainError>;

    /// Store an assignment already advanced to `target`, with its timeline entry, in one
    /// transaction. Returns false (and writes nothing) when the stored row has already
    /// reached `target`.
    async fn advance_assignment(
        &self,
        assignment: &ResponderAssignment,
        target: ResponderStatus,
        event: &EventLog,
    ) -> Result<bool, DomainError>;

    async fn get_assignment(&self, id: i64) -> Result<ResponderAssignment, DomainError>;

    async fn assignments_for_incident(&self, incident_id: i64) -> Result<Vec<ResponderAssignment>, DomainError>;

    /// The person's available, not-departed assignment on an open incident, most recent first.
    async fn active_assignment_for_person(
        &self,
        person_id: i64,
    ) -> Result<Option<ResponderAssignment>, DomainError>;

    async fn save_recruitment(
        &self,
        recruitment: &ResponderRecruitment,
    ) -> Result<ResponderRecruitment, DomainError>;

    async fn find_recruitment(
        &self,
        incident_id: i64,
        person_id: i64,
    ) -> Result<Option<ResponderRecruitment>, DomainError>;

    /// The person's most recent recruitment on an open incident.
    async fn latest_open_recruitment(
        &self,
        person_id: i64,
    ) -> Result<Option<ResponderRecruitment>, DomainError>;

    async fn recruitments_for_incident(
        &self,
        incident_id: i64,
    ) -> Result<Vec<ResponderRecruitment>, DomainError>;
}

/// Responder messages.
#[async_trait::async_trait]
pub trait MessageRepo: Send + Sync {
    async fn save_message(&self, message: &ResponderMessage) -> Result<ResponderMessage, DomainError>;

    async fn get_message(&self, id: i64) -> Result<ResponderMessage, DomainError>;

    async fn set_acknowledged(&self, id: i64, acknowledged: bool) -> Result<(), DomainError>;

    /// Unacknowledged incoming messages linked to the incident, newest first.
    async fn unacknowledged_for_incident(&self, incident_id: i64) -> Result<Vec<ResponderMessage>, DomainError>;

    async fn messages_for_person(&self, person_id: i64) -> Result<Vec<ResponderMessage>, DomainError>;
}

/// Outbound SMS.
#[async_trait::async_trait]
pub trait SmsGateway: Send + Sync {
    /// Our sending number, recorded on stored messages.
    fn from_number(&self) -> Option<String>;

    /// Send `body` to `to`. Returns the gateway's message id when it reports one.
    async fn send_sms(&self, to: &str, body: &str) -> Result<Option<String>, DomainError>;
}

/// Outbound email.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, email: &Email) -> Result<(), DomainError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub tags: Vec<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Long URL -> short URL (SMS bodies).
#[async_trait::async_trait]
pub trait UrlShortener: Send + Sync {
    async fn shorten(&self, long_url: &str) -> Result<String, DomainError>;
}

/// Map links and static map images.
#[async_trait::async_trait]
pub trait MapProvider: Send + Sync {
    /// Link that opens a map centred on `location`.
    fn location_link(&self, location: &LatLng) -> String;

    /// Static image URL with one marker per location.
    fn static_map_url(&self, markers: &[LatLng], width: u32, height: u32, retina: bool) -> String;

    async fn fetch_image(&self, url: &str) -> Result<MapImage, DomainError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapImage {
    pub content_type: String,
    pub data: Vec<u8>,
}
