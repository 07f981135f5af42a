//! Request and response bodies that don't map 1:1 onto domain types.

use crate::domain::{Chapter, DateRange, DomainError, Person, ResponderStatus, RoleGrant};
use crate::ports::Email;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterPayload {
    pub name: String,
    pub short_name: String,
    pub url_slug: String,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub incidents_report_advanced_details: bool,
    #[serde(default = "yes")]
    pub incidents_report_editable: bool,
    #[serde(default)]
    pub incidents_enable_dispatch_console: bool,
    #[serde(default)]
    pub incidents_enable_messaging: bool,
    #[serde(default)]
    pub incidents_resources_tracked: Vec<String>,
    #[serde(default)]
    pub incident_number_prefix: String,
}

impl From<ChapterPayload> for Chapter {
    fn from(p: ChapterPayload) -> Self {
        Chapter {
            id: 0,
            name: p.name,
            short_name: p.short_name,
            url_slug: p.url_slug,
            utc_offset_minutes: p.utc_offset_minutes,
            incidents_report_advanced_details: p.incidents_report_advanced_details,
            incidents_report_editable: p.incidents_report_editable,
            incidents_enable_dispatch_console: p.incidents_enable_dispatch_console,
            incidents_enable_messaging: p.incidents_enable_messaging,
            incidents_resources_tracked: p.incidents_resources_tracked,
            incident_number_prefix: p.incident_number_prefix,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub sms_number: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
}

impl PersonPayload {
    pub fn into_person(self, chapter_id: i64) -> Person {
        Person {
            id: 0,
            chapter_id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            sms_number: self.sms_number,
            lat: self.lat,
            lng: self.lng,
            roles: self.roles,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecruitmentMessagePayload {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecruitPayload {
    pub person_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub status: ResponderStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastPayload {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    pub recipient_id: i64,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ReportRequest {
    /// None means the default window (last week).
    pub fn range(&self) -> Result<Option<DateRange>, DomainError> {
        match (self.start, self.end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => DateRange::new(start, end).map(Some),
            _ => Err(DomainError::invalid("date_range", "needs both start and end")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDelivery {
    pub to: String,
    pub subject: String,
    pub attachments: Vec<String>,
}

impl From<Email> for ReportDelivery {
    fn from(email: Email) -> Self {
        Self {
            to: email.to,
            subject: email.subject,
            attachments: email.attachments.into_iter().map(|a| a.filename).collect(),
        }
    }
}

/// Gateway webhook form. Twilio posts capitalised field names.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundSms {
    #[serde(alias = "From")]
    pub from: String,
    #[serde(alias = "To", default)]
    pub to: String,
    #[serde(alias = "Body", default)]
    pub body: String,
}
