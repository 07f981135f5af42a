//! People: volunteers and staff belonging to a chapter.

use super::errors::{DomainError, ValidationErrors};
use super::geo::LatLng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").unwrap());

/// Role grants that drive authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleGrant {
    ChapterConfig,
    ChapterAdmin,
    IncidentsAdmin,
    SubmitIncidentReport,
}

impl RoleGrant {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleGrant::ChapterConfig => "chapter_config",
            RoleGrant::ChapterAdmin => "chapter_admin",
            RoleGrant::IncidentsAdmin => "incidents_admin",
            RoleGrant::SubmitIncidentReport => "submit_incident_report",
        }
    }
}

impl fmt::Display for RoleGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleGrant {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chapter_config" => Ok(RoleGrant::ChapterConfig),
            "chapter_admin" => Ok(RoleGrant::ChapterAdmin),
            "incidents_admin" => Ok(RoleGrant::IncidentsAdmin),
            "submit_incident_report" => Ok(RoleGrant::SubmitIncidentReport),
            other => Err(DomainError::invalid("roles", format!("{other} is not a role"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub chapter_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    /// Mobile number for SMS, stored as entered.
    pub sms_number: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn has_role(&self, role: RoleGrant) -> bool {
        self.roles.contains(&role)
    }

    /// `Full Name <email>` for mail headers.
    pub fn mail_address(&self) -> Option<String> {
        let email = self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        Some(format!("{} <{}>", self.full_name(), email))
    }

    pub fn location(&self) -> Option<LatLng> {
        LatLng::from_coords(self.lat, self.lng)
    }

    pub fn normalized_sms_number(&self) -> Option<String> {
        self.sms_number
            .as_deref()
            .map(normalize_phone)
            .filter(|n| !n.is_empty())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = ValidationErrors::new();
        errors.require_text("first_name", Some(&self.first_name));
        errors.require_text("last_name", Some(&self.last_name));
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            if !EMAIL.is_match(email.trim()) {
                errors.add("email", "is invalid");
            }
        }
        if let Some(number) = self.sms_number.as_deref().filter(|n| !n.trim().is_empty()) {
            if normalize_phone(number).len() < 10 {
                errors.add("sms_number", "is not a valid phone number");
            }
        }
        errors.into_result()
    }
}

/// Digits only; a leading US country code on an 11-digit number is dropped.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('1') {
        Some(rest) if digits.len() == 11 => rest.to_string(),
        _ => digits,
    }
}

#[cfg(test)]
pub(crate) fn sample_person(id: i64, last_name: &str) -> Person {
    Person {
        id,
        chapter_id: 1,
        first_name: "Pat".into(),
        last_name: last_name.into(),
        email: Some(format!("{}@example.org", last_name.to_lowercase())),
        sms_number: Some(format!("(510) 555-{:04}", id)),
        lat: Some(37.80),
        lng: Some(-122.27),
        roles: Vec::new(),
    }
}
