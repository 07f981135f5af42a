//! Incident: the disaster event record, plus its validation rules.

use super::chapter::Chapter;
use super::dat_incident::DatIncident;
use super::errors::{DomainError, ValidationErrors};
use super::geo::LatLng;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

// `\w` and `\d` in ASCII form; Rust's classes are Unicode by default.
static INCIDENT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?-u:\w)*[0-9]{2}-[0-9]{3,}$").unwrap());

pub const MAIN_INCIDENT_TYPES: &[&str] = &[
    "fire",
    "flood",
    "police",
    "vacate",
    "tornado",
    "blizzard",
    "storm",
    "transportation",
    "hazmat",
    "explosion",
    "search_and_rescue",
    "earthquake",
    "building_collapse",
    "exercise",
    "hurricane",
];

pub const EXTENDED_INCIDENT_TYPES: &[&str] = &[
    "outreach",
    "dhs",
    "drought",
    "epidemic",
    "food",
    "hpd",
    "hra",
    "mass_care",
    "nuclear",
    "other",
    "refugee",
    "volcano",
    "client_services_request",
    "power_outage",
];

pub const INVALID_INCIDENT_TYPES: &[&str] = &[
    "invalid",
    "duplicate",
    "not_eligible_for_services",
    "no_response_needed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Closed,
    Invalid,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Closed => "closed",
            IncidentStatus::Invalid => "invalid",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(IncidentStatus::Open),
            "closed" => Ok(IncidentStatus::Closed),
            "invalid" => Ok(IncidentStatus::Invalid),
            other => Err(DomainError::invalid("status", format!("{other} is not a status"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub chapter_id: i64,
    pub incident_number: String,
    pub date: NaiveDate,
    pub status: IncidentStatus,
    pub incident_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub narrative: Option<String>,
    pub num_adults: i64,
    pub num_children: i64,
    pub num_families: i64,
    pub num_cases: i64,
    pub response_date: Option<NaiveDate>,
    /// Body of the SMS sent when recruiting responders.
    pub recruitment_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Attributes accepted when opening an incident. The number is assigned on insert.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewIncident {
    pub date: Option<NaiveDate>,
    pub incident_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub narrative: Option<String>,
}

impl NewIncident {
    /// Build an open incident for `chapter`. `incident_number` stays empty until insert.
    pub fn into_incident(self, chapter: &Chapter, now: DateTime<Utc>) -> Incident {
        Incident {
            id: 0,
            chapter_id: chapter.id,
            incident_number: String::new(),
            date: self.date.unwrap_or_else(|| chapter.date_at(now)),
            status: IncidentStatus::Open,
            incident_type: blank_to_none(self.incident_type),
            address: blank_to_none(self.address),
            city: blank_to_none(self.city),
            county: blank_to_none(self.county),
            state: blank_to_none(self.state),
            zip: blank_to_none(self.zip),
            lat: self.lat,
            lng: self.lng,
            narrative: blank_to_none(self.narrative),
            num_adults: 0,
            num_children: 0,
            num_families: 0,
            num_cases: 0,
            response_date: None,
            recruitment_message: None,
            created_at: now,
        }
    }
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.status == IncidentStatus::Open
    }

    pub fn is_invalid(&self) -> bool {
        self.status == IncidentStatus::Invalid
    }

    /// Types selectable for this incident given its chapter and status.
    pub fn assignable_incident_types(&self, chapter: &Chapter) -> Vec<&'static str> {
        if self.is_invalid() {
            return INVALID_INCIDENT_TYPES.to_vec();
        }
        let mut types = MAIN_INCIDENT_TYPES.to_vec();
        if chapter.incidents_report_advanced_details {
            types.extend_from_slice(EXTENDED_INCIDENT_TYPES);
        }
        types
    }

    /// Full validation. Number uniqueness is enforced by the repository.
    pub fn validate(&self, chapter: &Chapter) -> Result<(), DomainError> {
        let mut errors = self.attribute_errors(chapter);
        if !is_valid_incident_number(&self.incident_number) {
            errors.add("incident_number", "is invalid");
        }
        errors.into_result()
    }

    /// Everything except the number, which is not assigned until insert.
    pub fn validate_attributes(&self, chapter: &Chapter) -> Result<(), DomainError> {
        self.attribute_errors(chapter).into_result()
    }

    fn attribute_errors(&self, chapter: &Chapter) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if self.chapter_id != chapter.id {
            errors.add("chapter", "does not match");
        }
        if let Some(t) = self.incident_type.as_deref() {
            if !self.assignable_incident_types(chapter).contains(&t) {
                errors.add("incident_type", "is not included in the list");
            }
        }
        for (field, n) in [
            ("num_adults", self.num_adults),
            ("num_children", self.num_children),
            ("num_families", self.num_families),
            ("num_cases", self.num_cases),
        ] {
            if n < 0 {
                errors.add(field, "must be greater than or equal to 0");
            }
        }

        match self.status {
            IncidentStatus::Open => {}
            IncidentStatus::Closed => {
                errors.require_text("incident_type", self.incident_type.as_deref());
                errors.require_text("narrative", self.narrative.as_deref());
                errors.require_text("address", self.address.as_deref());
                errors.require_text("city", self.city.as_deref());
                errors.require_text("state", self.state.as_deref());
            }
            IncidentStatus::Invalid => {
                errors.require_text("incident_type", self.incident_type.as_deref());
                errors.require_text("narrative", self.narrative.as_deref());
            }
        }

        errors
    }

    /// Close the incident. Requires a valid DAT record.
    pub fn close(&mut self, chapter: &Chapter, dat: Option<&DatIncident>) -> Result<(), DomainError> {
        let dat = dat.ok_or_else(|| {
            DomainError::invalid("dat_incident", "must be completed before closing")
        })?;
        dat.validate(chapter)?;
        let mut closed = self.clone();
        closed.status = IncidentStatus::Closed;
        closed.response_date = Some(chapter.today());
        closed.validate(chapter)?;
        *self = closed;
        Ok(())
    }

    /// Copy demographics and any present address fields from the DAT record.
    pub fn apply_dat(&mut self, dat: &DatIncident) {
        self.num_adults = dat.num_adults.unwrap_or(self.num_adults);
        self.num_children = dat.num_children.unwrap_or(self.num_children);
        self.num_families = dat.num_families.unwrap_or(self.num_families);
        for (target, source) in [
            (&mut self.address, &dat.address),
            (&mut self.city, &dat.city),
            (&mut self.state, &dat.state),
            (&mut self.zip, &dat.zip),
        ] {
            if let Some(v) = source.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *target = Some(v.to_string());
            }
        }
    }

    pub fn to_label(&self) -> String {
        let date = self.date.to_string();
        [
            Some(self.incident_number.as_str()),
            self.county.as_deref(),
            Some(date.as_str()),
            self.incident_type.as_deref(),
            self.address.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn county_state(&self) -> String {
        format!(
            "{}, {}",
            self.county.as_deref().unwrap_or_default(),
            self.state.as_deref().unwrap_or_default()
        )
    }

    pub fn location(&self) -> Option<LatLng> {
        LatLng::from_coords(self.lat, self.lng)
    }

    /// One-line address for SMS bodies.
    pub fn short_address(&self) -> String {
        [self.address.as_deref(), self.city.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Aggregate counts over valid incidents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IncidentStats {
    pub incident_count: i64,
    pub case_count: i64,
    pub family_count: i64,
    pub client_count: i64,
    pub num_adults: i64,
    pub num_children: i64,
}

/// Optional word-character prefix, two-digit year, dash, counter of three or more digits.
pub fn is_valid_incident_number(number: &str) -> bool {
    INCIDENT_NUMBER.is_match(number)
}

/// "search_and_rescue" -> "Search And Rescue"
pub fn humanize(value: &str) -> String {
    value
        .split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) fn sample_incident(chapter: &Chapter) -> Incident {
    let now = Utc::now();
    let mut incident = NewIncident {
        date: NaiveDate::from_ymd_opt(2025, 1, 7),
        incident_type: Some("fire".into()),
        address: Some("1663 Market St".into()),
        city: Some("San Francisco".into()),
        county: Some("San Francisco".into()),
        state: Some("CA".into()),
        zip: Some("94103".into()),
        lat: Some(37.7726),
        lng: Some(-122.4212),
        narrative: None,
    }
    .into_incident(chapter, now);
    incident.id = 1;
    incident.incident_number = "25-001".into();
    incident
}
