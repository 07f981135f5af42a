//! DAT (Disaster Assessment Team) detail record: damage, demographics and resources.

use super::chapter::Chapter;
use super::errors::{DomainError, ValidationErrors};
use super::event_log::EventKind;
use super::incident::humanize;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CALL_TYPES: &[&str] = &["hot", "cold"];

pub const STRUCTURE_TYPES: &[&str] = &[
    "single_family_home",
    "apartment",
    "sro",
    "mobile_home",
    "commercial",
    "none",
];

/// Which of the three responder timestamps a form value targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderTime {
    Notified,
    Arrived,
    Departed,
}

impl ResponderTime {
    pub fn field(&self) -> &'static str {
        match self {
            ResponderTime::Notified => "responder_notified",
            ResponderTime::Arrived => "responder_arrived",
            ResponderTime::Departed => "responder_departed",
        }
    }

    pub fn label(&self) -> String {
        humanize(self.field())
    }

    /// Timeline entry mirrored from this timestamp.
    pub fn timeline_event(&self) -> EventKind {
        match self {
            ResponderTime::Notified => EventKind::DatReceived,
            ResponderTime::Arrived => EventKind::DatOnScene,
            ResponderTime::Departed => EventKind::DatDepartedScene,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatIncident {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub incident_id: i64,
    pub incident_call_type: Option<String>,
    pub structure_type: Option<String>,

    pub address: Option<String>,
    pub cross_street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,

    pub units_affected: Option<i64>,
    pub units_minor: Option<i64>,
    pub units_major: Option<i64>,
    pub units_destroyed: Option<i64>,

    pub num_adults: Option<i64>,
    pub num_children: Option<i64>,
    pub num_families: Option<i64>,
    pub num_people_injured: Option<i64>,
    pub num_people_hospitalized: Option<i64>,
    pub num_people_deceased: Option<i64>,

    pub responder_notified: Option<DateTime<Utc>>,
    pub responder_arrived: Option<DateTime<Utc>>,
    pub responder_departed: Option<DateTime<Utc>>,

    pub completed_by_id: Option<i64>,
    #[serde(default)]
    pub vehicle_ids: Vec<i64>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Resource type -> quantity distributed.
    #[serde(default)]
    pub resources: BTreeMap<String, i64>,
}

impl DatIncident {
    pub fn responder_time(&self, which: ResponderTime) -> Option<DateTime<Utc>> {
        match which {
            ResponderTime::Notified => self.responder_notified,
            ResponderTime::Arrived => self.responder_arrived,
            ResponderTime::Departed => self.responder_departed,
        }
    }

    pub fn set_responder_time(&mut self, which: ResponderTime, value: Option<DateTime<Utc>>) {
        match which {
            ResponderTime::Notified => self.responder_notified = value,
            ResponderTime::Arrived => self.responder_arrived = value,
            ResponderTime::Departed => self.responder_departed = value,
        }
    }

    /// Drop blank list entries submitted by multi-select form fields.
    pub fn normalize(&mut self) {
        self.languages.retain(|l| !l.trim().is_empty());
        self.services.retain(|s| !s.trim().is_empty());
    }

    pub fn units_total(&self) -> i64 {
        [
            self.units_affected,
            self.units_minor,
            self.units_major,
            self.units_destroyed,
        ]
        .into_iter()
        .flatten()
        .sum()
    }

    pub fn resource(&self, name: &str) -> i64 {
        self.resources.get(name).copied().unwrap_or(0)
    }

    pub fn validate(&self, chapter: &Chapter) -> Result<(), DomainError> {
        let mut errors = ValidationErrors::new();

        for (field, value) in [
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("zip", &self.zip),
        ] {
            errors.require_text(field, value.as_deref());
        }

        for (field, value) in [
            ("units_affected", self.units_affected),
            ("units_minor", self.units_minor),
            ("units_major", self.units_major),
            ("units_destroyed", self.units_destroyed),
            ("num_adults", self.num_adults),
            ("num_children", self.num_children),
            ("num_families", self.num_families),
            ("num_people_injured", self.num_people_injured),
            ("num_people_hospitalized", self.num_people_hospitalized),
            ("num_people_deceased", self.num_people_deceased),
        ] {
            errors.require_non_negative(field, value);
        }

        for which in [
            ResponderTime::Notified,
            ResponderTime::Arrived,
            ResponderTime::Departed,
        ] {
            if self.responder_time(which).is_none() {
                errors.add(which.field(), "can't be blank");
            }
        }
        self.validate_time_order(&mut errors);

        if self.completed_by_id.is_none() {
            errors.add("completed_by", "can't be blank");
        }
        if self.vehicle_ids.is_empty() {
            errors.add("vehicle_uses", "can't be blank");
        }

        if let Some(t) = self.incident_call_type.as_deref() {
            if !CALL_TYPES.contains(&t) {
                errors.add("incident_call_type", "is not included in the list");
            }
        }
        if let Some(t) = self.structure_type.as_deref() {
            if !STRUCTURE_TYPES.contains(&t) {
                errors.add("structure_type", "is not included in the list");
            }
        }

        for resource in &chapter.incidents_resources_tracked {
            errors.require_non_negative(resource, self.resources.get(resource).copied());
        }

        errors.into_result()
    }

    /// `notified <= arrived <= departed`; the message lands on the later field.
    fn validate_time_order(&self, errors: &mut ValidationErrors) {
        for (first, second) in [
            (ResponderTime::Notified, ResponderTime::Arrived),
            (ResponderTime::Arrived, ResponderTime::Departed),
        ] {
            let (Some(first_at), Some(second_at)) =
                (self.responder_time(first), self.responder_time(second))
            else {
                continue;
            };
            if first_at > second_at {
                errors.add(
                    second.field(),
                    format!("{} must come before {}", first.label(), second.label()),
                );
            }
        }
    }

    /// Timeline entries derived from the responder timestamps that are set.
    pub fn timeline_events(&self) -> Vec<(EventKind, DateTime<Utc>)> {
        [
            ResponderTime::Notified,
            ResponderTime::Arrived,
            ResponderTime::Departed,
        ]
        .into_iter()
        .filter_map(|which| {
            self.responder_time(which)
                .map(|at| (which.timeline_event(), at))
        })
        .collect()
    }
}

/// Parse a form time in the chapter's zone. Accepts RFC 3339 or local
/// `YYYY-MM-DD HH:MM[:SS]` / `YYYY-MM-DDTHH:MM[:SS]`.
pub fn parse_form_time(
    which: ResponderTime,
    raw: &str,
    zone: FixedOffset,
) -> Result<DateTime<Utc>, String> {
    let value = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    const LOCAL_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];
    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .and_then(|naive| zone.from_local_datetime(&naive).single())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| format!("Invalid time format for {}: {}.", which.label(), raw))
}

#[cfg(test)]
pub(crate) fn sample_dat(incident_id: i64) -> DatIncident {
    use chrono::Duration;
    let notified = Utc.with_ymd_and_hms(2025, 1, 7, 3, 10, 0).unwrap();
    DatIncident {
        incident_id,
        incident_call_type: Some("hot".into()),
        structure_type: Some("apartment".into()),
        address: Some("1663 Market St".into()),
        city: Some("San Francisco".into()),
        state: Some("CA".into()),
        zip: Some("94103".into()),
        units_affected: Some(2),
        units_minor: Some(1),
        units_major: Some(1),
        units_destroyed: Some(0),
        num_adults: Some(3),
        num_children: Some(1),
        num_families: Some(1),
        num_people_injured: Some(0),
        num_people_hospitalized: Some(0),
        num_people_deceased: Some(0),
        responder_notified: Some(notified),
        responder_arrived: Some(notified + Duration::minutes(40)),
        responder_departed: Some(notified + Duration::minutes(150)),
        completed_by_id: Some(1),
        vehicle_ids: vec![3],
        resources: BTreeMap::from([("blankets".into(), 4), ("comfort_kits".into(), 3)]),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chapter::sample_chapter;
    use chrono::Duration;

    #[test]
    fn test_sample_is_valid() {
        assert!(sample_dat(1).validate(&sample_chapter()).is_ok());
    }

    #[test]
    fn test_times_out_of_order() {
        let mut dat = sample_dat(1);
        let notified = dat.responder_notified.unwrap();
        dat.responder_arrived = Some(notified - Duration::minutes(5));
        let Err(DomainError::Validation(errors)) = dat.validate(&sample_chapter()) else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.get("responder_arrived"),
            &["Responder Notified must come before Responder Arrived".to_string()]
        );
        assert!(!errors.contains("responder_departed"));
    }

    #[test]
    fn test_equal_times_are_allowed() {
        let mut dat = sample_dat(1);
        dat.responder_arrived = dat.responder_notified;
        dat.responder_departed = dat.responder_notified;
        assert!(dat.validate(&sample_chapter()).is_ok());
    }

    #[test]
    fn test_negative_counts_and_tracked_resources() {
        let mut dat = sample_dat(1);
        dat.num_people_injured = Some(-1);
        dat.resources.remove("blankets");
        dat.resources.insert("toys".into(), -3); // not tracked by the sample chapter
        let Err(DomainError::Validation(errors)) = dat.validate(&sample_chapter()) else {
            panic!("expected validation error");
        };
        assert!(errors.contains("num_people_injured"));
        assert!(errors.contains("blankets"));
        assert!(!errors.contains("toys"));
    }

    #[test]
    fn test_requires_completed_by_and_vehicle() {
        let mut dat = sample_dat(1);
        dat.completed_by_id = None;
        dat.vehicle_ids.clear();
        let Err(DomainError::Validation(errors)) = dat.validate(&sample_chapter()) else {
            panic!("expected validation error");
        };
        assert!(errors.contains("completed_by"));
        assert!(errors.contains("vehicle_uses"));
    }

    #[test]
    fn test_units_total_and_normalize() {
        let mut dat = sample_dat(1);
        dat.units_destroyed = None;
        assert_eq!(dat.units_total(), 4);

        dat.languages = vec!["".into(), "Spanish".into(), " ".into()];
        dat.normalize();
        assert_eq!(dat.languages, vec!["Spanish".to_string()]);
    }

    #[test]
    fn test_parse_form_time() {
        let zone = FixedOffset::west_opt(8 * 3600).unwrap();
        let t = parse_form_time(ResponderTime::Arrived, "2025-01-06 19:50", zone).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 1, 7, 3, 50, 0).unwrap());

        let t = parse_form_time(ResponderTime::Arrived, "2025-01-07T03:50:00Z", zone).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 1, 7, 3, 50, 0).unwrap());

        let err = parse_form_time(ResponderTime::Departed, "tomorrow-ish", zone).unwrap_err();
        assert_eq!(err, "Invalid time format for Responder Departed: tomorrow-ish.");
    }

    #[test]
    fn test_timeline_events() {
        let mut dat = sample_dat(1);
        dat.responder_departed = None;
        let kinds: Vec<EventKind> = dat.timeline_events().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![EventKind::DatReceived, EventKind::DatOnScene]);
    }
}
