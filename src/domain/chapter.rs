//! Chapter: the tenant scope for incidents, people and authorization.

use super::errors::{DomainError, ValidationErrors};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static NUMBER_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]*$").unwrap());
static URL_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]*$").unwrap());

/// Resource types a chapter may choose to track on DAT records.
pub const TRACKED_RESOURCE_TYPES: &[&str] = &["comfort_kits", "blankets", "pre-packs", "toys"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub url_slug: String,
    /// Fixed offset from UTC in minutes (e.g. -480 for Pacific standard time).
    pub utc_offset_minutes: i32,
    pub incidents_report_advanced_details: bool,
    pub incidents_report_editable: bool,
    pub incidents_enable_dispatch_console: bool,
    pub incidents_enable_messaging: bool,
    #[serde(default)]
    pub incidents_resources_tracked: Vec<String>,
    /// Incident numbers are `{prefix}{yy}-{nnn}`; the prefix may be empty.
    #[serde(default)]
    pub incident_number_prefix: String,
}

impl Chapter {
    pub fn time_zone(&self) -> FixedOffset {
        self.fixed_offset().unwrap_or_else(|| Utc.fix())
    }

    fn fixed_offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }

    /// Current date in the chapter's time zone.
    pub fn today(&self) -> NaiveDate {
        self.date_at(Utc::now())
    }

    pub fn date_at(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.time_zone()).date_naive()
    }

    pub fn tracks_resource(&self, resource: &str) -> bool {
        self.incidents_resources_tracked.iter().any(|r| r == resource)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = ValidationErrors::new();
        errors.require_text("name", Some(&self.name));
        errors.require_text("short_name", Some(&self.short_name));
        errors.require_text("url_slug", Some(&self.url_slug));
        if !URL_SLUG.is_match(&self.url_slug) {
            errors.add("url_slug", "may only contain letters, digits, '-' and '_'");
        }
        if !NUMBER_PREFIX.is_match(&self.incident_number_prefix) {
            errors.add("incident_number_prefix", "may only contain word characters");
        }
        if self.fixed_offset().is_none() {
            errors.add("utc_offset_minutes", "is out of range");
        }
        for resource in &self.incidents_resources_tracked {
            if !TRACKED_RESOURCE_TYPES.contains(&resource.as_str()) {
                errors.add(
                    "incidents_resources_tracked",
                    format!("{resource} is not a trackable resource"),
                );
            }
        }
        errors.into_result()
    }
}

/// Chapter-scoped counter backing incident numbers. Restarts every calendar year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentNumberSequence {
    pub prefix: String,
    pub year: i32,
    pub number: i64,
}

impl IncidentNumberSequence {
    /// Advance the counter for `today` and format the resulting incident number.
    pub fn next_number(&mut self, today: NaiveDate) -> String {
        if self.year != today.year() {
            self.year = today.year();
            self.number = 0;
        }
        self.number += 1;
        format!(
            "{}{:02}-{:03}",
            self.prefix,
            today.year().rem_euclid(100),
            self.number
        )
    }
}

#[cfg(test)]
pub(crate) fn sample_chapter() -> Chapter {
    Chapter {
        id: 1,
        name: "Bay Area Chapter".into(),
        short_name: "ARCBA".into(),
        url_slug: "arcba".into(),
        utc_offset_minutes: -480,
        incidents_report_advanced_details: false,
        incidents_report_editable: true,
        incidents_enable_dispatch_console: true,
        incidents_enable_messaging: true,
        incidents_resources_tracked: vec!["blankets".into(), "comfort_kits".into()],
        incident_number_prefix: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sequence_formats_and_resets_yearly() {
        let mut seq = IncidentNumberSequence {
            prefix: String::new(),
            year: 2024,
            number: 41,
        };
        let d = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(seq.next_number(d), "24-042");

        let d = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(seq.next_number(d), "25-001");
        assert_eq!(seq.next_number(d), "25-002");
    }

    #[test]
    fn test_sequence_grows_past_three_digits() {
        let mut seq = IncidentNumberSequence {
            prefix: "SF".into(),
            year: 2025,
            number: 999,
        };
        let d = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(seq.next_number(d), "SF25-1000");
    }

    #[test]
    fn test_date_at_uses_chapter_offset() {
        let chapter = sample_chapter();
        // 05:00 UTC is still the previous evening in UTC-8.
        let instant = Utc.with_ymd_and_hms(2025, 3, 2, 5, 0, 0).unwrap();
        assert_eq!(
            chapter.date_at(instant),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_validate_rejects_bad_prefix_and_resource() {
        let mut chapter = sample_chapter();
        chapter.incident_number_prefix = "SF-".into();
        chapter.incidents_resources_tracked.push("tents".into());
        let Err(DomainError::Validation(errors)) = chapter.validate() else {
            panic!("expected validation error");
        };
        assert!(errors.contains("incident_number_prefix"));
        assert!(errors.contains("incidents_resources_tracked"));
    }

    #[test]
    fn test_validate_accepts_word_prefix_and_rejects_bad_slug() {
        let mut chapter = sample_chapter();
        chapter.incident_number_prefix = "SF_1".into();
        assert!(chapter.validate().is_ok());
        chapter.url_slug = "bay area".into();
        let Err(DomainError::Validation(errors)) = chapter.validate() else {
            panic!("expected validation error");
        };
        assert!(errors.contains("url_slug"));
    }
}
