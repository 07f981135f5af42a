//! Shared fixtures for integration tests: a temp-dir database and mock gateways.

#![allow(dead_code)]

use dat_dispatch::adapters::http::{AppState, Gateways};
use dat_dispatch::adapters::integrations::{MockMaps, MockShortener};
use dat_dispatch::adapters::mail::MockMailer;
use dat_dispatch::adapters::persistence::SqliteRepo;
use dat_dispatch::adapters::sms::MockSmsGateway;
use dat_dispatch::domain::{Chapter, Person, RoleGrant};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestApp {
    pub dir: TempDir,
    pub repo: Arc<SqliteRepo>,
    pub sms: Arc<MockSmsGateway>,
    pub mailer: Arc<MockMailer>,
    pub state: AppState,
}


pub async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(SqliteRepo::connect(dir.path()).await.unwrap());
    let sms = Arc::new(MockSmsGateway::new());
    let mailer = Arc::new(MockMailer::new());
    let state = AppState::new(
        repo.clone(),
        Gateways {
            sms: sms.clone(),
            mailer: mailer.clone(),
            shortener: Arc::new(MockShortener::new()),
            maps: Arc::new(MockMaps::new()),
            mail_from: "DAT Dispatch <dispatch@example.org>".into(),
        },
    );
    TestApp {
        dir,
        repo,
        sms,
        mailer,
        state,
    }
}

pub fn chapter(slug: &str) -> Chapter {
    Chapter {
        id: 0,
        name: "Bay Area Chapter".into(),
        short_name: "ARCBA".into(),
        url_slug: slug.into(),
        utc_offset_minutes: -480,
        incidents_report_advanced_details: false,
        incidents_report_editable: true,
        incidents_enable_dispatch_console: true,
        incidents_enable_messaging: true,
        incidents_resources_tracked: vec!["blankets".into()],
        incident_number_prefix: String::new(),
    }
}

pub fn person(chapter_id: i64, last_name: &str, sms_number: &str, roles: &[RoleGrant]) -> Person {
    Person {
        id: 0,
        chapter_id,
        first_name: "Pat".into(),
        last_name: last_name.into(),
        email: Some(format!("{}@example.org", last_name.to_lowercase())),
        sms_number: Some(sms_number.into()),
        lat: Some(37.80),
        lng: Some(-122.27),
        roles: roles.to_vec(),
    }
}
