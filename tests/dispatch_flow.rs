//! Responder console flows over a real database file with mock gateways.

mod common;

use chrono::{NaiveDate, Utc};
use common::{TestApp, chapter, person, test_app};
use dat_dispatch::domain::{
    AssignmentRole, Chapter, DatIncident, DomainError, EventKind, Incident, IncidentStatus, NewIncident,
    Person, RecruitmentResponse, ResponderRecruitment, ResponderStatus, RoleGrant,
};
use dat_dispatch::ports::DispatchRepo;
use dat_dispatch::usecases::{AssignRequest, DatSubmission, DirectMessage, MessageTemplate};
use std::collections::BTreeMap;

struct Scene {
    app: TestApp,
    chapter: Chapter,
    admin: Person,
    lead: Person,
    responder: Person,
    trainee: Person,
    incident: Incident,
}

async fn scene() -> Scene {
    let app = test_app().await;
    let directory = &app.state.directory;
    let chapter = directory.create_chapter(None, chapter("arcba")).await.unwrap();
    let admin = directory
        .add_person(
            None,
            &chapter,
            person(
                chapter.id,
                "Dispatcher",
                "415-555-0100",
                &[RoleGrant::ChapterConfig, RoleGrant::IncidentsAdmin],
            ),
        )
        .await
        .unwrap();
    let mut added = Vec::new();
    for (name, number) in [
        ("Lead", "510-555-0101"),
        ("Responder", "510-555-0102"),
        ("Trainee", "510-555-0103"),
    ] {
        added.push(
            directory
                .add_person(Some(&admin), &chapter, person(chapter.id, name, number, &[]))
                .await
                .unwrap(),
        );
    }
    let incident = app
        .state
        .incidents
        .create_incident(
            &admin,
            &chapter,
            NewIncident {
                date: NaiveDate::from_ymd_opt(2025, 1, 7),
                incident_type: Some("fire".into()),
                address: Some("1663 Market St".into()),
                city: Some("San Francisco".into()),
                state: Some("CA".into()),
                lat: Some(37.7726),
                lng: Some(-122.4212),
                narrative: Some("Two-alarm fire, 3 units displaced".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let [lead, responder, trainee]: [Person; 3] = added.try_into().unwrap();
    Scene {
        app,
        chapter,
        admin,
        lead,
        responder,
        trainee,
        incident,
    }
}

fn assign_request(person: &Person, role: AssignmentRole) -> AssignRequest {
    AssignRequest {
        person_id: person.id,
        role,
        send_sms: false,
        send_email: false,
    }
}

#[tokio::test]
async fn test_recruitment_round_trip() {
    let s = scene().await;
    let dispatch = &s.app.state.dispatch;
    let number = s.incident.incident_number.as_str();

    let recruitment = dispatch.recruit(&s.admin, &s.chapter, number, s.lead.id).await.unwrap();
    assert_eq!(recruitment.response, RecruitmentResponse::Pending);
    let sent = s.app.sms.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "510-555-0101");
    assert!(sent[0].body.ends_with("Reply YES if you are available or NO if not."));

    // Pending: no second text.
    dispatch.recruit(&s.admin, &s.chapter, number, s.lead.id).await.unwrap();
    assert_eq!(s.app.sms.sent().len(), 1);

    let outcome = s
        .app
        .state
        .messages
        .receive("+1 (510) 555-0101", "+15550000000", "Yes")
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.reply.unwrap().body.contains("marked available"));

    dispatch.recruit(&s.admin, &s.chapter, number, s.responder.id).await.unwrap();
    s.app.state.messages.receive("5105550102", "", "no").await.unwrap();

    let console = dispatch.responders_console(&s.admin, &s.chapter, number).await.unwrap();
    let first = &console.candidates[0];
    assert_eq!(first.person_id, s.lead.id);
    assert_eq!(first.label, Some("Available"));
    assert!(console.not_available.iter().any(|r| r.person_id == s.responder.id));
    assert!(console.candidates.iter().all(|r| r.person_id != s.responder.id));

    // Answered: recruiting again sends a fresh request.
    let again = dispatch.recruit(&s.admin, &s.chapter, number, s.lead.id).await.unwrap();
    assert_eq!(again.response, RecruitmentResponse::Pending);
    assert_eq!(again.id, recruitment.id);
    assert_eq!(s.app.sms.sent().len(), 5);
}

#[tokio::test]
async fn test_recruit_twice_sends_one_request() {
    let s = scene().await;
    let dispatch = &s.app.state.dispatch;
    let number = s.incident.incident_number.as_str();

    // Gateway down: the request is kept but nothing was sent.
    s.app.sms.set_unreachable(true);
    let failed = dispatch.recruit(&s.admin, &s.chapter, number, s.responder.id).await;
    assert!(matches!(failed, Err(DomainError::Sms(_))));
    let stored = s
        .app
        .repo
        .find_recruitment(s.incident.id, s.responder.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.response, RecruitmentResponse::Pending);
    assert!(stored.outbound_message_id.is_none());

    // Retry sends, then a double click is a no-op.
    s.app.sms.set_unreachable(false);
    let first = dispatch.recruit(&s.admin, &s.chapter, number, s.responder.id).await.unwrap();
    let second = dispatch.recruit(&s.admin, &s.chapter, number, s.responder.id).await.unwrap();
    assert_eq!(first.id, stored.id);
    assert_eq!(second.id, first.id);
    assert!(first.outbound_message_id.is_some());
    assert_eq!(s.app.sms.sent().len(), 1);

    // A second row for the same pair is refused, not a server error.
    let duplicate = s
        .app
        .repo
        .save_recruitment(&ResponderRecruitment::new(s.incident.id, s.responder.id, Utc::now()))
        .await;
    assert!(matches!(duplicate, Err(DomainError::Validation(_))));
}

#[tokio::test]
async fn test_assign_and_status_transitions() {
    let s = scene().await;
    let dispatch = &s.app.state.dispatch;
    let number = s.incident.incident_number.as_str();

    let mut request = assign_request(&s.lead, AssignmentRole::TeamLead);
    request.send_sms = true;
    request.send_email = true;
    let lead = dispatch.assign(&s.admin, &s.chapter, number, request).await.unwrap();
    assert!(
        s.app
            .sms
            .last_body()
            .unwrap()
            .starts_with(&format!("You have been assigned to incident {number} as Team Lead."))
    );
    let mail = s.app.mailer.deliveries();
    assert_eq!(mail[0].to, "Pat Lead <lead@example.org>");

    let second_lead = dispatch
        .assign(&s.admin, &s.chapter, number, assign_request(&s.responder, AssignmentRole::TeamLead))
        .await;
    assert!(matches!(second_lead, Err(DomainError::Validation(_))));
    dispatch
        .assign(&s.admin, &s.chapter, number, assign_request(&s.responder, AssignmentRole::Responder))
        .await
        .unwrap();

    let change = dispatch
        .update_status(&s.admin, &s.chapter, number, lead.id, ResponderStatus::Dispatched)
        .await
        .unwrap();
    assert!(change.changed);
    let repeat = dispatch
        .update_status(&s.admin, &s.chapter, number, lead.id, ResponderStatus::Dispatched)
        .await
        .unwrap();
    assert!(!repeat.changed);
    let skip = dispatch
        .update_status(&s.admin, &s.chapter, number, lead.id, ResponderStatus::Departed)
        .await;
    assert!(matches!(skip, Err(DomainError::InvalidTransition(_))));
    dispatch
        .update_status(&s.admin, &s.chapter, number, lead.id, ResponderStatus::OnScene)
        .await
        .unwrap();

    let console = dispatch.responders_console(&s.admin, &s.chapter, number).await.unwrap();
    assert_eq!(console.assigned.len(), 2);
    let on_scene = console.assigned.iter().find(|a| a.person_id == s.lead.id).unwrap();
    assert_eq!(on_scene.status_caption, "On Scene at");
    assert_eq!(on_scene.role_label, "Team Lead");
    assert!(console.candidates.iter().any(|c| c.person_id == s.trainee.id));

    let timeline = s.app.state.incidents.timeline(&s.admin, &s.chapter, number).await.unwrap();
    let kinds: Vec<EventKind> = timeline.iter().map(|e| e.event).collect();
    assert_eq!(
        kinds.iter().filter(|k| **k == EventKind::ResponderAssigned).count(),
        2
    );
    assert!(kinds.contains(&EventKind::ResponderDispatched));
    assert!(kinds.contains(&EventKind::ResponderOnScene));
}

#[tokio::test]
async fn test_messaging_responders() {
    let s = scene().await;
    let dispatch = &s.app.state.dispatch;
    let number = s.incident.incident_number.as_str();

    let lead = dispatch
        .assign(&s.admin, &s.chapter, number, assign_request(&s.lead, AssignmentRole::TeamLead))
        .await
        .unwrap();
    dispatch
        .assign(&s.admin, &s.chapter, number, assign_request(&s.trainee, AssignmentRole::Trainee))
        .await
        .unwrap();
    dispatch
        .assign(
            &s.admin,
            &s.chapter,
            number,
            assign_request(&s.responder, AssignmentRole::NotAvailable),
        )
        .await
        .unwrap();

    let sent = dispatch
        .message_all(&s.admin, &s.chapter, number, "Staging at the corner of 10th and Market")
        .await
        .unwrap();
    assert_eq!(sent.len(), 2);

    let map = dispatch
        .message_responder(
            &s.admin,
            &s.chapter,
            number,
            lead.id,
            DirectMessage {
                template: MessageTemplate::MapLink,
                body: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(map.body, format!("Map to incident {number}: https://short.url/1"));

    let info = dispatch
        .message_responder(
            &s.admin,
            &s.chapter,
            number,
            lead.id,
            DirectMessage {
                template: MessageTemplate::IncidentInfo,
                body: None,
            },
        )
        .await
        .unwrap();
    assert!(info.body.ends_with("Two-alarm fire, 3 units displaced"));

    s.app
        .state
        .messages
        .receive("5105550101", "", "Running ten minutes late")
        .await
        .unwrap();
    let incoming = s
        .app
        .state
        .messages
        .incoming_for_incident(&s.admin, &s.chapter, number)
        .await
        .unwrap();
    assert_eq!(incoming.len(), 1);
    s.app.state.messages.acknowledge(&s.admin, incoming[0].id).await.unwrap();
    let console = dispatch.responders_console(&s.admin, &s.chapter, number).await.unwrap();
    assert!(console.incoming.is_empty());
}

#[tokio::test]
async fn test_feature_flags_block_console() {
    let app = test_app().await;
    let mut quiet = chapter("quiet");
    quiet.incidents_enable_dispatch_console = false;
    quiet.incidents_enable_messaging = false;
    let quiet = app.state.directory.create_chapter(None, quiet).await.unwrap();
    let admin = app
        .state
        .directory
        .add_person(
            None,
            &quiet,
            person(quiet.id, "Admin", "415-555-0100", &[RoleGrant::IncidentsAdmin]),
        )
        .await
        .unwrap();
    let incident = app
        .state
        .incidents
        .create_incident(&admin, &quiet, NewIncident::default())
        .await
        .unwrap();
    let number = incident.incident_number.as_str();

    let console = app.state.dispatch.responders_console(&admin, &quiet, number).await;
    assert!(matches!(console, Err(DomainError::FeatureDisabled("dispatch console"))));
    let recruit = app.state.dispatch.recruit(&admin, &quiet, number, admin.id).await;
    assert!(matches!(recruit, Err(DomainError::FeatureDisabled("messaging"))));
    assert!(app.sms.sent().is_empty());
}

#[tokio::test]
async fn test_dat_submission_and_close() {
    let s = scene().await;
    let incidents = &s.app.state.incidents;
    let number = s.incident.incident_number.as_str();

    let dat = DatIncident {
        address: Some("1663 Market St".into()),
        city: Some("San Francisco".into()),
        state: Some("CA".into()),
        zip: Some("94103".into()),
        units_affected: Some(3),
        units_minor: Some(0),
        units_major: Some(2),
        units_destroyed: Some(1),
        num_adults: Some(5),
        num_children: Some(2),
        num_families: Some(3),
        num_people_injured: Some(0),
        num_people_hospitalized: Some(0),
        num_people_deceased: Some(0),
        completed_by_id: Some(s.lead.id),
        vehicle_ids: vec![7],
        resources: BTreeMap::from([("blankets".to_string(), 10)]),
        ..Default::default()
    };

    let backwards = incidents
        .submit_dat(
            &s.admin,
            &s.chapter,
            number,
            DatSubmission {
                dat: dat.clone(),
                responder_notified: Some("2025-01-07 19:10".into()),
                responder_arrived: Some("2025-01-07 19:00".into()),
                responder_departed: Some("tomorrow".into()),
            },
        )
        .await;
    let Err(DomainError::Validation(errors)) = backwards else {
        panic!("expected validation errors, got {backwards:?}");
    };
    assert_eq!(
        errors.get("responder_arrived"),
        ["Responder Notified must come before Responder Arrived"]
    );
    assert_eq!(
        errors.get("responder_departed")[0],
        "Invalid time format for Responder Departed: tomorrow."
    );

    let saved = incidents
        .submit_dat(
            &s.admin,
            &s.chapter,
            number,
            DatSubmission {
                dat,
                responder_notified: Some("2025-01-07 19:10".into()),
                responder_arrived: Some("2025-01-07 19:40".into()),
                responder_departed: Some("2025-01-07 22:05".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(saved.units_total(), 6);

    let incident = incidents.get_incident(&s.admin, &s.chapter, number).await.unwrap();
    assert_eq!(incident.num_families, 3);
    assert_eq!(incident.num_adults, 5);

    let closed = incidents.close_incident(&s.admin, &s.chapter, number).await.unwrap();
    assert_eq!(closed.status, IncidentStatus::Closed);

    let timeline = incidents.timeline(&s.admin, &s.chapter, number).await.unwrap();
    let kinds: Vec<EventKind> = timeline.iter().map(|e| e.event).collect();
    assert_eq!(kinds[0], EventKind::IncidentClosed);
    for kind in [EventKind::DatReceived, EventKind::DatOnScene, EventKind::DatDepartedScene] {
        assert_eq!(kinds.iter().filter(|k| **k == kind).count(), 1);
    }
}
