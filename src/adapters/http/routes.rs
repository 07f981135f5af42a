//! JSON API routes. The acting person comes from the `x-person-id` header.

use super::dto::{
    BroadcastPayload, ChapterPayload, InboundSms, PersonPayload, RecruitPayload, RecruitmentMessagePayload,
    ReportDelivery, ReportRequest, StatusPayload,
};
use super::error::ApiError;
use crate::domain::{
    Chapter, DatIncident, DomainError, EventLog, Incident, NewIncident, Person, ResponderAssignment,
    ResponderMessage, ResponderRecruitment,
};
use crate::usecases::dispatch_service::{ResponderConsole, StatusChange};
use crate::usecases::message_service::InboundOutcome;
use crate::ports::{
    ChapterRepo, DispatchRepo, IncidentRepo, Mailer, MapProvider, MessageRepo, PersonRepo, SmsGateway,
    UrlShortener,
};
use crate::usecases::{
    AssignRequest, DatSubmission, DirectMessage, DirectoryService, DispatchService, IncidentService,
    IncidentUpdate, MessageService, Outbox, ReportService,
};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use std::sync::Arc;
use tracing::debug;

pub const ACTOR_HEADER: &str = "x-person-id";

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<DirectoryService>,
    pub incidents: Arc<IncidentService>,
    pub dispatch: Arc<DispatchService>,
    pub messages: Arc<MessageService>,
    pub reports: Arc<ReportService>,
}

/// Outbound gateways shared by the services.
pub struct Gateways {
    pub sms: Arc<dyn SmsGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub shortener: Arc<dyn UrlShortener>,
    pub maps: Arc<dyn MapProvider>,
    pub mail_from: String,
}

impl AppState {
    /// Wire every service onto one store.
    pub fn new<R>(repo: Arc<R>, gateways: Gateways) -> Self
    where
        R: ChapterRepo + PersonRepo + IncidentRepo + DispatchRepo + MessageRepo + 'static,
    {
        let outbox = Arc::new(Outbox::new(
            gateways.sms,
            repo.clone(),
            gateways.shortener,
            gateways.maps.clone(),
        ));
        Self {
            directory: Arc::new(DirectoryService::new(repo.clone(), repo.clone())),
            incidents: Arc::new(IncidentService::new(repo.clone())),
            dispatch: Arc::new(DispatchService::new(
                repo.clone(),
                repo.clone(),
                repo.clone(),
                repo.clone(),
                outbox.clone(),
                gateways.mailer.clone(),
                gateways.mail_from.clone(),
            )),
            messages: Arc::new(MessageService::new(
                repo.clone(),
                repo.clone(),
                repo.clone(),
                repo.clone(),
                repo.clone(),
                outbox,
            )),
            reports: Arc::new(ReportService::new(
                repo.clone(),
                repo.clone(),
                repo,
                gateways.maps,
                gateways.mailer,
                gateways.mail_from,
            )),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let incident = "/chapters/:chapter/incidents/:number";
    Router::new()
        .route("/chapters", post(create_chapter))
        .route("/chapters/:chapter/people", post(add_person))
        .route("/chapters/:chapter/incidents", post(create_incident))
        .route(incident, get(show_incident).patch(update_incident))
        .route(&format!("{incident}/dat"), put(submit_dat))
        .route(&format!("{incident}/close"), post(close_incident))
        .route(&format!("{incident}/timeline"), get(timeline))
        .route(&format!("{incident}/responders"), get(responders))
        .route(&format!("{incident}/recruitment_message"), put(set_recruitment_message))
        .route(&format!("{incident}/recruitments"), post(recruit))
        .route(&format!("{incident}/assignments"), post(assign))
        .route(&format!("{incident}/assignments/:id/status"), post(update_status))
        .route(&format!("{incident}/assignments/:id/message"), post(message_responder))
        .route(&format!("{incident}/messages"), post(message_all))
        .route(&format!("{incident}/messages/incoming"), get(incoming_messages))
        .route("/messages/:id/acknowledge", post(acknowledge))
        .route("/chapters/:chapter/reports", post(send_report))
        .route("/sms/inbound", post(inbound_sms))
        .with_state(state)
}

/// The person named by `x-person-id`, if the header is present.
async fn optional_actor(state: &AppState, headers: &HeaderMap) -> Result<Option<Person>, ApiError> {
    let Some(raw) = headers.get(ACTOR_HEADER) else {
        return Ok(None);
    };
    let id = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(unknown_actor)?;
    match state.directory.person(id).await {
        Ok(person) => Ok(Some(person)),
        Err(DomainError::NotFound { .. }) => Err(unknown_actor()),
        Err(e) => Err(e.into()),
    }
}

async fn actor(state: &AppState, headers: &HeaderMap) -> Result<Person, ApiError> {
    optional_actor(state, headers).await?.ok_or_else(unknown_actor)
}

fn unknown_actor() -> ApiError {
    ApiError(DomainError::Forbidden {
        action: "act".to_string(),
        subject: format!("without a valid {ACTOR_HEADER} header"),
    })
}

/// Actor plus the chapter named in the path.
async fn context(state: &AppState, headers: &HeaderMap, slug: &str) -> Result<(Person, Chapter), ApiError> {
    let person = actor(state, headers).await?;
    let chapter = state.directory.chapter_by_slug(slug).await?;
    Ok((person, chapter))
}

async fn create_chapter(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChapterPayload>,
) -> Result<(StatusCode, Json<Chapter>), ApiError> {
    let actor = optional_actor(&state, &headers).await?;
    let chapter = state.directory.create_chapter(actor.as_ref(), payload.into()).await?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

async fn add_person(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(payload): Json<PersonPayload>,
) -> Result<(StatusCode, Json<Person>), ApiError> {
    let actor = optional_actor(&state, &headers).await?;
    let chapter = state.directory.chapter_by_slug(&slug).await?;
    let person = state
        .directory
        .add_person(actor.as_ref(), &chapter, payload.into_person(chapter.id))
        .await?;
    Ok((StatusCode::CREATED, Json(person)))
}

async fn create_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(attrs): Json<NewIncident>,
) -> Result<(StatusCode, Json<Incident>), ApiError> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    let incident = state.incidents.create_incident(&actor, &chapter, attrs).await?;
    Ok((StatusCode::CREATED, Json(incident)))
}

async fn show_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
) -> ApiResult<Incident> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(state.incidents.get_incident(&actor, &chapter, &number).await?))
}

async fn update_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
    Json(update): Json<IncidentUpdate>,
) -> ApiResult<Incident> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(
        state.incidents.update_incident(&actor, &chapter, &number, update).await?,
    ))
}

async fn submit_dat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
    Json(submission): Json<DatSubmission>,
) -> ApiResult<DatIncident> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(
        state.incidents.submit_dat(&actor, &chapter, &number, submission).await?,
    ))
}

async fn close_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
) -> ApiResult<Incident> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(state.incidents.close_incident(&actor, &chapter, &number).await?))
}

async fn timeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
) -> ApiResult<Vec<EventLog>> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(state.incidents.timeline(&actor, &chapter, &number).await?))
}

async fn responders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
) -> ApiResult<ResponderConsole> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(
        state.dispatch.responders_console(&actor, &chapter, &number).await?,
    ))
}

async fn set_recruitment_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
    Json(payload): Json<RecruitmentMessagePayload>,
) -> ApiResult<Incident> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(
        state
            .dispatch
            .set_recruitment_message(&actor, &chapter, &number, &payload.message)
            .await?,
    ))
}

async fn recruit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
    Json(payload): Json<RecruitPayload>,
) -> ApiResult<ResponderRecruitment> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(
        state
            .dispatch
            .recruit(&actor, &chapter, &number, payload.person_id)
            .await?,
    ))
}

async fn assign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
    Json(request): Json<AssignRequest>,
) -> Result<(StatusCode, Json<ResponderAssignment>), ApiError> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    let assignment = state.dispatch.assign(&actor, &chapter, &number, request).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number, id)): Path<(String, String, i64)>,
    Json(payload): Json<StatusPayload>,
) -> ApiResult<StatusChange> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(
        state
            .dispatch
            .update_status(&actor, &chapter, &number, id, payload.status)
            .await?,
    ))
}

async fn message_responder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number, id)): Path<(String, String, i64)>,
    Json(message): Json<DirectMessage>,
) -> ApiResult<ResponderMessage> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(
        state
            .dispatch
            .message_responder(&actor, &chapter, &number, id, message)
            .await?,
    ))
}

async fn message_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
    Json(payload): Json<BroadcastPayload>,
) -> ApiResult<Vec<ResponderMessage>> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(
        state
            .dispatch
            .message_all(&actor, &chapter, &number, &payload.body)
            .await?,
    ))
}

async fn incoming_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, number)): Path<(String, String)>,
) -> ApiResult<Vec<ResponderMessage>> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    Ok(Json(
        state
            .messages
            .incoming_for_incident(&actor, &chapter, &number)
            .await?,
    ))
}

async fn acknowledge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<ResponderMessage> {
    let actor = actor(&state, &headers).await?;
    Ok(Json(state.messages.acknowledge(&actor, id).await?))
}

async fn send_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(request): Json<ReportRequest>,
) -> ApiResult<ReportDelivery> {
    let (actor, chapter) = context(&state, &headers, &slug).await?;
    let range = request.range()?;
    let email = state
        .reports
        .send_report(&actor, &chapter, request.recipient_id, range)
        .await?;
    Ok(Json(email.into()))
}

/// Gateway webhook. No actor: the sender's number identifies the person.
async fn inbound_sms(
    State(state): State<AppState>,
    Form(sms): Form<InboundSms>,
) -> ApiResult<Option<InboundOutcome>> {
    debug!(from = %sms.from, "inbound SMS webhook");
    Ok(Json(state.messages.receive(&sms.from, &sms.to, &sms.body).await?))
}
