//! Chapter disaster operations report: gather, render, email.

use crate::adapters::reporting::incidents_to_csv;
use crate::domain::{
    Ability, Action, AssignmentRole, Chapter, DateRange, DomainError, FiscalYear, Incident, IncidentStats, LatLng,
    Person, Subject, SubjectKind,
};
use crate::domain::incident::humanize;
use crate::ports::{Attachment, DispatchRepo, Email, IncidentRepo, MapProvider, Mailer, PersonRepo};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

const MAP_WIDTH: u32 = 250;
const MAP_HEIGHT: u32 = 450;
/// Per-responder cap on round-trip miles.
const MAX_RESPONDER_MILES: f64 = 50.0;

#[derive(Debug, Clone, Serialize)]
pub struct ChapterReport {
    pub title: String,
    pub subtitle: String,
    pub period_name: &'static str,
    pub range: DateRange,
    pub incidents: Vec<Incident>,
    pub stats: IncidentStats,
    pub fiscal_year: i32,
    pub fiscal_year_stats: IncidentStats,
    pub resources: BTreeMap<String, i64>,
    pub responders_summary_count: usize,
    pub responders_distance: i64,
    pub map_url: String,
    pub retina_map_url: String,
}

pub struct ReportService {
    incidents: Arc<dyn IncidentRepo>,
    people: Arc<dyn PersonRepo>,
    dispatch: Arc<dyn DispatchRepo>,
    maps: Arc<dyn MapProvider>,
    mailer: Arc<dyn Mailer>,
    mail_from: String,
}

impl ReportService {
    pub fn new(
        incidents: Arc<dyn IncidentRepo>,
        people: Arc<dyn PersonRepo>,
        dispatch: Arc<dyn DispatchRepo>,
        maps: Arc<dyn MapProvider>,
        mailer: Arc<dyn Mailer>,
        mail_from: String,
    ) -> Self {
        Self {
            incidents,
            people,
            dispatch,
            maps,
            mailer,
            mail_from,
        }
    }

    pub async fn report_for_date_range(&self, chapter: &Chapter, range: DateRange) -> Result<ChapterReport, DomainError> {
        let incidents = self.incidents.valid_incidents_in_range(chapter.id, range).await?;
        let stats = self.incidents.incident_stats(chapter.id, range).await?;
        let fiscal_year = FiscalYear::for_date(range.start);
        let fiscal_year_stats = self.incidents.incident_stats(chapter.id, fiscal_year.range()).await?;
        let resources = self
            .incidents
            .count_resources(chapter.id, range, &chapter.incidents_resources_tracked)
            .await?;

        let (responders_summary_count, responders_distance) = self.responder_totals(&incidents).await?;

        let markers: Vec<LatLng> = incidents.iter().filter_map(Incident::location).collect();
        let map_url = self.maps.static_map_url(&markers, MAP_WIDTH, MAP_HEIGHT, false);
        let retina_map_url = self.maps.static_map_url(&markers, MAP_WIDTH, MAP_HEIGHT, true);

        Ok(ChapterReport {
            title: format!("{} Disaster Operations Report", chapter.short_name),
            subtitle: range.subtitle(),
            period_name: range.period_name(),
            range,
            incidents,
            stats,
            fiscal_year: fiscal_year.year,
            fiscal_year_stats,
            resources,
            responders_summary_count,
            responders_distance,
            map_url,
            retina_map_url,
        })
    }

    /// Email the report to a chapter member. Defaults to last week in chapter time.
    pub async fn send_report(
        &self,
        actor: &Person,
        chapter: &Chapter,
        recipient_id: i64,
        range: Option<DateRange>,
    ) -> Result<Email, DomainError> {
        Ability::for_person(actor).authorize(
            Action::SendReport,
            &Subject::in_chapter(SubjectKind::ReportSubscription, chapter.id),
        )?;
        let recipient = self.people.get_person(recipient_id).await?;
        if recipient.chapter_id != chapter.id {
            return Err(DomainError::not_found("person", recipient_id));
        }
        let to = recipient
            .mail_address()
            .ok_or_else(|| DomainError::invalid("email", "recipient has no email address"))?;

        let range = range.unwrap_or_else(|| DateRange::last_week(chapter.today()));
        let report = self.report_for_date_range(chapter, range).await?;

        let csv = incidents_to_csv(&report.incidents).map_err(|e| DomainError::Report(e.to_string()))?;
        let mut attachments = vec![Attachment {
            filename: "incidents.csv".to_string(),
            content_type: "text/csv".to_string(),
            data: csv.into_bytes(),
        }];
        match self.maps.fetch_image(&report.map_url).await {
            Ok(image) => attachments.push(Attachment {
                filename: "map.png".to_string(),
                content_type: image.content_type,
                data: image.data,
            }),
            Err(e) => warn!(error = %e, "report map not attached"),
        }

        let email = Email {
            from: self.mail_from.clone(),
            to,
            subject: format!("{} - {}", report.title, report.subtitle),
            text_body: render_text(&report),
            html_body: Some(render_html(&report)),
            tags: vec!["incidents".into(), "weekly_report".into()],
            attachments,
        };
        self.mailer.deliver(&email).await?;
        info!(
            chapter_id = chapter.id,
            recipient_id,
            incidents = report.incidents.len(),
            "report sent"
        );
        Ok(email)
    }

    /// Distinct available responders, and their capped round-trip miles.
    /// Team leads count as responders but not toward the miles.
    async fn responder_totals(&self, incidents: &[Incident]) -> Result<(usize, i64), DomainError> {
        let mut people: HashMap<i64, Person> = HashMap::new();
        let mut responders = HashSet::new();
        let mut miles = 0.0_f64;
        for incident in incidents {
            for assignment in self.dispatch.assignments_for_incident(incident.id).await? {
                if !assignment.was_available() {
                    continue;
                }
                responders.insert(assignment.person_id);
                if !people.contains_key(&assignment.person_id) {
                    let person = self.people.get_person(assignment.person_id).await?;
                    people.insert(person.id, person);
                }
                if assignment.role == AssignmentRole::TeamLead {
                    continue;
                }
                let home = people.get(&assignment.person_id).and_then(Person::location);
                if let (Some(home), Some(scene)) = (home, incident.location()) {
                    miles += (2.0 * home.distance_miles(&scene)).min(MAX_RESPONDER_MILES);
                }
            }
        }
        Ok((responders.len(), miles.round() as i64))
    }
}

fn stats_lines(out: &mut String, label: &str, stats: &IncidentStats) {
    let _ = writeln!(out, "{label}:");
    let _ = writeln!(out, "  Incidents: {}", stats.incident_count);
    let _ = writeln!(out, "  Cases: {}", stats.case_count);
    let _ = writeln!(out, "  Families: {}", stats.family_count);
    let _ = writeln!(out, "  Clients: {}", stats.client_count);
}

pub fn render_text(report: &ChapterReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n{}\n", report.title, report.subtitle);
    stats_lines(&mut out, report.period_name, &report.stats);
    stats_lines(&mut out, &format!("Fiscal Year {}", report.fiscal_year), &report.fiscal_year_stats);
    let _ = writeln!(out, "\nResponders: {}", report.responders_summary_count);
    let _ = writeln!(out, "Responder miles: {}", report.responders_distance);
    if !report.resources.is_empty() {
        let _ = writeln!(out, "\nResources:");
        for (name, count) in &report.resources {
            let _ = writeln!(out, "  {}: {}", humanize(name), count);
        }
    }
    let _ = writeln!(out, "\nIncidents:");
    if report.incidents.is_empty() {
        let _ = writeln!(out, "  No incidents.");
    }
    for incident in &report.incidents {
        let _ = writeln!(
            out,
            "  {} {} {} - {} ({} families, {} clients)",
            incident.incident_number,
            incident.date.format("%m/%d"),
            incident.incident_type.as_deref().map(humanize).unwrap_or_default(),
            incident.county_state(),
            incident.num_families,
            incident.num_adults + incident.num_children,
        );
    }
    out
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn stats_row(out: &mut String, label: &str, stats: &IncidentStats) {
    let _ = write!(
        out,
        "<tr><th>{}</th><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
        escape(label),
        stats.incident_count,
        stats.case_count,
        stats.family_count,
        stats.client_count
    );
}

pub fn render_html(report: &ChapterReport) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<html><body><h1>{}</h1><h2>{}</h2>",
        escape(&report.title),
        escape(&report.subtitle)
    );
    out.push_str("<table><tr><th></th><th>Incidents</th><th>Cases</th><th>Families</th><th>Clients</th></tr>");
    stats_row(&mut out, report.period_name, &report.stats);
    stats_row(&mut out, &format!("FY {}", report.fiscal_year), &report.fiscal_year_stats);
    out.push_str("</table>");
    let _ = write!(
        out,
        "<p>{} responders, {} miles</p>",
        report.responders_summary_count, report.responders_distance
    );
    if !report.resources.is_empty() {
        out.push_str("<ul>");
        for (name, count) in &report.resources {
            let _ = write!(out, "<li>{}: {}</li>", escape(&humanize(name)), count);
        }
        out.push_str("</ul>");
    }
    let _ = write!(
        out,
        "<img src=\"{}\" srcset=\"{} 2x\" width=\"{MAP_WIDTH}\" height=\"{MAP_HEIGHT}\" alt=\"Incident map\">",
        escape(&report.map_url),
        escape(&report.retina_map_url)
    );
    out.push_str("<table><tr><th>Incident</th><th>Date</th><th>Type</th><th>Location</th><th>Families</th><th>Clients</th></tr>");
    for incident in &report.incidents {
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&incident.incident_number),
            incident.date.format("%m/%d/%Y"),
            escape(&incident.incident_type.as_deref().map(humanize).unwrap_or_default()),
            escape(&incident.county_state()),
            incident.num_families,
            incident.num_adults + incident.num_children,
        );
    }
    out.push_str("</table></body></html>");
    out
}
