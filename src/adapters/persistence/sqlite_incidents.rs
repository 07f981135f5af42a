//! Incident, DAT and timeline queries for [`SqliteRepo`].

use super::sqlite_repo::{
    SqliteRepo, collect, first, get, get_date, get_json, get_opt_date, get_time, repo_err, to_json,
    ts,
};
use crate::domain::{
    Chapter, DatIncident, DateRange, DomainError, EventKind, EventLog, Incident,
    IncidentNumberSequence, IncidentStats, IncidentStatus,
};
use crate::ports::IncidentRepo;
use chrono::{NaiveDate, Utc};
use libsql::{Connection, Row, params};
use std::collections::BTreeMap;
use tracing::{debug, info};

const INCIDENT_COLUMNS: &str = "id, chapter_id, incident_number, date, status, incident_type, \
    address, city, county, state, zip, lat, lng, narrative, num_adults, num_children, \
    num_families, num_cases, response_date, recruitment_message, created_at";

const EVENT_COLUMNS: &str = "id, incident_id, chapter_id, person_id, event, event_time, message";

// Numbers entered by hand can sit ahead of the sequence; skip past them.
const MAX_NUMBER_ATTEMPTS: usize = 1000;

fn incident_from_row(row: &Row) -> Result<Incident, DomainError> {
    Ok(Incident {
        id: get(row, 0)?,
        chapter_id: get(row, 1)?,
        incident_number: get(row, 2)?,
        date: get_date(row, 3)?,
        status: get::<String>(row, 4)?.parse::<IncidentStatus>()?,
        incident_type: get(row, 5)?,
        address: get(row, 6)?,
        city: get(row, 7)?,
        county: get(row, 8)?,
        state: get(row, 9)?,
        zip: get(row, 10)?,
        lat: get(row, 11)?,
        lng: get(row, 12)?,
        narrative: get(row, 13)?,
        num_adults: get(row, 14)?,
        num_children: get(row, 15)?,
        num_families: get(row, 16)?,
        num_cases: get(row, 17)?,
        response_date: get_opt_date(row, 18)?,
        recruitment_message: get(row, 19)?,
        created_at: get_time(row, 20)?,
    })
}

fn event_from_row(row: &Row) -> Result<EventLog, DomainError> {
    Ok(EventLog {
        id: get(row, 0)?,
        incident_id: get(row, 1)?,
        chapter_id: get(row, 2)?,
        person_id: get(row, 3)?,
        event: get::<String>(row, 4)?.parse::<EventKind>()?,
        event_time: get_time(row, 5)?,
        message: get(row, 6)?,
    })
}

fn date_param(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.to_string())
}

async fn number_taken(
    conn: &Connection,
    chapter_id: i64,
    number: &str,
    except_id: i64,
) -> Result<bool, DomainError> {
    let rows = conn
        .query(
            "SELECT id FROM incidents WHERE chapter_id = ?1 AND incident_number = ?2 AND id != ?3",
            params![chapter_id, number, except_id],
        )
        .await
        .map_err(repo_err)?;
    Ok(first(rows, |row| get::<i64>(row, 0)).await?.is_some())
}

async fn write_incident(conn: &Connection, incident: &Incident) -> Result<(), DomainError> {
    if number_taken(conn, incident.chapter_id, &incident.incident_number, incident.id).await? {
        return Err(DomainError::invalid("incident_number", "has already been taken"));
    }
    let changed = conn
        .execute(
            r#"
            UPDATE incidents SET incident_number = ?2, date = ?3, status = ?4, incident_type = ?5,
                address = ?6, city = ?7, county = ?8, state = ?9, zip = ?10, lat = ?11, lng = ?12,
                narrative = ?13, num_adults = ?14, num_children = ?15, num_families = ?16,
                num_cases = ?17, response_date = ?18, recruitment_message = ?19
            WHERE id = ?1
            "#,
            params![
                incident.id,
                incident.incident_number.as_str(),
                incident.date.to_string(),
                incident.status.as_str(),
                incident.incident_type.clone(),
                incident.address.clone(),
                incident.city.clone(),
                incident.county.clone(),
                incident.state.clone(),
                incident.zip.clone(),
                incident.lat,
                incident.lng,
                incident.narrative.clone(),
                incident.num_adults,
                incident.num_children,
                incident.num_families,
                incident.num_cases,
                date_param(incident.response_date),
                incident.recruitment_message.clone(),
            ],
        )
        .await
        .map_err(repo_err)?;
    if changed == 0 {
        return Err(DomainError::not_found("incident", incident.id));
    }
    Ok(())
}

/// Append a timeline entry, or replace the existing one for singular kinds.
pub(super) async fn write_event(conn: &Connection, event: &EventLog) -> Result<EventLog, DomainError> {
    if event.event.is_singular() {
        let rows = conn
            .query(
                "SELECT id FROM event_logs WHERE incident_id = ?1 AND event = ?2 LIMIT 1",
                params![event.incident_id, event.event.as_str()],
            )
            .await
            .map_err(repo_err)?;
        if let Some(id) = first(rows, |row| get::<i64>(row, 0)).await? {
            conn.execute(
                "UPDATE event_logs SET person_id = ?2, event_time = ?3, message = ?4 WHERE id = ?1",
                params![id, event.person_id, ts(event.event_time), event.message.clone()],
            )
            .await
            .map_err(repo_err)?;
            return Ok(EventLog {
                id,
                ..event.clone()
            });
        }
    }

    conn.execute(
        r#"
        INSERT INTO event_logs (incident_id, chapter_id, person_id, event, event_time, message)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            event.incident_id,
            event.chapter_id,
            event.person_id,
            event.event.as_str(),
            ts(event.event_time),
            event.message.clone(),
        ],
    )
    .await
    .map_err(repo_err)?;
    Ok(EventLog {
        id: conn.last_insert_rowid(),
        ..event.clone()
    })
}

#[async_trait::async_trait]
impl IncidentRepo for SqliteRepo {
    async fn create_incident(
        &self,
        incident: &Incident,
        chapter: &Chapter,
        today: NaiveDate,
    ) -> Result<Incident, DomainError> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(repo_err)?;

        let rows = tx
            .query(
                "SELECT incident_number_prefix, seq_year, seq_number FROM chapters WHERE id = ?1",
                params![chapter.id],
            )
            .await
            .map_err(repo_err)?;
        let mut sequence = first(rows, |row| {
            Ok(IncidentNumberSequence {
                prefix: get(row, 0)?,
                year: get(row, 1)?,
                number: get(row, 2)?,
            })
        })
        .await?
        .ok_or_else(|| DomainError::not_found("chapter", chapter.id))?;

        let mut number = sequence.next_number(today);
        let mut attempts = 1;
        while number_taken(&tx, chapter.id, &number, 0).await? {
            if attempts >= MAX_NUMBER_ATTEMPTS {
                return Err(DomainError::Repo(format!(
                    "no free incident number for chapter {} after {attempts} attempts",
                    chapter.id
                )));
            }
            number = sequence.next_number(today);
            attempts += 1;
        }

        tx.execute(
            "UPDATE chapters SET seq_year = ?2, seq_number = ?3 WHERE id = ?1",
            params![chapter.id, sequence.year, sequence.number],
        )
        .await
        .map_err(repo_err)?;

        tx.execute(
            r#"
            INSERT INTO incidents (chapter_id, incident_number, date, status, incident_type,
                address, city, county, state, zip, lat, lng, narrative, num_adults, num_children,
                num_families, num_cases, response_date, recruitment_message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                ?18, ?19, ?20)
            "#,
            params![
                chapter.id,
                number.as_str(),
                incident.date.to_string(),
                incident.status.as_str(),
                incident.incident_type.clone(),
                incident.address.clone(),
                incident.city.clone(),
                incident.county.clone(),
                incident.state.clone(),
                incident.zip.clone(),
                incident.lat,
                incident.lng,
                incident.narrative.clone(),
                incident.num_adults,
                incident.num_children,
                incident.num_families,
                incident.num_cases,
                date_param(incident.response_date),
                incident.recruitment_message.clone(),
                ts(incident.created_at),
            ],
        )
        .await
        .map_err(repo_err)?;
        let id = tx.last_insert_rowid();
        tx.commit().await.map_err(repo_err)?;

        info!(incident_id = id, number = %number, chapter_id = chapter.id, "incident created");
        Ok(Incident {
            id,
            chapter_id: chapter.id,
            incident_number: number,
            ..incident.clone()
        })
    }

    async fn update_incident(&self, incident: &Incident) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        write_incident(&conn, incident).await
    }

    async fn update_incident_logged(&self, incident: &Incident, event: &EventLog) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(repo_err)?;
        write_incident(&tx, incident).await?;
        write_event(&tx, event).await?;
        tx.commit().await.map_err(repo_err)
    }

    async fn get_incident(&self, id: i64) -> Result<Incident, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first(rows, incident_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("incident", id))
    }

    async fn find_incident(&self, chapter_id: i64, number: &str) -> Result<Incident, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE chapter_id = ?1 AND incident_number = ?2"
                ),
                params![chapter_id, number],
            )
            .await
            .map_err(repo_err)?;
        first(rows, incident_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("incident", number))
    }

    async fn valid_incidents_in_range(
        &self,
        chapter_id: i64,
        range: DateRange,
    ) -> Result<Vec<Incident>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {INCIDENT_COLUMNS} FROM incidents \
                     WHERE chapter_id = ?1 AND status != 'invalid' AND date BETWEEN ?2 AND ?3 \
                     ORDER BY date, incident_number"
                ),
                params![chapter_id, range.start.to_string(), range.end.to_string()],
            )
            .await
            .map_err(repo_err)?;
        collect(rows, incident_from_row).await
    }

    async fn incident_stats(&self, chapter_id: i64, range: DateRange) -> Result<IncidentStats, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                r#"
                SELECT COUNT(*), COALESCE(SUM(num_cases), 0), COALESCE(SUM(num_families), 0),
                    COALESCE(SUM(num_adults), 0), COALESCE(SUM(num_children), 0)
                FROM incidents
                WHERE chapter_id = ?1 AND status != 'invalid' AND date BETWEEN ?2 AND ?3
                "#,
                params![chapter_id, range.start.to_string(), range.end.to_string()],
            )
            .await
            .map_err(repo_err)?;
        let stats = first(rows, |row| {
            let num_adults: i64 = get(row, 3)?;
            let num_children: i64 = get(row, 4)?;
            Ok(IncidentStats {
                incident_count: get(row, 0)?,
                case_count: get(row, 1)?,
                family_count: get(row, 2)?,
                client_count: num_adults + num_children,
                num_adults,
                num_children,
            })
        })
        .await?;
        Ok(stats.unwrap_or_default())
    }

    async fn count_resources(
        &self,
        chapter_id: i64,
        range: DateRange,
        resources: &[String],
    ) -> Result<BTreeMap<String, i64>, DomainError> {
        let conn = self.conn.lock().await;
        let mut totals = BTreeMap::new();
        for resource in resources {
            // Quoted path: resource names may contain '-'.
            let path = format!("$.resources.\"{resource}\"");
            let rows = conn
                .query(
                    r#"
                    SELECT COALESCE(SUM(CAST(json_extract(d.detail_json, ?4) AS INTEGER)), 0)
                    FROM dat_incidents d
                    JOIN incidents i ON i.id = d.incident_id
                    WHERE i.chapter_id = ?1 AND i.status != 'invalid' AND i.date BETWEEN ?2 AND ?3
                    "#,
                    params![
                        chapter_id,
                        range.start.to_string(),
                        range.end.to_string(),
                        path
                    ],
                )
                .await
                .map_err(repo_err)?;
            let total = first(rows, |row| get::<i64>(row, 0)).await?.unwrap_or(0);
            totals.insert(resource.clone(), total);
        }
        Ok(totals)
    }

    async fn get_dat_incident(&self, incident_id: i64) -> Result<Option<DatIncident>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                "SELECT id, detail_json FROM dat_incidents WHERE incident_id = ?1",
                params![incident_id],
            )
            .await
            .map_err(repo_err)?;
        first(rows, |row| {
            let mut dat: DatIncident = get_json(row, 1)?;
            dat.id = get(row, 0)?;
            dat.incident_id = incident_id;
            Ok(dat)
        })
        .await
    }

    async fn save_dat_incident(
        &self,
        dat: &DatIncident,
        incident: &Incident,
        timeline: &[EventLog],
    ) -> Result<DatIncident, DomainError> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(repo_err)?;

        let mut saved = dat.clone();
        saved.incident_id = incident.id;
        tx.execute(
            r#"
            INSERT INTO dat_incidents (incident_id, detail_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (incident_id) DO UPDATE SET
                detail_json = excluded.detail_json,
                updated_at = excluded.updated_at
            "#,
            params![incident.id, to_json(&saved)?, ts(Utc::now())],
        )
        .await
        .map_err(repo_err)?;
        let rows = tx
            .query(
                "SELECT id FROM dat_incidents WHERE incident_id = ?1",
                params![incident.id],
            )
            .await
            .map_err(repo_err)?;
        saved.id = first(rows, |row| get::<i64>(row, 0))
            .await?
            .ok_or_else(|| DomainError::Repo("DAT record vanished after upsert".into()))?;

        write_incident(&tx, incident).await?;
        for event in timeline {
            write_event(&tx, event).await?;
        }
        tx.commit().await.map_err(repo_err)?;
        debug!(incident_id = incident.id, dat_id = saved.id, "DAT record saved");
        Ok(saved)
    }

    async fn record_event(&self, event: &EventLog) -> Result<EventLog, DomainError> {
        let conn = self.conn.lock().await;
        write_event(&conn, event).await
    }

    async fn event_logs(&self, incident_id: i64) -> Result<Vec<EventLog>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM event_logs WHERE incident_id = ?1 \
                     ORDER BY event_time DESC, id DESC"
                ),
                params![incident_id],
            )
            .await
            .map_err(repo_err)?;
        collect(rows, event_from_row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::sqlite_repo::test_support::seeded;
    use crate::domain::dat_incident::sample_dat;
    use crate::domain::incident::sample_incident;
    use chrono::{Duration, TimeZone};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_numbers_follow_sequence_and_reset_yearly() {
        let (repo, chapter) = seeded().await;
        let incident = sample_incident(&chapter);

        let a = repo.create_incident(&incident, &chapter, d(2024, 12, 30)).await.unwrap();
        let b = repo.create_incident(&incident, &chapter, d(2024, 12, 31)).await.unwrap();
        let c = repo.create_incident(&incident, &chapter, d(2025, 1, 1)).await.unwrap();
        assert_eq!(a.incident_number, "24-001");
        assert_eq!(b.incident_number, "24-002");
        assert_eq!(c.incident_number, "25-001");

        let loaded = repo.find_incident(chapter.id, "24-002").await.unwrap();
        assert_eq!(loaded.id, b.id);
    }

    #[tokio::test]
    async fn test_sequence_skips_hand_entered_numbers() {
        let (repo, chapter) = seeded().await;
        let first = repo
            .create_incident(&sample_incident(&chapter), &chapter, d(2025, 2, 1))
            .await
            .unwrap();
        let mut renumbered = first.clone();
        renumbered.incident_number = "25-002".into();
        repo.update_incident(&renumbered).await.unwrap();

        let next = repo
            .create_incident(&sample_incident(&chapter), &chapter, d(2025, 2, 1))
            .await
            .unwrap();
        assert_eq!(next.incident_number, "25-003");

        let mut clash = next.clone();
        clash.incident_number = "25-002".into();
        assert!(matches!(
            repo.update_incident(&clash).await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_and_resources_skip_invalid_incidents() {
        let (repo, chapter) = seeded().await;
        let range = DateRange::new(d(2025, 1, 6), d(2025, 1, 12)).unwrap();

        let mut counted = repo
            .create_incident(&sample_incident(&chapter), &chapter, d(2025, 1, 7))
            .await
            .unwrap();
        counted.num_cases = 1;
        let dat = sample_dat(counted.id);
        counted.apply_dat(&dat);
        repo.save_dat_incident(&dat, &counted, &[]).await.unwrap();

        let mut invalid = repo
            .create_incident(&sample_incident(&chapter), &chapter, d(2025, 1, 7))
            .await
            .unwrap();
        invalid.status = IncidentStatus::Invalid;
        invalid.num_adults = 10;
        repo.save_dat_incident(&sample_dat(invalid.id), &invalid, &[]).await.unwrap();

        let stats = repo.incident_stats(chapter.id, range).await.unwrap();
        assert_eq!(stats.incident_count, 1);
        assert_eq!(stats.case_count, 1);
        assert_eq!(stats.client_count, 4);

        let resources = repo
            .count_resources(
                chapter.id,
                range,
                &["blankets".to_string(), "pre-packs".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(resources["blankets"], 4);
        assert_eq!(resources["pre-packs"], 0);

        let listed = repo.valid_incidents_in_range(chapter.id, range).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, counted.id);
    }

    #[tokio::test]
    async fn test_dat_upsert_keeps_one_record() {
        let (repo, chapter) = seeded().await;
        let incident = repo
            .create_incident(&sample_incident(&chapter), &chapter, d(2025, 1, 7))
            .await
            .unwrap();
        assert!(repo.get_dat_incident(incident.id).await.unwrap().is_none());

        let first = repo.save_dat_incident(&sample_dat(0), &incident, &[]).await.unwrap();
        let mut changed = sample_dat(0);
        changed.num_adults = Some(7);
        let second = repo.save_dat_incident(&changed, &incident, &[]).await.unwrap();
        assert_eq!(first.id, second.id);

        let loaded = repo.get_dat_incident(incident.id).await.unwrap().unwrap();
        assert_eq!(loaded.num_adults, Some(7));
        assert_eq!(loaded.incident_id, incident.id);
    }

    #[tokio::test]
    async fn test_singular_events_are_replaced() {
        let (repo, chapter) = seeded().await;
        let incident = repo
            .create_incident(&sample_incident(&chapter), &chapter, d(2025, 1, 7))
            .await
            .unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 7, 3, 0, 0).unwrap();

        repo.record_event(&EventLog::new(incident.id, chapter.id, EventKind::DatOnScene, t0))
            .await
            .unwrap();
        repo.record_event(&EventLog::new(
            incident.id,
            chapter.id,
            EventKind::DatOnScene,
            t0 + Duration::minutes(10),
        ))
        .await
        .unwrap();
        repo.record_event(
            &EventLog::new(incident.id, chapter.id, EventKind::Note, t0 + Duration::minutes(20))
                .with_message("Fire department cleared the scene"),
        )
        .await
        .unwrap();

        let logs = repo.event_logs(incident.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].event, EventKind::Note);
        assert_eq!(logs[1].event_time, t0 + Duration::minutes(10));
    }
}
