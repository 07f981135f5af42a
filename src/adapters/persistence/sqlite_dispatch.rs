//! Assignment, recruitment and message queries for [`SqliteRepo`].

use super::sqlite_incidents::write_event;
use super::sqlite_repo::{
    SqliteRepo, collect, first, get, get_bool, get_opt_time, get_time, opt_ts, repo_err, ts,
};
use crate::domain::{
    AssignmentRole, Direction, DomainError, EventLog, RecruitmentResponse, ResponderAssignment,
    ResponderMessage, ResponderRecruitment, ResponderStatus,
};
use crate::ports::{DispatchRepo, MessageRepo};
use libsql::{Connection, Row, params};
use tracing::debug;

const ASSIGNMENT_COLUMNS: &str = "a.id, a.incident_id, a.person_id, a.role, a.assigned_at, \
    a.dispatched_at, a.on_scene_at, a.departed_scene_at";

const RECRUITMENT_COLUMNS: &str = "r.id, r.incident_id, r.person_id, r.outbound_message_id, \
    r.inbound_message_id, r.response, r.created_at, r.updated_at";

const MESSAGE_COLUMNS: &str = "id, chapter_id, person_id, incident_id, direction, local_number, \
    remote_number, body, acknowledged, in_reply_to_id, created_at";

fn assignment_from_row(row: &Row) -> Result<ResponderAssignment, DomainError> {
    Ok(ResponderAssignment {
        id: get(row, 0)?,
        incident_id: get(row, 1)?,
        person_id: get(row, 2)?,
        role: get::<String>(row, 3)?.parse::<AssignmentRole>()?,
        assigned_at: get_time(row, 4)?,
        dispatched_at: get_opt_time(row, 5)?,
        on_scene_at: get_opt_time(row, 6)?,
        departed_scene_at: get_opt_time(row, 7)?,
    })
}

fn recruitment_from_row(row: &Row) -> Result<ResponderRecruitment, DomainError> {
    Ok(ResponderRecruitment {
        id: get(row, 0)?,
        incident_id: get(row, 1)?,
        person_id: get(row, 2)?,
        outbound_message_id: get(row, 3)?,
        inbound_message_id: get(row, 4)?,
        response: get::<String>(row, 5)?.parse::<RecruitmentResponse>()?,
        created_at: get_time(row, 6)?,
        updated_at: get_time(row, 7)?,
    })
}

fn message_from_row(row: &Row) -> Result<ResponderMessage, DomainError> {
    Ok(ResponderMessage {
        id: get(row, 0)?,
        chapter_id: get(row, 1)?,
        person_id: get(row, 2)?,
        incident_id: get(row, 3)?,
        direction: get::<String>(row, 4)?.parse::<Direction>()?,
        local_number: get(row, 5)?,
        remote_number: get(row, 6)?,
        body: get(row, 7)?,
        acknowledged: get_bool(row, 8)?,
        in_reply_to_id: get(row, 9)?,
        created_at: get_time(row, 10)?,
    })
}

fn assignment_conflict(e: libsql::Error) -> DomainError {
    let message = e.to_string();
    if !message.contains("UNIQUE") {
        return repo_err(e);
    }
    if message.contains("person_id") {
        DomainError::invalid("person", "is already assigned to this incident")
    } else {
        DomainError::invalid("role", "a team lead is already assigned to this incident")
    }
}

/// Insert (id == 0) or update one assignment row.
async fn write_assignment(
    conn: &Connection,
    assignment: &ResponderAssignment,
) -> Result<ResponderAssignment, DomainError> {
    if assignment.id == 0 {
        conn.execute(
            r#"
            INSERT INTO responder_assignments (incident_id, person_id, role, assigned_at,
                dispatched_at, on_scene_at, departed_scene_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                assignment.incident_id,
                assignment.person_id,
                assignment.role.as_str(),
                ts(assignment.assigned_at),
                opt_ts(assignment.dispatched_at),
                opt_ts(assignment.on_scene_at),
                opt_ts(assignment.departed_scene_at),
            ],
        )
        .await
        .map_err(assignment_conflict)?;
        return Ok(ResponderAssignment {
            id: conn.last_insert_rowid(),
            ..assignment.clone()
        });
    }

    let changed = conn
        .execute(
            r#"
            UPDATE responder_assignments SET role = ?2, dispatched_at = ?3, on_scene_at = ?4,
                departed_scene_at = ?5
            WHERE id = ?1
            "#,
            params![
                assignment.id,
                assignment.role.as_str(),
                opt_ts(assignment.dispatched_at),
                opt_ts(assignment.on_scene_at),
                opt_ts(assignment.departed_scene_at),
            ],
        )
        .await
        .map_err(assignment_conflict)?;
    if changed == 0 {
        return Err(DomainError::not_found("assignment", assignment.id));
    }
    Ok(assignment.clone())
}

#[async_trait::async_trait]
impl DispatchRepo for SqliteRepo {
    async fn save_assignment(&self, assignment: &ResponderAssignment) -> Result<ResponderAssignment, DomainError> {
        let conn = self.conn.lock().await;
        write_assignment(&conn, assignment).await
    }

    async fn save_assignment_logged(
        &self,
        assignment: &ResponderAssignment,
        event: &EventLog,
    ) -> Result<ResponderAssignment, DomainError> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(repo_err)?;
        let saved = write_assignment(&tx, assignment).await?;
        write_event(&tx, event).await?;
        tx.commit().await.map_err(repo_err)?;
        Ok(saved)
    }

    async fn advance_assignment(
        &self,
        assignment: &ResponderAssignment,
        target: ResponderStatus,
        event: &EventLog,
    ) -> Result<bool, DomainError> {
        let (column, at) = match target {
            ResponderStatus::Assigned => return Ok(false),
            ResponderStatus::Dispatched => ("dispatched_at", assignment.dispatched_at),
            ResponderStatus::OnScene => ("on_scene_at", assignment.on_scene_at),
            ResponderStatus::Departed => ("departed_scene_at", assignment.departed_scene_at),
        };
        let at = at.ok_or_else(|| {
            DomainError::Repo(format!("assignment {} has no {column} to store", assignment.id))
        })?;
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(repo_err)?;
        // Only the first writer to reach `target` wins.
        let changed = tx
            .execute(
                &format!(
                    "UPDATE responder_assignments SET {column} = ?2 \
                     WHERE id = ?1 AND {column} IS NULL"
                ),
                params![assignment.id, ts(at)],
            )
            .await
            .map_err(repo_err)?;
        if changed == 0 {
            tx.rollback().await.map_err(repo_err)?;
            debug!(assignment_id = assignment.id, status = %target, "status already reached");
            return Ok(false);
        }
        write_event(&tx, event).await?;
        tx.commit().await.map_err(repo_err)?;
        Ok(true)
    }

    async fn get_assignment(&self, id: i64) -> Result<ResponderAssignment, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM responder_assignments a WHERE a.id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first(rows, assignment_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("assignment", id))
    }

    async fn assignments_for_incident(&self, incident_id: i64) -> Result<Vec<ResponderAssignment>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {ASSIGNMENT_COLUMNS} FROM responder_assignments a \
                     WHERE a.incident_id = ?1 ORDER BY a.assigned_at, a.id"
                ),
                params![incident_id],
            )
            .await
            .map_err(repo_err)?;
        collect(rows, assignment_from_row).await
    }

    async fn active_assignment_for_person(
        &self,
        person_id: i64,
    ) -> Result<Option<ResponderAssignment>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {ASSIGNMENT_COLUMNS} FROM responder_assignments a \
                     JOIN incidents i ON i.id = a.incident_id \
                     WHERE a.person_id = ?1 AND i.status = 'open' \
                       AND a.role IN ('team_lead', 'responder', 'trainee') \
                       AND a.departed_scene_at IS NULL \
                     ORDER BY a.assigned_at DESC, a.id DESC LIMIT 1"
                ),
                params![person_id],
            )
            .await
            .map_err(repo_err)?;
        first(rows, assignment_from_row).await
    }

    async fn save_recruitment(
        &self,
        recruitment: &ResponderRecruitment,
    ) -> Result<ResponderRecruitment, DomainError> {
        let conn = self.conn.lock().await;
        if recruitment.id == 0 {
            conn.execute(
                r#"
                INSERT INTO responder_recruitments (incident_id, person_id, outbound_message_id,
                    inbound_message_id, response, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    recruitment.incident_id,
                    recruitment.person_id,
                    recruitment.outbound_message_id,
                    recruitment.inbound_message_id,
                    recruitment.response.as_str(),
                    ts(recruitment.created_at),
                    ts(recruitment.updated_at),
                ],
            )
            .await
            .map_err(|e| {
                if e.to_string().contains("UNIQUE") {
                    DomainError::invalid("person", "has already been recruited for this incident")
                } else {
                    repo_err(e)
                }
            })?;
            return Ok(ResponderRecruitment {
                id: conn.last_insert_rowid(),
                ..recruitment.clone()
            });
        }

        let changed = conn
            .execute(
                r#"
                UPDATE responder_recruitments SET outbound_message_id = ?2,
                    inbound_message_id = ?3, response = ?4, updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    recruitment.id,
                    recruitment.outbound_message_id,
                    recruitment.inbound_message_id,
                    recruitment.response.as_str(),
                    ts(recruitment.updated_at),
                ],
            )
            .await
            .map_err(repo_err)?;
        if changed == 0 {
            return Err(DomainError::not_found("recruitment", recruitment.id));
        }
        Ok(recruitment.clone())
    }

    async fn find_recruitment(
        &self,
        incident_id: i64,
        person_id: i64,
    ) -> Result<Option<ResponderRecruitment>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {RECRUITMENT_COLUMNS} FROM responder_recruitments r \
                     WHERE r.incident_id = ?1 AND r.person_id = ?2"
                ),
                params![incident_id, person_id],
            )
            .await
            .map_err(repo_err)?;
        first(rows, recruitment_from_row).await
    }

    async fn latest_open_recruitment(
        &self,
        person_id: i64,
    ) -> Result<Option<ResponderRecruitment>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {RECRUITMENT_COLUMNS} FROM responder_recruitments r \
                     JOIN incidents i ON i.id = r.incident_id \
                     WHERE r.person_id = ?1 AND i.status = 'open' \
                     ORDER BY r.updated_at DESC, r.id DESC LIMIT 1"
                ),
                params![person_id],
            )
            .await
            .map_err(repo_err)?;
        first(rows, recruitment_from_row).await
    }

    async fn recruitments_for_incident(
        &self,
        incident_id: i64,
    ) -> Result<Vec<ResponderRecruitment>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {RECRUITMENT_COLUMNS} FROM responder_recruitments r \
                     WHERE r.incident_id = ?1 ORDER BY r.created_at, r.id"
                ),
                params![incident_id],
            )
            .await
            .map_err(repo_err)?;
        collect(rows, recruitment_from_row).await
    }
}

#[async_trait::async_trait]
impl MessageRepo for SqliteRepo {
    async fn save_message(&self, message: &ResponderMessage) -> Result<ResponderMessage, DomainError> {
        let conn = self.conn.lock().await;
        if message.id != 0 {
            let changed = conn
                .execute(
                    "UPDATE responder_messages SET incident_id = ?2, acknowledged = ?3 WHERE id = ?1",
                    params![
                        message.id,
                        message.incident_id,
                        i64::from(message.acknowledged)
                    ],
                )
                .await
                .map_err(repo_err)?;
            if changed == 0 {
                return Err(DomainError::not_found("message", message.id));
            }
            return Ok(message.clone());
        }

        conn.execute(
            r#"
            INSERT INTO responder_messages (chapter_id, person_id, incident_id, direction,
                local_number, remote_number, body, acknowledged, in_reply_to_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                message.chapter_id,
                message.person_id,
                message.incident_id,
                message.direction.as_str(),
                message.local_number.clone(),
                message.remote_number.clone(),
                message.body.as_str(),
                i64::from(message.acknowledged),
                message.in_reply_to_id,
                ts(message.created_at),
            ],
        )
        .await
        .map_err(repo_err)?;
        let id = conn.last_insert_rowid();
        debug!(message_id = id, direction = message.direction.as_str(), "message stored");
        Ok(ResponderMessage {
            id,
            ..message.clone()
        })
    }

    async fn get_message(&self, id: i64) -> Result<ResponderMessage, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM responder_messages WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first(rows, message_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("message", id))
    }

    async fn set_acknowledged(&self, id: i64, acknowledged: bool) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE responder_messages SET acknowledged = ?2 WHERE id = ?1",
                params![id, i64::from(acknowledged)],
            )
            .await
            .map_err(repo_err)?;
        if changed == 0 {
            return Err(DomainError::not_found("message", id));
        }
        Ok(())
    }

    async fn unacknowledged_for_incident(&self, incident_id: i64) -> Result<Vec<ResponderMessage>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM responder_messages \
                     WHERE incident_id = ?1 AND direction = 'incoming' AND acknowledged = 0 \
                     ORDER BY created_at DESC, id DESC"
                ),
                params![incident_id],
            )
            .await
            .map_err(repo_err)?;
        collect(rows, message_from_row).await
    }

    async fn messages_for_person(&self, person_id: i64) -> Result<Vec<ResponderMessage>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM responder_messages \
                     WHERE person_id = ?1 ORDER BY created_at, id"
                ),
                params![person_id],
            )
            .await
            .map_err(repo_err)?;
        collect(rows, message_from_row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::sqlite_repo::test_support::seeded;
    use crate::domain::incident::sample_incident;
    use crate::domain::{EventKind, IncidentStatus};
    use crate::ports::IncidentRepo;
    use chrono::{Duration, NaiveDate, Utc};

    async fn open_incident(repo: &SqliteRepo, chapter: &crate::domain::Chapter) -> i64 {
        let today = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        repo.create_incident(&sample_incident(chapter), chapter, today)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_assignment_update_and_duplicate() {
        let (repo, chapter) = seeded().await;
        let incident_id = open_incident(&repo, &chapter).await;
        let now = Utc::now();

        let mut a = repo
            .save_assignment(&ResponderAssignment::new(incident_id, 7, AssignmentRole::Responder, now))
            .await
            .unwrap();
        a.advance(ResponderStatus::Dispatched, now).unwrap();
        repo.save_assignment(&a).await.unwrap();

        let loaded = repo.get_assignment(a.id).await.unwrap();
        assert_eq!(loaded.status(), ResponderStatus::Dispatched);

        let dup = repo
            .save_assignment(&ResponderAssignment::new(incident_id, 7, AssignmentRole::Trainee, now))
            .await;
        assert!(matches!(dup, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_one_team_lead_per_incident() {
        let (repo, chapter) = seeded().await;
        let incident_id = open_incident(&repo, &chapter).await;
        let now = Utc::now();
        let assigned = |person| {
            EventLog::new(incident_id, chapter.id, EventKind::ResponderAssigned, now).by(person)
        };

        repo.save_assignment_logged(
            &ResponderAssignment::new(incident_id, 7, AssignmentRole::TeamLead, now),
            &assigned(7),
        )
        .await
        .unwrap();
        let second = repo
            .save_assignment_logged(
                &ResponderAssignment::new(incident_id, 8, AssignmentRole::TeamLead, now),
                &assigned(8),
            )
            .await;
        let Err(DomainError::Validation(errors)) = second else {
            panic!("expected validation error, got {second:?}");
        };
        assert!(errors.contains("role"));

        // Promoting an existing responder hits the same constraint.
        let mut responder = repo
            .save_assignment(&ResponderAssignment::new(incident_id, 9, AssignmentRole::Responder, now))
            .await
            .unwrap();
        responder.reassign(AssignmentRole::TeamLead);
        assert!(matches!(
            repo.save_assignment(&responder).await,
            Err(DomainError::Validation(_))
        ));

        // The rejected insert left no timeline entry behind.
        assert_eq!(repo.event_logs(incident_id).await.unwrap().len(), 1);
        assert_eq!(repo.assignments_for_incident(incident_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_advance_assignment_writes_once() {
        let (repo, chapter) = seeded().await;
        let incident_id = open_incident(&repo, &chapter).await;
        let now = Utc::now();
        let stored = repo
            .save_assignment(&ResponderAssignment::new(incident_id, 7, AssignmentRole::Responder, now))
            .await
            .unwrap();
        let event = EventLog::new(
            incident_id,
            chapter.id,
            ResponderStatus::Dispatched.event(),
            now,
        );

        // Two requests that both loaded the row before either wrote.
        let mut first_copy = stored.clone();
        let mut second_copy = stored.clone();
        first_copy.advance(ResponderStatus::Dispatched, now).unwrap();
        second_copy.advance(ResponderStatus::Dispatched, now).unwrap();

        assert!(repo.advance_assignment(&first_copy, ResponderStatus::Dispatched, &event).await.unwrap());
        assert!(!repo.advance_assignment(&second_copy, ResponderStatus::Dispatched, &event).await.unwrap());

        let loaded = repo.get_assignment(stored.id).await.unwrap();
        assert_eq!(loaded.status(), ResponderStatus::Dispatched);
        assert_eq!(repo.event_logs(incident_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_active_assignment_ignores_closed_and_departed() {
        let (repo, chapter) = seeded().await;
        let now = Utc::now();
        let first_id = open_incident(&repo, &chapter).await;
        let second_id = open_incident(&repo, &chapter).await;

        repo.save_assignment(&ResponderAssignment::new(first_id, 7, AssignmentRole::Responder, now))
            .await
            .unwrap();
        let mut later = repo
            .save_assignment(&ResponderAssignment::new(
                second_id,
                7,
                AssignmentRole::TeamLead,
                now + Duration::minutes(5),
            ))
            .await
            .unwrap();
        let active = repo.active_assignment_for_person(7).await.unwrap().unwrap();
        assert_eq!(active.incident_id, second_id);

        later.advance(ResponderStatus::Dispatched, now).unwrap();
        later.advance(ResponderStatus::OnScene, now).unwrap();
        later.advance(ResponderStatus::Departed, now).unwrap();
        repo.save_assignment(&later).await.unwrap();
        let active = repo.active_assignment_for_person(7).await.unwrap().unwrap();
        assert_eq!(active.incident_id, first_id);

        let mut first = repo.get_incident(first_id).await.unwrap();
        first.status = IncidentStatus::Closed;
        repo.update_incident(&first).await.unwrap();
        assert!(repo.active_assignment_for_person(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recruitment_lookup() {
        let (repo, chapter) = seeded().await;
        let incident_id = open_incident(&repo, &chapter).await;
        let now = Utc::now();

        let mut r = repo
            .save_recruitment(&ResponderRecruitment::new(incident_id, 9, now))
            .await
            .unwrap();
        r.record_reply(true, 42, now);
        repo.save_recruitment(&r).await.unwrap();

        let found = repo.find_recruitment(incident_id, 9).await.unwrap().unwrap();
        assert_eq!(found.response, RecruitmentResponse::Available);
        assert_eq!(found.inbound_message_id, Some(42));
        assert_eq!(repo.latest_open_recruitment(9).await.unwrap().unwrap().id, r.id);
        assert_eq!(repo.recruitments_for_incident(incident_id).await.unwrap().len(), 1);
        assert!(repo.find_recruitment(incident_id, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unacknowledged_messages() {
        let (repo, chapter) = seeded().await;
        let incident_id = open_incident(&repo, &chapter).await;
        let now = Utc::now();

        let question = repo
            .save_message(
                &ResponderMessage::incoming(chapter.id, 9, "Which entrance?", now)
                    .for_incident(Some(incident_id)),
            )
            .await
            .unwrap();
        repo.save_message(
            &ResponderMessage::outgoing(chapter.id, 9, "Side door", now).for_incident(Some(incident_id)),
        )
        .await
        .unwrap();

        let pending = repo.unacknowledged_for_incident(incident_id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, question.id);

        repo.set_acknowledged(question.id, true).await.unwrap();
        assert!(repo.unacknowledged_for_incident(incident_id).await.unwrap().is_empty());
        assert!(repo.get_message(question.id).await.unwrap().acknowledged);
        assert_eq!(repo.messages_for_person(9).await.unwrap().len(), 2);
        assert!(matches!(
            repo.set_acknowledged(999, true).await,
            Err(DomainError::NotFound { .. })
        ));
    }
}
