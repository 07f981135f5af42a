//! SQLite-backed repository via libsql. Implements every persistence port.
//!
//! One database file (`dat.db`) in the data directory. All access goes through a single
//! connection behind a mutex, so each port call (and each transaction) runs alone.
//! Incident, dispatch and message queries live in sibling modules.

use crate::domain::{Chapter, DomainError, Person, RoleGrant};
use crate::ports::{ChapterRepo, PersonRepo};
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, Row, Rows, Value, params};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS chapters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    short_name TEXT NOT NULL,
    url_slug TEXT NOT NULL UNIQUE,
    utc_offset_minutes INTEGER NOT NULL DEFAULT 0,
    report_advanced_details INTEGER NOT NULL DEFAULT 0,
    report_editable INTEGER NOT NULL DEFAULT 0,
    enable_dispatch_console INTEGER NOT NULL DEFAULT 0,
    enable_messaging INTEGER NOT NULL DEFAULT 0,
    resources_tracked_json TEXT NOT NULL DEFAULT '[]',
    incident_number_prefix TEXT NOT NULL DEFAULT '',
    seq_year INTEGER NOT NULL DEFAULT 0,
    seq_number INTEGER NOT NULL DEFAULT 0
)"#,
    r#"
CREATE TABLE IF NOT EXISTS people (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chapter_id INTEGER NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT,
    sms_number TEXT,
    sms_normalized TEXT,
    lat REAL,
    lng REAL,
    roles_json TEXT NOT NULL DEFAULT '[]'
)"#,
    "CREATE INDEX IF NOT EXISTS idx_people_sms ON people (sms_normalized)",
    r#"
CREATE TABLE IF NOT EXISTS incidents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chapter_id INTEGER NOT NULL,
    incident_number TEXT NOT NULL,
    date TEXT NOT NULL,
    status TEXT NOT NULL,
    incident_type TEXT,
    address TEXT,
    city TEXT,
    county TEXT,
    state TEXT,
    zip TEXT,
    lat REAL,
    lng REAL,
    narrative TEXT,
    num_adults INTEGER NOT NULL DEFAULT 0,
    num_children INTEGER NOT NULL DEFAULT 0,
    num_families INTEGER NOT NULL DEFAULT 0,
    num_cases INTEGER NOT NULL DEFAULT 0,
    response_date TEXT,
    recruitment_message TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (chapter_id, incident_number)
)"#,
    "CREATE INDEX IF NOT EXISTS idx_incidents_chapter_date ON incidents (chapter_id, date)",
    r#"
CREATE TABLE IF NOT EXISTS dat_incidents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id INTEGER NOT NULL UNIQUE,
    detail_json TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS event_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id INTEGER NOT NULL,
    chapter_id INTEGER NOT NULL,
    person_id INTEGER,
    event TEXT NOT NULL,
    event_time INTEGER NOT NULL,
    message TEXT
)"#,
    "CREATE INDEX IF NOT EXISTS idx_event_logs_incident ON event_logs (incident_id, event_time DESC)",
    r#"
CREATE TABLE IF NOT EXISTS responder_assignments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id INTEGER NOT NULL,
    person_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    assigned_at INTEGER NOT NULL,
    dispatched_at INTEGER,
    on_scene_at INTEGER,
    departed_scene_at INTEGER,
    UNIQUE (incident_id, person_id)
)"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_team_lead ON responder_assignments (incident_id) \
     WHERE role = 'team_lead'",
    r#"
CREATE TABLE IF NOT EXISTS responder_recruitments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id INTEGER NOT NULL,
    person_id INTEGER NOT NULL,
    outbound_message_id INTEGER,
    inbound_message_id INTEGER,
    response TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (incident_id, person_id)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS responder_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chapter_id INTEGER NOT NULL,
    person_id INTEGER,
    incident_id INTEGER,
    direction TEXT NOT NULL,
    local_number TEXT,
    remote_number TEXT,
    body TEXT NOT NULL,
    acknowledged INTEGER NOT NULL DEFAULT 0,
    in_reply_to_id INTEGER,
    created_at INTEGER NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_messages_incident ON responder_messages (incident_id, acknowledged)",
];

const CHAPTER_COLUMNS: &str = "id, name, short_name, url_slug, utc_offset_minutes, \
    report_advanced_details, report_editable, enable_dispatch_console, enable_messaging, \
    resources_tracked_json, incident_number_prefix";

const PERSON_COLUMNS: &str =
    "id, chapter_id, first_name, last_name, email, sms_number, lat, lng, roles_json";

/// SQLite repository. Safe to share via Arc.
pub struct SqliteRepo {
    // Keeps the database handle alive for the lifetime of the connection.
    _db: Database,
    pub(super) conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteRepo {
    /// Connect to (or create) `dat.db` under `base_dir` and ensure the schema exists.
    /// Sets WAL mode and synchronous=NORMAL.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(repo_err)?;
        let db_path = base.join("dat.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(repo_err)?;
        let conn = db.connect().map_err(repo_err)?;

        // PRAGMA returns a row (new value); use query and consume rows (execute fails when rows are returned).
        for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"] {
            let mut rows = conn
                .query(pragma, ())
                .await
                .map_err(|e| DomainError::Repo(format!("{pragma} failed: {e}")))?;
            while rows.next().await.map_err(repo_err)?.is_some() {}
        }

        let repo = Self::with_connection(db, conn, Some(db_path)).await?;
        info!(path = %db_path_display(&repo.db_path), "SQLite connected with WAL mode");
        Ok(repo)
    }

    /// Private in-memory database. Used by tests and throwaway runs.
    pub async fn in_memory() -> Result<Self, DomainError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(repo_err)?;
        let conn = db.connect().map_err(repo_err)?;
        Self::with_connection(db, conn, None).await
    }

    async fn with_connection(
        db: Database,
        conn: Connection,
        db_path: Option<PathBuf>,
    ) -> Result<Self, DomainError> {
        for statement in SCHEMA {
            conn.execute(statement, ()).await.map_err(repo_err)?;
        }
        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
            db_path,
        })
    }
}

fn db_path_display(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()).display().to_string())
        .unwrap_or_else(|| ":memory:".to_string())
}

// ─────────────────────────────────────────────────────────────────────────
// Row helpers shared by the sibling query modules
// ─────────────────────────────────────────────────────────────────────────

pub(super) fn repo_err(e: impl std::fmt::Display) -> DomainError {
    DomainError::Repo(e.to_string())
}

/// Column types the row helpers decode from a `libsql::Value`.
pub(super) trait FromColumn: Sized {
    fn from_column(value: Value) -> Result<Self, DomainError>;
}

fn column_mismatch(expected: &str, value: &Value) -> DomainError {
    DomainError::Repo(format!("expected {expected} column, got {value:?}"))
}

impl FromColumn for i64 {
    fn from_column(value: Value) -> Result<Self, DomainError> {
        match value {
            Value::Integer(n) => Ok(n),
            other => Err(column_mismatch("integer", &other)),
        }
    }
}

impl FromColumn for i32 {
    fn from_column(value: Value) -> Result<Self, DomainError> {
        let n = i64::from_column(value)?;
        i32::try_from(n).map_err(repo_err)
    }
}

impl FromColumn for f64 {
    fn from_column(value: Value) -> Result<Self, DomainError> {
        match value {
            Value::Real(x) => Ok(x),
            Value::Integer(n) => Ok(n as f64),
            other => Err(column_mismatch("real", &other)),
        }
    }
}

impl FromColumn for String {
    fn from_column(value: Value) -> Result<Self, DomainError> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(column_mismatch("text", &other)),
        }
    }
}

impl<T: FromColumn> FromColumn for Option<T> {
    fn from_column(value: Value) -> Result<Self, DomainError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_column(other).map(Some),
        }
    }
}

pub(super) fn get<T: FromColumn>(row: &Row, idx: i32) -> Result<T, DomainError> {
    T::from_column(row.get_value(idx).map_err(repo_err)?)
}

pub(super) fn get_bool(row: &Row, idx: i32) -> Result<bool, DomainError> {
    Ok(get::<i64>(row, idx)? != 0)
}

pub(super) fn get_time(row: &Row, idx: i32) -> Result<DateTime<Utc>, DomainError> {
    from_ts(get::<i64>(row, idx)?)
}

pub(super) fn get_opt_time(row: &Row, idx: i32) -> Result<Option<DateTime<Utc>>, DomainError> {
    get::<Option<i64>>(row, idx)?.map(from_ts).transpose()
}

pub(super) fn get_date(row: &Row, idx: i32) -> Result<NaiveDate, DomainError> {
    get::<String>(row, idx)?.parse::<NaiveDate>().map_err(repo_err)
}

pub(super) fn get_opt_date(row: &Row, idx: i32) -> Result<Option<NaiveDate>, DomainError> {
    get::<Option<String>>(row, idx)?
        .map(|s| s.parse::<NaiveDate>().map_err(repo_err))
        .transpose()
}

pub(super) fn get_json<T: serde::de::DeserializeOwned>(row: &Row, idx: i32) -> Result<T, DomainError> {
    serde_json::from_str(&get::<String>(row, idx)?).map_err(repo_err)
}

pub(super) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DomainError> {
    serde_json::to_string(value).map_err(repo_err)
}

pub(super) fn ts(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

pub(super) fn opt_ts(t: Option<DateTime<Utc>>) -> Option<i64> {
    t.map(ts)
}

fn from_ts(secs: i64) -> Result<DateTime<Utc>, DomainError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| DomainError::Repo(format!("timestamp out of range: {secs}")))
}

pub(super) async fn collect<T>(
    mut rows: Rows,
    map: impl Fn(&Row) -> Result<T, DomainError>,
) -> Result<Vec<T>, DomainError> {
    let mut out = Vec::new();
    while let Some(row) = rows.next().await.map_err(repo_err)? {
        out.push(map(&row)?);
    }
    Ok(out)
}

pub(super) async fn first<T>(
    mut rows: Rows,
    map: impl Fn(&Row) -> Result<T, DomainError>,
) -> Result<Option<T>, DomainError> {
    match rows.next().await.map_err(repo_err)? {
        Some(row) => map(&row).map(Some),
        None => Ok(None),
    }
}

fn chapter_from_row(row: &Row) -> Result<Chapter, DomainError> {
    Ok(Chapter {
        id: get(row, 0)?,
        name: get(row, 1)?,
        short_name: get(row, 2)?,
        url_slug: get(row, 3)?,
        utc_offset_minutes: get(row, 4)?,
        incidents_report_advanced_details: get_bool(row, 5)?,
        incidents_report_editable: get_bool(row, 6)?,
        incidents_enable_dispatch_console: get_bool(row, 7)?,
        incidents_enable_messaging: get_bool(row, 8)?,
        incidents_resources_tracked: get_json(row, 9)?,
        incident_number_prefix: get(row, 10)?,
    })
}

fn person_from_row(row: &Row) -> Result<Person, DomainError> {
    let roles: Vec<RoleGrant> = get_json(row, 8)?;
    Ok(Person {
        id: get(row, 0)?,
        chapter_id: get(row, 1)?,
        first_name: get(row, 2)?,
        last_name: get(row, 3)?,
        email: get(row, 4)?,
        sms_number: get(row, 5)?,
        lat: get(row, 6)?,
        lng: get(row, 7)?,
        roles,
    })
}

#[async_trait::async_trait]
impl ChapterRepo for SqliteRepo {
    async fn create_chapter(&self, chapter: &Chapter) -> Result<Chapter, DomainError> {
        let conn = self.conn.lock().await;
        let existing = conn
            .query(
                "SELECT id FROM chapters WHERE url_slug = ?1",
                params![chapter.url_slug.as_str()],
            )
            .await
            .map_err(repo_err)?;
        if first(existing, |row| get::<i64>(row, 0)).await?.is_some() {
            return Err(DomainError::invalid("url_slug", "has already been taken"));
        }
        conn.execute(
            r#"
            INSERT INTO chapters (name, short_name, url_slug, utc_offset_minutes,
                report_advanced_details, report_editable, enable_dispatch_console,
                enable_messaging, resources_tracked_json, incident_number_prefix)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                chapter.name.as_str(),
                chapter.short_name.as_str(),
                chapter.url_slug.as_str(),
                chapter.utc_offset_minutes,
                i64::from(chapter.incidents_report_advanced_details),
                i64::from(chapter.incidents_report_editable),
                i64::from(chapter.incidents_enable_dispatch_console),
                i64::from(chapter.incidents_enable_messaging),
                to_json(&chapter.incidents_resources_tracked)?,
                chapter.incident_number_prefix.as_str(),
            ],
        )
        .await
        .map_err(repo_err)?;
        let id = conn.last_insert_rowid();
        info!(chapter_id = id, slug = %chapter.url_slug, "chapter created");
        Ok(Chapter {
            id,
            ..chapter.clone()
        })
    }

    async fn get_chapter(&self, id: i64) -> Result<Chapter, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first(rows, chapter_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("chapter", id))
    }

    async fn find_chapter_by_slug(&self, slug: &str) -> Result<Chapter, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE url_slug = ?1"),
                params![slug],
            )
            .await
            .map_err(repo_err)?;
        first(rows, chapter_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("chapter", slug))
    }

    async fn list_chapters(&self) -> Result<Vec<Chapter>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(&format!("SELECT {CHAPTER_COLUMNS} FROM chapters ORDER BY id"), ())
            .await
            .map_err(repo_err)?;
        collect(rows, chapter_from_row).await
    }
}

#[async_trait::async_trait]
impl PersonRepo for SqliteRepo {
    async fn create_person(&self, person: &Person) -> Result<Person, DomainError> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO people (chapter_id, first_name, last_name, email, sms_number,
                sms_normalized, lat, lng, roles_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                person.chapter_id,
                person.first_name.as_str(),
                person.last_name.as_str(),
                person.email.clone(),
                person.sms_number.clone(),
                person.normalized_sms_number(),
                person.lat,
                person.lng,
                to_json(&person.roles)?,
            ],
        )
        .await
        .map_err(repo_err)?;
        Ok(Person {
            id: conn.last_insert_rowid(),
            ..person.clone()
        })
    }

    async fn get_person(&self, id: i64) -> Result<Person, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!("SELECT {PERSON_COLUMNS} FROM people WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first(rows, person_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("person", id))
    }

    async fn find_person_by_sms_number(&self, normalized: &str) -> Result<Option<Person>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {PERSON_COLUMNS} FROM people WHERE sms_normalized = ?1 ORDER BY id LIMIT 1"
                ),
                params![normalized],
            )
            .await
            .map_err(repo_err)?;
        first(rows, person_from_row).await
    }

    async fn people_in_chapter(&self, chapter_id: i64) -> Result<Vec<Person>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "SELECT {PERSON_COLUMNS} FROM people WHERE chapter_id = ?1 ORDER BY last_name, first_name"
                ),
                params![chapter_id],
            )
            .await
            .map_err(repo_err)?;
        collect(rows, person_from_row).await
    }
}

#[cfg(test)]
pub(super) mod test_support {
    use super::*;
    use crate::domain::chapter::sample_chapter;

    /// In-memory repo with one stored chapter.
    pub(crate) async fn seeded() -> (SqliteRepo, Chapter) {
        let repo = SqliteRepo::in_memory().await.unwrap();
        let chapter = repo.create_chapter(&sample_chapter()).await.unwrap();
        (repo, chapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::person::normalize_phone;

    fn chapter() -> Chapter {
        Chapter {
            id: 0,
            name: "Bay Area Chapter".into(),
            short_name: "ARCBA".into(),
            url_slug: "arcba".into(),
            utc_offset_minutes: -480,
            incidents_report_advanced_details: true,
            incidents_report_editable: true,
            incidents_enable_dispatch_console: true,
            incidents_enable_messaging: false,
            incidents_resources_tracked: vec!["blankets".into()],
            incident_number_prefix: String::new(),
        }
    }

    #[test]
    fn test_column_conversions() {
        assert_eq!(Option::<String>::from_column(Value::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_column(Value::Integer(7)).unwrap(), Some(7));
        assert_eq!(f64::from_column(Value::Integer(2)).unwrap(), 2.0);
        assert_eq!(i32::from_column(Value::Integer(-480)).unwrap(), -480);
        assert!(i32::from_column(Value::Integer(i64::MAX)).is_err());
        assert!(matches!(
            String::from_column(Value::Null),
            Err(DomainError::Repo(_))
        ));
    }

    #[tokio::test]
    async fn test_chapter_round_trip_and_unique_slug() {
        let repo = SqliteRepo::in_memory().await.unwrap();
        let created = repo.create_chapter(&chapter()).await.unwrap();
        assert!(created.id > 0);

        let loaded = repo.find_chapter_by_slug("arcba").await.unwrap();
        assert_eq!(loaded, created);
        assert_eq!(repo.list_chapters().await.unwrap().len(), 1);

        let dup = repo.create_chapter(&chapter()).await;
        assert!(matches!(dup, Err(DomainError::Validation(_))));
        assert!(matches!(
            repo.get_chapter(999).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_person_lookup_by_sms_number() {
        let repo = SqliteRepo::in_memory().await.unwrap();
        let chapter = repo.create_chapter(&chapter()).await.unwrap();
        let person = Person {
            id: 0,
            chapter_id: chapter.id,
            first_name: "Dana".into(),
            last_name: "Lee".into(),
            email: None,
            sms_number: Some("(510) 555-0199".into()),
            lat: None,
            lng: None,
            roles: vec![RoleGrant::IncidentsAdmin],
        };
        let created = repo.create_person(&person).await.unwrap();

        let found = repo
            .find_person_by_sms_number(&normalize_phone("+15105550199"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.roles, vec![RoleGrant::IncidentsAdmin]);
        assert!(
            repo.find_person_by_sms_number("4155550000")
                .await
                .unwrap()
                .is_none()
        );
    }
}
