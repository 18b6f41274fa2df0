#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! SQLite-backed persistence collaborator.
//!
//! Holds the subject/operator roster, the immutable measurement rows and
//! the daily/monthly tally tables. Each measurement insert and its tally
//! updates run in one transaction, so a failed append can never move a
//! counter. Measurement rows are append-only; corrections are new rows.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use timbang_core::commit::{
    CollaboratorError, MeasurementRecord, MeasurementStore, NewMeasurement, Operator,
    OperatorDirectory, Statistics, Subject, SubjectDirectory,
};
use timbang_core::growth::GrowthStatus;

#[derive(Debug, Error)]
pub enum StoreFault {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store mutex poisoned")]
    Poisoned,
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    birth_date TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS operators (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id INTEGER NOT NULL REFERENCES subjects(id),
    operator_id INTEGER NOT NULL REFERENCES operators(id),
    weight_kg REAL NOT NULL,
    height_cm REAL NOT NULL,
    measured_at TEXT NOT NULL,
    notes TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS day_tallies (
    day TEXT PRIMARY KEY,
    count INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS month_tallies (
    month TEXT PRIMARY KEY,
    count INTEGER NOT NULL
);
";

/// SQLite store. One connection behind a mutex; fine for a handful of
/// concurrent operator sessions at a health post.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> eyre::Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| eyre::eyre!("open database {:?}: {}", path, e))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> eyre::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> eyre::Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("store schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreFault> {
        self.conn.lock().map_err(|_| StoreFault::Poisoned)
    }

    /// Enroll a subject; roster maintenance lives with the collaborator,
    /// not the acquisition core.
    pub fn add_subject(&self, name: &str, birth_date: NaiveDate) -> Result<Subject, StoreFault> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO subjects (name, birth_date, active, created_at)
             VALUES (?1, ?2, 1, ?3)",
            params![name, birth_date.to_string(), Utc::now().to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(id, name, "subject enrolled");
        Ok(Subject {
            id,
            name: name.to_string(),
            birth_date,
            active: true,
        })
    }

    pub fn add_operator(&self, name: &str) -> Result<Operator, StoreFault> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO operators (name, active, created_at) VALUES (?1, 1, ?2)",
            params![name, Utc::now().to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(id, name, "operator enrolled");
        Ok(Operator {
            id,
            name: name.to_string(),
            active: true,
        })
    }

    /// Soft-deactivate; history stays intact.
    pub fn set_subject_active(&self, id: i64, active: bool) -> Result<bool, StoreFault> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE subjects SET active = ?1 WHERE id = ?2",
            params![active as i64, id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_operator_active(&self, id: i64, active: bool) -> Result<bool, StoreFault> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE operators SET active = ?1 WHERE id = ?2",
            params![active as i64, id],
        )?;
        Ok(changed > 0)
    }

    /// Measurement history for one subject, newest first.
    pub fn measurements_for(&self, subject_id: i64) -> Result<Vec<MeasurementRecord>, StoreFault> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, subject_id, operator_id, weight_kg, height_cm, measured_at, notes, status
             FROM measurements
             WHERE subject_id = ?1
             ORDER BY measured_at DESC",
        )?;
        let mut rows = stmt.query(params![subject_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    pub fn subject_count(&self) -> Result<u64, StoreFault> {
        let conn = self.lock()?;
        let n: i64 =
            conn.query_row("SELECT COUNT(*) FROM subjects WHERE active = 1", [], |r| {
                r.get(0)
            })?;
        Ok(n.max(0) as u64)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<MeasurementRecord, StoreFault> {
    let measured_at: String = row.get("measured_at")?;
    let status: String = row.get("status")?;
    Ok(MeasurementRecord {
        id: row.get("id")?,
        subject_id: row.get("subject_id")?,
        operator_id: row.get("operator_id")?,
        weight_kg: row.get("weight_kg")?,
        height_cm: row.get("height_cm")?,
        measured_at: parse_datetime(&measured_at, "measured_at")?,
        notes: row.get("notes")?,
        status: GrowthStatus::parse(&status)
            .ok_or_else(|| StoreFault::Corrupt(format!("unknown status '{status}'")))?,
    })
}

fn parse_date(s: &str, field: &str) -> Result<NaiveDate, StoreFault> {
    s.parse::<NaiveDate>()
        .map_err(|e| StoreFault::Corrupt(format!("{field} '{s}': {e}")))
}

fn parse_datetime(s: &str, field: &str) -> Result<DateTime<Utc>, StoreFault> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreFault::Corrupt(format!("{field} '{s}': {e}")))
}

fn month_key(day: NaiveDate) -> String {
    format!("{:04}-{:02}", day.year(), day.month())
}

impl SubjectDirectory for SqliteStore {
    fn subject(&self, id: i64) -> Result<Option<Subject>, CollaboratorError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT id, name, birth_date, active FROM subjects WHERE id = ?1",
                params![id],
                |row| {
                    let birth_date: String = row.get("birth_date")?;
                    let active: i64 = row.get("active")?;
                    Ok((row.get::<_, i64>("id")?, row.get::<_, String>("name")?, birth_date, active))
                },
            )
            .optional()
            .map_err(StoreFault::from)?;
        match found {
            None => Ok(None),
            Some((id, name, birth_date, active)) => Ok(Some(Subject {
                id,
                name,
                birth_date: parse_date(&birth_date, "birth_date")?,
                active: active != 0,
            })),
        }
    }
}

impl OperatorDirectory for SqliteStore {
    fn operator(&self, id: i64) -> Result<Option<Operator>, CollaboratorError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT id, name, active FROM operators WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Operator {
                        id: row.get("id")?,
                        name: row.get("name")?,
                        active: row.get::<_, i64>("active")? != 0,
                    })
                },
            )
            .optional()
            .map_err(StoreFault::from)?;
        Ok(found)
    }
}

impl MeasurementStore for SqliteStore {
    fn append(&self, rec: NewMeasurement) -> Result<MeasurementRecord, CollaboratorError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreFault::from)?;

        tx.execute(
            "INSERT INTO measurements
                 (subject_id, operator_id, weight_kg, height_cm, measured_at, notes, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                rec.subject_id,
                rec.operator_id,
                rec.weight_kg as f64,
                rec.height_cm as f64,
                rec.measured_at.to_rfc3339(),
                rec.notes,
                rec.status.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(StoreFault::from)?;
        let id = tx.last_insert_rowid();

        let day = rec.measured_at.date_naive();
        tx.execute(
            "INSERT INTO day_tallies (day, count) VALUES (?1, 1)
             ON CONFLICT(day) DO UPDATE SET count = count + 1",
            params![day.to_string()],
        )
        .map_err(StoreFault::from)?;
        tx.execute(
            "INSERT INTO month_tallies (month, count) VALUES (?1, 1)
             ON CONFLICT(month) DO UPDATE SET count = count + 1",
            params![month_key(day)],
        )
        .map_err(StoreFault::from)?;

        tx.commit().map_err(StoreFault::from)?;
        tracing::debug!(id, "measurement row inserted");

        Ok(MeasurementRecord {
            id,
            subject_id: rec.subject_id,
            operator_id: rec.operator_id,
            weight_kg: rec.weight_kg,
            height_cm: rec.height_cm,
            measured_at: rec.measured_at,
            notes: rec.notes,
            status: rec.status,
        })
    }

    fn statistics(&self, now: DateTime<Utc>) -> Result<Statistics, CollaboratorError> {
        let conn = self.lock()?;
        let today = now.date_naive();

        let active_subjects: i64 =
            conn.query_row("SELECT COUNT(*) FROM subjects WHERE active = 1", [], |r| {
                r.get(0)
            })
            .map_err(StoreFault::from)?;
        let active_operators: i64 =
            conn.query_row("SELECT COUNT(*) FROM operators WHERE active = 1", [], |r| {
                r.get(0)
            })
            .map_err(StoreFault::from)?;
        let measurements_today: i64 = conn
            .query_row(
                "SELECT count FROM day_tallies WHERE day = ?1",
                params![today.to_string()],
                |r| r.get(0),
            )
            .optional()
            .map_err(StoreFault::from)?
            .unwrap_or(0);
        let measurements_this_month: i64 = conn
            .query_row(
                "SELECT count FROM month_tallies WHERE month = ?1",
                params![month_key(today)],
                |r| r.get(0),
            )
            .optional()
            .map_err(StoreFault::from)?
            .unwrap_or(0);

        Ok(Statistics {
            active_subjects: active_subjects.max(0) as u64,
            active_operators: active_operators.max(0) as u64,
            measurements_today: measurements_today.max(0) as u64,
            measurements_this_month: measurements_this_month.max(0) as u64,
        })
    }
}
