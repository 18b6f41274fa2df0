//! Measurement validation, classification and durable commit.
//!
//! The service sits between the capture coordinator and the persistence
//! collaborator. It re-validates everything the UI already checked, computes
//! the growth status itself (never trusting a client-supplied one) and hands
//! the finished row to the store, whose contract is: the insert and its
//! tally update happen atomically or not at all.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::CommitError;
use crate::growth::{GrowthReference, GrowthStatus, age_in_months};

/// Collaborator-side failure, mapped to `CommitError::Storage` verbatim.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub birth_date: NaiveDate,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub id: i64,
    pub name: String,
    pub active: bool,
}

/// Lookup seam to the subject roster collaborator.
pub trait SubjectDirectory {
    fn subject(&self, id: i64) -> Result<Option<Subject>, CollaboratorError>;
}

/// Lookup seam to the officer roster collaborator.
pub trait OperatorDirectory {
    fn operator(&self, id: i64) -> Result<Option<Operator>, CollaboratorError>;
}

/// Row handed to the store; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewMeasurement {
    pub subject_id: i64,
    pub operator_id: i64,
    pub weight_kg: f32,
    pub height_cm: f32,
    pub measured_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub status: GrowthStatus,
}

/// Durable measurement row. Immutable once written; corrections are new
/// records, not updates.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub id: i64,
    pub subject_id: i64,
    pub operator_id: i64,
    pub weight_kg: f32,
    pub height_cm: f32,
    pub measured_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub status: GrowthStatus,
}

/// Dashboard counters; committed records only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    pub active_subjects: u64,
    pub active_operators: u64,
    pub measurements_today: u64,
    pub measurements_this_month: u64,
}

/// Append-only record sink.
///
/// Implementations must make the insert and its daily/monthly tally update
/// atomic: a failed append leaves the tallies untouched.
pub trait MeasurementStore {
    fn append(&self, rec: NewMeasurement) -> Result<MeasurementRecord, CollaboratorError>;
    fn statistics(&self, now: DateTime<Utc>) -> Result<Statistics, CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub subject_id: i64,
    pub operator_id: i64,
    pub weight_kg: f32,
    pub height_cm: f32,
    pub notes: Option<String>,
}

/// Validates, classifies and persists captured readings.
///
/// Shared by every operator session against the same store; cloning is
/// cheap (all collaborators are behind `Arc`).
#[derive(Clone)]
pub struct CommitService {
    subjects: Arc<dyn SubjectDirectory + Send + Sync>,
    operators: Arc<dyn OperatorDirectory + Send + Sync>,
    store: Arc<dyn MeasurementStore + Send + Sync>,
    reference: GrowthReference,
}

impl CommitService {
    pub fn new(
        subjects: Arc<dyn SubjectDirectory + Send + Sync>,
        operators: Arc<dyn OperatorDirectory + Send + Sync>,
        store: Arc<dyn MeasurementStore + Send + Sync>,
        reference: GrowthReference,
    ) -> Self {
        Self {
            subjects,
            operators,
            store,
            reference,
        }
    }

    /// The reference table in use, so UI previews classify identically.
    pub fn reference(&self) -> &GrowthReference {
        &self.reference
    }

    /// Commit with the current wall-clock time as the measurement instant.
    pub fn commit(&self, req: CommitRequest) -> Result<MeasurementRecord, CommitError> {
        self.commit_at(req, Utc::now())
    }

    /// Commit with an explicit measurement instant.
    pub fn commit_at(
        &self,
        req: CommitRequest,
        measured_at: DateTime<Utc>,
    ) -> Result<MeasurementRecord, CommitError> {
        if !(req.weight_kg.is_finite() && req.weight_kg > 0.0) {
            return Err(CommitError::InvalidMeasurement("weight must be > 0"));
        }
        if !(req.height_cm.is_finite() && req.height_cm > 0.0) {
            return Err(CommitError::InvalidMeasurement("height must be > 0"));
        }

        let subject = self
            .subjects
            .subject(req.subject_id)
            .map_err(storage)?
            .filter(|s| s.active)
            .ok_or(CommitError::SubjectNotFound(req.subject_id))?;
        let operator = self
            .operators
            .operator(req.operator_id)
            .map_err(storage)?
            .filter(|o| o.active)
            .ok_or(CommitError::OperatorNotFound(req.operator_id))?;

        let age = age_in_months(subject.birth_date, measured_at.date_naive());
        let status = self
            .reference
            .classify(age, req.weight_kg, req.height_cm);

        let record = self
            .store
            .append(NewMeasurement {
                subject_id: subject.id,
                operator_id: operator.id,
                weight_kg: req.weight_kg,
                height_cm: req.height_cm,
                measured_at,
                notes: req.notes,
                status,
            })
            .map_err(storage)?;

        tracing::info!(
            record_id = record.id,
            subject_id = record.subject_id,
            operator_id = record.operator_id,
            weight_kg = record.weight_kg,
            height_cm = record.height_cm,
            status = %record.status,
            "measurement committed"
        );
        Ok(record)
    }

    /// Current dashboard counters from the store.
    pub fn statistics(&self) -> Result<Statistics, CommitError> {
        self.store.statistics(Utc::now()).map_err(storage)
    }

    pub fn statistics_at(&self, now: DateTime<Utc>) -> Result<Statistics, CommitError> {
        self.store.statistics(now).map_err(storage)
    }
}

fn storage(e: CollaboratorError) -> CommitError {
    CommitError::Storage(e.to_string())
}
