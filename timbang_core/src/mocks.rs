//! Test and helper doubles for timbang_core.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use timbang_traits::{Sample, Sensor};

use crate::commit::{
    CollaboratorError, MeasurementRecord, MeasurementStore, NewMeasurement, Operator,
    OperatorDirectory, Statistics, Subject, SubjectDirectory,
};

/// A sensor that always errors; used when the engine is fed externally
/// sampled values via `tick_with_sample`.
pub struct NoopSensor;

impl Sensor for NoopSensor {
    fn sample(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<Sample, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop sensor")))
    }
}

/// Sensor that replays a fixed sequence of samples, then repeats the last.
pub struct ScriptedSensor {
    seq: Vec<Sample>,
    idx: usize,
}

impl ScriptedSensor {
    pub fn new(seq: impl Into<Vec<Sample>>) -> Self {
        Self {
            seq: seq.into(),
            idx: 0,
        }
    }

    /// Convenience: build the sequence from (weight_kg, height_cm) pairs.
    pub fn from_pairs(pairs: &[(f32, f32)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|&(weight_kg, height_cm)| Sample {
                    weight_kg,
                    height_cm,
                })
                .collect::<Vec<_>>(),
        )
    }
}

impl Sensor for ScriptedSensor {
    fn sample(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<Sample, Box<dyn std::error::Error + Send + Sync>> {
        let s = if self.idx < self.seq.len() {
            let s = self.seq[self.idx];
            self.idx += 1;
            s
        } else {
            match self.seq.last() {
                Some(s) => *s,
                None => return Err(Box::new(std::io::Error::other("empty script"))),
            }
        };
        Ok(s)
    }
}

#[derive(Default)]
struct MemoryInner {
    subjects: HashMap<i64, Subject>,
    operators: HashMap<i64, Operator>,
    records: Vec<MeasurementRecord>,
    day_tally: HashMap<NaiveDate, u64>,
    month_tally: HashMap<(i32, u32), u64>,
    next_id: i64,
}

/// In-memory collaborator: roster directories plus an append-only record
/// store whose tally updates are atomic with the insert (one mutex guards
/// both). Supports injecting a one-shot append failure so tests can show
/// that a failed commit never moves the counters.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    fail_next_append: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subject(&self, id: i64, name: &str, birth_date: NaiveDate, active: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subjects.insert(
                id,
                Subject {
                    id,
                    name: name.to_string(),
                    birth_date,
                    active,
                },
            );
        }
    }

    pub fn add_operator(&self, id: i64, name: &str, active: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.operators.insert(
                id,
                Operator {
                    id,
                    name: name.to_string(),
                    active,
                },
            );
        }
    }

    /// Make the next `append` fail before mutating anything.
    pub fn fail_next_append(&self) {
        self.fail_next_append.store(true, Ordering::Relaxed);
    }

    pub fn records(&self) -> Vec<MeasurementRecord> {
        self.inner
            .lock()
            .map(|inner| inner.records.clone())
            .unwrap_or_default()
    }
}

fn poisoned() -> CollaboratorError {
    Box::new(std::io::Error::other("memory store poisoned"))
}

impl SubjectDirectory for MemoryStore {
    fn subject(&self, id: i64) -> Result<Option<Subject>, CollaboratorError> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(inner.subjects.get(&id).cloned())
    }
}

impl OperatorDirectory for MemoryStore {
    fn operator(&self, id: i64) -> Result<Option<Operator>, CollaboratorError> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(inner.operators.get(&id).cloned())
    }
}

impl MeasurementStore for MemoryStore {
    fn append(&self, rec: NewMeasurement) -> Result<MeasurementRecord, CollaboratorError> {
        if self.fail_next_append.swap(false, Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::other("injected append failure")));
        }
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.next_id += 1;
        let record = MeasurementRecord {
            id: inner.next_id,
            subject_id: rec.subject_id,
            operator_id: rec.operator_id,
            weight_kg: rec.weight_kg,
            height_cm: rec.height_cm,
            measured_at: rec.measured_at,
            notes: rec.notes,
            status: rec.status,
        };
        let day = rec.measured_at.date_naive();
        *inner.day_tally.entry(day).or_insert(0) += 1;
        *inner
            .month_tally
            .entry((day.year(), day.month()))
            .or_insert(0) += 1;
        inner.records.push(record.clone());
        Ok(record)
    }

    fn statistics(&self, now: DateTime<Utc>) -> Result<Statistics, CollaboratorError> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        let today = now.date_naive();
        Ok(Statistics {
            active_subjects: inner.subjects.values().filter(|s| s.active).count() as u64,
            active_operators: inner.operators.values().filter(|o| o.active).count() as u64,
            measurements_today: inner.day_tally.get(&today).copied().unwrap_or(0),
            measurements_this_month: inner
                .month_tally
                .get(&(today.year(), today.month()))
                .copied()
                .unwrap_or(0),
        })
    }
}
