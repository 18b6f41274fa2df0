//! Age-banded growth classification.
//!
//! One classifier serves both the live preview and the commit path, fed by
//! the same reference table, so "looks normal" on screen and "recorded
//! normal" in the register can never drift apart. The function is total:
//! every finite, non-negative input maps to a status, and anything
//! ambiguous degrades to the most cautious one instead of failing a commit.

use chrono::{Datelike, NaiveDate};

use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthStatus {
    Normal,
    Underweight,
    Overweight,
    /// Conservative fallback for unknown age, out-of-table values or
    /// malformed inputs; the health worker takes a closer look.
    NeedsAttention,
}

impl GrowthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthStatus::Normal => "Normal",
            GrowthStatus::Underweight => "Underweight",
            GrowthStatus::Overweight => "Overweight",
            GrowthStatus::NeedsAttention => "NeedsAttention",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Normal" => Some(GrowthStatus::Normal),
            "Underweight" => Some(GrowthStatus::Underweight),
            "Overweight" => Some(GrowthStatus::Overweight),
            "NeedsAttention" => Some(GrowthStatus::NeedsAttention),
            _ => None,
        }
    }
}

impl core::fmt::Display for GrowthStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference interval for one age range, inclusive on both ends.
#[derive(Debug, Clone, Copy)]
pub struct AgeBand {
    pub age_min_months: u32,
    pub age_max_months: u32,
    pub weight_min_kg: f32,
    pub weight_max_kg: f32,
    pub height_min_cm: f32,
    pub height_max_cm: f32,
}

impl AgeBand {
    fn covers(&self, age_months: u32) -> bool {
        (self.age_min_months..=self.age_max_months).contains(&age_months)
    }

    fn well_ordered(&self) -> bool {
        self.age_min_months <= self.age_max_months
            && self.weight_min_kg.is_finite()
            && self.weight_max_kg.is_finite()
            && self.height_min_cm.is_finite()
            && self.height_max_cm.is_finite()
            && self.weight_min_kg >= 0.0
            && self.height_min_cm >= 0.0
            && self.weight_min_kg <= self.weight_max_kg
            && self.height_min_cm <= self.height_max_cm
    }
}

/// Ordered table of age bands. Bands are matched first-covering-wins.
#[derive(Debug, Clone)]
pub struct GrowthReference {
    bands: Vec<AgeBand>,
}

impl Default for GrowthReference {
    /// Single global band carried over from the legacy register rule:
    /// weight 5..15 kg and height 50..90 cm for the first five years.
    fn default() -> Self {
        Self {
            bands: vec![AgeBand {
                age_min_months: 0,
                age_max_months: 60,
                weight_min_kg: 5.0,
                weight_max_kg: 15.0,
                height_min_cm: 50.0,
                height_max_cm: 90.0,
            }],
        }
    }
}

impl GrowthReference {
    /// Build a reference table, rejecting empty or ill-ordered input so the
    /// classifier itself never has to doubt its bands.
    pub fn new(bands: Vec<AgeBand>) -> Result<Self, BuildError> {
        if bands.is_empty() {
            return Err(BuildError::InvalidConfig("growth reference has no bands"));
        }
        if !bands.iter().all(AgeBand::well_ordered) {
            return Err(BuildError::InvalidConfig(
                "growth reference band is not well-ordered",
            ));
        }
        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[AgeBand] {
        &self.bands
    }

    /// Classify a measurement. Total and deterministic; never panics.
    ///
    /// Lower bounds are checked before upper bounds, matching the register
    /// rule this replaces.
    pub fn classify(
        &self,
        age_months: Option<u32>,
        weight_kg: f32,
        height_cm: f32,
    ) -> GrowthStatus {
        if !weight_kg.is_finite()
            || !height_cm.is_finite()
            || weight_kg < 0.0
            || height_cm < 0.0
        {
            return GrowthStatus::NeedsAttention;
        }
        let Some(age) = age_months else {
            return GrowthStatus::NeedsAttention;
        };
        let Some(band) = self.bands.iter().find(|b| b.covers(age)) else {
            return GrowthStatus::NeedsAttention;
        };
        if weight_kg < band.weight_min_kg || height_cm < band.height_min_cm {
            GrowthStatus::Underweight
        } else if weight_kg > band.weight_max_kg || height_cm > band.height_max_cm {
            GrowthStatus::Overweight
        } else {
            GrowthStatus::Normal
        }
    }
}

/// Whole months elapsed between `birth` and `on`.
///
/// Returns None when the measurement date precedes the birth date (a data
/// entry error upstream); the classifier then falls back conservatively.
pub fn age_in_months(birth: NaiveDate, on: NaiveDate) -> Option<u32> {
    if on < birth {
        return None;
    }
    let mut months =
        (on.year() - birth.year()) * 12 + (on.month() as i32 - birth.month() as i32);
    if on.day() < birth.day() {
        months -= 1;
    }
    u32::try_from(months).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
    }

    #[test]
    fn age_counts_whole_months_only() {
        let birth = date(2025, 11, 20);
        assert_eq!(age_in_months(birth, date(2025, 11, 20)), Some(0));
        assert_eq!(age_in_months(birth, date(2025, 12, 19)), Some(0));
        assert_eq!(age_in_months(birth, date(2025, 12, 20)), Some(1));
        assert_eq!(age_in_months(birth, date(2026, 7, 20)), Some(8));
        assert_eq!(age_in_months(birth, date(2026, 7, 19)), Some(7));
    }

    #[test]
    fn age_before_birth_is_unknown() {
        assert_eq!(age_in_months(date(2026, 1, 1), date(2025, 12, 31)), None);
    }

    #[test]
    fn default_reference_matches_legacy_rule() {
        let reference = GrowthReference::default();
        assert_eq!(reference.classify(Some(8), 8.0, 70.0), GrowthStatus::Normal);
        assert_eq!(
            reference.classify(Some(8), 4.0, 70.0),
            GrowthStatus::Underweight
        );
        assert_eq!(
            reference.classify(Some(8), 16.0, 70.0),
            GrowthStatus::Overweight
        );
        assert_eq!(
            reference.classify(Some(8), 8.0, 95.0),
            GrowthStatus::Overweight
        );
    }

    #[test]
    fn rejects_ill_ordered_table() {
        let err = GrowthReference::new(vec![AgeBand {
            age_min_months: 6,
            age_max_months: 12,
            weight_min_kg: 10.0,
            weight_max_kg: 7.0,
            height_min_cm: 65.0,
            height_max_cm: 75.0,
        }])
        .expect_err("inverted band");
        assert!(matches!(err, BuildError::InvalidConfig(_)));
        assert!(GrowthReference::new(Vec::new()).is_err());
    }
}
