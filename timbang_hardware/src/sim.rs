use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use timbang_traits::{Sample, Sensor};

/// Simulated weight/height sensor.
///
/// Each instance picks one base weight in 7..11 kg and one base height in
/// 65..80 cm, then emits that base plus uniform zero-mean jitter per tick.
/// The jitter magnitudes are the sole determinant of whether the stream
/// settles, so shrinking them (or widening the detector thresholds) makes a
/// run stabilize sooner.
pub struct SimulatedSensor {
    base_weight_kg: f32,
    base_height_cm: f32,
    weight_jitter_kg: f32,
    height_jitter_cm: f32,
    rng: StdRng,
}

impl SimulatedSensor {
    /// Jitter amplitudes of the simulated infant: +/-0.15 kg, +/-1.0 cm.
    pub const DEFAULT_WEIGHT_JITTER_KG: f32 = 0.15;
    pub const DEFAULT_HEIGHT_JITTER_CM: f32 = 1.0;

    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic variant for tests and reproducible demos.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let base_weight_kg = rng.gen_range(7.0..11.0);
        let base_height_cm = rng.gen_range(65.0..80.0);
        Self {
            base_weight_kg,
            base_height_cm,
            weight_jitter_kg: Self::DEFAULT_WEIGHT_JITTER_KG,
            height_jitter_cm: Self::DEFAULT_HEIGHT_JITTER_CM,
            rng,
        }
    }

    /// Override the jitter amplitudes (kg, cm). Zero makes every tick quiet.
    pub fn with_jitter(mut self, weight_jitter_kg: f32, height_jitter_cm: f32) -> Self {
        self.weight_jitter_kg = weight_jitter_kg.max(0.0);
        self.height_jitter_cm = height_jitter_cm.max(0.0);
        self
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for SimulatedSensor {
    fn sample(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<Sample, Box<dyn std::error::Error + Send + Sync>> {
        let wj = if self.weight_jitter_kg > 0.0 {
            self.rng.gen_range(-self.weight_jitter_kg..=self.weight_jitter_kg)
        } else {
            0.0
        };
        let hj = if self.height_jitter_cm > 0.0 {
            self.rng.gen_range(-self.height_jitter_cm..=self.height_jitter_cm)
        } else {
            0.0
        };
        let sample = Sample {
            weight_kg: (self.base_weight_kg + wj).max(0.0),
            height_cm: (self.base_height_cm + hj).max(0.0),
        };
        tracing::trace!(
            weight_kg = sample.weight_kg,
            height_cm = sample.height_cm,
            "simulated sample"
        );
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stays_within_jitter_envelope() {
        let mut sensor = SimulatedSensor::with_seed(7);
        let first = sensor.sample(Duration::from_millis(10)).unwrap();
        for _ in 0..50 {
            let s = sensor.sample(Duration::from_millis(10)).unwrap();
            assert!((s.weight_kg - first.weight_kg).abs() <= 2.0 * 0.15 + 1e-4);
            assert!((s.height_cm - first.height_cm).abs() <= 2.0 * 1.0 + 1e-4);
            assert!(s.weight_kg >= 0.0 && s.height_cm >= 0.0);
        }
    }

    #[test]
    fn zero_jitter_is_perfectly_quiet() {
        let mut sensor = SimulatedSensor::with_seed(3).with_jitter(0.0, 0.0);
        let a = sensor.sample(Duration::from_millis(10)).unwrap();
        let b = sensor.sample(Duration::from_millis(10)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn same_seed_reproduces_stream() {
        let mut a = SimulatedSensor::with_seed(42);
        let mut b = SimulatedSensor::with_seed(42);
        for _ in 0..10 {
            let sa = a.sample(Duration::from_millis(10)).unwrap();
            let sb = b.sample(Duration::from_millis(10)).unwrap();
            assert_eq!(sa, sb);
        }
    }
}
