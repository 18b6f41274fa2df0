#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and growth-reference parsing for the measurement station.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The growth-reference CSV loader enforces headers and checks that every
//!   age band is well-ordered before it reaches the classifier.
use serde::Deserialize;

/// Device sampling behaviour.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct DeviceCfg {
    /// Tick period of the acquisition loop (ms)
    pub tick_ms: u64,
    /// Max wait per sensor sample before the read fails (ms)
    pub sample_timeout_ms: u64,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            tick_ms: 500,
            sample_timeout_ms: 150,
        }
    }
}

/// Jitter thresholds that decide when the stream counts as settled.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct StabilityCfg {
    /// A tick is quiet when |Δweight| stays below this (kg)
    pub weight_jitter_kg: f32,
    /// A tick is quiet when |Δheight| stays below this (cm)
    pub height_jitter_cm: f32,
    /// Readings retained for inspection; at least 2
    pub window: usize,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            weight_jitter_kg: 0.1,
            height_jitter_cm: 0.5,
            window: 4,
        }
    }
}

/// Connection lifecycle tuning.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct LinkCfg {
    /// Delay between connect() and the stream going live (ms)
    pub settle_ms: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self { settle_ms: 1000 }
    }
}

/// How the session runner paces the tick loop.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Background ticker thread owns the sensor
    #[default]
    Ticker,
    /// Read the sensor inside the session loop
    Direct,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SessionCfg {
    /// Overall bound on waiting for a stable reading (ms); 0 disables the
    /// bound and the operator abandons an unstable session by disconnecting.
    pub max_wait_ms: u64,
    pub mode: SessionMode,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            max_wait_ms: 0,
            mode: SessionMode::Ticker,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StoreCfg {
    /// Path of the SQLite database file
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// One age band of the growth reference table.
///
/// Also the CSV row schema. Expected headers:
/// age_min_months,age_max_months,weight_min_kg,weight_max_kg,height_min_cm,height_max_cm
///
/// Example:
/// age_min_months,age_max_months,weight_min_kg,weight_max_kg,height_min_cm,height_max_cm
/// 6,12,7.0,10.0,65.0,75.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct GrowthBand {
    pub age_min_months: u32,
    pub age_max_months: u32,
    pub weight_min_kg: f32,
    pub weight_max_kg: f32,
    pub height_min_cm: f32,
    pub height_max_cm: f32,
}

impl GrowthBand {
    /// A band is usable when every bound is finite and min <= max per pair.
    pub fn well_ordered(&self) -> bool {
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

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GrowthCfg {
    /// Optional inline reference table; a CSV file takes precedence when the
    /// CLI is given one.
    pub bands: Vec<GrowthBand>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceCfg,
    pub stability: StabilityCfg,
    pub link: LinkCfg,
    pub session: SessionCfg,
    pub store: StoreCfg,
    pub logging: Logging,
    pub growth: GrowthCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        if self.device.tick_ms == 0 {
            eyre::bail!("device.tick_ms must be >= 1");
        }
        if self.device.tick_ms > 60_000 {
            eyre::bail!("device.tick_ms is unreasonably large (>60s)");
        }
        if self.device.sample_timeout_ms == 0 {
            eyre::bail!("device.sample_timeout_ms must be >= 1");
        }

        // Stability
        if !(self.stability.weight_jitter_kg.is_finite() && self.stability.weight_jitter_kg > 0.0) {
            eyre::bail!("stability.weight_jitter_kg must be > 0");
        }
        if !(self.stability.height_jitter_cm.is_finite() && self.stability.height_jitter_cm > 0.0) {
            eyre::bail!("stability.height_jitter_cm must be > 0");
        }
        if self.stability.window < 2 {
            eyre::bail!("stability.window must be >= 2");
        }

        // Link
        if self.link.settle_ms > 5 * 60 * 1000 {
            eyre::bail!("link.settle_ms is unreasonably large (>5min)");
        }

        // Growth
        for (idx, band) in self.growth.bands.iter().enumerate() {
            if !band.well_ordered() {
                eyre::bail!("growth.bands[{idx}] is not well-ordered (min must be <= max)");
            }
        }

        Ok(())
    }
}

/// Load the growth reference table from CSV with a strict header check.
pub fn load_reference_csv(path: &std::path::Path) -> eyre::Result<Vec<GrowthBand>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open reference CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = [
        "age_min_months",
        "age_max_months",
        "weight_min_kg",
        "weight_max_kg",
        "height_min_cm",
        "height_max_cm",
    ];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "reference CSV must have headers '{}', got: {}",
            expected.join(","),
            actual.join(",")
        );
    }

    let mut bands = Vec::new();
    for (idx, rec) in rdr.deserialize::<GrowthBand>().enumerate() {
        match rec {
            Ok(band) => {
                if !band.well_ordered() {
                    eyre::bail!(
                        "reference CSV row {} is not well-ordered (min must be <= max)",
                        idx + 2
                    );
                }
                bands.push(band);
            }
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    if bands.is_empty() {
        eyre::bail!("reference CSV {:?} contains no bands", path);
    }

    Ok(bands)
}
