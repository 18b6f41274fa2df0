//! Command implementations: wiring config, store, service and the session
//! runner together.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Months;
use eyre::WrapErr;
use serde_json::json;
use timbang_core::runner::{SessionParams, TickMode, run_session};
use timbang_core::{AcquireCfg, CommitService, GrowthReference, LinkCfg, StabilityCfg};
use timbang_hardware::SimulatedSensor;
use timbang_traits::Sensor;
use timbang_store::SqliteStore;

use crate::cli::Cli;

pub fn open_store(cli: &Cli, config: &timbang_config::Config) -> eyre::Result<Arc<SqliteStore>> {
    let path: PathBuf = cli
        .db
        .clone()
        .or_else(|| config.store.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("timbang.db"));
    Ok(Arc::new(SqliteStore::open(&path)?))
}

/// Growth reference precedence: CLI CSV > config table > built-in default.
pub fn load_reference(cli: &Cli, config: &timbang_config::Config) -> eyre::Result<GrowthReference> {
    if let Some(csv) = &cli.growth_reference {
        let bands = timbang_config::load_reference_csv(csv)?;
        return GrowthReference::new(bands.iter().map(Into::into).collect())
            .wrap_err("growth reference CSV rejected");
    }
    if !config.growth.bands.is_empty() {
        return GrowthReference::new(config.growth.bands.iter().map(Into::into).collect())
            .wrap_err("growth table in config rejected");
    }
    Ok(GrowthReference::default())
}

pub fn service_for(store: &Arc<SqliteStore>, reference: GrowthReference) -> CommitService {
    CommitService::new(store.clone(), store.clone(), store.clone(), reference)
}

/// Simulator backend; a framed serial device would be built here instead.
/// `TIMBANG_SIM_SEED` pins the stream for reproducible runs and tests.
fn build_sensor() -> SimulatedSensor {
    match std::env::var("TIMBANG_SIM_SEED")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        Some(seed) => SimulatedSensor::with_seed(seed),
        None => SimulatedSensor::new(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run_measure(
    cli: &Cli,
    config: &timbang_config::Config,
    subject: i64,
    operator: i64,
    notes: Option<String>,
    max_wait_ms: Option<u64>,
    tick_ms: Option<u64>,
    direct: bool,
) -> eyre::Result<()> {
    let store = open_store(cli, config)?;
    let reference = load_reference(cli, config)?;
    let service = service_for(&store, reference);

    let mut acquire: AcquireCfg = (&config.device).into();
    if let Some(t) = tick_ms {
        acquire.tick_ms = t;
    }
    let stability: StabilityCfg = (&config.stability).into();
    let link: LinkCfg = (&config.link).into();
    let mode = if direct {
        TickMode::Direct
    } else {
        config.session.mode.into()
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .wrap_err("install signal handler")?;

    let params = SessionParams {
        subject_id: subject,
        operator_id: operator,
        notes,
        max_wait_ms: max_wait_ms.unwrap_or(config.session.max_wait_ms),
        mode,
    };

    let record = run_session(
        build_sensor(),
        acquire,
        stability,
        link,
        &service,
        params,
        Some(shutdown),
        None,
    )?;

    if cli.json {
        println!(
            "{}",
            json!({
                "id": record.id,
                "subject_id": record.subject_id,
                "operator_id": record.operator_id,
                "weight_kg": record.weight_kg,
                "height_cm": record.height_cm,
                "measured_at": record.measured_at.to_rfc3339(),
                "notes": record.notes,
                "status": record.status.as_str(),
            })
        );
    } else {
        println!(
            "Measurement committed: record #{} for subject {}",
            record.id, record.subject_id
        );
        println!(
            "  weight {:.2} kg, height {:.1} cm, status {}",
            record.weight_kg, record.height_cm, record.status
        );
        if let Some(notes) = &record.notes {
            println!("  notes: {notes}");
        }
    }
    Ok(())
}

pub fn run_stats(cli: &Cli, config: &timbang_config::Config) -> eyre::Result<()> {
    let store = open_store(cli, config)?;
    let service = service_for(&store, load_reference(cli, config)?);
    let stats = service.statistics()?;

    if cli.json {
        println!(
            "{}",
            json!({
                "active_subjects": stats.active_subjects,
                "active_operators": stats.active_operators,
                "measurements_today": stats.measurements_today,
                "measurements_this_month": stats.measurements_this_month,
            })
        );
    } else {
        println!("Active subjects:          {}", stats.active_subjects);
        println!("Active operators:         {}", stats.active_operators);
        println!("Measurements today:       {}", stats.measurements_today);
        println!("Measurements this month:  {}", stats.measurements_this_month);
    }
    Ok(())
}

/// Seed a demo roster into an empty store: one operator and the sample
/// subjects used at the pilot post.
pub fn run_init(cli: &Cli, config: &timbang_config::Config) -> eyre::Result<()> {
    let store = open_store(cli, config)?;
    if store.subject_count()? > 0 {
        println!("Roster already initialized; nothing to do.");
        return Ok(());
    }

    let operator = store.add_operator("Admin Posyandu")?;

    let today = chrono::Utc::now().date_naive();
    let samples: [(&str, u32); 5] = [
        ("Andi Pratama", 12),
        ("Siti Nurhaliza", 10),
        ("Muhammad Rizki", 14),
        ("Fatimah Zahra", 8),
        ("Ahmad Faiz", 15),
    ];
    for (name, age_months) in samples {
        let birth = today - Months::new(age_months);
        let subject = store.add_subject(name, birth)?;
        println!("  subject #{} {} (born {})", subject.id, subject.name, subject.birth_date);
    }
    println!("Seeded operator #{} and {} subjects.", operator.id, samples.len());
    Ok(())
}

pub fn run_self_check(cli: &Cli, config: &timbang_config::Config) -> eyre::Result<()> {
    config.validate()?;
    let _ = load_reference(cli, config)?;
    let store = open_store(cli, config)?;
    let _ = store.subject_count()?;

    let mut sensor = build_sensor();
    let sample = sensor
        .sample(std::time::Duration::from_millis(
            config.device.sample_timeout_ms,
        ))
        .map_err(|e| eyre::eyre!("sensor self-check failed: {e}"))?;
    tracing::debug!(
        weight_kg = sample.weight_kg,
        height_cm = sample.height_cm,
        "self-check sample"
    );
    println!("self-check ok");
    Ok(())
}
