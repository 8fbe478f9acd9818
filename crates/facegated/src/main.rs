use anyhow::{Context, Result};
use facegate_core::{CommandAnalyzer, MeanDistanceMatcher, PairVerifier};
use facegate_store::{Database, StoreLayout};
use tracing_subscriber::EnvFilter;

mod admin;
mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{GateService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let cfg = Config::load()?;
    tracing::info!(
        data_dir = %cfg.data_dir.display(),
        metric = %cfg.recognition.metric,
        threshold = cfg.recognition.threshold,
        "configuration loaded"
    );

    let database = Database::open(&StoreLayout::new(&cfg.data_dir), cfg.registration)
        .context("opening face database")?;
    let engine = engine::Engine::new(
        database,
        Box::new(CommandAnalyzer::new(cfg.analyzer.clone())),
        MeanDistanceMatcher::new(cfg.recognition.metric, cfg.recognition.threshold),
        PairVerifier::new(cfg.recognition.metric, cfg.recognition.verification_threshold),
        cfg.suspicion.clone(),
    );
    let handle = engine::spawn_engine(engine)?;

    let timeout = chrono::Duration::minutes(cfg.admin.session_timeout_minutes as i64);
    let admin = admin::AdminGate::new(&cfg.admin.default_pin, cfg.admin.bcrypt_cost, timeout)
        .context("hashing default admin PIN")?;

    let bus = cfg.bus;
    let builder = match bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, GateService::new(handle, admin, cfg))?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(bus = ?bus, name = BUS_NAME, "facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
