pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::core::{config::Settings, state::AppState, telemetry, time::system_epoch_clock};
use crate::services::exam_source::PgExamSource;
use crate::services::result_store::{PgResultStore, RetryPolicy};
use crate::services::session_controller::SessionEnv;
use crate::tasks::scheduler::{self, SweepSchedule};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let session_env = SessionEnv {
        store: Arc::new(PgResultStore::new(db_pool.clone())),
        retry: RetryPolicy::from_settings(&settings),
        epoch: system_epoch_clock(),
    };
    let exam_source = Arc::new(PgExamSource::new(db_pool.clone()));
    let state = AppState::new(settings, exam_source, session_env, Some(db_pool));

    let sessions = state.settings().session();
    let schedule = SweepSchedule {
        period: Duration::from_secs(sessions.sweep_interval_seconds),
        retention: Duration::from_secs(sessions.terminated_session_retention_seconds),
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = scheduler::spawn_sweeper(state.sessions().clone(), schedule, shutdown_rx);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        max_sessions = sessions.max_concurrent_sessions,
        "CBT exam engine listening"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(core::shutdown::shutdown_signal(shutdown_tx))
        .await;

    if let Err(err) = sweeper.await {
        tracing::error!(error = %err, "Session sweeper task failed");
    }
    state.sessions().drain(Duration::from_secs(sessions.shutdown_drain_seconds)).await;

    result?;

    Ok(())
}

/// Re-grades stored results of one exam against its current answer key and
/// prints what changed. Writes only with `apply`.
pub async fn run_rescore(exam_id: &str, apply: bool) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_cli_tracing(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    let report = tasks::rescore::run(&db_pool, exam_id, apply).await?;

    for change in &report.changes {
        println!(
            "{}\t{}\t{} -> {} correct\t{}% -> {}%",
            change.session_id,
            change.candidate_identity,
            change.old_correct,
            change.new_correct,
            change.old_percent,
            change.new_percent,
        );
    }
    for (session_id, reason) in &report.skipped {
        println!("{session_id}\tskipped: {reason}");
    }
    println!(
        "examined {} results, {} changed, {} skipped{}",
        report.examined,
        report.changes.len(),
        report.skipped.len(),
        if report.applied { ", changes written" } else { " (dry run, pass --apply to write)" },
    );

    Ok(())
}
