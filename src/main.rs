// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Engine daemon: opens the store, unlocks the master key, bootstraps the
//! administrator and runs the sanity sweeper until interrupted.

use std::process::ExitCode;

use circle_vault::config::{Settings, ADMIN_CREDENTIAL_ENV, LOG_FORMAT_ENV};
use circle_vault::error::{CwsError, CwsResult};
use circle_vault::keys::MasterKeyService;
use circle_vault::sanity::SanitySweeper;
use circle_vault::state::EngineState;
use circle_vault::trust::MemberService;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}

async fn run() -> CwsResult<()> {
    let settings = Settings::from_env()?;
    let admin_credential = std::env::var(ADMIN_CREDENTIAL_ENV).map_err(|_| {
        CwsError::setting(format!("{ADMIN_CREDENTIAL_ENV} must be set"))
    })?;

    info!(data_dir = %settings.data_dir.display(), "Opening store");
    std::fs::create_dir_all(&settings.data_dir)
        .map_err(|e| CwsError::internal("creating data directory", e))?;
    let state = EngineState::open(settings)?;

    let master = MasterKeyService::new(&state);
    let outcome = master.unlock(&master.default_source()).await?;
    info!(outcome = outcome.message(), "Master key ready");

    let admin = MemberService::new(&state).bootstrap(&admin_credential)?;
    info!(account = %admin.account_name(), "Administrator authenticated");

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(SanitySweeper::new(state.clone()).run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CwsError::internal("waiting for shutdown signal", e))?;
    info!("Shutdown requested");
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!(error = %e, "Sanity sweeper task failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = %e.kind(), error = %e, "circle-vault stopped");
            ExitCode::FAILURE
        }
    }
}
