// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sanity Sweeper
//!
//! Background task that checks every circle's ciphertext checksums so that
//! corruption is surfaced before the next read.
//!
//! ## Strategy
//!
//! 1. Optionally run a full sweep right after startup.
//! 2. Sweep again every `interval`; no interval means startup only.
//! 3. Each sweep runs on the blocking pool, checks one circle per
//!    transaction and looks at the cancellation token between circles.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`; a sweep in progress stops after
//! the circle it is currently checking.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{all_circle_ids, check_circles, SanityReport};
use crate::error::CwsResult;
use crate::state::EngineState;

pub struct SanitySweeper {
    state: EngineState,
    run_at_startup: bool,
    interval: Option<Duration>,
}

impl SanitySweeper {
    /// Create a sweeper configured from the engine settings.
    pub fn new(state: EngineState) -> Self {
        let run_at_startup = state.settings.sanity_startup;
        let interval = state.settings.sanity_interval;
        Self {
            state,
            run_at_startup,
            interval,
        }
    }

    /// Run until the token is cancelled, or until the startup sweep is done
    /// when no interval is configured.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            startup = self.run_at_startup,
            interval_secs = self.interval.map(|i| i.as_secs()),
            "Sanity sweeper starting"
        );

        if self.run_at_startup && !shutdown.is_cancelled() {
            self.sweep_step(&shutdown).await;
        }

        let Some(interval) = self.interval else {
            info!("Sanity sweeper has no interval, stopping");
            return;
        };

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Sanity sweeper shutting down");
                    return;
                }
            }
            self.sweep_step(&shutdown).await;
        }
    }

    async fn sweep_step(&self, shutdown: &CancellationToken) {
        // redb calls block; keep them off the runtime workers.
        let state = self.state.clone();
        let token = shutdown.clone();
        let result = tokio::task::spawn_blocking(move || sweep_all(&state, &token)).await;
        match result {
            Ok(Ok(report)) => info!(
                circles = report.circles,
                checked = report.checked,
                failed = report.failed,
                "Sanity sweep completed"
            ),
            Ok(Err(e)) => warn!(error = %e, "Sanity sweep failed"),
            Err(e) => error!(error = %e, "Sanity sweep task panicked"),
        }
    }
}

/// One full pass over all circles, on the calling thread.
fn sweep_all(state: &EngineState, shutdown: &CancellationToken) -> CwsResult<SanityReport> {
    let circle_ids = all_circle_ids(state)?;
    check_circles(state, &circle_ids, || shutdown.is_cancelled())
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Instant;

    use super::*;
    use crate::storage::{Records, SanityStatus, StoreError};
    use crate::testing::TestEngine;

    fn status(engine: &TestEngine, id: &str) -> SanityStatus {
        engine
            .state
            .db
            .read(|txn| txn.data(id))
            .unwrap()
            .unwrap()
            .sanity_status
    }

    #[tokio::test]
    async fn startup_sweep_flags_corruption_and_stops_without_interval() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let bad = engine.add_note(&alice, &circle, "bad.txt", b"x");
        engine.corrupt(&bad);

        let sweeper = SanitySweeper {
            state: engine.state.clone(),
            run_at_startup: true,
            interval: None,
        };
        sweeper.run(CancellationToken::new()).await;

        assert_eq!(status(&engine, &bad), SanityStatus::Failed);
    }

    #[tokio::test]
    async fn a_cancelled_sweeper_checks_nothing() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let bad = engine.add_note(&alice, &circle, "bad.txt", b"x");
        engine.corrupt(&bad);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let sweeper = SanitySweeper {
            state: engine.state.clone(),
            run_at_startup: true,
            interval: Some(Duration::from_secs(3600)),
        };
        sweeper.run(shutdown).await;

        assert_eq!(status(&engine, &bad), SanityStatus::Ok);
    }

    #[tokio::test]
    async fn periodic_sweeps_run_until_cancelled() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        let bad = engine.add_note(&alice, &circle, "bad.txt", b"x");

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            SanitySweeper {
                state: engine.state.clone(),
                run_at_startup: false,
                interval: Some(Duration::from_millis(20)),
            }
            .run(shutdown.clone()),
        );

        engine.corrupt(&bad);
        let mut flagged = false;
        for _ in 0..100 {
            if status(&engine, &bad) == SanityStatus::Failed {
                flagged = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        shutdown.cancel();
        handle.await.unwrap();
        assert!(flagged);
    }

    #[tokio::test]
    async fn a_sweep_waiting_on_the_store_leaves_the_runtime_free() {
        let engine = TestEngine::new().await;
        let alice = engine.member("alice");
        let circle = engine.circle("Alpha", &alice);
        engine.add_note(&alice, &circle, "note.txt", b"x");

        let (held_tx, held_rx) = mpsc::channel();
        let db = engine.state.db.clone();
        let writer = std::thread::spawn(move || {
            db.write(|_| {
                held_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(500));
                Ok::<_, StoreError>(())
            })
            .unwrap();
        });
        held_rx.recv().unwrap();

        let started = Instant::now();
        let sweep = tokio::spawn(
            SanitySweeper {
                state: engine.state.clone(),
                run_at_startup: true,
                interval: None,
            }
            .run(CancellationToken::new()),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(400));

        sweep.await.unwrap();
        writer.join().unwrap();
    }
}
