use std::{future::Future, time::Duration};

use abi::{ReservationStatus, SweeperConfig};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{BookingStore, Boundary};

/// Advances reservations along `Confirmed -> Active -> Completed` as their
/// check-in and check-out times pass.
#[derive(Debug, Clone)]
pub struct StatusSweeper<S> {
    store: S,
    interval: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub activated: usize,
    pub completed: usize,
    pub failed: usize,
}

impl<S: BookingStore> StatusSweeper<S> {
    pub fn new(store: S, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub fn from_config(store: S, config: &SweeperConfig) -> Self {
        Self::new(store, Duration::from_secs(config.interval_secs.max(1)))
    }

    /// One pass. Activation runs first, so a reservation whose whole stay is
    /// in the past goes all the way to `Completed`. Rows are updated one by
    /// one; a failing row is counted and skipped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        report.activated = self
            .advance(
                ReservationStatus::Confirmed,
                ReservationStatus::Active,
                Boundary::CheckIn,
                now,
                &mut report.failed,
            )
            .await;
        report.completed = self
            .advance(
                ReservationStatus::Active,
                ReservationStatus::Completed,
                Boundary::CheckOut,
                now,
                &mut report.failed,
            )
            .await;
        report
    }

    async fn advance(
        &self,
        from: ReservationStatus,
        to: ReservationStatus,
        boundary: Boundary,
        now: DateTime<Utc>,
        failed: &mut usize,
    ) -> usize {
        let ids = match self.store.due_reservations(from, boundary, now).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, %from, "failed to list due reservations");
                return 0;
            }
        };

        let mut advanced = 0;
        for id in ids {
            match self.store.update_status(id, &[from], to).await {
                Ok(Some(_)) => advanced += 1,
                // cancelled since it was listed
                Ok(None) => debug!(reservation_id = id, "reservation left {} concurrently", from),
                Err(e) => {
                    warn!(reservation_id = id, error = %e, "failed to move reservation to {}", to);
                    *failed += 1;
                }
            }
        }
        advanced
    }

    /// Sweep on every tick until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("status sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.sweep(Utc::now()).await;
                    info!(
                        activated = report.activated,
                        completed = report.completed,
                        failed = report.failed,
                        "status sweep finished"
                    );
                }
            }
        }
    }
}
