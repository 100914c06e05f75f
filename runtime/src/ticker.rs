//! Periodic tick loop.
//!
//! One loop per machine type. Each period the loop reads the clock once and
//! hands that instant to the [`Tickable`], which sweeps its tenants. Within a
//! tenant entities are processed sequentially; tenants run concurrently via
//! [`for_each_tenant`].
//!
//! ```text
//!   interval ──► clock.now() ──► tickable.tick(now)
//!      ▲                              │
//!      └──────── until shutdown ◄─────┘
//! ```

use futures::future::join_all;
use realm_core::environment::Clock;
use realm_core::{DateTime, Tenant, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Boxed future returned by [`Tickable::tick`].
pub type TickFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Something advanced by elapsed time.
///
/// Implementations log their own failures; a failing entity must not stop
/// the sweep of the others.
pub trait Tickable: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Advance every live entity to `now`.
    fn tick(&self, now: DateTime<Utc>) -> TickFuture<'_>;
}

/// Drives a [`Tickable`] at a fixed period.
#[derive(Clone)]
pub struct Ticker {
    period: Duration,
    clock: Arc<dyn Clock>,
}

impl Ticker {
    /// Create a ticker with the given period and clock.
    #[must_use]
    pub fn new(period: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { period, clock }
    }

    /// Tick period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Run one sweep now.
    pub async fn tick_once(&self, tickable: &dyn Tickable) {
        let started = Instant::now();
        tickable.tick(self.clock.now()).await;
        crate::metrics::record_tick(tickable.name(), started.elapsed());
    }

    /// Tick until `shutdown` flips to `true`.
    pub async fn run(self, tickable: Arc<dyn Tickable>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            ticker = tickable.name(),
            period_ms = u64::try_from(self.period.as_millis()).unwrap_or(u64::MAX),
            "Ticker started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => self.tick_once(tickable.as_ref()).await,
                result = shutdown.changed() => {
                    if result.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(ticker = tickable.name(), "Ticker stopped");
    }

    /// Spawn [`run`](Self::run) on the runtime.
    #[must_use]
    pub fn spawn(self, tickable: Arc<dyn Tickable>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(tickable, shutdown))
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker").field("period", &self.period).finish_non_exhaustive()
    }
}

/// Run `sweep` for every tenant concurrently and wait for all of them.
pub async fn for_each_tenant<F, Fut>(tenants: Vec<Tenant>, sweep: F)
where
    F: Fn(Tenant) -> Fut,
    Fut: Future<Output = ()>,
{
    join_all(tenants.into_iter().map(sweep)).await;
}
