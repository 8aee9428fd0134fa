use std::time::{Duration, Instant};

use shared::vatsim::datafeed::{Controller, Pilot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::cache::NotifiedCache;
use crate::db::TrackerKind;
use crate::health::JobFamily;
use crate::notifier;
use crate::trackers::{self, Trackable};

/// Spawn the three polling families once the gateway is ready. Each family
/// runs on its own fixed interval and never overlaps itself.
pub fn spawn_all(state: AppState, ctx: serenity::client::Context, shutdown: CancellationToken) {
    tokio::spawn(airport_loop(state.clone(), ctx.clone(), shutdown.clone()));
    tokio::spawn(tracker_loop::<Pilot>(state.clone(), ctx.clone(), shutdown.clone()));
    tokio::spawn(tracker_loop::<Controller>(state, ctx, shutdown));
}

async fn airport_loop(state: AppState, ctx: serenity::client::Context, shutdown: CancellationToken) {
    // Rehydrate the dedup cache before the first cycle so a restart does not
    // re-announce controllers that never went offline.
    let mut cache = match NotifiedCache::rehydrate(&state.db).await {
        Ok(cache) => {
            info!(entries = cache.len(), "rehydrated notification cache");
            cache
        }
        Err(err) => {
            error!(error = ?err, "failed to rehydrate notification cache, starting empty");
            NotifiedCache::default()
        }
    };

    let mut interval = tokio::time::interval(Duration::from_secs(state.cfg.atc_interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                info!("shutdown requested, stopping airport notification loop");
                break;
            }
        }

        let started = Instant::now();
        match notifier::run_airport_cycle(&state, &ctx, &mut cache).await {
            Ok(()) => {
                state.health.mark_cycle(JobFamily::Airport);
                debug!(
                    elapsed = %humantime::format_duration(started.elapsed()),
                    "airport notification cycle complete"
                );
            }
            Err(err) => warn!(error = ?err, "airport notification cycle failed"),
        }

        if shutdown.is_cancelled() {
            info!("shutdown requested, airport loop exiting after current cycle");
            break;
        }
    }
}

async fn tracker_loop<E>(state: AppState, ctx: serenity::client::Context, shutdown: CancellationToken)
where
    E: Trackable + Send + Sync + 'static,
{
    let (family, period) = match E::KIND {
        TrackerKind::Flight => (JobFamily::Flight, state.cfg.flight_interval_secs),
        TrackerKind::Controller => (JobFamily::Controller, state.cfg.controller_interval_secs),
    };

    let mut interval = tokio::time::interval(Duration::from_secs(period));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                info!(kind = E::KIND.noun(), "shutdown requested, stopping tracker loop");
                break;
            }
        }

        let started = Instant::now();
        match trackers::run_tracker_cycle::<E>(&state, &ctx).await {
            Ok(()) => {
                state.health.mark_cycle(family);
                debug!(
                    kind = E::KIND.noun(),
                    elapsed = %humantime::format_duration(started.elapsed()),
                    "tracker cycle complete"
                );
            }
            Err(err) => warn!(error = ?err, kind = E::KIND.noun(), "tracker cycle failed"),
        }

        if shutdown.is_cancelled() {
            info!(kind = E::KIND.noun(), "shutdown requested, tracker loop exiting after current cycle");
            break;
        }
    }
}
