//! Status polling against the management bus.
//!
//! Two protocols share one shape, a fixed-interval query loop:
//! - descriptor lookup retries until the machine is registered or a
//!   deadline passes;
//! - pull progress follows a transfer until it leaves the active list.
//!
//! Both loops run inside the caller's future. Timers are raced with
//! `tokio::select!`, so the losing timer is dropped with the call and no
//! background task outlives it.

use std::future::Future;
use std::time::Duration;

use nspawn_common::constants::{DESCRIBE_POLL_INTERVAL, TRANSFER_POLL_INTERVAL};
use nspawn_common::error::{NspawnError, Result};
use tokio::time::{Instant, MissedTickBehavior};

use crate::bus::{MachineBus, PullRequest};
use crate::descriptor::MachineDescriptor;

/// Receives pull progress updates.
pub trait ProgressReporter: Send + Sync {
    /// Called with a meaningful progress fraction for `image`.
    fn report(&self, image: &str, progress: f64);
}

/// Reports pull progress as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, image: &str, progress: f64) {
        tracing::info!(image, progress, "downloading image");
    }
}

/// Queries `query` every `interval` until it succeeds or `timeout` passes.
///
/// The first query runs one interval after the call and always completes,
/// so a timeout carries the outcome of at least one query. Later queries
/// are raced against the deadline and abandoned when it passes.
///
/// # Errors
///
/// Returns [`NspawnError::Timeout`] wrapping the last query error.
pub async fn poll_with_deadline<T, F, Fut>(
    what: &str,
    interval: Duration,
    timeout: Duration,
    mut query: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last: Option<NspawnError> = None;
    let mut attempts: u32 = 0;
    loop {
        if attempts == 0 {
            let _ = ticker.tick().await;
        } else {
            tokio::select! {
                biased;
                () = tokio::time::sleep_until(deadline) => {
                    return Err(timed_out(what, last));
                }
                _ = ticker.tick() => {}
            }
        }

        attempts += 1;
        let outcome = if attempts == 1 {
            query().await
        } else {
            tokio::select! {
                biased;
                () = tokio::time::sleep_until(deadline) => {
                    return Err(timed_out(what, last));
                }
                res = query() => res,
            }
        };
        match outcome {
            Ok(value) => {
                tracing::debug!(what, attempts, "poll succeeded");
                return Ok(value);
            }
            Err(e) => {
                tracing::trace!(what, attempts, error = %e, "poll attempt failed");
                last = Some(e);
            }
        }
        if Instant::now() >= deadline {
            return Err(timed_out(what, last));
        }
    }
}

fn timed_out(what: &str, last: Option<NspawnError>) -> NspawnError {
    tracing::warn!(what, "poll deadline exceeded");
    NspawnError::Timeout {
        what: what.to_string(),
        last: last.map(Box::new),
    }
}

/// Waits for a machine to register and returns its descriptor.
///
/// # Errors
///
/// Returns [`NspawnError::Timeout`] if the machine never becomes
/// describable within `timeout`, or [`NspawnError::Decode`] if the bus
/// answers with a malformed property set.
pub async fn describe_machine(
    bus: &dyn MachineBus,
    name: &str,
    timeout: Duration,
) -> Result<MachineDescriptor> {
    let what = format!("getting properties of machine {name}");
    let bag = poll_with_deadline(&what, DESCRIBE_POLL_INTERVAL, timeout, || {
        bus.describe_container(name)
    })
    .await?;
    MachineDescriptor::decode(&bag)
}

/// Returns true unless `progress` is one of the "not yet known" sentinels
/// (NaN, an infinity, or the largest finite magnitude).
#[must_use]
#[allow(clippy::float_cmp)]
pub fn is_meaningful_progress(progress: f64) -> bool {
    !(progress.is_nan() || progress.is_infinite() || progress.abs() == f64::MAX)
}

/// Follows a transfer until it disappears from the active list.
///
/// Finished and failed transfers look the same here. A failing list query
/// is logged and ends the watch; it never fails the caller. Returns the
/// number of list queries issued.
pub async fn watch_transfer(
    bus: &dyn MachineBus,
    transfer_id: u32,
    image: &str,
    reporter: &dyn ProgressReporter,
) -> u32 {
    let mut ticker = tokio::time::interval_at(
        Instant::now() + TRANSFER_POLL_INTERVAL,
        TRANSFER_POLL_INTERVAL,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks = 0;
    loop {
        let _ = ticker.tick().await;
        ticks += 1;

        let transfers = match bus.list_transfers().await {
            Ok(transfers) => transfers,
            Err(e) => {
                tracing::warn!(image, transfer_id, error = %e, "listing transfers failed");
                return ticks;
            }
        };
        let Some(current) = transfers.iter().find(|t| t.id == transfer_id) else {
            tracing::debug!(image, transfer_id, ticks, "transfer no longer active");
            return ticks;
        };
        if is_meaningful_progress(current.progress) {
            reporter.report(image, current.progress);
        }
    }
}

/// Pulls an image and blocks until the import service finishes with it.
///
/// # Errors
///
/// Returns the bus error if the pull cannot be started. Progress polling
/// never fails.
pub async fn download_image(
    bus: &dyn MachineBus,
    request: &PullRequest,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let handle = bus.pull_image(request).await?;
    tracing::info!(
        image = %request.name,
        url = %request.url,
        kind = %request.kind,
        verify = %request.verify,
        transfer_id = handle.id,
        "downloading image"
    );
    let _ = watch_transfer(bus, handle.id, &request.name, reporter).await;
    tracing::info!(image = %request.name, "downloaded image");
    Ok(())
}
