pub mod clock;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::client::Client;
use crate::error::{Error, ErrorType};
use crate::store::lease;

use self::clock::Clock;

/// Continuously expires leases whose expiry time has passed.
///
/// Each scan looks one poll period ahead and sleeps up to each lease's
/// expiry, so expiry lands close to the stated time even with a low polling
/// frequency. Expiry never happens before the stated time, but it can lag
/// it: a lease whose expiry moves inside the current poll window is only
/// picked up by the next scan.
pub struct LeaseExpirer {
    client: Client,
    /// How far ahead each scan looks, and how long the loop backs off after
    /// an unexpected error.
    poll_period: Duration,
    /// Shutdown listener
    shutdown_rx: Arc<RwLock<tokio::sync::mpsc::Receiver<()>>>,
    /// Shutdown transmitter
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
    /// Provides time information. Gives us deterministic time in tests.
    clock: Arc<dyn Clock>,
}

impl LeaseExpirer {
    pub fn new(client: Client, poll_period: Duration, clock: impl Clock) -> Self {
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        Self {
            client,
            poll_period,
            shutdown_rx: Arc::new(RwLock::new(rx)),
            shutdown_tx: tx,
            clock: Arc::new(clock),
        }
    }

    /// Run the expiry loop until [`stop`](Self::stop) is called.
    #[tracing::instrument(skip(self), name = "start_lease_expirer")]
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_rx.write().await;

        loop {
            let cutoff = self.clock.now() + self.poll_chrono();

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                res = self.expire_once(cutoff) => match res {
                    Ok(()) => {
                        // All done until the next poll window opens.
                        self.sleep_until(cutoff).await;
                    }
                    Err(err) if matches!(err.variant, ErrorType::UpdateRace) => {
                        // A racing writer touched one of the keys; rescan now.
                    }
                    Err(error) => {
                        error!(?error, "failed to expire leases");
                        self.clock.sleep(self.poll_period).await;
                    }
                },
            }
        }

        info!("Lease expirer shutting down");
    }

    /// Signal the loop to stop.
    #[tracing::instrument(skip(self), name = "stop_lease_expirer")]
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Expire every lease due at or before the cutoff, soonest first. The
    /// cutoff may be in the future, in which case this blocks until each
    /// lease's expiry time.
    async fn expire_once(&self, cutoff: DateTime<Utc>) -> Result<(), Error> {
        let leases = lease::list_to_expire(self.client.pool(), cutoff).await?;

        for l in leases {
            if let Some(at) = l.expires_at {
                self.sleep_until(at).await;
            }

            debug!(lease_id = l.id, "expiring lease");
            match self.client.expire_lease(l.id).await {
                // Another actor expired it first.
                Err(err) if matches!(err.variant, ErrorType::LeaseNotFound(_)) => {}
                other => other?,
            }
        }

        Ok(())
    }

    async fn sleep_until(&self, at: DateTime<Utc>) {
        let now = self.clock.now();
        if let Ok(wait) = (at - now).to_std() {
            self.clock.sleep(wait).await;
        }
    }

    fn poll_chrono(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(
            i64::try_from(self.poll_period.as_millis()).unwrap_or(i64::MAX),
        )
    }
}
