#![forbid(unsafe_code)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod client;
mod config;
mod error;
mod expiry;
mod notify;
mod store;
mod stream;

use std::sync::Arc;

pub use client::Client;
pub use config::Config;
pub use error::{Error, ErrorType};
pub use expiry::{clock, LeaseExpirer};
pub use notify::EventNotifier;
pub use stream::{EventStream, GapFiller, StreamOptions, Streamer};

use expiry::clock::SystemClock;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "migrations/"]
pub(crate) struct Migrations;

/// A running goku core: the store, a client over it, and the background
/// loops (lease expiry and event gap filling).
pub struct Goku {
    client: Client,
    expirer: Arc<LeaseExpirer>,
    gap_filler: Arc<GapFiller>,
    tasks: parking_lot::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Goku {
    /// Open the store, run migrations and wire up the core.
    ///
    /// The background loops are not started; call
    /// [`spawn_background`](Self::spawn_background) once per process.
    pub async fn open(config: Config) -> Result<Self, Error> {
        config
            .sanitize()
            .map_err(|err| ErrorType::BadData(err.to_string()))?;

        let pool = goku_storage::open(&config.storage_path).await?;
        goku_storage::migrator::migrate_embedded::<Migrations>(&pool).await?;

        let notifier = Arc::new(EventNotifier::default());
        let client = Client::new(pool.clone(), Arc::clone(&notifier));
        let expirer = Arc::new(LeaseExpirer::new(
            client.clone(),
            config.expiry_poll_period,
            SystemClock::new(),
        ));
        let gap_filler = Arc::new(GapFiller::new(
            pool,
            config.gap_grace_period,
            config.gap_sweep_period,
        ));

        Ok(Self {
            client,
            expirer,
            gap_filler,
            tasks: parking_lot::Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Stream factory for events on keys with the given prefix.
    #[must_use]
    pub fn streamer(&self, prefix: &str) -> Streamer {
        self.client.stream(prefix)
    }

    /// Start the lease-expiry loop and the event gap filler.
    pub fn spawn_background(&self) {
        let expirer = Arc::clone(&self.expirer);
        let gap_filler = Arc::clone(&self.gap_filler);

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(async move { expirer.run().await }));
        tasks.push(tokio::spawn(async move { gap_filler.run().await }));
    }

    /// Stop the background loops.
    pub async fn shutdown(&self) {
        self.expirer.stop().await;
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
