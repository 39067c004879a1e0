use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use goku_types::{Event, EventType};
use sqlx::SqlitePool;
use tracing::{debug, error};

use crate::error::{Error, ErrorType};
use crate::notify::EventNotifier;
use crate::store::events;

/// How many events to pull from the log per query.
const BATCH_SIZE: i64 = 100;

/// How long to wait before re-reading when the next id is missing.
const GAP_REREAD_DELAY: Duration = Duration::from_millis(200);

/// Upper bound on waiting for a notify signal before re-querying anyway.
const POLL_BACKSTOP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamOptions {
    /// End the stream with `HeadReached` once every event present at stream
    /// start has been consumed, instead of blocking for new ones.
    pub to_head: bool,
}

/// Factory for event streams over keys with a fixed prefix.
pub struct Streamer {
    pool: SqlitePool,
    notifier: Arc<EventNotifier>,
    prefix: String,
}

impl Streamer {
    pub(crate) fn new(pool: SqlitePool, notifier: Arc<EventNotifier>, prefix: &str) -> Self {
        Self {
            pool,
            notifier,
            prefix: prefix.to_string(),
        }
    }

    /// Open a stream of events with ids after the given cursor.
    pub async fn stream(&self, after: i64, opts: StreamOptions) -> Result<EventStream, Error> {
        let head = if opts.to_head {
            events::head(&self.pool).await?
        } else {
            0
        };

        Ok(EventStream {
            pool: self.pool.clone(),
            notifier: Arc::clone(&self.notifier),
            prefix: self.prefix.clone(),
            cursor: after,
            head,
            to_head: opts.to_head,
            buf: VecDeque::new(),
        })
    }
}

/// An ordered stream of committed events.
///
/// Events are delivered strictly in id order. The stream never advances past
/// a missing id: it waits for the id to commit or for the gap filler to
/// declare it dead.
pub struct EventStream {
    pool: SqlitePool,
    notifier: Arc<EventNotifier>,
    prefix: String,
    cursor: i64,
    head: i64,
    to_head: bool,
    buf: VecDeque<Event>,
}

impl EventStream {
    /// Restart the stream from a different cursor.
    pub fn seek(&mut self, cursor: i64) {
        self.cursor = cursor;
        self.buf.clear();
    }

    /// Next event whose key starts with the stream prefix.
    ///
    /// Blocks until an event is available, unless the stream was opened
    /// to-head in which case it ends with [`ErrorType::HeadReached`].
    pub async fn recv(&mut self) -> Result<Event, Error> {
        loop {
            while let Some(event) = self.buf.pop_front() {
                // Events committed after stream start are out of bounds.
                if self.to_head && event.id > self.head {
                    return Err(ErrorType::HeadReached.into());
                }
                self.cursor = event.id;
                // Gap-filled entries only advance the cursor.
                if event.kind == EventType::Noop {
                    continue;
                }
                if !event.key.starts_with(&self.prefix) {
                    continue;
                }
                return Ok(event);
            }

            if self.to_head && self.cursor >= self.head {
                return Err(ErrorType::HeadReached.into());
            }

            // Subscribe before reading so a commit landing between the read
            // and the wait still wakes us.
            let mut wakeup = self.notifier.subscribe();
            let batch = events::list_after(&self.pool, self.cursor, BATCH_SIZE).await?;
            match batch.first().map(|event| event.id) {
                Some(first_id) if first_id == self.cursor + 1 => {
                    // Only the contiguous run is trusted; an id beyond a gap
                    // may still see smaller ids commit before it.
                    let mut expected = self.cursor + 1;
                    for event in batch {
                        if event.id != expected {
                            break;
                        }
                        expected += 1;
                        self.buf.push_back(event);
                    }
                }
                Some(first_id) => {
                    // The next id is missing. Give its writer a moment to
                    // commit and re-read; the gap filler unblocks us if the
                    // id never materialises.
                    debug!(cursor = self.cursor, next = first_id, "gap in event log");
                    tokio::time::sleep(GAP_REREAD_DELAY).await;
                }
                None => {
                    tokio::select! {
                        _ = wakeup.recv() => {}
                        _ = tokio::time::sleep(POLL_BACKSTOP) => {}
                    }
                }
            }
        }
    }
}

/// Background sweep that declares permanently missing event ids.
///
/// An id stays missing when its transaction aborted after the id was
/// allocated. Streams refuse to advance past a missing id, so once an id has
/// been missing for the grace window the filler records a noop event in its
/// place.
pub struct GapFiller {
    pool: SqlitePool,
    grace: Duration,
    sweep_period: Duration,
}

impl GapFiller {
    #[must_use]
    pub fn new(pool: SqlitePool, grace: Duration, sweep_period: Duration) -> Self {
        Self {
            pool,
            grace,
            sweep_period,
        }
    }

    /// Sweep the log forever.
    pub async fn run(&self) {
        let mut watermark = 0;
        let mut pending: HashMap<i64, Instant> = HashMap::new();
        loop {
            tokio::time::sleep(self.sweep_period).await;
            if let Err(error) = self.sweep(&mut watermark, &mut pending).await {
                error!(?error, "event gap sweep failed");
            }
        }
    }

    /// One sweep: walk ids above the watermark, fill ids that stayed missing
    /// beyond the grace window, then advance the watermark over the
    /// contiguous prefix.
    async fn sweep(
        &self,
        watermark: &mut i64,
        pending: &mut HashMap<i64, Instant>,
    ) -> Result<(), Error> {
        let ids = events::ids_after(&self.pool, *watermark).await?;

        let mut expected = *watermark + 1;
        for id in ids {
            while expected < id {
                let first_seen = *pending.entry(expected).or_insert_with(Instant::now);
                if first_seen.elapsed() >= self.grace {
                    self.fill(expected).await?;
                    pending.remove(&expected);
                }
                expected += 1;
            }
            // The id committed after all.
            pending.remove(&id);
            expected = id + 1;
        }

        let max_contiguous = expected - 1;
        *watermark = pending.keys().min().map_or(max_contiguous, |id| id - 1);
        Ok(())
    }

    async fn fill(&self, id: i64) -> Result<(), Error> {
        debug!(id, "filling event log gap");
        match events::insert_noop(&self.pool, id, Utc::now()).await {
            // The original writer won the race after all.
            Err(err) if matches!(err.variant, ErrorType::UniqueConstraintViolation { .. }) => {
                Ok(())
            }
            other => other,
        }
    }
}
