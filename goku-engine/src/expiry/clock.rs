use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Future;

/// Provides time information. Gives us deterministic time in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration)
        -> Pin<Box<dyn Future<Output = ()> + Send + Sync + 'static>>;
}

#[derive(Debug, Default)]
pub struct SystemClock {}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(
        &self,
        duration: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + Sync + 'static>> {
        Box::pin(tokio::time::sleep(duration))
    }
}
