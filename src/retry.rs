//! Exponential backoff for calls to the translation service.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Total tries including the first; 0 behaves like 1
    pub attempts: u32,
    /// Wait before the second try
    pub base: Duration,
    /// Upper bound for any single wait
    pub cap: Duration,
    pub factor: f64,
}

impl Backoff {
    /// Create a schedule that doubles `base` on each retry, capped at 30s.
    ///
    /// # Arguments
    /// * `attempts` - Total tries including the first
    /// * `base` - Wait before the second try
    pub fn new(attempts: u32, base: Duration) -> Self {
        Self {
            attempts,
            base,
            cap: Duration::from_secs(30),
            factor: 2.0,
        }
    }

    /// Set the upper bound for any single wait.
    pub fn capped_at(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    /// Set the growth factor between consecutive waits.
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Three tries, waiting 1s then 2s.
    pub fn translation() -> Self {
        Self::new(3, Duration::from_secs(1)).capped_at(Duration::from_secs(5))
    }

    /// Waits between consecutive tries, one per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts.max(1) - 1).map(move |retry| {
            let millis = self.base.as_millis() as f64 * self.factor.powi(retry as i32);
            Duration::from_millis(millis as u64).min(self.cap)
        })
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::translation()
    }
}

/// Run `operation` until it succeeds, fails with an error `is_transient`
/// rejects, or the tries run out. The last error is returned.
pub async fn retry_transient<T, E, F, Fut, P>(
    backoff: &Backoff,
    label: &str,
    mut operation: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut delays = backoff.delays();
    let mut tries = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if tries > 1 {
                    debug!("{}: succeeded after {} tries", label, tries);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_transient(&err) {
            debug!("{}: permanent failure: {}", label, err);
            return Err(err);
        }
        let Some(delay) = delays.next() else {
            warn!("{}: giving up after {} tries: {}", label, tries, err);
            return Err(err);
        };

        warn!("{}: try {} failed ({}), retrying in {:?}", label, tries, err, delay);
        sleep(delay).await;
        tries += 1;
    }
}
