// SPDX-FileCopyrightText: Alice Frosi <afrosi@redhat.com>
//
// SPDX-License-Identifier: MIT

use log::debug;
use std::fmt::{self, Debug, Display};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};

/// Deadlines further out than this are clamped to it.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Re-runs an async check until it succeeds or the timeout expires.
///
/// An attempt still in flight at `timeout + interval` is abandoned, so a
/// poll always returns within that bound even if the check itself hangs.
#[derive(Debug, Clone)]
pub struct Poller {
    timeout: Duration,
    interval: Duration,
    error_message: String,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(5),
            error_message: "condition was not met".to_string(),
        }
    }
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn poll_async<F, Fut, T, E>(&self, mut check: F) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let start = Instant::now();
        let deadline = start + self.timeout.min(FAR_FUTURE);
        let hard_deadline = deadline + self.interval.min(FAR_FUTURE);
        let mut attempts = 0;
        let mut last = None;

        loop {
            attempts += 1;
            match timeout_at(hard_deadline, check()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    debug!("{} (attempt {attempts}): {e}", self.error_message);
                    last = Some(e);
                }
                Err(_) => {
                    debug!(
                        "{} (attempt {attempts}): no answer before the deadline",
                        self.error_message
                    );
                    break;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.interval.min(deadline - now)).await;
        }

        Err(PollError {
            message: self.error_message.clone(),
            attempts,
            elapsed: start.elapsed(),
            last,
        })
    }
}

pub struct PollError<E> {
    pub message: String,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Error of the last attempt that completed, if any did.
    pub last: Option<E>,
}

impl<E: Display> Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (gave up after {} attempts in {:?}",
            self.message, self.attempts, self.elapsed
        )?;
        match &self.last {
            Some(e) => write!(f, "; last error: {e})"),
            None => write!(f, ")"),
        }
    }
}

impl<E: Display> Debug for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollError")
            .field("message", &self.message)
            .field("attempts", &self.attempts)
            .field("elapsed", &self.elapsed)
            .field("last", &self.last.as_ref().map(ToString::to_string))
            .finish()
    }
}

impl<E: Display> std::error::Error for PollError<E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_check_passes() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = Poller::new()
            .with_timeout(Duration::from_secs(30))
            .with_interval(Duration::from_secs(3))
            .poll_async(|| {
                let calls = calls.clone();
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0..=2 => Err("not yet"),
                        n => Ok(n),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn never_succeeds_when_every_check_fails() {
        let start = Instant::now();
        let err = Poller::new()
            .with_timeout(Duration::from_secs(10))
            .with_interval(Duration::from_secs(3))
            .with_error_message("sub learn is not AtLatestKnown")
            .poll_async(|| async { Err::<(), _>("UpgradePending") })
            .await
            .unwrap_err();

        assert!(start.elapsed() <= Duration::from_secs(13));
        assert_eq!(err.last, Some("UpgradePending"));
        // attempts at 0, 3, 6, 9 and one final one at the deadline
        assert_eq!(err.attempts, 5);
        assert!(err.to_string().contains("sub learn is not AtLatestKnown"));
        assert!(err.to_string().contains("last error: UpgradePending"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_check_is_bounded() {
        let start = Instant::now();
        let err = Poller::new()
            .with_timeout(Duration::from_secs(10))
            .with_interval(Duration::from_secs(2))
            .poll_async(|| async {
                sleep(Duration::from_secs(3600)).await;
                Ok::<(), &str>(())
            })
            .await
            .unwrap_err();

        assert!(start.elapsed() <= Duration::from_secs(12));
        assert_eq!(err.attempts, 1);
        assert!(err.last.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_still_polls() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = Poller::new()
            .with_timeout(Duration::from_secs(u64::MAX))
            .with_interval(Duration::from_secs(1))
            .poll_async(|| {
                let calls = calls.clone();
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 => Err("not yet"),
                        n => Ok(n),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 1);

        let immediate = Poller::new()
            .with_timeout(Duration::MAX)
            .with_interval(Duration::MAX)
            .poll_async(|| async { Ok::<_, &str>("READY") })
            .await
            .unwrap();
        assert_eq!(immediate, "READY");
    }
}
