//! Bounded retries and detached delayed tasks.
//!
//! [`spawn_delayed`] is fire-and-forget by contract: the caller gets no
//! handle, the task waits out its delay, runs under a [`RetryPolicy`] and
//! only logs a final failure.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Fixed back-off retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy with `retries` extra attempts after the first.
    #[must_use]
    pub const fn new(retries: u32, backoff: Duration) -> Self {
        Self {
            attempts: retries.saturating_add(1),
            backoff,
        }
    }

    /// Runs `op` until it succeeds or the attempts are used up, sleeping
    /// `backoff` between attempts.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(op, |_| true).await
    }

    /// Like [`RetryPolicy::run`], but only retries errors for which
    /// `retryable` returns `true`.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once the
    /// attempts are used up.
    pub async fn run_if<T, E, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && retryable(&e) => {
                    log::debug!(
                        "attempt {attempt}/{attempts} failed: {e}; retrying in {:?}",
                        self.backoff
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Runs `op` once `delay` has elapsed, retrying under `policy`.
///
/// Must be called from within a Tokio runtime. Nothing is returned: a final
/// failure is logged under `label` and dropped.
pub fn spawn_delayed<T, E, F, Fut>(label: impl Into<String>, delay: Duration, policy: RetryPolicy, op: F)
where
    T: Send + 'static,
    E: Display + Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let label = label.into();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match policy.run(op).await {
            Ok(_) => log::debug!("{label}: done"),
            Err(e) => log::warn!("{label}: giving up after {} attempts: {e}", policy.attempts),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::oneshot;

    fn quick(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::from_millis(1))
    }

    #[test]
    fn default_is_one_try_plus_two_retries() {
        assert_eq!(RetryPolicy::default().attempts, 3);
        assert_eq!(RetryPolicy::new(2, Duration::from_secs(1)), RetryPolicy::default());
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = &AtomicU32::new(0);
        let result: Result<u32, String> = quick(2)
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = &AtomicU32::new(0);
        let result: Result<u32, String> = quick(2)
            .run(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(format!("fail {n}")) } else { Ok(n) }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_with_last_error() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), String> = quick(2)
            .run(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(format!("fail {n}"))
            })
            .await;
        assert_eq!(result.unwrap_err(), "fail 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), String> = quick(5)
            .run_if(
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                },
                |e| e != "fatal",
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            attempts: 0,
            backoff: Duration::ZERO,
        };
        let calls = &AtomicU32::new(0);
        let _: Result<(), String> = policy
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("x".into())
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delayed_task_runs_after_delay() {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
        let started = tokio::time::Instant::now();

        spawn_delayed("test", Duration::from_millis(30), quick(0), move || {
            let tx = Arc::clone(&tx);
            async move {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(tokio::time::Instant::now());
                }
                Ok::<_, String>(())
            }
        });

        let fired = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
        assert!(fired.duration_since(started) >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn delayed_task_failures_are_swallowed() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        spawn_delayed("failing", Duration::from_millis(1), quick(2), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("remote refused")
            }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
