// File: testing-framework/src/waiters.rs
//
// Waiter primitives
//
// Node state changes asynchronously (block connection, peer handshakes,
// balance updates). Scenarios never sleep for a fixed time; they poll a
// predicate under a bounded budget instead.
//
// A predicate returns `Ok(true)` when satisfied, `Ok(false)` to keep
// polling, and `Err` to abort the wait: errors are never swallowed here.
// Helpers that poll a node which may still be starting (port probes, RPC
// readiness) turn transport errors into `Ok(false)` themselves.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

use crate::error::{HarnessError, Result};

/// Budget substituted when neither attempts nor timeout is bounded
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause between two evaluations
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Connect timeout of a single port probe
pub const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Budget of one wait
///
/// # Example
///
/// ```rust,ignore
/// let policy = WaitPolicy::with_timeout(Duration::from_secs(30))
///     .interval(Duration::from_millis(100))
///     .message("lit0 never saw the channel confirm");
/// wait_until(|| async { Ok(node.get_balance_info(257).await?.chan_total > 0) }, &policy).await?;
/// ```
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    /// Maximum predicate evaluations, unbounded when `None`
    pub attempts: Option<u32>,
    /// Sleep between evaluations
    pub interval: Duration,
    /// Wall-clock budget, unbounded when `None`
    pub timeout: Option<Duration>,
    /// Diagnostic attached to the timeout error
    pub message: Option<String>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            attempts: None,
            interval: DEFAULT_INTERVAL,
            timeout: None,
            message: None,
        }
    }
}

impl WaitPolicy {
    /// At most `attempts` evaluations
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: Some(attempts),
            ..Self::default()
        }
    }

    /// Give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// Set the pause between evaluations
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Also bound the number of evaluations
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Also bound the wall-clock time
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a diagnostic naming the awaited condition
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Time budget after substituting the default for a fully unbounded policy
    pub fn effective_timeout(&self) -> Option<Duration> {
        match (self.attempts, self.timeout) {
            (None, None) => Some(DEFAULT_TIMEOUT),
            (_, timeout) => timeout,
        }
    }
}

/// Poll `predicate` until it returns `Ok(true)` or the budget runs out
///
/// Returns immediately on success without sleeping. With `attempts = n`
/// the predicate runs at most `n` times with at most `n - 1` sleeps; there
/// is never a sleep after the last evaluation. Exhaustion yields
/// `HarnessError::WaitTimeout`; a predicate error is returned as-is.
pub async fn wait_until<F, Fut>(mut predicate: F, policy: &WaitPolicy) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let budget = policy.effective_timeout();
    let mut evaluations: u32 = 0;

    loop {
        if policy.attempts.is_some_and(|max| evaluations >= max) {
            break;
        }

        evaluations += 1;
        if predicate().await? {
            debug!(
                "Condition met after {} attempt(s) in {:?}",
                evaluations,
                start.elapsed()
            );
            return Ok(());
        }

        if policy.attempts.is_some_and(|max| evaluations >= max) {
            break;
        }
        if let Some(budget) = budget {
            if start.elapsed() + policy.interval >= budget {
                break;
            }
        }
        sleep(policy.interval).await;
    }

    Err(HarnessError::WaitTimeout {
        message: policy
            .message
            .clone()
            .unwrap_or_else(|| "wait_until() timed out".to_string()),
        attempts: evaluations,
        elapsed: start.elapsed(),
    })
}

/// Poll until a TCP listener accepts connections on `host:port`
///
/// Refused or timed-out connects count as "not yet"; only the overall
/// budget can fail the wait.
pub async fn wait_until_port_open(host: &str, port: u16, policy: &WaitPolicy) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let policy = match &policy.message {
        Some(_) => policy.clone(),
        None => policy.clone().message(format!("port {} never opened", addr)),
    };

    wait_until(
        || {
            let addr = addr.clone();
            async move {
                match timeout(PORT_PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
                    Ok(Ok(_)) => Ok(true),
                    Ok(Err(e)) => {
                        debug!("{} not accepting yet: {}", addr, e);
                        Ok(false)
                    }
                    Err(_) => Ok(false),
                }
            }
        },
        &policy,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_sleep() {
        let start = Instant::now();
        wait_until(|| async { Ok(true) }, &WaitPolicy::with_attempts(5))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_counts_evaluations_and_sleeps() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let policy = WaitPolicy::with_attempts(4).interval(Duration::from_secs(1));
        let err = wait_until(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(false) }
            },
            &policy,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // three sleeps between four evaluations, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        match err {
            HarnessError::WaitTimeout { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_never_evaluates() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = wait_until(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(true) }
            },
            &WaitPolicy::with_attempts(0),
        )
        .await;
        assert!(matches!(result, Err(HarnessError::WaitTimeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_policy_defaults_to_sixty_seconds() {
        let start = Instant::now();
        let result = wait_until(|| async { Ok(false) }, &WaitPolicy::default()).await;
        assert!(result.is_err());
        assert!(start.elapsed() < DEFAULT_TIMEOUT);
        assert!(start.elapsed() >= DEFAULT_TIMEOUT - DEFAULT_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_message_is_carried() {
        let policy = WaitPolicy::with_timeout(Duration::from_secs(1)).message("never synced");
        let err = wait_until(|| async { Ok(false) }, &policy).await.unwrap_err();
        assert!(err.to_string().contains("never synced"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_error_propagates_unchanged() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = wait_until(
            || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 1 {
                        Err(HarnessError::UnknownCoinType(999))
                    } else {
                        Ok(false)
                    }
                }
            },
            &WaitPolicy::with_attempts(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarnessError::UnknownCoinType(999)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_once_state_advances() {
        let height = Arc::new(AtomicU32::new(0));
        let writer = height.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                sleep(Duration::from_millis(300)).await;
                writer.fetch_add(1, Ordering::SeqCst);
            }
        });

        let reader = height.clone();
        let policy = WaitPolicy::with_timeout(Duration::from_secs(5)).interval(Duration::from_millis(100));
        wait_until(
            || {
                let h = reader.load(Ordering::SeqCst);
                async move { Ok(h >= 3) }
            },
            &policy,
        )
        .await
        .unwrap();
        assert_eq!(height.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_port_open_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        wait_until_port_open("127.0.0.1", port, &WaitPolicy::with_attempts(3))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_port_closed_times_out() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let policy = WaitPolicy::with_attempts(2).interval(Duration::from_millis(10));
        let err = wait_until_port_open("127.0.0.1", port, &policy)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("never opened"));
    }
}
