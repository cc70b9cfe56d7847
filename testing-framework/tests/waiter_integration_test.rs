// Integration tests for the waiter primitives
// Timing tests run on a paused clock so every sleep is virtual

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::time::{Duration, Instant};

use lit_testing_framework::waiters::{wait_until, wait_until_port_open, WaitPolicy};
use lit_testing_framework::HarnessError;

// Flips to true after a fixed number of evaluations
struct Countdown {
    remaining: AtomicU32,
    calls: AtomicU32,
}

impl Countdown {
    fn new(evaluations: u32) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicU32::new(evaluations),
            calls: AtomicU32::new(0),
        })
    }

    fn check(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.remaining.load(Ordering::SeqCst) {
            0 | 1 => true,
            n => {
                self.remaining.store(n - 1, Ordering::SeqCst);
                false
            }
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test(start_paused = true)]
async fn test_condition_met_on_third_attempt() {
    let countdown = Countdown::new(3);
    let c = countdown.clone();
    let start = Instant::now();

    let policy = WaitPolicy::with_attempts(10).interval(Duration::from_millis(500));
    wait_until(move || {
        let ready = c.check();
        async move { Ok(ready) }
    }, &policy)
    .await
    .unwrap();

    assert_eq!(countdown.calls(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_budget_stops_before_overrun() {
    let start = Instant::now();
    let policy = WaitPolicy::with_timeout(Duration::from_secs(5))
        .interval(Duration::from_secs(1))
        .message("sync height never matched");

    let err = wait_until(|| async { Ok(false) }, &policy).await.unwrap_err();

    // the next sleep would cross the budget, so the wait gives up first
    assert!(start.elapsed() <= Duration::from_secs(5));
    match err {
        HarnessError::WaitTimeout {
            message, attempts, ..
        } => {
            assert_eq!(message, "sync height never matched");
            assert_eq!(attempts, 5);
        }
        other => panic!("expected WaitTimeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_attempts_and_timeout_whichever_first() {
    let countdown = Countdown::new(u32::MAX);
    let c = countdown.clone();

    let policy = WaitPolicy::with_attempts(3)
        .timeout(Duration::from_secs(60))
        .interval(Duration::from_secs(1));
    let result = wait_until(move || {
        let ready = c.check();
        async move { Ok(ready) }
    }, &policy)
    .await;

    assert!(matches!(result, Err(HarnessError::WaitTimeout { attempts: 3, .. })));
    assert_eq!(countdown.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_predicate_error_aborts_wait() {
    let countdown = Countdown::new(u32::MAX);
    let c = countdown.clone();

    let result = wait_until(move || {
        let first = c.calls() == 0;
        c.check();
        async move {
            if first {
                Ok(false)
            } else {
                Err(HarnessError::transport("ws://127.0.0.1:1/ws", "connection closed by node"))
            }
        }
    }, &WaitPolicy::with_attempts(10))
    .await;

    match result {
        Err(e) => assert!(e.is_transport()),
        Ok(()) => panic!("error should have ended the wait"),
    }
    assert_eq!(countdown.calls(), 2);
}

#[tokio::test]
async fn test_port_open_with_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let policy = WaitPolicy::with_attempts(5).interval(Duration::from_millis(20));
    wait_until_port_open("127.0.0.1", port, &policy).await.unwrap();
}

#[tokio::test]
async fn test_port_open_times_out_on_closed_port() {
    // grab a free port, then release it
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let policy = WaitPolicy::with_attempts(3).interval(Duration::from_millis(10));
    match wait_until_port_open("127.0.0.1", port, &policy).await {
        Err(HarnessError::WaitTimeout { message, .. }) => {
            assert!(message.contains(&port.to_string()));
        }
        other => panic!("expected WaitTimeout, got {:?}", other),
    }
}
