//! Dual-track retry for provider requests.
//!
//! Rate-limit responses and transient failures are retried on separate
//! schedules. A rate-limit signal resets the attempt counter and waits a long
//! fixed cool-off; a transient failure consumes one attempt and waits an
//! exponentially growing delay. Fatal errors are returned immediately.
//!
//! Cool-off time is bounded by a total budget so an operation against a quota
//! that never clears ends with a rate-limit error instead of looping forever.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};

/// How the retrier treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Quota exhausted; cool off without consuming an attempt.
    RateLimited,
    /// Worth another attempt after a backoff.
    Transient,
    /// Retrying will not help.
    Fatal,
}

/// Errors that can be classified for retry.
pub trait Retryable {
    fn retry_class(&self) -> RetryClass;
}

impl Retryable for stocksync_api::Error {
    fn retry_class(&self) -> RetryClass {
        match self {
            stocksync_api::Error::RateLimited { .. } => RetryClass::RateLimited,
            e if e.is_transient() => RetryClass::Transient,
            _ => RetryClass::Fatal,
        }
    }
}

/// Retry knobs. `from_env` reads overrides from `STOCKSYNC_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive transient failures allowed before giving up.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each transient backoff.
    pub jitter: Duration,
    pub cool_off: Duration,
    /// Upper bound of the random jitter added to each cool-off.
    pub cool_off_jitter: Duration,
    /// Total cool-off time allowed for one call. `None` never gives up.
    pub max_cool_off: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(500),
            cool_off: Duration::from_secs(30),
            cool_off_jitter: Duration::from_secs(5),
            max_cool_off: Some(Duration::from_secs(600)),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a policy from an arbitrary variable source. Unparseable values
    /// fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).and_then(|val| val.trim().parse::<u64>().ok());

        let max_cool_off = match read("STOCKSYNC_COOL_OFF_BUDGET_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.max_cool_off,
        };

        Self {
            max_attempts: read("STOCKSYNC_RETRY_MAX")
                .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(defaults.max_attempts),
            base_delay: read("STOCKSYNC_RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: read("STOCKSYNC_RETRY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            cool_off: read("STOCKSYNC_COOL_OFF_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cool_off),
            max_cool_off,
            ..defaults
        }
    }

    /// Same policy, but a rate-limit signal is returned at once instead of
    /// cooling off. Used for sources that have a fallback behind them.
    pub fn without_cool_off(self) -> Self {
        Self {
            max_cool_off: Some(Duration::ZERO),
            ..self
        }
    }

    /// `base * 2^attempt + jitter`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.min(20);
        let backoff = self.base_delay.saturating_mul(exp);
        backoff
            .saturating_add(jittered(Duration::ZERO, self.jitter))
            .min(self.max_delay)
    }

    pub fn cool_off_delay(&self) -> Duration {
        jittered(self.cool_off, self.cool_off_jitter)
    }
}

/// `base` plus a uniformly random extra of at most `jitter`.
pub fn jittered(base: Duration, jitter: Duration) -> Duration {
    let extra = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
    base + Duration::from_millis(extra)
}

/// Per-call retry state. Lives for one `Retrier::call`.
#[derive(Debug)]
pub struct FetchAttemptState<E> {
    /// Consecutive transient failures so far; reset by a rate-limit signal.
    pub attempt_index: u32,
    pub last_error: Option<E>,
    pub next_delay: Duration,
}

impl<E> Default for FetchAttemptState<E> {
    fn default() -> Self {
        Self {
            attempt_index: 0,
            last_error: None,
            next_delay: Duration::ZERO,
        }
    }
}

/// Atomic counters tracking request outcomes for one provider.
#[derive(Default)]
pub struct RequestTracker {
    requests_made: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_rate_limited: AtomicU64,
    requests_failed: AtomicU64,
    /// Cumulative backoff and cool-off time in milliseconds.
    total_backoff_ms: AtomicU64,
}

impl RequestTracker {
    pub fn record_success(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backoff(&self, duration: Duration) {
        self.total_backoff_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            requests_made: self.requests_made.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_rate_limited: self.requests_rate_limited.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            total_backoff_secs: self.total_backoff_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Immutable snapshot of tracker counters for display.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct TrackerSummary {
    pub requests_made: u64,
    pub requests_succeeded: u64,
    pub requests_rate_limited: u64,
    pub requests_failed: u64,
    pub total_backoff_secs: f64,
}

/// Enforces a randomized minimum spacing between consecutive calls.
///
/// The first call goes through immediately; later calls sleep until at least
/// `min + rand(0..=jitter)` has passed since the previous one.
pub struct Pacer {
    min: Duration,
    jitter: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min: Duration, jitter: Duration) -> Self {
        Self {
            min,
            jitter,
            last_call: Mutex::new(None),
        }
    }

    /// A pacer that never waits.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub async fn wait(&self) {
        let sleep_dur = {
            let last = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
            last.and_then(|last_time| {
                let spacing = jittered(self.min, self.jitter);
                spacing.checked_sub(last_time.elapsed()).filter(|d| !d.is_zero())
            })
        };
        if let Some(dur) = sleep_dur {
            sleep(dur).await;
        }
        *self.last_call.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }
}

/// Retries operations for one provider, recording outcomes on its tracker.
pub struct Retrier {
    provider: &'static str,
    policy: RetryPolicy,
    tracker: RequestTracker,
}

impl Retrier {
    pub fn new(provider: &'static str, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            tracker: RequestTracker::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Runs `operation` until it succeeds, fails fatally, exhausts
    /// `max_attempts` consecutive transient failures, or exhausts the
    /// cool-off budget.
    pub async fn call<T, E, F, Fut>(
        &self,
        label: &str,
        max_attempts: u32,
        mut operation: F,
    ) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut state = FetchAttemptState::<E>::default();
        let mut cooled = Duration::ZERO;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    self.tracker.record_success();
                    return Ok(value);
                }
                Err(err) => err,
            };

            match err.retry_class() {
                RetryClass::RateLimited => {
                    self.tracker.record_rate_limited();
                    let wait = self.policy.cool_off_delay();
                    if let Some(budget) = self.policy.max_cool_off {
                        if budget.is_zero() || cooled + wait > budget {
                            if !budget.is_zero() {
                                tracing::warn!(
                                    "{} still rate limited by {} after {:.0}s of cool-off, giving up",
                                    label,
                                    self.provider,
                                    cooled.as_secs_f64()
                                );
                            }
                            return Err(err);
                        }
                    }
                    tracing::warn!(
                        "{} rate limited by {}, cooling off for {:.1}s",
                        label,
                        self.provider,
                        wait.as_secs_f64()
                    );
                    state.attempt_index = 0;
                    state.next_delay = wait;
                    state.last_error = Some(err);
                    cooled += wait;
                    self.tracker.record_backoff(wait);
                    sleep(wait).await;
                }
                RetryClass::Transient => {
                    self.tracker.record_failure();
                    let attempt = state.attempt_index + 1;
                    if attempt >= max_attempts {
                        tracing::warn!(
                            "{} gave up after {} attempts: {}",
                            label,
                            attempt,
                            err
                        );
                        return Err(err);
                    }
                    let delay = self.policy.delay_for_attempt(state.attempt_index);
                    tracing::warn!(
                        "{} request failed (attempt {}/{}), retrying in {:.1}s: {}",
                        label,
                        attempt,
                        max_attempts,
                        delay.as_secs_f64(),
                        err
                    );
                    state.attempt_index = attempt;
                    state.next_delay = delay;
                    state.last_error = Some(err);
                    self.tracker.record_backoff(delay);
                    sleep(delay).await;
                }
                RetryClass::Fatal => {
                    self.tracker.record_failure();
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fmt;
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum TestError {
        Limited,
        Flaky,
        Broken,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn retry_class(&self) -> RetryClass {
            match self {
                TestError::Limited => RetryClass::RateLimited,
                TestError::Flaky => RetryClass::Transient,
                TestError::Broken => RetryClass::Fatal,
            }
        }
    }

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
            cool_off: Duration::from_secs(30),
            cool_off_jitter: Duration::ZERO,
            max_cool_off: Some(Duration::from_secs(120)),
        }
    }

    /// Replays `script` in order, then succeeds with the call count.
    async fn run_script(
        retrier: &Retrier,
        max_attempts: u32,
        script: Vec<TestError>,
    ) -> (Result<u64, TestError>, u64) {
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = Arc::clone(&calls);
        let script = Arc::new(script);
        let result = retrier
            .call("test", max_attempts, move || {
                let calls = Arc::clone(&calls_clone);
                let script = Arc::clone(&script);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    match script.get(n as usize) {
                        Some(err) => Err(*err),
                        None => Ok(n),
                    }
                }
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_attempt() {
        let retrier = Retrier::new("test", test_policy());
        let (result, calls) = run_script(&retrier, 3, vec![]).await;
        assert_eq!(result.unwrap(), 0);
        assert_eq!(calls, 1);
        let summary = retrier.tracker().summary();
        assert_eq!(summary.requests_made, 1);
        assert_eq!(summary.requests_succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_succeed() {
        let retrier = Retrier::new("test", test_policy());
        let (result, calls) =
            run_script(&retrier, 3, vec![TestError::Flaky, TestError::Flaky]).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 3);
        assert_eq!(retrier.tracker().summary().requests_failed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_exhaust_max_attempts() {
        let retrier = Retrier::new("test", test_policy());
        let (result, calls) = run_script(&retrier, 3, vec![TestError::Flaky; 10]).await;
        assert_eq!(result.unwrap_err(), TestError::Flaky);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_returns_immediately() {
        let retrier = Retrier::new("test", test_policy());
        let start = Instant::now();
        let (result, calls) = run_script(&retrier, 3, vec![TestError::Broken]).await;
        assert_eq!(result.unwrap_err(), TestError::Broken);
        assert_eq!(calls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_do_not_consume_attempts() {
        let retrier = Retrier::new("test", test_policy());
        // Three rate limits fit in the 120s budget; one attempt is enough.
        let (result, calls) = run_script(&retrier, 1, vec![TestError::Limited; 3]).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 4);
        let summary = retrier.tracker().summary();
        assert_eq!(summary.requests_rate_limited, 3);
        assert!((summary.total_backoff_secs - 90.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_resets_attempt_counter() {
        let retrier = Retrier::new("test", test_policy());
        // With two attempts, Flaky, Flaky would give up. A rate limit between
        // them starts the count over.
        let (result, calls) = run_script(
            &retrier,
            2,
            vec![TestError::Flaky, TestError::Limited, TestError::Flaky],
        )
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn always_rate_limited_ends_after_cool_off_budget() {
        let retrier = Retrier::new("test", test_policy());
        let start = Instant::now();
        let (result, calls) = run_script(&retrier, 1, vec![TestError::Limited; 100]).await;
        assert_eq!(result.unwrap_err(), TestError::Limited);
        // 30s cool-offs: 30, 60, 90, 120 fit in the budget; the fifth would not.
        assert_eq!(calls, 5);
        assert_eq!(start.elapsed(), Duration::from_secs(120));
        assert_eq!(retrier.tracker().summary().requests_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_cool_off_keeps_waiting() {
        let policy = RetryPolicy {
            max_cool_off: None,
            ..test_policy()
        };
        let retrier = Retrier::new("test", policy);
        let (result, calls) = run_script(&retrier, 1, vec![TestError::Limited; 50]).await;
        assert_eq!(result.unwrap(), 50);
        assert_eq!(calls, 51);
    }

    #[tokio::test(start_paused = true)]
    async fn without_cool_off_returns_rate_limit_at_once() {
        let retrier = Retrier::new("test", test_policy().without_cool_off());
        let start = Instant::now();
        let (result, calls) = run_script(&retrier, 3, vec![TestError::Limited]).await;
        assert_eq!(result.unwrap_err(), TestError::Limited);
        assert_eq!(calls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..100 {
            let d = jittered(Duration::from_secs(2), Duration::from_secs(1));
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(3));
        }
        assert_eq!(jittered(Duration::from_secs(2), Duration::ZERO), Duration::from_secs(2));
    }

    #[test]
    fn policy_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STOCKSYNC_RETRY_MAX", "5"),
            ("STOCKSYNC_RETRY_BASE_MS", "250"),
            ("STOCKSYNC_COOL_OFF_SECS", "not a number"),
            ("STOCKSYNC_COOL_OFF_BUDGET_SECS", "0"),
        ]
        .into_iter()
        .collect();
        let policy = RetryPolicy::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.cool_off, RetryPolicy::default().cool_off);
        assert_eq!(policy.max_cool_off, None);
        assert_eq!(policy.max_delay, RetryPolicy::default().max_delay);
    }

    #[test]
    fn api_errors_classify() {
        use stocksync_api::Error;
        assert_eq!(
            Error::RateLimited { provider: "yahoo" }.retry_class(),
            RetryClass::RateLimited
        );
        assert_eq!(
            Error::RequestFailed("timeout".into()).retry_class(),
            RetryClass::Transient
        );
        assert_eq!(
            Error::HttpStatus { status: 503, body: String::new() }.retry_class(),
            RetryClass::Transient
        );
        assert_eq!(
            Error::HttpStatus { status: 404, body: String::new() }.retry_class(),
            RetryClass::Fatal
        );
        assert_eq!(Error::Malformed("bad".into()).retry_class(), RetryClass::Fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_consecutive_calls() {
        let pacer = Pacer::new(Duration::from_secs(2), Duration::ZERO);
        let start = Instant::now();
        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_skips_wait_when_spacing_already_elapsed() {
        let pacer = Pacer::new(Duration::from_secs(2), Duration::ZERO);
        pacer.wait().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        let before = Instant::now();
        pacer.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
