//! Condition poller.
//!
//! [`wait_until`] calls an async probe right away, then once per interval,
//! until the probed value meets a [`Target`], the timeout passes, or the
//! probe fails. Probe calls never overlap: the next call is not issued while
//! the previous one is still running, and ticks missed during a slow probe
//! are skipped rather than replayed in a burst.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, Interval, MissedTickBehavior};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

// ─── Target ───────────────────────────────────────────────────────────────

/// What counts as "done" for a poll.
pub enum Target<T> {
    /// Probed value `>=` the given value.
    AtLeast(T),
    Matches(Box<dyn Fn(&T) -> bool + Send + Sync>),
}

impl<T: PartialOrd> Target<T> {
    pub fn at_least(value: T) -> Self {
        Target::AtLeast(value)
    }

    pub fn matching(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Target::Matches(Box::new(predicate))
    }

    pub fn is_met(&self, value: &T) -> bool {
        match self {
            Target::AtLeast(target) => value >= target,
            Target::Matches(predicate) => predicate(value),
        }
    }
}

impl Target<String> {
    /// Matches values starting with `prefix`, for version and commit strings
    /// where `>=` is meaningless.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Target::Matches(Box::new(move |value: &String| value.starts_with(&prefix)))
    }
}

impl<T: fmt::Debug> fmt::Debug for Target<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::AtLeast(v) => f.debug_tuple("AtLeast").field(v).finish(),
            Target::Matches(_) => f.write_str("Matches(<predicate>)"),
        }
    }
}

// ─── PollSpec ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    /// `None` polls forever.
    pub timeout: Option<Duration>,
}

impl PollSpec {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            interval: if interval.is_zero() {
                DEFAULT_INTERVAL
            } else {
                interval
            },
            timeout: timeout.filter(|t| !t.is_zero()),
        }
    }

    /// Zero or missing values fall back to the defaults: a 100ms interval
    /// and no timeout.
    pub fn from_millis(interval_ms: Option<u64>, timeout_ms: Option<u64>) -> Self {
        Self::new(
            Duration::from_millis(interval_ms.unwrap_or(0)),
            timeout_ms.map(Duration::from_millis),
        )
    }
}

impl Default for PollSpec {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, None)
    }
}

// ─── PollError ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("Timed out")]
    TimedOut { elapsed: Duration },

    #[error("probe failed: {0}")]
    Probe(#[source] E),
}

impl<E> PollError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::TimedOut { .. })
    }
}

// ─── Schedule ─────────────────────────────────────────────────────────────

/// Result of waiting for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Time to probe; carries the elapsed time since start.
    Due(Duration),
    /// The timeout passed before this tick.
    Expired(Duration),
}

/// Fixed-period schedule with an optional deadline. The first tick fires
/// immediately; the schedule stops when dropped.
#[derive(Debug)]
pub struct Schedule {
    started: Instant,
    interval: Interval,
    timeout: Option<Duration>,
}

impl Schedule {
    pub fn start(spec: PollSpec) -> Self {
        let mut interval = tokio::time::interval(spec.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            started: Instant::now(),
            interval,
            timeout: spec.timeout,
        }
    }

    /// Wait for the next tick. The deadline is only checked here, at tick
    /// boundaries, so expiry is reported up to one interval late.
    pub async fn next(&mut self) -> Tick {
        self.interval.tick().await;
        let elapsed = self.started.elapsed();
        match self.timeout {
            Some(timeout) if elapsed > timeout => Tick::Expired(elapsed),
            _ => Tick::Due(elapsed),
        }
    }
}

// ─── wait_until ───────────────────────────────────────────────────────────

/// Poll `probe` until its value meets `target`.
///
/// Probes run one at a time. While a probe is in flight no other starts,
/// and ticks that fall due meanwhile are skipped, not queued.
///
/// The timeout is checked only before a probe starts. A probe that started
/// in time counts even if it finishes after the timeout, and the returned
/// elapsed time is taken at the start of that successful probe, so it is
/// never past the timeout.
///
/// A probe returning a value that does not meet the target is "not yet";
/// a probe returning `Err` stops polling immediately with
/// [`PollError::Probe`], without retrying.
pub async fn wait_until<T, E, F, Fut>(
    target: &Target<T>,
    mut probe: F,
    spec: PollSpec,
) -> Result<Duration, PollError<E>>
where
    T: PartialOrd,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut schedule = Schedule::start(spec);
    loop {
        let elapsed = match schedule.next().await {
            Tick::Due(elapsed) => elapsed,
            Tick::Expired(elapsed) => return Err(PollError::TimedOut { elapsed }),
        };
        let value = probe().await.map_err(PollError::Probe)?;
        if target.is_met(&value) {
            return Ok(elapsed);
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicU64>, impl FnMut() -> std::future::Ready<Result<u64, Infallible>>) {
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let probe = move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok(n))
        };
        (calls, probe)
    }

    #[tokio::test(start_paused = true)]
    async fn probe_count_equals_counter_target() {
        for n in [1u64, 2, 5, 17] {
            let (calls, probe) = counter();
            let spec = PollSpec::from_millis(Some(10), None);
            wait_until(&Target::at_least(n), probe, spec).await.unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), n, "target {n}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_probe_is_immediate() {
        let (_, probe) = counter();
        let elapsed = wait_until(&Target::at_least(1), probe, PollSpec::default())
            .await
            .unwrap();
        assert_eq!(elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_tracks_interval() {
        let (_, probe) = counter();
        let spec = PollSpec::from_millis(Some(100), Some(10_000));
        let elapsed = wait_until(&Target::at_least(4), probe, spec).await.unwrap();
        assert_eq!(elapsed, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_target_is_out_of_reach() {
        let (calls, probe) = counter();
        let spec = PollSpec::from_millis(Some(10), Some(50));
        let err = wait_until(&Target::at_least(1_000), probe, spec)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timed out");
        let PollError::TimedOut { elapsed } = err else {
            panic!("expected timeout")
        };
        assert!(elapsed > Duration::from_millis(50));
        assert!(calls.load(Ordering::SeqCst) < 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_aborts_immediately() {
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let probe = move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 2 {
                    Err("metrics endpoint exploded")
                } else {
                    Ok(n)
                }
            }
        };
        let err = wait_until(&Target::at_least(10), probe, PollSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Probe("metrics endpoint exploded")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probes_never_overlap() {
        let in_flight = Arc::new(AtomicU64::new(0));
        let max_seen = Arc::new(AtomicU64::new(0));
        let calls = Arc::new(AtomicU64::new(0));
        let (f, m, c) = (in_flight.clone(), max_seen.clone(), calls.clone());
        let probe = move || {
            let (f, m, c) = (f.clone(), m.clone(), c.clone());
            async move {
                let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                // Three intervals per probe.
                tokio::time::sleep(Duration::from_millis(30)).await;
                f.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, Infallible>(c.fetch_add(1, Ordering::SeqCst) + 1)
            }
        };
        let spec = PollSpec::from_millis(Some(10), None);
        wait_until(&Target::at_least(3), probe, spec).await.unwrap();
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_final_probe_that_started_in_time_succeeds() {
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let probe = move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 2 {
                    // Ends well past the 50ms timeout.
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok::<_, Infallible>(n)
            }
        };
        let spec = PollSpec::from_millis(Some(40), Some(50));
        let elapsed = wait_until(&Target::at_least(2), probe, spec).await.unwrap();
        assert_eq!(elapsed, Duration::from_millis(40));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn prefix_target_matches_versions() {
        let versions = ["", "v1.2.9", "v1.3.0-rc1"];
        let mut i = 0;
        let probe = || {
            let v = versions[i.min(versions.len() - 1)].to_string();
            i += 1;
            std::future::ready(Ok::<_, Infallible>(v))
        };
        wait_until(&Target::prefix("v1.3"), probe, PollSpec::default())
            .await
            .unwrap();
        assert_eq!(i, 3);
    }

    #[test]
    fn non_positive_settings_fall_back_to_defaults() {
        let spec = PollSpec::from_millis(Some(0), Some(0));
        assert_eq!(spec.interval, DEFAULT_INTERVAL);
        assert_eq!(spec.timeout, None);
        assert_eq!(PollSpec::from_millis(None, None), PollSpec::default());
        assert_eq!(
            PollSpec::from_millis(Some(5), Some(20)).timeout,
            Some(Duration::from_millis(20))
        );
    }

    #[test]
    fn target_semantics() {
        assert!(Target::at_least(3).is_met(&3));
        assert!(!Target::at_least(3).is_met(&2));
        assert!(Target::at_least("b".to_string()).is_met(&"c".to_string()));
        assert!(Target::matching(|v: &i32| *v % 2 == 0).is_met(&4));
        assert!(!Target::prefix("v2").is_met(&"v1.9".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_expires_after_deadline() {
        let mut schedule = Schedule::start(PollSpec::from_millis(Some(10), Some(25)));
        assert_eq!(schedule.next().await, Tick::Due(Duration::ZERO));
        assert_eq!(schedule.next().await, Tick::Due(Duration::from_millis(10)));
        assert_eq!(schedule.next().await, Tick::Due(Duration::from_millis(20)));
        assert_eq!(schedule.next().await, Tick::Expired(Duration::from_millis(30)));
    }
}
