//! Races a playback attempt against a deadline.
//!
//! Losing the race is not an error: the caller gets [`Raced::TimedOut`] and
//! treats it as a `timeout` fallback. The raced future is dropped when the
//! timer wins, so attempts that must keep running are spawned and raced
//! through a borrowed `JoinHandle` the caller can still await afterwards.

use std::future::{Future, IntoFuture};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Outcome of [`with_timeout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Raced<T> {
    Settled(T),
    TimedOut,
}

impl<T> Raced<T> {
    pub fn settled(self) -> Option<T> {
        match self {
            Raced::Settled(value) => Some(value),
            Raced::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Raced::TimedOut)
    }
}

/// A future paired with its deadline. Await it to run the race.
#[must_use = "a timeout race does nothing unless awaited"]
pub struct TimeoutRace<F> {
    future: F,
    limit: Duration,
    label: &'static str,
}

/// Wraps `future` so it resolves to [`Raced::TimedOut`] once `limit` elapses.
///
/// A zero `limit` yields a pass-through race that never times out.
pub fn with_timeout<F: Future>(future: F, limit: Duration) -> TimeoutRace<F> {
    TimeoutRace {
        future,
        limit,
        label: "attempt",
    }
}

impl<F: Future> TimeoutRace<F> {
    /// Names the attempt in timeout logs.
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn is_passthrough(&self) -> bool {
        self.limit.is_zero()
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Hands back the wrapped future unchanged.
    pub fn into_inner(self) -> F {
        self.future
    }

    pub async fn run(self) -> Raced<F::Output> {
        if self.limit.is_zero() {
            return Raced::Settled(self.future.await);
        }
        match tokio::time::timeout(self.limit, self.future).await {
            Ok(value) => Raced::Settled(value),
            Err(_) => {
                tracing::info!(
                    attempt = self.label,
                    limit_ms = self.limit.as_millis() as u64,
                    "Attempt did not settle before the start timeout"
                );
                Raced::TimedOut
            }
        }
    }
}

impl<F> IntoFuture for TimeoutRace<F>
where
    F: Future + Send + 'static,
    F::Output: Send,
{
    type Output = Raced<F::Output>;
    type IntoFuture = BoxFuture<'static, Raced<F::Output>>;

    fn into_future(self) -> Self::IntoFuture {
        self.run().boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures::future::Shared;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fast_future_settles() {
        let raced = with_timeout(async { 42 }, Duration::from_millis(100)).await;

        assert_eq!(raced, Raced::Settled(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_future_times_out_without_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            "late"
        };

        let raced = with_timeout(slow, Duration::from_millis(100)).await;

        assert!(raced.is_timed_out());
        assert_eq!(raced.settled(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_is_passthrough() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            "eventually"
        };

        let race = with_timeout(slow, Duration::ZERO);
        assert!(race.is_passthrough());

        assert_eq!(race.await, Raced::Settled("eventually"));
    }

    #[tokio::test]
    async fn test_into_inner_returns_original_future() {
        let original: Shared<BoxFuture<'static, u8>> = async { 9 }.boxed().shared();

        let inner = with_timeout(original.clone(), Duration::ZERO).into_inner();

        assert!(inner.ptr_eq(&original));
        assert_eq!(inner.await, 9);
    }
}
