//! Panic isolation for consumer-supplied callbacks and hooks.

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};

use futures::FutureExt;

/// Runs `f`, logging and swallowing any panic.
pub(crate) fn call_isolated<R>(label: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::warn!(
                callback = label,
                panic = %panic_message(payload.as_ref()),
                "Callback panicked; continuing"
            );
            None
        }
    }
}

/// Awaits `future`, logging and swallowing any panic raised while polling it.
pub(crate) async fn await_isolated<F: Future>(label: &str, future: F) -> Option<F::Output> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::warn!(
                callback = label,
                panic = %panic_message(payload.as_ref()),
                "Async hook panicked; continuing"
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_isolated_returns_value_or_none() {
        assert_eq!(call_isolated("ok", || 7), Some(7));
        assert_eq!(call_isolated("boom", || -> u8 { panic!("boom") }), None);
    }

    #[tokio::test]
    async fn test_await_isolated_swallows_panics() {
        let value = await_isolated("ok", async { 3 }).await;
        let panicked = await_isolated("boom", async {
            if value == Some(3) {
                panic!("hook failed");
            }
        })
        .await;

        assert_eq!(value, Some(3));
        assert!(panicked.is_none());
    }
}
