//! Stall and success detection for hosted playback.
//!
//! A registration subscribes to one surface's events and owns one resettable
//! stall timer. Error-class events and timer expiry report a fallback,
//! `playing`/`ended` report success, and progress events push the deadline
//! out. Whichever fires first wins; the registration is inert afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::isolation::call_isolated;
use super::surface::{PlaybackSurface, SurfaceEvent, SurfaceId, WatchdogSignal};
use super::types::FallbackReason;

pub type SuccessCallback = Box<dyn FnOnce() + Send>;
pub type FallbackCallback = Box<dyn FnOnce(FallbackReason) + Send>;

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

/// Parameters for [`WatchdogRegistry::register`].
pub struct WatchdogOptions {
    /// Quiet period before a stall is reported. Zero disables the timer.
    pub stall: Duration,
    pub on_success: Option<SuccessCallback>,
    pub on_fallback: Option<FallbackCallback>,
}

impl WatchdogOptions {
    pub fn new(stall: Duration) -> Self {
        Self {
            stall,
            on_success: None,
            on_fallback: None,
        }
    }

    pub fn on_success(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_fallback(mut self, callback: impl FnOnce(FallbackReason) + Send + 'static) -> Self {
        self.on_fallback = Some(Box::new(callback));
        self
    }
}

struct Registration {
    id: u64,
    surface: SurfaceId,
    active: AtomicBool,
    stall: watch::Sender<Duration>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Registration {
    /// Marks the registration spent. Only the first caller gets `true`.
    fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn teardown(&self) {
        if !self.deactivate() {
            return;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        tracing::trace!(registration = self.id, surface = %self.surface, "Watchdog torn down");
    }
}

/// Handle to a watchdog registration.
///
/// `cleanup()` is idempotent and also runs on drop.
#[must_use = "dropping the guard tears the watchdog down"]
pub struct WatchdogGuard {
    registration: Option<Arc<Registration>>,
}

impl WatchdogGuard {
    /// A guard with nothing to clean up.
    pub fn noop() -> Self {
        Self { registration: None }
    }

    pub fn cleanup(&self) {
        if let Some(registration) = &self.registration {
            registration.teardown();
        }
    }

    /// Whether the watchdog is still waiting for an outcome.
    pub fn is_active(&self) -> bool {
        self.registration
            .as_ref()
            .is_some_and(|registration| registration.is_active())
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.registration.as_ref().map(|registration| registration.surface)
    }

    /// Changes the stall window of a live watchdog without resubscribing.
    ///
    /// Zero disarms the timer; a non-zero value restarts it from now. Returns
    /// false when the watchdog has already fired or been cleaned up.
    pub fn set_stall(&self, stall: Duration) -> bool {
        match &self.registration {
            Some(registration) if registration.is_active() => {
                registration.stall.send_replace(stall);
                true
            }
            _ => false,
        }
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Tracks registrations so each surface has at most one live watchdog.
#[derive(Default)]
pub struct WatchdogRegistry {
    by_surface: Mutex<HashMap<SurfaceId, Weak<Registration>>>,
}

impl WatchdogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a watchdog to `surface`, replacing any live one on the same surface.
    ///
    /// Returns a no-op guard when there is no surface or no fallback callback.
    /// Must be called from within a tokio runtime.
    pub fn register(
        &self,
        surface: Option<&Arc<dyn PlaybackSurface>>,
        options: WatchdogOptions,
    ) -> WatchdogGuard {
        let (Some(surface), Some(on_fallback)) = (surface, options.on_fallback) else {
            return WatchdogGuard::noop();
        };

        let surface_id = surface.id();
        let (stall, stall_updates) = watch::channel(options.stall);
        let registration = Arc::new(Registration {
            id: NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed),
            surface: surface_id,
            active: AtomicBool::new(true),
            stall,
            task: Mutex::new(None),
        });

        let previous = self
            .by_surface
            .lock()
            .insert(surface_id, Arc::downgrade(&registration));
        if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
            tracing::debug!(
                surface = %surface_id,
                previous = previous.id,
                "Replacing active watchdog on surface"
            );
            previous.teardown();
        }

        let events = surface.subscribe();
        let task = tokio::spawn(run_watchdog(
            Arc::clone(&registration),
            events,
            stall_updates,
            options.on_success,
            on_fallback,
        ));
        *registration.task.lock() = Some(task);

        tracing::trace!(
            registration = registration.id,
            surface = %surface_id,
            stall_ms = options.stall.as_millis() as u64,
            "Watchdog registered"
        );

        WatchdogGuard {
            registration: Some(registration),
        }
    }

    /// Number of surfaces with a live watchdog.
    pub fn active_count(&self) -> usize {
        let mut by_surface = self.by_surface.lock();
        by_surface.retain(|_, weak| weak.upgrade().is_some_and(|r| r.is_active()));
        by_surface.len()
    }
}

fn armed(stall: Duration) -> Option<Duration> {
    (!stall.is_zero()).then_some(stall)
}

async fn run_watchdog(
    registration: Arc<Registration>,
    mut events: broadcast::Receiver<SurfaceEvent>,
    mut stall_updates: watch::Receiver<Duration>,
    on_success: Option<SuccessCallback>,
    on_fallback: FallbackCallback,
) {
    let mut stall = armed(*stall_updates.borrow_and_update());
    let timer = tokio::time::sleep(stall.unwrap_or_default());
    tokio::pin!(timer);
    let mut updates_open = true;

    let verdict = loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => match event.watchdog_signal() {
                    WatchdogSignal::Fallback(reason) => break Some(reason),
                    WatchdogSignal::Success => break None,
                    WatchdogSignal::ResetTimer => {
                        if let Some(stall) = stall {
                            timer.as_mut().reset(Instant::now() + stall);
                        }
                    }
                    WatchdogSignal::Ignore => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        registration = registration.id,
                        skipped,
                        "Watchdog lagged behind surface events"
                    );
                    if let Some(stall) = stall {
                        timer.as_mut().reset(Instant::now() + stall);
                    }
                }
                Err(RecvError::Closed) => {
                    if stall.is_none() {
                        registration.deactivate();
                        return;
                    }
                    (&mut timer).await;
                    break Some(FallbackReason::Stall);
                }
            },
            changed = stall_updates.changed(), if updates_open => {
                if changed.is_err() {
                    updates_open = false;
                    continue;
                }
                stall = armed(*stall_updates.borrow_and_update());
                if let Some(stall) = stall {
                    timer.as_mut().reset(Instant::now() + stall);
                }
                tracing::debug!(
                    registration = registration.id,
                    stall_ms = stall.unwrap_or_default().as_millis() as u64,
                    "Watchdog stall window changed"
                );
            }
            () = &mut timer, if stall.is_some() => break Some(FallbackReason::Stall),
        }
    };

    if !registration.deactivate() {
        return;
    }

    match verdict {
        Some(reason) => {
            tracing::debug!(registration = registration.id, %reason, "Watchdog reporting fallback");
            call_isolated("watchdog.on_fallback", move || on_fallback(reason));
        }
        None => {
            tracing::debug!(registration = registration.id, "Watchdog reporting success");
            if let Some(on_success) = on_success {
                call_isolated("watchdog.on_success", on_success);
            }
        }
    }
}
