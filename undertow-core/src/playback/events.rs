//! Session lifecycle events and the notifier that fans them out.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use super::error::PlaybackError;
use super::isolation::call_isolated;
use super::surface::SurfaceId;
use super::types::{FallbackReason, PlaybackResult, SourceKind};

/// Identifies a listener registered with an [`EventNotifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Multi-listener publish/subscribe for one event type.
///
/// Listeners are invoked in subscription order. A panicking listener is
/// logged and skipped; the remaining listeners still run. Listeners may
/// subscribe or unsubscribe from inside a callback.
pub struct EventNotifier<E> {
    label: &'static str,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener<E>)>>,
}

impl<E> EventNotifier<E> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            call_isolated(self.label, || listener(event));
        }
    }
}

impl<E> fmt::Debug for EventNotifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("label", &self.label)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Inputs summary published when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartDetail {
    pub url_provided: bool,
    pub magnet_provided: bool,
    pub magnet_usable: bool,
}

/// Lifecycle notification emitted by a playback session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SessionStart(SessionStartDetail),
    Status { message: String },
    VideoPrepared { surface: SurfaceId },
    ViewLoggingRequest { surface: SurfaceId },
    Fallback { reason: FallbackReason },
    SourceChange { source: Option<SourceKind> },
    PosterRemove { reason: String },
    AutoplayBlocked { reason: String },
    Error { error: Arc<PlaybackError>, message: String },
    Finished { result: PlaybackResult },
}

/// Discriminant of [`SessionEvent`], used for targeted subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    SessionStart,
    Status,
    VideoPrepared,
    ViewLoggingRequest,
    Fallback,
    SourceChange,
    PosterRemove,
    AutoplayBlocked,
    Error,
    Finished,
}

impl SessionEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionEventKind::SessionStart => "session-start",
            SessionEventKind::Status => "status",
            SessionEventKind::VideoPrepared => "video-prepared",
            SessionEventKind::ViewLoggingRequest => "view-logging-request",
            SessionEventKind::Fallback => "fallback",
            SessionEventKind::SourceChange => "sourcechange",
            SessionEventKind::PosterRemove => "poster-remove",
            SessionEventKind::AutoplayBlocked => "autoplay-blocked",
            SessionEventKind::Error => "error",
            SessionEventKind::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionEvent {
    pub fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::SessionStart(_) => SessionEventKind::SessionStart,
            SessionEvent::Status { .. } => SessionEventKind::Status,
            SessionEvent::VideoPrepared { .. } => SessionEventKind::VideoPrepared,
            SessionEvent::ViewLoggingRequest { .. } => SessionEventKind::ViewLoggingRequest,
            SessionEvent::Fallback { .. } => SessionEventKind::Fallback,
            SessionEvent::SourceChange { .. } => SessionEventKind::SourceChange,
            SessionEvent::PosterRemove { .. } => SessionEventKind::PosterRemove,
            SessionEvent::AutoplayBlocked { .. } => SessionEventKind::AutoplayBlocked,
            SessionEvent::Error { .. } => SessionEventKind::Error,
            SessionEvent::Finished { .. } => SessionEventKind::Finished,
        }
    }

    /// Status text carried by a `status` event.
    pub fn status_message(&self) -> Option<&str> {
        match self {
            SessionEvent::Status { message } => Some(message),
            _ => None,
        }
    }
}
