//! Transient surface listeners owned by a session.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::surface::{PlaybackSurface, SurfaceEvent};

/// Background listener that stops when dropped.
pub(crate) struct ListenerTask(JoinHandle<()>);

impl ListenerTask {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }
}

impl Drop for ListenerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Traces every surface event with a state snapshot.
pub(crate) fn spawn_debug_listener(
    surface: Arc<dyn PlaybackSurface>,
    session: Uuid,
) -> ListenerTask {
    let mut events = surface.subscribe();
    ListenerTask::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.is_debug_traced() => {
                    let snapshot = surface.snapshot();
                    tracing::trace!(
                        %session,
                        surface = %surface.id(),
                        event = event.name(),
                        ready_state = ?snapshot.ready_state,
                        network_state = snapshot.network_state,
                        current_time = snapshot.current_time,
                        paused = snapshot.paused,
                        error = ?snapshot.error,
                        "Surface event"
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::trace!(%session, skipped, "Debug listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Calls `on_live` once the hosted source is visibly playing.
///
/// Stops without calling it when the surface reports an error.
pub(crate) fn spawn_live_listener<F>(surface: Arc<dyn PlaybackSurface>, on_live: F) -> ListenerTask
where
    F: FnOnce() + Send + 'static,
{
    let mut events = surface.subscribe();
    ListenerTask::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SurfaceEvent::Playing) => break,
                Ok(SurfaceEvent::LoadedData | SurfaceEvent::CanPlay) => {
                    if surface.snapshot().shows_live_media() {
                        break;
                    }
                }
                Ok(SurfaceEvent::Error) | Err(RecvError::Closed) => return,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
        on_live();
    })
}
