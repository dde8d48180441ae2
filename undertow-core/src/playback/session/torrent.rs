//! Torrent attempt: runs at most once per session.

use tokio_util::sync::CancellationToken;

use super::SessionInner;
use crate::magnet::web_seed_candidates;
use crate::playback::analytics::AnalyticsEvent;
use crate::playback::collaborators::P2pStartOptions;
use crate::playback::error::PlaybackError;
use crate::playback::events::SessionEvent;
use crate::playback::isolation::call_isolated;
use crate::playback::types::{FallbackReason, SourceKind, TorrentHandle};

/// Reentry guard for the torrent attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TorrentSlot {
    Idle,
    Claimed,
}

impl TorrentSlot {
    /// Claims the slot. Only the first call returns true.
    pub(super) fn claim(&mut self) -> bool {
        match std::mem::replace(self, TorrentSlot::Claimed) {
            TorrentSlot::Idle => true,
            TorrentSlot::Claimed => false,
        }
    }
}

impl SessionInner {
    /// Switches playback to the torrent.
    ///
    /// Returns `Ok(None)` when the attempt was already made, there is no usable
    /// magnet, or the attempt was abandoned before the launcher settled.
    ///
    /// # Errors
    /// - `PlaybackError::NoTorrentHandler` - No launcher was provided
    /// - `PlaybackError::P2p` - The launcher rejected the magnet
    pub(super) async fn attempt_torrent(
        &self,
        reason: FallbackReason,
        cancel: &CancellationToken,
    ) -> Result<Option<TorrentHandle>, PlaybackError> {
        if !self.torrent_slot.lock().claim() {
            tracing::debug!(session = %self.id, %reason, "Torrent attempt already made; ignoring");
            return Ok(None);
        }

        self.cleanup_watchdog();
        self.cleanup_live_listener();
        self.cleanup_debug_listener();
        if let Some(surface) = self.active_surface() {
            self.reset_surface_source(&surface);
        }

        let Some(magnet) = self.magnet_for_playback.clone() else {
            return Ok(None);
        };

        self.emit_status("Switching to WebTorrent...");
        self.dispatch(AnalyticsEvent::Fallback { reason });
        self.emit(SessionEvent::Fallback { reason });

        let launcher = self
            .collaborators
            .launcher
            .clone()
            .ok_or(PlaybackError::NoTorrentHandler)?;
        let options = P2pStartOptions {
            fallback_magnet: self.fallback_magnet.clone(),
            url_list: web_seed_candidates(self.request.url(), &magnet),
        };
        tracing::info!(
            session = %self.id,
            %reason,
            info_hash = %self.config.info_hash,
            web_seeds = options.url_list.len(),
            "Starting torrent playback"
        );

        let handle = launcher.start(&magnet, options).await?;
        if !self.claim_winner(SourceKind::Torrent, cancel) {
            tracing::warn!(
                session = %self.id,
                info_hash = %handle.info_hash,
                "Torrent started after its attempt was abandoned; not publishing"
            );
            return Ok(None);
        }

        self.dispatch(AnalyticsEvent::SourceChange {
            source: Some(SourceKind::Torrent),
        });
        self.emit(SessionEvent::SourceChange {
            source: Some(SourceKind::Torrent),
        });
        call_isolated("hooks.autoplay", || self.collaborators.hooks.autoplay());
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_claims_once() {
        let mut slot = TorrentSlot::Idle;

        assert!(slot.claim());
        assert!(!slot.claim());
        assert_eq!(slot, TorrentSlot::Claimed);
    }
}
