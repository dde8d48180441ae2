//! Magnet link handling for the torrent fallback path
//!
//! Validation decides whether torrent playback is usable at all, the
//! normalizer derives the playback config a session works from, and web-seed
//! extraction feeds the P2P launcher with HTTP mirrors.

mod normalize;
mod validate;
mod web_seeds;

use std::fmt;

pub use normalize::{
    DEFAULT_WSS_TRACKERS, MagnetNormalizer, NormalizedMagnet, PlaybackConfigDeriver,
    TorrentPlaybackConfig,
};
pub use validate::{BtihValidator, MagnetValidator, extract_info_hash};
pub use web_seeds::{extract_web_seeds, web_seed_candidates};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary, as carried in the `xt=urn:btih:`
/// topic of a BitTorrent v1 magnet link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40-character hex digest.
    ///
    /// # Errors
    /// - `MagnetError::InvalidInfoHash` - Wrong length or non-hex characters
    pub fn from_hex(value: &str) -> Result<Self, MagnetError> {
        let bytes = hex::decode(value.trim()).map_err(|e| MagnetError::InvalidInfoHash {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        let hash: [u8; 20] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| MagnetError::InvalidInfoHash {
                value: value.to_string(),
                reason: format!("expected 20 bytes, got {}", bytes.len()),
            })?;
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Errors produced while interpreting magnet links.
#[derive(Debug, thiserror::Error)]
pub enum MagnetError {
    #[error("Invalid magnet link: {reason}")]
    InvalidMagnetLink { reason: String },

    #[error("Invalid info hash {value}: {reason}")]
    InvalidInfoHash { value: String, reason: String },

    #[error("Magnet link has no BitTorrent v1 info hash")]
    MissingInfoHash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_hex_round_trip() {
        let hex = "0123456789abcdef0123456789abcdef01234567";
        let hash = InfoHash::from_hex(hex).unwrap();

        assert_eq!(hash.to_string(), hex);
        assert_eq!(hash.as_bytes()[0], 0x01);
    }

    #[test]
    fn test_info_hash_rejects_short_digest() {
        let result = InfoHash::from_hex("abcd");

        assert!(matches!(result, Err(MagnetError::InvalidInfoHash { .. })));
    }
}
