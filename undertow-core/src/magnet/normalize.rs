//! Magnet normalization and playback config derivation

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::validate::{extract_info_hash, is_hex_digest, parse_magnet};

/// WebSocket trackers appended to every magnet so browser-grade peers can be found.
pub const DEFAULT_WSS_TRACKERS: &[&str] = &[
    "wss://tracker.openwebtorrent.com",
    "wss://tracker.btorrent.xyz",
    "wss://tracker.fastcast.nz",
];

static ENCODED_BTIH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)xt=urn%3Abtih%3A([0-9a-z]+)").expect("static pattern compiles")
});

/// Torrent-side view of a playback request.
///
/// Derived once per session from the raw url/magnet pair and used to decide
/// whether the torrent source is usable at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TorrentPlaybackConfig {
    /// Magnet handed to the P2P launcher
    pub magnet: String,
    /// Minimal variant the launcher may retry with
    pub fallback_magnet: String,
    /// Whether the caller supplied any magnet input
    pub provided: bool,
    /// Lower-cased v1 info hash, empty when none was found
    pub info_hash: String,
    /// Whether normalization changed the input
    pub did_mutate: bool,
}

impl TorrentPlaybackConfig {
    /// Config that uses the magnet exactly as given.
    pub fn passthrough(magnet: &str) -> Self {
        Self {
            magnet: magnet.to_string(),
            provided: !magnet.is_empty(),
            ..Default::default()
        }
    }
}

/// Derives the torrent playback config for a request.
pub trait PlaybackConfigDeriver: Send + Sync {
    fn derive(&self, magnet: &str, url: &str) -> TorrentPlaybackConfig;
}

/// Result of [`MagnetNormalizer::normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMagnet {
    pub magnet: String,
    pub did_change: bool,
}

/// Default config deriver.
///
/// Expands bare info hashes into magnets, decodes percent-encoded topics, and
/// augments the magnet with WebSocket trackers and an HTTPS web seed.
#[derive(Debug, Clone)]
pub struct MagnetNormalizer {
    trackers: Vec<String>,
}

impl Default for MagnetNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MagnetNormalizer {
    /// Creates a normalizer using [`DEFAULT_WSS_TRACKERS`].
    pub fn new() -> Self {
        Self {
            trackers: DEFAULT_WSS_TRACKERS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Adds trackers on top of the defaults. Non-`wss://` entries are ignored.
    pub fn with_extra_trackers<I, S>(mut self, trackers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trackers.extend(trackers.into_iter().map(Into::into));
        self
    }

    /// Normalizes a raw magnet value, optionally adding `web_seed` as a `ws` parameter.
    pub fn normalize(&self, raw: &str, web_seed: Option<&str>) -> NormalizedMagnet {
        let initial = raw.trim();
        if initial.is_empty() {
            return NormalizedMagnet {
                magnet: String::new(),
                did_change: false,
            };
        }

        let mut did_mutate = false;
        let mut working = initial.to_string();
        if is_hex_digest(&working) {
            working = format!("magnet:?xt=urn:btih:{}", working.to_ascii_lowercase());
            did_mutate = true;
        }

        let decoded = decode_encoded_topics(&working);
        if decoded != working {
            working = decoded;
            did_mutate = true;
        }

        let Ok(mut parsed) = parse_magnet(&working) else {
            let did_change = did_mutate || working != initial;
            return NormalizedMagnet {
                magnet: working,
                did_change,
            };
        };

        let mut known_trackers: HashSet<String> = parsed
            .query_pairs()
            .filter(|(key, _)| key == "tr")
            .map(|(_, value)| comparable(&value))
            .collect();
        let mut known_seeds: HashSet<String> = parsed
            .query_pairs()
            .filter(|(key, _)| key == "ws")
            .map(|(_, value)| comparable(&value))
            .collect();

        for tracker in &self.trackers {
            let tracker = tracker.trim();
            if !tracker.to_ascii_lowercase().starts_with("wss://") {
                continue;
            }
            if known_trackers.insert(comparable(tracker)) {
                parsed.query_pairs_mut().append_pair("tr", tracker);
                did_mutate = true;
            }
        }

        if let Some(seed) = web_seed.map(str::trim).filter(|seed| !seed.is_empty()) {
            match url::Url::parse(seed) {
                Ok(seed_url) if seed_url.scheme() == "https" => {
                    if known_seeds.insert(comparable(seed_url.as_str())) {
                        parsed.query_pairs_mut().append_pair("ws", seed_url.as_str());
                        did_mutate = true;
                    }
                }
                Ok(seed_url) if seed_url.scheme() == "http" => {
                    tracing::debug!(seed, "Skipping insecure web seed");
                }
                _ => {}
            }
        }

        let magnet = decode_encoded_topics(parsed.as_str());
        let did_change = did_mutate || magnet != initial;
        NormalizedMagnet { magnet, did_change }
    }
}

impl PlaybackConfigDeriver for MagnetNormalizer {
    fn derive(&self, magnet: &str, url: &str) -> TorrentPlaybackConfig {
        let trimmed = magnet.trim();
        if trimmed.is_empty() {
            return TorrentPlaybackConfig::default();
        }

        let url = url.trim();
        let web_seed = (!url.is_empty()).then_some(url);
        let normalized = self.normalize(trimmed, web_seed);
        let info_hash = extract_info_hash(&normalized.magnet).unwrap_or_default();

        let fallback_magnet = if info_hash.is_empty() {
            String::new()
        } else {
            let minimal = format!("magnet:?xt=urn:btih:{info_hash}");
            if minimal == normalized.magnet {
                String::new()
            } else {
                minimal
            }
        };

        tracing::trace!(
            info_hash = %info_hash,
            did_mutate = normalized.did_change,
            "Derived torrent playback config"
        );

        TorrentPlaybackConfig {
            magnet: normalized.magnet,
            fallback_magnet,
            provided: true,
            info_hash,
            did_mutate: normalized.did_change,
        }
    }
}

fn decode_encoded_topics(value: &str) -> String {
    ENCODED_BTIH
        .replace_all(value, "xt=urn:btih:$1")
        .into_owned()
}

fn comparable(value: &str) -> String {
    value.trim().trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::magnet::{BtihValidator, MagnetValidator};

    const HEX_HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    fn params(magnet: &str, key: &str) -> Vec<String> {
        url::Url::parse(magnet)
            .unwrap()
            .query_pairs()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    #[test]
    fn test_bare_hash_becomes_magnet_with_trackers() {
        let normalized = MagnetNormalizer::new().normalize(&HEX_HASH.to_uppercase(), None);

        assert!(normalized.did_change);
        assert!(normalized.magnet.starts_with(&format!("magnet:?xt=urn:btih:{HEX_HASH}")));
        assert_eq!(params(&normalized.magnet, "tr").len(), DEFAULT_WSS_TRACKERS.len());
    }

    #[test]
    fn test_existing_trackers_are_not_duplicated() {
        let magnet = format!(
            "magnet:?xt=urn:btih:{HEX_HASH}&tr=wss%3A%2F%2Ftracker.openwebtorrent.com%2F"
        );
        let normalized = MagnetNormalizer::new().normalize(&magnet, None);

        let trackers = params(&normalized.magnet, "tr");
        assert_eq!(trackers.len(), DEFAULT_WSS_TRACKERS.len());
    }

    #[test]
    fn test_encoded_topic_is_decoded() {
        let magnet = format!("magnet:?xt=urn%3Abtih%3A{HEX_HASH}");
        let normalized = MagnetNormalizer::new().normalize(&magnet, None);

        assert!(normalized.magnet.contains(&format!("xt=urn:btih:{HEX_HASH}")));
        assert!(BtihValidator.is_valid(&normalized.magnet));
    }

    #[test]
    fn test_only_https_web_seeds_are_added() {
        let magnet = format!("magnet:?xt=urn:btih:{HEX_HASH}");
        let normalizer = MagnetNormalizer::new();

        let secure = normalizer.normalize(&magnet, Some("https://cdn.example.com/v.mp4"));
        let insecure = normalizer.normalize(&magnet, Some("http://cdn.example.com/v.mp4"));

        assert_eq!(params(&secure.magnet, "ws"), vec!["https://cdn.example.com/v.mp4"]);
        assert!(params(&insecure.magnet, "ws").is_empty());
    }

    #[test]
    fn test_non_magnet_input_is_returned_untouched() {
        let normalized = MagnetNormalizer::new().normalize("not a magnet", None);

        assert_eq!(normalized.magnet, "not a magnet");
        assert!(!normalized.did_change);
    }

    #[test]
    fn test_derive_builds_fallback_magnet() {
        let config = MagnetNormalizer::new().derive(
            &format!("magnet:?xt=urn:btih:{HEX_HASH}"),
            "https://cdn.example.com/v.mp4",
        );

        assert!(config.provided);
        assert!(config.did_mutate);
        assert_eq!(config.info_hash, HEX_HASH);
        assert_eq!(config.fallback_magnet, format!("magnet:?xt=urn:btih:{HEX_HASH}"));
    }

    #[test]
    fn test_derive_empty_magnet_is_not_provided() {
        let config = MagnetNormalizer::new().derive("   ", "https://cdn.example.com/v.mp4");

        assert_eq!(config, TorrentPlaybackConfig::default());
    }

    #[test]
    fn test_derive_keeps_unusable_magnet_as_provided() {
        let config = MagnetNormalizer::new().derive("magnet:?xt=urn:btmh:1220ab", "");

        assert!(config.provided);
        assert!(config.info_hash.is_empty());
        assert!(config.fallback_magnet.is_empty());
        assert!(!BtihValidator.is_valid(&config.magnet));
    }
}
