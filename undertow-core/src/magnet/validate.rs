//! Info-hash validation for magnet links

use url::Url;

use super::MagnetError;

const BTIH_PREFIX: &str = "urn:btih:";

/// Decides whether a magnet link can be handed to the P2P launcher.
pub trait MagnetValidator: Send + Sync {
    /// Returns true when the magnet carries an info hash the engine understands.
    fn is_valid(&self, magnet: &str) -> bool;
}

/// Accepts magnets with at least one BitTorrent v1 info hash.
///
/// A bare 40-character hex digest counts as valid. Otherwise the value must be
/// a `magnet:` URI with an `xt=urn:btih:<hash>` topic where the hash is either
/// 40 hex characters or 32 base32 characters. Magnets that only carry v2
/// hashes (`btmh`) are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct BtihValidator;

impl MagnetValidator for BtihValidator {
    fn is_valid(&self, magnet: &str) -> bool {
        let trimmed = magnet.trim();
        if trimmed.is_empty() {
            return false;
        }

        let decoded = urlencoding::decode(trimmed)
            .map(|value| value.into_owned())
            .unwrap_or_else(|_| trimmed.to_string());

        if is_hex_digest(&decoded) {
            return true;
        }

        match parse_magnet(&decoded) {
            Ok(parsed) => btih_topics(&parsed).any(|hash| is_supported_hash(&hash)),
            Err(_) => false,
        }
    }
}

/// Extracts the first usable v1 info hash from a magnet link, lower-cased.
///
/// # Errors
/// - `MagnetError::InvalidMagnetLink` - Not a parseable `magnet:` URI
/// - `MagnetError::MissingInfoHash` - No supported `xt=urn:btih:` topic
pub fn extract_info_hash(magnet: &str) -> Result<String, MagnetError> {
    let trimmed = magnet.trim();
    if is_hex_digest(trimmed) {
        return Ok(trimmed.to_ascii_lowercase());
    }

    let parsed = parse_magnet(trimmed)?;
    btih_topics(&parsed)
        .find(|hash| is_supported_hash(hash))
        .map(|hash| hash.to_ascii_lowercase())
        .ok_or(MagnetError::MissingInfoHash)
}

pub(super) fn parse_magnet(value: &str) -> Result<Url, MagnetError> {
    let parsed = Url::parse(value).map_err(|e| MagnetError::InvalidMagnetLink {
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "magnet" {
        return Err(MagnetError::InvalidMagnetLink {
            reason: format!("unexpected scheme {}", parsed.scheme()),
        });
    }
    Ok(parsed)
}

pub(super) fn is_hex_digest(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn btih_topics(parsed: &Url) -> impl Iterator<Item = String> + '_ {
    parsed
        .query_pairs()
        .filter(|(key, _)| key == "xt")
        .filter_map(|(_, value)| {
            let value = value.trim();
            let prefix = value.get(..BTIH_PREFIX.len())?;
            if !prefix.eq_ignore_ascii_case(BTIH_PREFIX) {
                return None;
            }
            Some(value[BTIH_PREFIX.len()..].to_string())
        })
}

fn is_supported_hash(hash: &str) -> bool {
    if is_hex_digest(hash) {
        return true;
    }
    hash.len() == 32
        && hash
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
}
