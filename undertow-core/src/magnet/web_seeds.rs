//! Web-seed discovery for the P2P launcher

const WEB_SEED_KEYS: &[&str] = &["ws", "webseed"];

/// Extracts web-seed URLs from a magnet's `ws`/`webseed` parameters.
///
/// Values are percent-decoded (with `+` read as a space) and trimmed; empty
/// values are skipped. Parsing is deliberately lenient so a malformed magnet
/// still yields whatever seeds can be recovered.
pub fn extract_web_seeds(magnet: &str) -> Vec<String> {
    let trimmed = magnet.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or_default();
    let Some((_, query)) = without_fragment.split_once('?') else {
        return Vec::new();
    };

    query
        .split('&')
        .filter_map(|segment| {
            let (raw_key, raw_value) = segment.split_once('=').unwrap_or((segment, ""));
            let key = raw_key.trim().to_ascii_lowercase();
            if !WEB_SEED_KEYS.contains(&key.as_str()) {
                return None;
            }
            let spaced = raw_value.replace('+', "%20");
            let decoded = urlencoding::decode(&spaced)
                .map(|value| value.into_owned())
                .unwrap_or(spaced);
            let candidate = decoded.trim();
            (!candidate.is_empty()).then(|| candidate.to_string())
        })
        .collect()
}

/// Web-seed candidates for a session: the hosted URL first, then magnet seeds.
pub fn web_seed_candidates(url: &str, magnet: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let url = url.trim();
    if !url.is_empty() {
        candidates.push(url.to_string());
    }
    for seed in extract_web_seeds(magnet) {
        if !candidates.contains(&seed) {
            candidates.push(seed);
        }
    }
    candidates
}
