//! Stream key admission.
//!
//! Keys name a broadcast and end up in filesystem paths (`<media_root>/<key>/index.m3u8`),
//! so every publish, play and HLS request goes through [`validate`] first.

use api::event::Environment;

pub const KEY_PREFIX: &str = "smc_";
pub const MIN_KEY_LEN: usize = 8;
pub const MAX_KEY_LEN: usize = 64;
pub const PERMISSIVE_MAX_KEY_LEN: usize = 256;

const BLACKLIST: [&str; 11] = ["..", "/", "\\", ";", "|", "&", "$", "`", "<", ">", "\0"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Production: `smc_` prefix, bounded length, `[A-Za-z0-9_-]` only.
    Strict,
    /// Development: any non-empty key free of path and shell metacharacters.
    Permissive,
}

impl From<Environment> for KeyMode {
    fn from(environment: Environment) -> Self {
        if environment.is_production() {
            KeyMode::Strict
        } else {
            KeyMode::Permissive
        }
    }
}

pub fn validate(key: &str, mode: KeyMode) -> bool {
    if key.is_empty() {
        return false;
    }
    match mode {
        KeyMode::Strict => validate_strict(key),
        KeyMode::Permissive => validate_permissive(key),
    }
}

fn validate_strict(key: &str) -> bool {
    // length first so the scans below stay bounded
    (MIN_KEY_LEN..=MAX_KEY_LEN).contains(&key.len())
        && key.starts_with(KEY_PREFIX)
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        && !contains_blacklisted(key)
}

fn validate_permissive(key: &str) -> bool {
    key.len() <= PERMISSIVE_MAX_KEY_LEN
        && !key.chars().any(|c| c.is_whitespace() || c.is_control())
        && !contains_blacklisted(key)
}

fn contains_blacklisted(key: &str) -> bool {
    BLACKLIST.iter().any(|bad| key.contains(bad))
}

/// Segment file names served next to a manifest, e.g. `index12.ts`.
pub fn validate_segment(name: &str) -> bool {
    match name.strip_suffix(".ts") {
        Some(stem) => {
            !stem.is_empty()
                && name.len() <= MAX_KEY_LEN
                && stem
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        }
        None => false,
    }
}
