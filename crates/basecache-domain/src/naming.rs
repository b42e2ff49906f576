//! Naming rules for the shared base directory.
//!
//! Every host mounting the cache derives the same file names from an image
//! identifier, so these functions must stay stable across releases:
//!
//! - `<fingerprint>`: the original image as fetched from the image service
//! - `<fingerprint>_sm`: legacy small variant, no longer created
//! - `<fingerprint>_<bytes>`: a copy resized for a flavor's root disk
//! - `<name>.info`: sidecar JSON record (digest and timestamp)
//! - `<name>.sha256`: older bare-digest sidecar, converted on first read

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a fingerprint: lowercase hex SHA-256.
pub const DIGEST_HEX_LEN: usize = 64;
pub const DERIVED_SEPARATOR: u8 = b'_';
pub const LEGACY_SMALL_SUFFIX: &str = "_sm";
pub const INFO_SUFFIX: &str = ".info";
pub const LEGACY_DIGEST_SUFFIX: &str = ".sha256";

/// Canonical on-disk fingerprint for an image identifier.
pub fn fingerprint_of(image_id: &str) -> String {
    hex::encode(Sha256::digest(image_id.as_bytes()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseFileKind {
    Original,
    LegacySmall,
    /// Requested size in bytes; saturates for digit runs past `u64::MAX`.
    Resized(u64),
}

impl BaseFileKind {
    /// Only unmodified originals get the longer reclamation age floor.
    pub fn is_original(self) -> bool {
        matches!(self, Self::Original)
    }
}

/// Shape of a directory entry as seen by the scanner, before any matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryShape {
    Original,
    Derived,
    Ignored,
}

pub fn classify_entry(name: &str) -> EntryShape {
    if name.len() == DIGEST_HEX_LEN {
        return EntryShape::Original;
    }
    if name.len() > DIGEST_HEX_LEN + 1
        && name.as_bytes()[DIGEST_HEX_LEN] == DERIVED_SEPARATOR
        && !is_sidecar_name(name)
    {
        return EntryShape::Derived;
    }
    EntryShape::Ignored
}

/// Matches `name` against the file names an image with `fingerprint` can own.
pub fn match_candidate(name: &str, fingerprint: &str) -> Option<BaseFileKind> {
    let rest = name.strip_prefix(fingerprint)?;
    if rest.is_empty() {
        return Some(BaseFileKind::Original);
    }
    if rest == LEGACY_SMALL_SUFFIX {
        return Some(BaseFileKind::LegacySmall);
    }
    parse_resized_suffix(rest).map(BaseFileKind::Resized)
}

fn parse_resized_suffix(rest: &str) -> Option<u64> {
    let digits = rest.strip_prefix('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().unwrap_or(u64::MAX))
}

fn is_fingerprint(candidate: &str) -> bool {
    candidate.len() == DIGEST_HEX_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// True for names a base image itself may carry.
pub fn is_base_name(name: &str) -> bool {
    let Some(fingerprint) = name.get(..DIGEST_HEX_LEN) else {
        return false;
    };
    is_fingerprint(fingerprint) && match_candidate(name, fingerprint).is_some()
}

/// True for sidecar records that belong to a base image.
pub fn is_sidecar_name(name: &str) -> bool {
    [INFO_SUFFIX, LEGACY_DIGEST_SUFFIX]
        .iter()
        .filter_map(|suffix| name.strip_suffix(suffix))
        .any(is_base_name)
}

pub fn info_filename(base_name: &str) -> String {
    format!("{base_name}{INFO_SUFFIX}")
}

pub fn legacy_digest_filename(base_name: &str) -> String {
    format!("{base_name}{LEGACY_DIGEST_SUFFIX}")
}
