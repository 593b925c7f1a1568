// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Thread id grammar (spec.md §3, §4.2): `lace_YYYYMMDD_xxxxxx`, with
//! delegate threads extending their parent by a dotted `.N` suffix per
//! level, e.g. `lace_20250101_abc123.1.2`.

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

static BASE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^lace_\d{8}_[a-z0-9]{6}$").expect("valid regex"));
static FULL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^lace_\d{8}_[a-z0-9]{6}(\.\d+)*$").expect("valid regex"));

/// Generates a fresh base thread id, e.g. `lace_20250101_abc123`.
pub fn generate_base_id() -> String {
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("lace_{date}_{suffix}")
}

/// `true` if `id` matches the base grammar (no dotted delegate suffix).
pub fn is_base_id(id: &str) -> bool {
    BASE_ID_RE.is_match(id)
}

/// `true` if `id` matches the full grammar (base id, optionally followed by
/// one or more `.N` delegate suffixes).
pub fn is_valid_id(id: &str) -> bool {
    FULL_ID_RE.is_match(id)
}

/// Builds the id for the `n`th delegate of `parent`.
pub fn delegate_id(parent: &str, n: u32) -> String {
    format!("{parent}.{n}")
}

/// Extracts the delegate ordinal from a direct child of `parent`, if `id`
/// is exactly one level deeper than `parent` (e.g. `id = "root.3"` for
/// `parent = "root"` returns `Some(3)`; `"root.3.1"` or `"other"` return
/// `None`).
pub fn direct_child_ordinal(parent: &str, id: &str) -> Option<u32> {
    let rest = id.strip_prefix(parent)?.strip_prefix('.')?;
    if rest.contains('.') {
        return None;
    }
    rest.parse().ok()
}

/// The root (non-delegate) id this thread descends from, i.e. everything
/// before the first `.`.
pub fn root_id(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}
