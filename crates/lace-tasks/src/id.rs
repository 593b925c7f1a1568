// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Task and note id generation (spec.md §6): `task_YYYYMMDD_xxxxxx`.
//! Mirrors `lace_threads::id`'s base-id scheme exactly, with a different
//! fixed prefix.

use chrono::Utc;
use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

pub fn generate_task_id() -> String {
    let date = Utc::now().format("%Y%m%d");
    format!("task_{date}_{}", random_suffix())
}

/// Note ids have no grammar named in spec.md; a shorter random token
/// distinguishes them from task ids at a glance in logs.
pub fn generate_note_id() -> String {
    format!("note_{}", random_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_matches_grammar() {
        let id = generate_task_id();
        assert!(id.starts_with("task_"));
        let rest = id.strip_prefix("task_").unwrap();
        let (date, suffix) = rest.split_once('_').unwrap();
        assert_eq!(date.len(), 8);
        assert!(date.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), 6);
    }

    #[test]
    fn ids_are_not_repeated_across_calls() {
        let ids: std::collections::HashSet<_> = (0..50).map(|_| generate_task_id()).collect();
        assert!(ids.len() > 1, "random suffixes should vary across 50 draws");
    }
}
