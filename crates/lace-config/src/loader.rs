// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::schema::ProjectConfig;

/// Ordered list of project config file locations searched from a
/// starting directory upward, lowest to highest priority. Later files
/// override earlier ones — same convention as the corpus's own
/// config search path, minus the system-wide `/etc` tier (there is no
/// layer above the project here).
pub fn config_search_paths(start: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut dir = Some(start.to_path_buf());
    let mut chain = Vec::new();
    while let Some(d) = dir {
        chain.push(d.clone());
        dir = d.parent().map(|p| p.to_path_buf());
    }
    // Walk from the repo root down to `start` so the closest file wins.
    for dir in chain.into_iter().rev() {
        paths.push(dir.join("lace.yaml"));
        paths.push(dir.join("lace.yml"));
    }
    paths
}

/// Base directory for per-user state (`LACE_DIR`), defaulting to
/// `dirs::config_dir()/lace`. Created on first use.
pub fn lace_dir() -> anyhow::Result<PathBuf> {
    let dir = match std::env::var("LACE_DIR") {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => dirs::config_dir()
            .context("no config directory available for this platform")?
            .join("lace"),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating LACE_DIR at {}", dir.display()))?;
    Ok(dir)
}

/// Read `instructions.md` from `LACE_DIR`, if present, for
/// `Session.user_instructions`. Returns `None` when the file does not
/// exist; any other I/O error is surfaced.
pub fn read_user_instructions() -> anyhow::Result<Option<String>> {
    let path = lace_dir()?.join("instructions.md");
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(Some(text))
}

/// Load the project configuration by deep-merging every `lace.yaml`
/// found between the filesystem root and `project_dir`, plus an
/// optional explicit override path. Falls back to
/// [`ProjectConfig::default`] (with `working_directory` set to
/// `project_dir`) when no file is found anywhere in the chain.
pub fn load_project_config(
    project_dir: &Path,
    explicit: Option<&Path>,
) -> anyhow::Result<ProjectConfig> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    let mut found_any = false;

    for path in config_search_paths(project_dir) {
        if path.is_file() {
            debug!(path = %path.display(), "loading project config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
            found_any = true;
        }
    }

    if let Some(p) = explicit {
        debug!(path = %p.display(), "loading explicit project config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
        found_any = true;
    }

    let mut config: ProjectConfig = if found_any {
        serde_yaml::from_value(merged).with_context(|| "deserializing merged project config")?
    } else {
        ProjectConfig::default()
    };
    if config.working_directory == "." {
        config.working_directory = project_dir.display().to_string();
    }
    Ok(config)
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts, matching
/// the corpus's own `merge_yaml`.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
