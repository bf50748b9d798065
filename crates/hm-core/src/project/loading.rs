//! File discovery and metadata/mart file loading

use crate::error::{CoreError, CoreResult};
use crate::mart::MartConfig;
use crate::snapshot::SnapshotFragment;
use std::path::{Path, PathBuf};

/// Top-level keys that mark a file as metadata.
const METADATA_KEYS: &[&str] = &[
    "hierarchy_nodes",
    "source_mappings",
    "formula_groups",
    "filter_groups",
];

/// Recursively list files with one of `extensions`, sorted by path so loading
/// order (and therefore snapshot order) is stable.
pub(crate) fn discover_files(dir: &Path, extensions: &[&str]) -> CoreResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(dir, extensions, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, extensions: &[&str], files: &mut Vec<PathBuf>) -> CoreResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
        path: dir.display().to_string(),
        source: e,
    })? {
        let entry = entry.map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, extensions, files)?;
            continue;
        }
        if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Read and parse a file as a generic YAML value (JSON parses as YAML).
///
/// Unreadable files are skipped with a warning, mirroring directory scans
/// elsewhere.
fn read_value(path: &Path) -> CoreResult<Option<serde_yaml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Cannot read {}: {}", path.display(), e);
            return Ok(None);
        }
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_yaml::from_str(&content)
        .map(Some)
        .map_err(|e| parse_error(path, e))
}

fn parse_error(path: &Path, e: serde_yaml::Error) -> CoreError {
    CoreError::MetadataParseError {
        path: path.display().to_string(),
        details: e.to_string(),
    }
}

/// Load one metadata file; `None` when it carries none of the metadata keys.
pub(crate) fn load_metadata_file(path: &Path) -> CoreResult<Option<SnapshotFragment>> {
    let Some(value) = read_value(path)? else {
        return Ok(None);
    };
    let is_metadata = value
        .as_mapping()
        .is_some_and(|m| METADATA_KEYS.iter().any(|k| m.contains_key(*k)));
    if !is_metadata {
        log::debug!("Skipping {}: no metadata keys", path.display());
        return Ok(None);
    }
    let fragment: SnapshotFragment =
        serde_yaml::from_value(value).map_err(|e| parse_error(path, e))?;
    Ok(Some(fragment))
}

/// Load one mart file.
///
/// Files without a `kind` key are skipped; a `kind` other than `mart` is an
/// error because mart directories hold nothing else.
pub(crate) fn load_mart_file(path: &Path) -> CoreResult<Option<MartConfig>> {
    let Some(mut value) = read_value(path)? else {
        return Ok(None);
    };
    let Some(mapping) = value.as_mapping_mut() else {
        log::debug!("Skipping {}: not a mapping", path.display());
        return Ok(None);
    };
    let Some(kind) = mapping.remove("kind") else {
        log::debug!("Skipping {}: no 'kind' key", path.display());
        return Ok(None);
    };
    match kind.as_str() {
        Some(k) if k.eq_ignore_ascii_case("mart") => {}
        _ => {
            return Err(CoreError::MartInvalidKind {
                path: path.display().to_string(),
                found: serde_yaml::to_string(&kind)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            })
        }
    }
    let mart: MartConfig = serde_yaml::from_value(value).map_err(|e| parse_error(path, e))?;
    if mart.name.trim().is_empty() {
        return Err(CoreError::EmptyName {
            context: format!("mart file {}", path.display()),
        });
    }
    Ok(Some(mart))
}
