//! Project discovery and loading

mod loading;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::snapshot::Snapshot;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A Hiermart project loaded from disk
#[derive(Debug)]
pub struct Project {
    /// Project root directory
    pub root: PathBuf,

    /// Project configuration
    pub config: Config,

    /// All metadata and mart configs, merged in path order
    pub snapshot: Snapshot,

    /// Mart name to the file it was loaded from
    pub mart_files: BTreeMap<String, PathBuf>,
}

impl Project {
    /// Load a project from a directory
    pub fn load(path: &Path) -> CoreResult<Self> {
        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !root.exists() {
            return Err(CoreError::ProjectNotFound {
                path: root.display().to_string(),
            });
        }

        let config = Config::load_from_dir(&root)?;
        let mut snapshot = Snapshot::new(&config.name);

        for dir in config.metadata_paths_absolute(&root) {
            if !dir.exists() {
                log::warn!("Metadata path does not exist: {}", dir.display());
                continue;
            }
            for file in loading::discover_files(&dir, &["yml", "yaml", "json"])? {
                if let Some(fragment) = loading::load_metadata_file(&file)? {
                    snapshot.merge(fragment);
                }
            }
        }

        let mut mart_files: BTreeMap<String, PathBuf> = BTreeMap::new();
        for dir in config.mart_paths_absolute(&root) {
            if !dir.exists() {
                continue;
            }
            for file in loading::discover_files(&dir, &["yml", "yaml"])? {
                let Some(mart) = loading::load_mart_file(&file)? else {
                    continue;
                };
                if let Some(existing) = mart_files.get(&mart.name) {
                    return Err(CoreError::DuplicateMart {
                        name: mart.name,
                        path1: existing.display().to_string(),
                        path2: file.display().to_string(),
                    });
                }
                mart_files.insert(mart.name.clone(), file);
                snapshot.marts.push(mart);
            }
        }

        log::debug!(
            "Loaded project '{}' with {} nodes and {} marts",
            config.name,
            snapshot.hierarchy_nodes.len(),
            snapshot.marts.len()
        );

        Ok(Self {
            root,
            config,
            snapshot,
            mart_files,
        })
    }

    /// Get the project name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Absolute target directory
    pub fn target_dir(&self) -> PathBuf {
        self.config.target_path_absolute(&self.root)
    }

    /// Mart names in load order
    pub fn mart_names(&self) -> Vec<&str> {
        self.snapshot.mart_names()
    }
}

#[cfg(test)]
#[path = "project_test.rs"]
mod tests;
