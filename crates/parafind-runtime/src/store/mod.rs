//! File-backed persistence for a run.
//!
//! Three files share one prefix inside the output directory:
//! - `{prefix}_parallelizable_queries.jsonl`: append-only accepted rows
//! - `{prefix}_validation_stats.json`: whole-file overwrite
//! - `{prefix}_novel_categories.json`: whole-file overwrite

use std::path::{Path, PathBuf};

use thiserror::Error;

mod json_file;
mod rows;

pub use json_file::JsonFileStore;
pub use rows::{ResultStore, RowRecord};

/// Errors from the stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File locations for one output prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub rows: PathBuf,
    pub stats: PathBuf,
    pub novel_categories: PathBuf,
}

impl StorePaths {
    pub fn for_prefix(dir: impl AsRef<Path>, prefix: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            rows: dir.join(format!("{}_parallelizable_queries.jsonl", prefix)),
            stats: dir.join(format!("{}_validation_stats.json", prefix)),
            novel_categories: dir.join(format!("{}_novel_categories.json", prefix)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_for_prefix() {
        let paths = StorePaths::for_prefix("/data/out", "lmsys");
        assert_eq!(paths.rows, PathBuf::from("/data/out/lmsys_parallelizable_queries.jsonl"));
        assert_eq!(paths.stats, PathBuf::from("/data/out/lmsys_validation_stats.json"));
        assert_eq!(
            paths.novel_categories,
            PathBuf::from("/data/out/lmsys_novel_categories.json")
        );
    }
}
