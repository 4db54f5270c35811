//! Filesystem layout policy.
//!
//! The engine treats path resolution as a pure collaborator: it asks where
//! things go and never second-guesses the answer.

use crate::id::ModId;
use std::path::{Path, PathBuf};

/// Media asset variants a mod profile can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaVariant {
    Logo,
    Header,
    Preview,
}

impl MediaVariant {
    fn file_name(self) -> &'static str {
        match self {
            MediaVariant::Logo => "logo.png",
            MediaVariant::Header => "header.png",
            MediaVariant::Preview => "preview.png",
        }
    }
}

/// Resolves on-disk locations for mod content. Implementations must be pure:
/// same input, same path, no side effects visible to the engine.
pub trait PathResolver {
    /// Final installed directory for a mod.
    fn install_path(&self, id: ModId) -> PathBuf;

    /// Scratch directory an archive is extracted into before the swap.
    fn staging_path(&self, id: ModId) -> PathBuf;

    /// Where the downloaded archive is kept.
    fn archive_path(&self, id: ModId) -> PathBuf;

    /// Location of a cached media asset.
    fn media_path(&self, id: ModId, variant: MediaVariant) -> PathBuf;
}

/// Default layout: everything under one root directory.
///
/// ```text
/// root/
/// ├── mods/<id>/           installed content
/// ├── staging/<id>/        in-flight extraction
/// ├── downloads/<id>.tar.gz
/// └── media/<id>/<variant>
/// ```
#[derive(Debug, Clone)]
pub struct LocalPaths {
    root: PathBuf,
}

impl LocalPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalPaths { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathResolver for LocalPaths {
    fn install_path(&self, id: ModId) -> PathBuf {
        self.root.join("mods").join(id.to_string())
    }

    fn staging_path(&self, id: ModId) -> PathBuf {
        self.root.join("staging").join(id.to_string())
    }

    fn archive_path(&self, id: ModId) -> PathBuf {
        self.root
            .join("downloads")
            .join(format!("{}.tar.gz", id))
    }

    fn media_path(&self, id: ModId, variant: MediaVariant) -> PathBuf {
        self.root
            .join("media")
            .join(id.to_string())
            .join(variant.file_name())
    }
}
