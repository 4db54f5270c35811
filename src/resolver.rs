//! Dependency resolution.
//!
//! Breadth-first walk of the dependency graph starting at a root mod. Nodes
//! are deduplicated by identifier before being traversed deeper, which both
//! terminates cycles and guarantees each mod keeps the shallowest depth at
//! which it was discovered. Size totals aggregate only over nodes with known
//! file metadata; unresolved nodes are still listed.

use crate::engine::EngineCore;
use crate::error::{Error, Result};
use crate::id::ModId;
use crate::types::FileInfo;
use std::collections::{HashSet, VecDeque};

/// One resolved dependency, tagged with its discovery depth. The root itself
/// appears at depth 0.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub id: ModId,
    pub name: String,
    pub depth: u32,
    pub file: Option<FileInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyList {
    pub nodes: Vec<DependencyNode>,
    /// Sum of compressed archive sizes over nodes with file metadata.
    pub total_size: u64,
    /// Sum of extracted sizes over nodes with file metadata.
    pub total_size_uncompressed: u64,
}

impl DependencyList {
    fn push(&mut self, node: DependencyNode) {
        if let Some(file) = &node.file {
            self.total_size += file.filesize;
            self.total_size_uncompressed += file.filesize_uncompressed;
        }
        self.nodes.push(node);
    }
}

/// Resolve the dependency set of `root`.
///
/// Non-recursive mode stops at direct dependencies (depth 1). Metadata for
/// each node comes through the cache-aware fetchers, so repeated resolutions
/// within the cache TTL cost no network traffic.
pub fn resolve(core: &mut EngineCore, root: ModId, recursive: bool) -> Result<DependencyList> {
    if !root.is_valid() {
        return Err(Error::InvalidModId);
    }

    let max_depth: u32 = if recursive { u32::MAX } else { 1 };
    let mut list = DependencyList::default();
    let mut visited: HashSet<ModId> = HashSet::new();
    let mut queue: VecDeque<(ModId, u32)> = VecDeque::new();

    let root_info = core.fetch_mod(root, true)?;
    visited.insert(root);
    list.push(DependencyNode {
        id: root,
        name: root_info.name,
        depth: 0,
        file: root_info.file,
    });
    queue.push_back((root, 0));

    while let Some((id, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for dep in core.fetch_dependencies(id, true)? {
            if !visited.insert(dep.mod_id) {
                continue;
            }
            // The dependency endpoint names the edge; file metadata needs
            // the full snapshot. A mod that has gone missing server-side is
            // surfaced with what we know rather than dropped.
            let (name, file) = match core.fetch_mod(dep.mod_id, true) {
                Ok(info) => (info.name, info.file),
                Err(Error::ModNotFound(_)) | Err(Error::Api { status: 404, .. }) => {
                    (dep.name.clone(), None)
                }
                Err(e) => return Err(e),
            };
            list.push(DependencyNode {
                id: dep.mod_id,
                name,
                depth: depth + 1,
                file,
            });
            queue.push_back((dep.mod_id, depth + 1));
        }
    }

    Ok(list)
}
