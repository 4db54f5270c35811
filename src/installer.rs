//! Archive verification and extraction with atomic swap.
//!
//! Downloads land next to the install tree, are SHA-256 verified, extracted
//! into a staging directory, and only then swapped into place. Any existing
//! install is renamed aside first and restored if the swap fails, so the
//! previous content survives a failed install or update byte for byte.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;

/// SHA-256 of a file, lowercase hex.
pub fn calculate_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a downloaded archive against its expected checksum.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let actual = calculate_checksum(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

fn backup_path(install_dir: &Path) -> PathBuf {
    let mut name = install_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".backup");
    install_dir.with_file_name(name)
}

/// Extract a tar.gz archive into `staging_dir`, then swap it into
/// `install_dir`.
///
/// Failure at any point restores the previous install (if one existed) and
/// removes the staging leftovers before returning the error.
pub fn extract_archive(archive: &Path, staging_dir: &Path, install_dir: &Path) -> Result<()> {
    if staging_dir.exists() {
        fs::remove_dir_all(staging_dir)?;
    }
    fs::create_dir_all(staging_dir)?;

    let unpack = || -> Result<()> {
        let tar_gz = File::open(archive)?;
        let tar = GzDecoder::new(tar_gz);
        let mut ar = Archive::new(tar);
        ar.unpack(staging_dir)?;
        Ok(())
    };
    if let Err(e) = unpack() {
        let _ = fs::remove_dir_all(staging_dir);
        return Err(e);
    }

    let backup = backup_path(install_dir);
    if backup.exists() {
        // Stale backup from an earlier crashed swap.
        let _ = fs::remove_dir_all(&backup);
    }

    let had_existing = install_dir.exists();
    if had_existing {
        fs::rename(install_dir, &backup)?;
    } else if let Some(parent) = install_dir.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(staging_dir, install_dir) {
        Ok(()) => {
            if had_existing {
                let _ = fs::remove_dir_all(&backup);
            }
            Ok(())
        }
        Err(e) => {
            if had_existing {
                let _ = fs::rename(&backup, install_dir);
            }
            let _ = fs::remove_dir_all(staging_dir);
            Err(e.into())
        }
    }
}

/// Remove an installed mod's content and its cached archive.
pub fn remove_install(install_dir: &Path, archive: &Path) -> Result<()> {
    if install_dir.exists() {
        fs::remove_dir_all(install_dir)?;
    }
    if archive.exists() {
        fs::remove_file(archive)?;
    }
    Ok(())
}

/// Total size in bytes of a directory tree.
pub fn dir_size(path: &Path) -> u64 {
    fn walk(path: &Path, total: &mut u64) {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                let p = entry.path();
                if p.is_dir() {
                    walk(&p, total);
                } else if let Ok(meta) = entry.metadata() {
                    *total += meta.len();
                }
            }
        }
    }
    let mut total = 0;
    walk(path, &mut total);
    total
}
