//! Wire DTOs and progress reporting types.
//!
//! The engine owns a small set of entity DTOs; field-level mapping beyond
//! these is a transport/codec concern. Decoding failures are normalized to
//! [`Error::InvalidResponse`] so every caller sees one uniform condition.

use crate::error::{Error, Result};
use crate::filter::{CommunityOptions, MaturityOptions, MonetizationOptions};
use crate::id::{GameId, ModId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Metadata snapshot for a single mod as served by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModInfo {
    pub id: ModId,
    pub game_id: GameId,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    /// Unix timestamp of the last profile or file change.
    #[serde(default)]
    pub date_updated: i64,
    /// Primary downloadable file, if the mod has one live.
    #[serde(default)]
    pub file: Option<FileInfo>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub maturity: MaturityOptions,
    #[serde(default)]
    pub community: CommunityOptions,
    #[serde(default)]
    pub monetization: MonetizationOptions,
}

/// A released file belonging to a mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: i64,
    pub filename: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Size of the compressed archive in bytes.
    pub filesize: u64,
    /// Size after extraction in bytes.
    #[serde(default)]
    pub filesize_uncompressed: u64,
    /// SHA-256 of the archive, lowercase hex.
    pub checksum: String,
    pub download_url: String,
}

/// One page of a catalog listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModInfoList {
    pub data: Vec<ModInfo>,
    #[serde(default)]
    pub total: u64,
}

/// A declared dependency edge as served by the dependency endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModDependency {
    pub mod_id: ModId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModDependencyList {
    pub data: Vec<ModDependency>,
}

/// One tag category in the game's tag vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagOption {
    pub name: String,
    #[serde(default)]
    pub tag_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagOptionList {
    pub data: Vec<TagOption>,
}

/// Rating a user can submit for a mod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Positive,
    Negative,
}

impl Rating {
    pub fn wire_value(self) -> i8 {
        match self {
            Rating::Positive => 1,
            Rating::Negative => -1,
        }
    }
}

/// Phase of the currently active transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Downloading,
    Extracting,
    Uploading,
}

/// Snapshot of the single in-flight transfer. At most one exists at a time;
/// readers receive copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModProgressInfo {
    pub id: ModId,
    pub phase: ProgressPhase,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// Error payload shape shared by all endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub message: String,
}

/// Decode a response body, folding any codec failure into the uniform
/// invalid-response condition.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::InvalidResponse(e.to_string()))
}
