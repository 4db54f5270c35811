//! Resumable multipart upload sessions.
//!
//! Resume is always server-verified: every attempt re-lists the open
//! sessions for the target mod and adopts the first `Incomplete` one found.
//! A locally remembered session id is never trusted. The absence of an open
//! session is a recoverable condition (`discover` returns `None`), not a
//! failure; the caller creates a fresh session and proceeds.

use crate::engine::EngineCore;
use crate::error::Result;
use crate::id::ModId;
use crate::transport::{MultipartPayload, RequestDescriptor};
use crate::types::decode;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Incomplete,
    Complete,
}

/// A server-side multipart session. `id` is server-issued and only present
/// once the session exists remotely.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: Option<String>,
    pub status: UploadStatus,
    /// Index of the next chunk the server expects.
    pub next_chunk: u64,
}

#[derive(Debug, Deserialize)]
struct SessionDto {
    id: String,
    status: String,
    #[serde(default)]
    next_chunk: u64,
}

#[derive(Debug, Deserialize)]
struct SessionListDto {
    data: Vec<SessionDto>,
}

impl From<SessionDto> for UploadSession {
    fn from(dto: SessionDto) -> Self {
        let status = if dto.status.eq_ignore_ascii_case("complete") {
            UploadStatus::Complete
        } else {
            UploadStatus::Incomplete
        };
        UploadSession {
            id: Some(dto.id),
            status,
            next_chunk: dto.next_chunk,
        }
    }
}

fn sessions_path(core: &EngineCore, id: ModId) -> String {
    format!(
        "games/{}/mods/{}/files/multipart",
        core.session.game_id(),
        id
    )
}

/// List open sessions for `id` and select the first `Incomplete` one.
/// `None` means a fresh session must be created before uploading.
pub fn discover(core: &mut EngineCore, id: ModId) -> Result<Option<UploadSession>> {
    let req = RequestDescriptor::get(sessions_path(core, id)).authenticated();
    let bytes = core.perform(&req)?;
    let list: SessionListDto = decode(&bytes)?;
    Ok(list
        .data
        .into_iter()
        .map(UploadSession::from)
        .find(|s| s.status == UploadStatus::Incomplete))
}

/// Create a fresh session for a payload of `total_size` bytes.
pub fn create(core: &mut EngineCore, id: ModId, total_size: u64) -> Result<UploadSession> {
    let req = RequestDescriptor::post(sessions_path(core, id))
        .with_form(vec![("filesize".to_string(), total_size.to_string())])
        .authenticated();
    let bytes = core.perform(&req)?;
    let dto: SessionDto = decode(&bytes)?;
    Ok(dto.into())
}

/// Submit one chunk. Chunks are sequential; the session never skips one, and
/// retrying a failed chunk is the caller's responsibility.
pub fn submit_chunk(
    core: &mut EngineCore,
    id: ModId,
    session_id: &str,
    chunk_index: u64,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<()> {
    let req = RequestDescriptor::post(format!("{}/{}", sessions_path(core, id), session_id))
        .with_multipart(MultipartPayload {
            field: "chunk".to_string(),
            file_name: file_name.to_string(),
            bytes,
            text_fields: vec![("chunk_index".to_string(), chunk_index.to_string())],
        })
        .authenticated();
    core.perform(&req)?;
    Ok(())
}

/// Finalize a session once every chunk is in.
pub fn complete(core: &mut EngineCore, id: ModId, session_id: &str) -> Result<()> {
    let req = RequestDescriptor::post(format!(
        "{}/{}/complete",
        sessions_path(core, id),
        session_id
    ))
    .authenticated();
    core.perform(&req)?;
    Ok(())
}
