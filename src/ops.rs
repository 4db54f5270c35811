//! Lifecycle operation state machines.
//!
//! Each operation is an explicit tagged state advanced by the scheduler one
//! suspension point per pump; every step performs at most one transport
//! interaction. Failure during a transfer rolls the entry back to its
//! pre-transition state before the outcome surfaces, so callers never clean
//! up partial engine state themselves.

use crate::engine::EngineCore;
use crate::error::{Error, Result};
use crate::id::ModId;
use crate::installer;
use crate::lifecycle::{EventType, ModCollectionEntry, ModManagementEvent, ModState};
use crate::resolver;
use crate::transport::RequestDescriptor;
use crate::types::{decode, FileInfo, ModInfo, ProgressPhase, Rating};
use crate::upload;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Result of advancing an operation by one step.
pub enum StepOutcome {
    InProgress,
    Done {
        result: Result<()>,
        /// Operations the completed one spawned (e.g. installs following a
        /// subscription). Enqueued FIFO without completion callbacks; their
        /// outcomes surface through lifecycle events.
        followups: Vec<Operation>,
    },
}

impl StepOutcome {
    fn done_ok() -> Self {
        StepOutcome::Done {
            result: Ok(()),
            followups: Vec::new(),
        }
    }

    fn done_err(e: Error) -> Self {
        StepOutcome::Done {
            result: Err(e),
            followups: Vec::new(),
        }
    }

    fn done_with(followups: Vec<Operation>) -> Self {
        StepOutcome::Done {
            result: Ok(()),
            followups,
        }
    }
}

pub enum Operation {
    Subscribe(SubscribeOp),
    Transfer(TransferOp),
    Uninstall(UninstallOp),
    Rate(RateOp),
    Upload(UploadOp),
}

impl Operation {
    pub fn subscribe(id: ModId, include_dependencies: bool) -> Self {
        Operation::Subscribe(SubscribeOp {
            id,
            include_dependencies,
            stage: SubscribeStage::Submit,
        })
    }

    pub fn install(id: ModId) -> Self {
        Operation::Transfer(TransferOp::new(id, false))
    }

    pub fn update(id: ModId) -> Self {
        Operation::Transfer(TransferOp::new(id, true))
    }

    pub fn uninstall(id: ModId) -> Self {
        Operation::Uninstall(UninstallOp {
            id,
            rollback: None,
            stage: UninstallStage::Unsubscribe,
        })
    }

    pub fn rate(id: ModId, rating: Rating) -> Self {
        Operation::Rate(RateOp { id, rating })
    }

    pub fn upload(id: ModId, archive: PathBuf) -> Self {
        Operation::Upload(UploadOp {
            id,
            archive,
            stage: UploadStage::Discover,
            session_id: None,
            next_chunk: 0,
            total: 0,
            attempts: 0,
        })
    }

    pub fn mod_id(&self) -> ModId {
        match self {
            Operation::Subscribe(op) => op.id,
            Operation::Transfer(op) => op.id,
            Operation::Uninstall(op) => op.id,
            Operation::Rate(op) => op.id,
            Operation::Upload(op) => op.id,
        }
    }

    /// Whether the auth guard applies. Downloads are key-authenticated;
    /// everything that mutates server-side user state needs a token.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Operation::Subscribe(_)
                | Operation::Uninstall(_)
                | Operation::Rate(_)
                | Operation::Upload(_)
        )
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Operation::Subscribe(_) => "subscribe",
            Operation::Transfer(op) if op.update => "update",
            Operation::Transfer(_) => "install",
            Operation::Uninstall(_) => "uninstall",
            Operation::Rate(_) => "rate",
            Operation::Upload(_) => "upload",
        }
    }

    pub fn advance(&mut self, core: &mut EngineCore) -> StepOutcome {
        let result = match self {
            Operation::Subscribe(op) => op.step(core),
            Operation::Transfer(op) => op.step(core),
            Operation::Uninstall(op) => op.step(core),
            Operation::Rate(op) => op.step(core),
            Operation::Upload(op) => op.step(core),
        };
        match result {
            Ok(outcome) => outcome,
            Err(e) => StepOutcome::done_err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscribe
// ---------------------------------------------------------------------------

enum SubscribeStage {
    Submit,
    ResolveDependencies,
}

pub struct SubscribeOp {
    id: ModId,
    include_dependencies: bool,
    stage: SubscribeStage,
}

impl SubscribeOp {
    fn step(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        match self.stage {
            SubscribeStage::Submit => self.submit(core),
            SubscribeStage::ResolveDependencies => self.resolve(core),
        }
    }

    fn submit(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let path = format!(
            "games/{}/mods/{}/subscribe",
            core.session.game_id(),
            self.id
        );
        let req = RequestDescriptor::post(path).authenticated();
        let info: ModInfo = match core.perform(&req) {
            Ok(bytes) => decode(&bytes)?,
            // Already subscribed is a server quirk normalized to success;
            // fall back to the catalog for the snapshot.
            Err(Error::Api { code, .. }) if core.is_noop_code(code) => {
                core.fetch_mod(self.id, true)?
            }
            Err(e) => return Err(e),
        };

        core.cache.add_mod(info.clone());
        let entry = core
            .collection
            .entry(self.id)
            .or_insert_with(|| ModCollectionEntry::new(self.id, ModState::SubscriptionPending));
        if entry.info.is_none() {
            entry.info = Some(info);
        }
        if entry.state == ModState::SubscriptionPending {
            entry.state = ModState::InstallationPending;
        }
        let needs_install = entry.state == ModState::InstallationPending;

        if self.include_dependencies {
            self.stage = SubscribeStage::ResolveDependencies;
            Ok(StepOutcome::InProgress)
        } else if needs_install {
            Ok(StepOutcome::done_with(vec![Operation::install(self.id)]))
        } else {
            Ok(StepOutcome::done_ok())
        }
    }

    fn resolve(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let deps = resolver::resolve(core, self.id, true)?;
        let mut followups = Vec::new();
        // Shallow-first node order from the resolver doubles as install
        // order, so the root lands before anything depending on it.
        for node in &deps.nodes {
            let entry = core
                .collection
                .entry(node.id)
                .or_insert_with(|| ModCollectionEntry::new(node.id, ModState::InstallationPending));
            if entry.state == ModState::SubscriptionPending {
                entry.state = ModState::InstallationPending;
            }
            if entry.state == ModState::InstallationPending {
                followups.push(Operation::install(node.id));
            }
        }
        core.log_info(
            "subscribe",
            &format!(
                "mod {}: {} dependency nodes, {} bytes to transfer",
                self.id,
                deps.nodes.len(),
                deps.total_size
            ),
        );
        Ok(StepOutcome::done_with(followups))
    }
}

// ---------------------------------------------------------------------------
// Install / Update
// ---------------------------------------------------------------------------

enum TransferStage {
    Fetch,
    Download,
    Extract,
}

/// Shared download-verify-extract machine for installs and updates. The two
/// differ only in entry criteria, rollback target, and emitted events.
pub struct TransferOp {
    id: ModId,
    update: bool,
    stage: TransferStage,
    rollback: Option<ModState>,
    info: Option<ModInfo>,
    file: Option<FileInfo>,
}

impl TransferOp {
    fn new(id: ModId, update: bool) -> Self {
        TransferOp {
            id,
            update,
            stage: TransferStage::Fetch,
            rollback: None,
            info: None,
            file: None,
        }
    }

    fn terminal_event(&self) -> EventType {
        if self.update {
            EventType::Updated
        } else {
            EventType::Installed
        }
    }

    fn step(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        match self.stage {
            TransferStage::Fetch => {
                if self.update {
                    self.fetch_for_update(core)
                } else {
                    self.fetch_for_install(core)
                }
            }
            TransferStage::Download => self.download(core),
            TransferStage::Extract => self.extract(core),
        }
    }

    fn fetch_for_install(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        match core.collection.get(&self.id).map(|e| e.state) {
            None => {
                // Direct install without a prior subscription.
                core.collection.insert(
                    self.id,
                    ModCollectionEntry::new(self.id, ModState::InstallationPending),
                );
            }
            Some(ModState::Installed) => return Ok(StepOutcome::done_ok()),
            Some(ModState::InstallationPending) => {}
            Some(state) => {
                return Err(Error::StateConflict(format!(
                    "mod {} is {:?}, cannot install",
                    self.id, state
                )))
            }
        }

        let info = core.fetch_mod(self.id, true)?;
        let file = info.file.clone().ok_or_else(|| {
            Error::InvalidResponse(format!("mod {} has no released file", self.id))
        })?;

        let entry = core.entry_mut(self.id)?;
        self.rollback = Some(entry.state);
        entry.begin_install()?;
        core.emit(ModManagementEvent::ok(self.id, EventType::BeginInstall));
        core.set_progress(self.id, ProgressPhase::Downloading, file.filesize);
        self.info = Some(info);
        self.file = Some(file);
        self.stage = TransferStage::Download;
        Ok(StepOutcome::InProgress)
    }

    fn fetch_for_update(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let entry = core.entry_mut(self.id)?;
        if !matches!(entry.state, ModState::Installed | ModState::UpdatePending) {
            return Err(Error::StateConflict(format!(
                "mod {} is {:?}, cannot update",
                self.id, entry.state
            )));
        }
        let installed_file_id = entry.info.as_ref().and_then(|i| i.file.as_ref()).map(|f| f.id);

        // An update must see the server's current truth.
        core.cache.invalidate_mod(self.id);
        let info = core.fetch_mod(self.id, false)?;
        let file = info.file.clone().ok_or_else(|| {
            Error::InvalidResponse(format!("mod {} has no released file", self.id))
        })?;

        if installed_file_id == Some(file.id) {
            // Already current; refresh the snapshot and finish as success.
            core.entry_mut(self.id)?.info = Some(info);
            core.log_info("update", &format!("mod {} already up to date", self.id));
            return Ok(StepOutcome::done_ok());
        }

        let entry = core.entry_mut(self.id)?;
        self.rollback = Some(ModState::Installed);
        entry.begin_update()?;
        core.emit(ModManagementEvent::ok(self.id, EventType::BeginUpdate));
        core.set_progress(self.id, ProgressPhase::Downloading, file.filesize);
        self.info = Some(info);
        self.file = Some(file);
        self.stage = TransferStage::Download;
        Ok(StepOutcome::InProgress)
    }

    fn download(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let file = self.required_file()?;
        let archive = core.paths.archive_path(self.id);

        let result = core
            .download_file(&file.download_url, &archive)
            .and_then(|_| installer::verify_checksum(&archive, &file.checksum));

        match result {
            Ok(()) => {
                core.entry_mut(self.id)?.begin_extract()?;
                core.set_progress(
                    self.id,
                    ProgressPhase::Extracting,
                    file.filesize_uncompressed.max(file.filesize),
                );
                self.stage = TransferStage::Extract;
                Ok(StepOutcome::InProgress)
            }
            Err(e) => self.fail_transfer(core, e),
        }
    }

    fn extract(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let archive = core.paths.archive_path(self.id);
        let staging = core.paths.staging_path(self.id);
        let install = core.paths.install_path(self.id);

        match installer::extract_archive(&archive, &staging, &install) {
            Ok(()) => {
                let info = self
                    .info
                    .take()
                    .ok_or_else(|| Error::Other("transfer lost mod snapshot".to_string()))?;
                let size = installer::dir_size(&install);
                core.entry_mut(self.id)?.finish_install(info, install, size)?;
                core.finish_progress();
                core.emit(ModManagementEvent::ok(self.id, self.terminal_event()));
                Ok(StepOutcome::done_ok())
            }
            Err(e) => self.fail_transfer(core, e),
        }
    }

    fn required_file(&self) -> Result<FileInfo> {
        self.file
            .clone()
            .ok_or_else(|| Error::Other("transfer lost file metadata".to_string()))
    }

    /// Roll back to the pre-transition state, discard the partial archive,
    /// and report the failure through the event channel exactly once.
    fn fail_transfer(&mut self, core: &mut EngineCore, e: Error) -> Result<StepOutcome> {
        let _ = fs::remove_file(core.paths.archive_path(self.id));
        if let Some(prior) = self.rollback {
            if let Ok(entry) = core.entry_mut(self.id) {
                entry.revert(prior);
            }
        }
        core.emit(ModManagementEvent::failed(
            self.id,
            self.terminal_event(),
            e.kind(),
        ));
        Ok(StepOutcome::done_err(e))
    }
}

// ---------------------------------------------------------------------------
// Uninstall
// ---------------------------------------------------------------------------

enum UninstallStage {
    Unsubscribe,
    RemoveFiles,
}

pub struct UninstallOp {
    id: ModId,
    rollback: Option<ModState>,
    stage: UninstallStage,
}

impl UninstallOp {
    fn step(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        match self.stage {
            UninstallStage::Unsubscribe => self.unsubscribe(core),
            UninstallStage::RemoveFiles => self.remove_files(core),
        }
    }

    fn unsubscribe(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let entry = core.entry_mut(self.id)?;
        self.rollback = Some(entry.state);
        entry.begin_uninstall()?;
        core.emit(ModManagementEvent::ok(self.id, EventType::BeginUninstall));

        let path = format!(
            "games/{}/mods/{}/subscribe",
            core.session.game_id(),
            self.id
        );
        let req = RequestDescriptor::delete(path).authenticated();
        match core.perform(&req) {
            Ok(_) => {}
            // Not subscribed in the first place: nothing to undo remotely.
            Err(Error::Api { code, .. }) if core.is_noop_code(code) => {}
            Err(e) => return self.fail(core, e),
        }
        self.stage = UninstallStage::RemoveFiles;
        Ok(StepOutcome::InProgress)
    }

    fn remove_files(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let install = core.paths.install_path(self.id);
        let archive = core.paths.archive_path(self.id);
        match installer::remove_install(&install, &archive) {
            Ok(()) => {
                core.collection.remove(&self.id);
                core.cache.invalidate_mod(self.id);
                core.emit(ModManagementEvent::ok(self.id, EventType::Uninstalled));
                Ok(StepOutcome::done_ok())
            }
            Err(e) => self.fail(core, e),
        }
    }

    fn fail(&mut self, core: &mut EngineCore, e: Error) -> Result<StepOutcome> {
        if let Some(prior) = self.rollback {
            if let Ok(entry) = core.entry_mut(self.id) {
                entry.revert(prior);
            }
        }
        core.emit(ModManagementEvent::failed(
            self.id,
            EventType::Uninstalled,
            e.kind(),
        ));
        Ok(StepOutcome::done_err(e))
    }
}

// ---------------------------------------------------------------------------
// Rate
// ---------------------------------------------------------------------------

pub struct RateOp {
    id: ModId,
    rating: Rating,
}

impl RateOp {
    fn step(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let path = format!("games/{}/mods/{}/ratings", core.session.game_id(), self.id);
        let req = RequestDescriptor::post(path)
            .with_form(vec![(
                "rating".to_string(),
                self.rating.wire_value().to_string(),
            )])
            .authenticated();
        match core.perform(&req) {
            Ok(_) => {}
            // "Rating already matches" is success, not failure.
            Err(Error::Api { code, .. }) if core.is_noop_code(code) => {}
            Err(e) => return Err(e),
        }
        core.cache.invalidate_mod(self.id);
        Ok(StepOutcome::done_ok())
    }
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

enum UploadStage {
    Discover,
    Create,
    Chunk,
    Complete,
}

pub struct UploadOp {
    id: ModId,
    archive: PathBuf,
    stage: UploadStage,
    session_id: Option<String>,
    next_chunk: u64,
    total: u64,
    attempts: u32,
}

impl UploadOp {
    fn step(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        match self.stage {
            UploadStage::Discover => self.discover(core),
            UploadStage::Create => self.create(core),
            UploadStage::Chunk => self.chunk(core),
            UploadStage::Complete => self.complete(core),
        }
    }

    fn file_name(&self) -> String {
        self.archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.tar.gz".to_string())
    }

    fn discover(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        self.total = fs::metadata(&self.archive)?.len();
        core.set_progress(self.id, ProgressPhase::Uploading, self.total);

        match upload::discover(core, self.id)? {
            Some(session) => {
                core.log_info(
                    "upload",
                    &format!(
                        "mod {}: resuming session at chunk {}",
                        self.id, session.next_chunk
                    ),
                );
                self.session_id = session.id;
                self.next_chunk = session.next_chunk;
                self.stage = UploadStage::Chunk;
            }
            None => {
                self.stage = UploadStage::Create;
            }
        }
        Ok(StepOutcome::InProgress)
    }

    fn create(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let session = upload::create(core, self.id, self.total)?;
        self.session_id = session.id;
        self.next_chunk = session.next_chunk;
        self.stage = UploadStage::Chunk;
        Ok(StepOutcome::InProgress)
    }

    fn chunk(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let chunk_size = core.config.upload_chunk_size;
        let offset = self.next_chunk.saturating_mul(chunk_size);
        if offset >= self.total {
            self.stage = UploadStage::Complete;
            return Ok(StepOutcome::InProgress);
        }

        let session_id = self
            .session_id
            .clone()
            .ok_or_else(|| Error::Other("upload session has no id".to_string()))?;

        let mut file = fs::File::open(&self.archive)?;
        file.seek(SeekFrom::Start(offset))?;
        let len = chunk_size.min(self.total - offset) as usize;
        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)?;

        let file_name = self.file_name();
        match upload::submit_chunk(core, self.id, &session_id, self.next_chunk, &file_name, bytes) {
            Ok(()) => {
                self.attempts = 0;
                self.next_chunk += 1;
                core.update_progress(offset + len as u64);
                if self.next_chunk.saturating_mul(chunk_size) >= self.total {
                    self.stage = UploadStage::Complete;
                }
                Ok(StepOutcome::InProgress)
            }
            Err(e) => {
                self.attempts += 1;
                if self.attempts > core.config.upload_chunk_retries {
                    return Err(e);
                }
                core.log_warning(
                    "upload",
                    &format!(
                        "mod {}: chunk {} failed (attempt {}): {}",
                        self.id, self.next_chunk, self.attempts, e
                    ),
                );
                // Same chunk again on the next pump; never skipped.
                Ok(StepOutcome::InProgress)
            }
        }
    }

    fn complete(&mut self, core: &mut EngineCore) -> Result<StepOutcome> {
        let session_id = self
            .session_id
            .clone()
            .ok_or_else(|| Error::Other("upload session has no id".to_string()))?;
        upload::complete(core, self.id, &session_id)?;
        core.finish_progress();
        // A new file is live; cached metadata for this mod is stale.
        core.cache.invalidate_mod(self.id);
        Ok(StepOutcome::done_ok())
    }
}
