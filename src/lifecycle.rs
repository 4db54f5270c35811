//! Per-mod lifecycle state machine.
//!
//! Every locally relevant mod owns one [`ModCollectionEntry`], mutated
//! exclusively by the engine's own continuations. Transition methods validate
//! the source state and return [`Error::StateConflict`] otherwise; operations
//! capture the pre-transition state and call [`ModCollectionEntry::revert`]
//! on failure, so an entry never points at a partially written install as if
//! it were valid.

use crate::error::{Error, ErrorKind, Result};
use crate::id::ModId;
use crate::types::ModInfo;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModState {
    SubscriptionPending,
    InstallationPending,
    Downloading,
    Extracting,
    Installed,
    UpdatePending,
    UninstallPending,
}

impl ModState {
    /// Transfer states own the single active slot; nothing else may touch
    /// the entry while one is current.
    pub fn is_transfer(self) -> bool {
        matches!(self, ModState::Downloading | ModState::Extracting)
    }
}

/// Kind of lifecycle transition being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    BeginInstall,
    Installed,
    BeginUpdate,
    Updated,
    BeginUninstall,
    Uninstalled,
}

/// Immutable record broadcast once per transition, success or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModManagementEvent {
    pub id: ModId,
    pub event: EventType,
    pub error: Option<ErrorKind>,
}

impl ModManagementEvent {
    pub fn ok(id: ModId, event: EventType) -> Self {
        ModManagementEvent {
            id,
            event,
            error: None,
        }
    }

    pub fn failed(id: ModId, event: EventType, error: ErrorKind) -> Self {
        ModManagementEvent {
            id,
            event,
            error: Some(error),
        }
    }
}

/// One locally relevant mod: subscribed, installed, or staged in a temp set.
#[derive(Debug, Clone)]
pub struct ModCollectionEntry {
    pub id: ModId,
    pub state: ModState,
    pub info: Option<ModInfo>,
    pub install_path: Option<PathBuf>,
    pub size_on_disk: Option<u64>,
    /// Entry exists only because of the active temp mod set.
    pub temp: bool,
}

impl ModCollectionEntry {
    pub fn new(id: ModId, state: ModState) -> Self {
        ModCollectionEntry {
            id,
            state,
            info: None,
            install_path: None,
            size_on_disk: None,
            temp: false,
        }
    }

    /// A discovered pre-installed mod enters the collection directly as
    /// installed.
    pub fn installed(id: ModId, info: ModInfo, install_path: PathBuf, size: u64) -> Self {
        ModCollectionEntry {
            id,
            state: ModState::Installed,
            info: Some(info),
            install_path: Some(install_path),
            size_on_disk: Some(size),
            temp: false,
        }
    }

    fn conflict(&self, wanted: &str) -> Error {
        Error::StateConflict(format!(
            "mod {} is {:?}, cannot {}",
            self.id, self.state, wanted
        ))
    }

    /// `InstallationPending -> Downloading`.
    pub fn begin_install(&mut self) -> Result<()> {
        if self.state != ModState::InstallationPending {
            return Err(self.conflict("begin install"));
        }
        self.state = ModState::Downloading;
        Ok(())
    }

    /// `Installed -> UpdatePending -> Downloading` collapsed: updates start
    /// their transfer directly from the installed snapshot.
    pub fn begin_update(&mut self) -> Result<()> {
        if !matches!(self.state, ModState::Installed | ModState::UpdatePending) {
            return Err(self.conflict("begin update"));
        }
        self.state = ModState::Downloading;
        Ok(())
    }

    /// `Downloading -> Extracting`.
    pub fn begin_extract(&mut self) -> Result<()> {
        if self.state != ModState::Downloading {
            return Err(self.conflict("begin extraction"));
        }
        self.state = ModState::Extracting;
        Ok(())
    }

    /// `Extracting -> Installed`, refreshing the cached snapshot and
    /// size-on-disk.
    pub fn finish_install(&mut self, info: ModInfo, install_path: PathBuf, size: u64) -> Result<()> {
        if self.state != ModState::Extracting {
            return Err(self.conflict("finish install"));
        }
        self.state = ModState::Installed;
        self.info = Some(info);
        self.install_path = Some(install_path);
        self.size_on_disk = Some(size);
        Ok(())
    }

    /// Any non-transfer state -> `UninstallPending`.
    pub fn begin_uninstall(&mut self) -> Result<()> {
        if self.state.is_transfer() {
            return Err(self.conflict("begin uninstall"));
        }
        self.state = ModState::UninstallPending;
        Ok(())
    }

    /// Roll back to the captured pre-transition state after a failed
    /// transfer. A failed update returns to `Installed`, a failed install to
    /// `InstallationPending`; never to a half-written intermediate.
    pub fn revert(&mut self, prior: ModState) {
        self.state = prior;
    }
}
