//! Engine core and public facade.
//!
//! [`EngineCore`] owns every piece of shared state the operations touch:
//! session, transport, cache, collection, temp set, and the single progress
//! slot. [`Engine`] wraps the core together with the scheduler and exposes
//! the caller-facing API. All work is cooperative; nothing happens between
//! [`Engine::pump`] calls.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::filter::ModFilter;
use crate::id::{GameId, ModId};
use crate::installer;
use crate::lifecycle::{ModCollectionEntry, ModManagementEvent};
use crate::ops::Operation;
use crate::paths::{LocalPaths, MediaVariant, PathResolver};
use crate::resolver::{self, DependencyList};
use crate::scheduler::{CompletionCallback, TaskScheduler};
use crate::session::SessionContext;
use crate::tempset::TempModSetManager;
use crate::transport::{HttpTransport, RequestDescriptor, Transport};
use crate::types::{
    decode, ModDependency, ModDependencyList, ModInfo, ModInfoList, ModProgressInfo,
    ProgressPhase, Rating, TagOption, TagOptionList,
};
use crate::cache::ResponseCache;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Receives every lifecycle event, success and failure alike.
pub type EventCallback = Box<dyn FnMut(&ModManagementEvent)>;

/// Receives `(level, scope, message)` log lines.
pub type LogCallback = Box<dyn FnMut(LogLevel, &str, &str)>;

/// Shared state handed to operations as they advance. Fields are public
/// within the crate so operations and the resolver work on the state
/// directly instead of through a forest of accessors.
pub struct EngineCore {
    pub config: EngineConfig,
    pub session: SessionContext,
    pub transport: Box<dyn Transport>,
    pub paths: Box<dyn PathResolver>,
    pub cache: ResponseCache,
    pub collection: HashMap<ModId, ModCollectionEntry>,
    pub temp_set: TempModSetManager,
    progress: Option<ModProgressInfo>,
    event_callback: Option<EventCallback>,
    log_callback: Option<LogCallback>,
}

impl EngineCore {
    pub fn new(
        config: EngineConfig,
        session: SessionContext,
        transport: Box<dyn Transport>,
        paths: Box<dyn PathResolver>,
    ) -> Self {
        let cache = ResponseCache::new(config.cache_ttl());
        EngineCore {
            config,
            session,
            transport,
            paths,
            cache,
            collection: HashMap::new(),
            temp_set: TempModSetManager::new(),
            progress: None,
            event_callback: None,
            log_callback: None,
        }
    }

    /// Issue one request through the transport, applying session side
    /// effects: an expired-token response drops the cached token, a
    /// rate-limit response records the window so guards reject follow-up
    /// work until it passes.
    pub fn perform(&mut self, request: &RequestDescriptor) -> Result<Vec<u8>> {
        match self.transport.perform(&self.session, request) {
            Ok(bytes) => Ok(bytes),
            Err(Error::AuthExpired) => {
                self.session.invalidate_token();
                self.log_warning("session", "token rejected by server, re-auth required");
                Err(Error::AuthExpired)
            }
            Err(Error::RateLimited { retry_after }) => {
                self.session.note_rate_limit(retry_after);
                self.log_warning(
                    "session",
                    &format!("rate limited for {:?}", retry_after),
                );
                Err(Error::RateLimited { retry_after })
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch one mod snapshot, consulting the cache first when allowed.
    pub fn fetch_mod(&mut self, id: ModId, allow_cached: bool) -> Result<ModInfo> {
        if !id.is_valid() {
            return Err(Error::InvalidModId);
        }
        if allow_cached {
            if let Some(info) = self.cache.fetch_mod(id) {
                return Ok(info);
            }
        }
        let path = format!("games/{}/mods/{}", self.session.game_id(), id);
        let bytes = match self.perform(&RequestDescriptor::get(path)) {
            Ok(bytes) => bytes,
            Err(Error::Api { status: 404, .. }) => return Err(Error::ModNotFound(id)),
            Err(e) => return Err(e),
        };
        let info: ModInfo = decode(&bytes)?;
        self.cache.add_mod(info.clone());
        Ok(info)
    }

    pub fn fetch_dependencies(
        &mut self,
        id: ModId,
        allow_cached: bool,
    ) -> Result<Vec<ModDependency>> {
        if allow_cached {
            if let Some(deps) = self.cache.fetch_dependencies(id) {
                return Ok(deps);
            }
        }
        let path = format!(
            "games/{}/mods/{}/dependencies",
            self.session.game_id(),
            id
        );
        let bytes = match self.perform(&RequestDescriptor::get(path)) {
            Ok(bytes) => bytes,
            Err(Error::Api { status: 404, .. }) => return Err(Error::ModNotFound(id)),
            Err(e) => return Err(e),
        };
        let list: ModDependencyList = decode(&bytes)?;
        self.cache.add_dependencies(id, list.data.clone());
        Ok(list.data)
    }

    /// Fetch a listing page. Only the unfiltered listing is ever served from
    /// cache; filtered pages always hit the network but still land in the
    /// cache so their mod snapshots become available.
    pub fn fetch_mod_list(&mut self, filter: &ModFilter) -> Result<ModInfoList> {
        let game = self.session.game_id();
        let signature = filter.signature();
        if signature.is_empty() {
            if let Some(list) = self.cache.fetch_mod_list(game, &signature) {
                return Ok(list);
            }
        }
        let path = format!("games/{}/mods", game);
        let req = RequestDescriptor::get(path).with_query(filter.to_query());
        let bytes = self.perform(&req)?;
        let list: ModInfoList = decode(&bytes)?;
        self.cache.add_mod_list(game, signature, list.clone());
        Ok(list)
    }

    pub fn fetch_tags(&mut self) -> Result<Vec<TagOption>> {
        let game = self.session.game_id();
        if let Some(tags) = self.cache.fetch_tags(game) {
            return Ok(tags);
        }
        let path = format!("games/{}/tags", game);
        let bytes = self.perform(&RequestDescriptor::get(path))?;
        let list: TagOptionList = decode(&bytes)?;
        self.cache.add_tags(game, list.data.clone());
        Ok(list.data)
    }

    /// Stream a bulk payload to `dest`, mirroring transfer progress into the
    /// single progress slot.
    pub fn download_file(&mut self, url: &str, dest: &Path) -> Result<u64> {
        let progress = &mut self.progress;
        self.transport.download(
            &self.session,
            url,
            dest,
            &mut |done, total| {
                if let Some(p) = progress.as_mut() {
                    p.bytes_done = done;
                    p.bytes_total = p.bytes_total.max(total);
                }
            },
        )
    }

    pub fn entry_mut(&mut self, id: ModId) -> Result<&mut ModCollectionEntry> {
        self.collection.get_mut(&id).ok_or(Error::ModNotFound(id))
    }

    pub fn is_noop_code(&self, code: u32) -> bool {
        self.config.is_noop_code(code)
    }

    pub fn emit(&mut self, event: ModManagementEvent) {
        if let Some(cb) = self.event_callback.as_mut() {
            cb(&event);
        }
    }

    pub fn log(&mut self, level: LogLevel, scope: &str, message: &str) {
        if let Some(cb) = self.log_callback.as_mut() {
            cb(level, scope, message);
        }
    }

    pub fn log_debug(&mut self, scope: &str, message: &str) {
        self.log(LogLevel::Debug, scope, message);
    }

    pub fn log_info(&mut self, scope: &str, message: &str) {
        self.log(LogLevel::Info, scope, message);
    }

    pub fn log_warning(&mut self, scope: &str, message: &str) {
        self.log(LogLevel::Warning, scope, message);
    }

    pub fn set_progress(&mut self, id: ModId, phase: ProgressPhase, bytes_total: u64) {
        self.progress = Some(ModProgressInfo {
            id,
            phase,
            bytes_done: 0,
            bytes_total,
        });
    }

    pub fn update_progress(&mut self, bytes_done: u64) {
        if let Some(p) = self.progress.as_mut() {
            p.bytes_done = bytes_done.min(p.bytes_total);
        }
    }

    /// Snap the progress bar to complete ahead of the final state change.
    pub fn finish_progress(&mut self) {
        if let Some(p) = self.progress.as_mut() {
            p.bytes_done = p.bytes_total;
        }
    }

    pub fn clear_progress(&mut self) {
        self.progress = None;
    }

    pub fn progress(&self) -> Option<ModProgressInfo> {
        self.progress
    }
}

/// The public entry point: one engine per game session.
pub struct Engine {
    core: EngineCore,
    scheduler: TaskScheduler,
}

impl Engine {
    /// Engine against a live service with the default on-disk layout.
    pub fn new(
        game_id: GameId,
        api_key: &str,
        base_url: &str,
        root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(base_url)?;
        Ok(Self::with_parts(
            EngineConfig::default(),
            SessionContext::new(game_id, api_key),
            Box::new(transport),
            Box::new(LocalPaths::new(root)),
        ))
    }

    /// Assemble an engine from explicit collaborators. This is how tests
    /// substitute a scripted transport or an alternate path layout.
    pub fn with_parts(
        config: EngineConfig,
        session: SessionContext,
        transport: Box<dyn Transport>,
        paths: Box<dyn PathResolver>,
    ) -> Self {
        Engine {
            core: EngineCore::new(config, session, transport, paths),
            scheduler: TaskScheduler::new(),
        }
    }

    pub fn set_event_callback(&mut self, cb: EventCallback) {
        self.core.event_callback = Some(cb);
    }

    pub fn set_log_callback(&mut self, cb: LogCallback) {
        self.core.log_callback = Some(cb);
    }

    pub fn authenticate(&mut self, token: impl Into<String>, expires_at: DateTime<Utc>) {
        self.core.session.authenticate(token, expires_at);
    }

    pub fn is_authenticated(&self) -> bool {
        self.core.session.is_authenticated()
    }

    /// Shut the engine down: cancel queued work and close the session. The
    /// active operation, if any, finishes on subsequent pumps.
    pub fn close(&mut self) {
        self.scheduler.shutdown();
        self.core.session.close();
    }

    // -- scheduling ---------------------------------------------------------

    /// Advance work by one suspension point.
    pub fn pump(&mut self) {
        self.scheduler.pump(&mut self.core);
    }

    pub fn is_busy(&self) -> bool {
        self.scheduler.is_busy()
    }

    pub fn queued_ids(&self) -> Vec<ModId> {
        self.scheduler.queued_ids()
    }

    /// Move a queued operation to the front of the queue.
    pub fn prioritize(&mut self, id: ModId) -> bool {
        self.scheduler.prioritize(id)
    }

    pub fn progress(&self) -> Option<ModProgressInfo> {
        self.core.progress()
    }

    // -- lifecycle operations ----------------------------------------------

    pub fn subscribe(
        &mut self,
        id: ModId,
        include_dependencies: bool,
        on_complete: Option<CompletionCallback>,
    ) {
        self.scheduler
            .enqueue(Operation::subscribe(id, include_dependencies), on_complete);
    }

    pub fn install(&mut self, id: ModId, on_complete: Option<CompletionCallback>) {
        self.scheduler.enqueue(Operation::install(id), on_complete);
    }

    pub fn update(&mut self, id: ModId, on_complete: Option<CompletionCallback>) {
        self.scheduler.enqueue(Operation::update(id), on_complete);
    }

    pub fn uninstall(&mut self, id: ModId, on_complete: Option<CompletionCallback>) {
        self.scheduler.enqueue(Operation::uninstall(id), on_complete);
    }

    pub fn rate(&mut self, id: ModId, rating: Rating, on_complete: Option<CompletionCallback>) {
        self.scheduler.enqueue(Operation::rate(id, rating), on_complete);
    }

    pub fn upload(
        &mut self,
        id: ModId,
        archive: impl Into<PathBuf>,
        on_complete: Option<CompletionCallback>,
    ) {
        self.scheduler
            .enqueue(Operation::upload(id, archive.into()), on_complete);
    }

    // -- queries ------------------------------------------------------------

    pub fn get_mod(&mut self, id: ModId) -> Result<ModInfo> {
        self.core.fetch_mod(id, true)
    }

    pub fn search_mods(&mut self, filter: &ModFilter) -> Result<ModInfoList> {
        self.core.fetch_mod_list(filter)
    }

    pub fn tags(&mut self) -> Result<Vec<TagOption>> {
        self.core.fetch_tags()
    }

    pub fn resolve_dependencies(&mut self, id: ModId, recursive: bool) -> Result<DependencyList> {
        resolver::resolve(&mut self.core, id, recursive)
    }

    // -- collection ---------------------------------------------------------

    pub fn mod_entry(&self, id: ModId) -> Option<&ModCollectionEntry> {
        self.core.collection.get(&id)
    }

    pub fn collection(&self) -> &HashMap<ModId, ModCollectionEntry> {
        &self.core.collection
    }

    /// Register content discovered on disk (shipped with the game, restored
    /// from a backup) as already installed, bypassing the transfer pipeline.
    pub fn register_installed(&mut self, info: ModInfo) {
        let id = info.id;
        let install_path = self.core.paths.install_path(id);
        let size = installer::dir_size(&install_path);
        self.core
            .collection
            .insert(id, ModCollectionEntry::installed(id, info, install_path, size));
    }

    /// Where a media asset for `id` lives on disk.
    pub fn media_path(&self, id: ModId, variant: MediaVariant) -> PathBuf {
        self.core.paths.media_path(id, variant)
    }

    // -- temp mod set -------------------------------------------------------

    pub fn temp_set_init(&mut self, ids: &[ModId]) {
        self.core.temp_set.init(ids);
    }

    pub fn temp_set_add(&mut self, ids: &[ModId]) {
        self.core.temp_set.add(ids);
    }

    pub fn temp_set_remove(&mut self, ids: &[ModId]) {
        self.core.temp_set.remove(ids);
    }

    /// Commit the staged temp set. All-or-nothing: on error the previously
    /// committed set is untouched.
    pub fn temp_set_close(&mut self) -> Result<()> {
        self.core.temp_set.close(&mut self.core.collection)
    }

    pub fn temp_set_query(&self) -> Vec<ModId> {
        self.core.temp_set.query()
    }
}
