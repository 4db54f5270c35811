//! Shared test fixtures: a scripted transport and wire-payload builders.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use modkit::{
    Engine, EngineConfig, Error, GameId, ModManagementEvent, Result, SessionContext,
    Transport,
};
use modkit::transport::{Method, RequestDescriptor};
use modkit::LocalPaths;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// What a scripted download does when hit.
#[derive(Clone)]
pub enum DownloadScript {
    Payload(Vec<u8>),
    Fail,
}

#[derive(Default)]
pub struct FakeInner {
    responses: HashMap<String, VecDeque<Result<Vec<u8>>>>,
    downloads: HashMap<String, DownloadScript>,
    pub log: Vec<String>,
}

/// Transport that serves pre-scripted responses keyed by `"METHOD path"`.
/// Each scripted response is consumed once; an unscripted request panics so
/// a test never silently swallows unexpected traffic.
#[derive(Clone, Default)]
pub struct FakeTransport {
    pub inner: Rc<RefCell<FakeInner>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, method: &str, path: &str, response: Result<Vec<u8>>) {
        self.inner
            .borrow_mut()
            .responses
            .entry(format!("{} {}", method, path))
            .or_default()
            .push_back(response);
    }

    pub fn script_ok(&self, method: &str, path: &str, body: impl Into<Vec<u8>>) {
        self.script(method, path, Ok(body.into()));
    }

    pub fn script_download(&self, url: &str, script: DownloadScript) {
        self.inner
            .borrow_mut()
            .downloads
            .insert(url.to_string(), script);
    }

    pub fn requests(&self) -> Vec<String> {
        self.inner.borrow().log.clone()
    }
}

fn method_str(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
        Method::Put => "PUT",
        Method::Delete => "DELETE",
    }
}

impl Transport for FakeTransport {
    fn perform(
        &mut self,
        _session: &SessionContext,
        request: &RequestDescriptor,
    ) -> Result<Vec<u8>> {
        let key = format!("{} {}", method_str(request.method), request.path);
        let mut inner = self.inner.borrow_mut();
        inner.log.push(key.clone());
        match inner.responses.get_mut(&key).and_then(|q| q.pop_front()) {
            Some(response) => response,
            None => panic!("unscripted request: {}", key),
        }
    }

    fn download(
        &mut self,
        _session: &SessionContext,
        url: &str,
        dest: &Path,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<u64> {
        let script = {
            let mut inner = self.inner.borrow_mut();
            inner.log.push(format!("DOWNLOAD {}", url));
            inner.downloads.get(url).cloned()
        };
        match script {
            Some(DownloadScript::Payload(bytes)) => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(dest, &bytes)?;
                let len = bytes.len() as u64;
                progress(len, len);
                Ok(len)
            }
            Some(DownloadScript::Fail) => Err(Error::Network("injected download failure".into())),
            None => panic!("unscripted download: {}", url),
        }
    }
}

pub const GAME: i64 = 7;

pub fn engine_with(transport: FakeTransport, root: &Path) -> Engine {
    engine_with_config(transport, root, EngineConfig::default())
}

pub fn engine_with_config(transport: FakeTransport, root: &Path, config: EngineConfig) -> Engine {
    Engine::with_parts(
        config,
        SessionContext::new(GameId::new(GAME), "key"),
        Box::new(transport),
        Box::new(LocalPaths::new(root)),
    )
}

pub fn authenticate(engine: &mut Engine) {
    engine.authenticate("token", chrono::Utc::now() + chrono::TimeDelta::hours(1));
}

/// Pump until the engine goes idle, bounded so a stuck operation fails the
/// test instead of hanging it.
pub fn pump_until_idle(engine: &mut Engine) {
    for _ in 0..100 {
        engine.pump();
        if !engine.is_busy() && engine.queued_ids().is_empty() {
            return;
        }
    }
    panic!("engine did not go idle");
}

/// Collect every lifecycle event the engine emits.
pub fn capture_events(engine: &mut Engine) -> Rc<RefCell<Vec<ModManagementEvent>>> {
    let events: Rc<RefCell<Vec<ModManagementEvent>>> = Rc::default();
    let sink = events.clone();
    engine.set_event_callback(Box::new(move |e| sink.borrow_mut().push(*e)));
    events
}

// -- wire payload builders --------------------------------------------------

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// In-memory tar.gz with the given (relative path, contents) entries.
pub fn archive_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let enc = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(enc);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    tar.into_inner().unwrap().finish().unwrap()
}

pub fn mod_json(id: i64) -> String {
    format!(r#"{{"id": {}, "game_id": {}, "name": "mod-{}"}}"#, id, GAME, id)
}

/// Mod snapshot whose file entry matches `archive` byte for byte.
pub fn mod_json_with_file(id: i64, file_id: i64, url: &str, archive: &[u8]) -> String {
    format!(
        r#"{{
            "id": {id},
            "game_id": {game},
            "name": "mod-{id}",
            "file": {{
                "id": {file_id},
                "filename": "mod-{id}.tar.gz",
                "filesize": {size},
                "filesize_uncompressed": {size},
                "checksum": "{checksum}",
                "download_url": "{url}"
            }}
        }}"#,
        id = id,
        game = GAME,
        file_id = file_id,
        size = archive.len(),
        checksum = sha256_hex(archive),
        url = url,
    )
}

pub fn deps_json(deps: &[(i64, &str)]) -> String {
    let entries: Vec<String> = deps
        .iter()
        .map(|(id, name)| format!(r#"{{"mod_id": {}, "name": "{}"}}"#, id, name))
        .collect();
    format!(r#"{{"data": [{}]}}"#, entries.join(","))
}

pub fn mod_path(id: i64) -> String {
    format!("games/{}/mods/{}", GAME, id)
}

pub fn deps_path(id: i64) -> String {
    format!("games/{}/mods/{}/dependencies", GAME, id)
}

pub fn subscribe_path(id: i64) -> String {
    format!("games/{}/mods/{}/subscribe", GAME, id)
}

pub fn api_error(status: u16, code: u32, message: &str) -> Error {
    Error::Api {
        status,
        code,
        message: message.to_string(),
    }
}
