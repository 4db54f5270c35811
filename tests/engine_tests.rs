mod common;

use common::*;
use modkit::{Error, ErrorKind, EventType, ModFilter, ModId, ModState, ProgressPhase, Rating};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_install_downloads_verifies_and_extracts() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let archive = archive_bytes(&[("mod.json", "{}"), ("data/level.bin", "xxxx")]);
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, 900, "https://cdn.example/900", &archive),
    );
    transport.script_download("https://cdn.example/900", DownloadScript::Payload(archive));

    let mut engine = engine_with(transport.clone(), dir.path());
    let events = capture_events(&mut engine);

    engine.install(ModId::new(42), None);
    pump_until_idle(&mut engine);

    let entry = engine.mod_entry(ModId::new(42)).unwrap();
    assert_eq!(entry.state, ModState::Installed);
    assert!(entry.install_path.as_ref().unwrap().join("mod.json").exists());
    assert_eq!(entry.size_on_disk, Some(6));

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event, EventType::BeginInstall);
    assert_eq!(events[1].event, EventType::Installed);
    assert!(events[1].error.is_none());

    assert!(engine.progress().is_none());
}

#[test]
fn test_single_transfer_owns_progress_slot() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let archive = archive_bytes(&[("a", "a")]);
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, 900, "https://cdn.example/900", &archive),
    );

    let mut engine = engine_with(transport, dir.path());
    engine.install(ModId::new(42), None);
    engine.install(ModId::new(43), None);

    // One pump starts and advances exactly the first operation.
    engine.pump();
    assert!(engine.is_busy());
    let progress = engine.progress().unwrap();
    assert_eq!(progress.id, ModId::new(42));
    assert_eq!(progress.phase, ProgressPhase::Downloading);
    assert_eq!(progress.bytes_done, 0);
    assert_eq!(engine.queued_ids(), vec![ModId::new(43)]);
}

#[test]
fn test_download_failure_rolls_entry_back() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let archive = archive_bytes(&[("a", "a")]);
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, 900, "https://cdn.example/900", &archive),
    );
    transport.script_download("https://cdn.example/900", DownloadScript::Fail);

    let mut engine = engine_with(transport, dir.path());
    let events = capture_events(&mut engine);
    let outcome: Rc<RefCell<Option<Error>>> = Rc::default();
    let sink = outcome.clone();
    engine.install(
        ModId::new(42),
        Some(Box::new(move |r| {
            *sink.borrow_mut() = r.err();
        })),
    );
    pump_until_idle(&mut engine);

    // Back where it started, not stuck mid-transfer.
    let entry = engine.mod_entry(ModId::new(42)).unwrap();
    assert_eq!(entry.state, ModState::InstallationPending);
    assert!(entry.install_path.is_none());

    let events = events.borrow();
    assert_eq!(events[0].event, EventType::BeginInstall);
    assert_eq!(events[1].event, EventType::Installed);
    assert_eq!(events[1].error, Some(ErrorKind::Network));

    assert!(matches!(
        outcome.borrow().as_ref(),
        Some(Error::Network(_))
    ));
    assert!(engine.progress().is_none());
}

#[test]
fn test_checksum_mismatch_fails_the_transfer() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let archive = archive_bytes(&[("a", "a")]);
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, 900, "https://cdn.example/900", &archive),
    );
    // Serve bytes that do not match the advertised checksum.
    transport.script_download(
        "https://cdn.example/900",
        DownloadScript::Payload(b"tampered".to_vec()),
    );

    let mut engine = engine_with(transport, dir.path());
    let events = capture_events(&mut engine);
    engine.install(ModId::new(42), None);
    pump_until_idle(&mut engine);

    assert_eq!(
        engine.mod_entry(ModId::new(42)).unwrap().state,
        ModState::InstallationPending
    );
    assert_eq!(
        events.borrow().last().unwrap().error,
        Some(ErrorKind::ChecksumMismatch)
    );
}

fn install_version(
    engine: &mut modkit::Engine,
    transport: &FakeTransport,
    file_id: i64,
    contents: &str,
) {
    let url = format!("https://cdn.example/{}", file_id);
    let archive = archive_bytes(&[("content.txt", contents)]);
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, file_id, &url, &archive),
    );
    transport.script_download(&url, DownloadScript::Payload(archive));
    engine.install(ModId::new(42), None);
    pump_until_idle(engine);
    assert_eq!(
        engine.mod_entry(ModId::new(42)).unwrap().state,
        ModState::Installed
    );
}

#[test]
fn test_update_short_circuits_when_already_current() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let mut engine = engine_with(transport.clone(), dir.path());
    install_version(&mut engine, &transport, 900, "v1");

    // Server still reports file 900.
    let archive = archive_bytes(&[("content.txt", "v1")]);
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, 900, "https://cdn.example/900", &archive),
    );
    let events = capture_events(&mut engine);
    engine.update(ModId::new(42), None);
    pump_until_idle(&mut engine);

    assert_eq!(
        engine.mod_entry(ModId::new(42)).unwrap().state,
        ModState::Installed
    );
    // No transfer happened: no events, exactly one download overall.
    assert!(events.borrow().is_empty());
    let downloads = transport
        .requests()
        .iter()
        .filter(|r| r.starts_with("DOWNLOAD"))
        .count();
    assert_eq!(downloads, 1);
}

#[test]
fn test_failed_update_preserves_previous_install() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let mut engine = engine_with(transport.clone(), dir.path());
    install_version(&mut engine, &transport, 900, "v1");

    let archive = archive_bytes(&[("content.txt", "v2")]);
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, 901, "https://cdn.example/901", &archive),
    );
    transport.script_download("https://cdn.example/901", DownloadScript::Fail);

    let events = capture_events(&mut engine);
    engine.update(ModId::new(42), None);
    pump_until_idle(&mut engine);

    let entry = engine.mod_entry(ModId::new(42)).unwrap();
    assert_eq!(entry.state, ModState::Installed);
    let content =
        std::fs::read_to_string(entry.install_path.as_ref().unwrap().join("content.txt")).unwrap();
    assert_eq!(content, "v1");

    let events = events.borrow();
    assert_eq!(events[0].event, EventType::BeginUpdate);
    assert_eq!(events[1].event, EventType::Updated);
    assert!(events[1].error.is_some());
}

#[test]
fn test_successful_update_replaces_content() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let mut engine = engine_with(transport.clone(), dir.path());
    install_version(&mut engine, &transport, 900, "v1");

    let archive = archive_bytes(&[("content.txt", "v2")]);
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, 901, "https://cdn.example/901", &archive),
    );
    transport.script_download("https://cdn.example/901", DownloadScript::Payload(archive));

    engine.update(ModId::new(42), None);
    pump_until_idle(&mut engine);

    let entry = engine.mod_entry(ModId::new(42)).unwrap();
    assert_eq!(entry.state, ModState::Installed);
    assert_eq!(
        entry.info.as_ref().unwrap().file.as_ref().unwrap().id,
        901
    );
    let content =
        std::fs::read_to_string(entry.install_path.as_ref().unwrap().join("content.txt")).unwrap();
    assert_eq!(content, "v2");
}

#[test]
fn test_uninstall_removes_entry_and_files() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let mut engine = engine_with(transport.clone(), dir.path());
    authenticate(&mut engine);
    install_version(&mut engine, &transport, 900, "v1");
    let install_path = engine
        .mod_entry(ModId::new(42))
        .unwrap()
        .install_path
        .clone()
        .unwrap();

    transport.script_ok("DELETE", &subscribe_path(42), "{}");
    let events = capture_events(&mut engine);
    engine.uninstall(ModId::new(42), None);
    pump_until_idle(&mut engine);

    assert!(engine.mod_entry(ModId::new(42)).is_none());
    assert!(!install_path.exists());
    let events = events.borrow();
    assert_eq!(events[0].event, EventType::BeginUninstall);
    assert_eq!(events[1].event, EventType::Uninstalled);
    assert!(events[1].error.is_none());
}

#[test]
fn test_subscribe_chains_into_install() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let archive = archive_bytes(&[("a", "a")]);
    transport.script_ok(
        "POST",
        &subscribe_path(42),
        mod_json_with_file(42, 900, "https://cdn.example/900", &archive),
    );
    transport.script_download("https://cdn.example/900", DownloadScript::Payload(archive));

    let mut engine = engine_with(transport, dir.path());
    authenticate(&mut engine);
    engine.subscribe(ModId::new(42), false, None);
    pump_until_idle(&mut engine);

    assert_eq!(
        engine.mod_entry(ModId::new(42)).unwrap().state,
        ModState::Installed
    );
}

#[test]
fn test_subscribe_with_dependencies_installs_whole_closure() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let a42 = archive_bytes(&[("root", "r")]);
    let a43 = archive_bytes(&[("dep", "d")]);
    transport.script_ok(
        "POST",
        &subscribe_path(42),
        mod_json_with_file(42, 900, "https://cdn.example/900", &a42),
    );
    transport.script_ok("GET", &deps_path(42), deps_json(&[(43, "mod-43")]));
    transport.script_ok(
        "GET",
        &mod_path(43),
        mod_json_with_file(43, 901, "https://cdn.example/901", &a43),
    );
    transport.script_ok("GET", &deps_path(43), deps_json(&[]));
    transport.script_download("https://cdn.example/900", DownloadScript::Payload(a42));
    transport.script_download("https://cdn.example/901", DownloadScript::Payload(a43));

    let mut engine = engine_with(transport.clone(), dir.path());
    authenticate(&mut engine);
    engine.subscribe(ModId::new(42), true, None);
    pump_until_idle(&mut engine);

    assert_eq!(
        engine.mod_entry(ModId::new(42)).unwrap().state,
        ModState::Installed
    );
    assert_eq!(
        engine.mod_entry(ModId::new(43)).unwrap().state,
        ModState::Installed
    );
    // The root transfers before its dependents.
    let requests = transport.requests();
    let first = requests
        .iter()
        .position(|r| r == "DOWNLOAD https://cdn.example/900")
        .unwrap();
    let second = requests
        .iter()
        .position(|r| r == "DOWNLOAD https://cdn.example/901")
        .unwrap();
    assert!(first < second);
}

#[test]
fn test_subscribe_already_subscribed_is_success() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let archive = archive_bytes(&[("a", "a")]);
    transport.script(
        "POST",
        &subscribe_path(42),
        Err(api_error(400, 15004, "already subscribed")),
    );
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, 900, "https://cdn.example/900", &archive),
    );
    transport.script_download("https://cdn.example/900", DownloadScript::Payload(archive));

    let mut engine = engine_with(transport, dir.path());
    authenticate(&mut engine);
    let ok: Rc<RefCell<Option<bool>>> = Rc::default();
    let sink = ok.clone();
    engine.subscribe(
        ModId::new(42),
        false,
        Some(Box::new(move |r| {
            *sink.borrow_mut() = Some(r.is_ok());
        })),
    );
    pump_until_idle(&mut engine);

    assert_eq!(*ok.borrow(), Some(true));
    assert_eq!(
        engine.mod_entry(ModId::new(42)).unwrap().state,
        ModState::Installed
    );
}

#[test]
fn test_rating_already_matching_is_success() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    transport.script(
        "POST",
        &format!("games/{}/mods/42/ratings", GAME),
        Err(api_error(400, 15043, "rating already matches")),
    );

    let mut engine = engine_with(transport, dir.path());
    authenticate(&mut engine);
    let ok: Rc<RefCell<Option<bool>>> = Rc::default();
    let sink = ok.clone();
    engine.rate(
        ModId::new(42),
        Rating::Positive,
        Some(Box::new(move |r| {
            *sink.borrow_mut() = Some(r.is_ok());
        })),
    );
    pump_until_idle(&mut engine);
    assert_eq!(*ok.borrow(), Some(true));
}

#[test]
fn test_unauthenticated_mutation_rejected_before_any_io() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let mut engine = engine_with(transport.clone(), dir.path());

    let outcome: Rc<RefCell<Option<Error>>> = Rc::default();
    let sink = outcome.clone();
    engine.subscribe(
        ModId::new(42),
        false,
        Some(Box::new(move |r| {
            *sink.borrow_mut() = r.err();
        })),
    );
    engine.pump();

    assert!(matches!(
        outcome.borrow().as_ref(),
        Some(Error::NotAuthenticated)
    ));
    assert!(transport.requests().is_empty());
    assert!(!engine.is_busy());
}

#[test]
fn test_invalid_id_rejected_by_guard() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with(FakeTransport::new(), dir.path());
    let outcome: Rc<RefCell<Option<Error>>> = Rc::default();
    let sink = outcome.clone();
    engine.install(
        ModId::INVALID,
        Some(Box::new(move |r| {
            *sink.borrow_mut() = r.err();
        })),
    );
    engine.pump();
    assert!(matches!(
        outcome.borrow().as_ref(),
        Some(Error::InvalidModId)
    ));
}

#[test]
fn test_expired_token_response_invalidates_session() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    transport.script("POST", &subscribe_path(42), Err(Error::AuthExpired));

    let mut engine = engine_with(transport, dir.path());
    authenticate(&mut engine);
    assert!(engine.is_authenticated());

    let outcome: Rc<RefCell<Option<Error>>> = Rc::default();
    let sink = outcome.clone();
    engine.subscribe(
        ModId::new(42),
        false,
        Some(Box::new(move |r| {
            *sink.borrow_mut() = r.err();
        })),
    );
    pump_until_idle(&mut engine);

    assert!(matches!(
        outcome.borrow().as_ref(),
        Some(Error::AuthExpired)
    ));
    // The dead token is dropped so callers re-authenticate instead of
    // retrying with it.
    assert!(!engine.is_authenticated());
}

#[test]
fn test_rate_limit_window_blocks_follow_up_operations() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    transport.script(
        "POST",
        &format!("games/{}/mods/42/ratings", GAME),
        Err(Error::RateLimited {
            retry_after: Duration::from_secs(60),
        }),
    );

    let mut engine = engine_with(transport.clone(), dir.path());
    authenticate(&mut engine);
    engine.rate(ModId::new(42), Rating::Positive, None);
    pump_until_idle(&mut engine);

    // The next operation is rejected by the guard, not by the server.
    let requests_before = transport.requests().len();
    let outcome: Rc<RefCell<Option<Error>>> = Rc::default();
    let sink = outcome.clone();
    engine.rate(
        ModId::new(43),
        Rating::Negative,
        Some(Box::new(move |r| {
            *sink.borrow_mut() = r.err();
        })),
    );
    engine.pump();
    assert!(matches!(
        outcome.borrow().as_ref(),
        Some(Error::RateLimited { .. })
    ));
    assert_eq!(transport.requests().len(), requests_before);
}

#[test]
fn test_resolve_dependency_cycle_terminates() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let a42 = archive_bytes(&[("r", "rr")]);
    let a43 = archive_bytes(&[("d", "ddd")]);
    transport.script_ok(
        "GET",
        &mod_path(42),
        mod_json_with_file(42, 900, "https://cdn.example/900", &a42),
    );
    transport.script_ok(
        "GET",
        &mod_path(43),
        mod_json_with_file(43, 901, "https://cdn.example/901", &a43),
    );
    transport.script_ok("GET", &deps_path(42), deps_json(&[(43, "mod-43")]));
    transport.script_ok("GET", &deps_path(43), deps_json(&[(42, "mod-42")]));

    let mut engine = engine_with(transport, dir.path());
    let list = engine.resolve_dependencies(ModId::new(42), true).unwrap();

    assert_eq!(list.nodes.len(), 2);
    assert_eq!(list.nodes[0].id, ModId::new(42));
    assert_eq!(list.nodes[0].depth, 0);
    assert_eq!(list.nodes[1].id, ModId::new(43));
    assert_eq!(list.nodes[1].depth, 1);
    assert_eq!(list.total_size, (a42.len() + a43.len()) as u64);
}

#[test]
fn test_resolve_non_recursive_stops_at_direct_dependencies() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    transport.script_ok("GET", &mod_path(42), mod_json(42));
    transport.script_ok("GET", &mod_path(43), mod_json(43));
    transport.script_ok("GET", &deps_path(42), deps_json(&[(43, "mod-43")]));

    let mut engine = engine_with(transport.clone(), dir.path());
    let list = engine.resolve_dependencies(ModId::new(42), false).unwrap();

    assert_eq!(list.nodes.len(), 2);
    // Depth 1 was never traversed into.
    assert!(!transport
        .requests()
        .contains(&format!("GET {}", deps_path(43))));
}

#[test]
fn test_resolve_keeps_unknown_dependency_with_edge_name() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    transport.script_ok("GET", &mod_path(42), mod_json(42));
    transport.script_ok("GET", &deps_path(42), deps_json(&[(43, "gone-mod")]));
    transport.script("GET", &mod_path(43), Err(api_error(404, 14000, "not found")));
    transport.script_ok("GET", &deps_path(43), deps_json(&[]));

    let mut engine = engine_with(transport, dir.path());
    let list = engine.resolve_dependencies(ModId::new(42), true).unwrap();

    let node = &list.nodes[1];
    assert_eq!(node.name, "gone-mod");
    assert!(node.file.is_none());
    assert_eq!(list.total_size, 0);
}

#[test]
fn test_get_mod_served_from_cache_within_ttl() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    transport.script_ok("GET", &mod_path(42), mod_json(42));

    let mut engine = engine_with(transport.clone(), dir.path());
    engine.get_mod(ModId::new(42)).unwrap();
    engine.get_mod(ModId::new(42)).unwrap();

    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn test_only_unfiltered_listing_is_cache_served() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let list_json = format!(r#"{{"data": [{}], "total": 1}}"#, mod_json(42));
    transport.script_ok("GET", &format!("games/{}/mods", GAME), list_json.clone());
    transport.script_ok("GET", &format!("games/{}/mods", GAME), list_json.clone());
    transport.script_ok("GET", &format!("games/{}/mods", GAME), list_json);

    let mut engine = engine_with(transport.clone(), dir.path());

    engine.search_mods(&ModFilter::none()).unwrap();
    engine.search_mods(&ModFilter::none()).unwrap();
    assert_eq!(transport.requests().len(), 1);

    let mut filtered = ModFilter::none();
    filtered.limit = Some(10);
    engine.search_mods(&filtered).unwrap();
    engine.search_mods(&filtered).unwrap();
    assert_eq!(transport.requests().len(), 3);
}

#[test]
fn test_prioritize_reorders_pending_installs() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let archive = archive_bytes(&[("a", "a")]);
    transport.script_ok(
        "GET",
        &mod_path(4),
        mod_json_with_file(4, 900, "https://cdn.example/900", &archive),
    );

    let mut engine = engine_with(transport, dir.path());
    for id in [4, 5, 6, 7] {
        engine.install(ModId::new(id), None);
    }
    engine.pump();
    assert!(engine.is_busy());

    assert!(engine.prioritize(ModId::new(7)));
    assert_eq!(
        engine.queued_ids(),
        vec![ModId::new(7), ModId::new(5), ModId::new(6)]
    );
}

#[test]
fn test_temp_set_commit_is_atomic() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with(FakeTransport::new(), dir.path());

    engine.temp_set_init(&[ModId::new(1), ModId::new(2)]);
    assert!(engine.temp_set_query().is_empty());
    engine.temp_set_close().unwrap();
    assert_eq!(engine.temp_set_query(), vec![ModId::new(1), ModId::new(2)]);

    // A bad pending list leaves the committed set untouched.
    engine.temp_set_init(&[ModId::new(3), ModId::INVALID]);
    assert!(engine.temp_set_close().is_err());
    assert_eq!(engine.temp_set_query(), vec![ModId::new(1), ModId::new(2)]);
    assert!(engine.mod_entry(ModId::new(3)).is_none());
}

#[test]
fn test_register_installed_bypasses_transfer_pipeline() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let mut engine = engine_with(transport.clone(), dir.path());

    let info: modkit::ModInfo = serde_json::from_str(&mod_json(42)).unwrap();
    engine.register_installed(info);

    let entry = engine.mod_entry(ModId::new(42)).unwrap();
    assert_eq!(entry.state, ModState::Installed);
    assert!(transport.requests().is_empty());
}

#[test]
fn test_close_cancels_queued_work() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with(FakeTransport::new(), dir.path());
    authenticate(&mut engine);

    let canceled: Rc<RefCell<Option<Error>>> = Rc::default();
    let sink = canceled.clone();
    engine.install(
        ModId::new(42),
        Some(Box::new(move |r| {
            *sink.borrow_mut() = r.err();
        })),
    );
    engine.close();

    assert!(matches!(
        canceled.borrow().as_ref(),
        Some(Error::OperationCanceled)
    ));
    // A closed engine rejects new work at the guard.
    let rejected: Rc<RefCell<Option<Error>>> = Rc::default();
    let sink = rejected.clone();
    engine.install(
        ModId::new(43),
        Some(Box::new(move |r| {
            *sink.borrow_mut() = r.err();
        })),
    );
    engine.pump();
    assert!(matches!(
        rejected.borrow().as_ref(),
        Some(Error::OperationCanceled)
    ));
}
