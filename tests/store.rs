use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{json, Map};

use kyarashi::cache::{LocalCache, MemoryStorage, StorageBackend};
use kyarashi::remote::memory::MemoryRemote;
use kyarashi::remote::{ConnectionStatus, RemoteError, RemoteTable};
use kyarashi::store::{GameStateStore, StoreConfig, VersionMismatch};
use kyarashi_core::{
    participant_id, DocumentPatch, GameDocument, Participant, Role, SafetyTools, TableId,
};

fn table() -> TableId {
    TableId::parse("zz99xx01").expect("valid join code")
}

fn store_for(
    remote: &MemoryRemote,
    name: &str,
    role: Role,
    version: &str,
) -> Rc<GameStateStore> {
    let cache = LocalCache::new(Rc::new(MemoryStorage::new()));
    let config = StoreConfig::new(table(), name, role).with_schema_version(version);
    GameStateStore::new(Rc::new(remote.clone()), cache, config)
}

#[test]
fn first_participant_defines_a_missing_document() {
    let remote = MemoryRemote::new();
    let store = store_for(&remote, "Aoi", Role::Keeper, "0.3.0");
    store.connect();

    let document = store.document();
    assert_eq!(document.schema_version, "0.3.0");
    assert_eq!(document.players.len(), 1);
    assert_eq!(document.players[0].id, participant_id("Aoi"));
    assert_eq!(document.players[0].role, Role::Keeper);
    assert_eq!(store.status(), ConnectionStatus::Connected);

    let stored = remote.document(&table()).expect("document was published");
    assert_eq!(stored["documentId"], json!("zz99xx01"));
    assert_eq!(stored["schemaVersion"], json!("0.3.0"));
    assert_eq!(stored["players"].as_array().map(Vec::len), Some(1));
}

#[test]
fn rejoining_the_same_table_is_idempotent() {
    let remote = MemoryRemote::new();
    let first = store_for(&remote, "Aoi", Role::Keeper, "0.3.0");
    first.connect();
    let second = store_for(&remote, "Aoi", Role::Keeper, "0.3.0");
    second.connect();

    assert_eq!(first.document().players.len(), 1);
    assert_eq!(second.document().players.len(), 1);
}

#[test]
fn version_gate_blocks_writes_but_keeps_local_input() {
    let remote = MemoryRemote::new();
    let seeder = store_for(&remote, "Mitsuki", Role::Keeper, "0.3.0");
    seeder.connect();
    seeder.shutdown();

    let store = store_for(&remote, "Aoi", Role::Player, "0.2.0");
    store.connect();
    let before = remote.document(&table()).expect("seeded");

    let result = store.mutate(DocumentPatch::field("weatherDeck", json!({ "drawn": [] })));
    assert_eq!(
        result,
        Err(VersionMismatch {
            local_version: "0.2.0".to_string(),
            remote_version: "0.3.0".to_string(),
        })
    );
    // The user's input is kept locally even though the write was refused.
    assert_eq!(store.document().extra["weatherDeck"], json!({ "drawn": [] }));
    assert_eq!(remote.document(&table()), Some(before));
}

#[test]
fn mutations_before_any_snapshot_are_not_forwarded() {
    let remote = MemoryRemote::new();
    let store = store_for(&remote, "Aoi", Role::Player, "0.3.0");

    let result = store.mutate(DocumentPatch::field("weatherDeck", json!(1)));
    assert_eq!(
        result,
        Err(VersionMismatch {
            local_version: "0.3.0".to_string(),
            remote_version: String::new(),
        })
    );
    assert_eq!(remote.document(&table()), None);
}

#[test]
fn independent_top_level_keys_merge_without_interference() {
    let remote = MemoryRemote::new();
    let keeper = store_for(&remote, "Aoi", Role::Keeper, "0.3.0");
    keeper.connect();
    let player = store_for(&remote, "Haru", Role::Player, "0.3.0");
    player.connect();

    let mut players = keeper.document().players;
    assert_eq!(players.len(), 2);
    players[0].online = false;
    keeper
        .mutate(DocumentPatch::players(players.clone()))
        .expect("keeper write allowed");

    let mut mysteries = Map::new();
    mysteries.insert("manor".to_string(), json!({ "title": "The Manor" }));
    player
        .mutate(DocumentPatch::mysteries(mysteries))
        .expect("player write allowed");

    for store in [&keeper, &player] {
        let document = store.document();
        assert_eq!(document.players, players);
        assert_eq!(document.mysteries["manor"], json!({ "title": "The Manor" }));
    }
}

#[test]
fn collapsed_safety_lists_survive_the_round_trip() {
    let remote = MemoryRemote::new();
    let keeper = store_for(&remote, "Aoi", Role::Keeper, "0.3.0");
    keeper.connect();

    let mut safety = SafetyTools::default();
    safety.lines.insert(1, true);
    safety.lines.insert(3, false);
    keeper
        .mutate(DocumentPatch::safety(safety))
        .expect("write allowed");

    // The store mangled the sparse map into an array on the way through.
    let stored = remote.document(&table()).expect("stored");
    assert_eq!(stored["safety"]["lines"], json!([null, true, null, false]));

    // The subscriber got the map back with no phantom slots.
    let lines = keeper.document().safety.lines;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines.get(&1), Some(&true));
    assert_eq!(lines.get(&3), Some(&false));
    assert!(keeper.last_warnings().is_empty());
}

#[test]
fn malformed_remote_fields_surface_as_warnings() {
    let remote = MemoryRemote::new();
    remote.seed_document(
        &table(),
        json!({
            "documentId": "zz99xx01",
            "schemaVersion": "0.3.0",
            "lastModified": 5,
            "players": [{
                "id": participant_id("Aoi"),
                "name": "Aoi",
                "role": "admin",
                "online": true,
                "sheet": null
            }],
            "mysteries": {},
            "safety": { "lines": {}, "veils": {} },
            "scene": null
        }),
    );
    let store = store_for(&remote, "Aoi", Role::Player, "0.3.0");
    store.connect();

    let warnings = store.last_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "players[0].role");
    assert_eq!(warnings[0].received, "admin");
    assert_eq!(store.document().players[0].role, Role::Player);
}

#[test]
fn cache_seeds_first_paint_before_connect() {
    let remote = MemoryRemote::new();
    let backend = Rc::new(MemoryStorage::new());
    {
        let cache = LocalCache::new(Rc::clone(&backend) as Rc<dyn StorageBackend>);
        let mut document = GameDocument::new("zz99xx01", "0.3.0");
        document.players.push(Participant::new("Aoi", Role::Keeper));
        cache.save(&table(), &document);
    }

    let cache = LocalCache::new(Rc::clone(&backend) as Rc<dyn StorageBackend>);
    let config = StoreConfig::new(table(), "Aoi", Role::Keeper).with_schema_version("0.3.0");
    let store = GameStateStore::new(Rc::new(remote.clone()), cache, config);

    // No subscription yet, but the last-known-good document is available.
    assert_eq!(store.document().players.len(), 1);
    assert_eq!(store.status(), ConnectionStatus::Connecting);
}

#[test]
fn snapshots_are_persisted_to_the_cache() {
    let remote = MemoryRemote::new();
    let backend = Rc::new(MemoryStorage::new());
    let cache = LocalCache::new(Rc::clone(&backend) as Rc<dyn StorageBackend>);
    let config = StoreConfig::new(table(), "Aoi", Role::Keeper).with_schema_version("0.3.0");
    let store = GameStateStore::new(Rc::new(remote.clone()), cache, config);
    store.connect();

    let reloaded = LocalCache::new(Rc::clone(&backend) as Rc<dyn StorageBackend>)
        .load(&table())
        .expect("cache holds the merged document");
    assert_eq!(reloaded.players.len(), 1);
    assert_eq!(reloaded.schema_version, "0.3.0");
}

#[test]
fn session_key_is_stable_per_browser() {
    let remote = MemoryRemote::new();
    let backend = Rc::new(MemoryStorage::new());
    let first = GameStateStore::new(
        Rc::new(remote.clone()),
        LocalCache::new(Rc::clone(&backend) as Rc<dyn StorageBackend>),
        StoreConfig::new(table(), "Aoi", Role::Player).with_schema_version("0.3.0"),
    );
    let key = first.session_key().to_string();
    assert!(!key.is_empty());

    let second = GameStateStore::new(
        Rc::new(remote.clone()),
        LocalCache::new(Rc::clone(&backend) as Rc<dyn StorageBackend>),
        StoreConfig::new(table(), "Aoi", Role::Player).with_schema_version("0.3.0"),
    );
    assert_eq!(second.session_key(), key);
}

#[test]
fn own_role_change_updates_the_local_role_cache() {
    let remote = MemoryRemote::new();
    let store = store_for(&remote, "Aoi", Role::Player, "0.3.0");
    store.connect();
    assert_eq!(store.last_confirmed_role(), None);

    let mut players = store.document().players;
    players[0].role = Role::Keeper;
    store
        .mutate(DocumentPatch::players(players))
        .expect("write allowed");
    assert_eq!(store.last_confirmed_role(), Some(Role::Keeper));

    // Another participant's role change leaves the cached role alone.
    let mut players = store.document().players;
    players.push(Participant::new("Haru", Role::Player));
    store
        .mutate(DocumentPatch::players(players))
        .expect("write allowed");
    assert_eq!(store.last_confirmed_role(), Some(Role::Keeper));
}

#[test]
fn transport_failure_degrades_status() {
    let remote = MemoryRemote::new();
    remote.set_offline(true);
    let store = store_for(&remote, "Aoi", Role::Keeper, "0.3.0");
    store.connect();
    assert_eq!(store.status(), ConnectionStatus::Disconnected);
}

#[test]
fn shutdown_closes_the_subscription_exactly_once() {
    let remote = MemoryRemote::new();
    let store = store_for(&remote, "Aoi", Role::Keeper, "0.3.0");
    store.connect();
    assert_eq!(remote.subscriber_count(&table()), 1);

    store.shutdown();
    assert_eq!(remote.subscriber_count(&table()), 0);
    store.shutdown();
    assert_eq!(remote.subscriber_count(&table()), 0);
}

#[test]
fn join_code_probe_reports_existence_or_fails_hard() {
    let remote = MemoryRemote::new();
    let outcome = Rc::new(RefCell::new(None));
    let on_result = {
        let outcome = Rc::clone(&outcome);
        Rc::new(move |result: Result<bool, RemoteError>| {
            *outcome.borrow_mut() = Some(result);
        })
    };

    remote.check_exists(&table(), on_result.clone());
    assert_eq!(*outcome.borrow(), Some(Ok(false)));

    remote.seed_document(&table(), json!({ "documentId": "zz99xx01" }));
    remote.check_exists(&table(), on_result.clone());
    assert_eq!(*outcome.borrow(), Some(Ok(true)));

    // No answer is "could not verify", never a false "does not exist".
    remote.set_offline(true);
    remote.check_exists(&table(), on_result);
    assert_eq!(*outcome.borrow(), Some(Err(RemoteError::Timeout)));
}

#[test]
fn clearing_the_cache_forgets_the_document() {
    let backend = Rc::new(MemoryStorage::new());
    let cache = LocalCache::new(Rc::clone(&backend) as Rc<dyn StorageBackend>);
    cache.save(&table(), &GameDocument::new("zz99xx01", "0.3.0"));
    assert!(cache.load(&table()).is_some());

    cache.clear(&table());
    assert!(cache.load(&table()).is_none());
}

#[test]
fn subscribers_are_notified_and_dropping_unsubscribes() {
    let remote = MemoryRemote::new();
    let store = store_for(&remote, "Aoi", Role::Keeper, "0.3.0");
    let count = Rc::new(Cell::new(0u32));
    let subscription = store.subscribe({
        let count = Rc::clone(&count);
        Rc::new(move || count.set(count.get() + 1))
    });

    store.connect();
    assert!(count.get() > 0);

    let seen = count.get();
    drop(subscription);
    store
        .mutate(DocumentPatch::field("weatherDeck", json!(1)))
        .expect("write allowed");
    assert_eq!(count.get(), seen);
}
