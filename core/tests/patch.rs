use serde_json::{json, Map, Value};

use kyarashi_core::{DocumentPatch, GameDocument, Participant, Role};

fn object(value: Value) -> Map<String, Value> {
    let Value::Object(map) = value else {
        panic!("expected object, got {value}");
    };
    map
}

#[test]
fn patch_replaces_only_the_keys_it_sets() {
    let mut document = GameDocument::new("zz99xx01", "0.3.0");
    document.players = vec![Participant::new("Aoi", Role::Keeper)];
    document
        .mysteries
        .insert("manor".to_string(), json!({ "solved": false }));
    document.safety.lines.insert(2, true);

    let mut mysteries = Map::new();
    mysteries.insert("manor".to_string(), json!({ "solved": true }));
    document.apply_patch(&DocumentPatch::mysteries(mysteries));

    assert_eq!(document.mysteries["manor"], json!({ "solved": true }));
    // Keys the patch never mentioned keep their prior value.
    assert_eq!(document.players.len(), 1);
    assert_eq!(document.safety.lines.get(&2), Some(&true));
    assert_eq!(document.schema_version, "0.3.0");
}

#[test]
fn wire_shape_only_carries_set_keys() {
    let patch = DocumentPatch::players(vec![Participant::new("Haru", Role::Player)]);
    let fields = patch.fields();
    assert_eq!(fields.len(), 1);
    assert!(fields.contains_key("players"));

    let patch = DocumentPatch::field("weatherDeck", json!({ "drawn": [] }));
    let fields = patch.fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields["weatherDeck"], json!({ "drawn": [] }));
}

#[test]
fn empty_patch_is_detectable() {
    assert!(DocumentPatch::default().is_empty());
    assert!(!DocumentPatch::scene(Map::new()).is_empty());
}

#[test]
fn merge_remote_replaces_known_keys_wholesale() {
    let mut local = GameDocument::new("zz99xx01", "0.2.0");
    local.players = vec![Participant::new("Aoi", Role::Keeper)];
    local
        .mysteries
        .insert("manor".to_string(), json!({ "solved": false }));

    let mut remote = GameDocument::new("zz99xx01", "0.3.0");
    remote.last_modified = 41;
    remote.players = vec![
        Participant::new("Aoi", Role::Keeper),
        Participant::new("Haru", Role::Player),
    ];

    local.merge_remote(remote);
    assert_eq!(local.schema_version, "0.3.0");
    assert_eq!(local.last_modified, 41);
    assert_eq!(local.players.len(), 2);
    // The remote snapshot's mysteries key (an empty map) wins wholesale.
    assert!(local.mysteries.is_empty());
}

#[test]
fn merge_remote_keeps_local_only_extra_keys() {
    let mut local = GameDocument::new("zz99xx01", "0.3.0");
    local
        .extra
        .insert("weatherDeck".to_string(), json!({ "drawn": ["storm"] }));

    let mut remote = GameDocument::new("zz99xx01", "0.3.0");
    remote
        .extra
        .insert("handouts".to_string(), json!(["map"]));

    local.merge_remote(remote);
    assert_eq!(local.extra["weatherDeck"], json!({ "drawn": ["storm"] }));
    assert_eq!(local.extra["handouts"], json!(["map"]));
}

#[test]
fn merge_remote_never_clears_the_join_code() {
    let mut local = GameDocument::new("zz99xx01", "0.3.0");
    let remote = GameDocument::new("", "0.3.0");
    local.merge_remote(remote);
    assert_eq!(local.document_id, "zz99xx01");
}

#[test]
fn patch_serialization_matches_document_field_names() {
    let mut sheet = Map::new();
    sheet.insert("occupation".to_string(), json!("doctor"));
    let mut participant = Participant::new("Haru", Role::Player);
    participant.sheet = Some(sheet);
    let fields = DocumentPatch::players(vec![participant]).fields();
    let entry = object(fields["players"][0].clone());
    assert_eq!(entry["name"], json!("Haru"));
    assert_eq!(entry["role"], json!("player"));
    assert_eq!(entry["online"], json!(true));
    assert_eq!(entry["sheet"], json!({ "occupation": "doctor" }));
}
