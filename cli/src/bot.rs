use std::error::Error;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use kyarashi::cache::{LocalCache, MemoryStorage};
use kyarashi::remote::memory::MemoryRemote;
use kyarashi::session;
use kyarashi::store::{GameStateStore, StoreConfig};
use kyarashi_core::{DocumentPatch, Role, TableId};

const DEFAULT_SEED: u64 = 0x6B79_6153;

pub(crate) struct BotRunConfig {
    pub(crate) players: usize,
    pub(crate) edits: usize,
    pub(crate) seed: Option<u64>,
}

/// Scripted participants sharing one table through the in-process document
/// service. Every edit goes through a real store, so the whole
/// repair/merge/gate pipeline runs, then each session's view is compared
/// against the keeper's.
pub(crate) fn run(config: BotRunConfig) -> Result<(), Box<dyn Error>> {
    let participants = config.players.max(1);
    let seed = config.seed.unwrap_or(DEFAULT_SEED);
    let mut rng = StdRng::seed_from_u64(seed);

    let remote = MemoryRemote::new();
    let table = TableId::parse(&session::generate_table_code())?;
    println!("simulating {participants} participant(s) on table {table} (seed {seed})");

    let mut stores = Vec::with_capacity(participants);
    for index in 0..participants {
        let (name, role) = if index == 0 {
            ("keeper".to_string(), Role::Keeper)
        } else {
            (format!("player-{index}"), Role::Player)
        };
        let cache = LocalCache::new(Rc::new(MemoryStorage::new()));
        let store = GameStateStore::new(
            Rc::new(remote.clone()),
            cache,
            StoreConfig::new(table.clone(), &name, role),
        );
        store.connect();
        stores.push(store);
    }

    for edit in 0..config.edits {
        let actor = &stores[rng.gen_range(0..stores.len())];
        match rng.gen_range(0..3) {
            0 => {
                let mut safety = actor.document().safety;
                let slot = rng.gen_range(0..8u32);
                let current = safety.lines.get(&slot).copied().unwrap_or(false);
                safety.lines.insert(slot, !current);
                actor.mutate(DocumentPatch::safety(safety))?;
            }
            1 => {
                let mut mysteries = actor.document().mysteries;
                let key = format!("mystery-{}", rng.gen_range(0..4u32));
                mysteries.insert(key, json!({ "edit": edit }));
                actor.mutate(DocumentPatch::mysteries(mysteries))?;
            }
            _ => {
                let mut players = actor.document().players;
                let own_id = actor.self_participant_id().to_string();
                if let Some(own) = players.iter_mut().find(|player| player.id == own_id) {
                    let mut sheet = own.sheet.take().unwrap_or_default();
                    sheet.insert("hp".to_string(), json!(rng.gen_range(1..12)));
                    own.sheet = Some(sheet);
                }
                actor.mutate(DocumentPatch::players(players))?;
            }
        }
    }

    let reference = stores[0].document();
    for (index, store) in stores.iter().enumerate().skip(1) {
        if store.document() != reference {
            return Err(format!("participant {index} diverged from the keeper's view").into());
        }
    }
    println!(
        "converged: {} player(s), {} mystery key(s) after {} edit(s)",
        reference.players.len(),
        reference.mysteries.len(),
        config.edits
    );
    for store in &stores {
        store.shutdown();
    }
    Ok(())
}
