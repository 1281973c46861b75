//! Save format versions, schema fingerprints, and migrations between them.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use super::{sha256_hex, SaveError, SaveResult};
use crate::config::SaveVersionPolicy;

/// Version written by this build.
pub const SAVE_FORMAT_VERSION: u32 = 2;

/// Entity shapes of the first format, when flags lived under `global_flags`,
/// dialogue left no transcript and companions had no roster.
const SCHEMA_V1: &str = "game_state@1:timestamp,pc,npcs,factions,locations,quests,creatures,\
creature_instances,items,status_effects,global_flags,clock,rng,difficulty,current_location,\
visited,active_encounter,active_dialogue,spawn_counter,config";

const SCHEMA_V2: &str = "game_state@2:timestamp,pc,npcs,factions,locations,quests,creatures,\
creature_instances,items,status_effects,flags,clock,rng,difficulty,current_location,visited,\
active_encounter,last_encounter,active_dialogue,transcript,party,spawn_counter,config";

/// Rewrites a payload of version `n` into version `n + 1`.
pub type Migration = fn(Value) -> Result<Value, String>;

/// Fingerprint of a schema descriptor.
pub fn schema_hash(descriptor: &str) -> String {
    sha256_hex(descriptor.as_bytes())
}

/// Known format versions and the migration chain linking them.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    current: u32,
    hashes: BTreeMap<u32, String>,
    /// Keyed by the version a migration starts from.
    migrations: BTreeMap<u32, Migration>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl SchemaRegistry {
    /// A registry that knows only `version`.
    pub fn new(version: u32, descriptor: &str) -> Self {
        let mut hashes = BTreeMap::new();
        hashes.insert(version, schema_hash(descriptor));
        Self {
            current: version,
            hashes,
            migrations: BTreeMap::new(),
        }
    }

    /// Every format this build reads.
    pub fn standard() -> Self {
        Self::new(SAVE_FORMAT_VERSION, SCHEMA_V2)
            .with_version(1, SCHEMA_V1)
            .with_migration(1, migrate_v1_to_v2)
    }

    /// Register an older version. Newer versions become current.
    pub fn with_version(mut self, version: u32, descriptor: &str) -> Self {
        self.hashes.insert(version, schema_hash(descriptor));
        self.current = self.current.max(version);
        self
    }

    pub fn with_migration(mut self, from: u32, migration: Migration) -> Self {
        self.migrations.insert(from, migration);
        self
    }

    pub fn current_version(&self) -> u32 {
        self.current
    }

    pub fn current_hash(&self) -> &str {
        self.hashes.get(&self.current).map(String::as_str).unwrap_or_default()
    }

    pub fn hash_of(&self, version: u32) -> Option<&str> {
        self.hashes.get(&version).map(String::as_str)
    }

    /// Whether `(version, hash)` is a format this registry knows.
    pub fn recognizes(&self, version: u32, hash: &str) -> bool {
        self.hashes.get(&version).is_some_and(|known| known == hash)
    }

    /// Bring a payload written as `(version, hash)` up to the current version.
    ///
    /// Fails with [`SaveError::Schema`] when the pair is unknown, newer than
    /// this build, or older with a gap in the migration chain (or when the
    /// policy forbids migrating at all).
    pub fn migrate(
        &self,
        version: u32,
        hash: &str,
        mut payload: Value,
        policy: SaveVersionPolicy,
    ) -> SaveResult<Value> {
        let unknown = || SaveError::Schema {
            version,
            schema_hash: hash.to_string(),
        };
        if !self.recognizes(version, hash) || version > self.current {
            return Err(unknown());
        }
        if version == self.current {
            return Ok(payload);
        }
        if policy == SaveVersionPolicy::Strict {
            return Err(unknown());
        }
        if (version..self.current).any(|from| !self.migrations.contains_key(&from)) {
            return Err(unknown());
        }

        for from in version..self.current {
            if let Some(migration) = self.migrations.get(&from) {
                payload = migration(payload).map_err(|reason| SaveError::Migration { from, reason })?;
                info!(from, to = from + 1, "save migrated");
            }
        }
        Ok(payload)
    }
}

fn migrate_v1_to_v2(payload: Value) -> Result<Value, String> {
    let Value::Object(mut state) = payload else {
        return Err("payload is not an object".to_string());
    };
    let flags = state
        .remove("global_flags")
        .unwrap_or_else(|| Value::Object(Default::default()));
    state.insert("flags".to_string(), flags);
    state
        .entry("transcript")
        .or_insert_with(|| Value::Array(Vec::new()));
    state
        .entry("party")
        .or_insert_with(|| Value::Object(Default::default()));
    Ok(Value::Object(state))
}
