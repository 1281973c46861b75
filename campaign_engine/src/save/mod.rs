//! Versioned, checksummed save envelopes.
//!
//! A save serializes the whole [`GameState`] to JSON, runs it through a
//! [`SaveCodec`], and stores the encoded bytes as hex next to their SHA-256
//! checksum and the schema fingerprint of the format that wrote them.
//! Loading checks the checksum before anything else, then decodes, migrates
//! older formats forward, and rebuilds derived stats.

mod codec;
mod schema;
mod store;

pub use codec::*;
pub use schema::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use campaign_rules::LocationId;

use crate::config::{EngineConfig, SaveVersionPolicy};
use crate::state::GameState;

/// Failures of the save layer. Schema and corruption problems are never repaired.
#[derive(Debug, Error)]
pub enum SaveError {
    /// No registered format matches, and no migration path reaches the current one.
    #[error("unrecognized save schema '{schema_hash}' (version {version})")]
    Schema { version: u32, schema_hash: String },

    #[error("save is corrupt: checksum {actual} does not match {expected}")]
    CorruptSave { expected: String, actual: String },

    #[error("save payload could not be decoded: {0}")]
    Codec(#[source] io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("save store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("migration from version {from} failed: {reason}")]
    Migration { from: u32, reason: String },
}

pub type SaveResult<T> = Result<T, SaveError>;

/// Metadata key naming the codec that produced the payload.
pub const CODEC_KEY: &str = "codec";

/// The stored form of a world snapshot. Superseded by later saves, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFile {
    pub slot: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Hex of the codec output.
    pub compressed_game_state: String,
    /// SHA-256 of the codec output.
    pub checksum: String,
    pub version: u32,
    pub schema_hash: String,
    /// In-world minutes on the clock when saved.
    #[serde(default)]
    pub playtime: u64,
    pub last_location: LocationId,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub mods: Vec<String>,
}

impl SaveFile {
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_mod(mut self, name: impl Into<String>) -> Self {
        self.mods.push(name.into());
        self
    }

    /// Checksum of the stored payload as it is now.
    pub fn actual_checksum(&self) -> SaveResult<String> {
        Ok(sha256_hex(&self.payload_bytes()?))
    }

    /// True when the payload still matches its recorded checksum.
    pub fn verify(&self) -> SaveResult<()> {
        let actual = self.actual_checksum()?;
        if actual != self.checksum {
            return Err(SaveError::CorruptSave {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    fn payload_bytes(&self) -> SaveResult<Vec<u8>> {
        hex::decode(&self.compressed_game_state).map_err(|e| {
            SaveError::Codec(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
        })
    }

    /// Wrap already-serialized state bytes.
    pub(crate) fn seal(
        slot: u32,
        raw: &[u8],
        version: u32,
        schema_hash: &str,
        codec: &dyn SaveCodec,
        last_location: LocationId,
    ) -> SaveResult<SaveFile> {
        let encoded = codec.encode(raw).map_err(SaveError::Codec)?;
        let mut metadata = BTreeMap::new();
        metadata.insert(CODEC_KEY.to_string(), codec.name().to_string());
        Ok(SaveFile {
            slot,
            metadata,
            checksum: sha256_hex(&encoded),
            compressed_game_state: hex::encode(encoded),
            version,
            schema_hash: schema_hash.to_string(),
            playtime: 0,
            last_location,
            platform: String::new(),
            mods: Vec::new(),
        })
    }
}

/// Snapshot `state` into `slot` with the default codec and current format.
pub fn save(state: &GameState, slot: u32) -> SaveResult<SaveFile> {
    save_with(state, slot, &DeflateCodec::default(), &SchemaRegistry::standard())
}

pub fn save_with(
    state: &GameState,
    slot: u32,
    codec: &dyn SaveCodec,
    registry: &SchemaRegistry,
) -> SaveResult<SaveFile> {
    let raw = serde_json::to_vec(state)?;
    let mut file = SaveFile::seal(
        slot,
        &raw,
        registry.current_version(),
        registry.current_hash(),
        codec,
        state.current_location().clone(),
    )?;
    file.playtime = state.clock().total_minutes();
    file.platform = state.config().platform.clone();
    if !state.timestamp().is_empty() {
        file.metadata
            .insert("timestamp".to_string(), state.timestamp().to_string());
    }
    info!(
        slot,
        version = file.version,
        bytes = raw.len(),
        stored = file.compressed_game_state.len() / 2,
        "game saved"
    );
    Ok(file)
}

/// Rebuild the world from `file` under the default configuration, which
/// migrates older formats forward.
pub fn load(file: &SaveFile) -> SaveResult<GameState> {
    load_with_config(file, &EngineConfig::default())
}

/// Rebuild the world from `file`, gated by the host's `save_version_policy`.
pub fn load_with_config(file: &SaveFile, config: &EngineConfig) -> SaveResult<GameState> {
    load_with(
        file,
        &DeflateCodec::default(),
        &SchemaRegistry::standard(),
        config.save_version_policy,
    )
}

pub fn load_with(
    file: &SaveFile,
    codec: &dyn SaveCodec,
    registry: &SchemaRegistry,
    policy: SaveVersionPolicy,
) -> SaveResult<GameState> {
    if let Err(err) = file.verify() {
        warn!(slot = file.slot, error = %err, "save rejected");
        return Err(err);
    }
    if let Some(name) = file.metadata.get(CODEC_KEY) {
        if name != codec.name() {
            return Err(SaveError::Codec(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload was written by '{name}', not '{}'", codec.name()),
            )));
        }
    }

    let raw = codec.decode(&file.payload_bytes()?).map_err(SaveError::Codec)?;
    let payload: serde_json::Value = serde_json::from_slice(&raw)?;
    let payload = registry.migrate(file.version, &file.schema_hash, payload, policy)?;
    let mut state: GameState = serde_json::from_value(payload)?;
    state.recompute_all();
    info!(slot = file.slot, version = file.version, "game loaded");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::seed;
    use campaign_rules::{Effect, RollMode, Skill, StatusEffectId, TargetRef};

    fn played_state() -> GameState {
        let mut state = seed::starter_state(42).unwrap();
        state
            .travel_to(&LocationId::new("whisperwood").unwrap())
            .unwrap();
        state
            .apply_quest_effect(&[Effect::ApplyStatusEffect {
                target: TargetRef::Player,
                effect_id: StatusEffectId::new("inspired").unwrap(),
            }])
            .unwrap();
        state.roll_skill_check(Skill::Stealth, 12, RollMode::Normal);
        state
    }

    #[test]
    fn test_round_trip_restores_everything() {
        let state = played_state();
        let file = save(&state, 1).unwrap();

        assert_eq!(file.last_location.as_str(), "whisperwood");
        assert_eq!(file.version, SAVE_FORMAT_VERSION);
        assert_eq!(file.metadata.get(CODEC_KEY).map(String::as_str), Some("zlib"));

        let restored = load(&file).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.rng().word_pos(), state.rng().word_pos());
    }

    #[test]
    fn test_restored_stream_continues_identically() {
        let mut state = played_state();
        let mut restored = load(&save(&state, 1).unwrap()).unwrap();

        for _ in 0..10 {
            assert_eq!(
                state.roll_skill_check(Skill::Survival, 10, RollMode::Normal),
                restored.roll_skill_check(Skill::Survival, 10, RollMode::Normal),
            );
        }
    }

    #[test]
    fn test_tampered_payload_is_corrupt() {
        let mut file = save(&played_state(), 1).unwrap();
        let mut bytes = hex::decode(&file.compressed_game_state).unwrap();
        bytes[10] ^= 0xff;
        file.compressed_game_state = hex::encode(bytes);

        assert!(matches!(load(&file), Err(SaveError::CorruptSave { .. })));
    }

    #[test]
    fn test_unknown_schema_is_not_corruption() {
        let mut file = save(&played_state(), 1).unwrap();
        file.schema_hash = "0".repeat(64);
        assert!(matches!(load(&file), Err(SaveError::Schema { .. })));
    }

    #[test]
    fn test_v1_save_is_migrated() {
        let state = played_state();
        let mut payload = serde_json::to_value(&state).unwrap();
        let object = payload.as_object_mut().unwrap();
        let flags = object.remove("flags").unwrap();
        object.insert("global_flags".to_string(), flags);
        object.remove("transcript");
        object.remove("last_encounter");
        let raw = serde_json::to_vec(&payload).unwrap();

        let registry = SchemaRegistry::standard();
        let v1_hash = registry.hash_of(1).unwrap().to_string();
        let file = SaveFile::seal(
            3,
            &raw,
            1,
            &v1_hash,
            &DeflateCodec::default(),
            state.current_location().clone(),
        )
        .unwrap();

        let restored = load(&file).unwrap();
        assert_eq!(restored.flags(), state.flags());
        assert_eq!(restored, state);

        let strict = load_with(&file, &DeflateCodec::default(), &registry, SaveVersionPolicy::Strict);
        assert!(matches!(strict, Err(SaveError::Schema { version: 1, .. })));

        let config = EngineConfig::from_toml_str("save_version_policy = \"strict\"").unwrap();
        assert!(matches!(
            load_with_config(&file, &config),
            Err(SaveError::Schema { version: 1, .. })
        ));
        assert!(load_with_config(&file, &EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_codec_mismatch_is_reported() {
        let file = save_with(&played_state(), 1, &PlainCodec, &SchemaRegistry::standard()).unwrap();
        assert!(matches!(load(&file), Err(SaveError::Codec(_))));

        let restored = load_with(
            &file,
            &PlainCodec,
            &SchemaRegistry::standard(),
            SaveVersionPolicy::Migrate,
        )
        .unwrap();
        assert_eq!(restored.current_location().as_str(), "whisperwood");
    }
}
