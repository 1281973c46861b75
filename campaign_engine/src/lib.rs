//! # Campaign Engine
//!
//! The resolution engine built on `campaign_rules`. It owns the single
//! authoritative world snapshot and is the only place where world facts change.
//!
//! ## Core Components
//!
//! - **state**: `GameState`, its mutation API, the condition/effect evaluator, and the seeded RNG stream
//! - **content**: loading and validating content packs into a fresh `GameState`
//! - **dialogue**: walking NPC dialogue graphs
//! - **combat**: the turn-based encounter state machine
//! - **save**: versioned, checksummed save envelopes, migrations, and slot stores
//!
//! ## Design Philosophy
//!
//! - **Single owner**: every entity lives in `GameState` and is referenced elsewhere by id
//! - **All-or-nothing**: mutation bundles are staged on a copy and committed only if every part succeeds
//! - **Reproducible**: all randomness comes from the state's own stream, which is saved with it

pub mod combat;
pub mod config;
pub mod content;
pub mod dialogue;
pub mod error;
pub mod save;
pub mod state;

pub use combat::*;
pub use config::*;
pub use content::*;
pub use dialogue::*;
pub use error::*;
pub use state::*;
