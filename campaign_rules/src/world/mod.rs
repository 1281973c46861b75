//! World-level content: the clock, the travel graph, factions, and quests.

mod clock;
mod faction;
mod location;
mod quest;

pub use clock::*;
pub use faction::*;
pub use location::*;
pub use quest::*;
