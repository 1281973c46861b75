//! # Campaign Rules
//!
//! The "World Bible" crate - entity shapes, intrinsic mechanics, and the
//! scripting vocabulary (conditions and effects) that content is compiled to.
//! Nothing here knows about the world state container; every cross-entity
//! reference is a typed id resolved by the engine.

pub mod entities;
pub mod error;
pub mod mechanics;
pub mod script;
pub mod world;

pub use entities::*;
pub use error::*;
pub use mechanics::*;
pub use script::*;
pub use world::*;
