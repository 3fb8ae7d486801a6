//! `skirmish`: turn-based fights inside one MUD location.
//!
//! - `position`: relative distances (engaged / reach / range) between everything in the room,
//!   with approach and withdraw cascading onto third parties.
//! - `ledger`: per-turn action budgets and the last action each fighter took.
//! - `rules`: how attacks resolve. Plain d100-vs-threshold, or gear-aware.
//! - `encounter`: turn order, the turn clock, joins and termination.
//! - `room`: the command layer that validates and runs player operations.
//! - `actor`: runs a room on its own task so commands and ticks are serialized.
//!
//! The world itself (health, inventory, message delivery) stays outside. The core
//! talks to it through the traits in `host`; `memory::MemoryWorld` is an in-memory one.

pub mod actor;
pub mod config;
pub mod effects;
pub mod encounter;
pub mod error;
pub mod event;
pub mod gear;
pub mod host;
pub mod ledger;
pub mod memory;
pub mod position;
pub mod rng;
pub mod room;
pub mod rules;

pub use actor::{RoomHandle, TickMode, spawn_room};
pub use config::{CombatConfig, RuleSet};
pub use effects::{EffectBook, EffectDef};
pub use encounter::{Encounter, Phase};
pub use error::CommandError;
pub use event::{EndReason, Event, Who};
pub use host::{Audience, Host, LocationId, ObjectId, ObjectKind, Place};
pub use position::{Distance, PositionGraph};
pub use room::{Command, Reply, Room};
