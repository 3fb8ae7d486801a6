//! Capabilities the surrounding world hands to the encounter core.
//!
//! The core never owns health, inventory or message delivery. It asks the
//! host through these narrow traits and emits semantic [`Event`]s back.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::{Event, Who};
use crate::gear::Loadout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(pub u64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Character,
    Item,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attr {
    Health,
    Resource,
}

/// Who an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Audience {
    One(ObjectId),
    Location(LocationId),
}

/// Where an object lives: on the floor of a location, or carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Place {
    Location(LocationId),
    HeldBy(ObjectId),
}

pub trait MessageSink {
    fn notify(&mut self, to: Audience, event: Event);
}

pub trait Attributes {
    fn get(&self, obj: ObjectId, attr: Attr) -> Option<i32>;
    fn set(&mut self, obj: ObjectId, attr: Attr, value: i32);
    fn max(&self, obj: ObjectId, attr: Attr) -> Option<i32>;
}

pub trait Locale {
    fn name(&self, obj: ObjectId) -> String;
    fn kind(&self, obj: ObjectId) -> Option<ObjectKind>;
    fn place_of(&self, obj: ObjectId) -> Option<Place>;
    /// Objects lying in `loc` (not the ones carried by its occupants).
    fn contents(&self, loc: LocationId) -> Vec<ObjectId>;
    fn find_location(&self, key: &str) -> Option<LocationId>;
    /// Returns false when the host refused the move.
    fn move_object(&mut self, obj: ObjectId, to: Place) -> bool;
    fn spawn(&mut self, prototype: &str, at: LocationId) -> Option<ObjectId>;
    fn loadout(&self, obj: ObjectId) -> Loadout;
    fn knows_effect(&self, obj: ObjectId, effect: &str) -> bool;
}

/// Everything the core needs from its collaborator layer.
pub trait Host: MessageSink + Attributes + Locale {}

impl<T: MessageSink + Attributes + Locale + ?Sized> Host for T {}

pub(crate) fn health<H: Attributes + ?Sized>(host: &H, obj: ObjectId) -> i32 {
    host.get(obj, Attr::Health).unwrap_or(0)
}

pub(crate) fn is_alive<H: Attributes + ?Sized>(host: &H, obj: ObjectId) -> bool {
    health(host, obj) > 0
}

pub(crate) fn who<H: Locale + ?Sized>(host: &H, obj: ObjectId) -> Who {
    Who {
        id: obj,
        name: host.name(obj),
    }
}

/// Applies damage through the attribute capability; health never drops below 0.
pub(crate) fn wound<H: Attributes + ?Sized>(host: &mut H, obj: ObjectId, dmg: i32) -> i32 {
    let hp = health(host, obj);
    let next = hp.saturating_sub(dmg.max(0)).max(0);
    host.set(obj, Attr::Health, next);
    next
}

/// Heals up to the object's maximum. Returns the amount actually restored.
pub(crate) fn mend<H: Attributes + ?Sized>(host: &mut H, obj: ObjectId, amount: i32) -> i32 {
    let hp = health(host, obj);
    let cap = host.max(obj, Attr::Health).unwrap_or(hp);
    let next = hp.saturating_add(amount.max(0)).min(cap).max(hp);
    host.set(obj, Attr::Health, next);
    next - hp
}
