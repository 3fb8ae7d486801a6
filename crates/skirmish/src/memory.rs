//! An in-memory host: a handful of locations and the objects in them.
//!
//! Used by the scenario runner and tests, and as a reference for what a real
//! world layer has to provide.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::event::Event;
use crate::gear::Loadout;
use crate::host::{
    Attr, Attributes, Audience, LocationId, Locale, MessageSink, ObjectId, ObjectKind, Place,
};

/// One event as it was handed to the sink, with who could see it at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub to: Audience,
    pub recipients: Vec<ObjectId>,
    pub event: Event,
}

/// Template for `spawn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prototype {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: ObjectKind,
    #[serde(default)]
    pub health: i32,
}

fn default_kind() -> ObjectKind {
    ObjectKind::Item
}

#[derive(Debug, Clone)]
struct Obj {
    name: String,
    kind: ObjectKind,
    place: Place,
    health: i32,
    max_health: i32,
    resource: i32,
    max_resource: i32,
    loadout: Loadout,
    known: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryWorld {
    locations: HashMap<String, LocationId>,
    objects: BTreeMap<ObjectId, Obj>,
    prototypes: HashMap<String, Prototype>,
    next_id: u64,
    log: Vec<Delivery>,
    outbox: Option<mpsc::UnboundedSender<Delivery>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors every delivery onto `tx` as well as the local log.
    pub fn with_outbox(mut self, tx: mpsc::UnboundedSender<Delivery>) -> Self {
        self.outbox = Some(tx);
        self
    }

    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_location(&mut self, key: &str) -> LocationId {
        let k = key.trim().to_ascii_lowercase();
        if let Some(id) = self.locations.get(&k) {
            return *id;
        }
        let id = LocationId(self.alloc());
        self.locations.insert(k, id);
        id
    }

    fn insert(&mut self, name: &str, kind: ObjectKind, place: Place, health: i32) -> ObjectId {
        let id = ObjectId(self.alloc());
        self.objects.insert(
            id,
            Obj {
                name: name.to_string(),
                kind,
                place,
                health,
                max_health: health,
                resource: 0,
                max_resource: 0,
                loadout: Loadout::default(),
                known: HashSet::new(),
            },
        );
        id
    }

    pub fn add_character(&mut self, name: &str, at: LocationId, health: i32) -> ObjectId {
        self.insert(name, ObjectKind::Character, Place::Location(at), health)
    }

    pub fn add_item(&mut self, name: &str, place: Place) -> ObjectId {
        self.insert(name, ObjectKind::Item, place, 0)
    }

    pub fn add_exit(&mut self, name: &str, at: LocationId) -> ObjectId {
        self.insert(name, ObjectKind::Exit, Place::Location(at), 0)
    }

    pub fn set_resource(&mut self, id: ObjectId, value: i32) {
        if let Some(o) = self.objects.get_mut(&id) {
            o.resource = value;
            o.max_resource = value;
        }
    }

    pub fn set_loadout(&mut self, id: ObjectId, loadout: Loadout) {
        if let Some(o) = self.objects.get_mut(&id) {
            o.loadout = loadout;
        }
    }

    pub fn teach(&mut self, id: ObjectId, effect: &str) {
        if let Some(o) = self.objects.get_mut(&id) {
            o.known.insert(effect.trim().to_ascii_lowercase());
        }
    }

    pub fn add_prototype(&mut self, key: &str, proto: Prototype) {
        self.prototypes.insert(key.trim().to_ascii_lowercase(), proto);
    }

    pub fn log(&self) -> &[Delivery] {
        &self.log
    }

    /// Rendered text of every event `obj` received, in order.
    pub fn texts_seen_by(&self, obj: ObjectId) -> Vec<String> {
        self.log
            .iter()
            .filter(|d| d.recipients.contains(&obj))
            .map(|d| d.event.to_string())
            .collect()
    }

    fn characters_in(&self, loc: LocationId) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, o)| o.kind == ObjectKind::Character && o.place == Place::Location(loc))
            .map(|(id, _)| *id)
            .collect()
    }
}

impl MessageSink for MemoryWorld {
    fn notify(&mut self, to: Audience, event: Event) {
        let recipients = match to {
            Audience::One(id) => vec![id],
            Audience::Location(loc) => self.characters_in(loc),
        };
        let d = Delivery {
            to,
            recipients,
            event,
        };
        let closed = self
            .outbox
            .as_ref()
            .is_some_and(|tx| tx.send(d.clone()).is_err());
        if closed {
            self.outbox = None;
        }
        self.log.push(d);
    }
}

impl Attributes for MemoryWorld {
    fn get(&self, obj: ObjectId, attr: Attr) -> Option<i32> {
        let o = self.objects.get(&obj)?;
        match (o.kind, attr) {
            (ObjectKind::Character, Attr::Health) => Some(o.health),
            (ObjectKind::Character, Attr::Resource) => Some(o.resource),
            _ => None,
        }
    }

    fn set(&mut self, obj: ObjectId, attr: Attr, value: i32) {
        let Some(o) = self.objects.get_mut(&obj) else {
            return;
        };
        match attr {
            Attr::Health => o.health = value,
            Attr::Resource => o.resource = value,
        }
    }

    fn max(&self, obj: ObjectId, attr: Attr) -> Option<i32> {
        let o = self.objects.get(&obj)?;
        match (o.kind, attr) {
            (ObjectKind::Character, Attr::Health) => Some(o.max_health),
            (ObjectKind::Character, Attr::Resource) => Some(o.max_resource),
            _ => None,
        }
    }
}

impl Locale for MemoryWorld {
    fn name(&self, obj: ObjectId) -> String {
        self.objects
            .get(&obj)
            .map_or_else(|| obj.to_string(), |o| o.name.clone())
    }

    fn kind(&self, obj: ObjectId) -> Option<ObjectKind> {
        self.objects.get(&obj).map(|o| o.kind)
    }

    fn place_of(&self, obj: ObjectId) -> Option<Place> {
        self.objects.get(&obj).map(|o| o.place)
    }

    fn contents(&self, loc: LocationId) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, o)| o.place == Place::Location(loc))
            .map(|(id, _)| *id)
            .collect()
    }

    fn find_location(&self, key: &str) -> Option<LocationId> {
        self.locations.get(&key.trim().to_ascii_lowercase()).copied()
    }

    fn move_object(&mut self, obj: ObjectId, to: Place) -> bool {
        let ok = match to {
            Place::Location(l) => self.locations.values().any(|v| *v == l),
            Place::HeldBy(h) => h != obj && self.objects.contains_key(&h),
        };
        match self.objects.get_mut(&obj) {
            Some(o) if ok && o.kind != ObjectKind::Exit => {
                o.place = to;
                true
            }
            _ => false,
        }
    }

    fn spawn(&mut self, prototype: &str, at: LocationId) -> Option<ObjectId> {
        let p = self
            .prototypes
            .get(&prototype.trim().to_ascii_lowercase())?
            .clone();
        Some(self.insert(&p.name, p.kind, Place::Location(at), p.health))
    }

    fn loadout(&self, obj: ObjectId) -> Loadout {
        self.objects.get(&obj).map(|o| o.loadout).unwrap_or_default()
    }

    fn knows_effect(&self, obj: ObjectId, effect: &str) -> bool {
        self.objects
            .get(&obj)
            .is_some_and(|o| o.known.contains(&effect.trim().to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_broadcast_reaches_characters_present() {
        let mut w = MemoryWorld::new();
        let hall = w.add_location("hall");
        let yard = w.add_location("yard");
        let a = w.add_character("Ayla", hall, 10);
        let b = w.add_character("Bram", yard, 10);

        w.notify(Audience::Location(hall), Event::ConfigProblem("x".into()));
        assert_eq!(w.texts_seen_by(a), vec!["[config] x".to_string()]);
        assert!(w.texts_seen_by(b).is_empty());
    }

    #[test]
    fn moves_and_spawns() {
        let mut w = MemoryWorld::new();
        let hall = w.add_location("Hall");
        let a = w.add_character("Ayla", hall, 10);
        let rope = w.add_item("rope", Place::HeldBy(a));
        let door = w.add_exit("door", hall);

        assert_eq!(w.find_location(" hall "), Some(hall));
        assert!(w.contents(hall).contains(&a));
        assert!(!w.contents(hall).contains(&rope));
        assert!(w.move_object(rope, Place::Location(hall)));
        assert!(w.contents(hall).contains(&rope));
        assert!(!w.move_object(door, Place::HeldBy(a)));
        assert!(!w.move_object(a, Place::HeldBy(a)));

        assert_eq!(w.spawn("imp", hall), None);
        w.add_prototype(
            "imp",
            Prototype {
                name: "an imp".into(),
                kind: ObjectKind::Character,
                health: 5,
            },
        );
        let imp = w.spawn("IMP", hall).expect("spawned");
        assert_eq!(w.get(imp, Attr::Health), Some(5));
        assert_eq!(w.get(rope, Attr::Health), None);
    }
}
