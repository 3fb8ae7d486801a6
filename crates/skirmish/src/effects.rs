//! Castable effects: spells, prayers, gadgets.
//!
//! An effect is data: a resource cost, a target rule, whether it works in and
//! out of a fight, and one effect function. Casting validates everything up
//! front, then runs the function, then charges the cost.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CommandError;
use crate::event::Event;
use crate::host::{self, Attr, Audience, Host, LocationId, ObjectId, ObjectKind, Place};
use crate::rng::Rng64;
use crate::rules::{AttackKind, AttackOutcome, CombatRules};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    None,
    SelfOnly,
    AnyObject,
    AnyCharacter,
    Others,
}

fn one() -> usize {
    1
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRule {
    pub kind: TargetKind,
    #[serde(default = "one")]
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectFn {
    Damage {
        min: i32,
        max: i32,
        #[serde(default)]
        accuracy: i32,
    },
    Heal {
        min: i32,
        max: i32,
    },
    Create {
        prototype: String,
        #[serde(default = "one")]
        count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectDef {
    pub name: String,
    #[serde(default)]
    pub cost: i32,
    pub target: TargetRule,
    #[serde(default = "yes")]
    pub in_combat: bool,
    #[serde(default = "yes")]
    pub out_of_combat: bool,
    pub effect: EffectFn,
}

#[derive(Debug, Clone, Default)]
pub struct EffectBook {
    defs: HashMap<String, EffectDef>,
}

impl EffectBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON array of effect definitions.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        let defs: Vec<EffectDef> = serde_json::from_str(s)?;
        let mut book = Self::new();
        for d in defs {
            book.insert(d);
        }
        Ok(book)
    }

    pub fn insert(&mut self, def: EffectDef) {
        let k = def.name.trim().to_ascii_lowercase();
        if k.is_empty() {
            return;
        }
        self.defs.insert(k, def);
    }

    pub fn get(&self, name: &str) -> Option<&EffectDef> {
        self.defs.get(&name.trim().to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// What a successful cast touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastOutcome {
    pub targets: Vec<ObjectId>,
    pub hits: Vec<(ObjectId, AttackOutcome)>,
    pub created: Vec<ObjectId>,
}

impl EffectDef {
    /// Runs every check in order and returns the resolved target list.
    pub(crate) fn validate<H: Host + ?Sized>(
        &self,
        host: &H,
        caster: ObjectId,
        location: LocationId,
        in_combat: bool,
        targets: &[ObjectId],
    ) -> Result<Vec<ObjectId>, CommandError> {
        let have = host.get(caster, Attr::Resource).unwrap_or(0);
        if have < self.cost {
            return Err(CommandError::InsufficientResource {
                need: self.cost,
                have,
            });
        }

        if in_combat && !self.in_combat {
            return Err(CommandError::NotInCombatUse);
        }
        if !in_combat && !self.out_of_combat {
            return Err(CommandError::CombatOnly);
        }

        let mut resolved = targets.to_vec();
        match self.target.kind {
            TargetKind::None if !resolved.is_empty() => {
                return Err(CommandError::TargetsNotAllowed);
            }
            TargetKind::None => {}
            TargetKind::SelfOnly if resolved.is_empty() => resolved.push(caster),
            _ if resolved.is_empty() => return Err(CommandError::TargetRequired),
            _ => {}
        }
        if resolved.len() > self.target.max.max(1) {
            return Err(CommandError::TooManyTargets {
                max: self.target.max.max(1),
            });
        }

        let here = |id: ObjectId| match host.place_of(id) {
            Some(Place::Location(l)) => l == location,
            Some(Place::HeldBy(h)) => h == caster,
            None => false,
        };
        for &t in &resolved {
            match self.target.kind {
                TargetKind::None => {}
                TargetKind::SelfOnly => {
                    if t != caster {
                        return Err(CommandError::InvalidTarget(t));
                    }
                }
                TargetKind::AnyObject => {
                    if !here(t) {
                        return Err(CommandError::UnknownTarget(t));
                    }
                }
                TargetKind::AnyCharacter | TargetKind::Others => {
                    if !here(t) {
                        return Err(CommandError::UnknownTarget(t));
                    }
                    if host.kind(t) != Some(ObjectKind::Character) {
                        return Err(CommandError::InvalidTarget(t));
                    }
                    if self.target.kind == TargetKind::Others && t == caster {
                        return Err(CommandError::SelfTarget);
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        for &t in &resolved {
            if !seen.insert(t) {
                return Err(CommandError::DuplicateTarget(t));
            }
        }

        Ok(resolved)
    }

    /// Applies the effect to already-validated targets, then charges the cost.
    pub(crate) fn invoke<H: Host + ?Sized>(
        &self,
        host: &mut H,
        rules: &dyn CombatRules,
        rng: &mut Rng64,
        caster: ObjectId,
        location: LocationId,
        targets: Vec<ObjectId>,
    ) -> CastOutcome {
        let room = Audience::Location(location);
        let caster_who = host::who(host, caster);
        let cast = Event::Cast {
            caster: caster_who.clone(),
            effect: self.name.clone(),
            targets: targets.iter().map(|t| host::who(&*host, *t)).collect(),
        };
        host.notify(room, cast);

        let mut out = CastOutcome::default();
        match &self.effect {
            EffectFn::Damage { min, max, accuracy } => {
                let att = host.loadout(caster);
                for &t in &targets {
                    let def = host.loadout(t);
                    let roll = rules.attack_roll(rng, &att, &def, AttackKind::Effect) + accuracy;
                    let threshold = rules.defense_threshold(&att, &def, AttackKind::Effect);
                    let hit = roll >= threshold;
                    let damage = if hit {
                        rng.roll_range(*min, *max).max(0)
                    } else {
                        0
                    };
                    let outcome = AttackOutcome {
                        roll,
                        threshold,
                        hit,
                        damage,
                    };
                    let was_up = host::is_alive(host, t);
                    let attacked = Event::Attacked {
                        attacker: caster_who.clone(),
                        defender: host::who(host, t),
                        kind: AttackKind::Effect,
                        outcome,
                    };
                    host.notify(room, attacked);
                    if hit && host::wound(host, t, damage) == 0 && was_up {
                        let w = host::who(host, t);
                        host.notify(room, Event::Defeated { who: w });
                    }
                    out.hits.push((t, outcome));
                }
            }
            EffectFn::Heal { min, max } => {
                for &t in &targets {
                    let amount = host::mend(host, t, rng.roll_range(*min, *max));
                    let w = host::who(host, t);
                    host.notify(room, Event::Healed { who: w, amount });
                }
            }
            EffectFn::Create { prototype, count } => {
                for _ in 0..*count {
                    match host.spawn(prototype, location) {
                        Some(id) => {
                            let object = host::who(host, id);
                            host.notify(
                                room,
                                Event::Created {
                                    caster: caster_who.clone(),
                                    object,
                                },
                            );
                            out.created.push(id);
                        }
                        None => {
                            warn!(effect = %self.name, prototype = %prototype, "unknown prototype");
                            host.notify(
                                Audience::One(caster),
                                Event::ConfigProblem(format!(
                                    "{} can't create {prototype:?}: no such prototype",
                                    self.name
                                )),
                            );
                            break;
                        }
                    }
                }
            }
        }

        let have = host.get(caster, Attr::Resource).unwrap_or(0);
        host.set(caster, Attr::Resource, (have - self.cost).max(0));

        out.targets = targets;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r#"[
        {"name": "Bolt", "cost": 5, "target": {"kind": "others", "max": 2},
         "effect": {"kind": "damage", "min": 3, "max": 6, "accuracy": 10}},
        {"name": "mend", "cost": 3, "target": {"kind": "self_only"}, "in_combat": false,
         "effect": {"kind": "heal", "min": 5, "max": 5}},
        {"name": "summon", "target": {"kind": "none"},
         "effect": {"kind": "create", "prototype": "imp", "count": 2}}
    ]"#;

    #[test]
    fn book_parses_and_looks_up_case_insensitively() {
        let book = EffectBook::from_json_str(BOOK).expect("parse");
        assert_eq!(book.len(), 3);
        let bolt = book.get("bolt").expect("bolt");
        assert_eq!(bolt.cost, 5);
        assert_eq!(bolt.target.max, 2);
        assert!(bolt.in_combat && bolt.out_of_combat);

        let mend = book.get(" MEND ").expect("mend");
        assert_eq!(mend.target.max, 1);
        assert!(!mend.in_combat);
        assert_eq!(
            book.get("summon").map(|d| &d.effect),
            Some(&EffectFn::Create {
                prototype: "imp".to_string(),
                count: 2
            })
        );
        assert!(book.get("fireball").is_none());
    }
}
