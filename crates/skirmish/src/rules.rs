//! Combat rule strategies.
//!
//! One trait, several rule sets. The rule set is picked when an encounter is
//! created and stays fixed for its lifetime.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::gear::{Loadout, WeaponDef};
use crate::rng::Rng64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    Melee,
    Ranged,
    Effect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttackOutcome {
    pub roll: i32,
    pub threshold: i32,
    pub hit: bool,
    pub damage: i32,
}

pub trait CombatRules: fmt::Debug + Send {
    fn name(&self) -> &'static str;

    fn attack_roll(
        &self,
        rng: &mut Rng64,
        attacker: &Loadout,
        defender: &Loadout,
        kind: AttackKind,
    ) -> i32;

    fn defense_threshold(&self, attacker: &Loadout, defender: &Loadout, kind: AttackKind) -> i32;

    /// Never negative.
    fn damage(&self, rng: &mut Rng64, attacker: &Loadout, defender: &Loadout) -> i32;

    /// Whether `attacker` has anything to make a ranged attack with.
    fn can_shoot(&self, _attacker: &Loadout) -> bool {
        true
    }

    fn resolve(
        &self,
        rng: &mut Rng64,
        attacker: &Loadout,
        defender: &Loadout,
        kind: AttackKind,
    ) -> AttackOutcome {
        let roll = self.attack_roll(rng, attacker, defender, kind);
        let threshold = self.defense_threshold(attacker, defender, kind);
        let hit = roll >= threshold;
        let damage = if hit {
            self.damage(rng, attacker, defender).max(0)
        } else {
            0
        };
        AttackOutcome {
            roll,
            threshold,
            hit,
            damage,
        }
    }
}

/// Modifiers shared by every rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub defense: i32,
    pub melee_bonus: i32,
    pub ranged_penalty: i32,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            defense: 50,
            melee_bonus: 15,
            ranged_penalty: 15,
        }
    }
}

impl Baseline {
    fn d100(&self, rng: &mut Rng64, kind: AttackKind) -> i32 {
        let roll = rng.roll_range(1, 100);
        match kind {
            AttackKind::Melee => roll + self.melee_bonus,
            AttackKind::Ranged => roll - self.ranged_penalty,
            AttackKind::Effect => roll,
        }
    }
}

/// Flat defense, flat damage range; gear is ignored.
#[derive(Debug, Clone)]
pub struct BasicRules {
    pub base: Baseline,
    pub dmg_min: i32,
    pub dmg_max: i32,
}

impl Default for BasicRules {
    fn default() -> Self {
        Self {
            base: Baseline::default(),
            dmg_min: 15,
            dmg_max: 25,
        }
    }
}

impl CombatRules for BasicRules {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn attack_roll(&self, rng: &mut Rng64, _: &Loadout, _: &Loadout, kind: AttackKind) -> i32 {
        self.base.d100(rng, kind)
    }

    fn defense_threshold(&self, _: &Loadout, _: &Loadout, _: AttackKind) -> i32 {
        self.base.defense
    }

    fn damage(&self, rng: &mut Rng64, _: &Loadout, _: &Loadout) -> i32 {
        rng.roll_range(self.dmg_min, self.dmg_max).max(0)
    }
}

/// Weapon accuracy and damage, armor defense and soak.
#[derive(Debug, Clone)]
pub struct GearRules {
    pub base: Baseline,
    pub unarmed: WeaponDef,
}

impl Default for GearRules {
    fn default() -> Self {
        Self {
            base: Baseline::default(),
            unarmed: WeaponDef::UNARMED,
        }
    }
}

impl CombatRules for GearRules {
    fn name(&self) -> &'static str {
        "gear"
    }

    fn attack_roll(
        &self,
        rng: &mut Rng64,
        attacker: &Loadout,
        _: &Loadout,
        kind: AttackKind,
    ) -> i32 {
        let roll = self.base.d100(rng, kind);
        // Effects bring their own accuracy.
        if kind == AttackKind::Effect {
            return roll;
        }
        roll + attacker.weapon_or(self.unarmed).accuracy
    }

    fn defense_threshold(&self, _: &Loadout, defender: &Loadout, _: AttackKind) -> i32 {
        self.base.defense + defender.defense()
    }

    fn damage(&self, rng: &mut Rng64, attacker: &Loadout, defender: &Loadout) -> i32 {
        let w = attacker.weapon_or(self.unarmed);
        let raw = rng.roll_range(w.dmg_min, w.dmg_max);
        (raw - defender.reduction()).max(0)
    }

    fn can_shoot(&self, attacker: &Loadout) -> bool {
        attacker.weapon_or(self.unarmed).ranged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gear::ArmorDef;

    fn sword() -> Loadout {
        Loadout {
            weapon: Some(WeaponDef {
                accuracy: 10,
                dmg_min: 4,
                dmg_max: 8,
                ranged: false,
            }),
            armor: None,
        }
    }

    fn plate() -> Loadout {
        Loadout {
            weapon: None,
            armor: Some(ArmorDef {
                defense: 20,
                reduction: 5,
            }),
        }
    }

    #[test]
    fn basic_roll_modifiers_by_kind() {
        let rules = BasicRules::default();
        let none = Loadout::default();
        for seed in 1..200 {
            let mut rng = Rng64::from_seed(seed);
            let melee = rules.attack_roll(&mut rng, &none, &none, AttackKind::Melee);
            assert!((16..=115).contains(&melee));
            let ranged = rules.attack_roll(&mut rng, &none, &none, AttackKind::Ranged);
            assert!((-14..=85).contains(&ranged));
        }
        assert_eq!(
            rules.defense_threshold(&none, &none, AttackKind::Melee),
            50
        );
    }

    #[test]
    fn basic_resolve_hits_iff_roll_meets_threshold() {
        let rules = BasicRules::default();
        let none = Loadout::default();
        let mut rng = Rng64::from_seed(5);
        for _ in 0..500 {
            let o = rules.resolve(&mut rng, &none, &none, AttackKind::Melee);
            assert_eq!(o.hit, o.roll >= o.threshold);
            if o.hit {
                assert!((15..=25).contains(&o.damage));
            } else {
                assert_eq!(o.damage, 0);
            }
        }
    }

    #[test]
    fn gear_applies_accuracy_defense_and_soak() {
        let rules = GearRules::default();
        let mut a = Rng64::from_seed(77);
        let mut b = Rng64::from_seed(77);
        let plain = BasicRules::default();
        let none = Loadout::default();

        let with_sword = rules.attack_roll(&mut a, &sword(), &none, AttackKind::Melee);
        let bare = plain.attack_roll(&mut b, &none, &none, AttackKind::Melee);
        assert_eq!(with_sword, bare + 10);

        assert_eq!(
            rules.defense_threshold(&sword(), &plate(), AttackKind::Melee),
            70
        );

        let mut rng = Rng64::from_seed(1);
        for _ in 0..200 {
            let d = rules.damage(&mut rng, &sword(), &plate());
            assert!((0..=3).contains(&d));
            let unarmed = rules.damage(&mut rng, &none, &none);
            assert!((1..=10).contains(&unarmed));
        }
    }

    #[test]
    fn only_ranged_weapons_shoot_under_gear_rules() {
        let bow = Loadout {
            weapon: Some(WeaponDef {
                accuracy: 5,
                dmg_min: 2,
                dmg_max: 6,
                ranged: true,
            }),
            armor: None,
        };
        let gear = GearRules::default();
        assert!(gear.can_shoot(&bow));
        assert!(!gear.can_shoot(&sword()));
        assert!(!gear.can_shoot(&Loadout::default()));
        assert!(BasicRules::default().can_shoot(&sword()));
    }

    #[test]
    fn gear_effect_rolls_ignore_weapon() {
        let rules = GearRules::default();
        let mut a = Rng64::from_seed(9);
        let mut b = Rng64::from_seed(9);
        let none = Loadout::default();
        assert_eq!(
            rules.attack_roll(&mut a, &sword(), &none, AttackKind::Effect),
            rules.attack_roll(&mut b, &none, &none, AttackKind::Effect)
        );
    }
}
