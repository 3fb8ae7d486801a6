use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::gear::WeaponDef;
use crate::rng::Rng64;
use crate::rules::{Baseline, BasicRules, CombatRules, GearRules};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    Basic,
    Gear,
}

impl RuleSet {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" | "plain" => Some(RuleSet::Basic),
            "gear" | "equip" | "equipment" => Some(RuleSet::Gear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub tick_secs: i64,
    pub turn_secs: i64,
    pub warn_secs: i64,
    pub actions_per_turn: u32,
    pub rules: RuleSet,
    pub defense_baseline: i32,
    pub melee_bonus: i32,
    pub ranged_penalty: i32,
    pub damage_min: i32,
    pub damage_max: i32,
    pub unarmed: WeaponDef,
    pub join_distance: u8,
    pub recovery_location: Option<String>,
    pub seed: Option<u64>,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            tick_secs: 5,
            turn_secs: 30,
            warn_secs: 10,
            actions_per_turn: 1,
            rules: RuleSet::Gear,
            defense_baseline: 50,
            melee_bonus: 15,
            ranged_penalty: 15,
            damage_min: 15,
            damage_max: 25,
            unarmed: WeaponDef::UNARMED,
            join_distance: 2,
            recovery_location: None,
            seed: None,
        }
    }
}

impl CombatConfig {
    /// Parses a config document. Clock values that can't work are logged
    /// here and clamped when an encounter starts.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        let cfg: Self = serde_json::from_str(s)?;
        for p in cfg.problems() {
            warn!(problem = %p, "combat config");
        }
        Ok(cfg)
    }

    /// Values the turn clock or the ledger can't run with.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.tick_secs < 1 {
            out.push(format!("tick_secs is {}; using 1", self.tick_secs));
        }
        if self.turn_secs < 1 {
            out.push(format!("turn_secs is {}; using 1", self.turn_secs));
        }
        if self.warn_secs < 0 {
            out.push(format!("warn_secs is {}; using 0", self.warn_secs));
        }
        if self.actions_per_turn == 0 {
            out.push("actions_per_turn is 0; using 1".to_string());
        }
        out
    }

    /// Clamps whatever `problems` reports and returns those reports.
    pub fn sanitize(&mut self) -> Vec<String> {
        let out = self.problems();
        self.tick_secs = self.tick_secs.max(1);
        self.turn_secs = self.turn_secs.max(1);
        self.warn_secs = self.warn_secs.max(0);
        self.actions_per_turn = self.actions_per_turn.max(1);
        out
    }

    pub fn build_rules(&self) -> Box<dyn CombatRules> {
        let base = Baseline {
            defense: self.defense_baseline,
            melee_bonus: self.melee_bonus,
            ranged_penalty: self.ranged_penalty,
        };
        match self.rules {
            RuleSet::Basic => Box::new(BasicRules {
                base,
                dmg_min: self.damage_min,
                dmg_max: self.damage_max,
            }),
            RuleSet::Gear => Box::new(GearRules {
                base,
                unarmed: self.unarmed,
            }),
        }
    }

    pub fn rng(&self) -> Rng64 {
        match self.seed {
            Some(s) => Rng64::from_seed(s),
            None => Rng64::from_clock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = CombatConfig::from_json_str(
            r#"{"rules":"basic","turn_secs":20,"recovery_location":"temple"}"#,
        )
        .expect("parse");
        assert_eq!(cfg.rules, RuleSet::Basic);
        assert_eq!(cfg.turn_secs, 20);
        assert_eq!(cfg.tick_secs, 5);
        assert_eq!(cfg.actions_per_turn, 1);
        assert_eq!(cfg.recovery_location.as_deref(), Some("temple"));
        assert_eq!(cfg.build_rules().name(), "basic");
    }

    #[test]
    fn default_is_gear_rules() {
        assert_eq!(CombatConfig::default().build_rules().name(), "gear");
        assert_eq!(RuleSet::parse(" Equip "), Some(RuleSet::Gear));
        assert_eq!(RuleSet::parse("nope"), None);
    }

    #[test]
    fn unusable_clock_values_are_reported_and_clamped() {
        let mut cfg = CombatConfig::from_json_str(
            r#"{"tick_secs":0,"turn_secs":-5,"warn_secs":-1,"actions_per_turn":0}"#,
        )
        .expect("parse");
        assert_eq!(cfg.problems().len(), 4);

        let reported = cfg.sanitize();
        assert_eq!(reported.len(), 4);
        assert!(reported[0].starts_with("tick_secs is 0"));
        assert_eq!(
            (cfg.tick_secs, cfg.turn_secs, cfg.warn_secs, cfg.actions_per_turn),
            (1, 1, 0, 1)
        );
        assert!(cfg.problems().is_empty());
        assert!(CombatConfig::default().problems().is_empty());
    }
}
