use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponDef {
    #[serde(default)]
    pub accuracy: i32,
    pub dmg_min: i32,
    pub dmg_max: i32,
    #[serde(default)]
    pub ranged: bool,
}

impl WeaponDef {
    pub const UNARMED: WeaponDef = WeaponDef {
        accuracy: 0,
        dmg_min: 1,
        dmg_max: 10,
        ranged: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArmorDef {
    /// Added to the defense threshold.
    #[serde(default)]
    pub defense: i32,
    /// Flat damage soaked per hit.
    #[serde(default)]
    pub reduction: i32,
}

/// What a combatant is wielding and wearing, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Loadout {
    #[serde(default)]
    pub weapon: Option<WeaponDef>,
    #[serde(default)]
    pub armor: Option<ArmorDef>,
}

impl Loadout {
    pub fn weapon_or(&self, unarmed: WeaponDef) -> WeaponDef {
        self.weapon.unwrap_or(unarmed)
    }

    pub fn defense(&self) -> i32 {
        self.armor.map_or(0, |a| a.defense)
    }

    pub fn reduction(&self) -> i32 {
        self.armor.map_or(0, |a| a.reduction.max(0))
    }
}
