use serde::Serialize;

use crate::host::ObjectId;

/// Why a command was refused. A refused command changes no state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CommandError {
    NoEncounter,
    NotEnoughFighters { found: usize },
    NotFighting,
    NotYourTurn,
    Defeated,
    InCombat,
    SelfTarget,
    UnknownTarget(ObjectId),
    TargetNotFighting(ObjectId),
    TargetDown(ObjectId),
    OutOfMeleeRange(ObjectId),
    EngagedInMelee,
    NoRangedWeapon,
    AlreadyEngaged(ObjectId),
    AlreadyAtMaxRange(ObjectId),
    UnknownEffect(String),
    InsufficientResource { need: i32, have: i32 },
    CombatOnly,
    NotInCombatUse,
    TargetsNotAllowed,
    TargetRequired,
    TooManyTargets { max: usize },
    InvalidTarget(ObjectId),
    DuplicateTarget(ObjectId),
    NotCarrying(ObjectId),
    NotWithinReach(ObjectId),
    CannotMove(ObjectId),
    Unavailable,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NoEncounter => write!(f, "there is no fight here"),
            CommandError::NotEnoughFighters { found } => {
                write!(f, "a fight needs at least two fighters (found {found})")
            }
            CommandError::NotFighting => write!(f, "you are not part of this fight"),
            CommandError::NotYourTurn => write!(f, "you can only do that on your turn"),
            CommandError::Defeated => write!(f, "you have been defeated"),
            CommandError::InCombat => write!(f, "you can't do that while fighting"),
            CommandError::SelfTarget => write!(f, "you can't target yourself"),
            CommandError::UnknownTarget(id) => write!(f, "no such target here ({id})"),
            CommandError::TargetNotFighting(id) => write!(f, "{id} is not in the fight"),
            CommandError::TargetDown(id) => write!(f, "{id} is already down"),
            CommandError::OutOfMeleeRange(id) => write!(f, "{id} is too far away to hit"),
            CommandError::EngagedInMelee => {
                write!(f, "you're engaged in melee; get some distance first")
            }
            CommandError::NoRangedWeapon => write!(f, "you have nothing to shoot with"),
            CommandError::AlreadyEngaged(id) => write!(f, "you are already next to {id}"),
            CommandError::AlreadyAtMaxRange(id) => {
                write!(f, "you're as far from {id} as you can get")
            }
            CommandError::UnknownEffect(name) => write!(f, "you don't know {name:?}"),
            CommandError::InsufficientResource { need, have } => {
                write!(f, "not enough resource: need {need}, have {have}")
            }
            CommandError::CombatOnly => write!(f, "that can only be used in a fight"),
            CommandError::NotInCombatUse => write!(f, "that can't be used in a fight"),
            CommandError::TargetsNotAllowed => write!(f, "that takes no targets"),
            CommandError::TargetRequired => write!(f, "that needs a target"),
            CommandError::TooManyTargets { max } => write!(f, "that takes at most {max} targets"),
            CommandError::InvalidTarget(id) => write!(f, "{id} is not a valid target for that"),
            CommandError::DuplicateTarget(id) => write!(f, "{id} was named more than once"),
            CommandError::NotCarrying(id) => write!(f, "you aren't carrying {id}"),
            CommandError::NotWithinReach(id) => write!(f, "{id} is out of reach"),
            CommandError::CannotMove(id) => write!(f, "{id} can't be moved"),
            CommandError::Unavailable => write!(f, "the location is not accepting commands"),
        }
    }
}

impl std::error::Error for CommandError {}
