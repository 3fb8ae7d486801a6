//! Semantic events emitted by the core.
//!
//! `Display` gives a plain default narration; hosts are free to render
//! events their own way.

use std::fmt;

use serde::Serialize;

use crate::error::CommandError;
use crate::host::ObjectId;
use crate::position::Distance;
use crate::rules::{AttackKind, AttackOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Who {
    pub id: ObjectId,
    pub name: String,
}

impl fmt::Display for Who {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EndReason {
    AllDisengaged,
    Survivor(Who),
    NoneStanding,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombatStatus {
    pub current: Who,
    pub actions_left: u32,
    pub distances: Vec<(Who, Distance)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub who: Who,
    pub health: i32,
    pub max_health: i32,
    pub resource: i32,
    pub max_resource: i32,
    pub combat: Option<CombatStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
    FightBegins {
        order: Vec<Who>,
    },
    YourTurn {
        actions: u32,
        secs: i64,
    },
    TurnChanged {
        who: Who,
    },
    TimeoutWarning {
        secs_left: i64,
    },
    TimedOut {
        who: Who,
    },
    Joined {
        who: Who,
    },
    Attacked {
        attacker: Who,
        defender: Who,
        kind: AttackKind,
        outcome: AttackOutcome,
    },
    Defeated {
        who: Who,
    },
    Approached {
        mover: Who,
        target: Who,
        now: Distance,
    },
    Withdrew {
        mover: Who,
        target: Who,
        now: Distance,
    },
    Passed {
        who: Who,
    },
    Disengaged {
        who: Who,
    },
    Cast {
        caster: Who,
        effect: String,
        targets: Vec<Who>,
    },
    Healed {
        who: Who,
        amount: i32,
    },
    Created {
        caster: Who,
        object: Who,
    },
    Dropped {
        who: Who,
        item: Who,
    },
    PickedUp {
        who: Who,
        item: Who,
    },
    Rested {
        who: Who,
    },
    Status(StatusReport),
    FightEnds {
        reason: EndReason,
    },
    Refused(CommandError),
    ConfigProblem(String),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::FightBegins { order } => {
                let names = order.iter().map(|w| w.name.as_str()).collect::<Vec<_>>();
                write!(f, "* a fight begins! turn order: {}", names.join(", "))
            }
            Event::YourTurn { actions, secs } => write!(
                f,
                "it's your turn! you have {actions} action(s) and {secs} seconds."
            ),
            Event::TurnChanged { who } => write!(f, "* it's {who}'s turn."),
            Event::TimeoutWarning { secs_left } => write!(
                f,
                "warning: your turn ends in {secs_left} seconds. act or pass!"
            ),
            Event::TimedOut { who } => write!(f, "* {who} hesitates and loses the turn."),
            Event::Joined { who } => write!(f, "* {who} joins the fight!"),
            Event::Attacked {
                attacker,
                defender,
                kind,
                outcome,
            } => {
                let verb = match kind {
                    AttackKind::Melee => "attacks",
                    AttackKind::Ranged => "shoots at",
                    AttackKind::Effect => "strikes",
                };
                if outcome.hit {
                    write!(
                        f,
                        "* {attacker} {verb} {defender} and hits for {} damage! ({} vs {})",
                        outcome.damage, outcome.roll, outcome.threshold
                    )
                } else {
                    write!(
                        f,
                        "* {attacker} {verb} {defender} and misses. ({} vs {})",
                        outcome.roll, outcome.threshold
                    )
                }
            }
            Event::Defeated { who } => write!(f, "* {who} has been defeated!"),
            Event::Approached { mover, target, now } => {
                write!(f, "* {mover} moves toward {target} ({}).", now.as_str())
            }
            Event::Withdrew { mover, target, now } => {
                write!(f, "* {mover} moves away from {target} ({}).", now.as_str())
            }
            Event::Passed { who } => write!(f, "* {who} takes no further action."),
            Event::Disengaged { who } => write!(f, "* {who} disengages, ready to stop fighting."),
            Event::Cast {
                caster,
                effect,
                targets,
            } => {
                if targets.is_empty() {
                    write!(f, "* {caster} uses {effect}.")
                } else {
                    let names = targets.iter().map(|w| w.name.as_str()).collect::<Vec<_>>();
                    write!(f, "* {caster} uses {effect} on {}.", names.join(", "))
                }
            }
            Event::Healed { who, amount } => write!(f, "* {who} regains {amount} health."),
            Event::Created { caster, object } => write!(f, "* {caster} conjures {object}."),
            Event::Dropped { who, item } => write!(f, "* {who} drops {item}."),
            Event::PickedUp { who, item } => write!(f, "* {who} picks up {item}."),
            Event::Rested { who } => write!(f, "* {who} rests and recovers."),
            Event::Status(s) => {
                write!(
                    f,
                    "{}: health {}/{}, resource {}/{}",
                    s.who, s.health, s.max_health, s.resource, s.max_resource
                )?;
                if let Some(c) = &s.combat {
                    write!(f, "\nturn: {} ({} action(s) left)", c.current, c.actions_left)?;
                    for (w, d) in &c.distances {
                        write!(f, "\n  {w}: {}", d.as_str())?;
                    }
                }
                Ok(())
            }
            Event::FightEnds { reason } => match reason {
                EndReason::AllDisengaged => write!(f, "* all fighters disengage. the fight is over."),
                EndReason::Survivor(w) => write!(f, "* {w} is the last one standing!"),
                EndReason::NoneStanding => write!(f, "* nobody is left standing."),
                EndReason::Aborted => write!(f, "* the fight is called off."),
            },
            Event::Refused(e) => write!(f, "{e}."),
            Event::ConfigProblem(msg) => write!(f, "[config] {msg}"),
        }
    }
}
