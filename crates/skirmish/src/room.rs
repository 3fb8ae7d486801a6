//! The command layer for one location.
//!
//! A `Room` validates each public operation (is there a fight here, is it
//! your turn, are you still standing, is the target in range), resolves it
//! through the position graph and combat rules, and spends from the action
//! budget. At most one encounter exists per room.

use tracing::{debug, info};

use crate::config::CombatConfig;
use crate::effects::{CastOutcome, EffectBook};
use crate::encounter::Encounter;
use crate::error::CommandError;
use crate::event::{EndReason, Event, StatusReport};
use crate::host::{self, Attr, Audience, Host, LocationId, ObjectId, ObjectKind, Place};
use crate::ledger::{ActionReason, Spend};
use crate::position::Distance;
use crate::rng::Rng64;
use crate::rules::{AttackKind, AttackOutcome, CombatRules};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Starts a fight here, or joins the one already running.
    StartEncounter,
    Attack(ObjectId),
    Shoot(ObjectId),
    Approach(ObjectId),
    Withdraw(ObjectId),
    Cast {
        effect: String,
        targets: Vec<ObjectId>,
    },
    Pass,
    Disengage,
    Status,
    Rest,
    Drop(ObjectId),
    Get(ObjectId),
    Abort,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::StartEncounter => "fight",
            Command::Attack(_) => "attack",
            Command::Shoot(_) => "shoot",
            Command::Approach(_) => "approach",
            Command::Withdraw(_) => "withdraw",
            Command::Cast { .. } => "cast",
            Command::Pass => "pass",
            Command::Disengage => "disengage",
            Command::Status => "status",
            Command::Rest => "rest",
            Command::Drop(_) => "drop",
            Command::Get(_) => "get",
            Command::Abort => "abort",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Started { order: Vec<ObjectId> },
    Joined,
    Attack(AttackOutcome),
    Moved(Distance),
    Cast(CastOutcome),
    Status(StatusReport),
    Done,
}

#[derive(Debug)]
pub struct Room {
    location: LocationId,
    cfg: CombatConfig,
    effects: EffectBook,
    rng: Rng64,
    encounter: Option<Encounter>,
}

impl Room {
    pub fn new(location: LocationId, cfg: CombatConfig, effects: EffectBook) -> Self {
        let rng = cfg.rng();
        Self {
            location,
            cfg,
            effects,
            rng,
            encounter: None,
        }
    }

    pub fn location(&self) -> LocationId {
        self.location
    }

    pub fn config(&self) -> &CombatConfig {
        &self.cfg
    }

    pub fn encounter(&self) -> Option<&Encounter> {
        self.encounter.as_ref()
    }

    pub fn in_encounter(&self, id: ObjectId) -> bool {
        self.encounter.as_ref().is_some_and(|e| e.is_participant(id))
    }

    /// Runs one command. A refusal is also reported to `actor` through the
    /// message sink.
    pub fn handle<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
        cmd: Command,
    ) -> Result<Reply, CommandError> {
        let op = cmd.as_str();
        let res = self.dispatch(host, actor, cmd);
        if let Err(e) = &res {
            debug!(location = %self.location, actor = %actor, op, err = %e, "command refused");
            host.notify(Audience::One(actor), Event::Refused(e.clone()));
        }
        self.reap();
        res
    }

    /// One periodic tick of the turn clock.
    pub fn tick<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(enc) = self.encounter.as_mut() {
            enc.tick(host);
        }
        self.reap();
    }

    /// Something arrived in the location while a fight may be running.
    pub fn object_entered<H: Host + ?Sized>(&mut self, host: &H, obj: ObjectId) {
        let Some(enc) = self.encounter.as_mut() else {
            return;
        };
        let extra = match host.kind(obj) {
            Some(ObjectKind::Exit) | Some(ObjectKind::Character) => self.cfg.join_distance,
            _ => 0,
        };
        enc.place(obj, None, extra, &mut self.rng);
    }

    /// Something left the location; forget its position.
    pub fn object_left<H: Host + ?Sized>(&mut self, host: &mut H, obj: ObjectId) {
        let Some(enc) = self.encounter.as_mut() else {
            return;
        };
        if enc.is_participant(obj) {
            enc.remove_participant(host, obj);
        } else {
            enc.unplace(obj);
        }
        self.reap();
    }

    /// Participants can't walk out of a running fight.
    pub fn may_leave(&self, obj: ObjectId) -> Result<(), CommandError> {
        if self.in_encounter(obj) {
            return Err(CommandError::InCombat);
        }
        Ok(())
    }

    fn reap(&mut self) {
        if self.encounter.as_ref().is_some_and(|e| e.is_over()) {
            self.encounter = None;
            info!(location = %self.location, "encounter released");
        }
    }

    fn dispatch<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
        cmd: Command,
    ) -> Result<Reply, CommandError> {
        match cmd {
            Command::StartEncounter => self.start(host, actor),
            Command::Attack(t) => self.attack(host, actor, t, AttackKind::Melee),
            Command::Shoot(t) => self.attack(host, actor, t, AttackKind::Ranged),
            Command::Approach(t) => self.approach(host, actor, t),
            Command::Withdraw(t) => self.withdraw(host, actor, t),
            Command::Cast { effect, targets } => self.cast(host, actor, &effect, &targets),
            Command::Pass => self.pass(host, actor, ActionReason::Pass),
            Command::Disengage => self.pass(host, actor, ActionReason::Disengage),
            Command::Status => self.status(host, actor),
            Command::Rest => self.rest(host, actor),
            Command::Drop(item) => self.drop_item(host, actor, item),
            Command::Get(item) => self.get_item(host, actor, item),
            Command::Abort => self.abort(host, actor),
        }
    }

    /// In the fight, and it's your turn.
    fn on_turn(&self, actor: ObjectId) -> Result<(), CommandError> {
        let enc = self.encounter.as_ref().ok_or(CommandError::NoEncounter)?;
        if !enc.is_participant(actor) {
            return Err(CommandError::NotFighting);
        }
        if enc.current() != Some(actor) {
            return Err(CommandError::NotYourTurn);
        }
        Ok(())
    }

    /// On your turn and still standing.
    fn ready<H: Host + ?Sized>(&self, host: &H, actor: ObjectId) -> Result<(), CommandError> {
        self.on_turn(actor)?;
        if !host::is_alive(host, actor) {
            return Err(CommandError::Defeated);
        }
        Ok(())
    }

    fn is_here<H: Host + ?Sized>(&self, host: &H, obj: ObjectId) -> bool {
        host.place_of(obj) == Some(Place::Location(self.location))
    }

    fn start<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
    ) -> Result<Reply, CommandError> {
        if !self.is_here(host, actor) {
            return Err(CommandError::UnknownTarget(actor));
        }
        if !host::is_alive(host, actor) {
            return Err(CommandError::Defeated);
        }

        if let Some(enc) = self.encounter.as_mut() {
            if !enc.join(host, actor, &mut self.rng)? {
                return Err(CommandError::InCombat);
            }
            return Ok(Reply::Joined);
        }

        let enc = Encounter::start(host, self.location, &self.cfg, &mut self.rng)?;
        let order = enc.roster().to_vec();
        self.encounter = Some(enc);
        Ok(Reply::Started { order })
    }

    fn attack<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
        target: ObjectId,
        kind: AttackKind,
    ) -> Result<Reply, CommandError> {
        self.ready(host, actor)?;
        let enc = self.encounter.as_mut().ok_or(CommandError::NoEncounter)?;

        if target == actor {
            return Err(CommandError::SelfTarget);
        }
        if !enc.is_participant(target) {
            return Err(CommandError::TargetNotFighting(target));
        }
        if !host::is_alive(host, target) {
            return Err(CommandError::TargetDown(target));
        }
        match kind {
            AttackKind::Melee => {
                if enc.distance(actor, target) != Some(Distance::Engaged) {
                    return Err(CommandError::OutOfMeleeRange(target));
                }
            }
            AttackKind::Ranged => {
                if !enc.rules().can_shoot(&host.loadout(actor)) {
                    return Err(CommandError::NoRangedWeapon);
                }
                if enc.engaged_with_living(host, actor) {
                    return Err(CommandError::EngagedInMelee);
                }
            }
            AttackKind::Effect => {}
        }

        let outcome = enc.rules().resolve(
            &mut self.rng,
            &host.loadout(actor),
            &host.loadout(target),
            kind,
        );
        let attacked = Event::Attacked {
            attacker: host::who(host, actor),
            defender: host::who(host, target),
            kind,
            outcome,
        };
        host.notify(Audience::Location(self.location), attacked);
        if outcome.hit && host::wound(host, target, outcome.damage) == 0 {
            let w = host::who(host, target);
            host.notify(Audience::Location(self.location), Event::Defeated { who: w });
        }

        let reason = match kind {
            AttackKind::Ranged => ActionReason::Shoot,
            _ => ActionReason::Attack,
        };
        enc.spend(host, actor, Spend::Actions(1), reason);
        Ok(Reply::Attack(outcome))
    }

    fn approach<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
        target: ObjectId,
    ) -> Result<Reply, CommandError> {
        self.ready(host, actor)?;
        let enc = self.encounter.as_mut().ok_or(CommandError::NoEncounter)?;
        if target == actor {
            return Err(CommandError::SelfTarget);
        }
        match enc.distance(actor, target) {
            None => return Err(CommandError::UnknownTarget(target)),
            Some(Distance::Engaged) => return Err(CommandError::AlreadyEngaged(target)),
            Some(_) => {}
        }

        let now = enc
            .approach(actor, target)
            .ok_or(CommandError::UnknownTarget(target))?;
        let moved = Event::Approached {
            mover: host::who(host, actor),
            target: host::who(host, target),
            now,
        };
        host.notify(Audience::Location(self.location), moved);
        enc.spend(host, actor, Spend::Actions(1), ActionReason::Approach);
        Ok(Reply::Moved(now))
    }

    fn withdraw<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
        target: ObjectId,
    ) -> Result<Reply, CommandError> {
        self.ready(host, actor)?;
        let enc = self.encounter.as_mut().ok_or(CommandError::NoEncounter)?;
        if target == actor {
            return Err(CommandError::SelfTarget);
        }
        match enc.distance(actor, target) {
            None => return Err(CommandError::UnknownTarget(target)),
            Some(Distance::Range) => return Err(CommandError::AlreadyAtMaxRange(target)),
            Some(_) => {}
        }

        let now = enc
            .withdraw(actor, target)
            .ok_or(CommandError::UnknownTarget(target))?;
        let moved = Event::Withdrew {
            mover: host::who(host, actor),
            target: host::who(host, target),
            now,
        };
        host.notify(Audience::Location(self.location), moved);
        enc.spend(host, actor, Spend::Actions(1), ActionReason::Withdraw);
        Ok(Reply::Moved(now))
    }

    fn cast<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
        effect: &str,
        targets: &[ObjectId],
    ) -> Result<Reply, CommandError> {
        let def = self
            .effects
            .get(effect)
            .cloned()
            .ok_or_else(|| CommandError::UnknownEffect(effect.to_string()))?;
        if !host.knows_effect(actor, &def.name) {
            return Err(CommandError::UnknownEffect(def.name));
        }

        let in_combat = self.in_encounter(actor);
        if in_combat {
            self.ready(host, actor)?;
        } else if !host::is_alive(host, actor) {
            return Err(CommandError::Defeated);
        }

        let targets = def.validate(host, actor, self.location, in_combat, targets)?;

        let fallback: Box<dyn CombatRules>;
        let rules: &dyn CombatRules = match self.encounter.as_ref() {
            Some(enc) => enc.rules(),
            None => {
                fallback = self.cfg.build_rules();
                fallback.as_ref()
            }
        };
        let out = def.invoke(host, rules, &mut self.rng, actor, self.location, targets);

        if let Some(enc) = self.encounter.as_mut() {
            let anchor = enc.graph().contains(actor).then_some(actor);
            for id in &out.created {
                enc.place(*id, anchor, 0, &mut self.rng);
            }
            if in_combat {
                enc.spend(host, actor, Spend::Actions(1), ActionReason::Cast);
            }
        }
        Ok(Reply::Cast(out))
    }

    fn pass<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
        reason: ActionReason,
    ) -> Result<Reply, CommandError> {
        self.on_turn(actor)?;
        let enc = self.encounter.as_mut().ok_or(CommandError::NoEncounter)?;

        let w = host::who(host, actor);
        let ev = match reason {
            ActionReason::Disengage => Event::Disengaged { who: w },
            _ => Event::Passed { who: w },
        };
        host.notify(Audience::Location(self.location), ev);
        enc.spend(host, actor, Spend::All, reason);
        Ok(Reply::Done)
    }

    fn status<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
    ) -> Result<Reply, CommandError> {
        let report = StatusReport {
            who: host::who(host, actor),
            health: host.get(actor, Attr::Health).unwrap_or(0),
            max_health: host.max(actor, Attr::Health).unwrap_or(0),
            resource: host.get(actor, Attr::Resource).unwrap_or(0),
            max_resource: host.max(actor, Attr::Resource).unwrap_or(0),
            combat: self
                .encounter
                .as_ref()
                .and_then(|enc| enc.status_for(&*host, actor)),
        };
        host.notify(Audience::One(actor), Event::Status(report.clone()));
        Ok(Reply::Status(report))
    }

    fn rest<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
    ) -> Result<Reply, CommandError> {
        if self.in_encounter(actor) {
            return Err(CommandError::InCombat);
        }
        for attr in [Attr::Health, Attr::Resource] {
            if let Some(max) = host.max(actor, attr) {
                host.set(actor, attr, max);
            }
        }
        let w = host::who(host, actor);
        host.notify(Audience::Location(self.location), Event::Rested { who: w });
        Ok(Reply::Done)
    }

    fn drop_item<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
        item: ObjectId,
    ) -> Result<Reply, CommandError> {
        if host.place_of(item) != Some(Place::HeldBy(actor)) {
            return Err(CommandError::NotCarrying(item));
        }
        let in_combat = self.in_encounter(actor);
        if in_combat {
            self.ready(host, actor)?;
        }
        if !host.move_object(item, Place::Location(self.location)) {
            return Err(CommandError::CannotMove(item));
        }

        let dropped = Event::Dropped {
            who: host::who(host, actor),
            item: host::who(host, item),
        };
        host.notify(Audience::Location(self.location), dropped);

        if let Some(enc) = self.encounter.as_mut() {
            let anchor = enc.graph().contains(actor).then_some(actor);
            enc.place(item, anchor, 0, &mut self.rng);
            if in_combat {
                enc.spend(host, actor, Spend::Actions(1), ActionReason::Drop);
            }
        }
        Ok(Reply::Done)
    }

    fn get_item<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
        item: ObjectId,
    ) -> Result<Reply, CommandError> {
        if !self.is_here(host, item) {
            return Err(CommandError::UnknownTarget(item));
        }
        if host.kind(item) != Some(ObjectKind::Item) {
            return Err(CommandError::CannotMove(item));
        }
        let in_combat = self.in_encounter(actor);
        if in_combat {
            self.ready(host, actor)?;
            let reach = self.encounter.as_ref().and_then(|e| e.distance(actor, item));
            if reach != Some(Distance::Engaged) {
                return Err(CommandError::NotWithinReach(item));
            }
        }
        if !host.move_object(item, Place::HeldBy(actor)) {
            return Err(CommandError::CannotMove(item));
        }

        let picked = Event::PickedUp {
            who: host::who(host, actor),
            item: host::who(host, item),
        };
        host.notify(Audience::Location(self.location), picked);

        if let Some(enc) = self.encounter.as_mut() {
            enc.unplace(item);
            if in_combat {
                enc.spend(host, actor, Spend::Actions(1), ActionReason::Get);
            }
        }
        Ok(Reply::Done)
    }

    fn abort<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        actor: ObjectId,
    ) -> Result<Reply, CommandError> {
        let enc = self.encounter.as_mut().ok_or(CommandError::NoEncounter)?;
        enc.end(host, EndReason::Aborted, Some(actor));
        Ok(Reply::Done)
    }
}
