//! The turn handler for one location's fight.
//!
//! An encounter owns the turn order, the position graph and every
//! participant's action budget. It is driven from two directions: commands
//! spend actions (which may end the turn), and a periodic tick runs down the
//! turn clock. Callers serialize the two.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CombatConfig;
use crate::error::CommandError;
use crate::event::{CombatStatus, EndReason, Event};
use crate::host::{self, Audience, Host, LocationId, ObjectId, ObjectKind, Place};
use crate::ledger::{ActionReason, Ledger, Spend};
use crate::position::{Distance, PositionGraph};
use crate::rng::Rng64;
use crate::rules::CombatRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Forming,
    Active,
    Ending,
    Ended,
}

#[derive(Debug)]
pub struct Encounter {
    location: LocationId,
    phase: Phase,
    roster: Vec<ObjectId>,
    turn: usize,
    time_left: i64,
    warned: bool,
    graph: PositionGraph,
    ledger: Ledger,
    rules: Box<dyn CombatRules>,
    cfg: CombatConfig,
}

impl Encounter {
    /// Gathers everyone alive in `location`, rolls initiative and starts the
    /// first turn.
    pub fn start<H: Host + ?Sized>(
        host: &mut H,
        location: LocationId,
        cfg: &CombatConfig,
        rng: &mut Rng64,
    ) -> Result<Self, CommandError> {
        let fighters = host
            .contents(location)
            .into_iter()
            .filter(|id| host::is_alive(&*host, *id))
            .collect::<Vec<_>>();
        if fighters.len() < 2 {
            return Err(CommandError::NotEnoughFighters {
                found: fighters.len(),
            });
        }

        // Highest key goes first. The sort is stable, so ties keep room order.
        let mut keyed = fighters
            .into_iter()
            .map(|id| (rng.next_u64(), id))
            .collect::<Vec<_>>();
        keyed.sort_by(|a, b| b.0.cmp(&a.0));
        let order = keyed.into_iter().map(|(_, id)| id).collect::<Vec<_>>();

        Self::begin(host, location, cfg, order)
    }

    /// Starts with a fixed turn order instead of rolling initiative.
    pub fn begin<H: Host + ?Sized>(
        host: &mut H,
        location: LocationId,
        cfg: &CombatConfig,
        order: Vec<ObjectId>,
    ) -> Result<Self, CommandError> {
        if order.len() < 2 {
            return Err(CommandError::NotEnoughFighters { found: order.len() });
        }

        let mut cfg = cfg.clone();
        for problem in cfg.sanitize() {
            warn!(location = %location, problem = %problem, "combat config");
            host.notify(Audience::Location(location), Event::ConfigProblem(problem));
        }

        let graph = PositionGraph::initialize(
            host.contents(location)
                .into_iter()
                .chain(order.iter().copied())
                .map(|id| (id, (*host).kind(id) == Some(ObjectKind::Exit))),
        );

        let mut enc = Self {
            location,
            phase: Phase::Forming,
            roster: order,
            turn: 0,
            time_left: cfg.turn_secs,
            warned: false,
            graph,
            ledger: Ledger::new(cfg.actions_per_turn),
            rules: cfg.build_rules(),
            cfg,
        };
        for id in &enc.roster {
            enc.ledger.enroll(*id);
        }

        let order = enc
            .roster
            .iter()
            .map(|id| host::who(&*host, *id))
            .collect::<Vec<_>>();
        host.notify(Audience::Location(location), Event::FightBegins { order });
        info!(
            location = %location,
            fighters = enc.roster.len(),
            rules = enc.rules.name(),
            "encounter started"
        );

        enc.phase = Phase::Active;
        enc.start_turn(host);
        Ok(enc)
    }

    pub fn location(&self) -> LocationId {
        self.location
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_over(&self) -> bool {
        self.phase == Phase::Ended
    }

    pub fn roster(&self) -> &[ObjectId] {
        &self.roster
    }

    pub fn is_participant(&self, id: ObjectId) -> bool {
        self.roster.contains(&id)
    }

    pub fn current(&self) -> Option<ObjectId> {
        if self.phase != Phase::Active {
            return None;
        }
        self.roster.get(self.turn).copied()
    }

    pub fn time_left(&self) -> i64 {
        self.time_left
    }

    pub fn remaining_actions(&self, id: ObjectId) -> u32 {
        self.ledger.remaining(id)
    }

    pub fn last_action(&self, id: ObjectId) -> Option<ActionReason> {
        self.ledger.last_action(id)
    }

    pub fn graph(&self) -> &PositionGraph {
        &self.graph
    }

    pub fn distance(&self, a: ObjectId, b: ObjectId) -> Option<Distance> {
        self.graph.distance(a, b)
    }

    pub fn rules(&self) -> &dyn CombatRules {
        self.rules.as_ref()
    }

    /// True if `id` is engaged with any other living participant.
    pub fn engaged_with_living<H: Host + ?Sized>(&self, host: &H, id: ObjectId) -> bool {
        self.roster.iter().any(|&o| {
            o != id
                && host::is_alive(host, o)
                && self.graph.distance(id, o) == Some(Distance::Engaged)
        })
    }

    pub(crate) fn approach(&mut self, mover: ObjectId, target: ObjectId) -> Option<Distance> {
        self.graph.approach(mover, target)
    }

    pub(crate) fn withdraw(&mut self, mover: ObjectId, target: ObjectId) -> Option<Distance> {
        self.graph.withdraw(mover, target)
    }

    /// Places a non-participant object (dropped item, new arrival, exit).
    pub(crate) fn place(
        &mut self,
        id: ObjectId,
        anchor: Option<ObjectId>,
        extra: u8,
        rng: &mut Rng64,
    ) -> bool {
        self.graph.join(id, anchor, extra, rng)
    }

    pub(crate) fn unplace(&mut self, id: ObjectId) -> bool {
        if self.is_participant(id) {
            return false;
        }
        self.graph.remove(id)
    }

    /// Spends from `who`'s budget, then runs the end-of-turn check.
    pub fn spend<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        who: ObjectId,
        amount: Spend,
        reason: ActionReason,
    ) -> Option<u32> {
        let left = self.ledger.spend(who, amount, reason)?;
        self.end_of_turn_check(host, who);
        Some(left)
    }

    fn end_of_turn_check<H: Host + ?Sized>(&mut self, host: &mut H, acting: ObjectId) {
        let Some(cur) = self.current() else {
            return;
        };
        if self.ledger.remaining(cur) == 0 {
            self.advance_turn(host, Some(acting));
        }
    }

    fn advance_turn<H: Host + ?Sized>(&mut self, host: &mut H, acting: Option<ObjectId>) {
        if self.check_termination(host, acting) {
            return;
        }
        self.turn = (self.turn + 1) % self.roster.len();
        self.start_turn(host);
    }

    /// Ends the encounter if everyone disengaged or at most one is standing.
    fn check_termination<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        acting: Option<ObjectId>,
    ) -> bool {
        if self.ledger.all_disengaged(&self.roster) {
            self.end(host, EndReason::AllDisengaged, acting);
            return true;
        }
        let standing = self
            .roster
            .iter()
            .copied()
            .filter(|id| host::is_alive(&*host, *id))
            .collect::<Vec<_>>();
        match standing.as_slice() {
            [] => {
                self.end(host, EndReason::NoneStanding, acting);
                true
            }
            [last] => {
                let w = host::who(host, *last);
                self.end(host, EndReason::Survivor(w), acting);
                true
            }
            _ => false,
        }
    }

    fn start_turn<H: Host + ?Sized>(&mut self, host: &mut H) {
        let Some(cur) = self.roster.get(self.turn).copied() else {
            return;
        };
        self.ledger.grant_turn(cur);
        self.time_left = self.cfg.turn_secs;
        self.warned = false;

        host.notify(
            Audience::One(cur),
            Event::YourTurn {
                actions: self.ledger.allowance(),
                secs: self.time_left,
            },
        );
        let w = host::who(host, cur);
        host.notify(Audience::Location(self.location), Event::TurnChanged { who: w });
        debug!(location = %self.location, current = %cur, "turn started");
    }

    /// Runs the turn clock down by one tick interval.
    pub fn tick<H: Host + ?Sized>(&mut self, host: &mut H) {
        let Some(cur) = self.current() else {
            return;
        };
        self.time_left -= self.cfg.tick_secs;

        if self.time_left <= 0 {
            let w = host::who(host, cur);
            host.notify(Audience::Location(self.location), Event::TimedOut { who: w });
            info!(location = %self.location, who = %cur, "turn timed out");
            self.spend(host, cur, Spend::All, ActionReason::Disengage);
        } else if self.time_left <= self.cfg.warn_secs && !self.warned {
            self.warned = true;
            host.notify(
                Audience::One(cur),
                Event::TimeoutWarning {
                    secs_left: self.time_left,
                },
            );
        }
    }

    /// Adds a fighter to a running encounter. They act right after the
    /// current participant and start at the edge of the fight.
    ///
    /// Returns `Ok(false)` if they were already fighting.
    pub fn join<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        who: ObjectId,
        rng: &mut Rng64,
    ) -> Result<bool, CommandError> {
        if self.phase != Phase::Active {
            return Err(CommandError::NoEncounter);
        }
        if self.is_participant(who) {
            return Ok(false);
        }
        if !host::is_alive(host, who) {
            return Err(CommandError::Defeated);
        }

        let anchor = self.roster[rng.pick(self.roster.len())];
        self.roster.insert(self.turn + 1, who);
        self.ledger.enroll(who);
        self.graph.remove(who);
        self.graph.join(who, Some(anchor), self.cfg.join_distance, rng);

        let w = host::who(host, who);
        host.notify(Audience::Location(self.location), Event::Joined { who: w });
        info!(location = %self.location, who = %who, "joined encounter");
        Ok(true)
    }

    /// Takes a participant out (they left the location). The turn passes on
    /// if it was theirs.
    pub fn remove_participant<H: Host + ?Sized>(&mut self, host: &mut H, who: ObjectId) -> bool {
        let Some(pos) = self.roster.iter().position(|id| *id == who) else {
            return false;
        };
        let was_current = self.phase == Phase::Active && pos == self.turn;

        self.roster.remove(pos);
        self.ledger.remove(who);
        self.graph.remove(who);
        if pos < self.turn {
            self.turn -= 1;
        }
        if self.turn >= self.roster.len() {
            self.turn = 0;
        }
        if self.phase != Phase::Active {
            return true;
        }

        if self.check_termination(host, None) {
            return true;
        }
        if was_current {
            self.start_turn(host);
        }
        true
    }

    /// Tears the encounter down. Safe to call more than once.
    pub fn end<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        reason: EndReason,
        acting: Option<ObjectId>,
    ) {
        if matches!(self.phase, Phase::Ending | Phase::Ended) {
            return;
        }
        self.phase = Phase::Ending;

        info!(location = %self.location, reason = ?reason, "encounter ended");
        host.notify(
            Audience::Location(self.location),
            Event::FightEnds { reason },
        );

        self.recover_defeated(host, acting);

        self.ledger.clear();
        self.graph.clear();
        self.roster.clear();
        self.turn = 0;
        self.phase = Phase::Ended;
    }

    fn recover_defeated<H: Host + ?Sized>(&mut self, host: &mut H, acting: Option<ObjectId>) {
        let Some(key) = self.cfg.recovery_location.clone() else {
            return;
        };
        let defeated = self
            .roster
            .iter()
            .copied()
            .filter(|id| !host::is_alive(&*host, *id))
            .collect::<Vec<_>>();
        if defeated.is_empty() {
            return;
        }

        let Some(dest) = host.find_location(&key) else {
            warn!(location = %self.location, recovery = %key, "recovery location not found");
            let to = acting.map_or(Audience::Location(self.location), Audience::One);
            host.notify(
                to,
                Event::ConfigProblem(format!(
                    "recovery location {key:?} does not exist; defeated fighters stay here"
                )),
            );
            return;
        };
        for id in defeated {
            if !host.move_object(id, Place::Location(dest)) {
                warn!(who = %id, recovery = %key, "could not move defeated fighter");
            }
        }
    }

    pub fn status_for<H: Host + ?Sized>(&self, host: &H, id: ObjectId) -> Option<CombatStatus> {
        let current = self.current()?;
        let row = self.graph.row(id)?;
        Some(CombatStatus {
            current: host::who(host, current),
            actions_left: self.ledger.remaining(id),
            distances: row
                .into_iter()
                .map(|(o, d)| (host::who(host, o), d))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Attr, Attributes, Locale};
    use crate::memory::MemoryWorld;

    fn world(names: &[&str]) -> (MemoryWorld, LocationId, Vec<ObjectId>) {
        let mut w = MemoryWorld::new();
        let pit = w.add_location("pit");
        let ids = names
            .iter()
            .map(|n| w.add_character(n, pit, 40))
            .collect::<Vec<_>>();
        (w, pit, ids)
    }

    fn pass(enc: &mut Encounter, w: &mut MemoryWorld) {
        let cur = enc.current().expect("someone's turn");
        enc.spend(w, cur, Spend::All, ActionReason::Pass);
    }

    #[test]
    fn start_needs_two_living_fighters() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram"]);
        w.set(ids[1], Attr::Health, 0);
        let mut rng = Rng64::from_seed(1);
        let err = Encounter::start(&mut w, pit, &CombatConfig::default(), &mut rng).unwrap_err();
        assert_eq!(err, CommandError::NotEnoughFighters { found: 1 });
    }

    #[test]
    fn start_rolls_an_order_covering_everyone() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram", "Cato"]);
        w.add_exit("north", pit);
        let mut rng = Rng64::from_seed(5);
        let enc = Encounter::start(&mut w, pit, &CombatConfig::default(), &mut rng).expect("start");

        let mut order = enc.roster().to_vec();
        order.sort();
        assert_eq!(order, ids);
        assert_eq!(enc.phase(), Phase::Active);
        assert_eq!(enc.current(), Some(enc.roster()[0]));
        assert_eq!(enc.remaining_actions(enc.roster()[0]), 1);
        assert_eq!(enc.graph().len(), 4);
    }

    #[test]
    fn turns_cycle_in_order_and_wrap() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram", "Cato"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), vec![b, a, c]).expect("begin");

        let mut seen = vec![];
        for _ in 0..4 {
            seen.push(enc.current().expect("active"));
            pass(&mut enc, &mut w);
        }
        assert_eq!(seen, vec![b, a, c, b]);
        assert_eq!(enc.current(), Some(a));
        assert_eq!(enc.distance(a, b), Some(Distance::Reach));

        let b_texts = w.texts_seen_by(b);
        assert!(b_texts[0].starts_with("* a fight begins! turn order: Bram, Ayla, Cato"));
        assert_eq!(
            b_texts
                .iter()
                .filter(|t| t.starts_with("it's your turn!"))
                .count(),
            2
        );
    }

    #[test]
    fn clock_warns_once_then_forces_disengage() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram", "Cato"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), vec![a, b, c]).expect("begin");

        // 30s turn, 5s ticks, warning at 10s left.
        for _ in 0..5 {
            enc.tick(&mut w);
        }
        assert_eq!(enc.current(), Some(a));
        assert_eq!(enc.time_left(), 5);
        enc.tick(&mut w);

        assert_eq!(enc.current(), Some(b));
        assert_eq!(enc.time_left(), 30);
        assert_eq!(enc.last_action(a), Some(ActionReason::Disengage));
        let warnings = w
            .texts_seen_by(a)
            .into_iter()
            .filter(|t| t.starts_with("warning:"))
            .count();
        assert_eq!(warnings, 1);
        assert!(w.texts_seen_by(c).contains(&"* Ayla hesitates and loses the turn.".to_string()));
    }

    #[test]
    fn zero_tick_is_reported_and_the_clock_still_runs() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram"]);
        let cfg = CombatConfig {
            tick_secs: 0,
            ..CombatConfig::default()
        };
        let mut enc = Encounter::begin(&mut w, pit, &cfg, ids.clone()).expect("begin");
        assert!(
            w.texts_seen_by(ids[0])
                .iter()
                .any(|t| t.starts_with("[config] tick_secs is 0"))
        );

        for _ in 0..29 {
            enc.tick(&mut w);
        }
        assert_eq!(enc.current(), Some(ids[0]));
        enc.tick(&mut w);
        assert_eq!(enc.current(), Some(ids[1]));
        assert_eq!(enc.last_action(ids[0]), Some(ActionReason::Disengage));
    }

    #[test]
    fn everyone_disengaging_ends_the_fight() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram", "Cato"]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), ids.clone()).expect("begin");

        for _ in 0..3 {
            assert!(!enc.is_over());
            let cur = enc.current().expect("active");
            enc.spend(&mut w, cur, Spend::All, ActionReason::Disengage);
        }
        assert!(enc.is_over());
        assert!(enc.roster().is_empty());
        assert!(enc.graph().is_empty());
        assert!(
            w.texts_seen_by(ids[0])
                .contains(&"* all fighters disengage. the fight is over.".to_string())
        );
    }

    #[test]
    fn a_pass_breaks_the_disengage_consensus() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram"]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), ids.clone()).expect("begin");
        enc.spend(&mut w, ids[0], Spend::All, ActionReason::Disengage);
        enc.spend(&mut w, ids[1], Spend::All, ActionReason::Pass);
        assert!(!enc.is_over());
        assert_eq!(enc.current(), Some(ids[0]));
    }

    #[test]
    fn last_one_standing_wins() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram", "Cato"]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), ids.clone()).expect("begin");
        w.set(ids[1], Attr::Health, 0);
        pass(&mut enc, &mut w);
        assert!(!enc.is_over());

        w.set(ids[2], Attr::Health, 0);
        pass(&mut enc, &mut w);
        assert!(enc.is_over());
        assert!(
            w.texts_seen_by(ids[0])
                .contains(&"* Ayla is the last one standing!".to_string())
        );
    }

    #[test]
    fn nobody_standing_still_ends() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram"]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), ids.clone()).expect("begin");
        w.set(ids[0], Attr::Health, 0);
        w.set(ids[1], Attr::Health, 0);
        pass(&mut enc, &mut w);
        assert!(enc.is_over());
        assert!(
            w.texts_seen_by(ids[1])
                .contains(&"* nobody is left standing.".to_string())
        );
    }

    #[test]
    fn joiner_acts_right_after_the_current_fighter() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram", "Cato"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), vec![a, b, c]).expect("begin");
        pass(&mut enc, &mut w);
        assert_eq!(enc.current(), Some(b));

        let d = w.add_character("Dara", pit, 40);
        let mut rng = Rng64::from_seed(9);
        assert_eq!(enc.join(&mut w, d, &mut rng), Ok(true));
        assert_eq!(enc.join(&mut w, d, &mut rng), Ok(false));
        assert_eq!(enc.roster(), &[a, b, d, c]);
        assert_eq!(enc.current(), Some(b));
        assert_eq!(enc.remaining_actions(d), 0);

        // Starts at the edge of the fight.
        let row = enc.graph().row(d).expect("row");
        assert!(row.iter().any(|(_, dist)| *dist == Distance::Range));

        pass(&mut enc, &mut w);
        assert_eq!(enc.current(), Some(d));
        assert_eq!(enc.remaining_actions(d), 1);
    }

    #[test]
    fn the_defeated_cannot_join() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram"]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), ids).expect("begin");
        let d = w.add_character("Dara", pit, 0);
        let mut rng = Rng64::from_seed(9);
        assert_eq!(enc.join(&mut w, d, &mut rng), Err(CommandError::Defeated));
    }

    #[test]
    fn leaving_on_your_turn_passes_it_on() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram", "Cato"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), vec![a, b, c]).expect("begin");

        assert!(enc.remove_participant(&mut w, b));
        assert_eq!(enc.current(), Some(a));
        assert!(enc.remove_participant(&mut w, a));
        // Only Cato is left.
        assert!(enc.is_over());
        assert!(!enc.remove_participant(&mut w, c));
    }

    #[test]
    fn defeated_fighters_go_to_recovery() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram"]);
        let temple = w.add_location("temple");
        let cfg = CombatConfig {
            recovery_location: Some("Temple".to_string()),
            ..CombatConfig::default()
        };
        let mut enc = Encounter::begin(&mut w, pit, &cfg, ids.clone()).expect("begin");
        w.set(ids[1], Attr::Health, 0);
        pass(&mut enc, &mut w);

        assert!(enc.is_over());
        assert_eq!(w.place_of(ids[1]), Some(Place::Location(temple)));
        assert_eq!(w.place_of(ids[0]), Some(Place::Location(pit)));
    }

    #[test]
    fn missing_recovery_location_is_reported() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram"]);
        let cfg = CombatConfig {
            recovery_location: Some("temple".to_string()),
            ..CombatConfig::default()
        };
        let mut enc = Encounter::begin(&mut w, pit, &cfg, ids.clone()).expect("begin");
        w.set(ids[1], Attr::Health, 0);
        pass(&mut enc, &mut w);

        assert!(enc.is_over());
        assert_eq!(w.place_of(ids[1]), Some(Place::Location(pit)));
        let problems = w
            .texts_seen_by(ids[0])
            .into_iter()
            .filter(|t| t.starts_with("[config]"))
            .count();
        assert_eq!(problems, 1);
    }

    #[test]
    fn ending_twice_is_harmless() {
        let (mut w, pit, ids) = world(&["Ayla", "Bram"]);
        let mut enc =
            Encounter::begin(&mut w, pit, &CombatConfig::default(), ids.clone()).expect("begin");
        enc.end(&mut w, EndReason::Aborted, None);
        enc.end(&mut w, EndReason::Aborted, None);
        enc.tick(&mut w);

        let ends = w
            .log()
            .iter()
            .filter(|d| matches!(d.event, Event::FightEnds { .. }))
            .count();
        assert_eq!(ends, 1);
        assert_eq!(enc.current(), None);
    }
}
