//! Relative positions between everything sharing one location.
//!
//! There are no coordinates. Each pair of objects carries a distance of
//! 0 (engaged), 1 (reach) or 2 (range). Moves are relative to one target and
//! cascade to every third object so the graph never contradicts itself.
//!
//! Objects live in a small arena: `slots[i]` is the object at index `i` and
//! `cells` is a flat `n * n` symmetric matrix. Rows are created on entry and
//! dropped when an object leaves.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::host::ObjectId;
use crate::rng::Rng64;

pub const MAX_DISTANCE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    Engaged,
    Reach,
    Range,
}

impl Distance {
    pub fn from_raw(v: u8) -> Self {
        match v {
            0 => Distance::Engaged,
            1 => Distance::Reach,
            _ => Distance::Range,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Distance::Engaged => 0,
            Distance::Reach => 1,
            Distance::Range => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Distance::Engaged => "engaged",
            Distance::Reach => "reach",
            Distance::Range => "range",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionGraph {
    slots: Vec<ObjectId>,
    index: HashMap<ObjectId, usize>,
    cells: Vec<u8>,
}

impl PositionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the opening layout: everything starts at reach from everything
    /// else, except exits, which start at range.
    pub fn initialize(objects: impl IntoIterator<Item = (ObjectId, bool)>) -> Self {
        let mut ids = Vec::new();
        let mut exits = Vec::new();
        for (id, is_exit) in objects {
            if ids.contains(&id) {
                continue;
            }
            ids.push(id);
            exits.push(is_exit);
        }

        let n = ids.len();
        let mut cells = vec![0u8; n * n];
        for i in 0..n {
            for j in 0..n {
                cells[i * n + j] = if i == j {
                    0
                } else if exits[i] || exits[j] {
                    MAX_DISTANCE
                } else {
                    1
                };
            }
        }

        let index = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        Self {
            slots: ids,
            index,
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn members(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.slots.iter().copied()
    }

    /// `None` when either object has no row in this graph.
    pub fn distance(&self, a: ObjectId, b: ObjectId) -> Option<Distance> {
        let i = *self.index.get(&a)?;
        let j = *self.index.get(&b)?;
        Some(Distance::from_raw(self.at(i, j)))
    }

    /// Distances from `id` to every other object, in arena order.
    pub fn row(&self, id: ObjectId) -> Option<Vec<(ObjectId, Distance)>> {
        let i = *self.index.get(&id)?;
        Some(
            (0..self.len())
                .filter(|&j| j != i)
                .map(|j| (self.slots[j], Distance::from_raw(self.at(i, j))))
                .collect(),
        )
    }

    /// Adds `id` at the anchor's spot (a random member when no anchor is
    /// given), then withdraws it from the anchor `extra` times.
    ///
    /// Returns false when `id` already has a row.
    pub fn join(
        &mut self,
        id: ObjectId,
        anchor: Option<ObjectId>,
        extra: u8,
        rng: &mut Rng64,
    ) -> bool {
        if self.contains(id) {
            return false;
        }

        let anchor = match anchor.filter(|a| self.contains(*a)) {
            Some(a) => Some(a),
            None if self.is_empty() => None,
            None => Some(self.slots[rng.pick(self.len())]),
        };

        let new_i = self.grow(id);
        let Some(anchor) = anchor else {
            return true;
        };
        let Some(&a_i) = self.index.get(&anchor) else {
            return true;
        };

        self.merge(new_i, a_i);
        for _ in 0..extra {
            self.withdraw_idx(new_i, a_i);
        }
        true
    }

    /// Drops `id`'s row. Returns false if it had none.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Some(gone) = self.index.remove(&id) else {
            return false;
        };

        let n = self.len();
        let mut cells = Vec::with_capacity((n - 1) * (n - 1));
        for i in (0..n).filter(|&i| i != gone) {
            for j in (0..n).filter(|&j| j != gone) {
                cells.push(self.at(i, j));
            }
        }
        self.slots.remove(gone);
        self.cells = cells;
        self.index = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        true
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.cells.clear();
    }

    /// Moves `mover` one step toward `target`, dragging its distances to
    /// third objects along. Once engaged, the mover shares the target's spot.
    ///
    /// Returns the resulting distance, or `None` if either has no row.
    pub fn approach(&mut self, mover: ObjectId, target: ObjectId) -> Option<Distance> {
        let m = *self.index.get(&mover)?;
        let t = *self.index.get(&target)?;
        if m == t {
            return Some(Distance::Engaged);
        }

        for x in 0..self.len() {
            if x == m || x == t {
                continue;
            }
            let dm = self.at(m, x);
            let dt = self.at(t, x);
            if dm > dt {
                self.step_closer(m, x);
            } else if dm < dt {
                self.put(m, x, dm + 1);
            }
        }
        if self.at(m, t) > 0 {
            self.step_closer(m, t);
        } else {
            self.merge(m, t);
        }

        Some(Distance::from_raw(self.at(m, t)))
    }

    /// Moves `mover` one step away from `target`. Never brings the mover
    /// closer to anything.
    pub fn withdraw(&mut self, mover: ObjectId, target: ObjectId) -> Option<Distance> {
        let m = *self.index.get(&mover)?;
        let t = *self.index.get(&target)?;
        if m == t {
            return Some(Distance::Engaged);
        }
        self.withdraw_idx(m, t);
        Some(Distance::from_raw(self.at(m, t)))
    }

    fn withdraw_idx(&mut self, m: usize, t: usize) {
        for x in 0..self.len() {
            if x == m || x == t {
                continue;
            }
            // Things between us and the target fall behind.
            if self.at(m, x) >= self.at(t, x) && self.at(m, x) < self.at(m, t) {
                self.step_away(m, x);
            }
            // Anything the target is tangled with.
            if self.at(t, x) == 0 {
                self.step_away(m, x);
            }
            // Anything we were tangled with.
            if self.at(m, x) == 0 {
                self.step_away(m, x);
            }
        }
        self.step_away(m, t);
    }

    fn step_closer(&mut self, a: usize, b: usize) {
        let v = self.at(a, b).saturating_sub(1);
        self.put(a, b, v);
        if v == 0 {
            self.merge(a, b);
        }
    }

    fn step_away(&mut self, a: usize, b: usize) {
        let v = self.at(a, b).saturating_add(1);
        self.put(a, b, v);
    }

    /// `a` takes `b`'s place: same distances to everything, engaged with `b`.
    fn merge(&mut self, a: usize, b: usize) {
        for x in 0..self.len() {
            if x == a {
                continue;
            }
            let v = if x == b { 0 } else { self.at(b, x) };
            self.put(a, x, v);
        }
    }

    fn at(&self, i: usize, j: usize) -> u8 {
        self.cells[i * self.len() + j]
    }

    fn put(&mut self, i: usize, j: usize, v: u8) {
        if i == j {
            return;
        }
        let n = self.len();
        let v = v.min(MAX_DISTANCE);
        self.cells[i * n + j] = v;
        self.cells[j * n + i] = v;
    }

    fn grow(&mut self, id: ObjectId) -> usize {
        let n = self.len();
        let mut cells = vec![MAX_DISTANCE; (n + 1) * (n + 1)];
        for i in 0..n {
            for j in 0..n {
                cells[i * (n + 1) + j] = self.cells[i * n + j];
            }
        }
        cells[n * (n + 1) + n] = 0;
        self.cells = cells;
        self.slots.push(id);
        self.index.insert(id, n);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u64) -> Vec<ObjectId> {
        (1..=n).map(ObjectId).collect()
    }

    fn graph(n: u64) -> PositionGraph {
        PositionGraph::initialize(ids(n).into_iter().map(|id| (id, false)))
    }

    fn raw(g: &PositionGraph, a: u64, b: u64) -> u8 {
        g.distance(ObjectId(a), ObjectId(b))
            .map(Distance::raw)
            .unwrap_or(u8::MAX)
    }

    fn assert_consistent(g: &PositionGraph) {
        let members = g.members().collect::<Vec<_>>();
        for &a in &members {
            assert_eq!(g.distance(a, a), Some(Distance::Engaged));
            for &b in &members {
                let ab = g.distance(a, b);
                assert_eq!(ab, g.distance(b, a), "asymmetric {a} {b}");
                assert!(ab.is_some_and(|d| d.raw() <= MAX_DISTANCE));
            }
        }
    }

    #[test]
    fn initialize_puts_exits_at_the_edge() {
        let g = PositionGraph::initialize([
            (ObjectId(1), false),
            (ObjectId(2), false),
            (ObjectId(3), true),
        ]);
        assert_eq!(raw(&g, 1, 1), 0);
        assert_eq!(raw(&g, 1, 2), 1);
        assert_eq!(raw(&g, 1, 3), 2);
        assert_eq!(raw(&g, 3, 2), 2);
        assert_consistent(&g);
    }

    #[test]
    fn unknown_objects_have_no_distance() {
        let g = graph(2);
        assert_eq!(g.distance(ObjectId(1), ObjectId(99)), None);
        assert_eq!(g.distance(ObjectId(99), ObjectId(99)), None);
    }

    #[test]
    fn approach_engages_and_copies_target_row() {
        let mut g = graph(3);
        // 2 and 3 are tangled up; 1 walks over.
        assert_eq!(g.approach(ObjectId(2), ObjectId(3)), Some(Distance::Engaged));
        assert_eq!(raw(&g, 1, 2), 1);
        assert_eq!(raw(&g, 1, 3), 1);

        assert_eq!(g.approach(ObjectId(1), ObjectId(2)), Some(Distance::Engaged));
        assert_eq!(raw(&g, 1, 2), 0);
        // Joining 2 means joining whoever 2 is engaged with.
        assert_eq!(raw(&g, 1, 3), 0);
        assert_consistent(&g);
    }

    #[test]
    fn approach_converges_on_target_row() {
        let mut g = PositionGraph::initialize([
            (ObjectId(1), false),
            (ObjectId(2), false),
            (ObjectId(3), false),
            (ObjectId(4), true),
        ]);
        g.withdraw(ObjectId(1), ObjectId(2));
        assert_eq!(raw(&g, 1, 2), 2);

        let mut steps = 0;
        while raw(&g, 1, 2) > 0 {
            g.approach(ObjectId(1), ObjectId(2));
            steps += 1;
            assert!(steps <= 2);
            assert_consistent(&g);
        }
        for x in [3, 4] {
            assert_eq!(raw(&g, 1, x), raw(&g, 2, x), "object {x}");
        }
    }

    #[test]
    fn approach_pushes_away_from_things_far_from_target() {
        let mut g = PositionGraph::initialize([
            (ObjectId(1), false),
            (ObjectId(2), false),
            (ObjectId(3), false),
        ]);
        // 2 backs away from 3, leaving 1 closer to 3 than 2 is.
        g.withdraw(ObjectId(2), ObjectId(3));
        assert_eq!(raw(&g, 2, 3), 2);
        assert_eq!(raw(&g, 1, 3), 1);

        g.approach(ObjectId(1), ObjectId(2));
        assert_eq!(raw(&g, 1, 3), 2);
        assert_consistent(&g);
    }

    #[test]
    fn withdraw_caps_and_never_closes_distance() {
        let mut g = graph(4);
        g.approach(ObjectId(1), ObjectId(2));
        g.approach(ObjectId(3), ObjectId(2));

        for _ in 0..4 {
            let before = g.row(ObjectId(1)).unwrap_or_default();
            g.withdraw(ObjectId(1), ObjectId(2));
            let after = g.row(ObjectId(1)).unwrap_or_default();
            for ((id_b, d_b), (id_a, d_a)) in before.iter().zip(after.iter()) {
                assert_eq!(id_b, id_a);
                assert!(d_a >= d_b, "{id_a} moved closer");
            }
            assert_consistent(&g);
        }
        assert_eq!(raw(&g, 1, 2), 2);
        // Withdrawing from 2 also left 3, who was engaged with both.
        assert_eq!(raw(&g, 1, 3), 2);
    }

    #[test]
    fn join_copies_anchor_then_steps_out() {
        let mut rng = Rng64::from_seed(3);
        let mut g = graph(3);
        g.approach(ObjectId(1), ObjectId(2));

        assert!(g.join(ObjectId(9), Some(ObjectId(3)), 0, &mut rng));
        assert_eq!(raw(&g, 9, 3), 0);
        assert_eq!(raw(&g, 9, 1), raw(&g, 3, 1));
        assert!(!g.join(ObjectId(9), None, 0, &mut rng));

        assert!(g.join(ObjectId(10), Some(ObjectId(1)), 2, &mut rng));
        assert_eq!(raw(&g, 10, 1), 2);
        assert_eq!(raw(&g, 10, 10), 0);
        assert_consistent(&g);
    }

    #[test]
    fn join_without_anchor_uses_some_member() {
        let mut rng = Rng64::from_seed(11);
        let mut g = PositionGraph::new();
        assert!(g.join(ObjectId(1), None, 0, &mut rng));
        assert!(g.join(ObjectId(2), None, 0, &mut rng));
        assert_eq!(raw(&g, 1, 2), 0);
        assert_consistent(&g);
    }

    #[test]
    fn remove_drops_row_and_keeps_the_rest() {
        let mut g = graph(4);
        g.approach(ObjectId(4), ObjectId(3));
        g.withdraw(ObjectId(1), ObjectId(3));
        let d14 = raw(&g, 1, 4);

        assert!(g.remove(ObjectId(2)));
        assert!(!g.remove(ObjectId(2)));
        assert_eq!(g.len(), 3);
        assert_eq!(g.distance(ObjectId(2), ObjectId(1)), None);
        assert_eq!(raw(&g, 1, 4), d14);
        assert_eq!(raw(&g, 4, 3), 0);
        assert_consistent(&g);
    }

    #[test]
    fn random_walk_keeps_every_invariant() {
        let mut rng = Rng64::from_seed(99);
        let mut g = PositionGraph::initialize([
            (ObjectId(1), false),
            (ObjectId(2), false),
            (ObjectId(3), false),
            (ObjectId(4), false),
            (ObjectId(5), true),
        ]);
        for _ in 0..500 {
            let a = rng.roll_range(1, 5) as u64;
            let b = rng.roll_range(1, 5) as u64;
            let before = g.row(ObjectId(a)).unwrap_or_default();

            if rng.pick(2) == 0 {
                let now = g.approach(ObjectId(a), ObjectId(b));
                if a != b && now == Some(Distance::Engaged) {
                    for x in (1..=5).filter(|x| *x != a && *x != b) {
                        assert_eq!(raw(&g, a, x), raw(&g, b, x), "{a} onto {b}, object {x}");
                    }
                }
            } else {
                g.withdraw(ObjectId(a), ObjectId(b));
                let after = g.row(ObjectId(a)).unwrap_or_default();
                for ((id, d_b), (_, d_a)) in before.iter().zip(after.iter()) {
                    assert!(d_a >= d_b, "{a} withdrew from {b} and got closer to {id}");
                }
            }
            assert_consistent(&g);
        }
    }
}
