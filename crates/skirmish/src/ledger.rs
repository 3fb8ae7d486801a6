//! Per-turn action budgets.
//!
//! `spend` is the only way a budget goes down. The encounter runs its
//! end-of-turn check right after every spend.

use std::collections::HashMap;

use serde::Serialize;

use crate::host::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionReason {
    Attack,
    Shoot,
    Approach,
    Withdraw,
    Cast,
    Drop,
    Get,
    Pass,
    Disengage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spend {
    Actions(u32),
    All,
}

#[derive(Debug, Clone, Default)]
struct Budget {
    remaining: u32,
    last: Option<ActionReason>,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    allowance: u32,
    budgets: HashMap<ObjectId, Budget>,
}

impl Ledger {
    pub fn new(allowance: u32) -> Self {
        Self {
            allowance: allowance.max(1),
            budgets: HashMap::new(),
        }
    }

    pub fn allowance(&self) -> u32 {
        self.allowance
    }

    /// Starts tracking `id` with an empty budget and no last action.
    pub fn enroll(&mut self, id: ObjectId) {
        self.budgets.entry(id).or_default();
    }

    /// Grants the full allowance at the start of `id`'s turn.
    pub fn grant_turn(&mut self, id: ObjectId) {
        self.budgets.entry(id).or_default().remaining = self.allowance;
    }

    /// Records `reason` and takes from the budget, flooring at 0.
    /// Returns what is left, or `None` if `id` isn't tracked.
    pub fn spend(&mut self, id: ObjectId, amount: Spend, reason: ActionReason) -> Option<u32> {
        let b = self.budgets.get_mut(&id)?;
        b.last = Some(reason);
        b.remaining = match amount {
            Spend::Actions(n) => b.remaining.saturating_sub(n),
            Spend::All => 0,
        };
        Some(b.remaining)
    }

    pub fn remaining(&self, id: ObjectId) -> u32 {
        self.budgets.get(&id).map_or(0, |b| b.remaining)
    }

    pub fn last_action(&self, id: ObjectId) -> Option<ActionReason> {
        self.budgets.get(&id).and_then(|b| b.last)
    }

    pub fn all_disengaged(&self, ids: &[ObjectId]) -> bool {
        !ids.is_empty()
            && ids
                .iter()
                .all(|id| self.last_action(*id) == Some(ActionReason::Disengage))
    }

    pub fn remove(&mut self, id: ObjectId) {
        self.budgets.remove(&id);
    }

    pub fn clear(&mut self) {
        self.budgets.clear();
    }
}
