//! Clear-condition evaluation.

use crate::definition::{Condition, ConditionType, Operator};
use crate::model::StageState;

impl Operator {
    /// Compare an observed value against a threshold.
    #[must_use]
    pub const fn compare(self, actual: u32, expected: u32) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Lt => actual < expected,
            Self::Le => actual <= expected,
            Self::Gt => actual > expected,
            Self::Ge => actual >= expected,
            Self::Unknown => false,
        }
    }
}

impl Condition {
    /// Whether the stage counters satisfy this condition.
    #[must_use]
    pub fn holds(&self, state: &StageState) -> bool {
        let actual = match self.kind {
            ConditionType::Item => state.item_counts.get(&self.reference_id).copied().unwrap_or(0),
            ConditionType::MonsterKill => state.monster_kills.get(&self.reference_id).copied().unwrap_or(0),
            ConditionType::CustomData => state.custom_number(&self.reference_key),
            ConditionType::Unknown => return true,
        };
        self.operator.compare(actual, self.value)
    }
}

/// Whether every condition holds. An empty list always does.
#[must_use]
pub fn satisfied(conditions: &[Condition], state: &StageState) -> bool {
    conditions.iter().all(|c| c.holds(state))
}
