//! Contribution aggregation.
//!
//! Authoritative state for stats and rates is a bag of contributions, each
//! labelled with the source that produced it. The observable value is a fold
//! over that bag:
//!
//! ```text
//!   Additive       floor((base + Σ amount) × (1 + Σ multiplier)), clamped at 0
//!   Multiplicative base × Π multiplier   (a zero multiplier counts as 1.0)
//! ```
//!
//! [`ContributionSet`] is copy-on-write: every mutation returns a new set and
//! leaves the receiver untouched, so a registry record never exposes a
//! half-applied change.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

/// How contributions of one target fold into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// `floor((base + Σ amount) × (1 + Σ multiplier))`, floor-clamped at 0
    Additive,
    /// `base × Π multiplier`, base defaults to 1.0
    Multiplicative,
}

/// A stat or rate type that contributions can target.
pub trait Target: Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static {
    /// Reduction applied to contributions of this target.
    fn reduction(self) -> Reduction;

    /// Default base when none is supplied.
    fn default_base(self) -> f64 {
        match self.reduction() {
            Reduction::Additive => 0.0,
            Reduction::Multiplicative => 1.0,
        }
    }
}

/// A named quantity attached to an entity.
///
/// Unique within a set by `(source, target)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution<T> {
    /// Origin label, e.g. `equipment:1234`, `buff:2311003`, `world`
    pub source: String,
    /// Affected stat or rate
    pub target: T,
    /// Flat amount (ignored by multiplicative targets)
    pub amount: i32,
    /// Multiplier; additive targets read `0.10` as +10%, multiplicative
    /// targets read it as a factor
    pub multiplier: f64,
}

impl<T> Contribution<T> {
    /// A flat contribution.
    #[must_use]
    pub fn flat(source: impl Into<String>, target: T, amount: i32) -> Self {
        Self {
            source: source.into(),
            target,
            amount,
            multiplier: 0.0,
        }
    }

    /// A multiplier contribution.
    #[must_use]
    pub fn multiplier(source: impl Into<String>, target: T, multiplier: f64) -> Self {
        Self {
            source: source.into(),
            target,
            amount: 0,
            multiplier,
        }
    }
}

impl<T: PartialEq> Contribution<T> {
    fn same_key(&self, source: &str, target: &T) -> bool {
        self.source == source && &self.target == target
    }
}

/// Copy-on-write bag of contributions.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributionSet<T> {
    entries: Vec<Contribution<T>>,
}

impl<T> Default for ContributionSet<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Target> ContributionSet<T> {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by `(source, target)`.
    #[must_use]
    pub fn with(&self, contribution: Contribution<T>) -> Self {
        let mut next = self.clone();
        next.insert(contribution);
        next
    }

    /// Apply [`with`](Self::with) for each contribution in order; the last
    /// duplicate wins.
    #[must_use]
    pub fn with_many(&self, contributions: impl IntoIterator<Item = Contribution<T>>) -> Self {
        let mut next = self.clone();
        for contribution in contributions {
            next.insert(contribution);
        }
        next
    }

    /// Drop the `(source, target)` contribution if present.
    #[must_use]
    pub fn without(&self, source: &str, target: T) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|c| !c.same_key(source, &target))
                .cloned()
                .collect(),
        }
    }

    /// Drop every contribution from `source`.
    #[must_use]
    pub fn without_source(&self, source: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|c| c.source != source)
                .cloned()
                .collect(),
        }
    }

    fn insert(&mut self, contribution: Contribution<T>) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|c| c.same_key(&contribution.source, &contribution.target))
        {
            *existing = contribution;
        } else {
            self.entries.push(contribution);
        }
    }

    /// Copy of every contribution, in insertion order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Contribution<T>> {
        self.entries.clone()
    }

    /// Iterate contributions without copying.
    pub fn iter(&self) -> impl Iterator<Item = &Contribution<T>> {
        self.entries.iter()
    }

    /// Contributions from one source.
    #[must_use]
    pub fn from_source(&self, source: &str) -> Vec<Contribution<T>> {
        self.entries
            .iter()
            .filter(|c| c.source == source)
            .cloned()
            .collect()
    }

    /// Whether any contribution comes from `source`.
    #[must_use]
    pub fn has_source(&self, source: &str) -> bool {
        self.entries.iter().any(|c| c.source == source)
    }

    /// Number of contributions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Additive fold for one target.
    #[must_use]
    pub fn compute_additive(&self, target: T, base: i64) -> u32 {
        let (flat, multiplier) = self
            .entries
            .iter()
            .filter(|c| c.target == target)
            .fold((0_i64, 0.0_f64), |(flat, mult), c| {
                (flat + i64::from(c.amount), mult + c.multiplier)
            });
        #[allow(clippy::cast_precision_loss)]
        let value = ((base + flat) as f64 * (1.0 + multiplier)).floor();
        if value <= 0.0 {
            0
        } else if value >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let value = value as u32;
            value
        }
    }

    /// Multiplicative fold for one target.
    #[must_use]
    pub fn compute_multiplicative(&self, target: T, base: f64) -> f64 {
        self.entries
            .iter()
            .filter(|c| c.target == target)
            .fold(base, |acc, c| {
                if c.multiplier == 0.0 {
                    acc
                } else {
                    acc * c.multiplier
                }
            })
    }

    /// Fold every target in `targets` against `base`, using each target's
    /// reduction. Targets missing from `base` use [`Target::default_base`].
    #[must_use]
    pub fn compute(
        &self,
        targets: impl IntoIterator<Item = T>,
        base: &BTreeMap<T, f64>,
    ) -> Computed<T> {
        let values = targets
            .into_iter()
            .map(|target| {
                let base_value = base
                    .get(&target)
                    .copied()
                    .unwrap_or_else(|| target.default_base());
                let value = match target.reduction() {
                    #[allow(clippy::cast_possible_truncation)]
                    Reduction::Additive => {
                        f64::from(self.compute_additive(target, base_value.floor() as i64))
                    },
                    Reduction::Multiplicative => self.compute_multiplicative(target, base_value),
                };
                (target, value)
            })
            .collect();
        Computed { values }
    }
}

impl<T: Target> FromIterator<Contribution<T>> for ContributionSet<T> {
    fn from_iter<I: IntoIterator<Item = Contribution<T>>>(iter: I) -> Self {
        Self::new().with_many(iter)
    }
}

/// Result of [`ContributionSet::compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct Computed<T> {
    values: BTreeMap<T, f64>,
}

impl<T: Target> Computed<T> {
    /// Value for an additive target (0 when absent).
    #[must_use]
    pub fn stat(&self, target: T) -> u32 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        self.values.get(&target).map_or(0, |v| *v as u32)
    }

    /// Value for a multiplicative target (1.0 when absent).
    #[must_use]
    pub fn rate(&self, target: T) -> f64 {
        self.values.get(&target).copied().unwrap_or(1.0)
    }

    /// Raw value map.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<T, f64> {
        &self.values
    }
}
