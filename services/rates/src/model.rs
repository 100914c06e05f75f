//! Rate model: factors plus time-scaled tracked items.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use realm_core::contribution::{Contribution, ContributionSet, Reduction, Target};
use realm_core::peer::{BonusExpTier, TimeWindow};
use realm_core::registry::{ContainerKey, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Rate kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    /// Experience from monsters
    Exp,
    /// Mesos dropped
    Meso,
    /// Item drop chance
    ItemDrop,
    /// Experience from quests
    QuestExp,
}

impl RateType {
    /// Every rate type.
    pub const ALL: [Self; 4] = [Self::Exp, Self::Meso, Self::ItemDrop, Self::QuestExp];

    /// Rate affected by a coupon, by template range.
    #[must_use]
    pub const fn for_coupon(template_id: u32) -> Option<Self> {
        match template_id {
            5_210_000..=5_219_999 => Some(Self::Exp),
            5_360_000..=5_369_999 => Some(Self::ItemDrop),
            _ => None,
        }
    }

    /// Rate affected by a buff stat change.
    #[must_use]
    pub fn from_buff(name: &str) -> Option<Self> {
        match name {
            "HOLY_SYMBOL" => Some(Self::Exp),
            "MESO_UP" => Some(Self::Meso),
            "DROP_RATE" => Some(Self::ItemDrop),
            _ => None,
        }
    }
}

impl Target for RateType {
    fn reduction(self) -> Reduction {
        Reduction::Multiplicative
    }
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exp => "exp",
            Self::Meso => "meso",
            Self::ItemDrop => "item_drop",
            Self::QuestExp => "quest_exp",
        };
        f.write_str(name)
    }
}

/// Source label of world-wide rates.
pub const WORLD_SOURCE: &str = "world";

/// Source label of a buff.
#[must_use]
pub fn buff_source(source_id: i32) -> String {
    format!("buff:{source_id}")
}

/// Source label of an item.
#[must_use]
pub fn item_source(template_id: u32) -> String {
    format!("item:{template_id}")
}

/// Buff percentage as a multiplier: `+50` is `1.5`.
#[must_use]
pub fn buff_multiplier(amount: i32) -> f64 {
    1.0 + f64::from(amount) / 100.0
}

/// Day abbreviation used by coupon windows.
const fn day_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

/// Whether `at` falls in one of the windows. No windows means always.
///
/// Holiday (`HOL`) windows never match; there is no holiday calendar.
#[must_use]
pub fn in_window(windows: &[TimeWindow], at: DateTime<Utc>) -> bool {
    if windows.is_empty() {
        return true;
    }
    let day = day_code(at.weekday());
    let hour = at.hour();
    windows.iter().any(|w| {
        w.day == day && hour >= u32::from(w.start_hour) && (hour < u32::from(w.end_hour) || w.end_hour >= 24)
    })
}

/// Multiplier of the highest tier reached after `hours` equipped.
#[must_use]
pub fn bonus_exp_multiplier(tiers: &[BonusExpTier], hours: i64) -> f64 {
    tiers
        .iter()
        .filter(|t| i64::from(t.term_start_hours) <= hours)
        .max_by_key(|t| t.term_start_hours)
        .map_or(1.0, |t| 1.0 + f64::from(t.inc_exp_r) / 100.0)
}

/// An item whose contribution depends on elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "itemType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TrackedItem {
    /// Equipment whose EXP bonus grows with time equipped.
    BonusExp {
        /// Item template
        template_id: u32,
        /// Tiers from the equipment data
        tiers: Vec<BonusExpTier>,
        /// When it was equipped; `None` while unequipped
        equipped_since: Option<DateTime<Utc>>,
    },
    /// Cash coupon with a fixed rate for a limited time.
    Coupon {
        /// Item template
        template_id: u32,
        /// Rate the coupon raises
        rate_type: RateType,
        /// Multiplier while active
        base_rate: f64,
        /// Lifetime in minutes; 0 means permanent
        duration_minutes: i32,
        /// When the coupon was acquired
        acquired_at: DateTime<Utc>,
        /// Weekly windows; empty means always
        windows: Vec<TimeWindow>,
    },
}

impl TrackedItem {
    /// Item template.
    #[must_use]
    pub const fn template_id(&self) -> u32 {
        match self {
            Self::BonusExp { template_id, .. } | Self::Coupon { template_id, .. } => *template_id,
        }
    }

    /// Rate the item affects.
    #[must_use]
    pub const fn rate_type(&self) -> RateType {
        match self {
            Self::BonusExp { .. } => RateType::Exp,
            Self::Coupon { rate_type, .. } => *rate_type,
        }
    }

    /// A coupon whose lifetime ended before `now`. Other items never expire.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Coupon {
                duration_minutes,
                acquired_at,
                ..
            } if *duration_minutes > 0 => {
                *acquired_at + Duration::minutes(i64::from(*duration_minutes)) < now
            },
            _ => false,
        }
    }

    /// Current multiplier (1.0 when inactive).
    #[must_use]
    pub fn multiplier(&self, now: DateTime<Utc>) -> f64 {
        match self {
            Self::BonusExp {
                tiers,
                equipped_since: Some(since),
                ..
            } => bonus_exp_multiplier(tiers, (now - *since).num_hours()),
            Self::BonusExp { .. } => 1.0,
            Self::Coupon {
                base_rate, windows, ..
            } => {
                if self.is_expired(now) || !in_window(windows, now) {
                    1.0
                } else {
                    *base_rate
                }
            },
        }
    }
}

/// One character's rates.
#[derive(Debug, Clone, PartialEq)]
pub struct RateModel {
    character_id: u32,
    world_id: u8,
    channel_id: u8,
    factors: ContributionSet<RateType>,
    items: BTreeMap<u32, TrackedItem>,
}

impl RateModel {
    /// Model with no factors.
    #[must_use]
    pub fn new(character_id: u32, world_id: u8, channel_id: u8) -> Self {
        Self {
            character_id,
            world_id,
            channel_id,
            factors: ContributionSet::new(),
            items: BTreeMap::new(),
        }
    }

    /// Character id.
    #[must_use]
    pub const fn character_id(&self) -> u32 {
        self.character_id
    }

    /// World id.
    #[must_use]
    pub const fn world_id(&self) -> u8 {
        self.world_id
    }

    /// Channel id.
    #[must_use]
    pub const fn channel_id(&self) -> u8 {
        self.channel_id
    }

    /// Stored factors (world, buffs, static items).
    #[must_use]
    pub const fn factors(&self) -> &ContributionSet<RateType> {
        &self.factors
    }

    /// Tracked items by template.
    #[must_use]
    pub const fn items(&self) -> &BTreeMap<u32, TrackedItem> {
        &self.items
    }

    /// Copy with a replaced factor set.
    #[must_use]
    pub fn with_factors(&self, factors: ContributionSet<RateType>) -> Self {
        Self {
            factors,
            ..self.clone()
        }
    }

    /// Copy tracking `item`, replacing any item with the same template.
    #[must_use]
    pub fn with_item(&self, item: TrackedItem) -> Self {
        let mut next = self.clone();
        next.items.insert(item.template_id(), item);
        next
    }

    /// Copy without the item of `template_id`.
    #[must_use]
    pub fn without_item(&self, template_id: u32) -> Self {
        let mut next = self.clone();
        next.items.remove(&template_id);
        next
    }

    /// Copy without coupons expired at `now`.
    #[must_use]
    pub fn without_expired(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.items.retain(|_, item| !item.is_expired(now));
        next
    }

    /// Templates of coupons expired at `now`.
    #[must_use]
    pub fn expired_items(&self, now: DateTime<Utc>) -> Vec<u32> {
        self.items
            .values()
            .filter(|item| item.is_expired(now))
            .map(TrackedItem::template_id)
            .collect()
    }

    /// Factors of tracked items at `now`; neutral items are omitted.
    #[must_use]
    pub fn item_factors(&self, now: DateTime<Utc>) -> Vec<Contribution<RateType>> {
        self.items
            .values()
            .filter_map(|item| {
                let multiplier = item.multiplier(now);
                #[allow(clippy::float_cmp)]
                let neutral = multiplier == 1.0;
                (!neutral).then(|| {
                    Contribution::multiplier(item_source(item.template_id()), item.rate_type(), multiplier)
                })
            })
            .collect()
    }

    /// Stored and item factors together, as evaluated at `now`.
    #[must_use]
    pub fn all_factors(&self, now: DateTime<Utc>) -> ContributionSet<RateType> {
        self.factors.with_many(self.item_factors(now))
    }

    /// Computed rates at `now`.
    #[must_use]
    pub fn rates(&self, now: DateTime<Utc>) -> BTreeMap<RateType, f64> {
        self.all_factors(now)
            .compute(RateType::ALL, &BTreeMap::new())
            .values()
            .clone()
    }
}

impl Record for RateModel {
    type Id = u32;
    const KIND: &'static str = "rates";

    fn id(&self) -> u32 {
        self.character_id
    }

    fn participants(&self) -> Vec<u32> {
        vec![self.character_id]
    }

    fn containers(&self) -> Vec<ContainerKey> {
        vec![ContainerKey::World(self.world_id)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        // 2025-01-01 is a Wednesday
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).single().unwrap_or_default()
    }

    fn window(day: &str, start_hour: u8, end_hour: u8) -> TimeWindow {
        TimeWindow {
            day: day.to_string(),
            start_hour,
            end_hour,
        }
    }

    fn coupon(duration_minutes: i32, windows: Vec<TimeWindow>) -> TrackedItem {
        TrackedItem::Coupon {
            template_id: 5_211_000,
            rate_type: RateType::Exp,
            base_rate: 2.0,
            duration_minutes,
            acquired_at: at(1, 0),
            windows,
        }
    }

    #[test]
    fn coupon_template_ranges() {
        assert_eq!(RateType::for_coupon(5_211_048), Some(RateType::Exp));
        assert_eq!(RateType::for_coupon(5_360_000), Some(RateType::ItemDrop));
        assert_eq!(RateType::for_coupon(5_220_000), None);
    }

    #[test]
    fn windows_match_day_and_hour() {
        let windows = vec![window("WED", 18, 24), window("SAT", 0, 6)];
        assert!(in_window(&windows, at(1, 18)));
        assert!(in_window(&windows, at(1, 23)));
        assert!(!in_window(&windows, at(1, 17)));
        assert!(in_window(&windows, at(4, 5)));
        assert!(!in_window(&windows, at(4, 6)));
        assert!(in_window(&[], at(2, 3)));
    }

    #[test]
    fn holiday_windows_never_match() {
        assert!(!in_window(&[window("HOL", 0, 24)], at(1, 12)));
    }

    #[test]
    fn coupon_expires_after_duration() {
        let item = coupon(60, Vec::new());
        assert!(!item.is_expired(at(1, 1)));
        assert!(item.is_expired(at(1, 2)));
        assert!((item.multiplier(at(1, 0)) - 2.0).abs() < f64::EPSILON);
        assert!((item.multiplier(at(1, 2)) - 1.0).abs() < f64::EPSILON);
        assert!(!coupon(0, Vec::new()).is_expired(at(31, 0)));
    }

    #[test]
    fn bonus_exp_uses_highest_reached_tier() {
        let tiers = [
            BonusExpTier { inc_exp_r: 10, term_start_hours: 0 },
            BonusExpTier { inc_exp_r: 20, term_start_hours: 1 },
            BonusExpTier { inc_exp_r: 30, term_start_hours: 3 },
        ];
        assert!((bonus_exp_multiplier(&tiers, 0) - 1.1).abs() < 1e-9);
        assert!((bonus_exp_multiplier(&tiers, 2) - 1.2).abs() < 1e-9);
        assert!((bonus_exp_multiplier(&tiers, 50) - 1.3).abs() < 1e-9);
        assert!((bonus_exp_multiplier(&[], 50) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rates_multiply_world_buff_and_items() {
        let model = RateModel::new(7, 0, 1)
            .with_factors(
                ContributionSet::new()
                    .with(Contribution::multiplier(WORLD_SOURCE, RateType::Exp, 2.0))
                    .with(Contribution::multiplier(buff_source(2_311_003), RateType::Exp, 1.5)),
            )
            .with_item(coupon(0, Vec::new()));

        let rates = model.rates(at(1, 0));
        assert!((rates[&RateType::Exp] - 6.0).abs() < 1e-9);
        assert!((rates[&RateType::Meso] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn inactive_items_are_omitted() {
        let model = RateModel::new(7, 0, 1).with_item(coupon(0, vec![window("MON", 0, 24)]));
        assert!(model.item_factors(at(1, 12)).is_empty());
    }

    proptest! {
        #[test]
        fn rates_never_drop_below_zero(multipliers in prop::collection::vec(0.0_f64..5.0, 0..6)) {
            let factors: ContributionSet<RateType> = multipliers
                .iter()
                .enumerate()
                .map(|(i, m)| Contribution::multiplier(format!("buff:{i}"), RateType::Meso, *m))
                .collect();
            let rates = RateModel::new(1, 0, 0).with_factors(factors).rates(at(1, 0));
            prop_assert!(rates[&RateType::Meso] >= 0.0);
        }
    }
}
