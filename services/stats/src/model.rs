//! Effective-statistics model.
//!
//! A [`StatModel`] is a character's base values plus a [`ContributionSet`] of
//! bonuses. Every stat uses the additive reduction
//! `floor((base + Σ amount) × (1 + Σ multiplier))`, and the computed values are
//! refreshed whenever the base or the bonuses change.

use realm_core::contribution::{Contribution, ContributionSet, Reduction, Target};
use realm_core::peer::{CharacterData, EquipmentStats, SkillEffect, StatChange};
use realm_core::registry::{ContainerKey, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A statistic a bonus can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatType {
    /// Strength
    Strength,
    /// Dexterity
    Dexterity,
    /// Luck
    Luck,
    /// Intelligence
    Intelligence,
    /// Max HP
    MaxHp,
    /// Max MP
    MaxMp,
    /// Weapon attack
    WeaponAttack,
    /// Weapon defense
    WeaponDefense,
    /// Magic attack
    MagicAttack,
    /// Magic defense
    MagicDefense,
    /// Accuracy
    Accuracy,
    /// Avoidability
    Avoidability,
    /// Speed
    Speed,
    /// Jump
    Jump,
}

impl StatType {
    /// Every stat, in display order.
    pub const ALL: [Self; 14] = [
        Self::Strength,
        Self::Dexterity,
        Self::Luck,
        Self::Intelligence,
        Self::MaxHp,
        Self::MaxMp,
        Self::WeaponAttack,
        Self::WeaponDefense,
        Self::MagicAttack,
        Self::MagicDefense,
        Self::Accuracy,
        Self::Avoidability,
        Self::Speed,
        Self::Jump,
    ];

    /// Stat named by a passive skill statup alias (`STR`, `MHP`, `PAD`, ...).
    #[must_use]
    pub fn from_statup(name: &str) -> Option<Self> {
        let stat = match name {
            "STR" => Self::Strength,
            "DEX" => Self::Dexterity,
            "INT" => Self::Intelligence,
            "LUK" => Self::Luck,
            "MHP" => Self::MaxHp,
            "MMP" => Self::MaxMp,
            "PAD" => Self::WeaponAttack,
            "MAD" => Self::MagicAttack,
            "PDD" => Self::WeaponDefense,
            "MDD" => Self::MagicDefense,
            "ACC" => Self::Accuracy,
            "EVA" => Self::Avoidability,
            "SPEED" => Self::Speed,
            "JUMP" => Self::Jump,
            _ => return None,
        };
        Some(stat)
    }
}

impl Target for StatType {
    fn reduction(self) -> Reduction {
        Reduction::Additive
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Strength => "strength",
            Self::Dexterity => "dexterity",
            Self::Luck => "luck",
            Self::Intelligence => "intelligence",
            Self::MaxHp => "max_hp",
            Self::MaxMp => "max_mp",
            Self::WeaponAttack => "weapon_attack",
            Self::WeaponDefense => "weapon_defense",
            Self::MagicAttack => "magic_attack",
            Self::MagicDefense => "magic_defense",
            Self::Accuracy => "accuracy",
            Self::Avoidability => "avoidability",
            Self::Speed => "speed",
            Self::Jump => "jump",
        };
        f.write_str(name)
    }
}

/// How a buff stat change applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuffEffect {
    /// Flat amount
    Flat(StatType),
    /// Percentage of the stat (`amount / 100`)
    Percent(StatType),
}

impl BuffEffect {
    /// Effect of a buff stat name, `None` for names that do not touch stats.
    #[must_use]
    pub fn from_buff(name: &str) -> Option<Self> {
        let effect = match name {
            "PAD" | "WEAPON_ATTACK" => Self::Flat(StatType::WeaponAttack),
            "MAD" | "MAGIC_ATTACK" => Self::Flat(StatType::MagicAttack),
            "PDD" | "WEAPON_DEFENSE" => Self::Flat(StatType::WeaponDefense),
            "MDD" | "MAGIC_DEFENSE" => Self::Flat(StatType::MagicDefense),
            "ACC" | "ACCURACY" => Self::Flat(StatType::Accuracy),
            "AVOID" | "EVA" | "AVOIDABILITY" => Self::Flat(StatType::Avoidability),
            "SPEED" => Self::Flat(StatType::Speed),
            "JUMP" => Self::Flat(StatType::Jump),
            "HYPER_BODY_HP" => Self::Percent(StatType::MaxHp),
            "HYPER_BODY_MP" => Self::Percent(StatType::MaxMp),
            "MAPLE_WARRIOR" => Self::Percent(StatType::Strength),
            _ => return None,
        };
        Some(effect)
    }
}

/// Source label of an equipped asset.
#[must_use]
pub fn equipment_source(asset_id: u32) -> String {
    format!("equipment:{asset_id}")
}

/// Source label of a buff.
#[must_use]
pub fn buff_source(source_id: i32) -> String {
    format!("buff:{source_id}")
}

/// Source label of a passive skill.
#[must_use]
pub fn passive_source(skill_id: u32) -> String {
    format!("passive:{skill_id}")
}

/// Contributions of an equipped asset; only positive stats count.
#[must_use]
pub fn equipment_bonuses(asset_id: u32, stats: &EquipmentStats) -> Vec<Contribution<StatType>> {
    let source = equipment_source(asset_id);
    [
        (StatType::Strength, stats.strength),
        (StatType::Dexterity, stats.dexterity),
        (StatType::Intelligence, stats.intelligence),
        (StatType::Luck, stats.luck),
        (StatType::MaxHp, stats.hp),
        (StatType::MaxMp, stats.mp),
        (StatType::WeaponAttack, stats.weapon_attack),
        (StatType::MagicAttack, stats.magic_attack),
        (StatType::WeaponDefense, stats.weapon_defense),
        (StatType::MagicDefense, stats.magic_defense),
        (StatType::Accuracy, stats.accuracy),
        (StatType::Avoidability, stats.avoidability),
        (StatType::Speed, stats.speed),
        (StatType::Jump, stats.jump),
    ]
    .into_iter()
    .filter(|(_, amount)| *amount > 0)
    .map(|(stat, amount)| Contribution::flat(source.clone(), stat, i32::from(amount)))
    .collect()
}

/// Contributions of a buff's stat changes. Unknown names are skipped.
#[must_use]
pub fn buff_bonuses(source_id: i32, changes: &[StatChange]) -> Vec<Contribution<StatType>> {
    let source = buff_source(source_id);
    changes
        .iter()
        .filter_map(|change| {
            BuffEffect::from_buff(&change.kind).map(|effect| match effect {
                BuffEffect::Flat(stat) => Contribution::flat(source.clone(), stat, change.amount),
                BuffEffect::Percent(stat) => {
                    Contribution::multiplier(source.clone(), stat, f64::from(change.amount) / 100.0)
                },
            })
        })
        .collect()
}

/// Contributions of a passive skill effect at the learned level.
///
/// HP and MP count only when positive; other fields count when non-zero.
#[must_use]
pub fn passive_bonuses(skill_id: u32, effect: &SkillEffect) -> Vec<Contribution<StatType>> {
    let source = passive_source(skill_id);
    let mut bonuses: Vec<Contribution<StatType>> = [
        (StatType::WeaponAttack, effect.weapon_attack),
        (StatType::MagicAttack, effect.magic_attack),
        (StatType::WeaponDefense, effect.weapon_defense),
        (StatType::MagicDefense, effect.magic_defense),
        (StatType::Accuracy, effect.accuracy),
        (StatType::Avoidability, effect.avoidability),
        (StatType::Speed, effect.speed),
        (StatType::Jump, effect.jump),
    ]
    .into_iter()
    .filter(|(_, amount)| *amount != 0)
    .chain(
        [(StatType::MaxHp, effect.hp), (StatType::MaxMp, effect.mp)]
            .into_iter()
            .filter(|(_, amount)| *amount > 0),
    )
    .map(|(stat, amount)| Contribution::flat(source.clone(), stat, i32::from(amount)))
    .collect();

    bonuses.extend(effect.statups.iter().filter_map(|statup| {
        StatType::from_statup(&statup.kind)
            .map(|stat| Contribution::flat(source.clone(), stat, statup.amount))
    }));
    bonuses
}

/// The six base values owned by the character service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseStats {
    /// Strength
    pub strength: u16,
    /// Dexterity
    pub dexterity: u16,
    /// Luck
    pub luck: u16,
    /// Intelligence
    pub intelligence: u16,
    /// Max HP
    pub max_hp: u16,
    /// Max MP
    pub max_mp: u16,
}

impl BaseStats {
    /// Base value of a stat; non-primary stats have base 0.
    #[must_use]
    pub fn value(&self, stat: StatType) -> i64 {
        let value = match stat {
            StatType::Strength => self.strength,
            StatType::Dexterity => self.dexterity,
            StatType::Luck => self.luck,
            StatType::Intelligence => self.intelligence,
            StatType::MaxHp => self.max_hp,
            StatType::MaxMp => self.max_mp,
            _ => 0,
        };
        i64::from(value)
    }
}

impl From<&CharacterData> for BaseStats {
    fn from(character: &CharacterData) -> Self {
        Self {
            strength: character.strength,
            dexterity: character.dexterity,
            luck: character.luck,
            intelligence: character.intelligence,
            max_hp: character.max_hp,
            max_mp: character.max_mp,
        }
    }
}

/// Effective statistics of one character.
#[derive(Debug, Clone, PartialEq)]
pub struct StatModel {
    character_id: u32,
    world_id: u8,
    channel_id: u8,
    base: BaseStats,
    bonuses: ContributionSet<StatType>,
    computed: BTreeMap<StatType, u32>,
}

impl StatModel {
    /// Model with zero base and no bonuses.
    #[must_use]
    pub fn new(character_id: u32, world_id: u8, channel_id: u8) -> Self {
        Self {
            character_id,
            world_id,
            channel_id,
            base: BaseStats::default(),
            bonuses: ContributionSet::new(),
            computed: BTreeMap::new(),
        }
        .recomputed()
    }

    fn recomputed(mut self) -> Self {
        self.computed = StatType::ALL
            .iter()
            .map(|&stat| (stat, self.bonuses.compute_additive(stat, self.base.value(stat))))
            .collect();
        self
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

    /// Base values.
    #[must_use]
    pub const fn base(&self) -> &BaseStats {
        &self.base
    }

    /// Bonus contributions.
    #[must_use]
    pub const fn bonuses(&self) -> &ContributionSet<StatType> {
        &self.bonuses
    }

    /// Computed value of a stat.
    #[must_use]
    pub fn effective(&self, stat: StatType) -> u32 {
        self.computed.get(&stat).copied().unwrap_or(0)
    }

    /// Every computed value.
    #[must_use]
    pub const fn computed(&self) -> &BTreeMap<StatType, u32> {
        &self.computed
    }

    /// Same model with a new base.
    #[must_use]
    pub fn with_base(&self, base: BaseStats) -> Self {
        Self {
            base,
            ..self.clone()
        }
        .recomputed()
    }

    /// Same model with a new bonus set.
    #[must_use]
    pub fn with_bonuses(&self, bonuses: ContributionSet<StatType>) -> Self {
        Self {
            bonuses,
            ..self.clone()
        }
        .recomputed()
    }

    /// Same model relocated to another channel.
    #[must_use]
    pub fn in_channel(&self, channel_id: u8) -> Self {
        Self {
            channel_id,
            ..self.clone()
        }
    }

    /// Stats whose computed value differs in `next`.
    #[must_use]
    pub fn changed(&self, next: &Self) -> Vec<StatType> {
        StatType::ALL
            .into_iter()
            .filter(|&stat| self.effective(stat) != next.effective(stat))
            .collect()
    }
}

impl Record for StatModel {
    type Id = u32;
    const KIND: &'static str = "stats";

    fn id(&self) -> u32 {
        self.character_id
    }

    fn containers(&self) -> Vec<ContainerKey> {
        vec![ContainerKey::World(self.world_id)]
    }
}
