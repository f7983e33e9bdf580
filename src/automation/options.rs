//! Typed game options.
//!
//! Every choice a routine passes to an action (augment, digger, loadout,
//! menu entry, adventure zone) is an enum or a range-checked newtype, so an
//! invalid value is rejected when the config is loaded instead of producing a
//! click on the wrong pixel mid-run.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Augmentations and their upgrades, in screen order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Augment {
    SafetyScissors,
    DangerScissors,
    MilkInfusion,
    DrinkTheMilkToo,
    CannonImplant,
    MountedLaser,
    ShoulderMounted,
    ArmpitArmaments,
    EnergyBuster,
    ChargeShot,
    LaserSword,
    QuantumSuperLaser,
}

impl Augment {
    pub const ALL: [Augment; 12] = [
        Augment::SafetyScissors,
        Augment::DangerScissors,
        Augment::MilkInfusion,
        Augment::DrinkTheMilkToo,
        Augment::CannonImplant,
        Augment::MountedLaser,
        Augment::ShoulderMounted,
        Augment::ArmpitArmaments,
        Augment::EnergyBuster,
        Augment::ChargeShot,
        Augment::LaserSword,
        Augment::QuantumSuperLaser,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Augment::SafetyScissors => "SS",
            Augment::DangerScissors => "DS",
            Augment::MilkInfusion => "MI",
            Augment::DrinkTheMilkToo => "DTMT",
            Augment::CannonImplant => "CI",
            Augment::MountedLaser => "ML",
            Augment::ShoulderMounted => "SM",
            Augment::ArmpitArmaments => "AA",
            Augment::EnergyBuster => "EB",
            Augment::ChargeShot => "CS",
            Augment::LaserSword => "LS",
            Augment::QuantumSuperLaser => "QSL",
        }
    }

    /// Row on the augmentation page (0 = top).
    pub fn row(self) -> usize {
        self as usize
    }

    /// Upgrades sit directly under their base augment.
    pub fn is_upgrade(self) -> bool {
        self.row() % 2 == 1
    }
}

impl fmt::Display for Augment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Augment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Augment::ALL
            .into_iter()
            .find(|a| a.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("unknown augment code: {:?}", s))
    }
}

impl TryFrom<String> for Augment {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Augment> for String {
    fn from(value: Augment) -> Self {
        value.code().to_string()
    }
}

/// One augment's share of an energy budget.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentWeight {
    pub augment: Augment,
    pub weight: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawAugmentPlan {
    weights: Vec<AugmentWeight>,
    energy: f64,
}

/// Validated split of an energy budget across augments.
///
/// Weights are positive, sum to at most 1.0 and name each augment once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAugmentPlan", into = "RawAugmentPlan")]
pub struct AugmentPlan {
    weights: Vec<AugmentWeight>,
    energy: f64,
}

impl AugmentPlan {
    pub fn new(weights: &[(Augment, f64)], energy: f64) -> Result<Self> {
        if weights.is_empty() {
            return Err(anyhow!("augment plan has no augments"));
        }
        if !(energy.is_finite() && energy > 0.0) {
            return Err(anyhow!("augment energy must be positive, got {}", energy));
        }

        let mut seen = HashSet::new();
        for (augment, weight) in weights {
            if !seen.insert(*augment) {
                return Err(anyhow!("augment {} listed twice", augment));
            }
            if !(weight.is_finite() && *weight > 0.0) {
                return Err(anyhow!("weight for {} must be positive, got {}", augment, weight));
            }
        }

        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total > 1.0 + 1e-9 {
            return Err(anyhow!("augment weights sum to {:.3}, more than 1.0", total));
        }

        Ok(Self {
            weights: weights
                .iter()
                .map(|&(augment, weight)| AugmentWeight { augment, weight })
                .collect(),
            energy,
        })
    }

    /// Builds a plan from weights known to be valid (built-in defaults).
    pub(crate) fn trusted(weights: &[(Augment, f64)], energy: f64) -> Self {
        Self {
            weights: weights
                .iter()
                .map(|&(augment, weight)| AugmentWeight { augment, weight })
                .collect(),
            energy,
        }
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Energy to put into each augment, in plan order.
    pub fn allocations(&self) -> Vec<(Augment, u64)> {
        self.weights
            .iter()
            .map(|w| (w.augment, (self.energy * w.weight).floor() as u64))
            .collect()
    }
}

impl TryFrom<RawAugmentPlan> for AugmentPlan {
    type Error = anyhow::Error;

    fn try_from(raw: RawAugmentPlan) -> Result<Self> {
        let pairs: Vec<(Augment, f64)> = raw.weights.iter().map(|w| (w.augment, w.weight)).collect();
        AugmentPlan::new(&pairs, raw.energy)
    }
}

impl From<AugmentPlan> for RawAugmentPlan {
    fn from(plan: AugmentPlan) -> Self {
        RawAugmentPlan {
            weights: plan.weights,
            energy: plan.energy,
        }
    }
}

/// Gold digger number as shown in game (1..=12, four per page).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GoldDigger(u8);

impl GoldDigger {
    pub const PER_PAGE: u8 = 4;
    pub const COUNT: u8 = 12;

    pub fn new(number: u8) -> Result<Self> {
        if (1..=Self::COUNT).contains(&number) {
            Ok(Self(number))
        } else {
            Err(anyhow!("gold digger must be 1..={}, got {}", Self::COUNT, number))
        }
    }

    /// Clamps into range; for built-in defaults.
    pub const fn clamped(number: u8) -> Self {
        if number < 1 {
            Self(1)
        } else if number > Self::COUNT {
            Self(Self::COUNT)
        } else {
            Self(number)
        }
    }

    pub(crate) fn clamped_list(numbers: &[u8]) -> Vec<Self> {
        numbers.iter().map(|&n| Self::clamped(n)).collect()
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn page(self) -> usize {
        ((self.0 - 1) / Self::PER_PAGE) as usize
    }

    pub fn slot(self) -> usize {
        ((self.0 - 1) % Self::PER_PAGE) as usize
    }
}

impl TryFrom<u8> for GoldDigger {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        GoldDigger::new(value)
    }
}

impl From<GoldDigger> for u8 {
    fn from(value: GoldDigger) -> Self {
        value.0
    }
}

impl fmt::Display for GoldDigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "digger {}", self.0)
    }
}

/// Builds a digger list from plain numbers.
pub fn diggers(numbers: &[u8]) -> Result<Vec<GoldDigger>> {
    numbers.iter().map(|&n| GoldDigger::new(n)).collect()
}

/// Saved equipment loadout (1..=3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Loadout(u8);

impl Loadout {
    pub const COUNT: u8 = 3;

    pub fn new(number: u8) -> Result<Self> {
        if (1..=Self::COUNT).contains(&number) {
            Ok(Self(number))
        } else {
            Err(anyhow!("loadout must be 1..={}, got {}", Self::COUNT, number))
        }
    }

    /// Clamps into range; for built-in defaults.
    pub const fn clamped(number: u8) -> Self {
        if number < 1 {
            Self(1)
        } else if number > Self::COUNT {
            Self(Self::COUNT)
        } else {
            Self(number)
        }
    }

    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl TryFrom<u8> for Loadout {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        Loadout::new(value)
    }
}

impl From<Loadout> for u8 {
    fn from(value: Loadout) -> Self {
        value.0
    }
}

impl fmt::Display for Loadout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loadout {}", self.0)
    }
}

/// Sidebar menu entries, top to bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuItem {
    BasicTraining,
    FightBoss,
    MoneyPit,
    Adventure,
    Inventory,
    Augmentation,
    AdvancedTraining,
    TimeMachine,
    BloodMagic,
    Wandoos,
    Ngu,
    Yggdrasil,
    GoldDiggers,
    Beards,
    Questing,
}

impl MenuItem {
    pub fn row(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where to send the adventure party.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdventureTarget {
    /// Zone index counted from the safe zone (0)
    Zone(u8),
    /// Highest unlocked zone
    Highest,
    /// The ITOPOD tower at its optimal floor; `auto` leaves idle mode on
    Itopod { auto: bool },
}

impl fmt::Display for AdventureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdventureTarget::Zone(z) => write!(f, "zone {}", z),
            AdventureTarget::Highest => write!(f, "highest zone"),
            AdventureTarget::Itopod { auto: true } => write!(f, "ITOPOD (idle)"),
            AdventureTarget::Itopod { auto: false } => write!(f, "ITOPOD (manual)"),
        }
    }
}

/// Adventure zones that quests can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestZone {
    BadlyDrawnWorld,
    BoringAssEarth,
    ChocolateWorld,
    Evilverse,
    PrettyPinkPrincessLand,
    MetaLand,
    InterdimensionalParty,
    TypoZonez,
    FadLands,
    JrpgVille,
    RadLands,
    BackToSchool,
    WestWorld,
}

impl QuestZone {
    const KEYWORDS: [(&'static str, QuestZone); 13] = [
        ("badly drawn", QuestZone::BadlyDrawnWorld),
        ("boring", QuestZone::BoringAssEarth),
        ("chocolate", QuestZone::ChocolateWorld),
        ("evilverse", QuestZone::Evilverse),
        ("pretty pink", QuestZone::PrettyPinkPrincessLand),
        ("meta land", QuestZone::MetaLand),
        ("party", QuestZone::InterdimensionalParty),
        ("typo", QuestZone::TypoZonez),
        ("fad", QuestZone::FadLands),
        ("jrpg", QuestZone::JrpgVille),
        ("rad", QuestZone::RadLands),
        ("school", QuestZone::BackToSchool),
        ("west world", QuestZone::WestWorld),
    ];

    /// Finds the quest zone named in a quest description, if any.
    pub fn from_quest_text(text: &str) -> Option<QuestZone> {
        let lower = text.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(keyword, _)| {
                lower
                    .split(|c: char| !c.is_alphanumeric() && c != ' ')
                    .any(|part| contains_word_sequence(part, keyword))
            })
            .map(|&(_, zone)| zone)
    }

    /// Adventure zone index counted from the safe zone.
    pub fn zone_index(self) -> u8 {
        match self {
            QuestZone::BadlyDrawnWorld => 18,
            QuestZone::BoringAssEarth => 19,
            QuestZone::ChocolateWorld => 21,
            QuestZone::Evilverse => 22,
            QuestZone::PrettyPinkPrincessLand => 23,
            QuestZone::MetaLand => 25,
            QuestZone::InterdimensionalParty => 26,
            QuestZone::TypoZonez => 28,
            QuestZone::FadLands => 29,
            QuestZone::JrpgVille => 30,
            QuestZone::RadLands => 32,
            QuestZone::BackToSchool => 33,
            QuestZone::WestWorld => 34,
        }
    }
}

/// Whole-word match of `needle` (which may contain spaces) inside `haystack`.
fn contains_word_sequence(haystack: &str, needle: &str) -> bool {
    let words: Vec<&str> = haystack.split_whitespace().collect();
    let needle: Vec<&str> = needle.split_whitespace().collect();
    if needle.is_empty() || words.len() < needle.len() {
        return false;
    }
    words.windows(needle.len()).any(|w| w == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augment_codes_round_trip() {
        for augment in Augment::ALL {
            assert_eq!(augment.code().parse::<Augment>().unwrap(), augment);
        }
        assert_eq!("qsl".parse::<Augment>().unwrap(), Augment::QuantumSuperLaser);
        assert!("XX".parse::<Augment>().is_err());
    }

    #[test]
    fn test_augment_rows() {
        assert_eq!(Augment::SafetyScissors.row(), 0);
        assert!(!Augment::EnergyBuster.is_upgrade());
        assert!(Augment::ChargeShot.is_upgrade());
        assert_eq!(Augment::QuantumSuperLaser.row(), 11);
    }

    #[test]
    fn test_augment_plan_allocations() {
        let plan = AugmentPlan::new(
            &[(Augment::EnergyBuster, 0.7), (Augment::ChargeShot, 0.3)],
            3.5e9,
        )
        .unwrap();
        assert_eq!(
            plan.allocations(),
            vec![
                (Augment::EnergyBuster, 2_450_000_000),
                (Augment::ChargeShot, 1_050_000_000)
            ]
        );
    }

    #[test]
    fn test_augment_plan_validation() {
        assert!(AugmentPlan::new(&[], 1e9).is_err());
        assert!(AugmentPlan::new(&[(Augment::LaserSword, 0.5)], 0.0).is_err());
        assert!(AugmentPlan::new(&[(Augment::LaserSword, -0.1)], 1e9).is_err());
        assert!(AugmentPlan::new(
            &[(Augment::LaserSword, 0.6), (Augment::QuantumSuperLaser, 0.6)],
            1e9
        )
        .is_err());
        assert!(AugmentPlan::new(
            &[(Augment::LaserSword, 0.5), (Augment::LaserSword, 0.5)],
            1e9
        )
        .is_err());
    }

    #[test]
    fn test_augment_plan_from_json() {
        let json = r#"{"weights": [{"augment": "LS", "weight": 0.9}, {"augment": "QSL", "weight": 0.1}], "energy": 6.5e9}"#;
        let plan: AugmentPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.allocations()[0], (Augment::LaserSword, 5_850_000_000));

        let bad = r#"{"weights": [{"augment": "LS", "weight": 1.5}], "energy": 6.5e9}"#;
        assert!(serde_json::from_str::<AugmentPlan>(bad).is_err());
    }

    #[test]
    fn test_gold_digger_range_and_layout() {
        assert!(GoldDigger::new(0).is_err());
        assert!(GoldDigger::new(13).is_err());

        let d = GoldDigger::new(1).unwrap();
        assert_eq!((d.page(), d.slot()), (0, 0));
        let d = GoldDigger::new(8).unwrap();
        assert_eq!((d.page(), d.slot()), (1, 3));
        let d = GoldDigger::new(12).unwrap();
        assert_eq!((d.page(), d.slot()), (2, 3));

        assert!(serde_json::from_str::<Vec<GoldDigger>>("[2, 8, 9]").is_ok());
        assert!(serde_json::from_str::<Vec<GoldDigger>>("[2, 13]").is_err());
    }

    #[test]
    fn test_loadout_range() {
        assert!(Loadout::new(1).is_ok());
        assert!(Loadout::new(3).is_ok());
        assert!(Loadout::new(4).is_err());
        assert_eq!(Loadout::new(2).unwrap().index(), 1);
    }

    #[test]
    fn test_quest_zone_from_text() {
        assert_eq!(
            QuestZone::from_quest_text("Gather 40 items from Badly Drawn World"),
            Some(QuestZone::BadlyDrawnWorld)
        );
        assert_eq!(
            QuestZone::from_quest_text("Quest: Collect stuff in the Interdimensional Party!"),
            Some(QuestZone::InterdimensionalParty)
        );
        // "radiant" must not count as the Rad-lands
        assert_eq!(QuestZone::from_quest_text("a radiant thing"), None);
        assert_eq!(QuestZone::from_quest_text(""), None);
    }
}
