//! Configuration types for automation.
//!
//! Loads settings from config.json at startup. Provides the window title,
//! calibration landmark, polling/timeout policy, OCR preprocessing and the
//! per-routine plans. Every field has a default, so a partial file works.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::automation::options::{Augment, AugmentPlan, GoldDigger, Loadout};
use crate::calibration::coords::TOP_LEFT_COLOR;
use crate::capture::{Color, Rect};
use crate::ocr::Preprocess;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AutomationConfig> = OnceLock::new();

/// Complete automation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Case-insensitive substring of the game window title
    pub window_title: String,
    /// Colour of the game's top-left pixel
    pub landmark_color: Color,
    /// Screen area searched for the landmark
    pub calibration_area: Rect,
    /// Per-channel tolerance for every colour comparison
    pub color_tolerance: u8,
    pub poll_interval_ms: u64,
    /// Upper bound for any single polling wait inside an action
    pub action_timeout_ms: u64,
    /// Wait after menu navigation for the game UI to settle
    pub settle_delay_ms: u64,
    /// How long pause waits for the routine to reach an action boundary
    pub pause_timeout_ms: u64,
    /// How long stop waits for the routine thread to exit
    pub stop_timeout_ms: u64,
    pub ocr: Preprocess,
    /// Soft failures in a row before the session gives up
    pub max_consecutive_failures: u32,
    pub speedrun: SpeedrunConfig,
    pub itopod: ItopodConfig,
    pub questing: QuestingConfig,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            window_title: "ngu idle".to_string(),
            landmark_color: Color::from_hex(TOP_LEFT_COLOR).unwrap_or(Color::rgb(0x21, 0x24, 0x29)),
            calibration_area: Rect::from_corners(0, 0, 400, 600),
            color_tolerance: 2,
            poll_interval_ms: 500,
            action_timeout_ms: 10_000,
            settle_delay_ms: 200,
            pause_timeout_ms: 15_000,
            stop_timeout_ms: 2_000,
            ocr: Preprocess::default(),
            max_consecutive_failures: 3,
            speedrun: SpeedrunConfig::default(),
            itopod: ItopodConfig::default(),
            questing: QuestingConfig::default(),
        }
    }
}

impl AutomationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn pause_timeout(&self) -> Duration {
        Duration::from_millis(self.pause_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.window_title.trim().is_empty() {
            return Err(anyhow!("window_title must not be empty"));
        }
        if self.calibration_area.is_empty() {
            return Err(anyhow!("calibration_area must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be positive"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(anyhow!("max_consecutive_failures must be at least 1"));
        }
        self.speedrun.validate()?;
        self.itopod.validate()?;
        self.questing.validate()
    }
}

/// The timed rebirth routine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedrunConfig {
    pub duration_secs: u64,
    /// Last boss to clear before gearing up
    pub target_boss: u32,
    /// Farming stops this long before the deadline
    pub farm_margin_secs: u64,
    /// Blood digger is switched on once this long after the rebirth
    pub blood_digger_after_secs: u64,
    /// Time spent in the highest zone with the gold loadout
    pub adventure_settle_secs: u64,
    pub boss_clear_max_attempts: u32,
    pub challenge_poll_secs: u64,
    /// `None` waits for the challenge to end indefinitely
    pub challenge_wait_max_secs: Option<u64>,
    pub farm_tick_ms: u64,
    pub gold_loadout: Loadout,
    pub power_loadout: Loadout,
    pub time_machine_magic: bool,
    pub wandoos_magic: bool,
    /// Number of blood magic rituals to cap
    pub blood_magic_target: u8,
    pub opening_diggers: Vec<GoldDigger>,
    pub farm_diggers: Vec<GoldDigger>,
    pub blood_digger: GoldDigger,
    pub final_diggers: Vec<GoldDigger>,
    pub first_augments: AugmentPlan,
    pub final_augments: AugmentPlan,
    pub pit: bool,
    pub spin: bool,
    pub blood_pill: bool,
}

impl Default for SpeedrunConfig {
    fn default() -> Self {
        Self {
            duration_secs: 180,
            target_boss: 116,
            farm_margin_secs: 45,
            blood_digger_after_secs: 80,
            adventure_settle_secs: 7,
            boss_clear_max_attempts: 50,
            challenge_poll_secs: 5,
            challenge_wait_max_secs: None,
            farm_tick_ms: 500,
            gold_loadout: Loadout::clamped(1),
            power_loadout: Loadout::clamped(2),
            time_machine_magic: true,
            wandoos_magic: true,
            blood_magic_target: 7,
            opening_diggers: GoldDigger::clamped_list(&[2, 8, 9]),
            farm_diggers: GoldDigger::clamped_list(&[2, 8, 9, 11]),
            blood_digger: GoldDigger::clamped(11),
            final_diggers: GoldDigger::clamped_list(&[2, 3, 12]),
            first_augments: AugmentPlan::trusted(
                &[(Augment::EnergyBuster, 0.7), (Augment::ChargeShot, 0.3)],
                3.5e9,
            ),
            final_augments: AugmentPlan::trusted(
                &[(Augment::LaserSword, 0.9), (Augment::QuantumSuperLaser, 0.1)],
                6.5e9,
            ),
            pit: true,
            spin: false,
            blood_pill: false,
        }
    }
}

impl SpeedrunConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn farm_margin(&self) -> Duration {
        Duration::from_secs(self.farm_margin_secs)
    }

    pub fn blood_digger_after(&self) -> Duration {
        Duration::from_secs(self.blood_digger_after_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.duration_secs == 0 {
            return Err(anyhow!("speedrun.duration_secs must be positive"));
        }
        if self.farm_margin_secs >= self.duration_secs {
            return Err(anyhow!(
                "speedrun.farm_margin_secs ({}) must be less than duration_secs ({})",
                self.farm_margin_secs,
                self.duration_secs
            ));
        }
        if self.target_boss == 0 {
            return Err(anyhow!("speedrun.target_boss must be positive"));
        }
        if !(1..=8).contains(&self.blood_magic_target) {
            return Err(anyhow!(
                "speedrun.blood_magic_target must be 1..=8, got {}",
                self.blood_magic_target
            ));
        }
        if self.farm_tick_ms == 0 || self.challenge_poll_secs == 0 {
            return Err(anyhow!("speedrun poll intervals must be positive"));
        }
        Ok(())
    }
}

/// ITOPOD sniping.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ItopodConfig {
    /// Length of one sniping cycle
    pub cycle_secs: u64,
    /// Longest wait for the next enemy to spawn
    pub kill_timeout_secs: u64,
    /// Idle-mode time saved by each manual kill
    pub seconds_saved_per_kill: f64,
    /// Kills between EXP readings
    pub exp_refresh_kills: u32,
}

impl Default for ItopodConfig {
    fn default() -> Self {
        Self {
            cycle_secs: 180,
            kill_timeout_secs: 15,
            seconds_saved_per_kill: 0.8,
            exp_refresh_kills: 25,
        }
    }
}

impl ItopodConfig {
    fn validate(&self) -> Result<()> {
        if self.cycle_secs == 0 || self.kill_timeout_secs == 0 {
            return Err(anyhow!("itopod.cycle_secs and itopod.kill_timeout_secs must be positive"));
        }
        if !self.seconds_saved_per_kill.is_finite() || self.seconds_saved_per_kill < 0.0 {
            return Err(anyhow!(
                "itopod.seconds_saved_per_kill must be a non-negative number, got {}",
                self.seconds_saved_per_kill
            ));
        }
        Ok(())
    }
}

/// Questing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestingConfig {
    /// Longest a single quest may take before the cycle is abandoned
    pub max_cycle_secs: u64,
    pub progress_poll_secs: u64,
}

impl Default for QuestingConfig {
    fn default() -> Self {
        Self {
            max_cycle_secs: 1800,
            progress_poll_secs: 10,
        }
    }
}

impl QuestingConfig {
    fn validate(&self) -> Result<()> {
        if self.max_cycle_secs == 0 || self.progress_poll_secs == 0 {
            return Err(anyhow!("questing.max_cycle_secs and questing.progress_poll_secs must be positive"));
        }
        Ok(())
    }
}

/// Parses and validates a config file.
pub fn parse_config(contents: &str) -> Result<AutomationConfig> {
    let config: AutomationConfig = serde_json::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from `path`, falling back to defaults on any problem.
pub fn load_config_from(config_path: &Path) -> AutomationConfig {
    crate::log(&format!("Looking for config at: {}", config_path.display()));

    if config_path.exists() {
        match fs::read_to_string(config_path) {
            Ok(contents) => match parse_config(&contents) {
                Ok(config) => {
                    crate::log("Config loaded from config.json");
                    return config;
                }
                Err(e) => {
                    crate::log(&format!(
                        "Failed to parse config.json: {}. Using defaults.",
                        e
                    ));
                }
            },
            Err(e) => {
                crate::log(&format!(
                    "Failed to read config.json: {}. Using defaults.",
                    e
                ));
            }
        }
    } else {
        crate::log("config.json not found. Using default config.");
    }

    AutomationConfig::default()
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config_from(&crate::paths::get_config_path()));
}

/// Returns a reference to the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> &'static AutomationConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
}
