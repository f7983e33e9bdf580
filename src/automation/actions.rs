//! Mid-level game actions.
//!
//! Each action follows the same protocol: optionally poll for a precondition,
//! perform input, optionally poll for a postcondition. Polls run at the
//! configured interval and give up after the action timeout with a soft
//! [`ActionError::Timeout`]. Routines decide what a timeout means.
//!
//! Actions are written to be safe to repeat ("ensure loadout 2" rather than
//! "toggle loadout"), since a recognition miss can make a routine call one twice.

use anyhow::anyhow;
use std::time::Duration;

use crate::automation::config::AutomationConfig;
use crate::automation::error::{ActionError, ActionResult};
use crate::automation::executor::PausableExecutor;
use crate::automation::input::Key;
use crate::automation::options::{AdventureTarget, AugmentPlan, GoldDigger, Loadout, MenuItem};
use crate::automation::session::Session;
use crate::calibration::coords;
use crate::ocr::{parse_integer, parse_number, parse_progress};

/// Widest number the energy input box accepts.
const INPUT_MAX_DIGITS: usize = 20;

/// State of the quest panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuestStatus {
    /// No quest running; the start button is showing
    Idle,
    Active {
        description: String,
        done: u32,
        total: u32,
    },
}

impl QuestStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, QuestStatus::Active { done, total, .. } if done >= total)
    }
}

/// Interprets the rebirth page heading.
///
/// A running challenge replaces the "Rebirth" heading with its name, so each
/// state has a positive marker. `None` means unreadable this tick.
pub fn parse_challenge_banner(text: &str) -> Option<bool> {
    let text = text.to_lowercase();
    if text.contains("challenge") {
        Some(true)
    } else if text.contains("rebirth") {
        Some(false)
    } else {
        None
    }
}

/// Interprets the quest panel text. `None` means unreadable this tick.
pub fn parse_quest_panel(text: &str) -> Option<QuestStatus> {
    let lower = text.to_lowercase();
    if let Some((done, total)) = parse_progress(text) {
        return Some(QuestStatus::Active {
            description: text.to_string(),
            done,
            total,
        });
    }
    if lower.contains("start quest") {
        return Some(QuestStatus::Idle);
    }
    None
}

/// Everything a routine can ask the game to do.
pub trait GameActions: Send {
    /// Brings the game window to the front; fails if the window is gone.
    fn activate_window(&mut self) -> ActionResult<()>;
    fn do_rebirth(&mut self) -> ActionResult<()>;
    /// Fights the next boss `times` times; `None` nukes.
    fn fight(&mut self, times: Option<u32>) -> ActionResult<()>;
    /// Number of the next boss to fight.
    fn current_boss(&mut self) -> ActionResult<u32>;
    fn ensure_loadout(&mut self, loadout: Loadout) -> ActionResult<()>;
    fn adventure(&mut self, target: AdventureTarget) -> ActionResult<()>;
    fn ensure_idle_mode(&mut self, on: bool) -> ActionResult<()>;
    fn time_machine(&mut self, magic: bool) -> ActionResult<()>;
    fn assign_augments(&mut self, plan: &AugmentPlan) -> ActionResult<()>;
    /// Caps the first `target` blood magic rituals.
    fn blood_magic(&mut self, target: u8) -> ActionResult<()>;
    fn boost_equipment(&mut self) -> ActionResult<()>;
    fn wandoos(&mut self, magic: bool) -> ActionResult<()>;
    /// Caps each digger; with `activate`, also switches on any that are off.
    fn gold_diggers(&mut self, diggers: &[GoldDigger], activate: bool) -> ActionResult<()>;
    /// Limit-skill hotkey: pulls all energy back out.
    fn reclaim_energy(&mut self) -> ActionResult<()>;
    fn challenge_active(&mut self) -> ActionResult<bool>;
    fn pit(&mut self) -> ActionResult<()>;
    fn spin(&mut self) -> ActionResult<()>;
    fn blood_pill(&mut self) -> ActionResult<()>;
    fn read_exp(&mut self) -> ActionResult<f64>;
    /// Single check of the adventure page's enemy health bar.
    fn enemy_present(&mut self) -> ActionResult<bool>;
    fn snipe_enemy(&mut self) -> ActionResult<()>;
    fn quest_status(&mut self) -> ActionResult<QuestStatus>;
    fn start_quest(&mut self) -> ActionResult<()>;
    fn complete_quest(&mut self) -> ActionResult<()>;
    fn read_quest_points(&mut self) -> ActionResult<f64>;
}

/// Timing policy shared by all actions.
#[derive(Clone, Copy, Debug)]
pub struct Timing {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub settle: Duration,
}

impl Timing {
    pub fn from_config(config: &AutomationConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.action_timeout(),
            settle: config.settle_delay(),
        }
    }
}

/// `GameActions` on a live session.
pub struct Actions {
    session: Session,
    executor: PausableExecutor,
    timing: Timing,
}

impl Actions {
    pub fn new(session: Session, executor: PausableExecutor, timing: Timing) -> Self {
        Self {
            session,
            executor,
            timing,
        }
    }

    /// Gives the session back when the routine ends.
    pub fn into_session(self) -> Session {
        self.session
    }

    fn settle(&self) -> ActionResult<()> {
        self.executor.sleep(self.timing.settle)
    }

    fn menu(&self, item: MenuItem) -> ActionResult<()> {
        self.session.click(coords::menu_item(item))?;
        self.settle()
    }

    /// Polls `read` until it yields a value or the action timeout passes.
    ///
    /// `Ok(None)` and `Err` from `read` are both soft misses: logged and retried.
    fn wait_for<T>(
        &self,
        what: &str,
        mut read: impl FnMut(&Session) -> anyhow::Result<Option<T>>,
    ) -> ActionResult<T> {
        let clock = self.executor.clock();
        let start = clock.now();
        let mut misses = 0u32;
        loop {
            match read(&self.session) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {
                    misses += 1;
                    crate::log(&format!("{}: not recognised yet (miss {})", what, misses));
                }
                Err(e) => {
                    misses += 1;
                    crate::log(&format!("{}: read failed (miss {}): {}", what, misses, e));
                }
            }

            let waited = clock.now().saturating_duration_since(start);
            if waited >= self.timing.timeout {
                crate::log(&format!("{}: giving up after {:?}", what, waited));
                return Err(ActionError::Timeout {
                    what: what.to_string(),
                    waited,
                });
            }
            self.executor.sleep(self.timing.poll_interval)?;
        }
    }

    /// Replaces the contents of the energy input box.
    fn set_energy_input(&self, amount: u64) -> ActionResult<()> {
        self.session.click(coords::ENERGY_INPUT)?;
        for _ in 0..INPUT_MAX_DIGITS {
            self.session.send_key(Key::Backspace)?;
        }
        self.session.send_text(&amount.to_string())?;
        Ok(())
    }

    fn idle_mode_on(&self) -> anyhow::Result<bool> {
        self.session
            .pixel_matches(coords::IDLE_INDICATOR, coords::IDLE_ON_COLOR)
    }
}

impl GameActions for Actions {
    fn activate_window(&mut self) -> ActionResult<()> {
        if !self.session.window_alive() {
            return Err(anyhow!("Game window {} no longer exists", self.session.window()).into());
        }
        self.session.activate();
        self.settle()
    }

    fn do_rebirth(&mut self) -> ActionResult<()> {
        crate::log("Action: rebirth");
        self.session.click(coords::REBIRTH_MENU)?;
        self.settle()?;
        self.session.click(coords::REBIRTH_BUTTON)?;
        self.settle()?;
        self.session.click(coords::REBIRTH_CONFIRM)?;
        self.settle()
    }

    fn fight(&mut self, times: Option<u32>) -> ActionResult<()> {
        self.menu(MenuItem::FightBoss)?;
        match times {
            None => {
                crate::log("Action: nuke");
                self.session.click(coords::NUKE)?;
            }
            Some(n) => {
                crate::log(&format!("Action: fight boss x{}", n));
                for _ in 0..n {
                    self.executor.check_stop()?;
                    self.session.click(coords::FIGHT)?;
                }
            }
        }
        Ok(())
    }

    fn current_boss(&mut self) -> ActionResult<u32> {
        self.menu(MenuItem::FightBoss)?;
        let boss = self.wait_for("boss number", |s| {
            Ok(parse_integer(&s.read_text(coords::BOSS_NUMBER)?).and_then(|n| u32::try_from(n).ok()))
        })?;
        crate::log(&format!("Current boss: {}", boss));
        Ok(boss)
    }

    fn ensure_loadout(&mut self, loadout: Loadout) -> ActionResult<()> {
        crate::log(&format!("Action: equip {}", loadout));
        self.menu(MenuItem::Inventory)?;
        self.session.click(coords::loadout_button(loadout))?;
        self.settle()
    }

    fn adventure(&mut self, target: AdventureTarget) -> ActionResult<()> {
        crate::log(&format!("Action: adventure to {}", target));
        self.menu(MenuItem::Adventure)?;
        match target {
            AdventureTarget::Zone(zone) => {
                // Right-clicking the left arrow jumps to the safe zone
                self.session.right_click(coords::ADV_LEFT_ARROW)?;
                for _ in 0..zone {
                    self.session.click(coords::ADV_RIGHT_ARROW)?;
                }
            }
            AdventureTarget::Highest => {
                self.session.right_click(coords::ADV_RIGHT_ARROW)?;
            }
            AdventureTarget::Itopod { auto } => {
                self.session.click(coords::ITOPOD_BUTTON)?;
                self.settle()?;
                self.session.click(coords::ITOPOD_OPTIMAL)?;
                self.session.click(coords::ITOPOD_ENTER)?;
                self.settle()?;
                return self.ensure_idle_mode(auto);
            }
        }
        self.settle()
    }

    fn ensure_idle_mode(&mut self, on: bool) -> ActionResult<()> {
        if self.idle_mode_on()? == on {
            return Ok(());
        }
        crate::log(&format!("Action: idle mode {}", if on { "on" } else { "off" }));
        self.session.send_key(Key::Char('q'))?;
        self.wait_for("idle mode indicator", |_| {
            let current = self.idle_mode_on()?;
            Ok((current == on).then_some(()))
        })
    }

    fn time_machine(&mut self, magic: bool) -> ActionResult<()> {
        crate::log(&format!("Action: time machine (magic: {})", magic));
        self.menu(MenuItem::TimeMachine)?;
        self.session.click(coords::TM_SPEED)?;
        if magic {
            self.session.click(coords::TM_MULT)?;
        }
        Ok(())
    }

    fn assign_augments(&mut self, plan: &AugmentPlan) -> ActionResult<()> {
        self.menu(MenuItem::Augmentation)?;
        for (augment, amount) in plan.allocations() {
            self.executor.check_stop()?;
            crate::log(&format!("Action: augment {} <- {}", augment, amount));
            self.set_energy_input(amount)?;
            self.session.click(coords::augment_add(augment))?;
            self.settle()?;
        }
        Ok(())
    }

    fn blood_magic(&mut self, target: u8) -> ActionResult<()> {
        crate::log(&format!("Action: blood magic rituals 1..={}", target));
        self.menu(MenuItem::BloodMagic)?;
        for ritual in 0..target as usize {
            self.session.click(coords::blood_magic_cap(ritual))?;
        }
        Ok(())
    }

    fn boost_equipment(&mut self) -> ActionResult<()> {
        crate::log("Action: boost equipment");
        self.menu(MenuItem::Inventory)?;
        for slot in coords::EQUIPMENT_SLOTS {
            self.executor.check_stop()?;
            self.session.click(slot)?;
            self.session.send_key(Key::Char('a'))?;
        }
        Ok(())
    }

    fn wandoos(&mut self, magic: bool) -> ActionResult<()> {
        self.menu(MenuItem::Wandoos)?;
        self.session.click(coords::WANDOOS_ENERGY_CAP)?;
        if magic {
            self.session.click(coords::WANDOOS_MAGIC_CAP)?;
        }
        Ok(())
    }

    fn gold_diggers(&mut self, diggers: &[GoldDigger], activate: bool) -> ActionResult<()> {
        self.menu(MenuItem::GoldDiggers)?;

        let mut ordered = diggers.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut page = None;
        for digger in ordered {
            if page != Some(digger.page()) {
                self.session.click(coords::digger_page(digger.page()))?;
                self.settle()?;
                page = Some(digger.page());
            }
            self.session.click(coords::digger_cap(digger.slot()))?;
            if activate {
                let active = self
                    .session
                    .pixel_matches(coords::digger_active(digger.slot()), coords::DIG_ACTIVE_COLOR)?;
                if !active {
                    crate::log(&format!("Action: activating {}", digger));
                    self.session.click(coords::digger_active(digger.slot()))?;
                }
            }
        }
        Ok(())
    }

    fn reclaim_energy(&mut self) -> ActionResult<()> {
        crate::log("Action: reclaim energy");
        self.session.send_key(Key::Char('r'))?;
        self.settle()
    }

    fn challenge_active(&mut self) -> ActionResult<bool> {
        self.session.click(coords::REBIRTH_MENU)?;
        self.settle()?;
        self.wait_for("challenge banner", |s| {
            Ok(parse_challenge_banner(&s.read_text(coords::CHALLENGE_TEXT)?))
        })
    }

    fn pit(&mut self) -> ActionResult<()> {
        crate::log("Action: feed money pit");
        self.menu(MenuItem::MoneyPit)?;
        self.session.click(coords::PIT_FEED)?;
        self.settle()?;
        self.session.click(coords::PIT_CONFIRM)?;
        self.settle()
    }

    fn spin(&mut self) -> ActionResult<()> {
        crate::log("Action: daily spin");
        self.menu(MenuItem::MoneyPit)?;
        self.session.click(coords::SPIN_TAB)?;
        self.settle()?;
        self.session.click(coords::SPIN_BUTTON)?;
        self.settle()
    }

    fn blood_pill(&mut self) -> ActionResult<()> {
        crate::log("Action: cast blood pill");
        self.menu(MenuItem::BloodMagic)?;
        self.session.click(coords::BLOOD_SPELLS_TAB)?;
        self.settle()?;
        self.session.click(coords::BLOOD_PILL)?;
        self.settle()
    }

    fn read_exp(&mut self) -> ActionResult<f64> {
        self.session.click(coords::EXP_MENU)?;
        self.settle()?;
        self.wait_for("exp", |s| Ok(parse_number(&s.read_text(coords::EXP_TEXT)?)))
    }

    fn enemy_present(&mut self) -> ActionResult<bool> {
        Ok(self
            .session
            .pixel_matches(coords::ENEMY_HEALTH, coords::ENEMY_HEALTH_COLOR)?)
    }

    fn snipe_enemy(&mut self) -> ActionResult<()> {
        self.session.send_key(Key::Char('w'))?;
        Ok(())
    }

    fn quest_status(&mut self) -> ActionResult<QuestStatus> {
        self.menu(MenuItem::Questing)?;
        self.wait_for("quest panel", |s| {
            Ok(parse_quest_panel(&s.read_text(coords::QUEST_TEXT)?))
        })
    }

    fn start_quest(&mut self) -> ActionResult<()> {
        crate::log("Action: start quest");
        self.menu(MenuItem::Questing)?;
        self.session.click(coords::QUEST_START)?;
        self.settle()
    }

    fn complete_quest(&mut self) -> ActionResult<()> {
        crate::log("Action: hand in quest");
        self.menu(MenuItem::Questing)?;
        self.session.click(coords::QUEST_COMPLETE)?;
        self.settle()
    }

    fn read_quest_points(&mut self) -> ActionResult<f64> {
        self.menu(MenuItem::Questing)?;
        self.wait_for("quest points", |s| {
            Ok(parse_number(&s.read_text(coords::QUEST_POINTS)?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::options::diggers;
    use crate::calibration::Origin;
    use crate::capture::{Color, Point};
    use crate::testing::{fake_backends, FakeClock, FakeLocator, FakeScreen, InputEvent, RecordingInput, ScriptedReader};
    use std::sync::Arc;

    const ORIGIN: Point = Point::new(100, 50);

    struct Rig {
        actions: Actions,
        input: RecordingInput,
        reader: ScriptedReader,
        screen: FakeScreen,
        clock: Arc<FakeClock>,
        executor: PausableExecutor,
    }

    fn rig() -> Rig {
        let config = AutomationConfig::default();
        let mut screen = FakeScreen::new(1200, 800, Color::rgb(0, 0, 0));
        screen.paint(ORIGIN, config.landmark_color);
        let input = RecordingInput::default();
        let reader = ScriptedReader::default();
        let session = Session::connect(
            &config,
            fake_backends(
                FakeLocator::with_titles(&["NGU Idle"]),
                screen.clone(),
                input.clone(),
                reader.clone(),
            ),
        )
        .unwrap();
        assert_eq!(session.origin(), Origin { x: 100, y: 50 });

        let clock = Arc::new(FakeClock::new());
        let executor = PausableExecutor::new(clock.clone());
        Rig {
            actions: Actions::new(session, executor.clone(), Timing::from_config(&config)),
            input,
            reader,
            screen,
            clock,
            executor,
        }
    }

    fn abs(offset: Point) -> Point {
        offset.offset(ORIGIN.x, ORIGIN.y)
    }

    #[test]
    fn test_current_boss_retries_garbage() {
        let mut rig = rig();
        rig.reader.script(
            crate::calibration::Origin { x: 100, y: 50 }.resolve_rect(coords::BOSS_NUMBER),
            &["", "~~", "57"],
        );

        assert_eq!(rig.actions.current_boss().unwrap(), 57);
        // Two misses, two poll intervals, plus the menu settle
        assert_eq!(rig.clock.elapsed(), Duration::from_millis(200 + 2 * 500));
    }

    #[test]
    fn test_current_boss_times_out() {
        let mut rig = rig();
        let err = rig.actions.current_boss().unwrap_err();
        match err {
            ActionError::Timeout { what, waited } => {
                assert_eq!(what, "boss number");
                assert!(waited >= Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_fight_clicks_fight_button() {
        let mut rig = rig();
        rig.actions.fight(Some(3)).unwrap();
        let clicks: Vec<_> = rig
            .input
            .clicks()
            .into_iter()
            .filter(|p| *p == abs(coords::FIGHT))
            .collect();
        assert_eq!(clicks.len(), 3);

        rig.actions.fight(None).unwrap();
        assert_eq!(rig.input.clicks().last(), Some(&abs(coords::NUKE)));
    }

    #[test]
    fn test_fight_stops_mid_sequence() {
        let mut rig = rig();
        rig.executor.stop();
        assert!(matches!(rig.actions.fight(Some(100)), Err(ActionError::Stopped)));
    }

    #[test]
    fn test_ensure_idle_mode_noop_when_already_set() {
        let mut rig = rig();
        rig.screen.paint(abs(coords::IDLE_INDICATOR), coords::IDLE_ON_COLOR);
        rig.actions.ensure_idle_mode(true).unwrap();
        assert!(rig.input.keys().is_empty());
    }

    #[test]
    fn test_ensure_idle_mode_unverified_times_out() {
        let mut rig = rig();
        // Indicator never turns on: one toggle, then a bounded wait
        let err = rig.actions.ensure_idle_mode(true).unwrap_err();
        assert!(err.is_soft());
        assert_eq!(rig.input.keys(), vec![Key::Char('q')]);
    }

    #[test]
    fn test_assign_augments_types_amounts() {
        let mut rig = rig();
        let plan = AugmentPlan::new(
            &[
                (crate::automation::options::Augment::EnergyBuster, 0.7),
                (crate::automation::options::Augment::ChargeShot, 0.3),
            ],
            3.5e9,
        )
        .unwrap();
        rig.actions.assign_augments(&plan).unwrap();

        let texts: Vec<String> = rig
            .input
            .events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Text(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["2450000000", "1050000000"]);
        assert!(rig
            .input
            .clicks()
            .contains(&abs(coords::augment_add(crate::automation::options::Augment::ChargeShot))));
    }

    #[test]
    fn test_gold_diggers_activates_only_inactive() {
        let mut rig = rig();
        let set = diggers(&[9, 2, 8]).unwrap();
        // Digger 2 (page 0, slot 1) is already active
        rig.screen.paint(abs(coords::digger_active(1)), coords::DIG_ACTIVE_COLOR);

        rig.actions.gold_diggers(&set, true).unwrap();

        let clicks = rig.input.clicks();
        let page_clicks: Vec<_> = clicks
            .iter()
            .filter(|p| (0..3).any(|page| **p == abs(coords::digger_page(page))))
            .collect();
        // Sorted by page: page 0 (digger 2), page 1 (digger 8), page 2 (digger 9)
        assert_eq!(page_clicks.len(), 3);
        // digger 8 and 9 slot toggles clicked, digger 2's not
        let toggles = clicks
            .iter()
            .filter(|p| (0..4).any(|slot| **p == abs(coords::digger_active(slot))))
            .count();
        assert_eq!(toggles, 2);
    }

    #[test]
    fn test_challenge_active_reads_banner() {
        let mut rig = rig();
        let rect = Origin { x: 100, y: 50 }.resolve_rect(coords::CHALLENGE_TEXT);
        rig.reader.script(rect, &["Laser Sword Challenge active", "Rebirth"]);
        assert!(rig.actions.challenge_active().unwrap());
        assert!(!rig.actions.challenge_active().unwrap());
    }

    #[test]
    fn test_challenge_active_retries_unreadable_banner() {
        let mut rig = rig();
        let rect = Origin { x: 100, y: 50 }.resolve_rect(coords::CHALLENGE_TEXT);
        rig.reader.script(rect, &["", "~#!", "Laser Sword Challenge active"]);
        assert!(rig.actions.challenge_active().unwrap());
    }

    #[test]
    fn test_challenge_active_times_out_on_garbage() {
        let mut rig = rig();
        let rect = Origin { x: 100, y: 50 }.resolve_rect(coords::CHALLENGE_TEXT);
        rig.reader.script(rect, &[""]);
        assert!(matches!(
            rig.actions.challenge_active(),
            Err(ActionError::Timeout { .. })
        ));
    }

    #[test]
    fn test_parse_challenge_banner() {
        assert_eq!(parse_challenge_banner("Basic CHALLENGE 3"), Some(true));
        assert_eq!(parse_challenge_banner("  Rebirth  "), Some(false));
        assert_eq!(parse_challenge_banner(""), None);
        assert_eq!(parse_challenge_banner("l1|"), None);
    }

    #[test]
    fn test_enemy_present_and_snipe() {
        let mut rig = rig();
        assert!(!rig.actions.enemy_present().unwrap());
        rig.screen.paint(abs(coords::ENEMY_HEALTH), coords::ENEMY_HEALTH_COLOR);
        assert!(rig.actions.enemy_present().unwrap());
        rig.actions.snipe_enemy().unwrap();
        assert_eq!(rig.input.keys(), vec![Key::Char('w')]);
    }

    #[test]
    fn test_activate_window_detects_closed_window() {
        let config = AutomationConfig::default();
        let locator = FakeLocator::with_titles(&["NGU Idle"]);
        let mut screen = FakeScreen::new(500, 500, Color::rgb(0, 0, 0));
        screen.paint(Point::new(0, 0), config.landmark_color);
        let session = Session::connect(
            &config,
            fake_backends(
                locator.clone(),
                screen,
                RecordingInput::default(),
                ScriptedReader::default(),
            ),
        )
        .unwrap();
        let mut actions = Actions::new(
            session,
            PausableExecutor::new(Arc::new(FakeClock::new())),
            Timing::from_config(&config),
        );

        actions.activate_window().unwrap();
        locator.close_all();
        assert!(matches!(actions.activate_window(), Err(ActionError::Failed(_))));
    }

    #[test]
    fn test_parse_quest_panel() {
        assert_eq!(parse_quest_panel("Start Quest"), Some(QuestStatus::Idle));
        let status = parse_quest_panel("Gather items in Badly Drawn World 12 / 40").unwrap();
        assert!(matches!(status, QuestStatus::Active { done: 12, total: 40, .. }));
        assert!(!status.is_complete());
        assert!(parse_quest_panel("Badly Drawn World 40/40").unwrap().is_complete());
        assert_eq!(parse_quest_panel(""), None);
    }
}
