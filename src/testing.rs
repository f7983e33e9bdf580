//! In-memory stand-ins for the OS backends and the action library.
//!
//! Everything here is cheap to clone; clones share state, so a test can keep
//! one handle for assertions and hand another to the code under test.

use anyhow::{anyhow, Result};
use image::Rgba;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::automation::actions::{GameActions, QuestStatus};
use crate::automation::clock::Clock;
use crate::automation::error::{ActionError, ActionResult};
use crate::automation::input::{InputDriver, Key, MouseButton};
use crate::automation::options::{AdventureTarget, Augment, AugmentPlan, GoldDigger, Loadout};
use crate::automation::session::Backends;
use crate::capture::{CapturedRegion, Color, Point, Rect, RgbaImage, ScreenSampler, WindowHandle, WindowLocator};
use crate::ocr::TextReader;

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// --- clock ---

/// Virtual time: `sleep` advances `now` instantly.
pub struct FakeClock {
    start: Instant,
    elapsed: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn elapsed(&self) -> Duration {
        *locked(&self.elapsed)
    }

    pub fn advance(&self, by: Duration) {
        *locked(&self.elapsed) += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

// --- screen ---

#[derive(Clone)]
pub struct FakeScreen {
    image: Arc<Mutex<RgbaImage>>,
}

impl FakeScreen {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        let pixel = Rgba([background.r, background.g, background.b, 255]);
        Self {
            image: Arc::new(Mutex::new(RgbaImage::from_pixel(width, height, pixel))),
        }
    }

    /// Sets one pixel. Points off the screen are ignored.
    pub fn paint(&mut self, at: Point, color: Color) {
        let mut image = locked(&self.image);
        if at.x >= 0 && at.y >= 0 && (at.x as u32) < image.width() && (at.y as u32) < image.height() {
            image.put_pixel(at.x as u32, at.y as u32, Rgba([color.r, color.g, color.b, 255]));
        }
    }

    pub fn fill(&mut self, rect: Rect, color: Color) {
        for dy in 0..rect.height as i32 {
            for dx in 0..rect.width as i32 {
                self.paint(Point::new(rect.x + dx, rect.y + dy), color);
            }
        }
    }
}

impl ScreenSampler for FakeScreen {
    fn pixel_at(&self, at: Point) -> Result<Color> {
        let image = locked(&self.image);
        if at.x < 0 || at.y < 0 || at.x as u32 >= image.width() || at.y as u32 >= image.height() {
            return Err(anyhow!("pixel {:?} is off screen", at));
        }
        let p = image.get_pixel(at.x as u32, at.y as u32);
        Ok(Color::rgb(p[0], p[1], p[2]))
    }

    /// Parts of `rect` outside the screen read as transparent black.
    fn region(&self, rect: Rect) -> Result<CapturedRegion> {
        let image = locked(&self.image);
        let mut out = RgbaImage::new(rect.width, rect.height);
        for y in 0..rect.height {
            for x in 0..rect.width {
                let sx = rect.x + x as i32;
                let sy = rect.y + y as i32;
                if sx >= 0 && sy >= 0 && (sx as u32) < image.width() && (sy as u32) < image.height() {
                    out.put_pixel(x, y, *image.get_pixel(sx as u32, sy as u32));
                }
            }
        }
        Ok(CapturedRegion::new(rect, out))
    }
}

// --- input ---

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Click(Point, MouseButton),
    Drag(Point, Point),
    Text(String),
    Key(Key),
}

#[derive(Clone, Default)]
pub struct RecordingInput {
    events: Arc<Mutex<Vec<InputEvent>>>,
}

impl RecordingInput {
    pub fn events(&self) -> Vec<InputEvent> {
        locked(&self.events).clone()
    }

    /// Left-click positions, in order.
    pub fn clicks(&self) -> Vec<Point> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Click(p, MouseButton::Left) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Key(k) => Some(k),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: InputEvent) {
        locked(&self.events).push(event);
    }
}

impl InputDriver for RecordingInput {
    fn click(&self, at: Point, button: MouseButton) -> Result<()> {
        self.push(InputEvent::Click(at, button));
        Ok(())
    }

    fn drag(&self, from: Point, to: Point) -> Result<()> {
        self.push(InputEvent::Drag(from, to));
        Ok(())
    }

    fn send_text(&self, text: &str) -> Result<()> {
        self.push(InputEvent::Text(text.to_string()));
        Ok(())
    }

    fn send_key(&self, key: Key) -> Result<()> {
        self.push(InputEvent::Key(key));
        Ok(())
    }
}

// --- OCR ---

/// Returns scripted strings per absolute capture rectangle.
///
/// Each rectangle has a queue; once drained, its last string repeats.
/// Unscripted rectangles read as empty text.
#[derive(Clone, Default)]
pub struct ScriptedReader {
    scripts: Arc<Mutex<Vec<(Rect, Queue<String>)>>>,
}

impl ScriptedReader {
    pub fn script(&self, rect: Rect, texts: &[&str]) {
        let mut scripts = locked(&self.scripts);
        let texts = texts.iter().map(|t| t.to_string());
        match scripts.iter_mut().find(|(r, _)| *r == rect) {
            Some((_, queue)) => queue.extend(texts),
            None => {
                let mut queue = Queue::default();
                queue.extend(texts);
                scripts.push((rect, queue));
            }
        }
    }
}

impl TextReader for ScriptedReader {
    fn read(&self, region: &CapturedRegion) -> Result<String> {
        let mut scripts = locked(&self.scripts);
        Ok(scripts
            .iter_mut()
            .find(|(r, _)| *r == region.rect)
            .and_then(|(_, queue)| queue.next())
            .unwrap_or_default())
    }
}

// --- window ---

#[derive(Clone)]
pub struct FakeLocator {
    titles: Arc<Vec<String>>,
    alive: Arc<AtomicBool>,
}

impl FakeLocator {
    pub fn with_titles(titles: &[&str]) -> Self {
        Self {
            titles: Arc::new(titles.iter().map(|t| t.to_string()).collect()),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates the game being closed.
    pub fn close_all(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl WindowLocator for FakeLocator {
    fn find(&self, title_substring: &str) -> Result<Option<WindowHandle>> {
        if !self.alive.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self
            .titles
            .iter()
            .enumerate()
            .find(|(_, t)| crate::capture::window::title_matches(t, title_substring))
            .map(|(i, t)| WindowHandle {
                raw: i as isize + 1,
                title: t.clone(),
            }))
    }

    fn activate(&self, _handle: &WindowHandle) {}

    fn is_alive(&self, _handle: &WindowHandle) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

pub fn fake_backends(
    locator: FakeLocator,
    screen: FakeScreen,
    input: RecordingInput,
    reader: ScriptedReader,
) -> Backends {
    Backends {
        locator: Box::new(locator),
        screen: Box::new(screen),
        input: Box::new(input),
        reader: Box::new(reader),
    }
}

// --- actions ---

/// FIFO of scripted values whose last value sticks once drained.
struct Queue<T> {
    items: VecDeque<T>,
    last: Option<T>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            last: None,
        }
    }
}

impl<T: Clone> Queue<T> {
    fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.extend(items);
    }

    fn next(&mut self) -> Option<T> {
        if let Some(item) = self.items.pop_front() {
            self.last = Some(item.clone());
        }
        self.last.clone()
    }
}

/// One recorded `GameActions` call.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    ActivateWindow,
    Rebirth,
    Fight(Option<u32>),
    CurrentBoss,
    Loadout(Loadout),
    Adventure(AdventureTarget),
    IdleMode(bool),
    TimeMachine(bool),
    Augments(Vec<(Augment, u64)>),
    BloodMagic(u8),
    BoostEquipment,
    Wandoos(bool),
    Diggers(Vec<u8>, bool),
    ReclaimEnergy,
    ChallengeActive,
    Pit,
    Spin,
    BloodPill,
    ReadExp,
    EnemyPresent,
    Snipe,
    QuestStatus,
    StartQuest,
    CompleteQuest,
    ReadQuestPoints,
}

type CallHook = Box<dyn FnMut(&Call) + Send>;

/// `GameActions` that records calls and answers reads from scripts.
///
/// Reads with nothing scripted: boss and quest panel time out, predicates are
/// false, numbers are zero.
#[derive(Default)]
pub struct RecordingActions {
    calls: Vec<(Duration, Call)>,
    clock: Option<Arc<FakeClock>>,
    bosses: Queue<Option<u32>>,
    challenge: Queue<bool>,
    enemies: Queue<bool>,
    quests: Queue<Option<QuestStatus>>,
    exp: Queue<f64>,
    quest_points: Queue<f64>,
    window_closed: bool,
    hook: Option<CallHook>,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps each call with the clock's elapsed time.
    pub fn timed(mut self, clock: Arc<FakeClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// `None` makes that reading time out.
    pub fn bosses(mut self, readings: &[Option<u32>]) -> Self {
        self.bosses.extend(readings.iter().copied());
        self
    }

    pub fn challenge(mut self, readings: &[bool]) -> Self {
        self.challenge.extend(readings.iter().copied());
        self
    }

    pub fn enemies(mut self, readings: &[bool]) -> Self {
        self.enemies.extend(readings.iter().copied());
        self
    }

    pub fn quests(mut self, readings: &[Option<QuestStatus>]) -> Self {
        self.quests.extend(readings.iter().cloned());
        self
    }

    pub fn exp(mut self, readings: &[f64]) -> Self {
        self.exp.extend(readings.iter().copied());
        self
    }

    pub fn quest_points(mut self, readings: &[f64]) -> Self {
        self.quest_points.extend(readings.iter().copied());
        self
    }

    pub fn window_closed(mut self) -> Self {
        self.window_closed = true;
        self
    }

    /// Runs after every recorded call, e.g. to stop the executor mid-routine.
    pub fn on_call(mut self, hook: impl FnMut(&Call) + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Duration, Call)> {
        self.calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|(_, c)| c == call).count()
    }

    fn record(&mut self, call: Call) {
        let at = self.clock.as_ref().map(|c| c.elapsed()).unwrap_or_default();
        if let Some(hook) = self.hook.as_mut() {
            hook(&call);
        }
        self.calls.push((at, call));
    }
}

fn timeout(what: &str) -> ActionError {
    ActionError::Timeout {
        what: what.to_string(),
        waited: Duration::from_secs(10),
    }
}

impl GameActions for RecordingActions {
    fn activate_window(&mut self) -> ActionResult<()> {
        self.record(Call::ActivateWindow);
        if self.window_closed {
            return Err(anyhow!("Game window no longer exists").into());
        }
        Ok(())
    }

    fn do_rebirth(&mut self) -> ActionResult<()> {
        self.record(Call::Rebirth);
        Ok(())
    }

    fn fight(&mut self, times: Option<u32>) -> ActionResult<()> {
        self.record(Call::Fight(times));
        Ok(())
    }

    fn current_boss(&mut self) -> ActionResult<u32> {
        self.record(Call::CurrentBoss);
        self.bosses.next().flatten().ok_or_else(|| timeout("boss number"))
    }

    fn ensure_loadout(&mut self, loadout: Loadout) -> ActionResult<()> {
        self.record(Call::Loadout(loadout));
        Ok(())
    }

    fn adventure(&mut self, target: AdventureTarget) -> ActionResult<()> {
        self.record(Call::Adventure(target));
        Ok(())
    }

    fn ensure_idle_mode(&mut self, on: bool) -> ActionResult<()> {
        self.record(Call::IdleMode(on));
        Ok(())
    }

    fn time_machine(&mut self, magic: bool) -> ActionResult<()> {
        self.record(Call::TimeMachine(magic));
        Ok(())
    }

    fn assign_augments(&mut self, plan: &AugmentPlan) -> ActionResult<()> {
        self.record(Call::Augments(plan.allocations()));
        Ok(())
    }

    fn blood_magic(&mut self, target: u8) -> ActionResult<()> {
        self.record(Call::BloodMagic(target));
        Ok(())
    }

    fn boost_equipment(&mut self) -> ActionResult<()> {
        self.record(Call::BoostEquipment);
        Ok(())
    }

    fn wandoos(&mut self, magic: bool) -> ActionResult<()> {
        self.record(Call::Wandoos(magic));
        Ok(())
    }

    fn gold_diggers(&mut self, diggers: &[GoldDigger], activate: bool) -> ActionResult<()> {
        let numbers = diggers.iter().map(|d| d.number()).collect();
        self.record(Call::Diggers(numbers, activate));
        Ok(())
    }

    fn reclaim_energy(&mut self) -> ActionResult<()> {
        self.record(Call::ReclaimEnergy);
        Ok(())
    }

    fn challenge_active(&mut self) -> ActionResult<bool> {
        self.record(Call::ChallengeActive);
        Ok(self.challenge.next().unwrap_or(false))
    }

    fn pit(&mut self) -> ActionResult<()> {
        self.record(Call::Pit);
        Ok(())
    }

    fn spin(&mut self) -> ActionResult<()> {
        self.record(Call::Spin);
        Ok(())
    }

    fn blood_pill(&mut self) -> ActionResult<()> {
        self.record(Call::BloodPill);
        Ok(())
    }

    fn read_exp(&mut self) -> ActionResult<f64> {
        self.record(Call::ReadExp);
        Ok(self.exp.next().unwrap_or(0.0))
    }

    fn enemy_present(&mut self) -> ActionResult<bool> {
        self.record(Call::EnemyPresent);
        Ok(self.enemies.next().unwrap_or(false))
    }

    fn snipe_enemy(&mut self) -> ActionResult<()> {
        self.record(Call::Snipe);
        Ok(())
    }

    fn quest_status(&mut self) -> ActionResult<QuestStatus> {
        self.record(Call::QuestStatus);
        self.quests.next().flatten().ok_or_else(|| timeout("quest panel"))
    }

    fn start_quest(&mut self) -> ActionResult<()> {
        self.record(Call::StartQuest);
        Ok(())
    }

    fn complete_quest(&mut self) -> ActionResult<()> {
        self.record(Call::CompleteQuest);
        Ok(())
    }

    fn read_quest_points(&mut self) -> ActionResult<f64> {
        self.record(Call::ReadQuestPoints);
        Ok(self.quest_points.next().unwrap_or(0.0))
    }
}
