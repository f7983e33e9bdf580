//! Routine engine: the outer perpetual loop around the step-driven routines.
//!
//! A routine is a state machine advanced by `step()`. Every game action goes
//! through [`RoutineContext::act`], which passes the executor's action
//! boundary first, so a pause takes effect between two actions and never
//! inside one.

use anyhow::anyhow;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::automation::actions::GameActions;
use crate::automation::config::AutomationConfig;
use crate::automation::error::{ActionError, ActionResult};
use crate::automation::executor::PausableExecutor;
use crate::automation::itopod::ItopodRoutine;
use crate::automation::progress::{ProgressEvent, ProgressReporter, FAILURE};
use crate::automation::questing::QuestingRoutine;
use crate::automation::speedrun::SpeedrunRoutine;

/// Routines the operator can start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutineKind {
    Speedrun,
    Itopod,
    Questing,
}

impl RoutineKind {
    pub fn id(self) -> &'static str {
        match self {
            RoutineKind::Speedrun => "speedrun",
            RoutineKind::Itopod => "itopod",
            RoutineKind::Questing => "questing",
        }
    }

    /// Fresh state machine for one cycle.
    fn build(self, config: &AutomationConfig) -> Box<dyn Routine> {
        match self {
            RoutineKind::Speedrun => Box::new(SpeedrunRoutine::new(config.speedrun.clone())),
            RoutineKind::Itopod => Box::new(ItopodRoutine::new(config.itopod.clone())),
            RoutineKind::Questing => Box::new(QuestingRoutine::new(config.questing.clone())),
        }
    }
}

impl fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for RoutineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speedrun" => Ok(RoutineKind::Speedrun),
            "itopod" => Ok(RoutineKind::Itopod),
            "questing" => Ok(RoutineKind::Questing),
            other => Err(anyhow!("unknown routine: {:?}", other)),
        }
    }
}

/// What a routine step can touch.
pub struct RoutineContext<'a> {
    pub executor: &'a PausableExecutor,
    pub actions: &'a mut dyn GameActions,
    pub progress: &'a ProgressReporter,
    pub config: &'a AutomationConfig,
}

impl RoutineContext<'_> {
    /// Runs one action after passing the pause/stop boundary.
    pub fn act<T>(
        &mut self,
        action: impl FnOnce(&mut dyn GameActions) -> ActionResult<T>,
    ) -> ActionResult<T> {
        self.executor.boundary()?;
        action(&mut *self.actions)
    }

    pub fn sleep(&self, duration: Duration) -> ActionResult<()> {
        self.executor.sleep(duration)
    }

    pub fn now(&self) -> Instant {
        self.executor.clock().now()
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.progress.emit(event);
    }

    /// Announces a stage with its share of the routine as a percentage.
    pub fn stage(&self, name: &str, index: usize, count: usize) {
        let percent = if count == 0 {
            0.0
        } else {
            index as f64 * 100.0 / count as f64
        };
        self.progress.stage(name, percent);
    }
}

/// A step-driven routine state machine.
pub trait Routine {
    fn name(&self) -> &'static str;

    /// Advances by one state.
    ///
    /// Returns `Ok(true)` to keep stepping, `Ok(false)` once the cycle is done.
    fn step(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<bool>;
}

/// Runs one cycle of `routine` to completion.
pub fn run_cycle(routine: &mut dyn Routine, ctx: &mut RoutineContext<'_>) -> ActionResult<()> {
    ctx.act(|a| a.activate_window())?;
    while routine.step(ctx)? {}
    Ok(())
}

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    Stopped,
    /// `max_cycles` reached
    CyclesDone(u32),
    /// Too many soft failures in a row
    GaveUp(u32),
    /// A hard failure, e.g. the game window closed; reconnect before running again
    Failed(String),
}

/// Runs cycles of `kind` back to back until stopped.
///
/// A soft failure abandons the current cycle and emits a `failure` event; the
/// next cycle starts from the routine's first state. After
/// `max_consecutive_failures` failed cycles in a row the session ends.
/// A hard failure (backend error) emits `failure` and ends the session at once.
/// `max_cycles` bounds the number of cycles attempted (`None` = perpetual).
pub fn run_session(
    kind: RoutineKind,
    executor: &PausableExecutor,
    actions: &mut dyn GameActions,
    progress: &ProgressReporter,
    config: &AutomationConfig,
    max_cycles: Option<u32>,
) -> SessionEnd {
    let mut ctx = RoutineContext {
        executor,
        actions,
        progress,
        config,
    };
    let mut cycles = 0u32;
    let mut failures = 0u32;

    crate::log(&format!("Starting {} session", kind));
    loop {
        if max_cycles.is_some_and(|max| cycles >= max) {
            crate::log(&format!("{} session finished after {} cycles", kind, cycles));
            return SessionEnd::CyclesDone(cycles);
        }
        cycles += 1;

        let mut routine = kind.build(config);
        crate::log(&format!("{} cycle {} starting", routine.name(), cycles));

        match run_cycle(routine.as_mut(), &mut ctx) {
            Ok(()) => {
                failures = 0;
            }
            Err(ActionError::Stopped) => {
                crate::log(&format!("{} stopped during cycle {}", kind, cycles));
                return SessionEnd::Stopped;
            }
            Err(e) if !e.is_soft() => {
                crate::log(&format!("{} cycle {} failed hard: {:#}", kind, cycles, e));
                ctx.emit(ProgressEvent::text(FAILURE, e.to_string()));
                return SessionEnd::Failed(e.to_string());
            }
            Err(e) => {
                failures += 1;
                crate::log(&format!(
                    "{} cycle {} failed ({} in a row): {}",
                    kind, cycles, failures, e
                ));
                ctx.emit(ProgressEvent::text(FAILURE, e.to_string()));
                if failures >= config.max_consecutive_failures {
                    crate::log(&format!("Giving up on {} after {} failures", kind, failures));
                    return SessionEnd::GaveUp(failures);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::actions::QuestStatus;
    use crate::automation::progress::{create_progress_channel, DONE};
    use crate::testing::{Call, FakeClock, RecordingActions};
    use std::sync::Arc;

    fn setup() -> (PausableExecutor, ProgressReporter, std::sync::mpsc::Receiver<ProgressEvent>) {
        let executor = PausableExecutor::new(Arc::new(FakeClock::new()));
        let (tx, rx) = create_progress_channel();
        (executor, ProgressReporter::new(tx), rx)
    }

    #[test]
    fn test_routine_ids() {
        for kind in [RoutineKind::Speedrun, RoutineKind::Itopod, RoutineKind::Questing] {
            assert_eq!(kind.id().parse::<RoutineKind>().unwrap(), kind);
        }
        assert_eq!(" ITOPOD ".parse::<RoutineKind>().unwrap(), RoutineKind::Itopod);
        assert!("farm".parse::<RoutineKind>().is_err());
    }

    #[test]
    fn test_closed_window_ends_session_at_once() {
        let (executor, progress, rx) = setup();
        let config = AutomationConfig::default();
        let mut actions = RecordingActions::new().window_closed();

        let end = run_session(RoutineKind::Speedrun, &executor, &mut actions, &progress, &config, None);

        match end {
            SessionEnd::Failed(reason) => assert!(reason.contains("no longer exists"), "{}", reason),
            other => panic!("expected a hard failure, got {:?}", other),
        }
        assert_eq!(actions.count(&Call::ActivateWindow), 1);
        assert!(!actions.calls().contains(&Call::Rebirth));
        let failures = rx.try_iter().filter(|e| e.metric == FAILURE).count();
        assert_eq!(failures, 1);
    }

    #[test]
    fn test_unrecognised_quest_zone_is_retried() {
        let (executor, progress, rx) = setup();
        let config = AutomationConfig::default();
        let mut actions = RecordingActions::new().quests(&[Some(QuestStatus::Active {
            description: "Do something somewhere".to_string(),
            done: 0,
            total: 5,
        })]);

        let end = run_session(RoutineKind::Questing, &executor, &mut actions, &progress, &config, None);

        assert_eq!(end, SessionEnd::GaveUp(3));
        assert_eq!(actions.count(&Call::ActivateWindow), 3);
        assert_eq!(rx.try_iter().filter(|e| e.metric == FAILURE).count(), 3);
    }

    #[test]
    fn test_session_boss_timeout_is_a_soft_failure() {
        let (executor, progress, rx) = setup();
        let config = AutomationConfig::default();
        // Boss number never readable: every cycle fails at BossClearing
        let mut actions = RecordingActions::new();

        let end = run_session(RoutineKind::Speedrun, &executor, &mut actions, &progress, &config, None);

        assert_eq!(end, SessionEnd::GaveUp(3));
        assert_eq!(actions.count(&Call::Rebirth), 3);
        let failure = rx.try_iter().find(|e| e.metric == FAILURE).unwrap();
        assert!(failure.to_string().contains("boss number"));
    }

    #[test]
    fn test_session_stops_cleanly() {
        let (executor, progress, rx) = setup();
        let config = AutomationConfig::default();
        let stopper = executor.clone();
        let mut actions = RecordingActions::new()
            .bosses(&[Some(117)])
            .on_call(move |call| {
                if *call == Call::BoostEquipment {
                    stopper.stop();
                }
            });

        let end = run_session(RoutineKind::Speedrun, &executor, &mut actions, &progress, &config, None);

        assert_eq!(end, SessionEnd::Stopped);
        // The action in flight completes, nothing after it starts
        assert_eq!(actions.calls().last(), Some(&Call::BoostEquipment));
        assert!(rx.try_iter().all(|e| e.metric != FAILURE && e.metric != DONE));
    }

    #[test]
    fn test_session_runs_perpetual_cycles() {
        let (executor, progress, rx) = setup();
        let config = AutomationConfig::default();
        let mut actions = RecordingActions::new().bosses(&[Some(117)]);

        let end = run_session(RoutineKind::Speedrun, &executor, &mut actions, &progress, &config, Some(2));

        assert_eq!(end, SessionEnd::CyclesDone(2));
        assert_eq!(actions.count(&Call::Rebirth), 2);
        assert_eq!(rx.try_iter().filter(|e| e.metric == DONE).count(), 2);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (executor, progress, _rx) = setup();
        let mut config = AutomationConfig::default();
        config.max_consecutive_failures = 2;
        // fail, succeed, fail, fail
        let mut actions = RecordingActions::new().bosses(&[None, Some(117), None]);

        let end = run_session(RoutineKind::Speedrun, &executor, &mut actions, &progress, &config, None);

        assert_eq!(end, SessionEnd::GaveUp(2));
        assert_eq!(actions.count(&Call::Rebirth), 4);
    }
}
