//! Questing: pick up a quest, farm its zone in idle mode, hand it in.

use std::fmt;
use std::time::{Duration, Instant};

use crate::automation::actions::QuestStatus;
use crate::automation::config::QuestingConfig;
use crate::automation::error::{ActionError, ActionResult};
use crate::automation::options::{AdventureTarget, QuestZone};
use crate::automation::progress::{ProgressEvent, DONE, QUEST_POINTS, QUEST_POINTS_PER_HOUR, TASK_PROGRESS};
use crate::automation::routine::{Routine, RoutineContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestStage {
    ReadPanel,
    StartQuest,
    Travel,
    Progress,
    HandIn,
    Done,
}

impl QuestStage {
    const COUNT: usize = 6;

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for QuestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct QuestingRoutine {
    config: QuestingConfig,
    stage: QuestStage,
    start: Option<Instant>,
    baseline_qp: f64,
    description: String,
}

impl QuestingRoutine {
    pub fn new(config: QuestingConfig) -> Self {
        Self {
            config,
            stage: QuestStage::ReadPanel,
            start: None,
            baseline_qp: 0.0,
            description: String::new(),
        }
    }

    fn elapsed(&self, ctx: &RoutineContext<'_>) -> Duration {
        self.start
            .map(|start| ctx.now().saturating_duration_since(start))
            .unwrap_or_default()
    }

    fn run_stage(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<Option<QuestStage>> {
        match self.stage {
            QuestStage::ReadPanel => {
                ctx.stage(&QuestStage::ReadPanel.to_string(), 0, QuestStage::COUNT - 1);
                self.start = Some(ctx.now());
                self.baseline_qp = ctx.act(|a| a.read_quest_points())?;
                match ctx.act(|a| a.quest_status())? {
                    QuestStatus::Idle => Ok(Some(QuestStage::StartQuest)),
                    status @ QuestStatus::Active { .. } => {
                        let complete = status.is_complete();
                        self.remember(status);
                        if complete {
                            Ok(Some(QuestStage::HandIn))
                        } else {
                            Ok(Some(QuestStage::Travel))
                        }
                    }
                }
            }
            QuestStage::StartQuest => {
                ctx.act(|a| a.start_quest())?;
                match ctx.act(|a| a.quest_status())? {
                    QuestStatus::Idle => Err(ActionError::Unrecognised(
                        "quest panel: still idle after starting a quest".to_string(),
                    )),
                    status => {
                        self.remember(status);
                        Ok(Some(QuestStage::Travel))
                    }
                }
            }
            QuestStage::Travel => {
                let zone = QuestZone::from_quest_text(&self.description).ok_or_else(|| {
                    ActionError::Unrecognised(format!("quest zone in {:?}", self.description))
                })?;
                crate::log(&format!("Quest zone: {:?} (zone {})", zone, zone.zone_index()));
                ctx.act(|a| a.adventure(AdventureTarget::Zone(zone.zone_index())))?;
                ctx.act(|a| a.ensure_idle_mode(true))?;
                Ok(Some(QuestStage::Progress))
            }
            QuestStage::Progress => self.progress_tick(ctx),
            QuestStage::HandIn => {
                ctx.act(|a| a.complete_quest())?;
                let qp = ctx.act(|a| a.read_quest_points())?;
                ctx.emit(ProgressEvent::number(QUEST_POINTS, qp));

                let hours = self.elapsed(ctx).as_secs_f64() / 3600.0;
                if hours > 0.0 {
                    ctx.emit(ProgressEvent::number(
                        QUEST_POINTS_PER_HOUR,
                        (qp - self.baseline_qp) / hours,
                    ));
                }
                Ok(Some(QuestStage::Done))
            }
            QuestStage::Done => {
                ctx.emit(ProgressEvent::number(DONE, self.elapsed(ctx).as_secs_f64()));
                Ok(None)
            }
        }
    }

    fn progress_tick(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<Option<QuestStage>> {
        match ctx.act(|a| a.quest_status())? {
            QuestStatus::Idle => Err(ActionError::Unrecognised(
                "quest panel: quest vanished before completion".to_string(),
            )),
            QuestStatus::Active { done, total, .. } => {
                let percent = if total == 0 {
                    100.0
                } else {
                    (done as f64 / total as f64 * 100.0).min(100.0)
                };
                ctx.emit(ProgressEvent::number(TASK_PROGRESS, percent));
                if done >= total {
                    return Ok(Some(QuestStage::HandIn));
                }

                let waited = self.elapsed(ctx);
                if waited >= Duration::from_secs(self.config.max_cycle_secs) {
                    return Err(ActionError::Timeout {
                        what: "quest to complete".to_string(),
                        waited,
                    });
                }
                ctx.sleep(Duration::from_secs(self.config.progress_poll_secs))?;
                Ok(None)
            }
        }
    }

    fn remember(&mut self, status: QuestStatus) {
        if let QuestStatus::Active { description, done, total } = status {
            crate::log(&format!("Quest: {} ({}/{})", description.trim(), done, total));
            self.description = description;
        }
    }
}

impl Routine for QuestingRoutine {
    fn name(&self) -> &'static str {
        "questing"
    }

    fn step(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<bool> {
        match self.run_stage(ctx)? {
            Some(next) => {
                self.stage = next;
                ctx.stage(&next.to_string(), next.index(), QuestStage::COUNT - 1);
                Ok(true)
            }
            None if self.stage == QuestStage::Done => Ok(false),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::config::AutomationConfig;
    use crate::automation::executor::PausableExecutor;
    use crate::automation::progress::{create_progress_channel, ProgressReporter, ProgressValue};
    use crate::automation::routine::run_cycle;
    use crate::testing::{Call, FakeClock, RecordingActions};
    use std::sync::Arc;

    fn active(description: &str, done: u32, total: u32) -> Option<QuestStatus> {
        Some(QuestStatus::Active {
            description: description.to_string(),
            done,
            total,
        })
    }

    fn run(config: AutomationConfig, mut actions: RecordingActions) -> (RecordingActions, Vec<ProgressEvent>, ActionResult<()>) {
        let executor = PausableExecutor::new(Arc::new(FakeClock::new()));
        let (tx, rx) = create_progress_channel();
        let progress = ProgressReporter::new(tx);
        let mut routine = QuestingRoutine::new(config.questing.clone());
        let result = {
            let mut ctx = RoutineContext {
                executor: &executor,
                actions: &mut actions,
                progress: &progress,
                config: &config,
            };
            run_cycle(&mut routine, &mut ctx)
        };
        drop(progress);
        (actions, rx.into_iter().collect(), result)
    }

    #[test]
    fn test_full_quest_cycle() {
        let text = "Gather 40 drops in Badly Drawn World";
        let actions = RecordingActions::new()
            .quests(&[
                Some(QuestStatus::Idle),
                active(text, 0, 40),
                active(text, 10, 40),
                active(text, 40, 40),
            ])
            .quest_points(&[100.0, 110.0]);
        let (actions, events, result) = run(AutomationConfig::default(), actions);
        result.unwrap();

        assert_eq!(
            actions.calls(),
            vec![
                Call::ActivateWindow,
                Call::ReadQuestPoints,
                Call::QuestStatus,
                Call::StartQuest,
                Call::QuestStatus,
                Call::Adventure(AdventureTarget::Zone(18)),
                Call::IdleMode(true),
                Call::QuestStatus,
                Call::QuestStatus,
                Call::CompleteQuest,
                Call::ReadQuestPoints,
            ]
        );

        let qp = events.iter().find(|e| e.metric == QUEST_POINTS).unwrap();
        assert_eq!(qp.value, ProgressValue::Number(110.0));
        // 10 QP over one 10 s poll
        let qph = events.iter().find(|e| e.metric == QUEST_POINTS_PER_HOUR).unwrap();
        match qph.value {
            ProgressValue::Number(n) => assert!((n - 3600.0).abs() < 1e-6, "qph {}", n),
            _ => panic!("qph is a number"),
        }
        assert!(events.iter().any(|e| e.metric == DONE));
    }

    #[test]
    fn test_resumes_running_quest() {
        let actions = RecordingActions::new()
            .quests(&[active("Beat stuff in the Evilverse 3/20", 3, 20), active("", 20, 20)]);
        let (actions, _, result) = run(AutomationConfig::default(), actions);
        result.unwrap();

        let calls = actions.calls();
        assert!(!calls.contains(&Call::StartQuest));
        assert!(calls.contains(&Call::Adventure(AdventureTarget::Zone(22))));
    }

    #[test]
    fn test_unknown_zone_fails() {
        let actions = RecordingActions::new().quests(&[active("Do something somewhere", 0, 5)]);
        let (_, _, result) = run(AutomationConfig::default(), actions);
        match result {
            Err(e @ ActionError::Unrecognised(_)) => {
                assert!(e.is_soft());
                assert!(e.to_string().contains("quest zone"));
            }
            other => panic!("expected unrecognised zone, got {:?}", other),
        }
    }

    #[test]
    fn test_quest_that_never_starts_is_soft() {
        let actions = RecordingActions::new().quests(&[Some(QuestStatus::Idle)]);
        let (actions, _, result) = run(AutomationConfig::default(), actions);
        match result {
            Err(e) => assert!(e.is_soft(), "{:?}", e),
            Ok(()) => panic!("an idle panel after starting must fail the cycle"),
        }
        assert_eq!(actions.count(&Call::StartQuest), 1);
        assert!(!actions.calls().contains(&Call::CompleteQuest));
    }

    #[test]
    fn test_stuck_quest_times_out() {
        let mut config = AutomationConfig::default();
        config.questing.max_cycle_secs = 60;
        let actions = RecordingActions::new().quests(&[active("Rad Lands quest", 1, 40)]);
        let (_, events, result) = run(config, actions);

        assert!(matches!(result, Err(ActionError::Timeout { .. })));
        assert!(events.iter().any(|e| e.metric == TASK_PROGRESS));
    }
}
