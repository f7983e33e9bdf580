//! Timed rebirth routine.
//!
//! One cycle: rebirth, clear bosses up to the target, gear up, farm until
//! shortly before the deadline, spend what is left, then wait out the clock so
//! every cycle lasts exactly `duration_secs`.

use std::fmt;
use std::time::{Duration, Instant};

use crate::automation::config::SpeedrunConfig;
use crate::automation::error::{ActionError, ActionResult};
use crate::automation::options::AdventureTarget;
use crate::automation::progress::{ProgressEvent, BOSS, DONE};
use crate::automation::routine::{Routine, RoutineContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeedrunStage {
    Rebirthing,
    BossClearing,
    GearingGold,
    Adventuring,
    GearingPower,
    ItopodAuto,
    AugmentAssign1,
    SteadyStateFarm,
    LimitSkillTrigger,
    FinalAugmentAssign,
    ChallengeWait,
    FinalFarm,
    PitFight,
    Draining,
    Done,
}

impl SpeedrunStage {
    pub const ORDER: [SpeedrunStage; 15] = [
        SpeedrunStage::Rebirthing,
        SpeedrunStage::BossClearing,
        SpeedrunStage::GearingGold,
        SpeedrunStage::Adventuring,
        SpeedrunStage::GearingPower,
        SpeedrunStage::ItopodAuto,
        SpeedrunStage::AugmentAssign1,
        SpeedrunStage::SteadyStateFarm,
        SpeedrunStage::LimitSkillTrigger,
        SpeedrunStage::FinalAugmentAssign,
        SpeedrunStage::ChallengeWait,
        SpeedrunStage::FinalFarm,
        SpeedrunStage::PitFight,
        SpeedrunStage::Draining,
        SpeedrunStage::Done,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn next(self) -> SpeedrunStage {
        Self::ORDER
            .get(self.index() + 1)
            .copied()
            .unwrap_or(SpeedrunStage::Done)
    }
}

impl fmt::Display for SpeedrunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fixed points of one cycle, taken when the rebirth went through.
#[derive(Clone, Copy, Debug)]
struct Timeline {
    start: Instant,
    deadline: Instant,
    farm_until: Instant,
    blood_digger_at: Instant,
}

pub struct SpeedrunRoutine {
    config: SpeedrunConfig,
    stage: SpeedrunStage,
    announced: bool,
    timeline: Option<Timeline>,
    blood_digger_active: bool,
    challenge_since: Option<Instant>,
}

impl SpeedrunRoutine {
    pub fn new(config: SpeedrunConfig) -> Self {
        Self {
            config,
            stage: SpeedrunStage::Rebirthing,
            announced: false,
            timeline: None,
            blood_digger_active: false,
            challenge_since: None,
        }
    }

    fn timeline(&mut self, ctx: &RoutineContext<'_>) -> Timeline {
        match self.timeline {
            Some(timeline) => timeline,
            None => {
                // Only reachable if a stage runs without a rebirth first; anchor on now
                let timeline = self.start_timeline(ctx.now());
                self.timeline = Some(timeline);
                timeline
            }
        }
    }

    fn start_timeline(&self, start: Instant) -> Timeline {
        let deadline = start + self.config.duration();
        Timeline {
            start,
            deadline,
            farm_until: deadline
                .checked_sub(self.config.farm_margin())
                .unwrap_or(start),
            blood_digger_at: start + self.config.blood_digger_after(),
        }
    }

    /// Runs the current stage once. `None` stays in the same stage.
    fn run_stage(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<Option<SpeedrunStage>> {
        let cfg = &self.config;
        match self.stage {
            SpeedrunStage::Rebirthing => {
                ctx.act(|a| a.do_rebirth())?;
                self.timeline = Some(self.start_timeline(ctx.now()));
            }
            SpeedrunStage::BossClearing => {
                clear_bosses(ctx, cfg.target_boss, cfg.boss_clear_max_attempts)?;
            }
            SpeedrunStage::GearingGold => {
                ctx.act(|a| a.ensure_loadout(cfg.gold_loadout))?;
            }
            SpeedrunStage::Adventuring => {
                ctx.act(|a| a.adventure(AdventureTarget::Highest))?;
                ctx.sleep(Duration::from_secs(cfg.adventure_settle_secs))?;
            }
            SpeedrunStage::GearingPower => {
                ctx.act(|a| a.ensure_loadout(cfg.power_loadout))?;
            }
            SpeedrunStage::ItopodAuto => {
                ctx.act(|a| a.adventure(AdventureTarget::Itopod { auto: true }))?;
            }
            SpeedrunStage::AugmentAssign1 => {
                ctx.act(|a| a.time_machine(cfg.time_machine_magic))?;
                ctx.act(|a| a.assign_augments(&cfg.first_augments))?;
                ctx.act(|a| a.blood_magic(cfg.blood_magic_target))?;
                ctx.act(|a| a.boost_equipment())?;
                ctx.act(|a| a.wandoos(cfg.wandoos_magic))?;
                ctx.act(|a| a.gold_diggers(&cfg.opening_diggers, true))?;
            }
            SpeedrunStage::SteadyStateFarm => return self.farm_tick(ctx),
            SpeedrunStage::LimitSkillTrigger => {
                ctx.act(|a| a.reclaim_energy())?;
            }
            SpeedrunStage::FinalAugmentAssign => {
                ctx.act(|a| a.assign_augments(&cfg.final_augments))?;
            }
            SpeedrunStage::ChallengeWait => return self.challenge_tick(ctx),
            SpeedrunStage::FinalFarm => {
                ctx.act(|a| a.gold_diggers(&cfg.final_diggers, true))?;
            }
            SpeedrunStage::PitFight => {
                ctx.act(|a| a.fight(None))?;
                if cfg.pit {
                    ctx.act(|a| a.pit())?;
                }
                if cfg.spin {
                    ctx.act(|a| a.spin())?;
                }
                if cfg.blood_pill {
                    ctx.act(|a| a.blood_pill())?;
                }
            }
            SpeedrunStage::Draining => {
                let deadline = self.timeline(ctx).deadline;
                let remaining = deadline.saturating_duration_since(ctx.now());
                crate::log(&format!("Draining {:.1}s until the deadline", remaining.as_secs_f64()));
                ctx.sleep(remaining)?;
            }
            SpeedrunStage::Done => {
                let start = self.timeline(ctx).start;
                let elapsed = ctx.now().saturating_duration_since(start);
                ctx.emit(ProgressEvent::number(DONE, elapsed.as_secs_f64()));
                return Ok(None);
            }
        }
        Ok(Some(self.stage.next()))
    }

    /// One pass of the steady-state farm.
    fn farm_tick(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<Option<SpeedrunStage>> {
        let timeline = self.timeline(ctx);
        if ctx.now() >= timeline.farm_until {
            return Ok(Some(self.stage.next()));
        }

        let cfg = &self.config;
        ctx.act(|a| a.wandoos(cfg.wandoos_magic))?;
        ctx.act(|a| a.gold_diggers(&cfg.farm_diggers, false))?;
        if !self.blood_digger_active && ctx.now() > timeline.blood_digger_at {
            self.blood_digger_active = true;
            let blood = [cfg.blood_digger];
            ctx.act(|a| a.gold_diggers(&blood, true))?;
        }
        ctx.sleep(Duration::from_millis(cfg.farm_tick_ms))?;
        Ok(None)
    }

    fn challenge_tick(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<Option<SpeedrunStage>> {
        let since = *self.challenge_since.get_or_insert(ctx.now());
        if !ctx.act(|a| a.challenge_active())? {
            return Ok(Some(self.stage.next()));
        }

        let waited = ctx.now().saturating_duration_since(since);
        if let Some(max) = self.config.challenge_wait_max_secs {
            if waited >= Duration::from_secs(max) {
                return Err(ActionError::Timeout {
                    what: "challenge to end".to_string(),
                    waited,
                });
            }
        }
        ctx.sleep(Duration::from_secs(self.config.challenge_poll_secs))?;
        Ok(None)
    }
}

impl Routine for SpeedrunRoutine {
    fn name(&self) -> &'static str {
        "speedrun"
    }

    fn step(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<bool> {
        if !self.announced {
            ctx.stage(
                &self.stage.to_string(),
                self.stage.index(),
                SpeedrunStage::ORDER.len() - 1,
            );
            self.announced = true;
        }

        match self.run_stage(ctx)? {
            Some(next) => {
                self.stage = next;
                self.announced = false;
                Ok(true)
            }
            None if self.stage == SpeedrunStage::Done => Ok(false),
            None => Ok(true),
        }
    }
}

/// Fights bosses until the boss counter passes `target`.
///
/// Opens with `target` fights, then reads the counter and fights the
/// remaining distance (`target - current + 1`) until it shows `target + 1`.
/// Gives up with `NotConverged` after `max_attempts` corrective rounds.
pub fn clear_bosses(ctx: &mut RoutineContext<'_>, target: u32, max_attempts: u32) -> ActionResult<u32> {
    ctx.act(|a| a.fight(Some(target)))?;

    let mut attempts = 0;
    loop {
        let boss = ctx.act(|a| a.current_boss())?;
        ctx.emit(ProgressEvent::number(BOSS, boss as f64));
        if boss > target {
            return Ok(boss);
        }

        attempts += 1;
        if attempts > max_attempts {
            return Err(ActionError::NotConverged {
                what: format!("boss {}", target),
                attempts: max_attempts,
            });
        }

        let remaining = target - boss + 1;
        crate::log(&format!("At boss {}, fighting {} more times", boss, remaining));
        ctx.act(|a| a.fight(Some(remaining)))?;
    }
}
