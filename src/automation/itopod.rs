//! ITOPOD sniping: manual kills in the tower with idle mode off.
//!
//! Each kill is reported as an `itopod_snipes` event; the consumer folds these
//! into the lifetime counters in stats.json.

use std::fmt;
use std::time::{Duration, Instant};

use crate::automation::config::ItopodConfig;
use crate::automation::error::{ActionError, ActionResult};
use crate::automation::options::AdventureTarget;
use crate::automation::progress::{ProgressEvent, DONE, EXP, EXP_PER_HOUR, ITOPOD_SNIPES, TASK_PROGRESS};
use crate::automation::routine::{Routine, RoutineContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItopodStage {
    Entering,
    Sniping,
    Done,
}

impl fmt::Display for ItopodStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct ItopodRoutine {
    config: ItopodConfig,
    stage: ItopodStage,
    start: Option<Instant>,
    baseline_exp: f64,
    kills: u64,
}

impl ItopodRoutine {
    pub fn new(config: ItopodConfig) -> Self {
        Self {
            config,
            stage: ItopodStage::Entering,
            start: None,
            baseline_exp: 0.0,
            kills: 0,
        }
    }

    fn cycle(&self) -> Duration {
        Duration::from_secs(self.config.cycle_secs)
    }

    fn elapsed(&self, ctx: &RoutineContext<'_>) -> Duration {
        self.start
            .map(|start| ctx.now().saturating_duration_since(start))
            .unwrap_or_default()
    }

    fn enter(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<()> {
        ctx.act(|a| a.adventure(AdventureTarget::Itopod { auto: false }))?;
        self.baseline_exp = ctx.act(|a| a.read_exp())?;
        self.start = Some(ctx.now());
        ctx.emit(ProgressEvent::number(EXP, self.baseline_exp));
        Ok(())
    }

    /// Waits for the next enemy and kills it. `false` when the cycle ran out first.
    fn snipe_one(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<bool> {
        let poll = ctx.config.poll_interval();
        let kill_timeout = Duration::from_secs(self.config.kill_timeout_secs);
        let waiting_since = ctx.now();

        while !ctx.act(|a| a.enemy_present())? {
            if self.elapsed(ctx) >= self.cycle() {
                return Ok(false);
            }
            let waited = ctx.now().saturating_duration_since(waiting_since);
            if waited >= kill_timeout {
                return Err(ActionError::Timeout {
                    what: "ITOPOD enemy".to_string(),
                    waited,
                });
            }
            ctx.sleep(poll)?;
        }

        ctx.act(|a| a.snipe_enemy())?;
        self.kills += 1;
        ctx.emit(ProgressEvent::number(ITOPOD_SNIPES, 1.0));

        let percent = (self.elapsed(ctx).as_secs_f64() / self.cycle().as_secs_f64() * 100.0).min(100.0);
        ctx.emit(ProgressEvent::number(TASK_PROGRESS, percent));

        if self.config.exp_refresh_kills > 0 && self.kills % self.config.exp_refresh_kills as u64 == 0 {
            self.refresh_exp(ctx)?;
        }
        // Let the attack land before looking for the next spawn
        ctx.sleep(poll)?;
        Ok(true)
    }

    fn refresh_exp(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<()> {
        let exp = ctx.act(|a| a.read_exp())?;
        ctx.emit(ProgressEvent::number(EXP, exp));

        let hours = self.elapsed(ctx).as_secs_f64() / 3600.0;
        if hours > 0.0 {
            ctx.emit(ProgressEvent::number(EXP_PER_HOUR, (exp - self.baseline_exp) / hours));
        }
        Ok(())
    }
}

impl Routine for ItopodRoutine {
    fn name(&self) -> &'static str {
        "itopod"
    }

    fn step(&mut self, ctx: &mut RoutineContext<'_>) -> ActionResult<bool> {
        match self.stage {
            ItopodStage::Entering => {
                ctx.stage(&ItopodStage::Entering.to_string(), 0, 2);
                self.enter(ctx)?;
                self.stage = ItopodStage::Sniping;
                ctx.stage(&ItopodStage::Sniping.to_string(), 1, 2);
            }
            ItopodStage::Sniping => {
                let in_time = self.elapsed(ctx) < self.cycle();
                if !in_time || !self.snipe_one(ctx)? {
                    self.stage = ItopodStage::Done;
                    ctx.stage(&ItopodStage::Done.to_string(), 2, 2);
                }
            }
            ItopodStage::Done => {
                self.refresh_exp(ctx)?;
                crate::log(&format!("ITOPOD cycle done: {} kills", self.kills));
                ctx.emit(ProgressEvent::number(DONE, self.elapsed(ctx).as_secs_f64()));
                return Ok(false);
            }
        }
        Ok(true)
    }
}
