//! Operator controller: owns the session and the routine worker thread.
//!
//! While idle the controller holds the `Session`. `run` moves it into a worker
//! thread together with a fresh `PausableExecutor`; the worker hands it back
//! when the routine ends, so the next run reuses the same calibration.
//! A second thread drains progress events into the metric board.
//!
//! Pause, resume and stop also go through a [`ControlHandle`], which only
//! touches the running executor. A pause that is waiting for a boundary never
//! holds the controller, so a stop issued meanwhile reaches the worker at once.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::automation::actions::{Actions, Timing};
use crate::automation::clock::Clock;
use crate::automation::config::AutomationConfig;
use crate::automation::error::ControlError;
use crate::automation::executor::{PausableExecutor, ScriptState};
use crate::automation::metrics::{MetricBoard, SessionMetrics};
use crate::automation::progress::{create_progress_channel, ProgressReporter};
use crate::automation::routine::{run_session, RoutineKind};
use crate::automation::session::{Backends, Session};

/// Builds fresh OS backends for a connection attempt.
pub type Connector = Box<dyn Fn() -> Result<Backends> + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerStatus {
    /// No game window connected
    Disconnected,
    /// Connected and calibrated, nothing running
    Idle,
    Running { kind: RoutineKind, state: ScriptState },
}

struct Worker {
    kind: RoutineKind,
    executor: PausableExecutor,
    handle: JoinHandle<Session>,
    consumer: JoinHandle<()>,
}

/// Cloneable pause/resume/stop access to whatever routine is running.
#[derive(Clone)]
pub struct ControlHandle {
    current: Arc<Mutex<Option<PausableExecutor>>>,
    pause_timeout: Duration,
}

impl ControlHandle {
    fn new(pause_timeout: Duration) -> Self {
        Self {
            current: Arc::new(Mutex::new(None)),
            pause_timeout,
        }
    }

    fn set(&self, executor: Option<PausableExecutor>) {
        *self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = executor;
    }

    fn executor(&self) -> Result<PausableExecutor, ControlError> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .filter(|e| e.state() != ScriptState::Stopped)
            .ok_or(ControlError::NotRunning)
    }

    /// State of the running routine, `None` when nothing runs.
    pub fn state(&self) -> Option<ScriptState> {
        self.executor().ok().map(|e| e.state())
    }

    /// Pauses at the next action boundary, waiting up to `pause_timeout_ms`.
    pub fn pause(&self) -> Result<(), ControlError> {
        match self.executor()?.pause(self.pause_timeout) {
            Ok(()) => {
                crate::log("Routine paused");
                Ok(())
            }
            Err(e) => {
                crate::log(&format!("Pause failed: {}", e));
                Err(e)
            }
        }
    }

    pub fn resume(&self) -> Result<(), ControlError> {
        self.executor()?.resume()?;
        crate::log("Routine resumed");
        Ok(())
    }

    /// Requests a stop without waiting for the worker to exit.
    pub fn stop(&self) -> Result<(), ControlError> {
        self.executor()?.stop();
        Ok(())
    }
}

/// Marks the executor stopped however the worker thread exits.
struct FinishGuard(PausableExecutor);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

pub struct Controller {
    config: AutomationConfig,
    connector: Connector,
    clock: Arc<dyn Clock>,
    stats_path: PathBuf,
    session: Option<Session>,
    worker: Option<Worker>,
    control: ControlHandle,
    board: Arc<Mutex<MetricBoard>>,
}

impl Controller {
    /// Creates a disconnected controller and loads the lifetime metrics.
    pub fn new(
        config: AutomationConfig,
        connector: Connector,
        clock: Arc<dyn Clock>,
        stats_path: PathBuf,
    ) -> Self {
        let persisted = SessionMetrics::load(&stats_path).unwrap_or_else(|e| {
            crate::log(&format!("Could not load metrics, starting from zero: {:#}", e));
            SessionMetrics::default()
        });
        crate::log(&format!(
            "Lifetime ITOPOD snipes: {} (saved {})",
            persisted.itopod_snipes, persisted.itopod_time_saved
        ));
        let board = MetricBoard::new(persisted, config.itopod.seconds_saved_per_kill);
        let control = ControlHandle::new(config.pause_timeout());

        Self {
            config,
            connector,
            clock,
            stats_path,
            session: None,
            worker: None,
            control,
            board: Arc::new(Mutex::new(board)),
        }
    }

    /// Handle for pausing or stopping without holding the controller.
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Finds the game window and calibrates. Also the operator's "retry detection".
    pub fn connect(&mut self) -> Result<()> {
        self.reap();
        if self.worker.is_some() {
            return Err(ControlError::AlreadyRunning.into());
        }

        // Same window still open: only the origin may have moved
        if let Some(session) = self.session.as_mut().filter(|s| s.window_alive()) {
            match session.recalibrate() {
                Ok(origin) => {
                    crate::log(&format!("Recalibrated {} to origin {}", session.window(), origin));
                    return Ok(());
                }
                Err(e) => crate::log(&format!("Recalibration failed, reconnecting: {:#}", e)),
            }
        }

        self.session = None;
        let backends = (self.connector)()?;
        let session = Session::connect(&self.config, backends)?;
        crate::log(&format!(
            "Connected to {} with origin {}",
            session.window(),
            session.origin()
        ));
        self.session = Some(session);
        Ok(())
    }

    /// Starts `kind` on a worker thread.
    pub fn run(&mut self, kind: RoutineKind) -> Result<(), ControlError> {
        self.reap();
        if self.worker.is_some() {
            return Err(ControlError::AlreadyRunning);
        }

        let session = self.session.take().ok_or(ControlError::NotConnected)?;
        if !session.window_alive() {
            crate::log("Game window is gone; reconnect before running");
            return Err(ControlError::NotConnected);
        }

        let executor = PausableExecutor::new(Arc::clone(&self.clock));
        let (sender, receiver) = create_progress_channel();

        let board = Arc::clone(&self.board);
        let consumer = thread::spawn(move || {
            for event in receiver {
                lock_board(&board).apply(&event);
            }
        });

        let config = self.config.clone();
        let worker_executor = executor.clone();
        let handle = thread::spawn(move || {
            let _finish = FinishGuard(worker_executor.clone());
            let timing = Timing::from_config(&config);
            let mut actions = Actions::new(session, worker_executor.clone(), timing);
            let progress = ProgressReporter::new(sender);

            let end = run_session(kind, &worker_executor, &mut actions, &progress, &config, None);
            crate::log(&format!("{} session ended: {:?}", kind, end));
            actions.into_session()
        });

        crate::log(&format!("Started {} (Ctrl+Shift+P pause, Ctrl+Shift+Q stop)", kind));
        self.control.set(Some(executor.clone()));
        self.worker = Some(Worker {
            kind,
            executor,
            handle,
            consumer,
        });
        Ok(())
    }

    /// Stops the worker and takes the session back.
    ///
    /// If the worker does not exit within `stop_timeout_ms` it is kept and
    /// `StopTimeout` is returned; calling `stop` again keeps waiting.
    pub fn stop(&mut self) -> Result<(), ControlError> {
        self.reap();
        let worker = self.worker.as_ref().ok_or(ControlError::NotRunning)?;
        worker.executor.stop();
        if let Err(e) = worker.executor.wait_stopped(self.config.stop_timeout()) {
            crate::log(&format!("Stop failed: {}", e));
            return Err(e);
        }

        if let Some(worker) = self.worker.take() {
            self.join(worker);
        }
        Ok(())
    }

    pub fn status(&mut self) -> ControllerStatus {
        self.reap();
        match (&self.worker, &self.session) {
            (Some(worker), _) => ControllerStatus::Running {
                kind: worker.kind,
                state: worker.executor.state(),
            },
            (None, Some(_)) => ControllerStatus::Idle,
            (None, None) => ControllerStatus::Disconnected,
        }
    }

    /// Lifetime metrics including the running session's kills.
    pub fn metrics(&self) -> SessionMetrics {
        lock_board(&self.board).persisted().clone()
    }

    /// One-line summary of the latest metric values.
    pub fn summary(&self) -> String {
        lock_board(&self.board).summary()
    }

    /// Stops any running routine and writes the metrics. Called on exit.
    pub fn shutdown(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                crate::log(&format!("Shutdown: {}", e));
            }
        }
        self.save_metrics();
    }

    /// Collects a worker that ended on its own (gave up or finished).
    fn reap(&mut self) {
        let finished = self
            .worker
            .as_ref()
            .is_some_and(|w| w.handle.is_finished());
        if finished {
            if let Some(worker) = self.worker.take() {
                self.join(worker);
            }
        }
    }

    fn join(&mut self, worker: Worker) {
        self.control.set(None);
        match worker.handle.join() {
            Ok(session) => self.session = Some(session),
            Err(_) => {
                crate::log(&format!("{} worker panicked; reconnect required", worker.kind));
                self.session = None;
            }
        }
        // The worker dropped its sender, so the consumer drains and exits
        if worker.consumer.join().is_err() {
            crate::log("Progress consumer panicked");
        }
        crate::log(&format!("{} ended. {}", worker.kind, self.summary()));
        self.save_metrics();
    }

    fn save_metrics(&self) {
        let metrics = self.metrics();
        match metrics.save(&self.stats_path) {
            Ok(()) => crate::log(&format!(
                "Saved metrics to {} ({} snipes)",
                self.stats_path.display(),
                metrics.itopod_snipes
            )),
            Err(e) => crate::log(&format!("Failed to save metrics: {:#}", e)),
        }
    }
}

fn lock_board(board: &Mutex<MetricBoard>) -> MutexGuard<'_, MetricBoard> {
    board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
