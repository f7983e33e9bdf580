//! Cooperative pause/resume/stop between the control thread and the routine worker.
//!
//! The worker calls [`PausableExecutor::boundary`] before every game action.
//! That is the only place a pause takes effect, so the game is never left with
//! a menu half-open. Stop is separate: it wakes a paused worker, makes the next
//! boundary or sleep slice return [`ActionError::Stopped`], and never needs the
//! worker's cooperation to release anything.
//!
//! State machine (all transitions go through [`transition`]):
//!
//! ```text
//!  Running --pause--> PauseRequested --boundary--> Paused
//!     ^                     |                        |
//!     +------resume---------+<--------resume---------+
//!  any live state --stop--> Stopping --finish--> Stopped
//! ```

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use super::clock::Clock;
use super::error::{ActionError, ActionResult, ControlError};

/// Longest a stop request waits for a sleeping worker to notice.
pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptState {
    Running,
    /// Pause asked for; takes effect at the next action boundary
    PauseRequested,
    /// Worker is blocked at a boundary
    Paused,
    /// Stop asked for; worker unwinds at its next check
    Stopping,
    Stopped,
}

impl fmt::Display for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptState::Running => write!(f, "Running"),
            ScriptState::PauseRequested => write!(f, "Pause requested"),
            ScriptState::Paused => write!(f, "Paused"),
            ScriptState::Stopping => write!(f, "Stopping"),
            ScriptState::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    Pause,
    Resume,
    Stop,
    /// Worker reached an action boundary
    Boundary,
    /// Worker thread is exiting
    Finish,
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlEvent::Pause => "pause",
            ControlEvent::Resume => "resume",
            ControlEvent::Stop => "stop",
            ControlEvent::Boundary => "reach a boundary",
            ControlEvent::Finish => "finish",
        };
        write!(f, "{}", name)
    }
}

/// Pure transition function. Repeating a pause or stop is idempotent.
pub fn transition(state: ScriptState, event: ControlEvent) -> Result<ScriptState, ControlError> {
    use ControlEvent as E;
    use ScriptState as S;

    let next = match (state, event) {
        (S::Running, E::Pause) => S::PauseRequested,
        (S::Running, E::Boundary) => S::Running,

        (S::PauseRequested, E::Pause) => S::PauseRequested,
        (S::PauseRequested, E::Resume) => S::Running,
        (S::PauseRequested, E::Boundary) => S::Paused,

        (S::Paused, E::Pause) => S::Paused,
        (S::Paused, E::Resume) => S::Running,

        (S::Running | S::PauseRequested | S::Paused | S::Stopping, E::Stop) => S::Stopping,
        (S::Stopping, E::Boundary) => S::Stopping,

        (S::Running | S::PauseRequested | S::Stopping, E::Finish) => S::Stopped,
        (S::Stopped, E::Stop | E::Finish) => S::Stopped,

        (state, event) => {
            return Err(ControlError::InvalidTransition {
                state: state.to_string(),
                event: event.to_string(),
            })
        }
    };
    Ok(next)
}

struct Shared {
    state: Mutex<ScriptState>,
    changed: Condvar,
}

/// Shared pause/stop gate. Clones refer to the same gate: the worker keeps one,
/// the control surface keeps another.
#[derive(Clone)]
pub struct PausableExecutor {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
}

impl PausableExecutor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ScriptState::Running),
                changed: Condvar::new(),
            }),
            clock,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn state(&self) -> ScriptState {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        // The guarded value is a plain enum, so a poisoned lock still holds a valid state
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(&self, event: ControlEvent) -> Result<ScriptState, ControlError> {
        let mut state = self.lock();
        let next = transition(*state, event)?;
        if next != *state {
            crate::log(&format!("Executor: {} -> {} ({})", *state, next, event));
            *state = next;
            self.shared.changed.notify_all();
        }
        Ok(next)
    }

    // --- worker side ---

    /// Action boundary. Blocks while paused; returns `Stopped` once a stop was requested.
    pub fn boundary(&self) -> ActionResult<()> {
        let mut state = self.lock();
        let next = transition(*state, ControlEvent::Boundary).unwrap_or(*state);
        if next == ScriptState::Paused && *state != ScriptState::Paused {
            crate::log("Paused at action boundary");
            *state = next;
            self.shared.changed.notify_all();
        }

        let state = self
            .shared
            .changed
            .wait_while(state, |s| *s == ScriptState::Paused)
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match *state {
            ScriptState::Stopping | ScriptState::Stopped => Err(ActionError::Stopped),
            _ => Ok(()),
        }
    }

    /// Returns `Stopped` if a stop was requested. Does not honour pause.
    pub fn check_stop(&self) -> ActionResult<()> {
        match self.state() {
            ScriptState::Stopping | ScriptState::Stopped => Err(ActionError::Stopped),
            _ => Ok(()),
        }
    }

    /// Sleeps in short slices so a stop is noticed within [`SLEEP_SLICE`].
    ///
    /// Pause is not honoured here; it waits for the next boundary.
    pub fn sleep(&self, duration: Duration) -> ActionResult<()> {
        let mut remaining = duration;
        while !remaining.is_zero() {
            self.check_stop()?;
            let slice = remaining.min(SLEEP_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
        }
        self.check_stop()
    }

    /// Marks the worker as gone. Called exactly once when the worker thread exits.
    pub fn finish(&self) {
        let mut state = self.lock();
        crate::log(&format!("Executor: {} -> Stopped (finish)", *state));
        *state = ScriptState::Stopped;
        self.shared.changed.notify_all();
    }

    // --- control side ---

    /// Asks the worker to pause at its next boundary. Returns immediately.
    pub fn request_pause(&self) -> Result<(), ControlError> {
        match self.state() {
            ScriptState::Stopping | ScriptState::Stopped => Err(ControlError::NotRunning),
            _ => self.apply(ControlEvent::Pause).map(|_| ()),
        }
    }

    /// Waits until the worker is blocked at a boundary.
    ///
    /// On timeout the pending pause is withdrawn, so the worker does not pause
    /// later behind the operator's back.
    pub fn wait_until_paused(&self, timeout: Duration) -> Result<(), ControlError> {
        let state = self.lock();
        let (mut state, _) = self
            .shared
            .changed
            .wait_timeout_while(state, timeout, |s| *s == ScriptState::PauseRequested)
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match *state {
            ScriptState::Paused => Ok(()),
            ScriptState::PauseRequested => {
                *state = ScriptState::Running;
                self.shared.changed.notify_all();
                crate::log("Pause withdrawn: no action boundary reached in time");
                Err(ControlError::PauseTimeout(timeout))
            }
            _ => Err(ControlError::NotRunning),
        }
    }

    /// Pause and wait for it to take effect.
    pub fn pause(&self, timeout: Duration) -> Result<(), ControlError> {
        self.request_pause()?;
        self.wait_until_paused(timeout)
    }

    pub fn resume(&self) -> Result<(), ControlError> {
        match self.state() {
            ScriptState::Paused | ScriptState::PauseRequested => {
                self.apply(ControlEvent::Resume).map(|_| ())
            }
            ScriptState::Running => Err(ControlError::InvalidTransition {
                state: ScriptState::Running.to_string(),
                event: ControlEvent::Resume.to_string(),
            }),
            ScriptState::Stopping | ScriptState::Stopped => Err(ControlError::NotRunning),
        }
    }

    /// Hard stop. Wakes a paused worker; never blocks on it.
    pub fn stop(&self) {
        // Stop is accepted from every state
        let _ = self.apply(ControlEvent::Stop);
    }

    /// Waits for the worker to call [`finish`](Self::finish).
    pub fn wait_stopped(&self, timeout: Duration) -> Result<(), ControlError> {
        let state = self.lock();
        let (state, _) = self
            .shared
            .changed
            .wait_timeout_while(state, timeout, |s| *s != ScriptState::Stopped)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state == ScriptState::Stopped {
            Ok(())
        } else {
            Err(ControlError::StopTimeout(timeout))
        }
    }
}
