//! Shared run-state of a game loop.
//!
//! [`LoopControl`] holds the loop's lifecycle state in an atomic so that the
//! task driving [`GameLoop::run`](crate::game_loop::GameLoop::run) and any
//! number of [`LoopHandle`]s can read and change it without locks. Every
//! transition wakes the loop, so a sleeping loop reacts to pause and stop
//! immediately instead of at its next deadline.
//!
//! ```text
//!  Idle --start--> Running --pause--> Paused
//!   ^                 ^  <--resume---   |
//!   |                 |                 |
//!   +--- (flushed) -- Stopping <--stop--+
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::game_loop::LoopError;

/// Lifecycle state of a game loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Not started, or fully stopped.
    Idle,
    /// Executing ticks on the real-time clock.
    Running,
    /// Started but not executing ticks.
    Paused,
    /// Stop requested; final persistence in progress.
    Stopping,
}

impl LoopState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Paused => 2,
            Self::Stopping => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Atomic lifecycle state plus a wakeup channel.
#[derive(Debug)]
pub struct LoopControl {
    state: AtomicU8,
    wake: Notify,
}

impl LoopControl {
    /// Create a control in [`LoopState::Idle`].
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LoopState::Idle.as_u8()),
            wake: Notify::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Idle -> Running`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] from any other state.
    pub fn start(&self) -> Result<(), LoopError> {
        self.transition(&[LoopState::Idle], LoopState::Running)
    }

    /// `Running -> Paused`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] unless running.
    pub fn pause(&self) -> Result<(), LoopError> {
        self.transition(&[LoopState::Running], LoopState::Paused)
    }

    /// `Paused -> Running`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] unless paused.
    pub fn resume(&self) -> Result<(), LoopError> {
        self.transition(&[LoopState::Paused], LoopState::Running)
    }

    /// `Running | Paused -> Stopping`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] when idle or already
    /// stopping.
    pub fn request_stop(&self) -> Result<(), LoopError> {
        self.transition(&[LoopState::Running, LoopState::Paused], LoopState::Stopping)
    }

    /// `Stopping -> Idle`, once the loop has flushed.
    pub(crate) fn finish_stop(&self) {
        self.state
            .store(LoopState::Idle.as_u8(), Ordering::Release);
        self.wake.notify_one();
    }

    /// Wait until the state is no longer [`LoopState::Paused`].
    pub async fn wait_while_paused(&self) {
        while self.state() == LoopState::Paused {
            self.wake.notified().await;
        }
    }

    /// Wait for the next state change.
    ///
    /// A change that happened while nobody was waiting is delivered to the
    /// next caller, so it is never lost.
    pub async fn changed(&self) {
        self.wake.notified().await;
    }

    fn transition(&self, from: &[LoopState], to: LoopState) -> Result<(), LoopError> {
        let mut current = self.state();
        loop {
            if !from.contains(&current) {
                return Err(LoopError::InvalidTransition { from: current, to });
            }
            match self.state.compare_exchange(
                current.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.wake.notify_one();
                    return Ok(());
                }
                Err(actual) => current = LoopState::from_u8(actual),
            }
        }
    }
}

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable remote control for a running game loop.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    control: Arc<LoopControl>,
}

impl LoopHandle {
    pub(crate) const fn new(control: Arc<LoopControl>) -> Self {
        Self { control }
    }

    /// Current state of the loop.
    pub fn state(&self) -> LoopState {
        self.control.state()
    }

    /// Pause the loop after the tick in progress.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] unless running.
    pub fn pause(&self) -> Result<(), LoopError> {
        self.control.pause()
    }

    /// Resume a paused loop.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] unless paused.
    pub fn resume(&self) -> Result<(), LoopError> {
        self.control.resume()
    }

    /// Ask the loop to stop. The loop flushes memory and then goes idle.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] when idle or already
    /// stopping.
    pub fn stop(&self) -> Result<(), LoopError> {
        self.control.request_stop()
    }
}
