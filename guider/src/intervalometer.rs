//! Main camera intervalometer.
//!
//! Exposures run back to back with a gap in between. In dither mode the gap is
//! instead ended by the guidance loop once the new target has settled.

use serde::{Deserialize, Serialize};
use shared::Timestamp;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntervalometerState {
    #[default]
    Idle,
    Active,
    ActiveGap,
    ActiveDither,
    /// Finish after the current exposure
    ActiveEnding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalometerCommand {
    Activate,
    ActivateDither,
    /// A single exposure
    BulbTest,
    End,
    Halt,
}

/// What the caller should do with the shutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterAction {
    None,
    Open,
    Halt,
}

#[derive(Debug, Clone, Default)]
pub struct Intervalometer {
    state: IntervalometerState,
    gap_start: Option<Timestamp>,
}

impl Intervalometer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IntervalometerState {
        self.state
    }

    pub fn is_dithering(&self) -> bool {
        self.state == IntervalometerState::ActiveDither
    }

    pub fn command(&mut self, cmd: IntervalometerCommand) -> ShutterAction {
        match cmd {
            IntervalometerCommand::Activate | IntervalometerCommand::ActivateDither => {
                self.state = if cmd == IntervalometerCommand::Activate {
                    IntervalometerState::Active
                } else {
                    IntervalometerState::ActiveDither
                };
                self.gap_start = None;
                ShutterAction::Open
            }
            IntervalometerCommand::BulbTest => {
                self.state = IntervalometerState::ActiveEnding;
                self.gap_start = None;
                ShutterAction::Open
            }
            IntervalometerCommand::End => {
                if self.state != IntervalometerState::Idle {
                    self.state = IntervalometerState::ActiveEnding;
                }
                ShutterAction::None
            }
            IntervalometerCommand::Halt => {
                self.state = IntervalometerState::Idle;
                self.gap_start = None;
                ShutterAction::Halt
            }
        }
    }

    /// The shutter was reopened by someone else (end of a dither).
    pub fn shutter_reopened(&mut self) {
        self.gap_start = None;
    }

    /// Advance the state machine.
    ///
    /// `guiding` is true while the controller is guiding or dithering; a
    /// dither session without guidance has nothing to wait for.
    pub fn service(
        &mut self,
        now: Timestamp,
        shutter_open: bool,
        guiding: bool,
        gap: Duration,
    ) -> ShutterAction {
        if shutter_open {
            return ShutterAction::None;
        }
        let gap_start = *self.gap_start.get_or_insert(now);

        match self.state {
            IntervalometerState::Active => {
                self.state = IntervalometerState::ActiveGap;
                ShutterAction::None
            }
            IntervalometerState::ActiveGap if now.since(gap_start) >= gap => {
                self.state = IntervalometerState::Active;
                self.gap_start = None;
                ShutterAction::Open
            }
            IntervalometerState::ActiveEnding => {
                log::info!("intervalometer finished");
                self.state = IntervalometerState::Idle;
                ShutterAction::None
            }
            IntervalometerState::ActiveDither if !guiding => {
                log::info!("intervalometer dither mode interrupted, guidance stopped");
                self.state = IntervalometerState::Idle;
                ShutterAction::None
            }
            _ => ShutterAction::None,
        }
    }
}
