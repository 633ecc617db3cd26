//! Interactive calibration: the session state machine and its command surface.

mod calibration;
mod command;
mod runner;

pub use calibration::{
    Calibration, CalibrationSession, PreviewMask, ReferenceImage, SessionError, SessionState,
};
pub use command::{CommandError, CommandSource, LineCommandSource, SessionCommand, CONTROLS_HELP};
pub use runner::{run_session, SessionOutcome};
