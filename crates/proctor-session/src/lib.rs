//! Proctored Session
//!
//! Composes media capture, face detection, violation classification and
//! lockdown into one mount/unmount lifecycle, plus settings and logging
//! for host applications.

pub mod logging;
pub mod session;
pub mod settings;
pub mod sim;

pub use logging::init_logging;
pub use session::{ProctoredSession, SessionDeps, SessionError};
pub use settings::{LogFormat, LoggingSettings, Settings};
