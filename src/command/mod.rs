//! Remote feeder commands
//!
//! ```text
//! broker ──PUBLISH──► CommandListener ──"hi"───► Actuator::feed()
//!                                    └─"yes!"─► Actuator::secondary()
//! ```

pub mod actuator;
pub mod event;
pub mod listener;

pub use actuator::{Actuator, LoggingActuator};
pub use event::{Command, CommandEvent};
pub use listener::CommandListener;
