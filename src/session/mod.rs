//! Per-client streaming sessions

pub mod dispatcher;
pub mod state;

pub use dispatcher::{StreamDispatcher, BOUNDARY};
pub use state::{SessionPhase, StreamSession};
