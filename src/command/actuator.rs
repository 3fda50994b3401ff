//! Actuation hooks
//!
//! The feeder hardware (motor driver, GPIO) lives outside this crate and
//! plugs in by implementing [`Actuator`].

use std::future::Future;

/// Hooks invoked by the command listener
///
/// Calls run on the listener task, so long-running work should be spawned.
///
/// # Example
/// ```
/// use feeder_cam::command::Actuator;
///
/// struct Motor;
///
/// impl Actuator for Motor {
///     async fn feed(&self) {
///         // drive the dispenser motor
///     }
///
///     async fn secondary(&self) {}
/// }
/// ```
pub trait Actuator: Send + Sync + 'static {
    /// Payload `hi`: dispense food
    fn feed(&self) -> impl Future<Output = ()> + Send;

    /// Payload `yes!`: the second action
    fn secondary(&self) -> impl Future<Output = ()> + Send;
}

/// Actuator that only logs, used when no hardware is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingActuator;

impl Actuator for LoggingActuator {
    async fn feed(&self) {
        tracing::info!("Received message #1, motor feed");
    }

    async fn secondary(&self) {
        tracing::info!("Received message #2, secondary action");
    }
}
