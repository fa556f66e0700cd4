//! Actuator (light/trigger) interface.
//!
//! The stimulus hardware itself lives outside this repository. The
//! pipeline only needs a fire-and-confirm surface: set a numeric
//! intensity, set high/low timing. The confirmed intensity value is
//! mirrored into the session state so the detection metadata stream can
//! record it alongside each frame.

use std::time::Duration;
use thiserror::Error;

/// Error type for actuator operations
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// Actuator hardware could not be found at startup.
    /// Fatal: the session aborts before any worker starts.
    #[error("actuator hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// A command was not confirmed by the device
    #[error("actuator command failed: {0}")]
    Command(String),
}

/// Result type for actuator operations
pub type ActuatorResult<T> = Result<T, ActuatorError>;

/// Fire-and-confirm actuator control.
pub trait ActuatorInterface: Send {
    /// Set the output intensity. Returns once the device confirms.
    fn set_intensity(&mut self, value: i64) -> ActuatorResult<()>;

    /// Set the high/low trigger timing. Returns once the device confirms.
    fn set_timing(&mut self, high: Duration, low: Duration) -> ActuatorResult<()>;
}

/// Mock actuator that records every confirmed command.
#[derive(Debug, Default)]
pub struct MockActuator {
    pub intensities: Vec<i64>,
    pub timings: Vec<(Duration, Duration)>,
}

impl ActuatorInterface for MockActuator {
    fn set_intensity(&mut self, value: i64) -> ActuatorResult<()> {
        self.intensities.push(value);
        Ok(())
    }

    fn set_timing(&mut self, high: Duration, low: Duration) -> ActuatorResult<()> {
        self.timings.push((high, low));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_actuator_records_commands() {
        let mut actuator = MockActuator::default();
        actuator.set_intensity(128).unwrap();
        actuator
            .set_timing(Duration::from_millis(5), Duration::from_millis(20))
            .unwrap();

        assert_eq!(actuator.intensities, vec![128]);
        assert_eq!(actuator.timings.len(), 1);
    }
}
