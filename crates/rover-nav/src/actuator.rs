use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::decision::MovementDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorCommand {
    Drive(MovementDecision),
    Stop,
}

impl fmt::Display for MotorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorCommand::Drive(d) => write!(f, "{}", d),
            MotorCommand::Stop => f.write_str("stop"),
        }
    }
}

/// Drive train seen by the navigator. Commands are idempotent: sending the
/// same command twice leaves the rover in the same state.
pub trait MotorActuator {
    fn command(&mut self, cmd: MotorCommand) -> Result<()>;

    /// Called exactly once by the navigator when it terminates.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Dry-run drive train: logs what would be executed.
#[derive(Debug, Default)]
pub struct LogActuator {
    issued: u64,
}

impl LogActuator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MotorActuator for LogActuator {
    fn command(&mut self, cmd: MotorCommand) -> Result<()> {
        self.issued += 1;
        info!("motor: would execute {}", cmd.to_string().to_uppercase());
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        info!("motor: released after {} commands", self.issued);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ActuatorLog {
    commands: Vec<MotorCommand>,
    released: bool,
    failing: bool,
}

/// Keeps every command for later inspection; clones share the same log, so a
/// handle kept by the caller still sees commands after the navigator took ownership.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    log: Arc<Mutex<ActuatorLog>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<MotorCommand> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).commands.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.commands().iter().filter(|c| **c == MotorCommand::Stop).count()
    }

    pub fn released(&self) -> bool {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).released
    }

    /// Make subsequent commands fail, as a disconnected driver would.
    pub fn set_failing(&self, failing: bool) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).failing = failing;
    }
}

impl MotorActuator for RecordingActuator {
    fn command(&mut self, cmd: MotorCommand) -> Result<()> {
        let mut log = self.log.lock().map_err(|_| anyhow!("actuator log poisoned"))?;
        if log.failing {
            return Err(anyhow!("motor driver not responding"));
        }
        log.commands.push(cmd);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut log = self.log.lock().map_err(|_| anyhow!("actuator log poisoned"))?;
        log.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_handle_sees_commands() {
        let handle = RecordingActuator::new();
        let mut motor = handle.clone();
        motor.command(MotorCommand::Drive(MovementDecision::Left)).unwrap();
        motor.command(MotorCommand::Stop).unwrap();
        motor.release().unwrap();
        assert_eq!(handle.commands(), vec![MotorCommand::Drive(MovementDecision::Left), MotorCommand::Stop]);
        assert_eq!(handle.stop_count(), 1);
        assert!(handle.released());
    }

    #[test]
    fn failing_driver_records_nothing() {
        let handle = RecordingActuator::new();
        let mut motor = handle.clone();
        handle.set_failing(true);
        assert!(motor.command(MotorCommand::Stop).is_err());
        assert!(handle.commands().is_empty());
    }

    #[test]
    fn display() {
        assert_eq!(MotorCommand::Drive(MovementDecision::SharpRight).to_string(), "sharp_right");
        assert_eq!(MotorCommand::Stop.to_string(), "stop");
    }
}
