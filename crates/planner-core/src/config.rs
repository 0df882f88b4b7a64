//! Planner configuration (spec §6 "Configuration").

use crate::telemetry::DebugLevel;

/// Generates deterministic secret-like ids when the caller wants
/// reproducible output instead of vault-assigned ones (spec §6
/// `IDFactory: opaque`).
pub trait IdFactory {
    fn next_id(&mut self) -> String;
}

/// A trivial counting `IdFactory` for tests and the CLI demo.
#[derive(Debug, Default)]
pub struct SequentialIdFactory(u64);

impl IdFactory for SequentialIdFactory {
    fn next_id(&mut self) -> String {
        self.0 += 1;
        format!("id-{}", self.0)
    }
}

/// `Telemetry` axis (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Telemetry {
    #[default]
    Off,
    Basic,
    Timing,
}

/// The recognized planner options (spec §6 "Configuration").
#[derive(Default)]
pub struct PlannerConfig {
    /// Command name to plan exclusively, or `None` for script mode (spec §4.8).
    pub target: Option<String>,
    pub id_factory: Option<Box<dyn IdFactory>>,
    pub telemetry: Telemetry,
    pub debug: DebugLevel,
}

impl PlannerConfig {
    #[must_use]
    pub fn script_mode() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn command_mode(target: impl Into<String>) -> Self {
        Self { target: Some(target.into()), ..Self::default() }
    }

    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: DebugLevel) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_mode_has_no_target() {
        assert!(PlannerConfig::script_mode().target.is_none());
    }

    #[test]
    fn command_mode_sets_target() {
        let config = PlannerConfig::command_mode("deploy");
        assert_eq!(config.target.as_deref(), Some("deploy"));
    }

    #[test]
    fn sequential_id_factory_increments() {
        let mut factory = SequentialIdFactory::default();
        assert_eq!(factory.next_id(), "id-1");
        assert_eq!(factory.next_id(), "id-2");
    }
}
