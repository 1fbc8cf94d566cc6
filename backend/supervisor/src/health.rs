//! Health state for one supervised subprocess.

use std::sync::RwLock;

use serde::Serialize;

/// Lifecycle of a supervised tool server.
///
/// `Starting → Healthy → (Degraded → Healthy | Terminated)`, or
/// `Starting → Terminated` when the launch fails. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Degraded,
    Terminated,
}

/// Shared, observable health cell for one entry.
#[derive(Debug)]
pub struct HealthCell(RwLock<HealthStatus>);

impl HealthCell {
    pub fn new() -> Self {
        Self(RwLock::new(HealthStatus::Starting))
    }

    pub fn get(&self) -> HealthStatus {
        *self.0.read().expect("health cell poisoned")
    }

    /// Apply a transition; `Terminated` is sticky.
    pub fn set(&self, next: HealthStatus) {
        let mut current = self.0.write().expect("health cell poisoned");
        if *current == HealthStatus::Terminated {
            return;
        }
        *current = next;
    }
}

impl Default for HealthCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated_is_sticky() {
        let cell = HealthCell::new();
        assert_eq!(cell.get(), HealthStatus::Starting);
        cell.set(HealthStatus::Healthy);
        cell.set(HealthStatus::Terminated);
        cell.set(HealthStatus::Healthy);
        assert_eq!(cell.get(), HealthStatus::Terminated);
    }

    #[test]
    fn test_degraded_can_recover() {
        let cell = HealthCell::new();
        cell.set(HealthStatus::Healthy);
        cell.set(HealthStatus::Degraded);
        cell.set(HealthStatus::Healthy);
        assert_eq!(cell.get(), HealthStatus::Healthy);
    }
}
