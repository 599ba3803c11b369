//! Health Checks
//!
//! Liveness and readiness probes, plus an admission-pressure check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::store::AdmissionStats;

/// Admission utilization at which the service reports itself degraded
pub const DEGRADED_UTILIZATION: f64 = 0.9;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Service is healthy
    Healthy,
    /// Service is degraded but operational
    Degraded,
    /// Service is unhealthy
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Check name
    pub name: String,
    /// Status
    pub status: HealthStatus,
    /// Message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheckResult {
    fn new(name: &str, status: HealthStatus, message: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status among the checks
    pub status: HealthStatus,
    /// Individual check results
    pub checks: Vec<HealthCheckResult>,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}

impl HealthResponse {
    /// Create a response whose status is the worst of `checks`
    pub fn new(checks: Vec<HealthCheckResult>, uptime: Duration) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max_by_key(HealthStatus::severity)
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// Liveness/readiness state for the process
pub struct HealthCheck {
    start_time: Instant,
    live: AtomicBool,
    ready: AtomicBool,
}

impl HealthCheck {
    /// Live but not yet ready
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    /// Get uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check liveness
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Check readiness
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Set liveness
    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Relaxed);
    }

    /// Set readiness
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Liveness probe result
    pub fn liveness_check(&self) -> HealthCheckResult {
        let status = if self.is_live() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        HealthCheckResult::new("liveness", status, None)
    }

    /// Readiness probe result
    pub fn readiness_check(&self) -> HealthCheckResult {
        if self.is_ready() {
            HealthCheckResult::new("readiness", HealthStatus::Healthy, None)
        } else {
            HealthCheckResult::new(
                "readiness",
                HealthStatus::Unhealthy,
                Some("Service not ready".to_string()),
            )
        }
    }

    /// Admission pressure: degraded once in-flight work nears the cap
    pub fn admission_check(stats: &AdmissionStats) -> HealthCheckResult {
        let utilization = stats.active as f64 / stats.max_active.max(1) as f64;
        if utilization >= DEGRADED_UTILIZATION {
            HealthCheckResult::new(
                "admission",
                HealthStatus::Degraded,
                Some(format!(
                    "{} of {} admission slots in use",
                    stats.active, stats.max_active
                )),
            )
        } else {
            HealthCheckResult::new("admission", HealthStatus::Healthy, None)
        }
    }

    /// Run all checks
    pub fn check_all(&self, admission: &AdmissionStats) -> HealthResponse {
        let checks = vec![
            self.liveness_check(),
            self.readiness_check(),
            Self::admission_check(admission),
        ];
        HealthResponse::new(checks, self.uptime())
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(active: usize, max_active: usize) -> AdmissionStats {
        AdmissionStats {
            max_active,
            active,
            available_slots: max_active - active,
            admitted: 0,
            rejected_capacity: 0,
            rejected_timeout: 0,
        }
    }

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Healthy.is_operational());
        assert!(HealthStatus::Degraded.is_operational());
        assert!(!HealthStatus::Unhealthy.is_operational());
        assert_eq!(HealthStatus::Degraded.to_string(), "Degraded");
    }

    #[test]
    fn test_ready_flag() {
        let health = HealthCheck::new();
        assert!(health.is_live());
        assert!(!health.is_ready());
        assert_eq!(health.readiness_check().status, HealthStatus::Unhealthy);

        health.set_ready(true);
        assert_eq!(health.readiness_check().status, HealthStatus::Healthy);
    }

    #[test]
    fn test_admission_pressure() {
        assert_eq!(
            HealthCheck::admission_check(&stats(10, 1000)).status,
            HealthStatus::Healthy
        );
        let busy = HealthCheck::admission_check(&stats(950, 1000));
        assert_eq!(busy.status, HealthStatus::Degraded);
        assert!(busy.message.unwrap().contains("950 of 1000"));
    }

    #[test]
    fn test_check_all_reports_worst() {
        let health = HealthCheck::new();
        health.set_ready(true);
        assert_eq!(health.check_all(&stats(0, 10)).status, HealthStatus::Healthy);
        assert_eq!(
            health.check_all(&stats(10, 10)).status,
            HealthStatus::Degraded
        );

        health.set_live(false);
        let response = health.check_all(&stats(0, 10));
        assert_eq!(response.status, HealthStatus::Unhealthy);
        assert_eq!(response.checks.len(), 3);
    }

    #[test]
    fn test_serialization() {
        let health = HealthCheck::new();
        let json = serde_json::to_string(&health.check_all(&stats(0, 10))).unwrap();
        assert!(json.contains("\"readiness\""));

        let decoded: HealthResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.status, HealthStatus::Unhealthy);
    }
}
