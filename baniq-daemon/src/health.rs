//! Daemon health reporting.
//!
//! The orchestrator periodically polls the jail guard's `health_check()` and
//! builds a [`DaemonHealth`] report. [`HealthMonitor`] logs only status
//! transitions so a steady state does not flood the log.

use serde::Serialize;

use baniq_core::pipeline::HealthStatus;

/// Seconds between health check cycles.
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Health report for the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Jail guard health status.
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Number of containers currently owning jail files.
    pub tracked_containers: usize,
}

/// Remembers the last observed status and logs changes.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    last: Option<HealthStatus>,
}

impl HealthMonitor {
    /// Create a monitor with no prior observation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report. Returns `true` when the status differs from the
    /// previous observation (the first observation always counts).
    pub fn observe(&mut self, report: &DaemonHealth) -> bool {
        if self.last.as_ref() == Some(&report.status) {
            tracing::debug!(
                status = %report.status,
                uptime_secs = report.uptime_secs,
                tracked_containers = report.tracked_containers,
                "health check"
            );
            return false;
        }

        match &report.status {
            HealthStatus::Healthy => tracing::info!(
                uptime_secs = report.uptime_secs,
                tracked_containers = report.tracked_containers,
                "daemon healthy"
            ),
            HealthStatus::Degraded(reason) => tracing::warn!(
                reason = %reason,
                tracked_containers = report.tracked_containers,
                "daemon degraded"
            ),
            HealthStatus::Unhealthy(reason) => tracing::error!(
                reason = %reason,
                tracked_containers = report.tracked_containers,
                "daemon unhealthy"
            ),
        }

        self.last = Some(report.status.clone());
        true
    }

    /// Last observed status, if any.
    pub fn last_status(&self) -> Option<&HealthStatus> {
        self.last.as_ref()
    }
}
