//! Reader connection health statistics and alerting.
//!
//! The supervisor retries forever, so a dead reader never stops the service.
//! This monitor is how an operator finds out: it keeps connection counters
//! and bounded histories, and raises rate-limited alerts.
//!
//! Alert conditions are evaluated in priority order and at most one alert is
//! raised per attempt:
//!
//! 1. consecutive failures at or above the threshold → [`AlertLevel::Critical`]
//! 2. success rate below the threshold → [`AlertLevel::Warning`]
//! 3. mean recent connect latency above the threshold → [`AlertLevel::Warning`]
//!
//! While the cooldown since the previous alert is running, nothing is raised,
//! whatever the severity.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::HealthConfig;

/// Severity of a connection alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Degraded but working.
    Warning,
    /// The reader is unreachable.
    Critical,
}

/// A raised connection alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Alert {
    /// When it was raised.
    pub timestamp: DateTime<Utc>,
    /// Human-readable description.
    #[schema(example = "5 consecutive connection failures to the RFID reader")]
    pub message: String,
    /// Severity.
    pub level: AlertLevel,
    /// Success rate (0.0-1.0) at the time of the alert.
    pub success_rate: f64,
    /// Failure streak at the time of the alert.
    pub consecutive_failures: u32,
}

/// One connection outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionRecord {
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
    /// Whether the connection was established.
    pub success: bool,
    /// Failure reason.
    pub error: Option<String>,
    /// Connect latency in milliseconds, for successes.
    pub latency_ms: Option<u64>,
}

/// Read-only projection of the monitor's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthSnapshot {
    /// Outcomes recorded.
    pub connection_attempts: u64,
    /// Successful connects.
    pub successful_connections: u64,
    /// Failed connects and dropped connections.
    pub failed_connections: u64,
    /// Current failure streak.
    pub consecutive_failures: u32,
    /// Longest failure streak seen.
    pub max_consecutive_failures: u32,
    /// `successful / attempts`, 0.0 before the first attempt.
    pub connection_success_rate: f64,
    /// Mean of all retained latency samples.
    pub average_latency_ms: Option<f64>,
    /// Success rate as a percentage.
    pub uptime_percentage: f64,
    /// Last successful connect.
    pub last_connection_time: Option<DateTime<Utc>>,
    /// Last failure.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Recent outcomes, oldest first.
    pub connection_history: Vec<ConnectionRecord>,
    /// Raised alerts, oldest first.
    pub alerts: Vec<Alert>,
}

/// Connection statistics aggregator.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    config: HealthConfig,
    attempts: u64,
    successes: u64,
    failures: u64,
    consecutive_failures: u32,
    max_consecutive_failures: u32,
    success_rate: f64,
    last_connection_time: Option<DateTime<Utc>>,
    last_failure_time: Option<DateTime<Utc>>,
    latencies: VecDeque<u64>,
    history: VecDeque<ConnectionRecord>,
    alerts: VecDeque<Alert>,
    last_alert_at: Option<DateTime<Utc>>,
}

fn push_bounded<T>(ring: &mut VecDeque<T>, capacity: usize, item: T) {
    if ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(item);
}

impl HealthMonitor {
    /// Fresh monitor with the given thresholds and capacities.
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self {
            latencies: VecDeque::with_capacity(config.max_latency_samples),
            history: VecDeque::with_capacity(config.max_history),
            alerts: VecDeque::with_capacity(config.max_alerts),
            config,
            attempts: 0,
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            max_consecutive_failures: 0,
            success_rate: 0.0,
            last_connection_time: None,
            last_failure_time: None,
            last_alert_at: None,
        }
    }

    /// Record an outcome now. See [`record_attempt_at`](Self::record_attempt_at).
    pub fn record_attempt(
        &mut self,
        success: bool,
        error: Option<String>,
        latency: Option<Duration>,
    ) -> Option<Alert> {
        self.record_attempt_at(Utc::now(), success, error, latency)
    }

    /// Record an outcome at `now` and return the alert it raised, if any.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_attempt_at(
        &mut self,
        now: DateTime<Utc>,
        success: bool,
        error: Option<String>,
        latency: Option<Duration>,
    ) -> Option<Alert> {
        self.attempts += 1;
        let latency_ms = latency.map(|l| u64::try_from(l.as_millis()).unwrap_or(u64::MAX));

        if success {
            self.successes += 1;
            self.consecutive_failures = 0;
            self.last_connection_time = Some(now);
            if let Some(ms) = latency_ms {
                push_bounded(&mut self.latencies, self.config.max_latency_samples, ms);
            }
        } else {
            self.failures += 1;
            self.consecutive_failures += 1;
            self.max_consecutive_failures =
                self.max_consecutive_failures.max(self.consecutive_failures);
            self.last_failure_time = Some(now);
        }
        self.success_rate = self.successes as f64 / self.attempts as f64;

        push_bounded(
            &mut self.history,
            self.config.max_history,
            ConnectionRecord {
                timestamp: now,
                success,
                error: if success { None } else { error },
                latency_ms: if success { latency_ms } else { None },
            },
        );

        self.evaluate_alerts(now)
    }

    fn evaluate_alerts(&mut self, now: DateTime<Utc>) -> Option<Alert> {
        if self.in_cooldown(now) {
            return None;
        }

        let (level, message) = if self.consecutive_failures
            >= self.config.consecutive_failure_threshold
        {
            (
                AlertLevel::Critical,
                format!(
                    "{} consecutive connection failures to the RFID reader",
                    self.consecutive_failures
                ),
            )
        } else if self.attempts >= self.config.min_attempts_for_rate_alert
            && self.success_rate < self.config.success_rate_threshold
        {
            (
                AlertLevel::Warning,
                format!(
                    "Connection success rate {:.1}% is below {:.1}%",
                    self.success_rate * 100.0,
                    self.config.success_rate_threshold * 100.0
                ),
            )
        } else {
            let average = self.recent_latency_average()?;
            #[allow(clippy::cast_precision_loss)]
            let threshold = self.config.latency_threshold_ms as f64;
            if average <= threshold {
                return None;
            }
            (
                AlertLevel::Warning,
                format!(
                    "Average connection latency {average:.0} ms exceeds {} ms",
                    self.config.latency_threshold_ms
                ),
            )
        };

        let alert = Alert {
            timestamp: now,
            message,
            level,
            success_rate: self.success_rate,
            consecutive_failures: self.consecutive_failures,
        };
        push_bounded(&mut self.alerts, self.config.max_alerts, alert.clone());
        self.last_alert_at = Some(now);
        Some(alert)
    }

    fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.last_alert_at.is_some_and(|last| {
            (now - last)
                .to_std()
                .map_or(true, |elapsed| elapsed < self.config.alert_cooldown())
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn recent_latency_average(&self) -> Option<f64> {
        let window = self.config.latency_window.min(self.latencies.len());
        if window == 0 {
            return None;
        }
        let sum: u64 = self.latencies.iter().rev().take(window).sum();
        Some(sum as f64 / window as f64)
    }

    /// Current failure streak.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Current success rate.
    #[must_use]
    pub const fn success_rate(&self) -> f64 {
        self.success_rate
    }

    /// Clear every counter, history and alert, including the cooldown.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Pure projection of the current state.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> HealthSnapshot {
        let average_latency_ms = if self.latencies.is_empty() {
            None
        } else {
            let sum: u64 = self.latencies.iter().sum();
            Some(sum as f64 / self.latencies.len() as f64)
        };

        HealthSnapshot {
            connection_attempts: self.attempts,
            successful_connections: self.successes,
            failed_connections: self.failures,
            consecutive_failures: self.consecutive_failures,
            max_consecutive_failures: self.max_consecutive_failures,
            connection_success_rate: self.success_rate,
            average_latency_ms,
            uptime_percentage: self.success_rate * 100.0,
            last_connection_time: self.last_connection_time,
            last_failure_time: self.last_failure_time,
            connection_history: self.history.iter().cloned().collect(),
            alerts: self.alerts.iter().cloned().collect(),
        }
    }
}
