//! Service configuration types.
//!
//! Every section carries defaults so a partial file (or none at all) yields a
//! runnable configuration. Loading from files and the environment is done by the
//! service binary; this module only defines the shape and its validation.

use hookline_core::{
    DeliveryConfig, ExecutorConfig, RecoveryConfig, RetryPolicy, TransportConfig,
    WorkerPoolConfig, DEFAULT_MAX_ATTEMPTS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ConfigError;

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub delivery: DeliverySettings,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than zero"));
        }
        if self.server.max_body_size == 0 {
            return Err(invalid("server.max_body_size must be greater than zero"));
        }

        let delivery = &self.delivery;
        if delivery.max_attempts == 0 {
            return Err(invalid("delivery.max_attempts must be greater than zero"));
        }
        if delivery.request_timeout_seconds == 0 {
            return Err(invalid(
                "delivery.request_timeout_seconds must be greater than zero",
            ));
        }
        if delivery.max_concurrent_deliveries == 0 {
            return Err(invalid(
                "delivery.max_concurrent_deliveries must be greater than zero",
            ));
        }
        if delivery.queue_capacity == 0 {
            return Err(invalid("delivery.queue_capacity must be greater than zero"));
        }
        if delivery.enqueue_timeout_millis == 0 {
            return Err(invalid(
                "delivery.enqueue_timeout_millis must be greater than zero",
            ));
        }

        let scheduler = &self.scheduler;
        if scheduler.interval_seconds == 0 {
            return Err(invalid("scheduler.interval_seconds must be greater than zero"));
        }
        if scheduler.batch_size == 0 {
            return Err(invalid("scheduler.batch_size must be greater than zero"));
        }
        if scheduler.stale_after_seconds == 0 {
            return Err(invalid(
                "scheduler.stale_after_seconds must be greater than zero",
            ));
        }
        if scheduler.backoff_multiplier < 1.0 {
            return Err(invalid("scheduler.backoff_multiplier must be at least 1.0"));
        }
        if scheduler.max_backoff_seconds < scheduler.initial_backoff_seconds {
            return Err(invalid(
                "scheduler.max_backoff_seconds must not be below initial_backoff_seconds",
            ));
        }

        Ok(())
    }

    /// Delivery tuning handed to the core service
    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            max_attempts: self.delivery.max_attempts,
            executor: ExecutorConfig {
                max_response_body_bytes: self.delivery.max_response_body_bytes,
            },
            worker_pool: WorkerPoolConfig {
                max_concurrent_deliveries: self.delivery.max_concurrent_deliveries,
                queue_capacity: self.delivery.queue_capacity,
                enqueue_timeout_millis: self.delivery.enqueue_timeout_millis,
                shutdown_timeout_seconds: self.server.shutdown_timeout_seconds,
            },
            retry_policy: self.scheduler.retry_policy(),
            recovery: RecoveryConfig {
                stale_after_seconds: self.scheduler.stale_after_seconds,
                ..RecoveryConfig::default()
            },
        }
    }

    /// Settings for the outbound HTTP client
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            request_timeout_seconds: self.delivery.request_timeout_seconds,
            user_agent: self.delivery.user_agent.clone(),
        }
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_seconds: u64,
    pub max_body_size: usize,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outbound delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    pub max_attempts: u32,
    pub request_timeout_seconds: u64,
    pub max_response_body_bytes: usize,
    pub max_concurrent_deliveries: usize,
    pub queue_capacity: usize,
    pub enqueue_timeout_millis: u64,
    pub user_agent: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        let transport = TransportConfig::default();
        let executor = ExecutorConfig::default();
        let pool = WorkerPoolConfig::default();

        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout_seconds: transport.request_timeout_seconds,
            max_response_body_bytes: executor.max_response_body_bytes,
            max_concurrent_deliveries: pool.max_concurrent_deliveries,
            queue_capacity: pool.queue_capacity,
            enqueue_timeout_millis: pool.enqueue_timeout_millis,
            user_agent: transport.user_agent,
        }
    }
}

/// Periodic retry and recovery scans
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub batch_size: usize,
    pub stale_after_seconds: u64,
    pub initial_backoff_seconds: u64,
    pub max_backoff_seconds: u64,
    pub backoff_multiplier: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 30,
            batch_size: 100,
            stale_after_seconds: RecoveryConfig::default().stale_after_seconds,
            initial_backoff_seconds: 30,
            max_backoff_seconds: 3600,
            backoff_multiplier: 2.0,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Backoff applied to failed deliveries picked up by the scheduler
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            Duration::from_secs(self.initial_backoff_seconds),
            Duration::from_secs(self.max_backoff_seconds),
            self.backoff_multiplier,
        )
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
