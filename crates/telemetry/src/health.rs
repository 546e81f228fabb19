//! Health of the pipeline's collaborators.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Health status for the pipeline as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Component health state.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    /// Whether the pipeline can run without this component
    optional: bool,
    healthy: AtomicBool,
    message: parking_lot::RwLock<Option<String>>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str, optional: bool) -> Self {
        Self {
            name,
            optional,
            healthy: AtomicBool::new(false),
            message: parking_lot::RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.message.write() = None;
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    /// Records the outcome of a connectivity check.
    pub fn record(&self, healthy: bool) {
        if healthy {
            self.set_healthy();
        } else {
            self.set_unhealthy("Connection failed");
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.message.read().clone()
    }

    fn report(&self) -> ComponentHealthReport {
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: self.is_healthy(),
            message: self.message(),
        }
    }
}

/// Aggregated health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Health of the document store, the work queue and the identity registry.
pub struct HealthRegistry {
    pub store: ComponentHealth,
    pub queue: ComponentHealth,
    pub registry: ComponentHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            store: ComponentHealth::new("store", false),
            queue: ComponentHealth::new("queue", true),
            registry: ComponentHealth::new("registry", true),
        }
    }

    fn components(&self) -> [&ComponentHealth; 3] {
        [&self.store, &self.queue, &self.registry]
    }

    /// Generate a health report.
    ///
    /// Unhealthy optional components degrade the pipeline; an unhealthy
    /// store makes it unhealthy.
    pub fn report(&self) -> HealthReport {
        let components = self.components();
        let status = if components.iter().all(|c| c.is_healthy()) {
            HealthStatus::Healthy
        } else if self.is_ready() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        HealthReport {
            status,
            components: components.iter().map(|c| c.report()).collect(),
        }
    }

    /// Check if the pipeline can run at all.
    pub fn is_ready(&self) -> bool {
        self.components()
            .iter()
            .all(|c| c.is_optional() || c.is_healthy())
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global health registry.
pub static HEALTH: std::sync::LazyLock<HealthRegistry> =
    std::sync::LazyLock::new(HealthRegistry::new);

/// Get the global health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
