//! Wire types placed on the fan-in channel.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Dimension name used by the disk source to tag each envelope.
pub const MOUNT_POINT: &str = "mount_point";

/// A key/value tag identifying what the enclosed metrics describe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Kind of a metric record.
///
/// Records are always gauges on the wire, so the type is not serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MetricType {
    #[default]
    Gauge,
}

/// A single named reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleMetric {
    pub name: String,
    pub value: f64,
}

impl SimpleMetric {
    /// Create a gauge record.
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn metric_type(&self) -> MetricType {
        MetricType::Gauge
    }
}

/// Category of the report an envelope belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportCategory {
    /// Host resource metrics (disk, memory, cpu, network).
    #[default]
    System,
    Instance,
    Agent,
    CacheZone,
    Upstreams,
}

impl ReportCategory {
    /// Get the string representation used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::System => "SYSTEM",
            ReportCategory::Instance => "INSTANCE",
            ReportCategory::Agent => "AGENT",
            ReportCategory::CacheZone => "CACHE_ZONE",
            ReportCategory::Upstreams => "UPSTREAMS",
        }
    }
}

impl std::fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The unit sent on the fan-in channel: dimension tags, metric records and a
/// report category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEnvelope {
    /// Unix epoch milliseconds when the envelope was built.
    pub timestamp: i64,

    /// Tags identifying the target the records belong to.
    #[serde(default)]
    pub dimensions: Vec<Dimension>,

    /// Records in the converter's stable order.
    pub metrics: Vec<SimpleMetric>,

    pub category: ReportCategory,
}

impl MetricEnvelope {
    /// Create an envelope stamped with the current time.
    pub fn new(
        dimensions: Vec<Dimension>,
        metrics: Vec<SimpleMetric>,
        category: ReportCategory,
    ) -> Self {
        Self {
            timestamp: current_timestamp_millis(),
            dimensions,
            metrics,
            category,
        }
    }

    /// Look up a dimension value by name.
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    /// Look up a metric value by name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.name == name).map(|m| m.value)
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
