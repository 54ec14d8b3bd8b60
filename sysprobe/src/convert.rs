//! Conversion of raw readings into metric records.

use std::collections::BTreeMap;

use sysprobe_common::SimpleMetric;

/// Named readings taken from one target in one pass.
///
/// A `BTreeMap` keeps keys in lexicographic order, which is the order records
/// are emitted in.
pub type Sample = BTreeMap<String, f64>;

/// Build a [`Sample`] from `(name, value)` pairs.
pub fn sample<'a>(readings: impl IntoIterator<Item = (&'a str, f64)>) -> Sample {
    readings
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Convert a sample into gauge records, one per reading, ordered by name.
pub fn convert_samples(samples: &Sample) -> Vec<SimpleMetric> {
    samples
        .iter()
        .map(|(name, value)| SimpleMetric::gauge(name.clone(), *value))
        .collect()
}

/// Namespace and group a source labels its records with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedMetric {
    namespace: String,
    group: String,
}

impl NamedMetric {
    pub fn new(namespace: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Full record name: `<namespace>.<group>.<name>`, or the bare name when
    /// the namespace is empty.
    pub fn label(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}.{}", self.namespace, self.group, name)
        }
    }

    /// Convert a sample, labelling every record.
    pub fn convert(&self, samples: &Sample) -> Vec<SimpleMetric> {
        convert_samples(samples)
            .into_iter()
            .map(|mut metric| {
                metric.name = self.label(&metric.name);
                metric
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_sample() -> Sample {
        sample([
            ("total", 100.0),
            ("used", 40.0),
            ("free", 60.0),
            ("in_use", 40.0),
        ])
    }

    #[test]
    fn test_convert_orders_by_name() {
        let metrics = convert_samples(&disk_sample());

        let names: Vec<_> = metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["free", "in_use", "total", "used"]);
        assert_eq!(metrics[2].value, 100.0);
    }

    #[test]
    fn test_convert_is_deterministic() {
        let samples = disk_sample();
        assert_eq!(convert_samples(&samples), convert_samples(&samples));
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let reversed = sample([
            ("in_use", 40.0),
            ("free", 60.0),
            ("used", 40.0),
            ("total", 100.0),
        ]);
        assert_eq!(convert_samples(&reversed), convert_samples(&disk_sample()));
    }

    #[test]
    fn test_convert_empty_sample() {
        assert!(convert_samples(&Sample::new()).is_empty());
    }

    #[test]
    fn test_named_metric_label() {
        let named = NamedMetric::new("system", "disk");
        assert_eq!(named.label("total"), "system.disk.total");

        let bare = NamedMetric::new("", "disk");
        assert_eq!(bare.label("total"), "total");
    }

    #[test]
    fn test_named_metric_convert() {
        let named = NamedMetric::new("system", "disk");
        let metrics = named.convert(&disk_sample());

        let names: Vec<_> = metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "system.disk.free",
                "system.disk.in_use",
                "system.disk.total",
                "system.disk.used"
            ]
        );
    }
}
