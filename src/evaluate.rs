use crate::collectors::{CPU_USAGE, DISK_USAGE, MEMORY_USAGE};
use crate::config::ThresholdsConfig;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThan,
}

impl Comparison {
    fn exceeds(self, value: f64, limit: f64) -> bool {
        match self {
            Self::GreaterThan => value > limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric_name: String,
    pub limit: f64,
    pub comparison: Comparison,
}

impl ThresholdRule {
    pub fn greater_than(metric_name: impl Into<String>, limit: f64) -> Self {
        Self {
            metric_name: metric_name.into(),
            limit,
            comparison: Comparison::GreaterThan,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Ok,
    Warning,
    Unknown,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(text)
    }
}

/// Absent values are UNKNOWN; a value equal to the limit is still OK.
pub fn classify(value: Option<f64>, rule: &ThresholdRule) -> Classification {
    match value {
        None => Classification::Unknown,
        Some(v) if rule.comparison.exceeds(v, rule.limit) => Classification::Warning,
        Some(_) => Classification::Ok,
    }
}

/// Threshold rules keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdRules {
    rules: BTreeMap<String, ThresholdRule>,
}

impl ThresholdRules {
    pub fn from_config(cfg: &ThresholdsConfig) -> Self {
        let mut rules = Self::default();
        rules.insert(ThresholdRule::greater_than(CPU_USAGE, cfg.cpu_percent));
        rules.insert(ThresholdRule::greater_than(MEMORY_USAGE, cfg.memory_percent));
        rules.insert(ThresholdRule::greater_than(DISK_USAGE, cfg.disk_percent));
        rules
    }

    pub fn insert(&mut self, rule: ThresholdRule) {
        self.rules.insert(rule.metric_name.clone(), rule);
    }

    pub fn get(&self, metric_name: &str) -> Option<&ThresholdRule> {
        self.rules.get(metric_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_rule() -> ThresholdRule {
        ThresholdRule::greater_than(CPU_USAGE, 80.0)
    }

    #[test]
    fn equality_is_not_a_warning() {
        assert_eq!(classify(Some(80.0), &cpu_rule()), Classification::Ok);
        assert_eq!(classify(Some(80.0001), &cpu_rule()), Classification::Warning);
        assert_eq!(classify(Some(79.9999), &cpu_rule()), Classification::Ok);
    }

    #[test]
    fn absent_value_is_unknown() {
        assert_eq!(classify(None, &cpu_rule()), Classification::Unknown);
    }

    #[test]
    fn warning_iff_strictly_greater() {
        let rule = ThresholdRule::greater_than(MEMORY_USAGE, 85.0);
        for step in 0..=2000 {
            let v = step as f64 * 0.1;
            let expected = if v > 85.0 {
                Classification::Warning
            } else {
                Classification::Ok
            };
            assert_eq!(classify(Some(v), &rule), expected, "value {v}");
        }
    }

    #[test]
    fn rules_follow_config() {
        let rules = ThresholdRules::from_config(&ThresholdsConfig::default());
        assert_eq!(rules.get(CPU_USAGE).map(|r| r.limit), Some(80.0));
        assert_eq!(rules.get(MEMORY_USAGE).map(|r| r.limit), Some(85.0));
        assert_eq!(rules.get(DISK_USAGE).map(|r| r.limit), Some(80.0));
        assert!(rules.get("load").is_none());
    }

    #[test]
    fn classification_markers() {
        assert_eq!(Classification::Ok.to_string(), "OK");
        assert_eq!(Classification::Warning.to_string(), "WARNING");
        assert_eq!(Classification::Unknown.to_string(), "UNKNOWN");
    }
}
