//! Engine configuration.
//!
//! Loaded from `LEDGERGATE_*` environment variables; anything unset falls back to the defaults
//! below. The routing policy table can be replaced wholesale from a JSON file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use ledgergate_inventory::{HIL_TASK_TTL_DAYS, RoutingPolicy};

use crate::error::{EngineError, EngineResult};

/// Upper bounds on configured lifetimes.
pub const MAX_HIL_TTL_DAYS: i64 = 3_650;
pub const MAX_SESSION_TTL_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub bind_addr: String,
    pub hil_ttl_days: i64,
    /// Minimum per-field confidence before an import may leave negotiation.
    pub import_threshold: f64,
    pub session_ttl_minutes: i64,
    pub sweep_interval_secs: u64,
    pub policy: RoutingPolicy,
    pub classifier_script: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            hil_ttl_days: HIL_TASK_TTL_DAYS,
            import_threshold: 0.80,
            session_ttl_minutes: 120,
            sweep_interval_secs: 30,
            policy: RoutingPolicy::default(),
            classifier_script: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("LEDGERGATE_BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Some(v) = lookup("LEDGERGATE_HIL_TTL_DAYS") {
            cfg.hil_ttl_days = parse("LEDGERGATE_HIL_TTL_DAYS", &v)?;
        }
        if let Some(v) = lookup("LEDGERGATE_IMPORT_THRESHOLD") {
            cfg.import_threshold = parse("LEDGERGATE_IMPORT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("LEDGERGATE_SESSION_TTL_MINUTES") {
            cfg.session_ttl_minutes = parse("LEDGERGATE_SESSION_TTL_MINUTES", &v)?;
        }
        if let Some(v) = lookup("LEDGERGATE_SWEEP_INTERVAL_SECS") {
            cfg.sweep_interval_secs = parse("LEDGERGATE_SWEEP_INTERVAL_SECS", &v)?;
        }
        if let Some(path) = lookup("LEDGERGATE_POLICY_FILE") {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| EngineError::Config(format!("cannot read policy file {path}: {e}")))?;
            cfg.policy = serde_json::from_str(&raw)
                .map_err(|e| EngineError::Config(format!("cannot parse policy file {path}: {e}")))?;
        }
        cfg.classifier_script = lookup("LEDGERGATE_CLASSIFIER_SCRIPT").map(PathBuf::from);

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(1..=MAX_HIL_TTL_DAYS).contains(&self.hil_ttl_days) {
            return Err(EngineError::Config(format!(
                "LEDGERGATE_HIL_TTL_DAYS must be within 1..={MAX_HIL_TTL_DAYS}"
            )));
        }
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&self.session_ttl_minutes) {
            return Err(EngineError::Config(format!(
                "LEDGERGATE_SESSION_TTL_MINUTES must be within 1..={MAX_SESSION_TTL_MINUTES}"
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(EngineError::Config("LEDGERGATE_SWEEP_INTERVAL_SECS must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.import_threshold) {
            return Err(EngineError::Config("LEDGERGATE_IMPORT_THRESHOLD must be within [0, 1]".into()));
        }
        self.policy
            .validate()
            .map_err(|e| EngineError::Config(format!("routing policy: {e}")))
    }

    /// Clamped to the bounds `validate` enforces.
    pub fn hil_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.hil_ttl_days.clamp(1, MAX_HIL_TTL_DAYS))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_minutes.clamp(1, MAX_SESSION_TTL_MINUTES))
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> EngineResult<T>
where
    T::Err: core::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| EngineError::Config(format!("{key}={raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(vars: &[(&str, &str)]) -> EngineResult<EngineConfig> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        EngineConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.hil_ttl(), chrono::Duration::days(30));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = from(&[
            ("LEDGERGATE_IMPORT_THRESHOLD", "0.9"),
            ("LEDGERGATE_SWEEP_INTERVAL_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(cfg.import_threshold, 0.9);
        assert_eq!(cfg.sweep_interval_secs, 5);
    }

    #[test]
    fn garbage_values_are_config_errors() {
        assert!(matches!(
            from(&[("LEDGERGATE_HIL_TTL_DAYS", "soon")]),
            Err(EngineError::Config(_))
        ));
        assert!(from(&[("LEDGERGATE_IMPORT_THRESHOLD", "1.5")]).is_err());
    }

    #[test]
    fn lifetimes_past_the_bounds_are_rejected() {
        let too_long = (MAX_HIL_TTL_DAYS + 1).to_string();
        let max = i64::MAX.to_string();
        for vars in [
            [("LEDGERGATE_HIL_TTL_DAYS", max.as_str())],
            [("LEDGERGATE_HIL_TTL_DAYS", too_long.as_str())],
            [("LEDGERGATE_SESSION_TTL_MINUTES", max.as_str())],
        ] {
            assert!(matches!(from(&vars), Err(EngineError::Config(_))), "{vars:?}");
        }

        let unchecked = EngineConfig {
            hil_ttl_days: i64::MAX,
            session_ttl_minutes: i64::MAX,
            ..EngineConfig::default()
        };
        assert_eq!(unchecked.hil_ttl(), chrono::Duration::days(MAX_HIL_TTL_DAYS));
        assert_eq!(unchecked.session_ttl(), chrono::Duration::minutes(MAX_SESSION_TTL_MINUTES));
    }
}
