//! Engine configuration.
//!
//! [`EngineConfig`] can be built in code, loaded from a JSON file, or read
//! from `ENVELOPE_*` environment variables. Every field has a default, so a
//! file only needs to name what it overrides:
//!
//! ```json
//! {
//!   "classification": { "quotaLimit": 50, "rules": [
//!     { "pattern": "\\bacme\\b", "category": "Shopping", "merchant": "Acme" }
//!   ] },
//!   "ledger": { "autoClassify": false }
//! }
//! ```

use core::str::FromStr;
use core::time::Duration;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::RuleSpec;
use crate::error::{LedgerError, Result};

/// Environment variable prefix.
const ENV_PREFIX: &str = "ENVELOPE_";

/// Longest accepted TTL, timeout or window: ten years, in seconds.
pub const MAX_DURATION_SECS: u64 = 10 * 366 * 24 * 60 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Classification pipeline settings.
    pub classification: ClassificationConfig,
    /// Ledger settings.
    pub ledger: LedgerConfig,
}

/// Classification pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassificationConfig {
    /// Results at or above this confidence never reach the external model.
    pub confidence_threshold: f64,
    /// How long classification results stay cached, in seconds.
    pub cache_ttl_secs: u64,
    /// Upper bound on one external model call, in seconds.
    pub external_timeout_secs: u64,
    /// External calls allowed per organization per window.
    pub quota_limit: u64,
    /// Quota window length, in seconds.
    pub quota_window_secs: u64,
    /// Merchant rules tried before the built-in ones.
    pub rules: Vec<RuleSpec>,
}

impl Default for ClassificationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            cache_ttl_secs: 7 * 24 * 60 * 60,
            external_timeout_secs: 20,
            quota_limit: 100,
            quota_window_secs: 24 * 60 * 60,
            rules: Vec::new(),
        }
    }
}

impl ClassificationConfig {
    /// Cache TTL as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// External call timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }

    /// Quota window as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn quota_window(&self) -> Duration {
        Duration::from_secs(self.quota_window_secs)
    }
}

/// Ledger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerConfig {
    /// Classify transactions created without a category.
    pub auto_classify: bool,
}

impl Default for LedgerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            auto_classify: true,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if the file cannot be read or is
    /// inconsistent, or [`LedgerError::Serialization`] if it is not valid
    /// JSON.
    #[inline]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            LedgerError::Config(format!("reading {}: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds configuration from defaults overridden by environment
    /// variables:
    ///
    /// - `ENVELOPE_CONFIDENCE_THRESHOLD`
    /// - `ENVELOPE_CACHE_TTL_SECS`
    /// - `ENVELOPE_EXTERNAL_TIMEOUT_SECS`
    /// - `ENVELOPE_QUOTA_LIMIT`
    /// - `ENVELOPE_QUOTA_WINDOW_SECS`
    /// - `ENVELOPE_AUTO_CLASSIFY`
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if a variable does not parse or the
    /// result is inconsistent.
    #[inline]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`EngineConfig::from_env`] but reads variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if a value does not parse or the
    /// result is inconsistent.
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let classification = &mut config.classification;
        override_from(&lookup, "CONFIDENCE_THRESHOLD", &mut classification.confidence_threshold)?;
        override_from(&lookup, "CACHE_TTL_SECS", &mut classification.cache_ttl_secs)?;
        override_from(&lookup, "EXTERNAL_TIMEOUT_SECS", &mut classification.external_timeout_secs)?;
        override_from(&lookup, "QUOTA_LIMIT", &mut classification.quota_limit)?;
        override_from(&lookup, "QUOTA_WINDOW_SECS", &mut classification.quota_window_secs)?;
        override_from(&lookup, "AUTO_CLASSIFY", &mut config.ledger.auto_classify)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] for a threshold outside `[0, 1]`, a
    /// zero timeout or quota window, or any duration above
    /// [`MAX_DURATION_SECS`].
    #[inline]
    pub fn validate(&self) -> Result<()> {
        let classification = &self.classification;
        if !(0.0..=1.0).contains(&classification.confidence_threshold) {
            return Err(LedgerError::Config(format!(
                "confidence threshold must be within [0, 1], got {}",
                classification.confidence_threshold
            )));
        }
        if classification.external_timeout_secs == 0 {
            return Err(LedgerError::Config("external timeout must be positive".to_owned()));
        }
        if classification.quota_window_secs == 0 {
            return Err(LedgerError::Config("quota window must be positive".to_owned()));
        }
        for (name, secs) in [
            ("cache TTL", classification.cache_ttl_secs),
            ("external timeout", classification.external_timeout_secs),
            ("quota window", classification.quota_window_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(LedgerError::Config(format!(
                    "{name} must be at most {MAX_DURATION_SECS}s, got {secs}s"
                )));
            }
        }
        Ok(())
    }
}

/// Replaces `target` with the parsed value of `ENVELOPE_<suffix>` if set.
fn override_from<F, T>(lookup: &F, suffix: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: core::fmt::Display,
{
    let name = format!("{ENV_PREFIX}{suffix}");
    if let Some(raw) = lookup(&name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|err| LedgerError::Config(format!("{name}: {err}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert!((config.classification.confidence_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.classification.external_timeout(), Duration::from_secs(20));
        assert!(config.ledger.auto_classify);
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ENVELOPE_QUOTA_LIMIT", "5"),
            ("ENVELOPE_AUTO_CLASSIFY", "false"),
        ]))
        .unwrap();
        assert_eq!(config.classification.quota_limit, 5);
        assert!(!config.ledger.auto_classify);
        assert_eq!(config.classification.quota_window_secs, 86_400);
    }

    #[test]
    fn bad_env_value_is_config_error() {
        let err = EngineConfig::from_lookup(lookup(&[("ENVELOPE_QUOTA_LIMIT", "lots")]))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Config(ref msg) if msg.contains("QUOTA_LIMIT")));
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("ENVELOPE_CONFIDENCE_THRESHOLD", "1.5")]))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn oversized_durations_rejected() {
        let max = u64::MAX.to_string();
        for var in [
            "ENVELOPE_CACHE_TTL_SECS",
            "ENVELOPE_EXTERNAL_TIMEOUT_SECS",
            "ENVELOPE_QUOTA_WINDOW_SECS",
        ] {
            let err = EngineConfig::from_lookup(lookup(&[(var, max.as_str())])).unwrap_err();
            assert!(matches!(err, LedgerError::Config(ref msg) if msg.contains("at most")), "{var}");
        }

        let mut config = EngineConfig::default();
        config.classification.cache_ttl_secs = MAX_DURATION_SECS;
        config.validate().unwrap();
        config.classification.cache_ttl_secs = MAX_DURATION_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(
            &path,
            r#"{"classification":{"quotaLimit":3,"rules":[{"pattern":"acme","category":"Shopping"}]}}"#,
        )
        .unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.classification.quota_limit, 3);
        assert_eq!(config.classification.rules.len(), 1);
        assert_eq!(config.classification.external_timeout_secs, 20);
        assert!(config.ledger.auto_classify);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = EngineConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}
