//! Transaction classification.
//!
//! [`ClassificationEngine`] runs an ordered strategy chain:
//!
//! 1. cache lookup by normalized description and type;
//! 2. merchant pattern rules, then keyword and amount heuristics;
//! 3. the external model, only when the rule result is below the
//!    confidence threshold, a model is configured, and the organization is
//!    within its quota;
//! 4. every freshly computed result is cached.
//!
//! [`ClassificationEngine::classify`] never fails. External problems
//! (timeouts, bad status codes, malformed or empty answers, quota
//! rejections) degrade to the rule-based result.

#[cfg(feature = "http")]
mod http;
mod rules;
mod sanitize;

use core::future::Future;

use serde::{Deserialize, Serialize};

#[cfg(feature = "http")]
pub use http::{HttpClassifier, HttpClassifierBuilder};
pub use rules::{KEYWORD_CONFIDENCE, MERCHANT_RULE_CONFIDENCE, RuleSet, RuleSpec, normalize};

use crate::cache::CacheProvider;
use crate::config::ClassificationConfig;
use crate::error::{LedgerError, Result};
use crate::models::{
    ClassificationInput, ClassificationResult, ClassificationSource, OrganizationId,
    RecurringFrequency,
};

/// Answer of an external classification model, before sanitizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalClassification {
    /// Suggested category.
    pub category: String,
    /// Suggested subcategory.
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Model confidence; clamped into `[0, 1]` when sanitized.
    #[serde(default)]
    pub confidence: f64,
    /// Recognised merchant.
    #[serde(default)]
    pub merchant_name: Option<String>,
    /// Whether the charge looks recurring.
    #[serde(default)]
    pub is_recurring: Option<bool>,
    /// Expected recurrence.
    #[serde(default)]
    pub recurring_frequency: Option<RecurringFrequency>,
}

/// An external classification model.
pub trait ExternalClassifier: core::fmt::Debug + Send + Sync {
    /// Asks the model for a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the answer cannot be decoded.
    fn classify(
        &self,
        input: &ClassificationInput,
    ) -> impl Future<Output = Result<ExternalClassification>> + Send;

    /// Whether calls can succeed at all; `false` skips the external step.
    #[inline]
    fn is_configured(&self) -> bool {
        true
    }
}

/// Placeholder used when no external model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalClassifier;

impl ExternalClassifier for NoExternalClassifier {
    #[inline]
    fn classify(
        &self,
        _input: &ClassificationInput,
    ) -> impl Future<Output = Result<ExternalClassification>> + Send {
        core::future::ready(Err(LedgerError::ExternalServiceUnavailable(
            "no external classifier configured".to_owned(),
        )))
    }

    #[inline]
    fn is_configured(&self) -> bool {
        false
    }
}

/// A model chosen at runtime; `None` behaves like [`NoExternalClassifier`].
impl<X: ExternalClassifier> ExternalClassifier for Option<X> {
    #[inline]
    fn classify(
        &self,
        input: &ClassificationInput,
    ) -> impl Future<Output = Result<ExternalClassification>> + Send {
        async move {
            match self.as_ref() {
                Some(external) => external.classify(input).await,
                None => NoExternalClassifier.classify(input).await,
            }
        }
    }

    #[inline]
    fn is_configured(&self) -> bool {
        self.as_ref().is_some_and(ExternalClassifier::is_configured)
    }
}

/// Cache key for a classification input.
#[must_use]
pub fn cache_key(input: &ClassificationInput) -> String {
    format!("classify:{}:{}", input.kind, normalize(&input.description))
}

/// Quota counter key for an organization.
fn quota_key(organization_id: &OrganizationId) -> String {
    format!("quota:classify:{organization_id}")
}

/// Layered classifier: cache, rules, external model.
#[derive(Debug)]
pub struct ClassificationEngine<C, X = NoExternalClassifier> {
    /// Compiled rules.
    rules: RuleSet,
    /// Result cache and quota counters.
    cache: C,
    /// External model.
    external: X,
    /// Thresholds, TTLs and quota settings.
    config: ClassificationConfig,
}

impl<C: CacheProvider, X: ExternalClassifier> ClassificationEngine<C, X> {
    /// Creates an engine, compiling the configured and built-in rules.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Pattern`] if a configured rule fails to
    /// compile.
    #[inline]
    pub fn new(cache: C, external: X, config: ClassificationConfig) -> Result<Self> {
        let rules = RuleSet::with_custom(&config.rules)?;
        Ok(Self {
            rules,
            cache,
            external,
            config,
        })
    }

    /// The cache/quota provider.
    #[inline]
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// The active configuration.
    #[inline]
    pub const fn config(&self) -> &ClassificationConfig {
        &self.config
    }

    /// Classifies one transaction on behalf of `organization_id`.
    ///
    /// Never fails; see the module docs for the strategy chain.
    #[inline]
    #[tracing::instrument(skip_all, fields(org = %organization_id, kind = %input.kind))]
    pub async fn classify(
        &self,
        organization_id: &OrganizationId,
        input: &ClassificationInput,
    ) -> ClassificationResult {
        let key = cache_key(input);
        if let Some(hit) = self.cached(&key).await {
            tracing::debug!(category = %hit.category, "cache hit");
            return hit;
        }

        let rule_result = self.rules.classify(input);
        tracing::debug!(
            category = %rule_result.category,
            confidence = rule_result.confidence,
            "rule result"
        );
        let result = if rule_result.confidence < self.config.confidence_threshold
            && self.external.is_configured()
        {
            match self.external_result(organization_id, input).await {
                Ok(external) => external,
                Err(err) => {
                    tracing::warn!(error = %err, "external classification failed, using rule result");
                    rule_result
                }
            }
        } else {
            rule_result
        };

        self.remember(&key, &result).await;
        result
    }

    /// Classifies each input independently, preserving order.
    #[inline]
    pub async fn classify_batch(
        &self,
        organization_id: &OrganizationId,
        inputs: &[ClassificationInput],
    ) -> Vec<ClassificationResult> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.classify(organization_id, input).await);
        }
        results
    }

    /// Explicitly requests external classification.
    ///
    /// Unlike [`ClassificationEngine::classify`] this ignores the cache and
    /// the confidence threshold, and reports the gate's decision: quota
    /// rejections surface as errors. Once past the gate, a failing model
    /// call still falls back to the rule result. The returned result is
    /// cached.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ExternalServiceUnavailable`] if no external
    /// model is configured, [`LedgerError::QuotaExceeded`] if the
    /// organization is over quota, or a storage error if the quota counter
    /// cannot be updated.
    #[inline]
    #[tracing::instrument(skip_all, fields(org = %organization_id))]
    pub async fn request_external(
        &self,
        organization_id: &OrganizationId,
        input: &ClassificationInput,
    ) -> Result<ClassificationResult> {
        if !self.external.is_configured() {
            return Err(LedgerError::ExternalServiceUnavailable(
                "no external classifier configured".to_owned(),
            ));
        }
        self.check_quota(organization_id).await?;
        let result = match self.call_external(input).await {
            Ok(external) => external,
            Err(err) => {
                tracing::warn!(error = %err, "external classification failed, using rule result");
                self.rules.classify(input)
            }
        };
        self.remember(&cache_key(input), &result).await;
        Ok(result)
    }

    /// Reads and decodes a cached result.
    async fn cached(&self, key: &str) -> Option<ClassificationResult> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<ClassificationResult>(&raw) {
                Ok(mut hit) => {
                    hit.source = ClassificationSource::Cache;
                    Some(hit)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "cache lookup failed");
                None
            }
        }
    }

    /// Caches a result; failures are logged and ignored.
    async fn remember(&self, key: &str, result: &ClassificationResult) {
        let encoded = match serde_json::to_string(result) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(error = %err, "could not encode classification");
                return;
            }
        };
        if let Err(err) = self
            .cache
            .set_with_ttl(key, encoded, self.config.cache_ttl())
            .await
        {
            tracing::warn!(error = %err, "cache write failed");
        }
    }

    /// Quota check followed by the external call.
    async fn external_result(
        &self,
        organization_id: &OrganizationId,
        input: &ClassificationInput,
    ) -> Result<ClassificationResult> {
        self.check_quota(organization_id).await?;
        self.call_external(input).await
    }

    /// Counts one call against the organization's quota.
    async fn check_quota(&self, organization_id: &OrganizationId) -> Result<()> {
        let limit = self.config.quota_limit;
        let used = self
            .cache
            .increment_counter(&quota_key(organization_id), self.config.quota_window())
            .await?;
        if used > limit {
            tracing::warn!(used, limit, "external classification quota exhausted");
            return Err(LedgerError::QuotaExceeded { used, limit });
        }
        Ok(())
    }

    /// Calls the model under the configured timeout and sanitizes the answer.
    async fn call_external(&self, input: &ClassificationInput) -> Result<ClassificationResult> {
        let timeout = self.config.external_timeout();
        let response = tokio::time::timeout(timeout, self.external.classify(input))
            .await
            .map_err(|elapsed| {
                LedgerError::ExternalServiceUnavailable(format!(
                    "external classifier timed out after {}s ({elapsed})",
                    timeout.as_secs()
                ))
            })??;
        sanitize::sanitize(response).ok_or_else(|| {
            LedgerError::ExternalServiceUnavailable(
                "external classifier returned no usable category".to_owned(),
            )
        })
    }
}
