//! Wiring of the ledger, budget, classification and import components.

use std::sync::Arc;

use crate::budget::BudgetEngine;
use crate::cache::CacheProvider;
use crate::classifier::{ClassificationEngine, ExternalClassifier, NoExternalClassifier};
use crate::config::EngineConfig;
use crate::error::{LedgerError, Result};
use crate::import::Importer;
use crate::ledger::Ledger;
use crate::storage::Store;

/// Builder for constructing an [`Engine`].
///
/// A store and a cache are required; the external classifier and the
/// configuration are optional.
#[derive(Debug)]
pub struct EngineBuilder<S, C, X = NoExternalClassifier> {
    /// Persistence backend.
    store: Option<S>,
    /// Cache and quota backend.
    cache: Option<C>,
    /// External classification model.
    external: X,
    /// Engine settings.
    config: EngineConfig,
}

impl<S: Store, C: CacheProvider, X: ExternalClassifier> EngineBuilder<S, C, X> {
    /// Sets the persistence backend.
    #[inline]
    #[must_use]
    pub fn store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the cache and quota backend.
    #[inline]
    #[must_use]
    pub fn cache(mut self, cache: C) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Plugs in an external classification model.
    #[inline]
    #[must_use]
    pub fn external_classifier<Y: ExternalClassifier>(self, external: Y) -> EngineBuilder<S, C, Y> {
        EngineBuilder {
            store: self.store,
            cache: self.cache,
            external,
            config: self.config,
        }
    }

    /// Replaces the default configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if the store or cache is missing or
    /// the configuration is inconsistent, and [`LedgerError::Pattern`] if a
    /// configured rule does not compile.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> Result<Engine<S, C, X>> {
        self.config.validate()?;
        let store = self
            .store
            .ok_or_else(|| LedgerError::Config("a store is required".to_owned()))?;
        let cache = self
            .cache
            .ok_or_else(|| LedgerError::Config("a cache is required".to_owned()))?;
        tracing::debug!(
            external = self.external.is_configured(),
            auto_classify = self.config.ledger.auto_classify,
            "building engine"
        );

        let budget = Arc::new(BudgetEngine::new(Arc::new(store)));
        let classifier = Arc::new(ClassificationEngine::new(
            cache,
            self.external,
            self.config.classification,
        )?);
        let ledger = Arc::new(Ledger::new(
            Arc::clone(&budget),
            Arc::clone(&classifier),
            self.config.ledger,
        ));
        let importer = Importer::new(Arc::clone(&ledger));
        Ok(Engine {
            budget,
            classifier,
            ledger,
            importer,
        })
    }
}

/// The complete engine: one ledger, its budget engine, the classifier and
/// the import pipeline, sharing one store and one cache.
#[derive(Debug)]
pub struct Engine<S, C, X = NoExternalClassifier> {
    /// Envelope budgets.
    budget: Arc<BudgetEngine<S>>,
    /// Transaction classifier.
    classifier: Arc<ClassificationEngine<C, X>>,
    /// Transaction ledger.
    ledger: Arc<Ledger<S, C, X>>,
    /// Import pipeline.
    importer: Importer<S, C, X>,
}

impl<S: Store, C: CacheProvider> Engine<S, C> {
    /// Creates a new builder without an external classifier.
    #[inline]
    #[must_use]
    pub fn builder() -> EngineBuilder<S, C> {
        EngineBuilder {
            store: None,
            cache: None,
            external: NoExternalClassifier,
            config: EngineConfig::default(),
        }
    }
}

impl<S: Store, C: CacheProvider, X: ExternalClassifier> Engine<S, C, X> {
    /// The transaction ledger.
    #[inline]
    #[must_use]
    pub fn ledger(&self) -> &Ledger<S, C, X> {
        &self.ledger
    }

    /// The envelope budget engine.
    #[inline]
    #[must_use]
    pub fn budget(&self) -> &BudgetEngine<S> {
        &self.budget
    }

    /// The classification engine.
    #[inline]
    #[must_use]
    pub fn classifier(&self) -> &ClassificationEngine<C, X> {
        &self.classifier
    }

    /// The import pipeline.
    #[inline]
    #[must_use]
    pub const fn importer(&self) -> &Importer<S, C, X> {
        &self.importer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use crate::cache::InMemoryCache;
    use crate::classifier::testing::{Script, ScriptedClassifier};
    use crate::config::ClassificationConfig;
    use crate::models::{
        ClassificationInput, ClassificationSource, ImportOptions, ImportRow, ImportStatus,
        NewTransaction, OrganizationId, TransactionKind,
    };
    use crate::storage::InMemoryStore;

    fn engine() -> Engine<InMemoryStore, InMemoryCache> {
        Engine::builder()
            .store(InMemoryStore::new())
            .cache(InMemoryCache::new())
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_store_and_cache() {
        let no_store = Engine::<InMemoryStore, InMemoryCache>::builder()
            .cache(InMemoryCache::new())
            .build();
        assert!(matches!(no_store, Err(LedgerError::Config(_))));
        let no_cache = Engine::<InMemoryStore, InMemoryCache>::builder()
            .store(InMemoryStore::new())
            .build();
        assert!(matches!(no_cache, Err(LedgerError::Config(_))));
    }

    #[test]
    fn builder_rejects_inconsistent_config() {
        let mut config = EngineConfig::default();
        config.classification.confidence_threshold = 1.5;
        let built = Engine::<InMemoryStore, InMemoryCache>::builder()
            .store(InMemoryStore::new())
            .cache(InMemoryCache::new())
            .config(config)
            .build();
        assert!(matches!(built, Err(LedgerError::Config(_))));
    }

    #[tokio::test]
    async fn month_end_to_end() {
        let engine = engine();
        let org = OrganizationId::from("household");
        let account = engine
            .ledger()
            .open_account(&org, "Checking", "EUR", dec!(2000))
            .unwrap();
        let food = engine
            .budget()
            .create_category(&org, "Food", Some("Everyday"))
            .unwrap();
        let _row = engine
            .budget()
            .set_monthly_budget(&org, &food.id, 2024, 9, dec!(400))
            .unwrap();

        let lunch = NewTransaction::new(
            org.clone(),
            account.id.clone(),
            TransactionKind::Expense,
            dec!(18.40),
            NaiveDate::from_ymd_opt(2024, 9, 3).unwrap(),
            "Lunch",
        )
        .budget_category(food.id.clone());
        let _tx = engine.ledger().create_transaction(lunch).await.unwrap();

        let rows = [ImportRow {
            date: "10/09/2024".to_owned(),
            amount: dec!(81.60),
            description: "Groceries market".to_owned(),
            kind: TransactionKind::Expense,
            category: None,
            currency: Some("eur".to_owned()),
            raw: serde_json::Value::Null,
        }];
        let options = ImportOptions::new()
            .date_format("%d/%m/%Y")
            .budget_category(food.id.clone());
        let imported = engine
            .importer()
            .import_rows(&org, &account.id, &rows, &options)
            .await
            .unwrap();
        assert_eq!(imported.batch.status, ImportStatus::Completed);

        let lines = engine.budget().get_monthly_budget(&org, 2024, 9).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].activity, dec!(100));
        assert_eq!(lines[0].available, dec!(300));
        let balance = engine.ledger().account(&org, &account.id).unwrap().balance;
        assert_eq!(balance, dec!(1900));
    }

    #[tokio::test]
    async fn external_classifier_is_wired_in() {
        let external = ScriptedClassifier::new(Script::Answer("Pets", 0.95));
        let engine = Engine::builder()
            .store(InMemoryStore::new())
            .cache(InMemoryCache::new())
            .external_classifier(external.clone())
            .config(EngineConfig {
                classification: ClassificationConfig {
                    quota_limit: 5,
                    ..ClassificationConfig::default()
                },
                ..EngineConfig::default()
            })
            .build()
            .unwrap();
        let input = ClassificationInput::new("PAWS & CLAWS 0042", dec!(23), TransactionKind::Expense);
        let result = engine
            .classifier()
            .classify(&"org".into(), &input)
            .await;
        assert_eq!(result.category, "Pets");
        assert_eq!(result.source, ClassificationSource::External);
        assert_eq!(external.calls(), 1);
    }
}
