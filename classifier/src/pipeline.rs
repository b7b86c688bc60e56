//! # Classification Pipeline
//!
//! Stages, first answer wins:
//!
//! 1. hot path patterns for short common inputs (never cached)
//! 2. tiered cache
//! 3. keyword tables (result written back)
//! 4. the external model, behind the circuit breaker and the retry loop
//!    (validated result written back)
//!
//! A failed model call answers with the category's fallback label and
//! leaves the cache untouched, so the next request tries the model again.

use crate::hot_path::HotPathClassifier;
use crate::keywords::KeywordClassifier;
use crate::policy::{cache_key, policy, retention_category, validate_label};
use crate::telemetry::CacheTelemetry;
use crate::tiered_cache::{CacheEfficiency, TieredClassificationCache};
use config::CoreConfig;
use dialogue_core::{CacheCategory, ClassificationModel, ConversationKey};
use resilience::{CircuitBreaker, CircuitState, ResilientCaller};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    HotPath,
    Cache,
    Keyword,
    Model,
    Fallback,
}

impl ClassificationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassificationSource::HotPath => "hot_path",
            ClassificationSource::Cache => "cache",
            ClassificationSource::Keyword => "keyword",
            ClassificationSource::Model => "model",
            ClassificationSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub value: String,
    pub source: ClassificationSource,
}

impl Classification {
    pub fn new(value: impl Into<String>, source: ClassificationSource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }
}

pub struct Classifier {
    hot_path: HotPathClassifier,
    keywords: KeywordClassifier,
    cache: TieredClassificationCache,
    model: Option<Arc<dyn ClassificationModel>>,
    caller: Arc<ResilientCaller>,
    breaker: CircuitBreaker,
    telemetry: CacheTelemetry,
}

impl Classifier {
    pub fn new(
        config: &CoreConfig,
        model: Option<Arc<dyn ClassificationModel>>,
        caller: Arc<ResilientCaller>,
    ) -> Self {
        Self {
            hot_path: HotPathClassifier::new(&config.hot_path),
            keywords: KeywordClassifier::new(),
            cache: TieredClassificationCache::new(&config.cache),
            model,
            caller,
            breaker: CircuitBreaker::from_config("classification_model", &config.resilience),
            telemetry: CacheTelemetry::new(),
        }
    }

    pub async fn classify(
        &self,
        key: &ConversationKey,
        input: &str,
        category: CacheCategory,
    ) -> Classification {
        let result = self.classify_inner(input, category).await;
        self.telemetry
            .record_classification(result.source.as_str(), category);
        tracing::debug!(
            key = %key,
            category = %category,
            value = %result.value,
            source = result.source.as_str(),
            "Classified input"
        );
        result
    }

    async fn classify_inner(&self, input: &str, category: CacheCategory) -> Classification {
        let fallback = policy(category).fallback;
        if input.trim().is_empty() {
            return Classification::new(fallback, ClassificationSource::Fallback);
        }

        if let Some(matched) = self.hot_path.classify(input, category) {
            return Classification::new(matched.value, ClassificationSource::HotPath);
        }

        let cache_key = cache_key(input, category);
        if let Some(value) = self.cache.get(&cache_key, category) {
            return Classification::new(value, ClassificationSource::Cache);
        }

        if let Some(label) = self.keywords.classify(input, category) {
            self.cache
                .set(&cache_key, label, retention_category(label, category));
            return Classification::new(label, ClassificationSource::Keyword);
        }

        let Some(model) = &self.model else {
            return Classification::new(fallback, ClassificationSource::Fallback);
        };

        let caller = &self.caller;
        let outcome = self
            .breaker
            .call(|| async move {
                caller
                    .call("classify", || model.classify(input, category))
                    .await
            })
            .await;

        match outcome {
            Ok(raw) => {
                let (label, valid) = validate_label(&raw, category);
                if !valid {
                    tracing::warn!(
                        category = %category,
                        answer = %raw.trim(),
                        fallback = %label,
                        "Model answer is not a known label"
                    );
                }
                let retention = retention_category(&label, category);
                self.cache.set(&cache_key, label.clone(), retention);
                Classification::new(label, ClassificationSource::Model)
            }
            Err(e) => {
                tracing::warn!(category = %category, error = %e, "Classification model call failed");
                Classification::new(fallback, ClassificationSource::Fallback)
            }
        }
    }

    pub fn should_avoid_humor(&self, input: &str) -> bool {
        self.keywords.is_humor_taboo(input)
    }

    pub fn efficiency_stats(&self) -> CacheEfficiency {
        self.cache.efficiency_stats()
    }

    pub fn predict_next(&self) -> Vec<String> {
        self.cache.predict_next()
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn top_patterns(&self, n: usize) -> Vec<(String, u64)> {
        self.hot_path.top_patterns(n)
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use errors::ModelError;
    use resilience::RetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingModel {
        answer: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl CountingModel {
        fn new(answer: Result<&'static str, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ClassificationModel for CountingModel {
        async fn classify(&self, _input: &str, _category: CacheCategory) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.map(str::to_string).map_err(ModelError::new)
        }
    }

    fn classifier(model: Option<Arc<dyn ClassificationModel>>) -> Classifier {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter_ratio: 0.0,
        };
        Classifier::new(&CoreConfig::default(), model, Arc::new(ResilientCaller::new(policy)))
    }

    fn key() -> ConversationKey {
        ConversationKey::parse("u1").unwrap()
    }

    #[tokio::test]
    async fn test_hot_path_skips_model() {
        let model = CountingModel::new(Ok("philosophical"));
        let classifier = classifier(Some(model.clone()));

        let result = classifier.classify(&key(), "Привет!", CacheCategory::Factual).await;
        assert_eq!(result, Classification::new("greeting", ClassificationSource::HotPath));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(classifier.efficiency_stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_model_result_is_cached() {
        let model = CountingModel::new(Ok(" Philosophical "));
        let classifier = classifier(Some(model.clone()));
        let input = "расскажите про воспитание подростков сегодня пожалуйста";

        let first = classifier.classify(&key(), input, CacheCategory::Factual).await;
        assert_eq!(first, Classification::new("philosophical", ClassificationSource::Model));

        let second = classifier.classify(&key(), input, CacheCategory::Factual).await;
        assert_eq!(second, Classification::new("philosophical", ClassificationSource::Cache));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sensitive_answer_is_kept_as_sensitive() {
        let model = CountingModel::new(Ok("sensitive"));
        let classifier = classifier(Some(model.clone()));
        let input = "расскажите про воспитание подростков сегодня пожалуйста";

        let first = classifier.classify(&key(), input, CacheCategory::Factual).await;
        assert_eq!(first, Classification::new("sensitive", ClassificationSource::Model));

        let stats = classifier.efficiency_stats();
        assert_eq!(stats.tier1_size, 0);
        assert_eq!(stats.tier2_size, 1);

        let second = classifier.classify(&key(), input, CacheCategory::Factual).await;
        assert_eq!(second.source, ClassificationSource::Cache);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keyword_result_is_cached() {
        let model = CountingModel::new(Ok("philosophical"));
        let classifier = classifier(Some(model.clone()));
        let input = "Подскажите пожалуйста сколько стоит месяц обучения";

        let first = classifier.classify(&key(), input, CacheCategory::Factual).await;
        assert_eq!(first.source, ClassificationSource::Keyword);
        assert_eq!(first.value, "factual");

        let second = classifier.classify(&key(), input, CacheCategory::Factual).await;
        assert_eq!(second.source, ClassificationSource::Cache);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_label_uses_fallback() {
        let model = CountingModel::new(Ok("banana"));
        let classifier = classifier(Some(model));

        let result = classifier
            .classify(&key(), "мы думаем над этим уже неделю", CacheCategory::LeadState)
            .await;
        assert_eq!(result, Classification::new("greeting", ClassificationSource::Model));
    }

    #[tokio::test]
    async fn test_fatal_model_error_is_not_cached() {
        let model = CountingModel::new(Err("401 invalid api key"));
        let classifier = classifier(Some(model.clone()));
        let input = "расскажите про воспитание подростков сегодня пожалуйста";

        for _ in 0..2 {
            let result = classifier.classify(&key(), input, CacheCategory::Factual).await;
            assert_eq!(result, Classification::new("factual", ClassificationSource::Fallback));
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_without_model_falls_back() {
        let classifier = classifier(None);
        let result = classifier
            .classify(&key(), "мы думаем над этим уже неделю", CacheCategory::LeadState)
            .await;
        assert_eq!(result, Classification::new("greeting", ClassificationSource::Fallback));

        let empty = classifier.classify(&key(), "   ", CacheCategory::Factual).await;
        assert_eq!(empty.source, ClassificationSource::Fallback);
    }

    #[test]
    fn test_should_avoid_humor() {
        let classifier = classifier(None);
        assert!(classifier.should_avoid_humor("у ребенка депрессия"));
        assert!(!classifier.should_avoid_humor("когда начинается курс"));
    }
}
