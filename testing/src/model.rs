use async_trait::async_trait;
use dialogue_core::{CacheCategory, ClassificationModel};
use errors::ModelError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replays scripted answers in order, then keeps returning `fallback`.
///
/// `Err` entries are returned as [`ModelError`] with the given text, which
/// lets tests drive rate-limit and server-error paths.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    calls: AtomicUsize,
    inputs: Mutex<Vec<(String, CacheCategory)>>,
}

impl ScriptedModel {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn then_answer(self, answer: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(answer.into()));
        self
    }

    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.script.lock().push_back(Err(message.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<(String, CacheCategory)> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl ClassificationModel for ScriptedModel {
    async fn classify(&self, input: &str, category: CacheCategory) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push((input.to_string(), category));
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(message)) => Err(ModelError::new(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let model = ScriptedModel::new("factual")
            .then_fail("503 Service Unavailable")
            .then_answer("philosophical");

        let first = model.classify("a", CacheCategory::Factual).await;
        assert_eq!(first.unwrap_err().to_string(), "503 Service Unavailable");
        assert_eq!(model.classify("b", CacheCategory::Factual).await.unwrap(), "philosophical");
        assert_eq!(model.classify("c", CacheCategory::LeadState).await.unwrap(), "factual");
        assert_eq!(model.calls(), 3);
        assert_eq!(model.inputs()[2], ("c".to_string(), CacheCategory::LeadState));
    }
}
