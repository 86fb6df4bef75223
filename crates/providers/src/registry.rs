//! Provider registry.
//!
//! Constructs and holds one [`ConverseProvider`] per configured model. At
//! startup the registry reads [`LlmConfig`], resolves authentication, and
//! instantiates an adapter for every entry in `models`.

use std::collections::HashMap;
use std::sync::Arc;

use sa_domain::config::LlmConfig;
use sa_domain::error::{Error, Result};

use crate::converse::ConverseProvider;
use crate::traits::LlmProvider;

/// Holds all instantiated LLM providers, keyed by `model_id`.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// A model that fails to initialize (e.g. its auth env var is unset) is
    /// logged and skipped rather than aborting startup; the Task Lifecycle
    /// Manager surfaces the missing model as `Error::Provider` on first use.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

        for model in &config.models {
            match ConverseProvider::from_config(model, config.default_timeout_ms) {
                Ok(provider) => {
                    tracing::info!(model_id = %model.model_id, "registered LLM provider");
                    providers.insert(model.model_id.clone(), Arc::new(provider));
                }
                Err(e) => {
                    tracing::warn!(
                        model_id = %model.model_id,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        Ok(Self { providers })
    }

    /// Build a registry directly from already-constructed providers, for
    /// callers (tests, or a custom provider) that bypass `LlmConfig`.
    pub fn from_map(providers: HashMap<String, Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Look up a provider by `model_id`.
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(model_id).cloned()
    }

    /// Look up a provider, producing the domain error the iteration engine
    /// expects when a task's configured model has no registered provider.
    pub fn require(&self, model_id: &str) -> Result<Arc<dyn LlmProvider>> {
        self.get(model_id).ok_or_else(|| Error::Provider {
            provider: model_id.to_string(),
            message: "no provider registered for this model_id".into(),
        })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn list_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
