//! Provider registry and the runtime handed to every step invocation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::foundation::SessionId;
use crate::ports::{AIProvider, ModelSelection, ProviderId, UsageRecord, UsageTracker};

use super::errors::StepError;

/// Providers keyed by id, with one default.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<dyn AIProvider>>,
    default: Option<ProviderId>,
}

/// The provider a call was routed to.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub id: ProviderId,
    pub provider: Arc<dyn AIProvider>,
    /// Model override; `None` keeps the provider's configured model.
    pub model: Option<String>,
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("id", &self.id)
            .field("model", &self.model)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider. The first one registered becomes the default.
    pub fn register(mut self, id: ProviderId, provider: Arc<dyn AIProvider>) -> Self {
        self.providers.insert(id, provider);
        self.default.get_or_insert(id);
        self
    }

    pub fn with_default(mut self, id: ProviderId) -> Self {
        self.default = Some(id);
        self
    }

    pub fn default_provider(&self) -> Option<ProviderId> {
        self.default
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.providers.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Picks the provider for a call.
    ///
    /// A requested provider that is not registered falls back to the default
    /// with a warning; its model name is dropped since it belongs to another
    /// vendor.
    pub fn resolve(&self, selection: Option<&ModelSelection>) -> Result<ResolvedProvider, StepError> {
        if let Some(ModelSelection {
            provider: Some(id),
            model,
        }) = selection
        {
            if let Some(provider) = self.providers.get(id) {
                return Ok(ResolvedProvider {
                    id: *id,
                    provider: Arc::clone(provider),
                    model: Some(model.clone()),
                });
            }
            warn!(provider = %id, model = %model, "Requested provider not registered, falling back to default");
            return self.resolve_default(None);
        }

        self.resolve_default(selection.map(|s| s.model.clone()))
    }

    fn resolve_default(&self, model: Option<String>) -> Result<ResolvedProvider, StepError> {
        if self.providers.is_empty() {
            return Err(StepError::configuration("no providers registered"));
        }
        let id = self
            .default
            .ok_or_else(|| StepError::configuration("no default provider configured"))?;
        let provider = self
            .providers
            .get(&id)
            .ok_or_else(|| StepError::configuration(format!("default provider {id} is not registered")))?;

        Ok(ResolvedProvider {
            id,
            provider: Arc::clone(provider),
            model,
        })
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.providers.keys().collect();
        ids.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &ids)
            .field("default", &self.default)
            .finish()
    }
}

/// What a step needs to reach a model and account for it.
#[derive(Clone)]
pub struct StepRuntime {
    registry: Arc<ProviderRegistry>,
    usage: Arc<dyn UsageTracker>,
    session_id: SessionId,
}

impl StepRuntime {
    pub fn new(registry: Arc<ProviderRegistry>, usage: Arc<dyn UsageTracker>, session_id: SessionId) -> Self {
        Self {
            registry,
            usage,
            session_id,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Same providers and tracker, different session.
    pub fn for_session(&self, session_id: SessionId) -> Self {
        Self {
            session_id,
            ..self.clone()
        }
    }

    /// Stores a usage record. Tracker failures are logged, never raised.
    pub(crate) async fn record_usage(&self, record: UsageRecord) {
        debug!(
            step = %record.step,
            provider = %record.provider,
            tokens = record.total_tokens(),
            "Recording step usage"
        );
        if let Err(err) = self.usage.record_usage(record).await {
            warn!(error = %err, "Failed to record usage");
        }
    }
}

impl fmt::Debug for StepRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRuntime")
            .field("registry", &self.registry)
            .field("session_id", &self.session_id)
            .finish()
    }
}
