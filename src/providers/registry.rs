//! Provider registry mapping configured names to backend instances.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::ProvidersConfig;

use super::plivo::PlivoProvider;
use super::twilio::TwilioProvider;
use super::SmsProvider;

/// Process-wide mapping from provider name to a configured backend instance.
///
/// Populated at startup from configuration (or via [`register`]) and read-only
/// thereafter: dispatch code paths only look names up, they never mutate.
///
/// [`register`]: ProviderRegistry::register
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn SmsProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the `[providers]` config section.
    ///
    /// Each configured backend is registered under its canonical name
    /// (`twilio`, `plivo`). Sections that are absent are simply skipped — a
    /// deployment may run with a single backend.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();

        if let Some(ref twilio) = config.twilio {
            registry.register(
                "twilio",
                Arc::new(TwilioProvider::new(
                    twilio.account_sid.clone(),
                    twilio.auth_token.clone(),
                    twilio.sender_id.clone(),
                )),
            );
        }

        if let Some(ref plivo) = config.plivo {
            registry.register(
                "plivo",
                Arc::new(PlivoProvider::new(
                    plivo.auth_id.clone(),
                    plivo.auth_token.clone(),
                    plivo.sender_id.clone(),
                )),
            );
        }

        registry
    }

    /// Register a provider instance under a name.
    ///
    /// Intended for startup wiring only; a later registration under the same
    /// name replaces the earlier one.
    pub fn register(&mut self, name: &str, provider: Arc<dyn SmsProvider>) {
        info!(provider = name, "provider registered");
        self.providers.insert(name.to_owned(), provider);
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn SmsProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted for stable display.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` when no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
