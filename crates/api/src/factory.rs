//! Backend factory.
//!
//! Resolves a provider name to a concrete binding and hands it out as a
//! pair of trait objects, so callers never name a vendor type.

use crate::client::{AssistantService, IndexService};
use crate::providers::{InMemoryBackend, OpenAiClient};
use std::sync::Arc;
use vsctl_core::config::DEFAULT_ENDPOINT;
use vsctl_core::{AppError, AppResult, Credential};

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Memory,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "memory" | "sandbox" => Some(Self::Memory),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Memory => "memory",
        }
    }
}

/// Both vendor capabilities, backed by the same binding.
#[derive(Clone)]
pub struct Backend {
    pub indexes: Arc<dyn IndexService>,
    pub assistants: Arc<dyn AssistantService>,
}

impl Backend {
    /// Share one binding behind both traits.
    pub fn from_binding<T>(binding: T) -> Self
    where
        T: IndexService + AssistantService + 'static,
    {
        let binding = Arc::new(binding);
        Self {
            indexes: binding.clone(),
            assistants: binding,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.indexes.provider_name()
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("provider", &self.provider_name())
            .finish()
    }
}

/// Create a backend for `provider`.
///
/// # Arguments
/// * `provider` - Provider identifier ("openai", "memory")
/// * `endpoint` - Optional custom base URL (OpenAI-compatible servers)
/// * `credential` - Operator credential, kept in memory by the binding
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or the HTTP client
/// cannot be built.
pub fn create_backend(
    provider: &str,
    endpoint: Option<&str>,
    credential: &Credential,
) -> AppResult<Backend> {
    match ProviderType::parse(provider) {
        Some(ProviderType::OpenAI) => {
            let base_url = endpoint.unwrap_or(DEFAULT_ENDPOINT);
            tracing::debug!("Using OpenAI binding at {}", base_url);
            let client = OpenAiClient::with_base_url(base_url, credential.clone())?;
            Ok(Backend::from_binding(client))
        }
        Some(ProviderType::Memory) => {
            tracing::warn!("Using in-memory sandbox; nothing is sent to a vendor");
            Ok(Backend::from_binding(InMemoryBackend::new().connect(credential)))
        }
        None => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}
