//! Credential validation.
//!
//! A credential is judged by one read-only probe against the vendor. Any
//! failure, whether transport or authorization, counts as invalid.

use std::sync::Arc;
use vsctl_api::{create_backend, IndexService};
use vsctl_core::{AppResult, Credential};

/// Builds an index service that presents a given credential.
pub type Connector = Arc<dyn Fn(&Credential) -> AppResult<Arc<dyn IndexService>> + Send + Sync>;

/// Outcome of a credential probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCheck {
    pub valid: bool,

    /// Why the probe failed, when it did
    pub diagnostic: Option<String>,
}

pub struct CredentialValidator {
    connector: Connector,
}

impl CredentialValidator {
    pub fn new(connector: Connector) -> Self {
        Self { connector }
    }

    pub fn from_fn<F>(connect: F) -> Self
    where
        F: Fn(&Credential) -> AppResult<Arc<dyn IndexService>> + Send + Sync + 'static,
    {
        Self::new(Arc::new(connect))
    }

    /// Validator that connects through the backend factory.
    pub fn for_provider(provider: &str, endpoint: Option<&str>) -> Self {
        let provider = provider.to_string();
        let endpoint = endpoint.map(str::to_string);
        Self::from_fn(move |credential| {
            Ok(create_backend(&provider, endpoint.as_deref(), credential)?.indexes)
        })
    }

    /// Probe the vendor with `credential`. Never mutates remote state.
    pub async fn check(&self, credential: &Credential) -> CredentialCheck {
        let outcome = match (self.connector)(credential) {
            Ok(indexes) => indexes.probe().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                tracing::info!("Credential {} accepted", credential.hint());
                CredentialCheck {
                    valid: true,
                    diagnostic: None,
                }
            }
            Err(e) => {
                tracing::warn!("Credential {} rejected: {}", credential.hint(), e);
                CredentialCheck {
                    valid: false,
                    diagnostic: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn validate(&self, credential: &Credential) -> bool {
        self.check(credential).await.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsctl_api::InMemoryBackend;
    use vsctl_core::AppError;

    fn sandbox_validator(backend: &InMemoryBackend) -> CredentialValidator {
        let backend = backend.clone();
        CredentialValidator::from_fn(move |credential| {
            let service: Arc<dyn IndexService> = Arc::new(backend.connect(credential));
            Ok(service)
        })
    }

    #[tokio::test]
    async fn test_accepted_credential() {
        let backend = InMemoryBackend::new().require_credential("sk-good-0000");
        let validator = sandbox_validator(&backend);
        assert!(validator.validate(&Credential::new("sk-good-0000").unwrap()).await);
    }

    #[tokio::test]
    async fn test_rejected_credential_has_diagnostic() {
        let backend = InMemoryBackend::new().require_credential("sk-good-0000");
        backend.seed_index("catalog-v1", &["row"]);
        let validator = sandbox_validator(&backend);

        let check = validator.check(&Credential::new("sk-bad-0000").unwrap()).await;
        assert!(!check.valid);
        assert!(check.diagnostic.unwrap().contains("Incorrect API key"));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connector_error_is_invalid() {
        let validator = CredentialValidator::from_fn(|_| {
            Err(AppError::Config("unreachable endpoint".to_string()))
        });
        let check = validator.check(&Credential::new("sk-any-0000").unwrap()).await;
        assert!(!check.valid);
        assert_eq!(
            check.diagnostic.as_deref(),
            Some("Configuration error: unreachable endpoint")
        );
    }

    #[tokio::test]
    async fn test_for_provider_memory() {
        let validator = CredentialValidator::for_provider("memory", None);
        assert!(validator.validate(&Credential::new("sk-any-0000").unwrap()).await);

        let unknown = CredentialValidator::for_provider("nope", None);
        assert!(!unknown.validate(&Credential::new("sk-any-0000").unwrap()).await);
    }
}
