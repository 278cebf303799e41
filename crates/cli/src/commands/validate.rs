//! Validate command handler.
//!
//! Probes the vendor with the operator's credential without changing anything.

use super::resolve_credential;
use clap::Args;
use vsctl_core::{config::AppConfig, AppError, AppResult};
use vsctl_store::CredentialValidator;

/// Check that the API key is accepted
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateCommand {
    pub async fn execute(&self, config: &AppConfig, api_key: Option<&str>) -> AppResult<()> {
        tracing::info!("Executing validate command");

        let credential = resolve_credential(api_key).await?;
        let validator = CredentialValidator::for_provider(&config.provider, Some(&config.endpoint));
        let check = validator.check(&credential).await;

        if self.json {
            let output = serde_json::json!({
                "valid": check.valid,
                "credential": credential.hint(),
                "diagnostic": check.diagnostic,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if check.valid {
            println!("Credential {} accepted", credential.hint());
        } else {
            println!("Credential {} rejected", credential.hint());
        }

        match check.diagnostic {
            Some(diagnostic) if !check.valid => Err(AppError::InvalidCredential(diagnostic)),
            _ => Ok(()),
        }
    }
}
