//! List command handler.

use super::{connect, print_indexes, resolve_credential};
use clap::Args;
use vsctl_core::{config::AppConfig, AppResult};
use vsctl_store::catalog;

/// List indexes visible to the API key
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListCommand {
    pub async fn execute(&self, config: &AppConfig, api_key: Option<&str>) -> AppResult<()> {
        tracing::info!("Executing list command");

        let credential = resolve_credential(api_key).await?;
        let backend = connect(config, &credential)?;
        let indexes = catalog::list(backend.indexes.as_ref()).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&indexes)?);
        } else {
            print_indexes(&indexes);
        }

        Ok(())
    }
}
