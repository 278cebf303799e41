//! Upload command handler.
//!
//! Uploads spreadsheet rows into an existing index without removing anything.
//! This is the way forward after an overwrite whose ingestion failed.

use super::{connect, resolve_credential, stderr_progress};
use clap::Args;
use std::path::PathBuf;
use vsctl_core::{config::AppConfig, AppResult};
use vsctl_store::{catalog, ContentBatch, IndexOverwriteCoordinator, PollPolicy};

/// Upload spreadsheet rows into an existing index
#[derive(Args, Debug)]
pub struct UploadCommand {
    /// Index id or name
    #[arg(short, long)]
    pub index: String,

    /// Spreadsheet to upload (.xlsx, .xls, .xlsb, .ods)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl UploadCommand {
    pub async fn execute(&self, config: &AppConfig, api_key: Option<&str>) -> AppResult<()> {
        tracing::info!("Executing upload command against '{}'", self.index);

        let batch = ContentBatch::from_spreadsheet(&self.file)?;
        let credential = resolve_credential(api_key).await?;
        let backend = connect(config, &credential)?;
        let index = catalog::resolve(backend.indexes.as_ref(), &self.index).await?;

        let report =
            IndexOverwriteCoordinator::new(backend.indexes.as_ref(), backend.assistants.as_ref())
                .with_poll(PollPolicy::ingestion(&config.polling))
                .with_progress(stderr_progress())
                .upload(&index.id, &batch)
                .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "Uploaded {} rows into '{}' ({})",
                report.rows,
                index.display_name(),
                report.index_id
            );
        }

        Ok(())
    }
}
