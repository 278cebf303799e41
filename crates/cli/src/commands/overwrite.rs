//! Overwrite command handler.
//!
//! Destructively replaces an index's contents with the rows of a spreadsheet.

use super::{confirm, connect, overwrite_warning, resolve_credential, stderr_progress};
use clap::Args;
use std::path::PathBuf;
use vsctl_core::{config::AppConfig, AppError, AppResult};
use vsctl_store::{
    catalog, ContentBatch, IndexOverwriteCoordinator, OverwriteReport, PollPolicy, SessionState,
};

/// Replace an index's contents with spreadsheet rows
#[derive(Args, Debug)]
pub struct OverwriteCommand {
    /// Index id or name
    #[arg(short, long)]
    pub index: String,

    /// Spreadsheet to upload (.xlsx, .xls, .xlsb, .ods)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl OverwriteCommand {
    pub async fn execute(&self, config: &AppConfig, api_key: Option<&str>) -> AppResult<()> {
        tracing::info!("Executing overwrite command against '{}'", self.index);

        // parse before touching anything remote
        let batch = ContentBatch::from_spreadsheet(&self.file)?;

        let credential = resolve_credential(api_key).await?;
        let backend = connect(config, &credential)?;
        let target = catalog::resolve(backend.indexes.as_ref(), &self.index).await?;

        if !self.yes && !confirm(&overwrite_warning(&target, batch.len())).await? {
            return Err(AppError::Cancelled);
        }

        let coordinator =
            IndexOverwriteCoordinator::new(backend.indexes.as_ref(), backend.assistants.as_ref())
                .with_poll(PollPolicy::ingestion(&config.polling))
                .with_progress(stderr_progress());
        let mut session = SessionState::new();
        let report = coordinator.overwrite(&mut session, &target.id, &batch).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        Ok(())
    }
}

pub fn print_report(report: &OverwriteReport) {
    let name = report.name.as_deref().unwrap_or("<unnamed>");
    println!(
        "Overwrote '{}': {} -> {}",
        name, report.previous_index_id, report.new_index_id
    );
    println!("  documents removed: {}", report.documents_removed);
    println!("  rows uploaded:     {}", report.rows);
    if let Some(document) = &report.uploaded_document {
        println!("  document:          {}", document);
    }
    let secs = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;
    println!("  took:              {:.1}s", secs);

    if !report.warnings.is_empty() {
        println!("Warnings:");
        for warning in &report.warnings {
            println!("- {}", warning);
        }
    }
}
