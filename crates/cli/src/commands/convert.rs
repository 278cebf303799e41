//! Convert command handler.
//!
//! Shows exactly what an overwrite would upload, without contacting the vendor.

use clap::Args;
use std::path::PathBuf;
use vsctl_core::AppResult;
use vsctl_store::ContentBatch;

/// Print the JSON-lines payload of a spreadsheet
#[derive(Args, Debug)]
pub struct ConvertCommand {
    /// Spreadsheet to convert (.xlsx, .xls, .xlsb, .ods)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Write the payload to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ConvertCommand {
    pub fn execute(&self) -> AppResult<()> {
        tracing::info!("Executing convert command for {:?}", self.file);

        let batch = ContentBatch::from_spreadsheet(&self.file)?;
        let payload = batch.to_json_lines()?;

        match &self.output {
            Some(path) => {
                std::fs::write(path, &payload)?;
                eprintln!("Wrote {} rows to {}", batch.len(), path.display());
            }
            None => print!("{}", payload),
        }

        Ok(())
    }
}
