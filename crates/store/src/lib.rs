//! Operator-side logic for hosted retrieval indexes.
//!
//! Everything here talks to the vendor through the `vsctl-api` traits:
//! - `catalog`: list indexes, resolve them by id or name
//! - `ingest`: spreadsheet rows to a line-delimited JSON batch
//! - `coordinator`: the destructive index-overwrite protocol
//! - `query`: one question through the managed conversational flow
//! - `credential`: side-effect-free credential probe

pub mod catalog;
pub mod coordinator;
pub mod credential;
pub mod ingest;
pub mod poll;
pub mod progress;
pub mod query;
pub mod session;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use coordinator::{IndexOverwriteCoordinator, OverwriteReport, OverwriteWarning, UploadReport};
pub use credential::{Connector, CredentialCheck, CredentialValidator};
pub use ingest::ContentBatch;
pub use poll::PollPolicy;
pub use progress::{OverwritePhase, ProgressCallback, ProgressEvent, ProgressReporter};
pub use query::QueryRunner;
pub use session::SessionState;
