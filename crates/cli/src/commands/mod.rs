//! Command handlers for the vsctl CLI.
//!
//! This module organizes all CLI commands into separate submodules, plus
//! the helpers they share: credential resolution, backend construction,
//! confirmation prompts and Ctrl-C handling.

pub mod convert;
pub mod list;
pub mod overwrite;
pub mod query;
pub mod session;
pub mod upload;
pub mod validate;

// Re-export command types for convenience
pub use convert::ConvertCommand;
pub use list::ListCommand;
pub use overwrite::OverwriteCommand;
pub use query::QueryCommand;
pub use session::SessionCommand;
pub use upload::UploadCommand;
pub use validate::ValidateCommand;

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use vsctl_api::{
    create_backend, AssistantSpec, Backend, InMemoryBackend, IndexSummary, ProviderType,
};
use vsctl_core::{config::AppConfig, AppError, AppResult, Credential};
use vsctl_store::{ProgressEvent, ProgressReporter};

/// Rows the `memory` provider starts with, so a dry run has something to list and query.
const SANDBOX_ROWS: &[&str] = &[
    "{\"sku\":\"SB-1\",\"name\":\"Sandbox widget\",\"colour\":\"blue\"}",
    "{\"sku\":\"SB-2\",\"name\":\"Sandbox gadget\",\"colour\":\"green\"}",
];

/// Run `operation` until it finishes or the operator presses Ctrl-C.
pub async fn cancellable<T>(operation: impl Future<Output = AppResult<T>>) -> AppResult<T> {
    cancel_on(operation, tokio::signal::ctrl_c()).await
}

/// Run `operation` until it finishes or `interrupt` resolves.
///
/// Dropping the operation stops it after its last completed remote call.
pub async fn cancel_on<T, S>(
    operation: impl Future<Output = AppResult<T>>,
    interrupt: impl Future<Output = S>,
) -> AppResult<T> {
    tokio::select! {
        result = operation => result,
        _ = interrupt => {
            tracing::warn!("Interrupted; remote state is whatever the last completed step left");
            Err(AppError::Cancelled)
        }
    }
}

/// Credential from `--api-key`/`OPENAI_API_KEY`, or prompted for.
pub async fn resolve_credential(api_key: Option<&str>) -> AppResult<Credential> {
    match api_key {
        Some(secret) => Credential::new(secret),
        None => Credential::new(prompt_line("OpenAI API key: ").await?),
    }
}

/// Backend for the configured provider.
///
/// The `memory` provider gets a sandbox seeded with one index.
pub fn connect(config: &AppConfig, credential: &Credential) -> AppResult<Backend> {
    if ProviderType::parse(&config.provider) == Some(ProviderType::Memory) {
        tracing::warn!("Using in-memory sandbox; nothing is sent to a vendor");
        let sandbox = InMemoryBackend::new().connect(credential);
        sandbox.seed_index("sandbox", SANDBOX_ROWS);
        return Ok(Backend::from_binding(sandbox));
    }
    create_backend(&config.provider, Some(&config.endpoint), credential)
}

pub fn assistant_spec(config: &AppConfig) -> AssistantSpec {
    AssistantSpec::new(
        &config.assistant.name,
        &config.assistant.instructions,
        &config.assistant.model,
    )
}

/// Progress lines on stderr.
pub fn stderr_progress() -> ProgressReporter {
    ProgressReporter::new(Arc::new(|event: ProgressEvent| {
        eprintln!("{}", event.format_simple());
    }))
}

/// Print indexes as an aligned table.
pub fn print_indexes(indexes: &[IndexSummary]) {
    if indexes.is_empty() {
        println!("No indexes found");
        return;
    }

    let width = indexes
        .iter()
        .map(|index| index.display_name().len())
        .max()
        .unwrap_or(0)
        .max(4);
    println!("{:<width$}  {:<32}  DOCUMENTS", "NAME", "ID", width = width);
    for index in indexes {
        println!(
            "{:<width$}  {:<32}  {}",
            index.display_name(),
            index.id,
            index.document_count,
            width = width
        );
    }
}

/// Question for the destructive overwrite.
pub fn overwrite_warning(index: &IndexSummary, rows: usize) -> String {
    format!(
        "This deletes every document in '{}' ({}) and the index itself, \
         then recreates it with {} rows. Continue? [y/N] ",
        index.display_name(),
        index.id,
        rows
    )
}

/// Whether an answer to a yes/no question is a yes.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Ask a yes/no question on stderr and read the answer from stdin.
pub async fn confirm(question: &str) -> AppResult<bool> {
    Ok(is_yes(&prompt_line(question).await?))
}

async fn prompt_line(prompt: &str) -> AppResult<String> {
    eprint!("{}", prompt);
    std::io::stderr().flush()?;

    read_detached(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    })
    .await
}

/// Run a blocking read on its own thread.
///
/// The thread is not part of the runtime, so dropping the returned future
/// (on Ctrl-C) neither waits for the read nor holds up shutdown.
async fn read_detached<F>(read: F) -> AppResult<String>
where
    F: FnOnce() -> std::io::Result<String> + Send + 'static,
{
    let (sender, receiver) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let _ = sender.send(read());
    });

    let line = receiver
        .await
        .map_err(|_| AppError::Other("input reader stopped".to_string()))??;
    Ok(line)
}
