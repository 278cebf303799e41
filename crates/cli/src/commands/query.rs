//! Query command handler.
//!
//! Runs one question through the assistant flow against one index.

use super::{assistant_spec, connect, resolve_credential};
use clap::Args;
use vsctl_core::{config::AppConfig, AppResult};
use vsctl_store::{catalog, PollPolicy, QueryRunner, SessionState};

/// Ask a question against one index
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Index id or name
    #[arg(short, long)]
    pub index: String,

    /// The question to ask
    pub question: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl QueryCommand {
    pub async fn execute(&self, config: &AppConfig, api_key: Option<&str>) -> AppResult<()> {
        tracing::info!("Executing query command against '{}'", self.index);

        let credential = resolve_credential(api_key).await?;
        let backend = connect(config, &credential)?;
        let index = catalog::resolve(backend.indexes.as_ref(), &self.index).await?;

        let runner = QueryRunner::new(backend.assistants.as_ref(), assistant_spec(config))
            .with_poll(PollPolicy::query(&config.polling));
        let mut session = SessionState::new();
        let answer = runner.query(&mut session, &index.id, &self.question).await?;

        if self.json {
            let output = serde_json::json!({
                "index": index.id,
                "name": index.name,
                "question": self.question,
                "answer": answer,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", answer);
        }

        Ok(())
    }
}
