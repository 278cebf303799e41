//! Interactive session.
//!
//! Keeps one `SessionState` for the whole loop, so the assistant created by
//! the first question is reused by every later one and follows the selected
//! index through overwrites. Ctrl-C cancels the running command only.

use super::overwrite::print_report;
use super::{
    assistant_spec, connect, is_yes, overwrite_warning, print_indexes, resolve_credential,
    stderr_progress,
};
use clap::Args;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use vsctl_api::Backend;
use vsctl_core::{config::AppConfig, AppError, AppResult};
use vsctl_store::{
    catalog, ContentBatch, CredentialValidator, IndexOverwriteCoordinator, PollPolicy,
    QueryRunner, SessionState,
};

const HELP: &str = "\
Commands:
  list               list indexes
  use <id|name>      select an index
  ask <question>     ask the selected index
  overwrite <file>   replace the selected index's contents with a spreadsheet
  upload <file>      add a spreadsheet to the selected index
  status             show the selection and cached assistant
  help               show this help
  quit               leave the session";

/// Interactive session with a cached assistant
#[derive(Args, Debug)]
pub struct SessionCommand {
    /// Index id or name to select at start
    #[arg(short, long)]
    pub index: Option<String>,
}

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    List,
    Use(&'a str),
    Ask(&'a str),
    Overwrite(&'a str),
    Upload(&'a str),
    Status,
    Help,
    Quit,
    Empty,
    Unknown(&'a str),
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match (command.to_lowercase().as_str(), rest) {
            ("", _) => Self::Empty,
            ("list" | "ls", _) => Self::List,
            ("use" | "select", arg) if !arg.is_empty() => Self::Use(arg),
            ("ask" | "query", arg) if !arg.is_empty() => Self::Ask(arg),
            ("overwrite", arg) if !arg.is_empty() => Self::Overwrite(arg),
            ("upload", arg) if !arg.is_empty() => Self::Upload(arg),
            ("status", _) => Self::Status,
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit" | "q", _) => Self::Quit,
            _ => Self::Unknown(line),
        }
    }
}

struct Repl<'a> {
    config: &'a AppConfig,
    backend: Backend,
    session: SessionState,
    input: Lines<BufReader<Stdin>>,
}

impl SessionCommand {
    pub async fn execute(&self, config: &AppConfig, api_key: Option<&str>) -> AppResult<()> {
        tracing::info!("Starting interactive session");

        let credential = resolve_credential(api_key).await?;
        let validator = CredentialValidator::for_provider(&config.provider, Some(&config.endpoint));
        let check = validator.check(&credential).await;
        if !check.valid {
            return Err(AppError::InvalidCredential(
                check.diagnostic.unwrap_or_else(|| "rejected".to_string()),
            ));
        }
        eprintln!("Credential {} accepted. Type 'help' for commands.", credential.hint());

        let mut repl = Repl {
            config,
            backend: connect(config, &credential)?,
            session: SessionState::new(),
            input: BufReader::new(tokio::io::stdin()).lines(),
        };

        if let Some(reference) = &self.index {
            repl.select(reference).await?;
        }

        repl.run().await
    }
}

impl Repl<'_> {
    async fn run(&mut self) -> AppResult<()> {
        loop {
            let line = tokio::select! {
                line = self.read_line("vsctl> ") => line?,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\n(type 'quit' to leave)");
                    continue;
                }
            };

            // end of input
            let Some(line) = line else {
                return Ok(());
            };

            let input = Input::parse(&line);
            if input == Input::Quit {
                return Ok(());
            }

            let result = tokio::select! {
                result = self.dispatch(input) => result,
                _ = tokio::signal::ctrl_c() => Err(AppError::Cancelled),
            };

            match result {
                Ok(()) => {}
                Err(AppError::Cancelled) => eprintln!("Cancelled"),
                Err(e) => {
                    tracing::debug!("Session command failed: {}", e);
                    eprintln!("Error: {}", e);
                }
            }
        }
    }

    async fn dispatch(&mut self, input: Input<'_>) -> AppResult<()> {
        match input {
            Input::List => {
                let indexes = catalog::list(self.backend.indexes.as_ref()).await?;
                print_indexes(&indexes);
            }
            Input::Use(reference) => self.select(reference).await?,
            Input::Ask(question) => {
                let index_id = self.selected()?;
                let runner =
                    QueryRunner::new(self.backend.assistants.as_ref(), assistant_spec(self.config))
                        .with_poll(PollPolicy::query(&self.config.polling));
                let answer = runner.query(&mut self.session, &index_id, question).await?;
                println!("{}", answer);
            }
            Input::Overwrite(file) => self.overwrite(Path::new(file)).await?,
            Input::Upload(file) => {
                let index_id = self.selected()?;
                let batch = ContentBatch::from_spreadsheet(Path::new(file))?;
                let report = coordinator(&self.backend, self.config)
                    .upload(&index_id, &batch)
                    .await?;
                println!("Uploaded {} rows into {}", report.rows, report.index_id);
            }
            Input::Status => self.status(),
            Input::Help => println!("{}", HELP),
            Input::Quit | Input::Empty => {}
            Input::Unknown(line) => eprintln!("Unknown command: {} (try 'help')", line),
        }
        Ok(())
    }

    async fn select(&mut self, reference: &str) -> AppResult<()> {
        let index = catalog::resolve(self.backend.indexes.as_ref(), reference).await?;
        println!(
            "Selected '{}' ({}, {} documents)",
            index.display_name(),
            index.id,
            index.document_count
        );
        self.session.select(index.id);
        Ok(())
    }

    async fn overwrite(&mut self, file: &Path) -> AppResult<()> {
        let index_id = self.selected()?;
        let batch = ContentBatch::from_spreadsheet(file)?;
        let target = catalog::resolve_id(self.backend.indexes.as_ref(), &index_id).await?;

        let answer = self.read_line(&overwrite_warning(&target, batch.len())).await?;
        if !answer.as_deref().is_some_and(is_yes) {
            eprintln!("Overwrite skipped");
            return Ok(());
        }

        let report = coordinator(&self.backend, self.config)
            .overwrite(&mut self.session, &index_id, &batch)
            .await?;
        print_report(&report);
        Ok(())
    }

    fn status(&self) {
        println!("provider:  {}", self.backend.provider_name());
        println!(
            "index:     {}",
            self.session.selected_index().unwrap_or("<none>")
        );
        match self.session.assistant() {
            Some(handle) => println!(
                "assistant: {} (searching {})",
                handle.assistant_id, handle.index_id
            ),
            None => println!("assistant: <not created yet>"),
        }
    }

    fn selected(&self) -> AppResult<String> {
        self.session
            .selected_index()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Config("No index selected; run 'use <id|name>' first".to_string())
            })
    }

    async fn read_line(&mut self, prompt: &str) -> AppResult<Option<String>> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(prompt.as_bytes()).await?;
        stderr.flush().await?;
        Ok(self.input.next_line().await?)
    }
}

fn coordinator<'b>(backend: &'b Backend, config: &AppConfig) -> IndexOverwriteCoordinator<'b> {
    IndexOverwriteCoordinator::new(backend.indexes.as_ref(), backend.assistants.as_ref())
        .with_poll(PollPolicy::ingestion(&config.polling))
        .with_progress(stderr_progress())
}
