//! `kbsync remote`: look at what the knowledge base holds.

use anyhow::{Context, Result};
use clap::Subcommand;
use tabled::{settings::Style, Table, Tabled};

use kbsync_client::{KnowledgeApi, KnowledgeClient};

use crate::GlobalArgs;

#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    /// List documents in the knowledge base.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct DocumentRow {
    id: String,
    collection: String,
    title: String,
}

pub fn run(command: RemoteCommand, global: &GlobalArgs) -> Result<()> {
    let config = global.load_config()?;
    let token = config.require_api_key()?;
    let client = KnowledgeClient::from_config(&config, token)
        .with_context(|| format!("invalid knowledge base URL {}", config.base_url))?;
    let runtime = kbsync_daemon::runtime()?;

    match command {
        RemoteCommand::List { json } => {
            let documents = runtime
                .block_on(client.list_documents())
                .context("failed to list remote documents")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
                return Ok(());
            }
            if documents.is_empty() {
                println!("No documents in {}.", client.base_url());
                return Ok(());
            }
            let rows: Vec<DocumentRow> = documents
                .into_iter()
                .map(|doc| DocumentRow {
                    id: doc.id.to_string(),
                    collection: doc.collection.unwrap_or_default(),
                    title: doc.title,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }
    Ok(())
}
