pub mod client;
pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use client::GateClient;

#[derive(Parser)]
#[command(name = "gatectl")]
#[command(about = "gatectl - submit, review and decide database operations held by the approval gate")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, env = "GATE_URL", default_value = "http://localhost:8000", help = "Gateway base URL")]
    pub server: String,

    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Ask a question in natural language against a target database")]
    Ask {
        #[arg(help = "Natural language request")]
        text: String,
        #[arg(long, short = 'd', help = "Target database (see `gatectl databases`)")]
        database: String,
    },

    #[command(about = "Submit an explicit operation (READ, CREATE, UPDATE, DELETE)")]
    Submit {
        #[arg(help = "Operation kind")]
        kind: String,
        #[arg(help = "SQL statement")]
        statement: String,
        #[arg(long, short = 'd', help = "Target database")]
        database: String,
        #[arg(long, help = "Positional parameters as a JSON array, e.g. '[42]'")]
        params: Option<String>,
        #[arg(long, help = "Natural language text the statement came from")]
        source: Option<String>,
    },

    #[command(about = "Inspect operations held for approval")]
    Pending {
        #[command(subcommand)]
        cmd: commands::pending::PendingCommands,
    },

    #[command(about = "Approve and execute a pending operation")]
    Approve {
        #[arg(help = "Pending operation id")]
        id: String,
    },

    #[command(about = "Reject a pending operation")]
    Reject {
        #[arg(help = "Pending operation id")]
        id: String,
    },

    #[command(about = "Audit history of submissions and decisions")]
    History {
        #[command(subcommand)]
        cmd: commands::history::HistoryCommands,
    },

    #[command(about = "Operation counts by status, kind and database")]
    Stats,

    #[command(about = "List configured target databases, or describe one")]
    Databases {
        /// Logical database name; shows its tables and row counts
        name: Option<String>,
    },

    #[command(about = "Check that the gateway is up")]
    Health,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let client = GateClient::new(&cli.server)?;

    match cli.command {
        Commands::Ask { text, database } => commands::query::ask(&client, &text, &database, output_format).await,
        Commands::Submit {
            kind,
            statement,
            database,
            params,
            source,
        } => {
            let request = commands::query::SubmitArgs {
                kind,
                statement,
                database,
                params,
                source,
            };
            commands::query::submit(&client, request, output_format).await
        }
        Commands::Pending { cmd } => commands::pending::handle(&client, cmd, output_format).await,
        Commands::Approve { id } => commands::pending::decide(&client, &id, true, output_format).await,
        Commands::Reject { id } => commands::pending::decide(&client, &id, false, output_format).await,
        Commands::History { cmd } => commands::history::handle(&client, cmd, output_format).await,
        Commands::Stats => commands::system::stats(&client, output_format).await,
        Commands::Databases { name: None } => commands::system::databases(&client, output_format).await,
        Commands::Databases { name: Some(name) } => {
            commands::system::database_info(&client, &name, output_format).await
        }
        Commands::Health => commands::system::health(&client, output_format).await,
    }
}
