use clap::Subcommand;
use serde_json::Value;

use crate::cli::client::GateClient;
use crate::cli::utils::{output_data, output_empty_collection, output_success, str_field};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum HistoryCommands {
    #[command(about = "Show the audit history, oldest first")]
    Show,

    #[command(about = "Clear the audit history")]
    Clear,
}

pub async fn handle(client: &GateClient, cmd: HistoryCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        HistoryCommands::Show => {
            let data = client.get("/history").await?;
            if data.as_array().map_or(true, |entries| entries.is_empty()) {
                return output_empty_collection(&output_format, "History is empty");
            }
            output_data(&output_format, &data, |entries| {
                entries
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(history_line)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        HistoryCommands::Clear => {
            let data = client.delete("/history").await?;
            let message = format!("Cleared {} history entries", data["cleared"].as_u64().unwrap_or(0));
            output_success(&output_format, &message, Some(data))
        }
    }
}

fn history_line(entry: &Value) -> String {
    format!(
        "{}  {:<6}  {:<23}  {:<10}  {}",
        str_field(entry, "recorded_at"),
        str_field(entry, "action"),
        str_field(entry, "outcome"),
        str_field(entry, "target_database"),
        str_field(entry, "statement"),
    )
}
