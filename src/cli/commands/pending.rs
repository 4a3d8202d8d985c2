use clap::Subcommand;
use serde_json::Value;

use crate::cli::client::GateClient;
use crate::cli::utils::{operation_block, operation_line, output_data, output_empty_collection, output_success, str_field};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum PendingCommands {
    #[command(about = "List stored operations")]
    List {
        #[arg(long, short = 's', help = "Status filter: PENDING, APPROVED, REJECTED, EXECUTED, FAILED or all")]
        status: Option<String>,
    },

    #[command(about = "Show one stored operation")]
    Show {
        #[arg(help = "Operation id")]
        id: String,
    },

    #[command(about = "Show an operation with its preview and risk assessment")]
    Details {
        #[arg(help = "Operation id")]
        id: String,
    },
}

pub async fn handle(client: &GateClient, cmd: PendingCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        PendingCommands::List { status } => {
            let path = match status {
                Some(s) => format!("/pending?status={}", s),
                None => "/pending".to_string(),
            };
            let data = client.get(&path).await?;
            if data.as_array().map_or(true, |ops| ops.is_empty()) {
                return output_empty_collection(&output_format, "No operations found");
            }
            output_data(&output_format, &data, |ops| {
                ops.as_array()
                    .into_iter()
                    .flatten()
                    .map(operation_line)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        PendingCommands::Show { id } => {
            let data = client.get(&format!("/pending/{}", id)).await?;
            output_data(&output_format, &data, operation_block)
        }
        PendingCommands::Details { id } => {
            let data = client.get(&format!("/pending/{}/details", id)).await?;
            output_data(&output_format, &data, render_details)
        }
    }
}

pub async fn decide(client: &GateClient, id: &str, approve: bool, output_format: OutputFormat) -> anyhow::Result<()> {
    let body = serde_json::json!({ "approve": approve });
    let data = client.post(&format!("/pending/{}/decision", id), &body).await?;

    let message = format!("Operation {} {}", id, str_field(&data, "status"));
    output_success(&output_format, &message, Some(data))
}

fn render_details(data: &Value) -> String {
    let preview = &data["preview"];
    let risk = &preview["risk"];

    let mut out = operation_block(&data["operation"]);
    out.push_str(&format!("\n\nPreview:   {}", str_field(preview, "summary")));
    out.push_str(&format!("\nRisk:      {} - {}", str_field(risk, "level"), str_field(risk, "recommendation")));
    for factor in risk["factors"].as_array().into_iter().flatten() {
        out.push_str(&format!("\n  - {}", factor.as_str().unwrap_or_default()));
    }
    out
}
