use serde_json::Value;

use crate::cli::client::GateClient;
use crate::cli::utils::{output_data, str_field};
use crate::cli::OutputFormat;

pub async fn stats(client: &GateClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let data = client.get("/stats").await?;
    output_data(&output_format, &data, |stats| {
        let mut out = format!("Total operations: {}", stats["total_operations"]);
        for section in ["by_status", "by_kind", "by_database"] {
            out.push_str(&format!("\n{}:", section.trim_start_matches("by_")));
            if let Some(counts) = stats[section].as_object() {
                for (name, count) in counts {
                    out.push_str(&format!("\n  {:<12} {}", name, count));
                }
            }
        }
        out
    })
}

pub async fn databases(client: &GateClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let data = client.get("/databases").await?;
    output_data(&output_format, &data, |targets| {
        targets
            .as_array()
            .into_iter()
            .flatten()
            .map(|t| {
                let marker = if t["sensitive"] == Value::Bool(true) { " (sensitive)" } else { "" };
                format!("{} -> {}{}", str_field(t, "name"), str_field(t, "database"), marker)
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub async fn database_info(client: &GateClient, name: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let data = client.get(&format!("/databases/{}/info", name)).await?;
    output_data(&output_format, &data, render_database_info)
}

fn render_database_info(info: &Value) -> String {
    let mut out = format!(
        "{}: {} tables, {} records",
        str_field(info, "database"),
        info["total_tables"],
        info["total_records"]
    );
    for table in info["tables"].as_array().into_iter().flatten() {
        let name = table.as_str().unwrap_or_default();
        let columns = info["schema"][name]
            .as_array()
            .into_iter()
            .flatten()
            .map(|c| format!("{} {}", str_field(c, "name"), str_field(c, "data_type")))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("\n  {:<20} {:>8} rows  ({})", name, info["table_stats"][name].to_string(), columns));
    }
    out
}

pub async fn health(client: &GateClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let (status, body) = client.health().await?;
    output_data(&output_format, &body, |body| {
        let data = &body["data"];
        format!(
            "{} (HTTP {}), store: {}",
            str_field(data, "status"),
            status.as_u16(),
            str_field(data, "store")
        )
    })?;

    if !status.is_success() {
        anyhow::bail!("gateway is degraded");
    }
    Ok(())
}
