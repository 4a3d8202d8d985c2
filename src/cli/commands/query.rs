use anyhow::Context;
use serde_json::{json, Value};

use crate::cli::client::GateClient;
use crate::cli::utils::{output_data, str_field};
use crate::cli::OutputFormat;

pub struct SubmitArgs {
    pub kind: String,
    pub statement: String,
    pub database: String,
    pub params: Option<String>,
    pub source: Option<String>,
}

pub async fn ask(client: &GateClient, text: &str, database: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let data = client
        .post("/nl-query", &json!({ "text": text, "target_db": database }))
        .await?;
    output_data(&output_format, &data, render_submission)
}

pub async fn submit(client: &GateClient, args: SubmitArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let params: Vec<Value> = match args.params.as_deref() {
        Some(raw) => serde_json::from_str(raw).context("--params must be a JSON array")?,
        None => Vec::new(),
    };

    let mut body = json!({
        "kind": args.kind,
        "target_database": args.database,
        "statement": args.statement,
        "params": params,
    });
    if let Some(source) = args.source {
        body["natural_language_source"] = json!(source);
    }

    let data = client.post("/operations", &body).await?;
    output_data(&output_format, &data, render_submission)
}

fn render_submission(data: &Value) -> String {
    let statement = str_field(&data["operation"], "statement");

    match data["execution_status"].as_str() {
        Some("requires_human_approval") => {
            let preview = &data["preview"];
            format!(
                "Held for approval: {}\n  {}\n  {}\n  Risk: {} - {}\nApprove with: gatectl approve {}",
                str_field(data, "pending_id"),
                statement,
                str_field(preview, "summary"),
                str_field(&preview["risk"], "level"),
                str_field(&preview["risk"], "recommendation"),
                str_field(data, "pending_id"),
            )
        }
        _ => {
            let result = &data["result"];
            let mut out = format!("{}\n", statement);
            match result["rows"].as_array() {
                Some(rows) if !rows.is_empty() => {
                    for row in rows {
                        out.push_str(&format!("{}\n", row));
                    }
                    out.push_str(&format!("({} rows)", result["row_count"].as_u64().unwrap_or(rows.len() as u64)));
                }
                _ => out.push_str("(no rows)"),
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_submission_points_at_approve_command() {
        let text = render_submission(&json!({
            "execution_status": "requires_human_approval",
            "pending_id": "b6b1",
            "operation": { "statement": "DELETE FROM employees WHERE id = 42" },
            "preview": { "summary": "DELETE on hr.employees", "risk": { "level": "HIGH", "recommendation": "review" } }
        }));
        assert!(text.contains("gatectl approve b6b1"));
        assert!(text.contains("Risk: HIGH"));
    }

    #[test]
    fn executed_read_lists_rows() {
        let text = render_submission(&json!({
            "execution_status": "executed",
            "operation": { "statement": "SELECT name FROM employees" },
            "result": { "row_count": 2, "rows": [{ "name": "a" }, { "name": "b" }] }
        }));
        assert!(text.ends_with("(2 rows)"));
    }
}
