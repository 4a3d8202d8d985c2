use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data_value) = data {
                response["data"] = data_value;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Print `data` as JSON, or as the text produced by `render`
pub fn output_data(output_format: &OutputFormat, data: &Value, render: impl FnOnce(&Value) -> String) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
        OutputFormat::Text => println!("{}", render(data)),
    }
    Ok(())
}

/// Output an empty collection in the appropriate format
pub fn output_empty_collection(output_format: &OutputFormat, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("[]"),
        OutputFormat::Text => println!("{}", message),
    }
    Ok(())
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("-")
}

/// One-line summary of a stored operation
pub fn operation_line(op: &Value) -> String {
    format!(
        "{}  {:<8}  {:<6}  {:<10}  {}",
        str_field(op, "id"),
        str_field(op, "status"),
        str_field(op, "kind"),
        str_field(op, "target_database"),
        str_field(op, "statement"),
    )
}

/// Multi-line view of a stored operation
pub fn operation_block(op: &Value) -> String {
    let mut lines = vec![
        format!("ID:        {}", str_field(op, "id")),
        format!("Status:    {}", str_field(op, "status")),
        format!("Kind:      {}", str_field(op, "kind")),
        format!("Database:  {}", str_field(op, "target_database")),
        format!("Statement: {}", str_field(op, "statement")),
    ];
    if let Some(source) = op["natural_language_source"].as_str().filter(|s| !s.is_empty()) {
        lines.push(format!("Request:   {}", source));
    }
    lines.push(format!("Created:   {}", str_field(op, "created_at")));
    if let Some(decided) = op["decided_at"].as_str() {
        lines.push(format!("Decided:   {}", decided));
    }
    if let Some(error) = op["error"].as_str() {
        lines.push(format!("Error:     {}", error));
    }
    if !op["result"].is_null() {
        lines.push(format!("Result:    {}", op["result"]));
    }
    lines.join("\n")
}
