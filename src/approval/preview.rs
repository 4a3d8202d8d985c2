//! Human-readable preview of a pending write, rendered from the statement text.
//!
//! Nothing here touches a database: the preview is what an operator reads
//! before deciding, so it must be computable without running the statement.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::approval::descriptor::NewOperation;
use crate::types::OperationKind;

static LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("literal pattern"));

static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|JOIN|UPDATE|INSERT\s+INTO|DELETE\s+FROM)\s+("?[A-Za-z_][A-Za-z0-9_.]*"?)"#)
        .expect("table pattern")
});

static WHERE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").expect("where pattern"));

static CLAUSE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(RETURNING|ORDER\s+BY|LIMIT|GROUP\s+BY)\b").expect("clause pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Operation appears safe to approve",
            RiskLevel::Medium => "Review operation carefully before approval",
            RiskLevel::High => "Requires thorough review and confirmation",
            RiskLevel::Critical => "Do not approve without extensive review and a backup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPreview {
    pub summary: String,
    pub kind: OperationKind,
    pub target_database: String,
    pub tables: Vec<String>,
    /// WHERE condition, or `None` when every row is in scope
    pub filter: Option<String>,
    pub affects_all_rows: bool,
    pub risk: RiskAssessment,
}

/// Render the preview for `op`. `sensitive_databases` raise the floor of the risk rating.
pub fn preview(op: &NewOperation, sensitive_databases: &[String]) -> OperationPreview {
    let tables = affected_tables(&op.statement);
    let filter = where_clause(&op.statement);
    let affects_all_rows = filter.is_none() && op.kind != OperationKind::Create;
    let risk = assess_risk(op.kind, &op.target_database, filter.is_some(), sensitive_databases);

    let target = match tables.first() {
        Some(table) => format!("{}.{}", op.target_database, table),
        None => op.target_database.clone(),
    };
    let scope = match (&filter, op.kind) {
        (_, OperationKind::Create) => "inserting new rows".to_string(),
        (Some(condition), _) => format!("rows where {}", condition),
        (None, _) => "ALL rows".to_string(),
    };

    OperationPreview {
        summary: format!("{} on {} ({})", op.kind, target, scope),
        kind: op.kind,
        target_database: op.target_database.clone(),
        tables,
        filter,
        affects_all_rows,
        risk,
    }
}

pub fn assess_risk(
    kind: OperationKind,
    target_database: &str,
    has_filter: bool,
    sensitive_databases: &[String],
) -> RiskAssessment {
    let mut level = RiskLevel::Low;
    let mut factors = Vec::new();

    if kind == OperationKind::Delete {
        level = RiskLevel::High;
        factors.push("DELETE operation - data will be permanently removed".to_string());
    }

    if !has_filter && matches!(kind, OperationKind::Update | OperationKind::Delete) {
        level = RiskLevel::Critical;
        factors.push("No WHERE clause - affects all rows".to_string());
    }

    if sensitive_databases.iter().any(|db| db == target_database) {
        factors.push(format!("{} holds sensitive data", target_database));
        level = level.max(RiskLevel::Medium);
    }

    RiskAssessment {
        level,
        factors,
        recommendation: level.recommendation().to_string(),
    }
}

/// Tables named after FROM / JOIN / UPDATE / INSERT INTO / DELETE FROM, first occurrence order
pub fn affected_tables(statement: &str) -> Vec<String> {
    let masked = mask_literals(statement);
    let mut tables: Vec<String> = Vec::new();

    for caps in TABLE_REF.captures_iter(&masked) {
        let name = caps[1].trim_matches('"').to_string();
        if !tables.contains(&name) {
            tables.push(name);
        }
    }

    tables
}

/// Text of the top-level WHERE condition, taken from the original statement.
/// A WHERE inside a subquery does not filter the rows the statement touches.
pub fn where_clause(statement: &str) -> Option<String> {
    let masked = mask_literals(statement);
    let depth = paren_depths(&masked);

    let start = WHERE.find_iter(&masked).find(|m| depth[m.start()] == 0)?.end();
    let end = CLAUSE_END
        .find_iter(&masked[start..])
        .map(|m| m.start() + start)
        .find(|at| depth[*at] == 0)
        .unwrap_or(masked.len());

    let condition = statement[start..end].trim().trim_end_matches(';').trim();
    (!condition.is_empty()).then(|| condition.to_string())
}

/// Parenthesis nesting depth before each byte of `masked`
fn paren_depths(masked: &str) -> Vec<usize> {
    let mut depths = Vec::with_capacity(masked.len() + 1);
    let mut depth = 0usize;
    for byte in masked.bytes() {
        depths.push(depth);
        match byte {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depths.push(depth);
    depths
}

/// Same-length copy of `statement` with literal contents blanked, so keyword
/// offsets found in it are valid in the original.
fn mask_literals(statement: &str) -> String {
    let mut masked = String::with_capacity(statement.len());
    let mut last = 0;

    for m in LITERAL.find_iter(statement) {
        masked.push_str(&statement[last..m.start()]);
        masked.push('\'');
        masked.push_str(&"x".repeat(m.len() - 2));
        masked.push('\'');
        last = m.end();
    }
    masked.push_str(&statement[last..]);

    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensitive() -> Vec<String> {
        vec!["finance".to_string()]
    }

    #[test]
    fn delete_with_filter_is_high() {
        let op = NewOperation::new(OperationKind::Delete, "hr", "DELETE FROM employees WHERE id=42");
        let p = preview(&op, &sensitive());
        assert_eq!(p.tables, vec!["employees"]);
        assert_eq!(p.filter.as_deref(), Some("id=42"));
        assert!(!p.affects_all_rows);
        assert_eq!(p.risk.level, RiskLevel::High);
        assert_eq!(p.summary, "DELETE on hr.employees (rows where id=42)");
    }

    #[test]
    fn unfiltered_update_is_critical() {
        let op = NewOperation::new(OperationKind::Update, "hr", "UPDATE employees SET salary = salary * 2;");
        let p = preview(&op, &sensitive());
        assert!(p.affects_all_rows);
        assert_eq!(p.risk.level, RiskLevel::Critical);
        assert!(p.summary.contains("ALL rows"));
    }

    #[test]
    fn sensitive_database_raises_floor() {
        let op = NewOperation::new(
            OperationKind::Create,
            "finance",
            "INSERT INTO transactions (amount) VALUES (10)",
        );
        let p = preview(&op, &sensitive());
        assert_eq!(p.risk.level, RiskLevel::Medium);
        assert!(!p.affects_all_rows);
        assert_eq!(p.tables, vec!["transactions"]);
    }

    #[test]
    fn literals_do_not_confuse_extraction() {
        let stmt = "UPDATE notes SET body = 'see where from here' WHERE id = 7 RETURNING id";
        assert_eq!(where_clause(stmt).as_deref(), Some("id = 7"));
        assert_eq!(affected_tables(stmt), vec!["notes"]);
    }

    #[test]
    fn joins_are_listed_once() {
        let stmt = "SELECT * FROM employees e JOIN departments d ON e.department = d.name JOIN employees m ON e.manager_id = m.emp_id";
        assert_eq!(affected_tables(stmt), vec!["employees", "departments"]);
    }

    #[test]
    fn subquery_filter_does_not_limit_the_update() {
        let stmt = "UPDATE t SET a = (SELECT max(x) FROM u WHERE u.id = t.id)";
        assert_eq!(where_clause(stmt), None);

        let p = preview(&NewOperation::new(OperationKind::Update, "hr", stmt), &sensitive());
        assert!(p.affects_all_rows);
        assert_eq!(p.risk.level, RiskLevel::Critical);
    }

    #[test]
    fn top_level_filter_after_subquery_is_found() {
        let stmt = "UPDATE t SET a = (SELECT max(x) FROM u WHERE u.id = t.id LIMIT 1) WHERE t.id IN (SELECT id FROM v ORDER BY id) RETURNING a";
        assert_eq!(
            where_clause(stmt).as_deref(),
            Some("t.id IN (SELECT id FROM v ORDER BY id)")
        );
    }
}
