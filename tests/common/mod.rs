#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use sql_approval_gate::approval::{ApprovalGateway, MemoryHistory, MemoryPendingStore, NewOperation};
use sql_approval_gate::config::AppConfig;
use sql_approval_gate::database::{Catalog, ColumnInfo, ExecutionError, Executor};
use sql_approval_gate::server;
use sql_approval_gate::state::AppState;
use sql_approval_gate::translator::{TranslateError, Translator};
use sql_approval_gate::types::OperationKind;

/// Stand-in for the `hr` database: an employees table keyed by id.
/// Statements touching `locked_table` fail the way a constraint violation would.
pub struct FakeHrExecutor {
    employees: Mutex<BTreeMap<i64, String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeHrExecutor {
    pub fn new() -> Self {
        let employees = [(41, "Ada"), (42, "Grace"), (43, "Linus")]
            .into_iter()
            .map(|(id, name)| (id, name.to_string()))
            .collect();
        Self {
            employees: Mutex::new(employees),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_employee(&self, id: i64) -> bool {
        self.employees.lock().unwrap().contains_key(&id)
    }

    fn target_id(statement: &str) -> Option<i64> {
        let (_, tail) = statement.rsplit_once("id =")?;
        tail.trim().trim_end_matches(';').trim().parse().ok()
    }
}

#[async_trait]
impl Executor for FakeHrExecutor {
    async fn apply(&self, op: &NewOperation) -> Result<Value, ExecutionError> {
        self.calls.lock().unwrap().push(op.statement.clone());

        if op.statement.contains("locked_table") {
            return Err(ExecutionError::Statement(
                "permission denied for table locked_table".into(),
            ));
        }

        let mut employees = self.employees.lock().unwrap();
        let id = Self::target_id(&op.statement);

        match op.kind {
            OperationKind::Read => {
                let rows: Vec<Value> = employees
                    .iter()
                    .filter(|(emp_id, _)| id.map_or(true, |id| **emp_id == id))
                    .map(|(emp_id, name)| json!({ "id": emp_id, "name": name }))
                    .collect();
                Ok(json!({ "row_count": rows.len(), "rows": rows }))
            }
            OperationKind::Delete => {
                let removed = id.and_then(|id| employees.remove(&id)).is_some();
                Ok(json!({ "rows_affected": removed as u64 }))
            }
            OperationKind::Update => {
                let hit = id.is_some_and(|id| employees.contains_key(&id));
                Ok(json!({ "rows_affected": hit as u64 }))
            }
            OperationKind::Create => {
                let next = employees.keys().max().copied().unwrap_or(0) + 1;
                employees.insert(next, "New Hire".to_string());
                Ok(json!({ "rows_affected": 1 }))
            }
        }
    }
}

/// Only `hr` has tables; the other targets are empty databases
#[async_trait]
impl Catalog for FakeHrExecutor {
    async fn columns(&self, target: &str) -> Result<Vec<ColumnInfo>, ExecutionError> {
        if target != "hr" {
            return Ok(Vec::new());
        }
        Ok([("id", "integer"), ("name", "text")]
            .into_iter()
            .map(|(column, data_type)| ColumnInfo {
                table: "employees".to_string(),
                column: column.to_string(),
                data_type: data_type.to_string(),
            })
            .collect())
    }

    async fn row_count(&self, _target: &str, table: &str) -> Result<i64, ExecutionError> {
        match table {
            "employees" => Ok(self.employees.lock().unwrap().len() as i64),
            other => Err(ExecutionError::Statement(format!("relation \"{}\" does not exist", other))),
        }
    }
}

/// Translator with canned answers keyed by the request text
pub struct ScriptedTranslator {
    answers: BTreeMap<&'static str, (OperationKind, &'static str)>,
}

impl ScriptedTranslator {
    pub fn new() -> Self {
        let mut answers = BTreeMap::new();
        answers.insert(
            "Delete employee with ID 42",
            (OperationKind::Delete, "DELETE FROM employees WHERE id = 42"),
        );
        answers.insert("List all employees", (OperationKind::Read, "SELECT id, name FROM employees"));
        answers.insert(
            "Give everyone a raise",
            (OperationKind::Update, "UPDATE employees SET salary = salary * 1.1"),
        );
        answers.insert("Drop the employees table", (OperationKind::Delete, "DROP TABLE employees"));
        Self { answers }
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn translate(&self, text: &str, target_database: &str) -> Result<NewOperation, TranslateError> {
        let (kind, sql) = self
            .answers
            .get(text)
            .ok_or_else(|| TranslateError::Unintelligible(format!("no script for '{}'", text)))?;
        Ok(NewOperation::new(*kind, target_database, *sql).with_source(text))
    }
}

/// Gateway over in-memory state and the fake `hr` executor, without HTTP
pub fn gateway() -> (Arc<ApprovalGateway>, Arc<FakeHrExecutor>) {
    let config = AppConfig::defaults();
    let executor = Arc::new(FakeHrExecutor::new());
    let gateway = ApprovalGateway::new(
        Arc::new(MemoryPendingStore::new()),
        executor.clone(),
        Arc::new(MemoryHistory::new(config.gateway.history_limit)),
        &config.gateway,
    );
    (Arc::new(gateway), executor)
}

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
    pub executor: Arc<FakeHrExecutor>,
    pub gateway: Arc<ApprovalGateway>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Fresh in-process server with in-memory state on an unused port
    pub async fn start() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = AppConfig::defaults();
        let (gateway, executor) = gateway();
        let state = AppState::new(gateway.clone(), Arc::new(ScriptedTranslator::new()), config)
            .with_catalog(executor.clone());

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test port")?;
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server::serve(listener, state, async move {
            let _ = rx.await;
        }));

        let server = Self {
            port,
            base_url,
            client: reqwest::Client::new(),
            executor,
            gateway,
            shutdown: Some(tx),
        };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Result<(StatusCode, Value)> {
        let res = self.client.get(self.url(path)).send().await?;
        Ok((res.status(), res.json().await?))
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        let res = self.client.post(self.url(path)).json(&body).send().await?;
        Ok((res.status(), res.json().await?))
    }

    /// POST a body verbatim as `application/json`, well-formed or not
    pub async fn post_raw(&self, path: &str, body: &str) -> Result<(StatusCode, Value)> {
        let res = self
            .client
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await?;
        Ok((res.status(), res.json().await?))
    }

    pub async fn delete(&self, path: &str) -> Result<(StatusCode, Value)> {
        let res = self.client.delete(self.url(path)).send().await?;
        Ok((res.status(), res.json().await?))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn assert_success(body: &Value) {
    assert!(
        body.get("success").and_then(|v| v.as_bool()).unwrap_or(false),
        "success flag false or missing: {}",
        body
    );
}

pub fn assert_error(body: &Value, code: &str) {
    assert_eq!(body["error"], json!(true), "expected error body: {}", body);
    assert_eq!(body["code"], json!(code), "unexpected error code: {}", body);
}
