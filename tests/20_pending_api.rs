mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

use common::{assert_error, assert_success, TestServer};

#[tokio::test]
async fn delete_request_waits_for_approval_then_executes() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = server
        .post("/nl-query", json!({ "text": "Delete employee with ID 42", "target_db": "hr" }))
        .await?;
    assert_eq!(status, StatusCode::ACCEPTED, "unexpected body: {}", body);
    assert_success(&body);

    let data = &body["data"];
    assert_eq!(data["execution_status"], "requires_human_approval");
    assert_eq!(data["operation"]["kind"], "DELETE");
    assert_eq!(data["preview"]["risk"]["level"], "HIGH");
    let id = data["pending_id"].as_str().expect("pending_id").to_string();

    // Nothing touched the database yet
    assert!(server.executor.calls().is_empty());
    assert!(server.executor.has_employee(42));

    let (status, body) = server.get("/pending?status=PENDING").await?;
    assert_eq!(status, StatusCode::OK);
    let listed = body["data"].as_array().expect("array");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());
    assert_eq!(listed[0]["natural_language_source"], "Delete employee with ID 42");

    let (status, body) = server.get(&format!("/pending/{}/details", id)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["preview"]["tables"], json!(["employees"]));
    assert_eq!(body["data"]["preview"]["filter"], "id = 42");

    let (status, body) = server
        .post(&format!("/pending/{}/decision", id), json!({ "approve": true }))
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
    assert_eq!(body["data"]["status"], "EXECUTED");
    assert_eq!(body["data"]["result"]["rows_affected"], 1);
    assert!(!server.executor.has_employee(42));

    let (status, body) = server
        .post(&format!("/pending/{}/decision", id), json!({ "approve": true }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_error(&body, "ALREADY_RESOLVED");
    assert_eq!(server.executor.calls().len(), 1);

    Ok(())
}

#[tokio::test]
async fn read_request_returns_rows_without_approval() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = server
        .post("/nl-query", json!({ "text": "List all employees", "target_db": "hr" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_success(&body);
    assert_eq!(body["data"]["execution_status"], "executed");
    assert_eq!(body["data"]["result"]["row_count"], 3);

    let (_, body) = server.get("/pending").await?;
    assert_eq!(body["data"], json!([]));
    Ok(())
}

#[tokio::test]
async fn confirm_with_reject_never_executes() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = server
        .post(
            "/operations",
            json!({
                "kind": "update",
                "target_database": "hr",
                "statement": "UPDATE employees SET name = 'Grace H.' WHERE id = 42",
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::ACCEPTED, "unexpected body: {}", body);
    let id = body["data"]["pending_id"].as_str().expect("pending_id").to_string();

    let (status, body) = server
        .post("/confirm", json!({ "pending_id": id, "approve": false }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "REJECTED");
    assert!(body["data"]["result"].is_null());
    assert!(server.executor.calls().is_empty());

    let (_, body) = server.get("/pending?status=rejected").await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn failed_execution_maps_to_422_and_stays_failed() -> Result<()> {
    let server = TestServer::start().await?;

    let (_, body) = server
        .post(
            "/operations",
            json!({
                "kind": "DELETE",
                "target_database": "hr",
                "statement": "DELETE FROM locked_table WHERE id = 7",
            }),
        )
        .await?;
    let id = body["data"]["pending_id"].as_str().expect("pending_id").to_string();

    let (status, body) = server
        .post(&format!("/pending/{}/decision", id), json!({ "approve": true }))
        .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_error(&body, "EXECUTION_ERROR");
    assert_eq!(body["operation_id"], id.as_str());
    assert!(body["message"].as_str().unwrap_or_default().contains("permission denied"));

    let (_, body) = server.get(&format!("/pending/{}", id)).await?;
    assert_eq!(body["data"]["status"], "FAILED");
    assert!(body["data"]["result"].is_null());
    assert!(body["data"]["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn error_responses_use_their_own_codes() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = server.get(&format!("/pending/{}", uuid::Uuid::new_v4())).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");

    let (status, body) = server.get("/pending/not-a-uuid").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "BAD_REQUEST");

    let (status, body) = server
        .post(&format!("/pending/{}/decision", uuid::Uuid::new_v4()), json!({ "approve": true }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");

    let (status, body) = server
        .post("/nl-query", json!({ "text": "Drop the employees table", "target_db": "hr" }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");

    let (status, body) = server
        .post(
            "/operations",
            json!({ "kind": "MERGE", "target_database": "hr", "statement": "MERGE INTO employees" }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");
    assert!(body["field_errors"]["kind"].is_string());

    let (status, body) = server
        .post(
            "/operations",
            json!({ "kind": "DELETE", "target_database": "payroll", "statement": "DELETE FROM checks WHERE id = 1" }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");

    // Bodies that do not fit the request shape are validation errors, not execution errors
    let (status, body) = server
        .post(
            "/operations",
            json!({ "kind": "DELETE", "statement": "DELETE FROM employees WHERE id = 42" }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");
    assert!(body["message"].as_str().unwrap_or_default().contains("target_database"));

    let (status, body) = server
        .post("/confirm", json!({ "pending_id": "not-a-uuid", "approve": true }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");

    let (status, body) = server.post_raw("/operations", "{\"kind\": \"DELETE\",").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "BAD_REQUEST");

    let (status, body) = server
        .post("/nl-query", json!({ "text": "Make me a sandwich", "target_db": "hr" }))
        .await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_error(&body, "TRANSLATION_ERROR");

    let (status, body) = server.get("/pending?status=waiting").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "VALIDATION_ERROR");

    let (status, body) = server.get("/no/such/route").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");

    // Nothing above may have been stored or executed
    let (_, body) = server.get("/pending").await?;
    assert_eq!(body["data"], json!([]));
    assert!(server.executor.calls().is_empty());
    Ok(())
}
