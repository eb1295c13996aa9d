//! Invoice state machine integration tests: send, mark-paid and the
//! overdue reminder sweep.

mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use clinic_invoicing::services::InvoiceEvent;
use serde_json::{json, Value};

async fn error_message(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn send_without_lines_fails() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .post(&format!("/invoices/{}/send", invoice_id), json!({}))
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(
        error_message(response).await,
        "Cannot send an invoice without lines"
    );
}

#[tokio::test]
async fn send_draft_with_lines_succeeds_and_emits_event() {
    let app = TestApp::spawn().await;
    let mut events = app.events.subscribe();

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();
    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;

    let response = app
        .post(&format!("/invoices/{}/send", invoice_id), json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let sent: Value = response.json().await.unwrap();
    assert_eq!(sent["status"], "sent");

    let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
        .await
        .expect("No invoice.sent event within 1s")
        .expect("Event bus closed");
    let InvoiceEvent::Sent(event_invoice) = event;
    assert_eq!(event_invoice.invoice_id.to_string(), invoice_id);
}

#[tokio::test]
async fn send_accepts_the_body_based_route_too() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();
    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;

    let response = app
        .post("/invoices/send", json!({ "invoice_id": invoice_id }))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn send_twice_fails_with_non_draft_error() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();
    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;

    let first = app
        .post(&format!("/invoices/{}/send", invoice_id), json!({}))
        .await;
    assert_eq!(first.status(), 200);

    let second = app
        .post(&format!("/invoices/{}/send", invoice_id), json!({}))
        .await;
    assert_eq!(second.status(), 400);
    assert_eq!(
        error_message(second).await,
        "Only draft invoices can be sent"
    );
}

#[tokio::test]
async fn lines_cannot_be_added_after_send() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();
    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;
    app.post(&format!("/invoices/{}/send", invoice_id), json!({}))
        .await;

    let response = app
        .post(
            "/invoices/line",
            json!({
                "invoice_id": invoice_id,
                "description": "Acte complémentaire",
                "quantity": "1",
                "unit_price": "10",
            }),
        )
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(
        error_message(response).await,
        "Cannot add lines to a non-draft invoice"
    );
}

#[tokio::test]
async fn mark_paid_from_sent() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();
    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;
    app.post(&format!("/invoices/{}/send", invoice_id), json!({}))
        .await;

    let response = app
        .post("/invoices/mark-paid", json!({ "invoice_id": invoice_id }))
        .await;
    assert_eq!(response.status(), 200);
    let paid: Value = response.json().await.unwrap();
    assert_eq!(paid["status"], "paid");
}

#[tokio::test]
async fn mark_paid_is_permissive_about_prior_status() {
    let app = TestApp::spawn().await;

    // Even a draft can be settled directly.
    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .post("/invoices/mark-paid", json!({ "invoice_id": invoice_id }))
        .await;
    assert_eq!(response.status(), 200);
    let paid: Value = response.json().await.unwrap();
    assert_eq!(paid["status"], "paid");
}

#[tokio::test]
async fn overdue_sweep_moves_past_due_sent_invoices_once() {
    let app = TestApp::spawn().await;

    let past_due = (Utc::now().date_naive() - Duration::days(5)).to_string();
    let response = app
        .post("/invoices", json!({ "due_date": past_due }))
        .await;
    assert_eq!(response.status(), 201);
    let invoice: Value = response.json().await.unwrap();
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();

    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;
    app.post(&format!("/invoices/{}/send", invoice_id), json!({}))
        .await;

    let sweep = app.post("/invoices/remind-overdue", json!({})).await;
    assert_eq!(sweep.status(), 200);
    let updated: Value = sweep.json().await.unwrap();
    let updated = updated.as_array().unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0]["status"], "overdue");

    // Idempotent: the invoice no longer matches the sent filter.
    let second = app.post("/invoices/remind-overdue", json!({})).await;
    let second: Value = second.json().await.unwrap();
    assert!(second.as_array().unwrap().is_empty());

    // Overdue is not a dead end.
    let paid = app
        .post("/invoices/mark-paid", json!({ "invoice_id": invoice_id }))
        .await;
    let paid: Value = paid.json().await.unwrap();
    assert_eq!(paid["status"], "paid");
}

#[tokio::test]
async fn overdue_sweep_ignores_invoices_not_yet_due() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();
    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;
    app.post(&format!("/invoices/{}/send", invoice_id), json!({}))
        .await;

    let sweep = app.post("/invoices/remind-overdue", json!({})).await;
    let updated: Value = sweep.json().await.unwrap();
    assert!(updated.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn send_unknown_invoice_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            &format!("/invoices/{}/send", uuid::Uuid::new_v4()),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), 404);
}
