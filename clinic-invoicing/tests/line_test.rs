//! Line ledger integration tests: per-line amounts and total
//! recalculation.

mod common;

use common::{dec, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[tokio::test]
async fn line_amount_follows_the_third_party_and_tax_formula() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();

    // qty 3 x 100, 20% third-party, 10% tax:
    // gross 300, third-party 60, base 240, tax 24, payable 264
    let updated = app
        .add_line(&invoice_id, "Séance de kinésithérapie", "3", "100", "20", "10")
        .await;

    let lines = updated["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(dec(&lines[0]["amount"]), d("264"));
    assert_eq!(dec(&updated["total"]), d("264"));
}

#[tokio::test]
async fn total_accumulates_across_lines() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();

    app.add_line(&invoice_id, "Séance de kinésithérapie", "3", "100", "20", "10")
        .await;
    let updated = app
        .add_line(&invoice_id, "Consultation", "1", "50", "0", "0")
        .await;

    assert_eq!(dec(&updated["total"]), d("314"));

    // The persisted invoice agrees with the recalculated response.
    let fetched = app.get(&format!("/invoices/{}", invoice_id)).await;
    let fetched: Value = fetched.json().await.unwrap();
    assert_eq!(dec(&fetched["total"]), d("314"));
    assert_eq!(fetched["lines"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn fresh_draft_has_zero_total() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    assert_eq!(dec(&invoice["total"]), Decimal::ZERO);
}

#[tokio::test]
async fn non_positive_quantity_is_rejected() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .post(
            "/invoices/line",
            json!({
                "invoice_id": invoice_id,
                "description": "Consultation",
                "quantity": "0",
                "unit_price": "25",
            }),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn out_of_range_rates_are_rejected() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .post(
            "/invoices/line",
            json!({
                "invoice_id": invoice_id,
                "description": "Consultation",
                "quantity": "1",
                "unit_price": "25",
                "third_party_rate": "120",
            }),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn add_line_to_unknown_invoice_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/invoices/line",
            json!({
                "invoice_id": uuid::Uuid::new_v4(),
                "description": "Consultation",
                "quantity": "1",
                "unit_price": "25",
            }),
        )
        .await;
    assert_eq!(response.status(), 404);
}
