//! PDF/QR pipeline integration tests: lazy generation, deterministic
//! artifact paths and superseded-object cleanup.

mod common;

use common::TestApp;
use clinic_invoicing::repository::InvoiceStore;
use clinic_invoicing::services::storage::{pdf_object_key, qr_object_key, ObjectMeta};
use clinic_invoicing::services::Storage;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn download_lazily_generates_the_artifacts_first() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();
    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;
    assert!(invoice["pdf_path"].is_null());

    let response = app
        .get(&format!("/invoices/{}/download/pdf", invoice_id))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/pdf"
    );
    let disposition = response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .to_string();
    let bytes = response.bytes().await.unwrap();
    assert_eq!(&bytes[..5], b"%PDF-");

    // Afterwards the invoice points at both artifacts.
    let fetched: Value = app
        .get(&format!("/invoices/{}", invoice_id))
        .await
        .json()
        .await
        .unwrap();
    let number = fetched["number"].as_str().unwrap();
    assert!(disposition.contains(&format!("facture-{}.pdf", number)));

    let id = invoice_id.parse::<Uuid>().unwrap();
    assert_eq!(
        fetched["pdf_path"].as_str().unwrap(),
        pdf_object_key(app.tenant_id, id)
    );
    assert_eq!(
        fetched["qr_path"].as_str().unwrap(),
        qr_object_key(app.tenant_id, id)
    );
}

#[tokio::test]
async fn generated_artifacts_land_under_the_deterministic_keys() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();
    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;

    let response = app
        .post(&format!("/invoices/{}/regenerate-pdf", invoice_id), json!({}))
        .await;
    assert_eq!(response.status(), 200);

    let id = invoice_id.parse::<Uuid>().unwrap();
    assert!(app
        .storage
        .exists(&pdf_object_key(app.tenant_id, id))
        .await
        .unwrap());
    assert!(app
        .storage
        .exists(&qr_object_key(app.tenant_id, id))
        .await
        .unwrap());

    let qr_bytes = app
        .storage
        .download(&qr_object_key(app.tenant_id, id))
        .await
        .unwrap();
    assert_eq!(&qr_bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn regenerating_keeps_paths_stable_and_removes_superseded_objects() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap().to_string();
    let id = invoice_id.parse::<Uuid>().unwrap();
    app.add_line(&invoice_id, "Consultation", "1", "25", "0", "0")
        .await;

    // Simulate artifacts left behind under an older naming scheme.
    let legacy_pdf = format!("{}/invoices/pdf/legacy-{}.pdf", app.tenant_id, id);
    let legacy_qr = format!("{}/invoices/qr/legacy-{}.png", app.tenant_id, id);
    let meta = ObjectMeta {
        invoice_id: id,
        tenant_id: app.tenant_id,
        content_type: "application/pdf",
    };
    app.storage
        .upload(&legacy_pdf, b"old pdf".to_vec(), &meta)
        .await
        .unwrap();
    app.storage
        .upload(&legacy_qr, b"old qr".to_vec(), &meta)
        .await
        .unwrap();
    app.store
        .set_artifact_paths(app.tenant_id, id, &legacy_pdf, &legacy_qr)
        .await
        .unwrap();

    let first = app
        .post(&format!("/invoices/{}/regenerate-pdf", invoice_id), json!({}))
        .await;
    assert_eq!(first.status(), 200);
    let first: Value = first.json().await.unwrap();

    // Superseded objects are gone and the paths are the deterministic ones.
    assert!(!app.storage.exists(&legacy_pdf).await.unwrap());
    assert!(!app.storage.exists(&legacy_qr).await.unwrap());
    assert_eq!(
        first["pdf_path"].as_str().unwrap(),
        pdf_object_key(app.tenant_id, id)
    );

    // A second run is stable: same keys, objects still present.
    let second = app
        .post(&format!("/invoices/{}/regenerate-pdf", invoice_id), json!({}))
        .await;
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["pdf_path"], first["pdf_path"]);
    assert_eq!(second["qr_path"], first["qr_path"]);
    assert!(app
        .storage
        .exists(&pdf_object_key(app.tenant_id, id))
        .await
        .unwrap());
    assert!(app
        .storage
        .exists(&qr_object_key(app.tenant_id, id))
        .await
        .unwrap());
}

#[tokio::test]
async fn regenerate_for_unknown_invoice_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            &format!("/invoices/{}/regenerate-pdf", Uuid::new_v4()),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn download_from_another_tenant_is_not_found() {
    let app = TestApp::spawn().await;

    let invoice = app.create_draft().await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .get_as(
            Uuid::new_v4(),
            &format!("/invoices/{}/download/pdf", invoice_id),
        )
        .await;
    assert_eq!(response.status(), 404);
}
