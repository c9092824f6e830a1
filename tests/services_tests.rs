mod common;

use serde_json::json;
use std::sync::Arc;

use childcare_supabase::auth::StaticToken;
use childcare_supabase::error::Error;
use childcare_supabase::models::MediaItem;
use childcare_supabase::payments::{create_payment_session, PaymentRequest};
use childcare_supabase::storage::FileOptions;
use childcare_supabase::Childcare;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{admin, parent};

fn fee() -> PaymentRequest {
    PaymentRequest {
        amount: 4500,
        currency: "gbp".to_string(),
        description: "March fees".to_string(),
        parent_id: "parent-1".to_string(),
    }
}

fn media_row(server: &MockServer) -> serde_json::Value {
    json!({
        "id": "m1",
        "child_id": "amy",
        "url": format!("{}/storage/v1/object/public/media/amy/1-park.jpg", server.uri()),
        "storage_path": "amy/1-park.jpg",
        "uploaded_by": "admin-1",
        "created_at": "2024-03-01T10:00:00+00:00"
    })
}

#[tokio::test]
async fn payment_session_is_created_by_the_edge_function() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/create-payment-session"))
        .and(header("authorization", "Bearer user-token"))
        .and(body_json(json!({
            "amount": 4500,
            "currency": "gbp",
            "description": "March fees",
            "parent_id": "parent-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionId": "cs_test_1",
            "url": "https://checkout.example.com/cs_test_1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let functions = Childcare::new(&server.uri(), "anon-key").functions();
    let session = create_payment_session(&functions, "user-token", &fee()).await.unwrap();
    assert_eq!(session.session_id, "cs_test_1");
    assert_eq!(session.url.as_deref(), Some("https://checkout.example.com/cs_test_1"));
}

#[tokio::test]
async fn function_failures_become_function_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/create-payment-session"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "unknown parent" })))
        .mount(&server)
        .await;

    let functions = Childcare::new(&server.uri(), "anon-key").functions();
    let result = create_payment_session(&functions, "user-token", &fee()).await;
    assert!(matches!(result, Err(Error::Function(message)) if message.contains("unknown parent")));
}

#[tokio::test]
async fn invalid_payment_never_reaches_the_function() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let functions = Childcare::new(&server.uri(), "anon-key").functions();
    let free = PaymentRequest { amount: 0, ..fee() };
    assert!(matches!(
        create_payment_session(&functions, "user-token", &free).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn bucket_upload_remove_and_public_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/media/amy/park.jpg"))
        .and(header("x-upsert", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "media/amy/park.jpg" })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/storage/v1/object/media"))
        .and(body_json(json!({ "prefixes": ["amy/park.jpg"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "amy/park.jpg", "bucket_id": "media" }
        ])))
        .mount(&server)
        .await;

    let storage = Childcare::new(&server.uri(), "anon-key").storage();
    let bucket = storage.from("media");

    let uploaded = bucket
        .upload(
            "amy/park.jpg",
            vec![0xff, 0xd8, 0xff],
            FileOptions::new().with_content_type("image/jpeg").with_upsert(true),
        )
        .await
        .unwrap();
    assert_eq!(uploaded.key, "media/amy/park.jpg");

    let removed = bucket.remove(&["amy/park.jpg"]).await.unwrap();
    assert_eq!(removed[0].name, "amy/park.jpg");

    assert_eq!(
        bucket.get_public_url("amy/park.jpg"),
        format!("{}/storage/v1/object/public/media/amy/park.jpg", server.uri())
    );
}

#[tokio::test]
async fn media_upload_stores_object_then_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/storage/v1/object/media/amy/\d+-park\.jpg$"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "media/amy/1-park.jpg" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/media"))
        .and(body_partial_json(json!({ "child_id": "amy", "uploaded_by": "admin-1" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([media_row(&server)])))
        .expect(1)
        .mount(&server)
        .await;

    let media = Childcare::new(&server.uri(), "anon-key").media(Arc::new(StaticToken("user-token".to_string())));
    let item = media
        .upload(&admin(), "amy", "park.jpg", vec![1, 2, 3], "image/jpeg")
        .await
        .unwrap();
    assert_eq!(item.id, "m1");
    assert!(item.url.contains("/storage/v1/object/public/media/amy/"));
}

#[tokio::test]
async fn media_row_failure_removes_the_uploaded_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/storage/v1/object/media/amy/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "media/amy/x" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/media"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "new row violates row-level security policy"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/storage/v1/object/media"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let media = Childcare::new(&server.uri(), "anon-key").media(Arc::new(StaticToken("user-token".to_string())));
    let result = media
        .upload(&admin(), "amy", "park.jpg", vec![1, 2, 3], "image/jpeg")
        .await;
    assert!(matches!(result, Err(Error::Api { status: 403, .. })));
}

#[tokio::test]
async fn media_listing_and_deletion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/media"))
        .and(query_param("child_id", "eq.amy"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([media_row(&server)])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/media"))
        .and(query_param("id", "eq.m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([media_row(&server)])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/storage/v1/object/media"))
        .and(body_json(json!({ "prefixes": ["amy/1-park.jpg"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let media = Childcare::new(&server.uri(), "anon-key").media(Arc::new(StaticToken("user-token".to_string())));
    let items: Vec<MediaItem> = media.list_for_child("amy").await.unwrap();
    assert_eq!(items.len(), 1);

    assert!(matches!(
        media.delete(&parent(), &items[0]).await,
        Err(Error::Forbidden(_))
    ));
    media.delete(&admin(), &items[0]).await.unwrap();
}
