use std::sync::Arc;

use axum::body::Body;
use http::{Request, StatusCode, header};
use http_body_util::BodyExt as _;
use serde_json::{Value, json};
use skjaif_crd::SchemaRegistry;
use skjaif_webhook::{ConversionGateway, ConversionWebhookServer};
use tower::ServiceExt as _;

fn router() -> axum::Router {
    ConversionWebhookServer::router(ConversionGateway::new(Arc::new(SchemaRegistry::new())))
}

async fn post_review(review: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/convert/svartskjaifs.skjaif.skjaiferator.no")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(review.to_string()))
        .expect("valid request");

    let response = router().oneshot(request).await.expect("infallible router");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("readable body")
        .to_bytes();

    (status, serde_json::from_slice(&body).expect("JSON body"))
}

#[tokio::test]
async fn converts_spoke_to_hub_over_http() {
    let (status, body) = post_review(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "ConversionReview",
        "request": {
            "uid": "0000-1111",
            "desiredAPIVersion": "skjaif.skjaiferator.no/v1beta1",
            "objects": [{
                "apiVersion": "skjaif.skjaiferator.no/v1alpha1",
                "kind": "SvartSkjaif",
                "metadata": {"name": "morning", "namespace": "kitchen"},
                "spec": {"container": {"kaffe": "melk", "kopp": "krus", "vann": "kaldt"}}
            }]
        }
    }))
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["uid"], "0000-1111");
    assert_eq!(body["response"]["result"]["status"], "Success");
    assert_eq!(body["response"]["convertedObjects"], json!([{
        "apiVersion": "skjaif.skjaiferator.no/v1beta1",
        "kind": "SvartSkjaif",
        "metadata": {"name": "morning", "namespace": "kitchen"},
        "spec": {"kaffe": "melk", "kopp": "krus", "vann": "kaldt"}
    }]));
}

#[tokio::test]
async fn rejects_unknown_revision_over_http() {
    let (status, body) = post_review(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "ConversionReview",
        "request": {
            "uid": "2222-3333",
            "desiredAPIVersion": "skjaif.skjaiferator.no/v1alpha1",
            "objects": [
                {
                    "apiVersion": "skjaif.skjaiferator.no/v1beta1",
                    "kind": "SvartSkjaif",
                    "metadata": {"name": "fine"},
                    "spec": {"kaffe": "melk"}
                },
                {
                    "apiVersion": "skjaif.skjaiferator.no/v9",
                    "kind": "SvartSkjaif",
                    "metadata": {"name": "broken"},
                    "spec": {"kaffe": "melk"}
                }
            ]
        }
    }))
    .await;

    // Conversion failures are reported inside the review, not via HTTP status
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["uid"], "2222-3333");
    assert_eq!(body["response"]["result"]["status"], "Failure");
    assert_eq!(body["response"]["result"]["reason"], "UnsupportedConversion");
    assert!(
        body["response"]["convertedObjects"]
            .as_array()
            .is_none_or(Vec::is_empty)
    );
}

#[tokio::test]
async fn health() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("valid request");

    let response = router().oneshot(request).await.expect("infallible router");
    assert_eq!(response.status(), StatusCode::OK);
}
