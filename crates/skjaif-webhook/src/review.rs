//! Adapts the gateway to the Kubernetes `ConversionReview` protocol.
use kube::core::{
    conversion::{ConversionRequest, ConversionResponse, ConversionReview},
    response::{Status, StatusSummary},
};
use tracing::instrument;

use crate::gateway::ConversionGateway;

impl ConversionGateway {
    /// Converts the objects of a [`ConversionReview`] sent by the API server.
    ///
    /// The returned review echoes the request `uid` and either carries all
    /// converted objects or a failure status whose `reason` is the error kind.
    #[instrument(skip_all)]
    pub fn review(&self, review: ConversionReview) -> ConversionReview {
        let request = match ConversionRequest::from_review(review) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(
                    error = &err as &dyn std::error::Error,
                    "received invalid conversion review"
                );

                return ConversionResponse::invalid(Status {
                    status: Some(StatusSummary::Failure),
                    message: err.to_string(),
                    reason: "ConversionReview request missing".to_owned(),
                    details: None,
                    metadata: None,
                    code: 400,
                })
                .into_review();
            }
        };

        let response = match self.convert(&request.desired_api_version, request.objects) {
            Ok(converted_objects) => {
                tracing::debug!(
                    k8s.crd.conversion.converted_object_count = converted_objects.len(),
                    "successfully converted objects"
                );

                ConversionResponse {
                    result: Status::success(),
                    types: request.types,
                    uid: request.uid,
                    converted_objects,
                }
            }
            Err(err) => {
                let failure = err.to_failure();

                tracing::warn!(
                    error = &err as &dyn std::error::Error,
                    k8s.crd.conversion.object_index = failure.object_index,
                    "failed to convert objects"
                );

                ConversionResponse {
                    result: Status {
                        status: Some(StatusSummary::Failure),
                        code: err.http_status_code(),
                        message: failure.message,
                        reason: failure.kind,
                        details: None,
                        metadata: None,
                    },
                    types: request.types,
                    uid: request.uid,
                    converted_objects: vec![],
                }
            }
        };

        response.into_review()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};
    use skjaif_crd::SchemaRegistry;

    use super::*;

    fn review(desired_api_version: &str, objects: Vec<Value>) -> ConversionReview {
        serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "ConversionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "desiredAPIVersion": desired_api_version,
                "objects": objects,
            }
        }))
        .expect("valid ConversionReview")
    }

    fn gateway() -> ConversionGateway {
        ConversionGateway::new(Arc::new(SchemaRegistry::new()))
    }

    #[test]
    fn successful_review() {
        let review = review("skjaif.skjaiferator.no/v1beta1", vec![json!({
            "apiVersion": "skjaif.skjaiferator.no/v1alpha1",
            "kind": "SvartSkjaif",
            "metadata": {"name": "morning"},
            "spec": {"container": {"kaffe": "melk", "kopp": "krus", "vann": "kaldt"}}
        })]);

        let response = gateway()
            .review(review)
            .response
            .expect("review must contain a response");

        assert_eq!(response.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(response.result.status, Some(StatusSummary::Success));
        assert_eq!(response.converted_objects.len(), 1);
        assert_eq!(
            response.converted_objects[0]["spec"],
            json!({"kaffe": "melk", "kopp": "krus", "vann": "kaldt"})
        );
    }

    #[test]
    fn failed_review() {
        let review = review("skjaif.skjaiferator.no/v1beta1", vec![json!({
            "apiVersion": "skjaif.skjaiferator.no/v0",
            "kind": "SvartSkjaif",
            "metadata": {"name": "morning"},
            "spec": {}
        })]);

        let response = gateway()
            .review(review)
            .response
            .expect("review must contain a response");

        assert_eq!(response.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(response.result.status, Some(StatusSummary::Failure));
        assert_eq!(response.result.reason, "UnsupportedConversion");
        assert_eq!(response.result.code, 400);
        assert!(response.result.message.starts_with("object 0 has unsupported revision"));
        assert!(response.converted_objects.is_empty());
    }

    #[test]
    fn review_without_request() {
        let review: ConversionReview = serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "ConversionReview",
        }))
        .expect("valid ConversionReview");

        let response = gateway()
            .review(review)
            .response
            .expect("review must contain a response");

        assert_eq!(response.result.status, Some(StatusSummary::Failure));
        assert_eq!(response.result.code, 400);
    }
}
