//! The synchronous conversion gateway.
//!
//! The gateway takes a desired target revision and an ordered batch of
//! untyped objects, each tagged with its own `apiVersion`, and either returns
//! every object converted (in input order) or a single failure naming the
//! first offending object. It never returns a partially converted batch and
//! performs no I/O.
use std::{error::Error as _, fmt::Write as _, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skjaif_crd::{
    Revision, SchemaRegistry, VersionedObject, conversion,
    registry::{ResolveError, ShapeError},
};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::instrument;

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

#[derive(Debug, Snafu, strum::EnumDiscriminants)]
#[strum_discriminants(derive(strum::IntoStaticStr))]
pub enum GatewayError {
    #[snafu(display("unsupported target revision {api_version:?}"))]
    UnsupportedTarget {
        source: ResolveError,
        api_version: String,
    },

    #[snafu(display("object {index} has unsupported revision {api_version:?}"))]
    UnsupportedConversion {
        source: ResolveError,
        index: usize,
        api_version: String,
    },

    #[snafu(display("object {index} has no string \"apiVersion\" field"))]
    MissingRevision { index: usize },

    #[snafu(display("object {index} is of kind {kind:?}, expected {expected:?}"))]
    WrongKind {
        index: usize,
        kind: String,
        expected: &'static str,
    },

    #[snafu(display("object {index} has no \"spec\" field"))]
    MissingSpec { index: usize },

    #[snafu(display("object {index} does not match the shape of {revision}"))]
    ShapeMismatch {
        source: ShapeError,
        index: usize,
        revision: Revision,
    },

    #[snafu(display("object {index} could not be decoded as {revision}"))]
    DecodeObject {
        source: conversion::Error,
        index: usize,
        revision: Revision,
    },

    #[snafu(display("object {index} could not be encoded as {revision}"))]
    EncodeObject {
        source: conversion::Error,
        index: usize,
        revision: Revision,
    },
}

impl GatewayError {
    /// The error kind reported to the caller.
    ///
    /// Decoding failures are reported as `ShapeMismatch`, because a payload
    /// which cannot be decoded as its declared revision does not have the
    /// shape of that revision.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedTarget { .. } => {
                GatewayErrorDiscriminants::UnsupportedConversion.into()
            }
            Self::DecodeObject { .. } => GatewayErrorDiscriminants::ShapeMismatch.into(),
            other => GatewayErrorDiscriminants::from(other).into(),
        }
    }

    /// The index of the offending object, if the error is tied to one.
    pub fn object_index(&self) -> Option<usize> {
        match self {
            Self::UnsupportedTarget { .. } => None,
            Self::UnsupportedConversion { index, .. }
            | Self::MissingRevision { index }
            | Self::WrongKind { index, .. }
            | Self::MissingSpec { index }
            | Self::ShapeMismatch { index, .. }
            | Self::DecodeObject { index, .. }
            | Self::EncodeObject { index, .. } => Some(*index),
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::EncodeObject { .. } => 500,
            _ => 400,
        }
    }

    /// Joins the error and all of its sources into a single message.
    pub fn join_errors(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();

        while let Some(err) = source {
            // Writing into a String cannot fail
            let _ = write!(message, ": {err}");
            source = err.source();
        }

        message
    }

    pub fn to_failure(&self) -> ConversionFailure {
        ConversionFailure {
            kind: self.kind().to_owned(),
            message: self.join_errors(),
            object_index: self.object_index(),
        }
    }
}

/// A conversion request in its plain form.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub target_revision: String,
    pub objects: Vec<Value>,
}

/// Either all converted objects or the failure of the batch.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GatewayResponse {
    Objects(Vec<Value>),
    Error(ConversionFailure),
}

/// The structured failure of a conversion batch.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionFailure {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_index: Option<usize>,
}

/// Converts batches of objects between revisions known to the registry.
#[derive(Clone, Debug)]
pub struct ConversionGateway {
    registry: Arc<SchemaRegistry>,
}

impl ConversionGateway {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Handles a request in its plain form, see [`ConversionGateway::convert`].
    pub fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        match self.convert(&request.target_revision, request.objects) {
            Ok(objects) => GatewayResponse::Objects(objects),
            Err(err) => GatewayResponse::Error(err.to_failure()),
        }
    }

    /// Converts all `objects` into the revision named by `target_api_version`.
    #[instrument(
        skip(self, objects),
        fields(
            k8s.crd.conversion.desired_api_version = target_api_version,
            k8s.crd.conversion.object_count = objects.len(),
        )
    )]
    pub fn convert(&self, target_api_version: &str, objects: Vec<Value>) -> Result<Vec<Value>> {
        let target = self
            .registry
            .resolve(target_api_version)
            .context(UnsupportedTargetSnafu {
                api_version: target_api_version,
            })?
            .revision;

        let mut converted = Vec::with_capacity(objects.len());
        for (index, object) in objects.into_iter().enumerate() {
            converted.push(self.convert_object(index, object, target)?);
        }

        tracing::debug!(
            k8s.crd.conversion.converted_object_count = converted.len(),
            "converted objects"
        );

        Ok(converted)
    }

    fn convert_object(&self, index: usize, object: Value, target: Revision) -> Result<Value> {
        let api_version = object
            .get("apiVersion")
            .and_then(Value::as_str)
            .context(MissingRevisionSnafu { index })?;

        let descriptor =
            self.registry
                .resolve(api_version)
                .context(UnsupportedConversionSnafu {
                    index,
                    api_version,
                })?;
        let source = descriptor.revision;

        if let Some(kind) = object.get("kind").and_then(Value::as_str) {
            let expected = self.registry.kind();
            ensure!(kind == expected, WrongKindSnafu {
                index,
                kind,
                expected
            });
        }

        let spec = object.get("spec").context(MissingSpecSnafu { index })?;
        descriptor.check_shape(spec).context(ShapeMismatchSnafu {
            index,
            revision: source,
        })?;

        // Objects are decoded even if they stay in their revision, so a
        // payload is accepted or rejected independently of the target
        let decoded = VersionedObject::decode(source, &object).context(DecodeObjectSnafu {
            index,
            revision: source,
        })?;

        // The hub is never converted to itself, neither is any other revision
        if source == target {
            return Ok(object);
        }

        let converted = decoded.convert(target);

        tracing::trace!(
            index,
            k8s.crd.conversion.api_version = %source,
            k8s.crd.conversion.desired_api_version = %target,
            "converted object"
        );

        converted.to_value().context(EncodeObjectSnafu {
            index,
            revision: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    const V1ALPHA1: &str = "skjaif.skjaiferator.no/v1alpha1";
    const V1BETA1: &str = "skjaif.skjaiferator.no/v1beta1";

    fn gateway() -> ConversionGateway {
        ConversionGateway::new(Arc::new(SchemaRegistry::new()))
    }

    fn spoke(name: &str, kaffe: &str) -> Value {
        json!({
            "apiVersion": V1ALPHA1,
            "kind": "SvartSkjaif",
            "metadata": {"name": name, "namespace": "kitchen", "generation": 3},
            "spec": {"container": {"kaffe": kaffe, "kopp": "krus", "vann": "kaldt"}}
        })
    }

    fn hub(name: &str, kaffe: &str) -> Value {
        json!({
            "apiVersion": V1BETA1,
            "kind": "SvartSkjaif",
            "metadata": {"name": name, "namespace": "kitchen", "generation": 3},
            "spec": {"kaffe": kaffe, "kopp": "krus", "vann": "kaldt"}
        })
    }

    #[test]
    fn spoke_to_hub_flattens() {
        let converted = gateway()
            .convert(V1BETA1, vec![spoke("morning", "melk")])
            .expect("conversion must succeed");

        assert_eq!(converted, vec![hub("morning", "melk")]);
    }

    #[test]
    fn hub_to_spoke_nests() {
        let converted = gateway()
            .convert(V1ALPHA1, vec![hub("morning", "melk")])
            .expect("conversion must succeed");

        assert_eq!(converted, vec![spoke("morning", "melk")]);
    }

    #[rstest]
    #[case(V1BETA1, hub("a", "melk"))]
    #[case(V1ALPHA1, spoke("a", "melk"))]
    fn same_revision_is_identity_copy(#[case] target: &str, #[case] object: Value) {
        let converted = gateway()
            .convert(target, vec![object.clone()])
            .expect("conversion must succeed");

        assert_eq!(converted, vec![object]);
    }

    #[test]
    fn mixed_batch_keeps_order() {
        let converted = gateway()
            .convert(V1BETA1, vec![
                spoke("first", "melk"),
                hub("second", "svart"),
                spoke("third", "sukker"),
            ])
            .expect("conversion must succeed");

        assert_eq!(converted, vec![
            hub("first", "melk"),
            hub("second", "svart"),
            hub("third", "sukker"),
        ]);
    }

    #[test]
    fn unknown_source_revision_rejects_whole_batch() {
        let mut unknown = spoke("second", "melk");
        unknown["apiVersion"] = json!("skjaif.skjaiferator.no/v2");

        let err = gateway()
            .convert(V1BETA1, vec![spoke("first", "melk"), unknown, spoke("third", "melk")])
            .expect_err("conversion must fail");

        assert!(matches!(err, GatewayError::UnsupportedConversion { index: 1, .. }));
        assert_eq!(err.kind(), "UnsupportedConversion");
        assert_eq!(err.object_index(), Some(1));
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn unknown_target_revision() {
        let err = gateway()
            .convert("skjaif.skjaiferator.no/v3", vec![spoke("a", "melk")])
            .expect_err("conversion must fail");

        assert!(matches!(err, GatewayError::UnsupportedTarget { .. }));
        assert_eq!(err.kind(), "UnsupportedConversion");
        assert_eq!(err.object_index(), None);
    }

    #[rstest]
    #[case::hub_labelled_as_spoke(V1ALPHA1, json!({"kaffe": "melk"}))]
    #[case::spoke_labelled_as_hub(V1BETA1, json!({"container": {"kaffe": "melk"}}))]
    #[case::container_not_an_object(V1ALPHA1, json!({"container": "melk"}))]
    #[case::container_with_unknown_field(
        V1ALPHA1,
        json!({"container": {"kaffe": "melk", "kopp": "krus", "vann": "kaldt", "sukker": "ja"}})
    )]
    #[case::hub_field_of_wrong_type(V1BETA1, json!({"kaffe": 5}))]
    fn shape_mismatch(#[case] api_version: &str, #[case] spec: Value) {
        let object = json!({
            "apiVersion": api_version,
            "kind": "SvartSkjaif",
            "metadata": {"name": "a"},
            "spec": spec,
        });

        let err = gateway()
            .convert(V1BETA1, vec![hub("first", "melk"), object])
            .expect_err("conversion must fail");

        assert_eq!(err.kind(), "ShapeMismatch");
        assert_eq!(err.object_index(), Some(1));
    }

    #[rstest]
    #[case(V1ALPHA1)]
    #[case(V1BETA1)]
    fn undecodable_object_is_rejected_for_every_target(#[case] target: &str) {
        let mut object = hub("a", "melk");
        object["spec"]["kaffe"] = json!(5);

        let err = gateway()
            .convert(target, vec![object])
            .expect_err("conversion must fail");

        assert!(matches!(err, GatewayError::DecodeObject { index: 0, .. }));
        assert_eq!(err.kind(), "ShapeMismatch");
    }

    #[test]
    fn missing_api_version() {
        let mut object = spoke("a", "melk");
        object
            .as_object_mut()
            .expect("object")
            .remove("apiVersion");

        let err = gateway()
            .convert(V1BETA1, vec![object])
            .expect_err("conversion must fail");

        assert!(matches!(err, GatewayError::MissingRevision { index: 0 }));
    }

    #[test]
    fn wrong_kind() {
        let mut object = spoke("a", "melk");
        object["kind"] = json!("ConfigMap");

        let err = gateway()
            .convert(V1BETA1, vec![object])
            .expect_err("conversion must fail");

        assert!(matches!(err, GatewayError::WrongKind { index: 0, .. }));
    }

    #[test]
    fn handle_reports_structured_failure() {
        let mut unknown = hub("a", "melk");
        unknown["apiVersion"] = json!("skjaif.skjaiferator.no/v1");

        let response = gateway().handle(GatewayRequest {
            target_revision: V1ALPHA1.to_owned(),
            objects: vec![unknown],
        });

        let GatewayResponse::Error(failure) = response else {
            unreachable!("conversion must fail");
        };
        assert_eq!(failure.kind, "UnsupportedConversion");
        assert_eq!(failure.object_index, Some(0));
        assert!(failure.message.contains("skjaif.skjaiferator.no/v1"));
    }

    #[test]
    fn response_wire_format() {
        let failure = ConversionFailure {
            kind: "UnsupportedConversion".to_owned(),
            message: "nope".to_owned(),
            object_index: Some(2),
        };

        assert_eq!(
            serde_json::to_value(GatewayResponse::Error(failure)).expect("serializable"),
            json!({"error": {"kind": "UnsupportedConversion", "message": "nope", "objectIndex": 2}})
        );
        assert_eq!(
            serde_json::to_value(GatewayResponse::Objects(vec![])).expect("serializable"),
            json!({"objects": []})
        );
    }
}
