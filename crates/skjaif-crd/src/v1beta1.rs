//! The `v1beta1` hub revision.
//!
//! This is the canonical shape: it is the only revision the API server
//! persists and the only revision the reconciler ever reads or writes.
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::SvartSkjaifStatus;

/// Desired state of a `SvartSkjaif` in the flat `v1beta1` shape.
#[derive(Clone, CustomResource, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "skjaif.skjaiferator.no",
    version = "v1beta1",
    kind = "SvartSkjaif",
    plural = "svartskjaifs",
    shortname = "skjaif",
    status = "SvartSkjaifStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SvartSkjaifSpec {
    /// The kind of coffee.
    #[serde(default)]
    pub kaffe: String,

    /// The cup the coffee is served in.
    #[serde(default)]
    pub kopp: String,

    /// The temperature of the water.
    #[serde(default)]
    pub vann: String,
}
