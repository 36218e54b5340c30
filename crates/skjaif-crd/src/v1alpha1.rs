//! The `v1alpha1` spoke revision.
//!
//! Fields are nested one level deep inside [`SvartSkjaifContainer`]. This
//! revision is never stored, it is computed from the hub on demand.
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::SvartSkjaifStatus;

/// Desired state of a `SvartSkjaif` in the `v1alpha1` shape.
#[derive(Clone, CustomResource, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "skjaif.skjaiferator.no",
    version = "v1alpha1",
    kind = "SvartSkjaif",
    plural = "svartskjaifs",
    shortname = "skjaif",
    status = "SvartSkjaifStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SvartSkjaifSpec {
    pub container: SvartSkjaifContainer,
}

/// The nested structure carrying the three coffee settings.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SvartSkjaifContainer {
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
