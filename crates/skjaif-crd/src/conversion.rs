//! The pure, stateless conversion engine.
//!
//! Conversions between the two revisions are plain [`From`] impls, so a
//! spoke can only ever be handed to [`to_hub`] and a hub only to
//! [`to_spoke`]. Metadata and status are moved over untouched, only the spec
//! is reshaped.
//!
//! [`VersionedObject`] wraps an object of either revision and routes it to
//! any other revision through the hub, see [`VersionedObject::convert`].
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize as _;
use serde_json::Value;
use snafu::{ResultExt, Snafu};

use crate::{Revision, SvartSkjaifStatus, v1alpha1, v1beta1};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to deserialize {revision} object"))]
    DeserializeObject {
        source: serde_json::Error,
        revision: Revision,
    },

    #[snafu(display("failed to serialize {revision} object"))]
    SerializeObject {
        source: serde_json::Error,
        revision: Revision,
    },
}

impl From<v1alpha1::SvartSkjaifSpec> for v1beta1::SvartSkjaifSpec {
    fn from(spoke: v1alpha1::SvartSkjaifSpec) -> Self {
        let v1alpha1::SvartSkjaifContainer { kaffe, kopp, vann } = spoke.container;
        Self { kaffe, kopp, vann }
    }
}

impl From<v1beta1::SvartSkjaifSpec> for v1alpha1::SvartSkjaifSpec {
    fn from(hub: v1beta1::SvartSkjaifSpec) -> Self {
        let v1beta1::SvartSkjaifSpec { kaffe, kopp, vann } = hub;
        Self {
            container: v1alpha1::SvartSkjaifContainer { kaffe, kopp, vann },
        }
    }
}

impl From<v1alpha1::SvartSkjaif> for v1beta1::SvartSkjaif {
    fn from(spoke: v1alpha1::SvartSkjaif) -> Self {
        Self {
            metadata: spoke.metadata,
            spec: spoke.spec.into(),
            status: spoke.status,
        }
    }
}

impl From<v1beta1::SvartSkjaif> for v1alpha1::SvartSkjaif {
    fn from(hub: v1beta1::SvartSkjaif) -> Self {
        Self {
            metadata: hub.metadata,
            spec: hub.spec.into(),
            status: hub.status,
        }
    }
}

/// Flattens a `v1alpha1` object into the stored `v1beta1` shape.
pub fn to_hub(spoke: v1alpha1::SvartSkjaif) -> v1beta1::SvartSkjaif {
    spoke.into()
}

/// Nests a stored `v1beta1` object into the `v1alpha1` shape.
pub fn to_spoke(hub: v1beta1::SvartSkjaif) -> v1alpha1::SvartSkjaif {
    hub.into()
}

/// A `SvartSkjaif` in exactly one of its revisions.
#[derive(Clone, Debug, PartialEq)]
pub enum VersionedObject {
    V1Alpha1(v1alpha1::SvartSkjaif),
    V1Beta1(v1beta1::SvartSkjaif),
}

impl VersionedObject {
    /// Deserializes a JSON object which is known to be in `revision`.
    pub fn from_value(revision: Revision, value: Value) -> Result<Self, Error> {
        let object = match revision {
            Revision::V1Alpha1 => {
                Self::V1Alpha1(serde_json::from_value(value).context(DeserializeObjectSnafu {
                    revision,
                })?)
            }
            Revision::V1Beta1 => {
                Self::V1Beta1(serde_json::from_value(value).context(DeserializeObjectSnafu {
                    revision,
                })?)
            }
        };

        Ok(object)
    }

    /// Like [`Self::from_value`], but leaves `value` untouched.
    pub fn decode(revision: Revision, value: &Value) -> Result<Self, Error> {
        let object = match revision {
            Revision::V1Alpha1 => Self::V1Alpha1(
                v1alpha1::SvartSkjaif::deserialize(value)
                    .context(DeserializeObjectSnafu { revision })?,
            ),
            Revision::V1Beta1 => Self::V1Beta1(
                v1beta1::SvartSkjaif::deserialize(value)
                    .context(DeserializeObjectSnafu { revision })?,
            ),
        };

        Ok(object)
    }

    /// Serializes the object, including its `apiVersion` and `kind`.
    pub fn to_value(&self) -> Result<Value, Error> {
        let revision = self.revision();
        let value = match self {
            Self::V1Alpha1(object) => serde_json::to_value(object),
            Self::V1Beta1(object) => serde_json::to_value(object),
        };

        value.context(SerializeObjectSnafu { revision })
    }

    pub fn revision(&self) -> Revision {
        match self {
            Self::V1Alpha1(_) => Revision::V1Alpha1,
            Self::V1Beta1(_) => Revision::V1Beta1,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::V1Alpha1(object) => &object.metadata,
            Self::V1Beta1(object) => &object.metadata,
        }
    }

    pub fn status(&self) -> Option<&SvartSkjaifStatus> {
        match self {
            Self::V1Alpha1(object) => object.status.as_ref(),
            Self::V1Beta1(object) => object.status.as_ref(),
        }
    }

    /// Converts the object into the hub revision.
    pub fn into_hub(self) -> v1beta1::SvartSkjaif {
        match self {
            Self::V1Alpha1(spoke) => to_hub(spoke),
            Self::V1Beta1(hub) => hub,
        }
    }

    /// Converts the object into `target`.
    ///
    /// Converting into the revision the object is already in is an identity
    /// copy. Every other pair is routed through the hub, spokes are never
    /// converted into each other directly.
    pub fn convert(self, target: Revision) -> Self {
        match (self.revision(), target) {
            (source, target) if source == target => self,
            (_, Revision::V1Beta1) => Self::V1Beta1(self.into_hub()),
            (_, Revision::V1Alpha1) => Self::V1Alpha1(to_spoke(self.into_hub())),
        }
    }
}

impl From<v1alpha1::SvartSkjaif> for VersionedObject {
    fn from(object: v1alpha1::SvartSkjaif) -> Self {
        Self::V1Alpha1(object)
    }
}

impl From<v1beta1::SvartSkjaif> for VersionedObject {
    fn from(object: v1beta1::SvartSkjaif) -> Self {
        Self::V1Beta1(object)
    }
}
