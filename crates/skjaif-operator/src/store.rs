//! Read, update and watch access to the stored (Hub) `SvartSkjaif` objects.
//!
//! The reconciler only talks to the [`ObjectStore`] trait. [`KubeStore`] is
//! backed by the Kubernetes API server, [`InMemoryStore`] keeps objects in
//! process and is used to drive the reconciler with synthetic event sequences.
use std::fmt::Display;

use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::ResourceExt;
use skjaif_crd::v1beta1::SvartSkjaif;
use snafu::Snafu;
use strum::{EnumDiscriminants, IntoStaticStr};

mod in_memory;
mod kubernetes;

pub use self::{
    in_memory::{FetchFault, InMemoryStore, UpdateFault},
    kubernetes::KubeStore,
};

pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Snafu, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("{identity} was modified concurrently, expected resource version {expected_version:?}"))]
    Conflict {
        identity: ObjectIdentity,
        expected_version: String,
    },

    #[snafu(display("{identity} does not exist"))]
    NotFound { identity: ObjectIdentity },

    #[snafu(display("transient failure while accessing {identity}"))]
    Transient {
        source: BoxedError,
        identity: ObjectIdentity,
    },

    #[snafu(display("permanent failure while accessing {identity}"))]
    Permanent {
        source: BoxedError,
        identity: ObjectIdentity,
    },

    #[snafu(display("failed to watch objects"))]
    Watch { source: BoxedError },
}

impl StoreError {
    pub fn category(&self) -> &'static str {
        StoreErrorDiscriminants::from(self).into()
    }
}

/// Identifies a stored object by namespace and name.
///
/// The identity is immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectIdentity {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Returns the identity of `object`, or [`None`] if it has no name yet.
    pub fn of(object: &SvartSkjaif) -> Option<Self> {
        let name = object.metadata.name.clone()?;
        Some(Self {
            namespace: object.namespace(),
            name,
        })
    }
}

impl Display for ObjectIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{name}", name = self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum EventKind {
    Applied,
    Deleted,
}

/// A change notification delivered by [`ObjectStore::watch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub identity: ObjectIdentity,
    pub kind: EventKind,
}

impl WatchEvent {
    pub fn applied(identity: ObjectIdentity) -> Self {
        Self {
            identity,
            kind: EventKind::Applied,
        }
    }

    pub fn deleted(identity: ObjectIdentity) -> Self {
        Self {
            identity,
            kind: EventKind::Deleted,
        }
    }
}

/// Access to the stored Hub objects.
///
/// Every write is conditioned on the resource version the caller observed.
/// A store that detects a concurrent modification must answer with
/// [`StoreError::Conflict`] instead of overwriting.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches the object, returning [`None`] if it does not exist.
    async fn get(&self, identity: &ObjectIdentity) -> Result<Option<SvartSkjaif>, StoreError>;

    /// Replaces the stored object if its resource version still equals
    /// `expected_version`, returning the object as stored afterwards.
    async fn update(
        &self,
        object: &SvartSkjaif,
        expected_version: &str,
    ) -> Result<SvartSkjaif, StoreError>;

    /// Streams change notifications for all objects.
    fn watch(&self) -> BoxStream<'static, Result<WatchEvent, StoreError>>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use skjaif_crd::v1beta1::SvartSkjaifSpec;

    use super::*;

    #[rstest]
    #[case(ObjectIdentity::new("kitchen", "morning"), "kitchen/morning")]
    #[case(ObjectIdentity { namespace: None, name: "morning".to_owned() }, "morning")]
    fn identity_display(#[case] identity: ObjectIdentity, #[case] expected: &str) {
        assert_eq!(identity.to_string(), expected);
    }

    #[test]
    fn identity_of_unnamed_object() {
        let object = SvartSkjaif::new("morning", SvartSkjaifSpec::default());
        assert_eq!(
            ObjectIdentity::of(&object),
            Some(ObjectIdentity {
                namespace: None,
                name: "morning".to_owned()
            })
        );

        let mut unnamed = object;
        unnamed.metadata.name = None;
        assert_eq!(ObjectIdentity::of(&unnamed), None);
    }

    #[test]
    fn error_category() {
        let error = StoreError::NotFound {
            identity: ObjectIdentity::new("kitchen", "morning"),
        };
        assert_eq!(error.category(), "NotFound");
    }
}
